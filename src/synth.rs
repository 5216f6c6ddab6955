//! Sample-rate sinusoidal rendering from integrator state.
//!
//! The synthesizer owns everything that moves at audio rate: one 32-bit
//! wrapping phase accumulator per mode and the exponentially smoothed
//! amplitudes that kill zipper noise. It never mutates integrator state; it
//! copies magnitude and phase targets at control-tick boundaries via `sync`.

use crate::constants::{AMPLITUDE_SMOOTHING, HEADROOM_CEILING, MODES_PER_VOICE};
use crate::dsp::math::{accumulator_to_radians, fast_sin, phase_increment};
use crate::mode::ModeBank;

use std::f32::consts::TAU;

// Contributions below this smoothed amplitude are inaudible; skip the sine.
const AUDIBLE_FLOOR: f32 = 1e-9;

#[derive(Debug, Clone, Copy)]
pub struct ModeSynth {
    sample_rate: f32,
    omega: [f32; MODES_PER_VOICE],
    phase_acc: [u32; MODES_PER_VOICE],
    phase_inc: [u32; MODES_PER_VOICE],
    smoothed_amp: [f32; MODES_PER_VOICE],
    target_amp: [f32; MODES_PER_VOICE],
    mode_phase: [f32; MODES_PER_VOICE],
    active: [bool; MODES_PER_VOICE],
}

impl ModeSynth {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            omega: [0.0; MODES_PER_VOICE],
            phase_acc: [0; MODES_PER_VOICE],
            phase_inc: [0; MODES_PER_VOICE],
            smoothed_amp: [0.0; MODES_PER_VOICE],
            target_amp: [0.0; MODES_PER_VOICE],
            mode_phase: [0.0; MODES_PER_VOICE],
            active: [false; MODES_PER_VOICE],
        }
    }

    /// Copy the bank's magnitudes and phases as the new smoothing targets.
    /// Called at control-tick boundaries so the audio loop reads a coherent
    /// snapshot instead of racing the integrator per sample.
    pub fn sync(&mut self, bank: &ModeBank) {
        for (k, mode) in bank.modes().iter().enumerate() {
            self.active[k] = mode.is_active();
            if !mode.is_active() {
                self.target_amp[k] = 0.0;
                continue;
            }
            if self.omega[k] != mode.omega() {
                self.omega[k] = mode.omega();
                self.phase_inc[k] =
                    phase_increment(self.omega[k] / TAU, self.sample_rate);
            }
            self.target_amp[k] = mode.state().norm() * mode.weight();
            self.mode_phase[k] = mode.baseband_phase();
        }
    }

    /// Add `n` samples of this synth's output into `out`, scaled by `scale`.
    /// `master_gain` participates in the per-mode headroom clamp; `scale`
    /// (the polyphony mix factor) is applied outside it.
    pub fn render_add(&mut self, out: &mut [f32], master_gain: f32, scale: f32) {
        for sample in out.iter_mut() {
            let mut acc = 0.0;
            for k in 0..MODES_PER_VOICE {
                // Per-sample one-pole smoothing toward the snapshot target.
                self.smoothed_amp[k] +=
                    AMPLITUDE_SMOOTHING * (self.target_amp[k] - self.smoothed_amp[k]);
                if !self.active[k] {
                    continue;
                }
                let gain = (self.smoothed_amp[k] * master_gain).min(HEADROOM_CEILING);
                if gain > AUDIBLE_FLOOR {
                    let theta = accumulator_to_radians(self.phase_acc[k]) + self.mode_phase[k];
                    acc += gain * fast_sin(theta);
                }
                self.phase_acc[k] = self.phase_acc[k].wrapping_add(self.phase_inc[k]);
            }
            *sample += acc * scale;
        }
    }

    /// Rebind phase increments to a new sample rate. Accumulators and
    /// smoothed amplitudes are untouched, so pitch is preserved and no
    /// click is introduced.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        for k in 0..MODES_PER_VOICE {
            if self.active[k] {
                self.phase_inc[k] = phase_increment(self.omega[k] / TAU, sample_rate);
            }
        }
    }

    /// Zero every phase accumulator. Smoothed amplitudes are kept so the
    /// output level does not jump.
    pub fn reset_phases(&mut self) {
        self.phase_acc = [0; MODES_PER_VOICE];
    }

    /// Summed smoothed amplitude, the allocator's quietness metric.
    pub fn smoothed_total(&self) -> f32 {
        self.smoothed_amp.iter().sum()
    }

    /// The frequency a mode actually renders at, reconstructed from its
    /// phase increment.
    pub fn realized_frequency(&self, k: usize) -> f32 {
        (self.phase_inc[k] as f64 / 4_294_967_296.0 * self.sample_rate as f64) as f32
    }

    pub fn reset(&mut self) {
        self.phase_acc = [0; MODES_PER_VOICE];
        self.smoothed_amp = [0.0; MODES_PER_VOICE];
        self.target_amp = [0.0; MODES_PER_VOICE];
        self.mode_phase = [0.0; MODES_PER_VOICE];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::excitation::PokeEvent;
    use crate::types::Personality;

    const DT: f32 = 0.002;

    fn sounding_bank() -> ModeBank {
        let mut bank = ModeBank::new(Personality::Resonator, DT);
        bank.configure_mode(0, TAU * 440.0, 2.0, 1.0);
        bank.poke(PokeEvent::new(1.0, 0.0, [1.0, 0.0, 0.0, 0.0]), 0.005);
        for _ in 0..10 {
            bank.tick(1e-3, 25);
        }
        bank
    }

    #[test]
    fn test_smoothing_converges_to_target() {
        let bank = sounding_bank();
        let mut synth = ModeSynth::new(48_000.0);
        synth.sync(&bank);

        let target = bank.modes()[0].magnitude();
        let mut out = vec![0.0; 512];
        synth.render_add(&mut out, 1.0, 1.0);

        // After a few hundred samples the one-pole smoother has settled.
        assert!((synth.smoothed_amp[0] - target).abs() < target * 0.01);
    }

    #[test]
    fn test_rendered_pitch_matches_mode() {
        let bank = sounding_bank();
        let mut synth = ModeSynth::new(48_000.0);
        synth.sync(&bank);

        // 0.1 s of a 440 Hz tone crosses zero 88 times.
        let mut out = vec![0.0; 4800];
        synth.render_add(&mut out, 1.0, 1.0);
        let crossings = out
            .windows(2)
            .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
            .count();
        assert!(
            (crossings as i32 - 88).abs() <= 3,
            "zero crossings: {}",
            crossings
        );
    }

    #[test]
    fn test_sample_rate_change_preserves_pitch() {
        let bank = sounding_bank();
        let mut synth = ModeSynth::new(48_000.0);
        synth.sync(&bank);
        let before = synth.realized_frequency(0);
        synth.set_sample_rate(96_000.0);
        let after = synth.realized_frequency(0);
        assert!((before - 440.0).abs() < 1e-4);
        assert!((after - 440.0).abs() < 1e-4);
    }

    #[test]
    fn test_headroom_clamp_limits_gain() {
        // Grow a self-oscillating mode to its ceiling, well above the clamp.
        let mut bank = ModeBank::new(Personality::SelfOscillator, DT);
        bank.configure_mode(0, TAU * 220.0, -8.0, 1.0);
        bank.poke(PokeEvent::new(0.5, 0.0, [1.0, 0.0, 0.0, 0.0]), 0.005);
        for _ in 0..3000 {
            bank.tick(1e-3, 25);
        }
        assert!(bank.modes()[0].magnitude() > 1.0);

        let mut synth = ModeSynth::new(48_000.0);
        synth.sync(&bank);
        let mut out = vec![0.0; 4800];
        synth.render_add(&mut out, 1.0, 1.0);

        let peak = out.iter().cloned().fold(0.0, f32::max);
        assert!(peak <= HEADROOM_CEILING + 1e-4, "peak {}", peak);
        assert!(peak > HEADROOM_CEILING * 0.98, "clamp never engaged: {}", peak);
    }

    #[test]
    fn test_reset_phases_keeps_amplitudes() {
        let bank = sounding_bank();
        let mut synth = ModeSynth::new(48_000.0);
        synth.sync(&bank);
        let mut out = vec![0.0; 256];
        synth.render_add(&mut out, 1.0, 1.0);

        let amp = synth.smoothed_amp[0];
        synth.reset_phases();
        assert_eq!(synth.phase_acc[0], 0);
        assert_eq!(synth.smoothed_amp[0], amp);
    }
}
