//! A voice: one mode bank, one synthesizer, and the note lifecycle tying
//! them together.
//!
//! The voice owns the per-note patch (partial ratios, dampings, weights) and
//! derives mode frequencies from MIDI pitch on note-on. Rendering can run
//! standalone through [`Voice::render`], which steps the control-rate grid
//! internally with a fractional-sample residue; the engine instead drives
//! [`Voice::control_tick`] on its own grid so coupling stays in lockstep
//! across the pool.

use num_complex::Complex32;

use std::f32::consts::TAU;

use crate::constants::{
    DEFAULT_EXCITE_SECONDS, DEFAULT_MODE_DAMPINGS, DEFAULT_MODE_RATIOS, DEFAULT_MODE_WEIGHTS,
    DEFAULT_SILENCE_EPSILON, DEFAULT_SILENCE_HOLD_SECONDS, MODES_PER_VOICE, RELEASE_DAMPING_FLOOR,
};
use crate::dsp::math::midi_to_freq;
use crate::excitation::PokeEvent;
use crate::mode::ModeBank;
use crate::synth::ModeSynth;
use crate::types::{CouplingInput, Personality, VoiceIndex};

/// A single sounding note: one mode bank plus one synthesizer.
///
/// `Voice` owns the per-note patch (partial ratios, dampings, weights) and
/// the lifecycle that ties the control-rate integrator to the sample-rate
/// renderer. The allocator pools voices for polyphony; each one also accepts
/// direct pokes and coupling forcing from its neighbors.
///
/// # Performance Characteristics
///
/// This implementation is built for real-time audio processing:
/// - Zero heap allocations after construction
/// - Fixed-size mode and synthesizer state for deterministic execution time
/// - Control-rate work happens only on grid ticks; per-sample work is the
///   synthesizer's smoothing and sine loop
///
/// # Architecture
///
/// Each voice consists of:
/// - **Mode bank**: four complex damped oscillators advanced by the
///   exact-exponential integrator and driven by excitation and coupling
/// - **Synthesizer**: phase accumulators and smoothed amplitudes rendering
///   the bank state at audio rate
/// - **Patch**: the ratio set, dampings, and weights re-applied on every
///   note-on
///
/// # Usage
///
/// ```rust
/// use resonet::Voice;
///
/// let mut voice = Voice::new(0, 48_000.0, 500.0);
/// voice.note_on(69, 0.9);
///
/// let mut left = [0.0f32; 256];
/// let mut right = [0.0f32; 256];
/// voice.render(&mut left, &mut right, 256);
///
/// voice.note_off();
/// assert!(voice.is_active()); // the tail keeps ringing
/// ```
pub struct Voice {
    index: VoiceIndex,
    bank: ModeBank,
    synth: ModeSynth,
    note: Option<u8>,
    velocity: f32,
    released: bool,
    /// Monotonic serial of the last note-on, the steal-priority key.
    note_serial: u64,
    control_rate: f32,
    samples_per_tick: f32,
    tick_countdown: f32,
    excite_duration: f32,
    ratios: [f32; MODES_PER_VOICE],
    dampings: [f32; MODES_PER_VOICE],
    weights: [f32; MODES_PER_VOICE],
}

impl Voice {
    pub fn new(index: VoiceIndex, sample_rate: f32, control_rate: f32) -> Self {
        Self {
            index,
            bank: ModeBank::new(Personality::default(), 1.0 / control_rate),
            synth: ModeSynth::new(sample_rate),
            note: None,
            velocity: 0.0,
            released: false,
            note_serial: 0,
            control_rate,
            samples_per_tick: sample_rate / control_rate,
            tick_countdown: 0.0,
            excite_duration: DEFAULT_EXCITE_SECONDS,
            ratios: DEFAULT_MODE_RATIOS,
            dampings: DEFAULT_MODE_DAMPINGS,
            weights: DEFAULT_MODE_WEIGHTS,
        }
    }

    /// Tune the four partials from MIDI pitch and strike the bank.
    ///
    /// Mode 0 lands on the equal-tempered pitch (A4 = 440 Hz at note 69);
    /// modes 1..3 follow the voice's ratio set. Dampings and weights come
    /// from the current patch, so a self-oscillator that was clamped
    /// positive at release gets its negative damping back here. The strike
    /// is an equal-weight poke at the note velocity.
    ///
    /// # Arguments
    ///
    /// * `note` - MIDI note number in [0, 127]
    /// * `velocity` - Strike strength in [0, 1]
    pub fn note_on(&mut self, note: u8, velocity: f32) {
        self.note = Some(note);
        self.velocity = velocity;
        self.released = false;

        let f0 = midi_to_freq(note as f32);
        for k in 0..MODES_PER_VOICE {
            self.bank.configure_mode(
                k,
                TAU * f0 * self.ratios[k],
                self.dampings[k],
                self.weights[k],
            );
        }
        self.bank.poke(PokeEvent::uniform(velocity), self.excite_duration);
    }

    /// Release the note, leaving the ringing tail.
    ///
    /// Oscillator state is untouched, so the amplitude just after release
    /// equals the amplitude just before it and resonators enter natural
    /// decay. A self-oscillator instead gets its dampings pulled positive
    /// until the next note-on, so it fades out rather than sustaining
    /// forever. The voice stays active until the tail falls below the
    /// silence threshold.
    pub fn note_off(&mut self) {
        self.released = true;
        if self.bank.personality() == Personality::SelfOscillator {
            self.bank.force_positive_damping(RELEASE_DAMPING_FLOOR);
        }
    }

    /// Reconfigure one mode at runtime. The change lands in the patch, so a
    /// following note-on keeps it.
    pub fn set_mode(&mut self, index: usize, freq_hz: f32, damping: f32, weight: f32) {
        self.dampings[index] = damping;
        self.weights[index] = weight;
        self.bank
            .configure_mode(index, TAU * freq_hz, damping, weight);
    }

    pub fn set_personality(&mut self, personality: Personality) {
        self.bank.set_personality(personality);
    }

    pub fn set_excitation_duration(&mut self, seconds: f32) {
        self.excite_duration = seconds;
    }

    pub fn poke(&mut self, poke: PokeEvent) {
        self.bank.poke(poke, self.excite_duration);
    }

    /// Queue a forcing vector for the next control step.
    ///
    /// The coupling driver calls this once per tick with the weighted
    /// neighbor differences; contributions accumulate until the next
    /// integrator step consumes them.
    #[inline]
    pub fn apply_coupling(&mut self, input: &CouplingInput) {
        self.bank.apply_coupling(input);
    }

    #[inline]
    pub fn mode0_state(&self) -> Complex32 {
        self.bank.mode0_state()
    }

    #[inline]
    pub fn mode0_active(&self) -> bool {
        self.bank.mode0_active()
    }

    /// True while the voice is audible: it has sounded since the last
    /// note-on and has not decayed below the silence threshold.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.bank.is_sounding()
    }

    #[inline]
    pub fn is_released(&self) -> bool {
        self.released
    }

    #[inline]
    pub fn note(&self) -> Option<u8> {
        self.note
    }

    #[inline]
    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    #[inline]
    pub fn note_serial(&self) -> u64 {
        self.note_serial
    }

    pub fn set_note_serial(&mut self, serial: u64) {
        self.note_serial = serial;
    }

    #[inline]
    pub fn index(&self) -> VoiceIndex {
        self.index
    }

    /// Allocator quietness metric: summed smoothed amplitudes.
    pub fn smoothed_total(&self) -> f32 {
        self.synth.smoothed_total()
    }

    pub fn bank(&self) -> &ModeBank {
        &self.bank
    }

    /// One control step plus a synthesizer snapshot. Returns the count of
    /// remediated non-finite mode states.
    pub fn control_tick(&mut self, epsilon: f32, hold_ticks: u32) -> u32 {
        let faults = self.bank.tick(epsilon, hold_ticks);
        self.synth.sync(&self.bank);
        faults
    }

    /// Add synthesized output into `out`.
    #[inline]
    pub fn render_add(&mut self, out: &mut [f32], master_gain: f32, scale: f32) {
        self.synth.render_add(out, master_gain, scale);
    }

    /// Standalone render: write `n` mono frames to both channels.
    ///
    /// The control-rate grid advances as many whole periods as elapse during
    /// the `n` frames; the fractional residue carries across calls, so
    /// long-run timing stays exact regardless of how the host sizes its
    /// buffers.
    ///
    /// # Arguments
    ///
    /// * `out_l` - Left output buffer, overwritten
    /// * `out_r` - Right output buffer, overwritten with the same mono signal
    /// * `n` - Frame count, clamped to the shorter buffer
    ///
    /// # Performance Notes
    ///
    /// No heap allocation: samples are written chunk-wise between grid
    /// ticks, directly into the caller's buffers.
    pub fn render(&mut self, out_l: &mut [f32], out_r: &mut [f32], n: usize) {
        let n = n.min(out_l.len()).min(out_r.len());
        let hold_ticks = (DEFAULT_SILENCE_HOLD_SECONDS * self.control_rate).round() as u32;

        out_l[..n].fill(0.0);
        let mut pos = 0;
        while pos < n {
            if self.tick_countdown <= 0.0 {
                self.control_tick(DEFAULT_SILENCE_EPSILON, hold_ticks);
                self.tick_countdown += self.samples_per_tick;
            }
            let run = (self.tick_countdown.ceil() as usize).min(n - pos);
            self.render_add(&mut out_l[pos..pos + run], 1.0, 1.0);
            self.tick_countdown -= run as f32;
            pos += run;
        }
        out_r[..n].copy_from_slice(&out_l[..n]);
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.samples_per_tick = sample_rate / self.control_rate;
        self.tick_countdown = self.tick_countdown.min(self.samples_per_tick);
        self.synth.set_sample_rate(sample_rate);
    }

    pub fn reset_phases(&mut self) {
        self.synth.reset_phases();
    }

    /// Full reclaim: dynamics zeroed, note binding cleared, patch kept.
    pub fn reset(&mut self) {
        self.bank.reset_states();
        self.synth.reset();
        self.note = None;
        self.velocity = 0.0;
        self.released = false;
        self.tick_countdown = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::BankState;

    fn voice() -> Voice {
        Voice::new(0, 48_000.0, 500.0)
    }

    #[test]
    fn test_note_on_tunes_harmonic_stack() {
        let mut v = voice();
        v.note_on(69, 0.9);
        let omegas: Vec<f32> = v.bank().modes().iter().map(|m| m.omega()).collect();
        for (k, ratio) in DEFAULT_MODE_RATIOS.iter().enumerate() {
            let expected = TAU * 440.0 * ratio;
            assert!(
                (omegas[k] - expected).abs() < 1e-2,
                "mode {} at {} expected {}",
                k,
                omegas[k],
                expected
            );
        }
        assert_eq!(v.note(), Some(69));
        assert!(v.is_active());
    }

    #[test]
    fn test_note_off_keeps_ringing_state() {
        let mut v = voice();
        v.note_on(60, 1.0);
        let mut l = vec![0.0; 4800];
        let mut r = vec![0.0; 4800];
        v.render(&mut l, &mut r, 4800);

        let before = v.mode0_state().norm();
        v.note_off();
        let after = v.mode0_state().norm();
        assert_eq!(before, after);
        assert!(v.is_released());
        assert!(v.is_active());
    }

    #[test]
    fn test_self_oscillator_release_clamps_damping() {
        let mut v = voice();
        v.set_personality(Personality::SelfOscillator);
        v.set_mode(0, 220.0, -2.0, 1.0);
        v.note_on(57, 1.0);
        assert!(v.bank().modes()[0].damping() < 0.0);
        v.note_off();
        assert!(v.bank().modes()[0].damping() > 0.0);

        // A fresh note-on restores the stored patch damping.
        v.note_on(57, 1.0);
        assert_eq!(v.bank().modes()[0].damping(), -2.0);
    }

    #[test]
    fn test_render_residue_across_calls() {
        let mut v = voice();
        v.note_on(69, 1.0);
        let mut l = vec![0.0; 128];
        let mut r = vec![0.0; 128];

        // 96 samples per control period at 48 kHz / 500 Hz.
        v.render(&mut l, &mut r, 100);
        v.render(&mut l, &mut r, 92);
        assert_eq!(v.bank().steps(), 2);
        v.render(&mut l, &mut r, 1);
        assert_eq!(v.bank().steps(), 3);
    }

    #[test]
    fn test_render_copies_mono_to_both_channels() {
        let mut v = voice();
        v.note_on(64, 1.0);
        let mut l = vec![0.0; 960];
        let mut r = vec![0.0; 960];
        v.render(&mut l, &mut r, 960);
        assert_eq!(l, r);
        assert!(l.iter().any(|s| s.abs() > 0.0));
    }

    #[test]
    fn test_reset_clears_note_and_dynamics() {
        let mut v = voice();
        v.note_on(72, 0.7);
        let mut l = vec![0.0; 960];
        let mut r = vec![0.0; 960];
        v.render(&mut l, &mut r, 960);

        v.reset();
        assert_eq!(v.note(), None);
        assert!(!v.is_active());
        assert_eq!(v.mode0_state().norm(), 0.0);
        assert_eq!(v.bank().state(), BankState::Idle);
    }
}
