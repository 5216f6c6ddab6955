//! The engine pair: an audio-side renderer and a control-side handle.
//!
//! [`ModalEngine::new`] builds both halves around a bounded message channel.
//! The [`ModalEngine`] lives on the audio thread and owns every sample of
//! DSP state; the [`EngineController`] lives on the control thread, validates
//! every entry point, owns the PRNG, and publishes changes either through
//! lock-free atomics (gain, mute, thresholds) or as messages drained at the
//! top of the next render call. Neither side ever blocks the other, and the
//! audio path performs no allocation.

use std::f32::consts::TAU;
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::allocator::VoiceAllocator;
use crate::constants::{
    CONTROL_CHANNEL_BOUND, DEFAULT_CONTROL_RATE, DEFAULT_EXCITE_SECONDS, DEFAULT_MASTER_GAIN,
    DEFAULT_POLYPHONY, DEFAULT_SAMPLE_RATE, DEFAULT_SILENCE_EPSILON, DEFAULT_SILENCE_HOLD_SECONDS,
    MAX_EXCITE_SECONDS, MAX_POLYPHONY, MAX_SAMPLE_RATE, MIDI_NOTE_MAX, MIN_EXCITE_SECONDS,
    MIN_SAMPLE_RATE, MODES_PER_VOICE, RENDER_BLOCK_FRAMES, RETIRED_CHANNEL_BOUND,
};
use crate::coupling::CouplingEngine;
use crate::dsp::math::rms_mix_gain;
use crate::excitation::PokeEvent;
use crate::topology::{CouplingMatrix, Topology};
use crate::types::{
    ControlMessage, CouplingMode, DiagnosticCounters, Diagnostics, EngineError, Personality,
    SharedParams, VoiceIndex,
};
use crate::voice::Voice;

// Real-time safe logging. The audio side may only speak through this macro,
// which compiles to nothing under the default feature.
#[cfg(feature = "rt-safe")]
macro_rules! rt_eprintln {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "rt-safe"))]
macro_rules! rt_eprintln {
    ($($arg:tt)*) => {
        eprintln!($($arg)*);
    };
}

/// Everything needed to build an engine pair. Hosts may persist this record
/// verbatim; it serializes as a flat struct.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub sample_rate: f32,
    pub polyphony: usize,
    pub master_gain: f32,
    pub control_rate: f32,
    pub excite_seconds: f32,
    pub silence_epsilon: f32,
    pub silence_hold_seconds: f32,
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            polyphony: DEFAULT_POLYPHONY,
            master_gain: DEFAULT_MASTER_GAIN,
            control_rate: DEFAULT_CONTROL_RATE,
            excite_seconds: DEFAULT_EXCITE_SECONDS,
            silence_epsilon: DEFAULT_SILENCE_EPSILON,
            silence_hold_seconds: DEFAULT_SILENCE_HOLD_SECONDS,
            seed: 0x5EED,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.sample_rate.is_finite()
            || !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate)
        {
            return Err(EngineError::Unsupported {
                what: "sample rate",
                value: self.sample_rate as f64,
            });
        }
        if self.polyphony == 0 || self.polyphony > MAX_POLYPHONY {
            return Err(EngineError::InvalidParameter {
                param: "polyphony",
                value: self.polyphony as f64,
                reason: "must lie in [1, 32]",
            });
        }
        if !self.control_rate.is_finite() || self.control_rate <= 0.0 {
            return Err(EngineError::InvalidParameter {
                param: "control_rate",
                value: self.control_rate as f64,
                reason: "the control timestep must be positive",
            });
        }
        if !(MIN_EXCITE_SECONDS..=MAX_EXCITE_SECONDS).contains(&self.excite_seconds) {
            return Err(EngineError::InvalidParameter {
                param: "excite_seconds",
                value: self.excite_seconds as f64,
                reason: "must lie in [0.001, 0.020]",
            });
        }
        if !self.silence_epsilon.is_finite() || self.silence_epsilon <= 0.0 {
            return Err(EngineError::InvalidParameter {
                param: "silence_epsilon",
                value: self.silence_epsilon as f64,
                reason: "must be positive",
            });
        }
        if !self.silence_hold_seconds.is_finite() || self.silence_hold_seconds < 0.0 {
            return Err(EngineError::InvalidParameter {
                param: "silence_hold_seconds",
                value: self.silence_hold_seconds as f64,
                reason: "must not be negative",
            });
        }
        Ok(())
    }
}

/// Audio-side half: owns the voice pool, the coupling engine, and the
/// control-rate grid. Drive it from the audio callback via [`render`].
///
/// [`render`]: ModalEngine::render
pub struct ModalEngine {
    allocator: VoiceAllocator,
    coupling: CouplingEngine,
    shared: Arc<SharedParams>,
    counters: Arc<DiagnosticCounters>,
    control_rx: Receiver<ControlMessage>,
    retired_tx: Sender<Box<CouplingMatrix>>,
    sample_rate: f32,
    control_rate: f32,
    samples_per_tick: f32,
    tick_countdown: f32,
    scratch: Box<[f32]>,
}

impl ModalEngine {
    /// Build the engine pair. The returned controller stays on the control
    /// thread; the engine moves to wherever the audio callback runs.
    pub fn new(config: EngineConfig) -> Result<(EngineController, ModalEngine), EngineError> {
        config.validate()?;

        let shared = Arc::new(SharedParams::new(
            config.master_gain.clamp(0.0, 1.0),
            config.silence_epsilon,
            config.silence_hold_seconds,
        ));
        let counters = Arc::new(DiagnosticCounters::default());
        let (control_tx, control_rx) = bounded(CONTROL_CHANNEL_BOUND);
        let (retired_tx, retired_rx) = bounded(RETIRED_CHANNEL_BOUND);

        let mut allocator =
            VoiceAllocator::new(config.polyphony, config.sample_rate, config.control_rate);
        for voice in allocator.voices_mut() {
            voice.set_excitation_duration(config.excite_seconds);
        }

        let engine = ModalEngine {
            coupling: CouplingEngine::new(config.polyphony),
            allocator,
            shared: Arc::clone(&shared),
            counters: Arc::clone(&counters),
            control_rx,
            retired_tx,
            sample_rate: config.sample_rate,
            control_rate: config.control_rate,
            samples_per_tick: config.sample_rate / config.control_rate,
            tick_countdown: 0.0,
            scratch: vec![0.0; RENDER_BLOCK_FRAMES].into_boxed_slice(),
        };

        let controller = EngineController {
            tx: control_tx,
            shared,
            counters,
            retired_rx,
            rng: StdRng::seed_from_u64(config.seed),
            polyphony: config.polyphony,
            personalities: vec![Personality::default(); config.polyphony],
        };

        Ok((controller, engine))
    }

    /// Fill both channels with the next `n` frames of audio.
    ///
    /// Pending control messages are applied first, so a render observes a
    /// snapshot-consistent state. The control-rate grid advances in lockstep:
    /// whole periods elapsed during the buffer tick the integrator and the
    /// coupling engine, and the fractional residue carries to the next call.
    /// Never fails; numeric faults become silence and a counter increment.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        self.drain_messages();

        let n = left.len().min(right.len());
        if n == 0 {
            return;
        }

        if self.shared.muted.load(std::sync::atomic::Ordering::Relaxed) {
            // Frozen, not just quiet: neither phase accumulators nor the
            // control grid advance, so unmute resumes exactly where the
            // sound stopped.
            left[..n].fill(0.0);
            right[..n].fill(0.0);
            return;
        }

        let master_gain = self.shared.master_gain.load();
        let epsilon = self.shared.silence_epsilon.load();
        let hold_ticks = (self.shared.silence_hold_seconds.load() * self.control_rate)
            .round()
            .max(1.0) as u32;

        let mut pos = 0;
        while pos < n {
            if self.tick_countdown <= 0.0 {
                self.control_tick(epsilon, hold_ticks);
                self.tick_countdown += self.samples_per_tick;
            }
            let run = (self.tick_countdown.ceil() as usize)
                .min(n - pos)
                .min(self.scratch.len());

            let scratch = &mut self.scratch[..run];
            scratch.fill(0.0);

            // Every voice renders; activity only drives the mix census, so
            // a tail that has slipped under the silence threshold still
            // fades out instead of being cut.
            let scale = rms_mix_gain(self.allocator.active_count() as u32);
            for voice in self.allocator.voices_mut() {
                voice.render_add(scratch, master_gain, scale);
            }

            for (offset, sample) in scratch.iter().enumerate() {
                let value = if sample.is_finite() {
                    *sample
                } else {
                    self.counters.count_non_finite_sample();
                    0.0
                };
                left[pos + offset] = value;
                right[pos + offset] = value;
            }

            self.tick_countdown -= run as f32;
            pos += run;
        }
    }

    fn control_tick(&mut self, epsilon: f32, hold_ticks: u32) {
        self.coupling.step(self.allocator.voices_mut());
        let mut faults = 0;
        for voice in self.allocator.voices_mut() {
            faults += voice.control_tick(epsilon, hold_ticks);
        }
        for _ in 0..faults {
            self.counters.count_mode_state_reset();
        }
    }

    fn drain_messages(&mut self) {
        while let Ok(message) = self.control_rx.try_recv() {
            self.apply(message);
        }
    }

    fn apply(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::NoteOn { note, velocity } => {
                self.allocator.note_on(note, velocity);
            }
            ControlMessage::NoteOff { note } => {
                self.allocator.note_off(note);
            }
            ControlMessage::Poke { voice, poke } => {
                if let Some(target) = self.allocator.voices_mut().get_mut(voice) {
                    target.poke(poke);
                }
            }
            ControlMessage::SetTopology { matrix, strength } => {
                let retired = self.coupling.install(matrix, strength);
                if self.retired_tx.try_send(retired).is_err() {
                    // The return lane is full; the box drops here. Rare, and
                    // preferable to stalling the callback.
                    rt_eprintln!("resonet: retired matrix dropped on audio thread");
                }
            }
            ControlMessage::SetCouplingMode { mode } => {
                self.coupling.set_mode(mode);
            }
            ControlMessage::SetVoiceMode {
                voice,
                mode,
                freq_hz,
                damping,
                weight,
            } => {
                if let Some(target) = self.allocator.voices_mut().get_mut(voice) {
                    target.set_mode(mode, freq_hz, damping, weight);
                }
            }
            ControlMessage::SetPersonality { voice, personality } => {
                if let Some(target) = self.allocator.voices_mut().get_mut(voice) {
                    target.set_personality(personality);
                }
            }
            ControlMessage::SetSampleRate { sample_rate } => {
                self.sample_rate = sample_rate;
                self.samples_per_tick = sample_rate / self.control_rate;
                self.tick_countdown = self.tick_countdown.min(self.samples_per_tick);
                for voice in self.allocator.voices_mut() {
                    voice.set_sample_rate(sample_rate);
                }
            }
            ControlMessage::SetExcitationDuration { seconds } => {
                for voice in self.allocator.voices_mut() {
                    voice.set_excitation_duration(seconds);
                }
            }
            ControlMessage::ResetPhases => {
                for voice in self.allocator.voices_mut() {
                    voice.reset_phases();
                }
            }
            ControlMessage::AllNotesOff => {
                self.allocator.all_notes_off();
            }
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn control_rate(&self) -> f32 {
        self.control_rate
    }

    /// The live coupling generation. Read-only; rebuilt generations arrive
    /// whole through the control channel.
    pub fn coupling_matrix(&self) -> &CouplingMatrix {
        self.coupling.matrix()
    }

    pub fn voices(&self) -> &[Voice] {
        self.allocator.voices()
    }
}

/// Control-side half: validates every operation, owns the PRNG, and
/// publishes to the audio side without ever blocking it.
pub struct EngineController {
    tx: Sender<ControlMessage>,
    shared: Arc<SharedParams>,
    counters: Arc<DiagnosticCounters>,
    retired_rx: Receiver<Box<CouplingMatrix>>,
    rng: StdRng,
    polyphony: usize,
    /// Mirror of each voice's personality so damping validation can happen
    /// here, before anything reaches the audio thread.
    personalities: Vec<Personality>,
}

impl EngineController {
    /// Ship an event to the audio side, best-effort under queue pressure.
    ///
    /// The audio side drains the queue at the top of every render call, so
    /// saturation is transient; when it happens the event is dropped with a
    /// control-side warning rather than blocking, and the call still
    /// succeeds. Only a vanished engine is an error here. The topology
    /// publish does not route through this helper because its failure
    /// contract is stricter (see [`EngineController::set_topology`]).
    fn send(&self, message: ControlMessage) -> Result<(), EngineError> {
        // Dispose of retired matrix generations on this side of the fence.
        while self.retired_rx.try_recv().is_ok() {}

        match self.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(message)) => {
                log::warn!("control queue full, dropping {:?}", message);
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(EngineError::NotInitialized),
        }
    }

    pub fn note_on(&self, note: u8, velocity: f32) -> Result<(), EngineError> {
        check_note(note)?;
        check_unit("velocity", velocity)?;
        self.send(ControlMessage::NoteOn { note, velocity })
    }

    pub fn note_off(&self, note: u8) -> Result<(), EngineError> {
        check_note(note)?;
        self.send(ControlMessage::NoteOff { note })
    }

    /// Strike one voice directly. A negative `phase_hint` requests a random
    /// injection phase, drawn here so the audio thread never touches the
    /// PRNG.
    pub fn poke(
        &mut self,
        voice: VoiceIndex,
        strength: f32,
        phase_hint: f32,
        weights: [f32; MODES_PER_VOICE],
    ) -> Result<(), EngineError> {
        self.check_voice(voice)?;
        check_unit("strength", strength)?;
        for &weight in &weights {
            check_unit("mode weight", weight)?;
        }
        let phase = if phase_hint < 0.0 {
            self.rng.random::<f32>() * TAU
        } else if phase_hint < TAU {
            phase_hint
        } else {
            return Err(EngineError::InvalidParameter {
                param: "phase_hint",
                value: phase_hint as f64,
                reason: "must lie in [0, 2*pi) or be negative for random",
            });
        };
        self.send(ControlMessage::Poke {
            voice,
            poke: PokeEvent::new(strength, phase, weights),
        })
    }

    /// Build, normalize, and publish a coupling matrix for `spec`. The live
    /// matrix is untouched if validation or publication fails.
    ///
    /// This is the one operation that reports
    /// [`EngineError::ResourceExhausted`]: a freshly built generation that
    /// cannot be queued is discarded whole, the audio side keeps its current
    /// matrix, and the caller may retry. Other control events are
    /// best-effort under queue pressure instead (see `send`).
    pub fn set_topology(&mut self, spec: Topology, strength: f32) -> Result<(), EngineError> {
        check_unit("coupling strength", strength)?;
        spec.validate(self.polyphony)?;

        while self.retired_rx.try_recv().is_ok() {}

        let matrix = Box::new(CouplingMatrix::build(&spec, self.polyphony, &mut self.rng));
        log::debug!("publishing {} topology over {} voices", spec, self.polyphony);
        match self
            .tx
            .try_send(ControlMessage::SetTopology { matrix, strength })
        {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(EngineError::ResourceExhausted {
                what: "shadow topology generation",
            }),
            Err(TrySendError::Disconnected(_)) => Err(EngineError::NotInitialized),
        }
    }

    pub fn set_coupling_mode(&self, mode: CouplingMode) -> Result<(), EngineError> {
        self.send(ControlMessage::SetCouplingMode { mode })
    }

    pub fn set_voice_mode(
        &self,
        voice: VoiceIndex,
        mode: usize,
        freq_hz: f32,
        damping: f32,
        weight: f32,
    ) -> Result<(), EngineError> {
        self.check_voice(voice)?;
        if mode >= MODES_PER_VOICE {
            return Err(EngineError::InvalidParameter {
                param: "mode",
                value: mode as f64,
                reason: "mode index must lie in [0, 3]",
            });
        }
        if !freq_hz.is_finite() || freq_hz <= 0.0 {
            return Err(EngineError::InvalidParameter {
                param: "freq_hz",
                value: freq_hz as f64,
                reason: "must be positive",
            });
        }
        if !damping.is_finite() {
            return Err(EngineError::InvalidParameter {
                param: "damping",
                value: damping as f64,
                reason: "must be finite",
            });
        }
        if self.personalities[voice] == Personality::Resonator && damping <= 0.0 {
            return Err(EngineError::InvalidParameter {
                param: "damping",
                value: damping as f64,
                reason: "resonator modes need positive damping",
            });
        }
        check_unit("weight", weight)?;
        self.send(ControlMessage::SetVoiceMode {
            voice,
            mode,
            freq_hz,
            damping,
            weight,
        })
    }

    pub fn set_personality(
        &mut self,
        voice: VoiceIndex,
        personality: Personality,
    ) -> Result<(), EngineError> {
        self.check_voice(voice)?;
        self.send(ControlMessage::SetPersonality { voice, personality })?;
        self.personalities[voice] = personality;
        Ok(())
    }

    pub fn set_sample_rate(&self, sample_rate: f32) -> Result<(), EngineError> {
        if !sample_rate.is_finite() || !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
            return Err(EngineError::Unsupported {
                what: "sample rate",
                value: sample_rate as f64,
            });
        }
        log::debug!("sample rate change to {} Hz", sample_rate);
        self.send(ControlMessage::SetSampleRate { sample_rate })
    }

    pub fn set_excitation_duration(&self, seconds: f32) -> Result<(), EngineError> {
        if !(MIN_EXCITE_SECONDS..=MAX_EXCITE_SECONDS).contains(&seconds) {
            return Err(EngineError::InvalidParameter {
                param: "excite_seconds",
                value: seconds as f64,
                reason: "must lie in [0.001, 0.020]",
            });
        }
        self.send(ControlMessage::SetExcitationDuration { seconds })
    }

    /// Clamped to [0, 1] and visible to the very next sample.
    pub fn set_master_gain(&self, gain: f32) {
        self.shared.master_gain.store(gain.clamp(0.0, 1.0));
    }

    /// Idempotent output freeze, visible to the very next render call.
    pub fn set_mute(&self, muted: bool) {
        self.shared
            .muted
            .store(muted, std::sync::atomic::Ordering::Relaxed);
    }

    /// Reconfigure voice reclamation: state magnitude below `epsilon` for
    /// `hold_seconds` marks a voice silent.
    pub fn set_silence_threshold(
        &self,
        epsilon: f32,
        hold_seconds: f32,
    ) -> Result<(), EngineError> {
        if !epsilon.is_finite() || epsilon <= 0.0 {
            return Err(EngineError::InvalidParameter {
                param: "epsilon",
                value: epsilon as f64,
                reason: "must be positive",
            });
        }
        if !hold_seconds.is_finite() || hold_seconds < 0.0 {
            return Err(EngineError::InvalidParameter {
                param: "hold_seconds",
                value: hold_seconds as f64,
                reason: "must not be negative",
            });
        }
        self.shared.silence_epsilon.store(epsilon);
        self.shared.silence_hold_seconds.store(hold_seconds);
        Ok(())
    }

    pub fn reset_phases(&self) -> Result<(), EngineError> {
        self.send(ControlMessage::ResetPhases)
    }

    pub fn all_notes_off(&self) -> Result<(), EngineError> {
        self.send(ControlMessage::AllNotesOff)
    }

    /// Reseed the PRNG behind topology rewiring and random phase hints.
    pub fn set_seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Snapshot of the audio thread's numeric-fault counters.
    pub fn diagnostics(&self) -> Diagnostics {
        self.counters.snapshot()
    }

    pub fn polyphony(&self) -> usize {
        self.polyphony
    }

    fn check_voice(&self, voice: VoiceIndex) -> Result<(), EngineError> {
        if voice >= self.polyphony {
            return Err(EngineError::InvalidParameter {
                param: "voice",
                value: voice as f64,
                reason: "voice index must address a pool voice",
            });
        }
        Ok(())
    }
}

fn check_note(note: u8) -> Result<(), EngineError> {
    if note > MIDI_NOTE_MAX {
        return Err(EngineError::InvalidParameter {
            param: "note",
            value: note as f64,
            reason: "MIDI note must lie in [0, 127]",
        });
    }
    Ok(())
}

fn check_unit(param: &'static str, value: f32) -> Result<(), EngineError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(EngineError::InvalidParameter {
            param,
            value: value as f64,
            reason: "must lie in [0, 1]",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (EngineController, ModalEngine) {
        ModalEngine::new(EngineConfig::default()).unwrap()
    }

    fn render_seconds(engine: &mut ModalEngine, seconds: f32) -> Vec<f32> {
        let frames = (seconds * engine.sample_rate()) as usize;
        let mut left = vec![0.0; frames];
        let mut right = vec![0.0; frames];
        let mut pos = 0;
        while pos < frames {
            let run = (frames - pos).min(256);
            engine.render(
                &mut left[pos..pos + run],
                &mut right[pos..pos + run],
            );
            pos += run;
        }
        left
    }

    #[test]
    fn test_config_validation() {
        let bad_rate = EngineConfig {
            sample_rate: 4_000.0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            ModalEngine::new(bad_rate),
            Err(EngineError::Unsupported { .. })
        ));

        let bad_polyphony = EngineConfig {
            polyphony: 33,
            ..EngineConfig::default()
        };
        assert!(ModalEngine::new(bad_polyphony).is_err());

        let zero_timestep = EngineConfig {
            control_rate: 0.0,
            ..EngineConfig::default()
        };
        assert!(ModalEngine::new(zero_timestep).is_err());
    }

    #[test]
    fn test_note_on_is_audible_next_render() {
        let (controller, mut engine) = pair();
        controller.note_on(69, 1.0).unwrap();
        let out = render_seconds(&mut engine, 0.1);
        assert!(out.iter().any(|s| s.abs() > 0.0));
        // Every emitted sample stays finite and inside full scale.
        assert!(out.iter().all(|s| s.is_finite() && s.abs() <= 1.0));
        assert_eq!(controller.diagnostics(), Diagnostics::default());
    }

    #[test]
    fn test_master_gain_silences_output() {
        let (controller, mut engine) = pair();
        controller.note_on(60, 1.0).unwrap();
        controller.set_master_gain(0.0);
        let out = render_seconds(&mut engine, 0.05);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_controller_validation_rejects_bad_input() {
        let (mut controller, _engine) = pair();
        assert!(controller.note_on(64, 1.5).is_err());
        assert!(controller.note_off(200).is_err());
        assert!(controller.poke(99, 1.0, 0.0, [1.0; 4]).is_err());
        assert!(controller.poke(0, 1.0, 7.0, [1.0; 4]).is_err());
        assert!(controller.set_voice_mode(0, 4, 440.0, 1.0, 1.0).is_err());
        assert!(controller.set_voice_mode(0, 0, -440.0, 1.0, 1.0).is_err());
        // Resonator voices refuse non-positive damping.
        assert!(controller.set_voice_mode(0, 0, 440.0, 0.0, 1.0).is_err());
        assert!(controller.set_sample_rate(200_000.0).is_err());
        assert!(controller.set_excitation_duration(0.5).is_err());
    }

    #[test]
    fn test_self_oscillator_permits_negative_damping() {
        let (mut controller, mut engine) = pair();
        controller
            .set_personality(0, Personality::SelfOscillator)
            .unwrap();
        controller.set_voice_mode(0, 0, 110.0, -1.0, 1.0).unwrap();
        let out = render_seconds(&mut engine, 0.01);
        assert!(out.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_controller_without_engine_reports_uninitialized() {
        let (controller, engine) = pair();
        drop(engine);
        assert_eq!(
            controller.note_on(60, 1.0),
            Err(EngineError::NotInitialized)
        );
    }

    #[test]
    fn test_topology_publish_lands_at_next_render() {
        let (mut controller, mut engine) = pair();
        controller.set_topology(Topology::Ring, 0.5).unwrap();
        let mut l = [0.0; 16];
        let mut r = [0.0; 16];
        engine.render(&mut l, &mut r);

        let matrix = engine.coupling_matrix();
        for i in 0..matrix.size() {
            assert!((matrix.row_sum(i) - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_config_serde_round_trip() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
