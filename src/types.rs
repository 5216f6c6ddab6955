//! Core type definitions.
//!
//! Identifier aliases, the control-plane message set, the error surface of
//! the control entry points, and the lock-free shared state that the control
//! thread publishes to the audio thread (parameter block and diagnostic
//! counters). All types here are designed for zero-allocation use on the
//! audio path.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::constants::MODES_PER_VOICE;
use crate::excitation::PokeEvent;
use crate::topology::CouplingMatrix;

/// Index of a voice within the fixed pool.
pub type VoiceIndex = usize;

/// Index of a mode within a voice's bank, always in `0..MODES_PER_VOICE`.
pub type ModeIndex = usize;

/// How a voice's mode bank behaves between excitations.
///
/// A `Resonator` requires positive damping on every active mode and decays
/// naturally after excitation. A `SelfOscillator` may carry zero or negative
/// damping and keeps sounding until released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Personality {
    #[default]
    Resonator,
    SelfOscillator,
}

/// How inter-voice coupling input is derived from neighbor state.
///
/// `Magnitude` uses |Δa| and is strictly excitatory; `Signed` uses the
/// difference of magnitudes and can drain as well as feed a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CouplingMode {
    #[default]
    Magnitude,
    Signed,
}

/// Errors surfaced by control entry points.
///
/// Every fallible operation validates its input on the control thread and
/// reports one of these kinds before anything reaches the audio side,
/// enabling precise error reporting to the host. The audio render itself
/// never fails in-band: numeric faults there are remediated silently and
/// show up in [`DiagnosticCounters`] instead, because a real-time callback
/// must always return samples.
///
/// # Error Kinds
///
/// - **InvalidParameter**: out-of-range numeric input (rates, indices,
///   strengths, durations)
/// - **NotInitialized**: the engine half of the pair no longer exists
/// - **Unsupported**: input outside the documented envelope
/// - **ResourceExhausted**: a topology rebuild could not publish its shadow
///   generation; no other operation reports this kind
///
/// # Usage
///
/// ```rust
/// use resonet::{EngineConfig, EngineError, ModalEngine};
///
/// let (controller, _engine) = ModalEngine::new(EngineConfig::default()).unwrap();
/// match controller.note_on(64, 2.0) {
///     Err(EngineError::InvalidParameter { param, .. }) => assert_eq!(param, "velocity"),
///     other => panic!("expected a validation error, got {:?}", other),
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Out-of-range numeric input (rates, indices, strengths, durations).
    ///
    /// Carries the offending parameter name, the rejected value, and the
    /// accepted range so hosts can report the failure verbatim.
    InvalidParameter {
        param: &'static str,
        value: f64,
        reason: &'static str,
    },
    /// The controller has no live engine to talk to, either because the
    /// engine half was never built or because it has been dropped.
    NotInitialized,
    /// Input outside the documented envelope (e.g. a sample rate beyond
    /// [8 kHz, 192 kHz]).
    Unsupported { what: &'static str, value: f64 },
    /// A topology rebuild could not queue its freshly built shadow
    /// generation. The live matrix is left intact and the rebuild may be
    /// retried; no operation other than the topology publish reports this.
    ResourceExhausted { what: &'static str },
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidParameter {
                param,
                value,
                reason,
            } => {
                write!(f, "invalid parameter '{}' = {}: {}", param, value, reason)
            }
            EngineError::NotInitialized => {
                write!(f, "engine is not initialized or has shut down")
            }
            EngineError::Unsupported { what, value } => {
                write!(f, "unsupported {}: {}", what, value)
            }
            EngineError::ResourceExhausted { what } => {
                write!(f, "resource exhausted: {}", what)
            }
        }
    }
}

impl std::error::Error for EngineError {}

/// Commands shipped from the control thread to the audio thread.
///
/// Every variant is validated before it is enqueued; the audio side applies
/// them unconditionally at the top of the next render call, so a render
/// observes a snapshot-consistent state. A note-on issued concurrently with
/// a render may or may not land in that buffer, but no split state is ever
/// observed.
///
/// # Message Types
///
/// - **NoteOn / NoteOff / AllNotesOff**: voice allocation, release, and the
///   panic-style sweep
/// - **Poke**: a fully resolved excitation event for one voice
/// - **SetTopology / SetCouplingMode**: a new coupling matrix generation,
///   and the difference form the coupling step applies
/// - **SetVoiceMode / SetPersonality**: per-voice patch edits
/// - **SetSampleRate / SetExcitationDuration / ResetPhases**: engine-wide
///   rendering parameters
///
/// # Performance Notes
///
/// The only heap payload is the boxed coupling matrix, allocated on the
/// control thread. The audio side swaps the box pointer in whole and ships
/// the retired generation back over a return channel, so applying any
/// message is allocation-free on the audio path.
#[derive(Debug)]
pub enum ControlMessage {
    NoteOn {
        note: u8,
        velocity: f32,
    },
    NoteOff {
        note: u8,
    },
    Poke {
        voice: VoiceIndex,
        poke: PokeEvent,
    },
    /// A freshly built, normalized matrix generation. Built and boxed on the
    /// control thread; the audio side swaps it in whole.
    SetTopology {
        matrix: Box<CouplingMatrix>,
        strength: f32,
    },
    SetCouplingMode {
        mode: CouplingMode,
    },
    SetVoiceMode {
        voice: VoiceIndex,
        mode: ModeIndex,
        freq_hz: f32,
        damping: f32,
        weight: f32,
    },
    SetPersonality {
        voice: VoiceIndex,
        personality: Personality,
    },
    SetSampleRate {
        sample_rate: f32,
    },
    SetExcitationDuration {
        seconds: f32,
    },
    ResetPhases,
    AllNotesOff,
}

/// An `f32` stored in an `AtomicU32`, for single-writer parameter publication.
pub(crate) struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub(crate) fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub(crate) fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub(crate) fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Parameters the control thread may change at any time and the audio thread
/// reads every block. Monotonic or clamped values only, so a torn read across
/// a block boundary is benign.
pub(crate) struct SharedParams {
    pub(crate) master_gain: AtomicF32,
    pub(crate) muted: AtomicBool,
    pub(crate) silence_epsilon: AtomicF32,
    pub(crate) silence_hold_seconds: AtomicF32,
}

impl SharedParams {
    pub(crate) fn new(
        master_gain: f32,
        silence_epsilon: f32,
        silence_hold_seconds: f32,
    ) -> Self {
        Self {
            master_gain: AtomicF32::new(master_gain),
            muted: AtomicBool::new(false),
            silence_epsilon: AtomicF32::new(silence_epsilon),
            silence_hold_seconds: AtomicF32::new(silence_hold_seconds),
        }
    }
}

/// Numeric-fault accounting, incremented on the audio thread and read from
/// the control thread. Never logged from the audio thread.
#[derive(Default)]
pub struct DiagnosticCounters {
    non_finite_samples: AtomicU64,
    mode_state_resets: AtomicU64,
}

impl DiagnosticCounters {
    #[inline]
    pub(crate) fn count_non_finite_sample(&self) {
        self.non_finite_samples.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn count_mode_state_reset(&self) {
        self.mode_state_resets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Diagnostics {
        Diagnostics {
            non_finite_samples: self.non_finite_samples.load(Ordering::Relaxed),
            mode_state_resets: self.mode_state_resets.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of the fault counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Diagnostics {
    /// Output samples that were non-finite and replaced by silence.
    pub non_finite_samples: u64,
    /// Mode states that went non-finite and were reset to zero.
    pub mode_state_resets: u64,
}

/// A real forcing vector, one entry per mode, added to the next control step.
pub type CouplingInput = [f32; MODES_PER_VOICE];
