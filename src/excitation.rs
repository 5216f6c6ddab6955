//! Poke events and the Hann-windowed excitation envelope.
//!
//! A poke is the discrete "strike" that injects energy into a mode bank. The
//! envelope shapes it into a smooth control-rate forcing burst; only one
//! envelope is ever active per bank, and a new poke preempts the old one.

use crate::constants::{DEFAULT_EXCITE_SECONDS, MODES_PER_VOICE};
use crate::dsp::math::hann;

/// A fully resolved excitation event.
///
/// The phase is already concrete here: a host-side "random phase" request is
/// sampled on the control thread before the event is enqueued, so the audio
/// thread never touches the PRNG.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PokeEvent {
    /// Peak forcing amplitude in [0, 1].
    pub strength: f32,
    /// Injection phase in [0, 2*pi).
    pub phase: f32,
    /// Per-mode scaling of the forcing in [0, 1].
    pub weights: [f32; MODES_PER_VOICE],
}

impl PokeEvent {
    pub fn new(strength: f32, phase: f32, weights: [f32; MODES_PER_VOICE]) -> Self {
        Self {
            strength,
            phase,
            weights,
        }
    }

    /// A full-strength strike exciting all modes equally at phase zero.
    pub fn uniform(strength: f32) -> Self {
        Self::new(strength, 0.0, [1.0; MODES_PER_VOICE])
    }
}

/// Control-rate state of the active excitation burst.
#[derive(Debug, Clone, Copy)]
pub struct ExcitationEnvelope {
    strength: f32,
    phase: f32,
    weights: [f32; MODES_PER_VOICE],
    duration: f32,
    elapsed: f32,
    active: bool,
}

impl Default for ExcitationEnvelope {
    fn default() -> Self {
        Self {
            strength: 0.0,
            phase: 0.0,
            weights: [0.0; MODES_PER_VOICE],
            duration: DEFAULT_EXCITE_SECONDS,
            elapsed: 0.0,
            active: false,
        }
    }
}

impl ExcitationEnvelope {
    /// Install a new burst, replacing whatever was in flight.
    pub fn trigger(&mut self, poke: PokeEvent, duration_seconds: f32) {
        self.strength = poke.strength;
        self.phase = poke.phase;
        self.weights = poke.weights;
        self.duration = duration_seconds;
        self.elapsed = 0.0;
        self.active = true;
    }

    /// Sample the envelope for one control step and advance it.
    /// Returns the scalar forcing level; zero once the burst has finished.
    #[inline]
    pub fn tick(&mut self, dt: f32) -> f32 {
        if !self.active {
            return 0.0;
        }
        let level = self.strength * hann(self.elapsed / self.duration);
        self.elapsed += dt;
        if self.elapsed >= self.duration {
            self.active = false;
        }
        level
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[inline]
    pub fn phase(&self) -> f32 {
        self.phase
    }

    #[inline]
    pub fn weights(&self) -> &[f32; MODES_PER_VOICE] {
        &self.weights
    }

    pub fn cancel(&mut self) {
        self.active = false;
        self.elapsed = 0.0;
        self.strength = 0.0;
    }
}
