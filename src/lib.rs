//! resonet: a polyphonic modal synthesis engine with networked voice
//! coupling.
//!
//! Each voice is a bank of four complex-valued damped oscillators driven by
//! excitation events; voices influence one another through a normalized,
//! topology-generated coupling matrix. The crate is the DSP core only: hosts
//! own the audio callback, MIDI parsing, and transport, and talk to the core
//! through an [`EngineController`] / [`ModalEngine`] pair built by
//! [`ModalEngine::new`].
//!
//! The audio path allocates nothing, takes no locks, and never fails; all
//! validation happens on the control side.

pub mod allocator;
pub mod constants;
pub mod coupling;
pub mod dsp;
pub mod engine;
pub mod excitation;
pub mod mode;
pub mod synth;
pub mod topology;
pub mod types;
pub mod voice;

pub use engine::{EngineConfig, EngineController, ModalEngine};
pub use excitation::PokeEvent;
pub use topology::{CouplingMatrix, Topology};
pub use types::{CouplingMode, Diagnostics, EngineError, Personality};
pub use voice::Voice;
