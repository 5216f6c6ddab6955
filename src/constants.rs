//! Centralized constants for the resonet engine.
//! Contains only the constants that are actually used throughout the crate.

// Audio format envelope - used in engine.rs validation and synth.rs
pub const DEFAULT_SAMPLE_RATE: f32 = 48_000.0;
pub const MIN_SAMPLE_RATE: f32 = 8_000.0;
pub const MAX_SAMPLE_RATE: f32 = 192_000.0;

// Control-rate grid - used in engine.rs and voice.rs
pub const DEFAULT_CONTROL_RATE: f32 = 500.0;

// Voice pool limits - used in engine.rs and allocator.rs
pub const MODES_PER_VOICE: usize = 4;
pub const DEFAULT_POLYPHONY: usize = 16;
pub const MAX_POLYPHONY: usize = 32;

// Output stage - used in synth.rs and engine.rs
pub const DEFAULT_MASTER_GAIN: f32 = 1.0;
pub const HEADROOM_CEILING: f32 = 0.7;
pub const AMPLITUDE_SMOOTHING: f32 = 0.12;

// Excitation envelope - used in excitation.rs and engine.rs validation
pub const DEFAULT_EXCITE_SECONDS: f32 = 0.005;
pub const MIN_EXCITE_SECONDS: f32 = 0.001;
pub const MAX_EXCITE_SECONDS: f32 = 0.020;

// Voice reclamation - used in mode.rs and engine.rs
pub const DEFAULT_SILENCE_EPSILON: f32 = 1e-3;
pub const DEFAULT_SILENCE_HOLD_SECONDS: f32 = 0.050;

// Self-oscillator runaway guard - used in mode.rs
pub const SELF_OSC_CEILING_RATIO: f32 = 1.2;

// Fallback damping applied when a self-oscillator is released - used in voice.rs
pub const RELEASE_DAMPING_FLOOR: f32 = 0.5;

// Default per-voice patch - used in voice.rs
// Partial ratios: fundamental, slightly detuned octave, twelfth, sub-octave body.
pub const DEFAULT_MODE_RATIOS: [f32; MODES_PER_VOICE] = [1.0, 2.001, 3.0, 0.5];
pub const DEFAULT_MODE_DAMPINGS: [f32; MODES_PER_VOICE] = [2.0, 3.5, 5.0, 1.5];
pub const DEFAULT_MODE_WEIGHTS: [f32; MODES_PER_VOICE] = [1.0, 0.6, 0.4, 0.5];

// Control-plane plumbing - used in engine.rs
pub const CONTROL_CHANNEL_BOUND: usize = 256;
pub const RETIRED_CHANNEL_BOUND: usize = 4;

// Scratch block for chunked rendering; covers one control period at the
// highest supported sample rate (192 kHz / 500 Hz = 384 frames).
pub const RENDER_BLOCK_FRAMES: usize = 512;

// MIDI conventions - used in engine.rs validation and voice.rs
pub const MIDI_NOTE_MAX: u8 = 127;
