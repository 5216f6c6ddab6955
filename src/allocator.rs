//! Polyphonic voice allocation over the fixed pool.
//!
//! Note-on picks, in order: any voice that is not audible, the quietest
//! released voice, and finally the voice with the oldest note-on serial
//! (stealing). Duplicate note-ons on one pitch stack voices; note-off
//! releases the most recent holder first.

use crate::voice::Voice;

pub struct VoiceAllocator {
    voices: Vec<Voice>,
    next_serial: u64,
}

impl VoiceAllocator {
    /// Build the pool once. No voices are ever added or removed afterwards.
    pub fn new(polyphony: usize, sample_rate: f32, control_rate: f32) -> Self {
        let voices = (0..polyphony)
            .map(|i| Voice::new(i, sample_rate, control_rate))
            .collect();
        Self {
            voices,
            next_serial: 0,
        }
    }

    /// Allocate a voice for `note` and start it. Returns the pool index.
    pub fn note_on(&mut self, note: u8, velocity: f32) -> usize {
        let index = self.pick_voice();
        let serial = self.next_serial;
        self.next_serial += 1;

        let voice = &mut self.voices[index];
        voice.reset();
        voice.set_note_serial(serial);
        voice.note_on(note, velocity);
        index
    }

    fn pick_voice(&self) -> usize {
        // 1. Anything inaudible is free.
        if let Some(index) = self.voices.iter().position(|v| !v.is_active()) {
            return index;
        }

        // 2. Quietest released voice.
        let quietest = self
            .voices
            .iter()
            .filter(|v| v.is_released())
            .min_by(|a, b| {
                a.smoothed_total()
                    .partial_cmp(&b.smoothed_total())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        if let Some(voice) = quietest {
            return voice.index();
        }

        // 3. Steal the oldest note.
        self.voices
            .iter()
            .min_by_key(|v| v.note_serial())
            .map(|v| v.index())
            .unwrap_or(0)
    }

    /// Release the most recent unreleased holder of `note`. A pitch with no
    /// holder is a no-op.
    pub fn note_off(&mut self, note: u8) {
        let target = self
            .voices
            .iter()
            .filter(|v| v.note() == Some(note) && !v.is_released())
            .max_by_key(|v| v.note_serial())
            .map(|v| v.index());
        if let Some(index) = target {
            self.voices[index].note_off();
        }
    }

    /// Release every held voice.
    pub fn all_notes_off(&mut self) {
        for voice in &mut self.voices {
            if voice.note().is_some() && !voice.is_released() {
                voice.note_off();
            }
        }
    }

    /// Number of currently audible voices, the mix-scale census.
    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn voices_mut(&mut self) -> &mut [Voice] {
        &mut self.voices
    }
}
