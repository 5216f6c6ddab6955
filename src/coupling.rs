//! The diffusive coupling driver.
//!
//! Once per control tick the driver snapshots every voice's mode 0, forms
//! the weighted neighbor differences, and queues the result as forcing for
//! the next integrator step. Only mode 0 participates; higher modes evolve
//! independently. Eligibility is a configured mode 0, not audibility, so a
//! quiet voice can be woken by its neighbors.

use num_complex::Complex32;

use crate::constants::MAX_POLYPHONY;
use crate::topology::CouplingMatrix;
use crate::types::CouplingMode;
use crate::voice::Voice;

pub struct CouplingEngine {
    matrix: Box<CouplingMatrix>,
    strength: f32,
    mode: CouplingMode,
    snapshot: [Complex32; MAX_POLYPHONY],
    eligible: [bool; MAX_POLYPHONY],
}

impl CouplingEngine {
    pub fn new(pool_size: usize) -> Self {
        Self {
            matrix: Box::new(CouplingMatrix::zeros(pool_size)),
            strength: 0.0,
            mode: CouplingMode::default(),
            snapshot: [Complex32::new(0.0, 0.0); MAX_POLYPHONY],
            eligible: [false; MAX_POLYPHONY],
        }
    }

    /// Swap in a freshly built generation and hand the retired one back so
    /// the caller can dispose of it off the audio thread.
    pub fn install(&mut self, matrix: Box<CouplingMatrix>, strength: f32) -> Box<CouplingMatrix> {
        self.strength = strength;
        std::mem::replace(&mut self.matrix, matrix)
    }

    pub fn set_mode(&mut self, mode: CouplingMode) {
        self.mode = mode;
    }

    pub fn matrix(&self) -> &CouplingMatrix {
        &self.matrix
    }

    pub fn strength(&self) -> f32 {
        self.strength
    }

    /// One coupling pass over the pool. Reads a coherent snapshot first so
    /// the pairwise differences are order-independent, then queues forcing
    /// through each voice's coupling input.
    pub fn step(&mut self, voices: &mut [Voice]) {
        if self.strength <= 0.0 {
            return;
        }
        let count = voices.len().min(self.matrix.size()).min(MAX_POLYPHONY);

        for i in 0..count {
            self.snapshot[i] = voices[i].mode0_state();
            self.eligible[i] = voices[i].mode0_active();
        }

        for i in 0..count {
            if !self.eligible[i] {
                continue;
            }
            let mut drive = 0.0;
            for j in 0..count {
                if j == i || !self.eligible[j] {
                    continue;
                }
                let weight = self.matrix.get(i, j);
                if weight <= 0.0 {
                    continue;
                }
                let difference = match self.mode {
                    CouplingMode::Magnitude => (self.snapshot[j] - self.snapshot[i]).norm(),
                    CouplingMode::Signed => self.snapshot[j].norm() - self.snapshot[i].norm(),
                };
                drive += self.strength * weight * difference;
            }
            if drive != 0.0 {
                voices[i].apply_coupling(&[drive, 0.0, 0.0, 0.0]);
            }
        }
    }
}
