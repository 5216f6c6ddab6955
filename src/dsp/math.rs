use std::f32::consts::PI;

/// Fast mathematical approximations for real-time audio processing.

const TWO_PI: f32 = 2.0 * PI;

/// Fast sine approximation using an odd polynomial after quadrant folding.
/// Accurate to better than 0.02% of full scale over [-pi, pi].
#[inline]
pub fn fast_sin(x: f32) -> f32 {
    // Range-reduce into [-pi, pi], then fold into [-pi/2, pi/2] where the
    // polynomial converges fast.
    let mut x = x % TWO_PI;
    if x > PI {
        x -= TWO_PI;
    } else if x < -PI {
        x += TWO_PI;
    }
    if x > 0.5 * PI {
        x = PI - x;
    } else if x < -0.5 * PI {
        x = -PI - x;
    }

    // sin(x) ~ x - x^3/6 + x^5/120 - x^7/5040
    let x2 = x * x;
    x * (1.0 - x2 * (1.0 / 6.0 - x2 * (1.0 / 120.0 - x2 / 5040.0)))
}

/// Convert a MIDI note number to frequency, A4 = 440 Hz at note 69.
#[inline]
pub fn midi_to_freq(note: f32) -> f32 {
    440.0 * 2.0_f32.powf((note - 69.0) / 12.0)
}

/// Hann window evaluated at normalized position t in [0, 1].
#[inline]
pub fn hann(t: f32) -> f32 {
    if !(0.0..=1.0).contains(&t) {
        return 0.0;
    }
    0.5 * (1.0 - (TWO_PI * t).cos())
}

/// Equal-power gain compensation for mixing multiple signals.
/// Returns 1/sqrt(n) so that summing n voices keeps perceptual loudness flat.
#[inline]
pub fn rms_mix_gain(num_signals: u32) -> f32 {
    if num_signals == 0 {
        1.0
    } else {
        1.0 / (num_signals as f32).sqrt()
    }
}

/// Phase increment for a 32-bit wrapping accumulator.
/// The accumulator full scale maps to one cycle, so frequency resolution is
/// sample_rate / 2^32.
#[inline]
pub fn phase_increment(freq_hz: f32, sample_rate: f32) -> u32 {
    let cycles_per_sample = (freq_hz / sample_rate) as f64;
    (cycles_per_sample * 4_294_967_296.0).round() as u64 as u32
}

/// Interpret a 32-bit phase accumulator as an angle in [0, 2*pi).
#[inline]
pub fn accumulator_to_radians(acc: u32) -> f32 {
    acc as f32 * (TWO_PI / 4_294_967_296.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_sin_accuracy() {
        // Sweep [-pi, pi]; error must stay well under 0.1% of unit amplitude.
        let steps = 4096;
        for i in 0..=steps {
            let x = -PI + (2.0 * PI) * (i as f32 / steps as f32);
            let err = (fast_sin(x) - x.sin()).abs();
            assert!(err < 1e-3, "error {} at x = {}", err, x);
        }
    }

    #[test]
    fn test_fast_sin_wraps() {
        // Values far outside [-pi, pi] reduce to the same result.
        let x = 1.3_f32;
        assert!((fast_sin(x + 2.0 * PI) - fast_sin(x)).abs() < 1e-5);
    }

    #[test]
    fn test_midi_to_freq_reference_points() {
        use approx::assert_relative_eq;
        assert_relative_eq!(midi_to_freq(69.0), 440.0, max_relative = 1e-5);
        assert_relative_eq!(midi_to_freq(57.0), 220.0, max_relative = 1e-5);
        // Middle C
        assert_relative_eq!(midi_to_freq(60.0), 261.6256, max_relative = 1e-4);
    }

    #[test]
    fn test_hann_shape() {
        assert_eq!(hann(0.0), 0.0);
        assert!((hann(0.5) - 1.0).abs() < 1e-6);
        assert!(hann(1.0).abs() < 1e-6);
        // Outside the window the contribution is zero.
        assert_eq!(hann(-0.1), 0.0);
        assert_eq!(hann(1.1), 0.0);
    }

    #[test]
    fn test_rms_mix_gain() {
        assert_eq!(rms_mix_gain(1), 1.0);
        assert!((rms_mix_gain(4) - 0.5).abs() < 1e-6);
        // Degenerate census keeps unity rather than dividing by zero.
        assert_eq!(rms_mix_gain(0), 1.0);
    }

    #[test]
    fn test_phase_increment_resolution() {
        // Quantization error of the increment is below 1e-4 Hz at 48 kHz.
        let inc = phase_increment(440.0, 48_000.0);
        let realized = inc as f64 / 4_294_967_296.0 * 48_000.0;
        assert!((realized - 440.0).abs() < 1e-4);
    }

    #[test]
    fn test_accumulator_angle_range() {
        assert_eq!(accumulator_to_radians(0), 0.0);
        let almost_full = accumulator_to_radians(u32::MAX);
        assert!(almost_full < 2.0 * PI);
        assert!(almost_full > 2.0 * PI - 1e-4);
    }
}
