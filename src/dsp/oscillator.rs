//! Band-limited oscillators (PolyBLEP) for the reference engine.

use std::f32::consts::TAU;

/// Waveform shapes, selected by the engine's synth-type index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Saw,
    Square,
    Triangle,
}

impl Waveform {
    /// Map a synth-type index to a shape; indices past the last wrap around.
    pub fn from_synth_type(index: usize) -> Self {
        match index % 4 {
            0 => Waveform::Sine,
            1 => Waveform::Saw,
            2 => Waveform::Square,
            _ => Waveform::Triangle,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Oscillator {
    pub waveform: Waveform,
    pub frequency: f32,
    phase: f32,
    sample_rate: f32,
}

impl Oscillator {
    pub fn new(waveform: Waveform, sample_rate: f32) -> Self {
        Oscillator {
            waveform,
            frequency: 440.0,
            phase: 0.0,
            sample_rate,
        }
    }

    fn increment(&self) -> f32 {
        (self.frequency / self.sample_rate).clamp(0.0, 0.5)
    }

    pub fn next_sample(&mut self) -> f32 {
        let inc = self.increment();
        let t = self.phase;
        let sample = match self.waveform {
            Waveform::Sine => (TAU * t).sin(),
            Waveform::Saw => 2.0 * t - 1.0 - poly_blep(t, inc),
            Waveform::Square => {
                let naive = if t < 0.5 { 1.0 } else { -1.0 };
                naive + poly_blep(t, inc) - poly_blep((t + 0.5) % 1.0, inc)
            }
            Waveform::Triangle => {
                if t < 0.5 {
                    4.0 * t - 1.0
                } else {
                    3.0 - 4.0 * t
                }
            }
        };

        self.phase += inc;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        sample
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

/// Polynomial band-limited step correction around a discontinuity at `t = 0`.
fn poly_blep(t: f32, dt: f32) -> f32 {
    if dt <= 0.0 {
        0.0
    } else if t < dt {
        let t = t / dt;
        2.0 * t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + 2.0 * t + 1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(waveform: Waveform) -> f32 {
        let mut osc = Oscillator::new(waveform, 48000.0);
        osc.frequency = 440.0;
        (0..48000).map(|_| osc.next_sample().abs()).fold(0.0, f32::max)
    }

    #[test]
    fn sine_starts_at_zero() {
        let mut osc = Oscillator::new(Waveform::Sine, 48000.0);
        assert!(osc.next_sample().abs() < 1e-6);
    }

    #[test]
    fn shapes_stay_bounded() {
        assert!(peak(Waveform::Sine) <= 1.0);
        assert!(peak(Waveform::Triangle) <= 1.0);
        assert!(peak(Waveform::Saw) <= 1.5, "Saw out of range");
        assert!(peak(Waveform::Square) <= 1.5, "Square out of range");
    }

    #[test]
    fn synth_type_wraps() {
        assert_eq!(Waveform::from_synth_type(0), Waveform::Sine);
        assert_eq!(Waveform::from_synth_type(3), Waveform::Triangle);
        assert_eq!(Waveform::from_synth_type(5), Waveform::Saw);
    }

    #[test]
    fn zero_frequency_is_silent_dc() {
        let mut osc = Oscillator::new(Waveform::Sine, 48000.0);
        osc.frequency = 0.0;
        for _ in 0..64 {
            assert_eq!(osc.next_sample(), 0.0);
        }
    }
}
