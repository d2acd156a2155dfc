//! Basic oscillator implementation

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Waveform types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Waveform {
    /// Every waveform, in selector order
    pub const ALL: [Waveform; 4] = [
        Waveform::Sine,
        Waveform::Square,
        Waveform::Sawtooth,
        Waveform::Triangle,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Waveform::Sine => "sine",
            Waveform::Square => "square",
            Waveform::Sawtooth => "sawtooth",
            Waveform::Triangle => "triangle",
        }
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown waveform '{0}' (expected sine, square, sawtooth or triangle)")]
pub struct ParseWaveformError(String);

impl FromStr for Waveform {
    type Err = ParseWaveformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sine" => Ok(Waveform::Sine),
            "square" => Ok(Waveform::Square),
            "sawtooth" | "saw" => Ok(Waveform::Sawtooth),
            "triangle" => Ok(Waveform::Triangle),
            _ => Err(ParseWaveformError(s.to_string())),
        }
    }
}

/// A periodic oscillator with a fixed waveform and frequency
pub struct Oscillator {
    waveform: Waveform,
    phase: f64,
    frequency: f64,
    sample_rate: f64,
}

impl Oscillator {
    /// Create a new oscillator
    pub fn new(waveform: Waveform, frequency: f64, sample_rate: f64) -> Self {
        Self {
            waveform,
            phase: 0.0,
            frequency,
            sample_rate,
        }
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Generate the next sample in -1.0..=1.0
    pub fn generate(&mut self) -> f64 {
        let sample = match self.waveform {
            Waveform::Sine => (self.phase * 2.0 * PI).sin(),
            Waveform::Square => {
                if self.phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0 * self.phase - 1.0,
            Waveform::Triangle => {
                let p = self.phase;
                if p < 0.25 {
                    4.0 * p
                } else if p < 0.75 {
                    2.0 - 4.0 * p
                } else {
                    4.0 * p - 4.0
                }
            }
        };

        self.phase += self.frequency / self.sample_rate;
        self.phase -= self.phase.floor();

        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sine_oscillator() {
        let mut osc = Oscillator::new(Waveform::Sine, 440.0, 44100.0);

        // First sample should be 0 (sin(0))
        let sample = osc.generate();
        assert!((sample - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_square_oscillator() {
        let mut osc = Oscillator::new(Waveform::Square, 1.0, 4.0);

        // 4 samples per cycle at 1 Hz, 4 Hz sample rate
        assert_eq!(osc.generate(), 1.0);
        assert_eq!(osc.generate(), 1.0);
        assert_eq!(osc.generate(), -1.0);
        assert_eq!(osc.generate(), -1.0);
        assert_eq!(osc.generate(), 1.0);
    }

    #[test]
    fn test_sawtooth_oscillator() {
        let mut osc = Oscillator::new(Waveform::Sawtooth, 1.0, 4.0);

        assert_eq!(osc.generate(), -1.0);
        assert_eq!(osc.generate(), -0.5);
        assert_eq!(osc.generate(), 0.0);
        assert_eq!(osc.generate(), 0.5);
    }

    #[test]
    fn test_triangle_oscillator() {
        let mut osc = Oscillator::new(Waveform::Triangle, 1.0, 4.0);

        assert_eq!(osc.generate(), 0.0);
        assert_eq!(osc.generate(), 1.0);
        assert_eq!(osc.generate(), 0.0);
        assert_eq!(osc.generate(), -1.0);
    }

    #[test]
    fn test_phase_wraps_above_nyquist() {
        let mut osc = Oscillator::new(Waveform::Sawtooth, 30000.0, 44100.0);
        for _ in 0..1000 {
            let sample = osc.generate();
            assert!((-1.0..=1.0).contains(&sample), "Sample out of range: {}", sample);
        }
    }

    #[test]
    fn test_parse_waveform() {
        assert_eq!("sine".parse::<Waveform>(), Ok(Waveform::Sine));
        assert_eq!("Square".parse::<Waveform>(), Ok(Waveform::Square));
        assert_eq!("saw".parse::<Waveform>(), Ok(Waveform::Sawtooth));
        assert_eq!(" triangle ".parse::<Waveform>(), Ok(Waveform::Triangle));
        assert!("noise".parse::<Waveform>().is_err());

        for waveform in Waveform::ALL {
            assert_eq!(waveform.to_string().parse::<Waveform>(), Ok(waveform));
        }
    }
}
