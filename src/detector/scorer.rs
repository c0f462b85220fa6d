//! Per-frame speech scoring

use super::SpeechProbabilities;

/// RMS level treated as certain speech by [`EnergyScorer`]
const DEFAULT_FULL_SCALE_RMS: f32 = 0.1;

/// Scores audio frames with a speech probability
pub trait SpeechScorer: Send {
    /// Score one frame
    fn score(&mut self, frame: &[f32]) -> SpeechProbabilities;

    /// Forget any state carried between frames
    fn reset(&mut self) {}
}

/// Energy-based scorer
///
/// Maps frame RMS linearly onto `[0, 1]`, saturating at `full_scale_rms`.
#[derive(Debug, Clone, Copy)]
pub struct EnergyScorer {
    full_scale_rms: f32,
}

impl Default for EnergyScorer {
    fn default() -> Self {
        Self::new(DEFAULT_FULL_SCALE_RMS)
    }
}

impl EnergyScorer {
    /// Create a scorer saturating at the given RMS level
    #[must_use]
    pub fn new(full_scale_rms: f32) -> Self {
        Self {
            full_scale_rms: full_scale_rms.max(f32::EPSILON),
        }
    }
}

impl SpeechScorer for EnergyScorer {
    fn score(&mut self, frame: &[f32]) -> SpeechProbabilities {
        SpeechProbabilities::new(calculate_energy(frame) / self.full_scale_rms)
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
pub(crate) fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energy_calculation() {
        let silence = vec![0.0f32; 100];
        assert!(calculate_energy(&silence) < 0.001);

        let loud = vec![0.5f32; 100];
        assert!(calculate_energy(&loud) > 0.4);

        assert!(calculate_energy(&[]).abs() < f32::EPSILON);
    }

    #[test]
    fn energy_scorer_saturates() {
        let mut scorer = EnergyScorer::default();

        let quiet = scorer.score(&[0.01; 256]);
        assert!(quiet.is_speech < 0.2);

        let loud = scorer.score(&[0.5; 256]);
        assert!((loud.is_speech - 1.0).abs() < f32::EPSILON);
    }
}
