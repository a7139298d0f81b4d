//! Turns raw class scores into a prediction.
//!

use serde::Serialize;

use crate::module::error::ScanError;

use super::classifier::ScoreVector;
use super::denomination::{Denomination, DENOMINATIONS};

/// Result of one scan.
///
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub label: String,
    pub value: u32,
    /// Rounded percentage, 0 to 100.
    pub confidence: u8,
    /// Per-class probabilities; empty when the backend does not report them.
    pub probabilities: Vec<f64>,
}

impl PredictionResult {
    pub fn denomination(&self) -> Option<Denomination> {
        Denomination::from_value(self.value)
    }
}

/// Numerically stable softmax.
///
/// The maximum score is subtracted before exponentiating, so large logits
/// such as `[1000, 1, ...]` cannot overflow. Returns an empty vector when
/// `scores` is empty or holds a NaN or infinite value.
pub fn softmax(scores: &[f32]) -> Vec<f64> {
    if scores.is_empty() || scores.iter().any(|s| !s.is_finite()) {
        return Vec::new();
    }
    let max = scores
        .iter()
        .map(|&s| s as f64)
        .fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|&s| (s as f64 - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

/// Index of the largest value; the first one wins on ties.
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Probability to a whole percentage, rounding half away from zero.
pub fn confidence_percent(probability: f64) -> u8 {
    (probability * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Decodes classifier scores against the denomination table.
///
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultDecoder;

impl ResultDecoder {
    pub fn decode(&self, scores: &ScoreVector) -> Result<PredictionResult, ScanError> {
        if scores.is_empty() {
            return Err(ScanError::Inference("empty score vector".to_string()));
        }
        if let Some(bad) = scores.as_slice().iter().find(|s| !s.is_finite()) {
            return Err(ScanError::Inference(format!("non-finite score {bad}")));
        }

        let probabilities = softmax(scores.as_slice());
        log::debug!("Probabilities: {:?}", probabilities);

        let index = argmax(&probabilities)
            .ok_or_else(|| ScanError::Inference("empty probability vector".to_string()))?;
        let denomination =
            Denomination::from_index(index).ok_or(ScanError::InvalidClassIndex {
                index,
                classes: DENOMINATIONS.len(),
            })?;
        let confidence = confidence_percent(probabilities[index]);

        log::info!(
            "Detected: {} with confidence {:.1}%",
            denomination.label(),
            probabilities[index] * 100.0
        );
        Ok(PredictionResult {
            label: denomination.label().to_string(),
            value: denomination.value(),
            confidence,
            probabilities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn assert_distribution(p: &[f64]) {
        let sum: f64 = p.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6, "sum was {sum}");
        assert!(p.iter().all(|v| *v >= 0.0 && v.is_finite()));
    }

    #[test]
    fn softmax_is_a_distribution() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let scores: Vec<f32> = (0..7).map(|_| rng.gen_range(-50.0..50.0)).collect();
            assert_distribution(&softmax(&scores));
        }
    }

    #[test]
    fn softmax_is_stable_for_extreme_scores() {
        let p = softmax(&[1000.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
        assert_distribution(&p);
        assert!((p[0] - 1.0).abs() < 1e-9);

        let p = softmax(&[-1000.0, -1000.0, -1000.0, -1000.0, -1000.0, -1000.0, -1000.0]);
        assert_distribution(&p);
        assert!(p.iter().all(|v| (v - 1.0 / 7.0).abs() < 1e-9));

        let p = softmax(&[f32::MAX, f32::MIN, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_distribution(&p);
    }

    #[test]
    fn softmax_rejects_non_finite_scores() {
        assert!(softmax(&[f32::NAN, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]).is_empty());
        assert!(softmax(&[0.0, f32::INFINITY, 0.0, 0.0, 0.0, 0.0, 0.0]).is_empty());
        assert!(softmax(&[f32::NEG_INFINITY, 0.0]).is_empty());
        assert!(softmax(&[]).is_empty());
    }

    #[test]
    fn argmax_prefers_lowest_index_on_ties() {
        assert_eq!(argmax(&[0.5, 0.5, 0.0, 0.0, 0.0, 0.0, 0.0]), Some(0));
        assert_eq!(argmax(&[0.1, 0.4, 0.4, 0.1]), Some(1));
        assert_eq!(argmax(&[0.1, 0.2, 0.7]), Some(2));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn tied_scores_decode_to_first_class() {
        let result = ResultDecoder
            .decode(&ScoreVector(vec![0.5, 0.5, 0.0, 0.0, 0.0, 0.0, 0.0]))
            .unwrap();
        assert_eq!(result.value, 1_000);
        assert_eq!(result.label, "Seribu Rupiah");
    }

    #[test]
    fn confidence_rounds_to_nearest() {
        assert_eq!(confidence_percent(0.954), 95);
        assert_eq!(confidence_percent(0.005), 1);
        assert_eq!(confidence_percent(0.996), 100);
        assert_eq!(confidence_percent(0.0), 0);
        assert_eq!(confidence_percent(1.0), 100);
    }

    #[test]
    fn decodes_winning_denomination() {
        let scores = ScoreVector(vec![0.0, 0.0, 0.0, 0.0, 0.0, 9.0, 0.0]);
        let result = ResultDecoder.decode(&scores).unwrap();
        assert_eq!(result.label, "Lima Puluh Ribu Rupiah");
        assert_eq!(result.value, 50_000);
        assert_eq!(result.denomination(), Some(Denomination::LimaPuluhRibu));
        assert_eq!(result.probabilities.len(), 7);
        // e^9 / (e^9 + 6) ~= 0.99926
        assert_eq!(result.confidence, 100);
    }

    #[test]
    fn index_outside_table_is_fatal() {
        let scores = ScoreVector(vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 5.0]);
        let err = ResultDecoder.decode(&scores).unwrap_err();
        assert!(matches!(
            err,
            ScanError::InvalidClassIndex {
                index: 7,
                classes: 7
            }
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn rejects_empty_and_non_finite_scores() {
        assert!(matches!(
            ResultDecoder.decode(&ScoreVector(vec![])),
            Err(ScanError::Inference(_))
        ));
        assert!(matches!(
            ResultDecoder.decode(&ScoreVector(vec![0.0, f32::NAN, 0.0, 0.0, 0.0, 0.0, 0.0])),
            Err(ScanError::Inference(_))
        ));
        assert!(matches!(
            ResultDecoder.decode(&ScoreVector(vec![f32::INFINITY; 7])),
            Err(ScanError::Inference(_))
        ));
    }
}
