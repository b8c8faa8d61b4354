//! Nearest-pattern classification against an enrolled gallery.
//!
//! Two distance modes share one decision rule:
//! - [`DistanceMode::Binary`]: mean absolute difference per component
//!   (normalized Hamming distance for 0/1 vectors), range `[0, 1]`.
//! - [`DistanceMode::Continuous`]: `1 - cos(query, reference)` after
//!   per-vector L2 normalization, clamped, range `[0, 2]`.
//!
//! The best match is the lowest distance, earliest gallery index on ties. It
//! is rejected as unknown only when its distance is strictly greater than the
//! threshold.

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::ClassifyError;
use crate::gallery::Gallery;
use crate::FeatureVector;

/// Label reported when no gallery entry is close enough.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Distance reported for a zero-norm query in continuous mode.
pub const DEGENERATE_DISTANCE: f32 = 1.0;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMode {
    #[default]
    Binary,
    Continuous,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Prediction {
    Match(String),
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub prediction: Prediction,
    pub distance: f32,
    /// Index of the closest gallery entry; `None` when the query was degenerate.
    pub best_index: Option<usize>,
}

impl ClassificationResult {
    /// Predicted label, or [`UNKNOWN_LABEL`].
    pub fn label(&self) -> &str {
        match &self.prediction {
            Prediction::Match(label) => label,
            Prediction::Unknown => UNKNOWN_LABEL,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.prediction == Prediction::Unknown
    }
}

/// Threshold-independent half of a classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nearest {
    pub index: Option<usize>,
    pub distance: f32,
}

/// Immutable classifier over a snapshot of a gallery.
///
/// The gallery is copied into a row matrix at construction, together with
/// each row's squared norm for continuous mode, so later changes to the
/// caller's gallery never affect an existing classifier. Re-enrollment means building a new one.
#[derive(Debug, Clone)]
pub struct Classifier {
    labels: Vec<String>,
    patterns: Array2<f32>,
    /// Squared Euclidean norm of each row, in f64.
    sq_norms: Vec<f64>,
    threshold: f32,
    mode: DistanceMode,
}

impl Classifier {
    pub fn new(gallery: &Gallery, threshold: f32, mode: DistanceMode) -> Result<Self, ClassifyError> {
        validate_threshold(threshold)?;
        let dim = gallery.dimension()?.unwrap_or(0);

        let mut patterns = Array2::zeros((gallery.len(), dim));
        for (mut row, entry) in patterns.rows_mut().into_iter().zip(gallery) {
            row.assign(&entry.vector.view());
        }
        let sq_norms = patterns.rows().into_iter().map(|row| dot64(row, row)).collect();

        log::debug!(
            "classifier ready: {} patterns of length {}, threshold {:.3}, {:?} mode",
            gallery.len(),
            dim,
            threshold,
            mode
        );

        Ok(Self {
            labels: gallery.labels().map(str::to_owned).collect(),
            patterns,
            sq_norms,
            threshold,
            mode,
        })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn mode(&self) -> DistanceMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Length every query must have.
    pub fn dimension(&self) -> usize {
        self.patterns.ncols()
    }

    pub fn label_at(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn classify(&self, query: &FeatureVector) -> Result<ClassificationResult, ClassifyError> {
        let nearest = self.nearest(query)?;
        Ok(self.decide(nearest, self.threshold))
    }

    /// Closest gallery entry, with no accept/reject decision applied.
    pub fn nearest(&self, query: &FeatureVector) -> Result<Nearest, ClassifyError> {
        let Some(distances) = self.distances(query)? else {
            return Ok(Nearest {
                index: None,
                distance: DEGENERATE_DISTANCE,
            });
        };
        let (index, distance) = argmin(distances.iter().copied()).ok_or(ClassifyError::EmptyGallery)?;
        Ok(Nearest {
            index: Some(index),
            distance,
        })
    }

    /// Distance from `query` to every gallery entry, in gallery order.
    ///
    /// `None` when the query is degenerate (zero norm in continuous mode).
    pub fn distances(&self, query: &FeatureVector) -> Result<Option<Vec<f32>>, ClassifyError> {
        if self.is_empty() {
            return Err(ClassifyError::EmptyGallery);
        }
        if query.len() != self.dimension() {
            return Err(ClassifyError::DimensionMismatch {
                expected: self.dimension(),
                got: query.len(),
            });
        }

        let q = query.view();
        let distances: Vec<f32> = match self.mode {
            DistanceMode::Binary => self
                .patterns
                .rows()
                .into_iter()
                .map(|row| mean_abs_diff(row, q))
                .collect(),
            DistanceMode::Continuous => {
                let q_sq = dot64(q, q);
                if q_sq == 0.0 {
                    return Ok(None);
                }
                self.patterns
                    .rows()
                    .into_iter()
                    .zip(&self.sq_norms)
                    .map(|(row, &r_sq)| cosine_distance(dot64(row, q), r_sq, q_sq))
                    .collect()
            }
        };
        Ok(Some(distances))
    }

    /// Apply the accept/reject rule: unknown iff `distance > threshold`.
    pub fn decide(&self, nearest: Nearest, threshold: f32) -> ClassificationResult {
        // NaN distances are never accepted
        let label = nearest
            .index
            .filter(|_| nearest.distance <= threshold)
            .and_then(|index| self.labels.get(index));
        let prediction = match label {
            Some(label) => Prediction::Match(label.clone()),
            None => Prediction::Unknown,
        };
        ClassificationResult {
            prediction,
            distance: nearest.distance,
            best_index: nearest.index,
        }
    }
}

fn validate_threshold(threshold: f32) -> Result<(), ClassifyError> {
    if threshold.is_finite() && threshold >= 0.0 {
        Ok(())
    } else {
        Err(ClassifyError::InvalidThreshold(threshold))
    }
}

/// Dot product accumulated in f64.
fn dot64(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f64 {
    a.iter().zip(b.iter()).map(|(&x, &y)| x as f64 * y as f64).sum()
}

/// `1 - cos`, clamped. A zero-norm reference has cosine 0 (distance 1).
///
/// For identical vectors `dot == a_sq == b_sq` and `sqrt(x * x) == x`, so a
/// self-match is exactly 0.
fn cosine_distance(dot: f64, a_sq: f64, b_sq: f64) -> f32 {
    if a_sq == 0.0 || b_sq == 0.0 {
        return 1.0;
    }
    let similarity = (dot / (a_sq * b_sq).sqrt()).clamp(-1.0, 1.0);
    (1.0 - similarity) as f32
}

fn mean_abs_diff(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    if a.is_empty() {
        return 0.0;
    }
    let sum: f32 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum();
    sum / a.len() as f32
}

/// First index holding the minimum; NaN never wins over a number.
fn argmin(values: impl Iterator<Item = f32>) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, d) in values.enumerate() {
        match best {
            Some((_, b)) if d < b || (b.is_nan() && !d.is_nan()) => best = Some((i, d)),
            None => best = Some((i, d)),
            _ => {}
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::GalleryEntry;

    fn bits(v: &[u8]) -> FeatureVector {
        FeatureVector::from_bits(v)
    }

    fn alice_bob() -> Gallery {
        [
            GalleryEntry::new("alice", bits(&[1, 1, 0, 0])),
            GalleryEntry::new("bob", bits(&[0, 0, 1, 1])),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_exact_match() {
        let c = Classifier::new(&alice_bob(), 0.25, DistanceMode::Binary).unwrap();
        let r = c.classify(&bits(&[1, 1, 0, 0])).unwrap();
        assert_eq!(r.prediction, Prediction::Match("alice".into()));
        assert_eq!(r.distance, 0.0);
        assert_eq!(r.best_index, Some(0));
    }

    #[test]
    fn test_distance_equal_to_threshold_is_accepted() {
        let c = Classifier::new(&alice_bob(), 0.25, DistanceMode::Binary).unwrap();
        let r = c.classify(&bits(&[1, 0, 0, 0])).unwrap();
        assert_eq!(r.label(), "alice");
        assert_eq!(r.distance, 0.25);
        assert_eq!(r.best_index, Some(0));
    }

    #[test]
    fn test_above_threshold_is_unknown() {
        let c = Classifier::new(&alice_bob(), 0.2, DistanceMode::Binary).unwrap();
        let r = c.classify(&bits(&[1, 0, 0, 0])).unwrap();
        assert!(r.is_unknown());
        assert_eq!(r.label(), UNKNOWN_LABEL);
        // closest entry is still reported
        assert_eq!(r.best_index, Some(0));
        assert_eq!(r.distance, 0.25);
    }

    #[test]
    fn test_tie_break_lowest_index() {
        let g: Gallery = [
            GalleryEntry::new("bob", bits(&[0, 0, 1, 1])),
            GalleryEntry::new("first", bits(&[1, 0, 1, 0])),
            GalleryEntry::new("second", bits(&[1, 0, 1, 0])),
        ]
        .into_iter()
        .collect();
        for mode in [DistanceMode::Binary, DistanceMode::Continuous] {
            let c = Classifier::new(&g, 0.5, mode).unwrap();
            for _ in 0..10 {
                let r = c.classify(&bits(&[1, 0, 1, 0])).unwrap();
                assert_eq!(r.best_index, Some(1), "{:?}", mode);
                assert_eq!(r.label(), "first");
            }
        }
    }

    #[test]
    fn test_empty_gallery() {
        for mode in [DistanceMode::Binary, DistanceMode::Continuous] {
            let c = Classifier::new(&Gallery::new(), 0.5, mode).unwrap();
            assert_eq!(c.classify(&bits(&[1, 0])), Err(ClassifyError::EmptyGallery));
            assert_eq!(c.classify(&bits(&[])), Err(ClassifyError::EmptyGallery));
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let c = Classifier::new(&alice_bob(), 0.25, DistanceMode::Binary).unwrap();
        assert_eq!(
            c.classify(&bits(&[1, 1, 0])),
            Err(ClassifyError::DimensionMismatch {
                expected: 4,
                got: 3
            })
        );
        assert!(matches!(
            c.classify(&bits(&[1, 1, 0, 0, 0])),
            Err(ClassifyError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_mixed_gallery_rejected() {
        let mut g = alice_bob();
        g.push(GalleryEntry::new("carol", bits(&[1, 0])));
        assert!(matches!(
            Classifier::new(&g, 0.25, DistanceMode::Binary),
            Err(ClassifyError::DimensionMismatch {
                expected: 4,
                got: 2
            })
        ));
    }

    #[test]
    fn test_invalid_threshold() {
        for t in [f32::NAN, -0.1, f32::INFINITY] {
            assert!(matches!(
                Classifier::new(&alice_bob(), t, DistanceMode::Binary),
                Err(ClassifyError::InvalidThreshold(_))
            ));
        }
    }

    #[test]
    fn test_continuous_zero_query_is_degenerate() {
        let g: Gallery = [
            GalleryEntry::new("blank", bits(&[0, 0, 0, 0])),
            GalleryEntry::new("alice", bits(&[1, 1, 0, 0])),
        ]
        .into_iter()
        .collect();
        let c = Classifier::new(&g, 2.0, DistanceMode::Continuous).unwrap();
        let r = c.classify(&bits(&[0, 0, 0, 0])).unwrap();
        assert_eq!(r.prediction, Prediction::Unknown);
        assert_eq!(r.distance, DEGENERATE_DISTANCE);
        assert_eq!(r.best_index, None);
        assert_eq!(c.distances(&bits(&[0, 0, 0, 0])).unwrap(), None);
    }

    #[test]
    fn test_continuous_zero_reference_is_not_an_error() {
        let g: Gallery = [
            GalleryEntry::new("blank", bits(&[0, 0, 0, 0])),
            GalleryEntry::new("alice", bits(&[1, 1, 0, 0])),
        ]
        .into_iter()
        .collect();
        let c = Classifier::new(&g, 0.1, DistanceMode::Continuous).unwrap();
        let d = c.distances(&bits(&[1, 1, 0, 0])).unwrap().unwrap();
        assert_eq!(d[0], 1.0);
        assert_eq!(d[1], 0.0);
        assert_eq!(c.classify(&bits(&[1, 1, 0, 0])).unwrap().label(), "alice");
    }

    #[test]
    fn test_continuous_is_scale_invariant() {
        let g: Gallery = [
            GalleryEntry::new("x", FeatureVector::from_vec(vec![1.0, 0.0, 0.0])),
            GalleryEntry::new("y", FeatureVector::from_vec(vec![0.0, 2.0, 0.0])),
            GalleryEntry::new("neg", FeatureVector::from_vec(vec![-3.0, 0.0, 0.0])),
        ]
        .into_iter()
        .collect();
        let c = Classifier::new(&g, 0.1, DistanceMode::Continuous).unwrap();

        let d = c
            .distances(&FeatureVector::from_vec(vec![0.0, 10.0, 0.0]))
            .unwrap()
            .unwrap();
        assert!((d[0] - 1.0).abs() < 1e-6);
        assert!(d[1].abs() < 1e-6);
        assert!((d[2] - 1.0).abs() < 1e-6);

        let r = c.classify(&FeatureVector::from_vec(vec![5.0, 0.0, 0.0])).unwrap();
        assert_eq!(r.label(), "x");
        let d = c
            .distances(&FeatureVector::from_vec(vec![5.0, 0.0, 0.0]))
            .unwrap()
            .unwrap();
        assert!((d[2] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_continuous_self_match_at_zero_threshold() {
        for k in 1..=64 {
            let mut v = vec![0u8; 64];
            v[..k].iter_mut().for_each(|b| *b = 1);
            let g: Gallery = [GalleryEntry::new("me", bits(&v))].into_iter().collect();
            let c = Classifier::new(&g, 0.0, DistanceMode::Continuous).unwrap();
            let r = c.classify(&bits(&v)).unwrap();
            assert_eq!(r.distance, 0.0, "{} leading ones", k);
            assert_eq!(r.label(), "me", "{} leading ones", k);
        }

        let v = FeatureVector::from_vec(vec![0.1, 0.7, -2.3, 1e-3]);
        let g: Gallery = [GalleryEntry::new("me", v.clone())].into_iter().collect();
        let c = Classifier::new(&g, 0.0, DistanceMode::Continuous).unwrap();
        assert_eq!(c.classify(&v).unwrap().distance, 0.0);
    }

    #[test]
    fn test_decide_with_other_threshold() {
        let c = Classifier::new(&alice_bob(), 0.0, DistanceMode::Binary).unwrap();
        let nearest = c.nearest(&bits(&[1, 0, 0, 0])).unwrap();
        assert!(c.decide(nearest, 0.0).is_unknown());
        assert_eq!(c.decide(nearest, 0.25).label(), "alice");
        assert_eq!(c.decide(nearest, 1.0).label(), "alice");
    }

    #[test]
    fn test_argmin_nan() {
        assert_eq!(argmin([f32::NAN, 0.5, 0.5].into_iter()), Some((1, 0.5)));
        assert_eq!(argmin(std::iter::empty()), None);
    }

    #[test]
    fn test_gallery_not_shared_with_classifier() {
        let mut g = alice_bob();
        let c = Classifier::new(&g, 0.25, DistanceMode::Binary).unwrap();
        g.push(GalleryEntry::new("carol", bits(&[1, 1, 0, 0])));
        assert_eq!(c.len(), 2);
        assert_eq!(g.len(), 3);
    }
}
