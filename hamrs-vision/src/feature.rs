use ndarray::{Array1, ArrayView1};

use crate::error::{Result, VisionError};

/// Fixed-length representation of an image.
///
/// Vectors produced by the [`Vectorizer`](crate::Vectorizer) hold `0.0` / `1.0`
/// per pixel. Vectors built with [`FeatureVector::from_vec`] may hold arbitrary
/// magnitudes for the continuous distance mode.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: Array1<f32>,
}

impl FeatureVector {
    pub fn from_vec(values: Vec<f32>) -> Self {
        Self {
            values: Array1::from(values),
        }
    }

    /// Build from the persisted one-byte-per-component form.
    pub fn from_bits(bits: &[u8]) -> Self {
        Self {
            values: bits.iter().map(|&b| b as f32).collect(),
        }
    }

    /// Encode back to one byte per component. Fails if any component is not 0 or 1.
    pub fn to_bits(&self) -> Result<Vec<u8>> {
        self.values
            .iter()
            .enumerate()
            .map(|(index, &value)| {
                if value == 0.0 {
                    Ok(0)
                } else if value == 1.0 {
                    Ok(1)
                } else {
                    Err(VisionError::NotBinary { index, value })
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_array(&self) -> &Array1<f32> {
        &self.values
    }

    pub fn view(&self) -> ArrayView1<'_, f32> {
        self.values.view()
    }

    /// Euclidean norm.
    pub fn norm(&self) -> f32 {
        self.values.dot(&self.values).sqrt()
    }

    /// Number of components set to 1.0 (foreground pixels for binary vectors).
    pub fn ones(&self) -> usize {
        self.values.iter().filter(|&&v| v == 1.0).count()
    }
}

impl From<Vec<f32>> for FeatureVector {
    fn from(values: Vec<f32>) -> Self {
        Self::from_vec(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_round_trip() {
        let bits = [1u8, 0, 0, 1, 1];
        let v = FeatureVector::from_bits(&bits);
        assert_eq!(v.as_array(), &ndarray::arr1(&[1.0, 0.0, 0.0, 1.0, 1.0]));
        assert_eq!(v.to_bits().unwrap(), bits.to_vec());
        assert_eq!(v.ones(), 3);
    }

    #[test]
    fn test_to_bits_rejects_magnitudes() {
        let v = FeatureVector::from_vec(vec![0.0, 0.5, 1.0]);
        match v.to_bits() {
            Err(VisionError::NotBinary { index, value }) => {
                assert_eq!(index, 1);
                assert_eq!(value, 0.5);
            }
            other => panic!("expected NotBinary, got {:?}", other),
        }
    }

    #[test]
    fn test_norm() {
        let v = FeatureVector::from_vec(vec![3.0, 4.0]);
        assert!((v.norm() - 5.0).abs() < 1e-6);
        assert_eq!(FeatureVector::from_vec(vec![0.0; 4]).norm(), 0.0);
    }

    #[test]
    fn test_from_vec_and_collect_agree() {
        let v = FeatureVector::from_vec(vec![0.25, 1.0, -2.0]);
        assert_eq!(v, FeatureVector::from(vec![0.25, 1.0, -2.0]));
        assert_eq!(v.view().len(), 3);
        assert_eq!(v.as_array()[2], -2.0);
        assert_eq!(FeatureVector::from_bits(&[1, 0]), FeatureVector::from_vec(vec![1.0, 0.0]));
        assert!(FeatureVector::from_bits(&[]).is_empty());
    }
}
