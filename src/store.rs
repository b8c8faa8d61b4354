use anyhow::{Context, Result};
use hamrs_vision::{FeatureVector, Vectorizer};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::gallery::{Gallery, GalleryEntry};

/// One enrolled image as persisted on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRecord {
    pub id: String,
    pub label: String,
    pub width: u32,
    pub height: u32,
    /// One byte (0 or 1) per pixel, row-major.
    #[serde(with = "serde_bytes")]
    pub bits: Vec<u8>,
}

impl FaceRecord {
    pub fn new(label: &str, vectorizer: &Vectorizer, vector: &FeatureVector) -> Result<Self> {
        if vector.len() != vectorizer.len() {
            anyhow::bail!(
                "vector has {} components, expected {} for {}x{}",
                vector.len(),
                vectorizer.len(),
                vectorizer.width(),
                vectorizer.height()
            );
        }
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            label: label.to_string(),
            width: vectorizer.width(),
            height: vectorizer.height(),
            bits: vector.to_bits().context("encoding feature vector")?,
        })
    }

    pub fn vector(&self) -> FeatureVector {
        FeatureVector::from_bits(&self.bits)
    }
}

/// Gallery persisted as a single postcard-encoded file of [`FaceRecord`]s.
#[derive(Debug, Clone)]
pub struct GalleryStore {
    path: PathBuf,
}

impl GalleryStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_records(&self) -> Result<Vec<FaceRecord>> {
        if !self.path.exists() {
            return Ok(vec![]);
        }
        let data =
            std::fs::read(&self.path).with_context(|| format!("reading {}", self.path.display()))?;
        postcard::from_bytes(&data).with_context(|| format!("decoding {}", self.path.display()))
    }

    /// Every stored record as a gallery, in enrollment order.
    ///
    /// Fails if any record was enrolled at a different size than `vectorizer`
    /// produces, even when the vector lengths happen to agree.
    pub fn load_gallery(&self, vectorizer: &Vectorizer) -> Result<Gallery> {
        let size = (vectorizer.width(), vectorizer.height());
        self.load_records()?
            .iter()
            .map(|r| {
                if (r.width, r.height) != size {
                    anyhow::bail!(
                        "record {} ('{}') was enrolled at {}x{}, current size is {}x{}",
                        r.id,
                        r.label,
                        r.width,
                        r.height,
                        size.0,
                        size.1
                    );
                }
                if r.bits.len() != vectorizer.len() {
                    anyhow::bail!(
                        "record {} ('{}') has {} components, expected {}",
                        r.id,
                        r.label,
                        r.bits.len(),
                        vectorizer.len()
                    );
                }
                Ok(GalleryEntry::new(r.label.clone(), r.vector()))
            })
            .collect()
    }

    pub fn insert(&self, record: FaceRecord) -> Result<()> {
        let mut records = self.load_records()?;
        records.push(record);
        self.write_records(&records)
    }

    /// Remove every record with `label`; returns how many were removed.
    pub fn remove_label(&self, label: &str) -> Result<usize> {
        let mut records = self.load_records()?;
        let before = records.len();
        records.retain(|r| r.label != label);
        let removed = before - records.len();
        if removed > 0 {
            self.write_records(&records)?;
        }
        Ok(removed)
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .with_context(|| format!("removing {}", self.path.display()))?;
        }
        Ok(())
    }

    fn write_records(&self, records: &[FaceRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = postcard::to_allocvec(records)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, data).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}
