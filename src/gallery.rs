use crate::error::ClassifyError;
use crate::FeatureVector;

/// One enrolled reference pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct GalleryEntry {
    pub label: String,
    pub vector: FeatureVector,
}

impl GalleryEntry {
    pub fn new(label: impl Into<String>, vector: FeatureVector) -> Self {
        Self {
            label: label.into(),
            vector,
        }
    }
}

/// Ordered collection of enrolled patterns. Labels may repeat.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: GalleryEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, GalleryEntry> {
        self.entries.iter()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.label.as_str())
    }

    /// Common vector length, `None` for an empty gallery.
    pub fn dimension(&self) -> Result<Option<usize>, ClassifyError> {
        let mut entries = self.entries.iter();
        let Some(first) = entries.next() else {
            return Ok(None);
        };
        let expected = first.vector.len();
        for entry in entries {
            if entry.vector.len() != expected {
                return Err(ClassifyError::DimensionMismatch {
                    expected,
                    got: entry.vector.len(),
                });
            }
        }
        Ok(Some(expected))
    }
}

impl FromIterator<GalleryEntry> for Gallery {
    fn from_iter<I: IntoIterator<Item = GalleryEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Gallery {
    type Item = &'a GalleryEntry;
    type IntoIter = std::slice::Iter<'a, GalleryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
