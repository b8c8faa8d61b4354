//! Leave-one-out accuracy sweep over a labelled image directory.
//!
//! Images are named `<label>-<n>.<ext>`. Fold `n` enrolls every image not
//! numbered `n` and probes with the ones that are, then scores each probe at
//! every threshold of the sweep.

use anyhow::{Context, Result};
use hamrs_vision::{FeatureVector, Vectorizer};
use log::{debug, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::classifier::{ClassificationResult, Classifier, DistanceMode, Prediction};
use crate::gallery::{Gallery, GalleryEntry};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub path: PathBuf,
    pub label: String,
    /// Per-person image number; `None` for files without a numeric suffix.
    pub number: Option<u32>,
}

impl Sample {
    /// Parse `<label>-<n>.<ext>`. Returns `None` for non-image files.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let (label, number) = match stem.rsplit_once('-') {
            Some((label, n)) if !label.is_empty() => match n.parse() {
                Ok(n) => (label, Some(n)),
                Err(_) => (stem, None),
            },
            _ => (stem, None),
        };
        Some(Self {
            path: path.to_path_buf(),
            label: label.to_string(),
            number,
        })
    }
}

/// All images directly inside `dir`, sorted by path.
pub fn discover(dir: &Path) -> Result<Vec<Sample>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("reading directory {}", dir.display()))?;
    let mut samples = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        match Sample::from_path(&path) {
            Some(sample) => samples.push(sample),
            None => debug!("ignoring {}", path.display()),
        }
    }
    samples.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(samples)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    WrongPerson,
    Unknown,
}

impl Outcome {
    pub fn of(result: &ClassificationResult, truth: &str) -> Self {
        match &result.prediction {
            Prediction::Unknown => Outcome::Unknown,
            Prediction::Match(label) if label == truth => Outcome::Success,
            Prediction::Match(_) => Outcome::WrongPerson,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub success: usize,
    pub wrong_person: usize,
    pub unknown: usize,
}

impl Tally {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.success += 1,
            Outcome::WrongPerson => self.wrong_person += 1,
            Outcome::Unknown => self.unknown += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.success + self.wrong_person + self.unknown
    }

    fn percent(&self, count: usize) -> f32 {
        match self.total() {
            0 => 0.0,
            total => count as f32 * 100.0 / total as f32,
        }
    }

    pub fn success_rate(&self) -> f32 {
        self.percent(self.success)
    }

    pub fn wrong_rate(&self) -> f32 {
        self.percent(self.wrong_person)
    }

    pub fn unknown_rate(&self) -> f32 {
        self.percent(self.unknown)
    }

    fn merge(&mut self, other: &Tally) {
        self.success += other.success;
        self.wrong_person += other.wrong_person;
        self.unknown += other.unknown;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ThresholdStats {
    pub threshold: f32,
    #[serde(flatten)]
    pub tally: Tally,
    pub success_rate: f32,
    pub wrong_rate: f32,
    pub unknown_rate: f32,
}

impl ThresholdStats {
    fn new(threshold: f32, tally: Tally) -> Self {
        Self {
            threshold,
            tally,
            success_rate: tally.success_rate(),
            wrong_rate: tally.wrong_rate(),
            unknown_rate: tally.unknown_rate(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EvalOptions {
    pub per_person: u32,
    pub mode: DistanceMode,
    pub thresholds: Vec<f32>,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            per_person: 5,
            mode: DistanceMode::Binary,
            thresholds: default_thresholds(),
        }
    }
}

/// `0.01, 0.02, ..., 1.00`
pub fn default_thresholds() -> Vec<f32> {
    (1..=100).map(|k| k as f32 / 100.0).collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub mode: DistanceMode,
    pub per_person: u32,
    /// Probe images scored (each at every threshold).
    pub probes: usize,
    /// Images that could not be vectorized.
    pub skipped: usize,
    pub totals: Tally,
    pub thresholds: Vec<ThresholdStats>,
}

impl Report {
    /// Highest success rate; the lowest threshold wins ties.
    pub fn best_threshold(&self) -> Option<&ThresholdStats> {
        let mut best: Option<&ThresholdStats> = None;
        for stats in &self.thresholds {
            match best {
                Some(b) if stats.success_rate <= b.success_rate => {}
                _ => best = Some(stats),
            }
        }
        best
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Vectorize every sample, then run [`evaluate_vectors`]. Unreadable images are skipped.
pub fn evaluate(samples: &[Sample], vectorizer: &Vectorizer, opts: &EvalOptions) -> Result<Report> {
    let mut prepared = Vec::with_capacity(samples.len());
    let mut skipped = 0;
    for sample in samples {
        match vectorizer.vectorize_path(&sample.path) {
            Ok(vector) => prepared.push((sample.clone(), vector)),
            Err(e) => {
                warn!("skipping {}: {}", sample.path.display(), e);
                skipped += 1;
            }
        }
    }
    let mut report = evaluate_vectors(&prepared, opts)?;
    report.skipped = skipped;
    Ok(report)
}

pub fn evaluate_vectors(samples: &[(Sample, FeatureVector)], opts: &EvalOptions) -> Result<Report> {
    if let Some(&t) = opts.thresholds.iter().find(|t| !(t.is_finite() && **t >= 0.0)) {
        anyhow::bail!("invalid threshold in sweep: {}", t);
    }

    let mut per_threshold = vec![Tally::default(); opts.thresholds.len()];
    let mut probes = 0;

    for fold in 1..=opts.per_person {
        let gallery: Gallery = samples
            .iter()
            .filter(|(s, _)| s.number != Some(fold))
            .map(|(s, v)| GalleryEntry::new(s.label.clone(), v.clone()))
            .collect();
        let fold_probes: Vec<_> = samples.iter().filter(|(s, _)| s.number == Some(fold)).collect();

        if fold_probes.is_empty() {
            warn!("fold {}: no probe images numbered {}", fold, fold);
            continue;
        }
        if gallery.is_empty() {
            warn!("fold {}: nothing left to enroll", fold);
            continue;
        }
        info!(
            "fold {}: {} enrolled, {} probes",
            fold,
            gallery.len(),
            fold_probes.len()
        );

        // threshold is applied per sweep step through `decide`
        let classifier = Classifier::new(&gallery, 0.0, opts.mode)
            .with_context(|| format!("building classifier for fold {}", fold))?;

        for (sample, vector) in fold_probes {
            let nearest = classifier
                .nearest(vector)
                .with_context(|| format!("classifying {}", sample.path.display()))?;
            debug!(
                "{}: nearest {:?} at {:.4}",
                sample.path.display(),
                nearest.index.and_then(|i| classifier.label_at(i)),
                nearest.distance
            );
            for (tally, &threshold) in per_threshold.iter_mut().zip(&opts.thresholds) {
                let result = classifier.decide(nearest, threshold);
                tally.record(Outcome::of(&result, &sample.label));
            }
            probes += 1;
        }
    }

    let mut totals = Tally::default();
    for tally in &per_threshold {
        totals.merge(tally);
    }

    Ok(Report {
        mode: opts.mode,
        per_person: opts.per_person,
        probes,
        skipped: 0,
        totals,
        thresholds: opts
            .thresholds
            .iter()
            .zip(per_threshold)
            .map(|(&t, tally)| ThresholdStats::new(t, tally))
            .collect(),
    })
}
