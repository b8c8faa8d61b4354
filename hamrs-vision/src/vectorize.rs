use std::path::{Path, PathBuf};

use image::{imageops::FilterType, DynamicImage, GrayImage, Luma};

use crate::error::{Result, VisionError};
use crate::feature::FeatureVector;

pub const DEFAULT_WIDTH: u32 = 64;
pub const DEFAULT_HEIGHT: u32 = 80;
/// Pixels strictly brighter than this become 1.
pub const DEFAULT_CUT: u8 = 127;

/// Deterministic image → binary feature vector transform.
///
/// grayscale (BT.601) → bilinear resize to `width x height` → threshold at
/// `cut` → row-major flatten. The same image and settings always produce the
/// same vector, so galleries built at enrollment stay comparable with probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vectorizer {
    width: u32,
    height: u32,
    cut: u8,
}

impl Default for Vectorizer {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            cut: DEFAULT_CUT,
        }
    }
}

/// Intermediate images of one vectorization, kept for inspection.
#[derive(Debug, Clone)]
pub struct Stages {
    pub gray: GrayImage,
    pub resized: GrayImage,
    /// Binarized image with foreground stored as 255 so it can be viewed.
    pub binary: GrayImage,
}

impl Vectorizer {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(VisionError::InvalidSize { width, height });
        }
        Ok(Self {
            width,
            height,
            ..Self::default()
        })
    }

    pub fn with_cut(self, cut: u8) -> Self {
        Self { cut, ..self }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn cut(&self) -> u8 {
        self.cut
    }

    /// Length of every vector this vectorizer produces.
    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn vectorize_path(&self, path: impl AsRef<Path>) -> Result<FeatureVector> {
        let img = open_image(path.as_ref())?;
        Ok(self.vectorize_image(&img))
    }

    pub fn vectorize_bytes(&self, bytes: &[u8]) -> Result<FeatureVector> {
        let img = image::load_from_memory(bytes).map_err(|source| VisionError::ImageDecode {
            origin: "<memory>".to_string(),
            source,
        })?;
        Ok(self.vectorize_image(&img))
    }

    pub fn vectorize_image(&self, img: &DynamicImage) -> FeatureVector {
        self.stages(img).feature_vector()
    }

    /// Same vector as [`Vectorizer::vectorize_image`], plus the intermediate images.
    pub fn vectorize_with_stages(&self, img: &DynamicImage) -> (FeatureVector, Stages) {
        let stages = self.stages(img);
        (stages.feature_vector(), stages)
    }

    fn stages(&self, img: &DynamicImage) -> Stages {
        let gray = to_luma(img);
        let resized = image::imageops::resize(&gray, self.width, self.height, FilterType::Triangle);
        let binary = binarize(&resized, self.cut);
        log::debug!(
            "vectorized {}x{} image to {}x{} ({} foreground pixels)",
            gray.width(),
            gray.height(),
            self.width,
            self.height,
            binary.pixels().filter(|p| p[0] > 0).count()
        );
        Stages {
            gray,
            resized,
            binary,
        }
    }
}

impl Stages {
    /// Row-major flatten of the binary stage into 0.0 / 1.0 components.
    pub fn feature_vector(&self) -> FeatureVector {
        FeatureVector::from_vec(
            self.binary
                .as_raw()
                .iter()
                .map(|&p| if p > 0 { 1.0 } else { 0.0 })
                .collect(),
        )
    }

    /// Write the stages as numbered PNG files into `dir`.
    pub fn save(&self, dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir).map_err(|source| VisionError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut written = Vec::with_capacity(3);
        for (name, img) in [
            ("1-gray", &self.gray),
            ("2-resized", &self.resized),
            ("3-binary", &self.binary),
        ] {
            let path = dir.join(format!("{prefix}-{name}.png"));
            img.save(&path).map_err(|source| VisionError::SaveStage {
                path: path.clone(),
                source,
            })?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Decode an image file, separating "missing" from "unreadable".
pub fn open_image(path: &Path) -> Result<DynamicImage> {
    if !path.exists() {
        return Err(VisionError::ImageNotFound(path.to_path_buf()));
    }
    let reader = image::ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => VisionError::ImageNotFound(path.to_path_buf()),
            _ => VisionError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;
    reader.decode().map_err(|source| VisionError::ImageDecode {
        origin: path.display().to_string(),
        source,
    })
}

/// Vectorize the file at `path` at the given `(width, height)` with the default cut point.
pub fn vectorize(path: impl AsRef<Path>, size: (u32, u32)) -> Result<FeatureVector> {
    Vectorizer::new(size.0, size.1)?.vectorize_path(path)
}

/// BT.601 luma in 14-bit fixed point; alpha is dropped and 16-bit input is reduced first.
pub fn to_luma(img: &DynamicImage) -> GrayImage {
    const R: u32 = 4899;
    const G: u32 = 9617;
    const B: u32 = 1868;
    const HALF: u32 = 1 << 13;

    let rgb = img.to_rgb8();
    let mut gray = GrayImage::new(rgb.width(), rgb.height());
    for (dst, src) in gray.pixels_mut().zip(rgb.pixels()) {
        let y = (src[0] as u32 * R + src[1] as u32 * G + src[2] as u32 * B + HALF) >> 14;
        *dst = Luma([y.min(255) as u8]);
    }
    gray
}

/// Pixels strictly above `cut` become 255, everything else 0.
pub fn binarize(gray: &GrayImage, cut: u8) -> GrayImage {
    let mut out = gray.clone();
    for p in out.pixels_mut() {
        p[0] = if p[0] > cut { 255 } else { 0 };
    }
    out
}
