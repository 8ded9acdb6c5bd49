//! Derived-size variants: the naming rule the scanner relies on, and the image generator.

use std::path::Path;
use std::sync::OnceLock;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::catalog::DerivedFile;
use crate::error::Result;

/// Naming rule for derived-size variants: `name-WIDTHxHEIGHT.ext`.
///
/// The scanner uses it to tell a resized copy of a registered file apart from an unregistered
/// original; registering a variant as its own record would break scan idempotence.
pub struct VariantName;

impl VariantName {
    fn pattern() -> &'static Regex {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        PATTERN.get_or_init(|| {
            Regex::new(r"-[0-9]+x[0-9]+\.[^.]+$").expect("variant pattern is a valid regex")
        })
    }

    /// Whether `filename` looks like a derived-size variant.
    pub fn matches(filename: &str) -> bool {
        Self::pattern().is_match(filename)
    }

    /// Build the variant file name for `filename` at the given size.
    pub fn format(filename: &str, width: u32, height: u32) -> String {
        let path = Path::new(filename);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        match path.extension() {
            Some(ext) => format!("{}-{}x{}.{}", stem, width, height, ext.to_string_lossy()),
            None => format!("{}-{}x{}", stem, width, height),
        }
    }
}

/// One configured variant size.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VariantSize {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Crop to the exact box instead of fitting inside it.
    #[serde(default)]
    pub crop: bool,
}

impl VariantSize {
    pub fn new(name: &str, width: u32, height: u32, crop: bool) -> Self {
        Self {
            name: name.to_string(),
            width,
            height,
            crop,
        }
    }

    /// Built-in sizes: thumbnail (cropped), medium, large.
    pub fn defaults() -> Vec<VariantSize> {
        vec![
            VariantSize::new("thumbnail", 150, 150, true),
            VariantSize::new("medium", 300, 300, false),
            VariantSize::new("large", 1024, 1024, false),
        ]
    }
}

/// Produces derived files for a newly registered primary file.
pub trait VariantGenerator: Send + Sync {
    /// Write variants next to `file` and describe them. Files that have no variants yield an
    /// empty list.
    fn generate(&self, file: &Path, mime_type: Option<&str>) -> Result<Vec<DerivedFile>>;
}

/// Generator that never produces variants.
pub struct NoVariants;

impl VariantGenerator for NoVariants {
    fn generate(&self, _file: &Path, _mime_type: Option<&str>) -> Result<Vec<DerivedFile>> {
        Ok(Vec::new())
    }
}

/// Resizes raster images into the configured sizes.
///
/// A size is skipped when the source already fits inside it.
pub struct ImageVariants {
    sizes: Vec<VariantSize>,
}

impl ImageVariants {
    pub fn new(sizes: Vec<VariantSize>) -> Self {
        Self { sizes }
    }

    /// Target dimensions for `size`, or `None` when no resize is needed.
    fn target_dimensions(size: &VariantSize, width: u32, height: u32) -> Option<(u32, u32)> {
        if width <= size.width && height <= size.height {
            return None;
        }
        if size.crop {
            return Some((width.min(size.width), height.min(size.height)));
        }
        let scale = f64::min(
            size.width as f64 / width as f64,
            size.height as f64 / height as f64,
        );
        let w = ((width as f64 * scale).round() as u32).max(1);
        let h = ((height as f64 * scale).round() as u32).max(1);
        Some((w, h))
    }
}

impl VariantGenerator for ImageVariants {
    fn generate(&self, file: &Path, mime_type: Option<&str>) -> Result<Vec<DerivedFile>> {
        if !mime_type.is_some_and(|m| m.starts_with("image/")) {
            return Ok(Vec::new());
        }
        if image::ImageFormat::from_path(file).is_err() {
            return Ok(Vec::new());
        }

        let filename = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let dir = file.parent().unwrap_or(Path::new("."));
        let source = image::open(file)?;

        let mut derived = Vec::new();
        if let Err(e) = self.write_variants(&source, dir, &filename, &mut derived) {
            // Leave no variants behind that no record will ever point at.
            for variant in &derived {
                if let Err(remove_err) = std::fs::remove_file(dir.join(&variant.file)) {
                    warn!(file = %variant.file, error = %remove_err, "failed to remove variant");
                }
            }
            return Err(e);
        }
        Ok(derived)
    }
}

impl ImageVariants {
    /// Write each size next to the source, pushing to `derived` as each file lands.
    fn write_variants(
        &self,
        source: &DynamicImage,
        dir: &Path,
        filename: &str,
        derived: &mut Vec<DerivedFile>,
    ) -> Result<()> {
        let (width, height) = source.dimensions();
        for size in &self.sizes {
            let Some((w, h)) = Self::target_dimensions(size, width, height) else {
                continue;
            };
            let resized = if size.crop {
                source.resize_to_fill(w, h, FilterType::Lanczos3)
            } else {
                source.resize_exact(w, h, FilterType::Lanczos3)
            };
            let variant = VariantName::format(filename, w, h);
            resized.save(dir.join(&variant))?;
            debug!(file = %variant, size = %size.name, "variant generated");
            derived.push(DerivedFile {
                suffix: size.name.clone(),
                file: variant,
                width: w,
                height: h,
            });
        }
        Ok(())
    }
}
