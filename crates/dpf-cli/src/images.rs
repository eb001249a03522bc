//! Image discovery and loading.

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::DynamicImage;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

/// Returns true if the path has a supported image extension.
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Expands directories into their image files, sorted by name.
pub fn collect_images(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(path)
                .with_context(|| format!("Failed to read directory {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_image(p))
                .collect();
            entries.sort();
            files.extend(entries);
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

/// Scales and crops `img` to exactly fill `width` x `height`.
pub fn fit(img: DynamicImage, width: u32, height: u32) -> DynamicImage {
    if img.width() == width && img.height() == height {
        img
    } else {
        img.resize_to_fill(width, height, FilterType::Triangle)
    }
}

/// Decodes an image file and fits it to the panel.
pub fn load_fitted(path: &Path, width: u32, height: u32) -> Result<DynamicImage> {
    let img = image::open(path).with_context(|| format!("Failed to load {}", path.display()))?;
    tracing::debug!(
        "Loaded {} [{}x{}]",
        path.display(),
        img.width(),
        img.height()
    );
    Ok(fit(img, width, height))
}
