//! Grayscale face frames and the sources they are loaded from.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use image::GrayImage;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("image not found: {0}")]
    NotFound(String),
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },
}

/// Anything that can resolve a dataset path key (e.g. `"alice/x.jpg"`) to a
/// grayscale image.
pub trait ImageSource {
    fn load(&self, key: &str) -> Result<GrayImage, ImageError>;
}

/// Loads images from files below a dataset root directory.
#[derive(Debug, Clone)]
pub struct DirectoryImageSource {
    root: PathBuf,
}

impl DirectoryImageSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ImageSource for DirectoryImageSource {
    fn load(&self, key: &str) -> Result<GrayImage, ImageError> {
        load_grayscale(&self.root.join(key))
    }
}

/// In-memory image table keyed by path key. Used for synthetic datasets.
#[derive(Debug, Clone, Default)]
pub struct MemoryImageSource {
    images: HashMap<String, GrayImage>,
}

impl MemoryImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, image: GrayImage) {
        self.images.insert(key.into(), image);
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

impl ImageSource for MemoryImageSource {
    fn load(&self, key: &str) -> Result<GrayImage, ImageError> {
        self.images
            .get(key)
            .cloned()
            .ok_or_else(|| ImageError::NotFound(key.to_string()))
    }
}

/// Decode an image file of any supported format and convert it to 8-bit luma.
pub fn load_grayscale(path: &Path) -> Result<GrayImage, ImageError> {
    if !path.exists() {
        return Err(ImageError::NotFound(path.display().to_string()));
    }
    let decoded = image::open(path).map_err(|source| ImageError::Decode {
        path: path.display().to_string(),
        source,
    })?;
    Ok(decoded.into_luma8())
}
