use crate::{Error, Result};
use hamming_embedding::{root_sift_scaled, Descriptor};
use log::*;
use nalgebra::Point2;
use std::path::{Path, PathBuf};

/// A detected keypoint in pixel coordinates, with the origin at the top left corner.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct KeyPoint {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
    pub orientation: f64,
}

/// A query feature ready to be matched.
#[derive(Debug, Clone)]
pub struct QueryFeature {
    /// The keypoint position relative to the image center, with y pointing up.
    pub position: Point2<f64>,
    /// The RootSIFT normalized descriptor.
    pub descriptor: Descriptor,
}

/// The features of one query image.
#[derive(Debug, Clone)]
pub struct QueryImage {
    pub width: u32,
    pub height: u32,
    pub features: Vec<QueryFeature>,
    /// Set when a keypoint lies beyond the reported image size, which usually means the
    /// dimensions belong to another image.
    pub out_of_bounds: bool,
}

impl QueryImage {
    /// Normalizes the descriptors and centers the keypoints of an image.
    ///
    /// Features with all-zero descriptors cannot be normalized and are dropped.
    pub fn new(
        width: u32,
        height: u32,
        keypoints: impl IntoIterator<Item = (KeyPoint, Descriptor)>,
        root_sift_scale: f32,
    ) -> Self {
        let half_width = (width as f64 - 1.0) / 2.0;
        let half_height = (height as f64 - 1.0) / 2.0;
        let mut max_x = 0.0f64;
        let mut max_y = 0.0f64;
        let mut dropped = 0;
        let features: Vec<QueryFeature> = keypoints
            .into_iter()
            .filter_map(|(keypoint, descriptor)| {
                max_x = max_x.max(keypoint.x);
                max_y = max_y.max(keypoint.y);
                let descriptor = root_sift_scaled(&descriptor, root_sift_scale);
                if descriptor.is_none() {
                    dropped += 1;
                }
                Some(QueryFeature {
                    position: Point2::new(keypoint.x - half_width, half_height - keypoint.y),
                    descriptor: descriptor?,
                })
            })
            .collect();
        if dropped != 0 {
            debug!("dropped {} features with empty descriptors", dropped);
        }
        let out_of_bounds = max_x > width as f64 || max_y > height as f64;
        Self {
            width,
            height,
            features,
            out_of_bounds,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Looks up the pixel size of the image a keypoint file was extracted from.
pub trait ImageMetadata {
    fn dimensions(&self, keyfile: &Path) -> Result<(u32, u32)>;
}

/// Reads the dimensions from the `.jpg` file next to each keypoint file.
#[derive(Debug, Copy, Clone, Default)]
pub struct ImageFileMetadata;

impl ImageMetadata for ImageFileMetadata {
    fn dimensions(&self, keyfile: &Path) -> Result<(u32, u32)> {
        let path: PathBuf = keyfile.with_extension("jpg");
        image::image_dimensions(&path).map_err(|source| Error::Image { path, source })
    }
}

/// Every image has the same dimensions.
#[derive(Debug, Copy, Clone)]
pub struct FixedMetadata {
    pub width: u32,
    pub height: u32,
}

impl ImageMetadata for FixedMetadata {
    fn dimensions(&self, _: &Path) -> Result<(u32, u32)> {
        Ok((self.width, self.height))
    }
}
