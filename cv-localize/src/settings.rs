use crate::{Error, Result};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// Which per-camera count must reach [`LocalizeSettings::min_evidence`] for a database image
/// to be ranked.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde-serialize", serde(rename_all = "snake_case"))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EvidenceCriterion {
    /// The number of distinct visual words that produced a confident vote.
    DistinctWords,
    /// The number of confident votes.
    ValidCorrespondences,
}

/// The settings for the localization process.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone)]
pub struct LocalizeSettings {
    /// The number of top ranked database images used for selection
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_top_rank"))]
    pub top_rank: usize,
    /// The number of top ranked database images whose votes form the potential set
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_top_rank_potential")
    )]
    pub top_rank_potential: usize,
    /// The maximum ratio test value for a correspondence to vote
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_ratio_test_threshold")
    )]
    pub ratio_test_threshold: f64,
    /// The minimum score of a confident correspondence
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_score_threshold")
    )]
    pub score_threshold: f64,
    /// The Hamming distance above which a database descriptor does not match
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_hamming_distance_threshold")
    )]
    pub hamming_distance_threshold: u32,
    /// The minimum evidence a database image needs to be ranked
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_min_evidence"))]
    pub min_evidence: usize,
    /// The count that is compared against `min_evidence`
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_evidence_criterion")
    )]
    pub evidence_criterion: EvidenceCriterion,
    /// Restrict the ranking to database images close to the query's gps coordinate
    #[cfg_attr(feature = "serde-serialize", serde(default))]
    pub use_gps: bool,
    /// The radius in kilometers used when `use_gps` is set
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_gps_radius_km"))]
    pub gps_radius_km: f64,
    /// The total number of correspondences the spatial quotas distribute
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_selection_budget")
    )]
    pub selection_budget: usize,
    /// Backfilling stops once the selection grows by this factor
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_augmentation_factor")
    )]
    pub augmentation_factor: f64,
    /// The maximum average Hamming distance of a database image whose votes are boosted and binned
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_image_distance_cap")
    )]
    pub image_distance_cap: f64,
    /// The number of spatial bins across the query image
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_grid_cells"))]
    pub grid_cols: usize,
    /// The number of spatial bins down the query image
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_grid_cells"))]
    pub grid_rows: usize,
    /// Distances at or below this value are scored the same
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_score_clamp"))]
    pub score_clamp: f64,
    /// The distance scale of the score's gaussian decay
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_score_scale"))]
    pub score_scale: f64,
    /// The quantization scale of RootSIFT descriptors
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_root_sift_scale")
    )]
    pub root_sift_scale: f32,
    /// Skip queries whose keypoints lie outside of the reported image size
    #[cfg_attr(feature = "serde-serialize", serde(default))]
    pub skip_out_of_bounds_queries: bool,
    /// The number of visual words each query descriptor is assigned to
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_vocabulary_paths")
    )]
    pub vocabulary_paths: usize,
}

impl Default for LocalizeSettings {
    fn default() -> Self {
        Self {
            top_rank: default_top_rank(),
            top_rank_potential: default_top_rank_potential(),
            ratio_test_threshold: default_ratio_test_threshold(),
            score_threshold: default_score_threshold(),
            hamming_distance_threshold: default_hamming_distance_threshold(),
            min_evidence: default_min_evidence(),
            evidence_criterion: default_evidence_criterion(),
            use_gps: false,
            gps_radius_km: default_gps_radius_km(),
            selection_budget: default_selection_budget(),
            augmentation_factor: default_augmentation_factor(),
            image_distance_cap: default_image_distance_cap(),
            grid_cols: default_grid_cells(),
            grid_rows: default_grid_cells(),
            score_clamp: default_score_clamp(),
            score_scale: default_score_scale(),
            root_sift_scale: default_root_sift_scale(),
            skip_out_of_bounds_queries: false,
            vocabulary_paths: default_vocabulary_paths(),
        }
    }
}

impl LocalizeSettings {
    /// Checks the settings that would otherwise produce divisions by zero or empty grids.
    pub fn validate(&self) -> Result<()> {
        let invalid = |name, message: &str| {
            Err(Error::Setting {
                name,
                message: message.to_string(),
            })
        };
        if !(self.score_clamp > 0.0) {
            return invalid("score_clamp", "must be positive");
        }
        if !(self.score_scale > 0.0) {
            return invalid("score_scale", "must be positive");
        }
        if self.grid_cols == 0 || self.grid_rows == 0 {
            return invalid("grid_cols/grid_rows", "the grid needs at least one cell");
        }
        if !(self.augmentation_factor >= 1.0) {
            return invalid("augmentation_factor", "must be at least 1");
        }
        if !(self.root_sift_scale > 0.0) {
            return invalid("root_sift_scale", "must be positive");
        }
        if self.vocabulary_paths == 0 {
            return invalid("vocabulary_paths", "must be at least 1");
        }
        if self.hamming_distance_threshold > hamming_embedding::SIGNATURE_BITS as u32 {
            log::warn!(
                "hamming distance threshold {} is above the signature length, so every descriptor in a word matches",
                self.hamming_distance_threshold
            );
        }
        Ok(())
    }
}

fn default_top_rank() -> usize {
    5
}

fn default_top_rank_potential() -> usize {
    10
}

fn default_ratio_test_threshold() -> f64 {
    10.0
}

fn default_score_threshold() -> f64 {
    1.0
}

fn default_hamming_distance_threshold() -> u32 {
    24
}

fn default_min_evidence() -> usize {
    3
}

fn default_evidence_criterion() -> EvidenceCriterion {
    EvidenceCriterion::DistinctWords
}

fn default_gps_radius_km() -> f64 {
    0.3
}

fn default_selection_budget() -> usize {
    30
}

fn default_augmentation_factor() -> f64 {
    1.33
}

fn default_image_distance_cap() -> f64 {
    64.0
}

fn default_grid_cells() -> usize {
    4
}

fn default_score_clamp() -> f64 {
    8.0
}

fn default_score_scale() -> f64 {
    16.0
}

fn default_root_sift_scale() -> f32 {
    hamming_embedding::ROOT_SIFT_SCALE
}

fn default_vocabulary_paths() -> usize {
    1
}
