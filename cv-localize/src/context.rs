use crate::CameraVotes;
use std::collections::HashMap;

/// A tentative match between a query feature and a database point.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Correspondence {
    /// Index into the query image's features.
    pub feature: usize,
    /// Index into the reconstruction's points.
    pub point: usize,
    /// The smallest Hamming distance between the feature and a descriptor of the point.
    pub distance: u32,
    /// The visual word the best descriptor was found in.
    pub word: usize,
    /// The number of database descriptors in that word.
    pub bucket_size: usize,
    pub score: f64,
    /// The score after images with strong evidence have promoted their weaker votes.
    pub boosted_score: f64,
    /// The ratio test statistic. Lower is more distinctive.
    pub ratio: f64,
}

/// The running count and sum of the Hamming distances of a feature's or point's matches.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct MatchStats {
    pub count: usize,
    pub distance_sum: u64,
}

impl MatchStats {
    pub fn add(&mut self, distance: u32) {
        self.count += 1;
        self.distance_sum += u64::from(distance);
    }

    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.distance_sum as f64 / self.count as f64)
        }
    }
}

/// All the state accumulated while localizing one query image.
///
/// A context is built for every query and dropped afterwards, so nothing can leak from one
/// query into the next.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub correspondences: Vec<Correspondence>,
    /// Indexed by query feature.
    pub feature_stats: Vec<MatchStats>,
    /// Only points that were matched are present.
    pub point_stats: HashMap<usize, MatchStats>,
    /// Indexed like the reconstruction's cameras.
    pub cameras: Vec<CameraVotes>,
}

impl QueryContext {
    pub fn new(num_features: usize, num_cameras: usize) -> Self {
        Self {
            correspondences: vec![],
            feature_stats: vec![MatchStats::default(); num_features],
            point_stats: HashMap::new(),
            cameras: vec![CameraVotes::default(); num_cameras],
        }
    }

    pub fn point_stats(&self, point: usize) -> MatchStats {
        self.point_stats.get(&point).copied().unwrap_or_default()
    }
}
