use crate::{
    Correspondence, EvidenceCriterion, GpsCoordinate, GpsTable, QueryContext, Reconstruction,
    Result,
};
use float_ord::FloatOrd;
use log::*;
use std::collections::{HashMap, HashSet};

/// The votes a database image received from one query.
#[derive(Debug, Clone, Default)]
pub struct CameraVotes {
    /// Correspondence indices with at most one entry per query feature, in the order the
    /// features first voted.
    pub votes: Vec<usize>,
    /// The slot in `votes` held by each feature.
    by_feature: HashMap<usize, usize>,
    /// Every correspondence that voted, including the ones replaced in `votes`.
    pub multiple: Vec<usize>,
    pub probability: f64,
    /// The number of votes with a confident score.
    pub valid_correspondences: usize,
    pub avg_hamming_distance: f64,
    /// The visual words that produced a confident vote.
    pub distinct_words: HashSet<usize>,
}

impl CameraVotes {
    /// Records the vote of correspondence `id`.
    ///
    /// When the feature already voted, the new correspondence takes over its slot only if it
    /// scores strictly higher.
    pub fn vote(&mut self, id: usize, correspondences: &[Correspondence]) {
        let correspondence = &correspondences[id];
        match self.by_feature.get(&correspondence.feature) {
            Some(&slot) => {
                if correspondence.score > correspondences[self.votes[slot]].score {
                    self.votes[slot] = id;
                }
            }
            None => {
                self.by_feature
                    .insert(correspondence.feature, self.votes.len());
                self.votes.push(id);
            }
        }
        self.multiple.push(id);
    }

    /// The amount of evidence compared against the minimum to rank this image.
    pub fn evidence(&self, criterion: EvidenceCriterion) -> usize {
        match criterion {
            EvidenceCriterion::DistinctWords => self.distinct_words.len(),
            EvidenceCriterion::ValidCorrespondences => self.valid_correspondences,
        }
    }

    /// Computes the probability, confident vote count and mean distance of the votes.
    ///
    /// The probability is normalized by the square root of the number of points the image
    /// sees, since images with many points collect incidental votes more easily.
    pub fn summarize(
        &mut self,
        correspondences: &[Correspondence],
        num_points: usize,
        score_threshold: f64,
    ) {
        self.probability = 0.0;
        self.valid_correspondences = 0;
        self.avg_hamming_distance = 0.0;
        self.distinct_words.clear();
        if self.votes.is_empty() {
            return;
        }
        let mut distance_sum = 0.0;
        for correspondence in self.votes.iter().map(|&id| &correspondences[id]) {
            if correspondence.score >= score_threshold {
                self.probability += correspondence.score;
                self.valid_correspondences += 1;
                self.distinct_words.insert(correspondence.word);
            }
            distance_sum += correspondence.distance as f64;
        }
        self.avg_hamming_distance = distance_sum / self.votes.len() as f64;
        self.probability = if num_points == 0 {
            0.0
        } else {
            self.probability / (num_points as f64).sqrt()
        };
    }
}

/// Lets every correspondence that passes the ratio test vote for the images seeing its point.
///
/// Returns the number of correspondences that passed.
pub fn cast_votes(
    reconstruction: &Reconstruction,
    ratio_test_threshold: f64,
    context: &mut QueryContext,
) -> usize {
    let QueryContext {
        correspondences,
        cameras,
        ..
    } = context;
    let mut passed = 0;
    for (id, correspondence) in correspondences.iter().enumerate() {
        if correspondence.ratio > ratio_test_threshold {
            continue;
        }
        passed += 1;
        for &camera in &reconstruction.points[correspondence.point].views {
            cameras[camera].vote(id, correspondences);
        }
    }
    debug!(
        "{} of {} correspondences pass the ratio test",
        passed,
        correspondences.len()
    );
    passed
}

/// Summarizes the votes of every image.
pub fn summarize_votes(
    reconstruction: &Reconstruction,
    score_threshold: f64,
    context: &mut QueryContext,
) {
    let QueryContext {
        correspondences,
        cameras,
        ..
    } = context;
    for (votes, camera) in cameras.iter_mut().zip(&reconstruction.cameras) {
        votes.summarize(correspondences, camera.points.len(), score_threshold);
    }
}

/// Keeps database images close to the query's gps coordinate.
#[derive(Debug, Copy, Clone)]
pub struct GpsFilter<'a> {
    pub query: GpsCoordinate,
    pub database: &'a GpsTable,
    pub radius_km: f64,
}

impl<'a> GpsFilter<'a> {
    /// The distance in kilometers from the query to the image with stable id `camera_id`.
    pub fn distance_km(&self, camera_id: usize) -> Result<f64> {
        Ok(self
            .query
            .distance_km(&self.database.get("database image", camera_id)?))
    }

    pub fn accepts(&self, camera_id: usize) -> Result<bool> {
        Ok(self.distance_km(camera_id)? < self.radius_km)
    }
}

/// A database image that made it into the ranking.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RankedCamera {
    /// Index into the reconstruction's cameras.
    pub camera: usize,
    pub probability: f64,
}

/// Ranks the images with enough evidence by decreasing probability.
///
/// Images with equal probability stay in index order. With a gps filter, only images within
/// its radius are ranked.
pub fn rank_cameras(
    reconstruction: &Reconstruction,
    context: &QueryContext,
    min_evidence: usize,
    criterion: EvidenceCriterion,
    gps: Option<&GpsFilter>,
) -> Result<Vec<RankedCamera>> {
    let mut ranking = vec![];
    for (ix, (votes, camera)) in context
        .cameras
        .iter()
        .zip(&reconstruction.cameras)
        .enumerate()
    {
        if votes.evidence(criterion) < min_evidence {
            continue;
        }
        if let Some(gps) = gps {
            if !gps.accepts(camera.id)? {
                continue;
            }
        }
        ranking.push(RankedCamera {
            camera: ix,
            probability: votes.probability,
        });
    }
    ranking.sort_by_key(|ranked| std::cmp::Reverse(FloatOrd(ranked.probability)));
    debug!("{} database images ranked", ranking.len());
    Ok(ranking)
}
