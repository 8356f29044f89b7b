use crate::{LocalizeSettings, QueryContext, QueryImage, RankedCamera};
use float_ord::FloatOrd;
use itertools::Itertools;
use log::*;
use nalgebra::Point2;
use std::cmp::Reverse;

/// A regular grid of bins over a query image.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SpatialGrid {
    pub width: u32,
    pub height: u32,
    pub cols: usize,
    pub rows: usize,
}

impl SpatialGrid {
    pub fn num_cells(&self) -> usize {
        self.cols * self.rows
    }

    /// The bin of a position relative to the image center with y pointing up.
    ///
    /// Positions outside of the image fall in the closest border bin.
    pub fn cell(&self, position: &Point2<f64>) -> usize {
        let half_width = 0.5 * (self.width as f64 - 1.0);
        let half_height = 0.5 * (self.height as f64 - 1.0);
        let cell_width = self.width as f64 / self.cols as f64;
        let cell_height = self.height as f64 / self.rows as f64;
        let col = clamp_index((position.x + half_width) / cell_width, self.cols);
        let row = clamp_index((position.y + half_height) / cell_height, self.rows);
        col * self.rows + row
    }
}

fn clamp_index(value: f64, len: usize) -> usize {
    // Float to integer casts saturate and map NaN to 0.
    (value.floor() as i64).clamp(0, len as i64 - 1) as usize
}

/// The correspondences routed to one grid cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpatialBin {
    /// Correspondence indices.
    pub candidates: Vec<usize>,
    /// The most correspondences that may be selected in this bin.
    pub quota: usize,
    pub contained: usize,
}

/// Splits `budget` between bins in proportion to the square root of their population.
///
/// Rounding uses the largest remainder method so the quotas add up to exactly `budget` unless
/// every bin is empty, in which case every quota is zero. Equal remainders favor the lower
/// bin.
pub fn apportion(populations: &[usize], budget: usize) -> Vec<usize> {
    let weights: Vec<f64> = populations.iter().map(|&n| (n as f64).sqrt()).collect();
    let total: f64 = weights.iter().sum();
    if total == 0.0 {
        return vec![0; populations.len()];
    }
    let exact: Vec<f64> = weights
        .iter()
        .map(|&w| budget as f64 * w / total)
        .collect();
    let mut quotas: Vec<usize> = exact.iter().map(|&e| e.floor() as usize).collect();
    let assigned: usize = quotas.iter().sum();
    let remainders: Vec<usize> = (0..populations.len())
        .filter(|&ix| populations[ix] != 0)
        .sorted_by_key(|&ix| Reverse(FloatOrd(exact[ix] - quotas[ix] as f64)))
        .collect();
    for &ix in remainders.iter().cycle().take(budget.saturating_sub(assigned)) {
        quotas[ix] += 1;
    }
    quotas
}

/// The knobs of correspondence selection.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SelectionParameters {
    /// The number of top ranked images whose votes are selected from.
    pub top_rank: usize,
    /// The number of top ranked images whose votes form the potential set.
    pub top_rank_potential: usize,
    pub score_threshold: f64,
    pub budget: usize,
    pub augmentation_factor: f64,
    pub image_distance_cap: f64,
    pub grid_cols: usize,
    pub grid_rows: usize,
}

impl From<&LocalizeSettings> for SelectionParameters {
    fn from(settings: &LocalizeSettings) -> Self {
        Self {
            top_rank: settings.top_rank,
            top_rank_potential: settings.top_rank_potential,
            score_threshold: settings.score_threshold,
            budget: settings.selection_budget,
            augmentation_factor: settings.augmentation_factor,
            image_distance_cap: settings.image_distance_cap,
            grid_cols: settings.grid_cols,
            grid_rows: settings.grid_rows,
        }
    }
}

/// How a correspondence got into the primary set.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChosenBy {
    /// A confident vote of a top ranked image.
    Direct,
    /// Picked from its bin's boosted candidates to fill the remaining quota.
    Backfill,
}

/// The outcome of selection for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Correspondence indices in the order they were chosen.
    pub primary: Vec<usize>,
    /// Every vote of the top images for the potential set, without duplicates. It may share
    /// correspondences with `primary`.
    pub potential: Vec<usize>,
    pub bins: Vec<SpatialBin>,
    /// The bin each correspondence was routed to, indexed by correspondence.
    pub assigned_bin: Vec<Option<usize>>,
    /// Indexed by correspondence.
    pub chosen: Vec<Option<ChosenBy>>,
}

impl Selection {
    /// The selection of a query without any ranked image.
    pub fn empty(num_correspondences: usize, num_bins: usize) -> Self {
        Self {
            primary: vec![],
            potential: vec![],
            bins: vec![SpatialBin::default(); num_bins],
            assigned_bin: vec![None; num_correspondences],
            chosen: vec![None; num_correspondences],
        }
    }
}

/// Lets top ranked images with strong evidence promote their weak votes.
///
/// For every top image whose votes are close on average, the boosted score of each vote below
/// the threshold grows by `0.5 * ln(1 + confident / weak) * threshold`. Boosts from several
/// images add up.
pub fn boost_scores(
    ranking: &[RankedCamera],
    parameters: &SelectionParameters,
    context: &mut QueryContext,
) {
    let threshold = parameters.score_threshold;
    let QueryContext {
        correspondences,
        cameras,
        ..
    } = context;
    for ranked in ranking.iter().take(parameters.top_rank) {
        let votes = &cameras[ranked.camera];
        if votes.avg_hamming_distance > parameters.image_distance_cap {
            continue;
        }
        let confident = votes
            .votes
            .iter()
            .filter(|&&id| correspondences[id].score >= threshold)
            .count();
        let weak = votes.votes.len() - confident;
        if weak == 0 {
            continue;
        }
        let step = 0.5 * (1.0 + confident as f64 / weak as f64).ln() * threshold;
        trace!(
            "image {} boosts {} weak votes by {}",
            ranked.camera,
            weak,
            step
        );
        for &id in &votes.votes {
            let correspondence = &mut correspondences[id];
            if correspondence.score < threshold {
                correspondence.boosted_score += step;
            }
        }
    }
}

/// Selects a spatially balanced set of confident correspondences from the top ranked images.
///
/// Boosted votes of the top images are routed to the bins of their features and each bin gets
/// a quota. Confident votes are then chosen in rank order while their bin has room, and the
/// remaining quota is backfilled with the best boosted candidates until the selection has
/// grown by the augmentation factor. Scores must have been boosted with [`boost_scores`].
pub fn select(
    ranking: &[RankedCamera],
    context: &QueryContext,
    image: &QueryImage,
    parameters: &SelectionParameters,
) -> Selection {
    let grid = SpatialGrid {
        width: image.width,
        height: image.height,
        cols: parameters.grid_cols,
        rows: parameters.grid_rows,
    };
    let threshold = parameters.score_threshold;
    let correspondences = &context.correspondences;
    let cell_of = |id: usize| grid.cell(&image.features[correspondences[id].feature].position);
    let top = || {
        ranking
            .iter()
            .take(parameters.top_rank)
            .map(|ranked| &context.cameras[ranked.camera])
    };
    let mut selection = Selection::empty(correspondences.len(), grid.num_cells());

    for votes in top().filter(|votes| votes.avg_hamming_distance <= parameters.image_distance_cap)
    {
        for &id in &votes.votes {
            if selection.assigned_bin[id].is_none() && correspondences[id].boosted_score >= threshold
            {
                let cell = cell_of(id);
                selection.bins[cell].candidates.push(id);
                selection.assigned_bin[id] = Some(cell);
            }
        }
    }

    let populations: Vec<usize> = selection
        .bins
        .iter()
        .map(|bin| bin.candidates.len())
        .collect();
    for (bin, quota) in selection
        .bins
        .iter_mut()
        .zip(apportion(&populations, parameters.budget))
    {
        bin.quota = quota;
    }

    for votes in top() {
        for &id in &votes.votes {
            if selection.chosen[id].is_some() || correspondences[id].score < threshold {
                continue;
            }
            let bin = &mut selection.bins[cell_of(id)];
            if bin.contained < bin.quota {
                bin.contained += 1;
                selection.chosen[id] = Some(ChosenBy::Direct);
                selection.primary.push(id);
            }
        }
    }
    let direct = selection.primary.len();

    let target = (parameters.augmentation_factor * direct as f64).floor() as usize;
    for bin in &mut selection.bins {
        if selection.primary.len() >= target {
            break;
        }
        bin.candidates
            .sort_by_key(|&id| Reverse(FloatOrd(correspondences[id].boosted_score)));
        for &id in &bin.candidates {
            if bin.contained >= bin.quota {
                break;
            }
            if selection.chosen[id].is_none() && correspondences[id].boosted_score >= threshold {
                bin.contained += 1;
                selection.chosen[id] = Some(ChosenBy::Backfill);
                selection.primary.push(id);
            }
        }
    }

    let mut potential = vec![false; correspondences.len()];
    for ranked in ranking.iter().take(parameters.top_rank_potential) {
        for &id in &context.cameras[ranked.camera].votes {
            if !potential[id] {
                potential[id] = true;
                selection.potential.push(id);
            }
        }
    }

    debug!(
        "selected {} correspondences, {} directly, with {} potential ones",
        selection.primary.len(),
        direct,
        selection.potential.len()
    );
    selection
}
