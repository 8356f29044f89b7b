use crate::{LocalizeSettings, QueryContext};
use log::*;

/// The constants of the correspondence score.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ScoreParameters {
    /// Distances at or below the clamp are scored as if they were equal to it.
    pub clamp: f64,
    pub scale: f64,
}

impl Default for ScoreParameters {
    fn default() -> Self {
        Self {
            clamp: 8.0,
            scale: 16.0,
        }
    }
}

impl From<&LocalizeSettings> for ScoreParameters {
    fn from(settings: &LocalizeSettings) -> Self {
        Self {
            clamp: settings.score_clamp,
            scale: settings.score_scale,
        }
    }
}

impl ScoreParameters {
    /// The gaussian penalty on the absolute distance, amplified by the inverse square.
    pub fn distance_weight(&self, distance: u32) -> f64 {
        let oper = (distance as f64).max(self.clamp) / self.scale;
        let oper2 = oper * oper;
        (-oper2).exp() / oper2
    }

    /// Scores a match of `distance` for a feature whose matches average `avg_feature_distance`.
    pub fn score(&self, distance: u32, avg_feature_distance: f64) -> f64 {
        let hamming_ratio = avg_feature_distance / (distance as f64 + 1.0);
        hamming_ratio * self.distance_weight(distance)
    }
}

/// The ratio test statistic of a match of `distance` to a point whose `count` matches sum to
/// `distance_sum`.
///
/// A point matched by nothing but zero distance descriptors is as distinctive as it gets, so
/// its statistic is 0.
pub fn ratio_test(distance: u32, count: usize, distance_sum: u64) -> f64 {
    if distance_sum == 0 {
        return 0.0;
    }
    let count = count as f64;
    distance as f64 * count * count / distance_sum as f64
}

/// Computes the score and ratio of every correspondence in `context`.
///
/// The boosted score starts out equal to the score.
pub fn score_correspondences(parameters: &ScoreParameters, context: &mut QueryContext) {
    let QueryContext {
        correspondences,
        feature_stats,
        point_stats,
        ..
    } = context;
    for correspondence in correspondences.iter_mut() {
        let avg_feature_distance = feature_stats[correspondence.feature]
            .mean()
            .unwrap_or_default();
        let point = point_stats
            .get(&correspondence.point)
            .copied()
            .unwrap_or_default();
        correspondence.score = parameters.score(correspondence.distance, avg_feature_distance);
        correspondence.boosted_score = correspondence.score;
        correspondence.ratio = ratio_test(
            correspondence.distance,
            point.count,
            point.distance_sum,
        );
    }
    trace!("scored {} correspondences", correspondences.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Correspondence, MatchStats};
    use approx::assert_relative_eq;
    use quickcheck_macros::quickcheck;

    #[test]
    fn clamped_distances_share_a_weight() {
        let parameters = ScoreParameters::default();
        let clamped = parameters.distance_weight(8);
        for d in 0..8 {
            assert_eq!(parameters.distance_weight(d), clamped);
        }
        // oper = 0.5, so exp(-0.25) / 0.25
        assert_relative_eq!(clamped, 4.0 * (-0.25f64).exp());
    }

    #[test]
    fn known_score() {
        let parameters = ScoreParameters::default();
        // hamming ratio 12 / 17, oper = 1
        assert_relative_eq!(
            parameters.score(16, 12.0),
            12.0 / 17.0 * (-1.0f64).exp(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn ratio_of_unmatched_point_is_zero() {
        assert_eq!(ratio_test(0, 1, 0), 0.0);
        assert_eq!(ratio_test(0, 3, 0), 0.0);
        assert_relative_eq!(ratio_test(4, 2, 10), 1.6);
    }

    #[quickcheck]
    fn score_decreases_beyond_the_clamp(distance: u8, avg: u8) -> bool {
        let parameters = ScoreParameters::default();
        let distance = 9 + u32::from(distance % 55);
        let avg = 1.0 + f64::from(avg);
        parameters.distance_weight(distance) > parameters.distance_weight(distance + 1)
            && parameters.score(distance, avg) > parameters.score(distance + 1, avg)
    }

    #[quickcheck]
    fn exact_match_scores_highest(distance: u8, avg: u8) -> bool {
        let parameters = ScoreParameters::default();
        let distance = 1 + u32::from(distance % 64);
        let avg = 1.0 + f64::from(avg);
        parameters.score(0, avg) > parameters.score(distance, avg)
    }

    #[test]
    fn scores_context() {
        let mut context = QueryContext::new(2, 0);
        let correspondences = [(0, 7, 4), (0, 8, 12), (1, 7, 0)];
        for &(feature, point, distance) in &correspondences {
            context.feature_stats[feature].add(distance);
            context
                .point_stats
                .entry(point)
                .or_insert_with(MatchStats::default)
                .add(distance);
            context.correspondences.push(Correspondence {
                feature,
                point,
                distance,
                word: 0,
                bucket_size: 1,
                score: 0.0,
                boosted_score: 0.0,
                ratio: 0.0,
            });
        }
        let parameters = ScoreParameters::default();
        score_correspondences(&parameters, &mut context);
        let c = &context.correspondences;
        // feature 0 averages 8, point 7 has two matches summing to 4
        assert_relative_eq!(c[0].score, parameters.score(4, 8.0));
        assert_relative_eq!(c[0].ratio, 4.0);
        assert_relative_eq!(c[1].ratio, 1.0);
        assert_eq!(c[2].score, 0.0);
        assert_eq!(c[2].ratio, 0.0);
        assert_eq!(c[1].boosted_score, c[1].score);
    }
}
