use crate::{AssignmentStore, Correspondence, QueryContext, QueryImage, Result, Vocabulary};
use hamming_embedding::Descriptor;
use log::*;
use std::collections::HashMap;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// A database point matched by one query feature.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub point: usize,
    pub distance: u32,
    pub word: usize,
    pub bucket_size: usize,
}

/// Assigns every feature of `image` to its visual words.
pub fn assign_words<V: Vocabulary + Sync>(vocabulary: &V, image: &QueryImage) -> Vec<Vec<usize>> {
    #[cfg(not(feature = "rayon"))]
    let words = image
        .features
        .iter()
        .map(|feature| vocabulary.assign(&feature.descriptor))
        .collect();
    #[cfg(feature = "rayon")]
    let words = image
        .features
        .par_iter()
        .map(|feature| vocabulary.assign(&feature.descriptor))
        .collect();
    words
}

/// Finds the database points a descriptor matches in the given visual words.
///
/// A database descriptor matches when its signature is within `threshold` of the query
/// signature for the same word. Each point is returned once, with its smallest distance; on
/// ties the first match found is kept.
pub fn feature_candidates(
    store: &AssignmentStore,
    descriptor: &Descriptor,
    words: &[usize],
    threshold: u32,
) -> Result<Vec<Candidate>> {
    let projected = store.embedding.project(descriptor);
    let mut candidates: Vec<Candidate> = vec![];
    let mut by_point: HashMap<usize, usize> = HashMap::new();
    for &word in words {
        let signature = store.embedding.binarize(&projected, word)?;
        let bucket = store.bucket(word);
        for entry in bucket {
            let distance = signature.distance(store.signature(entry));
            if distance > threshold {
                continue;
            }
            let candidate = Candidate {
                point: entry.point,
                distance,
                word,
                bucket_size: bucket.len(),
            };
            match by_point.get(&entry.point) {
                Some(&ix) => {
                    if distance < candidates[ix].distance {
                        candidates[ix] = candidate;
                    }
                }
                None => {
                    by_point.insert(entry.point, candidates.len());
                    candidates.push(candidate);
                }
            }
        }
    }
    Ok(candidates)
}

/// Matches every feature of `image` against the database and records the correspondences.
///
/// Candidates are searched per feature, in parallel with the `rayon` feature, and merged into
/// `context` in feature order so correspondence indices do not depend on scheduling.
pub fn match_features(
    store: &AssignmentStore,
    image: &QueryImage,
    words: &[Vec<usize>],
    threshold: u32,
    context: &mut QueryContext,
) -> Result<()> {
    #[cfg(not(feature = "rayon"))]
    let candidates = image
        .features
        .iter()
        .zip(words)
        .map(|(feature, words)| feature_candidates(store, &feature.descriptor, words, threshold))
        .collect::<Result<Vec<_>>>()?;
    #[cfg(feature = "rayon")]
    let candidates = image
        .features
        .par_iter()
        .zip(words.par_iter())
        .map(|(feature, words)| feature_candidates(store, &feature.descriptor, words, threshold))
        .collect::<Result<Vec<_>>>()?;

    for (feature, candidates) in candidates.into_iter().enumerate() {
        trace!("feature {} matched {} points", feature, candidates.len());
        for candidate in candidates {
            context.feature_stats[feature].add(candidate.distance);
            context
                .point_stats
                .entry(candidate.point)
                .or_default()
                .add(candidate.distance);
            context.correspondences.push(Correspondence {
                feature,
                point: candidate.point,
                distance: candidate.distance,
                word: candidate.word,
                bucket_size: candidate.bucket_size,
                score: 0.0,
                boosted_score: 0.0,
                ratio: 0.0,
            });
        }
    }
    debug!(
        "{} correspondences from {} features",
        context.correspondences.len(),
        image.len()
    );
    Ok(())
}
