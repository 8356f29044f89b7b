use crate::{
    tokens::{read_to_string, Tokens},
    Error, Result,
};
use float_ord::FloatOrd;
use hamming_embedding::{Descriptor, DESCRIPTOR_DIMENSIONS};
use log::*;
use std::path::Path;

/// Assigns descriptors to visual words.
///
/// Building the vocabulary happens elsewhere; localization only needs the assignment.
pub trait Vocabulary {
    /// The number of visual words.
    fn num_words(&self) -> usize;

    /// The words a normalized descriptor belongs to, best first. Must not be empty.
    fn assign(&self, descriptor: &Descriptor) -> Vec<usize>;
}

impl<V> Vocabulary for &V
where
    V: Vocabulary + ?Sized,
{
    fn num_words(&self) -> usize {
        (**self).num_words()
    }

    fn assign(&self, descriptor: &Descriptor) -> Vec<usize> {
        (**self).assign(descriptor)
    }
}

/// A vocabulary searched exhaustively.
///
/// Each descriptor is assigned to its `paths` closest cluster centers in squared euclidean
/// distance, with ties going to the lower word id.
#[derive(Debug, Clone)]
pub struct FlatVocabulary {
    centers: Vec<[f32; DESCRIPTOR_DIMENSIONS]>,
    paths: usize,
}

impl FlatVocabulary {
    pub fn new(centers: Vec<[f32; DESCRIPTOR_DIMENSIONS]>, paths: usize) -> Result<Self> {
        if centers.is_empty() {
            return Err(Error::inconsistent("vocabulary", "no cluster centers"));
        }
        if paths == 0 {
            return Err(Error::Setting {
                name: "vocabulary_paths",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(Self { centers, paths })
    }

    /// Parses cluster centers stored as `nb_words nb_dimensions` followed by one row of
    /// components per word.
    pub fn parse(text: &str, paths: usize) -> Result<Self> {
        let mut tokens = Tokens::new("cluster centers", text);
        let words: usize = tokens.next("word count")?;
        let dimensions: usize = tokens.next("dimensions")?;
        if dimensions != DESCRIPTOR_DIMENSIONS {
            return Err(tokens.error(format!(
                "expected centers of dimension {} but got {}",
                DESCRIPTOR_DIMENSIONS, dimensions
            )));
        }
        let mut centers = Vec::with_capacity(words);
        for _ in 0..words {
            let mut center = [0.0; DESCRIPTOR_DIMENSIONS];
            for component in center.iter_mut() {
                *component = tokens.next("center component")?;
            }
            centers.push(center);
        }
        tokens.finish()?;
        Self::new(centers, paths)
    }

    pub fn load(path: impl AsRef<Path>, paths: usize) -> Result<Self> {
        let path = path.as_ref();
        let vocabulary = Self::parse(&read_to_string(path)?, paths)?;
        info!(
            "loaded {} cluster centers from {}",
            vocabulary.centers.len(),
            path.display()
        );
        Ok(vocabulary)
    }

    fn distance_squared(center: &[f32; DESCRIPTOR_DIMENSIONS], descriptor: &Descriptor) -> f32 {
        center
            .iter()
            .zip(descriptor.iter())
            .map(|(&c, &d)| {
                let delta = c - d as f32;
                delta * delta
            })
            .sum()
    }
}

impl Vocabulary for FlatVocabulary {
    fn num_words(&self) -> usize {
        self.centers.len()
    }

    fn assign(&self, descriptor: &Descriptor) -> Vec<usize> {
        if self.paths == 1 {
            return self
                .centers
                .iter()
                .enumerate()
                .min_by_key(|&(_, center)| FloatOrd(Self::distance_squared(center, descriptor)))
                .map(|(ix, _)| ix)
                .into_iter()
                .collect();
        }
        let mut distances: Vec<(FloatOrd<f32>, usize)> = self
            .centers
            .iter()
            .enumerate()
            .map(|(ix, center)| (FloatOrd(Self::distance_squared(center, descriptor)), ix))
            .collect();
        distances.sort_unstable();
        distances
            .into_iter()
            .take(self.paths)
            .map(|(_, ix)| ix)
            .collect()
    }
}
