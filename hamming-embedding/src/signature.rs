use crate::{
    signature_from_code, Descriptor, Error, Signature, DESCRIPTOR_DIMENSIONS, SIGNATURE_BITS,
};
use nalgebra::{DMatrix, DVector};

/// The parameters of a Hamming embedding.
///
/// The projection is shared by every visual word, while each word has its own set of
/// [`SIGNATURE_BITS`] thresholds, usually the medians of the projected training descriptors
/// that were assigned to that word.
#[derive(Debug, Clone, PartialEq)]
pub struct HammingEmbedding {
    /// A `SIGNATURE_BITS x DESCRIPTOR_DIMENSIONS` projection matrix.
    projection: DMatrix<f32>,
    /// A `SIGNATURE_BITS x words` matrix with one column of thresholds per visual word.
    thresholds: DMatrix<f32>,
}

impl HammingEmbedding {
    /// Creates an embedding after checking the shapes of `projection` and `thresholds`.
    pub fn new(projection: DMatrix<f32>, thresholds: DMatrix<f32>) -> Result<Self, Error> {
        if projection.shape() != (SIGNATURE_BITS, DESCRIPTOR_DIMENSIONS) {
            return Err(Error::Dimensions {
                what: "projection matrix",
                expected_rows: SIGNATURE_BITS,
                expected_columns: DESCRIPTOR_DIMENSIONS,
                rows: projection.nrows(),
                columns: projection.ncols(),
            });
        }
        if thresholds.nrows() != SIGNATURE_BITS {
            return Err(Error::Dimensions {
                what: "threshold table",
                expected_rows: SIGNATURE_BITS,
                expected_columns: thresholds.ncols(),
                rows: thresholds.nrows(),
                columns: thresholds.ncols(),
            });
        }
        Ok(Self {
            projection,
            thresholds,
        })
    }

    /// The number of visual words this embedding has thresholds for.
    pub fn words(&self) -> usize {
        self.thresholds.ncols()
    }

    pub fn projection(&self) -> &DMatrix<f32> {
        &self.projection
    }

    pub fn thresholds(&self) -> &DMatrix<f32> {
        &self.thresholds
    }

    /// Projects a normalized descriptor into the embedding space.
    ///
    /// The projection does not depend on the visual word, so a descriptor assigned to several
    /// words only needs to be projected once. Use [`HammingEmbedding::binarize`] to produce the
    /// signature for each word.
    pub fn project(&self, descriptor: &Descriptor) -> DVector<f32> {
        let descriptor =
            DVector::from_iterator(DESCRIPTOR_DIMENSIONS, descriptor.iter().map(|&v| v as f32));
        &self.projection * descriptor
    }

    /// Thresholds a projected descriptor against the thresholds of `word`.
    pub fn binarize(&self, projected: &DVector<f32>, word: usize) -> Result<Signature, Error> {
        if word >= self.words() {
            return Err(Error::WordOutOfRange {
                word,
                words: self.words(),
            });
        }
        let code = projected
            .iter()
            .zip(self.thresholds.column(word).iter())
            .enumerate()
            .filter(|(_, (value, threshold))| value > threshold)
            .fold(0u64, |code, (bit, _)| code | 1 << bit);
        Ok(signature_from_code(code))
    }

    /// Computes the signature of a normalized descriptor within `word`.
    pub fn signature(&self, descriptor: &Descriptor, word: usize) -> Result<Signature, Error> {
        self.binarize(&self.project(descriptor), word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature_code;
    use approx::assert_relative_eq;

    /// Every bit looks at one descriptor component and every word has its own threshold.
    fn selecting_embedding(thresholds: &[f32]) -> HammingEmbedding {
        let projection =
            DMatrix::from_fn(SIGNATURE_BITS, DESCRIPTOR_DIMENSIONS, |r, c| {
                if r == c {
                    1.0
                } else {
                    0.0
                }
            });
        let thresholds = DMatrix::from_fn(SIGNATURE_BITS, thresholds.len(), |_, c| thresholds[c]);
        HammingEmbedding::new(projection, thresholds).unwrap()
    }

    fn descriptor_with(components: &[(usize, u8)]) -> Descriptor {
        let mut descriptor = [0; DESCRIPTOR_DIMENSIONS];
        for &(ix, v) in components {
            descriptor[ix] = v;
        }
        descriptor
    }

    #[test]
    fn bits_follow_thresholds() {
        let embedding = selecting_embedding(&[0.5, 10.0]);
        let descriptor = descriptor_with(&[(0, 1), (3, 20), (63, 5), (100, 200)]);
        let low = embedding.signature(&descriptor, 0).unwrap();
        assert_eq!(signature_code(&low), 1u64 | 1 << 3 | 1 << 63);
        let high = embedding.signature(&descriptor, 1).unwrap();
        assert_eq!(signature_code(&high), 1u64 << 3);
        assert_eq!(low.distance(&high), 2);
    }

    #[test]
    fn threshold_is_strict() {
        let embedding = selecting_embedding(&[4.0]);
        let signature = embedding
            .signature(&descriptor_with(&[(2, 4), (5, 5)]), 0)
            .unwrap();
        assert_eq!(signature_code(&signature), 1u64 << 5);
    }

    #[test]
    fn projection_mixes_components() {
        let projection =
            DMatrix::from_fn(SIGNATURE_BITS, DESCRIPTOR_DIMENSIONS, |r, c| {
                if c == r {
                    0.5
                } else if c == r + SIGNATURE_BITS {
                    -0.25
                } else {
                    0.0
                }
            });
        let thresholds = DMatrix::from_element(SIGNATURE_BITS, 1, 1.0);
        let embedding = HammingEmbedding::new(projection, thresholds).unwrap();
        let descriptor = descriptor_with(&[(0, 3), (64, 2), (7, 1), (71, 9), (9, 2)]);
        let projected = embedding.project(&descriptor);
        assert_relative_eq!(projected[0], 1.0);
        assert_relative_eq!(projected[7], -1.75);
        assert_relative_eq!(projected[9], 1.0);
        assert_relative_eq!(projected[1], 0.0);
        // Only projections strictly above the threshold set their bit.
        let signature = embedding.binarize(&projected, 0).unwrap();
        assert_eq!(signature_code(&signature), 0);
    }

    #[test]
    fn word_out_of_range() {
        let embedding = selecting_embedding(&[0.0, 0.0, 0.0]);
        assert!(matches!(
            embedding.signature(&[0; DESCRIPTOR_DIMENSIONS], 3),
            Err(Error::WordOutOfRange { word: 3, words: 3 })
        ));
    }

    #[test]
    fn rejects_wrong_shapes() {
        let projection = DMatrix::zeros(SIGNATURE_BITS, 64);
        let thresholds = DMatrix::zeros(SIGNATURE_BITS, 2);
        assert!(HammingEmbedding::new(projection, thresholds).is_err());
        let projection = DMatrix::zeros(SIGNATURE_BITS, DESCRIPTOR_DIMENSIONS);
        let thresholds = DMatrix::zeros(32, 2);
        assert!(HammingEmbedding::new(projection, thresholds).is_err());
    }

    #[test]
    fn codes_round_trip_through_signatures() {
        let code = 0xdead_beef_0123_4567;
        assert_eq!(signature_code(&signature_from_code(code)), code);
        assert_eq!(
            signature_from_code(code).distance(&signature_from_code(!code)),
            64
        );
    }
}
