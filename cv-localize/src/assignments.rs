use crate::{
    tokens::{read_to_string, Tokens},
    Error, Result,
};
use hamming_embedding::{
    signature_from_code, HammingEmbedding, Signature, DESCRIPTOR_DIMENSIONS, SIGNATURE_BITS,
};
use log::*;
use nalgebra::DMatrix;
use std::path::Path;

/// Visual words with at most this many entries are counted as small when loading.
const SMALL_WORD: usize = 5;

/// One database descriptor assigned to a visual word.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WordEntry {
    /// The index of the 3D point the descriptor belongs to.
    pub point: usize,
    /// The index of the descriptor's signature in [`AssignmentStore::signatures`].
    pub descriptor: usize,
}

/// The database side of the Hamming embedding.
///
/// Holds the embedding parameters, one signature per database descriptor, and the list of
/// descriptors assigned to each visual word. Everything is read-only once loaded.
#[derive(Debug, Clone)]
pub struct AssignmentStore {
    pub num_points: usize,
    pub embedding: HammingEmbedding,
    pub signatures: Vec<Signature>,
    pub buckets: Vec<Vec<WordEntry>>,
}

impl AssignmentStore {
    /// Creates a store after checking that every bucket entry refers to a known point and
    /// descriptor.
    pub fn new(
        num_points: usize,
        embedding: HammingEmbedding,
        signatures: Vec<Signature>,
        buckets: Vec<Vec<WordEntry>>,
    ) -> Result<Self> {
        if buckets.len() != embedding.words() {
            return Err(Error::inconsistent(
                "assignments",
                format!(
                    "{} buckets but thresholds for {} words",
                    buckets.len(),
                    embedding.words()
                ),
            ));
        }
        for (word, entry) in buckets
            .iter()
            .enumerate()
            .flat_map(|(word, bucket)| bucket.iter().map(move |entry| (word, entry)))
        {
            if entry.point >= num_points {
                return Err(Error::inconsistent(
                    "assignments",
                    format!(
                        "word {} refers to point {} but there are {} points",
                        word, entry.point, num_points
                    ),
                ));
            }
            if entry.descriptor >= signatures.len() {
                return Err(Error::inconsistent(
                    "assignments",
                    format!(
                        "word {} refers to descriptor {} but there are {} descriptors",
                        word,
                        entry.descriptor,
                        signatures.len()
                    ),
                ));
            }
        }
        Ok(Self {
            num_points,
            embedding,
            signatures,
            buckets,
        })
    }

    /// Parses the text assignment format.
    ///
    /// The file contains, separated by whitespace:
    ///
    /// * `nb_points nb_words nb_non_empty_words nb_descriptors`
    /// * `nb_words nb_dimensions nb_bits`
    /// * `nb_bits` thresholds for every word, word after word
    /// * the `nb_bits x nb_dimensions` projection matrix, row after row
    /// * one unsigned 64-bit code per descriptor
    /// * for every word, empty ones included: `word_id nb_pairs` followed by
    ///   `point_id descriptor_id` pairs
    pub fn parse(text: &str) -> Result<Self> {
        let mut tokens = Tokens::new("assignments", text);
        let num_points: usize = tokens.next("point count")?;
        let num_words: usize = tokens.next("word count")?;
        let num_non_empty: usize = tokens.next("non-empty word count")?;
        let num_descriptors: usize = tokens.next("descriptor count")?;

        let embedding_words: usize = tokens.next("embedding word count")?;
        let dimensions: usize = tokens.next("descriptor dimensions")?;
        let bits: usize = tokens.next("signature bits")?;
        if embedding_words != num_words {
            return Err(tokens.error(format!(
                "the embedding has {} words but the header announced {}",
                embedding_words, num_words
            )));
        }
        if dimensions != DESCRIPTOR_DIMENSIONS || bits != SIGNATURE_BITS {
            return Err(tokens.error(format!(
                "expected {} dimensions and {} bits but got {} and {}",
                DESCRIPTOR_DIMENSIONS, SIGNATURE_BITS, dimensions, bits
            )));
        }
        if num_non_empty > num_words {
            return Err(tokens.error(format!(
                "{} non-empty words out of {}",
                num_non_empty, num_words
            )));
        }

        let thresholds = (0..num_words * bits)
            .map(|_| tokens.next::<f32>("threshold"))
            .collect::<Result<Vec<_>>>()?;
        let thresholds = DMatrix::from_column_slice(bits, num_words, &thresholds);
        let projection = (0..bits * dimensions)
            .map(|_| tokens.next::<f32>("projection coefficient"))
            .collect::<Result<Vec<_>>>()?;
        let projection = DMatrix::from_row_slice(bits, dimensions, &projection);
        let embedding = HammingEmbedding::new(projection, thresholds)?;

        let signatures = (0..num_descriptors)
            .map(|_| tokens.next::<u64>("descriptor code").map(signature_from_code))
            .collect::<Result<Vec<_>>>()?;

        let mut buckets = vec![vec![]; num_words];
        let mut filled = vec![false; num_words];
        for _ in 0..num_words {
            let word: usize = tokens.next("word id")?;
            if word >= num_words {
                return Err(tokens.error(format!("word {} is out of range", word)));
            }
            if filled[word] {
                return Err(tokens.error(format!("word {} is listed twice", word)));
            }
            filled[word] = true;
            let num_pairs: usize = tokens.next("pair count")?;
            let bucket = &mut buckets[word];
            bucket.reserve(num_pairs);
            for _ in 0..num_pairs {
                let point = tokens.next("point id")?;
                let descriptor = tokens.next("descriptor id")?;
                bucket.push(WordEntry { point, descriptor });
            }
        }
        tokens.finish()?;

        let store = Self::new(num_points, embedding, signatures, buckets)?;
        let (small, empty) = store.bucket_statistics();
        if store.buckets.len() - empty != num_non_empty {
            return Err(Error::inconsistent(
                "assignments",
                format!(
                    "{} words have entries but the header announced {}",
                    store.buckets.len() - empty,
                    num_non_empty
                ),
            ));
        }
        debug!(
            "{} points and {} descriptors in the assignments, {} small words and {} empty words",
            num_points,
            num_descriptors,
            small,
            empty
        );
        Ok(store)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let store = Self::parse(&read_to_string(path)?)?;
        info!(
            "loaded {} words and {} descriptor signatures from {}",
            store.num_words(),
            store.signatures.len(),
            path.display()
        );
        Ok(store)
    }

    pub fn num_words(&self) -> usize {
        self.buckets.len()
    }

    /// The entries assigned to `word`, or an empty slice if the word is unknown.
    pub fn bucket(&self, word: usize) -> &[WordEntry] {
        self.buckets.get(word).map_or(&[][..], Vec::as_slice)
    }

    pub fn signature(&self, entry: &WordEntry) -> &Signature {
        &self.signatures[entry.descriptor]
    }

    /// Counts the words with few entries and the empty words.
    pub fn bucket_statistics(&self) -> (usize, usize) {
        let small = self
            .buckets
            .iter()
            .filter(|bucket| bucket.len() <= SMALL_WORD)
            .count();
        let empty = self.buckets.iter().filter(|bucket| bucket.is_empty()).count();
        (small, empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write;

    /// Writes an assignment file with a projection selecting the first 64 components.
    fn assignment_text(
        num_points: usize,
        thresholds: &[f32],
        codes: &[u64],
        buckets: &[(usize, Vec<(usize, usize)>)],
        non_empty: usize,
    ) -> String {
        let mut text = String::new();
        let words = thresholds.len();
        writeln!(text, "{} {} {} {}", num_points, words, non_empty, codes.len()).unwrap();
        writeln!(text, "{} 128 64", words).unwrap();
        for &threshold in thresholds {
            for _ in 0..64 {
                write!(text, "{} ", threshold).unwrap();
            }
            writeln!(text).unwrap();
        }
        for row in 0..64 {
            for col in 0..128 {
                write!(text, "{} ", if row == col { 1 } else { 0 }).unwrap();
            }
            writeln!(text).unwrap();
        }
        for code in codes {
            writeln!(text, "{}", code).unwrap();
        }
        for (word, pairs) in buckets {
            write!(text, "{} {}", word, pairs.len()).unwrap();
            for (point, descriptor) in pairs.iter() {
                write!(text, " {} {}", point, descriptor).unwrap();
            }
            writeln!(text).unwrap();
        }
        text
    }

    #[test]
    fn parses_store() {
        let text = assignment_text(
            3,
            &[0.5, 2.0, 7.0],
            &[1, u64::MAX, 1 << 40],
            &[(2, vec![(0, 1), (2, 2)]), (1, vec![]), (0, vec![(1, 0)])],
            2,
        );
        let store = AssignmentStore::parse(&text).unwrap();
        assert_eq!(store.num_words(), 3);
        assert_eq!(store.num_points, 3);
        assert_eq!(store.embedding.thresholds()[(63, 1)], 2.0);
        assert_eq!(store.embedding.projection()[(5, 5)], 1.0);
        assert_eq!(store.embedding.projection()[(5, 6)], 0.0);
        assert_eq!(
            store.bucket(2),
            &[
                WordEntry {
                    point: 0,
                    descriptor: 1
                },
                WordEntry {
                    point: 2,
                    descriptor: 2
                }
            ]
        );
        assert!(store.bucket(1).is_empty());
        assert!(store.bucket(17).is_empty());
        assert_eq!(
            hamming_embedding::signature_code(store.signature(&store.bucket(0)[0])),
            1
        );
        assert_eq!(store.bucket_statistics(), (3, 1));
    }

    #[test]
    fn rejects_wrong_non_empty_count() {
        let text = assignment_text(2, &[0.0, 0.0], &[0], &[(0, vec![(0, 0)]), (1, vec![])], 2);
        assert!(matches!(
            AssignmentStore::parse(&text),
            Err(Error::Inconsistent { .. })
        ));
    }

    #[test]
    fn accepts_empty_word_records() {
        let text = assignment_text(1, &[0.0, 0.0], &[0], &[(0, vec![(0, 0)]), (1, vec![])], 1);
        let store = AssignmentStore::parse(&text).unwrap();
        assert_eq!(store.num_words(), 2);
        assert_eq!(store.bucket(0).len(), 1);
        assert!(store.bucket(1).is_empty());
        assert_eq!(store.bucket_statistics(), (2, 1));
    }

    #[test]
    fn rejects_missing_empty_word_records() {
        let text = assignment_text(1, &[0.0, 0.0], &[0], &[(0, vec![(0, 0)])], 1);
        assert!(matches!(
            AssignmentStore::parse(&text),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn rejects_out_of_range_ids() {
        let text = assignment_text(1, &[0.0], &[0], &[(0, vec![(1, 0)])], 1);
        assert!(AssignmentStore::parse(&text).is_err());
        let text = assignment_text(1, &[0.0], &[0], &[(0, vec![(0, 1)])], 1);
        assert!(AssignmentStore::parse(&text).is_err());
        let text = assignment_text(1, &[0.0], &[0], &[(3, vec![(0, 0)])], 1);
        assert!(matches!(
            AssignmentStore::parse(&text),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_words() {
        let text = assignment_text(1, &[0.0, 0.0], &[0], &[(0, vec![(0, 0)]), (0, vec![(0, 0)])], 2);
        assert!(matches!(
            AssignmentStore::parse(&text),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn rejects_truncated_and_trailing_data() {
        let text = assignment_text(1, &[0.0], &[0], &[(0, vec![(0, 0)])], 1);
        assert!(AssignmentStore::parse(&text[..text.len() - 4]).is_err());
        assert!(AssignmentStore::parse(&format!("{} 7", text)).is_err());
    }

    #[test]
    fn rejects_wrong_bit_count() {
        let text = assignment_text(1, &[0.0], &[0], &[(0, vec![(0, 0)])], 1)
            .replacen("1 128 64", "1 128 32", 1);
        assert!(AssignmentStore::parse(&text).is_err());
    }
}
