//! Readers for Lowe's ASCII keypoint files and for lists of them.

use crate::{
    tokens::{read_to_string, Tokens},
    KeyPoint, Result,
};
use hamming_embedding::{Descriptor, DESCRIPTOR_DIMENSIONS};
use std::path::{Path, PathBuf};

/// Parses a keypoint file.
///
/// The file starts with the keypoint count and the descriptor length, followed for every
/// keypoint by `row column scale orientation` and the descriptor components.
pub fn parse_keyfile(text: &str) -> Result<Vec<(KeyPoint, Descriptor)>> {
    let mut tokens = Tokens::new("keypoint file", text);
    let count: usize = tokens.next("keypoint count")?;
    let length: usize = tokens.next("descriptor length")?;
    if length != DESCRIPTOR_DIMENSIONS {
        return Err(tokens.error(format!(
            "expected descriptors of length {} but got {}",
            DESCRIPTOR_DIMENSIONS, length
        )));
    }
    let mut keypoints = Vec::with_capacity(count);
    for _ in 0..count {
        let y = tokens.next("row")?;
        let x = tokens.next("column")?;
        let keypoint = KeyPoint {
            x,
            y,
            scale: tokens.next("scale")?,
            orientation: tokens.next("orientation")?,
        };
        let mut descriptor = [0; DESCRIPTOR_DIMENSIONS];
        for component in descriptor.iter_mut() {
            *component = tokens.next("descriptor component")?;
        }
        keypoints.push((keypoint, descriptor));
    }
    tokens.finish()?;
    Ok(keypoints)
}

pub fn load_keyfile(path: impl AsRef<Path>) -> Result<Vec<(KeyPoint, Descriptor)>> {
    parse_keyfile(&read_to_string(path)?)
}

/// Splits a list of keypoint file paths separated by whitespace.
pub fn parse_query_list(text: &str) -> Vec<PathBuf> {
    text.split_whitespace().map(PathBuf::from).collect()
}

pub fn load_query_list(path: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    Ok(parse_query_list(&read_to_string(path)?))
}
