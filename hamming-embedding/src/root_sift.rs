use crate::{Descriptor, DESCRIPTOR_DIMENSIONS};

/// The factor applied to the square-rooted components before quantization.
pub const ROOT_SIFT_SCALE: f32 = 512.0;

/// Converts a SIFT descriptor into a byte-quantized RootSIFT descriptor.
///
/// Returns `None` if the descriptor is all zeros, since it has no direction to normalize.
pub fn root_sift(descriptor: &Descriptor) -> Option<Descriptor> {
    root_sift_scaled(descriptor, ROOT_SIFT_SCALE)
}

/// Same as [`root_sift`], but with a custom quantization `scale`.
///
/// The descriptor is L2 normalized and then L1 normalized. Each component is then square
/// rooted, multiplied by `scale`, rounded to the nearest integer, and saturated at `255`.
pub fn root_sift_scaled(descriptor: &Descriptor, scale: f32) -> Option<Descriptor> {
    let l2_norm = descriptor
        .iter()
        .map(|&v| v as f32 * v as f32)
        .sum::<f32>()
        .sqrt();
    if l2_norm == 0.0 {
        return None;
    }
    let mut unit = [0.0f32; DESCRIPTOR_DIMENSIONS];
    for (u, &v) in unit.iter_mut().zip(descriptor) {
        *u = v as f32 / l2_norm;
    }
    let l1_norm: f32 = unit.iter().sum();

    let mut output = [0u8; DESCRIPTOR_DIMENSIONS];
    for (o, &u) in output.iter_mut().zip(&unit) {
        let value = (u / l1_norm).sqrt() * scale + 0.5;
        // Truncation after adding 0.5 rounds to the nearest integer.
        *o = value.min(255.0) as u8;
    }
    Some(output)
}
