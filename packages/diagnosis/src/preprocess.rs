//! Image decoding and the fixed tensor transform fed to the classifier.
//!
//! Resize to 256x256, center crop 224x224, scale to `[0, 1]` and normalize
//! with the ImageNet statistics. The output layout is NCHW with a batch of one.

use crate::error::{DiagnosisError, DiagnosisResult};
use image::{RgbImage, imageops, imageops::FilterType};
use ndarray::Array4;

pub const RESIZE: u32 = 256;
pub const CROP: u32 = 224;
pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Decode any supported image format into RGB8.
pub fn decode_image(bytes: &[u8]) -> DiagnosisResult<RgbImage> {
    let img = image::load_from_memory(bytes).map_err(|e| {
        tracing::debug!("Image decode failed: {}", e);
        DiagnosisError::InvalidImage
    })?;
    Ok(img.to_rgb8())
}

/// Turn an RGB image into the normalized `[1, 3, 224, 224]` input tensor.
pub fn to_tensor(rgb: &RgbImage) -> Array4<f32> {
    let resized = imageops::resize(rgb, RESIZE, RESIZE, FilterType::Triangle);
    let offset = (RESIZE - CROP) / 2;
    let cropped = imageops::crop_imm(&resized, offset, offset, CROP, CROP).to_image();

    let side = CROP as usize;
    Array4::<f32>::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
        let p = cropped.get_pixel(x as u32, y as u32);
        (p[c] as f32 / 255.0 - MEAN[c]) / STD[c]
    })
}

/// Decode and preprocess in one step.
pub fn image_to_tensor(bytes: &[u8]) -> DiagnosisResult<Array4<f32>> {
    let rgb = decode_image(bytes)?;
    Ok(to_tensor(&rgb))
}
