//! Image encoding and degradation.
//!
//! Vision APIs take images as base64 PNG embedded in the request body. PNG is
//! lossless, which keeps rendered text crisp; `detail: "high"` asks
//! tile-based models to use their full image budget so small table cells
//! stay legible.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a page image as a base64 PNG ready for the model.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Scale both edges by `factor` (Lanczos3).
///
/// Returns `None` once the image is 1×1 and cannot get any smaller.
pub fn shrink(img: &DynamicImage, factor: f32) -> Option<DynamicImage> {
    let (w, h) = (img.width(), img.height());
    if w <= 1 && h <= 1 {
        return None;
    }
    let scale =
        |edge: u32| ((edge as f32 * factor).round() as u32).clamp(1, edge.saturating_sub(1).max(1));
    let (nw, nh) = (scale(w), scale(h));
    debug!("Shrinking page image {}x{} → {}x{}", w, h, nw, nh);
    Some(img.resize_exact(nw, nh, FilterType::Lanczos3))
}
