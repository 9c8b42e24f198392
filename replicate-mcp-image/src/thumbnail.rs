//! Preview thumbnails for catalog listings.

use image::{ImageError, ImageFormat, ImageResult};
use image::imageops::FilterType;
use std::io::Cursor;

/// Longest edge of a thumbnail in pixels.
pub const THUMBNAIL_MAX_EDGE: u32 = 256;

/// Decode `bytes` and re-encode them as a PNG no larger than `max_edge` on
/// either side. Smaller images keep their size; aspect ratio is preserved.
pub fn render_png(bytes: &[u8], max_edge: u32) -> ImageResult<Vec<u8>> {
    let img = image::load_from_memory(bytes)?;
    let img = if img.width() > max_edge || img.height() > max_edge {
        img.resize(max_edge, max_edge, FilterType::Triangle)
    } else {
        img
    };

    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

/// [`render_png`] off the async runtime.
///
/// A panicked or cancelled worker is reported as an I/O image error.
pub async fn render_png_blocking(bytes: Vec<u8>, max_edge: u32) -> ImageResult<Vec<u8>> {
    tokio::task::spawn_blocking(move || render_png(&bytes, max_edge))
        .await
        .map_err(|e| ImageError::IoError(e.into()))?
}
