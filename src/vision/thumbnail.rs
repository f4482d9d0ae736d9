//! 缩略图（PNG）

use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage};
use std::io::Cursor;

use crate::error::VisionError;
use crate::models::result::Thumbnail;

/// 按宽度等比缩放并编码为 PNG
pub fn encode_thumbnail(image: &RgbImage, width: u32) -> Result<Thumbnail, VisionError> {
    if width == 0 || image.width() == 0 || image.height() == 0 {
        return Err(VisionError::EmptyRegion {
            region: "thumbnail".to_string(),
        });
    }

    let height = ((image.height() as f64 * width as f64 / image.width() as f64).round() as u32).max(1);
    let small = imageops::resize(image, width, height, FilterType::Triangle);

    let mut png = Vec::new();
    small
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|source| VisionError::EncodeFailed { source })?;

    Ok(Thumbnail { width, height, png })
}
