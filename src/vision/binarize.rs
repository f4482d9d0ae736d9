//! 灰度化与自适应二值化

use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Pixel, Rgb, RgbImage};
use imageproc::filter::{box_filter, gaussian_blur_f32};
use serde::{Deserialize, Serialize};

/// 二值化参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinarizeParams {
    /// 固定高斯核的 sigma，0 表示不模糊
    pub blur_sigma: f32,
    /// 局部均值窗口半径，窗口为 (2r+1)²
    pub block_radius: u32,
    /// 低于局部均值多少才算墨迹
    pub offset: i16,
}

impl Default for BinarizeParams {
    fn default() -> Self {
        Self {
            blur_sigma: 1.0,
            block_radius: 15,
            offset: 10,
        }
    }
}

/// 按通道数转换为灰度图
///
/// 带 alpha 的 RGBA 先合成到白底上，透明区域不会被当成墨迹
pub fn to_gray(image: &DynamicImage) -> GrayImage {
    match image.color().channel_count() {
        4 => {
            let rgba = image.to_rgba8();
            ImageBuffer::from_fn(rgba.width(), rgba.height(), |x, y| {
                let [r, g, b, a] = rgba.get_pixel(x, y).0;
                let over_white = |c: u8| -> u8 {
                    ((c as u32 * a as u32 + 255 * (255 - a as u32)) / 255) as u8
                };
                Rgb([over_white(r), over_white(g), over_white(b)]).to_luma()
            })
        }
        // 1 / 2 / 3 通道直接取亮度，LumaA 的 alpha 被忽略
        _ => image.to_luma8(),
    }
}

pub fn rgb_to_gray(image: &RgbImage) -> GrayImage {
    image::imageops::grayscale(image)
}

/// 模糊 + 局部均值自适应阈值，输出中墨迹为 255、纸面为 0
pub fn binarize(gray: &GrayImage, params: &BinarizeParams) -> GrayImage {
    let blurred = if params.blur_sigma > 0.0 {
        gaussian_blur_f32(gray, params.blur_sigma)
    } else {
        gray.clone()
    };
    let mean = box_filter(&blurred, params.block_radius, params.block_radius);

    ImageBuffer::from_fn(blurred.width(), blurred.height(), |x, y| {
        let value = blurred.get_pixel(x, y).0[0] as i16;
        let local = mean.get_pixel(x, y).0[0] as i16;
        if value < local - params.offset {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}
