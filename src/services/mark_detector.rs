//! 标记检测服务 - 业务能力层
//!
//! 只负责"在一张表格图像里找出涂黑的选项"，坐标为传入图像的局部坐标，
//! 换算到对齐帧由流程层完成。

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use image::RgbImage;
use tracing::debug;

use crate::models::detection::{BBox, DetectionOutput, RawDetection};
use crate::vision::binarize::{binarize, rgb_to_gray, BinarizeParams};
use crate::vision::blobs::outer_blobs;

/// 标记检测器
pub trait MarkDetector: Send + Sync {
    fn name(&self) -> &str;

    /// 加载模型等一次性准备工作，批次开始前调用
    fn initialize(&self) -> BoxFuture<'_, Result<()>>;

    /// 对单张表格图像做检测，每次调用互不影响
    fn detect<'a>(&'a self, image: &'a RgbImage) -> BoxFuture<'a, Result<DetectionOutput>>;
}

/// 实心圆的理论填充率 π/4
const FULL_DISC_FILL: f32 = 0.785;

/// 基于像素密度的检测器
///
/// 二值化后找出与选项圆大小相当的连通块，包围盒内墨迹占比超过阈值即视为涂黑
#[derive(Debug, Clone)]
pub struct DensityMarkDetector {
    bubble_size: f32,
    min_fill: f32,
    params: BinarizeParams,
}

impl DensityMarkDetector {
    pub fn new(bubble_size: f32) -> Self {
        Self {
            bubble_size,
            min_fill: 0.5,
            params: BinarizeParams::default(),
        }
    }

    /// 同步检测，供 `detect` 与测试直接调用
    pub fn detect_marks(&self, image: &RgbImage) -> Vec<RawDetection> {
        let binary = binarize(&rgb_to_gray(image), &self.params);
        let (min_side, max_side) = (self.bubble_size * 0.6, self.bubble_size * 1.6);

        outer_blobs(&binary)
            .into_iter()
            .filter(|blob| {
                (min_side..=max_side).contains(&blob.width())
                    && (min_side..=max_side).contains(&blob.height())
            })
            .filter_map(|blob| {
                let fill = blob.fill_ratio(&binary);
                (fill >= self.min_fill).then(|| RawDetection {
                    bbox: BBox::new(
                        blob.min_x as f32,
                        blob.min_y as f32,
                        blob.width(),
                        blob.height(),
                    ),
                    confidence: (fill / FULL_DISC_FILL).min(1.0),
                    class: "filled".to_string(),
                })
            })
            .collect()
    }
}

impl MarkDetector for DensityMarkDetector {
    fn name(&self) -> &str {
        "density"
    }

    fn initialize(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            debug!("密度检测器无需加载模型");
            Ok(())
        }
        .boxed()
    }

    fn detect<'a>(&'a self, image: &'a RgbImage) -> BoxFuture<'a, Result<DetectionOutput>> {
        // 像素运算放到阻塞线程池，不占用异步工作线程
        let detector = self.clone();
        let image = image.clone();
        async move {
            let detections = tokio::task::spawn_blocking(move || detector.detect_marks(&image))
                .await
                .context("标记检测任务异常")?;
            Ok(DetectionOutput {
                success: true,
                detections,
            })
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut};

    fn table_image() -> RgbImage {
        let mut image = RgbImage::from_pixel(300, 120, Rgb([255, 255, 255]));
        draw_hollow_circle_mut(&mut image, (50, 60), 14, Rgb([0, 0, 0]));
        draw_filled_circle_mut(&mut image, (120, 60), 13, Rgb([0, 0, 0]));
        draw_hollow_circle_mut(&mut image, (190, 60), 14, Rgb([0, 0, 0]));
        image
    }

    #[tokio::test]
    async fn test_only_filled_bubble_is_detected() {
        let detector = DensityMarkDetector::new(28.0);
        detector.initialize().await.unwrap();

        let output = detector.detect(&table_image()).await.unwrap();
        assert!(output.success);
        assert_eq!(output.detections.len(), 1);

        let mark = &output.detections[0];
        let (cx, cy) = mark.bbox.center();
        assert!((cx - 120.5).abs() <= 1.5 && (cy - 60.5).abs() <= 1.5);
        assert!(mark.confidence >= 0.9);
        assert_eq!(mark.class, "filled");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_detect_calls_are_independent() {
        let detector = DensityMarkDetector::new(28.0);
        let image = table_image();
        let blank = RgbImage::from_pixel(300, 120, Rgb([255, 255, 255]));

        let (a, b, c) = tokio::join!(
            detector.detect(&image),
            detector.detect(&blank),
            detector.detect(&image)
        );
        assert_eq!(a.unwrap().detections.len(), 1);
        assert!(b.unwrap().detections.is_empty());
        assert_eq!(c.unwrap().detections.len(), 1);
    }

    #[test]
    fn test_blank_image_has_no_marks() {
        let image = RgbImage::from_pixel(100, 100, Rgb([255, 255, 255]));
        assert!(DensityMarkDetector::new(28.0).detect_marks(&image).is_empty());
    }
}
