//! 图像对齐：定位标记检测 + 透视校正
//!
//! 检测不到 3 个定位标记是预期内的结果而不是错误：
//! 返回原图、`success = false`，由流程层记录复核原因后继续处理。

use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::VisionError;
use crate::infrastructure::{BufferLedger, ImageLease};
use crate::models::layout::SheetLayout;
use crate::models::sheet::{AlignmentMarkers, Marker};
use crate::vision::binarize::{binarize, to_gray, BinarizeParams};
use crate::vision::blobs::outer_blobs;

/// 面积窗口（相对期望面积）
const FINDER_AREA_MIN: f32 = 0.35;
const FINDER_AREA_MAX: f32 = 2.5;
const ASPECT_MIN: f32 = 0.75;
const ASPECT_MAX: f32 = 1.25;
const POLY_EPSILON: f64 = 0.02;

/// 对齐后端
///
/// 负责找定位标记与执行透视变换；`ImageAligner` 负责降级策略
pub trait AlignmentBackend: Send + Sync {
    fn find_markers(
        &self,
        gray: &GrayImage,
        layout: &SheetLayout,
        ledger: &BufferLedger,
    ) -> AlignmentMarkers;

    fn warp(
        &self,
        image: &RgbImage,
        markers: &AlignmentMarkers,
        layout: &SheetLayout,
    ) -> Result<RgbImage, VisionError>;
}

/// 基于轮廓的对齐后端（imageproc）
#[derive(Debug, Clone, Default)]
pub struct ContourAlignmentBackend {
    params: BinarizeParams,
}

impl ContourAlignmentBackend {
    pub fn new(params: BinarizeParams) -> Self {
        Self { params }
    }

    /// 满足面积、四边形、近似正方形条件的候选标记
    pub fn marker_candidates(&self, binary: &GrayImage, layout: &SheetLayout) -> Vec<Marker> {
        let expected = layout.expected_finder_area(binary.width());
        let (min_area, max_area) = (expected * FINDER_AREA_MIN, expected * FINDER_AREA_MAX);

        let mut candidates: Vec<Marker> = outer_blobs(binary)
            .into_iter()
            .filter(|blob| blob.contour_area >= min_area && blob.contour_area <= max_area)
            .filter(|blob| (ASPECT_MIN..=ASPECT_MAX).contains(&blob.aspect_ratio()))
            .filter(|blob| blob.polygon_vertices(POLY_EPSILON) == 4)
            .map(|blob| Marker {
                x: blob.min_x as f32,
                y: blob.min_y as f32,
                width: blob.width(),
                height: blob.height(),
                area: blob.contour_area,
            })
            .collect();

        // 同一个标记的内层方块只保留最外层
        candidates.sort_by(|a, b| b.area.total_cmp(&a.area));
        let mut kept: Vec<Marker> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if !kept.iter().any(|outer| outer.contains(candidate.center())) {
                kept.push(candidate);
            }
        }
        kept
    }
}

impl AlignmentBackend for ContourAlignmentBackend {
    fn find_markers(
        &self,
        gray: &GrayImage,
        layout: &SheetLayout,
        ledger: &BufferLedger,
    ) -> AlignmentMarkers {
        let binary = ledger.lease("finder_binary", binarize(gray, &self.params));
        let candidates = self.marker_candidates(&binary, layout);
        debug!("定位标记候选: {} 个", candidates.len());
        assign_markers(candidates)
    }

    fn warp(
        &self,
        image: &RgbImage,
        markers: &AlignmentMarkers,
        layout: &SheetLayout,
    ) -> Result<RgbImage, VisionError> {
        let src = markers
            .control_points()
            .ok_or(VisionError::DegenerateProjection)?;
        let [tl, tr, bl] = layout.finder_centers();
        let dst = [tl, tr, layout.inferred_corner(), bl];

        let projection =
            Projection::from_control_points(src, dst).ok_or(VisionError::DegenerateProjection)?;

        let mut output = RgbImage::new(layout.canonical_width, layout.canonical_height);
        warp_into(
            image,
            &projection,
            Interpolation::Bilinear,
            Rgb([255u8, 255, 255]),
            &mut output,
        );
        Ok(output)
    }
}

/// 按 Y 排序：最上面两个按 X 分为左上/右上，剩余中 X 最小的为左下
pub fn assign_markers(mut candidates: Vec<Marker>) -> AlignmentMarkers {
    candidates.sort_by(|a, b| a.y.total_cmp(&b.y));

    let mut top: Vec<Marker> = candidates.iter().take(2).copied().collect();
    top.sort_by(|a, b| a.x.total_cmp(&b.x));

    let bottom_left = candidates
        .iter()
        .skip(2)
        .min_by(|a, b| a.x.total_cmp(&b.x))
        .copied();

    AlignmentMarkers {
        top_left: top.first().copied(),
        top_right: top.get(1).copied(),
        bottom_left,
    }
}

/// 对齐结果
#[derive(Debug)]
pub struct AlignmentOutcome {
    pub sheet: ImageLease<RgbImage>,
    pub markers: AlignmentMarkers,
    pub success: bool,
}

/// 图像对齐器
#[derive(Clone)]
pub struct ImageAligner {
    backend: Arc<dyn AlignmentBackend>,
    layout: Arc<SheetLayout>,
    ledger: BufferLedger,
}

impl ImageAligner {
    pub fn new(
        backend: Arc<dyn AlignmentBackend>,
        layout: Arc<SheetLayout>,
        ledger: BufferLedger,
    ) -> Self {
        Self {
            backend,
            layout,
            ledger,
        }
    }

    /// 对齐一页；不会因为标记不足而失败
    pub fn align(&self, image: DynamicImage) -> AlignmentOutcome {
        let gray = self.ledger.lease("gray", to_gray(&image));
        let markers = self.backend.find_markers(&gray, &self.layout, &self.ledger);
        drop(gray);

        let original = image.to_rgb8();
        drop(image);

        if markers.found() < 3 {
            warn!("仅检测到 {}/3 个定位标记，跳过透视校正", markers.found());
            return self.degraded(original, markers);
        }

        match self.backend.warp(&original, &markers, &self.layout) {
            Ok(aligned) => AlignmentOutcome {
                sheet: self.ledger.lease("aligned", aligned),
                markers,
                success: true,
            },
            Err(e) => {
                warn!("透视校正失败: {}", e);
                self.degraded(original, markers)
            }
        }
    }

    fn degraded(&self, original: RgbImage, markers: AlignmentMarkers) -> AlignmentOutcome {
        AlignmentOutcome {
            sheet: self.ledger.lease("unaligned", original),
            markers,
            success: false,
        }
    }
}
