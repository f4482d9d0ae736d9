//! 网格几何解析：行标记检测 + 题目/选项坐标

use image::{imageops, GrayImage, RgbImage};
use std::sync::Arc;
use tracing::debug;

use crate::infrastructure::BufferLedger;
use crate::models::layout::SheetLayout;
use crate::models::sheet::{alternative_letter, AlternativeCell, GridRow, RowMarker, SheetGrid, Side};
use crate::vision::binarize::{binarize, rgb_to_gray, BinarizeParams};
use crate::vision::blobs::outer_blobs;

const ROW_MARKER_AREA_MIN: f32 = 0.4;
const ROW_MARKER_AREA_MAX: f32 = 2.5;
const ASPECT_MIN: f32 = 0.75;
const ASPECT_MAX: f32 = 1.25;

/// 选项数下限
pub const MIN_ALTERNATIVES: usize = 4;

#[derive(Clone)]
pub struct GridGeometryResolver {
    layout: Arc<SheetLayout>,
    params: BinarizeParams,
    ledger: BufferLedger,
}

impl GridGeometryResolver {
    pub fn new(layout: Arc<SheetLayout>, params: BinarizeParams, ledger: BufferLedger) -> Self {
        Self {
            layout,
            params,
            ledger,
        }
    }

    /// 解析整页网格。左侧题号从 1 开始，右侧接着左侧继续编号
    pub fn resolve(&self, sheet: &RgbImage, alternatives: usize) -> SheetGrid {
        let gray = self.ledger.lease("grid_gray", rgb_to_gray(sheet));
        let left_markers = self.detect_row_markers(&gray, Side::Left);
        let right_markers = self.detect_row_markers(&gray, Side::Right);
        drop(gray);

        let alternatives = alternatives.max(MIN_ALTERNATIVES);
        let mut rows = Vec::with_capacity(left_markers.len() + right_markers.len());
        let mut question_number = 1u32;
        for markers in [&left_markers, &right_markers] {
            for marker in markers {
                rows.push(self.build_row(
                    question_number,
                    marker,
                    alternatives,
                    sheet.width(),
                ));
                question_number += 1;
            }
        }

        debug!(
            "网格: 左侧 {} 行, 右侧 {} 行, 每行 {} 个选项",
            left_markers.len(),
            right_markers.len(),
            alternatives
        );

        SheetGrid {
            left_markers,
            right_markers,
            rows,
        }
    }

    /// 在表格外侧竖条中查找行标记，按 Y 升序返回
    pub fn detect_row_markers(&self, gray: &GrayImage, side: Side) -> Vec<RowMarker> {
        let (width, height) = gray.dimensions();
        let table = self.layout.table(side);

        let x0 = (table.strip_x0 * width as f32).round().max(0.0) as u32;
        let x1 = ((table.strip_x1 * width as f32).round() as u32).min(width);
        let y0 = (self.layout.header_fraction * height as f32).round() as u32;
        let y1 = ((self.layout.strip_bottom_fraction * height as f32).round() as u32).min(height);
        if x1 <= x0 || y1 <= y0 {
            return Vec::new();
        }

        let strip = imageops::crop_imm(gray, x0, y0, x1 - x0, y1 - y0).to_image();
        let binary = self.ledger.lease("strip_binary", binarize(&strip, &self.params));
        drop(strip);

        let expected = self.layout.expected_row_marker_area(width);
        let (min_area, max_area) = (expected * ROW_MARKER_AREA_MIN, expected * ROW_MARKER_AREA_MAX);

        let mut markers: Vec<RowMarker> = outer_blobs(&binary)
            .into_iter()
            .filter(|blob| {
                let area = blob.bbox_area();
                area >= min_area && area <= max_area
            })
            .filter(|blob| (ASPECT_MIN..=ASPECT_MAX).contains(&blob.aspect_ratio()))
            .map(|blob| RowMarker {
                y: blob.center().1 + y0 as f32,
                side,
            })
            .collect();

        markers.sort_by(|a, b| a.y.total_cmp(&b.y));
        markers
    }

    fn build_row(
        &self,
        question_number: u32,
        marker: &RowMarker,
        alternatives: usize,
        sheet_width: u32,
    ) -> GridRow {
        let table = self.layout.table(marker.side);
        let width = sheet_width as f32;
        let start = table.alt_x0 * width;
        let step = (table.alt_x1 - table.alt_x0) * width / (alternatives - 1) as f32;
        let bubble = self.layout.bubble_size * self.layout.scale_for(sheet_width);

        let cells = (0..alternatives)
            .map(|i| AlternativeCell {
                letter: alternative_letter(i),
                x: start + step * i as f32,
                y: marker.y,
                width: bubble,
                height: bubble,
            })
            .collect();

        GridRow {
            question_number,
            side: marker.side,
            y: marker.y,
            alternatives: cells,
        }
    }
}
