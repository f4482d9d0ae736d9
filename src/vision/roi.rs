//! 感兴趣区域裁剪：学号区 + 左右两个答题表格

use image::imageops::{self, FilterType};
use image::RgbImage;
use std::sync::Arc;

use crate::infrastructure::{BufferLedger, ImageLease};
use crate::models::layout::SheetLayout;
use crate::models::sheet::{SheetGrid, Side};

/// 表格 ROI 与标准帧比例相差超过该值时缩放到标准尺寸
const RESCALE_TOLERANCE: f32 = 0.02;

/// 一块裁剪区域，`origin` 为其在对齐帧中的左上角
///
/// `scale` 把 ROI 像素坐标换算回对齐帧像素，未缩放时为 1
#[derive(Debug)]
pub struct Roi {
    pub origin: (u32, u32),
    pub scale: f32,
    pub image: ImageLease<RgbImage>,
}

#[derive(Debug, Default)]
pub struct SheetRois {
    pub id_field: Option<Roi>,
    pub left: Option<Roi>,
    pub right: Option<Roi>,
}

impl SheetRois {
    /// 取出某一侧的表格 ROI（检测完即可释放）
    pub fn take_table(&mut self, side: Side) -> Option<Roi> {
        match side {
            Side::Left => self.left.take(),
            Side::Right => self.right.take(),
        }
    }
}

#[derive(Clone)]
pub struct RoiExtractor {
    layout: Arc<SheetLayout>,
    ledger: BufferLedger,
}

impl RoiExtractor {
    pub fn new(layout: Arc<SheetLayout>, ledger: BufferLedger) -> Self {
        Self { layout, ledger }
    }

    pub fn extract(&self, sheet: &RgbImage, grid: &SheetGrid) -> SheetRois {
        let (width, height) = sheet.dimensions();
        let (x, y, w, h) = self.layout.id_field.to_pixels(width, height);

        SheetRois {
            id_field: self.crop(sheet, "id_roi", x, y, w, h),
            left: self.table_roi(sheet, grid, Side::Left),
            right: self.table_roi(sheet, grid, Side::Right),
        }
    }

    /// 从首行上方 margin 到末行下方 margin；该侧没有行时为 None
    fn table_roi(&self, sheet: &RgbImage, grid: &SheetGrid, side: Side) -> Option<Roi> {
        let mut rows = grid.rows_on(side);
        let first = rows.next()?;
        let last = rows.last().unwrap_or(first);

        let (width, height) = sheet.dimensions();
        let table = self.layout.table(side);
        let margin = self.layout.roi_margin * self.layout.scale_for(width);

        let x0 = (table.table_x0 * width as f32).round().clamp(0.0, width as f32);
        let x1 = (table.table_x1 * width as f32).round().clamp(0.0, width as f32);
        let y0 = (first.y - margin).round().clamp(0.0, height as f32);
        let y1 = (last.y + margin).round().clamp(0.0, height as f32);

        let label = match side {
            Side::Left => "left_table_roi",
            Side::Right => "right_table_roi",
        };
        let roi = self.crop(
            sheet,
            label,
            x0 as u32,
            y0 as u32,
            (x1 - x0) as u32,
            (y1 - y0) as u32,
        )?;
        Some(self.to_canonical_scale(roi, label, self.layout.scale_for(width)))
    }

    /// 检测器按标准帧的选项尺寸工作，未能对齐的页面保持原始尺寸，需先缩放
    fn to_canonical_scale(&self, roi: Roi, label: &'static str, sheet_scale: f32) -> Roi {
        if (sheet_scale - 1.0).abs() <= RESCALE_TOLERANCE || sheet_scale <= 0.0 {
            return roi;
        }

        let (width, height) = roi.image.dimensions();
        let target_width = ((width as f32 / sheet_scale).round() as u32).max(1);
        let target_height = ((height as f32 / sheet_scale).round() as u32).max(1);
        let resized = imageops::resize(&*roi.image, target_width, target_height, FilterType::Triangle);

        Roi {
            origin: roi.origin,
            scale: width as f32 / target_width as f32,
            image: self.ledger.lease(label, resized),
        }
    }

    fn crop(
        &self,
        sheet: &RgbImage,
        label: &'static str,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Option<Roi> {
        if width == 0 || height == 0 {
            return None;
        }
        let image = imageops::crop_imm(sheet, x, y, width, height).to_image();
        Some(Roi {
            origin: (x, y),
            scale: 1.0,
            image: self.ledger.lease(label, image),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sheet::{GridRow, RowMarker};

    fn row(question_number: u32, side: Side, y: f32) -> GridRow {
        GridRow {
            question_number,
            side,
            y,
            alternatives: Vec::new(),
        }
    }

    #[test]
    fn test_table_roi_spans_rows_plus_margin() {
        let layout = Arc::new(SheetLayout::default());
        let ledger = BufferLedger::new();
        let extractor = RoiExtractor::new(layout, ledger.clone());
        let sheet = RgbImage::new(1588, 2246);
        let grid = SheetGrid {
            left_markers: vec![
                RowMarker { y: 600.0, side: Side::Left },
                RowMarker { y: 800.0, side: Side::Left },
            ],
            right_markers: Vec::new(),
            rows: vec![row(1, Side::Left, 600.0), row(2, Side::Left, 800.0)],
        };

        let mut rois = extractor.extract(&sheet, &grid);
        assert!(rois.right.is_none());
        let left = rois.take_table(Side::Left).unwrap();
        assert_eq!(left.origin, (191, 570));
        assert_eq!(left.image.height(), 260);
        assert_eq!(left.image.width(), 730 - 191);
        assert_eq!(left.scale, 1.0);

        let id = rois.id_field.as_ref().unwrap();
        assert_eq!(id.origin, (873, 157));
        assert_eq!(ledger.live(), 2);
        drop(left);
        drop(rois);
        assert_eq!(ledger.live(), 0);
    }

    #[test]
    fn test_half_scale_table_roi_is_resized_to_canonical() {
        let layout = Arc::new(SheetLayout::default());
        let ledger = BufferLedger::new();
        let extractor = RoiExtractor::new(layout, ledger.clone());
        let sheet = RgbImage::new(794, 1123);
        let grid = SheetGrid {
            left_markers: Vec::new(),
            right_markers: Vec::new(),
            rows: vec![row(1, Side::Left, 300.0), row(2, Side::Left, 400.0)],
        };

        let mut rois = extractor.extract(&sheet, &grid);
        let left = rois.take_table(Side::Left).unwrap();
        // 裁剪 270x130，放大到 540x260
        assert_eq!(left.origin, (95, 285));
        assert_eq!(left.image.dimensions(), (540, 260));
        assert_eq!(left.scale, 0.5);
        // 学号区不缩放
        assert_eq!(rois.id_field.as_ref().unwrap().scale, 1.0);

        drop(left);
        drop(rois);
        assert_eq!(ledger.live(), 0);
    }
}
