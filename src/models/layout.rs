//! 答题卡版式约定
//!
//! 生成答题卡的一方与扫描识别的一方必须使用完全相同的几何参数：
//! 定位标记的尺寸与位置、标准帧尺寸、题目表格区域。
//! 所有比例均作用于实际帧尺寸，因此未对齐的页面也能得到尽力而为的网格。

use serde::{Deserialize, Serialize};

use crate::models::sheet::Side;

/// 以帧宽高比例表示的矩形
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelRect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl RelRect {
    pub const fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// 换算为像素矩形 (x, y, width, height)，并裁剪到图像范围内
    pub fn to_pixels(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let x0 = (self.x0 * width as f32).round().clamp(0.0, width as f32) as u32;
        let y0 = (self.y0 * height as f32).round().clamp(0.0, height as f32) as u32;
        let x1 = (self.x1 * width as f32).round().clamp(0.0, width as f32) as u32;
        let y1 = (self.y1 * height as f32).round().clamp(0.0, height as f32) as u32;
        (x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
    }
}

/// 单侧题目表格的版式
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TableLayout {
    /// 表格左右边界（宽度比例）
    pub table_x0: f32,
    pub table_x1: f32,
    /// 第一个与最后一个选项圆心的横坐标（宽度比例）
    pub alt_x0: f32,
    pub alt_x1: f32,
    /// 行标记所在竖条（宽度比例）
    pub strip_x0: f32,
    pub strip_x1: f32,
}

/// 答题卡版式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetLayout {
    /// 标准帧宽度（像素）
    pub canonical_width: u32,
    /// 标准帧高度（像素）
    pub canonical_height: u32,
    /// 定位标记边长
    pub finder_size: f32,
    /// 定位标记距页面边缘的距离
    pub finder_margin: f32,
    /// 行标记边长
    pub row_marker_size: f32,
    /// 选项圆直径
    pub bubble_size: f32,
    /// 页眉高度（高度比例），行标记检测跳过该区域
    pub header_fraction: f32,
    /// 行标记竖条的下边界（高度比例）
    pub strip_bottom_fraction: f32,
    /// 学号区域
    pub id_field: RelRect,
    pub left_table: TableLayout,
    pub right_table: TableLayout,
    /// 表格 ROI 在首行之上、末行之下额外保留的像素
    pub roi_margin: f32,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            canonical_width: 1588,
            canonical_height: 2246,
            finder_size: 48.0,
            finder_margin: 32.0,
            row_marker_size: 16.0,
            bubble_size: 28.0,
            header_fraction: 0.22,
            strip_bottom_fraction: 0.96,
            id_field: RelRect::new(0.55, 0.07, 0.93, 0.18),
            left_table: TableLayout {
                table_x0: 0.12,
                table_x1: 0.46,
                alt_x0: 0.20,
                alt_x1: 0.42,
                strip_x0: 0.04,
                strip_x1: 0.12,
            },
            right_table: TableLayout {
                table_x0: 0.54,
                table_x1: 0.88,
                alt_x0: 0.58,
                alt_x1: 0.80,
                strip_x0: 0.88,
                strip_x1: 0.96,
            },
            roi_margin: 30.0,
        }
    }
}

impl SheetLayout {
    pub fn table(&self, side: Side) -> &TableLayout {
        match side {
            Side::Left => &self.left_table,
            Side::Right => &self.right_table,
        }
    }

    /// 标准帧中三个定位标记的中心 [左上, 右上, 左下]
    pub fn finder_centers(&self) -> [(f32, f32); 3] {
        let half = self.finder_size / 2.0;
        let near = self.finder_margin + half;
        let far_x = self.canonical_width as f32 - near;
        let far_y = self.canonical_height as f32 - near;
        [(near, near), (far_x, near), (near, far_y)]
    }

    /// 标准帧中推断出的右下角点
    pub fn inferred_corner(&self) -> (f32, f32) {
        let [_, top_right, bottom_left] = self.finder_centers();
        (top_right.0, bottom_left.1)
    }

    /// 相对于标准帧的缩放比例
    pub fn scale_for(&self, image_width: u32) -> f32 {
        image_width as f32 / self.canonical_width as f32
    }

    /// 定位标记的期望面积（按图像尺寸缩放）
    pub fn expected_finder_area(&self, image_width: u32) -> f32 {
        let side = self.finder_size * self.scale_for(image_width);
        side * side
    }

    /// 行标记的期望面积（按图像尺寸缩放）
    pub fn expected_row_marker_area(&self, image_width: u32) -> f32 {
        let side = self.row_marker_size * self.scale_for(image_width);
        side * side
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inferred_corner_mirrors_finders() {
        let layout = SheetLayout::default();
        let [tl, tr, bl] = layout.finder_centers();
        let br = layout.inferred_corner();
        assert_eq!(tl, (56.0, 56.0));
        assert_eq!(br.0, tr.0);
        assert_eq!(br.1, bl.1);
        assert_eq!(br, (1532.0, 2190.0));
    }

    #[test]
    fn test_rel_rect_clamps_to_image() {
        let rect = RelRect::new(-0.1, 0.5, 1.2, 0.75);
        assert_eq!(rect.to_pixels(100, 200), (0, 100, 100, 50));
    }

    #[test]
    fn test_layout_roundtrips_through_toml_defaults() {
        let layout: SheetLayout = toml::from_str("roi_margin = 12.0").unwrap();
        assert_eq!(layout.roi_margin, 12.0);
        assert_eq!(layout.canonical_width, 1588);
    }
}
