//! 页面与几何数据结构

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 表格所在侧
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "左"),
            Side::Right => write!(f, "右"),
        }
    }
}

/// 批次输入：编码后的字节或已解码的图像
pub enum PageInput {
    Encoded { page_number: u32, bytes: Vec<u8> },
    Decoded(Page),
}

impl PageInput {
    pub fn page_number(&self) -> u32 {
        match self {
            PageInput::Encoded { page_number, .. } => *page_number,
            PageInput::Decoded(page) => page.page_number,
        }
    }
}

/// 已解码的页面，只被消费一次
pub struct Page {
    pub page_number: u32,
    pub image: DynamicImage,
}

impl Page {
    pub fn new(page_number: u32, image: DynamicImage) -> Self {
        Self { page_number, image }
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("page_number", &self.page_number)
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .finish()
    }
}

/// 检测到的定位标记（外接矩形 + 轮廓面积）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub area: f32,
}

impl Marker {
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, point: (f32, f32)) -> bool {
        point.0 >= self.x
            && point.0 <= self.x + self.width
            && point.1 >= self.y
            && point.1 <= self.y + self.height
    }
}

/// 三个定位标记，缺失的为 None
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignmentMarkers {
    pub top_left: Option<Marker>,
    pub top_right: Option<Marker>,
    pub bottom_left: Option<Marker>,
}

impl AlignmentMarkers {
    pub fn found(&self) -> usize {
        [self.top_left, self.top_right, self.bottom_left]
            .iter()
            .filter(|m| m.is_some())
            .count()
    }

    /// 推断的右下角 (topRight.cx, bottomLeft.cy)，从不直接检测
    pub fn inferred_bottom_right(&self) -> Option<(f32, f32)> {
        let (tr, bl) = (self.top_right?, self.bottom_left?);
        Some((tr.center().0, bl.center().1))
    }

    /// 透视变换的源控制点 [左上, 右上, 右下(推断), 左下]
    pub fn control_points(&self) -> Option<[(f32, f32); 4]> {
        let tl = self.top_left?.center();
        let tr = self.top_right?.center();
        let bl = self.bottom_left?.center();
        let br = self.inferred_bottom_right()?;
        Some([tl, tr, br, bl])
    }
}

/// 行标记
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RowMarker {
    pub y: f32,
    pub side: Side,
}

/// 网格中的一个选项位置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeCell {
    pub letter: char,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// 一道题所在的行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridRow {
    pub question_number: u32,
    pub side: Side,
    pub y: f32,
    pub alternatives: Vec<AlternativeCell>,
}

/// 解析后的整页网格
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SheetGrid {
    pub left_markers: Vec<RowMarker>,
    pub right_markers: Vec<RowMarker>,
    pub rows: Vec<GridRow>,
}

impl SheetGrid {
    pub fn rows_on(&self, side: Side) -> impl Iterator<Item = &GridRow> {
        self.rows.iter().filter(move |row| row.side == side)
    }}

/// 第 index 个选项的字母（A, B, C, ...）
pub fn alternative_letter(index: usize) -> char {
    (b'A' + (index % 26) as u8) as char
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(x: f32, y: f32) -> Marker {
        Marker {
            x,
            y,
            width: 10.0,
            height: 10.0,
            area: 100.0,
        }
    }

    #[test]
    fn test_inferred_corner_uses_top_right_x_and_bottom_left_y() {
        let markers = AlignmentMarkers {
            top_left: Some(marker(0.0, 0.0)),
            top_right: Some(marker(100.0, 4.0)),
            bottom_left: Some(marker(2.0, 200.0)),
        };
        assert_eq!(markers.found(), 3);
        assert_eq!(markers.inferred_bottom_right(), Some((105.0, 205.0)));
        let points = markers.control_points().unwrap();
        assert_eq!(points[2], (105.0, 205.0));
    }

    #[test]
    fn test_missing_marker_has_no_control_points() {
        let markers = AlignmentMarkers {
            top_left: Some(marker(0.0, 0.0)),
            top_right: None,
            bottom_left: Some(marker(2.0, 200.0)),
        };
        assert_eq!(markers.found(), 2);
        assert!(markers.control_points().is_none());
    }

    #[test]
    fn test_alternative_letters() {
        assert_eq!(alternative_letter(0), 'A');
        assert_eq!(alternative_letter(4), 'E');
    }
}
