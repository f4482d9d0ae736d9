//! 合成答题卡渲染
//!
//! 按照版式约定生成标准帧答题卡（定位标记、行标记、选项圆），
//! 供测试与本地调试使用。

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut};
use imageproc::rect::Rect;

use crate::models::layout::SheetLayout;
use crate::models::sheet::Side;

const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// 首行距页眉下沿的距离与行距（标准帧像素）
const FIRST_ROW_OFFSET: f32 = 60.0;
const ROW_PITCH: f32 = 48.0;

/// 定位标记同心方块的每圈宽度：黑 7 / 白 7 / 黑 20
const FINDER_BAND: i32 = 7;

#[derive(Debug, Clone)]
pub struct SyntheticSheet {
    pub left_rows: usize,
    pub right_rows: usize,
    pub alternatives: usize,
    /// (题号, 选项字母)
    pub marks: Vec<(u32, char)>,
    /// 不绘制的定位标记：0 左上, 1 右上, 2 左下
    pub missing_finders: Vec<usize>,
}

impl SyntheticSheet {
    pub fn new(left_rows: usize, right_rows: usize) -> Self {
        Self {
            left_rows,
            right_rows,
            alternatives: 4,
            marks: Vec::new(),
            missing_finders: Vec::new(),
        }
    }

    pub fn with_alternatives(mut self, alternatives: usize) -> Self {
        self.alternatives = alternatives.max(2);
        self
    }

    pub fn mark(mut self, question: u32, letter: char) -> Self {
        self.marks.push((question, letter));
        self
    }

    pub fn without_finder(mut self, index: usize) -> Self {
        self.missing_finders.push(index);
        self
    }

    /// 第 index 行的中心 Y（标准帧）
    pub fn row_y(layout: &SheetLayout, index: usize) -> f32 {
        (layout.header_fraction * layout.canonical_height as f32).round()
            + FIRST_ROW_OFFSET
            + ROW_PITCH * index as f32
    }

    /// 选项圆心（标准帧）
    pub fn bubble_center(&self, layout: &SheetLayout, side: Side, row: usize, alt: usize) -> (f32, f32) {
        let table = layout.table(side);
        let width = layout.canonical_width as f32;
        let step = (table.alt_x1 - table.alt_x0) * width / (self.alternatives - 1) as f32;
        (
            table.alt_x0 * width + step * alt as f32,
            Self::row_y(layout, row),
        )
    }

    /// 题号所在的 (侧, 行序号)
    fn locate(&self, question: u32) -> Option<(Side, usize)> {
        let index = (question as usize).checked_sub(1)?;
        if index < self.left_rows {
            Some((Side::Left, index))
        } else if index < self.left_rows + self.right_rows {
            Some((Side::Right, index - self.left_rows))
        } else {
            None
        }
    }

    fn is_marked(&self, side: Side, row: usize, alt: usize) -> bool {
        self.marks.iter().any(|&(question, letter)| {
            self.locate(question) == Some((side, row))
                && (letter.to_ascii_uppercase() as u8).wrapping_sub(b'A') as usize == alt
        })
    }
}

/// 渲染标准尺寸的白底答题卡
pub fn render_sheet(layout: &SheetLayout, sheet: &SyntheticSheet) -> RgbImage {
    let mut image = RgbImage::from_pixel(layout.canonical_width, layout.canonical_height, WHITE);

    for (index, (cx, cy)) in layout.finder_centers().into_iter().enumerate() {
        if !sheet.missing_finders.contains(&index) {
            draw_finder(&mut image, layout, cx, cy);
        }
    }

    let bubble_radius = (layout.bubble_size / 2.0).round() as i32;
    for (side, rows) in [(Side::Left, sheet.left_rows), (Side::Right, sheet.right_rows)] {
        let table = layout.table(side);
        let strip_center =
            (table.strip_x0 + table.strip_x1) / 2.0 * layout.canonical_width as f32;

        for row in 0..rows {
            let y = SyntheticSheet::row_y(layout, row);
            let half = (layout.row_marker_size / 2.0).round() as i32;
            let size = layout.row_marker_size.round() as u32;
            draw_filled_rect_mut(
                &mut image,
                Rect::at(strip_center.round() as i32 - half, y.round() as i32 - half)
                    .of_size(size, size),
                BLACK,
            );

            for alt in 0..sheet.alternatives {
                let (bx, by) = sheet.bubble_center(layout, side, row, alt);
                let center = (bx.round() as i32, by.round() as i32);
                if sheet.is_marked(side, row, alt) {
                    draw_filled_circle_mut(&mut image, center, bubble_radius - 1, BLACK);
                } else {
                    draw_hollow_circle_mut(&mut image, center, bubble_radius, BLACK);
                }
            }
        }
    }

    image
}

fn draw_finder(image: &mut RgbImage, layout: &SheetLayout, cx: f32, cy: f32) {
    let size = layout.finder_size.round() as i32;
    let x = cx.round() as i32 - size / 2;
    let y = cy.round() as i32 - size / 2;

    for (inset, color) in [(0, BLACK), (FINDER_BAND, WHITE), (2 * FINDER_BAND, BLACK)] {
        let side = (size - 2 * inset).max(1) as u32;
        draw_filled_rect_mut(image, Rect::at(x + inset, y + inset).of_size(side, side), color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finders_drawn_at_layout_centres() {
        let layout = SheetLayout::default();
        let image = render_sheet(&layout, &SyntheticSheet::new(0, 0));
        // 外圈黑、第二圈白、中心黑
        assert_eq!(image.get_pixel(33, 33).0, [0, 0, 0]);
        assert_eq!(image.get_pixel(42, 42).0, [255, 255, 255]);
        assert_eq!(image.get_pixel(56, 56).0, [0, 0, 0]);
        assert_eq!(image.get_pixel(1532, 2190).0, [255, 255, 255]);
    }

    #[test]
    fn test_marked_bubble_is_filled() {
        let layout = SheetLayout::default();
        let synthetic = SyntheticSheet::new(3, 3).mark(2, 'C').mark(5, 'a');
        let image = render_sheet(&layout, &synthetic);

        let (x, y) = synthetic.bubble_center(&layout, Side::Left, 1, 2);
        assert_eq!(image.get_pixel(x.round() as u32, y.round() as u32).0, [0, 0, 0]);
        let (x, y) = synthetic.bubble_center(&layout, Side::Right, 1, 0);
        assert_eq!(image.get_pixel(x.round() as u32, y.round() as u32).0, [0, 0, 0]);
        let (x, y) = synthetic.bubble_center(&layout, Side::Left, 0, 0);
        assert_eq!(image.get_pixel(x.round() as u32, y.round() as u32).0, [255, 255, 255]);
    }
}
