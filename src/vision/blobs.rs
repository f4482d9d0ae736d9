//! 基于轮廓的连通块提取

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::point::Point;

/// 一个外轮廓及其几何量
#[derive(Debug, Clone)]
pub struct Blob {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
    /// 轮廓多边形面积（鞋带公式）
    pub contour_area: f32,
    points: Vec<Point<i32>>,
}

impl Blob {
    fn from_points(points: Vec<Point<i32>>) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self {
            min_x,
            min_y,
            max_x,
            max_y,
            contour_area: shoelace_area(&points),
            points,
        })
    }

    pub fn width(&self) -> f32 {
        (self.max_x - self.min_x + 1) as f32
    }

    pub fn height(&self) -> f32 {
        (self.max_y - self.min_y + 1) as f32
    }

    pub fn bbox_area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width() / self.height()
    }

    pub fn center(&self) -> (f32, f32) {
        (
            self.min_x as f32 + self.width() / 2.0,
            self.min_y as f32 + self.height() / 2.0,
        )
    }

    /// Douglas-Peucker 近似后的顶点数，epsilon 为周长的比例
    pub fn polygon_vertices(&self, epsilon_ratio: f64) -> usize {
        if self.points.len() < 4 {
            return self.points.len();
        }
        let epsilon = arc_length(&self.points, true) * epsilon_ratio;
        if epsilon <= 0.0 {
            return self.points.len();
        }
        let approx = approximate_polygon_dp(&self.points, epsilon, true);
        dedup_close_vertices(&approx, epsilon)
    }

    /// 包围盒内前景像素占比
    pub fn fill_ratio(&self, binary: &GrayImage) -> f32 {
        let mut ink = 0u32;
        for y in self.min_y.max(0)..=self.max_y.min(binary.height() as i32 - 1) {
            for x in self.min_x.max(0)..=self.max_x.min(binary.width() as i32 - 1) {
                if binary.get_pixel(x as u32, y as u32).0[0] > 0 {
                    ink += 1;
                }
            }
        }
        ink as f32 / self.bbox_area()
    }
}

/// 外轮廓（忽略孔洞）
pub fn outer_blobs(binary: &GrayImage) -> Vec<Blob> {
    find_contours::<i32>(binary)
        .into_iter()
        .filter(|contour| contour.border_type == BorderType::Outer)
        .filter_map(|contour| Blob::from_points(contour.points))
        .collect()
}

fn shoelace_area(points: &[Point<i32>]) -> f32 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    (twice.abs() as f32) / 2.0
}

/// 闭合多边形中首尾相邻过近的顶点只算一个
fn dedup_close_vertices(vertices: &[Point<i32>], epsilon: f64) -> usize {
    let mut kept: Vec<Point<i32>> = Vec::with_capacity(vertices.len());
    for v in vertices {
        let close = kept.last().map_or(false, |k| distance(k, v) < epsilon);
        if !close {
            kept.push(*v);
        }
    }
    if kept.len() > 1 && distance(&kept[0], &kept[kept.len() - 1]) < epsilon {
        kept.pop();
    }
    kept.len()
}

fn distance(a: &Point<i32>, b: &Point<i32>) -> f64 {
    let dx = (a.x - b.x) as f64;
    let dy = (a.y - b.y) as f64;
    (dx * dx + dy * dy).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
    use imageproc::rect::Rect;

    #[test]
    fn test_square_blob_geometry() {
        let mut binary = GrayImage::new(100, 100);
        draw_filled_rect_mut(&mut binary, Rect::at(10, 20).of_size(30, 30), Luma([255]));

        let blobs = outer_blobs(&binary);
        assert_eq!(blobs.len(), 1);
        let blob = &blobs[0];
        assert_eq!((blob.width(), blob.height()), (30.0, 30.0));
        assert_eq!(blob.center(), (25.0, 35.0));
        assert_eq!(blob.contour_area, 29.0 * 29.0);
        assert_eq!(blob.polygon_vertices(0.02), 4);
        assert!((blob.fill_ratio(&binary) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_circle_is_not_a_quadrilateral() {
        let mut binary = GrayImage::new(100, 100);
        draw_filled_circle_mut(&mut binary, (50, 50), 20, Luma([255]));
        let blobs = outer_blobs(&binary);
        assert_eq!(blobs.len(), 1);
        assert!(blobs[0].polygon_vertices(0.02) > 4);
        let fill = blobs[0].fill_ratio(&binary);
        assert!(fill > 0.7 && fill < 0.85);
    }

    #[test]
    fn test_holes_are_skipped() {
        let mut binary = GrayImage::new(100, 100);
        draw_filled_rect_mut(&mut binary, Rect::at(10, 10).of_size(60, 60), Luma([255]));
        draw_filled_rect_mut(&mut binary, Rect::at(25, 25).of_size(30, 30), Luma([0]));
        assert_eq!(outer_blobs(&binary).len(), 1);
    }
}
