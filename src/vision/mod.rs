//! 视觉处理层
//!
//! - binarize: 灰度化与自适应二值化
//! - blobs: 外轮廓提取与几何量
//! - aligner: 定位标记检测与透视校正
//! - grid: 行标记与题目网格
//! - roi: 学号区与答题表格裁剪
//! - synthetic: 合成答题卡
//! - thumbnail: 结果缩略图

pub mod aligner;
pub mod binarize;
pub mod blobs;
pub mod grid;
pub mod roi;
pub mod synthetic;
pub mod thumbnail;

pub use aligner::{AlignmentBackend, AlignmentOutcome, ContourAlignmentBackend, ImageAligner};
pub use binarize::BinarizeParams;
pub use grid::GridGeometryResolver;
pub use roi::{Roi, RoiExtractor, SheetRois};
pub use synthetic::{render_sheet, SyntheticSheet};
pub use thumbnail::encode_thumbnail;
