//! 检测结果 → 作答映射服务 - 业务能力层
//!
//! 只负责"按坐标把标记落到题目与选项上"，输入必须是对齐帧绝对坐标

use tracing::debug;

use crate::models::answer::{Answer, MarkedAlternative};
use crate::models::detection::Detection;
use crate::models::sheet::{GridRow, SheetGrid};

/// 默认像素容差
pub const DEFAULT_TOLERANCE_PX: f32 = 15.0;

#[derive(Debug, Clone, Copy)]
pub struct AnswerMapper {
    tolerance: f32,
}

impl Default for AnswerMapper {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE_PX)
    }
}

impl AnswerMapper {
    pub fn new(tolerance: f32) -> Self {
        Self { tolerance }
    }

    /// 容差按图像相对标准帧的比例缩放
    pub fn scaled(&self, factor: f32) -> Self {
        Self::new(self.tolerance * factor)
    }

    /// 每个网格行生成一个作答，按题号升序
    pub fn map(&self, grid: &SheetGrid, detections: &[Detection]) -> Vec<Answer> {
        let mut answers: Vec<Answer> = grid
            .rows
            .iter()
            .map(|row| Answer::from_candidates(row.question_number, self.candidates(row, detections)))
            .collect();
        answers.sort_by_key(|a| a.question);

        debug!(
            "映射完成: {} 道题, {} 道已作答, {} 道多选",
            answers.len(),
            answers.iter().filter(|a| a.selected.is_some()).count(),
            answers.iter().filter(|a| a.multiple_marks).count()
        );
        answers
    }

    /// 某一行命中的候选选项；同一字母只保留置信度最高的一个
    fn candidates(&self, row: &GridRow, detections: &[Detection]) -> Vec<MarkedAlternative> {
        let mut candidates: Vec<MarkedAlternative> = Vec::new();

        for detection in detections.iter().filter(|d| d.side == row.side) {
            let (cx, cy) = detection.bbox.center();
            if (cy - row.y).abs() > self.tolerance {
                continue;
            }

            for cell in &row.alternatives {
                if (cx - cell.x).abs() > self.tolerance {
                    continue;
                }
                match candidates.iter_mut().find(|c| c.letter == cell.letter) {
                    Some(existing) if existing.confidence >= detection.confidence => {}
                    Some(existing) => {
                        existing.confidence = detection.confidence;
                        existing.mark_type = detection.class.clone();
                    }
                    None => candidates.push(MarkedAlternative {
                        letter: cell.letter,
                        confidence: detection.confidence,
                        mark_type: detection.class.clone(),
                    }),
                }
            }
        }

        candidates.sort_by_key(|c| c.letter);
        candidates
    }
}
