//! 批改结果、复核原因与批次报告

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::answer::Answer;
use crate::models::exam::GradingScale;

/// 单页流水线的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Decode,
    Align,
    Recognize,
    Identify,
    Detect,
    Score,
    Persist,
    Page,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Decode => "decode",
            PipelineStage::Align => "align",
            PipelineStage::Recognize => "recognize",
            PipelineStage::Identify => "identify",
            PipelineStage::Detect => "detect",
            PipelineStage::Score => "score",
            PipelineStage::Persist => "persist",
            PipelineStage::Page => "page",
        };
        f.write_str(name)
    }
}

/// 需要人工复核的原因，彼此独立，可以同时出现
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReviewReason {
    AlignmentDegraded { markers_found: usize },
    IdUnreadable,
    IdChecksumInvalid { id: String },
    MultipleMarks { count: usize },
    ScoringError { message: String },
    LowConfidence { count: usize, threshold: f32 },
    StageFailed { stage: PipelineStage, message: String },
}

impl ReviewReason {
    /// 稳定的机器可读代码
    pub fn code(&self) -> &'static str {
        match self {
            ReviewReason::AlignmentDegraded { .. } => "alignment_degraded",
            ReviewReason::IdUnreadable => "id_unreadable",
            ReviewReason::IdChecksumInvalid { .. } => "id_checksum_invalid",
            ReviewReason::MultipleMarks { .. } => "multiple_marks",
            ReviewReason::ScoringError { .. } => "scoring_error",
            ReviewReason::LowConfidence { .. } => "low_confidence",
            ReviewReason::StageFailed { .. } => "stage_failed",
        }
    }
}

impl fmt::Display for ReviewReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewReason::AlignmentDegraded { markers_found } => {
                write!(f, "对齐失败: 仅检测到 {}/3 个定位标记", markers_found)
            }
            ReviewReason::IdUnreadable => write!(f, "学号无法识别"),
            ReviewReason::IdChecksumInvalid { id } => write!(f, "学号校验位错误: {}", id),
            ReviewReason::MultipleMarks { count } => write!(f, "{} 道题存在多选", count),
            ReviewReason::ScoringError { message } => write!(f, "评分失败: {}", message),
            ReviewReason::LowConfidence { count, threshold } => {
                write!(f, "{} 个标记置信度低于 {:.2}", count, threshold)
            }
            ReviewReason::StageFailed { stage, message } => {
                write!(f, "阶段 {} 失败: {}", stage, message)
            }
        }
    }
}

/// 对齐后页面的缩略图（PNG）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub width: u32,
    pub height: u32,
    #[serde(skip)]
    pub png: Vec<u8>,
}

/// 单页批改结果，持久化后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionResult {
    pub page_number: u32,
    pub exam_id: String,
    pub student_id: Option<String>,
    pub detected_id: Option<String>,
    pub id_valid: bool,
    pub id_confidence: f32,
    pub alignment_success: bool,
    pub answers: Vec<Answer>,
    pub correct_count: usize,
    pub total_questions: usize,
    pub score: f64,
    pub percentage: f64,
    pub grade: f64,
    pub scoring_error: Option<String>,
    pub needs_review: bool,
    pub review_reasons: Vec<ReviewReason>,
    pub thumbnail: Option<Thumbnail>,
    pub processing_time_ms: u64,
    pub corrected_at: DateTime<Local>,
}

impl CorrectionResult {
    /// 页面流水线彻底失败时的兜底结果：0 分、最低成绩、需要复核
    pub fn fallback(
        page_number: u32,
        exam_id: impl Into<String>,
        scale: &GradingScale,
        reason: ReviewReason,
    ) -> Self {
        Self {
            page_number,
            exam_id: exam_id.into(),
            student_id: None,
            detected_id: None,
            id_valid: false,
            id_confidence: 0.0,
            alignment_success: false,
            answers: Vec::new(),
            correct_count: 0,
            total_questions: 0,
            score: 0.0,
            percentage: 0.0,
            grade: scale.min_grade,
            scoring_error: None,
            needs_review: true,
            review_reasons: vec![reason],
            thumbnail: None,
            processing_time_ms: 0,
            corrected_at: Local::now(),
        }
    }

    pub fn has_reason(&self, code: &str) -> bool {
        self.review_reasons.iter().any(|r| r.code() == code)
    }
}

/// 进度阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Decode,
    Initialize,
    Batch,
    Done,
}

/// 进度快照
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub stage: ProgressStage,
    pub current: usize,
    pub total: usize,
    pub percentage: u8,
}

impl Progress {
    pub fn new(stage: ProgressStage, current: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            100
        } else {
            ((current.min(total) as f64 / total as f64) * 100.0).round() as u8
        };
        Self {
            stage,
            current,
            total,
            percentage,
        }
    }
}

/// 批次报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: u64,
    pub success: bool,
    pub total_pages: usize,
    pub processed_pages: usize,
    pub identified: usize,
    pub pending: usize,
    pub errors: Vec<String>,
    pub results: Vec<CorrectionResult>,
}

impl BatchReport {
    pub fn from_results(run_id: u64, total_pages: usize, results: Vec<CorrectionResult>) -> Self {
        let identified = results.iter().filter(|r| r.student_id.is_some()).count();
        let errors = results
            .iter()
            .flat_map(|r| {
                r.review_reasons.iter().filter_map(move |reason| match reason {
                    ReviewReason::StageFailed { .. } => {
                        Some(format!("页面 {}: {}", r.page_number, reason))
                    }
                    _ => None,
                })
            })
            .collect();
        Self {
            run_id,
            success: true,
            total_pages,
            processed_pages: results.len(),
            identified,
            pending: results.len() - identified,
            errors,
            results,
        }
    }

    pub fn needs_review(&self) -> usize {
        self.results.iter().filter(|r| r.needs_review).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percentage() {
        assert_eq!(Progress::new(ProgressStage::Batch, 1, 3).percentage, 33);
        assert_eq!(Progress::new(ProgressStage::Batch, 3, 3).percentage, 100);
        assert_eq!(Progress::new(ProgressStage::Decode, 0, 0).percentage, 100);
    }

    #[test]
    fn test_reason_serializes_with_kind_tag() {
        let json = serde_json::to_value(ReviewReason::MultipleMarks { count: 2 }).unwrap();
        assert_eq!(json["kind"], "multiple_marks");
        assert_eq!(json["count"], 2);
        assert!(ReviewReason::MultipleMarks { count: 2 }.to_string().contains('2'));
    }

    #[test]
    fn test_report_collects_stage_failures() {
        let scale = GradingScale::default();
        let failed = CorrectionResult::fallback(
            2,
            "exam",
            &scale,
            ReviewReason::StageFailed {
                stage: PipelineStage::Decode,
                message: "bad bytes".to_string(),
            },
        );
        let mut identified = CorrectionResult::fallback(1, "exam", &scale, ReviewReason::IdUnreadable);
        identified.student_id = Some("s-1".to_string());

        let report = BatchReport::from_results(7, 2, vec![identified, failed]);
        assert_eq!(report.identified, 1);
        assert_eq!(report.pending, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("页面 2"));
        assert_eq!(report.needs_review(), 2);
    }
}
