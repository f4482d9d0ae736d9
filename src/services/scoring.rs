//! 评分服务 - 业务能力层
//!
//! 分段线性成绩公式：及格线以上在 [passing, max] 间插值，以下在 [min, passing] 间插值。
//! 缺少答案时软失败，从不向调用方返回错误。

use serde::{Deserialize, Serialize};

use crate::models::answer::Answer;
use crate::models::exam::{AnswerKey, GradingScale};

/// 评分结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreOutcome {
    pub correct_count: usize,
    pub total_questions: usize,
    pub score: f64,
    pub percentage: f64,
    pub grade: f64,
    /// 软失败原因（缺少答案等）
    pub error: Option<String>,
}

impl ScoreOutcome {
    fn failed(scale: &GradingScale, message: impl Into<String>) -> Self {
        Self {
            correct_count: 0,
            total_questions: 0,
            score: 0.0,
            percentage: 0.0,
            grade: scale.min_grade,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringEngine;

impl ScoringEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn score(
        &self,
        answers: &[Answer],
        key: Option<&AnswerKey>,
        scale: &GradingScale,
    ) -> ScoreOutcome {
        let key = match key {
            Some(key) if !key.is_empty() => key,
            Some(_) => return ScoreOutcome::failed(scale, "答案为空"),
            None => return ScoreOutcome::failed(scale, "未找到已定稿的答案"),
        };

        let correct_count = answers
            .iter()
            .filter(|answer| !answer.multiple_marks)
            .filter(|answer| match (answer.selected, key.entry(answer.question)) {
                (Some(letter), Some(entry)) => entry.accepts(letter),
                _ => false,
            })
            .count();
        let total_questions = key.total_questions();

        ScoreOutcome {
            correct_count,
            total_questions,
            score: correct_count as f64,
            percentage: round1(correct_count as f64 / total_questions as f64 * 100.0),
            grade: round1(grade_for(correct_count, total_questions, scale)),
            error: None,
        }
    }
}

/// `ceil(total × demand / 100)`
pub fn passing_score(total_questions: usize, demand_percentage: f64) -> usize {
    let raw = total_questions as f64 * demand_percentage / 100.0;
    // 避免 6.000000001 这类浮点误差被进位
    (raw - 1e-9).ceil().max(0.0) as usize
}

/// 未取整的分段线性成绩
pub fn grade_for(correct_count: usize, total_questions: usize, scale: &GradingScale) -> f64 {
    let passing = passing_score(total_questions, scale.demand_percentage);

    if correct_count >= passing {
        let ratio = if total_questions == passing {
            1.0
        } else {
            (correct_count - passing) as f64 / (total_questions - passing) as f64
        };
        scale.passing_grade + ratio * (scale.max_grade - scale.passing_grade)
    } else {
        let ratio = if passing == 0 {
            0.0
        } else {
            correct_count as f64 / passing as f64
        };
        scale.min_grade + ratio * (scale.passing_grade - scale.min_grade)
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
