//! 试卷定义、答案与评分标准

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 题目类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice,
    TrueFalse,
    /// 不在答题卡表格上作答（例如主观题），不参与选项列数计算
    Open,
}

/// 题目定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSpec {
    pub number: u32,
    pub kind: QuestionKind,
    #[serde(default = "default_alternatives")]
    pub alternatives: usize,
}

fn default_alternatives() -> usize {
    4
}

impl QuestionSpec {
    /// 在答题卡上需要的选项列数
    pub fn grid_alternatives(&self) -> Option<usize> {
        match self.kind {
            QuestionKind::MultipleChoice => Some(self.alternatives),
            QuestionKind::TrueFalse => Some(2),
            QuestionKind::Open => None,
        }
    }
}

/// 评分标准
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradingScale {
    pub max_grade: f64,
    pub min_grade: f64,
    pub passing_grade: f64,
    /// 及格所需正确率（百分比）
    pub demand_percentage: f64,
}

impl Default for GradingScale {
    fn default() -> Self {
        Self {
            max_grade: 7.0,
            min_grade: 1.0,
            passing_grade: 4.0,
            demand_percentage: 60.0,
        }
    }
}

impl GradingScale {
    pub fn new(
        max_grade: f64,
        min_grade: f64,
        passing_grade: f64,
        demand_percentage: f64,
    ) -> Result<Self, ConfigError> {
        let scale = Self {
            max_grade,
            min_grade,
            passing_grade,
            demand_percentage,
        };
        scale.validate()?;
        Ok(scale)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_grade <= self.passing_grade && self.passing_grade <= self.max_grade) {
            return Err(ConfigError::InvalidGradingScale {
                reason: format!(
                    "需要 min <= passing <= max，实际为 {} / {} / {}",
                    self.min_grade, self.passing_grade, self.max_grade
                ),
            });
        }
        if !(0.0..=100.0).contains(&self.demand_percentage) {
            return Err(ConfigError::InvalidGradingScale {
                reason: format!("及格百分比 {} 不在 [0, 100] 内", self.demand_percentage),
            });
        }
        Ok(())
    }
}

/// 试卷定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamDefinition {
    pub exam_id: String,
    #[serde(default)]
    pub name: String,
    /// 是否为每个学生单独生成答案（差异化试卷）
    #[serde(default)]
    pub differentiated: bool,
    #[serde(default)]
    pub questions: Vec<QuestionSpec>,
    #[serde(default)]
    pub grading_scale: GradingScale,
}

impl ExamDefinition {
    /// 没有试卷定义时使用的默认值
    pub fn fallback(exam_id: impl Into<String>) -> Self {
        Self {
            exam_id: exam_id.into(),
            name: String::new(),
            differentiated: false,
            questions: Vec::new(),
            grading_scale: GradingScale::default(),
        }
    }

    /// 网格的选项列数：选择题与判断题所需的最大值，至少为 4
    pub fn alternative_count(&self) -> usize {
        self.questions
            .iter()
            .filter_map(QuestionSpec::grid_alternatives)
            .max()
            .unwrap_or(0)
            .max(4)
    }
}

/// 单道题的标准答案
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyEntry {
    pub question: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<char>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub correct_alternatives: Vec<char>,
}

impl KeyEntry {
    pub fn single(question: u32, letter: char) -> Self {
        Self {
            question,
            correct_answer: Some(letter),
            correct_alternatives: Vec::new(),
        }
    }

    pub fn accepts(&self, letter: char) -> bool {
        let letter = letter.to_ascii_uppercase();
        self.correct_answer.map(|c| c.to_ascii_uppercase()) == Some(letter)
            || self
                .correct_alternatives
                .iter()
                .any(|c| c.to_ascii_uppercase() == letter)
    }
}

/// 已定稿的答案，创建后不可修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerKey {
    entries: Vec<KeyEntry>,
}

impl AnswerKey {
    pub fn new(mut entries: Vec<KeyEntry>) -> Self {
        entries.sort_by_key(|e| e.question);
        entries.dedup_by_key(|e| e.question);
        Self { entries }
    }

    pub fn entries(&self) -> &[KeyEntry] {
        &self.entries
    }

    pub fn total_questions(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, question: u32) -> Option<&KeyEntry> {
        self.entries
            .binary_search_by_key(&question, |e| e.question)
            .ok()
            .map(|idx| &self.entries[idx])
    }
}

/// 已登记的学生身份
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub student_id: String,
    /// 带校验位的学号主体（不含校验位）
    pub validated_id: String,
    #[serde(default)]
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alternative_count_has_floor_of_four() {
        let mut exam = ExamDefinition::fallback("e1");
        assert_eq!(exam.alternative_count(), 4);

        exam.questions = vec![
            QuestionSpec {
                number: 1,
                kind: QuestionKind::TrueFalse,
                alternatives: 2,
            },
            QuestionSpec {
                number: 2,
                kind: QuestionKind::Open,
                alternatives: 9,
            },
        ];
        assert_eq!(exam.alternative_count(), 4);

        exam.questions.push(QuestionSpec {
            number: 3,
            kind: QuestionKind::MultipleChoice,
            alternatives: 5,
        });
        assert_eq!(exam.alternative_count(), 5);
    }

    #[test]
    fn test_key_entry_accepts_any_listed_alternative() {
        let entry = KeyEntry {
            question: 4,
            correct_answer: None,
            correct_alternatives: vec!['b', 'D'],
        };
        assert!(entry.accepts('B'));
        assert!(entry.accepts('d'));
        assert!(!entry.accepts('A'));
    }

    #[test]
    fn test_answer_key_lookup_is_sorted() {
        let key = AnswerKey::new(vec![KeyEntry::single(3, 'C'), KeyEntry::single(1, 'A')]);
        assert_eq!(key.entries()[0].question, 1);
        assert!(key.entry(3).unwrap().accepts('C'));
        assert!(key.entry(2).is_none());
    }

    #[test]
    fn test_grading_scale_rejects_inverted_bounds() {
        assert!(GradingScale::new(7.0, 1.0, 4.0, 60.0).is_ok());
        assert!(GradingScale::new(4.0, 1.0, 7.0, 60.0).is_err());
        assert!(GradingScale::new(7.0, 1.0, 4.0, 160.0).is_err());
    }
}
