use crate::models::exam::{AnswerKey, ExamDefinition, Identity, KeyEntry};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;

/// 试卷 TOML 文件
///
/// ```toml
/// finalized = true
///
/// [exam]
/// exam_id = "math-01"
/// differentiated = false
///
/// [[exam.questions]]
/// number = 1
/// kind = "multiple_choice"
/// alternatives = 5
///
/// [[answer_key]]
/// question = 1
/// correct_answer = "B"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamFile {
    pub exam: ExamDefinition,
    /// 答案是否已定稿，未定稿时不提供答案
    #[serde(default)]
    pub finalized: bool,
    /// 统一答案
    #[serde(default)]
    pub answer_key: Vec<KeyEntry>,
    /// 差异化试卷：学生ID → 该学生的答案
    #[serde(default)]
    pub student_keys: HashMap<String, Vec<KeyEntry>>,
}

impl ExamFile {
    /// 按学生解析已定稿的答案
    pub fn finalized_key(&self, student_id: Option<&str>) -> Option<AnswerKey> {
        if !self.finalized {
            return None;
        }
        let entries = if self.exam.differentiated {
            self.student_keys.get(student_id?)?
        } else {
            &self.answer_key
        };
        Some(AnswerKey::new(entries.clone()))
    }
}

/// 学生名册 TOML 文件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RosterFile {
    #[serde(default)]
    pub students: Vec<Identity>,
}

/// 从 TOML 文件加载试卷
pub async fn load_exam_file(toml_file_path: &Path) -> Result<ExamFile> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let exam: ExamFile = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    exam.exam
        .grading_scale
        .validate()
        .with_context(|| format!("评分标准不合法: {}", toml_file_path.display()))?;

    Ok(exam)
}

/// 从 TOML 文件加载学生名册
pub async fn load_roster_file(toml_file_path: &Path) -> Result<RosterFile> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let roster: RosterFile = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    tracing::info!("成功加载 {} 名学生", roster.students.len());
    Ok(roster)
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIFORM: &str = r#"
finalized = true

[exam]
exam_id = "math-01"

[[exam.questions]]
number = 1
kind = "multiple_choice"
alternatives = 5

[[answer_key]]
question = 1
correct_answer = "B"
"#;

    const DIFFERENTIATED: &str = r#"
finalized = true

[exam]
exam_id = "hist-02"
differentiated = true

[student_keys]
"s-001" = [{ question = 1, correct_answer = "C" }]
"#;

    #[test]
    fn test_uniform_key_ignores_student() {
        let exam: ExamFile = toml::from_str(UNIFORM).unwrap();
        let key = exam.finalized_key(None).unwrap();
        assert!(key.entry(1).unwrap().accepts('B'));
        assert_eq!(exam.exam.alternative_count(), 5);
    }

    #[test]
    fn test_differentiated_key_needs_student() {
        let exam: ExamFile = toml::from_str(DIFFERENTIATED).unwrap();
        assert!(exam.finalized_key(None).is_none());
        assert!(exam.finalized_key(Some("s-999")).is_none());
        let key = exam.finalized_key(Some("s-001")).unwrap();
        assert!(key.entry(1).unwrap().accepts('C'));
    }

    #[test]
    fn test_unfinalized_exam_has_no_key() {
        let mut exam: ExamFile = toml::from_str(UNIFORM).unwrap();
        exam.finalized = false;
        assert!(exam.finalized_key(None).is_none());
    }

    #[tokio::test]
    async fn test_load_exam_file_reports_missing_path() {
        let result = load_exam_file(Path::new("/nonexistent/exam.toml")).await;
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("无法读取TOML文件"));
    }
}
