use serde::{Deserialize, Serialize};

/// 某道题命中的一个候选选项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkedAlternative {
    pub letter: char,
    pub confidence: f32,
    pub mark_type: String,
}

/// 单道题的作答结果
///
/// `selected` 非空当且仅当恰好命中一个候选；`multiple_marks` 当且仅当命中多于一个。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question: u32,
    pub selected: Option<char>,
    pub confidence: f32,
    pub mark_type: Option<String>,
    pub multiple_marks: bool,
    pub all_marked: Vec<MarkedAlternative>,
}

impl Answer {
    /// 根据候选列表套用多选判定规则
    pub fn from_candidates(question: u32, candidates: Vec<MarkedAlternative>) -> Self {
        match candidates.as_slice() {
            [] => Self {
                question,
                selected: None,
                confidence: 0.0,
                mark_type: None,
                multiple_marks: false,
                all_marked: candidates,
            },
            [only] => Self {
                question,
                selected: Some(only.letter),
                confidence: only.confidence,
                mark_type: Some(only.mark_type.clone()),
                multiple_marks: false,
                all_marked: candidates,
            },
            _ => Self {
                question,
                selected: None,
                confidence: 0.0,
                mark_type: None,
                multiple_marks: true,
                all_marked: candidates,
            },
        }
    }

    pub fn is_blank(&self) -> bool {
        self.all_marked.is_empty()
    }
}
