//! 页面处理上下文
//!
//! 封装"我正在批改哪份试卷的第几页"这一信息

use std::fmt::Display;
use std::sync::Arc;

use crate::models::exam::ExamDefinition;

/// 页面处理上下文
///
/// 同一批次的所有页面共享同一份试卷定义
#[derive(Debug, Clone)]
pub struct PageCtx {
    /// 试卷定义（找不到时为默认值）
    pub exam: Arc<ExamDefinition>,

    /// 页码（从1开始，也用于日志显示）
    pub page_number: u32,

    /// 是否在评分前按学号查找学生
    pub identify: bool,
}

impl PageCtx {
    pub fn new(exam: Arc<ExamDefinition>, page_number: u32, identify: bool) -> Self {
        Self {
            exam,
            page_number,
            identify,
        }
    }

    pub fn exam_id(&self) -> &str {
        &self.exam.exam_id
    }
}

impl Display for PageCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[页面 {}]", self.page_number)
    }
}
