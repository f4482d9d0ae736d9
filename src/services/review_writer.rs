//! 复核清单写入服务 - 业务能力层
//!
//! 只负责"把需要复核的页面写进清单文件"，不关心流程

use anyhow::{Context, Result};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::models::result::CorrectionResult;

/// 复核清单写入服务
///
/// 每个需要复核的页面追加一行：`页面 N | 试卷 X | 原因: a; b`
pub struct ReviewWriter {
    review_file_path: String,
}

impl ReviewWriter {
    pub fn new() -> Self {
        Self {
            review_file_path: "review.txt".to_string(),
        }
    }

    /// 使用自定义文件路径创建
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            review_file_path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.review_file_path
    }

    /// 写入一行复核记录，不需要复核的页面直接跳过
    pub async fn write(&self, result: &CorrectionResult) -> Result<()> {
        if !result.needs_review {
            return Ok(());
        }

        debug!(
            "写入复核清单: 页面 {} | 原因数: {}",
            result.page_number,
            result.review_reasons.len()
        );

        let reasons = result
            .review_reasons
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        let line = format!(
            "页面 {} | 试卷 {} | 原因: {}\n",
            result.page_number, result.exam_id, reasons
        );

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.review_file_path)
            .await
            .with_context(|| format!("无法打开复核清单: {}", self.review_file_path))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }
}

impl Default for ReviewWriter {
    fn default() -> Self {
        Self::new()
    }
}
