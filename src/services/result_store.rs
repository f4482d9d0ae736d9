//! 结果持久化服务 - 业务能力层

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;
use tracing::debug;

use crate::error::FileError;
use crate::models::result::CorrectionResult;
use crate::utils::file_name::plain_file_name;

/// 结果存储
pub trait ResultStore: Send + Sync {
    fn save<'a>(&'a self, exam_id: &'a str, result: &'a CorrectionResult) -> BoxFuture<'a, Result<()>>;
}

/// 写 `output_folder/<exam_id>/page_NNN.json`，缩略图写到同名 `.png`
#[derive(Debug, Clone)]
pub struct JsonResultStore {
    output_folder: PathBuf,
}

impl JsonResultStore {
    pub fn new(output_folder: impl Into<PathBuf>) -> Self {
        Self {
            output_folder: output_folder.into(),
        }
    }

    /// 试卷编号必须是单个普通文件名，不能跳出输出目录
    pub fn result_path(&self, exam_id: &str, page_number: u32) -> Result<PathBuf, FileError> {
        Ok(self
            .output_folder
            .join(plain_file_name(exam_id)?)
            .join(format!("page_{:03}.json", page_number)))
    }

    async fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
        fs::write(path, contents)
            .await
            .map_err(|source| FileError::WriteFailed {
                path: path.display().to_string(),
                source,
            })?;
        Ok(())
    }
}

impl ResultStore for JsonResultStore {
    fn save<'a>(&'a self, exam_id: &'a str, result: &'a CorrectionResult) -> BoxFuture<'a, Result<()>> {
        async move {
            let json_path = self.result_path(exam_id, result.page_number)?;
            if let Some(parent) = json_path.parent() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("无法创建输出目录: {}", parent.display()))?;
            }

            let json = serde_json::to_string_pretty(result).context("结果序列化失败")?;
            Self::write_file(&json_path, json.as_bytes()).await?;

            if let Some(thumbnail) = result.thumbnail.as_ref().filter(|t| !t.png.is_empty()) {
                Self::write_file(&json_path.with_extension("png"), &thumbnail.png).await?;
            }

            debug!("[页面 {}] 结果已写入 {}", result.page_number, json_path.display());
            Ok(())
        }
        .boxed()
    }
}

/// 保存在内存中的结果（测试与嵌入式调用）
#[derive(Debug, Default)]
pub struct MemoryResultStore {
    saved: Mutex<Vec<(String, CorrectionResult)>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已保存的页码（按保存顺序）
    pub fn saved_pages(&self) -> Vec<u32> {
        self.saved
            .lock()
            .map(|saved| saved.iter().map(|(_, r)| r.page_number).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.saved.lock().map(|saved| saved.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultStore for MemoryResultStore {
    fn save<'a>(&'a self, exam_id: &'a str, result: &'a CorrectionResult) -> BoxFuture<'a, Result<()>> {
        async move {
            let mut saved = self
                .saved
                .lock()
                .map_err(|_| anyhow::anyhow!("结果存储锁已损坏"))?;
            saved.push((exam_id.to_string(), result.clone()));
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::exam::GradingScale;
    use crate::models::result::{ReviewReason, Thumbnail};

    #[tokio::test]
    async fn test_json_store_writes_result_and_thumbnail() {
        let dir = std::env::temp_dir().join(format!("omr_store_{}", std::process::id()));
        let store = JsonResultStore::new(&dir);
        let mut result =
            CorrectionResult::fallback(7, "math", &GradingScale::default(), ReviewReason::IdUnreadable);
        result.thumbnail = Some(Thumbnail {
            width: 1,
            height: 1,
            png: vec![1, 2, 3],
        });

        store.save("math", &result).await.unwrap();

        let path = store.result_path("math", 7).unwrap();
        assert!(path.ends_with("math/page_007.json"));
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(json["page_number"], 7);
        assert_eq!(json["review_reasons"][0]["kind"], "id_unreadable");
        assert!(json["thumbnail"].get("png").is_none());
        assert_eq!(fs::read(path.with_extension("png")).await.unwrap(), vec![1, 2, 3]);

        fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_json_store_rejects_exam_id_outside_output_folder() {
        let dir = std::env::temp_dir().join(format!("omr_store_escape_{}", std::process::id()));
        let store = JsonResultStore::new(dir.join("out"));
        let scale = GradingScale::default();

        for exam_id in ["../x", "a/b"] {
            let result = CorrectionResult::fallback(1, exam_id, &scale, ReviewReason::IdUnreadable);
            let err = store.save(exam_id, &result).await.unwrap_err();
            assert!(matches!(
                err.downcast_ref::<FileError>(),
                Some(FileError::InvalidName { .. })
            ));
        }
        assert!(!dir.join("x").exists());
        assert!(!dir.join("out").exists());
    }

    #[tokio::test]
    async fn test_memory_store_keeps_order() {
        let store = MemoryResultStore::new();
        let scale = GradingScale::default();
        for page in [3, 1, 2] {
            let result = CorrectionResult::fallback(page, "e", &scale, ReviewReason::IdUnreadable);
            store.save("e", &result).await.unwrap();
        }
        assert_eq!(store.saved_pages(), vec![3, 1, 2]);
    }
}
