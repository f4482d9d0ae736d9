//! 试卷与学生身份查询 - 业务能力层
//!
//! 只负责"按 ID 查数据"，数据来源可以是内存或 TOML 文件

use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

use crate::models::exam::{AnswerKey, ExamDefinition, Identity};
use crate::models::loaders::{load_exam_file, load_roster_file, ExamFile};
use crate::utils::file_name::plain_file_name;

/// 试卷仓库
pub trait ExamRepository: Send + Sync {
    /// 试卷定义，不存在时返回 None
    fn get_exam<'a>(&'a self, exam_id: &'a str) -> BoxFuture<'a, Result<Option<ExamDefinition>>>;

    /// 已定稿的答案；差异化试卷需要学生ID，未定稿或找不到时返回 None
    fn get_finalized_answer_key<'a>(
        &'a self,
        exam_id: &'a str,
        student_id: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Option<Arc<AnswerKey>>>>;
}

/// 学生身份仓库
pub trait IdentityRepository: Send + Sync {
    /// 按校验通过的学号精确查找
    fn find_by_validated_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Identity>>>;
}

// ========== 内存实现 ==========

#[derive(Debug, Default)]
pub struct InMemoryExamRepository {
    exams: HashMap<String, ExamDefinition>,
    uniform_keys: HashMap<String, Arc<AnswerKey>>,
    student_keys: HashMap<(String, String), Arc<AnswerKey>>,
}

impl InMemoryExamRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exam(mut self, exam: ExamDefinition) -> Self {
        self.exams.insert(exam.exam_id.clone(), exam);
        self
    }

    pub fn with_key(mut self, exam_id: impl Into<String>, key: AnswerKey) -> Self {
        self.uniform_keys.insert(exam_id.into(), Arc::new(key));
        self
    }

    pub fn with_student_key(
        mut self,
        exam_id: impl Into<String>,
        student_id: impl Into<String>,
        key: AnswerKey,
    ) -> Self {
        self.student_keys
            .insert((exam_id.into(), student_id.into()), Arc::new(key));
        self
    }

    fn lookup(&self, exam_id: &str, student_id: Option<&str>) -> Option<Arc<AnswerKey>> {
        let differentiated = self
            .exams
            .get(exam_id)
            .map(|exam| exam.differentiated)
            .unwrap_or(false);

        if differentiated {
            let student_id = student_id?;
            self.student_keys
                .get(&(exam_id.to_string(), student_id.to_string()))
                .cloned()
        } else {
            self.uniform_keys.get(exam_id).cloned()
        }
    }
}

impl ExamRepository for InMemoryExamRepository {
    fn get_exam<'a>(&'a self, exam_id: &'a str) -> BoxFuture<'a, Result<Option<ExamDefinition>>> {
        async move { Ok(self.exams.get(exam_id).cloned()) }.boxed()
    }

    fn get_finalized_answer_key<'a>(
        &'a self,
        exam_id: &'a str,
        student_id: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Option<Arc<AnswerKey>>>> {
        async move { Ok(self.lookup(exam_id, student_id)) }.boxed()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryIdentityRepository {
    by_validated_id: HashMap<String, Identity>,
}

impl InMemoryIdentityRepository {
    pub fn new(identities: impl IntoIterator<Item = Identity>) -> Self {
        Self {
            by_validated_id: identities
                .into_iter()
                .map(|identity| (identity.validated_id.clone(), identity))
                .collect(),
        }
    }
}

impl IdentityRepository for InMemoryIdentityRepository {
    fn find_by_validated_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Identity>>> {
        async move { Ok(self.by_validated_id.get(id).cloned()) }.boxed()
    }
}

// ========== TOML 文件实现 ==========

/// 从 `exam_folder/<exam_id>.toml` 读取试卷，读过的文件缓存在内存中
#[derive(Debug)]
pub struct TomlExamRepository {
    exam_folder: PathBuf,
    cache: Mutex<HashMap<String, Option<Arc<ExamFile>>>>,
}

impl TomlExamRepository {
    pub fn new(exam_folder: impl Into<PathBuf>) -> Self {
        Self {
            exam_folder: exam_folder.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    async fn exam_file(&self, exam_id: &str) -> Result<Option<Arc<ExamFile>>> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.get(exam_id) {
            return Ok(cached.clone());
        }

        let path = self
            .exam_folder
            .join(format!("{}.toml", plain_file_name(exam_id)?));
        let loaded = if path.exists() {
            debug!("加载试卷文件: {}", path.display());
            Some(Arc::new(load_exam_file(&path).await?))
        } else {
            warn!("试卷文件不存在: {}", path.display());
            None
        };

        cache.insert(exam_id.to_string(), loaded.clone());
        Ok(loaded)
    }
}

impl ExamRepository for TomlExamRepository {
    fn get_exam<'a>(&'a self, exam_id: &'a str) -> BoxFuture<'a, Result<Option<ExamDefinition>>> {
        async move {
            let file = self.exam_file(exam_id).await?;
            Ok(file.map(|f| f.exam.clone()))
        }
        .boxed()
    }

    fn get_finalized_answer_key<'a>(
        &'a self,
        exam_id: &'a str,
        student_id: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Option<Arc<AnswerKey>>>> {
        async move {
            let file = self.exam_file(exam_id).await?;
            Ok(file
                .and_then(|f| f.finalized_key(student_id))
                .map(Arc::new))
        }
        .boxed()
    }
}

/// 从名册 TOML 读取学生身份，首次查询时加载
#[derive(Debug)]
pub struct TomlIdentityRepository {
    roster_path: PathBuf,
    roster: OnceCell<HashMap<String, Identity>>,
}

impl TomlIdentityRepository {
    pub fn new(roster_path: impl Into<PathBuf>) -> Self {
        Self {
            roster_path: roster_path.into(),
            roster: OnceCell::new(),
        }
    }

    async fn roster(&self) -> Result<&HashMap<String, Identity>> {
        self.roster
            .get_or_try_init(|| index_roster(&self.roster_path))
            .await
    }
}

async fn index_roster(roster_path: &Path) -> Result<HashMap<String, Identity>> {
    if !roster_path.exists() {
        warn!("学生名册不存在: {}", roster_path.display());
        return Ok(HashMap::new());
    }
    let roster = load_roster_file(roster_path).await?;
    Ok(roster
        .students
        .into_iter()
        .map(|s| (s.validated_id.clone(), s))
        .collect())
}

impl IdentityRepository for TomlIdentityRepository {
    fn find_by_validated_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Identity>>> {
        async move { Ok(self.roster().await?.get(id).cloned()) }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FileError;
    use crate::models::exam::KeyEntry;

    fn identity(student_id: &str, validated_id: &str) -> Identity {
        Identity {
            student_id: student_id.to_string(),
            validated_id: validated_id.to_string(),
            name: String::new(),
        }
    }

    #[tokio::test]
    async fn test_differentiated_key_requires_student() {
        let mut exam = ExamDefinition::fallback("hist");
        exam.differentiated = true;
        let repo = InMemoryExamRepository::new()
            .with_exam(exam)
            .with_student_key("hist", "s-1", AnswerKey::new(vec![KeyEntry::single(1, 'A')]));

        assert!(repo.get_finalized_answer_key("hist", None).await.unwrap().is_none());
        let key = repo
            .get_finalized_answer_key("hist", Some("s-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(key.total_questions(), 1);
    }

    #[tokio::test]
    async fn test_uniform_key_without_exam_definition() {
        let repo = InMemoryExamRepository::new()
            .with_key("math", AnswerKey::new(vec![KeyEntry::single(1, 'B')]));
        let key = repo.get_finalized_answer_key("math", Some("anyone")).await.unwrap();
        assert!(key.is_some());
        assert!(repo.get_exam("math").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_identity_lookup_is_exact() {
        let repo = InMemoryIdentityRepository::new(vec![identity("s-1", "12345678")]);
        let found = repo.find_by_validated_id("12345678").await.unwrap();
        assert_eq!(found.unwrap().student_id, "s-1");
        assert!(repo.find_by_validated_id("1234567").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_toml_repositories_tolerate_missing_files() {
        let exams = TomlExamRepository::new("/nonexistent/exams");
        assert!(exams.get_exam("x").await.unwrap().is_none());
        assert!(exams.get_finalized_answer_key("x", None).await.unwrap().is_none());

        let roster = TomlIdentityRepository::new("/nonexistent/roster.toml");
        assert!(roster.find_by_validated_id("12345678").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_toml_exam_repository_reads_folder() {
        let dir = std::env::temp_dir().join(format!("omr_exam_repo_{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(
            dir.join("bio.toml"),
            "finalized = true\n[exam]\nexam_id = \"bio\"\n[[answer_key]]\nquestion = 1\ncorrect_answer = \"D\"\n",
        )
        .await
        .unwrap();

        let repo = TomlExamRepository::new(&dir);
        assert_eq!(repo.get_exam("bio").await.unwrap().unwrap().exam_id, "bio");
        let key = repo.get_finalized_answer_key("bio", None).await.unwrap().unwrap();
        assert!(key.entry(1).unwrap().accepts('D'));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_toml_exam_repository_rejects_path_like_ids() {
        let dir = std::env::temp_dir().join(format!("omr_exam_escape_{}", std::process::id()));
        let nested = dir.join("exams");
        tokio::fs::create_dir_all(&nested).await.unwrap();
        tokio::fs::write(
            dir.join("secret.toml"),
            "finalized = true\n[exam]\nexam_id = \"secret\"\n",
        )
        .await
        .unwrap();

        let repo = TomlExamRepository::new(&nested);
        for exam_id in ["../secret", "a/b"] {
            let err = repo.get_exam(exam_id).await.unwrap_err();
            assert!(matches!(
                err.downcast_ref::<FileError>(),
                Some(FileError::InvalidName { .. })
            ));
            assert!(repo.get_finalized_answer_key(exam_id, None).await.is_err());
        }

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
