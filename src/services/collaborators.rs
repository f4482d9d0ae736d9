//! 协作组件集合
//!
//! 按配置选择各个能力的实现；测试通过 `with_*` 替换为假实现

use std::sync::Arc;

use crate::config::{Config, DetectorBackend, IdBackend};
use crate::services::id_recognizer::{DisabledIdRecognizer, IdRecognizer};
use crate::services::mark_detector::{DensityMarkDetector, MarkDetector};
use crate::services::repository::{
    ExamRepository, IdentityRepository, InMemoryExamRepository, TomlExamRepository,
    TomlIdentityRepository,
};
use crate::services::result_store::{JsonResultStore, MemoryResultStore, ResultStore};
use crate::services::review_writer::ReviewWriter;
use crate::vision::aligner::{AlignmentBackend, ContourAlignmentBackend};

#[derive(Clone)]
pub struct Collaborators {
    pub alignment: Arc<dyn AlignmentBackend>,
    /// 为 None 时批次无法开始
    pub detector: Option<Arc<dyn MarkDetector>>,
    pub recognizer: Arc<dyn IdRecognizer>,
    pub exams: Arc<dyn ExamRepository>,
    pub identities: Option<Arc<dyn IdentityRepository>>,
    pub store: Arc<dyn ResultStore>,
    pub review_writer: Option<Arc<ReviewWriter>>,
}

impl Collaborators {
    /// 生产环境：TOML 仓库 + JSON 结果 + 复核清单
    pub fn from_config(config: &Config) -> Self {
        let detector: Option<Arc<dyn MarkDetector>> = match config.detector_backend {
            DetectorBackend::Density => {
                Some(Arc::new(DensityMarkDetector::new(config.layout.bubble_size)))
            }
            DetectorBackend::Disabled => None,
        };
        let recognizer: Arc<dyn IdRecognizer> = match config.id_backend {
            IdBackend::Disabled => Arc::new(DisabledIdRecognizer),
        };

        Self {
            alignment: Arc::new(ContourAlignmentBackend::default()),
            detector,
            recognizer,
            exams: Arc::new(TomlExamRepository::new(&config.exam_folder)),
            identities: Some(Arc::new(TomlIdentityRepository::new(config.roster_file()))),
            store: Arc::new(JsonResultStore::new(&config.output_folder)),
            review_writer: Some(Arc::new(ReviewWriter::with_path(&config.review_file))),
        }
    }

    /// 全内存实现：不读写任何文件
    pub fn in_memory(detector: Arc<dyn MarkDetector>, exams: InMemoryExamRepository) -> Self {
        Self {
            alignment: Arc::new(ContourAlignmentBackend::default()),
            detector: Some(detector),
            recognizer: Arc::new(DisabledIdRecognizer),
            exams: Arc::new(exams),
            identities: None,
            store: Arc::new(MemoryResultStore::new()),
            review_writer: None,
        }
    }

    pub fn with_alignment(mut self, alignment: Arc<dyn AlignmentBackend>) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn IdRecognizer>) -> Self {
        self.recognizer = recognizer;
        self
    }

    pub fn with_identities(mut self, identities: Arc<dyn IdentityRepository>) -> Self {
        self.identities = Some(identities);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.store = store;
        self
    }

    pub fn without_detector(mut self) -> Self {
        self.detector = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_backend_has_no_detector() {
        let config = Config {
            detector_backend: DetectorBackend::Disabled,
            ..Config::default()
        };
        assert!(Collaborators::from_config(&config).detector.is_none());
        assert!(Collaborators::from_config(&Config::default()).detector.is_some());
    }
}
