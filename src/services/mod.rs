pub mod answer_mapper;
pub mod check_digit;
pub mod collaborators;
pub mod id_recognizer;
pub mod mark_detector;
pub mod repository;
pub mod result_store;
pub mod review_writer;
pub mod scoring;

pub use answer_mapper::AnswerMapper;
pub use collaborators::Collaborators;
pub use id_recognizer::{DisabledIdRecognizer, IdRecognizer};
pub use mark_detector::{DensityMarkDetector, MarkDetector};
pub use repository::{
    ExamRepository, IdentityRepository, InMemoryExamRepository, InMemoryIdentityRepository,
    TomlExamRepository, TomlIdentityRepository,
};
pub use result_store::{JsonResultStore, MemoryResultStore, ResultStore};
pub use review_writer::ReviewWriter;
pub use scoring::{ScoreOutcome, ScoringEngine};
