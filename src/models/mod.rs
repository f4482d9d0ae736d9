pub mod answer;
pub mod detection;
pub mod exam;
pub mod layout;
pub mod loaders;
pub mod result;
pub mod sheet;

pub use answer::{Answer, MarkedAlternative};
pub use detection::{BBox, Detection, DetectionOutput, IdRecognition, RawDetection};
pub use exam::{AnswerKey, ExamDefinition, GradingScale, Identity, KeyEntry, QuestionKind, QuestionSpec};
pub use layout::{RelRect, SheetLayout, TableLayout};
pub use loaders::{load_exam_file, load_page_folder, load_roster_file, ExamFile, RosterFile};
pub use result::{
    BatchReport, CorrectionResult, PipelineStage, Progress, ProgressStage, ReviewReason, Thumbnail,
};
pub use sheet::{
    AlignmentMarkers, AlternativeCell, GridRow, Marker, Page, PageInput, RowMarker, SheetGrid, Side,
};
