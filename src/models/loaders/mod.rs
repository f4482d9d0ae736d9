pub mod page_loader;
pub mod toml_loader;

pub use page_loader::load_page_folder;
pub use toml_loader::{load_exam_file, load_roster_file, ExamFile, RosterFile};
