//! Fixed schema domains merged next to the compiled classes

pub mod files;
pub mod project;

pub use files::FilesFields;
pub use project::{Project, ProjectClasses, ProjectFields};
