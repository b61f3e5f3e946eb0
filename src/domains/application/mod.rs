pub mod repository;
pub mod types;

pub use repository::{ApplicationRepository, SqliteApplicationRepository};
pub use types::{Application, ApplicationStatus};
