pub mod repository;

// Re-export main items for other domains to use
pub use repository::{SqliteUserDirectory, UserDirectory};
