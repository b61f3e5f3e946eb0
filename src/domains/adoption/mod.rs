pub mod repository;
pub mod types;

pub use repository::{AdoptionRequestRepository, AdoptionStatusWriter, SqliteAdoptionRequestRepository};
pub use types::{AdoptionRequest, AdoptionRequestStatus};
