use crate::errors::{DomainError, DomainResult};
use crate::types::{parse_db_timestamp, parse_db_uuid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Status of a company's direct request to a student
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdoptionRequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl AdoptionRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdoptionRequestStatus::Pending => "PENDING",
            AdoptionRequestStatus::Accepted => "ACCEPTED",
            AdoptionRequestStatus::Rejected => "REJECTED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(AdoptionRequestStatus::Pending),
            "ACCEPTED" => Some(AdoptionRequestStatus::Accepted),
            "REJECTED" => Some(AdoptionRequestStatus::Rejected),
            _ => None,
        }
    }
}

/// Adoption request as read by the messaging core. Owned by the adoption service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdoptionRequest {
    pub id: Uuid,
    pub company_id: Uuid,
    pub student_id: Uuid,
    pub status: AdoptionRequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// AdoptionRequestRow - SQLite row representation
#[derive(Debug, Clone, FromRow)]
pub struct AdoptionRequestRow {
    pub id: String,
    pub company_id: String,
    pub student_id: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl AdoptionRequestRow {
    pub fn into_entity(self) -> DomainResult<AdoptionRequest> {
        let status = AdoptionRequestStatus::from_str(&self.status).ok_or_else(|| {
            DomainError::Internal(format!("Unknown adoption request status '{}' in DB", self.status))
        })?;

        Ok(AdoptionRequest {
            id: parse_db_uuid(&self.id, "AdoptionRequest.id")?,
            company_id: parse_db_uuid(&self.company_id, "AdoptionRequest.company_id")?,
            student_id: parse_db_uuid(&self.student_id, "AdoptionRequest.student_id")?,
            status,
            created_at: parse_db_timestamp(&self.created_at, "AdoptionRequest.created_at")?,
            updated_at: parse_db_timestamp(&self.updated_at, "AdoptionRequest.updated_at")?,
        })
    }
}
