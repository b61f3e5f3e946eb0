use crate::errors::{DomainError, DomainResult};
use crate::types::{parse_db_timestamp, parse_db_uuid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Status of a student's application to an offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplicationStatus {
    New,
    Seen,
    Interview,
    Rejected,
    Hired,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::New => "NEW",
            ApplicationStatus::Seen => "SEEN",
            ApplicationStatus::Interview => "INTERVIEW",
            ApplicationStatus::Rejected => "REJECTED",
            ApplicationStatus::Hired => "HIRED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "NEW" => Some(ApplicationStatus::New),
            "SEEN" => Some(ApplicationStatus::Seen),
            "INTERVIEW" => Some(ApplicationStatus::Interview),
            "REJECTED" => Some(ApplicationStatus::Rejected),
            "HIRED" => Some(ApplicationStatus::Hired),
            _ => None,
        }
    }

    /// Statuses at which the student and the company start talking
    pub fn opens_conversation(&self) -> bool {
        matches!(self, ApplicationStatus::Interview | ApplicationStatus::Hired)
    }
}

/// Application as read by the messaging core. Owned by the application service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub offer_id: Uuid,
    pub offer_title: String,
    pub student_id: Uuid,
    pub company_id: Uuid,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// ApplicationRow - SQLite row representation
#[derive(Debug, Clone, FromRow)]
pub struct ApplicationRow {
    pub id: String,
    pub offer_id: String,
    pub offer_title: String,
    pub student_id: String,
    pub company_id: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ApplicationRow {
    pub fn into_entity(self) -> DomainResult<Application> {
        let status = ApplicationStatus::from_str(&self.status).ok_or_else(|| {
            DomainError::Internal(format!("Unknown application status '{}' in DB", self.status))
        })?;

        Ok(Application {
            id: parse_db_uuid(&self.id, "Application.id")?,
            offer_id: parse_db_uuid(&self.offer_id, "Application.offer_id")?,
            offer_title: self.offer_title,
            student_id: parse_db_uuid(&self.student_id, "Application.student_id")?,
            company_id: parse_db_uuid(&self.company_id, "Application.company_id")?,
            status,
            created_at: parse_db_timestamp(&self.created_at, "Application.created_at")?,
            updated_at: parse_db_timestamp(&self.updated_at, "Application.updated_at")?,
        })
    }
}
