use crate::errors::{DenialReason, DomainError, DomainResult, ValidationError};
use crate::types::{parse_db_timestamp, parse_db_uuid, UserRole};
use crate::validation::{Validate, ValidationBuilder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const MESSAGE_MAX_LENGTH: usize = 2000;
pub const TOPIC_MAX_LENGTH: usize = 255;

/// Lifecycle status of a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConversationStatus {
    PendingApproval,
    Active,
    Archived,
    Expired,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::PendingApproval => "PENDING_APPROVAL",
            ConversationStatus::Active => "ACTIVE",
            ConversationStatus::Archived => "ARCHIVED",
            ConversationStatus::Expired => "EXPIRED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING_APPROVAL" => Some(ConversationStatus::PendingApproval),
            "ACTIVE" => Some(ConversationStatus::Active),
            "ARCHIVED" => Some(ConversationStatus::Archived),
            "EXPIRED" => Some(ConversationStatus::Expired),
            _ => None,
        }
    }

    /// ARCHIVED and EXPIRED accept no further writes or transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConversationStatus::Archived | ConversationStatus::Expired)
    }

    pub fn can_transition_to(&self, next: ConversationStatus) -> bool {
        match (self, next) {
            (current, _) if current.is_terminal() => false,
            (ConversationStatus::PendingApproval, _) => true,
            (ConversationStatus::Active, ConversationStatus::PendingApproval) => false,
            (ConversationStatus::Active, _) => true,
            _ => false,
        }
    }

    /// Denial reported to a writer once this status is reached
    pub fn terminal_denial(&self) -> Option<DenialReason> {
        match self {
            ConversationStatus::Archived => Some(DenialReason::Archived),
            ConversationStatus::Expired => Some(DenialReason::Expired),
            _ => None,
        }
    }
}

/// Business reason a conversation exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConversationContextKind {
    None,
    AdoptionRequest,
    Offer,
    Broadcast,
}

impl ConversationContextKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationContextKind::None => "NONE",
            ConversationContextKind::AdoptionRequest => "ADOPTION_REQUEST",
            ConversationContextKind::Offer => "OFFER",
            ConversationContextKind::Broadcast => "BROADCAST",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "NONE" => Some(ConversationContextKind::None),
            "ADOPTION_REQUEST" => Some(ConversationContextKind::AdoptionRequest),
            "OFFER" => Some(ConversationContextKind::Offer),
            "BROADCAST" => Some(ConversationContextKind::Broadcast),
            _ => None,
        }
    }

    /// Kinds that point at a business object through `context_id`
    pub fn requires_link(&self) -> bool {
        matches!(self, ConversationContextKind::AdoptionRequest | ConversationContextKind::Offer)
    }
}

/// Audience of an administrator broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BroadcastTarget {
    All,
    Students,
    Companies,
}

impl BroadcastTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            BroadcastTarget::All => "ALL",
            BroadcastTarget::Students => "STUDENTS",
            BroadcastTarget::Companies => "COMPANIES",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ALL" => Some(BroadcastTarget::All),
            "STUDENTS" => Some(BroadcastTarget::Students),
            "COMPANIES" => Some(BroadcastTarget::Companies),
            _ => None,
        }
    }

    /// STUDENT targets students, COMPANY targets companies, anything else targets everyone
    pub fn for_target_role(role: Option<UserRole>) -> Self {
        match role {
            Some(UserRole::Student) => BroadcastTarget::Students,
            Some(UserRole::Company) => BroadcastTarget::Companies,
            _ => BroadcastTarget::All,
        }
    }

    /// Role filter used to resolve the cohort
    pub fn cohort_role(&self) -> Option<UserRole> {
        match self {
            BroadcastTarget::All => None,
            BroadcastTarget::Students => Some(UserRole::Student),
            BroadcastTarget::Companies => Some(UserRole::Company),
        }
    }

    pub fn matches(&self, role: UserRole) -> bool {
        match self {
            BroadcastTarget::All => true,
            BroadcastTarget::Students => role == UserRole::Student,
            BroadcastTarget::Companies => role == UserRole::Company,
        }
    }
}

/// Conversation entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub topic: String,
    pub context: ConversationContextKind,
    pub context_id: Option<Uuid>,
    pub status: ConversationStatus,
    pub is_read_only: bool,
    pub is_broadcast: bool,
    pub broadcast_target: Option<BroadcastTarget>,
    pub created_by: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires_at) if now > expires_at)
    }

    /// The broadcast creator is the administrator who opened it
    pub fn is_created_by(&self, user_id: Uuid) -> bool {
        self.created_by == Some(user_id)
    }
}

/// ConversationRow - SQLite row representation
#[derive(Debug, Clone, FromRow)]
pub struct ConversationRow {
    pub id: String,
    pub topic: String,
    pub context: String,
    pub context_id: Option<String>,
    pub status: String,
    pub is_read_only: i64,
    pub is_broadcast: i64,
    pub broadcast_target: Option<String>,
    pub created_by: Option<String>,
    pub expires_at: Option<String>,
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl ConversationRow {
    pub fn into_entity(self) -> DomainResult<Conversation> {
        let context = ConversationContextKind::from_str(&self.context).ok_or_else(|| {
            DomainError::Internal(format!("Unknown conversation context '{}' in DB", self.context))
        })?;
        let status = ConversationStatus::from_str(&self.status).ok_or_else(|| {
            DomainError::Internal(format!("Unknown conversation status '{}' in DB", self.status))
        })?;
        let broadcast_target = match self.broadcast_target.as_deref() {
            Some(target) => Some(BroadcastTarget::from_str(target).ok_or_else(|| {
                DomainError::Internal(format!("Unknown broadcast target '{}' in DB", target))
            })?),
            None => None,
        };

        Ok(Conversation {
            id: parse_db_uuid(&self.id, "Conversation.id")?,
            topic: self.topic,
            context,
            context_id: self.context_id.as_deref().map(|id| parse_db_uuid(id, "Conversation.context_id")).transpose()?,
            status,
            is_read_only: self.is_read_only != 0,
            is_broadcast: self.is_broadcast != 0,
            broadcast_target,
            created_by: self.created_by.as_deref().map(|id| parse_db_uuid(id, "Conversation.created_by")).transpose()?,
            expires_at: self.expires_at.as_deref().map(|dt| parse_db_timestamp(dt, "Conversation.expires_at")).transpose()?,
            version: self.version,
            created_at: parse_db_timestamp(&self.created_at, "Conversation.created_at")?,
            updated_at: parse_db_timestamp(&self.updated_at, "Conversation.updated_at")?,
        })
    }
}

/// NewConversation DTO - used when creating a new conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConversation {
    pub topic: String,
    pub context: ConversationContextKind,
    pub context_id: Option<Uuid>,
    pub status: ConversationStatus,
    pub is_read_only: bool,
    pub is_broadcast: bool,
    pub broadcast_target: Option<BroadcastTarget>,
    pub created_by: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewConversation {
    pub fn adoption_request(topic: String, adoption_request_id: Uuid, created_by: Uuid) -> Self {
        Self {
            topic,
            context: ConversationContextKind::AdoptionRequest,
            context_id: Some(adoption_request_id),
            status: ConversationStatus::PendingApproval,
            is_read_only: false,
            is_broadcast: false,
            broadcast_target: None,
            created_by: Some(created_by),
            expires_at: None,
        }
    }

    pub fn offer(topic: String, application_id: Uuid) -> Self {
        Self {
            topic,
            context: ConversationContextKind::Offer,
            context_id: Some(application_id),
            status: ConversationStatus::Active,
            is_read_only: false,
            is_broadcast: false,
            broadcast_target: None,
            created_by: None,
            expires_at: None,
        }
    }

    pub fn broadcast(topic: String, target: BroadcastTarget, admin_id: Uuid) -> Self {
        Self {
            topic,
            context: ConversationContextKind::Broadcast,
            context_id: None,
            status: ConversationStatus::Active,
            is_read_only: true,
            is_broadcast: true,
            broadcast_target: Some(target),
            created_by: Some(admin_id),
            expires_at: None,
        }
    }
}

impl Validate for NewConversation {
    fn validate(&self) -> DomainResult<()> {
        ValidationBuilder::new("topic", Some(self.topic.clone()))
            .not_blank()
            .max_length(TOPIC_MAX_LENGTH)
            .validate()?;

        if self.is_broadcast {
            if self.context != ConversationContextKind::Broadcast || self.broadcast_target.is_none() {
                return Err(DomainError::Validation(ValidationError::invalid_value(
                    "is_broadcast",
                    "a broadcast needs the BROADCAST context and a target",
                )));
            }
        } else if self.context == ConversationContextKind::Broadcast || self.broadcast_target.is_some() {
            return Err(DomainError::Validation(ValidationError::invalid_value(
                "context",
                "BROADCAST context and targets are reserved for broadcasts",
            )));
        }

        if self.context.requires_link() {
            ValidationBuilder::new("context_id", self.context_id).required().validate()?;
        } else if self.context_id.is_some() {
            return Err(DomainError::Validation(ValidationError::invalid_value(
                "context_id",
                "only adoption request and offer conversations link a business object",
            )));
        }

        Ok(())
    }
}

/// Filter for administrator listings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationFilter {
    pub status: Option<ConversationStatus>,
    pub context: Option<ConversationContextKind>,
    pub is_broadcast: Option<bool>,
}

/// Membership row of the conversation/user junction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationParticipant {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
}

/// Message entity. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// MessageRow - SQLite row representation
#[derive(Debug, Clone, FromRow)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: String,
}

impl MessageRow {
    pub fn into_entity(self) -> DomainResult<Message> {
        Ok(Message {
            id: parse_db_uuid(&self.id, "Message.id")?,
            conversation_id: parse_db_uuid(&self.conversation_id, "Message.conversation_id")?,
            sender_id: parse_db_uuid(&self.sender_id, "Message.sender_id")?,
            content: self.content,
            created_at: parse_db_timestamp(&self.created_at, "Message.created_at")?,
        })
    }
}

/// NewMessage DTO - used when posting into a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
}

impl Validate for NewMessage {
    fn validate(&self) -> DomainResult<()> {
        ValidationBuilder::new("sender_id", Some(self.sender_id))
            .not_nil()
            .validate()?;

        ValidationBuilder::new("content", Some(self.content.clone()))
            .not_blank()
            .min_length(1)
            .max_length(MESSAGE_MAX_LENGTH)
            .validate()
    }
}

/// What a reader gets back from `get_conversation_for_user`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationView {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
    pub participants: Vec<Uuid>,
    pub can_write: bool,
    pub denial_reason: Option<DenialReason>,
}

/// Row of a user's inbox
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation: Conversation,
    pub last_message: Option<Message>,
}

/// Result of a successful broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastOutcome {
    pub conversation_id: Uuid,
    pub sent_to: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses_do_not_transition() {
        for terminal in [ConversationStatus::Archived, ConversationStatus::Expired] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(ConversationStatus::Active));
            assert!(!terminal.can_transition_to(ConversationStatus::Archived));
        }
        assert!(ConversationStatus::PendingApproval.can_transition_to(ConversationStatus::Active));
        assert!(ConversationStatus::Active.can_transition_to(ConversationStatus::Expired));
        assert!(!ConversationStatus::Active.can_transition_to(ConversationStatus::PendingApproval));
    }

    #[test]
    fn test_broadcast_target_matching() {
        assert!(BroadcastTarget::All.matches(UserRole::Admin));
        assert!(BroadcastTarget::Students.matches(UserRole::Student));
        assert!(!BroadcastTarget::Students.matches(UserRole::Company));
        assert!(!BroadcastTarget::Companies.matches(UserRole::Admin));
        assert_eq!(BroadcastTarget::for_target_role(Some(UserRole::Admin)), BroadcastTarget::All);
        assert_eq!(BroadcastTarget::for_target_role(None), BroadcastTarget::All);
        assert_eq!(BroadcastTarget::Companies.cohort_role(), Some(UserRole::Company));
    }

    #[test]
    fn test_new_conversation_invariants() {
        let admin = Uuid::new_v4();
        assert!(NewConversation::broadcast("News".into(), BroadcastTarget::All, admin).validate().is_ok());
        assert!(NewConversation::offer("Offer".into(), Uuid::new_v4()).validate().is_ok());

        let mut broken = NewConversation::broadcast("News".into(), BroadcastTarget::All, admin);
        broken.broadcast_target = None;
        assert!(broken.validate().is_err());

        let mut unlinked = NewConversation::offer("Offer".into(), Uuid::new_v4());
        unlinked.context_id = None;
        assert!(unlinked.validate().is_err());
        unlinked.context_id = Some(Uuid::nil());
        assert!(unlinked.validate().is_err());

        let mut fake_broadcast = NewConversation::offer("Offer".into(), Uuid::new_v4());
        fake_broadcast.broadcast_target = Some(BroadcastTarget::Students);
        assert!(fake_broadcast.validate().is_err());
    }

    #[test]
    fn test_message_content_bounds() {
        let message = |content: &str| NewMessage {
            conversation_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            content: content.to_string(),
        };
        assert!(message("Yes").validate().is_ok());
        assert!(message("").validate().is_err());
        assert!(message(" \n ").validate().is_err());
        assert!(message(&"x".repeat(MESSAGE_MAX_LENGTH)).validate().is_ok());
        assert!(message(&"x".repeat(MESSAGE_MAX_LENGTH + 1)).validate().is_err());
    }
}
