use crate::domains::adoption::{AdoptionRequest, AdoptionRequestStatus, AdoptionStatusWriter};
use crate::domains::application::{Application, ApplicationRepository, ApplicationStatus};
use crate::domains::conversation::repository::{ConversationRepository, OpeningMessage};
use crate::domains::conversation::types::{
    Conversation, ConversationContextKind, ConversationStatus, Message, NewConversation,
};
use crate::domains::core::repository::FindById;
use crate::errors::{DbError, DomainError, DomainResult};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub const ADOPTION_TOPIC: &str = "Adoption request";

/// Events raised by the message gateway after a message is committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationEvent {
    StudentRespondedToPendingAdoption {
        conversation_id: Uuid,
        adoption_request_id: Uuid,
        student_id: Uuid,
        message_id: Uuid,
    },
}

#[async_trait]
pub trait ConversationEventSubscriber: Send + Sync {
    async fn handle(&self, event: &ConversationEvent) -> DomainResult<()>;
}

/// Status change an outside service has already persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusinessStatusChange {
    AdoptionRequest { id: Uuid, status: AdoptionRequestStatus },
    Application { id: Uuid, status: ApplicationStatus },
}

/// Owns every status transition of a conversation
#[derive(Clone)]
pub struct LifecycleCoordinator {
    conversations: Arc<dyn ConversationRepository>,
    adoption_status: Arc<dyn AdoptionStatusWriter>,
    applications: Arc<dyn ApplicationRepository>,
}

impl LifecycleCoordinator {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        adoption_status: Arc<dyn AdoptionStatusWriter>,
        applications: Arc<dyn ApplicationRepository>,
    ) -> Self {
        Self { conversations, adoption_status, applications }
    }

    async fn transition(
        &self,
        conversation: &Conversation,
        status: ConversationStatus,
        is_read_only: bool,
    ) -> DomainResult<Conversation> {
        if conversation.status == status && conversation.is_read_only == is_read_only {
            return Ok(conversation.clone());
        }
        if conversation.status != status && !conversation.status.can_transition_to(status) {
            return Err(DomainError::InvalidTransition {
                entity_type: "Conversation".to_string(),
                id: conversation.id,
                from: conversation.status.as_str().to_string(),
                to: status.as_str().to_string(),
            });
        }

        let updated = self
            .conversations
            .update_status(conversation.id, conversation.version, status, is_read_only)
            .await?;
        debug!(
            "Conversation {} moved {} -> {} (read_only={})",
            conversation.id,
            conversation.status.as_str(),
            status.as_str(),
            is_read_only
        );
        Ok(updated)
    }

    /// Persist an expiry observed at write time. Losing the race to another
    /// terminal transition counts as done.
    pub async fn expire(&self, conversation: &Conversation) -> DomainResult<Conversation> {
        if conversation.status.is_terminal() {
            return Ok(conversation.clone());
        }
        match self.transition(conversation, ConversationStatus::Expired, conversation.is_read_only).await {
            Err(DomainError::ConcurrentModification { .. }) => {
                let current = self.conversations.find_by_id(conversation.id).await?;
                if current.status.is_terminal() {
                    Ok(current)
                } else {
                    self.transition(&current, ConversationStatus::Expired, current.is_read_only).await
                }
            }
            other => other,
        }
    }

    pub async fn archive(&self, conversation: &Conversation) -> DomainResult<Conversation> {
        let archived = self.transition(conversation, ConversationStatus::Archived, true).await?;
        info!("Conversation {} archived", conversation.id);
        Ok(archived)
    }

    /// React to a business status the owning service already persisted
    pub async fn on_business_status_changed(
        &self,
        change: BusinessStatusChange,
    ) -> DomainResult<Option<Conversation>> {
        match change {
            BusinessStatusChange::AdoptionRequest { id, status } => self.apply_adoption_status(id, status).await,
            BusinessStatusChange::Application { id, status } => self.apply_application_status(id, status).await,
        }
    }

    async fn apply_adoption_status(
        &self,
        adoption_request_id: Uuid,
        status: AdoptionRequestStatus,
    ) -> DomainResult<Option<Conversation>> {
        let conversation = match self
            .conversations
            .find_by_context(ConversationContextKind::AdoptionRequest, adoption_request_id)
            .await?
        {
            Some(conversation) => conversation,
            None => {
                debug!("No conversation for adoption request {}", adoption_request_id);
                return Ok(None);
            }
        };

        if conversation.status.is_terminal() {
            debug!(
                "Ignoring adoption status {} for ended conversation {}",
                status.as_str(),
                conversation.id
            );
            return Ok(Some(conversation));
        }

        let (target, read_only) = match status {
            AdoptionRequestStatus::Rejected => (ConversationStatus::Archived, true),
            AdoptionRequestStatus::Accepted => (ConversationStatus::Active, false),
            AdoptionRequestStatus::Pending => return Ok(Some(conversation)),
        };
        self.transition(&conversation, target, read_only).await.map(Some)
    }

    async fn apply_application_status(
        &self,
        application_id: Uuid,
        status: ApplicationStatus,
    ) -> DomainResult<Option<Conversation>> {
        if !status.opens_conversation() {
            // Rejection and the early statuses gate writes through the context rule
            return self
                .conversations
                .find_by_context(ConversationContextKind::Offer, application_id)
                .await;
        }

        let application = self
            .applications
            .find_by_id(application_id)
            .await?
            .ok_or_else(|| DomainError::EntityNotFound("Application".to_string(), application_id))?;
        self.ensure_offer_conversation(&application).await.map(Some)
    }

    /// Check-then-create. A duplicate insert losing the race means the
    /// conversation already exists.
    pub async fn ensure_offer_conversation(&self, application: &Application) -> DomainResult<Conversation> {
        if let Some(existing) = self
            .conversations
            .find_by_context(ConversationContextKind::Offer, application.id)
            .await?
        {
            return Ok(existing);
        }

        let new_conversation = NewConversation::offer(application.offer_title.clone(), application.id);
        match self
            .conversations
            .create(&new_conversation, &[application.student_id, application.company_id], None)
            .await
        {
            Ok((conversation, _)) => {
                info!("Opened offer conversation {} for application {}", conversation.id, application.id);
                Ok(conversation)
            }
            Err(DomainError::Database(DbError::Conflict(_))) => self
                .conversations
                .find_by_context(ConversationContextKind::Offer, application.id)
                .await?
                .ok_or_else(|| DomainError::EntityNotFound("Conversation".to_string(), application.id)),
            Err(e) => Err(e),
        }
    }

    /// Create the PENDING_APPROVAL conversation of an adoption request with
    /// the company's first message. An existing conversation is returned as is.
    pub async fn open_adoption_conversation(
        &self,
        request: &AdoptionRequest,
        opening: &OpeningMessage,
    ) -> DomainResult<(Conversation, Option<Message>)> {
        let new_conversation =
            NewConversation::adoption_request(ADOPTION_TOPIC.to_string(), request.id, request.company_id);
        match self
            .conversations
            .create(&new_conversation, &[request.company_id, request.student_id], Some(opening))
            .await
        {
            Err(DomainError::Database(DbError::Conflict(_))) => {
                let existing = self
                    .conversations
                    .find_by_context(ConversationContextKind::AdoptionRequest, request.id)
                    .await?
                    .ok_or_else(|| DomainError::EntityNotFound("Conversation".to_string(), request.id))?;
                debug!("Adoption request {} already has conversation {}", request.id, existing.id);
                Ok((existing, None))
            }
            other => other,
        }
    }

    /// Auto-accept: swap the request PENDING -> ACCEPTED, then open the
    /// conversation. A lost swap means another transition already happened.
    async fn accept_on_student_reply(&self, conversation_id: Uuid, adoption_request_id: Uuid) -> DomainResult<()> {
        let swapped = self
            .adoption_status
            .set_adoption_request_status(
                adoption_request_id,
                AdoptionRequestStatus::Pending,
                AdoptionRequestStatus::Accepted,
            )
            .await?;
        if !swapped {
            debug!("Adoption request {} no longer pending; auto-accept skipped", adoption_request_id);
            return Ok(());
        }

        let conversation = self.conversations.find_by_id(conversation_id).await?;
        if conversation.status.is_terminal() {
            warn!(
                "Adoption request {} accepted but conversation {} is already {}",
                adoption_request_id,
                conversation_id,
                conversation.status.as_str()
            );
            return Ok(());
        }

        match self.transition(&conversation, ConversationStatus::Active, false).await {
            Err(DomainError::ConcurrentModification { .. }) => {
                let current = self.conversations.find_by_id(conversation_id).await?;
                if current.status.is_terminal() {
                    return Ok(());
                }
                self.transition(&current, ConversationStatus::Active, false).await?;
            }
            other => {
                other?;
            }
        }
        info!(
            "Adoption request {} auto-accepted by student reply in conversation {}",
            adoption_request_id, conversation_id
        );
        Ok(())
    }
}

#[async_trait]
impl ConversationEventSubscriber for LifecycleCoordinator {
    async fn handle(&self, event: &ConversationEvent) -> DomainResult<()> {
        match event {
            ConversationEvent::StudentRespondedToPendingAdoption {
                conversation_id,
                adoption_request_id,
                ..
            } => self.accept_on_student_reply(*conversation_id, *adoption_request_id).await,
        }
    }
}
