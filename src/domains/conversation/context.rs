use crate::domains::adoption::{AdoptionRequest, AdoptionRequestRepository};
use crate::domains::application::{Application, ApplicationRepository};
use crate::domains::conversation::types::{BroadcastTarget, Conversation, ConversationContextKind};
use crate::errors::DomainResult;
use log::debug;
use std::sync::Arc;

/// The business context of a conversation together with the linked object's
/// current state. Each variant carries its own status type.
#[derive(Debug, Clone)]
pub enum ResolvedContext {
    None,
    AdoptionRequest(AdoptionRequest),
    Offer(Application),
    Broadcast(BroadcastTarget),
}

/// Loads the business object a conversation points at
#[derive(Clone)]
pub struct ContextResolver {
    adoption_requests: Arc<dyn AdoptionRequestRepository>,
    applications: Arc<dyn ApplicationRepository>,
}

impl ContextResolver {
    pub fn new(
        adoption_requests: Arc<dyn AdoptionRequestRepository>,
        applications: Arc<dyn ApplicationRepository>,
    ) -> Self {
        Self { adoption_requests, applications }
    }

    /// A link whose object was hard-deleted resolves to `None`
    pub async fn resolve(&self, conversation: &Conversation) -> DomainResult<ResolvedContext> {
        let linked_id = match (conversation.context, conversation.context_id) {
            (ConversationContextKind::Broadcast, _) => {
                return Ok(conversation
                    .broadcast_target
                    .map(ResolvedContext::Broadcast)
                    .unwrap_or(ResolvedContext::None));
            }
            (ConversationContextKind::None, _) | (_, None) => return Ok(ResolvedContext::None),
            (_, Some(id)) => id,
        };

        let resolved = match conversation.context {
            ConversationContextKind::AdoptionRequest => self
                .adoption_requests
                .find_by_id(linked_id)
                .await?
                .map(ResolvedContext::AdoptionRequest),
            ConversationContextKind::Offer => self
                .applications
                .find_by_id(linked_id)
                .await?
                .map(ResolvedContext::Offer),
            _ => None,
        };

        Ok(resolved.unwrap_or_else(|| {
            debug!(
                "Conversation {} links missing {} {}; treating as no context",
                conversation.id,
                conversation.context.as_str(),
                linked_id
            );
            ResolvedContext::None
        }))
    }
}
