use crate::auth::AuthContext;
use crate::domains::adoption::{AdoptionRequestRepository, AdoptionRequestStatus, AdoptionStatusWriter};
use crate::domains::application::ApplicationRepository;
use crate::domains::conversation::access::{self, AccessDecision, AccessSubject};
use crate::domains::conversation::broadcast::{BroadcastRequest, BroadcastSaga, BroadcastSettings};
use crate::domains::conversation::context::{ContextResolver, ResolvedContext};
use crate::domains::conversation::lifecycle::{
    BusinessStatusChange, ConversationEvent, ConversationEventSubscriber, LifecycleCoordinator,
};
use crate::domains::conversation::participant_repository::ConversationParticipantRepository;
use crate::domains::conversation::repository::{ConversationRepository, MessageRepository, OpeningMessage};
use crate::domains::conversation::types::{
    BroadcastOutcome, Conversation, ConversationFilter, ConversationSummary, ConversationView, Message,
    NewMessage,
};
use crate::domains::core::repository::FindById;
use crate::domains::permission::Permission;
use crate::domains::user::UserDirectory;
use crate::errors::{DomainError, ServiceError, ServiceResult, ValidationError};
use crate::types::{PaginatedResult, PaginationParams, UserRole};
use crate::validation::Validate;
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, warn};
use std::sync::Arc;
use uuid::Uuid;

/// Trait defining the messaging operations exposed to the HTTP layer
#[async_trait]
pub trait ConversationService: Send + Sync {
    /// Messages and metadata of a conversation the caller may read
    async fn get_conversation_for_user(
        &self,
        conversation_id: Uuid,
        auth: &AuthContext,
    ) -> ServiceResult<ConversationView>;

    async fn list_conversations_for_user(
        &self,
        params: PaginationParams,
        auth: &AuthContext,
    ) -> ServiceResult<PaginatedResult<ConversationSummary>>;

    /// Administrator listing
    async fn list_conversations(
        &self,
        filter: ConversationFilter,
        params: PaginationParams,
        auth: &AuthContext,
    ) -> ServiceResult<PaginatedResult<Conversation>>;

    /// Message gateway
    async fn post_message(
        &self,
        conversation_id: Uuid,
        content: String,
        auth: &AuthContext,
    ) -> ServiceResult<Message>;

    async fn create_broadcast(
        &self,
        content: String,
        target_role: Option<UserRole>,
        auth: &AuthContext,
    ) -> ServiceResult<BroadcastOutcome>;

    /// Called by the adoption service when a company sends a request
    async fn start_adoption_conversation(
        &self,
        adoption_request_id: Uuid,
        student_id: Uuid,
        initial_message: String,
        auth: &AuthContext,
    ) -> ServiceResult<Conversation>;

    /// Hook the business services call after persisting a status change
    async fn on_business_status_changed(
        &self,
        change: BusinessStatusChange,
    ) -> ServiceResult<Option<Conversation>>;

    async fn archive_conversation(
        &self,
        conversation_id: Uuid,
        auth: &AuthContext,
    ) -> ServiceResult<Conversation>;
}

/// Implementation of the conversation service
pub struct ConversationServiceImpl {
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
    participants: Arc<dyn ConversationParticipantRepository>,
    adoption_requests: Arc<dyn AdoptionRequestRepository>,
    context_resolver: ContextResolver,
    lifecycle: Arc<LifecycleCoordinator>,
    broadcast: BroadcastSaga,
    subscribers: Vec<Arc<dyn ConversationEventSubscriber>>,
}

impl ConversationServiceImpl {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        messages: Arc<dyn MessageRepository>,
        participants: Arc<dyn ConversationParticipantRepository>,
        users: Arc<dyn UserDirectory>,
        adoption_requests: Arc<dyn AdoptionRequestRepository>,
        adoption_status: Arc<dyn AdoptionStatusWriter>,
        applications: Arc<dyn ApplicationRepository>,
        broadcast_settings: BroadcastSettings,
    ) -> Self {
        let lifecycle = Arc::new(LifecycleCoordinator::new(
            conversations.clone(),
            adoption_status,
            applications.clone(),
        ));
        let context_resolver = ContextResolver::new(adoption_requests.clone(), applications);
        let broadcast = BroadcastSaga::new(
            users,
            conversations.clone(),
            participants.clone(),
            broadcast_settings,
        );
        let subscribers: Vec<Arc<dyn ConversationEventSubscriber>> = vec![lifecycle.clone()];

        Self {
            conversations,
            messages,
            participants,
            adoption_requests,
            context_resolver,
            lifecycle,
            broadcast,
            subscribers,
        }
    }

    /// Register an extra listener for conversation events
    pub fn with_subscriber(mut self, subscriber: Arc<dyn ConversationEventSubscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    async fn load_conversation(&self, id: Uuid) -> ServiceResult<Conversation> {
        self.conversations.find_by_id(id).await.map_err(ServiceError::from_domain)
    }

    async fn evaluate_access(
        &self,
        conversation: &Conversation,
        auth: &AuthContext,
    ) -> ServiceResult<(ResolvedContext, AccessDecision)> {
        let is_participant = self
            .participants
            .is_participant(conversation.id, auth.user_id)
            .await
            .map_err(ServiceError::from_domain)?;
        let context = self
            .context_resolver
            .resolve(conversation)
            .await
            .map_err(ServiceError::from_domain)?;

        let subject = AccessSubject { user_id: auth.user_id, role: auth.role, is_participant };
        let decision = access::evaluate(&subject, conversation, &context, Utc::now());
        Ok((context, decision))
    }

    /// Deliver an event to every subscriber. The message is already
    /// committed, so failures are reported, never rolled back.
    async fn publish(&self, event: ConversationEvent) {
        for subscriber in &self.subscribers {
            if let Err(e) = subscriber.handle(&event).await {
                warn!("Reconcilable: event {:?} left unapplied: {}", event, e);
            }
        }
    }

    fn event_for(
        conversation: &Conversation,
        context: &ResolvedContext,
        message: &Message,
        role: UserRole,
    ) -> Option<ConversationEvent> {
        if conversation.is_broadcast || role != UserRole::Student {
            return None;
        }
        match context {
            ResolvedContext::AdoptionRequest(request) if request.status == AdoptionRequestStatus::Pending => {
                Some(ConversationEvent::StudentRespondedToPendingAdoption {
                    conversation_id: conversation.id,
                    adoption_request_id: request.id,
                    student_id: message.sender_id,
                    message_id: message.id,
                })
            }
            _ => None,
        }
    }
}

#[async_trait]
impl ConversationService for ConversationServiceImpl {
    async fn get_conversation_for_user(
        &self,
        conversation_id: Uuid,
        auth: &AuthContext,
    ) -> ServiceResult<ConversationView> {
        auth.authorize(Permission::ViewConversations)?;

        let conversation = self.load_conversation(conversation_id).await?;
        let (_, decision) = self.evaluate_access(&conversation, auth).await?;
        if let Err(reason) = decision.read_result() {
            debug!("Read of conversation {} by {} denied: {}", conversation_id, auth.user_id, reason.as_str());
            return Err(ServiceError::AccessDenied(reason));
        }

        let messages = self
            .messages
            .find_by_conversation(conversation_id)
            .await
            .map_err(ServiceError::from_domain)?;
        let participants = self
            .participants
            .list_participants(conversation_id)
            .await
            .map_err(ServiceError::from_domain)?
            .into_iter()
            .map(|p| p.user_id)
            .collect();

        Ok(ConversationView {
            conversation,
            messages,
            participants,
            can_write: decision.can_write,
            denial_reason: decision.denial,
        })
    }

    async fn list_conversations_for_user(
        &self,
        params: PaginationParams,
        auth: &AuthContext,
    ) -> ServiceResult<PaginatedResult<ConversationSummary>> {
        auth.authorize(Permission::ViewConversations)?;

        let page = self
            .conversations
            .find_for_user(auth.user_id, auth.role, params)
            .await
            .map_err(ServiceError::from_domain)?;

        let mut items = Vec::with_capacity(page.items.len());
        for conversation in page.items {
            let last_message = self
                .messages
                .find_last(conversation.id)
                .await
                .map_err(ServiceError::from_domain)?;
            items.push(ConversationSummary { conversation, last_message });
        }

        Ok(PaginatedResult::new(items, page.total, params))
    }

    async fn list_conversations(
        &self,
        filter: ConversationFilter,
        params: PaginationParams,
        auth: &AuthContext,
    ) -> ServiceResult<PaginatedResult<Conversation>> {
        auth.authorize(Permission::ManageConversations)?;
        self.conversations
            .find_by_filter(&filter, params)
            .await
            .map_err(ServiceError::from_domain)
    }

    async fn post_message(
        &self,
        conversation_id: Uuid,
        content: String,
        auth: &AuthContext,
    ) -> ServiceResult<Message> {
        auth.authorize(Permission::SendMessages)?;

        let new_message = NewMessage { conversation_id, sender_id: auth.user_id, content };
        new_message.validate()?;

        let conversation = self.load_conversation(conversation_id).await?;
        let (context, decision) = self.evaluate_access(&conversation, auth).await?;

        if decision.expire_now {
            if let Err(e) = self.lifecycle.expire(&conversation).await {
                error!("Failed to persist expiry of conversation {}: {}", conversation_id, e);
                return Err(ServiceError::from_domain(e));
            }
            debug!("Conversation {} expired on write by {}", conversation_id, auth.user_id);
        }
        if let Err(reason) = decision.write_result() {
            debug!("Write to conversation {} by {} denied: {}", conversation_id, auth.user_id, reason.as_str());
            return Err(ServiceError::AccessDenied(reason));
        }

        let message = self
            .messages
            .create(&new_message)
            .await
            .map_err(ServiceError::from_domain)?;

        if let Some(event) = Self::event_for(&conversation, &context, &message, auth.role) {
            self.publish(event).await;
        }

        Ok(message)
    }

    async fn create_broadcast(
        &self,
        content: String,
        target_role: Option<UserRole>,
        auth: &AuthContext,
    ) -> ServiceResult<BroadcastOutcome> {
        auth.authorize(Permission::CreateBroadcasts)?;
        self.broadcast
            .execute(&BroadcastRequest { admin_id: auth.user_id, content, target_role })
            .await
    }

    async fn start_adoption_conversation(
        &self,
        adoption_request_id: Uuid,
        student_id: Uuid,
        initial_message: String,
        auth: &AuthContext,
    ) -> ServiceResult<Conversation> {
        auth.authorize_role(UserRole::Company)?;

        let request = self
            .adoption_requests
            .find_by_id(adoption_request_id)
            .await
            .map_err(ServiceError::from_domain)?
            .ok_or_else(|| {
                ServiceError::Domain(DomainError::EntityNotFound("AdoptionRequest".to_string(), adoption_request_id))
            })?;

        if request.company_id != auth.user_id {
            return Err(ServiceError::PermissionDenied(
                "Only the requesting company can open this conversation".to_string(),
            ));
        }
        if request.student_id != student_id {
            return Err(ServiceError::Domain(DomainError::Validation(ValidationError::invalid_value(
                "student_id",
                "does not match the adoption request",
            ))));
        }

        let opening = OpeningMessage { sender_id: auth.user_id, content: initial_message };
        NewMessage {
            conversation_id: Uuid::nil(),
            sender_id: opening.sender_id,
            content: opening.content.clone(),
        }
        .validate()?;

        let (conversation, _) = self
            .lifecycle
            .open_adoption_conversation(&request, &opening)
            .await
            .map_err(ServiceError::from_domain)?;
        Ok(conversation)
    }

    async fn on_business_status_changed(
        &self,
        change: BusinessStatusChange,
    ) -> ServiceResult<Option<Conversation>> {
        self.lifecycle.on_business_status_changed(change).await.map_err(|e| {
            if e.is_connectivity() {
                error!("Store unreachable while applying {:?}: {}", change, e);
            }
            ServiceError::from_domain(e)
        })
    }

    async fn archive_conversation(
        &self,
        conversation_id: Uuid,
        auth: &AuthContext,
    ) -> ServiceResult<Conversation> {
        auth.authorize(Permission::ManageConversations)?;
        let conversation = self.load_conversation(conversation_id).await?;
        self.lifecycle.archive(&conversation).await.map_err(ServiceError::from_domain)
    }
}
