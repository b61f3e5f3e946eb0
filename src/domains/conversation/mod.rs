pub mod access;
pub mod broadcast;
pub mod context;
pub mod lifecycle;
pub mod participant_repository;
pub mod repository;
pub mod service;
pub mod types;

// Re-export main items for other domains to use
pub use access::{AccessDecision, AccessSubject};
pub use broadcast::{BroadcastSaga, BroadcastSettings};
pub use context::{ContextResolver, ResolvedContext};
pub use lifecycle::{BusinessStatusChange, ConversationEvent, ConversationEventSubscriber, LifecycleCoordinator};
pub use participant_repository::{ConversationParticipantRepository, SqliteConversationParticipantRepository};
pub use repository::{ConversationRepository, MessageRepository, SqliteConversationRepository, SqliteMessageRepository};
pub use service::{ConversationService, ConversationServiceImpl};
pub use types::{
    BroadcastOutcome, BroadcastTarget, Conversation, ConversationContextKind, ConversationFilter,
    ConversationStatus, ConversationSummary, ConversationView, Message,
};
