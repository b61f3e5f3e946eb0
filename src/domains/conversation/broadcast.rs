use crate::domains::conversation::participant_repository::ConversationParticipantRepository;
use crate::domains::conversation::repository::{ConversationRepository, OpeningMessage};
use crate::domains::conversation::types::{BroadcastOutcome, BroadcastTarget, NewConversation, NewMessage};
use crate::domains::user::UserDirectory;
use crate::errors::{DomainError, ServiceError, ServiceResult};
use crate::types::UserRole;
use crate::validation::Validate;
use log::{debug, error, info};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastSettings {
    pub batch_size: usize,
    /// Applied to each participant batch; an elapsed batch counts as failed
    pub batch_timeout: Duration,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BroadcastRequest {
    pub admin_id: Uuid,
    pub content: String,
    pub target_role: Option<UserRole>,
}

impl BroadcastRequest {
    pub fn target(&self) -> BroadcastTarget {
        BroadcastTarget::for_target_role(self.target_role)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SagaState {
    Started,
    CohortResolved,
    ConversationCreated,
    ParticipantsAdded,
    Compensated,
    Failed,
}

#[derive(Debug, Clone, Copy)]
enum Compensation {
    DeleteConversation(Uuid),
}

/// A participant batch that did not complete
#[derive(Debug)]
enum BatchFailure {
    Rejected { batch: usize, error: DomainError },
    TimedOut { batch: usize, after: Duration },
}

impl BatchFailure {
    fn is_connectivity(&self) -> bool {
        match self {
            BatchFailure::Rejected { error, .. } => error.is_connectivity(),
            BatchFailure::TimedOut { .. } => false,
        }
    }
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchFailure::Rejected { batch, error } => write!(f, "batch {}: {}", batch, error),
            BatchFailure::TimedOut { batch, after } => {
                write!(f, "batch {}: timed out after {}ms", batch, after.as_millis())
            }
        }
    }
}

/// One execution of the broadcast saga
struct SagaRun {
    saga_id: Uuid,
    state: SagaState,
    compensations: Vec<Compensation>,
}

impl SagaRun {
    fn new() -> Self {
        Self {
            saga_id: Uuid::new_v4(),
            state: SagaState::Started,
            compensations: Vec::new(),
        }
    }

    fn advance(&mut self, state: SagaState) {
        debug!("Broadcast saga {}: {:?} -> {:?}", self.saga_id, self.state, state);
        self.state = state;
    }
}

/// Creates a broadcast conversation, then fans participants out in
/// sequential batches. Any failed batch deletes the conversation again.
#[derive(Clone)]
pub struct BroadcastSaga {
    users: Arc<dyn UserDirectory>,
    conversations: Arc<dyn ConversationRepository>,
    participants: Arc<dyn ConversationParticipantRepository>,
    settings: BroadcastSettings,
}

impl BroadcastSaga {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        conversations: Arc<dyn ConversationRepository>,
        participants: Arc<dyn ConversationParticipantRepository>,
        settings: BroadcastSettings,
    ) -> Self {
        Self { users, conversations, participants, settings }
    }

    pub async fn execute(&self, request: &BroadcastRequest) -> ServiceResult<BroadcastOutcome> {
        let mut run = SagaRun::new();
        let target = request.target();

        NewMessage {
            conversation_id: Uuid::nil(),
            sender_id: request.admin_id,
            content: request.content.clone(),
        }
        .validate()?;

        // Step 1: cohort
        let cohort = self.resolve_cohort(&mut run, request.admin_id, target).await?;

        // Step 2: conversation and opening message
        let conversation_id = self.create_conversation(&mut run, request, target).await?;

        // Step 3: participants, creator first
        let mut members = Vec::with_capacity(cohort.len() + 1);
        members.push(request.admin_id);
        members.extend(cohort.iter().copied());

        let failures = self.add_participants(conversation_id, &members).await;
        let total_batches = batch_count(members.len(), self.settings.batch_size);
        if !failures.is_empty() {
            let failed_batches = failures.len();
            let mut details: Vec<String> = failures.iter().map(ToString::to_string).collect();
            run.advance(SagaState::Failed);
            error!(
                "Broadcast {} failed: {} of {} participant batches failed: {}",
                conversation_id,
                failed_batches,
                total_batches,
                details.join("; ")
            );
            if let Err(e) = self.compensate(&mut run).await {
                details.push(format!("compensation: {}", e));
            }

            // A lost store outranks a partial fan-out
            if failures.iter().any(BatchFailure::is_connectivity) {
                return Err(ServiceError::Connectivity(details.join("; ")));
            }
            return Err(ServiceError::BroadcastFailed { failed_batches, total_batches, details });
        }

        run.advance(SagaState::ParticipantsAdded);
        info!(
            "Broadcast {} sent to {} recipients ({})",
            conversation_id,
            cohort.len(),
            target.as_str()
        );
        Ok(BroadcastOutcome { conversation_id, sent_to: cohort.len() })
    }

    async fn resolve_cohort(
        &self,
        run: &mut SagaRun,
        admin_id: Uuid,
        target: BroadcastTarget,
    ) -> ServiceResult<Vec<Uuid>> {
        let cohort: Vec<Uuid> = self
            .users
            .list_active_ids_by_role(target.cohort_role())
            .await
            .map_err(|e| self.step_failed(run, "resolve cohort", e))?
            .into_iter()
            .filter(|id| *id != admin_id)
            .collect();

        if cohort.is_empty() {
            info!("Broadcast to {} has no active recipients", target.as_str());
            run.advance(SagaState::Failed);
            return Err(ServiceError::NoRecipients);
        }

        run.advance(SagaState::CohortResolved);
        Ok(cohort)
    }

    async fn create_conversation(
        &self,
        run: &mut SagaRun,
        request: &BroadcastRequest,
        target: BroadcastTarget,
    ) -> ServiceResult<Uuid> {
        let new_conversation = NewConversation::broadcast(broadcast_topic(target), target, request.admin_id);
        new_conversation.validate()?;

        let opening = OpeningMessage {
            sender_id: request.admin_id,
            content: request.content.clone(),
        };
        let (conversation, _) = self
            .conversations
            .create(&new_conversation, &[], Some(&opening))
            .await
            .map_err(|e| self.step_failed(run, "create conversation", e))?;

        run.compensations.push(Compensation::DeleteConversation(conversation.id));
        run.advance(SagaState::ConversationCreated);
        Ok(conversation.id)
    }

    /// Runs every batch in order and returns the ones that failed
    async fn add_participants(&self, conversation_id: Uuid, members: &[Uuid]) -> Vec<BatchFailure> {
        let size = self.settings.batch_size.max(1);
        let mut failures = Vec::new();

        for (index, batch) in members.chunks(size).enumerate() {
            let attempt = tokio::time::timeout(
                self.settings.batch_timeout,
                self.participants.add_participants(conversation_id, batch),
            )
            .await;

            match attempt {
                Ok(Ok(inserted)) => {
                    debug!("Broadcast {} batch {}: {} rows", conversation_id, index + 1, inserted);
                }
                Ok(Err(error)) => {
                    failures.push(BatchFailure::Rejected { batch: index + 1, error });
                }
                Err(_elapsed) => {
                    failures.push(BatchFailure::TimedOut {
                        batch: index + 1,
                        after: self.settings.batch_timeout,
                    });
                }
            }
        }

        failures
    }

    /// Undo completed steps in reverse order
    async fn compensate(&self, run: &mut SagaRun) -> Result<(), DomainError> {
        let mut outcome = Ok(());
        while let Some(compensation) = run.compensations.pop() {
            match compensation {
                Compensation::DeleteConversation(conversation_id) => {
                    match self.conversations.hard_delete(conversation_id).await {
                        Ok(()) => {
                            info!("Broadcast {} rolled back", conversation_id);
                            run.advance(SagaState::Compensated);
                        }
                        Err(e) => {
                            error!("Failed to roll back broadcast {}: {}", conversation_id, e);
                            outcome = Err(e);
                        }
                    }
                }
            }
        }
        outcome
    }

    fn step_failed(&self, run: &mut SagaRun, step: &str, err: DomainError) -> ServiceError {
        if err.is_connectivity() {
            error!("Broadcast saga {} lost the store during '{}': {}", run.saga_id, step, err);
        } else {
            error!("Broadcast saga {} failed during '{}': {}", run.saga_id, step, err);
        }
        run.advance(SagaState::Failed);
        ServiceError::from_domain(err)
    }
}

fn batch_count(members: usize, batch_size: usize) -> usize {
    let size = batch_size.max(1);
    (members + size - 1) / size
}

pub fn broadcast_topic(target: BroadcastTarget) -> String {
    match target {
        BroadcastTarget::All => "Announcement".to_string(),
        BroadcastTarget::Students => "Announcement for students".to_string(),
        BroadcastTarget::Companies => "Announcement for companies".to_string(),
    }
}
