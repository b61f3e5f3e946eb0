//! Read and write gating for conversations.
//!
//! `evaluate` is a pure function over the caller, the conversation and its
//! resolved context. It never touches the store: when it finds a conversation
//! past its expiry it reports `expire_now` and leaves persisting the
//! transition to the lifecycle coordinator.

use crate::domains::adoption::AdoptionRequestStatus;
use crate::domains::application::ApplicationStatus;
use crate::domains::conversation::context::ResolvedContext;
use crate::domains::conversation::types::Conversation;
use crate::errors::DenialReason;
use crate::types::UserRole;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Who is asking
#[derive(Debug, Clone, Copy)]
pub struct AccessSubject {
    pub user_id: Uuid,
    pub role: UserRole,
    pub is_participant: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessDecision {
    pub can_read: bool,
    pub can_write: bool,
    /// Why writing is refused
    pub denial: Option<DenialReason>,
    /// Why reading is refused
    pub read_denial: Option<DenialReason>,
    /// The conversation is past `expires_at` and must be persisted as EXPIRED
    pub expire_now: bool,
}

impl AccessDecision {
    pub fn write_result(&self) -> Result<(), DenialReason> {
        match self.denial {
            None if self.can_write => Ok(()),
            Some(reason) => Err(reason),
            None => Err(DenialReason::NotParticipant),
        }
    }

    pub fn read_result(&self) -> Result<(), DenialReason> {
        match self.read_denial {
            None if self.can_read => Ok(()),
            Some(reason) => Err(reason),
            None => Err(DenialReason::NotParticipant),
        }
    }
}

/// Outcome of a single write rule
enum WriteGate {
    Allow,
    Deny(DenialReason),
    Expired,
}

pub fn evaluate(
    subject: &AccessSubject,
    conversation: &Conversation,
    context: &ResolvedContext,
    now: DateTime<Utc>,
) -> AccessDecision {
    let can_read = can_read(subject, conversation);
    let read_denial = if can_read {
        None
    } else if conversation.is_broadcast {
        Some(DenialReason::BroadcastAudienceMismatch)
    } else {
        Some(DenialReason::NotParticipant)
    };

    let gate = if conversation.is_broadcast {
        broadcast_write_rule(subject, conversation, now)
    } else {
        direct_write_rule(subject, conversation, context, now)
    };

    let (can_write, denial, expire_now) = match gate {
        WriteGate::Allow => (true, None, false),
        WriteGate::Deny(reason) => (false, Some(reason), false),
        WriteGate::Expired => (false, Some(DenialReason::Expired), true),
    };

    AccessDecision { can_read, can_write, denial, read_denial, expire_now }
}

pub fn can_read(subject: &AccessSubject, conversation: &Conversation) -> bool {
    if subject.is_participant {
        return true;
    }
    if !conversation.is_broadcast {
        return false;
    }
    let audience_matches = conversation
        .broadcast_target
        .map_or(false, |target| target.matches(subject.role));
    audience_matches || is_broadcast_creator(subject, conversation)
}

fn is_broadcast_creator(subject: &AccessSubject, conversation: &Conversation) -> bool {
    conversation.is_broadcast
        && subject.role == UserRole::Admin
        && conversation.is_created_by(subject.user_id)
}

/// Audience gating runs before status checks; only the creator and
/// in-audience admins ever see a terminal or expired broadcast
fn broadcast_write_rule(subject: &AccessSubject, conversation: &Conversation, now: DateTime<Utc>) -> WriteGate {
    if !is_broadcast_creator(subject, conversation) {
        let audience_matches = conversation
            .broadcast_target
            .map_or(false, |target| target.matches(subject.role));
        if !audience_matches {
            return WriteGate::Deny(DenialReason::BroadcastAudienceMismatch);
        }
        if subject.role != UserRole::Admin {
            return WriteGate::Deny(DenialReason::ReadOnlyAdminOnly);
        }
    }

    if let Some(reason) = conversation.status.terminal_denial() {
        return WriteGate::Deny(reason);
    }
    if conversation.is_expired_at(now) {
        return WriteGate::Expired;
    }
    WriteGate::Allow
}

fn direct_write_rule(
    subject: &AccessSubject,
    conversation: &Conversation,
    context: &ResolvedContext,
    now: DateTime<Utc>,
) -> WriteGate {
    if !subject.is_participant {
        return WriteGate::Deny(DenialReason::NotParticipant);
    }
    if let Some(reason) = conversation.status.terminal_denial() {
        return WriteGate::Deny(reason);
    }
    if conversation.is_expired_at(now) {
        return WriteGate::Expired;
    }
    if conversation.is_read_only && subject.role != UserRole::Admin {
        return WriteGate::Deny(DenialReason::ReadOnlyAdminOnly);
    }
    match context_rule(context, subject.role) {
        Some(reason) => WriteGate::Deny(reason),
        None => WriteGate::Allow,
    }
}

/// Business-context gate. `None` means the context does not object.
pub fn context_rule(context: &ResolvedContext, role: UserRole) -> Option<DenialReason> {
    match context {
        ResolvedContext::AdoptionRequest(request) => match request.status {
            AdoptionRequestStatus::Rejected => Some(DenialReason::AdoptionRejected),
            // The student's reply is what opens the channel
            AdoptionRequestStatus::Pending if role != UserRole::Student => Some(DenialReason::AdoptionPending),
            _ => None,
        },
        ResolvedContext::Offer(application) => match application.status {
            ApplicationStatus::Rejected => Some(DenialReason::ApplicationRejected),
            ApplicationStatus::New => Some(DenialReason::ApplicationNew),
            _ => None,
        },
        ResolvedContext::None | ResolvedContext::Broadcast(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::adoption::AdoptionRequest;
    use crate::domains::application::Application;
    use crate::domains::conversation::types::{
        BroadcastTarget, ConversationContextKind, ConversationStatus,
    };
    use chrono::Duration;

    fn conversation(context: ConversationContextKind) -> Conversation {
        let now = Utc::now();
        Conversation {
            id: Uuid::new_v4(),
            topic: "Topic".to_string(),
            context,
            context_id: None,
            status: ConversationStatus::Active,
            is_read_only: false,
            is_broadcast: false,
            broadcast_target: None,
            created_by: None,
            expires_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn broadcast(target: BroadcastTarget, admin: Uuid) -> Conversation {
        Conversation {
            is_broadcast: true,
            is_read_only: true,
            broadcast_target: Some(target),
            created_by: Some(admin),
            ..conversation(ConversationContextKind::Broadcast)
        }
    }

    fn subject(role: UserRole, is_participant: bool) -> AccessSubject {
        AccessSubject { user_id: Uuid::new_v4(), role, is_participant }
    }

    fn adoption(status: AdoptionRequestStatus) -> ResolvedContext {
        ResolvedContext::AdoptionRequest(AdoptionRequest {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
    }

    fn offer(status: ApplicationStatus) -> ResolvedContext {
        ResolvedContext::Offer(Application {
            id: Uuid::new_v4(),
            offer_id: Uuid::new_v4(),
            offer_title: "Backend intern".to_string(),
            student_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
    }

    fn write_denial(subject: &AccessSubject, conversation: &Conversation, context: &ResolvedContext) -> Option<DenialReason> {
        evaluate(subject, conversation, context, Utc::now()).denial
    }

    #[test]
    fn test_read_gating() {
        let admin = Uuid::new_v4();
        let students_only = broadcast(BroadcastTarget::Students, admin);
        let direct = conversation(ConversationContextKind::None);

        assert!(can_read(&subject(UserRole::Company, true), &direct));
        assert!(!can_read(&subject(UserRole::Company, false), &direct));

        assert!(can_read(&subject(UserRole::Student, false), &students_only));
        assert!(!can_read(&subject(UserRole::Company, false), &students_only));
        assert!(!can_read(&subject(UserRole::Admin, false), &students_only));

        let creator = AccessSubject { user_id: admin, role: UserRole::Admin, is_participant: false };
        assert!(can_read(&creator, &students_only));

        let everyone = broadcast(BroadcastTarget::All, admin);
        for role in [UserRole::Admin, UserRole::Student, UserRole::Company] {
            assert!(can_read(&subject(role, false), &everyone));
        }

        let decision = evaluate(&subject(UserRole::Company, false), &students_only, &ResolvedContext::None, Utc::now());
        assert_eq!(decision.read_denial, Some(DenialReason::BroadcastAudienceMismatch));
        let decision = evaluate(&subject(UserRole::Company, false), &direct, &ResolvedContext::None, Utc::now());
        assert_eq!(decision.read_denial, Some(DenialReason::NotParticipant));
    }

    #[test]
    fn test_broadcast_write_lockdown() {
        let admin = Uuid::new_v4();
        let news = broadcast(BroadcastTarget::All, admin);
        let context = ResolvedContext::Broadcast(BroadcastTarget::All);

        let creator = AccessSubject { user_id: admin, role: UserRole::Admin, is_participant: true };
        assert_eq!(write_denial(&creator, &news, &context), None);

        for role in [UserRole::Student, UserRole::Company] {
            assert_eq!(
                write_denial(&subject(role, true), &news, &context),
                Some(DenialReason::ReadOnlyAdminOnly)
            );
        }
        // Another administrator inside the audience may post
        assert_eq!(write_denial(&subject(UserRole::Admin, false), &news, &context), None);

        let students_only = broadcast(BroadcastTarget::Students, admin);
        assert_eq!(
            write_denial(&subject(UserRole::Admin, false), &students_only, &context),
            Some(DenialReason::BroadcastAudienceMismatch)
        );
        assert_eq!(
            write_denial(&subject(UserRole::Company, true), &students_only, &context),
            Some(DenialReason::BroadcastAudienceMismatch)
        );
    }

    #[test]
    fn test_terminal_status_dominates_broadcast_creator() {
        let admin = Uuid::new_v4();
        let creator = AccessSubject { user_id: admin, role: UserRole::Admin, is_participant: true };
        for (status, reason) in [
            (ConversationStatus::Archived, DenialReason::Archived),
            (ConversationStatus::Expired, DenialReason::Expired),
        ] {
            let ended = Conversation { status, ..broadcast(BroadcastTarget::All, admin) };
            assert_eq!(write_denial(&creator, &ended, &ResolvedContext::None), Some(reason));

            let direct = Conversation { status, ..conversation(ConversationContextKind::None) };
            assert_eq!(write_denial(&subject(UserRole::Admin, true), &direct, &ResolvedContext::None), Some(reason));
        }
    }

    #[test]
    fn test_broadcast_audience_is_checked_before_status() {
        let admin = Uuid::new_v4();
        let context = ResolvedContext::Broadcast(BroadcastTarget::Students);
        let lapsed = Conversation {
            expires_at: Some(Utc::now() - Duration::hours(1)),
            ..broadcast(BroadcastTarget::Students, admin)
        };

        let decision = evaluate(&subject(UserRole::Company, false), &lapsed, &context, Utc::now());
        assert!(!decision.can_write);
        assert!(!decision.expire_now);
        assert_eq!(decision.denial, Some(DenialReason::BroadcastAudienceMismatch));

        let decision = evaluate(&subject(UserRole::Student, true), &lapsed, &context, Utc::now());
        assert!(!decision.expire_now);
        assert_eq!(decision.denial, Some(DenialReason::ReadOnlyAdminOnly));

        let archived = Conversation {
            status: ConversationStatus::Archived,
            ..broadcast(BroadcastTarget::Students, admin)
        };
        assert_eq!(
            write_denial(&subject(UserRole::Student, true), &archived, &context),
            Some(DenialReason::ReadOnlyAdminOnly)
        );
        assert_eq!(
            write_denial(&subject(UserRole::Company, false), &archived, &context),
            Some(DenialReason::BroadcastAudienceMismatch)
        );

        // Creator and in-audience admins still learn about expiry
        let creator = AccessSubject { user_id: admin, role: UserRole::Admin, is_participant: true };
        let decision = evaluate(&creator, &lapsed, &context, Utc::now());
        assert!(decision.expire_now);
        assert_eq!(decision.denial, Some(DenialReason::Expired));

        let everyone = Conversation {
            expires_at: Some(Utc::now() - Duration::hours(1)),
            ..broadcast(BroadcastTarget::All, admin)
        };
        let decision = evaluate(&subject(UserRole::Admin, false), &everyone, &context, Utc::now());
        assert!(decision.expire_now);
        assert_eq!(decision.denial, Some(DenialReason::Expired));
    }

    #[test]
    fn test_expiry_is_reported_not_applied() {
        let past = Conversation {
            expires_at: Some(Utc::now() - Duration::minutes(5)),
            ..conversation(ConversationContextKind::None)
        };
        let decision = evaluate(&subject(UserRole::Student, true), &past, &ResolvedContext::None, Utc::now());
        assert!(!decision.can_write);
        assert!(decision.can_read);
        assert!(decision.expire_now);
        assert_eq!(decision.denial, Some(DenialReason::Expired));
        assert_eq!(past.status, ConversationStatus::Active);

        // Non-members learn nothing about expiry
        let decision = evaluate(&subject(UserRole::Student, false), &past, &ResolvedContext::None, Utc::now());
        assert!(!decision.expire_now);
        assert_eq!(decision.denial, Some(DenialReason::NotParticipant));

        let future = Conversation {
            expires_at: Some(Utc::now() + Duration::days(1)),
            ..conversation(ConversationContextKind::None)
        };
        assert!(evaluate(&subject(UserRole::Student, true), &future, &ResolvedContext::None, Utc::now()).can_write);
    }

    #[test]
    fn test_read_only_flag_lets_only_admins_write() {
        let locked = Conversation { is_read_only: true, ..conversation(ConversationContextKind::None) };
        assert_eq!(
            write_denial(&subject(UserRole::Student, true), &locked, &ResolvedContext::None),
            Some(DenialReason::ReadOnlyAdminOnly)
        );
        assert_eq!(write_denial(&subject(UserRole::Admin, true), &locked, &ResolvedContext::None), None);
    }

    #[test]
    fn test_adoption_context_rules() {
        let chat = conversation(ConversationContextKind::AdoptionRequest);
        let pending = adoption(AdoptionRequestStatus::Pending);

        assert_eq!(write_denial(&subject(UserRole::Student, true), &chat, &pending), None);
        assert_eq!(
            write_denial(&subject(UserRole::Company, true), &chat, &pending),
            Some(DenialReason::AdoptionPending)
        );
        assert_eq!(
            write_denial(&subject(UserRole::Student, true), &chat, &adoption(AdoptionRequestStatus::Rejected)),
            Some(DenialReason::AdoptionRejected)
        );
        assert_eq!(
            write_denial(&subject(UserRole::Company, true), &chat, &adoption(AdoptionRequestStatus::Accepted)),
            None
        );
    }

    #[test]
    fn test_offer_context_rules() {
        let chat = conversation(ConversationContextKind::Offer);
        for (status, expected) in [
            (ApplicationStatus::New, Some(DenialReason::ApplicationNew)),
            (ApplicationStatus::Rejected, Some(DenialReason::ApplicationRejected)),
            (ApplicationStatus::Seen, None),
            (ApplicationStatus::Interview, None),
            (ApplicationStatus::Hired, None),
        ] {
            assert_eq!(write_denial(&subject(UserRole::Company, true), &chat, &offer(status)), expected);
        }
    }

    #[test]
    fn test_precedence_participant_before_terminal_before_context() {
        let archived_offer = Conversation {
            status: ConversationStatus::Archived,
            ..conversation(ConversationContextKind::Offer)
        };
        let rejected = offer(ApplicationStatus::Rejected);

        assert_eq!(
            write_denial(&subject(UserRole::Student, false), &archived_offer, &rejected),
            Some(DenialReason::NotParticipant)
        );
        assert_eq!(
            write_denial(&subject(UserRole::Student, true), &archived_offer, &rejected),
            Some(DenialReason::Archived)
        );

        let locked = Conversation { is_read_only: true, ..conversation(ConversationContextKind::Offer) };
        assert_eq!(
            write_denial(&subject(UserRole::Student, true), &locked, &rejected),
            Some(DenialReason::ReadOnlyAdminOnly)
        );
    }
}
