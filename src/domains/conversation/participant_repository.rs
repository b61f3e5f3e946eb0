use crate::domains::conversation::types::ConversationParticipant;
use crate::errors::{DbError, DomainError, DomainResult};
use crate::types::{db_timestamp, parse_db_timestamp, parse_db_uuid};
use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use sqlx::{query, query_as, query_scalar, FromRow, SqlitePool};
use uuid::Uuid;

/// Trait defining conversation membership operations
#[async_trait]
pub trait ConversationParticipantRepository: Send + Sync {
    async fn is_participant(&self, conversation_id: Uuid, user_id: Uuid) -> DomainResult<bool>;

    /// Members in join order
    async fn list_participants(&self, conversation_id: Uuid) -> DomainResult<Vec<ConversationParticipant>>;

    /// Insert one batch of members in a single transaction. Existing members
    /// are skipped. Returns the number of rows actually inserted.
    async fn add_participants(&self, conversation_id: Uuid, user_ids: &[Uuid]) -> DomainResult<u64>;

    async fn count_participants(&self, conversation_id: Uuid) -> DomainResult<i64>;
}

#[derive(Debug, FromRow)]
struct ParticipantRow {
    conversation_id: String,
    user_id: String,
    joined_at: String,
}

impl ParticipantRow {
    fn into_entity(self) -> DomainResult<ConversationParticipant> {
        Ok(ConversationParticipant {
            conversation_id: parse_db_uuid(&self.conversation_id, "ConversationParticipant.conversation_id")?,
            user_id: parse_db_uuid(&self.user_id, "ConversationParticipant.user_id")?,
            joined_at: parse_db_timestamp(&self.joined_at, "ConversationParticipant.joined_at")?,
        })
    }
}

/// SQLite implementation for ConversationParticipantRepository
#[derive(Debug, Clone)]
pub struct SqliteConversationParticipantRepository {
    pool: SqlitePool,
}

impl SqliteConversationParticipantRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationParticipantRepository for SqliteConversationParticipantRepository {
    async fn is_participant(&self, conversation_id: Uuid, user_id: Uuid) -> DomainResult<bool> {
        let found: Option<i64> = query_scalar(
            "SELECT 1 FROM conversation_participants WHERE conversation_id = ? AND user_id = ?",
        )
        .bind(conversation_id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(found.is_some())
    }

    async fn list_participants(&self, conversation_id: Uuid) -> DomainResult<Vec<ConversationParticipant>> {
        let rows = query_as::<_, ParticipantRow>(
            r#"
            SELECT conversation_id, user_id, joined_at
            FROM conversation_participants
            WHERE conversation_id = ?
            ORDER BY joined_at ASC, rowid ASC
            "#,
        )
        .bind(conversation_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        rows.into_iter().map(ParticipantRow::into_entity).collect()
    }

    async fn add_participants(&self, conversation_id: Uuid, user_ids: &[Uuid]) -> DomainResult<u64> {
        if user_ids.is_empty() {
            return Ok(0);
        }

        let now_str = db_timestamp(&Utc::now());
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let result = async {
            let mut inserted = 0u64;
            for user_id in user_ids {
                let outcome = query(
                    "INSERT OR IGNORE INTO conversation_participants (conversation_id, user_id, joined_at) VALUES (?, ?, ?)",
                )
                .bind(conversation_id.to_string())
                .bind(user_id.to_string())
                .bind(&now_str)
                .execute(&mut *tx)
                .await
                .map_err(DbError::from)?;
                inserted += outcome.rows_affected();
            }
            Ok::<_, DomainError>(inserted)
        }
        .await;

        match result {
            Ok(inserted) => {
                tx.commit().await.map_err(DbError::from)?;
                debug!(
                    "Added {} of {} participants to conversation {}",
                    inserted,
                    user_ids.len(),
                    conversation_id
                );
                Ok(inserted)
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    async fn count_participants(&self, conversation_id: Uuid) -> DomainResult<i64> {
        let count = query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM conversation_participants WHERE conversation_id = ?",
        )
        .bind(conversation_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::conversation::repository::{ConversationRepository, SqliteConversationRepository};
    use crate::domains::conversation::types::NewConversation;
    use crate::test_support;

    #[tokio::test]
    async fn test_batches_skip_existing_members() {
        let pool = test_support::test_pool().await;
        let conversations = SqliteConversationRepository::new(pool.clone());
        let participants = SqliteConversationParticipantRepository::new(pool);
        let (conversation, _) = conversations
            .create(&NewConversation::offer("Offer".into(), Uuid::new_v4()), &[], None)
            .await
            .unwrap();

        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        assert_eq!(participants.add_participants(conversation.id, &[alice, bob]).await.unwrap(), 2);
        assert_eq!(participants.add_participants(conversation.id, &[bob]).await.unwrap(), 0);
        assert_eq!(participants.add_participants(conversation.id, &[]).await.unwrap(), 0);

        assert_eq!(participants.count_participants(conversation.id).await.unwrap(), 2);
        assert!(participants.is_participant(conversation.id, alice).await.unwrap());
        assert!(!participants.is_participant(conversation.id, Uuid::new_v4()).await.unwrap());

        let listed: Vec<Uuid> = participants
            .list_participants(conversation.id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.user_id)
            .collect();
        assert_eq!(listed, vec![alice, bob]);
    }
}
