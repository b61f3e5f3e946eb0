use crate::domains::conversation::types::{
    Conversation, ConversationContextKind, ConversationFilter, ConversationRow, ConversationStatus,
    Message, MessageRow, NewConversation, NewMessage,
};
use crate::domains::core::repository::FindById;
use crate::errors::{DbError, DomainError, DomainResult};
use crate::types::{db_timestamp, PaginatedResult, PaginationParams, UserRole};
use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use sqlx::{query, query_as, query_scalar, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

const CONVERSATION_COLUMNS: &str = "id, topic, context, context_id, status, is_read_only, is_broadcast, \
     broadcast_target, created_by, expires_at, version, created_at, updated_at";

/// First message stored together with a new conversation
#[derive(Debug, Clone)]
pub struct OpeningMessage {
    pub sender_id: Uuid,
    pub content: String,
}

/// Trait defining conversation repository operations
#[async_trait]
pub trait ConversationRepository: FindById<Conversation> + Send + Sync {
    /// Create a conversation, its participant rows and an optional opening
    /// message in one transaction. A second conversation for the same linked
    /// business object fails with `DbError::Conflict`.
    async fn create(
        &self,
        new_conversation: &NewConversation,
        participant_ids: &[Uuid],
        opening_message: Option<&OpeningMessage>,
    ) -> DomainResult<(Conversation, Option<Message>)>;

    /// Find the conversation linked to a business object
    async fn find_by_context(
        &self,
        context: ConversationContextKind,
        context_id: Uuid,
    ) -> DomainResult<Option<Conversation>>;

    /// Compare-and-swap on `version`. Fails with `ConcurrentModification`
    /// when another writer got there first.
    async fn update_status(
        &self,
        id: Uuid,
        expected_version: i64,
        status: ConversationStatus,
        is_read_only: bool,
    ) -> DomainResult<Conversation>;

    /// Remove a conversation with its messages and participants
    async fn hard_delete(&self, id: Uuid) -> DomainResult<()>;

    /// Conversations the user takes part in plus broadcasts addressed to the role
    async fn find_for_user(
        &self,
        user_id: Uuid,
        role: UserRole,
        params: PaginationParams,
    ) -> DomainResult<PaginatedResult<Conversation>>;

    /// Administrator listing
    async fn find_by_filter(
        &self,
        filter: &ConversationFilter,
        params: PaginationParams,
    ) -> DomainResult<PaginatedResult<Conversation>>;
}

/// Trait defining message repository operations
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Store a message; the store assigns `created_at`
    async fn create(&self, new_message: &NewMessage) -> DomainResult<Message>;

    /// Messages of a conversation, oldest first
    async fn find_by_conversation(&self, conversation_id: Uuid) -> DomainResult<Vec<Message>>;

    async fn find_last(&self, conversation_id: Uuid) -> DomainResult<Option<Message>>;
}

/// SQLite implementation for ConversationRepository
#[derive(Debug, Clone)]
pub struct SqliteConversationRepository {
    pool: SqlitePool,
}

impl SqliteConversationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn map_row_to_entity(row: ConversationRow) -> DomainResult<Conversation> {
        row.into_entity()
    }

    async fn find_by_id_with_tx<'t>(
        &self,
        id: Uuid,
        tx: &mut Transaction<'t, Sqlite>,
    ) -> DomainResult<Conversation> {
        let row = query_as::<_, ConversationRow>(&format!(
            "SELECT {} FROM conversations WHERE id = ?",
            CONVERSATION_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&mut **tx)
        .await
        .map_err(DbError::from)?
        .ok_or_else(|| DomainError::EntityNotFound("Conversation".to_string(), id))?;
        Self::map_row_to_entity(row)
    }

    async fn insert_message_with_tx<'t>(
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
        tx: &mut Transaction<'t, Sqlite>,
    ) -> DomainResult<Message> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        query("INSERT INTO messages (id, conversation_id, sender_id, content, created_at) VALUES (?, ?, ?, ?, ?)")
            .bind(id.to_string())
            .bind(conversation_id.to_string())
            .bind(sender_id.to_string())
            .bind(content)
            .bind(db_timestamp(&now))
            .execute(&mut **tx)
            .await
            .map_err(DbError::from)?;

        Ok(Message {
            id,
            conversation_id,
            sender_id,
            content: content.to_string(),
            created_at: now,
        })
    }

    async fn paginate(
        &self,
        where_clause: &str,
        binds: Vec<String>,
        params: PaginationParams,
    ) -> DomainResult<PaginatedResult<Conversation>> {
        let count_sql = format!("SELECT COUNT(*) FROM conversations c WHERE {}", where_clause);
        let mut count_query = query_scalar::<_, i64>(&count_sql);
        for value in &binds {
            count_query = count_query.bind(value);
        }
        let total = count_query.fetch_one(&self.pool).await.map_err(DbError::from)?;

        let select_sql = format!(
            "SELECT {} FROM conversations c WHERE {} ORDER BY c.updated_at DESC, c.rowid DESC LIMIT ? OFFSET ?",
            CONVERSATION_COLUMNS, where_clause
        );
        let mut select_query = query_as::<_, ConversationRow>(&select_sql);
        for value in &binds {
            select_query = select_query.bind(value);
        }
        let rows = select_query
            .bind(params.per_page as i64)
            .bind(params.offset() as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::from)?;

        let items = rows
            .into_iter()
            .map(Self::map_row_to_entity)
            .collect::<DomainResult<Vec<_>>>()?;

        Ok(PaginatedResult::new(items, total as u64, params))
    }
}

#[async_trait]
impl FindById<Conversation> for SqliteConversationRepository {
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Conversation> {
        let row = query_as::<_, ConversationRow>(&format!(
            "SELECT {} FROM conversations WHERE id = ?",
            CONVERSATION_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?
        .ok_or_else(|| DomainError::EntityNotFound("Conversation".to_string(), id))?;
        Self::map_row_to_entity(row)
    }
}

#[async_trait]
impl ConversationRepository for SqliteConversationRepository {
    async fn create(
        &self,
        new_conversation: &NewConversation,
        participant_ids: &[Uuid],
        opening_message: Option<&OpeningMessage>,
    ) -> DomainResult<(Conversation, Option<Message>)> {
        let id = Uuid::new_v4();
        let now_str = db_timestamp(&Utc::now());
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let result = async {
            query(
                r#"
                INSERT INTO conversations (
                    id, topic, context, context_id, status,
                    is_read_only, is_broadcast, broadcast_target, created_by, expires_at,
                    version, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
                "#,
            )
            .bind(id.to_string())
            .bind(&new_conversation.topic)
            .bind(new_conversation.context.as_str())
            .bind(new_conversation.context_id.map(|u| u.to_string()))
            .bind(new_conversation.status.as_str())
            .bind(new_conversation.is_read_only as i64)
            .bind(new_conversation.is_broadcast as i64)
            .bind(new_conversation.broadcast_target.map(|t| t.as_str()))
            .bind(new_conversation.created_by.map(|u| u.to_string()))
            .bind(new_conversation.expires_at.as_ref().map(db_timestamp))
            .bind(&now_str)
            .bind(&now_str)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::from_sqlx_with_conflict(e, "Conversation for this context"))?;

            for participant_id in participant_ids {
                query("INSERT OR IGNORE INTO conversation_participants (conversation_id, user_id, joined_at) VALUES (?, ?, ?)")
                    .bind(id.to_string())
                    .bind(participant_id.to_string())
                    .bind(&now_str)
                    .execute(&mut *tx)
                    .await
                    .map_err(DbError::from)?;
            }

            let message = match opening_message {
                Some(opening) => Some(
                    Self::insert_message_with_tx(id, opening.sender_id, &opening.content, &mut tx).await?,
                ),
                None => None,
            };

            let conversation = self.find_by_id_with_tx(id, &mut tx).await?;
            Ok::<_, DomainError>((conversation, message))
        }
        .await;

        match result {
            Ok(created) => {
                tx.commit().await.map_err(DbError::from)?;
                debug!("Created conversation {} ({})", id, new_conversation.context.as_str());
                Ok(created)
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    async fn find_by_context(
        &self,
        context: ConversationContextKind,
        context_id: Uuid,
    ) -> DomainResult<Option<Conversation>> {
        let row = query_as::<_, ConversationRow>(&format!(
            "SELECT {} FROM conversations WHERE context = ? AND context_id = ?",
            CONVERSATION_COLUMNS
        ))
        .bind(context.as_str())
        .bind(context_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?;

        row.map(Self::map_row_to_entity).transpose()
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected_version: i64,
        status: ConversationStatus,
        is_read_only: bool,
    ) -> DomainResult<Conversation> {
        let result = query(
            r#"
            UPDATE conversations
            SET status = ?, is_read_only = ?, version = version + 1, updated_at = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(status.as_str())
        .bind(is_read_only as i64)
        .bind(db_timestamp(&Utc::now()))
        .bind(id.to_string())
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        if result.rows_affected() == 0 {
            // Either the row is gone or the version moved under us
            let current = self.find_by_id(id).await?;
            debug!(
                "Status CAS lost on conversation {}: expected version {}, found {}",
                id, expected_version, current.version
            );
            return Err(DomainError::ConcurrentModification {
                entity_type: "Conversation".to_string(),
                id,
            });
        }

        self.find_by_id(id).await
    }

    async fn hard_delete(&self, id: Uuid) -> DomainResult<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        let id_str = id.to_string();

        let result = async {
            query("DELETE FROM messages WHERE conversation_id = ?")
                .bind(&id_str)
                .execute(&mut *tx)
                .await
                .map_err(DbError::from)?;
            query("DELETE FROM conversation_participants WHERE conversation_id = ?")
                .bind(&id_str)
                .execute(&mut *tx)
                .await
                .map_err(DbError::from)?;
            let deleted = query("DELETE FROM conversations WHERE id = ?")
                .bind(&id_str)
                .execute(&mut *tx)
                .await
                .map_err(DbError::from)?;
            if deleted.rows_affected() == 0 {
                return Err(DomainError::EntityNotFound("Conversation".to_string(), id));
            }
            Ok::<_, DomainError>(())
        }
        .await;

        match result {
            Ok(()) => {
                tx.commit().await.map_err(DbError::from)?;
                Ok(())
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    async fn find_for_user(
        &self,
        user_id: Uuid,
        role: UserRole,
        params: PaginationParams,
    ) -> DomainResult<PaginatedResult<Conversation>> {
        let audience = match role {
            UserRole::Student => "STUDENTS",
            UserRole::Company => "COMPANIES",
            // Only ALL addresses administrators
            UserRole::Admin => "",
        };
        let where_clause = r#"
            c.id IN (SELECT conversation_id FROM conversation_participants WHERE user_id = ?)
            OR (c.is_broadcast = 1 AND (c.broadcast_target = 'ALL' OR c.broadcast_target = ?))
        "#;

        self.paginate(where_clause, vec![user_id.to_string(), audience.to_string()], params)
            .await
    }

    async fn find_by_filter(
        &self,
        filter: &ConversationFilter,
        params: PaginationParams,
    ) -> DomainResult<PaginatedResult<Conversation>> {
        let mut clauses = vec!["1 = 1".to_string()];
        let mut binds = Vec::new();

        if let Some(status) = filter.status {
            clauses.push("c.status = ?".to_string());
            binds.push(status.as_str().to_string());
        }
        if let Some(context) = filter.context {
            clauses.push("c.context = ?".to_string());
            binds.push(context.as_str().to_string());
        }
        if let Some(is_broadcast) = filter.is_broadcast {
            clauses.push(format!("c.is_broadcast = {}", is_broadcast as i64));
        }

        self.paginate(&clauses.join(" AND "), binds, params).await
    }
}

/// SQLite implementation for MessageRepository
#[derive(Debug, Clone)]
pub struct SqliteMessageRepository {
    pool: SqlitePool,
}

impl SqliteMessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for SqliteMessageRepository {
    async fn create(&self, new_message: &NewMessage) -> DomainResult<Message> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let result = async {
            let now = Utc::now();
            // Bump activity first so a missing conversation fails cleanly
            let touched = query("UPDATE conversations SET updated_at = ? WHERE id = ?")
                .bind(db_timestamp(&now))
                .bind(new_message.conversation_id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(DbError::from)?;
            if touched.rows_affected() == 0 {
                return Err(DomainError::EntityNotFound(
                    "Conversation".to_string(),
                    new_message.conversation_id,
                ));
            }

            SqliteConversationRepository::insert_message_with_tx(
                new_message.conversation_id,
                new_message.sender_id,
                &new_message.content,
                &mut tx,
            )
            .await
        }
        .await;

        match result {
            Ok(message) => {
                tx.commit().await.map_err(DbError::from)?;
                Ok(message)
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    async fn find_by_conversation(&self, conversation_id: Uuid) -> DomainResult<Vec<Message>> {
        let rows = query_as::<_, MessageRow>(
            r#"
            SELECT id, conversation_id, sender_id, content, created_at
            FROM messages
            WHERE conversation_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(conversation_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        rows.into_iter().map(MessageRow::into_entity).collect()
    }

    async fn find_last(&self, conversation_id: Uuid) -> DomainResult<Option<Message>> {
        let row = query_as::<_, MessageRow>(
            r#"
            SELECT id, conversation_id, sender_id, content, created_at
            FROM messages
            WHERE conversation_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(conversation_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?;

        row.map(MessageRow::into_entity).transpose()
    }
}
