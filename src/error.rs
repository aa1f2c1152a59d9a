//! Error types shared across the quest engine.

/// Failures raised by a quest store adapter.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error during {operation}: {source}")]
    Database {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn database(operation: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| StoreError::Database { operation, source }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QuestError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: u32 },
    #[error("Unhandled event kind: {0}")]
    UnhandledEventKind(String),
    #[error("Event backlog full ({capacity} queued)")]
    BacklogFull { capacity: usize },
    #[error("Main quest {main_quest_id} references missing sub quest {sub_quest_id}")]
    InconsistentPersistedState { main_quest_id: u32, sub_quest_id: u32 },
    #[error("Player {0} is not registered")]
    PlayerNotRegistered(u32),
    #[error("Player {0} is already registered")]
    PlayerAlreadyRegistered(u32),
    #[error("Player {0} is still draining a previous session")]
    PlayerDraining(u32),
    #[error("Malformed {kind} condition: {reason}")]
    MalformedCondition { kind: &'static str, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl QuestError {
    pub fn not_found(kind: &'static str, id: u32) -> Self {
        QuestError::NotFound { kind, id }
    }

    pub fn malformed(kind: &'static str, reason: impl Into<String>) -> Self {
        QuestError::MalformedCondition { kind, reason: reason.into() }
    }
}
