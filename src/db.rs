//! Quest record persistence.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::error::StoreError;
use crate::ports::QuestStore;
use crate::quest::state::MainQuest;

/// SQLite backed store. Each main quest is kept as one JSON record.
pub struct SqliteQuestStore {
    pool: SqlitePool,
}

impl SqliteQuestStore {
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        // Every connection to an in-memory database sees its own empty database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(StoreError::database("connect"))?;

        Self::migrate(&pool).await.map_err(StoreError::database("migrate"))?;

        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS player_main_quests (
                player_id INTEGER NOT NULL,
                main_quest_id INTEGER NOT NULL,
                state TEXT NOT NULL,
                record_json TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY(player_id, main_quest_id)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS player_quest_global_vars (
                player_id INTEGER NOT NULL,
                var_id INTEGER NOT NULL,
                value INTEGER NOT NULL,
                PRIMARY KEY(player_id, var_id)
            )
            "#,
        )
        .execute(pool)
        .await?;

        tracing::info!("Quest database migrations complete");
        Ok(())
    }
}

#[async_trait]
impl QuestStore for SqliteQuestStore {
    async fn load_main_quests(&self, uid: u32) -> Result<Vec<MainQuest>, StoreError> {
        let rows = sqlx::query(
            "SELECT record_json FROM player_main_quests WHERE player_id = ? ORDER BY main_quest_id",
        )
        .bind(i64::from(uid))
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::database("load_main_quests"))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let json: String = row.get("record_json");
            records.push(serde_json::from_str(&json)?);
        }
        Ok(records)
    }

    async fn save_main_quest(&self, record: &MainQuest) -> Result<(), StoreError> {
        let json = serde_json::to_string(record)?;
        sqlx::query(
            r#"INSERT INTO player_main_quests (player_id, main_quest_id, state, record_json)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(player_id, main_quest_id) DO UPDATE SET
                state = excluded.state,
                record_json = excluded.record_json,
                updated_at = CURRENT_TIMESTAMP"#,
        )
        .bind(i64::from(record.owner_uid))
        .bind(i64::from(record.id))
        .bind(record.state.as_str())
        .bind(json)
        .execute(&self.pool)
        .await
        .map_err(StoreError::database("save_main_quest"))?;

        Ok(())
    }

    async fn delete_main_quest(&self, uid: u32, main_quest_id: u32) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM player_main_quests WHERE player_id = ? AND main_quest_id = ?")
            .bind(i64::from(uid))
            .bind(i64::from(main_quest_id))
            .execute(&self.pool)
            .await
            .map_err(StoreError::database("delete_main_quest"))?;

        Ok(())
    }

    async fn load_global_variables(&self, uid: u32) -> Result<HashMap<u32, i32>, StoreError> {
        let rows = sqlx::query("SELECT var_id, value FROM player_quest_global_vars WHERE player_id = ?")
            .bind(i64::from(uid))
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::database("load_global_variables"))?;

        let mut values = HashMap::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.get("var_id");
            let value: i64 = row.get("value");
            match (u32::try_from(id), i32::try_from(value)) {
                (Ok(id), Ok(value)) => {
                    values.insert(id, value);
                }
                _ => tracing::warn!(
                    "Skipping out of range global var {} = {} for player {}",
                    id, value, uid
                ),
            }
        }
        Ok(values)
    }

    async fn save_global_variables(
        &self,
        uid: u32,
        values: &HashMap<u32, i32>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::database("begin"))?;

        sqlx::query("DELETE FROM player_quest_global_vars WHERE player_id = ?")
            .bind(i64::from(uid))
            .execute(&mut *tx)
            .await
            .map_err(StoreError::database("save_global_variables"))?;

        for (id, value) in values {
            sqlx::query("INSERT INTO player_quest_global_vars (player_id, var_id, value) VALUES (?, ?, ?)")
                .bind(i64::from(uid))
                .bind(i64::from(*id))
                .bind(i64::from(*value))
                .execute(&mut *tx)
                .await
                .map_err(StoreError::database("save_global_variables"))?;
        }

        tx.commit().await.map_err(StoreError::database("commit"))?;
        Ok(())
    }
}

/// Process-local store for tests and servers without a database
#[derive(Default)]
pub struct MemoryQuestStore {
    records: DashMap<(u32, u32), MainQuest>,
    globals: DashMap<u32, HashMap<u32, i32>>,
}

impl MemoryQuestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_record(&self, record: MainQuest) {
        self.records.insert((record.owner_uid, record.id), record);
    }

    pub fn insert_globals(&self, uid: u32, values: HashMap<u32, i32>) {
        self.globals.insert(uid, values);
    }

    pub fn record(&self, uid: u32, main_quest_id: u32) -> Option<MainQuest> {
        self.records.get(&(uid, main_quest_id)).map(|r| r.clone())
    }

    pub fn globals(&self, uid: u32) -> HashMap<u32, i32> {
        self.globals.get(&uid).map(|g| g.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl QuestStore for MemoryQuestStore {
    async fn load_main_quests(&self, uid: u32) -> Result<Vec<MainQuest>, StoreError> {
        let mut records: Vec<MainQuest> = self
            .records
            .iter()
            .filter(|e| e.key().0 == uid)
            .map(|e| e.value().clone())
            .collect();
        records.sort_by_key(|r| r.id);
        Ok(records)
    }

    async fn save_main_quest(&self, record: &MainQuest) -> Result<(), StoreError> {
        self.insert_record(record.clone());
        Ok(())
    }

    async fn delete_main_quest(&self, uid: u32, main_quest_id: u32) -> Result<(), StoreError> {
        self.records.remove(&(uid, main_quest_id));
        Ok(())
    }

    async fn load_global_variables(&self, uid: u32) -> Result<HashMap<u32, i32>, StoreError> {
        Ok(self.globals(uid))
    }

    async fn save_global_variables(
        &self,
        uid: u32,
        values: &HashMap<u32, i32>,
    ) -> Result<(), StoreError> {
        self.insert_globals(uid, values.clone());
        Ok(())
    }
}
