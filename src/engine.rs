//! Quest Engine
//!
//! Wires static data, storage, notification and the dispatcher together and
//! manages player sessions on top of them.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::activity::ActivitySchedule;
use crate::config::EngineConfig;
use crate::db::{MemoryQuestStore, SqliteQuestStore};
use crate::dispatch::QuestDispatcher;
use crate::dungeon::QuestDungeonListener;
use crate::error::QuestError;
use crate::notify::ChannelNotifier;
use crate::ports::{PlayerWorld, QuestStore};
use crate::quest::conditions::ConditionRegistry;
use crate::quest::orchestrator::{QuestCommand, QuestServices};
use crate::quest::registry::QuestCatalog;

pub struct QuestEngine {
    dispatcher: Arc<QuestDispatcher>,
    notifier: Arc<ChannelNotifier>,
    dungeons: QuestDungeonListener,
}

impl QuestEngine {
    /// Load static data, open storage and start the worker pool
    pub async fn bootstrap(config: &EngineConfig) -> Result<Self, QuestError> {
        config.validate()?;

        let catalog = QuestCatalog::load_from_directory(&config.data.quests_dir()).map_err(QuestError::Config)?;
        let activities =
            ActivitySchedule::load_from_file(&config.data.activities_file()).map_err(QuestError::Config)?;

        let store: Arc<dyn QuestStore> = if config.storage.is_memory() {
            warn!("Using in-memory quest storage, progress will not survive a restart");
            Arc::new(MemoryQuestStore::new())
        } else {
            Arc::new(SqliteQuestStore::new(&config.storage.database_url).await?)
        };

        Self::from_parts(config, catalog, activities, store)
    }

    pub fn from_parts(
        config: &EngineConfig,
        catalog: QuestCatalog,
        activities: ActivitySchedule,
        store: Arc<dyn QuestStore>,
    ) -> Result<Self, QuestError> {
        let notifier = Arc::new(ChannelNotifier::new());
        let services = QuestServices {
            catalog: Arc::new(catalog),
            conditions: Arc::new(ConditionRegistry::standard()),
            policy: Arc::new(config.policy.to_policy()?),
            store,
            notifier: notifier.clone(),
            activities: Arc::new(activities),
        };
        info!("Quest engine ready with {} main quests", services.catalog.len());

        let dispatcher = Arc::new(QuestDispatcher::start(services, &config.dispatch));
        let dungeons = QuestDungeonListener::new(Arc::clone(&dispatcher));
        Ok(Self { dispatcher, notifier, dungeons })
    }

    pub fn dispatcher(&self) -> &Arc<QuestDispatcher> {
        &self.dispatcher
    }

    pub fn dungeon_listener(&self) -> &QuestDungeonListener {
        &self.dungeons
    }

    /// First session of a brand new character: grants the starter quests
    pub async fn create_player(
        &self,
        uid: u32,
        player: Arc<dyn PlayerWorld>,
        sender: Option<mpsc::Sender<Vec<u8>>>,
    ) -> Result<(), QuestError> {
        self.open_session(uid, player, sender).await?;
        self.dispatcher.execute(uid, QuestCommand::PlayerBorn).await?;
        info!("Player {} created", uid);
        Ok(())
    }

    /// Load saved progress, rewind and re-check it
    pub async fn login_player(
        &self,
        uid: u32,
        player: Arc<dyn PlayerWorld>,
        sender: Option<mpsc::Sender<Vec<u8>>>,
    ) -> Result<(), QuestError> {
        self.open_session(uid, player, sender).await?;
        self.dispatcher.execute(uid, QuestCommand::Login).await?;
        info!("Player {} logged in", uid);
        Ok(())
    }

    async fn open_session(
        &self,
        uid: u32,
        player: Arc<dyn PlayerWorld>,
        sender: Option<mpsc::Sender<Vec<u8>>>,
    ) -> Result<(), QuestError> {
        self.dispatcher.wait_drained(uid).await;
        self.dispatcher.register_player(uid, player)?;
        if let Some(sender) = sender {
            self.notifier.register_player_sender(uid, sender);
        }
        if let Err(e) = self.dispatcher.execute(uid, QuestCommand::LoadFromStorage).await {
            self.logout_player(uid);
            return Err(e);
        }
        Ok(())
    }

    pub fn logout_player(&self, uid: u32) {
        self.notifier.unregister_player_sender(uid);
        if let Err(e) = self.dispatcher.unregister_player(uid) {
            warn!("Logout of player {} without a quest session: {}", uid, e);
        }
    }

    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
    }
}
