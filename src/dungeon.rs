//! Bridges dungeon lifecycle callbacks into quest content events.

use std::sync::Arc;

use tracing::warn;

use crate::dispatch::QuestDispatcher;
use crate::error::QuestError;
use crate::quest::events::QuestContent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DungeonEndReason {
    Completed,
    Failed,
    TimeLimitExceeded,
    Quit,
}

/// Implemented by anything that reacts to a player entering or leaving a dungeon
pub trait DungeonSettleListener: Send + Sync {
    fn on_dungeon_enter(&self, uid: u32, dungeon_id: u32) -> Result<(), QuestError>;
    fn on_dungeon_settle(&self, uid: u32, dungeon_id: u32, reason: DungeonEndReason) -> Result<(), QuestError>;
}

pub struct QuestDungeonListener {
    dispatcher: Arc<QuestDispatcher>,
}

impl QuestDungeonListener {
    pub fn new(dispatcher: Arc<QuestDispatcher>) -> Self {
        Self { dispatcher }
    }

    fn raise(&self, uid: u32, content: QuestContent, dungeon_id: u32) -> Result<(), QuestError> {
        let Ok(id) = i32::try_from(dungeon_id) else {
            warn!("Dungeon id {} does not fit a quest param", dungeon_id);
            return Ok(());
        };
        self.dispatcher.raise_content_event(uid, content, "", &[id])
    }
}

impl DungeonSettleListener for QuestDungeonListener {
    fn on_dungeon_enter(&self, uid: u32, dungeon_id: u32) -> Result<(), QuestError> {
        self.raise(uid, QuestContent::EnterDungeon, dungeon_id)
    }

    fn on_dungeon_settle(&self, uid: u32, dungeon_id: u32, reason: DungeonEndReason) -> Result<(), QuestError> {
        let content = match reason {
            DungeonEndReason::Completed => QuestContent::FinishDungeon,
            DungeonEndReason::Failed | DungeonEndReason::TimeLimitExceeded | DungeonEndReason::Quit => {
                QuestContent::FailDungeon
            }
        };
        self.raise(uid, content, dungeon_id)
    }
}
