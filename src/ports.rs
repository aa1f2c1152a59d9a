//! Seams between the quest engine and the rest of the game server.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{QuestError, StoreError};
use crate::player::Transform;
use crate::quest::events::QuestEvent;
use crate::quest::state::{MainQuest, SubQuest};

// =============================================================================
// Persistence
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuestStore: Send + Sync {
    async fn load_main_quests(&self, uid: u32) -> Result<Vec<MainQuest>, StoreError>;
    async fn save_main_quest(&self, record: &MainQuest) -> Result<(), StoreError>;
    async fn delete_main_quest(&self, uid: u32, main_quest_id: u32) -> Result<(), StoreError>;
    async fn load_global_variables(&self, uid: u32) -> Result<HashMap<u32, i32>, StoreError>;
    async fn save_global_variables(
        &self,
        uid: u32,
        values: &HashMap<u32, i32>,
    ) -> Result<(), StoreError>;
}

// =============================================================================
// Notifications (best effort)
// =============================================================================

#[cfg_attr(test, mockall::automock)]
pub trait QuestNotifier: Send + Sync {
    fn notify_main_quest_created(&self, record: &MainQuest);
    fn notify_quest_progress(&self, uid: u32, quest: &SubQuest);
    fn notify_main_quest_finished(&self, record: &MainQuest);
}

// =============================================================================
// World queries
// =============================================================================

/// Activity predicates consumed by activity-linked acceptance conditions
pub trait ActivityOracle: Send + Sync {
    fn is_activity_active(&self, activity_id: u32) -> bool;
    fn has_activity_ended(&self, activity_id: u32) -> bool;
    fn meets_activity_condition(&self, cond_id: u32) -> bool;
}

/// Live state of the player a quest set belongs to
pub trait PlayerWorld: Send + Sync {
    fn level(&self) -> u32;
    fn item_count(&self, item_id: u32) -> u32;
    fn is_scene_point_unlocked(&self, scene_id: u32, point_id: u32) -> bool;
    fn is_scene_area_unlocked(&self, scene_id: u32, area_id: u32) -> bool;
    fn transform(&self) -> Transform;
    fn set_transform(&self, transform: Transform);
}

// =============================================================================
// Follow-up scheduling
// =============================================================================

/// Where an orchestrator sends work that must run later in its player's stream
pub trait EventSink: Send + Sync {
    /// Append an event to the player's mailbox
    fn queue(&self, event: QuestEvent) -> Result<(), QuestError>;
    /// Run the fulfillment pre-check for `sub_id` after the configured delay
    fn schedule_precheck(&self, sub_id: u32);
    fn cancel_precheck(&self, sub_id: u32);
}
