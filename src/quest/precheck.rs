//! Fulfillment pre-check.
//!
//! A sub quest forced into progress may already have its finish conditions
//! met by the player's current state. The pre-check synthesizes the content
//! events the world would have raised so the quest does not stay stuck.

use tracing::{debug, warn};

use super::events::{QuestContent, QuestEvent};
use super::orchestrator::QuestOrchestrator;
use super::state::QuestState;

impl QuestOrchestrator {
    /// Queue events for finish conditions the player already meets.
    ///
    /// Does nothing unless the sub quest is still in progress.
    pub fn check_quest_already_fulfilled(&self, sub_id: u32) {
        if self.quest(sub_id).map(|q| q.state) != Some(QuestState::InProgress) {
            debug!("Skipping pre-check of sub quest {} for player {}", sub_id, self.uid());
            return;
        }
        let catalog = self.catalog();
        let Some(def) = catalog.sub_quest(sub_id) else {
            return;
        };

        for cond in &def.finish_conds {
            let first = u32::try_from(cond.param(0));
            let second = u32::try_from(cond.param(1));
            let event = match cond.kind {
                QuestContent::ObtainItem | QuestContent::ItemLessThan => {
                    let Ok(item_id) = first else {
                        warn!("Sub quest {} has a negative item id", sub_id);
                        continue;
                    };
                    let owned = i32::try_from(self.player().item_count(item_id)).unwrap_or(i32::MAX);
                    QuestEvent::content(cond.kind, "", &[cond.param(0), owned])
                }
                QuestContent::UnlockTransPoint => match (first, second) {
                    (Ok(scene), Ok(point)) if self.player().is_scene_point_unlocked(scene, point) => {
                        QuestEvent::content(cond.kind, "", &[cond.param(0), cond.param(1)])
                    }
                    _ => continue,
                },
                QuestContent::UnlockArea => match (first, second) {
                    (Ok(scene), Ok(area)) if self.player().is_scene_area_unlocked(scene, area) => {
                        QuestEvent::content(cond.kind, "", &[cond.param(0), cond.param(1)])
                    }
                    _ => continue,
                },
                QuestContent::PlayerLevelUp => {
                    let level = i32::try_from(self.player().level()).unwrap_or(i32::MAX);
                    QuestEvent::content(cond.kind, "", &[level])
                }
                QuestContent::QuestStateEqual
                | QuestContent::QuestVarEqual
                | QuestContent::QuestVarGreater
                | QuestContent::QuestVarLess => QuestEvent::content(cond.kind, "", &cond.params),
                _ => continue,
            };
            self.follow_up(event);
        }
    }
}
