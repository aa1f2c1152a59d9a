//! Login recovery: rewind to the last checkpoint and reconcile progress.

use tracing::{debug, info};

use super::definition::{MainQuestDef, RewindPoint};
use super::orchestrator::{QuestOrchestrator, Rule};
use super::state::{MainQuest, QuestState};
use crate::player::Transform;

/// The checkpoint a player returns to for one main quest.
///
/// Among rewindable sub quests that have been reached, the highest order one
/// with a configured point wins.
pub fn rewind_checkpoint(main: &MainQuest, def: &MainQuestDef) -> Option<RewindPoint> {
    let mut reached: Vec<_> = def
        .sub_quests
        .iter()
        .filter(|s| s.is_rewind)
        .filter(|s| {
            main.child(s.id)
                .is_some_and(|q| matches!(q.state, QuestState::InProgress | QuestState::Finished))
        })
        .collect();
    reached.sort_by_key(|s| std::cmp::Reverse(s.order));
    reached.into_iter().find_map(|s| def.rewind_point(s.id))
}

impl QuestOrchestrator {
    /// Rewind the player for every active main quest, then re-check progress
    pub async fn on_login(&mut self) {
        let catalog = self.catalog();
        for main in self.main_quests().filter(|m| !m.is_finished()) {
            let Some(def) = catalog.main_quest(main.id) else {
                continue;
            };
            if let Some(point) = rewind_checkpoint(main, def) {
                info!(
                    "Rewinding player {} to main quest {} checkpoint {:?}",
                    self.uid(),
                    main.id,
                    point.position
                );
                self.player().set_transform(Transform {
                    position: point.position,
                    rotation: point.rotation,
                });
            }
        }
        self.check_progress().await;
    }

    /// Apply stored progress that already satisfies a rule, fail first.
    /// In-progress quests that stay open get a pre-check.
    pub async fn check_progress(&mut self) {
        let catalog = self.catalog();
        let mut closing: Vec<(u32, u32, Rule)> = Vec::new();
        let mut open = Vec::new();

        for main in self.main_quests().filter(|m| !m.is_finished()) {
            for child in main.child_quests.iter().filter(|q| q.state == QuestState::InProgress) {
                let Some(def) = catalog.sub_quest(child.sub_id) else {
                    continue;
                };
                if Rule::Fail.is_met(def, child) {
                    closing.push((main.id, child.sub_id, Rule::Fail));
                } else if Rule::Finish.is_met(def, child) {
                    closing.push((main.id, child.sub_id, Rule::Finish));
                } else {
                    open.push(child.sub_id);
                }
            }
        }

        for (main_id, sub_id, rule) in closing {
            if let Some(transition) = self.close_sub_quest(main_id, sub_id, rule) {
                debug!("Player {} reconciled sub quest {} on login", self.uid(), sub_id);
                self.apply_transition(transition).await;
            }
        }
        for sub_id in open {
            self.sink().schedule_precheck(sub_id);
        }
    }
}
