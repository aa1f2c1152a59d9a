//! Quest State Tracking
//!
//! Per-player quest records and the state machines that govern them. A
//! `MainQuest` is also the unit that gets persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::definition::{MainQuestDef, QuestGroupSuite, SubQuestDef};

/// Number of per-main-quest variable slots
pub const QUEST_VAR_SLOTS: usize = 5;

/// State of a sub quest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestState {
    NotStarted,
    InProgress,
    Finished,
    Failed,
}

impl QuestState {
    /// Numeric code compared by state conditions
    pub fn code(&self) -> i32 {
        match self {
            QuestState::NotStarted => 1,
            QuestState::InProgress => 2,
            QuestState::Finished => 3,
            QuestState::Failed => 4,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(QuestState::NotStarted),
            2 => Some(QuestState::InProgress),
            3 => Some(QuestState::Finished),
            4 => Some(QuestState::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestState::NotStarted => "not_started",
            QuestState::InProgress => "in_progress",
            QuestState::Finished => "finished",
            QuestState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, QuestState::Finished | QuestState::Failed)
    }
}

/// State of a main quest. Ordered so that it can only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ParentQuestState {
    NotStarted,
    InProgress,
    Finished,
}

impl ParentQuestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParentQuestState::NotStarted => "not_started",
            ParentQuestState::InProgress => "in_progress",
            ParentQuestState::Finished => "finished",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(ParentQuestState::NotStarted),
            "in_progress" => Some(ParentQuestState::InProgress),
            "finished" => Some(ParentQuestState::Finished),
            _ => None,
        }
    }
}

/// A state change of one sub quest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestTransition {
    pub main_quest_id: u32,
    pub sub_quest_id: u32,
    pub from: QuestState,
    pub to: QuestState,
}

/// A player's progress on one sub quest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubQuest {
    pub sub_id: u32,
    pub main_id: u32,
    pub state: QuestState,
    /// One entry per finish condition
    #[serde(default)]
    pub finish_progress: Vec<i32>,
    /// One entry per fail condition
    #[serde(default)]
    pub fail_progress: Vec<i32>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SubQuest {
    pub fn new(def: &SubQuestDef) -> Self {
        Self {
            sub_id: def.id,
            main_id: def.main_id,
            state: QuestState::NotStarted,
            finish_progress: vec![0; def.finish_conds.len()],
            fail_progress: vec![0; def.fail_conds.len()],
            accepted_at: None,
            finished_at: None,
        }
    }

    /// NotStarted -> InProgress. Resets progress counters.
    pub fn start(&mut self, def: &SubQuestDef) -> Option<QuestTransition> {
        if self.state != QuestState::NotStarted {
            return None;
        }
        self.finish_progress = vec![0; def.finish_conds.len()];
        self.fail_progress = vec![0; def.fail_conds.len()];
        self.accepted_at = Some(Utc::now());
        Some(self.move_to(QuestState::InProgress))
    }

    /// InProgress -> Finished
    pub fn finish(&mut self) -> Option<QuestTransition> {
        if self.state != QuestState::InProgress {
            return None;
        }
        self.finished_at = Some(Utc::now());
        Some(self.move_to(QuestState::Finished))
    }

    /// InProgress -> Failed
    pub fn fail(&mut self) -> Option<QuestTransition> {
        if self.state != QuestState::InProgress {
            return None;
        }
        self.finished_at = Some(Utc::now());
        Some(self.move_to(QuestState::Failed))
    }

    fn move_to(&mut self, to: QuestState) -> QuestTransition {
        let from = self.state;
        self.state = to;
        QuestTransition {
            main_quest_id: self.main_id,
            sub_quest_id: self.sub_id,
            from,
            to,
        }
    }

    /// Make progress vectors match the definition's condition counts
    fn sync_progress(&mut self, def: &SubQuestDef) {
        self.finish_progress.resize(def.finish_conds.len(), 0);
        self.fail_progress.resize(def.fail_conds.len(), 0);
    }
}

/// A player's record for one main quest and all of its sub quests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainQuest {
    pub id: u32,
    pub owner_uid: u32,
    pub state: ParentQuestState,
    /// Children in definition order
    pub child_quests: Vec<SubQuest>,
    #[serde(default = "empty_quest_vars")]
    pub quest_vars: Vec<i32>,
    pub finished_at: Option<DateTime<Utc>>,
}

fn empty_quest_vars() -> Vec<i32> {
    vec![0; QUEST_VAR_SLOTS]
}

impl MainQuest {
    pub fn new(owner_uid: u32, def: &MainQuestDef) -> Self {
        Self {
            id: def.id,
            owner_uid,
            state: ParentQuestState::NotStarted,
            child_quests: def.sub_quests.iter().map(SubQuest::new).collect(),
            quest_vars: empty_quest_vars(),
            finished_at: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == ParentQuestState::Finished
    }

    pub fn child(&self, sub_id: u32) -> Option<&SubQuest> {
        self.child_quests.iter().find(|q| q.sub_id == sub_id)
    }

    pub fn child_mut(&mut self, sub_id: u32) -> Option<&mut SubQuest> {
        self.child_quests.iter_mut().find(|q| q.sub_id == sub_id)
    }

    /// Bring a loaded record in line with its definition.
    ///
    /// Returns the id of the first child the definition no longer knows, in
    /// which case the record must be discarded. Children added to the
    /// definition since the record was saved are appended as not started.
    pub fn sync_children(&mut self, def: &MainQuestDef) -> Result<(), u32> {
        if let Some(orphan) = self.child_quests.iter().find(|q| def.sub_quest(q.sub_id).is_none()) {
            return Err(orphan.sub_id);
        }
        for sub_def in &def.sub_quests {
            match self.child_mut(sub_def.id) {
                Some(child) => child.sync_progress(sub_def),
                None => self.child_quests.push(SubQuest::new(sub_def)),
            }
        }
        self.child_quests.sort_by_key(|q| {
            def.sub_quests.iter().position(|s| s.id == q.sub_id).unwrap_or(usize::MAX)
        });
        self.quest_vars.resize(QUEST_VAR_SLOTS, 0);
        Ok(())
    }

    /// Group suites of the children that are currently in progress
    pub fn group_suites(&self, def: &MainQuestDef) -> Vec<QuestGroupSuite> {
        self.child_quests
            .iter()
            .filter(|q| q.state == QuestState::InProgress)
            .filter_map(|q| def.sub_quest(q.sub_id))
            .flat_map(|s| s.group_suites.iter().copied())
            .collect()
    }

    pub fn quest_var(&self, index: usize) -> i32 {
        self.quest_vars.get(index).copied().unwrap_or(0)
    }

    /// Returns false when the index is outside the variable slots
    pub fn set_quest_var(&mut self, index: usize, value: i32) -> bool {
        match self.quest_vars.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Recompute the derived state. Never moves backwards.
    ///
    /// Returns true when the main quest has just become finished.
    pub fn refresh_state(&mut self, def: &MainQuestDef) -> bool {
        let terminal_finished = def
            .terminal_sub_quests()
            .iter()
            .any(|t| self.child(t.id).is_some_and(|q| q.state == QuestState::Finished));
        let any_started = self.child_quests.iter().any(|q| q.state != QuestState::NotStarted);

        let derived = if terminal_finished {
            ParentQuestState::Finished
        } else if any_started {
            ParentQuestState::InProgress
        } else {
            ParentQuestState::NotStarted
        };

        if derived > self.state {
            self.state = derived;
            if derived == ParentQuestState::Finished {
                self.finished_at = Some(Utc::now());
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::registry::QuestCatalog;

    fn catalog() -> QuestCatalog {
        QuestCatalog::from_toml_documents([r#"
            [quest]
            id = 500
            [[quest.sub_quests]]
            id = 50001
            order = 1
            [[quest.sub_quests.finish_cond]]
            type = "QUEST_CONTENT_COMPLETE_TALK"
            params = [5001]
            [[quest.sub_quests]]
            id = 50002
            order = 2
        "#]).unwrap()
    }

    #[test]
    fn test_sub_quest_transitions_are_monotonic() {
        let catalog = catalog();
        let def = catalog.sub_quest(50001).unwrap();
        let mut quest = SubQuest::new(def);

        assert!(quest.finish().is_none());
        let started = quest.start(def).unwrap();
        assert_eq!((started.from, started.to), (QuestState::NotStarted, QuestState::InProgress));
        assert_eq!(quest.finish_progress, vec![0]);
        assert!(quest.start(def).is_none());

        assert!(quest.finish().is_some());
        assert!(quest.finish().is_none());
        assert!(quest.fail().is_none());
        assert!(quest.start(def).is_none());
        assert_eq!(quest.state, QuestState::Finished);
    }

    #[test]
    fn test_parent_state_is_derived_and_monotonic() {
        let catalog = catalog();
        let def = catalog.main_quest(500).unwrap();
        let mut main = MainQuest::new(7, def);
        assert!(!main.refresh_state(def));
        assert_eq!(main.state, ParentQuestState::NotStarted);

        let first = catalog.sub_quest(50001).unwrap();
        main.child_mut(50001).unwrap().start(first);
        main.refresh_state(def);
        assert_eq!(main.state, ParentQuestState::InProgress);

        let last = catalog.sub_quest(50002).unwrap();
        main.child_mut(50002).unwrap().start(last);
        main.child_mut(50002).unwrap().finish();
        assert!(main.refresh_state(def));
        assert!(main.is_finished());

        // A finished record stays finished even if its children are rewritten.
        main.child_mut(50002).unwrap().state = QuestState::NotStarted;
        assert!(!main.refresh_state(def));
        assert!(main.is_finished());
    }

    #[test]
    fn test_sync_children_detects_orphans() {
        let catalog = catalog();
        let def = catalog.main_quest(500).unwrap();
        let mut main = MainQuest::new(7, def);
        main.child_quests.remove(1);
        assert!(main.sync_children(def).is_ok());
        assert_eq!(main.child_quests.len(), 2);

        main.child_quests[0].sub_id = 59999;
        assert_eq!(main.sync_children(def), Err(59999));
    }

    #[test]
    fn test_state_codes() {
        assert_eq!(QuestState::Finished.code(), 3);
        assert_eq!(QuestState::from_code(4), Some(QuestState::Failed));
        assert_eq!(QuestState::from_code(9), None);
    }
}
