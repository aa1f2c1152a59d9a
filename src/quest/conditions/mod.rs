//! Condition Handlers
//!
//! Every acceptance condition and content kind is evaluated by a handler
//! registered explicitly in a [`ConditionRegistry`]. Acceptance handlers
//! answer yes or no. Content handlers return the condition's new progress
//! value, which is compared against the condition's count.

mod accept;
mod content;

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use super::definition::{AcceptCondition, ContentCondition};
use super::events::{QuestCond, QuestContent};
use super::registry::QuestCatalog;
use super::state::{MainQuest, QuestState};
use super::variables::GlobalVariableStore;
use crate::error::QuestError;
use crate::ports::{ActivityOracle, PlayerWorld};

/// Read-only view of everything a handler may consult
pub struct ConditionContext<'a> {
    pub catalog: &'a QuestCatalog,
    pub main_quests: &'a BTreeMap<u32, MainQuest>,
    /// The main quest owning the condition being evaluated
    pub owner: &'a MainQuest,
    pub globals: &'a GlobalVariableStore,
    pub player: &'a dyn PlayerWorld,
    pub activities: &'a dyn ActivityOracle,
}

impl ConditionContext<'_> {
    /// Current state of any sub quest of this player.
    ///
    /// Sub quests whose main quest has no record yet read as not started.
    /// `None` when the catalog does not know the id.
    pub fn quest_state(&self, sub_id: u32) -> Option<QuestState> {
        let def = self.catalog.sub_quest(sub_id)?;
        let state = self
            .main_quests
            .get(&def.main_id)
            .and_then(|m| m.child(sub_id))
            .map_or(QuestState::NotStarted, |q| q.state);
        Some(state)
    }

    pub fn quest_var(&self, index: usize) -> i32 {
        self.owner.quest_var(index)
    }

    pub fn global_var(&self, id: u32) -> i32 {
        self.globals.get(id)
    }
}

/// Decides whether one acceptance condition holds
pub trait AcceptConditionHandler: Send + Sync {
    fn execute(
        &self,
        ctx: &ConditionContext<'_>,
        cond: &AcceptCondition,
        param_str: &str,
        params: &[i32],
    ) -> Result<bool, QuestError>;
}

impl<F> AcceptConditionHandler for F
where
    F: Fn(&ConditionContext<'_>, &AcceptCondition, &str, &[i32]) -> Result<bool, QuestError>
        + Send
        + Sync,
{
    fn execute(
        &self,
        ctx: &ConditionContext<'_>,
        cond: &AcceptCondition,
        param_str: &str,
        params: &[i32],
    ) -> Result<bool, QuestError> {
        self(ctx, cond, param_str, params)
    }
}

/// Computes the new progress of one finish or fail condition
pub trait ContentHandler: Send + Sync {
    fn execute(
        &self,
        ctx: &ConditionContext<'_>,
        cond: &ContentCondition,
        progress: i32,
        param_str: &str,
        params: &[i32],
    ) -> Result<i32, QuestError>;
}

impl<F> ContentHandler for F
where
    F: Fn(&ConditionContext<'_>, &ContentCondition, i32, &str, &[i32]) -> Result<i32, QuestError>
        + Send
        + Sync,
{
    fn execute(
        &self,
        ctx: &ConditionContext<'_>,
        cond: &ContentCondition,
        progress: i32,
        param_str: &str,
        params: &[i32],
    ) -> Result<i32, QuestError> {
        self(ctx, cond, progress, param_str, params)
    }
}

/// Taxonomy value -> handler, populated by explicit registration calls
#[derive(Default)]
pub struct ConditionRegistry {
    accept: HashMap<QuestCond, Box<dyn AcceptConditionHandler>>,
    content: HashMap<QuestContent, Box<dyn ContentHandler>>,
}

impl ConditionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a handler for every dispatchable kind
    pub fn standard() -> Self {
        let mut registry = Self::new();
        accept::register(&mut registry);
        content::register(&mut registry);
        registry
    }

    pub fn register_accept(&mut self, kind: QuestCond, handler: impl AcceptConditionHandler + 'static) {
        self.accept.insert(kind, Box::new(handler));
    }

    pub fn register_content(&mut self, kind: QuestContent, handler: impl ContentHandler + 'static) {
        self.content.insert(kind, Box::new(handler));
    }

    pub fn has_accept(&self, kind: QuestCond) -> bool {
        self.accept.contains_key(&kind)
    }

    pub fn has_content(&self, kind: QuestContent) -> bool {
        self.content.contains_key(&kind)
    }

    /// Conditions without a handler never hold
    pub fn evaluate_accept(
        &self,
        ctx: &ConditionContext<'_>,
        cond: &AcceptCondition,
        param_str: &str,
        params: &[i32],
    ) -> Result<bool, QuestError> {
        match self.accept.get(&cond.kind) {
            Some(handler) => handler.execute(ctx, cond, param_str, params),
            None => {
                warn!("No handler for accept condition {}", cond.kind);
                Ok(false)
            }
        }
    }

    /// Conditions without a handler keep their progress
    pub fn evaluate_content(
        &self,
        ctx: &ConditionContext<'_>,
        cond: &ContentCondition,
        progress: i32,
        param_str: &str,
        params: &[i32],
    ) -> Result<i32, QuestError> {
        match self.content.get(&cond.kind) {
            Some(handler) => handler.execute(ctx, cond, progress, param_str, params),
            None => {
                warn!("No handler for content condition {}", cond.kind);
                Ok(progress)
            }
        }
    }
}

/// Interpret a condition parameter as an id
pub(crate) fn id_param(kind: &'static str, value: i32) -> Result<u32, QuestError> {
    u32::try_from(value).map_err(|_| QuestError::malformed(kind, format!("negative id {}", value)))
}

/// Interpret a condition parameter as a quest variable slot
pub(crate) fn slot_param(kind: &'static str, value: i32) -> Result<usize, QuestError> {
    usize::try_from(value).map_err(|_| QuestError::malformed(kind, format!("negative slot {}", value)))
}
