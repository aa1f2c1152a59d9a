//! Quest Orchestrator
//!
//! Owns every main quest record of one player and applies raised events to
//! them. An orchestrator is never shared between tasks; the dispatcher feeds it
//! one envelope at a time, which is what keeps a player's state consistent.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::conditions::{ConditionContext, ConditionRegistry};
use super::definition::{
    ContentCondition, MainQuestDef, QuestExec, QuestExecKind, QuestGroupSuite, SubQuestDef,
};
use super::events::{DispatchClass, EventKind, QuestCond, QuestContent, QuestEvent};
use super::logic::LogicType;
use super::policy::QuestPolicy;
use super::registry::QuestCatalog;
use super::state::{MainQuest, QuestState, QuestTransition, SubQuest};
use super::variables::GlobalVariableStore;
use crate::error::QuestError;
use crate::ports::{ActivityOracle, EventSink, PlayerWorld, QuestNotifier, QuestStore};

/// Immutable collaborators shared by every orchestrator
#[derive(Clone)]
pub struct QuestServices {
    pub catalog: Arc<QuestCatalog>,
    pub conditions: Arc<ConditionRegistry>,
    pub policy: Arc<QuestPolicy>,
    pub store: Arc<dyn QuestStore>,
    pub notifier: Arc<dyn QuestNotifier>,
    pub activities: Arc<dyn ActivityOracle>,
}

/// Mutations that run in a player's serialized stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestCommand {
    LoadFromStorage,
    PlayerBorn,
    Login,
    AddQuest(u32),
    StartMainQuest(u32),
    DeleteMainQuest(u32),
    SetGlobalVariable { id: u32, value: i32 },
    IncrementGlobalVariable { id: u32, delta: i32 },
    DecrementGlobalVariable { id: u32, amount: i32 },
}

/// Which condition list of a sub quest is being evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rule {
    Finish,
    Fail,
}

impl Rule {
    fn conditions(self, def: &SubQuestDef) -> &[ContentCondition] {
        match self {
            Rule::Finish => &def.finish_conds,
            Rule::Fail => &def.fail_conds,
        }
    }

    fn combinator(self, def: &SubQuestDef) -> LogicType {
        match self {
            Rule::Finish => def.finish_comb,
            Rule::Fail => def.fail_comb,
        }
    }

    fn progress(self, quest: &SubQuest) -> &[i32] {
        match self {
            Rule::Finish => &quest.finish_progress,
            Rule::Fail => &quest.fail_progress,
        }
    }

    fn progress_mut(self, quest: &mut SubQuest) -> &mut Vec<i32> {
        match self {
            Rule::Finish => &mut quest.finish_progress,
            Rule::Fail => &mut quest.fail_progress,
        }
    }

    /// Whether stored progress satisfies the rule's combinator
    pub(crate) fn is_met(self, def: &SubQuestDef, quest: &SubQuest) -> bool {
        let progress = self.progress(quest);
        let results: Vec<bool> = self
            .conditions(def)
            .iter()
            .enumerate()
            .map(|(i, cond)| cond.is_satisfied(progress.get(i).copied().unwrap_or(0)))
            .collect();
        self.combinator(def).calculate(&results)
    }
}

/// Progress computed for one sub quest during the read-only phase of a pass
struct ProgressUpdate {
    main_id: u32,
    sub_id: u32,
    progress: Vec<i32>,
    met: bool,
}

pub struct QuestOrchestrator {
    uid: u32,
    services: QuestServices,
    player: Arc<dyn PlayerWorld>,
    sink: Arc<dyn EventSink>,
    main_quests: BTreeMap<u32, MainQuest>,
    globals: GlobalVariableStore,
}

impl QuestOrchestrator {
    pub fn new(
        uid: u32,
        services: QuestServices,
        player: Arc<dyn PlayerWorld>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            uid,
            services,
            player,
            sink,
            main_quests: BTreeMap::new(),
            globals: GlobalVariableStore::new(),
        }
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub(crate) fn player(&self) -> &dyn PlayerWorld {
        self.player.as_ref()
    }

    pub(crate) fn sink(&self) -> &dyn EventSink {
        self.sink.as_ref()
    }

    pub(crate) fn catalog(&self) -> Arc<QuestCatalog> {
        Arc::clone(&self.services.catalog)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn main_quest(&self, main_id: u32) -> Option<&MainQuest> {
        self.main_quests.get(&main_id)
    }

    pub fn main_quests(&self) -> impl Iterator<Item = &MainQuest> {
        self.main_quests.values()
    }

    /// Look up a sub quest record by id
    pub fn quest(&self, sub_id: u32) -> Option<&SubQuest> {
        let def = self.services.catalog.sub_quest(sub_id)?;
        self.main_quests.get(&def.main_id)?.child(sub_id)
    }

    /// Ids of main quests that are not finished
    pub fn active_main_quest_ids(&self) -> Vec<u32> {
        self.main_quests
            .values()
            .filter(|m| !m.is_finished())
            .map(|m| m.id)
            .collect()
    }

    /// Group suites that unfinished quests want loaded in a scene
    pub fn scene_group_suites(&self, scene_id: u32) -> Vec<QuestGroupSuite> {
        let catalog = &self.services.catalog;
        self.main_quests
            .values()
            .filter(|m| !m.is_finished())
            .filter_map(|m| catalog.main_quest(m.id).map(|def| m.group_suites(def)))
            .flatten()
            .filter(|g| g.scene == scene_id)
            .collect()
    }

    // ========================================================================
    // Quest lifecycle
    // ========================================================================

    /// Force a sub quest to in progress, creating its main quest if needed
    pub async fn add_quest(&mut self, sub_id: u32) -> Result<SubQuest, QuestError> {
        let catalog = self.catalog();
        let Some(sub_def) = catalog.sub_quest(sub_id) else {
            warn!("Player {} cannot add unknown sub quest {}", self.uid, sub_id);
            return Err(QuestError::not_found("sub quest", sub_id));
        };
        let main_def = catalog
            .main_quest(sub_def.main_id)
            .ok_or_else(|| QuestError::not_found("main quest", sub_def.main_id))?;

        self.ensure_main_quest(main_def).await;

        let transition = self
            .main_quests
            .get_mut(&main_def.id)
            .and_then(|m| m.child_mut(sub_id))
            .and_then(|q| q.start(sub_def));
        if let Some(transition) = transition {
            self.apply_transition(transition).await;
        }

        self.quest(sub_id)
            .cloned()
            .ok_or_else(|| QuestError::not_found("sub quest", sub_id))
    }

    /// Start the first sub quest of a main quest and of its companions
    pub async fn start_main_quest(&mut self, main_id: u32) -> Result<(), QuestError> {
        let catalog = self.catalog();
        let policy = Arc::clone(&self.services.policy);

        let mut pending = vec![main_id];
        let mut seen = HashSet::new();
        while let Some(id) = pending.pop() {
            if !seen.insert(id) {
                continue;
            }
            let first = catalog.main_quest(id).and_then(MainQuestDef::first_sub_quest);
            match first {
                Some(sub) => {
                    if let Err(e) = self.add_quest(sub.id).await {
                        warn!("Failed to start main quest {} for player {}: {}", id, self.uid, e);
                    }
                }
                None if id == main_id => {
                    warn!("Player {} cannot start unknown main quest {}", self.uid, id);
                    return Err(QuestError::not_found("main quest", id));
                }
                None => warn!("Companion main quest {} of {} is not defined", id, main_id),
            }
            pending.extend(policy.companions_of(id).iter().rev());
        }
        Ok(())
    }

    /// Create and start the starter main quests of a new player
    pub async fn on_player_born(&mut self) {
        let catalog = self.catalog();
        let starters = self.services.policy.starter_main_quests.clone();

        for main_id in &starters {
            match catalog.main_quest(*main_id) {
                Some(def) => {
                    self.ensure_main_quest(def).await;
                }
                None => warn!("Starter main quest {} is not defined", main_id),
            }
        }
        for main_id in starters {
            if catalog.main_quest(main_id).is_some() {
                if let Err(e) = self.start_main_quest(main_id).await {
                    warn!("Failed to start starter quest {} for player {}: {}", main_id, self.uid, e);
                }
            }
        }
        info!("Player {} born with {} main quests", self.uid, self.main_quests.len());
    }

    /// Load saved records. Records that no longer match static data are
    /// discarded whole and removed from the store.
    pub async fn load_from_storage(&mut self) -> Result<(), QuestError> {
        let records = self.services.store.load_main_quests(self.uid).await?;

        for mut record in records {
            match self.reconcile(&mut record) {
                Ok(()) => {
                    self.main_quests.insert(record.id, record);
                }
                Err(e) => {
                    warn!("Discarding main quest {} of player {}: {}", record.id, self.uid, e);
                    if let Err(e) = self.services.store.delete_main_quest(self.uid, record.id).await {
                        error!("Failed to delete main quest {} of player {}: {}", record.id, self.uid, e);
                    }
                }
            }
        }

        let globals = self.services.store.load_global_variables(self.uid).await?;
        self.globals.replace_all(globals);

        info!("Loaded {} main quests for player {}", self.main_quests.len(), self.uid);
        Ok(())
    }

    fn reconcile(&self, record: &mut MainQuest) -> Result<(), QuestError> {
        let Some(def) = self.services.catalog.main_quest(record.id) else {
            return Err(QuestError::InconsistentPersistedState {
                main_quest_id: record.id,
                sub_quest_id: record.child_quests.first().map_or(0, |q| q.sub_id),
            });
        };
        record
            .sync_children(def)
            .map_err(|sub_id| QuestError::InconsistentPersistedState {
                main_quest_id: record.id,
                sub_quest_id: sub_id,
            })?;
        record.owner_uid = self.uid;
        record.refresh_state(def);
        Ok(())
    }

    /// Remove a main quest record and cancel its pending pre-checks
    pub async fn delete_main_quest(&mut self, main_id: u32) -> Result<(), QuestError> {
        let record = self
            .main_quests
            .remove(&main_id)
            .ok_or_else(|| QuestError::not_found("main quest", main_id))?;
        for child in &record.child_quests {
            self.sink.cancel_precheck(child.sub_id);
        }
        self.services.store.delete_main_quest(self.uid, main_id).await?;
        info!("Deleted main quest {} for player {}", main_id, self.uid);
        Ok(())
    }

    pub async fn execute(&mut self, command: QuestCommand) -> Result<(), QuestError> {
        match command {
            QuestCommand::LoadFromStorage => self.load_from_storage().await?,
            QuestCommand::PlayerBorn => self.on_player_born().await,
            QuestCommand::Login => self.on_login().await,
            QuestCommand::AddQuest(sub_id) => {
                self.add_quest(sub_id).await?;
            }
            QuestCommand::StartMainQuest(main_id) => self.start_main_quest(main_id).await?,
            QuestCommand::DeleteMainQuest(main_id) => self.delete_main_quest(main_id).await?,
            QuestCommand::SetGlobalVariable { id, value } => self.set_global_variable(id, value).await,
            QuestCommand::IncrementGlobalVariable { id, delta } => {
                self.increment_global_variable(id, delta).await;
            }
            QuestCommand::DecrementGlobalVariable { id, amount } => {
                self.decrement_global_variable(id, amount).await;
            }
        }
        Ok(())
    }

    async fn ensure_main_quest(&mut self, def: &MainQuestDef) -> bool {
        if self.main_quests.contains_key(&def.id) {
            return false;
        }
        let record = MainQuest::new(self.uid, def);
        self.services.notifier.notify_main_quest_created(&record);
        self.main_quests.insert(def.id, record);
        self.persist(def.id).await;
        debug!("Created main quest {} for player {}", def.id, self.uid);
        true
    }

    // ========================================================================
    // Event dispatch
    // ========================================================================

    /// Apply one raised event to every unfinished main quest
    pub async fn trigger_event(&mut self, event: &QuestEvent) -> Result<(), QuestError> {
        debug!(
            "Trigger event {} {:?} {:?} for player {}",
            event.kind, event.param_str, event.params, self.uid
        );
        match (event.kind, event.kind.dispatch_class()) {
            (EventKind::Accept(cond), Some(DispatchClass::Accept)) => self.try_accept(cond, event).await,
            (EventKind::Content(content), Some(DispatchClass::FailOnly)) => {
                self.try_complete(Rule::Fail, content, event).await;
            }
            (EventKind::Content(content), Some(DispatchClass::FinishOnly)) => {
                self.try_complete(Rule::Finish, content, event).await;
            }
            (EventKind::Content(content), Some(DispatchClass::FinishOrFail)) => {
                self.try_complete(Rule::Fail, content, event).await;
                self.try_complete(Rule::Finish, content, event).await;
            }
            _ => {
                error!("Unhandled quest event kind {} for player {}", event.kind, self.uid);
                return Err(QuestError::UnhandledEventKind(event.kind.to_string()));
            }
        }
        Ok(())
    }

    fn context<'a>(&'a self, catalog: &'a QuestCatalog, owner: &'a MainQuest) -> ConditionContext<'a> {
        ConditionContext {
            catalog,
            main_quests: &self.main_quests,
            owner,
            globals: &self.globals,
            player: self.player.as_ref(),
            activities: self.services.activities.as_ref(),
        }
    }

    async fn try_accept(&mut self, kind: QuestCond, event: &QuestEvent) {
        let catalog = self.catalog();
        let conditions = Arc::clone(&self.services.conditions);

        let mut accepted = Vec::new();
        for main in self.main_quests.values().filter(|m| !m.is_finished()) {
            let ctx = self.context(&catalog, main);
            for child in main.child_quests.iter().filter(|q| q.state == QuestState::NotStarted) {
                let Some(def) = catalog.sub_quest(child.sub_id) else {
                    continue;
                };
                if !def.accepts_on(kind) {
                    continue;
                }
                let results = def
                    .accept_conds
                    .iter()
                    .map(|cond| {
                        let (param_str, params) = if cond.kind == kind {
                            (event.param_str.as_str(), event.params.as_slice())
                        } else {
                            ("", &[][..])
                        };
                        conditions.evaluate_accept(&ctx, cond, param_str, params)
                    })
                    .collect::<Result<Vec<bool>, _>>();
                match results {
                    Ok(results) if def.accept_comb.calculate(&results) => accepted.push(def.id),
                    Ok(_) => {}
                    Err(e) => warn!("Accept check of sub quest {} failed: {}", def.id, e),
                }
            }
        }

        for sub_id in accepted {
            let Some(def) = catalog.sub_quest(sub_id) else {
                continue;
            };
            let transition = self
                .main_quests
                .get_mut(&def.main_id)
                .and_then(|m| m.child_mut(sub_id))
                .and_then(|q| q.start(def));
            if let Some(transition) = transition {
                self.apply_transition(transition).await;
            }
        }
    }

    /// Run one finish or fail pass for a content kind
    async fn try_complete(&mut self, rule: Rule, kind: QuestContent, event: &QuestEvent) {
        let catalog = self.catalog();
        let conditions = Arc::clone(&self.services.conditions);

        let mut updates = Vec::new();
        for main in self.main_quests.values().filter(|m| !m.is_finished()) {
            let ctx = self.context(&catalog, main);
            for child in main.child_quests.iter().filter(|q| q.state == QuestState::InProgress) {
                let Some(def) = catalog.sub_quest(child.sub_id) else {
                    continue;
                };
                let conds = rule.conditions(def);
                if !conds.iter().any(|c| c.kind == kind) {
                    continue;
                }
                let stored = rule.progress(child);
                let progress = conds
                    .iter()
                    .enumerate()
                    .map(|(i, cond)| {
                        let current = stored.get(i).copied().unwrap_or(0);
                        if cond.kind != kind {
                            return Ok(current);
                        }
                        conditions.evaluate_content(&ctx, cond, current, &event.param_str, &event.params)
                    })
                    .collect::<Result<Vec<i32>, _>>();
                match progress {
                    Ok(progress) => {
                        let results: Vec<bool> = conds
                            .iter()
                            .zip(&progress)
                            .map(|(cond, p)| cond.is_satisfied(*p))
                            .collect();
                        updates.push(ProgressUpdate {
                            main_id: main.id,
                            sub_id: def.id,
                            met: rule.combinator(def).calculate(&results),
                            progress,
                        });
                    }
                    Err(e) => warn!("{:?} check of sub quest {} failed: {}", rule, def.id, e),
                }
            }
        }

        for update in updates {
            let Some(child) = self
                .main_quests
                .get_mut(&update.main_id)
                .and_then(|m| m.child_mut(update.sub_id))
            else {
                continue;
            };
            let changed = *rule.progress_mut(child) != update.progress;
            *rule.progress_mut(child) = update.progress;

            let transition = match (update.met, rule) {
                (true, Rule::Finish) => child.finish(),
                (true, Rule::Fail) => child.fail(),
                (false, _) => None,
            };

            match transition {
                Some(transition) => self.apply_transition(transition).await,
                None if changed => {
                    let snapshot = child.clone();
                    self.services.notifier.notify_quest_progress(self.uid, &snapshot);
                    self.persist(update.main_id).await;
                }
                None => {}
            }
        }
    }

    /// Finish or fail an in-progress sub quest without evaluating conditions
    pub(crate) fn close_sub_quest(&mut self, main_id: u32, sub_id: u32, rule: Rule) -> Option<QuestTransition> {
        let child = self.main_quests.get_mut(&main_id)?.child_mut(sub_id)?;
        match rule {
            Rule::Finish => child.finish(),
            Rule::Fail => child.fail(),
        }
    }

    #[cfg(test)]
    pub(crate) fn set_progress_for_test(&mut self, sub_id: u32, progress: Vec<i32>) {
        let main_id = self.services.catalog.sub_quest(sub_id).map(|d| d.main_id);
        if let Some(child) = main_id
            .and_then(|id| self.main_quests.get_mut(&id))
            .and_then(|m| m.child_mut(sub_id))
        {
            child.finish_progress = progress;
        }
    }

    /// Apply a committed sub quest state change to everything around it
    pub(crate) async fn apply_transition(&mut self, transition: QuestTransition) {
        let catalog = self.catalog();
        let (Some(main_def), Some(sub_def)) = (
            catalog.main_quest(transition.main_quest_id),
            catalog.sub_quest(transition.sub_quest_id),
        ) else {
            return;
        };

        info!(
            "Player {} quest {} {} -> {}",
            self.uid,
            transition.sub_quest_id,
            transition.from.as_str(),
            transition.to.as_str()
        );

        let execs: &[QuestExec] = match transition.to {
            QuestState::InProgress => &sub_def.begin_exec,
            QuestState::Finished => &sub_def.finish_exec,
            QuestState::Failed => &sub_def.fail_exec,
            QuestState::NotStarted => &[],
        };
        self.run_execs(transition.main_quest_id, execs).await;

        let Some(main) = self.main_quests.get_mut(&transition.main_quest_id) else {
            return;
        };
        let main_finished = main.refresh_state(main_def);
        if let Some(child) = main.child(transition.sub_quest_id) {
            self.services.notifier.notify_quest_progress(self.uid, child);
        }
        if main_finished {
            info!("Player {} finished main quest {}", self.uid, main.id);
            self.services.notifier.notify_main_quest_finished(main);
        }
        self.persist(transition.main_quest_id).await;

        if transition.to == QuestState::InProgress {
            self.sink.schedule_precheck(transition.sub_quest_id);
        } else if transition.to.is_terminal() {
            self.sink.cancel_precheck(transition.sub_quest_id);
        }

        let Ok(sub_param) = i32::try_from(transition.sub_quest_id) else {
            warn!("Sub quest id {} does not fit a quest param, skipping state events", transition.sub_quest_id);
            return;
        };
        let state_params = [sub_param, transition.to.code()];
        self.follow_up(QuestEvent::accept(QuestCond::StateEqual, "", &state_params));
        self.follow_up(QuestEvent::accept(QuestCond::StateNotEqual, "", &state_params));
        self.follow_up(QuestEvent::content(QuestContent::QuestStateEqual, "", &state_params));
    }

    async fn run_execs(&mut self, main_id: u32, execs: &[QuestExec]) {
        for exec in execs {
            match exec.kind {
                QuestExecKind::SetQuestVar | QuestExecKind::IncQuestVar | QuestExecKind::DecQuestVar => {
                    let Ok(slot) = usize::try_from(exec.param(0)) else {
                        warn!("Quest var exec with negative slot {} in main quest {}", exec.param(0), main_id);
                        continue;
                    };
                    let Some(main) = self.main_quests.get_mut(&main_id) else {
                        continue;
                    };
                    let value = match exec.kind {
                        QuestExecKind::SetQuestVar => exec.param(1),
                        QuestExecKind::IncQuestVar => main.quest_var(slot).saturating_add(exec.param(1)),
                        _ => main.quest_var(slot).saturating_sub(exec.param(1)),
                    };
                    if !main.set_quest_var(slot, value) {
                        warn!("Quest var slot {} out of range in main quest {}", slot, main_id);
                        continue;
                    }
                    self.queue_quest_var_events(slot, value);
                }
                QuestExecKind::SetGlobalVar | QuestExecKind::IncGlobalVar | QuestExecKind::DecGlobalVar => {
                    let Ok(id) = u32::try_from(exec.param(0)) else {
                        warn!("Global var exec with negative id {} in main quest {}", exec.param(0), main_id);
                        continue;
                    };
                    match exec.kind {
                        QuestExecKind::SetGlobalVar => self.set_global_variable(id, exec.param(1)).await,
                        QuestExecKind::IncGlobalVar => {
                            self.increment_global_variable(id, exec.param(1)).await;
                        }
                        _ => {
                            self.decrement_global_variable(id, exec.param(1)).await;
                        }
                    }
                }
                QuestExecKind::AddQuestProgress => {
                    let params = [exec.param(0), exec.params.get(1).copied().unwrap_or(1)];
                    self.follow_up(QuestEvent::content(QuestContent::AddQuestProgress, "", &params));
                }
            }
        }
    }

    fn queue_quest_var_events(&self, slot: usize, value: i32) {
        let Ok(slot) = i32::try_from(slot) else {
            warn!("Quest var slot {} does not fit a quest param", slot);
            return;
        };
        let params = [slot, value];
        for cond in [QuestCond::QuestVarEqual, QuestCond::QuestVarGreater, QuestCond::QuestVarLess] {
            self.follow_up(QuestEvent::accept(cond, "", &params));
        }
        for content in [QuestContent::QuestVarEqual, QuestContent::QuestVarGreater, QuestContent::QuestVarLess] {
            self.follow_up(QuestEvent::content(content, "", &params));
        }
    }

    pub(crate) fn follow_up(&self, event: QuestEvent) {
        if let Err(e) = self.sink.queue(event) {
            error!("Dropped follow-up quest event for player {}: {}", self.uid, e);
        }
    }

    async fn persist(&self, main_id: u32) {
        let Some(record) = self.main_quests.get(&main_id) else {
            return;
        };
        if let Err(e) = self.services.store.save_main_quest(record).await {
            error!("Failed to save main quest {} for player {}: {}", main_id, self.uid, e);
        }
    }

    // ========================================================================
    // Global variables
    // ========================================================================

    pub fn get_global_variable(&self, id: u32) -> i32 {
        self.globals.get(id)
    }

    pub fn global_variables(&self) -> &GlobalVariableStore {
        &self.globals
    }

    pub async fn set_global_variable(&mut self, id: u32, value: i32) {
        self.globals.set(id, value);
        self.on_global_variable_changed(id, value).await;
    }

    pub async fn increment_global_variable(&mut self, id: u32, delta: i32) -> i32 {
        let value = self.globals.increment(id, delta);
        self.on_global_variable_changed(id, value).await;
        value
    }

    /// `amount` is subtracted, so it is normally positive
    pub async fn decrement_global_variable(&mut self, id: u32, amount: i32) -> i32 {
        let value = self.globals.decrement(id, amount);
        self.on_global_variable_changed(id, value).await;
        value
    }

    async fn on_global_variable_changed(&self, id: u32, value: i32) {
        debug!("Player {} global var {} = {}", self.uid, id, value);
        let snapshot = self.globals.snapshot();
        if let Err(e) = self.services.store.save_global_variables(self.uid, &snapshot).await {
            error!("Failed to save global variables for player {}: {}", self.uid, e);
        }
        let Ok(id) = i32::try_from(id) else {
            warn!("Global var id {} does not fit a quest param, skipping events", id);
            return;
        };
        let params = [id, value];
        for cond in [
            QuestCond::QuestGlobalVarEqual,
            QuestCond::QuestGlobalVarGreater,
            QuestCond::QuestGlobalVarLess,
        ] {
            self.follow_up(QuestEvent::accept(cond, "", &params));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryQuestStore;
    use crate::error::StoreError;
    use crate::ports::{MockQuestNotifier, MockQuestStore};
    use crate::testing::{self, LocalEventSink, TestHarness};

    const MAIN_303: &str = r#"
        [quest]
        id = 303
        [[quest.sub_quests]]
        id = 30301
        order = 1
        [[quest.sub_quests.finish_cond]]
        type = "QUEST_CONTENT_COMPLETE_TALK"
        params = [3001]
        [[quest.sub_quests.finish_exec]]
        type = "QUEST_EXEC_SET_QUEST_VAR"
        params = [0, 1]
        [[quest.sub_quests]]
        id = 30302
        order = 2
        [[quest.sub_quests.accept_cond]]
        type = "QUEST_COND_STATE_EQUAL"
        params = [30301, 3]
        [[quest.sub_quests.finish_cond]]
        type = "QUEST_CONTENT_KILL_MONSTER"
        params = [20010]
        count = 2
        [[quest.sub_quests.fail_cond]]
        type = "QUEST_CONTENT_KILL_MONSTER"
        params = [20010]
        count = 2
    "#;

    const MAIN_500: &str = r#"
        [quest]
        id = 500
        [[quest.sub_quests]]
        id = 50002
        order = 2
        [[quest.sub_quests]]
        id = 50001
        order = 1
        [[quest.sub_quests.finish_cond]]
        type = "QUEST_CONTENT_OBTAIN_ITEM"
        params = [101]
        count = 5
    "#;

    #[tokio::test]
    async fn test_add_quest_creates_main_and_schedules_precheck() {
        let mut h = TestHarness::new(&[MAIN_303]);
        let quest = h.orchestrator.add_quest(30301).await.unwrap();
        assert_eq!(quest.state, QuestState::InProgress);
        assert_eq!(h.notifier.created(), vec![303]);
        assert_eq!(h.sink.prechecks(), vec![30301]);
        assert!(h.store.record(h.orchestrator.uid(), 303).is_some());

        assert!(matches!(
            h.orchestrator.add_quest(99).await,
            Err(QuestError::NotFound { id: 99, .. })
        ));
    }

    #[tokio::test]
    async fn test_finish_runs_execs_and_queues_follow_ups() {
        let mut h = TestHarness::new(&[MAIN_303]);
        h.orchestrator.add_quest(30301).await.unwrap();
        h.sink.take_events();

        let talk = QuestEvent::content(QuestContent::CompleteTalk, "", &[3001]);
        h.orchestrator.trigger_event(&talk).await.unwrap();
        assert_eq!(h.orchestrator.quest(30301).unwrap().state, QuestState::Finished);
        assert_eq!(h.orchestrator.main_quest(303).unwrap().quest_var(0), 1);

        // Feeding the follow-ups back starts the next step through its accept condition.
        h.pump().await;
        assert_eq!(h.orchestrator.quest(30302).unwrap().state, QuestState::InProgress);
    }

    #[tokio::test]
    async fn test_redelivered_finish_event_is_a_no_op() {
        let mut h = TestHarness::new(&[MAIN_303]);
        h.orchestrator.add_quest(30301).await.unwrap();
        let talk = QuestEvent::content(QuestContent::CompleteTalk, "", &[3001]);
        h.orchestrator.trigger_event(&talk).await.unwrap();
        let before = h.orchestrator.main_quest(303).cloned();
        let progress_notes = h.notifier.progress_count();

        h.orchestrator.trigger_event(&talk).await.unwrap();
        assert_eq!(h.orchestrator.main_quest(303).cloned(), before);
        assert_eq!(h.notifier.progress_count(), progress_notes);
    }

    #[tokio::test]
    async fn test_fail_wins_when_both_rules_match() {
        let mut h = TestHarness::new(&[MAIN_303]);
        h.orchestrator.add_quest(30302).await.unwrap();

        let kill = QuestEvent::content(QuestContent::KillMonster, "", &[20010]);
        h.orchestrator.trigger_event(&kill).await.unwrap();
        assert_eq!(h.orchestrator.quest(30302).unwrap().state, QuestState::InProgress);
        assert_eq!(h.orchestrator.quest(30302).unwrap().fail_progress, vec![1]);

        h.orchestrator.trigger_event(&kill).await.unwrap();
        assert_eq!(h.orchestrator.quest(30302).unwrap().state, QuestState::Failed);
        assert!(h.sink.cancelled().contains(&30302));
    }

    #[tokio::test]
    async fn test_unhandled_kind_is_rejected() {
        let mut h = TestHarness::new(&[MAIN_303]);
        let event = QuestEvent::content(QuestContent::WorktopSelect, "", &[1]);
        assert!(matches!(
            h.orchestrator.trigger_event(&event).await,
            Err(QuestError::UnhandledEventKind(_))
        ));
        let event = QuestEvent::accept(QuestCond::PlayerChooseMale, "", &[]);
        assert!(h.orchestrator.trigger_event(&event).await.is_err());
    }

    #[tokio::test]
    async fn test_starter_set_creates_each_main_quest_once() {
        let mut notifier = MockQuestNotifier::new();
        notifier
            .expect_notify_main_quest_created()
            .times(2)
            .return_const(());
        notifier.expect_notify_quest_progress().return_const(());
        notifier.expect_notify_main_quest_finished().never();

        let policy = QuestPolicy::new(vec![303, 500], Default::default());
        let services = testing::services(&[MAIN_303, MAIN_500], Arc::new(notifier), policy);
        let mut orchestrator = QuestOrchestrator::new(
            1,
            services,
            Arc::new(crate::player::InMemoryPlayer::default()),
            Arc::new(LocalEventSink::default()),
        );

        orchestrator.on_player_born().await;

        let ids: Vec<u32> = orchestrator.main_quests().map(|m| m.id).collect();
        assert_eq!(ids, vec![303, 500]);
        for main in orchestrator.main_quests() {
            let started: Vec<u32> = main
                .child_quests
                .iter()
                .filter(|q| q.state != QuestState::NotStarted)
                .map(|q| q.sub_id)
                .collect();
            assert_eq!(started.len(), 1);
        }
        assert_eq!(orchestrator.quest(50001).unwrap().state, QuestState::InProgress);
        assert_eq!(orchestrator.quest(30301).unwrap().state, QuestState::InProgress);
    }

    #[tokio::test]
    async fn test_companions_start_together() {
        let docs: Vec<String> = [355, 361, 418, 423, 20509]
            .iter()
            .map(|id| testing::single_step_quest(*id))
            .collect();
        let docs: Vec<&str> = docs.iter().map(String::as_str).collect();
        let mut h = TestHarness::new(&docs);

        h.orchestrator.start_main_quest(355).await.unwrap();
        let ids: Vec<u32> = h.orchestrator.main_quests().map(|m| m.id).collect();
        assert_eq!(ids, vec![355, 361, 418, 423, 20509]);

        h.orchestrator.start_main_quest(361).await.unwrap();
        assert_eq!(h.orchestrator.main_quests().count(), 5);
        assert!(h.orchestrator.start_main_quest(777).await.is_err());
    }

    #[tokio::test]
    async fn test_load_discards_inconsistent_main_quest() {
        let store = Arc::new(MemoryQuestStore::new());
        let h = TestHarness::with_store(&[MAIN_303, MAIN_500], Arc::clone(&store));
        let catalog = h.orchestrator.catalog();

        let good = MainQuest::new(1, catalog.main_quest(303).unwrap());
        let mut stale = MainQuest::new(1, catalog.main_quest(500).unwrap());
        stale.child_quests[0].sub_id = 50099;
        store.insert_record(good);
        store.insert_record(stale);
        store.insert_globals(1, [(7, 3)].into());

        let mut h = TestHarness::with_store(&[MAIN_303, MAIN_500], Arc::clone(&store));
        h.orchestrator.load_from_storage().await.unwrap();

        let ids: Vec<u32> = h.orchestrator.main_quests().map(|m| m.id).collect();
        assert_eq!(ids, vec![303]);
        assert!(h.orchestrator.quest(50001).is_none());
        assert!(store.record(1, 500).is_none());
        assert_eq!(h.orchestrator.get_global_variable(7), 3);
    }

    #[tokio::test]
    async fn test_global_variables_persist_and_raise_events() {
        let mut h = TestHarness::new(&[MAIN_303]);
        assert_eq!(h.orchestrator.get_global_variable(7), 0);
        assert_eq!(h.orchestrator.increment_global_variable(7, 3).await, 3);
        assert_eq!(h.orchestrator.increment_global_variable(7, 4).await, 7);
        assert_eq!(h.orchestrator.decrement_global_variable(7, 2).await, 5);
        assert_eq!(h.store.globals(1).get(&7), Some(&5));

        let kinds: Vec<EventKind> = h.sink.take_events().iter().map(|e| e.kind).collect();
        assert_eq!(kinds.len(), 9);
        assert!(kinds.contains(&EventKind::Accept(QuestCond::QuestGlobalVarGreater)));
    }

    #[tokio::test]
    async fn test_store_failures_do_not_abort_transitions() {
        let mut store = MockQuestStore::new();
        store
            .expect_save_main_quest()
            .returning(|_| Err(StoreError::Serialization(serde_json::from_str::<i32>("x").unwrap_err())));
        let services = QuestServices {
            store: Arc::new(store),
            ..testing::services(&[MAIN_303], Arc::new(testing::RecordingNotifier::default()), QuestPolicy::default())
        };
        let sink = Arc::new(LocalEventSink::default());
        let mut orchestrator =
            QuestOrchestrator::new(1, services, Arc::new(crate::player::InMemoryPlayer::default()), sink);

        orchestrator.add_quest(30301).await.unwrap();
        let talk = QuestEvent::content(QuestContent::CompleteTalk, "", &[3001]);
        orchestrator.trigger_event(&talk).await.unwrap();
        assert_eq!(orchestrator.quest(30301).unwrap().state, QuestState::Finished);
    }

    #[tokio::test]
    async fn test_ids_beyond_param_range_raise_no_events() {
        const WIDE: &str = r#"
            [quest]
            id = 3000000000
            [[quest.sub_quests]]
            id = 3000000001
            order = 1
            [[quest.sub_quests.finish_cond]]
            type = "QUEST_CONTENT_COMPLETE_TALK"
            params = [1]
        "#;
        let mut h = TestHarness::new(&[WIDE]);
        h.orchestrator.add_quest(3_000_000_001).await.unwrap();
        assert_eq!(h.orchestrator.quest(3_000_000_001).unwrap().state, QuestState::InProgress);
        assert!(h.sink.take_events().is_empty());

        assert_eq!(h.orchestrator.increment_global_variable(3_000_000_000, 2).await, 2);
        assert!(h.sink.take_events().is_empty());
        assert_eq!(h.store.globals(1).get(&3_000_000_000), Some(&2));
    }

    #[tokio::test]
    async fn test_delete_cancels_prechecks() {
        let mut h = TestHarness::new(&[MAIN_500]);
        h.orchestrator.add_quest(50001).await.unwrap();
        h.orchestrator.delete_main_quest(500).await.unwrap();
        assert!(h.sink.cancelled().contains(&50001));
        assert!(h.orchestrator.main_quest(500).is_none());
        assert!(h.store.record(1, 500).is_none());
    }
}
