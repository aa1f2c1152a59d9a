//! Shared fixtures for unit tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::activity::ActivitySchedule;
use crate::db::MemoryQuestStore;
use crate::error::QuestError;
use crate::player::InMemoryPlayer;
use crate::ports::{EventSink, QuestNotifier, QuestStore};
use crate::quest::conditions::{ConditionContext, ConditionRegistry};
use crate::quest::events::QuestEvent;
use crate::quest::orchestrator::{QuestOrchestrator, QuestServices};
use crate::quest::policy::QuestPolicy;
use crate::quest::registry::QuestCatalog;
use crate::quest::state::{MainQuest, SubQuest};
use crate::quest::variables::GlobalVariableStore;

pub const TEST_UID: u32 = 1;

pub fn catalog_of(documents: &[&str]) -> QuestCatalog {
    QuestCatalog::from_toml_documents(documents.iter().copied()).unwrap()
}

/// A main quest with a single talk step, sub quest id `id * 100 + 1`
pub fn single_step_quest(id: u32) -> String {
    format!(
        r#"
        [quest]
        id = {id}
        [[quest.sub_quests]]
        id = {sub}
        order = 1
        [[quest.sub_quests.finish_cond]]
        type = "QUEST_CONTENT_COMPLETE_TALK"
        params = [{id}]
        "#,
        id = id,
        sub = id * 100 + 1
    )
}

#[derive(Default)]
pub struct TestWorld {
    pub player: InMemoryPlayer,
    pub globals: GlobalVariableStore,
    pub activities: ActivitySchedule,
}

impl TestWorld {
    pub fn context<'a>(
        &'a self,
        catalog: &'a QuestCatalog,
        main_quests: &'a BTreeMap<u32, MainQuest>,
        owner: &'a MainQuest,
    ) -> ConditionContext<'a> {
        ConditionContext {
            catalog,
            main_quests,
            owner,
            globals: &self.globals,
            player: &self.player,
            activities: &self.activities,
        }
    }
}

/// Records everything an orchestrator hands to its mailbox
#[derive(Default)]
pub struct LocalEventSink {
    events: Mutex<Vec<QuestEvent>>,
    scheduled: Mutex<Vec<u32>>,
    cancelled: Mutex<Vec<u32>>,
}

impl LocalEventSink {
    pub fn take_events(&self) -> Vec<QuestEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }

    pub fn prechecks(&self) -> Vec<u32> {
        self.scheduled.lock().unwrap().clone()
    }

    pub fn take_prechecks(&self) -> Vec<u32> {
        std::mem::take(&mut *self.scheduled.lock().unwrap())
    }

    pub fn cancelled(&self) -> Vec<u32> {
        self.cancelled.lock().unwrap().clone()
    }
}

impl EventSink for LocalEventSink {
    fn queue(&self, event: QuestEvent) -> Result<(), QuestError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }

    fn schedule_precheck(&self, sub_id: u32) {
        self.scheduled.lock().unwrap().push(sub_id);
    }

    fn cancel_precheck(&self, sub_id: u32) {
        self.cancelled.lock().unwrap().push(sub_id);
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    created: Mutex<Vec<u32>>,
    progress: Mutex<Vec<SubQuest>>,
    finished: Mutex<Vec<u32>>,
}

impl RecordingNotifier {
    pub fn created(&self) -> Vec<u32> {
        self.created.lock().unwrap().clone()
    }

    pub fn progress_count(&self) -> usize {
        self.progress.lock().unwrap().len()
    }

    pub fn finished(&self) -> Vec<u32> {
        self.finished.lock().unwrap().clone()
    }
}

impl QuestNotifier for RecordingNotifier {
    fn notify_main_quest_created(&self, record: &MainQuest) {
        self.created.lock().unwrap().push(record.id);
    }

    fn notify_quest_progress(&self, _uid: u32, quest: &SubQuest) {
        self.progress.lock().unwrap().push(quest.clone());
    }

    fn notify_main_quest_finished(&self, record: &MainQuest) {
        self.finished.lock().unwrap().push(record.id);
    }
}

pub fn build_services(
    documents: &[&str],
    notifier: Arc<dyn QuestNotifier>,
    store: Arc<dyn QuestStore>,
    policy: QuestPolicy,
) -> QuestServices {
    QuestServices {
        catalog: Arc::new(catalog_of(documents)),
        conditions: Arc::new(ConditionRegistry::standard()),
        policy: Arc::new(policy),
        store,
        notifier,
        activities: Arc::new(ActivitySchedule::new()),
    }
}

pub fn services(documents: &[&str], notifier: Arc<dyn QuestNotifier>, policy: QuestPolicy) -> QuestServices {
    build_services(documents, notifier, Arc::new(MemoryQuestStore::new()), policy)
}

/// One orchestrator wired to recording collaborators
pub struct TestHarness {
    pub orchestrator: QuestOrchestrator,
    pub sink: Arc<LocalEventSink>,
    pub notifier: Arc<RecordingNotifier>,
    pub store: Arc<MemoryQuestStore>,
    pub player: Arc<InMemoryPlayer>,
}

impl TestHarness {
    pub fn new(documents: &[&str]) -> Self {
        Self::with_store(documents, Arc::new(MemoryQuestStore::new()))
    }

    pub fn with_store(documents: &[&str], store: Arc<MemoryQuestStore>) -> Self {
        let sink = Arc::new(LocalEventSink::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let player = Arc::new(InMemoryPlayer::default());
        let services = build_services(
            documents,
            notifier.clone(),
            store.clone(),
            QuestPolicy::default(),
        );
        let orchestrator = QuestOrchestrator::new(TEST_UID, services, player.clone(), sink.clone());
        Self { orchestrator, sink, notifier, store, player }
    }

    /// Feed queued follow-up events back until the queue settles
    pub async fn pump(&mut self) {
        for _ in 0..64 {
            let events = self.sink.take_events();
            if events.is_empty() {
                return;
            }
            for event in events {
                let _ = self.orchestrator.trigger_event(&event).await;
            }
        }
        panic!("follow-up events did not settle");
    }
}
