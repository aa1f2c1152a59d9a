//! Event Dispatcher
//!
//! Every player owns a mailbox. Mailboxes are multiplexed onto a fixed pool of
//! worker tasks through a shared ready queue. A mailbox sits in the ready
//! queue at most once, so a player's envelopes are applied one after another
//! while different players progress in parallel.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::config::DispatchConfig;
use crate::error::QuestError;
use crate::ports::{EventSink, PlayerWorld};
use crate::quest::events::{QuestCond, QuestContent, QuestEvent};
use crate::quest::orchestrator::{QuestCommand, QuestOrchestrator, QuestServices};

type CommandReply = oneshot::Sender<Result<(), QuestError>>;

enum Envelope {
    Event(QuestEvent),
    Precheck(u32),
    Command(QuestCommand, Option<CommandReply>),
}

struct Shared {
    ready_tx: mpsc::UnboundedSender<Arc<PlayerSlot>>,
    /// Envelopes queued or being applied, over all players
    backlog: AtomicUsize,
    pending_timers: AtomicUsize,
    capacity: usize,
    drain_batch: usize,
    precheck_delay: Duration,
    idle: Notify,
    /// Unregistered slots whose queued envelopes have not all been applied
    draining: DashMap<u32, Arc<PlayerSlot>>,
}

impl Shared {
    fn reserve(&self) -> Result<(), QuestError> {
        self.backlog
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < self.capacity).then_some(n + 1))
            .map(|_| ())
            .map_err(|_| QuestError::BacklogFull { capacity: self.capacity })
    }

    fn release(&self) {
        if self.backlog.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.notify_if_idle();
        }
    }

    fn timer_done(&self) {
        if self.pending_timers.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.notify_if_idle();
        }
    }

    fn is_idle(&self) -> bool {
        self.backlog.load(Ordering::Acquire) == 0 && self.pending_timers.load(Ordering::Acquire) == 0
    }

    fn notify_if_idle(&self) {
        if self.is_idle() {
            self.idle.notify_waiters();
        }
    }
}

#[derive(Default)]
struct Mailbox {
    queue: VecDeque<Envelope>,
    /// Set while the mailbox is in the ready queue or being drained
    scheduled: bool,
    closed: bool,
    prechecks: HashMap<u32, (u64, AbortHandle)>,
    next_generation: u64,
}

struct PlayerSlot {
    uid: u32,
    mailbox: Mutex<Mailbox>,
    orchestrator: tokio::sync::Mutex<QuestOrchestrator>,
    /// Signalled whenever the mailbox leaves the ready queue
    drained: Notify,
}

impl PlayerSlot {
    fn mailbox(&self) -> MutexGuard<'_, Mailbox> {
        self.mailbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(self: &Arc<Self>, shared: &Shared, envelope: Envelope) -> Result<(), QuestError> {
        if let Err(e) = shared.reserve() {
            error!("Quest backlog full, rejecting envelope for player {}", self.uid);
            return Err(e);
        }

        let mut mailbox = self.mailbox();
        if mailbox.closed {
            drop(mailbox);
            shared.release();
            return Err(QuestError::PlayerNotRegistered(self.uid));
        }
        mailbox.queue.push_back(envelope);
        let wake = !mailbox.scheduled;
        mailbox.scheduled = true;
        drop(mailbox);

        if wake && shared.ready_tx.send(Arc::clone(self)).is_err() {
            // Workers are gone; nothing will drain this envelope.
            let mut mailbox = self.mailbox();
            let dropped = mailbox.queue.len();
            mailbox.queue.clear();
            self.go_idle(shared, mailbox);
            for _ in 0..dropped {
                shared.release();
            }
            return Err(QuestError::PlayerNotRegistered(self.uid));
        }
        Ok(())
    }

    /// Apply up to one batch of envelopes, then yield or go idle
    async fn drain(self: Arc<Self>, shared: &Shared) {
        let mut orchestrator = self.orchestrator.lock().await;

        for _ in 0..shared.drain_batch {
            let envelope = {
                let mut mailbox = self.mailbox();
                match mailbox.queue.pop_front() {
                    Some(envelope) => envelope,
                    None => {
                        self.go_idle(shared, mailbox);
                        return;
                    }
                }
            };
            apply(&mut orchestrator, envelope).await;
            shared.release();
        }

        let more = {
            let mailbox = self.mailbox();
            if mailbox.queue.is_empty() {
                self.go_idle(shared, mailbox);
                false
            } else {
                true
            }
        };
        drop(orchestrator);
        if more && shared.ready_tx.send(Arc::clone(&self)).is_err() {
            warn!("Quest workers stopped while player {} had queued envelopes", self.uid);
        }
    }

    /// Leave the ready queue. A closed mailbox that goes idle has applied its
    /// last envelope, since pushes to it are rejected.
    fn go_idle(self: &Arc<Self>, shared: &Shared, mut mailbox: MutexGuard<'_, Mailbox>) {
        mailbox.scheduled = false;
        let closed = mailbox.closed;
        drop(mailbox);
        if closed && shared.draining.remove_if(&self.uid, |_, slot| Arc::ptr_eq(slot, self)).is_some() {
            debug!("Player {} finished draining", self.uid);
        }
        self.drained.notify_waiters();
    }

    /// Must be called after the slot is listed in `Shared::draining`
    fn close(self: &Arc<Self>, shared: &Shared) {
        let mut mailbox = self.mailbox();
        mailbox.closed = true;
        let busy = mailbox.scheduled;
        let timers: Vec<_> = mailbox.prechecks.drain().collect();
        drop(mailbox);
        for (_, (_, handle)) in timers {
            handle.abort();
            shared.timer_done();
        }
        if !busy {
            shared.draining.remove_if(&self.uid, |_, slot| Arc::ptr_eq(slot, self));
        }
    }
}

async fn apply(orchestrator: &mut QuestOrchestrator, envelope: Envelope) {
    match envelope {
        Envelope::Event(event) => {
            // Unhandled kinds are already logged by the orchestrator.
            let _ = orchestrator.trigger_event(&event).await;
        }
        Envelope::Precheck(sub_id) => orchestrator.check_quest_already_fulfilled(sub_id),
        Envelope::Command(command, reply) => {
            let result = orchestrator.execute(command.clone()).await;
            if let Err(e) = &result {
                warn!("Quest command {:?} failed for player {}: {}", command, orchestrator.uid(), e);
            }
            if let Some(reply) = reply {
                let _ = reply.send(result);
            }
        }
    }
}

/// The orchestrator's handle back into its own mailbox
struct MailboxSink {
    uid: u32,
    slot: Weak<PlayerSlot>,
    shared: Arc<Shared>,
}

impl EventSink for MailboxSink {
    fn queue(&self, event: QuestEvent) -> Result<(), QuestError> {
        let slot = self.slot.upgrade().ok_or(QuestError::PlayerNotRegistered(self.uid))?;
        slot.push(&self.shared, Envelope::Event(event))
    }

    fn schedule_precheck(&self, sub_id: u32) {
        let Some(slot) = self.slot.upgrade() else {
            return;
        };
        let mut mailbox = slot.mailbox();
        if mailbox.closed {
            return;
        }
        let generation = mailbox.next_generation;
        mailbox.next_generation += 1;

        let weak = Weak::clone(&self.slot);
        let shared = Arc::clone(&self.shared);
        let delay = self.shared.precheck_delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(slot) = weak.upgrade() else {
                return;
            };
            let mut mailbox = slot.mailbox();
            let current = mailbox.prechecks.get(&sub_id).is_some_and(|(g, _)| *g == generation);
            if !current {
                return;
            }
            mailbox.prechecks.remove(&sub_id);
            drop(mailbox);
            if let Err(e) = slot.push(&shared, Envelope::Precheck(sub_id)) {
                error!("Dropped pre-check of sub quest {} for player {}: {}", sub_id, slot.uid, e);
            }
            shared.timer_done();
        });

        self.shared.pending_timers.fetch_add(1, Ordering::AcqRel);
        if let Some((_, previous)) = mailbox.prechecks.insert(sub_id, (generation, task.abort_handle())) {
            previous.abort();
            self.shared.timer_done();
        }
    }

    fn cancel_precheck(&self, sub_id: u32) {
        let Some(slot) = self.slot.upgrade() else {
            return;
        };
        let removed = slot.mailbox().prechecks.remove(&sub_id);
        if let Some((_, handle)) = removed {
            handle.abort();
            debug!("Cancelled pre-check of sub quest {} for player {}", sub_id, self.uid);
            self.shared.timer_done();
        }
    }
}

/// Routes raised events and commands to per-player mailboxes
pub struct QuestDispatcher {
    services: QuestServices,
    shared: Arc<Shared>,
    players: DashMap<u32, Arc<PlayerSlot>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl QuestDispatcher {
    /// Spawn the worker pool. Must be called inside a tokio runtime.
    pub fn start(services: QuestServices, config: &DispatchConfig) -> Self {
        let (ready_tx, ready_rx) = mpsc::unbounded_channel::<Arc<PlayerSlot>>();
        let ready_rx = Arc::new(tokio::sync::Mutex::new(ready_rx));
        let shared = Arc::new(Shared {
            ready_tx,
            backlog: AtomicUsize::new(0),
            pending_timers: AtomicUsize::new(0),
            capacity: config.backlog_capacity.max(1),
            drain_batch: config.drain_batch.max(1),
            precheck_delay: config.precheck_delay(),
            idle: Notify::new(),
            draining: DashMap::new(),
        });

        let worker_count = config.worker_count.max(1);
        let workers = (0..worker_count)
            .map(|_| {
                let shared = Arc::clone(&shared);
                let ready_rx = Arc::clone(&ready_rx);
                tokio::spawn(async move {
                    loop {
                        let next = ready_rx.lock().await.recv().await;
                        let Some(slot) = next else {
                            break;
                        };
                        slot.drain(&shared).await;
                    }
                })
            })
            .collect();

        info!(
            "Quest dispatcher started with {} workers, backlog {}",
            worker_count, shared.capacity
        );
        Self {
            services,
            shared,
            players: DashMap::new(),
            workers: Mutex::new(workers),
        }
    }

    pub fn services(&self) -> &QuestServices {
        &self.services
    }

    /// Create the player's orchestrator and mailbox. Fails with
    /// `PlayerDraining` while envelopes of an earlier session are still queued;
    /// see [`QuestDispatcher::wait_drained`].
    pub fn register_player(&self, uid: u32, player: Arc<dyn PlayerWorld>) -> Result<(), QuestError> {
        if self.shared.draining.contains_key(&uid) {
            return Err(QuestError::PlayerDraining(uid));
        }
        match self.players.entry(uid) {
            Entry::Occupied(_) => Err(QuestError::PlayerAlreadyRegistered(uid)),
            Entry::Vacant(entry) => {
                let services = self.services.clone();
                let shared = Arc::clone(&self.shared);
                let slot = Arc::new_cyclic(|weak: &Weak<PlayerSlot>| {
                    let sink = Arc::new(MailboxSink { uid, slot: Weak::clone(weak), shared });
                    PlayerSlot {
                        uid,
                        mailbox: Mutex::new(Mailbox::default()),
                        orchestrator: tokio::sync::Mutex::new(QuestOrchestrator::new(uid, services, player, sink)),
                        drained: Notify::new(),
                    }
                });
                entry.insert(slot);
                debug!("Registered quest mailbox for player {}", uid);
                Ok(())
            }
        }
    }

    /// Stop accepting envelopes for the player and cancel pending pre-checks.
    /// Envelopes already queued still run, and the player cannot register
    /// again until they have.
    pub fn unregister_player(&self, uid: u32) -> Result<(), QuestError> {
        let (_, slot) = self.players.remove(&uid).ok_or(QuestError::PlayerNotRegistered(uid))?;
        self.shared.draining.insert(uid, Arc::clone(&slot));
        slot.close(&self.shared);
        debug!("Unregistered quest mailbox for player {}", uid);
        Ok(())
    }

    /// Resolves once every envelope of the player's previous session is applied
    pub async fn wait_drained(&self, uid: u32) {
        let Some(slot) = self.shared.draining.get(&uid).map(|s| Arc::clone(s.value())) else {
            return;
        };
        loop {
            let notified = slot.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let still_draining = self
                .shared
                .draining
                .get(&uid)
                .is_some_and(|s| Arc::ptr_eq(s.value(), &slot));
            if !still_draining {
                return;
            }
            notified.await;
        }
    }

    pub fn is_registered(&self, uid: u32) -> bool {
        self.players.contains_key(&uid)
    }

    fn slot(&self, uid: u32) -> Result<Arc<PlayerSlot>, QuestError> {
        self.players
            .get(&uid)
            .map(|s| Arc::clone(s.value()))
            .ok_or(QuestError::PlayerNotRegistered(uid))
    }

    pub fn queue_event(&self, uid: u32, event: QuestEvent) -> Result<(), QuestError> {
        if event.kind.dispatch_class().is_none() {
            error!("Unhandled quest event kind {} raised for player {}", event.kind, uid);
            return Err(QuestError::UnhandledEventKind(event.kind.to_string()));
        }
        self.slot(uid)?.push(&self.shared, Envelope::Event(event))
    }

    pub fn raise_acceptance_event(
        &self,
        uid: u32,
        cond: QuestCond,
        param_str: &str,
        params: &[i32],
    ) -> Result<(), QuestError> {
        self.queue_event(uid, QuestEvent::accept(cond, param_str, params))
    }

    pub fn raise_content_event(
        &self,
        uid: u32,
        content: QuestContent,
        param_str: &str,
        params: &[i32],
    ) -> Result<(), QuestError> {
        self.queue_event(uid, QuestEvent::content(content, param_str, params))
    }

    /// Queue a command without waiting for its outcome
    pub fn submit(&self, uid: u32, command: QuestCommand) -> Result<(), QuestError> {
        self.slot(uid)?.push(&self.shared, Envelope::Command(command, None))
    }

    /// Queue a command and wait until the player's stream has applied it
    pub async fn execute(&self, uid: u32, command: QuestCommand) -> Result<(), QuestError> {
        let (tx, rx) = oneshot::channel();
        self.slot(uid)?.push(&self.shared, Envelope::Command(command, Some(tx)))?;
        rx.await.map_err(|_| QuestError::PlayerNotRegistered(uid))?
    }

    /// Read a player's quest state between envelopes
    pub async fn with_player<R>(&self, uid: u32, f: impl FnOnce(&QuestOrchestrator) -> R) -> Result<R, QuestError> {
        let slot = self.slot(uid)?;
        let orchestrator = slot.orchestrator.lock().await;
        Ok(f(&orchestrator))
    }

    /// Envelopes queued or in flight
    pub fn backlog(&self) -> usize {
        self.shared.backlog.load(Ordering::Acquire)
    }

    /// Resolves once no envelope is queued or in flight and no pre-check is pending
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.shared.is_idle() {
                return;
            }
            notified.await;
        }
    }

    pub async fn shutdown(&self) {
        self.wait_idle().await;
        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        for worker in workers {
            worker.abort();
        }
        info!("Quest dispatcher stopped");
    }
}

impl Drop for QuestDispatcher {
    fn drop(&mut self) {
        let workers = self.workers.get_mut().unwrap_or_else(PoisonError::into_inner);
        for worker in workers.drain(..) {
            worker.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryQuestStore;
    use crate::player::InMemoryPlayer;
    use crate::quest::policy::QuestPolicy;
    use crate::quest::state::QuestState;
    use crate::testing::{self, RecordingNotifier};

    const MAIN: &str = r#"
        [quest]
        id = 500
        [[quest.sub_quests]]
        id = 50001
        order = 1
        [[quest.sub_quests.finish_cond]]
        type = "QUEST_CONTENT_OBTAIN_ITEM"
        params = [101]
        count = 5
    "#;

    fn dispatcher(config: DispatchConfig) -> QuestDispatcher {
        let services = testing::services(&[MAIN], Arc::new(RecordingNotifier::default()), QuestPolicy::default());
        QuestDispatcher::start(services, &config)
    }

    fn fast() -> DispatchConfig {
        DispatchConfig { precheck_delay_ms: 10, backlog_capacity: 10_000, ..Default::default() }
    }

    #[tokio::test]
    async fn test_precheck_finishes_quest_without_external_event() {
        let dispatcher = dispatcher(fast());
        let player = Arc::new(InMemoryPlayer::default());
        player.add_item(101, 7);
        dispatcher.register_player(1, player).unwrap();

        dispatcher.execute(1, QuestCommand::AddQuest(50001)).await.unwrap();
        dispatcher.wait_idle().await;

        let state = dispatcher.with_player(1, |o| o.quest(50001).map(|q| q.state)).await.unwrap();
        assert_eq!(state, Some(QuestState::Finished));
    }

    #[tokio::test]
    async fn test_delete_cancels_pending_precheck() {
        let dispatcher = dispatcher(DispatchConfig { precheck_delay_ms: 60_000, ..fast() });
        dispatcher.register_player(1, Arc::new(InMemoryPlayer::default())).unwrap();

        dispatcher.execute(1, QuestCommand::AddQuest(50001)).await.unwrap();
        assert_eq!(dispatcher.shared.pending_timers.load(Ordering::Acquire), 1);
        dispatcher.execute(1, QuestCommand::DeleteMainQuest(500)).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), dispatcher.wait_idle())
            .await
            .expect("cancelled pre-check kept the dispatcher busy");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_backlog_full_is_returned_to_caller() {
        let dispatcher = dispatcher(DispatchConfig { backlog_capacity: 3, ..fast() });
        dispatcher.register_player(1, Arc::new(InMemoryPlayer::default())).unwrap();

        // Workers cannot run until this task yields.
        for _ in 0..3 {
            dispatcher.raise_content_event(1, QuestContent::KillMonster, "", &[1]).unwrap();
        }
        assert!(matches!(
            dispatcher.raise_content_event(1, QuestContent::KillMonster, "", &[1]),
            Err(QuestError::BacklogFull { capacity: 3 })
        ));
        assert_eq!(dispatcher.backlog(), 3);

        dispatcher.wait_idle().await;
        assert_eq!(dispatcher.backlog(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sequential_commands_apply_in_order() {
        let dispatcher = dispatcher(fast());
        dispatcher.register_player(1, Arc::new(InMemoryPlayer::default())).unwrap();

        for value in 0..500 {
            dispatcher.submit(1, QuestCommand::SetGlobalVariable { id: 7, value }).unwrap();
        }
        dispatcher.wait_idle().await;

        let value = dispatcher.with_player(1, |o| o.get_global_variable(7)).await.unwrap();
        assert_eq!(value, 499);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_not_lost() {
        let dispatcher = Arc::new(dispatcher(fast()));
        dispatcher.register_player(1, Arc::new(InMemoryPlayer::default())).unwrap();
        dispatcher.register_player(2, Arc::new(InMemoryPlayer::default())).unwrap();

        let producers: Vec<_> = (0..8)
            .map(|i| {
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    for _ in 0..100 {
                        dispatcher
                            .submit(1, QuestCommand::IncrementGlobalVariable { id: 7, delta: 1 })
                            .unwrap();
                        if i % 2 == 0 {
                            dispatcher.raise_content_event(2, QuestContent::KillMonster, "", &[9]).unwrap();
                        }
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }
        dispatcher.wait_idle().await;

        let value = dispatcher.with_player(1, |o| o.get_global_variable(7)).await.unwrap();
        assert_eq!(value, 800);
    }

    #[tokio::test]
    async fn test_registration_and_unhandled_kinds() {
        let dispatcher = dispatcher(fast());
        let player: Arc<dyn PlayerWorld> = Arc::new(InMemoryPlayer::default());
        dispatcher.register_player(1, Arc::clone(&player)).unwrap();
        assert!(matches!(
            dispatcher.register_player(1, player),
            Err(QuestError::PlayerAlreadyRegistered(1))
        ));

        assert!(matches!(
            dispatcher.raise_content_event(1, QuestContent::WorktopSelect, "", &[]),
            Err(QuestError::UnhandledEventKind(_))
        ));
        assert!(matches!(
            dispatcher.raise_acceptance_event(2, QuestCond::CompleteTalk, "", &[1]),
            Err(QuestError::PlayerNotRegistered(2))
        ));

        dispatcher.unregister_player(1).unwrap();
        assert!(!dispatcher.is_registered(1));
        assert!(dispatcher.submit(1, QuestCommand::Login).is_err());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_relogin_waits_for_previous_session() {
        let store = Arc::new(MemoryQuestStore::new());
        let services = testing::build_services(
            &[MAIN],
            Arc::new(RecordingNotifier::default()),
            store.clone(),
            QuestPolicy::default(),
        );
        let config = DispatchConfig { drain_batch: 4, precheck_delay_ms: 60_000, ..fast() };
        let dispatcher = QuestDispatcher::start(services, &config);
        dispatcher.register_player(1, Arc::new(InMemoryPlayer::default())).unwrap();
        dispatcher.execute(1, QuestCommand::AddQuest(50001)).await.unwrap();

        // Nothing below runs until the test yields.
        for _ in 0..9 {
            dispatcher.raise_content_event(1, QuestContent::KillMonster, "", &[9]).unwrap();
        }
        dispatcher.raise_content_event(1, QuestContent::ObtainItem, "", &[101, 5]).unwrap();
        dispatcher.unregister_player(1).unwrap();
        assert!(matches!(
            dispatcher.register_player(1, Arc::new(InMemoryPlayer::default())),
            Err(QuestError::PlayerDraining(1))
        ));

        dispatcher.wait_drained(1).await;
        dispatcher.register_player(1, Arc::new(InMemoryPlayer::default())).unwrap();
        dispatcher.execute(1, QuestCommand::LoadFromStorage).await.unwrap();
        dispatcher.wait_idle().await;

        let live = dispatcher.with_player(1, |o| o.quest(50001).map(|q| q.state)).await.unwrap();
        let stored = store.record(1, 500).and_then(|r| r.child(50001).map(|q| q.state));
        assert_eq!(live, Some(QuestState::Finished));
        assert_eq!(live, stored);
    }

    #[tokio::test]
    async fn test_unregister_without_backlog_allows_immediate_register() {
        let dispatcher = dispatcher(fast());
        dispatcher.register_player(1, Arc::new(InMemoryPlayer::default())).unwrap();
        dispatcher.execute(1, QuestCommand::AddQuest(50001)).await.unwrap();
        dispatcher.wait_idle().await;

        dispatcher.unregister_player(1).unwrap();
        dispatcher.register_player(1, Arc::new(InMemoryPlayer::default())).unwrap();
    }

    #[tokio::test]
    async fn test_unregister_cancels_prechecks() {
        let dispatcher = dispatcher(DispatchConfig { precheck_delay_ms: 60_000, ..fast() });
        dispatcher.register_player(1, Arc::new(InMemoryPlayer::default())).unwrap();
        dispatcher.execute(1, QuestCommand::AddQuest(50001)).await.unwrap();

        dispatcher.unregister_player(1).unwrap();
        tokio::time::timeout(Duration::from_secs(1), dispatcher.wait_idle())
            .await
            .expect("pre-check survived unregister");
    }
}
