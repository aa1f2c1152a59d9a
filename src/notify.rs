//! Pushes quest notifications to connected players as MessagePack frames.

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::ports::QuestNotifier;
use crate::protocol::{encode_quest_notify, MainQuestInfo, QuestInfo, QuestNotify};
use crate::quest::state::{MainQuest, SubQuest};

#[derive(Default)]
pub struct ChannelNotifier {
    player_senders: DashMap<u32, mpsc::Sender<Vec<u8>>>,
}

impl ChannelNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_player_sender(&self, uid: u32, sender: mpsc::Sender<Vec<u8>>) {
        self.player_senders.insert(uid, sender);
        tracing::debug!("Registered quest sender for player {}", uid);
    }

    pub fn unregister_player_sender(&self, uid: u32) {
        self.player_senders.remove(&uid);
        tracing::debug!("Unregistered quest sender for player {}", uid);
    }

    /// Best effort: a full or closed channel drops the frame
    fn send_to_player(&self, uid: u32, msg: QuestNotify) {
        let Some(sender) = self.player_senders.get(&uid) else {
            tracing::debug!("No quest sender registered for player {}", uid);
            return;
        };
        match encode_quest_notify(&msg) {
            Ok(bytes) => {
                if let Err(e) = sender.try_send(bytes) {
                    tracing::warn!("Failed to send {} to {}: {}", msg.msg_type(), uid, e);
                }
            }
            Err(e) => tracing::error!("Failed to encode {}: {}", msg.msg_type(), e),
        }
    }
}

impl QuestNotifier for ChannelNotifier {
    fn notify_main_quest_created(&self, record: &MainQuest) {
        self.send_to_player(record.owner_uid, QuestNotify::MainQuestCreated(MainQuestInfo::from(record)));
    }

    fn notify_quest_progress(&self, uid: u32, quest: &SubQuest) {
        self.send_to_player(uid, QuestNotify::QuestProgress(QuestInfo::from(quest)));
    }

    fn notify_main_quest_finished(&self, record: &MainQuest) {
        self.send_to_player(record.owner_uid, QuestNotify::MainQuestFinished(MainQuestInfo::from(record)));
    }
}
