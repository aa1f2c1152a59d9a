use rmpv::Value;

use crate::quest::state::{MainQuest, SubQuest};

/// Protocol.RoomData, the frame code the game client expects
pub const ROOM_DATA: u8 = 13;

// ============================================================================
// Server -> Client Quest Messages
// ============================================================================

/// Client-facing snapshot of one sub quest
#[derive(Debug, Clone, PartialEq)]
pub struct QuestInfo {
    pub quest_id: u32,
    pub main_quest_id: u32,
    /// Numeric state code, 1 not started through 4 failed
    pub state: i32,
    pub finish_progress: Vec<i32>,
    pub fail_progress: Vec<i32>,
    /// Unix seconds
    pub accept_time: Option<i64>,
}

impl From<&SubQuest> for QuestInfo {
    fn from(quest: &SubQuest) -> Self {
        Self {
            quest_id: quest.sub_id,
            main_quest_id: quest.main_id,
            state: quest.state.code(),
            finish_progress: quest.finish_progress.clone(),
            fail_progress: quest.fail_progress.clone(),
            accept_time: quest.accepted_at.map(|t| t.timestamp()),
        }
    }
}

impl QuestInfo {
    fn to_value(&self) -> Value {
        let accept_time = match self.accept_time {
            Some(t) => Value::Integer(t.into()),
            None => Value::Nil,
        };
        Value::Map(vec![
            (Value::String("questId".into()), Value::Integer(self.quest_id.into())),
            (Value::String("mainQuestId".into()), Value::Integer(self.main_quest_id.into())),
            (Value::String("state".into()), Value::Integer(self.state.into())),
            (Value::String("finishProgress".into()), int_array(&self.finish_progress)),
            (Value::String("failProgress".into()), int_array(&self.fail_progress)),
            (Value::String("acceptTime".into()), accept_time),
        ])
    }

    fn from_value(value: &Value) -> Result<Self, String> {
        Ok(Self {
            quest_id: extract_u32(value, "questId").ok_or("Missing questId")?,
            main_quest_id: extract_u32(value, "mainQuestId").ok_or("Missing mainQuestId")?,
            state: extract_i32(value, "state").ok_or("Missing state")?,
            finish_progress: extract_i32_array(value, "finishProgress").ok_or("Missing finishProgress")?,
            fail_progress: extract_i32_array(value, "failProgress").ok_or("Missing failProgress")?,
            accept_time: field(value, "acceptTime").and_then(Value::as_i64),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MainQuestInfo {
    pub main_quest_id: u32,
    pub state: String,
    pub quest_vars: Vec<i32>,
    pub child_quests: Vec<QuestInfo>,
}

impl From<&MainQuest> for MainQuestInfo {
    fn from(record: &MainQuest) -> Self {
        Self {
            main_quest_id: record.id,
            state: record.state.as_str().to_string(),
            quest_vars: record.quest_vars.to_vec(),
            child_quests: record.child_quests.iter().map(QuestInfo::from).collect(),
        }
    }
}

impl MainQuestInfo {
    fn to_value(&self) -> Value {
        let children = self.child_quests.iter().map(QuestInfo::to_value).collect();
        Value::Map(vec![
            (Value::String("mainQuestId".into()), Value::Integer(self.main_quest_id.into())),
            (Value::String("state".into()), Value::String(self.state.clone().into())),
            (Value::String("questVars".into()), int_array(&self.quest_vars)),
            (Value::String("childQuests".into()), Value::Array(children)),
        ])
    }

    fn from_value(value: &Value) -> Result<Self, String> {
        let children = field(value, "childQuests")
            .and_then(Value::as_array)
            .ok_or("Missing childQuests")?
            .iter()
            .map(QuestInfo::from_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            main_quest_id: extract_u32(value, "mainQuestId").ok_or("Missing mainQuestId")?,
            state: field(value, "state")
                .and_then(Value::as_str)
                .ok_or("Missing state")?
                .to_string(),
            quest_vars: extract_i32_array(value, "questVars").ok_or("Missing questVars")?,
            child_quests: children,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QuestNotify {
    MainQuestCreated(MainQuestInfo),
    QuestProgress(QuestInfo),
    MainQuestFinished(MainQuestInfo),
}

impl QuestNotify {
    pub fn msg_type(&self) -> &'static str {
        match self {
            QuestNotify::MainQuestCreated(_) => "mainQuestCreated",
            QuestNotify::QuestProgress(_) => "questProgress",
            QuestNotify::MainQuestFinished(_) => "mainQuestFinished",
        }
    }
}

// ============================================================================
// Encoding/Decoding
// ============================================================================

/// Encode a quest notification to MessagePack.
/// Format: [13, "msg_type", {data}]
pub fn encode_quest_notify(msg: &QuestNotify) -> Result<Vec<u8>, String> {
    let data = match msg {
        QuestNotify::MainQuestCreated(info) | QuestNotify::MainQuestFinished(info) => info.to_value(),
        QuestNotify::QuestProgress(info) => info.to_value(),
    };

    let array = Value::Array(vec![
        Value::Integer(ROOM_DATA.into()),
        Value::String(msg.msg_type().into()),
        data,
    ]);

    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, &array)
        .map_err(|e| format!("Failed to encode message: {}", e))?;

    Ok(buf)
}

/// Decode a frame produced by [`encode_quest_notify`]
pub fn decode_quest_notify(data: &[u8]) -> Result<QuestNotify, String> {
    use std::io::Cursor;

    let mut cursor = Cursor::new(data);
    let value = rmpv::decode::read_value(&mut cursor)
        .map_err(|e| format!("Failed to decode MessagePack: {}", e))?;

    let array = value.as_array().ok_or("Expected array")?;
    if array.len() < 3 {
        return Err("Array too short".to_string());
    }

    let protocol = array[0].as_u64().ok_or("Protocol code must be integer")?;
    if protocol != u64::from(ROOM_DATA) {
        return Err(format!("Unexpected protocol code: {}", protocol));
    }

    let msg_type = array[1].as_str().ok_or("Message type must be string")?;
    let payload = &array[2];
    let bad = |e: String| format!("Bad {} payload: {}", msg_type, e);

    match msg_type {
        "mainQuestCreated" => Ok(QuestNotify::MainQuestCreated(MainQuestInfo::from_value(payload).map_err(bad)?)),
        "questProgress" => Ok(QuestNotify::QuestProgress(QuestInfo::from_value(payload).map_err(bad)?)),
        "mainQuestFinished" => Ok(QuestNotify::MainQuestFinished(MainQuestInfo::from_value(payload).map_err(bad)?)),
        _ => Err(format!("Unknown message type: {}", msg_type)),
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn int_array(values: &[i32]) -> Value {
    Value::Array(values.iter().map(|v| Value::Integer((*v).into())).collect())
}

fn field<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value
        .as_map()
        .and_then(|map| map.iter().find(|(k, _)| k.as_str() == Some(key)).map(|(_, v)| v))
}

fn extract_u32(value: &Value, key: &str) -> Option<u32> {
    field(value, key).and_then(Value::as_u64).and_then(|v| u32::try_from(v).ok())
}

fn extract_i32(value: &Value, key: &str) -> Option<i32> {
    field(value, key).and_then(Value::as_i64).and_then(|v| i32::try_from(v).ok())
}

fn extract_i32_array(value: &Value, key: &str) -> Option<Vec<i32>> {
    field(value, key)?
        .as_array()?
        .iter()
        .map(|v| v.as_i64().and_then(|i| i32::try_from(i).ok()))
        .collect()
}
