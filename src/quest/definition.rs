//! Quest Definition Structures
//!
//! These structures are deserialized from TOML quest files and resolved into
//! the immutable definitions the engine evaluates against.

use serde::{Deserialize, Serialize};

use super::events::{QuestCond, QuestContent};
use super::logic::LogicType;
use crate::player::Vec3;

/// A main quest definition file
#[derive(Debug, Clone, Deserialize)]
pub struct RawQuestFile {
    pub quest: RawMainQuest,
}

/// Raw main quest data as it appears in TOML
#[derive(Debug, Clone, Deserialize)]
pub struct RawMainQuest {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sub_quests: Vec<RawSubQuest>,
    /// Login checkpoints keyed by sub quest
    #[serde(default)]
    pub rewind: Vec<RawRewindPoint>,
}

/// Raw sub quest as it appears in TOML
#[derive(Debug, Clone, Deserialize)]
pub struct RawSubQuest {
    pub id: u32,
    #[serde(default)]
    pub order: i32,
    /// Finishing this sub quest finishes the main quest
    #[serde(default)]
    pub finish_parent: bool,
    /// Whether this step can serve as a login checkpoint
    #[serde(default)]
    pub is_rewind: bool,
    #[serde(default)]
    pub accept_cond_comb: String,
    #[serde(default)]
    pub finish_cond_comb: String,
    #[serde(default)]
    pub fail_cond_comb: String,
    #[serde(default)]
    pub accept_cond: Vec<RawCondition>,
    #[serde(default)]
    pub finish_cond: Vec<RawCondition>,
    #[serde(default)]
    pub fail_cond: Vec<RawCondition>,
    #[serde(default)]
    pub begin_exec: Vec<RawExec>,
    #[serde(default)]
    pub finish_exec: Vec<RawExec>,
    #[serde(default)]
    pub fail_exec: Vec<RawExec>,
    #[serde(default)]
    pub group_suites: Vec<RawGroupSuite>,
}

/// Raw condition entry
#[derive(Debug, Clone, Deserialize)]
pub struct RawCondition {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Vec<i32>,
    #[serde(default)]
    pub param_str: String,
    #[serde(default = "default_count")]
    pub count: i32,
}

fn default_count() -> i32 {
    1
}

/// Raw exec entry
#[derive(Debug, Clone, Deserialize)]
pub struct RawExec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Vec<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRewindPoint {
    pub sub_quest: u32,
    pub position: [f32; 3],
    #[serde(default)]
    pub rotation: [f32; 3],
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawGroupSuite {
    pub scene: u32,
    pub group: u32,
    pub suite: u32,
}

// ============================================================================
// Resolved Quest Structures (after parsing)
// ============================================================================

/// An acceptance condition of a sub quest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptCondition {
    pub kind: QuestCond,
    pub params: Vec<i32>,
    pub param_str: String,
}

impl AcceptCondition {
    pub fn from_raw(raw: &RawCondition) -> Result<Self, String> {
        let kind = QuestCond::from_name(&raw.kind)
            .ok_or_else(|| format!("Unknown accept condition '{}'", raw.kind))?;
        Ok(Self {
            kind,
            params: raw.params.clone(),
            param_str: raw.param_str.clone(),
        })
    }

    pub fn param(&self, index: usize) -> i32 {
        self.params.get(index).copied().unwrap_or(0)
    }
}

/// A finish or fail condition of a sub quest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentCondition {
    pub kind: QuestContent,
    pub params: Vec<i32>,
    pub param_str: String,
    /// Progress needed for the condition to hold
    pub count: i32,
}

impl ContentCondition {
    pub fn from_raw(raw: &RawCondition) -> Result<Self, String> {
        let kind = QuestContent::from_name(&raw.kind)
            .ok_or_else(|| format!("Unknown content condition '{}'", raw.kind))?;
        Ok(Self {
            kind,
            params: raw.params.clone(),
            param_str: raw.param_str.clone(),
            count: raw.count,
        })
    }

    pub fn target(&self) -> i32 {
        self.count.max(1)
    }

    pub fn is_satisfied(&self, progress: i32) -> bool {
        progress >= self.target()
    }

    pub fn param(&self, index: usize) -> i32 {
        self.params.get(index).copied().unwrap_or(0)
    }
}

/// Side effects run when a sub quest begins, finishes or fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestExecKind {
    SetQuestVar,
    IncQuestVar,
    DecQuestVar,
    SetGlobalVar,
    IncGlobalVar,
    DecGlobalVar,
    AddQuestProgress,
}

impl QuestExecKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "QUEST_EXEC_SET_QUEST_VAR" => Some(QuestExecKind::SetQuestVar),
            "QUEST_EXEC_INC_QUEST_VAR" => Some(QuestExecKind::IncQuestVar),
            "QUEST_EXEC_DEC_QUEST_VAR" => Some(QuestExecKind::DecQuestVar),
            "QUEST_EXEC_SET_QUEST_GLOBAL_VAR" => Some(QuestExecKind::SetGlobalVar),
            "QUEST_EXEC_INC_QUEST_GLOBAL_VAR" => Some(QuestExecKind::IncGlobalVar),
            "QUEST_EXEC_DEC_QUEST_GLOBAL_VAR" => Some(QuestExecKind::DecGlobalVar),
            "QUEST_EXEC_ADD_QUEST_PROGRESS" => Some(QuestExecKind::AddQuestProgress),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestExec {
    pub kind: QuestExecKind,
    pub params: Vec<i32>,
}

impl QuestExec {
    pub fn from_raw(raw: &RawExec) -> Result<Self, String> {
        let kind = QuestExecKind::from_str(&raw.kind)
            .ok_or_else(|| format!("Unknown exec '{}'", raw.kind))?;
        Ok(Self { kind, params: raw.params.clone() })
    }

    pub fn param(&self, index: usize) -> i32 {
        self.params.get(index).copied().unwrap_or(0)
    }
}

/// Position and rotation a player is returned to on login
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewindPoint {
    pub position: Vec3,
    pub rotation: Vec3,
}

/// Scene group suite shown while a sub quest is in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuestGroupSuite {
    pub scene: u32,
    pub group: u32,
    pub suite: u32,
}

/// A fully resolved sub quest definition
#[derive(Debug, Clone)]
pub struct SubQuestDef {
    pub id: u32,
    pub main_id: u32,
    pub order: i32,
    pub finish_parent: bool,
    pub is_rewind: bool,
    pub accept_comb: LogicType,
    pub finish_comb: LogicType,
    pub fail_comb: LogicType,
    pub accept_conds: Vec<AcceptCondition>,
    pub finish_conds: Vec<ContentCondition>,
    pub fail_conds: Vec<ContentCondition>,
    pub begin_exec: Vec<QuestExec>,
    pub finish_exec: Vec<QuestExec>,
    pub fail_exec: Vec<QuestExec>,
    pub group_suites: Vec<QuestGroupSuite>,
}

fn parse_comb(sub_id: u32, field: &str, value: &str) -> Result<LogicType, String> {
    LogicType::from_name(value)
        .ok_or_else(|| format!("Sub quest {} has invalid {} '{}'", sub_id, field, value))
}

impl SubQuestDef {
    pub fn from_raw(main_id: u32, raw: &RawSubQuest) -> Result<Self, String> {
        let content = |list: &[RawCondition]| {
            list.iter()
                .map(ContentCondition::from_raw)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| format!("Sub quest {}: {}", raw.id, e))
        };
        let execs = |list: &[RawExec]| {
            list.iter()
                .map(QuestExec::from_raw)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| format!("Sub quest {}: {}", raw.id, e))
        };

        Ok(Self {
            id: raw.id,
            main_id,
            order: raw.order,
            finish_parent: raw.finish_parent,
            is_rewind: raw.is_rewind,
            accept_comb: parse_comb(raw.id, "accept_cond_comb", &raw.accept_cond_comb)?,
            finish_comb: parse_comb(raw.id, "finish_cond_comb", &raw.finish_cond_comb)?,
            fail_comb: parse_comb(raw.id, "fail_cond_comb", &raw.fail_cond_comb)?,
            accept_conds: raw.accept_cond
                .iter()
                .map(AcceptCondition::from_raw)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| format!("Sub quest {}: {}", raw.id, e))?,
            finish_conds: content(&raw.finish_cond)?,
            fail_conds: content(&raw.fail_cond)?,
            begin_exec: execs(&raw.begin_exec)?,
            finish_exec: execs(&raw.finish_exec)?,
            fail_exec: execs(&raw.fail_exec)?,
            group_suites: raw.group_suites
                .iter()
                .map(|g| QuestGroupSuite { scene: g.scene, group: g.group, suite: g.suite })
                .collect(),
        })
    }

    /// Whether the acceptance list names the given kind
    pub fn accepts_on(&self, kind: QuestCond) -> bool {
        self.accept_conds.iter().any(|c| c.kind == kind)
    }
}

/// A fully resolved main quest definition
#[derive(Debug, Clone)]
pub struct MainQuestDef {
    pub id: u32,
    pub name: String,
    /// Sub quests in file order
    pub sub_quests: Vec<SubQuestDef>,
    pub rewind_points: Vec<(u32, RewindPoint)>,
}

impl MainQuestDef {
    /// Create a MainQuestDef from raw TOML data
    pub fn from_raw(raw: &RawMainQuest) -> Result<Self, String> {
        if raw.sub_quests.is_empty() {
            return Err(format!("Main quest {} has no sub quests", raw.id));
        }

        let sub_quests = raw.sub_quests
            .iter()
            .map(|s| SubQuestDef::from_raw(raw.id, s))
            .collect::<Result<Vec<_>, _>>()?;

        for point in &raw.rewind {
            if !sub_quests.iter().any(|s| s.id == point.sub_quest) {
                return Err(format!(
                    "Main quest {} has a rewind point for unknown sub quest {}",
                    raw.id, point.sub_quest
                ));
            }
        }

        Ok(Self {
            id: raw.id,
            name: raw.name.clone(),
            sub_quests,
            rewind_points: raw.rewind
                .iter()
                .map(|r| (r.sub_quest, RewindPoint {
                    position: Vec3::from(r.position),
                    rotation: Vec3::from(r.rotation),
                }))
                .collect(),
        })
    }

    pub fn sub_quest(&self, sub_id: u32) -> Option<&SubQuestDef> {
        self.sub_quests.iter().find(|s| s.id == sub_id)
    }

    /// The sub quest that starts this main quest (lowest order)
    pub fn first_sub_quest(&self) -> Option<&SubQuestDef> {
        self.sub_quests.iter().min_by_key(|s| s.order)
    }

    /// Sub quests whose completion finishes the main quest
    pub fn terminal_sub_quests(&self) -> Vec<&SubQuestDef> {
        let flagged: Vec<&SubQuestDef> = self.sub_quests.iter().filter(|s| s.finish_parent).collect();
        if !flagged.is_empty() {
            return flagged;
        }
        self.sub_quests.iter().max_by_key(|s| s.order).into_iter().collect()
    }

    pub fn rewind_point(&self, sub_id: u32) -> Option<RewindPoint> {
        self.rewind_points
            .iter()
            .find(|(id, _)| *id == sub_id)
            .map(|(_, point)| *point)
    }
}
