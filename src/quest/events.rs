//! Quest Event Types
//!
//! The closed taxonomy of acceptance conditions and content kinds, plus the
//! event value that carries one of them through the dispatcher.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Declares a taxonomy enum together with its wire names.
macro_rules! taxonomy {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal,)+ }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            pub fn from_name(s: &str) -> Option<Self> {
                match s {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

taxonomy! {
    /// Conditions that start a not-started sub quest
    QuestCond {
        StateEqual => "QUEST_COND_STATE_EQUAL",
        StateNotEqual => "QUEST_COND_STATE_NOT_EQUAL",
        CompleteTalk => "QUEST_COND_COMPLETE_TALK",
        LuaNotify => "QUEST_COND_LUA_NOTIFY",
        QuestVarEqual => "QUEST_COND_QUEST_VAR_EQUAL",
        QuestVarGreater => "QUEST_COND_QUEST_VAR_GREATER",
        QuestVarLess => "QUEST_COND_QUEST_VAR_LESS",
        PlayerLevelEqualGreater => "QUEST_COND_PLAYER_LEVEL_EQUAL_GREATER",
        QuestGlobalVarEqual => "QUEST_COND_QUEST_GLOBAL_VAR_EQUAL",
        QuestGlobalVarGreater => "QUEST_COND_QUEST_GLOBAL_VAR_GREATER",
        QuestGlobalVarLess => "QUEST_COND_QUEST_GLOBAL_VAR_LESS",
        PackHaveItem => "QUEST_COND_PACK_HAVE_ITEM",
        ItemNumLessThan => "QUEST_COND_ITEM_NUM_LESS_THAN",
        ActivityOpen => "QUEST_COND_ACTIVITY_OPEN",
        ActivityEnd => "QUEST_COND_ACTIVITY_END",
        ActivityCond => "QUEST_COND_ACTIVITY_COND",
        PlayerChooseMale => "QUEST_COND_PLAYER_CHOOSE_MALE",
    }
}

taxonomy! {
    /// Content kinds that advance, finish or fail an in-progress sub quest
    QuestContent {
        CompleteTalk => "QUEST_CONTENT_COMPLETE_TALK",
        FinishPlot => "QUEST_CONTENT_FINISH_PLOT",
        NotFinishPlot => "QUEST_CONTENT_NOT_FINISH_PLOT",
        CompleteAnyTalk => "QUEST_CONTENT_COMPLETE_ANY_TALK",
        AnyManualTransport => "QUEST_CONTENT_ANY_MANUAL_TRANSPORT",
        QuestVarEqual => "QUEST_CONTENT_QUEST_VAR_EQUAL",
        QuestVarGreater => "QUEST_CONTENT_QUEST_VAR_GREATER",
        QuestVarLess => "QUEST_CONTENT_QUEST_VAR_LESS",
        EnterDungeon => "QUEST_CONTENT_ENTER_DUNGEON",
        EnterMyWorldScene => "QUEST_CONTENT_ENTER_MY_WORLD_SCENE",
        InteractGadget => "QUEST_CONTENT_INTERACT_GADGET",
        TriggerFire => "QUEST_CONTENT_TRIGGER_FIRE",
        UnlockTransPoint => "QUEST_CONTENT_UNLOCK_TRANS_POINT",
        UnlockArea => "QUEST_CONTENT_UNLOCK_AREA",
        Skill => "QUEST_CONTENT_SKILL",
        ObtainItem => "QUEST_CONTENT_OBTAIN_ITEM",
        MonsterDie => "QUEST_CONTENT_MONSTER_DIE",
        DestroyGadget => "QUEST_CONTENT_DESTROY_GADGET",
        PlayerLevelUp => "QUEST_CONTENT_PLAYER_LEVEL_UP",
        UseItem => "QUEST_CONTENT_USE_ITEM",
        EnterVehicle => "QUEST_CONTENT_ENTER_VEHICLE",
        FinishDungeon => "QUEST_CONTENT_FINISH_DUNGEON",
        GameTimeTick => "QUEST_CONTENT_GAME_TIME_TICK",
        QuestStateEqual => "QUEST_CONTENT_QUEST_STATE_EQUAL",
        QuestStateNotEqual => "QUEST_CONTENT_QUEST_STATE_NOT_EQUAL",
        AddQuestProgress => "QUEST_CONTENT_ADD_QUEST_PROGRESS",
        LeaveScene => "QUEST_CONTENT_LEAVE_SCENE",
        ItemLessThan => "QUEST_CONTENT_ITEM_LESS_THAN",
        KillMonster => "QUEST_CONTENT_KILL_MONSTER",
        LuaNotify => "QUEST_CONTENT_LUA_NOTIFY",
        EnterMyWorld => "QUEST_CONTENT_ENTER_MY_WORLD",
        EnterRoom => "QUEST_CONTENT_ENTER_ROOM",
        FailDungeon => "QUEST_CONTENT_FAIL_DUNGEON",
        WorktopSelect => "QUEST_CONTENT_WORKTOP_SELECT",
    }
}

/// Which transition checks an event kind is allowed to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchClass {
    /// Start not-started children whose acceptance list names the kind
    Accept,
    FailOnly,
    FinishOnly,
    /// Fail check first, then finish check on whatever is still in progress
    FinishOrFail,
}

impl QuestCond {
    /// Whether the acceptance dispatcher knows how to evaluate this kind
    pub fn is_dispatchable(&self) -> bool {
        !matches!(self, QuestCond::PlayerChooseMale)
    }
}

impl QuestContent {
    pub fn dispatch_class(&self) -> Option<DispatchClass> {
        use QuestContent::*;
        match self {
            NotFinishPlot | AnyManualTransport => Some(DispatchClass::FailOnly),
            CompleteTalk | FinishPlot | CompleteAnyTalk | QuestVarEqual | QuestVarGreater
            | QuestVarLess | EnterDungeon | EnterMyWorldScene | InteractGadget | TriggerFire
            | UnlockTransPoint | UnlockArea | Skill | ObtainItem | MonsterDie | DestroyGadget
            | PlayerLevelUp | UseItem | EnterVehicle | FinishDungeon => {
                Some(DispatchClass::FinishOnly)
            }
            GameTimeTick | QuestStateEqual | AddQuestProgress | LeaveScene | ItemLessThan
            | KillMonster | LuaNotify | EnterMyWorld | EnterRoom | FailDungeon => {
                Some(DispatchClass::FinishOrFail)
            }
            QuestStateNotEqual | WorktopSelect => None,
        }
    }
}

/// The kind of a raised quest event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Accept(QuestCond),
    Content(QuestContent),
}

impl EventKind {
    /// `None` for taxonomy members the dispatcher has no rule for
    pub fn dispatch_class(&self) -> Option<DispatchClass> {
        match self {
            EventKind::Accept(cond) if cond.is_dispatchable() => Some(DispatchClass::Accept),
            EventKind::Accept(_) => None,
            EventKind::Content(content) => content.dispatch_class(),
        }
    }

    /// Parse a kind from its wire name, e.g. `QUEST_CONTENT_OBTAIN_ITEM`
    pub fn parse(name: &str) -> Option<Self> {
        QuestCond::from_name(name)
            .map(EventKind::Accept)
            .or_else(|| QuestContent::from_name(name).map(EventKind::Content))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Accept(cond) => cond.as_str(),
            EventKind::Content(content) => content.as_str(),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raised event: kind, free-form string payload and integer parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestEvent {
    pub kind: EventKind,
    pub param_str: String,
    pub params: Vec<i32>,
}

impl QuestEvent {
    pub fn accept(cond: QuestCond, param_str: impl Into<String>, params: &[i32]) -> Self {
        Self {
            kind: EventKind::Accept(cond),
            param_str: param_str.into(),
            params: params.to_vec(),
        }
    }

    pub fn content(content: QuestContent, param_str: impl Into<String>, params: &[i32]) -> Self {
        Self {
            kind: EventKind::Content(content),
            param_str: param_str.into(),
            params: params.to_vec(),
        }
    }

    /// Integer parameter at `index`, 0 when absent
    pub fn param(&self, index: usize) -> i32 {
        self.params.get(index).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_unique_and_parse_back() {
        for cond in QuestCond::ALL {
            assert_eq!(EventKind::parse(cond.as_str()), Some(EventKind::Accept(*cond)));
        }
        for content in QuestContent::ALL {
            assert_eq!(EventKind::parse(content.as_str()), Some(EventKind::Content(*content)));
        }
        assert_eq!(EventKind::parse("QUEST_CONTENT_DANCE"), None);
    }

    #[test]
    fn test_dispatch_classes() {
        assert_eq!(QuestContent::AnyManualTransport.dispatch_class(), Some(DispatchClass::FailOnly));
        assert_eq!(QuestContent::ObtainItem.dispatch_class(), Some(DispatchClass::FinishOnly));
        assert_eq!(QuestContent::KillMonster.dispatch_class(), Some(DispatchClass::FinishOrFail));
        assert_eq!(QuestContent::WorktopSelect.dispatch_class(), None);
        assert_eq!(
            EventKind::Accept(QuestCond::CompleteTalk).dispatch_class(),
            Some(DispatchClass::Accept)
        );
        assert_eq!(EventKind::Accept(QuestCond::PlayerChooseMale).dispatch_class(), None);
    }

    #[test]
    fn test_missing_param_defaults_to_zero() {
        let event = QuestEvent::content(QuestContent::ObtainItem, "", &[101]);
        assert_eq!(event.param(0), 101);
        assert_eq!(event.param(1), 0);
    }
}
