//! Finish and fail content handlers.
//!
//! Each handler returns the condition's new progress. Events that do not
//! concern the condition leave its progress untouched.

use super::{id_param, slot_param, ConditionContext, ConditionRegistry};
use crate::error::QuestError;
use crate::quest::definition::ContentCondition;
use crate::quest::events::QuestContent;

pub(super) fn register(registry: &mut ConditionRegistry) {
    use QuestContent::*;

    for kind in [
        CompleteTalk, FinishPlot, NotFinishPlot, EnterDungeon, EnterMyWorldScene, InteractGadget,
        TriggerFire, Skill, DestroyGadget, UseItem, EnterVehicle, FinishDungeon, LeaveScene,
        EnterMyWorld, EnterRoom, FailDungeon,
    ] {
        registry.register_content(kind, first_param_match);
    }
    registry.register_content(AnyManualTransport, any_manual_transport);
    registry.register_content(CompleteAnyTalk, complete_any_talk);
    registry.register_content(UnlockTransPoint, scene_unlock);
    registry.register_content(UnlockArea, scene_unlock);
    registry.register_content(ObtainItem, obtain_item);
    registry.register_content(ItemLessThan, item_less_than);
    registry.register_content(MonsterDie, count_kill);
    registry.register_content(KillMonster, count_kill);
    registry.register_content(AddQuestProgress, add_quest_progress);
    registry.register_content(PlayerLevelUp, player_level_up);
    registry.register_content(GameTimeTick, game_time_tick);
    registry.register_content(QuestStateEqual, quest_state_equal);
    registry.register_content(QuestVarEqual, quest_var_equal);
    registry.register_content(QuestVarGreater, quest_var_greater);
    registry.register_content(QuestVarLess, quest_var_less);
    registry.register_content(LuaNotify, lua_notify);
}

fn matches_first(cond: &ContentCondition, params: &[i32]) -> bool {
    params.first() == Some(&cond.param(0))
}

fn first_param_match(_: &ConditionContext<'_>, cond: &ContentCondition, progress: i32, _: &str, params: &[i32]) -> Result<i32, QuestError> {
    Ok(if matches_first(cond, params) { 1 } else { progress })
}

fn any_manual_transport(_: &ConditionContext<'_>, _: &ContentCondition, _: i32, _: &str, _: &[i32]) -> Result<i32, QuestError> {
    Ok(1)
}

/// `param_str` holds a comma separated list of talk ids
fn complete_any_talk(_: &ConditionContext<'_>, cond: &ContentCondition, progress: i32, _: &str, params: &[i32]) -> Result<i32, QuestError> {
    let Some(talk_id) = params.first() else {
        return Ok(progress);
    };
    let matched = cond
        .param_str
        .split(',')
        .filter_map(|t| t.trim().parse::<i32>().ok())
        .any(|t| t == *talk_id);
    Ok(if matched { 1 } else { progress })
}

/// Params: [scene id, point or area id]
fn scene_unlock(_: &ConditionContext<'_>, cond: &ContentCondition, progress: i32, _: &str, params: &[i32]) -> Result<i32, QuestError> {
    let matched = params.len() >= 2 && params[0] == cond.param(0) && params[1] == cond.param(1);
    Ok(if matched { 1 } else { progress })
}

/// Event params: [item id, owned count]
fn obtain_item(_: &ConditionContext<'_>, cond: &ContentCondition, progress: i32, _: &str, params: &[i32]) -> Result<i32, QuestError> {
    if !matches_first(cond, params) {
        return Ok(progress);
    }
    Ok(params.get(1).copied().unwrap_or(0))
}

/// Condition params: [item id, threshold]; event params: [item id, owned count]
fn item_less_than(_: &ConditionContext<'_>, cond: &ContentCondition, progress: i32, _: &str, params: &[i32]) -> Result<i32, QuestError> {
    if !matches_first(cond, params) {
        return Ok(progress);
    }
    let owned = params.get(1).copied().unwrap_or(0);
    Ok(i32::from(owned < cond.param(1)))
}

fn count_kill(_: &ConditionContext<'_>, cond: &ContentCondition, progress: i32, _: &str, params: &[i32]) -> Result<i32, QuestError> {
    Ok(if matches_first(cond, params) { progress.saturating_add(1) } else { progress })
}

/// Event params: [progress id, amount]; a missing amount means one
fn add_quest_progress(_: &ConditionContext<'_>, cond: &ContentCondition, progress: i32, _: &str, params: &[i32]) -> Result<i32, QuestError> {
    if !matches_first(cond, params) {
        return Ok(progress);
    }
    let amount = params.get(1).copied().unwrap_or(1);
    Ok(progress.saturating_add(amount))
}

/// Event params: [new level]; without one the player's current level is used
fn player_level_up(ctx: &ConditionContext<'_>, cond: &ContentCondition, progress: i32, _: &str, params: &[i32]) -> Result<i32, QuestError> {
    let level = match params.first() {
        Some(level) => i64::from(*level),
        None => i64::from(ctx.player.level()),
    };
    Ok(if level >= i64::from(cond.param(0)) { 1 } else { progress })
}

/// Condition `param_str` is an inclusive hour range "a,b"; event params: [hour]
fn game_time_tick(_: &ConditionContext<'_>, cond: &ContentCondition, progress: i32, _: &str, params: &[i32]) -> Result<i32, QuestError> {
    let Some(hour) = params.first() else {
        return Ok(progress);
    };
    let bounds: Vec<i32> = cond
        .param_str
        .split(',')
        .map(|b| b.trim().parse::<i32>())
        .collect::<Result<_, _>>()
        .map_err(|_| QuestError::malformed(cond.kind.as_str(), format!("bad hour range '{}'", cond.param_str)))?;
    let &[a, b] = bounds.as_slice() else {
        return Err(QuestError::malformed(cond.kind.as_str(), format!("bad hour range '{}'", cond.param_str)));
    };
    let (min, max) = (a.min(b), a.max(b));
    Ok(i32::from((min..=max).contains(hour)))
}

/// Params: [sub quest id, state code], evaluated against current state
fn quest_state_equal(ctx: &ConditionContext<'_>, cond: &ContentCondition, _: i32, _: &str, _: &[i32]) -> Result<i32, QuestError> {
    let sub_id = id_param(cond.kind.as_str(), cond.param(0))?;
    Ok(i32::from(ctx.quest_state(sub_id).is_some_and(|s| s.code() == cond.param(1))))
}

fn quest_var_equal(ctx: &ConditionContext<'_>, cond: &ContentCondition, _: i32, _: &str, _: &[i32]) -> Result<i32, QuestError> {
    let slot = slot_param(cond.kind.as_str(), cond.param(0))?;
    Ok(i32::from(ctx.quest_var(slot) == cond.param(1)))
}

fn quest_var_greater(ctx: &ConditionContext<'_>, cond: &ContentCondition, _: i32, _: &str, _: &[i32]) -> Result<i32, QuestError> {
    let slot = slot_param(cond.kind.as_str(), cond.param(0))?;
    Ok(i32::from(ctx.quest_var(slot) > cond.param(1)))
}

fn quest_var_less(ctx: &ConditionContext<'_>, cond: &ContentCondition, _: i32, _: &str, _: &[i32]) -> Result<i32, QuestError> {
    let slot = slot_param(cond.kind.as_str(), cond.param(0))?;
    Ok(i32::from(ctx.quest_var(slot) < cond.param(1)))
}

fn lua_notify(_: &ConditionContext<'_>, cond: &ContentCondition, progress: i32, param_str: &str, _: &[i32]) -> Result<i32, QuestError> {
    Ok(if !param_str.is_empty() && cond.param_str == param_str { 1 } else { progress })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::quest::state::MainQuest;
    use crate::testing::{catalog_of, TestWorld};

    fn cond(kind: QuestContent, params: &[i32], param_str: &str, count: i32) -> ContentCondition {
        ContentCondition { kind, params: params.to_vec(), param_str: param_str.to_string(), count }
    }

    const MAIN: &str = r#"
        [quest]
        id = 1
        [[quest.sub_quests]]
        id = 101
    "#;

    #[test]
    fn test_progress_rules() {
        let catalog = catalog_of(&[MAIN]);
        let world = TestWorld::default();
        let record = MainQuest::new(1, catalog.main_quest(1).unwrap());
        let main_quests = BTreeMap::new();
        let ctx = world.context(&catalog, &main_quests, &record);

        let obtain = cond(QuestContent::ObtainItem, &[101], "", 5);
        assert_eq!(obtain_item(&ctx, &obtain, 2, "", &[101, 7]).unwrap(), 7);
        assert_eq!(obtain_item(&ctx, &obtain, 2, "", &[102, 7]).unwrap(), 2);

        let kill = cond(QuestContent::KillMonster, &[20010], "", 3);
        assert_eq!(count_kill(&ctx, &kill, 1, "", &[20010]).unwrap(), 2);
        assert_eq!(count_kill(&ctx, &kill, 1, "", &[20011]).unwrap(), 1);

        let progress = cond(QuestContent::AddQuestProgress, &[77], "", 10);
        assert_eq!(add_quest_progress(&ctx, &progress, 4, "", &[77]).unwrap(), 5);
        assert_eq!(add_quest_progress(&ctx, &progress, 4, "", &[77, 6]).unwrap(), 10);

        let less = cond(QuestContent::ItemLessThan, &[101, 3], "", 1);
        assert_eq!(item_less_than(&ctx, &less, 0, "", &[101, 2]).unwrap(), 1);
        assert_eq!(item_less_than(&ctx, &less, 1, "", &[101, 3]).unwrap(), 0);

        let unlock = cond(QuestContent::UnlockArea, &[3, 12], "", 1);
        assert_eq!(scene_unlock(&ctx, &unlock, 0, "", &[3, 12]).unwrap(), 1);
        assert_eq!(scene_unlock(&ctx, &unlock, 0, "", &[3]).unwrap(), 0);

        let any_talk = cond(QuestContent::CompleteAnyTalk, &[], "300, 301,302", 1);
        assert_eq!(complete_any_talk(&ctx, &any_talk, 0, "", &[301]).unwrap(), 1);
        assert_eq!(complete_any_talk(&ctx, &any_talk, 0, "", &[303]).unwrap(), 0);
    }

    #[test]
    fn test_game_time_tick_range() {
        let catalog = catalog_of(&[MAIN]);
        let world = TestWorld::default();
        let record = MainQuest::new(1, catalog.main_quest(1).unwrap());
        let main_quests = BTreeMap::new();
        let ctx = world.context(&catalog, &main_quests, &record);

        let night = cond(QuestContent::GameTimeTick, &[], "22,20", 1);
        assert_eq!(game_time_tick(&ctx, &night, 0, "", &[21]).unwrap(), 1);
        assert_eq!(game_time_tick(&ctx, &night, 0, "", &[6]).unwrap(), 0);

        let broken = cond(QuestContent::GameTimeTick, &[], "noon", 1);
        assert!(game_time_tick(&ctx, &broken, 0, "", &[6]).is_err());
    }

    #[test]
    fn test_level_up_falls_back_to_player_level() {
        let catalog = catalog_of(&[MAIN]);
        let world = TestWorld::default();
        world.player.set_level(12);
        let record = MainQuest::new(1, catalog.main_quest(1).unwrap());
        let main_quests = BTreeMap::new();
        let ctx = world.context(&catalog, &main_quests, &record);

        let level = cond(QuestContent::PlayerLevelUp, &[10], "", 1);
        assert_eq!(player_level_up(&ctx, &level, 0, "", &[]).unwrap(), 1);
        assert_eq!(player_level_up(&ctx, &level, 0, "", &[9]).unwrap(), 0);
    }
}
