//! Acceptance condition handlers.

use super::{id_param, slot_param, ConditionContext, ConditionRegistry};
use crate::error::QuestError;
use crate::quest::definition::AcceptCondition;
use crate::quest::events::QuestCond;

pub(super) fn register(registry: &mut ConditionRegistry) {
    registry.register_accept(QuestCond::StateEqual, state_equal);
    registry.register_accept(QuestCond::StateNotEqual, state_not_equal);
    registry.register_accept(QuestCond::CompleteTalk, complete_talk);
    registry.register_accept(QuestCond::LuaNotify, lua_notify);
    registry.register_accept(QuestCond::QuestVarEqual, quest_var_equal);
    registry.register_accept(QuestCond::QuestVarGreater, quest_var_greater);
    registry.register_accept(QuestCond::QuestVarLess, quest_var_less);
    registry.register_accept(QuestCond::PlayerLevelEqualGreater, player_level_equal_greater);
    registry.register_accept(QuestCond::QuestGlobalVarEqual, global_var_equal);
    registry.register_accept(QuestCond::QuestGlobalVarGreater, global_var_greater);
    registry.register_accept(QuestCond::QuestGlobalVarLess, global_var_less);
    registry.register_accept(QuestCond::PackHaveItem, pack_have_item);
    registry.register_accept(QuestCond::ItemNumLessThan, item_num_less_than);
    registry.register_accept(QuestCond::ActivityOpen, activity_open);
    registry.register_accept(QuestCond::ActivityEnd, activity_end);
    registry.register_accept(QuestCond::ActivityCond, activity_cond);
}

/// Params: [sub quest id, state code]
fn state_equal(ctx: &ConditionContext<'_>, cond: &AcceptCondition, _: &str, _: &[i32]) -> Result<bool, QuestError> {
    let sub_id = id_param(cond.kind.as_str(), cond.param(0))?;
    Ok(ctx.quest_state(sub_id).is_some_and(|s| s.code() == cond.param(1)))
}

fn state_not_equal(ctx: &ConditionContext<'_>, cond: &AcceptCondition, _: &str, _: &[i32]) -> Result<bool, QuestError> {
    let sub_id = id_param(cond.kind.as_str(), cond.param(0))?;
    Ok(ctx.quest_state(sub_id).is_some_and(|s| s.code() != cond.param(1)))
}

/// Params: [talk id], matched against the event
fn complete_talk(_: &ConditionContext<'_>, cond: &AcceptCondition, _: &str, params: &[i32]) -> Result<bool, QuestError> {
    Ok(params.first() == Some(&cond.param(0)))
}

fn lua_notify(_: &ConditionContext<'_>, cond: &AcceptCondition, param_str: &str, _: &[i32]) -> Result<bool, QuestError> {
    Ok(!param_str.is_empty() && cond.param_str == param_str)
}

/// Params: [slot, value]
fn quest_var_equal(ctx: &ConditionContext<'_>, cond: &AcceptCondition, _: &str, _: &[i32]) -> Result<bool, QuestError> {
    let slot = slot_param(cond.kind.as_str(), cond.param(0))?;
    Ok(ctx.quest_var(slot) == cond.param(1))
}

fn quest_var_greater(ctx: &ConditionContext<'_>, cond: &AcceptCondition, _: &str, _: &[i32]) -> Result<bool, QuestError> {
    let slot = slot_param(cond.kind.as_str(), cond.param(0))?;
    Ok(ctx.quest_var(slot) > cond.param(1))
}

fn quest_var_less(ctx: &ConditionContext<'_>, cond: &AcceptCondition, _: &str, _: &[i32]) -> Result<bool, QuestError> {
    let slot = slot_param(cond.kind.as_str(), cond.param(0))?;
    Ok(ctx.quest_var(slot) < cond.param(1))
}

fn player_level_equal_greater(ctx: &ConditionContext<'_>, cond: &AcceptCondition, _: &str, _: &[i32]) -> Result<bool, QuestError> {
    Ok(i64::from(ctx.player.level()) >= i64::from(cond.param(0)))
}

/// Params: [variable id, value]
fn global_var_equal(ctx: &ConditionContext<'_>, cond: &AcceptCondition, _: &str, _: &[i32]) -> Result<bool, QuestError> {
    let id = id_param(cond.kind.as_str(), cond.param(0))?;
    Ok(ctx.global_var(id) == cond.param(1))
}

fn global_var_greater(ctx: &ConditionContext<'_>, cond: &AcceptCondition, _: &str, _: &[i32]) -> Result<bool, QuestError> {
    let id = id_param(cond.kind.as_str(), cond.param(0))?;
    Ok(ctx.global_var(id) > cond.param(1))
}

fn global_var_less(ctx: &ConditionContext<'_>, cond: &AcceptCondition, _: &str, _: &[i32]) -> Result<bool, QuestError> {
    let id = id_param(cond.kind.as_str(), cond.param(0))?;
    Ok(ctx.global_var(id) < cond.param(1))
}

/// Params: [item id, count]; a missing count means one
fn pack_have_item(ctx: &ConditionContext<'_>, cond: &AcceptCondition, _: &str, _: &[i32]) -> Result<bool, QuestError> {
    let item_id = id_param(cond.kind.as_str(), cond.param(0))?;
    let needed = i64::from(cond.param(1).max(1));
    Ok(i64::from(ctx.player.item_count(item_id)) >= needed)
}

fn item_num_less_than(ctx: &ConditionContext<'_>, cond: &AcceptCondition, _: &str, _: &[i32]) -> Result<bool, QuestError> {
    let item_id = id_param(cond.kind.as_str(), cond.param(0))?;
    Ok(i64::from(ctx.player.item_count(item_id)) < i64::from(cond.param(1)))
}

fn activity_open(ctx: &ConditionContext<'_>, cond: &AcceptCondition, _: &str, _: &[i32]) -> Result<bool, QuestError> {
    let activity_id = id_param(cond.kind.as_str(), cond.param(0))?;
    Ok(ctx.activities.is_activity_active(activity_id))
}

fn activity_end(ctx: &ConditionContext<'_>, cond: &AcceptCondition, _: &str, _: &[i32]) -> Result<bool, QuestError> {
    let activity_id = id_param(cond.kind.as_str(), cond.param(0))?;
    Ok(ctx.activities.has_activity_ended(activity_id))
}

fn activity_cond(ctx: &ConditionContext<'_>, cond: &AcceptCondition, _: &str, _: &[i32]) -> Result<bool, QuestError> {
    let cond_id = id_param(cond.kind.as_str(), cond.param(0))?;
    Ok(ctx.activities.meets_activity_condition(cond_id))
}
