//! Player state consulted by quest conditions.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};

use crate::ports::PlayerWorld;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl From<[f32; 3]> for Vec3 {
    fn from(v: [f32; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// Position and facing of a player avatar
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
}

/// A self-contained player model for hosts without their own world state
pub struct InMemoryPlayer {
    level: AtomicU32,
    items: DashMap<u32, u32>,
    /// (scene, point) pairs
    unlocked_points: DashSet<(u32, u32)>,
    /// (scene, area) pairs
    unlocked_areas: DashSet<(u32, u32)>,
    transform: Mutex<Transform>,
}

impl InMemoryPlayer {
    pub fn new(level: u32) -> Self {
        Self {
            level: AtomicU32::new(level),
            items: DashMap::new(),
            unlocked_points: DashSet::new(),
            unlocked_areas: DashSet::new(),
            transform: Mutex::new(Transform::default()),
        }
    }

    pub fn set_level(&self, level: u32) {
        self.level.store(level, Ordering::Relaxed);
    }

    /// Add items to the pack, returning the new count
    pub fn add_item(&self, item_id: u32, count: u32) -> u32 {
        let mut entry = self.items.entry(item_id).or_insert(0);
        *entry = entry.saturating_add(count);
        *entry
    }

    /// Remove items from the pack, returning the new count
    pub fn remove_item(&self, item_id: u32, count: u32) -> u32 {
        let mut entry = self.items.entry(item_id).or_insert(0);
        *entry = entry.saturating_sub(count);
        *entry
    }

    pub fn unlock_scene_point(&self, scene_id: u32, point_id: u32) {
        self.unlocked_points.insert((scene_id, point_id));
    }

    pub fn unlock_scene_area(&self, scene_id: u32, area_id: u32) {
        self.unlocked_areas.insert((scene_id, area_id));
    }
}

impl Default for InMemoryPlayer {
    fn default() -> Self {
        Self::new(1)
    }
}

impl PlayerWorld for InMemoryPlayer {
    fn level(&self) -> u32 {
        self.level.load(Ordering::Relaxed)
    }

    fn item_count(&self, item_id: u32) -> u32 {
        self.items.get(&item_id).map(|c| *c).unwrap_or(0)
    }

    fn is_scene_point_unlocked(&self, scene_id: u32, point_id: u32) -> bool {
        self.unlocked_points.contains(&(scene_id, point_id))
    }

    fn is_scene_area_unlocked(&self, scene_id: u32, area_id: u32) -> bool {
        self.unlocked_areas.contains(&(scene_id, area_id))
    }

    fn transform(&self) -> Transform {
        *self.transform.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_transform(&self, transform: Transform) {
        *self.transform.lock().unwrap_or_else(PoisonError::into_inner) = transform;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_counts_saturate() {
        let player = InMemoryPlayer::default();
        assert_eq!(player.add_item(101, 3), 3);
        assert_eq!(player.remove_item(101, 5), 0);
        assert_eq!(player.item_count(101), 0);
        assert_eq!(player.item_count(999), 0);
    }

    #[test]
    fn test_unlocks_are_scene_scoped() {
        let player = InMemoryPlayer::default();
        player.unlock_scene_point(3, 7);
        assert!(player.is_scene_point_unlocked(3, 7));
        assert!(!player.is_scene_point_unlocked(4, 7));
        assert!(!player.is_scene_area_unlocked(3, 7));
    }
}
