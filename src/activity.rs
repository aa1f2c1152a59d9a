//! Activity time windows backing the activity acceptance conditions.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::ports::ActivityOracle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ActivityWindow {
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct RawActivity {
    id: u32,
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
struct RawActivityFile {
    #[serde(default)]
    activity: Vec<RawActivity>,
    #[serde(default)]
    satisfied_conditions: Vec<u32>,
}

#[derive(Debug, Default, Clone)]
pub struct ActivitySchedule {
    windows: HashMap<u32, ActivityWindow>,
    satisfied: HashSet<u32>,
}

impl ActivitySchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `activities.toml`. A missing file yields an empty schedule.
    pub fn load_from_file(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            warn!("Activity file not found: {:?}", path);
            return Ok(Self::new());
        }
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
        let schedule = Self::from_toml(&content)
            .map_err(|e| format!("Failed to parse {:?}: {}", path, e))?;
        info!("Loaded {} activities", schedule.windows.len());
        Ok(schedule)
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        let raw: RawActivityFile = toml::from_str(content)?;
        let mut schedule = Self::new();
        for activity in raw.activity {
            if activity.end < activity.begin {
                warn!("Activity {} ends before it begins", activity.id);
            }
            schedule.insert(activity.id, activity.begin, activity.end);
        }
        schedule.satisfied.extend(raw.satisfied_conditions);
        Ok(schedule)
    }

    pub fn insert(&mut self, id: u32, begin: DateTime<Utc>, end: DateTime<Utc>) {
        self.windows.insert(id, ActivityWindow { begin, end });
    }

    pub fn satisfy_condition(&mut self, cond_id: u32) {
        self.satisfied.insert(cond_id);
    }

    pub fn window(&self, id: u32) -> Option<ActivityWindow> {
        self.windows.get(&id).copied()
    }

    pub fn is_active_at(&self, id: u32, now: DateTime<Utc>) -> bool {
        self.windows
            .get(&id)
            .is_some_and(|w| w.begin < now && now < w.end)
    }

    /// Unknown activities count as ended
    pub fn has_ended_at(&self, id: u32, now: DateTime<Utc>) -> bool {
        self.windows.get(&id).is_none_or(|w| now > w.end)
    }
}

impl ActivityOracle for ActivitySchedule {
    fn is_activity_active(&self, activity_id: u32) -> bool {
        self.is_active_at(activity_id, Utc::now())
    }

    fn has_activity_ended(&self, activity_id: u32) -> bool {
        self.has_ended_at(activity_id, Utc::now())
    }

    fn meets_activity_condition(&self, cond_id: u32) -> bool {
        self.satisfied.contains(&cond_id)
    }
}
