//! Static override tables applied by the orchestrator.

use std::collections::HashMap;

/// Main quests created for every new player
pub const DEFAULT_STARTER_MAIN_QUESTS: &[u32] = &[
    303, 318, 348, 349, 350, 351, 416, 500, 501, 502, 503, 504, 505, 506, 507, 508, 509, 20000,
    20507, 20509, 21004, 21005, 21010, 21011, 21016, 21017, 21020, 21021, 21025, 40063, 70121,
    70124, 70511, 71010, 71012, 71013, 71015, 71016, 71017, 71555,
];

/// Main quests that start alongside another main quest
pub const DEFAULT_COMPANIONS: &[(u32, &[u32])] = &[(355, &[361, 418, 423, 20509])];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestPolicy {
    pub starter_main_quests: Vec<u32>,
    pub companions: HashMap<u32, Vec<u32>>,
}

impl QuestPolicy {
    pub fn new(starter_main_quests: Vec<u32>, companions: HashMap<u32, Vec<u32>>) -> Self {
        Self { starter_main_quests, companions }
    }

    pub fn companions_of(&self, main_quest_id: u32) -> &[u32] {
        self.companions
            .get(&main_quest_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl Default for QuestPolicy {
    fn default() -> Self {
        Self {
            starter_main_quests: DEFAULT_STARTER_MAIN_QUESTS.to_vec(),
            companions: DEFAULT_COMPANIONS
                .iter()
                .map(|(id, list)| (*id, list.to_vec()))
                .collect(),
        }
    }
}
