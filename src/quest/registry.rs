//! Quest Catalog
//!
//! Loads and indexes main quest definitions from TOML files. The catalog is
//! built once at startup and shared read-only afterwards.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::definition::{MainQuestDef, RawQuestFile, SubQuestDef};
use super::events::QuestCond;

/// Immutable index of every main and sub quest definition
#[derive(Debug, Default)]
pub struct QuestCatalog {
    main_quests: HashMap<u32, MainQuestDef>,
    /// sub quest id -> (main quest id, index into its sub quest list)
    sub_index: HashMap<u32, (u32, usize)>,
}

impl QuestCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load all quest definitions below `dir`, recursing into subdirectories
    pub fn load_from_directory(dir: &Path) -> Result<Self, String> {
        let mut catalog = Self::new();
        info!("Loading quests from {:?}", dir);

        if !dir.exists() {
            warn!("Quest directory does not exist: {:?}", dir);
            return Ok(catalog);
        }

        let mut paths = Vec::new();
        collect_toml_files(dir, &mut paths)?;
        paths.sort();

        for path in paths {
            if let Err(e) = catalog.load_quest_file(&path) {
                warn!("Failed to load quest {:?}: {}", path, e);
            }
        }

        info!("Loaded {} main quest definitions", catalog.len());
        catalog.validate();
        Ok(catalog)
    }

    /// Build a catalog from in-memory TOML documents
    pub fn from_toml_documents<'a>(documents: impl IntoIterator<Item = &'a str>) -> Result<Self, String> {
        let mut catalog = Self::new();
        for text in documents {
            let raw: RawQuestFile = toml::from_str(text)
                .map_err(|e| format!("Failed to parse quest document: {}", e))?;
            catalog.insert(MainQuestDef::from_raw(&raw.quest)?)?;
        }
        catalog.validate();
        Ok(catalog)
    }

    fn load_quest_file(&mut self, path: &Path) -> Result<(), String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;

        let raw: RawQuestFile = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse {:?}: {}", path, e))?;

        let def = MainQuestDef::from_raw(&raw.quest)?;
        info!("Loaded main quest: {} ({})", def.name, def.id);
        self.insert(def)
    }

    /// Register a main quest definition. Duplicate main or sub ids are rejected.
    pub fn insert(&mut self, def: MainQuestDef) -> Result<(), String> {
        if self.main_quests.contains_key(&def.id) {
            return Err(format!("Duplicate main quest id {}", def.id));
        }
        for sub in &def.sub_quests {
            if let Some((owner, _)) = self.sub_index.get(&sub.id) {
                return Err(format!(
                    "Sub quest {} of main quest {} is already defined by main quest {}",
                    sub.id, def.id, owner
                ));
            }
        }
        for (index, sub) in def.sub_quests.iter().enumerate() {
            self.sub_index.insert(sub.id, (def.id, index));
        }
        self.main_quests.insert(def.id, def);
        Ok(())
    }

    pub fn main_quest(&self, main_id: u32) -> Option<&MainQuestDef> {
        self.main_quests.get(&main_id)
    }

    pub fn sub_quest(&self, sub_id: u32) -> Option<&SubQuestDef> {
        let (main_id, index) = self.sub_index.get(&sub_id)?;
        self.main_quests.get(main_id)?.sub_quests.get(*index)
    }

    pub fn len(&self) -> usize {
        self.main_quests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.main_quests.is_empty()
    }

    /// Warn about state conditions that point at sub quests nobody defines
    fn validate(&self) {
        for def in self.main_quests.values() {
            for sub in &def.sub_quests {
                for cond in &sub.accept_conds {
                    let refers_to_state = matches!(cond.kind, QuestCond::StateEqual | QuestCond::StateNotEqual);
                    let target = cond.param(0);
                    if refers_to_state && u32::try_from(target).map_or(true, |id| self.sub_quest(id).is_none()) {
                        warn!(
                            "Sub quest {} accepts on state of unknown sub quest {}",
                            sub.id, target
                        );
                    }
                }
            }
        }
    }
}

fn collect_toml_files(dir: &Path, paths: &mut Vec<PathBuf>) -> Result<(), String> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| format!("Failed to read directory {:?}: {}", dir, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| format!("Failed to read entry: {}", e))?;
        let path = entry.path();

        if path.is_dir() {
            collect_toml_files(&path, paths)?;
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            paths.push(path);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const MAIN_303: &str = r#"
        [quest]
        id = 303
        name = "Wind Riders"
        [[quest.sub_quests]]
        id = 30301
        order = 1
        [[quest.sub_quests]]
        id = 30302
        order = 2
    "#;

    #[test]
    fn test_load_from_directory() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("mondstadt");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("303.toml"), MAIN_303).unwrap();
        fs::write(temp.path().join("broken.toml"), "[quest]\nid = \"x\"").unwrap();
        fs::write(temp.path().join("notes.txt"), "ignored").unwrap();

        let catalog = QuestCatalog::load_from_directory(temp.path()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.sub_quest(30302).map(|s| s.main_id), Some(303));
        assert!(catalog.sub_quest(99).is_none());
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let temp = TempDir::new().unwrap();
        let catalog = QuestCatalog::load_from_directory(&temp.path().join("nope")).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_bundled_data_loads() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/quests");
        let catalog = QuestCatalog::load_from_directory(&dir).unwrap();
        let def = catalog.main_quest(303).unwrap();
        assert_eq!(def.first_sub_quest().map(|s| s.id), Some(30301));
        assert!(def.rewind_point(30302).is_some());
    }

    #[test]
    fn test_duplicate_sub_quest_rejected() {
        let clash = r#"
            [quest]
            id = 304
            [[quest.sub_quests]]
            id = 30301
        "#;
        assert!(QuestCatalog::from_toml_documents([MAIN_303, clash]).is_err());
    }
}
