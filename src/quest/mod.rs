//! Quest System Module
//!
//! Static quest definitions loaded from TOML, per-player quest records and the
//! orchestrator that moves them forward as gameplay events arrive.

pub mod conditions;
pub mod definition;
pub mod events;
pub mod logic;
pub mod orchestrator;
pub mod policy;
mod precheck;
pub mod recovery;
pub mod registry;
pub mod state;
pub mod variables;

pub use conditions::{ConditionContext, ConditionRegistry};
pub use definition::{MainQuestDef, QuestExec, QuestExecKind, RewindPoint, SubQuestDef};
pub use events::{EventKind, QuestCond, QuestContent, QuestEvent};
pub use logic::LogicType;
pub use orchestrator::{QuestCommand, QuestOrchestrator, QuestServices};
pub use policy::QuestPolicy;
pub use registry::QuestCatalog;
pub use state::{MainQuest, ParentQuestState, QuestState, SubQuest};
pub use variables::GlobalVariableStore;
