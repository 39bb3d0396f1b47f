//! Feedback processor for the Vigil quality gate.
//!
//! Categorizes the issues of a failed verdict, clusters related findings,
//! builds a dependency-ordered refinement plan, and runs it through
//! stage-executor capabilities with bounded parallelism.

pub mod analysis;
pub mod categorize;
pub mod executor;
pub mod learning;
pub mod patterns;
pub mod plan;
pub mod processor;
pub mod scheduler;

pub use analysis::{analyze, ActionableItem, CategoryGroup, FeedbackAnalysis};
pub use categorize::{categorize, IssueCategory, CATEGORY_KEYWORDS};
pub use executor::{CapabilityRouter, StageContext, StageExecutor, StageReport, StageTask};
pub use learning::{
    signature, LearningInsights, LearningRecord, LearningStore, PatternInsight, Strategy,
    StrategyInsight,
};
pub use patterns::{identify_patterns, normalize_message, IssuePattern};
pub use plan::{
    action_template, base_effort, build_plan, estimate_effort, prerequisite, ActionTemplate,
    RefinementPlan, RefinementStage, ARCHITECT, BUILDER, DOCUMENTER,
};
pub use processor::{
    FeedbackConfig, FeedbackOptions, FeedbackOutcome, FeedbackProcessor, FeedbackStatistics,
};
pub use scheduler::{
    check_acyclic, improvement_score, schedule_plan, RefinementResult, ScheduleOptions,
    StageOutcome,
};
