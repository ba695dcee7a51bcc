//! 同步编排模块
//!
//! 规则驱动的同步运行：优先级排序、周期门控、冲突裁决、
//! 有界重试传输与三级日志汇总。

pub mod conflict;
pub mod orchestrator;

pub use conflict::{ConflictAction, ConflictDecision, ConflictResolver};
pub use orchestrator::{RuleRunResult, SyncOrchestrator, SyncRunSummary};
