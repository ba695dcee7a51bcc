//! 映射规则模块
//!
//! 规则数据结构与候选文件匹配。

pub mod matcher;
pub mod types;

pub use matcher::RuleMatcher;
pub use types::{
    BusinessModule, ConflictPolicy, DestinationSpec, FileCandidate, FileTypeEntry, MappingRule,
    MatchSpec, RetryConfig, SchedulePeriod, UploadEntry,
};
