//! 持久化记录模块
//!
//! 同步记录、三级传输日志与解密日志的 SQLite 存储。

pub mod manager;
pub mod types;

pub use manager::RecordManager;
pub use types::{
    compute_rule_status, compute_task_status, AdhocSyncRecord, DecryptLog, FileLog, FileLogStatus,
    RuleLog, RunStatus, TaskLog,
};
