// Partner Relay Rust Library
// 合作方文件中继系统核心库

// 配置管理模块
pub mod config;

// 错误处理模块
pub mod error;

// 日期变量解析模块
pub mod template;

// 进度事件模块
pub mod events;

// 持久化记录模块
pub mod record;

// 映射规则模块
pub mod rules;

// 远程文件存储模块
pub mod remote;

// 解密批次模块
pub mod decrypt;

// 同步编排模块
pub mod sync;

// 导出常用类型
pub use config::AppConfig;
pub use decrypt::{DecryptBatchProcessor, DecryptBatchReport, GpgCommandTool, KeyRotationResolver};
pub use error::{ErrorCategory, RelayError};
pub use events::{ProgressEvent, ProgressPublisher};
pub use record::{RecordManager, RunStatus};
pub use remote::{LocalDirStore, RemoteStore};
pub use rules::{MappingRule, RuleMatcher};
pub use sync::{SyncOrchestrator, SyncRunSummary};
pub use template::DateVariableResolver;
