//! 解密批次模块
//!
//! 提供按日期的批次解密能力，支持：
//! - 收件箱递归扫描（按文件名 8 位日期令牌分批）
//! - 密钥轮换（单次历史切换，按日期选择密钥与口令）
//! - 每批次一次的密钥导入
//! - 逐文件顺序解密/复制与进度事件
//! - 日级解密日志

pub mod keys;
pub mod processor;
pub mod tool;

pub use keys::KeyRotationResolver;
pub use processor::{DecryptBatchProcessor, DecryptBatchReport, GpgFileDescriptor};
pub use tool::{DecryptTool, GpgCommandTool};
