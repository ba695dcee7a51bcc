//! 远程文件存储模块
//!
//! 同步核心消费的抽象存储契约。会话是单一有状态连接，重连与
//! 退避由具体实现负责，编排器只在每批远程操作前做存活探测。
//! 通过构造函数注入编排器，不使用全局单例。

pub mod local;

#[cfg(test)]
pub mod testing;

use async_trait::async_trait;
use std::path::Path;

use crate::error::RelayError;

pub use local::LocalDirStore;

/// 远程目录项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// 条目名称
    pub name: String,
    /// 是否为目录
    pub is_dir: bool,
    /// 文件大小（目录为 0）
    pub size: u64,
}

/// 远程文件存储契约
///
/// 生产环境由 SFTP 传输层实现（协作方，不在本仓库内）；
/// 本仓库自带挂载目录实现 [`LocalDirStore`] 供命令行与测试使用。
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// 路径是否存在
    async fn exists(&self, path: &str) -> Result<bool, RelayError>;

    /// 列举目录
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>, RelayError>;

    /// 创建目录
    async fn mkdir(&self, path: &str, recursive: bool) -> Result<(), RelayError>;

    /// 上传本地文件到远程路径
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<(), RelayError>;

    /// 删除文件或目录
    async fn delete(&self, path: &str) -> Result<(), RelayError>;

    /// 会话存活探测
    async fn is_alive(&self) -> bool;

    /// 确保会话可用（必要时重连）
    async fn ensure_connection(&self) -> Result<(), RelayError>;
}
