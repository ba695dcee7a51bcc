//! 挂载目录存储实现
//!
//! 把远程路径映射到本地挂载的根目录下。命令行与测试使用；
//! 生产环境的 SFTP 会话由传输层协作方提供。

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs;

use super::{RemoteEntry, RemoteStore};
use crate::error::RelayError;

/// 挂载目录存储
pub struct LocalDirStore {
    /// 挂载根目录
    root: PathBuf,
    /// 连接标记（挂载点可用性）
    connected: AtomicBool,
}

impl LocalDirStore {
    /// 创建新的挂载目录存储
    pub fn new(root: PathBuf) -> Self {
        let connected = root.is_dir();
        Self {
            root,
            connected: AtomicBool::new(connected),
        }
    }

    /// 当前连接标记（最近一次探测的结果）
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// 远程路径映射到挂载点下的本地路径
    fn resolve(&self, remote_path: &str) -> PathBuf {
        self.root.join(remote_path.trim_start_matches('/'))
    }
}

#[async_trait]
impl RemoteStore for LocalDirStore {
    async fn exists(&self, path: &str) -> Result<bool, RelayError> {
        let resolved = self.resolve(path);
        fs::try_exists(&resolved)
            .await
            .map_err(|e| RelayError::RemoteUnavailable(e.to_string()))
    }

    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>, RelayError> {
        let resolved = self.resolve(path);
        let mut entries = Vec::new();

        let mut read_dir = fs::read_dir(&resolved)
            .await
            .map_err(|e| RelayError::RemoteUnavailable(e.to_string()))?;
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| RelayError::RemoteUnavailable(e.to_string()))?
        {
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| RelayError::RemoteUnavailable(e.to_string()))?;
            entries.push(RemoteEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                is_dir: metadata.is_dir(),
                size: if metadata.is_dir() { 0 } else { metadata.len() },
            });
        }

        Ok(entries)
    }

    async fn mkdir(&self, path: &str, recursive: bool) -> Result<(), RelayError> {
        let resolved = self.resolve(path);
        let result = if recursive {
            fs::create_dir_all(&resolved).await
        } else {
            fs::create_dir(&resolved).await
        };
        result.map_err(|e| RelayError::RemoteUnavailable(e.to_string()))
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<(), RelayError> {
        let resolved = self.resolve(remote_path);
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| RelayError::RemoteUnavailable(e.to_string()))?;
        }

        fs::copy(local_path, &resolved)
            .await
            .map_err(|e| RelayError::TransferError(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), RelayError> {
        let resolved = self.resolve(path);
        let result = if resolved.is_dir() {
            fs::remove_dir_all(&resolved).await
        } else {
            fs::remove_file(&resolved).await
        };
        result.map_err(|e| RelayError::RemoteUnavailable(e.to_string()))
    }

    async fn is_alive(&self) -> bool {
        let alive = self.root.is_dir();
        self.connected.store(alive, Ordering::SeqCst);
        alive
    }

    async fn ensure_connection(&self) -> Result<(), RelayError> {
        if self.root.is_dir() {
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        } else {
            self.connected.store(false, Ordering::SeqCst);
            Err(RelayError::RemoteUnavailable(format!(
                "挂载点不存在: {}",
                self.root.display()
            )))
        }
    }
}
