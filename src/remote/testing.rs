//! 测试用内存远程存储

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use super::{RemoteEntry, RemoteStore};
use crate::error::RelayError;

/// 内存远程存储
///
/// 记录上传动作并支持注入存在性检查失败与上传失败，
/// 用于冲突裁决与编排器的行为测试。
#[derive(Default)]
pub struct MockRemoteStore {
    /// 已存在的远程路径
    pub existing: Mutex<HashSet<String>>,
    /// 已执行的上传 (local, remote)
    pub uploads: Mutex<Vec<(String, String)>>,
    /// 存在性检查是否失败
    pub fail_exists: AtomicBool,
    /// 接下来 N 次上传失败
    pub fail_uploads_remaining: AtomicU32,
}

impl MockRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置远程已存在的路径
    pub fn with_existing(paths: &[&str]) -> Self {
        let store = Self::default();
        {
            let mut existing = store.existing.lock();
            for p in paths {
                existing.insert(p.to_string());
            }
        }
        store
    }

    /// 注入接下来 N 次上传失败
    pub fn fail_next_uploads(&self, n: u32) {
        self.fail_uploads_remaining.store(n, Ordering::SeqCst);
    }

    /// 已上传的远程路径列表
    pub fn uploaded_paths(&self) -> Vec<String> {
        self.uploads.lock().iter().map(|(_, r)| r.clone()).collect()
    }
}

#[async_trait]
impl RemoteStore for MockRemoteStore {
    async fn exists(&self, path: &str) -> Result<bool, RelayError> {
        if self.fail_exists.load(Ordering::SeqCst) {
            return Err(RelayError::RemoteUnavailable("exists check failed".to_string()));
        }
        Ok(self.existing.lock().contains(path))
    }

    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>, RelayError> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        Ok(self
            .existing
            .lock()
            .iter()
            .filter(|p| p.starts_with(&prefix))
            .map(|p| RemoteEntry {
                name: p[prefix.len()..].to_string(),
                is_dir: false,
                size: 0,
            })
            .collect())
    }

    async fn mkdir(&self, _path: &str, _recursive: bool) -> Result<(), RelayError> {
        Ok(())
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<(), RelayError> {
        let remaining = self.fail_uploads_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_uploads_remaining
                .store(remaining - 1, Ordering::SeqCst);
            return Err(RelayError::TransferError("injected upload failure".to_string()));
        }

        self.uploads
            .lock()
            .push((local_path.display().to_string(), remote_path.to_string()));
        self.existing.lock().insert(remote_path.to_string());
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), RelayError> {
        self.existing.lock().remove(path);
        Ok(())
    }

    async fn is_alive(&self) -> bool {
        true
    }

    async fn ensure_connection(&self) -> Result<(), RelayError> {
        Ok(())
    }
}
