//! 外部解密工具
//!
//! 解密由外部 gpg 进程完成，核心只依赖抽象契约：导入密钥与
//! 解密单个文件，均为阻塞式外部进程调用，返回成功或错误消息。

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::error::RelayError;

/// 解密工具契约
#[async_trait]
pub trait DecryptTool: Send + Sync {
    /// 导入密钥（每批次一次，幂等）
    async fn import_key(&self, key_file: &Path, passphrase: Option<&str>)
        -> Result<(), RelayError>;

    /// 解密单个文件到输出目录，返回解密产物路径
    async fn decrypt(
        &self,
        input: &Path,
        output_dir: &Path,
        key_file: &Path,
        passphrase: Option<&str>,
    ) -> Result<PathBuf, RelayError>;
}

/// gpg 命令行实现
pub struct GpgCommandTool {
    /// gpg 可执行文件
    gpg_bin: String,
}

impl GpgCommandTool {
    /// 创建新的 gpg 工具
    pub fn new() -> Self {
        Self {
            gpg_bin: "gpg".to_string(),
        }
    }

    /// 指定 gpg 可执行文件路径
    pub fn with_binary(gpg_bin: impl Into<String>) -> Self {
        Self {
            gpg_bin: gpg_bin.into(),
        }
    }

    /// 解密产物文件名：去掉加密扩展名
    fn output_name(input: &Path) -> String {
        input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "decrypted.out".to_string())
    }
}

impl Default for GpgCommandTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DecryptTool for GpgCommandTool {
    async fn import_key(
        &self,
        key_file: &Path,
        _passphrase: Option<&str>,
    ) -> Result<(), RelayError> {
        let output = Command::new(&self.gpg_bin)
            .arg("--batch")
            .arg("--yes")
            .arg("--import")
            .arg(key_file)
            .output()
            .await
            .map_err(|e| RelayError::KeyImportError(format!("无法启动 gpg: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RelayError::KeyImportError(format!(
                "{}: {}",
                key_file.display(),
                stderr.trim()
            )));
        }

        tracing::info!("密钥导入成功: {}", key_file.display());
        Ok(())
    }

    async fn decrypt(
        &self,
        input: &Path,
        output_dir: &Path,
        _key_file: &Path,
        passphrase: Option<&str>,
    ) -> Result<PathBuf, RelayError> {
        let output_path = output_dir.join(Self::output_name(input));

        let mut cmd = Command::new(&self.gpg_bin);
        cmd.arg("--batch").arg("--yes");

        if let Some(phrase) = passphrase {
            cmd.arg("--pinentry-mode")
                .arg("loopback")
                .arg("--passphrase")
                .arg(phrase);
        }

        cmd.arg("--output").arg(&output_path).arg("--decrypt").arg(input);

        let output = cmd
            .output()
            .await
            .map_err(|e| RelayError::DecryptError(format!("无法启动 gpg: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RelayError::DecryptError(format!(
                "{}: {}",
                input.display(),
                stderr.trim()
            )));
        }

        Ok(output_path)
    }
}
