//! 中继错误处理模块
//!
//! 提供统一的错误分类、可重试判断和用户友好的错误消息

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 中继错误
#[derive(Debug, Error)]
pub enum RelayError {
    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 文件系统错误
    #[error("文件系统错误: {0}")]
    FileSystemError(String),

    /// 文件不存在
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    /// 目录不存在
    #[error("目录不存在: {0}")]
    DirectoryNotFound(String),

    /// 未知密钥标识
    #[error("未知密钥标识: {0}")]
    UnknownKey(String),

    /// 口令文件不可读
    #[error("口令文件不可读: {0}")]
    PassphraseUnreadable(String),

    /// 密钥导入失败
    #[error("密钥导入失败: {0}")]
    KeyImportError(String),

    /// 解密失败
    #[error("解密失败: {0}")]
    DecryptError(String),

    /// 匹配模式无效
    #[error("匹配模式无效: {0}")]
    PatternError(String),

    /// 传输失败
    #[error("传输失败: {0}")]
    TransferError(String),

    /// 远程会话不可用
    #[error("远程会话不可用: {0}")]
    RemoteUnavailable(String),

    /// 重命名探测次数耗尽
    #[error("重命名探测次数耗尽: {path} (已尝试 {attempts} 次)")]
    ConflictExhausted { path: String, attempts: u32 },

    /// 数据库错误
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    /// 操作超时
    #[error("操作超时: {0}")]
    Timeout(String),

    /// 未知错误
    #[error("未知错误: {0}")]
    Unknown(String),
}

impl RelayError {
    /// 获取错误分类
    pub fn category(&self) -> ErrorCategory {
        classify_error(self)
    }

    /// 是否可重试
    pub fn is_retryable(&self) -> bool {
        matches!(self.category(), ErrorCategory::Transient)
    }
}

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// 临时错误（可重试）
    Transient,
    /// 永久错误（不可重试）
    Permanent,
    /// 资源错误（需要人工干预）
    Resource,
    /// 配置错误（需要修改配置）
    Configuration,
}

/// 错误分类函数
pub fn classify_error(error: &RelayError) -> ErrorCategory {
    match error {
        RelayError::ConfigError(_) => ErrorCategory::Configuration,
        RelayError::UnknownKey(_) => ErrorCategory::Configuration,
        RelayError::PassphraseUnreadable(_) => ErrorCategory::Configuration,
        RelayError::TransferError(_) => ErrorCategory::Transient,
        RelayError::RemoteUnavailable(_) => ErrorCategory::Transient,
        RelayError::Timeout(_) => ErrorCategory::Transient,
        RelayError::FileNotFound(_) | RelayError::DirectoryNotFound(_) => ErrorCategory::Resource,
        RelayError::FileSystemError(_) => ErrorCategory::Resource,
        RelayError::KeyImportError(_) => ErrorCategory::Permanent,
        RelayError::DecryptError(_) => ErrorCategory::Permanent,
        RelayError::PatternError(_) => ErrorCategory::Permanent,
        RelayError::ConflictExhausted { .. } => ErrorCategory::Permanent,
        RelayError::DatabaseError(_) => ErrorCategory::Permanent,
        RelayError::Unknown(_) => ErrorCategory::Permanent,
    }
}

/// 从 std::io::Error 转换
impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => RelayError::FileNotFound(err.to_string()),
            std::io::ErrorKind::TimedOut => RelayError::Timeout(err.to_string()),
            _ => RelayError::FileSystemError(err.to_string()),
        }
    }
}

/// 从 anyhow::Error 转换
impl From<anyhow::Error> for RelayError {
    fn from(err: anyhow::Error) -> Self {
        // 尝试向下转换为具体错误类型
        if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
            return match io_err.kind() {
                std::io::ErrorKind::NotFound => RelayError::FileNotFound(io_err.to_string()),
                std::io::ErrorKind::TimedOut => RelayError::Timeout(io_err.to_string()),
                _ => RelayError::FileSystemError(io_err.to_string()),
            };
        }

        RelayError::Unknown(err.to_string())
    }
}

/// 从 rusqlite::Error 转换
impl From<rusqlite::Error> for RelayError {
    fn from(err: rusqlite::Error) -> Self {
        RelayError::DatabaseError(err.to_string())
    }
}

/// 从 regex::Error 转换
impl From<regex::Error> for RelayError {
    fn from(err: regex::Error) -> Self {
        RelayError::PatternError(err.to_string())
    }
}
