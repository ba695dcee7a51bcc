//! 密钥轮换解析
//!
//! 历史上发生过一次密钥切换：切换日之前（严格小于）的批次使用
//! 旧密钥，切换日当天及之后使用当前密钥。口令按选中的密钥身份
//! 解析：旧密钥无口令，当前密钥从外部口令文件读取（去除首尾
//! 空白），其余密钥身份视为配置错误。

use chrono::NaiveDate;
use std::path::{Path, PathBuf};

use crate::config::KeyConfig;
use crate::error::RelayError;

/// 密钥轮换解析器
#[derive(Debug, Clone)]
pub struct KeyRotationResolver {
    /// 旧密钥文件
    legacy_key_file: PathBuf,
    /// 当前密钥文件
    current_key_file: PathBuf,
    /// 当前密钥口令文件
    passphrase_file: PathBuf,
    /// 切换日
    cutover_date: NaiveDate,
}

impl KeyRotationResolver {
    /// 从配置创建
    pub fn from_config(keys: &KeyConfig) -> Self {
        Self {
            legacy_key_file: keys.legacy_key_file.clone(),
            current_key_file: keys.current_key_file.clone(),
            passphrase_file: keys.passphrase_file.clone(),
            cutover_date: keys.cutover_date,
        }
    }

    /// 按日期选择密钥文件（严格小于切换日 → 旧密钥）
    pub fn resolve_key_file(&self, date: NaiveDate) -> &Path {
        if date < self.cutover_date {
            &self.legacy_key_file
        } else {
            &self.current_key_file
        }
    }

    /// 按密钥身份解析口令
    ///
    /// 返回 `None` 表示该密钥无需口令。
    pub fn resolve_passphrase(&self, key_file: &Path) -> Result<Option<String>, RelayError> {
        if key_file == self.legacy_key_file {
            return Ok(None);
        }

        if key_file == self.current_key_file {
            let raw = std::fs::read_to_string(&self.passphrase_file).map_err(|e| {
                RelayError::PassphraseUnreadable(format!(
                    "{}: {}",
                    self.passphrase_file.display(),
                    e
                ))
            })?;
            return Ok(Some(raw.trim().to_string()));
        }

        Err(RelayError::UnknownKey(key_file.display().to_string()))
    }
}
