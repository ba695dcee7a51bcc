// 配置管理模块

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 解密批次配置
    pub decrypt: DecryptConfig,
    /// 密钥轮换配置
    pub keys: KeyConfig,
    /// 同步配置
    pub sync: SyncConfig,
    /// 数据库配置
    pub database: DatabaseConfig,
}

/// 解密批次配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptConfig {
    /// 加密文件投递目录（收件箱，递归扫描）
    pub inbox_dir: PathBuf,
    /// 解密输出根目录（按日期分目录）
    pub output_dir: PathBuf,
}

/// 密钥轮换配置
///
/// 历史上密钥发生过一次切换：切换日之前的文件使用旧密钥（无口令），
/// 切换日当天及之后的文件使用当前密钥（口令从外部文件读取）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyConfig {
    /// 旧密钥文件路径
    pub legacy_key_file: PathBuf,
    /// 当前密钥文件路径
    pub current_key_file: PathBuf,
    /// 当前密钥口令文件路径
    pub passphrase_file: PathBuf,
    /// 密钥切换日（YYYY-MM-DD）
    pub cutover_date: NaiveDate,
}

/// 同步配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// 远程存储根目录（本地挂载实现使用；SFTP 实现由传输层负责）
    pub remote_root: PathBuf,
    /// 重命名冲突策略的最大探测次数
    pub max_rename_attempts: u32,
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite 数据库文件路径
    pub db_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            decrypt: DecryptConfig {
                inbox_dir: PathBuf::from("data/inbox"),
                output_dir: PathBuf::from("data/decrypted"),
            },
            keys: KeyConfig {
                legacy_key_file: PathBuf::from("keys/legacy.asc"),
                current_key_file: PathBuf::from("keys/current.asc"),
                passphrase_file: PathBuf::from("keys/current.pass"),
                // 历史切换日，部署后不再变化
                cutover_date: NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(),
            },
            sync: SyncConfig {
                remote_root: PathBuf::from("data/remote"),
                max_rename_attempts: 100,
            },
            database: DatabaseConfig {
                db_path: PathBuf::from("data/relay.db"),
            },
        }
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        // 确保父目录存在
        if let Some(parent) = std::path::Path::new(path).parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        fs::write(path, content)
            .await
            .context("Failed to write config file")?;

        Ok(())
    }

    /// 加载或创建默认配置
    pub async fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path).await {
            Ok(config) => {
                tracing::info!("配置文件加载成功: {}", path);
                config
            }
            Err(e) => {
                tracing::warn!("配置文件加载失败，使用默认配置: {}", e);
                let default_config = Self::default();

                if let Err(e) = default_config.save_to_file(path).await {
                    tracing::error!("保存默认配置失败: {}", e);
                }

                default_config
            }
        }
    }

    /// 验证配置自洽性
    pub fn validate(&self) -> Result<()> {
        if self.sync.max_rename_attempts == 0 {
            anyhow::bail!("max_rename_attempts 必须大于 0");
        }
        if self.keys.legacy_key_file == self.keys.current_key_file {
            anyhow::bail!("旧密钥与当前密钥不能指向同一文件");
        }
        Ok(())
    }
}
