//! 冲突裁决器
//!
//! 对一个目标路径和一种冲突策略，决定最终路径与是否继续上传：
//! - skip：目标已存在则跳过；存在性检查失败按"不存在"处理
//!   （乐观策略，宁可尝试上传也不静默丢文件）
//! - overwrite：总是按原路径上传，不做检查
//! - rename：依次探测 name_1.ext、name_2.ext、…，直到找到空位；
//!   探测本身失败时按当前探测路径直接上传；探测次数有上限，
//!   耗尽返回 ConflictExhausted

use crate::error::RelayError;
use crate::remote::RemoteStore;
use crate::rules::types::ConflictPolicy;

/// 裁决动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictAction {
    /// 上传
    Upload,
    /// 跳过
    Skip,
}

/// 裁决结果
#[derive(Debug, Clone)]
pub struct ConflictDecision {
    /// 动作
    pub action: ConflictAction,
    /// 最终路径
    pub final_path: String,
    /// 原因说明
    pub reason: Option<String>,
}

/// 冲突裁决器
pub struct ConflictResolver {
    /// rename 策略的最大探测次数
    max_rename_attempts: u32,
}

impl ConflictResolver {
    /// 创建新的冲突裁决器
    pub fn new(max_rename_attempts: u32) -> Self {
        Self {
            max_rename_attempts,
        }
    }

    /// 裁决目标路径
    pub async fn resolve(
        &self,
        store: &dyn RemoteStore,
        policy: ConflictPolicy,
        dest_path: &str,
    ) -> Result<ConflictDecision, RelayError> {
        match policy {
            ConflictPolicy::Overwrite => Ok(ConflictDecision {
                action: ConflictAction::Upload,
                final_path: dest_path.to_string(),
                reason: None,
            }),

            ConflictPolicy::Skip => match store.exists(dest_path).await {
                Ok(true) => Ok(ConflictDecision {
                    action: ConflictAction::Skip,
                    final_path: dest_path.to_string(),
                    reason: Some("目标文件已存在".to_string()),
                }),
                Ok(false) => Ok(ConflictDecision {
                    action: ConflictAction::Upload,
                    final_path: dest_path.to_string(),
                    reason: None,
                }),
                Err(e) => {
                    // 检查失败按不存在处理
                    tracing::warn!("存在性检查失败，按不存在处理: {} ({})", dest_path, e);
                    Ok(ConflictDecision {
                        action: ConflictAction::Upload,
                        final_path: dest_path.to_string(),
                        reason: None,
                    })
                }
            },

            ConflictPolicy::Rename => self.resolve_rename(store, dest_path).await,
        }
    }

    /// rename 策略：探测空位
    async fn resolve_rename(
        &self,
        store: &dyn RemoteStore,
        dest_path: &str,
    ) -> Result<ConflictDecision, RelayError> {
        // 原路径无冲突时不重命名
        match store.exists(dest_path).await {
            Ok(false) | Err(_) => {
                return Ok(ConflictDecision {
                    action: ConflictAction::Upload,
                    final_path: dest_path.to_string(),
                    reason: None,
                });
            }
            Ok(true) => {}
        }

        for attempt in 1..=self.max_rename_attempts {
            let candidate = renamed_path(dest_path, attempt);
            match store.exists(&candidate).await {
                Ok(true) => continue,
                Ok(false) => {
                    return Ok(ConflictDecision {
                        action: ConflictAction::Upload,
                        final_path: candidate,
                        reason: Some(format!("目标已存在，重命名为第 {} 号", attempt)),
                    });
                }
                Err(e) => {
                    // 探测失败时按当前探测路径直接上传
                    tracing::warn!("重命名探测失败，按当前路径上传: {} ({})", candidate, e);
                    return Ok(ConflictDecision {
                        action: ConflictAction::Upload,
                        final_path: candidate,
                        reason: Some(format!("探测失败，使用第 {} 号", attempt)),
                    });
                }
            }
        }

        Err(RelayError::ConflictExhausted {
            path: dest_path.to_string(),
            attempts: self.max_rename_attempts,
        })
    }
}

/// 生成第 n 号重命名路径：`/dir/name.ext` → `/dir/name_n.ext`
fn renamed_path(path: &str, n: u32) -> String {
    match path.rfind('/') {
        Some(slash) => {
            let (dir, name) = path.split_at(slash + 1);
            format!("{}{}", dir, renamed_name(name, n))
        }
        None => renamed_name(path, n),
    }
}

fn renamed_name(name: &str, n: u32) -> String {
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{}_{}.{}", &name[..dot], n, &name[dot + 1..]),
        _ => format!("{}_{}", name, n),
    }
}
