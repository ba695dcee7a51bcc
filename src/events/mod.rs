//! 进度事件模块
//!
//! 定义解密批次与同步运行的进度事件，以及显式的发布/订阅抽象。
//!
//! 投递语义是明确的契约：发布端永不阻塞、永不使运行失败；
//! 订阅端至多收到一次，落后或断开的订阅者会错过后续事件
//! （广播通道有界，无背压）。

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// 进度事件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// 解密批次进度（每个文件处理前发出一次）
    DecryptProgress(DecryptProgressEvent),
    /// 解密批次完成
    DecryptComplete(DecryptCompleteEvent),
    /// 同步规则开始处理
    SyncRuleStarted(SyncRuleStartedEvent),
    /// 同步单文件结果
    SyncFileResult(SyncFileResultEvent),
    /// 同步运行完成
    SyncTaskCompleted(SyncTaskCompletedEvent),
}

impl ProgressEvent {
    /// 获取事件类型名称
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::DecryptProgress(_) => "decrypt_progress",
            Self::DecryptComplete(_) => "decrypt_complete",
            Self::SyncRuleStarted(_) => "sync_rule_started",
            Self::SyncFileResult(_) => "sync_file_result",
            Self::SyncTaskCompleted(_) => "sync_task_completed",
        }
    }
}

/// 解密批次进度事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptProgressEvent {
    pub date: NaiveDate,
    pub total: usize,
    pub processed: usize,
    pub decrypted: usize,
    pub copied: usize,
    pub failed: usize,
    pub current_file: String,
    pub timestamp: DateTime<Utc>,
}

/// 解密批次完成事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptCompleteEvent {
    pub date: NaiveDate,
    pub total: usize,
    pub processed: usize,
    pub decrypted: usize,
    pub copied: usize,
    pub failed: usize,
    pub timestamp: DateTime<Utc>,
}

/// 同步规则开始事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRuleStartedEvent {
    pub task_id: String,
    pub rule_id: String,
    pub description: String,
    pub candidate_count: usize,
    pub timestamp: DateTime<Utc>,
}

/// 同步单文件结果事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncFileResultEvent {
    pub task_id: String,
    pub rule_id: String,
    pub file_name: String,
    /// success / skipped / fail
    pub status: String,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// 同步运行完成事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncTaskCompletedEvent {
    pub task_id: String,
    pub date: NaiveDate,
    pub total_rules: usize,
    pub synced: usize,
    pub skipped: usize,
    pub failed: usize,
    pub timestamp: DateTime<Utc>,
}

/// 进度发布器
///
/// 基于有界广播通道的发布/订阅：零个或多个订阅者，发布端不感知
/// 订阅者存在与否。
#[derive(Debug, Clone)]
pub struct ProgressPublisher {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressPublisher {
    /// 创建新的进度发布器
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// 使用默认容量创建（256 条缓冲）
    pub fn default_capacity() -> Self {
        Self::new(256)
    }

    /// 订阅事件流
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    /// 发布事件（尽力而为：无订阅者时静默丢弃）
    pub fn publish(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }

    /// 当前订阅者数量
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ProgressPublisher {
    fn default() -> Self {
        Self::default_capacity()
    }
}
