//! 传输日志数据结构
//!
//! 三级所有权层次：一次运行一条 TaskLog，每条被评估（未被周期
//! 门控跳过）的规则一条 RuleLog，每个被考察的候选文件一条
//! FileLog。三级均为追加式，运行结束后仅允许补写 TaskLog 的
//! 结束时间与耗时。

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// 运行级状态（任务 / 规则）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// 全部成功
    Success,
    /// 部分成功
    Partial,
    /// 全部失败
    Fail,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Fail => "fail",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(RunStatus::Success),
            "partial" => Some(RunStatus::Partial),
            "fail" => Some(RunStatus::Fail),
            _ => None,
        }
    }
}

/// 文件级状态
///
/// skipped 是独立状态：按策略跳过与传输失败不再共用同一个
/// 状态桶，汇总时跳过不计为失败。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileLogStatus {
    /// 传输成功
    Success,
    /// 按冲突策略跳过
    Skipped,
    /// 传输失败
    Fail,
}

impl FileLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileLogStatus::Success => "success",
            FileLogStatus::Skipped => "skipped",
            FileLogStatus::Fail => "fail",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(FileLogStatus::Success),
            "skipped" => Some(FileLogStatus::Skipped),
            "fail" => Some(FileLogStatus::Fail),
            _ => None,
        }
    }
}

/// 任务日志（一次编排运行）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLog {
    /// 任务标识
    pub id: String,
    /// 运行目标日期
    pub date: NaiveDate,
    /// 聚合状态
    pub status: RunStatus,
    /// 开始时间
    pub start_time: DateTime<Utc>,
    /// 结束时间（运行完成后补写）
    pub end_time: Option<DateTime<Utc>>,
    /// 耗时（毫秒，运行完成后补写）
    pub duration_ms: Option<i64>,
}

/// 规则日志（一条规则的一次评估）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleLog {
    /// 日志标识
    pub id: String,
    /// 所属任务
    pub task_id: String,
    /// 规则标识
    pub rule_id: String,
    /// 规则描述（冗余存储，便于审计查询）
    pub rule_description: String,
    /// 聚合状态
    pub status: RunStatus,
    /// 成功文件数
    pub success_count: usize,
    /// 失败文件数
    pub failed_count: usize,
    /// 跳过文件数
    pub skipped_count: usize,
    /// 错误信息（规则级失败时）
    pub message: Option<String>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}

/// 文件日志（一个候选文件的一次处理）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileLog {
    /// 日志标识
    pub id: String,
    /// 所属规则日志
    pub rule_log_id: String,
    /// 规则标识
    pub rule_id: String,
    /// 文件名
    pub file_name: String,
    /// 源路径
    pub source_path: String,
    /// 目标路径（冲突裁决后的最终路径）
    pub dest_path: Option<String>,
    /// 状态
    pub status: FileLogStatus,
    /// 传输消息 / 跳过原因 / 错误信息
    pub message: Option<String>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}

/// 解密日志（一个日期一次运行一行）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptLog {
    /// 日志标识
    pub id: String,
    /// 批次日期
    pub date: NaiveDate,
    /// success / fail
    pub success: bool,
    /// 发现的文件总数
    pub total: usize,
    /// 解密成功数
    pub decrypted: usize,
    /// 原样复制数
    pub copied: usize,
    /// 失败数
    pub failed: usize,
    /// 错误信息（批次级失败时）
    pub message: Option<String>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}

/// 一次性同步记录（永久去重键：规则 + 文件名）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdhocSyncRecord {
    /// 规则标识
    pub rule_id: String,
    /// 文件名
    pub file_name: String,
    /// 记录状态（当前仅 synced）
    pub status: String,
    /// 同步时间
    pub sync_time: DateTime<Utc>,
}

/// 自下而上计算规则级状态
///
/// 失败与成功并存 → partial；只有失败 → fail；其余（含纯跳过、
/// 零候选）→ success。
pub fn compute_rule_status(success_count: usize, failed_count: usize) -> RunStatus {
    if failed_count > 0 && success_count > 0 {
        RunStatus::Partial
    } else if failed_count > 0 {
        RunStatus::Fail
    } else {
        RunStatus::Success
    }
}

/// 自下而上计算任务级状态（对全部规则状态做同样的聚合）
pub fn compute_task_status<I: IntoIterator<Item = RunStatus>>(statuses: I) -> RunStatus {
    let mut has_success = false;
    let mut has_fail = false;

    for status in statuses {
        match status {
            RunStatus::Success => has_success = true,
            RunStatus::Fail => has_fail = true,
            RunStatus::Partial => {
                has_success = true;
                has_fail = true;
            }
        }
    }

    match (has_success, has_fail) {
        (true, true) => RunStatus::Partial,
        (false, true) => RunStatus::Fail,
        _ => RunStatus::Success,
    }
}
