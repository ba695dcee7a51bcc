//! 同步编排器
//!
//! 一次运行的状态机：
//! Init → PerRule(优先级降序) → [周期门控] → [跳过 | 逐文件循环 →
//! RuleComplete] → TaskComplete
//!
//! 规则按优先级从高到低完整处理，同优先级按写入顺序；规则内
//! 文件按目录列举顺序处理。整个运行严格顺序执行，不做规则间或
//! 文件间的并发展开：远程传输方是单一有状态会话，并发传输需要
//! 连接池或逐操作重连，开销远超预期文件体量的传输耗时。
//!
//! 单条规则抛出的任何错误都在规则边界被捕获：规则日志（或合成的
//! 一条）记为失败，循环继续，坏规则不会中断整个运行。

use chrono::{NaiveDate, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::error::RelayError;
use crate::events::{
    ProgressEvent, ProgressPublisher, SyncFileResultEvent, SyncRuleStartedEvent,
    SyncTaskCompletedEvent,
};
use crate::record::{
    compute_rule_status, compute_task_status, FileLog, FileLogStatus, RecordManager, RuleLog,
    RunStatus, TaskLog,
};
use crate::remote::RemoteStore;
use crate::rules::matcher::RuleMatcher;
use crate::rules::types::{FileCandidate, MappingRule};
use crate::sync::conflict::{ConflictAction, ConflictResolver};

/// 单条规则的运行结果
#[derive(Debug, Clone)]
pub struct RuleRunResult {
    /// 规则标识
    pub rule_id: String,
    /// 规则描述
    pub description: String,
    /// 聚合状态
    pub status: RunStatus,
    /// 成功文件数
    pub success_count: usize,
    /// 失败文件数
    pub failed_count: usize,
    /// 跳过文件数
    pub skipped_count: usize,
    /// 规则级错误信息
    pub message: Option<String>,
}

/// 一次运行的结构化摘要
///
/// 无论内部发生多少失败，运行都以摘要返回而不是抛出；
/// 只有不可恢复的准备失败（如规则读取不到）才会向上传播。
#[derive(Debug, Clone)]
pub struct SyncRunSummary {
    /// 任务标识
    pub task_id: String,
    /// 运行目标日期
    pub date: NaiveDate,
    /// 任务聚合状态
    pub status: RunStatus,
    /// 加载的启用规则总数（含被周期门控跳过的）
    pub total_rules: usize,
    /// 考察的候选文件总数
    pub total_files: usize,
    /// 成功传输数
    pub synced: usize,
    /// 跳过数（冲突策略跳过 + adhoc 去重）
    pub skipped: usize,
    /// 失败数
    pub failed: usize,
    /// 逐规则结果（处理顺序，被门控跳过的规则不在其中）
    pub rule_results: Vec<RuleRunResult>,
}

/// 同步编排器
pub struct SyncOrchestrator {
    /// 记录管理器
    records: Arc<RecordManager>,
    /// 规则匹配器
    matcher: RuleMatcher,
    /// 冲突裁决器
    conflict: ConflictResolver,
    /// 远程存储（构造注入，单一共享会话）
    remote: Arc<dyn RemoteStore>,
    /// 进度发布器
    publisher: ProgressPublisher,
}

impl SyncOrchestrator {
    /// 创建新的同步编排器
    pub fn new(
        records: Arc<RecordManager>,
        remote: Arc<dyn RemoteStore>,
        max_rename_attempts: u32,
        publisher: ProgressPublisher,
    ) -> Self {
        Self {
            matcher: RuleMatcher::new(records.clone()),
            conflict: ConflictResolver::new(max_rename_attempts),
            records,
            remote,
            publisher,
        }
    }

    /// 执行一次运行
    pub async fn run(&self, date: NaiveDate) -> Result<SyncRunSummary, RelayError> {
        let started = Instant::now();
        let start_time = Utc::now();
        let task_id = Uuid::new_v4().to_string();

        // 每批远程操作前的存活探测；重连失败不终止运行，
        // 后续传输会逐文件失败并被计数
        if !self.remote.is_alive().await {
            if let Err(e) = self.remote.ensure_connection().await {
                tracing::warn!("远程会话重连失败: {}", e);
            }
        }

        let rules = self
            .records
            .list_enabled_rules()
            .map_err(|e| RelayError::DatabaseError(e.to_string()))?;

        self.records
            .insert_task_log(&TaskLog {
                id: task_id.clone(),
                date,
                status: RunStatus::Success,
                start_time,
                end_time: None,
                duration_ms: None,
            })
            .map_err(|e| RelayError::DatabaseError(e.to_string()))?;

        tracing::info!("同步运行开始: task={} date={} 规则 {} 条", task_id, date, rules.len());

        let mut rule_results: Vec<RuleRunResult> = Vec::new();

        for rule in &rules {
            // 周期门控：不触发的规则不产生规则日志
            if !rule.schedule.fires_on(date) {
                tracing::debug!("周期门控跳过规则: {}", rule.id);
                continue;
            }

            let result = match self.process_rule(&task_id, rule, date).await {
                Ok(result) => result,
                Err(e) => {
                    // 规则边界兜底：合成失败的规则日志，继续下一条规则
                    tracing::error!("规则处理失败: {} ({})", rule.id, e);
                    let message = e.to_string();
                    let rule_log = RuleLog {
                        id: Uuid::new_v4().to_string(),
                        task_id: task_id.clone(),
                        rule_id: rule.id.clone(),
                        rule_description: rule.description.clone(),
                        status: RunStatus::Fail,
                        success_count: 0,
                        failed_count: 0,
                        skipped_count: 0,
                        message: Some(message.clone()),
                        created_at: Utc::now(),
                    };
                    if let Err(log_err) = self.records.insert_rule_log(&rule_log) {
                        tracing::error!("规则日志写入失败: {}", log_err);
                    }

                    RuleRunResult {
                        rule_id: rule.id.clone(),
                        description: rule.description.clone(),
                        status: RunStatus::Fail,
                        success_count: 0,
                        failed_count: 0,
                        skipped_count: 0,
                        message: Some(message),
                    }
                }
            };

            rule_results.push(result);
        }

        // 自下而上聚合任务状态，补写结束时间与耗时
        let status = compute_task_status(rule_results.iter().map(|r| r.status));
        let duration_ms = started.elapsed().as_millis() as i64;
        if let Err(e) = self
            .records
            .finish_task_log(&task_id, status, Utc::now(), duration_ms)
        {
            tracing::error!("任务日志补写失败: {}", e);
        }

        let summary = SyncRunSummary {
            task_id: task_id.clone(),
            date,
            status,
            total_rules: rules.len(),
            total_files: rule_results
                .iter()
                .map(|r| r.success_count + r.failed_count + r.skipped_count)
                .sum(),
            synced: rule_results.iter().map(|r| r.success_count).sum(),
            skipped: rule_results.iter().map(|r| r.skipped_count).sum(),
            failed: rule_results.iter().map(|r| r.failed_count).sum(),
            rule_results,
        };

        self.publisher
            .publish(ProgressEvent::SyncTaskCompleted(SyncTaskCompletedEvent {
                task_id,
                date,
                total_rules: summary.total_rules,
                synced: summary.synced,
                skipped: summary.skipped,
                failed: summary.failed,
                timestamp: Utc::now(),
            }));

        tracing::info!(
            "同步运行完成: task={} status={} synced={} skipped={} failed={} ({} ms)",
            summary.task_id,
            summary.status.as_str(),
            summary.synced,
            summary.skipped,
            summary.failed,
            duration_ms
        );

        Ok(summary)
    }

    /// 处理一条规则
    async fn process_rule(
        &self,
        task_id: &str,
        rule: &MappingRule,
        date: NaiveDate,
    ) -> Result<RuleRunResult, RelayError> {
        let rule_log_id = Uuid::new_v4().to_string();
        let candidates = self.matcher.resolve_candidates(rule, date)?;

        self.publisher
            .publish(ProgressEvent::SyncRuleStarted(SyncRuleStartedEvent {
                task_id: task_id.to_string(),
                rule_id: rule.id.clone(),
                description: rule.description.clone(),
                candidate_count: candidates.len(),
                timestamp: Utc::now(),
            }));

        let mut success_count = 0usize;
        let mut failed_count = 0usize;
        let mut skipped_count = 0usize;

        // 零候选不是错误：规则日志按全零计数记成功
        for candidate in &candidates {
            // adhoc 去重：已有同步记录的候选直接跳过
            if rule.schedule.is_adhoc() {
                match self.records.is_adhoc_synced(&rule.id, &candidate.file_name) {
                    Ok(true) => {
                        skipped_count += 1;
                        self.record_file_log(
                            &rule_log_id,
                            rule,
                            candidate,
                            None,
                            FileLogStatus::Skipped,
                            Some("已有一次性同步记录".to_string()),
                            task_id,
                        );
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        failed_count += 1;
                        self.record_file_log(
                            &rule_log_id,
                            rule,
                            candidate,
                            None,
                            FileLogStatus::Fail,
                            Some(format!("去重检查失败: {}", e)),
                            task_id,
                        );
                        continue;
                    }
                }
            }

            let (status, dest_path, message) = self.process_candidate(rule, date, candidate).await;

            match status {
                FileLogStatus::Success => {
                    success_count += 1;
                    // 仅 adhoc 规则在成功后写一次性同步记录
                    if rule.schedule.is_adhoc() {
                        if let Err(e) =
                            self.records.insert_adhoc_record(&rule.id, &candidate.file_name)
                        {
                            tracing::error!("一次性同步记录写入失败: {}", e);
                        }
                    }
                }
                FileLogStatus::Skipped => skipped_count += 1,
                FileLogStatus::Fail => failed_count += 1,
            }

            self.record_file_log(&rule_log_id, rule, candidate, dest_path, status, message, task_id);
        }

        let status = compute_rule_status(success_count, failed_count);
        let rule_log = RuleLog {
            id: rule_log_id,
            task_id: task_id.to_string(),
            rule_id: rule.id.clone(),
            rule_description: rule.description.clone(),
            status,
            success_count,
            failed_count,
            skipped_count,
            message: None,
            created_at: Utc::now(),
        };
        self.records
            .insert_rule_log(&rule_log)
            .map_err(|e| RelayError::DatabaseError(e.to_string()))?;

        Ok(RuleRunResult {
            rule_id: rule.id.clone(),
            description: rule.description.clone(),
            status,
            success_count,
            failed_count,
            skipped_count,
            message: None,
        })
    }

    /// 处理一个候选文件：解析目标 → 冲突裁决 → 传输
    async fn process_candidate(
        &self,
        rule: &MappingRule,
        date: NaiveDate,
        candidate: &FileCandidate,
    ) -> (FileLogStatus, Option<String>, Option<String>) {
        let dest = RuleMatcher::resolve_destination(rule, date, &candidate.file_name);

        let decision = match self
            .conflict
            .resolve(self.remote.as_ref(), rule.destination.conflict, &dest)
            .await
        {
            Ok(decision) => decision,
            Err(e) => return (FileLogStatus::Fail, Some(dest), Some(e.to_string())),
        };

        match decision.action {
            ConflictAction::Skip => (
                FileLogStatus::Skipped,
                Some(decision.final_path),
                decision.reason,
            ),
            ConflictAction::Upload => {
                match self
                    .transfer_with_retry(rule, &candidate.source_path, &decision.final_path)
                    .await
                {
                    Ok(()) => (
                        FileLogStatus::Success,
                        Some(decision.final_path),
                        decision.reason,
                    ),
                    Err(e) => (
                        FileLogStatus::Fail,
                        Some(decision.final_path),
                        Some(e.to_string()),
                    ),
                }
            }
        }
    }

    /// 带重试的传输：按规则的 retry 配置做有界固定间隔重试，
    /// 仅对可重试类别的错误生效
    async fn transfer_with_retry(
        &self,
        rule: &MappingRule,
        source: &Path,
        remote_path: &str,
    ) -> Result<(), RelayError> {
        let mut attempt = 0u32;

        loop {
            match self.transfer(source, remote_path).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < rule.retry.attempts => {
                    attempt += 1;
                    let delay = rule.retry.delay_for(attempt);
                    tracing::warn!(
                        "传输失败，第 {}/{} 次重试 {}: {}",
                        attempt,
                        rule.retry.attempts,
                        remote_path,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// 单次传输：确保远程父目录存在后上传
    async fn transfer(&self, source: &Path, remote_path: &str) -> Result<(), RelayError> {
        if let Some(slash) = remote_path.rfind('/') {
            let parent = &remote_path[..slash];
            if !parent.is_empty() {
                self.remote.mkdir(parent, true).await?;
            }
        }

        self.remote.upload(source, remote_path).await
    }

    /// 写文件日志并发布文件结果事件（写入失败只记录，不影响计数）
    #[allow(clippy::too_many_arguments)]
    fn record_file_log(
        &self,
        rule_log_id: &str,
        rule: &MappingRule,
        candidate: &FileCandidate,
        dest_path: Option<String>,
        status: FileLogStatus,
        message: Option<String>,
        task_id: &str,
    ) {
        let file_log = FileLog {
            id: Uuid::new_v4().to_string(),
            rule_log_id: rule_log_id.to_string(),
            rule_id: rule.id.clone(),
            file_name: candidate.file_name.clone(),
            source_path: candidate.source_path.display().to_string(),
            dest_path,
            status,
            message: message.clone(),
            created_at: Utc::now(),
        };

        if let Err(e) = self.records.insert_file_log(&file_log) {
            tracing::error!("文件日志写入失败: {}", e);
        }

        self.publisher
            .publish(ProgressEvent::SyncFileResult(SyncFileResultEvent {
                task_id: task_id.to_string(),
                rule_id: rule.id.clone(),
                file_name: candidate.file_name.clone(),
                status: status.as_str().to_string(),
                message,
                timestamp: Utc::now(),
            }));
    }
}
