//! 同步记录管理器
//!
//! 使用 SQLite 存储核心的全部持久化文档：
//! - 映射规则（核心只读，由外部 CRUD 层写入）
//! - 文件类型注册表与上传登记项（filetype 匹配消费）
//! - 一次性同步记录（adhoc 去重）
//! - 任务/规则/文件三级传输日志与解密日志
//!
//! 各级日志由同一次运行创建的父节点独占，追加为主，无需跨文档
//! 事务。

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

use super::types::{
    AdhocSyncRecord, DecryptLog, FileLog, FileLogStatus, RuleLog, RunStatus, TaskLog,
};
use crate::rules::types::{FileTypeEntry, MappingRule, UploadEntry};

/// 数据库连接池类型
type DbPool = Pool<SqliteConnectionManager>;
type DbConnection = PooledConnection<SqliteConnectionManager>;

/// 同步记录管理器
pub struct RecordManager {
    pool: Arc<DbPool>,
}

impl std::fmt::Debug for RecordManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordManager")
            .field("pool", &"<DbPool>")
            .finish()
    }
}

impl RecordManager {
    /// 创建新的记录管理器
    pub fn new(db_path: &Path) -> Result<Self> {
        // 确保父目录存在
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder().max_size(10).build(manager)?;

        let record_manager = Self {
            pool: Arc::new(pool),
        };

        // 初始化数据库
        record_manager.init_database()?;

        Ok(record_manager)
    }

    /// 获取数据库连接
    fn get_conn(&self) -> Result<DbConnection> {
        self.pool
            .get()
            .map_err(|e| anyhow!("Failed to get db connection: {}", e))
    }

    /// 初始化数据库表
    fn init_database(&self) -> Result<()> {
        let conn = self.get_conn()?;

        // 启用 WAL 模式提升并发性能
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        // 映射规则表
        conn.execute(
            "-- ============================================
            -- 表: mapping_rules (映射规则表)
            -- 描述: 规则策略文档，schedule/source/destination/retry 以 JSON 存储
            -- ============================================
            CREATE TABLE IF NOT EXISTS mapping_rules (
                id TEXT PRIMARY KEY,                    -- 规则标识
                description TEXT NOT NULL,              -- 规则描述
                module TEXT NOT NULL,                   -- 业务模块
                enabled INTEGER NOT NULL DEFAULT 1,     -- 是否启用: 0=否, 1=是
                priority INTEGER NOT NULL,              -- 优先级 (1..=1000, 大者先行)
                schedule TEXT NOT NULL,                 -- 调度周期 (JSON)
                source TEXT NOT NULL,                   -- 匹配方式 (JSON)
                destination TEXT NOT NULL,              -- 目标位置 (JSON)
                retry TEXT NOT NULL,                    -- 重试配置 (JSON)
                created_at TEXT NOT NULL                -- 创建时间 (RFC3339)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_mapping_rules_enabled
             ON mapping_rules(enabled, priority)",
            [],
        )?;

        // 文件类型注册表
        conn.execute(
            "CREATE TABLE IF NOT EXISTS file_types (
                id TEXT PRIMARY KEY,                    -- 类型标识
                name TEXT NOT NULL,                     -- 类型名称
                extensions TEXT NOT NULL                -- 扩展名列表 (JSON)
            )",
            [],
        )?;

        // 上传登记表
        conn.execute(
            "-- ============================================
            -- 表: upload_entries (上传登记表)
            -- 描述: 外部上传入口写入的文件登记，filetype 匹配按类型消费
            -- ============================================
            CREATE TABLE IF NOT EXISTS upload_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,   -- 自增主键
                file_path TEXT NOT NULL,                -- 文件绝对路径
                file_name TEXT NOT NULL,                -- 文件名
                file_type_id TEXT NOT NULL,             -- 所属文件类型
                uploaded_at TEXT NOT NULL               -- 登记时间 (RFC3339)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_upload_entries_type
             ON upload_entries(file_type_id)",
            [],
        )?;

        // 一次性同步记录表
        conn.execute(
            "-- ============================================
            -- 表: adhoc_sync_records (一次性同步去重表)
            -- 描述: adhoc 规则成功传输后写入，(rule_id, file_name) 终身唯一
            -- ============================================
            CREATE TABLE IF NOT EXISTS adhoc_sync_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,   -- 自增主键
                rule_id TEXT NOT NULL,                  -- 规则标识
                file_name TEXT NOT NULL,                -- 文件名
                status TEXT NOT NULL,                   -- 记录状态 (synced)
                sync_time TEXT NOT NULL,                -- 同步时间 (RFC3339)
                UNIQUE(rule_id, file_name)              -- 唯一约束: 规则内文件名唯一
            )",
            [],
        )?;

        // 解密日志表
        conn.execute(
            "CREATE TABLE IF NOT EXISTS decrypt_logs (
                id TEXT PRIMARY KEY,                    -- 日志标识
                date TEXT NOT NULL,                     -- 批次日期 (YYYY-MM-DD)
                success INTEGER NOT NULL,               -- 批次结果: 0=fail, 1=success
                total INTEGER NOT NULL,                 -- 发现文件总数
                decrypted INTEGER NOT NULL,             -- 解密成功数
                copied INTEGER NOT NULL,                -- 原样复制数
                failed INTEGER NOT NULL,                -- 失败数
                message TEXT,                           -- 批次级错误信息
                created_at TEXT NOT NULL                -- 创建时间 (RFC3339)
            )",
            [],
        )?;

        // 任务日志表
        conn.execute(
            "-- ============================================
            -- 表: task_logs / rule_logs / file_logs (三级传输日志)
            -- 描述: 一次运行 -> 多条规则 -> 多个文件，状态自下而上汇总
            -- ============================================
            CREATE TABLE IF NOT EXISTS task_logs (
                id TEXT PRIMARY KEY,                    -- 任务标识
                date TEXT NOT NULL,                     -- 运行目标日期 (YYYY-MM-DD)
                status TEXT NOT NULL,                   -- success / partial / fail
                start_time TEXT NOT NULL,               -- 开始时间 (RFC3339)
                end_time TEXT,                          -- 结束时间 (运行完成后补写)
                duration_ms INTEGER                     -- 耗时毫秒 (运行完成后补写)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS rule_logs (
                id TEXT PRIMARY KEY,                    -- 日志标识
                task_id TEXT NOT NULL,                  -- 所属任务
                rule_id TEXT NOT NULL,                  -- 规则标识
                rule_description TEXT NOT NULL,         -- 规则描述 (冗余存储)
                status TEXT NOT NULL,                   -- success / partial / fail
                success_count INTEGER NOT NULL,         -- 成功文件数
                failed_count INTEGER NOT NULL,          -- 失败文件数
                skipped_count INTEGER NOT NULL,         -- 跳过文件数
                message TEXT,                           -- 规则级错误信息
                created_at TEXT NOT NULL                -- 创建时间 (RFC3339)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_rule_logs_task ON rule_logs(task_id)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS file_logs (
                id TEXT PRIMARY KEY,                    -- 日志标识
                rule_log_id TEXT NOT NULL,              -- 所属规则日志
                rule_id TEXT NOT NULL,                  -- 规则标识
                file_name TEXT NOT NULL,                -- 文件名
                source_path TEXT NOT NULL,              -- 源路径
                dest_path TEXT,                         -- 目标路径 (冲突裁决后)
                status TEXT NOT NULL,                   -- success / skipped / fail
                message TEXT,                           -- 传输消息 / 跳过原因
                created_at TEXT NOT NULL                -- 创建时间 (RFC3339)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_file_logs_rule ON file_logs(rule_id, status)",
            [],
        )?;

        Ok(())
    }

    // ==================== 映射规则操作 ====================

    /// 写入或更新规则（供外部 CRUD 层与测试使用，核心只读）
    pub fn upsert_rule(&self, rule: &MappingRule) -> Result<()> {
        rule.validate().map_err(|e| anyhow!(e))?;

        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO mapping_rules
             (id, description, module, enabled, priority, schedule, source, destination, retry, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                rule.id,
                rule.description,
                serde_json::to_string(&rule.module)?,
                rule.enabled as i32,
                rule.priority as i64,
                serde_json::to_string(&rule.schedule)?,
                serde_json::to_string(&rule.source)?,
                serde_json::to_string(&rule.destination)?,
                serde_json::to_string(&rule.retry)?,
                rule.created_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// 列出全部启用的规则，按优先级降序（同优先级按写入顺序）
    pub fn list_enabled_rules(&self) -> Result<Vec<MappingRule>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, description, module, enabled, priority, schedule, source, destination, retry, created_at
             FROM mapping_rules
             WHERE enabled = 1
             ORDER BY priority DESC, rowid ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i32>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, String>(8)?,
                row.get::<_, String>(9)?,
            ))
        })?;

        let mut rules = Vec::new();
        for row in rows {
            let (id, description, module, enabled, priority, schedule, source, destination, retry, created_at) = row?;
            rules.push(MappingRule {
                id,
                description,
                module: serde_json::from_str(&module)?,
                enabled: enabled != 0,
                priority: priority as u32,
                schedule: serde_json::from_str(&schedule)?,
                source: serde_json::from_str(&source)?,
                destination: serde_json::from_str(&destination)?,
                retry: serde_json::from_str(&retry)?,
                created_at: parse_rfc3339(&created_at)?,
            });
        }

        Ok(rules)
    }

    // ==================== 文件类型 / 上传登记操作 ====================

    /// 写入或更新文件类型注册项
    pub fn upsert_file_type(&self, entry: &FileTypeEntry) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO file_types (id, name, extensions) VALUES (?1, ?2, ?3)",
            params![entry.id, entry.name, serde_json::to_string(&entry.extensions)?],
        )?;
        Ok(())
    }

    /// 查找文件类型注册项
    pub fn get_file_type(&self, id: &str) -> Result<Option<FileTypeEntry>> {
        let conn = self.get_conn()?;
        let result = conn
            .query_row(
                "SELECT id, name, extensions FROM file_types WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        match result {
            Some((id, name, extensions)) => Ok(Some(FileTypeEntry {
                id,
                name,
                extensions: serde_json::from_str(&extensions)?,
            })),
            None => Ok(None),
        }
    }

    /// 添加上传登记项
    pub fn add_upload_entry(&self, entry: &UploadEntry) -> Result<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO upload_entries (file_path, file_name, file_type_id, uploaded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.file_path,
                entry.file_name,
                entry.file_type_id,
                entry.uploaded_at.to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 按文件类型列出上传登记项（登记顺序）
    pub fn list_upload_entries_by_type(&self, file_type_id: &str) -> Result<Vec<UploadEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT file_path, file_name, file_type_id, uploaded_at
             FROM upload_entries
             WHERE file_type_id = ?1
             ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![file_type_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (file_path, file_name, file_type_id, uploaded_at) = row?;
            entries.push(UploadEntry {
                file_path,
                file_name,
                file_type_id,
                uploaded_at: parse_rfc3339(&uploaded_at)?,
            });
        }

        Ok(entries)
    }

    // ==================== 一次性同步记录操作 ====================

    /// 检查一次性同步记录是否已存在（status = synced）
    pub fn is_adhoc_synced(&self, rule_id: &str, file_name: &str) -> Result<bool> {
        let conn = self.get_conn()?;
        let exists: bool = conn
            .query_row(
                "SELECT 1 FROM adhoc_sync_records
                 WHERE rule_id = ?1 AND file_name = ?2 AND status = 'synced'",
                params![rule_id, file_name],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);

        Ok(exists)
    }

    /// 写入一次性同步记录（仅在成功传输后调用）
    pub fn insert_adhoc_record(&self, rule_id: &str, file_name: &str) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO adhoc_sync_records (rule_id, file_name, status, sync_time)
             VALUES (?1, ?2, 'synced', ?3)",
            params![rule_id, file_name, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// 查询一次性同步记录
    pub fn get_adhoc_record(&self, rule_id: &str, file_name: &str) -> Result<Option<AdhocSyncRecord>> {
        let conn = self.get_conn()?;
        let result = conn
            .query_row(
                "SELECT rule_id, file_name, status, sync_time FROM adhoc_sync_records
                 WHERE rule_id = ?1 AND file_name = ?2",
                params![rule_id, file_name],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        match result {
            Some((rule_id, file_name, status, sync_time)) => Ok(Some(AdhocSyncRecord {
                rule_id,
                file_name,
                status,
                sync_time: parse_rfc3339(&sync_time)?,
            })),
            None => Ok(None),
        }
    }

    // ==================== 解密日志操作 ====================

    /// 写入解密日志（一个日期一次运行一行）
    pub fn insert_decrypt_log(&self, log: &DecryptLog) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO decrypt_logs (id, date, success, total, decrypted, copied, failed, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                log.id,
                log.date.format("%Y-%m-%d").to_string(),
                log.success as i32,
                log.total as i64,
                log.decrypted as i64,
                log.copied as i64,
                log.failed as i64,
                log.message,
                log.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// 按日期列出解密日志
    pub fn list_decrypt_logs(&self, date: NaiveDate) -> Result<Vec<DecryptLog>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, date, success, total, decrypted, copied, failed, message, created_at
             FROM decrypt_logs WHERE date = ?1 ORDER BY created_at ASC",
        )?;

        let rows = stmt.query_map(params![date.format("%Y-%m-%d").to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i32>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, String>(8)?,
            ))
        })?;

        let mut logs = Vec::new();
        for row in rows {
            let (id, date, success, total, decrypted, copied, failed, message, created_at) = row?;
            logs.push(DecryptLog {
                id,
                date: parse_iso_date(&date)?,
                success: success != 0,
                total: total as usize,
                decrypted: decrypted as usize,
                copied: copied as usize,
                failed: failed as usize,
                message,
                created_at: parse_rfc3339(&created_at)?,
            });
        }

        Ok(logs)
    }

    // ==================== 三级日志操作 ====================

    /// 写入任务日志（运行开始时）
    pub fn insert_task_log(&self, log: &TaskLog) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO task_logs (id, date, status, start_time, end_time, duration_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                log.id,
                log.date.format("%Y-%m-%d").to_string(),
                log.status.as_str(),
                log.start_time.to_rfc3339(),
                log.end_time.map(|t| t.to_rfc3339()),
                log.duration_ms,
            ],
        )?;
        Ok(())
    }

    /// 补写任务日志的聚合状态与结束时间（运行完成时的唯一更新）
    pub fn finish_task_log(
        &self,
        task_id: &str,
        status: RunStatus,
        end_time: DateTime<Utc>,
        duration_ms: i64,
    ) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE task_logs SET status = ?2, end_time = ?3, duration_ms = ?4 WHERE id = ?1",
            params![task_id, status.as_str(), end_time.to_rfc3339(), duration_ms],
        )?;
        Ok(())
    }

    /// 查询任务日志
    pub fn get_task_log(&self, task_id: &str) -> Result<Option<TaskLog>> {
        let conn = self.get_conn()?;
        let result = conn
            .query_row(
                "SELECT id, date, status, start_time, end_time, duration_ms
                 FROM task_logs WHERE id = ?1",
                params![task_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<i64>>(5)?,
                    ))
                },
            )
            .optional()?;

        match result {
            Some((id, date, status, start_time, end_time, duration_ms)) => Ok(Some(TaskLog {
                id,
                date: parse_iso_date(&date)?,
                status: RunStatus::parse(&status)
                    .ok_or_else(|| anyhow!("无法识别的任务状态: {}", status))?,
                start_time: parse_rfc3339(&start_time)?,
                end_time: end_time.as_deref().map(parse_rfc3339).transpose()?,
                duration_ms,
            })),
            None => Ok(None),
        }
    }

    /// 写入规则日志
    pub fn insert_rule_log(&self, log: &RuleLog) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO rule_logs
             (id, task_id, rule_id, rule_description, status, success_count, failed_count, skipped_count, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                log.id,
                log.task_id,
                log.rule_id,
                log.rule_description,
                log.status.as_str(),
                log.success_count as i64,
                log.failed_count as i64,
                log.skipped_count as i64,
                log.message,
                log.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// 按任务列出规则日志（写入顺序，即规则处理顺序）
    pub fn list_rule_logs(&self, task_id: &str) -> Result<Vec<RuleLog>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, task_id, rule_id, rule_description, status, success_count, failed_count, skipped_count, message, created_at
             FROM rule_logs WHERE task_id = ?1 ORDER BY rowid ASC",
        )?;

        let rows = stmt.query_map(params![task_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, i64>(7)?,
                row.get::<_, Option<String>>(8)?,
                row.get::<_, String>(9)?,
            ))
        })?;

        let mut logs = Vec::new();
        for row in rows {
            let (id, task_id, rule_id, rule_description, status, success_count, failed_count, skipped_count, message, created_at) = row?;
            logs.push(RuleLog {
                id,
                task_id,
                rule_id,
                rule_description,
                status: RunStatus::parse(&status)
                    .ok_or_else(|| anyhow!("无法识别的规则状态: {}", status))?,
                success_count: success_count as usize,
                failed_count: failed_count as usize,
                skipped_count: skipped_count as usize,
                message,
                created_at: parse_rfc3339(&created_at)?,
            });
        }

        Ok(logs)
    }

    /// 写入文件日志
    pub fn insert_file_log(&self, log: &FileLog) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO file_logs
             (id, rule_log_id, rule_id, file_name, source_path, dest_path, status, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                log.id,
                log.rule_log_id,
                log.rule_id,
                log.file_name,
                log.source_path,
                log.dest_path,
                log.status.as_str(),
                log.message,
                log.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// 按规则日志列出文件日志
    pub fn list_file_logs(&self, rule_log_id: &str) -> Result<Vec<FileLog>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, rule_log_id, rule_id, file_name, source_path, dest_path, status, message, created_at
             FROM file_logs WHERE rule_log_id = ?1 ORDER BY rowid ASC",
        )?;

        let rows = stmt.query_map(params![rule_log_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, String>(8)?,
            ))
        })?;

        let mut logs = Vec::new();
        for row in rows {
            let (id, rule_log_id, rule_id, file_name, source_path, dest_path, status, message, created_at) = row?;
            logs.push(FileLog {
                id,
                rule_log_id,
                rule_id,
                file_name,
                source_path,
                dest_path,
                status: FileLogStatus::parse(&status)
                    .ok_or_else(|| anyhow!("无法识别的文件状态: {}", status))?,
                message,
                created_at: parse_rfc3339(&created_at)?,
            });
        }

        Ok(logs)
    }

    /// 查询某规则在某日期已成功传输过的文件名集合
    ///
    /// filetype 匹配用它做同日去重（周期规则不查 adhoc 记录表）。
    pub fn successful_file_names(&self, rule_id: &str, date: NaiveDate) -> Result<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT f.file_name
             FROM file_logs f
             JOIN rule_logs r ON f.rule_log_id = r.id
             JOIN task_logs t ON r.task_id = t.id
             WHERE f.rule_id = ?1 AND t.date = ?2 AND f.status = 'success'",
        )?;

        let rows = stmt.query_map(
            params![rule_id, date.format("%Y-%m-%d").to_string()],
            |row| row.get::<_, String>(0),
        )?;

        let mut names = Vec::new();
        for row in rows {
            names.push(row?);
        }

        Ok(names)
    }
}

/// 解析 RFC3339 时间戳
fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .map_err(|e| anyhow!("无法解析时间戳 {}: {}", s, e))?
        .with_timezone(&Utc))
}

/// 解析 ISO 日期
fn parse_iso_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| anyhow!("无法解析日期 {}: {}", s, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::types::{
        BusinessModule, ConflictPolicy, DestinationSpec, MatchSpec, RetryConfig, SchedulePeriod,
    };
    use tempfile::TempDir;

    fn test_manager() -> (TempDir, RecordManager) {
        let dir = TempDir::new().unwrap();
        let manager = RecordManager::new(&dir.path().join("test.db")).unwrap();
        (dir, manager)
    }

    fn sample_rule(id: &str, priority: u32) -> MappingRule {
        MappingRule {
            id: id.to_string(),
            description: format!("规则 {}", id),
            module: BusinessModule::General,
            enabled: true,
            priority,
            schedule: SchedulePeriod::Daily,
            source: MatchSpec::Filename {
                directory: "/data/{date}".to_string(),
                pattern: "*.csv".to_string(),
            },
            destination: DestinationSpec {
                path: "/partner/{date}".to_string(),
                filename: "{baseName}.{ext}".to_string(),
                conflict: ConflictPolicy::Skip,
            },
            retry: RetryConfig::default(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_rule_roundtrip_and_ordering() {
        let (_dir, manager) = test_manager();

        // 打乱写入顺序，读取必须按优先级降序
        manager.upsert_rule(&sample_rule("r-low", 5)).unwrap();
        manager.upsert_rule(&sample_rule("r-high", 10)).unwrap();
        manager.upsert_rule(&sample_rule("r-mid", 8)).unwrap();

        let rules = manager.list_enabled_rules().unwrap();
        let priorities: Vec<u32> = rules.iter().map(|r| r.priority).collect();
        assert_eq!(priorities, vec![10, 8, 5]);
    }

    #[test]
    fn test_disabled_rules_excluded() {
        let (_dir, manager) = test_manager();

        let mut rule = sample_rule("r-off", 100);
        rule.enabled = false;
        manager.upsert_rule(&rule).unwrap();
        manager.upsert_rule(&sample_rule("r-on", 50)).unwrap();

        let rules = manager.list_enabled_rules().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, "r-on");
    }

    #[test]
    fn test_adhoc_record_lifecycle() {
        let (_dir, manager) = test_manager();

        assert!(!manager.is_adhoc_synced("r1", "once.csv").unwrap());

        manager.insert_adhoc_record("r1", "once.csv").unwrap();
        assert!(manager.is_adhoc_synced("r1", "once.csv").unwrap());

        // 其他规则不受影响
        assert!(!manager.is_adhoc_synced("r2", "once.csv").unwrap());

        let record = manager.get_adhoc_record("r1", "once.csv").unwrap().unwrap();
        assert_eq!(record.status, "synced");
    }

    #[test]
    fn test_task_log_finish() {
        let (_dir, manager) = test_manager();
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();

        let task = TaskLog {
            id: "t1".to_string(),
            date,
            status: RunStatus::Success,
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
        };
        manager.insert_task_log(&task).unwrap();

        manager
            .finish_task_log("t1", RunStatus::Partial, Utc::now(), 1234)
            .unwrap();

        let loaded = manager.get_task_log("t1").unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Partial);
        assert_eq!(loaded.duration_ms, Some(1234));
        assert!(loaded.end_time.is_some());
    }

    #[test]
    fn test_successful_file_names_scoped_by_date_and_status() {
        let (_dir, manager) = test_manager();
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let other_date = NaiveDate::from_ymd_opt(2024, 3, 6).unwrap();

        for (task_id, d) in [("t1", date), ("t2", other_date)] {
            manager
                .insert_task_log(&TaskLog {
                    id: task_id.to_string(),
                    date: d,
                    status: RunStatus::Success,
                    start_time: Utc::now(),
                    end_time: None,
                    duration_ms: None,
                })
                .unwrap();
            manager
                .insert_rule_log(&RuleLog {
                    id: format!("{}-rl", task_id),
                    task_id: task_id.to_string(),
                    rule_id: "r1".to_string(),
                    rule_description: "测试规则".to_string(),
                    status: RunStatus::Success,
                    success_count: 1,
                    failed_count: 0,
                    skipped_count: 0,
                    message: None,
                    created_at: Utc::now(),
                })
                .unwrap();
        }

        // t1 当日：一条成功、一条失败
        for (id, name, status) in [
            ("f1", "a.csv", FileLogStatus::Success),
            ("f2", "b.csv", FileLogStatus::Fail),
        ] {
            manager
                .insert_file_log(&FileLog {
                    id: id.to_string(),
                    rule_log_id: "t1-rl".to_string(),
                    rule_id: "r1".to_string(),
                    file_name: name.to_string(),
                    source_path: format!("/src/{}", name),
                    dest_path: None,
                    status,
                    message: None,
                    created_at: Utc::now(),
                })
                .unwrap();
        }

        // 次日的成功不应影响当日查询
        manager
            .insert_file_log(&FileLog {
                id: "f3".to_string(),
                rule_log_id: "t2-rl".to_string(),
                rule_id: "r1".to_string(),
                file_name: "c.csv".to_string(),
                source_path: "/src/c.csv".to_string(),
                dest_path: None,
                status: FileLogStatus::Success,
                message: None,
                created_at: Utc::now(),
            })
            .unwrap();

        let names = manager.successful_file_names("r1", date).unwrap();
        assert_eq!(names, vec!["a.csv".to_string()]);
    }

    #[test]
    fn test_decrypt_log_roundtrip() {
        let (_dir, manager) = test_manager();
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();

        manager
            .insert_decrypt_log(&DecryptLog {
                id: "d1".to_string(),
                date,
                success: true,
                total: 4,
                decrypted: 3,
                copied: 1,
                failed: 0,
                message: None,
                created_at: Utc::now(),
            })
            .unwrap();

        let logs = manager.list_decrypt_logs(date).unwrap();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].success);
        assert_eq!(logs[0].decrypted, 3);
        assert_eq!(logs[0].copied, 1);
    }

    #[test]
    fn test_upload_entries_by_type() {
        let (_dir, manager) = test_manager();

        manager
            .upsert_file_type(&FileTypeEntry {
                id: "settlement-report".to_string(),
                name: "清算报表".to_string(),
                extensions: vec!["csv".to_string(), "xlsx".to_string()],
            })
            .unwrap();

        for (name, type_id) in [("a.csv", "settlement-report"), ("b.csv", "other")] {
            manager
                .add_upload_entry(&UploadEntry {
                    file_path: format!("/uploads/{}", name),
                    file_name: name.to_string(),
                    file_type_id: type_id.to_string(),
                    uploaded_at: Utc::now(),
                })
                .unwrap();
        }

        let entries = manager
            .list_upload_entries_by_type("settlement-report")
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].file_name, "a.csv");

        let ft = manager.get_file_type("settlement-report").unwrap().unwrap();
        assert_eq!(ft.extensions.len(), 2);
        assert!(manager.get_file_type("missing").unwrap().is_none());
    }
}
