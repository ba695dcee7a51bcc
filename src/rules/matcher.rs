//! 规则匹配器
//!
//! 对一条映射规则和一个日期解析候选文件：
//! - filename 匹配：展开源目录与通配模式中的日期变量，
//!   通配转正则后对目录（非递归）逐文件匹配，大小写不敏感
//! - filetype 匹配：查文件类型注册表，消费对应的上传登记项，
//!   剔除已不在磁盘上的文件以及当日已成功传输过的文件
//!   （周期规则查文件日志，不查 adhoc 记录表）

use chrono::NaiveDate;
use regex::{Regex, RegexBuilder};
use std::path::Path;
use std::sync::Arc;

use crate::error::RelayError;
use crate::record::RecordManager;
use crate::rules::types::{FileCandidate, MappingRule, MatchSpec};
use crate::template::DateVariableResolver;

/// 规则匹配器
pub struct RuleMatcher {
    records: Arc<RecordManager>,
}

impl RuleMatcher {
    /// 创建新的规则匹配器
    pub fn new(records: Arc<RecordManager>) -> Self {
        Self { records }
    }

    /// 解析规则在给定日期的候选文件
    pub fn resolve_candidates(
        &self,
        rule: &MappingRule,
        date: NaiveDate,
    ) -> Result<Vec<FileCandidate>, RelayError> {
        match &rule.source {
            MatchSpec::Filename { directory, pattern } => {
                Self::match_by_filename(directory, pattern, date)
            }
            MatchSpec::FileType { file_type_ref } => {
                self.match_by_filetype(&rule.id, file_type_ref, date)
            }
        }
    }

    /// filename 匹配：目录列举 + 通配模式
    fn match_by_filename(
        directory: &str,
        pattern: &str,
        date: NaiveDate,
    ) -> Result<Vec<FileCandidate>, RelayError> {
        let resolved_dir = DateVariableResolver::resolve(directory, date);
        let resolved_pattern = DateVariableResolver::resolve(pattern, date);

        let dir_path = Path::new(&resolved_dir);
        if !dir_path.is_dir() {
            return Err(RelayError::DirectoryNotFound(resolved_dir));
        }

        let matcher = wildcard_to_regex(&resolved_pattern)?;

        // 非递归列举，保持目录列举顺序
        let mut candidates = Vec::new();
        for entry in std::fs::read_dir(dir_path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }

            let file_name = entry.file_name().to_string_lossy().to_string();
            if matcher.is_match(&file_name) {
                candidates.push(FileCandidate {
                    source_path: entry.path(),
                    file_name,
                });
            }
        }

        tracing::debug!(
            "filename 匹配: dir={} pattern={} 命中 {} 个",
            resolved_dir,
            resolved_pattern,
            candidates.len()
        );

        Ok(candidates)
    }

    /// filetype 匹配：上传登记项 + 当日成功去重
    fn match_by_filetype(
        &self,
        rule_id: &str,
        file_type_ref: &str,
        date: NaiveDate,
    ) -> Result<Vec<FileCandidate>, RelayError> {
        let file_type = self
            .records
            .get_file_type(file_type_ref)
            .map_err(|e| RelayError::DatabaseError(e.to_string()))?
            .ok_or_else(|| {
                RelayError::ConfigError(format!("文件类型注册项不存在: {}", file_type_ref))
            })?;

        let entries = self
            .records
            .list_upload_entries_by_type(&file_type.id)
            .map_err(|e| RelayError::DatabaseError(e.to_string()))?;

        let already_synced = self
            .records
            .successful_file_names(rule_id, date)
            .map_err(|e| RelayError::DatabaseError(e.to_string()))?;

        let mut candidates = Vec::new();
        for entry in entries {
            let path = Path::new(&entry.file_path);
            if !path.is_file() {
                // 登记过但文件已不在磁盘上，静默跳过
                continue;
            }
            if already_synced.contains(&entry.file_name) {
                continue;
            }

            candidates.push(FileCandidate {
                source_path: path.to_path_buf(),
                file_name: entry.file_name,
            });
        }

        tracing::debug!(
            "filetype 匹配: type={} 命中 {} 个",
            file_type.id,
            candidates.len()
        );

        Ok(candidates)
    }

    /// 解析候选文件的目标完整路径
    ///
    /// 目标目录与文件名模板先展开日期变量，再展开
    /// {baseName}/{ext} 占位符。
    pub fn resolve_destination(rule: &MappingRule, date: NaiveDate, file_name: &str) -> String {
        let dest_dir = DateVariableResolver::resolve(&rule.destination.path, date);
        let dest_dir = DateVariableResolver::resolve_file_placeholders(&dest_dir, file_name);

        let dest_name = DateVariableResolver::resolve(&rule.destination.filename, date);
        let dest_name = DateVariableResolver::resolve_file_placeholders(&dest_name, file_name);

        format!("{}/{}", dest_dir.trim_end_matches('/'), dest_name)
    }
}

/// 通配模式转正则
///
/// 先转义展开后模板中的正则元字符（展开出的日期里的字面字符保持
/// 字面含义），再把 `*`/`?` 转为 `.*`/`.`，整体锚定，大小写不敏感。
pub fn wildcard_to_regex(pattern: &str) -> Result<Regex, RelayError> {
    let mut expr = String::with_capacity(pattern.len() * 2 + 2);
    expr.push('^');

    for ch in pattern.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            _ => expr.push_str(&regex::escape(&ch.to_string())),
        }
    }

    expr.push('$');

    RegexBuilder::new(&expr)
        .case_insensitive(true)
        .build()
        .map_err(|e| RelayError::PatternError(e.to_string()))
}
