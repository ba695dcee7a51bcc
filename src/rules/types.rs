//! 映射规则数据结构

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 业务模块（业务归属单元）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessModule {
    /// 清算
    Settlement,
    /// 交易
    Trading,
    /// 合规
    Compliance,
    /// 通用
    General,
}

/// 调度周期
///
/// 周期门控决定规则在给定日期是否触发：
/// daily 与 adhoc 总是触发；weekly 仅在星期匹配时触发（1=周一）；
/// monthly 仅在日号匹配时触发。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "period", rename_all = "snake_case")]
pub enum SchedulePeriod {
    /// 每日
    Daily,
    /// 每周（weekday: 1=周一 .. 7=周日）
    Weekly { weekday: u32 },
    /// 每月（monthday: 1..31，不做月末钳制，31 号在小月自然不触发）
    Monthly { monthday: u32 },
    /// 一次性（永久去重，见 AdhocSyncRecord）
    Adhoc,
}

impl SchedulePeriod {
    /// 周期门控：规则在该日期是否触发
    pub fn fires_on(&self, date: NaiveDate) -> bool {
        match self {
            SchedulePeriod::Daily | SchedulePeriod::Adhoc => true,
            SchedulePeriod::Weekly { weekday } => date.weekday().number_from_monday() == *weekday,
            SchedulePeriod::Monthly { monthday } => date.day() == *monthday,
        }
    }

    /// 是否为一次性规则
    pub fn is_adhoc(&self) -> bool {
        matches!(self, SchedulePeriod::Adhoc)
    }
}

/// 匹配方式（filename 与 filetype 互斥，各带独立载荷）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "match_type", rename_all = "snake_case")]
pub enum MatchSpec {
    /// 按文件名模式匹配：源目录 + 通配模式（均可含日期变量）
    Filename { directory: String, pattern: String },
    /// 按文件类型登记表匹配：引用文件类型注册项
    FileType { file_type_ref: String },
}

/// 冲突策略（目标文件已存在时的处理方式）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// 跳过
    Skip,
    /// 覆盖
    Overwrite,
    /// 重命名（name_1.ext、name_2.ext、…）
    Rename,
}

/// 目标位置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationSpec {
    /// 目标目录（可含日期变量）
    pub path: String,
    /// 目标文件名模板（可含日期变量与 {baseName}/{ext}）
    pub filename: String,
    /// 冲突策略
    pub conflict: ConflictPolicy,
}

/// 传输重试配置
///
/// attempts = 0 表示不重试；仅对可重试类别的错误生效。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// 最大重试次数
    pub attempts: u32,
    /// 重试间隔（秒，固定间隔）
    pub delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 0,
            delay_secs: 30,
        }
    }
}

impl RetryConfig {
    /// 计算第 n 次重试前的等待时长（含 ±25% 抖动）
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        if retry_count == 0 {
            return Duration::from_millis(0);
        }

        let base_ms = self.delay_secs * 1000;
        if base_ms == 0 {
            return Duration::from_millis(0);
        }

        let jitter_range = base_ms / 4;
        let jitter = if jitter_range > 0 {
            rand::random::<u64>() % (jitter_range * 2)
        } else {
            0
        };
        let delay = base_ms.saturating_sub(jitter_range).saturating_add(jitter);

        Duration::from_millis(delay)
    }
}

/// 映射规则
///
/// 由外部 CRUD 层创建/编辑，核心只读（调度器自身维护的运行
/// 标记除外）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingRule {
    /// 规则唯一标识
    pub id: String,
    /// 规则描述
    pub description: String,
    /// 业务模块
    pub module: BusinessModule,
    /// 是否启用
    pub enabled: bool,
    /// 优先级（1..=1000，数值大的先处理）
    pub priority: u32,
    /// 调度周期
    pub schedule: SchedulePeriod,
    /// 匹配方式
    pub source: MatchSpec,
    /// 目标位置
    pub destination: DestinationSpec,
    /// 传输重试配置
    #[serde(default)]
    pub retry: RetryConfig,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}

impl MappingRule {
    /// 校验规则字段（入库前由写入方调用）
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("规则 ID 不能为空".to_string());
        }
        if !(1..=1000).contains(&self.priority) {
            return Err(format!("优先级必须在 1..=1000 之间: {}", self.priority));
        }
        match &self.schedule {
            SchedulePeriod::Weekly { weekday } if !(1..=7).contains(weekday) => {
                return Err(format!("weekday 必须在 1..=7 之间: {}", weekday));
            }
            SchedulePeriod::Monthly { monthday } if !(1..=31).contains(monthday) => {
                return Err(format!("monthday 必须在 1..=31 之间: {}", monthday));
            }
            _ => {}
        }
        if let MatchSpec::Filename { pattern, .. } = &self.source {
            if pattern.is_empty() {
                return Err("文件名模式不能为空".to_string());
            }
        }
        Ok(())
    }
}

/// 文件类型注册项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTypeEntry {
    /// 类型标识
    pub id: String,
    /// 类型名称
    pub name: String,
    /// 归属的扩展名列表（小写，不含点）
    pub extensions: Vec<String>,
}

/// 上传登记项（由外部上传入口写入，filetype 匹配消费）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadEntry {
    /// 文件绝对路径
    pub file_path: String,
    /// 文件名
    pub file_name: String,
    /// 所属文件类型标识
    pub file_type_id: String,
    /// 登记时间
    pub uploaded_at: DateTime<Utc>,
}

/// 候选文件（匹配产出，冲突裁决之前）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    /// 源文件完整路径
    pub source_path: std::path::PathBuf,
    /// 文件名
    pub file_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_period_gate_daily_and_adhoc() {
        let d = date(2024, 3, 5);
        assert!(SchedulePeriod::Daily.fires_on(d));
        assert!(SchedulePeriod::Adhoc.fires_on(d));
    }

    #[test]
    fn test_period_gate_weekly() {
        // 2024-03-04 是周一，2024-03-05 是周二
        let gate = SchedulePeriod::Weekly { weekday: 1 };
        assert!(gate.fires_on(date(2024, 3, 4)));
        assert!(!gate.fires_on(date(2024, 3, 5)));
    }

    #[test]
    fn test_period_gate_monthly() {
        let gate = SchedulePeriod::Monthly { monthday: 15 };
        assert!(gate.fires_on(date(2024, 3, 15)));
        assert!(!gate.fires_on(date(2024, 3, 16)));

        // 31 号在小月不触发
        let gate = SchedulePeriod::Monthly { monthday: 31 };
        assert!(!gate.fires_on(date(2024, 4, 30)));
    }

    #[test]
    fn test_match_spec_tagged_serde() {
        let spec = MatchSpec::Filename {
            directory: "/data/{date}".to_string(),
            pattern: "report_*.csv".to_string(),
        };
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("\"match_type\":\"filename\""));

        let back: MatchSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);

        let spec = MatchSpec::FileType {
            file_type_ref: "settlement-report".to_string(),
        };
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("\"match_type\":\"file_type\""));
    }

    #[test]
    fn test_retry_delay_bounds() {
        let retry = RetryConfig {
            attempts: 3,
            delay_secs: 10,
        };

        assert_eq!(retry.delay_for(0), Duration::from_millis(0));

        // 固定间隔 ±25% 抖动
        for _ in 0..20 {
            let delay = retry.delay_for(1).as_millis() as u64;
            assert!((7500..=12500).contains(&delay), "delay: {}", delay);
        }
    }

    #[test]
    fn test_rule_validation() {
        let mut rule = MappingRule {
            id: "r1".to_string(),
            description: "每日清算报表".to_string(),
            module: BusinessModule::Settlement,
            enabled: true,
            priority: 100,
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
        };
        assert!(rule.validate().is_ok());

        rule.priority = 0;
        assert!(rule.validate().is_err());

        rule.priority = 1001;
        assert!(rule.validate().is_err());

        rule.priority = 500;
        rule.schedule = SchedulePeriod::Weekly { weekday: 8 };
        assert!(rule.validate().is_err());
    }
}
