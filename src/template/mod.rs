//! 日期变量解析模块
//!
//! 将模板字符串中的日期变量替换为目标日期的具体值，支持：
//! - `{date}`：8 位日期（YYYYMMDD）
//! - `{Date:<格式>}`：自定义格式，令牌为 YYYY/YY/MM/M/DD/D/HH/H/mm/m/ss/s
//! - `{baseName}` / `{ext}`：候选文件自身的文件名占位符
//!
//! 未知或畸形的格式令牌原样保留并记录警告，不作为错误抛出：
//! 坏模板退化为一条可见的错误路径，而不是让定时任务崩溃。

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;

use crate::error::RelayError;

/// 日期输入值（字符串 / 秒级时间戳 / 日期对象，自动归一化）
#[derive(Debug, Clone)]
pub enum DateInput {
    /// 日期对象
    Date(NaiveDate),
    /// 秒级 Unix 时间戳
    Epoch(i64),
    /// 日期字符串
    Text(String),
}

impl DateInput {
    /// 归一化为日期时间（日期输入取当日零点）
    ///
    /// 接受的字符串形态：YYYY-MM-DD、YYYY/MM/DD、DD-MM-YYYY、
    /// DD/MM/YYYY、YYYYMMDD。
    pub fn normalize(&self) -> Result<NaiveDateTime, RelayError> {
        match self {
            DateInput::Date(d) => Ok(d.and_hms_opt(0, 0, 0).unwrap()),
            DateInput::Epoch(secs) => DateTime::from_timestamp(*secs, 0)
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| RelayError::ConfigError(format!("无效时间戳: {}", secs))),
            DateInput::Text(s) => parse_date_text(s).map(|d| d.and_hms_opt(0, 0, 0).unwrap()),
        }
    }
}

/// 解析日期字符串
fn parse_date_text(s: &str) -> Result<NaiveDate, RelayError> {
    let s = s.trim();
    let formats: &[(&str, &str)] = &[
        (r"^\d{4}-\d{2}-\d{2}$", "%Y-%m-%d"),
        (r"^\d{4}/\d{2}/\d{2}$", "%Y/%m/%d"),
        (r"^\d{2}-\d{2}-\d{4}$", "%d-%m-%Y"),
        (r"^\d{2}/\d{2}/\d{4}$", "%d/%m/%Y"),
        (r"^\d{8}$", "%Y%m%d"),
    ];

    for (pattern, fmt) in formats {
        // 模式均为常量，编译不会失败
        if Regex::new(pattern).unwrap().is_match(s) {
            return NaiveDate::parse_from_str(s, fmt)
                .map_err(|e| RelayError::ConfigError(format!("无法解析日期 {}: {}", s, e)));
        }
    }

    Err(RelayError::ConfigError(format!("无法识别的日期形态: {}", s)))
}

/// 日期变量解析器
pub struct DateVariableResolver;

impl DateVariableResolver {
    /// 展开模板中的全部日期变量
    pub fn resolve(template: &str, date: NaiveDate) -> String {
        let dt = date.and_hms_opt(0, 0, 0).unwrap();
        Self::resolve_datetime(template, dt)
    }

    /// 展开模板（带时间分量的输入，如时间戳归一化结果）
    pub fn resolve_datetime(template: &str, dt: NaiveDateTime) -> String {
        // {date} → YYYYMMDD
        let mut result = template.replace("{date}", &dt.format("%Y%m%d").to_string());

        // {Date:<fmt>} → 按令牌展开
        let date_var = Regex::new(r"\{Date:([^}]*)\}").unwrap();
        while let Some(caps) = date_var.captures(&result) {
            let whole = caps.get(0).unwrap();
            let fmt = caps.get(1).unwrap().as_str();
            let expanded = expand_format_tokens(fmt, dt);
            let range = whole.range();
            result.replace_range(range, &expanded);
        }

        // 畸形变量（缺少右花括号）原样保留，仅警告
        if result.contains("{Date:") {
            tracing::warn!("模板存在未闭合的日期变量，已原样保留: {}", template);
        }

        result
    }

    /// 以任意受支持的日期输入展开模板（字符串/时间戳先归一化）
    pub fn resolve_input(template: &str, input: &DateInput) -> Result<String, RelayError> {
        Ok(Self::resolve_datetime(template, input.normalize()?))
    }

    /// 展开候选文件自身的占位符：{baseName} 与 {ext}
    pub fn resolve_file_placeholders(template: &str, file_name: &str) -> String {
        let path = std::path::Path::new(file_name);
        let base_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let ext = path
            .extension()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        template
            .replace("{baseName}", &base_name)
            .replace("{ext}", &ext)
    }
}

/// 按令牌展开自定义日期格式
///
/// 最长令牌优先扫描；非令牌字符原样通过。未知的字母令牌保留原文
/// 并记录警告。
fn expand_format_tokens(fmt: &str, dt: NaiveDateTime) -> String {
    // (令牌, chrono 格式)，按长度降序排列保证最长匹配
    const TOKENS: &[(&str, &str)] = &[
        ("YYYY", "%Y"),
        ("YY", "%y"),
        ("MM", "%m"),
        ("DD", "%d"),
        ("HH", "%H"),
        ("mm", "%M"),
        ("ss", "%S"),
        ("M", "%-m"),
        ("D", "%-d"),
        ("H", "%-H"),
        ("m", "%-M"),
        ("s", "%-S"),
    ];

    let mut out = String::with_capacity(fmt.len() + 4);
    let bytes = fmt.as_bytes();
    let mut i = 0;
    let mut warned = false;

    'outer: while i < bytes.len() {
        for (token, chrono_fmt) in TOKENS {
            if fmt[i..].starts_with(token) {
                out.push_str(&dt.format(chrono_fmt).to_string());
                i += token.len();
                continue 'outer;
            }
        }

        let ch = fmt[i..].chars().next().unwrap();
        if ch.is_ascii_alphabetic() && !warned {
            tracing::warn!("日期格式含未知令牌，已原样保留: {}", fmt);
            warned = true;
        }
        out.push(ch);
        i += ch.len_utf8();
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_resolve_date_variable() {
        let result = DateVariableResolver::resolve("/inbox/{date}/report.txt", date(2024, 3, 5));
        assert_eq!(result, "/inbox/20240305/report.txt");
    }

    #[test]
    fn test_resolve_custom_format() {
        let d = date(2024, 3, 5);
        assert_eq!(
            DateVariableResolver::resolve("out_{Date:YYYY-MM-DD}.csv", d),
            "out_2024-03-05.csv"
        );
        // 单字母令牌不补零
        assert_eq!(
            DateVariableResolver::resolve("{Date:YYYY/M/D}", d),
            "2024/3/5"
        );
        // 两位年份
        assert_eq!(DateVariableResolver::resolve("{Date:YYMMDD}", d), "240305");
    }

    #[test]
    fn test_multiple_variables() {
        let d = date(2024, 12, 31);
        let result = DateVariableResolver::resolve("{date}/{Date:YYYY}/{Date:MM}", d);
        assert_eq!(result, "20241231/2024/12");
    }

    #[test]
    fn test_unknown_tokens_kept() {
        // Q 不是合法令牌，原样保留而不是报错
        let result = DateVariableResolver::resolve("{Date:YYYY-Q}", date(2024, 3, 5));
        assert_eq!(result, "2024-Q");
    }

    #[test]
    fn test_malformed_variable_kept() {
        // 未闭合的变量整体保留
        let result = DateVariableResolver::resolve("a/{Date:YYYY", date(2024, 3, 5));
        assert_eq!(result, "a/{Date:YYYY");
    }

    #[test]
    fn test_no_variables() {
        let result = DateVariableResolver::resolve("/plain/path.txt", date(2024, 3, 5));
        assert_eq!(result, "/plain/path.txt");
    }

    #[test]
    fn test_file_placeholders() {
        let result = DateVariableResolver::resolve_file_placeholders(
            "{baseName}_copy.{ext}",
            "report_20240305.csv",
        );
        assert_eq!(result, "report_20240305_copy.csv");

        // 无扩展名文件
        let result = DateVariableResolver::resolve_file_placeholders("{baseName}.{ext}", "README");
        assert_eq!(result, "README.");
    }

    #[test]
    fn test_date_input_normalization() {
        let expected = date(2024, 3, 5);

        for s in ["2024-03-05", "2024/03/05", "05-03-2024", "05/03/2024", "20240305"] {
            let dt = DateInput::Text(s.to_string()).normalize().unwrap();
            assert_eq!(dt.date(), expected, "input: {}", s);
        }

        let dt = DateInput::Date(expected).normalize().unwrap();
        assert_eq!(dt.date(), expected);

        // 2024-03-05 00:00:00 UTC
        let dt = DateInput::Epoch(1709596800).normalize().unwrap();
        assert_eq!(dt.date(), expected);
    }

    #[test]
    fn test_resolve_input_normalizes_first() {
        let input = DateInput::Text("05/03/2024".to_string());
        let result = DateVariableResolver::resolve_input("{date}", &input).unwrap();
        assert_eq!(result, "20240305");
    }

    #[test]
    fn test_date_input_rejects_garbage() {
        assert!(DateInput::Text("not-a-date".to_string()).normalize().is_err());
        assert!(DateInput::Text("2024-13-99".to_string()).normalize().is_err());
    }
}
