//! 解密批次处理器
//!
//! 一次批次处理一个日期：递归发现收件箱中带 8 位日期令牌的
//! 文件，过滤到目标日期，按需导入密钥（每批次仅一次），逐文件
//! 顺序解密或复制，发布进度事件，并为该日期落一行解密日志。
//!
//! 单文件失败被就地捕获计数，不中断批次；收件箱目录缺失属于
//! 不可恢复的准备失败，落失败日志后向调用方抛出。

use chrono::{NaiveDate, Utc};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::decrypt::keys::KeyRotationResolver;
use crate::decrypt::tool::DecryptTool;
use crate::error::RelayError;
use crate::events::{DecryptCompleteEvent, DecryptProgressEvent, ProgressEvent, ProgressPublisher};
use crate::record::{DecryptLog, RecordManager};

/// 加密文件扩展名
const ENCRYPTED_EXTENSIONS: &[&str] = &["gpg", "pgp"];

/// 发现的源文件描述（瞬态，不持久化）
#[derive(Debug, Clone)]
pub struct GpgFileDescriptor {
    /// 文件完整路径
    pub file_path: PathBuf,
    /// 文件名
    pub file_name: String,
    /// 从文件名提取的日期
    pub date: NaiveDate,
    /// 是否为加密文件（按扩展名）
    pub is_encrypted: bool,
    /// 选中的密钥文件（加密文件才有）
    pub resolved_key_file: Option<PathBuf>,
}

/// 批次处理结果
#[derive(Debug, Clone, Default)]
pub struct DecryptBatchReport {
    /// 目标日期命中的文件总数
    pub total: usize,
    /// 成功处理数（= decrypted + copied）
    pub processed: usize,
    /// 解密成功数
    pub decrypted: usize,
    /// 原样复制数
    pub copied: usize,
    /// 失败数
    pub failed: usize,
    /// 逐文件错误信息
    pub errors: Vec<String>,
}

/// 解密批次处理器
pub struct DecryptBatchProcessor {
    /// 收件箱目录（递归扫描）
    inbox_dir: PathBuf,
    /// 解密输出根目录（批次写入 output_dir/YYYYMMDD/）
    output_dir: PathBuf,
    /// 密钥轮换解析器
    keys: KeyRotationResolver,
    /// 外部解密工具
    tool: Arc<dyn DecryptTool>,
    /// 记录管理器
    records: Arc<RecordManager>,
    /// 进度发布器
    publisher: ProgressPublisher,
}

impl DecryptBatchProcessor {
    /// 创建新的批次处理器
    pub fn new(
        inbox_dir: PathBuf,
        output_dir: PathBuf,
        keys: KeyRotationResolver,
        tool: Arc<dyn DecryptTool>,
        records: Arc<RecordManager>,
        publisher: ProgressPublisher,
    ) -> Self {
        Self {
            inbox_dir,
            output_dir,
            keys,
            tool,
            records,
            publisher,
        }
    }

    /// 处理一个日期的批次
    pub async fn process_batch(&self, date: NaiveDate) -> Result<DecryptBatchReport, RelayError> {
        match self.process_batch_inner(date).await {
            Ok(report) => {
                self.persist_log(date, &report, None);
                Ok(report)
            }
            Err(e) => {
                // 批次级失败也要落一行日志
                self.persist_log(date, &DecryptBatchReport::default(), Some(e.to_string()));
                Err(e)
            }
        }
    }

    async fn process_batch_inner(
        &self,
        date: NaiveDate,
    ) -> Result<DecryptBatchReport, RelayError> {
        if !self.inbox_dir.is_dir() {
            return Err(RelayError::DirectoryNotFound(
                self.inbox_dir.display().to_string(),
            ));
        }

        // 发现并过滤到目标日期
        let mut descriptors = discover_dated_files(&self.inbox_dir)?;
        descriptors.retain(|d| d.date == date);

        let mut report = DecryptBatchReport {
            total: descriptors.len(),
            ..Default::default()
        };

        // 目标日期的输出目录
        let dated_output = self.output_dir.join(date.format("%Y%m%d").to_string());
        std::fs::create_dir_all(&dated_output)?;

        // 有加密文件时解析并导入密钥，整个批次仅一次
        let mut key_context: Option<(PathBuf, Option<String>)> = None;
        if descriptors.iter().any(|d| d.is_encrypted) {
            let key_file = self.keys.resolve_key_file(date).to_path_buf();
            let passphrase = self.keys.resolve_passphrase(&key_file)?;

            self.tool
                .import_key(&key_file, passphrase.as_deref())
                .await?;
            tracing::info!("批次密钥已导入: {} (date={})", key_file.display(), date);

            for d in descriptors.iter_mut().filter(|d| d.is_encrypted) {
                d.resolved_key_file = Some(key_file.clone());
            }
            key_context = Some((key_file, passphrase));
        }

        // 逐文件顺序处理
        for descriptor in &descriptors {
            self.publisher
                .publish(ProgressEvent::DecryptProgress(DecryptProgressEvent {
                    date,
                    total: report.total,
                    processed: report.processed,
                    decrypted: report.decrypted,
                    copied: report.copied,
                    failed: report.failed,
                    current_file: descriptor.file_name.clone(),
                    timestamp: Utc::now(),
                }));

            let result = self
                .process_file(descriptor, &dated_output, key_context.as_ref())
                .await;

            match result {
                Ok(was_decrypted) => {
                    report.processed += 1;
                    if was_decrypted {
                        report.decrypted += 1;
                    } else {
                        report.copied += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!("文件处理失败: {} ({})", descriptor.file_name, e);
                    report.failed += 1;
                    report.errors.push(format!("{}: {}", descriptor.file_name, e));
                }
            }
        }

        self.publisher
            .publish(ProgressEvent::DecryptComplete(DecryptCompleteEvent {
                date,
                total: report.total,
                processed: report.processed,
                decrypted: report.decrypted,
                copied: report.copied,
                failed: report.failed,
                timestamp: Utc::now(),
            }));

        tracing::info!(
            "批次完成: date={} total={} decrypted={} copied={} failed={}",
            date,
            report.total,
            report.decrypted,
            report.copied,
            report.failed
        );

        Ok(report)
    }

    /// 处理单个文件，返回是否走了解密路径
    async fn process_file(
        &self,
        descriptor: &GpgFileDescriptor,
        dated_output: &Path,
        key_context: Option<&(PathBuf, Option<String>)>,
    ) -> Result<bool, RelayError> {
        if descriptor.is_encrypted {
            let (key_file, passphrase) = key_context
                .ok_or_else(|| RelayError::DecryptError("批次密钥未初始化".to_string()))?;

            self.tool
                .decrypt(
                    &descriptor.file_path,
                    dated_output,
                    key_file,
                    passphrase.as_deref(),
                )
                .await?;
            Ok(true)
        } else {
            std::fs::copy(
                &descriptor.file_path,
                dated_output.join(&descriptor.file_name),
            )?;
            Ok(false)
        }
    }

    /// 落一行解密日志（持久化失败只记录，不影响批次结果）
    fn persist_log(&self, date: NaiveDate, report: &DecryptBatchReport, error: Option<String>) {
        let success = error.is_none() && report.failed == 0;
        let message = error.or_else(|| {
            if report.errors.is_empty() {
                None
            } else {
                Some(report.errors.join("; "))
            }
        });

        let log = DecryptLog {
            id: Uuid::new_v4().to_string(),
            date,
            success,
            total: report.total,
            decrypted: report.decrypted,
            copied: report.copied,
            failed: report.failed,
            message,
            created_at: Utc::now(),
        };

        if let Err(e) = self.records.insert_decrypt_log(&log) {
            tracing::error!("解密日志写入失败: {}", e);
        }
    }
}

/// 递归发现带 8 位日期令牌的文件
///
/// 文件名中没有可解析日期令牌的文件被整体忽略，不算错误。
fn discover_dated_files(root: &Path) -> Result<Vec<GpgFileDescriptor>, RelayError> {
    let token = Regex::new(r"\d{8}").unwrap();
    let mut descriptors = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();

            if entry.file_type()?.is_dir() {
                stack.push(path);
                continue;
            }

            let file_name = entry.file_name().to_string_lossy().to_string();
            let Some(date) = token
                .find(&file_name)
                .and_then(|m| NaiveDate::parse_from_str(m.as_str(), "%Y%m%d").ok())
            else {
                continue;
            };

            let is_encrypted = path
                .extension()
                .map(|ext| {
                    let ext = ext.to_string_lossy().to_lowercase();
                    ENCRYPTED_EXTENSIONS.contains(&ext.as_str())
                })
                .unwrap_or(false);

            descriptors.push(GpgFileDescriptor {
                file_path: path,
                file_name,
                date,
                is_encrypted,
                resolved_key_file: None,
            });
        }
    }

    Ok(descriptors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeyConfig;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::TempDir;

    /// 记录调用并落盘假产物的测试解密工具
    #[derive(Default)]
    struct MockDecryptTool {
        imports: Mutex<Vec<(PathBuf, Option<String>)>>,
        decrypted: Mutex<Vec<PathBuf>>,
        fail_files: Mutex<HashSet<String>>,
    }

    impl MockDecryptTool {
        fn fail_on(&self, file_name: &str) {
            self.fail_files.lock().insert(file_name.to_string());
        }
    }

    #[async_trait]
    impl DecryptTool for MockDecryptTool {
        async fn import_key(
            &self,
            key_file: &Path,
            passphrase: Option<&str>,
        ) -> Result<(), RelayError> {
            self.imports
                .lock()
                .push((key_file.to_path_buf(), passphrase.map(str::to_string)));
            Ok(())
        }

        async fn decrypt(
            &self,
            input: &Path,
            output_dir: &Path,
            _key_file: &Path,
            _passphrase: Option<&str>,
        ) -> Result<PathBuf, RelayError> {
            let name = input.file_name().unwrap().to_string_lossy().to_string();
            if self.fail_files.lock().contains(&name) {
                return Err(RelayError::DecryptError("injected failure".to_string()));
            }

            let out = output_dir.join(input.file_stem().unwrap());
            fs::write(&out, b"plaintext").unwrap();
            self.decrypted.lock().push(input.to_path_buf());
            Ok(out)
        }
    }

    struct Fixture {
        _dir: TempDir,
        inbox: PathBuf,
        output: PathBuf,
        tool: Arc<MockDecryptTool>,
        records: Arc<RecordManager>,
        processor: DecryptBatchProcessor,
    }

    fn fixture() -> Fixture {
        fixture_with_cutover(NaiveDate::from_ymd_opt(2023, 6, 1).unwrap())
    }

    fn fixture_with_cutover(cutover: NaiveDate) -> Fixture {
        let dir = TempDir::new().unwrap();
        let inbox = dir.path().join("inbox");
        let output = dir.path().join("decrypted");
        fs::create_dir_all(&inbox).unwrap();

        let passphrase_file = dir.path().join("current.pass");
        fs::write(&passphrase_file, " phrase-42 \n").unwrap();

        let keys = KeyRotationResolver::from_config(&KeyConfig {
            legacy_key_file: dir.path().join("legacy.asc"),
            current_key_file: dir.path().join("current.asc"),
            passphrase_file,
            cutover_date: cutover,
        });

        let tool = Arc::new(MockDecryptTool::default());
        let records = Arc::new(RecordManager::new(&dir.path().join("db.sqlite")).unwrap());

        let processor = DecryptBatchProcessor::new(
            inbox.clone(),
            output.clone(),
            keys,
            tool.clone(),
            records.clone(),
            ProgressPublisher::default_capacity(),
        );

        Fixture {
            _dir: dir,
            inbox,
            output,
            tool,
            records,
            processor,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_batch_determinism() {
        let f = fixture();
        fs::write(f.inbox.join("a_20240305.csv.gpg"), b"x").unwrap();
        fs::write(f.inbox.join("b_20240305.csv.gpg"), b"x").unwrap();
        fs::write(f.inbox.join("c_20240305.csv"), b"x").unwrap();

        let report = f.processor.process_batch(date(2024, 3, 5)).await.unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(report.processed, 3);
        assert_eq!(report.decrypted + report.copied, 3);
        assert_eq!(report.decrypted, 2);
        assert_eq!(report.copied, 1);
        assert_eq!(report.failed, 0);

        // 恰好一行成功日志
        let logs = f.records.list_decrypt_logs(date(2024, 3, 5)).unwrap();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].success);

        // 复制产物落在日期目录下
        assert!(f.output.join("20240305").join("c_20240305.csv").is_file());
    }

    #[tokio::test]
    async fn test_key_imported_once_per_batch() {
        let f = fixture();
        fs::write(f.inbox.join("a_20240305.csv.gpg"), b"x").unwrap();
        fs::write(f.inbox.join("b_20240305.csv.gpg"), b"x").unwrap();

        f.processor.process_batch(date(2024, 3, 5)).await.unwrap();

        let imports = f.tool.imports.lock();
        assert_eq!(imports.len(), 1);
        // 2024 年在切换日之后 → 当前密钥 + 口令（已去除空白）
        assert!(imports[0].0.ends_with("current.asc"));
        assert_eq!(imports[0].1.as_deref(), Some("phrase-42"));
    }

    #[tokio::test]
    async fn test_legacy_key_before_cutover() {
        let f = fixture();
        fs::write(f.inbox.join("old_20230531.csv.gpg"), b"x").unwrap();

        f.processor.process_batch(date(2023, 5, 31)).await.unwrap();

        let imports = f.tool.imports.lock();
        assert_eq!(imports.len(), 1);
        assert!(imports[0].0.ends_with("legacy.asc"));
        assert_eq!(imports[0].1, None);
    }

    #[tokio::test]
    async fn test_no_import_without_encrypted_files() {
        let f = fixture();
        fs::write(f.inbox.join("plain_20240305.csv"), b"x").unwrap();

        f.processor.process_batch(date(2024, 3, 5)).await.unwrap();
        assert!(f.tool.imports.lock().is_empty());
    }

    #[tokio::test]
    async fn test_files_without_date_token_ignored() {
        let f = fixture();
        fs::write(f.inbox.join("no-date.csv"), b"x").unwrap();
        fs::write(f.inbox.join("short_123.csv"), b"x").unwrap();
        fs::write(f.inbox.join("other_20240306.csv"), b"x").unwrap();
        // 嵌套目录也会被扫描
        let nested = f.inbox.join("nested");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("deep_20240305.csv"), b"x").unwrap();

        let report = f.processor.process_batch(date(2024, 3, 5)).await.unwrap();
        assert_eq!(report.total, 1);
        assert_eq!(report.copied, 1);
    }

    #[tokio::test]
    async fn test_per_file_failure_does_not_abort() {
        let f = fixture();
        fs::write(f.inbox.join("bad_20240305.csv.gpg"), b"x").unwrap();
        fs::write(f.inbox.join("good_20240305.csv.gpg"), b"x").unwrap();
        f.tool.fail_on("bad_20240305.csv.gpg");

        let report = f.processor.process_batch(date(2024, 3, 5)).await.unwrap();

        assert_eq!(report.total, 2);
        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("bad_20240305.csv.gpg"));

        // 有失败的批次日志记为 fail
        let logs = f.records.list_decrypt_logs(date(2024, 3, 5)).unwrap();
        assert_eq!(logs.len(), 1);
        assert!(!logs[0].success);
    }

    #[tokio::test]
    async fn test_missing_inbox_is_fatal_and_logged() {
        let f = fixture();
        fs::remove_dir_all(&f.inbox).unwrap();

        let result = f.processor.process_batch(date(2024, 3, 5)).await;
        assert!(matches!(result, Err(RelayError::DirectoryNotFound(_))));

        // 失败也要恰好落一行日志
        let logs = f.records.list_decrypt_logs(date(2024, 3, 5)).unwrap();
        assert_eq!(logs.len(), 1);
        assert!(!logs[0].success);
    }

    #[tokio::test]
    async fn test_progress_events_emitted() {
        let dir = TempDir::new().unwrap();
        let inbox = dir.path().join("inbox");
        fs::create_dir_all(&inbox).unwrap();
        fs::write(inbox.join("a_20240305.csv"), b"x").unwrap();

        let publisher = ProgressPublisher::default_capacity();
        let mut rx = publisher.subscribe();

        let keys = KeyRotationResolver::from_config(&KeyConfig {
            legacy_key_file: dir.path().join("legacy.asc"),
            current_key_file: dir.path().join("current.asc"),
            passphrase_file: dir.path().join("current.pass"),
            cutover_date: date(2023, 6, 1),
        });
        let records = Arc::new(RecordManager::new(&dir.path().join("db.sqlite")).unwrap());
        let processor = DecryptBatchProcessor::new(
            inbox,
            dir.path().join("out"),
            keys,
            Arc::new(MockDecryptTool::default()),
            records,
            publisher,
        );

        processor.process_batch(date(2024, 3, 5)).await.unwrap();

        // 每个文件一条进度事件 + 一条完成事件
        let first = rx.recv().await.unwrap();
        assert_eq!(first.event_name(), "decrypt_progress");
        let last = rx.recv().await.unwrap();
        assert_eq!(last.event_name(), "decrypt_complete");
    }
}
