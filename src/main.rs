use chrono::{FixedOffset, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use partner_relay_rust::{
    decrypt::{DecryptBatchProcessor, GpgCommandTool, KeyRotationResolver},
    AppConfig, LocalDirStore, ProgressPublisher, RecordManager, SyncOrchestrator,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// 合作方文件中继系统命令行入口
#[derive(Parser)]
#[command(name = "partner-relay", version, about = "合作方文件中继系统：日批次解密 + 规则同步")]
struct Cli {
    /// 配置文件路径
    #[arg(long, default_value = "config/relay.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 打印目录与密钥文件的就绪状态
    Status,
    /// 运行解密批次（默认处理固定时区的昨天）
    Decrypt {
        /// 目标日期（YYYY-MM-DD），缺省为昨天
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// 运行规则同步（默认处理固定时区的昨天）
    Sync {
        /// 目标日期（YYYY-MM-DD），缺省为昨天
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

/// 固定业务时区（UTC+8），"昨天"按该时区计算
fn yesterday() -> NaiveDate {
    let tz = FixedOffset::east_opt(8 * 3600).unwrap();
    Utc::now()
        .with_timezone(&tz)
        .date_naive()
        .pred_opt()
        .unwrap()
}

/// 打印就绪状态摘要
fn print_status(config: &AppConfig) {
    let checks = [
        ("收件箱目录", config.decrypt.inbox_dir.is_dir()),
        ("解密输出目录", config.decrypt.output_dir.is_dir()),
        ("远程挂载目录", config.sync.remote_root.is_dir()),
        ("旧密钥文件", config.keys.legacy_key_file.is_file()),
        ("当前密钥文件", config.keys.current_key_file.is_file()),
        ("口令文件", config.keys.passphrase_file.is_file()),
    ];

    for (name, present) in checks {
        if present {
            info!("{}: 就绪", name);
        } else {
            warn!("{}: 缺失", name);
        }
    }
}

#[tokio::main]
async fn main() {
    // 初始化日志系统
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load_or_default(&cli.config).await;

    let exit_code = match cli.command {
        Command::Status => {
            print_status(&config);
            0
        }
        Command::Decrypt { date } => run_decrypt(&config, date.unwrap_or_else(yesterday)).await,
        Command::Sync { date } => run_sync(&config, date.unwrap_or_else(yesterday)).await,
    };

    std::process::exit(exit_code);
}

/// 运行解密批次，success == total 时退出码为 0
async fn run_decrypt(config: &AppConfig, date: NaiveDate) -> i32 {
    print_status(config);

    let records = match RecordManager::new(&config.database.db_path) {
        Ok(records) => Arc::new(records),
        Err(e) => {
            error!("记录库初始化失败: {}", e);
            return 1;
        }
    };

    let processor = DecryptBatchProcessor::new(
        config.decrypt.inbox_dir.clone(),
        config.decrypt.output_dir.clone(),
        KeyRotationResolver::from_config(&config.keys),
        Arc::new(GpgCommandTool::new()),
        records,
        ProgressPublisher::default_capacity(),
    );

    info!("解密批次开始: date={}", date);
    match processor.process_batch(date).await {
        Ok(report) => {
            info!(
                "解密批次结束: total={} processed={} decrypted={} copied={} failed={}",
                report.total, report.processed, report.decrypted, report.copied, report.failed
            );
            if report.processed == report.total {
                0
            } else {
                1
            }
        }
        Err(e) => {
            error!("解密批次失败: {}", e);
            1
        }
    }
}

/// 运行规则同步
async fn run_sync(config: &AppConfig, date: NaiveDate) -> i32 {
    let records = match RecordManager::new(&config.database.db_path) {
        Ok(records) => Arc::new(records),
        Err(e) => {
            error!("记录库初始化失败: {}", e);
            return 1;
        }
    };

    let remote = Arc::new(LocalDirStore::new(config.sync.remote_root.clone()));
    let orchestrator = SyncOrchestrator::new(
        records,
        remote,
        config.sync.max_rename_attempts,
        ProgressPublisher::default_capacity(),
    );

    info!("同步运行开始: date={}", date);
    match orchestrator.run(date).await {
        Ok(summary) => {
            info!(
                "同步运行结束: status={} rules={} files={} synced={} skipped={} failed={}",
                summary.status.as_str(),
                summary.total_rules,
                summary.total_files,
                summary.synced,
                summary.skipped,
                summary.failed
            );
            for result in &summary.rule_results {
                info!(
                    "  [{}] {} -> {} (成功 {} / 失败 {} / 跳过 {})",
                    result.rule_id,
                    result.description,
                    result.status.as_str(),
                    result.success_count,
                    result.failed_count,
                    result.skipped_count
                );
            }
            if summary.failed == 0 {
                0
            } else {
                1
            }
        }
        Err(e) => {
            error!("同步运行失败: {}", e);
            1
        }
    }
}
