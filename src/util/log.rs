use crate::util::config::LoggingConfig;
use std::io;
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::fmt::format::Format;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{filter::EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// 按配置初始化日志：控制台 + 可选的按天滚动文件
///
/// 返回的 `WorkerGuard` 需要在进程生命周期内持有，否则文件日志会丢失尾部内容。
pub fn log_init_with_config(
    file_prefix: &str,
    config: &LoggingConfig,
) -> anyhow::Result<Option<WorkerGuard>> {
    let level_filter = parse_level(&config.level);
    let use_json = config.structured.unwrap_or(false);

    let mut layers: Vec<BoxedLayer> = vec![console_layer(use_json, level_filter)];
    let mut guard = None;
    let mut log_dir_display = None;

    if config.file.enabled {
        let log_dir = resolve_log_dir(&config.file.directory);
        std::fs::create_dir_all(&log_dir)?;

        let file_appender = daily(&log_dir, format!("{}.log", file_prefix));
        let (no_blocking, file_guard) = tracing_appender::non_blocking(file_appender);
        let file_layer = if use_json {
            layer()
                .json()
                .with_target(false)
                .with_ansi(false)
                .with_writer(no_blocking)
                .with_filter(env_filter(level_filter))
                .boxed()
        } else {
            layer()
                .event_format(Format::default().with_target(false))
                .with_ansi(false)
                .with_writer(no_blocking)
                .with_filter(env_filter(level_filter))
                .boxed()
        };
        layers.push(file_layer);
        guard = Some(file_guard);
        log_dir_display = Some(log_dir.display().to_string());

        if let Some(retention) = config.file.retention_days {
            if let Err(e) = cleanup_old_logs(&log_dir, file_prefix, retention) {
                eprintln!("[warn] 清理旧日志失败: {e}");
            }
        }
    }

    Registry::default().with(layers).try_init()?;

    tracing::info!(
        event = "log.init",
        level = %config.level,
        console = true,
        file = config.file.enabled,
        directory = log_dir_display.as_deref().unwrap_or("-"),
        rotation = "daily",
        structured = use_json
    );
    if let Some(retention) = config.file.retention_days.filter(|_| config.file.enabled) {
        tracing::info!(event = "log.retention", days = retention);
    }

    Ok(guard)
}

fn console_layer(use_json: bool, level: LevelFilter) -> BoxedLayer {
    if use_json {
        layer()
            .json()
            .with_target(false)
            .with_writer(io::stdout)
            .with_filter(env_filter(level))
            .boxed()
    } else {
        layer()
            .event_format(Format::default().with_target(false).with_thread_ids(false))
            .with_writer(io::stdout)
            .with_filter(env_filter(level))
            .boxed()
    }
}

/// `RUST_LOG` 优先，其次使用配置的级别
fn env_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_filter_to_str(level)))
}

/// 相对路径基于工作目录；在 bin/ 下运行时使用上级目录
fn resolve_log_dir(directory: &str) -> PathBuf {
    let path = Path::new(directory);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let current_dir = ocr_conn::CURRENT_DIR.clone();
    if current_dir.file_name() == Some(std::ffi::OsStr::new("bin")) {
        if let Some(parent) = current_dir.parent() {
            return parent.join(directory);
        }
    }
    current_dir.join(directory)
}

pub fn parse_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    }
}

pub fn is_valid_level(level: &str) -> bool {
    matches!(
        level.to_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    )
}

fn level_filter_to_str(level: LevelFilter) -> &'static str {
    match level {
        LevelFilter::OFF => "off",
        LevelFilter::ERROR => "error",
        LevelFilter::WARN => "warn",
        LevelFilter::INFO => "info",
        LevelFilter::DEBUG => "debug",
        LevelFilter::TRACE => "trace",
    }
}

/// 按天滚动的当前日志文件名；tracing-appender 以 UTC 日期作后缀
fn active_log_names(file_prefix: &str) -> [String; 2] {
    [
        format!("{}.log.{}", file_prefix, chrono::Utc::now().format("%Y-%m-%d")),
        format!("{}.log.{}", file_prefix, chrono::Local::now().format("%Y-%m-%d")),
    ]
}

/// 删除超过保留天数的日志文件，只处理以 `file_prefix` 开头的文件
///
/// 当天正在写入的文件始终保留，`retention_days = 0` 时也不会删掉它。
pub fn cleanup_old_logs(log_dir: &Path, file_prefix: &str, retention_days: u32) -> anyhow::Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let retention = std::time::Duration::from_secs(retention_days as u64 * 24 * 60 * 60);
    let cutoff = std::time::SystemTime::now()
        .checked_sub(retention)
        .unwrap_or(std::time::UNIX_EPOCH);

    let active = active_log_names(file_prefix);
    let mut deleted_count = 0;
    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| {
                name.starts_with(file_prefix) && !active.iter().any(|current| current == name)
            });
        if !is_log {
            continue;
        }

        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata
            .modified()
            .unwrap_or_else(|_| std::time::SystemTime::now());
        if modified < cutoff {
            match std::fs::remove_file(&path) {
                Ok(()) => deleted_count += 1,
                Err(e) => eprintln!("[warn] 删除日志文件失败: {} - {}", path.display(), e),
            }
        }
    }

    Ok(deleted_count)
}

/// 日志目录健康状况（health-check 子命令使用）
pub fn check_log_health(log_dir: &Path) -> serde_json::Value {
    let exists = log_dir.exists();
    let writable = exists && super::dir_is_writable(log_dir);

    serde_json::json!({
        "status": if exists && writable { "healthy" } else { "error" },
        "directory_exists": exists,
        "directory_writable": writable,
        "path": log_dir.to_string_lossy()
    })
}
