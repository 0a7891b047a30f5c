//! 服务器模块
//!
//! - 配置管理 (config.rs)
//! - HTTP服务器设置 (http.rs)
//!
//! `ServerBootstrap` 负责加载配置、初始化日志、准备暂存目录与识别引擎，然后启动 HTTP 服务。

pub mod config;
pub mod http;

pub use config::{ConfigManager, ConfigValidationReport};
pub use http::{HttpServer, ServerManager};

use crate::build_info;
use crate::util::config::Config;
use crate::util::log::check_log_health;
use crate::util::processing::{PaddleRecognizer, PopplerRasterizer};
use crate::AppState;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

const PREWARM_TIMEOUT: Duration = Duration::from_secs(30);

/// 服务器引导程序 - 统一的服务器启动入口
pub struct ServerBootstrap {
    config: Config,
    _log_guard: Option<WorkerGuard>,
}

impl ServerBootstrap {
    /// 加载配置并初始化日志；配置验证有错误时返回失败
    pub async fn new() -> Result<Self> {
        let (config, validation_report) = ConfigManager::load_and_validate()?;
        let log_guard = ConfigManager::initialize_logging(&config)?;
        validation_report.log_summary();

        if validation_report.has_errors() {
            return Err(anyhow::anyhow!(
                "配置验证失败: {} 个错误",
                validation_report.errors.len()
            ));
        }

        Ok(Self {
            config,
            _log_guard: log_guard,
        })
    }

    /// 启动服务器
    pub async fn start(self) -> Result<()> {
        info!("=== PDF OCR 服务启动 ===");
        info!("版本信息: {}", build_info::summary());
        info!(
            event = "server.config",
            address = %self.config.bind_address(),
            max_file_mb = self.config.upload.max_file_mb,
            staging_dir = %self.config.upload.staging_dir,
            render_zoom = self.config.ocr.render_zoom
        );

        let staging_dir = prepare_staging_dir(&self.config.staging_dir())?;
        info!("[ok] 暂存目录就绪: {}", staging_dir.display());

        let recognizer = Arc::new(PaddleRecognizer::from_config(&self.config));
        if self.config.ocr.prewarm {
            Self::prewarm_engines(recognizer.clone()).await;
        }

        let app_state = AppState::new(
            self.config.clone(),
            Arc::new(PopplerRasterizer::new(self.config.ocr.render_zoom)),
            recognizer.clone(),
        );

        let server = ServerManager::create_server(&self.config, app_state).await?;
        let result = ServerManager::start_server(server).await;

        let stats = recognizer.registry().stats();
        info!(
            event = "recognizer.stats",
            initialized = ?stats.initialized,
            started = stats.total_started,
            restarted = stats.total_restarted,
            failures = stats.total_failures
        );
        result
    }

    /// 预先拉起全部语言的引擎；超时或失败只记日志，首次请求时会再次尝试
    async fn prewarm_engines(recognizer: Arc<PaddleRecognizer>) {
        info!("[hot] 预热OCR引擎...");
        let task = tokio::task::spawn_blocking(move || recognizer.prewarm());
        match timeout(PREWARM_TIMEOUT, task).await {
            Ok(Ok(results)) => {
                for (language, outcome) in results {
                    match outcome {
                        Ok(()) => info!("[ok] OCR引擎预热完成: {}", language),
                        Err(e) => warn!("[warn] OCR引擎预热失败: {} - {:#}", language, e),
                    }
                }
            }
            Ok(Err(e)) => warn!("[warn] OCR引擎预热任务异常: {}", e),
            Err(_) => warn!(
                "[warn] OCR引擎预热超时（{}秒），首次请求可能会有延迟",
                PREWARM_TIMEOUT.as_secs()
            ),
        }
    }
}

/// 创建暂存目录并确认可写
pub fn prepare_staging_dir(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("无法创建暂存目录: {}", dir.display()))?;
    if !crate::util::dir_is_writable(dir) {
        return Err(anyhow::anyhow!("暂存目录不可写: {}", dir.display()));
    }
    Ok(dir.to_path_buf())
}

fn health_report(config: &Config, validation: &ConfigValidationReport) -> SystemHealthReport {
    let staging_dir = config.staging_dir();
    let staging_writable = prepare_staging_dir(&staging_dir).is_ok();

    let log_health = if config.logging.file.enabled {
        Some(check_log_health(Path::new(&config.logging.file.directory)))
    } else {
        None
    };

    let engine_binary = config
        .engine_options(crate::model::Language::En)
        .binary_path();
    let engine_present = engine_binary.is_file();

    SystemHealthReport {
        overall_healthy: validation.is_valid() && staging_writable,
        config_valid: validation.is_valid(),
        staging_dir,
        staging_writable,
        engine_binary,
        engine_present,
        log_health,
        validation_warnings: validation
            .warnings
            .iter()
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect(),
        check_time: chrono::Local::now(),
    }
}

/// 系统健康检查报告
#[derive(Debug, Clone)]
pub struct SystemHealthReport {
    pub overall_healthy: bool,
    pub config_valid: bool,
    pub staging_dir: PathBuf,
    pub staging_writable: bool,
    pub engine_binary: PathBuf,
    pub engine_present: bool,
    pub log_health: Option<serde_json::Value>,
    pub validation_warnings: Vec<String>,
    pub check_time: chrono::DateTime<chrono::Local>,
}

/// 便捷函数：快速启动服务器
pub async fn start_server() -> Result<()> {
    let bootstrap = ServerBootstrap::new().await?;
    bootstrap.start().await
}

/// 便捷函数：执行健康检查
///
/// 配置有错误时依然返回报告，由调用方决定退出码。
pub async fn check_system_health() -> Result<SystemHealthReport> {
    let (config, validation_report) = ConfigManager::load_and_validate()?;
    Ok(health_report(&config, &validation_report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn staging_dir_is_created() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("temp_uploads");
        let prepared = prepare_staging_dir(&nested).unwrap();
        assert!(prepared.is_dir());
    }

    #[test]
    fn health_report_reflects_config_and_staging() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.upload.staging_dir = dir.path().join("staging").to_string_lossy().to_string();
        config.logging.file.enabled = false;
        config.ocr.engine.work_dir = Some(dir.path().join("paddle").to_string_lossy().to_string());

        let validation = ConfigManager::validate_config(&config);
        let report = health_report(&config, &validation);
        assert!(report.config_valid);
        assert!(report.staging_writable);
        assert!(report.overall_healthy);
        assert!(!report.engine_present);
        assert!(report.log_health.is_none());
        assert!(!report.validation_warnings.is_empty());
    }
}
