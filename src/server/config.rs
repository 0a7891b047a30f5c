//! 配置管理模块
//! 负责配置文件的加载、验证和日志初始化

use crate::model::Language;
use crate::util::config::{Config, ConfigLoader, ConfigWriter};
use crate::util::log::{is_valid_level, log_init_with_config};
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

pub const LOG_FILE_PREFIX: &str = "pdf-ocr-server";
const MAX_RENDER_ZOOM: f32 = 8.0;

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 加载和验证配置
    ///
    /// 配置文件不存在时写出默认模板并继续；文件存在但无法解析时返回错误。
    pub fn load_and_validate() -> Result<(Config, ConfigValidationReport)> {
        let config_path = Self::find_config_file_path("config.yaml");
        let config = Self::load_from_path(&config_path)?;
        let report = Self::validate_config(&config);
        Ok((config, report))
    }

    pub fn load_from_path(config_path: &Path) -> Result<Config> {
        match ConfigLoader::load_with_env_overrides(config_path) {
            Ok(config) => Ok(config),
            Err(e) => {
                eprintln!("[warn] 配置文件读取失败: {} - {:#}", config_path.display(), e);
                Self::handle_config_load_failure(config_path)
            }
        }
    }

    /// 初始化日志系统
    pub fn initialize_logging(config: &Config) -> Result<Option<WorkerGuard>> {
        let guard = log_init_with_config(LOG_FILE_PREFIX, &config.logging)?;
        info!("[ok] 日志系统初始化完成");
        Ok(guard)
    }

    /// 查找配置文件路径，依次尝试 ./config/、../config/、<exe>/../config/ 与当前目录
    pub fn find_config_file_path(filename: &str) -> PathBuf {
        let current_dir = ocr_conn::CURRENT_DIR.clone();

        let config_in_current = current_dir.join("config").join(filename);
        if config_in_current.exists() {
            return config_in_current;
        }

        if let Some(parent) = current_dir.parent() {
            let config_in_parent = parent.join("config").join(filename);
            if config_in_parent.exists() {
                return config_in_parent;
            }
        }

        if let Some(exe_dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            if exe_dir.file_name() == Some(std::ffi::OsStr::new("bin")) {
                if let Some(project_root) = exe_dir.parent() {
                    let config_in_root = project_root.join("config").join(filename);
                    if config_in_root.exists() {
                        return config_in_root;
                    }
                }
            }
        }

        let dev_path = current_dir.join(filename);
        if dev_path.exists() {
            return dev_path;
        }

        // 都不存在时：bin/ 下运行写到上级 config/，否则写到 ./config/
        if current_dir.file_name() == Some(std::ffi::OsStr::new("bin")) {
            if let Some(parent) = current_dir.parent() {
                return parent.join("config").join(filename);
            }
        }
        config_in_current
    }

    /// 处理配置加载失败
    fn handle_config_load_failure(config_path: &Path) -> Result<Config> {
        if !config_path.exists() {
            eprintln!("[note] 创建默认配置文件: {}", config_path.display());
            let config = ConfigLoader::apply_env_overrides(Config::default());
            let template = ConfigWriter::generate_template();
            if let Err(write_err) = template.write_yaml_to_path(config_path) {
                eprintln!("[fail] 创建默认配置文件失败: {}", write_err);
            }
            Ok(config)
        } else {
            Err(anyhow::anyhow!(
                "配置文件解析失败: {}",
                config_path.display()
            ))
        }
    }

    /// 验证配置
    pub fn validate_config(config: &Config) -> ConfigValidationReport {
        let mut report = ConfigValidationReport::new();

        Self::validate_server_settings(config, &mut report);
        Self::validate_upload_settings(config, &mut report);
        Self::validate_ocr_settings(config, &mut report);

        if !is_valid_level(&config.logging.level) {
            report.add_warning("logging.level", "无效的日志级别，将使用 info");
        }

        report
    }

    fn validate_server_settings(config: &Config, report: &mut ConfigValidationReport) {
        if config.server.port == 0 {
            report.add_error("server.port", "端口不能为0");
        }
        if config.server.host.trim().is_empty() {
            report.add_error("server.host", "监听地址不能为空");
        }
    }

    fn validate_upload_settings(config: &Config, report: &mut ConfigValidationReport) {
        if config.upload.max_file_mb == 0 {
            report.add_error("upload.max_file_mb", "上传大小上限必须大于0");
        }
        if config.upload.allowed_extensions.is_empty() {
            report.add_error("upload.allowed_extensions", "至少需要一个允许的扩展名");
        } else if !config
            .upload
            .allowed_extensions
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case("pdf"))
        {
            report.add_warning("upload.allowed_extensions", "未包含 pdf，光栅化器只支持 PDF");
        }
        if config.upload.staging_dir.trim().is_empty() {
            report.add_error("upload.staging_dir", "暂存目录不能为空");
        }
    }

    fn validate_ocr_settings(config: &Config, report: &mut ConfigValidationReport) {
        let zoom = config.ocr.render_zoom;
        if !(zoom > 0.0 && zoom <= MAX_RENDER_ZOOM) {
            report.add_error(
                "ocr.render_zoom",
                &format!("缩放倍数必须在 (0, {}] 范围内", MAX_RENDER_ZOOM),
            );
        }

        for language in Language::ALL {
            if config.ocr.languages.get(language).config_path.is_none() {
                report.add_error(
                    &format!("ocr.languages.{}", language),
                    "缺少语言模型配置 config_path",
                );
            }
        }

        match &config.ocr.engine.work_dir {
            Some(dir) if !Path::new(dir).is_dir() => {
                report.add_warning("ocr.engine.work_dir", "引擎目录不存在，首次识别时将失败");
            }
            Some(_) => {}
            None => report.add_info("ocr.engine.work_dir", "使用默认引擎目录 ./ocr"),
        }

        if !config.ocr.count_empty_page_as_line {
            report.add_info("ocr.count_empty_page_as_line", "空文本页按 0 行计数");
        }
    }
}

/// 配置验证报告
#[derive(Debug, Clone, Default)]
pub struct ConfigValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub info: Vec<ValidationIssue>,
}

/// 验证问题
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ConfigValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, field: &str, message: &str) {
        self.errors.push(ValidationIssue {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn add_warning(&mut self, field: &str, message: &str) {
        self.warnings.push(ValidationIssue {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn add_info(&mut self, field: &str, message: &str) {
        self.info.push(ValidationIssue {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        !self.has_errors()
    }

    /// 日志初始化之后输出验证结果
    pub fn log_summary(&self) {
        for error in &self.errors {
            warn!(event = "config.validate.error", field = %error.field, "{}", error.message);
        }
        for warning in &self.warnings {
            warn!(event = "config.validate.warning", field = %warning.field, "{}", warning.message);
        }
        for item in &self.info {
            info!(event = "config.validate.info", field = %item.field, "{}", item.message);
        }
        info!(
            event = "config.load.done",
            errors = self.errors.len(),
            warnings = self.warnings.len()
        );
    }
}
