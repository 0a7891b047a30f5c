//! 配置结构定义模块

use ocr_conn::ocr::OcrEngineOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::model::Language;

/// 主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

/// 上传限制与暂存目录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 单个上传文件最大大小（MB）
    #[serde(default = "default_max_file_mb")]
    pub max_file_mb: u64,
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_mb: default_max_file_mb(),
            staging_dir: default_staging_dir(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

impl UploadConfig {
    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_mb.saturating_mul(1024 * 1024)
    }
}

fn default_max_file_mb() -> u64 {
    16
}

fn default_staging_dir() -> String {
    "temp_uploads".to_string()
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["pdf".to_string()]
}

/// OCR 相关配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// 光栅化缩放倍数（2.0 = 144 DPI）
    #[serde(default = "default_render_zoom")]
    pub render_zoom: f32,
    /// 空文本页是否按 1 行计数
    #[serde(default = "default_true")]
    pub count_empty_page_as_line: bool,
    /// 启动时预先拉起全部语言的引擎
    #[serde(default)]
    pub prewarm: bool,
    #[serde(default)]
    pub engine: OcrEngineConfig,
    #[serde(default)]
    pub languages: OcrLanguagesConfig,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            render_zoom: default_render_zoom(),
            count_empty_page_as_line: true,
            prewarm: false,
            engine: OcrEngineConfig::default(),
            languages: OcrLanguagesConfig::default(),
        }
    }
}

fn default_render_zoom() -> f32 {
    2.0
}

fn default_true() -> bool {
    true
}

/// 本地 PaddleOCR-json 引擎配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrEngineConfig {
    /// 引擎工作的目录（包含 PaddleOCR-json, lib/, models/）
    pub work_dir: Option<String>,
    /// 二进制路径（默认 work_dir/PaddleOCR-json）
    pub binary: Option<String>,
    /// 依赖库目录（默认 work_dir/lib）
    pub lib_path: Option<String>,
    /// 超时时间（秒），默认 10
    pub timeout_secs: Option<u64>,
}

/// 各语言的模型配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrLanguagesConfig {
    #[serde(default = "default_en_language")]
    pub en: OcrLanguageConfig,
    #[serde(default = "default_vi_language")]
    pub vi: OcrLanguageConfig,
}

impl Default for OcrLanguagesConfig {
    fn default() -> Self {
        Self {
            en: default_en_language(),
            vi: default_vi_language(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrLanguageConfig {
    /// 模型配置文件（相对于引擎工作目录）
    pub config_path: Option<String>,
}

fn default_en_language() -> OcrLanguageConfig {
    OcrLanguageConfig {
        config_path: Some("models/config_en.txt".to_string()),
    }
}

fn default_vi_language() -> OcrLanguageConfig {
    OcrLanguageConfig {
        config_path: Some("models/config_vi.txt".to_string()),
    }
}

impl OcrLanguagesConfig {
    pub fn get(&self, language: Language) -> &OcrLanguageConfig {
        match language {
            Language::En => &self.en,
            Language::Vi => &self.vi,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: LogFileConfig,
    /// 是否输出 JSON 结构化日志
    #[serde(default)]
    pub structured: Option<bool>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: LogFileConfig::default(),
            structured: Some(false),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// 日志文件配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogFileConfig {
    pub enabled: bool,
    pub directory: String,
    pub retention_days: Option<u32>,
}

impl Default for LogFileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: "logs".to_string(),
            retention_days: Some(7),
        }
    }
}

impl Config {
    /// 监听地址（host:port）
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn staging_dir(&self) -> PathBuf {
        PathBuf::from(&self.upload.staging_dir)
    }

    /// 指定语言的引擎启动参数
    pub fn engine_options(&self, language: Language) -> OcrEngineOptions {
        let engine = &self.ocr.engine;
        OcrEngineOptions {
            work_dir: engine.work_dir.as_ref().map(PathBuf::from),
            binary: engine.binary.as_ref().map(PathBuf::from),
            lib_path: engine.lib_path.as_ref().map(PathBuf::from),
            timeout_secs: engine.timeout_secs,
            config_path: self
                .ocr
                .languages
                .get(language)
                .config_path
                .as_ref()
                .map(PathBuf::from),
            ..Default::default()
        }
    }
}
