//! 配置加载和管理模块
//! 处理配置文件的读取、写入和环境变量覆盖

use super::types::*;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从YAML文件读取配置
    pub fn read_yaml(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
        let config = serde_yaml::from_str(&config_str)
            .with_context(|| format!("配置文件格式错误: {}", path.display()))?;
        Ok(config)
    }

    /// 从环境变量读取配置覆盖
    pub fn apply_env_overrides(config: Config) -> Config {
        Self::apply_overrides(config, |key| std::env::var(key).ok())
    }

    /// 按给定的变量来源应用覆盖（便于测试时注入）
    pub fn apply_overrides<F>(mut config: Config, lookup: F) -> Config
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("OCR_HOST").filter(|h| !h.trim().is_empty()) {
            config.server.host = host.trim().to_string();
            tracing::info!("[ok] 环境变量覆盖服务器地址: {}", config.server.host);
        }

        if let Some(port_str) = lookup("OCR_PORT") {
            match port_str.trim().parse::<u16>() {
                Ok(port) => {
                    config.server.port = port;
                    tracing::info!("[ok] 环境变量覆盖服务器端口: {}", port);
                }
                Err(_) => tracing::warn!("[warn] OCR_PORT 无效，已忽略: {}", port_str),
            }
        }

        if let Some(dir) = lookup("OCR_STAGING_DIR").filter(|d| !d.trim().is_empty()) {
            config.upload.staging_dir = dir.trim().to_string();
            tracing::info!("[ok] 环境变量覆盖暂存目录: {}", config.upload.staging_dir);
        }

        if let Some(mb) = lookup("OCR_MAX_UPLOAD_MB") {
            match mb.trim().parse::<u64>() {
                Ok(value) => {
                    config.upload.max_file_mb = value;
                    tracing::info!("[ok] 环境变量覆盖上传大小上限: {}MB", value);
                }
                Err(_) => tracing::warn!("[warn] OCR_MAX_UPLOAD_MB 无效，已忽略: {}", mb),
            }
        }

        if let Some(dir) = lookup("OCR_ENGINE_DIR").filter(|d| !d.trim().is_empty()) {
            config.ocr.engine.work_dir = Some(dir.trim().to_string());
            tracing::info!("[ok] 环境变量覆盖OCR引擎目录: {}", dir.trim());
        }

        if let Some(bin) = lookup("OCR_ENGINE_BINARY").filter(|b| !b.trim().is_empty()) {
            config.ocr.engine.binary = Some(bin.trim().to_string());
            tracing::info!("[ok] 环境变量覆盖OCR引擎路径: {}", bin.trim());
        }

        if let Some(level) = lookup("OCR_LOG_LEVEL").filter(|l| !l.trim().is_empty()) {
            config.logging.level = level.trim().to_ascii_lowercase();
            tracing::info!("[ok] 环境变量覆盖日志级别: {}", config.logging.level);
        }

        config
    }

    /// 配置文件 + 环境变量
    pub fn load_with_env_overrides(path: impl AsRef<Path>) -> Result<Config> {
        let base_config = Self::read_yaml(path)?;
        Ok(Self::apply_env_overrides(base_config))
    }
}

/// 配置写入器
pub struct ConfigWriter;

impl ConfigWriter {
    /// 写入配置到指定路径，确保目录存在
    pub fn write_yaml_with_dir(config: &Config, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let yaml_content = serde_yaml::to_string(config)?;
        fs::write(path, yaml_content)?;
        Ok(())
    }

    /// 生成配置模板
    pub fn generate_template() -> Config {
        Config::default()
    }
}
