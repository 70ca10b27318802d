use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::error::{AppError, AppResult, ConfigError};

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 词条数据文件路径
    pub data_file: String,
    /// 备份目录
    pub backup_dir: String,
    /// 是否在覆盖数据文件前创建备份
    pub backups_enabled: bool,
    /// 备份保留数量（0 表示不清理）
    pub backup_limit: usize,
    /// 最终图片目录
    pub image_final_dir: String,
    /// 图片暂存目录
    pub image_staging_dir: String,
    /// 暂存图片命名模板（占位符 {id} / {attempt} / {ext}）
    pub staged_name_pattern: String,
    /// 最终图片命名模板
    pub final_name_pattern: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub image_model_name: String,
    /// 单次生成调用的默认超时（秒）
    pub generation_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_file: "data/entries.json".to_string(),
            backup_dir: "data/backups".to_string(),
            backups_enabled: true,
            backup_limit: 10,
            image_final_dir: "data/images".to_string(),
            image_staging_dir: "data/images/staging".to_string(),
            staged_name_pattern: "{id}_attempt{attempt}.{ext}".to_string(),
            final_name_pattern: "{id}.{ext}".to_string(),
            verbose_logging: false,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            image_model_name: "dall-e-3".to_string(),
            generation_timeout_secs: 120,
        }
    }
}

impl Config {
    /// 加载配置：可选的 config.toml + 环境变量覆盖
    pub fn load() -> Self {
        let base = match Self::from_file("config.toml") {
            Ok(Some(config)) => config,
            Ok(None) => Self::default(),
            Err(e) => {
                warn!("⚠️ 配置文件加载失败，使用默认配置: {}", e);
                Self::default()
            }
        };
        base.apply_env()
    }

    /// 从 TOML 文件加载配置，文件不存在时返回 None
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Other(format!("读取配置文件失败 ({}): {}", path.display(), e)))?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            AppError::Config(ConfigError::FileParseFailed {
                path: path.display().to_string(),
                source: Box::new(e),
            })
        })?;

        Ok(Some(config))
    }

    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    /// 环境变量覆盖（未设置或解析失败时保留原值）
    fn apply_env(self) -> Self {
        Self {
            data_file: std::env::var("VOCAB_DATA_FILE").unwrap_or(self.data_file),
            backup_dir: std::env::var("VOCAB_BACKUP_DIR").unwrap_or(self.backup_dir),
            backups_enabled: std::env::var("VOCAB_BACKUPS_ENABLED").ok().and_then(|v| v.parse().ok()).unwrap_or(self.backups_enabled),
            backup_limit: std::env::var("VOCAB_BACKUP_LIMIT").ok().and_then(|v| v.parse().ok()).unwrap_or(self.backup_limit),
            image_final_dir: std::env::var("VOCAB_IMAGE_FINAL_DIR").unwrap_or(self.image_final_dir),
            image_staging_dir: std::env::var("VOCAB_IMAGE_STAGING_DIR").unwrap_or(self.image_staging_dir),
            staged_name_pattern: std::env::var("VOCAB_STAGED_NAME_PATTERN").unwrap_or(self.staged_name_pattern),
            final_name_pattern: std::env::var("VOCAB_FINAL_NAME_PATTERN").unwrap_or(self.final_name_pattern),
            verbose_logging: std::env::var("VOCAB_VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(self.verbose_logging),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(self.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(self.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(self.llm_model_name),
            image_model_name: std::env::var("IMAGE_MODEL_NAME").unwrap_or(self.image_model_name),
            generation_timeout_secs: std::env::var("GENERATION_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.generation_timeout_secs),
        }
    }
}
