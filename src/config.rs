use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

use crate::error::{AppResult, ConfigError, FileError};
use crate::models::layout::SheetLayout;

/// 标记检测后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorBackend {
    /// 内置的像素密度检测
    Density,
    /// 不提供检测器，批次会在开始前失败
    Disabled,
}

impl FromStr for DetectorBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "density" => Ok(Self::Density),
            "disabled" | "none" => Ok(Self::Disabled),
            other => Err(ConfigError::UnknownBackend {
                kind: "检测器".to_string(),
                name: other.to_string(),
            }),
        }
    }
}

/// 学号识别后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdBackend {
    Disabled,
}

impl FromStr for IdBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" | "none" => Ok(Self::Disabled),
            other => Err(ConfigError::UnknownBackend {
                kind: "学号识别".to_string(),
                name: other.to_string(),
            }),
        }
    }
}

/// 程序配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 每个窗口同时处理的页数
    pub max_concurrent_pages: usize,
    /// 行/列匹配的像素容差
    pub row_tolerance_px: f32,
    /// 低于该置信度的标记需要复核
    pub low_confidence_threshold: f32,
    /// 协作组件初始化超时（秒）
    pub init_timeout_secs: u64,
    /// 是否在评分前按学号查找学生
    pub identify: bool,
    pub detector_backend: DetectorBackend,
    pub id_backend: IdBackend,
    /// 扫描页所在目录
    pub input_folder: String,
    /// 试卷 TOML 与学生名册所在目录
    pub exam_folder: String,
    /// 结果输出目录
    pub output_folder: String,
    pub exam_id: String,
    /// 复核清单文件
    pub review_file: String,
    /// 输出日志文件
    pub output_log_file: String,
    /// 缩略图宽度（像素），0 表示不生成
    pub thumbnail_width: u32,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 答题卡版式（只能通过 TOML 配置）
    pub layout: SheetLayout,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_pages: 4,
            row_tolerance_px: 15.0,
            low_confidence_threshold: 0.7,
            init_timeout_secs: 10,
            identify: true,
            detector_backend: DetectorBackend::Density,
            id_backend: IdBackend::Disabled,
            input_folder: "scans".to_string(),
            exam_folder: "exams".to_string(),
            output_folder: "results".to_string(),
            exam_id: "exam".to_string(),
            review_file: "review.txt".to_string(),
            output_log_file: "output.txt".to_string(),
            thumbnail_width: 240,
            verbose_logging: false,
            layout: SheetLayout::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrent_pages: env_parse("MAX_CONCURRENT_PAGES", default.max_concurrent_pages),
            row_tolerance_px: env_parse("ROW_TOLERANCE_PX", default.row_tolerance_px),
            low_confidence_threshold: env_parse(
                "LOW_CONFIDENCE_THRESHOLD",
                default.low_confidence_threshold,
            ),
            init_timeout_secs: env_parse("INIT_TIMEOUT_SECS", default.init_timeout_secs),
            identify: env_parse("IDENTIFY", default.identify),
            detector_backend: env_parse("DETECTOR_BACKEND", default.detector_backend),
            id_backend: env_parse("ID_BACKEND", default.id_backend),
            input_folder: std::env::var("INPUT_FOLDER").unwrap_or(default.input_folder),
            exam_folder: std::env::var("EXAM_FOLDER").unwrap_or(default.exam_folder),
            output_folder: std::env::var("OUTPUT_FOLDER").unwrap_or(default.output_folder),
            exam_id: std::env::var("EXAM_ID").unwrap_or(default.exam_id),
            review_file: std::env::var("REVIEW_FILE").unwrap_or(default.review_file),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            thumbnail_width: env_parse("THUMBNAIL_WIDTH", default.thumbnail_width),
            verbose_logging: env_parse("VERBOSE_LOGGING", default.verbose_logging),
            layout: default.layout,
        }
    }

    /// 从 TOML 文件加载，缺省的键使用默认值
    pub fn from_toml_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();
        if !path.exists() {
            return Err(FileError::NotFound { path: display }.into());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|source| FileError::ReadFailed {
                path: display.clone(),
                source,
            })?;
        let config: Config = toml::from_str(&content).map_err(|source| {
            FileError::TomlParseFailed {
                path: display,
                source,
            }
        })?;
        Ok(config)
    }

    /// 学生名册路径
    pub fn roster_file(&self) -> PathBuf {
        Path::new(&self.exam_folder).join("roster.toml")
    }
}

/// 读取并解析环境变量，缺失时用默认值，无法解析时告警并用默认值
fn env_parse<T>(var_name: &str, default: T) -> T
where
    T: FromStr,
{
    let Ok(value) = std::env::var(var_name) else {
        return default;
    };
    match value.parse() {
        Ok(parsed) => parsed,
        Err(_) => {
            let err = ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: std::any::type_name::<T>().to_string(),
            };
            warn!("{}，使用默认值", err);
            default
        }
    }
}
