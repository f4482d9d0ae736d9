use thiserror::Error;

/// 应用程序错误类型
///
/// 只有批次级别的前置条件失败才会以 `AppError` 的形式返回给调用者，
/// 单页内的失败全部降级为复核原因（见 `models::result::ReviewReason`）。
#[derive(Debug, Error)]
pub enum AppError {
    /// 批次运行错误
    #[error("运行错误: {0}")]
    Run(#[from] RunError),
    /// 图像处理错误
    #[error("图像错误: {0}")]
    Vision(#[from] VisionError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 批次运行错误
#[derive(Debug, Error)]
pub enum RunError {
    /// 已有批次在运行，拒绝新的批次
    #[error("已有批次正在运行 (run #{active_run})")]
    AlreadyRunning { active_run: u64 },
    /// 没有配置标记检测器
    #[error("标记检测器不可用，批次无法开始")]
    DetectionUnavailable,
    /// 协作组件初始化超时
    #[error("{collaborator} 初始化超时 ({secs} 秒)")]
    InitializationTimeout { collaborator: String, secs: u64 },
    /// 协作组件初始化失败
    #[error("{collaborator} 初始化失败: {source}")]
    InitializationFailed {
        collaborator: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 批次任务异常退出
    #[error("批次任务执行失败: {message}")]
    TaskFailed { message: String },
}

/// 图像处理错误
#[derive(Debug, Error)]
pub enum VisionError {
    /// 图像解码失败
    #[error("图像解码失败 (页面 {page_number}): {source}")]
    DecodeFailed {
        page_number: u32,
        #[source]
        source: image::ImageError,
    },
    /// 透视变换无法求解
    #[error("无法计算透视变换")]
    DegenerateProjection,
    /// 裁剪区域超出图像范围
    #[error("裁剪区域为空: {region}")]
    EmptyRegion { region: String },
    /// 图像编码失败
    #[error("图像编码失败: {source}")]
    EncodeFailed {
        #[source]
        source: image::ImageError,
    },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 文件不存在
    #[error("文件不存在: {path}")]
    NotFound { path: String },
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// 目录不存在
    #[error("目录不存在: {path}")]
    DirectoryNotFound { path: String },
    /// 名称不能作为单个文件名使用
    #[error("非法的文件名: {name:?}")]
    InvalidName { name: String },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 评分标准不合法
    #[error("评分标准不合法: {reason}")]
    InvalidGradingScale { reason: String },
    /// 未知的后端名称
    #[error("未知的{kind}后端: {name}")]
    UnknownBackend { kind: String, name: String },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建协作组件初始化失败错误
    pub fn init_failed(
        collaborator: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        AppError::Run(RunError::InitializationFailed {
            collaborator: collaborator.into(),
            source: source.into(),
        })
    }

    /// 是否为批次前置条件失败（调用方无法通过重试单页来恢复）
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            AppError::Run(RunError::AlreadyRunning { .. }) | AppError::Run(RunError::DetectionUnavailable)
        )
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Other(format!("{:#}", err))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_classification() {
        assert!(AppError::from(RunError::DetectionUnavailable).is_precondition());
        assert!(AppError::from(RunError::AlreadyRunning { active_run: 1 }).is_precondition());
        assert!(!AppError::from(RunError::TaskFailed {
            message: "panic".to_string()
        })
        .is_precondition());
    }

    #[test]
    fn test_display_mentions_collaborator() {
        let err = AppError::from(RunError::InitializationTimeout {
            collaborator: "MarkDetector".to_string(),
            secs: 10,
        });
        let text = err.to_string();
        assert!(text.contains("MarkDetector"));
        assert!(text.contains("10"));
    }
}
