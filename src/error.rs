use std::fmt;

/// 应用程序错误类型
#[derive(Debug)]
pub enum AppError {
    /// 词条仓库错误
    Store(StoreError),
    /// 图片资产错误
    Asset(AssetError),
    /// 内容生成错误
    Generation(GenerationError),
    /// 工作流错误
    Workflow(WorkflowError),
    /// 配置错误
    Config(ConfigError),
    /// 其他错误（用于包装第三方库错误）
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Store(e) => write!(f, "仓库错误: {}", e),
            AppError::Asset(e) => write!(f, "资产错误: {}", e),
            AppError::Generation(e) => write!(f, "生成错误: {}", e),
            AppError::Workflow(e) => write!(f, "工作流错误: {}", e),
            AppError::Config(e) => write!(f, "配置错误: {}", e),
            AppError::Other(msg) => write!(f, "错误: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Store(e) => Some(e),
            AppError::Asset(e) => Some(e),
            AppError::Generation(e) => Some(e),
            AppError::Workflow(e) => Some(e),
            AppError::Config(e) => Some(e),
            AppError::Other(_) => None,
        }
    }
}

/// 词条仓库错误
#[derive(Debug)]
pub enum StoreError {
    /// 数据文件内容损坏（缺失 / 空白 / null 不算损坏）
    Malformed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 新增词条时已携带标识符（调用方 bug）
    PreassignedId {
        id: String,
    },
    /// 按标识符未找到词条
    NotFound {
        id: String,
    },
    /// 数据文件读写失败
    Io {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 保存主体成功，但备份或清理阶段出现非致命错误
    SaveIncomplete {
        issues: Vec<String>,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Malformed { path, source } => {
                write!(f, "数据文件损坏 ({}): {}", path, source)
            }
            StoreError::PreassignedId { id } => {
                write!(f, "新增词条不允许携带标识符: {}", id)
            }
            StoreError::NotFound { id } => write!(f, "词条不存在: {}", id),
            StoreError::Io { path, source } => {
                write!(f, "数据文件读写失败 ({}): {}", path, source)
            }
            StoreError::SaveIncomplete { issues } => {
                write!(
                    f,
                    "保存完成但存在 {} 个非致命错误: {}",
                    issues.len(),
                    issues.join("; ")
                )
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Malformed { source, .. } | StoreError::Io { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 图片资产错误
#[derive(Debug)]
pub enum AssetError {
    /// 词条记录的最终图片在磁盘上不存在（数据完整性问题）
    FinalImageMissing {
        path: String,
    },
    /// 暂存文件已不存在
    StagedMissing {
        path: String,
    },
    /// 资产文件读写失败
    Io {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for AssetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetError::FinalImageMissing { path } => {
                write!(f, "词条引用的最终图片不存在: {}", path)
            }
            AssetError::StagedMissing { path } => write!(f, "暂存文件不存在: {}", path),
            AssetError::Io { path, source } => {
                write!(f, "资产文件读写失败 ({}): {}", path, source)
            }
        }
    }
}

impl std::error::Error for AssetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AssetError::Io { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 内容生成错误
#[derive(Debug)]
pub enum GenerationError {
    /// API 调用失败
    ApiCallFailed {
        model: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// API 返回错误响应（携带服务端返回的结构化内容）
    BadResponse {
        model: String,
        detail: String,
    },
    /// 返回结果为空
    EmptyResponse {
        model: String,
    },
    /// 返回内容无法解析
    MalformedPayload {
        model: String,
        detail: String,
    },
    /// 超过默认超时时间
    DeadlineExceeded {
        seconds: u64,
    },
    /// 外部取消信号触发
    Cancelled,
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationError::ApiCallFailed { model, source } => {
                write!(f, "生成 API 调用失败 (模型: {}): {}", model, source)
            }
            GenerationError::BadResponse { model, detail } => {
                write!(f, "生成 API 返回错误响应 (模型: {}): {}", model, detail)
            }
            GenerationError::EmptyResponse { model } => {
                write!(f, "生成 API 返回结果为空 (模型: {})", model)
            }
            GenerationError::MalformedPayload { model, detail } => {
                write!(f, "无法解析生成结果 (模型: {}): {}", model, detail)
            }
            GenerationError::DeadlineExceeded { seconds } => {
                write!(f, "生成调用超时 ({} 秒)", seconds)
            }
            GenerationError::Cancelled => write!(f, "生成调用已被取消"),
        }
    }
}

impl std::error::Error for GenerationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GenerationError::ApiCallFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 工作流错误
#[derive(Debug)]
pub enum WorkflowError {
    /// 词条不存在
    EntryNotFound {
        id: String,
    },
    /// 当前状态不允许审核（调用方 bug）
    NotAwaitingApproval {
        status: String,
    },
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowError::EntryNotFound { id } => write!(f, "词条不存在: {}", id),
            WorkflowError::NotAwaitingApproval { status } => {
                write!(f, "当前状态 {} 不允许审核，只有待审核状态可以通过", status)
            }
        }
    }
}

impl std::error::Error for WorkflowError {}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// 配置文件解析失败
    FileParseFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileParseFailed { path, source } => {
                write!(f, "配置文件解析失败 ({}): {}", path, source)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ========== 从常见错误类型转换 ==========
// 注意：不需要手动实现 From<AppError> for anyhow::Error，
// 因为 anyhow 已经为所有实现了 std::error::Error 的类型提供了自动实现

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Store(StoreError::Malformed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::Config(ConfigError::FileParseFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建数据文件损坏错误
    pub fn malformed_store(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Store(StoreError::Malformed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建标识符预置错误
    pub fn preassigned_id(id: impl Into<String>) -> Self {
        AppError::Store(StoreError::PreassignedId { id: id.into() })
    }

    /// 创建词条不存在错误（仓库层）
    pub fn store_not_found(id: impl Into<String>) -> Self {
        AppError::Store(StoreError::NotFound { id: id.into() })
    }

    /// 创建数据文件读写错误
    pub fn store_io(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Store(StoreError::Io {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建最终图片缺失错误
    pub fn final_image_missing(path: impl Into<String>) -> Self {
        AppError::Asset(AssetError::FinalImageMissing { path: path.into() })
    }

    /// 创建暂存文件缺失错误
    pub fn staged_missing(path: impl Into<String>) -> Self {
        AppError::Asset(AssetError::StagedMissing { path: path.into() })
    }

    /// 创建资产读写错误
    pub fn asset_io(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Asset(AssetError::Io {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建生成 API 调用错误
    pub fn generation_failed(
        model: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Generation(GenerationError::ApiCallFailed {
            model: model.into(),
            source: Box::new(source),
        })
    }

    /// 创建词条不存在错误（工作流层）
    pub fn entry_not_found(id: impl Into<String>) -> Self {
        AppError::Workflow(WorkflowError::EntryNotFound { id: id.into() })
    }

    /// 创建状态不允许审核错误
    pub fn not_awaiting_approval(status: impl Into<String>) -> Self {
        AppError::Workflow(WorkflowError::NotAwaitingApproval {
            status: status.into(),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
