//! 暂存图片描述

use chrono::{DateTime, Utc};

/// 暂存目录中的一张候选图片
///
/// 由"把现有最终图片复制进暂存区"或"保存新生成的候选"产生，
/// 会话结束时由清理步骤统一删除，不跨会话存在
#[derive(Debug, Clone)]
pub struct StagedImage {
    /// 相对暂存目录的路径
    pub relative_path: String,
    /// 产生这张图片时使用的上下文
    pub context: Option<String>,
    pub generated_at: DateTime<Utc>,
    /// 实际使用的提示词
    pub prompt: Option<String>,
}
