//! 词条模型 - 数据层
//!
//! 词条的字段定义与生命周期状态机。状态迁移只通过本模块的方法发生，
//! 调用方（工作流层）负责在迁移前后协调文件与持久化。

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// 讲解难度等级
///
/// 排序固定为 easy < moderate < advanced，作为 BTreeMap 的键时
/// 序列化顺序因此稳定，保证数据文件可直接 diff
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationLevel {
    Easy,
    Moderate,
    Advanced,
}

impl ExplanationLevel {
    pub const ALL: [ExplanationLevel; 3] = [
        ExplanationLevel::Easy,
        ExplanationLevel::Moderate,
        ExplanationLevel::Advanced,
    ];

    /// 显示用标签
    pub fn label(&self) -> &'static str {
        match self {
            ExplanationLevel::Easy => "初级",
            ExplanationLevel::Moderate => "中级",
            ExplanationLevel::Advanced => "高级",
        }
    }
}

/// 一套完整的三级讲解
///
/// 词条上的讲解映射要么为空、要么三级齐全，提交时只接受完整的一套
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplanationSet {
    pub easy: String,
    pub moderate: String,
    pub advanced: String,
}

impl ExplanationSet {
    pub fn into_map(self) -> BTreeMap<ExplanationLevel, String> {
        let mut map = BTreeMap::new();
        map.insert(ExplanationLevel::Easy, self.easy);
        map.insert(ExplanationLevel::Moderate, self.moderate);
        map.insert(ExplanationLevel::Advanced, self.advanced);
        map
    }
}

/// 词条状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// 尚无任何生成内容
    PendingGeneration,
    /// 已有生成内容，等待审核
    PendingApproval,
    /// 审核通过
    Approved,
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryStatus::PendingGeneration => write!(f, "待生成"),
            EntryStatus::PendingApproval => write!(f, "待审核"),
            EntryStatus::Approved => write!(f, "已通过"),
        }
    }
}

/// 词条
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    /// 仓库分配的全局唯一标识符，空字符串表示尚未入库
    #[serde(default)]
    pub id: String,
    /// 读音（查重键与默认排序显示键）
    pub reading: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub expression: Option<String>,
    /// 通用上下文
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub context: Option<String>,
    /// 讲解生成上下文
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub explanation_context: Option<String>,
    /// 配图生成上下文
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub image_context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub note: Option<String>,
    /// 创建时间（UTC，入库后不再变化）
    pub created_at: DateTime<Utc>,
    /// 分级讲解，要么为空要么三级齐全
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub explanations: BTreeMap<ExplanationLevel, String>,
    /// 最终图片的相对路径（相对最终图片目录）
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub image_path: Option<String>,
    /// 生成图片时实际使用的提示词（即使有图片也可能缺失）
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub image_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub explanation_generated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub image_generated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub approved_at: Option<DateTime<Utc>>,
    pub status: EntryStatus,
}

impl Entry {
    /// 创建新词条（标识符留空，由仓库在入库时分配）
    pub fn new(reading: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            reading: reading.into(),
            expression: None,
            context: None,
            explanation_context: None,
            image_context: None,
            note: None,
            created_at: Utc::now(),
            explanations: BTreeMap::new(),
            image_path: None,
            image_prompt: None,
            explanation_generated_at: None,
            image_generated_at: None,
            approved_at: None,
            status: EntryStatus::PendingGeneration,
        }
    }

    /// 是否已有任何生成内容
    pub fn has_generated_content(&self) -> bool {
        !self.explanations.is_empty() || self.image_path.is_some()
    }

    /// 提交一套完整讲解
    ///
    /// 覆盖讲解映射、更新生成时间，并重新进入待审核状态
    pub fn commit_explanations(&mut self, set: ExplanationSet, now: DateTime<Utc>) {
        self.explanations = set.into_map();
        self.explanation_generated_at = Some(now);
        self.reopen_approval();
    }

    /// 提交配图结果
    ///
    /// 写入最终图片的相对路径、本次会话的上下文与实际提示词，
    /// 更新生成时间，并重新进入待审核状态
    pub fn commit_image(
        &mut self,
        relative_path: impl Into<String>,
        context: Option<String>,
        prompt: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.image_path = Some(relative_path.into());
        self.image_context = context;
        self.image_prompt = prompt;
        self.image_generated_at = Some(now);
        self.reopen_approval();
    }

    /// 审核通过
    ///
    /// 只允许从待审核状态迁移，其他状态视为调用方 bug，立即报错
    pub fn approve(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if self.status != EntryStatus::PendingApproval {
            return Err(AppError::not_awaiting_approval(self.status.to_string()));
        }
        self.status = EntryStatus::Approved;
        self.approved_at = Some(now);
        Ok(())
    }

    /// 清除全部 AI 生成内容，回到初始状态
    ///
    /// 只修改内存中的词条；最终图片文件的删除由工作流层先行完成，
    /// 删除失败时不得调用本方法
    pub fn clear_generated(&mut self) {
        self.explanations.clear();
        self.image_path = None;
        self.image_prompt = None;
        self.explanation_generated_at = None;
        self.image_generated_at = None;
        self.approved_at = None;
        self.status = EntryStatus::PendingGeneration;
    }

    /// 任何一次内容提交都会重新打开审核（审核结果不跨内容变更保留）
    fn reopen_approval(&mut self) {
        self.status = EntryStatus::PendingApproval;
        self.approved_at = None;
    }
}
