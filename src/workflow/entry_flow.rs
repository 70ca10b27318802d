//! 词条操作流程 - 流程层
//!
//! 生成会话之外的词条操作：创建、审核、清除 AI 内容、
//! 修改核心字段、删除。统一遵循"先动文件，后动词条，一次保存"。

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::Entry;
use crate::services::{EntryRepository, ImageStore};

/// 新词条的输入
#[derive(Debug, Default, Clone)]
pub struct EntryDraft {
    pub reading: String,
    pub expression: Option<String>,
    pub context: Option<String>,
    pub explanation_context: Option<String>,
    pub image_context: Option<String>,
    pub note: Option<String>,
}

/// 核心字段修改
///
/// None 表示不修改该字段；Some 的空字符串表示清空
#[derive(Debug, Default, Clone)]
pub struct EntryEdit {
    pub reading: Option<String>,
    pub expression: Option<String>,
    pub context: Option<String>,
    pub note: Option<String>,
}

impl EntryEdit {
    pub fn is_empty(&self) -> bool {
        self.reading.is_none()
            && self.expression.is_none()
            && self.context.is_none()
            && self.note.is_none()
    }
}

/// 词条操作流程
pub struct EntryFlow<'a> {
    repo: &'a mut EntryRepository,
    images: &'a dyn ImageStore,
}

impl<'a> EntryFlow<'a> {
    pub fn new(repo: &'a mut EntryRepository, images: &'a dyn ImageStore) -> Self {
        Self { repo, images }
    }

    /// 创建词条
    pub fn create(&mut self, draft: EntryDraft) -> Result<Entry> {
        let reading = draft.reading.trim().to_string();
        if reading.is_empty() {
            anyhow::bail!("读音不能为空");
        }

        // 读音查重：重复只提醒，不阻止
        if let Some(existing) = self.repo.find_by_reading(&reading) {
            warn!("⚠️ 已存在相同读音的词条: {} ({})", reading, existing.id);
        }

        let mut entry = Entry::new(reading);
        entry.expression = draft.expression;
        entry.context = draft.context;
        entry.explanation_context = draft.explanation_context;
        entry.image_context = draft.image_context;
        entry.note = draft.note;

        let stored = self.repo.add(entry)?;
        info!("✓ 已创建词条: {} ({})", stored.reading, stored.id);
        Ok(stored)
    }

    /// 审核通过
    ///
    /// 只有待审核状态允许通过，其他状态直接报错
    pub fn approve(&mut self, id: &str) -> Result<Entry> {
        let mut entry = self.load(id)?;
        entry.approve(Utc::now())?;
        self.repo.update(entry.clone())?;

        info!("✓ 词条已审核通过: {}", entry.reading);
        Ok(entry)
    }

    /// 清除词条的全部 AI 生成内容
    ///
    /// 先删最终图片文件，删除失败时词条保持原样：
    /// 宁可留着文件也不要让记录指向不存在的文件
    pub fn clear_generated(&mut self, id: &str) -> Result<Entry> {
        let mut entry = self.load(id)?;

        self.images.remove_final(&entry)?;
        entry.clear_generated();
        self.repo.update(entry.clone())?;

        info!("✓ 已清除 AI 内容: {}", entry.reading);
        Ok(entry)
    }

    /// 修改核心字段（读音 / 表记 / 通用上下文 / 备注）
    ///
    /// 生成内容是针对这些字段的含义产生的，字段一变就自动清除全部
    /// AI 内容。文本修改与清除合并为一次保存，不会出现改了字段却
    /// 留着旧内容的中间状态
    pub fn edit_core_fields(&mut self, id: &str, edit: EntryEdit) -> Result<Entry> {
        let mut entry = self.load(id)?;

        if edit.is_empty() {
            return Ok(entry);
        }

        let had_content = entry.has_generated_content();
        if had_content {
            // 图片文件先删，失败则整个修改不进行
            self.images.remove_final(&entry)?;
        }

        if let Some(reading) = edit.reading {
            let reading = reading.trim().to_string();
            if reading.is_empty() {
                anyhow::bail!("读音不能为空");
            }
            entry.reading = reading;
        }
        if let Some(expression) = edit.expression {
            entry.expression = non_empty(expression);
        }
        if let Some(context) = edit.context {
            entry.context = non_empty(context);
        }
        if let Some(note) = edit.note {
            entry.note = non_empty(note);
        }

        if had_content {
            entry.clear_generated();
            info!("核心字段已修改，AI 内容同步清除: {}", entry.reading);
        }

        self.repo.update(entry.clone())?;
        Ok(entry)
    }

    /// 删除词条（连同最终图片文件）
    pub fn delete(&mut self, id: &str) -> Result<()> {
        let entry = self.load(id)?;

        self.images.remove_final(&entry)?;
        self.repo.delete(id)?;

        info!("✓ 已删除词条: {}", entry.reading);
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Entry> {
        self.repo
            .get_by_id(id)
            .ok_or_else(|| AppError::entry_not_found(id).into())
    }
}

/// 空白输入视为清空该字段
fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
