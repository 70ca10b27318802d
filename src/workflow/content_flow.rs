//! 内容生成会话 - 流程层
//!
//! 核心职责：驱动单个词条、单种内容的"生成 → 查看 → 选择或重试"循环
//!
//! 状态走向：
//! 采集上下文 → 生成 → 等待选择 → {重试 | 提交 | 取消}
//!
//! 约定：
//! - 会话开始前快照原始内容，全程可作为"第 0 项"保留
//! - 失败的尝试占据编号但不终止会话
//! - 只有提交才写仓库；取消与保留原始内容不产生任何持久化
//! - 配图会话无论结局如何都会清理该词条的暂存文件

use anyhow::{Context, Result};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::models::{AttemptList, Entry, ExplanationSet, StagedImage};
use crate::services::{EntryRepository, GenerationProvider, GenerationRequest, ImageStore};
use crate::workflow::session::{Selection, SessionIo};

/// 会话结局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// 已提交某次尝试的结果
    Committed,
    /// 保留原始内容
    KeptOriginal,
    /// 未提交任何内容
    Cancelled,
}

/// 内容生成会话
///
/// 职责：
/// - 编排一次完整的多尝试生成会话
/// - 只依赖生成能力 / 图片存储能力 / 会话交互能力三个接口
/// - 不关心菜单，也不关心词条从哪来
pub struct ContentFlow<'a, P: GenerationProvider> {
    provider: &'a P,
    images: &'a dyn ImageStore,
    io: &'a mut dyn SessionIo,
    cancel: &'a CancellationToken,
}

impl<'a, P: GenerationProvider> ContentFlow<'a, P> {
    pub fn new(
        provider: &'a P,
        images: &'a dyn ImageStore,
        io: &'a mut dyn SessionIo,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            provider,
            images,
            io,
            cancel,
        }
    }

    /// 运行讲解生成会话
    pub async fn run_explanation_session(
        &mut self,
        repo: &mut EntryRepository,
        entry: &Entry,
    ) -> Result<SessionOutcome> {
        info!("✏️ 开始讲解生成会话: {}", entry.reading);

        // 原始内容快照，全程可作为"第 0 项"保留
        let has_original = !entry.explanations.is_empty();
        let mut seed = entry.explanation_context.clone();
        let mut attempts: AttemptList<ExplanationSet> = AttemptList::new();

        loop {
            // ========== 阶段 1: 采集上下文（种子是上一次尝试的上下文） ==========
            let context = self.io.prompt_context(seed.as_deref());
            seed = context.clone();

            // ========== 阶段 2: 生成 ==========
            let number = attempts.next_number();
            let request = GenerationRequest {
                reading: &entry.reading,
                expression: entry.expression.as_deref(),
                general_context: entry.context.as_deref(),
                session_context: context.as_deref(),
            };

            match self.provider.produce_explanations(&request, self.cancel).await {
                Ok(set) => {
                    info!("✓ 第 {} 次讲解生成成功", number);
                    self.io.show_explanations(number, &set);
                    attempts.push_success(context, set);
                }
                Err(e) => {
                    warn!("⚠️ 第 {} 次讲解生成失败: {}", number, e);
                    self.io.show_failure(number, &e.to_string());
                    attempts.push_failure(context, e.to_string());
                }
            }

            // ========== 阶段 3: 等待选择 ==========
            match self.await_selection(has_original, &attempts.successful_numbers()) {
                Selection::Retry => continue,
                Selection::KeepOriginal => {
                    info!("保留原始讲解，会话结束");
                    return Ok(SessionOutcome::KeptOriginal);
                }
                Selection::Cancel => {
                    info!("讲解生成会话已取消");
                    return Ok(SessionOutcome::Cancelled);
                }
                Selection::Commit(number) => {
                    let set = attempts
                        .get_success(number)
                        .cloned()
                        .context("选中的尝试不存在")?;

                    let mut updated = entry.clone();
                    updated.commit_explanations(set, Utc::now());
                    repo.update(updated)?;

                    info!("✓ 已提交第 {} 次讲解生成结果", number);
                    return Ok(SessionOutcome::Committed);
                }
            }
        }
    }

    /// 运行配图生成会话
    ///
    /// 暂存清理在会话收尾时无条件执行，包括出错提前返回的情况
    pub async fn run_image_session(
        &mut self,
        repo: &mut EntryRepository,
        entry: &Entry,
    ) -> Result<SessionOutcome> {
        let result = self.image_session_inner(repo, entry).await;
        self.images.cleanup(Some(&entry.id));
        result
    }

    async fn image_session_inner(
        &mut self,
        repo: &mut EntryRepository,
        entry: &Entry,
    ) -> Result<SessionOutcome> {
        info!("🖼 开始配图生成会话: {}", entry.reading);

        // 现有图片复制进暂存区作为"第 0 次尝试"
        let original = self.images.stage_existing_for_edit(entry)?;
        let has_original = original.is_some();
        if let Some(staged) = &original {
            self.io.show_image(0, staged);
        }

        let mut seed = entry.image_context.clone();
        let mut attempts: AttemptList<StagedImage> = AttemptList::new();

        loop {
            // ========== 阶段 1: 采集上下文 ==========
            let context = self.io.prompt_context(seed.as_deref());
            seed = context.clone();

            // ========== 阶段 2: 生成并暂存 ==========
            let number = attempts.next_number();
            let request = GenerationRequest {
                reading: &entry.reading,
                expression: entry.expression.as_deref(),
                general_context: entry.context.as_deref(),
                session_context: context.as_deref(),
            };

            match self.provider.produce_image(&request, self.cancel).await {
                Ok(image) => {
                    let saved = self.images.save_candidate(
                        entry,
                        &image.bytes,
                        &image.extension,
                        number,
                        context.as_deref(),
                        Utc::now(),
                        image.prompt.as_deref(),
                    );
                    match saved {
                        Ok(staged) => {
                            info!("✓ 第 {} 次配图生成成功", number);
                            self.io.show_image(number, &staged);
                            attempts.push_success(context, staged);
                        }
                        Err(e) => {
                            warn!("⚠️ 第 {} 次候选图片暂存失败: {}", number, e);
                            self.io.show_failure(number, &e.to_string());
                            attempts.push_failure(context, e.to_string());
                        }
                    }
                }
                Err(e) => {
                    warn!("⚠️ 第 {} 次配图生成失败: {}", number, e);
                    self.io.show_failure(number, &e.to_string());
                    attempts.push_failure(context, e.to_string());
                }
            }

            // ========== 阶段 3: 等待选择 ==========
            match self.await_selection(has_original, &attempts.successful_numbers()) {
                Selection::Retry => continue,
                Selection::KeepOriginal => {
                    info!("保留原始配图，会话结束");
                    return Ok(SessionOutcome::KeptOriginal);
                }
                Selection::Cancel => {
                    info!("配图生成会话已取消");
                    return Ok(SessionOutcome::Cancelled);
                }
                Selection::Commit(number) => {
                    let staged = attempts
                        .get_success(number)
                        .cloned()
                        .context("选中的尝试不存在")?;

                    // 暂存文件转正后才改词条
                    let relative_path = self.images.finalize(entry, &staged)?;

                    let mut updated = entry.clone();
                    updated.commit_image(
                        relative_path,
                        staged.context.clone(),
                        staged.prompt.clone(),
                        Utc::now(),
                    );
                    repo.update(updated)?;

                    info!("✓ 已提交第 {} 次配图生成结果", number);
                    return Ok(SessionOutcome::Committed);
                }
            }
        }
    }

    /// 选择阶段，无效输入重新询问
    fn await_selection(&mut self, has_original: bool, successful: &[usize]) -> Selection {
        loop {
            let selection = self.io.choose(has_original, successful);
            match selection {
                Selection::KeepOriginal if !has_original => {
                    warn!("没有可保留的原始内容");
                    continue;
                }
                Selection::Commit(number) if !successful.contains(&number) => {
                    warn!("第 {} 次尝试不可提交", number);
                    continue;
                }
                other => return other,
            }
        }
    }
}
