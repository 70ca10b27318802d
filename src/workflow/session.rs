//! 会话交互接口
//!
//! 会话流程不直接读写控制台，只依赖这组窄能力。
//! 控制台实现位于编排层，测试使用脚本替身。

use crate::models::{ExplanationSet, StagedImage};

/// 选择阶段的用户决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// 保留原始内容并结束会话（仅在存在原始内容时有效）
    KeepOriginal,
    /// 提交第 k 次成功尝试
    Commit(usize),
    /// 回到上下文采集阶段再试一次（空输入的默认值）
    Retry,
    /// 不提交任何内容，结束会话
    Cancel,
}

/// 会话交互能力
pub trait SessionIo {
    /// 采集本次生成的上下文
    ///
    /// `seed` 是上一次尝试的上下文（不是词条里存的那个），
    /// 迭代式微调是常态，从头再来不是
    fn prompt_context(&mut self, seed: Option<&str>) -> Option<String>;

    /// 展示一次成功的讲解尝试
    fn show_explanations(&mut self, attempt_number: usize, set: &ExplanationSet);

    /// 展示一张暂存的候选图片（编号 0 表示现有图片）
    fn show_image(&mut self, attempt_number: usize, staged: &StagedImage);

    /// 展示一次失败的尝试
    fn show_failure(&mut self, attempt_number: usize, reason: &str);

    /// 进入选择阶段
    ///
    /// `successful` 是当前可提交的尝试编号列表
    fn choose(&mut self, has_original: bool, successful: &[usize]) -> Selection;
}
