//! # Vocab Workbench
//!
//! 一个管理个人日语词汇收藏的控制台应用：每条词条经过
//! AI 辅助的内容生成流程（分级讲解 + 配图），审核通过后投入使用。
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 数据层（Models）
//! - `models/` - 词条模型与生命周期状态机
//! - `Entry` - 词条字段与状态迁移（待生成 → 待审核 → 已通过）
//! - `AttemptList` - 会话内的生成尝试与编号分配
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个词条
//! - `EntryRepository` - JSON 单文件持久化（原子替换 + 轮转备份）
//! - `ImageManager` - 最终/暂存两级图片目录管理
//! - `LlmGenerationService` - 讲解与配图生成能力
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个词条"的完整操作流程
//! - `ContentFlow` - 多尝试生成会话（生成 → 查看 → 选择或重试）
//! - `EntryFlow` - 创建 / 审核 / 清除 / 修改 / 删除
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/menu` - 控制台菜单，装配资源并驱动循环
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{Entry, EntryStatus, ExplanationLevel, ExplanationSet, StagedImage};
pub use orchestrator::App;
pub use services::{
    EntryRepository, GeneratedImage, GenerationProvider, GenerationRequest, ImageManager,
    ImageStore, LlmGenerationService,
};
pub use workflow::{
    ContentFlow, EntryDraft, EntryEdit, EntryFlow, Selection, SessionIo, SessionOutcome,
};
