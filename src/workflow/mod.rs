//! 流程层（Workflow Layer）
//!
//! ## 职责
//!
//! 定义"一个词条"的完整操作流程，向下只依赖业务能力接口。
//!
//! ## 模块划分
//!
//! ### `content_flow` - 内容生成会话
//! - 驱动"采集上下文 → 生成 → 选择或重试"循环
//! - 讲解与配图共用同一套状态走向
//! - 只在提交时写仓库
//!
//! ### `entry_flow` - 词条操作流程
//! - 创建 / 审核 / 清除 AI 内容 / 修改核心字段 / 删除
//! - 协调图片文件与词条记录的先后顺序
//!
//! ### `session` - 会话交互接口
//! - 流程层与控制台之间的窄接口
//!
//! ## 层次关系
//!
//! ```text
//! orchestrator (菜单与资源)
//!     ↓
//! workflow (单个词条的完整流程)
//!     ↓
//! services (能力层：repository / image / generation)
//!     ↓
//! models (词条与生命周期状态机)
//! ```

pub mod content_flow;
pub mod entry_flow;
pub mod session;

pub use content_flow::{ContentFlow, SessionOutcome};
pub use entry_flow::{EntryDraft, EntryEdit, EntryFlow};
pub use session::{Selection, SessionIo};
