//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责资源装配与菜单调度，是整个系统的"指挥中心"。
//!
//! ### `menu` - 控制台菜单
//! - 管理应用生命周期（初始化、运行、收尾清理）
//! - 装配仓库 / 图片管理器 / 生成服务（显式构造，无全局状态）
//! - 提供会话交互接口的控制台实现
//! - 为生成会话装配取消令牌（Ctrl+C）
//!
//! ## 设计原则
//!
//! 1. **单一职责**：菜单只做调度与展示
//! 2. **资源隔离**：只有编排层持有具体的服务实例
//! 3. **向下依赖**：编排层 → workflow → services → models

pub mod menu;

pub use menu::App;
