/// 日志工具模块
///
/// 提供日志格式化和输出的辅助函数
use tracing::info;

use crate::config::Config;

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 词汇工作台启动");
    info!("📄 数据文件: {}", config.data_file);
    info!(
        "🗂 备份: {} (保留 {} 份)",
        if config.backups_enabled { "启用" } else { "禁用" },
        config.backup_limit
    );
    info!("🖼 图片目录: {}", config.image_final_dir);
    info!("{}", "=".repeat(60));
}

/// 记录程序结束信息
pub fn log_shutdown(entry_count: usize) {
    info!("{}", "=".repeat(60));
    info!("👋 程序结束，当前共 {} 条词条", entry_count);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
