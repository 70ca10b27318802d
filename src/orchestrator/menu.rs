//! 控制台菜单 - 编排层
//!
//! 持有仓库、图片管理器与生成服务，驱动主菜单循环。
//! 菜单只做调度与展示，不做业务判断。

use std::io::{self, Write};

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::models::{Entry, EntryStatus, ExplanationLevel, ExplanationSet, StagedImage};
use crate::services::{EntryRepository, ImageManager, ImageStore, LlmGenerationService};
use crate::utils::logging::{log_shutdown, log_startup, truncate_text};
use crate::workflow::{
    ContentFlow, EntryDraft, EntryEdit, EntryFlow, Selection, SessionIo, SessionOutcome,
};

/// 应用主结构
pub struct App {
    config: Config,
    repo: EntryRepository,
    images: ImageManager,
    provider: LlmGenerationService,
}

impl App {
    /// 初始化应用：加载仓库并装配各个服务
    pub fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        let repo = EntryRepository::load(&config)?;
        info!("✓ 已加载 {} 条词条", repo.len());

        let images = ImageManager::new(&config);
        let provider = LlmGenerationService::new(&config);

        Ok(Self {
            config,
            repo,
            images,
            provider,
        })
    }

    /// 运行主菜单循环
    pub async fn run(&mut self) -> Result<()> {
        loop {
            print_menu();
            let choice = read_line("请选择: ");
            let result = match choice.as_str() {
                "1" => self.list_entries(),
                "2" => self.create_entry(),
                "3" => self.edit_entry(),
                "4" => self.explanation_session().await,
                "5" => self.image_session().await,
                "6" => self.approve_entry(),
                "7" => self.clear_entry(),
                "8" => self.delete_entry(),
                "0" => break,
                _ => {
                    println!("无效选择");
                    Ok(())
                }
            };

            if let Err(e) = result {
                error!("操作失败: {:#}", e);
            }
        }

        // 程序退出时清空整个暂存目录
        self.images.cleanup(None);
        log_shutdown(self.repo.len());
        Ok(())
    }

    // ========== 菜单动作 ==========

    fn list_entries(&self) -> Result<()> {
        let status = match read_line("状态过滤 [回车=全部 / g=待生成 / p=待审核 / a=已通过]: ").as_str() {
            "g" => Some(EntryStatus::PendingGeneration),
            "p" => Some(EntryStatus::PendingApproval),
            "a" => Some(EntryStatus::Approved),
            _ => None,
        };

        let entries = self.repo.get_all(status);
        if entries.is_empty() {
            println!("（没有词条）");
            return Ok(());
        }

        for entry in &entries {
            println!(
                "[{}] {} {}  讲解:{} 配图:{}",
                entry.status,
                entry.reading,
                entry.expression.as_deref().unwrap_or(""),
                if entry.explanations.is_empty() { "无" } else { "有" },
                if entry.image_path.is_some() { "有" } else { "无" },
            );
            if self.config.verbose_logging {
                for level in ExplanationLevel::ALL {
                    if let Some(text) = entry.explanations.get(&level) {
                        println!("    {}: {}", level.label(), truncate_text(text, 40));
                    }
                }
            }
        }
        println!("共 {} 条", entries.len());
        Ok(())
    }

    fn create_entry(&mut self) -> Result<()> {
        let draft = EntryDraft {
            reading: read_line("读音(必填): "),
            expression: read_optional("表记: "),
            context: read_optional("通用上下文: "),
            explanation_context: read_optional("讲解上下文: "),
            image_context: read_optional("配图上下文: "),
            note: read_optional("备注: "),
        };

        let mut flow = EntryFlow::new(&mut self.repo, &self.images);
        let entry = flow.create(draft)?;
        println!("已创建: {} ({})", entry.reading, entry.id);
        Ok(())
    }

    fn edit_entry(&mut self) -> Result<()> {
        let Some(entry) = self.pick_entry("选择要修改的词条")? else {
            return Ok(());
        };

        if entry.has_generated_content() {
            println!("⚠️ 修改核心字段会清除该词条已生成的讲解与配图");
        }

        // 回车保留原值，输入 "-" 清空
        let edit = EntryEdit {
            reading: read_edit("读音", Some(entry.reading.as_str())),
            expression: read_edit("表记", entry.expression.as_deref()),
            context: read_edit("通用上下文", entry.context.as_deref()),
            note: read_edit("备注", entry.note.as_deref()),
        };

        if edit.is_empty() {
            println!("未做任何修改");
            return Ok(());
        }

        let mut flow = EntryFlow::new(&mut self.repo, &self.images);
        let updated = flow.edit_core_fields(&entry.id, edit)?;
        println!("已保存: {} [{}]", updated.reading, updated.status);
        Ok(())
    }

    async fn explanation_session(&mut self) -> Result<()> {
        let Some(entry) = self.pick_entry("选择要生成讲解的词条")? else {
            return Ok(());
        };

        let cancel = session_cancel_token();
        let mut io = ConsoleSession;
        let outcome = {
            let mut flow = ContentFlow::new(&self.provider, &self.images, &mut io, &cancel);
            flow.run_explanation_session(&mut self.repo, &entry).await
        };
        cancel.cancel();

        print_outcome(outcome?);
        Ok(())
    }

    async fn image_session(&mut self) -> Result<()> {
        let Some(entry) = self.pick_entry("选择要生成配图的词条")? else {
            return Ok(());
        };

        let cancel = session_cancel_token();
        let mut io = ConsoleSession;
        let outcome = {
            let mut flow = ContentFlow::new(&self.provider, &self.images, &mut io, &cancel);
            flow.run_image_session(&mut self.repo, &entry).await
        };
        cancel.cancel();

        print_outcome(outcome?);
        Ok(())
    }

    fn approve_entry(&mut self) -> Result<()> {
        let Some(entry) = self.pick_entry("选择要审核的词条")? else {
            return Ok(());
        };

        let mut flow = EntryFlow::new(&mut self.repo, &self.images);
        let approved = flow.approve(&entry.id)?;
        println!("已通过: {} ({})", approved.reading, approved.approved_at.map(|t| t.to_rfc3339()).unwrap_or_default());
        Ok(())
    }

    fn clear_entry(&mut self) -> Result<()> {
        let Some(entry) = self.pick_entry("选择要清除 AI 内容的词条")? else {
            return Ok(());
        };

        if read_line("确认清除该词条的全部 AI 内容? [y/N]: ").to_lowercase() != "y" {
            println!("已取消");
            return Ok(());
        }

        let mut flow = EntryFlow::new(&mut self.repo, &self.images);
        flow.clear_generated(&entry.id)?;
        println!("已清除");
        Ok(())
    }

    fn delete_entry(&mut self) -> Result<()> {
        let Some(entry) = self.pick_entry("选择要删除的词条")? else {
            return Ok(());
        };

        if read_line("确认删除? [y/N]: ").to_lowercase() != "y" {
            println!("已取消");
            return Ok(());
        }

        let mut flow = EntryFlow::new(&mut self.repo, &self.images);
        flow.delete(&entry.id)?;
        println!("已删除");
        Ok(())
    }

    /// 列出全部词条并让用户按序号挑选
    fn pick_entry(&self, title: &str) -> Result<Option<Entry>> {
        let entries = self.repo.get_all(None);
        if entries.is_empty() {
            println!("（没有词条）");
            return Ok(None);
        }

        println!("{}:", title);
        for (index, entry) in entries.iter().enumerate() {
            println!(
                "  {}. [{}] {} {}",
                index + 1,
                entry.status,
                entry.reading,
                entry.expression.as_deref().unwrap_or(""),
            );
        }

        let input = read_line("序号 (回车取消): ");
        if input.is_empty() {
            return Ok(None);
        }

        match input.parse::<usize>() {
            Ok(number) if number >= 1 && number <= entries.len() => {
                Ok(entries.into_iter().nth(number - 1))
            }
            _ => {
                println!("无效序号");
                Ok(None)
            }
        }
    }
}

/// 控制台的会话交互实现
struct ConsoleSession;

impl SessionIo for ConsoleSession {
    fn prompt_context(&mut self, seed: Option<&str>) -> Option<String> {
        let hint = match seed {
            Some(seed) => format!("生成上下文 [回车沿用: {} / '-'=不使用]: ", truncate_text(seed, 30)),
            None => "生成上下文 [回车跳过]: ".to_string(),
        };

        let input = read_line(&hint);
        if input.is_empty() {
            return seed.map(str::to_string);
        }
        if input == "-" {
            return None;
        }
        Some(input)
    }

    fn show_explanations(&mut self, attempt_number: usize, set: &ExplanationSet) {
        println!("---------- 第 {} 次尝试 ----------", attempt_number);
        println!("  初级: {}", set.easy);
        println!("  中级: {}", set.moderate);
        println!("  高级: {}", set.advanced);
    }

    fn show_image(&mut self, attempt_number: usize, staged: &StagedImage) {
        if attempt_number == 0 {
            println!("---------- 现有配图 (第 0 项) ----------");
        } else {
            println!("---------- 第 {} 次尝试 ----------", attempt_number);
        }
        println!("  暂存文件: {}", staged.relative_path);
        if let Some(prompt) = &staged.prompt {
            println!("  提示词: {}", truncate_text(prompt, 60));
        }
    }

    fn show_failure(&mut self, attempt_number: usize, reason: &str) {
        println!("---------- 第 {} 次尝试 (失败) ----------", attempt_number);
        println!("  {}", reason);
    }

    fn choose(&mut self, has_original: bool, successful: &[usize]) -> Selection {
        let mut options = String::new();
        if has_original {
            options.push_str("0=保留原内容 / ");
        }
        if !successful.is_empty() {
            let numbers: Vec<String> = successful.iter().map(usize::to_string).collect();
            options.push_str(&format!("{}=提交该次尝试 / ", numbers.join(",")));
        }
        options.push_str("回车=重试 / c=取消");

        loop {
            let input = read_line(&format!("[{}]: ", options));
            match input.as_str() {
                "" => return Selection::Retry,
                "c" | "C" => return Selection::Cancel,
                "0" if has_original => return Selection::KeepOriginal,
                _ => match input.parse::<usize>() {
                    Ok(number) if successful.contains(&number) => {
                        return Selection::Commit(number)
                    }
                    _ => println!("无效选择"),
                },
            }
        }
    }
}

// ========== 控制台辅助函数 ==========

fn print_menu() {
    println!();
    println!("========== 词汇工作台 ==========");
    println!("  1. 词条列表");
    println!("  2. 新建词条");
    println!("  3. 修改词条");
    println!("  4. 生成讲解");
    println!("  5. 生成配图");
    println!("  6. 审核通过");
    println!("  7. 清除 AI 内容");
    println!("  8. 删除词条");
    println!("  0. 退出");
}

fn print_outcome(outcome: SessionOutcome) {
    match outcome {
        SessionOutcome::Committed => println!("已提交。"),
        SessionOutcome::KeptOriginal => println!("保留原内容。"),
        SessionOutcome::Cancelled => println!("已取消，未做任何修改。"),
    }
}

/// 为一次生成会话准备取消令牌：Ctrl+C 触发取消
///
/// 会话结束后调用方 cancel() 以回收监听任务
fn session_cancel_token() -> CancellationToken {
    let token = CancellationToken::new();
    let watch = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    warn!("收到中断信号，正在取消本次生成调用");
                    watch.cancel();
                }
            }
            _ = watch.cancelled() => {}
        }
    });
    token
}

fn read_line(prompt: &str) -> String {
    print!("{}", prompt);
    let _ = io::stdout().flush();

    let mut line = String::new();
    if io::stdin().read_line(&mut line).is_err() {
        return String::new();
    }
    line.trim().to_string()
}

fn read_optional(prompt: &str) -> Option<String> {
    let input = read_line(prompt);
    if input.is_empty() {
        None
    } else {
        Some(input)
    }
}

/// 修改字段的输入：回车保留原值(None)，"-" 清空，其他值覆盖
fn read_edit(label: &str, current: Option<&str>) -> Option<String> {
    let hint = match current {
        Some(value) => format!("{} [当前: {} / 回车保留 / '-'=清空]: ", label, truncate_text(value, 20)),
        None => format!("{} [当前为空 / 回车保留]: ", label),
    };

    let input = read_line(&hint);
    if input.is_empty() {
        return None;
    }
    if input == "-" {
        return Some(String::new());
    }
    Some(input)
}
