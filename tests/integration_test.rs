//! 端到端流程测试
//!
//! 使用脚本替身驱动生成会话，不依赖网络与真实 API。

use std::collections::VecDeque;
use std::fs;
use std::sync::Mutex;

use chrono::Utc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use vocab_workbench::{
    AppError, AppResult, ContentFlow, Entry, EntryDraft, EntryEdit, EntryFlow, EntryRepository,
    EntryStatus, ExplanationSet, GeneratedImage, GenerationProvider, GenerationRequest,
    ImageManager, ImageStore, Selection, SessionIo, SessionOutcome, StagedImage,
};

// ========== 脚本替身 ==========

/// 按脚本顺序返回结果的生成服务替身
struct ScriptedProvider {
    explanations: Mutex<VecDeque<Result<ExplanationSet, String>>>,
    images: Mutex<VecDeque<Result<Vec<u8>, String>>>,
}

impl ScriptedProvider {
    fn with_explanations(script: Vec<Result<ExplanationSet, String>>) -> Self {
        Self {
            explanations: Mutex::new(script.into()),
            images: Mutex::new(VecDeque::new()),
        }
    }

    fn with_images(script: Vec<Result<Vec<u8>, String>>) -> Self {
        Self {
            explanations: Mutex::new(VecDeque::new()),
            images: Mutex::new(script.into()),
        }
    }
}

impl GenerationProvider for ScriptedProvider {
    async fn produce_explanations(
        &self,
        _request: &GenerationRequest<'_>,
        _cancel: &CancellationToken,
    ) -> AppResult<ExplanationSet> {
        match self.explanations.lock().unwrap().pop_front() {
            Some(Ok(set)) => Ok(set),
            Some(Err(reason)) => Err(AppError::Other(reason)),
            None => Err(AppError::Other("脚本已耗尽".to_string())),
        }
    }

    async fn produce_image(
        &self,
        _request: &GenerationRequest<'_>,
        _cancel: &CancellationToken,
    ) -> AppResult<GeneratedImage> {
        match self.images.lock().unwrap().pop_front() {
            Some(Ok(bytes)) => Ok(GeneratedImage {
                bytes,
                extension: "png".to_string(),
                prompt: Some("scripted prompt".to_string()),
            }),
            Some(Err(reason)) => Err(AppError::Other(reason)),
            None => Err(AppError::Other("脚本已耗尽".to_string())),
        }
    }
}

/// 按脚本回答的会话交互替身，顺便记录流程喂给它的种子
struct ScriptedSession {
    contexts: VecDeque<Option<String>>,
    selections: VecDeque<Selection>,
    seeds_seen: Vec<Option<String>>,
    failures_shown: Vec<usize>,
}

impl ScriptedSession {
    fn new(contexts: Vec<Option<String>>, selections: Vec<Selection>) -> Self {
        Self {
            contexts: contexts.into(),
            selections: selections.into(),
            seeds_seen: Vec::new(),
            failures_shown: Vec::new(),
        }
    }
}

impl SessionIo for ScriptedSession {
    fn prompt_context(&mut self, seed: Option<&str>) -> Option<String> {
        self.seeds_seen.push(seed.map(str::to_string));
        self.contexts
            .pop_front()
            .unwrap_or_else(|| seed.map(str::to_string))
    }

    fn show_explanations(&mut self, _attempt_number: usize, _set: &ExplanationSet) {}

    fn show_image(&mut self, _attempt_number: usize, _staged: &StagedImage) {}

    fn show_failure(&mut self, attempt_number: usize, _reason: &str) {
        self.failures_shown.push(attempt_number);
    }

    fn choose(&mut self, _has_original: bool, _successful: &[usize]) -> Selection {
        self.selections.pop_front().unwrap_or(Selection::Cancel)
    }
}

// ========== 测试环境 ==========

struct TestEnv {
    _dir: TempDir,
    repo: EntryRepository,
    images: ImageManager,
    final_dir: std::path::PathBuf,
    staging_dir: std::path::PathBuf,
}

fn setup() -> TestEnv {
    let dir = TempDir::new().unwrap();
    let repo = EntryRepository::with_paths(
        dir.path().join("entries.json"),
        dir.path().join("backups"),
        true,
        3,
    )
    .unwrap();
    let final_dir = dir.path().join("final");
    let staging_dir = dir.path().join("staging");
    let images = ImageManager::with_dirs(
        &final_dir,
        &staging_dir,
        "{id}_attempt{attempt}.{ext}",
        "{id}.{ext}",
    );

    TestEnv {
        _dir: dir,
        repo,
        images,
        final_dir,
        staging_dir,
    }
}

fn sample_set() -> ExplanationSet {
    ExplanationSet {
        easy: "猫。".to_string(),
        moderate: "家庭でよく飼われる動物。".to_string(),
        advanced: "ネコ科の哺乳類、愛玩動物として広く飼育される。".to_string(),
    }
}

fn create_entry(env: &mut TestEnv, reading: &str) -> Entry {
    let mut flow = EntryFlow::new(&mut env.repo, &env.images);
    flow.create(EntryDraft {
        reading: reading.to_string(),
        ..Default::default()
    })
    .unwrap()
}

/// 词条带着一张已入库的最终图片
fn attach_final_image(env: &mut TestEnv, entry: &Entry, bytes: &[u8]) -> Entry {
    fs::create_dir_all(&env.final_dir).unwrap();
    let final_name = format!("{}.png", entry.id);
    fs::write(env.final_dir.join(&final_name), bytes).unwrap();

    let mut stored = env.repo.get_by_id(&entry.id).unwrap();
    stored.commit_image(final_name, None, Some("旧提示词".to_string()), Utc::now());
    env.repo.update(stored.clone()).unwrap();
    stored
}

/// 暂存目录中属于该词条的文件数
fn staged_count(env: &TestEnv, id: &str) -> usize {
    match fs::read_dir(&env.staging_dir) {
        Ok(dir) => dir
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with(id))
            .count(),
        Err(_) => 0,
    }
}

// ========== 场景测试 ==========

/// 规定的完整场景：创建 → 讲解(失败后重试) → 审核 → 修改读音自动清除
#[tokio::test]
async fn test_entry_workflow_end_to_end() {
    let mut env = setup();

    // 创建词条，初始状态待生成
    let entry = create_entry(&mut env, "ねこ");
    assert!(!entry.id.is_empty());
    assert_eq!(entry.status, EntryStatus::PendingGeneration);

    // 讲解会话：第 1 次失败，第 2 次成功，提交第 2 次
    let provider = ScriptedProvider::with_explanations(vec![
        Err("模拟生成失败".to_string()),
        Ok(sample_set()),
    ]);
    let mut io = ScriptedSession::new(
        vec![Some("猫について".to_string()), None],
        vec![Selection::Retry, Selection::Commit(2)],
    );
    let cancel = CancellationToken::new();

    let outcome = {
        let mut flow = ContentFlow::new(&provider, &env.images, &mut io, &cancel);
        flow.run_explanation_session(&mut env.repo, &entry)
            .await
            .unwrap()
    };
    assert_eq!(outcome, SessionOutcome::Committed);

    // 失败的尝试占据编号 1
    assert_eq!(io.failures_shown, vec![1]);
    // 第 2 次的种子是第 1 次尝试的上下文，而不是词条里存的
    assert_eq!(io.seeds_seen[0], None);
    assert_eq!(io.seeds_seen[1].as_deref(), Some("猫について"));

    let entry = env.repo.get_by_id(&entry.id).unwrap();
    assert_eq!(entry.explanations.len(), 3);
    assert_eq!(entry.status, EntryStatus::PendingApproval);
    assert!(entry.approved_at.is_none());
    assert!(entry.explanation_generated_at.is_some());

    // 审核通过
    let approved = EntryFlow::new(&mut env.repo, &env.images)
        .approve(&entry.id)
        .unwrap();
    assert_eq!(approved.status, EntryStatus::Approved);
    assert!(approved.approved_at.is_some());

    // 修改读音 → AI 内容自动清除
    let edited = EntryFlow::new(&mut env.repo, &env.images)
        .edit_core_fields(
            &entry.id,
            EntryEdit {
                reading: Some("ネコ".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(edited.reading, "ネコ");
    assert_eq!(edited.status, EntryStatus::PendingGeneration);
    assert!(edited.explanations.is_empty());
    assert!(edited.approved_at.is_none());

    // 重新加载，验证全部持久化
    let env2 = EntryRepository::with_paths(
        env._dir.path().join("entries.json"),
        env._dir.path().join("backups"),
        true,
        3,
    )
    .unwrap();
    let reloaded = env2.get_by_id(&entry.id).unwrap();
    assert_eq!(reloaded.reading, "ネコ");
    assert_eq!(reloaded.status, EntryStatus::PendingGeneration);
}

/// 规定的暂存清理场景：现有图片作第 0 项，两次候选，提交第 1 次
#[tokio::test]
async fn test_image_session_staging_cleanup() {
    let mut env = setup();
    let entry = create_entry(&mut env, "ねこ");
    let entry = attach_final_image(&mut env, &entry, b"old-image");

    let provider = ScriptedProvider::with_images(vec![
        Ok(b"candidate-1".to_vec()),
        Ok(b"candidate-2".to_vec()),
    ]);
    let mut io = ScriptedSession::new(
        vec![Some("白い猫".to_string()), Some("黒い猫".to_string())],
        vec![Selection::Retry, Selection::Commit(1)],
    );
    let cancel = CancellationToken::new();

    let outcome = {
        let mut flow = ContentFlow::new(&provider, &env.images, &mut io, &cancel);
        flow.run_image_session(&mut env.repo, &entry).await.unwrap()
    };
    assert_eq!(outcome, SessionOutcome::Committed);

    // 最终目录换成第 1 次候选的内容
    let final_bytes = fs::read(env.final_dir.join(format!("{}.png", entry.id))).unwrap();
    assert_eq!(final_bytes, b"candidate-1");

    // 该词条的暂存文件全部清掉（包括第 0 项和未选中的第 2 次）
    assert_eq!(staged_count(&env, &entry.id), 0);

    let reloaded = env.repo.get_by_id(&entry.id).unwrap();
    assert_eq!(reloaded.status, EntryStatus::PendingApproval);
    assert_eq!(reloaded.image_path.as_deref(), Some(format!("{}.png", entry.id).as_str()));
    assert_eq!(reloaded.image_prompt.as_deref(), Some("scripted prompt"));
    assert_eq!(reloaded.image_context.as_deref(), Some("白い猫"));
    assert!(reloaded.image_generated_at.is_some());
}

/// 取消的配图会话：不落任何修改，但暂存照样清理
#[tokio::test]
async fn test_cancelled_image_session_leaves_entry_unchanged() {
    let mut env = setup();
    let entry = create_entry(&mut env, "いぬ");

    let provider = ScriptedProvider::with_images(vec![Ok(b"candidate".to_vec())]);
    let mut io = ScriptedSession::new(vec![None], vec![Selection::Cancel]);
    let cancel = CancellationToken::new();

    let outcome = {
        let mut flow = ContentFlow::new(&provider, &env.images, &mut io, &cancel);
        flow.run_image_session(&mut env.repo, &entry).await.unwrap()
    };
    assert_eq!(outcome, SessionOutcome::Cancelled);

    assert_eq!(staged_count(&env, &entry.id), 0);
    let reloaded = env.repo.get_by_id(&entry.id).unwrap();
    assert!(reloaded.image_path.is_none());
    assert_eq!(reloaded.status, EntryStatus::PendingGeneration);
}

/// 保留原始讲解：会话结束后词条完全不变（包括审核状态）
#[tokio::test]
async fn test_keep_original_explanations_does_not_save() {
    let mut env = setup();
    let entry = create_entry(&mut env, "とり");

    let mut stored = env.repo.get_by_id(&entry.id).unwrap();
    stored.commit_explanations(sample_set(), Utc::now());
    stored.approve(Utc::now()).unwrap();
    env.repo.update(stored.clone()).unwrap();

    let provider = ScriptedProvider::with_explanations(vec![Ok(ExplanationSet {
        easy: "别的".to_string(),
        moderate: "别的".to_string(),
        advanced: "别的".to_string(),
    })]);
    let mut io = ScriptedSession::new(vec![None], vec![Selection::KeepOriginal]);
    let cancel = CancellationToken::new();

    let outcome = {
        let mut flow = ContentFlow::new(&provider, &env.images, &mut io, &cancel);
        flow.run_explanation_session(&mut env.repo, &stored)
            .await
            .unwrap()
    };
    assert_eq!(outcome, SessionOutcome::KeptOriginal);

    // 仍是审核通过状态，讲解没有被替换
    let reloaded = env.repo.get_by_id(&entry.id).unwrap();
    assert_eq!(reloaded.status, EntryStatus::Approved);
    assert!(reloaded.approved_at.is_some());
    assert_eq!(
        reloaded.explanations.values().next().map(String::as_str),
        Some("猫。")
    );
}

/// 清除 AI 内容：图片文件删不掉时词条保持原样
#[tokio::test]
async fn test_clear_generated_aborts_when_image_removal_fails() {
    let mut env = setup();
    let entry = create_entry(&mut env, "さかな");
    let stored = attach_final_image(&mut env, &entry, b"image");

    // 用一个删除必败的图片存储替身
    struct FailingRemove;
    impl ImageStore for FailingRemove {
        fn stage_existing_for_edit(&self, _entry: &Entry) -> AppResult<Option<StagedImage>> {
            Ok(None)
        }
        fn save_candidate(
            &self,
            _entry: &Entry,
            _bytes: &[u8],
            _extension: &str,
            _attempt_number: usize,
            _context: Option<&str>,
            _generated_at: chrono::DateTime<Utc>,
            _prompt: Option<&str>,
        ) -> AppResult<StagedImage> {
            unimplemented!("测试不会调用")
        }
        fn finalize(&self, _entry: &Entry, _staged: &StagedImage) -> AppResult<String> {
            unimplemented!("测试不会调用")
        }
        fn remove_final(&self, _entry: &Entry) -> AppResult<()> {
            Err(AppError::asset_io(
                "mock.png",
                std::io::Error::other("文件被占用"),
            ))
        }
        fn cleanup(&self, _entry_id: Option<&str>) {}
    }

    let result = EntryFlow::new(&mut env.repo, &FailingRemove).clear_generated(&stored.id);
    assert!(result.is_err());

    // 词条原样保留
    let reloaded = env.repo.get_by_id(&stored.id).unwrap();
    assert_eq!(reloaded.status, EntryStatus::PendingApproval);
    assert!(reloaded.image_path.is_some());
    assert!(reloaded.image_generated_at.is_some());
}

/// 清除 AI 内容成功路径：文件与记录一起回到初始状态
#[tokio::test]
async fn test_clear_generated_removes_image_and_resets() {
    let mut env = setup();
    let entry = create_entry(&mut env, "うみ");
    let stored = attach_final_image(&mut env, &entry, b"image");

    let cleared = EntryFlow::new(&mut env.repo, &env.images)
        .clear_generated(&stored.id)
        .unwrap();

    assert_eq!(cleared.status, EntryStatus::PendingGeneration);
    assert!(cleared.image_path.is_none());
    assert!(!env.final_dir.join(format!("{}.png", stored.id)).exists());
}

/// 删除词条时连同最终图片一起删除
#[tokio::test]
async fn test_delete_entry_removes_final_image() {
    let mut env = setup();
    let entry = create_entry(&mut env, "やま");
    let stored = attach_final_image(&mut env, &entry, b"image");

    EntryFlow::new(&mut env.repo, &env.images)
        .delete(&stored.id)
        .unwrap();

    assert!(env.repo.get_by_id(&stored.id).is_none());
    assert!(!env.final_dir.join(format!("{}.png", stored.id)).exists());
}

/// 现有图片缺失时，配图会话开始阶段就报数据完整性错误，
/// 但暂存清理仍然执行
#[tokio::test]
async fn test_image_session_missing_final_image_fails_fast() {
    let mut env = setup();
    let entry = create_entry(&mut env, "かわ");

    // 记录上有图片路径，磁盘上没有文件
    let mut stored = env.repo.get_by_id(&entry.id).unwrap();
    stored.commit_image(format!("{}.png", entry.id), None, None, Utc::now());
    env.repo.update(stored.clone()).unwrap();

    let provider = ScriptedProvider::with_images(vec![]);
    let mut io = ScriptedSession::new(vec![], vec![]);
    let cancel = CancellationToken::new();

    let result = {
        let mut flow = ContentFlow::new(&provider, &env.images, &mut io, &cancel);
        flow.run_image_session(&mut env.repo, &stored).await
    };
    assert!(result.is_err());
    assert_eq!(staged_count(&env, &entry.id), 0);
}
