//! 词条仓库 - 业务能力层
//!
//! 整个集合常驻内存，落盘是单个 JSON 文件。每次变更都全量重排、
//! 全量保存。数据量是几百到几千条，简单优先于吞吐。
//!
//! 保存流程是系统唯一的崩溃安全机制：
//! 先备份旧文件，再写临时文件，删旧改名完成原子替换，
//! 最后按保留数量清理过期备份。备份与清理的失败收集后一并上报，
//! 不会悄悄丢失。

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use regex::Regex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult, StoreError};
use crate::models::{Entry, EntryStatus};

/// 词条仓库
///
/// 职责：
/// - 词条集合的增删改查与标识符分配
/// - 单文件 JSON 持久化（原子替换 + 轮转备份）
/// - 假定单写入进程，不做跨进程加锁
pub struct EntryRepository {
    entries: Vec<Entry>,
    data_file: PathBuf,
    backup_dir: PathBuf,
    backups_enabled: bool,
    backup_limit: usize,
    /// 测试专用故障点：强制原子替换步骤失败
    #[cfg(test)]
    fail_replace: std::cell::Cell<bool>,
}

impl EntryRepository {
    /// 从配置加载仓库（启动时读取一次数据文件）
    pub fn load(config: &Config) -> AppResult<Self> {
        Self::with_paths(
            &config.data_file,
            &config.backup_dir,
            config.backups_enabled,
            config.backup_limit,
        )
    }

    /// 使用显式路径构造（测试与工具代码使用）
    pub fn with_paths(
        data_file: impl AsRef<Path>,
        backup_dir: impl AsRef<Path>,
        backups_enabled: bool,
        backup_limit: usize,
    ) -> AppResult<Self> {
        let data_file = data_file.as_ref().to_path_buf();
        let entries = Self::load_entries(&data_file)?;

        Ok(Self {
            entries,
            data_file,
            backup_dir: backup_dir.as_ref().to_path_buf(),
            backups_enabled,
            backup_limit,
            #[cfg(test)]
            fail_replace: std::cell::Cell::new(false),
        })
    }

    /// 读取数据文件
    ///
    /// 文件缺失、空内容、纯空白或字面量 null 都视为空集合；
    /// 其余无法解析的内容是数据损坏，直接报错，不做静默恢复
    fn load_entries(data_file: &Path) -> AppResult<Vec<Entry>> {
        if !data_file.exists() {
            debug!("数据文件不存在，从空集合开始: {}", data_file.display());
            return Ok(Vec::new());
        }

        let text = fs::read_to_string(data_file)
            .map_err(|e| AppError::store_io(data_file.display().to_string(), e))?;

        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Option<Vec<Entry>>>(&text) {
            Ok(Some(entries)) => Ok(entries),
            Ok(None) => Ok(Vec::new()),
            Err(e) => Err(AppError::malformed_store(data_file.display().to_string(), e)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 返回全部词条（可按状态过滤），不修改集合
    pub fn get_all(&self, status: Option<EntryStatus>) -> Vec<Entry> {
        self.entries
            .iter()
            .filter(|e| status.map_or(true, |s| e.status == s))
            .cloned()
            .collect()
    }

    /// 按标识符查找，查不到不算错误
    pub fn get_by_id(&self, id: &str) -> Option<Entry> {
        self.entries.iter().find(|e| e.id == id).cloned()
    }

    /// 按读音查找（查重用）
    pub fn find_by_reading(&self, reading: &str) -> Option<Entry> {
        self.entries.iter().find(|e| e.reading == reading).cloned()
    }

    /// 新增词条
    ///
    /// 词条不允许携带标识符，那是调用方 bug，立即报错。
    /// 入库时分配新的 UUID，返回入库后的词条
    pub fn add(&mut self, mut entry: Entry) -> AppResult<Entry> {
        if !entry.id.is_empty() {
            return Err(AppError::preassigned_id(entry.id));
        }

        let mut id = Uuid::new_v4().to_string();
        while self.entries.iter().any(|e| e.id == id) {
            id = Uuid::new_v4().to_string();
        }
        entry.id = id;

        self.entries.push(entry.clone());
        self.sort_and_save()?;
        Ok(entry)
    }

    /// 按标识符整体替换词条
    pub fn update(&mut self, entry: Entry) -> AppResult<()> {
        let position = self
            .entries
            .iter()
            .position(|e| e.id == entry.id)
            .ok_or_else(|| AppError::store_not_found(entry.id.clone()))?;

        self.entries[position] = entry;
        self.sort_and_save()
    }

    /// 按标识符删除词条
    pub fn delete(&mut self, id: &str) -> AppResult<()> {
        let position = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| AppError::store_not_found(id))?;

        self.entries.remove(position);
        self.sort_and_save()
    }

    /// 每次变更都按创建时间重排并全量保存
    fn sort_and_save(&mut self) -> AppResult<()> {
        self.entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        self.save()
    }

    /// 保存全量集合
    ///
    /// 步骤 3/4 失败会删除临时文件并抛出原始错误，数据文件绝不会
    /// 停留在写了一半的状态；步骤 1/5 的失败收集后在步骤 6 一并上报
    fn save(&self) -> AppResult<()> {
        let mut issues: Vec<String> = Vec::new();

        // ========== 步骤 1: 备份现有数据文件 ==========
        if self.backups_enabled && self.data_file.exists() {
            self.backup_current(&mut issues);
        }

        // ========== 步骤 2: 序列化全量集合 ==========
        let text = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| AppError::malformed_store(self.data_file.display().to_string(), e))?;

        // ========== 步骤 3/4: 写临时文件 + 原子替换 ==========
        // 临时文件放在同目录，保证改名操作不跨文件系统
        let tmp_file = self.tmp_path();
        let replaced = fs::write(&tmp_file, &text).and_then(|_| self.replace_data_file(&tmp_file));

        if let Err(e) = replaced {
            if tmp_file.exists() {
                let _ = fs::remove_file(&tmp_file);
            }
            return Err(AppError::store_io(self.data_file.display().to_string(), e));
        }

        // ========== 步骤 5: 清理过期备份 ==========
        if self.backups_enabled && self.backup_limit > 0 {
            self.prune_backups(&mut issues);
        }

        // ========== 步骤 6: 汇总非致命错误 ==========
        if !issues.is_empty() {
            return Err(AppError::Store(StoreError::SaveIncomplete { issues }));
        }

        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .data_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "entries.json".to_string());
        name.push_str(".tmp");
        self.data_file.with_file_name(name)
    }

    /// 删旧 + 改名，完成原子替换
    fn replace_data_file(&self, tmp_file: &Path) -> std::io::Result<()> {
        #[cfg(test)]
        if self.fail_replace.get() {
            return Err(std::io::Error::other("模拟替换失败"));
        }

        if self.data_file.exists() {
            fs::remove_file(&self.data_file)?;
        }
        fs::rename(tmp_file, &self.data_file)
    }

    /// 把当前数据文件复制为带时间戳的备份
    ///
    /// 文件名精确到秒，字典序即时间序
    fn backup_current(&self, issues: &mut Vec<String>) {
        if let Err(e) = fs::create_dir_all(&self.backup_dir) {
            issues.push(format!("创建备份目录失败 ({}): {}", self.backup_dir.display(), e));
            return;
        }

        let name = format!(
            "{}-{}.json",
            self.data_stem(),
            Utc::now().format("%Y%m%dT%H%M%SZ")
        );
        let backup_path = self.backup_dir.join(&name);

        if let Err(e) = fs::copy(&self.data_file, &backup_path) {
            issues.push(format!("创建备份失败 ({}): {}", backup_path.display(), e));
        } else {
            debug!("已创建备份: {}", name);
        }
    }

    /// 按文件名排序删除超出保留数量的最旧备份
    fn prune_backups(&self, issues: &mut Vec<String>) {
        let pattern = format!(r"^{}-\d{{8}}T\d{{6}}Z\.json$", regex::escape(&self.data_stem()));
        let pattern = match Regex::new(&pattern) {
            Ok(p) => p,
            Err(e) => {
                issues.push(format!("备份文件名模式无效: {}", e));
                return;
            }
        };

        let dir = match fs::read_dir(&self.backup_dir) {
            Ok(dir) => dir,
            // 备份目录还不存在时没有可清理的内容
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                issues.push(format!("读取备份目录失败 ({}): {}", self.backup_dir.display(), e));
                return;
            }
        };

        let mut backups: Vec<String> = dir
            .flatten()
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .filter(|name| pattern.is_match(name))
            .collect();

        if backups.len() <= self.backup_limit {
            return;
        }

        backups.sort();
        let excess = backups.len() - self.backup_limit;
        for name in backups.into_iter().take(excess) {
            let path = self.backup_dir.join(&name);
            if let Err(e) = fs::remove_file(&path) {
                issues.push(format!("删除过期备份失败 ({}): {}", path.display(), e));
            } else {
                debug!("已删除过期备份: {}", name);
            }
        }
    }

    fn data_stem(&self) -> String {
        self.data_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| {
                warn!("数据文件路径没有文件名，备份使用默认前缀");
                "entries".to_string()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn test_repo(dir: &TempDir, limit: usize) -> EntryRepository {
        EntryRepository::with_paths(
            dir.path().join("entries.json"),
            dir.path().join("backups"),
            true,
            limit,
        )
        .unwrap()
    }

    #[test]
    fn test_add_assigns_fresh_unique_id() {
        let dir = TempDir::new().unwrap();
        let mut repo = test_repo(&dir, 0);

        let first = repo.add(Entry::new("ねこ")).unwrap();
        let second = repo.add(Entry::new("いぬ")).unwrap();

        assert!(!first.id.is_empty());
        assert!(!second.id.is_empty());
        assert_ne!(first.id, second.id);
        assert_eq!(repo.get_by_id(&first.id).unwrap().reading, "ねこ");
    }

    #[test]
    fn test_add_rejects_preassigned_id() {
        let dir = TempDir::new().unwrap();
        let mut repo = test_repo(&dir, 0);

        let mut entry = Entry::new("ねこ");
        entry.id = "外部分配".to_string();

        let result = repo.add(entry);
        assert!(matches!(
            result,
            Err(AppError::Store(StoreError::PreassignedId { .. }))
        ));
        assert!(repo.is_empty());
    }

    #[test]
    fn test_update_keeps_collection_sorted_by_created_at() {
        let dir = TempDir::new().unwrap();
        let mut repo = test_repo(&dir, 0);

        let base = Utc::now();
        let mut newer = Entry::new("あと");
        newer.created_at = base + Duration::seconds(10);
        let mut older = Entry::new("さき");
        older.created_at = base;

        // 先插入较新的，再插入较旧的
        let newer = repo.add(newer).unwrap();
        repo.add(older).unwrap();

        let mut updated = repo.get_by_id(&newer.id).unwrap();
        updated.note = Some("メモ".to_string());
        repo.update(updated).unwrap();

        let all = repo.get_all(None);
        assert_eq!(all[0].reading, "さき");
        assert_eq!(all[1].reading, "あと");
        assert!(all[0].created_at <= all[1].created_at);
    }

    #[test]
    fn test_update_and_delete_unknown_id_fail() {
        let dir = TempDir::new().unwrap();
        let mut repo = test_repo(&dir, 0);

        let mut ghost = Entry::new("ゆうれい");
        ghost.id = "不存在".to_string();
        assert!(matches!(
            repo.update(ghost),
            Err(AppError::Store(StoreError::NotFound { .. }))
        ));
        assert!(matches!(
            repo.delete("不存在"),
            Err(AppError::Store(StoreError::NotFound { .. }))
        ));
    }

    #[test]
    fn test_load_missing_empty_whitespace_and_null_yield_empty() {
        let dir = TempDir::new().unwrap();
        let data_file = dir.path().join("entries.json");
        let backups = dir.path().join("backups");

        // 文件缺失
        let repo = EntryRepository::with_paths(&data_file, &backups, false, 0).unwrap();
        assert!(repo.is_empty());

        for content in ["", "   \n\t  ", "null"] {
            fs::write(&data_file, content).unwrap();
            let repo = EntryRepository::with_paths(&data_file, &backups, false, 0).unwrap();
            assert!(repo.is_empty(), "内容 {:?} 应该得到空集合", content);
        }
    }

    #[test]
    fn test_load_malformed_content_fails() {
        let dir = TempDir::new().unwrap();
        let data_file = dir.path().join("entries.json");
        fs::write(&data_file, "[{\"reading\": \"ねこ\"").unwrap();

        let result = EntryRepository::with_paths(&data_file, dir.path().join("backups"), false, 0);
        assert!(matches!(
            result,
            Err(AppError::Store(StoreError::Malformed { .. }))
        ));
    }

    #[test]
    fn test_save_is_atomic_when_replace_fails() {
        let dir = TempDir::new().unwrap();
        let mut repo = test_repo(&dir, 0);
        repo.add(Entry::new("ねこ")).unwrap();

        let data_file = dir.path().join("entries.json");
        let before = fs::read_to_string(&data_file).unwrap();

        // 强制替换步骤失败，模拟改名中途崩溃
        repo.fail_replace.set(true);
        let result = repo.add(Entry::new("いぬ"));
        assert!(result.is_err());

        // 原文件内容不变，临时文件不残留
        assert_eq!(fs::read_to_string(&data_file).unwrap(), before);
        assert!(!dir.path().join("entries.json.tmp").exists());

        // 故障解除后可以继续保存
        repo.fail_replace.set(false);
        repo.add(Entry::new("とり")).unwrap();
    }

    #[test]
    fn test_backup_created_before_overwrite() {
        let dir = TempDir::new().unwrap();
        let mut repo = test_repo(&dir, 5);

        // 第一次保存时数据文件还不存在，不产生备份
        repo.add(Entry::new("ねこ")).unwrap();
        assert!(!dir.path().join("backups").exists());

        // 第二次保存备份第一次的内容
        repo.add(Entry::new("いぬ")).unwrap();
        let backups: Vec<_> = fs::read_dir(dir.path().join("backups"))
            .unwrap()
            .flatten()
            .collect();
        assert_eq!(backups.len(), 1);
        let name = backups[0].file_name().to_string_lossy().into_owned();
        assert!(name.starts_with("entries-") && name.ends_with("Z.json"), "{}", name);
    }

    #[test]
    fn test_prune_removes_oldest_down_to_limit() {
        let dir = TempDir::new().unwrap();
        let backup_dir = dir.path().join("backups");
        fs::create_dir_all(&backup_dir).unwrap();

        // 预置 4 个时间递增的备份，外加一个不符合命名模式的文件
        let names = [
            "entries-20260101T000000Z.json",
            "entries-20260102T000000Z.json",
            "entries-20260103T000000Z.json",
            "entries-20260104T000000Z.json",
        ];
        for name in names {
            fs::write(backup_dir.join(name), "[]").unwrap();
        }
        fs::write(backup_dir.join("entries-手动备份.json"), "[]").unwrap();

        let mut repo = test_repo(&dir, 2);
        repo.add(Entry::new("ねこ")).unwrap();

        let mut remaining: Vec<String> = fs::read_dir(&backup_dir)
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        remaining.sort();

        // 只删到保留数量为止，最旧的先删，模式外的文件不动
        assert_eq!(
            remaining,
            vec![
                "entries-20260103T000000Z.json".to_string(),
                "entries-20260104T000000Z.json".to_string(),
                "entries-手动备份.json".to_string(),
            ]
        );
    }

    #[test]
    fn test_get_all_filters_by_status() {
        let dir = TempDir::new().unwrap();
        let mut repo = test_repo(&dir, 0);

        repo.add(Entry::new("ねこ")).unwrap();
        let pending = repo.add(Entry::new("いぬ")).unwrap();

        let mut entry = repo.get_by_id(&pending.id).unwrap();
        entry.commit_explanations(
            crate::models::ExplanationSet {
                easy: "a".to_string(),
                moderate: "b".to_string(),
                advanced: "c".to_string(),
            },
            Utc::now(),
        );
        repo.update(entry).unwrap();

        assert_eq!(repo.get_all(None).len(), 2);
        assert_eq!(repo.get_all(Some(EntryStatus::PendingGeneration)).len(), 1);
        assert_eq!(repo.get_all(Some(EntryStatus::PendingApproval)).len(), 1);
        assert_eq!(repo.get_all(Some(EntryStatus::Approved)).len(), 0);
    }

    #[test]
    fn test_saved_file_roundtrips() {
        let dir = TempDir::new().unwrap();
        {
            let mut repo = test_repo(&dir, 0);
            let stored = repo.add(Entry::new("ねこ")).unwrap();
            let mut entry = repo.get_by_id(&stored.id).unwrap();
            entry.expression = Some("猫".to_string());
            repo.update(entry).unwrap();
        }

        // 重新加载
        let repo = test_repo(&dir, 0);
        let all = repo.get_all(None);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].reading, "ねこ");
        assert_eq!(all[0].expression.as_deref(), Some("猫"));
    }
}
