//! 图片资产管理 - 业务能力层
//!
//! 两个目录：最终目录存放词条当前引用的图片，暂存目录存放会话中的
//! 候选图片。文件命名由模板驱动，占位符为 {id} / {attempt} / {ext}。
//! 暂存文件的生命周期不超过产生它的会话，由清理步骤兜底删除。

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{Entry, StagedImage};

/// 图片存储能力
///
/// 窄接口：流程层只依赖这组能力，测试用替身实现
pub trait ImageStore {
    /// 把词条现有的最终图片复制进暂存区作为"第 0 次尝试"
    ///
    /// 词条没有图片时返回 None；记录的图片文件缺失是数据完整性
    /// 问题，直接报错而不是悄悄容忍
    fn stage_existing_for_edit(&self, entry: &Entry) -> AppResult<Option<StagedImage>>;

    /// 把新生成的候选图片写进暂存区，不触碰最终目录
    #[allow(clippy::too_many_arguments)]
    fn save_candidate(
        &self,
        entry: &Entry,
        bytes: &[u8],
        extension: &str,
        attempt_number: usize,
        context: Option<&str>,
        generated_at: DateTime<Utc>,
        prompt: Option<&str>,
    ) -> AppResult<StagedImage>;

    /// 把暂存文件移入最终目录（覆盖旧文件），返回新的相对路径
    fn finalize(&self, entry: &Entry, staged: &StagedImage) -> AppResult<String>;

    /// 删除词条的最终图片文件
    ///
    /// 文件本来就不在视为已达成目标；其他失败向上传播
    fn remove_final(&self, entry: &Entry) -> AppResult<()>;

    /// 尽力而为地清理暂存文件
    ///
    /// 给定标识符时只删除以它开头的文件，否则清空整个暂存目录
    /// （整个程序退出时使用）。单个文件的 I/O 失败各自吞掉，
    /// 下次会话或进程退出会再次尝试
    fn cleanup(&self, entry_id: Option<&str>);
}

/// 基于文件系统的图片资产管理器
pub struct ImageManager {
    final_dir: PathBuf,
    staging_dir: PathBuf,
    staged_name_pattern: String,
    final_name_pattern: String,
}

impl ImageManager {
    pub fn new(config: &Config) -> Self {
        Self::with_dirs(
            &config.image_final_dir,
            &config.image_staging_dir,
            &config.staged_name_pattern,
            &config.final_name_pattern,
        )
    }

    /// 使用显式目录与命名模板构造（测试使用）
    pub fn with_dirs(
        final_dir: impl AsRef<Path>,
        staging_dir: impl AsRef<Path>,
        staged_name_pattern: impl Into<String>,
        final_name_pattern: impl Into<String>,
    ) -> Self {
        Self {
            final_dir: final_dir.as_ref().to_path_buf(),
            staging_dir: staging_dir.as_ref().to_path_buf(),
            staged_name_pattern: staged_name_pattern.into(),
            final_name_pattern: final_name_pattern.into(),
        }
    }

    /// 渲染命名模板
    fn render_pattern(pattern: &str, id: &str, attempt_number: usize, extension: &str) -> String {
        pattern
            .replace("{id}", id)
            .replace("{attempt}", &attempt_number.to_string())
            .replace("{ext}", extension.trim_start_matches('.'))
    }

    fn extension_of(path: &Path) -> String {
        path.extension()
            .and_then(|e| e.to_str())
            .unwrap_or("png")
            .to_string()
    }
}

impl ImageStore for ImageManager {
    fn stage_existing_for_edit(&self, entry: &Entry) -> AppResult<Option<StagedImage>> {
        let Some(relative) = entry.image_path.as_deref() else {
            return Ok(None);
        };

        let source = self.final_dir.join(relative);
        if !source.exists() {
            return Err(AppError::final_image_missing(source.display().to_string()));
        }

        let extension = Self::extension_of(&source);
        let staged_name = Self::render_pattern(&self.staged_name_pattern, &entry.id, 0, &extension);
        let target = self.staging_dir.join(&staged_name);

        fs::create_dir_all(&self.staging_dir)
            .map_err(|e| AppError::asset_io(self.staging_dir.display().to_string(), e))?;
        fs::copy(&source, &target)
            .map_err(|e| AppError::asset_io(target.display().to_string(), e))?;

        debug!("已暂存现有图片作为第 0 次尝试: {}", staged_name);

        Ok(Some(StagedImage {
            relative_path: staged_name,
            context: entry.image_context.clone(),
            // 生成时间取自词条记录
            generated_at: entry.image_generated_at.unwrap_or(entry.created_at),
            prompt: entry.image_prompt.clone(),
        }))
    }

    fn save_candidate(
        &self,
        entry: &Entry,
        bytes: &[u8],
        extension: &str,
        attempt_number: usize,
        context: Option<&str>,
        generated_at: DateTime<Utc>,
        prompt: Option<&str>,
    ) -> AppResult<StagedImage> {
        let staged_name =
            Self::render_pattern(&self.staged_name_pattern, &entry.id, attempt_number, extension);
        let target = self.staging_dir.join(&staged_name);

        fs::create_dir_all(&self.staging_dir)
            .map_err(|e| AppError::asset_io(self.staging_dir.display().to_string(), e))?;
        fs::write(&target, bytes)
            .map_err(|e| AppError::asset_io(target.display().to_string(), e))?;

        debug!("已保存候选图片: {} ({} 字节)", staged_name, bytes.len());

        Ok(StagedImage {
            relative_path: staged_name,
            context: context.map(str::to_string),
            generated_at,
            prompt: prompt.map(str::to_string),
        })
    }

    fn finalize(&self, entry: &Entry, staged: &StagedImage) -> AppResult<String> {
        let source = self.staging_dir.join(&staged.relative_path);
        if !source.exists() {
            return Err(AppError::staged_missing(source.display().to_string()));
        }

        let extension = Self::extension_of(&source);
        let final_name = Self::render_pattern(&self.final_name_pattern, &entry.id, 0, &extension);
        let target = self.final_dir.join(&final_name);

        fs::create_dir_all(&self.final_dir)
            .map_err(|e| AppError::asset_io(self.final_dir.display().to_string(), e))?;

        // 暂存目录与最终目录可能在不同文件系统，改名失败时退回复制
        if fs::rename(&source, &target).is_err() {
            fs::copy(&source, &target)
                .map_err(|e| AppError::asset_io(target.display().to_string(), e))?;
            let _ = fs::remove_file(&source);
        }

        debug!("已转正图片: {}", final_name);
        Ok(final_name)
    }

    fn remove_final(&self, entry: &Entry) -> AppResult<()> {
        let Some(relative) = entry.image_path.as_deref() else {
            return Ok(());
        };

        let path = self.final_dir.join(relative);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::asset_io(path.display().to_string(), e)),
        }
    }

    fn cleanup(&self, entry_id: Option<&str>) {
        let dir = match fs::read_dir(&self.staging_dir) {
            Ok(dir) => dir,
            Err(e) => {
                debug!("暂存目录不可读，跳过清理: {}", e);
                return;
            }
        };

        for file in dir.flatten() {
            let name = file.file_name().to_string_lossy().into_owned();
            if let Some(id) = entry_id {
                if !name.starts_with(id) {
                    continue;
                }
            }
            if let Err(e) = fs::remove_file(file.path()) {
                // 清理是兜底动作，单个文件被占用等情况留给下一次
                debug!("清理暂存文件失败 ({}): {}", name, e);
            } else {
                debug!("已清理暂存文件: {}", name);
            }
        }
    }
}
