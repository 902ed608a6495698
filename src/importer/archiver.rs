// ==========================================
// 通用导入引擎 - 源文件归档
// ==========================================
// 规则:
// - 归档目录不存在时自动创建
// - 同名文件存在时追加序号: name_1.ext, name_2.ext, ...
// - 单个文件归档失败只记录、计数，不中断导入
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 归档汇总
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveOutcome {
    pub archived: Vec<PathBuf>,
    pub failures: usize,
}

/// 计算不冲突的归档路径
pub fn collision_free_path(archive_dir: &Path, file_name: &str) -> PathBuf {
    let candidate = archive_dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let as_path = Path::new(file_name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    let extension = as_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut counter = 1usize;
    loop {
        let candidate = archive_dir.join(format!("{}_{}{}", stem, counter, extension));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// 移动文件（跨设备时退化为复制 + 删除）
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}

/// 归档单个文件
///
/// # 返回
/// - Ok(PathBuf): 归档后的路径
/// - Err(ArchiveError): 目录创建或移动失败
pub fn archive_file(file: &Path, archive_dir: &Path) -> ImportResult<PathBuf> {
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ImportError::ArchiveError {
            file: file.display().to_string(),
            message: "无效的文件名".to_string(),
        })?;

    fs::create_dir_all(archive_dir).map_err(|e| ImportError::ArchiveError {
        file: file_name.clone(),
        message: format!("无法创建归档目录 {}: {}", archive_dir.display(), e),
    })?;

    let destination = collision_free_path(archive_dir, &file_name);
    move_file(file, &destination).map_err(|e| ImportError::ArchiveError {
        file: file_name.clone(),
        message: e.to_string(),
    })?;

    info!(
        file = %file_name,
        destination = %destination.display(),
        "文件已归档"
    );
    Ok(destination)
}

/// 批量归档，失败不抛出
pub fn archive_all(files: &[PathBuf], archive_dir: &Path) -> ArchiveOutcome {
    let mut outcome = ArchiveOutcome::default();
    for file in files {
        match archive_file(file, archive_dir) {
            Ok(path) => outcome.archived.push(path),
            Err(e) => {
                warn!(error = %e, "归档失败，已跳过");
                outcome.failures += 1;
            }
        }
    }
    outcome
}
