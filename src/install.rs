// 原子安装器
//
// 序列化 → 同目录临时文件 → fsync → 收紧权限 → 原子 rename。
// 任一步失败时目标文件保持原样，临时文件被清理；
// 并发运行同一目标时以最后一次成功的 rename 为准，不做跨运行加锁

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::ReconcileError;
use crate::store::HostKeyStore;

/// 把校验通过的存储原子写入目标路径，返回写入的条目数
pub fn install(store: &HostKeyStore, destination: &Path) -> Result<usize, ReconcileError> {
    let contents = store.to_file_contents();
    let temp_path = temp_path_for(destination)?;

    debug!("[Install] writing {} entries to {}", store.len(), temp_path.display());
    match write_and_rename(&contents, &temp_path, destination) {
        Ok(()) => {
            info!(
                "[Install] installed {} entries to {}",
                store.len(),
                destination.display()
            );
            Ok(store.len())
        }
        Err(e) => {
            // 目标未被触碰，清理临时文件即可
            let _ = fs::remove_file(&temp_path);
            Err(ReconcileError::Install(format!(
                "{} (destination {} left untouched)",
                e,
                destination.display()
            )))
        }
    }
}

/// 临时文件与目标同目录，保证 rename 不跨文件系统
fn temp_path_for(destination: &Path) -> Result<PathBuf, ReconcileError> {
    let parent = destination.parent().filter(|p| !p.as_os_str().is_empty());
    let file_name = destination
        .file_name()
        .ok_or_else(|| {
            ReconcileError::Install(format!(
                "destination {} has no file name",
                destination.display()
            ))
        })?
        .to_string_lossy();

    let temp_name = format!(".{}.tmp.{}", file_name, std::process::id());
    Ok(match parent {
        Some(dir) => dir.join(temp_name),
        None => PathBuf::from(temp_name),
    })
}

fn write_and_rename(contents: &str, temp_path: &Path, destination: &Path) -> std::io::Result<()> {
    let mut file = fs::File::create(temp_path)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()?;

    // rename 之前收紧权限：仅属主可读写
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(temp_path, fs::Permissions::from_mode(0o600))?;
    }

    fs::rename(temp_path, destination)
}
