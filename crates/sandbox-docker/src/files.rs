use std::collections::HashSet;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};

use sandbox::Files;

/// Staged request files are read-only for the sandbox user.
const REQUEST_FILE_MODE: u32 = 0o444;

/// Write request files into `dir` in collection order.
///
/// The unnamed file is stored under `entry`. Names must be relative paths
/// inside `dir`, and no two files may land on the same path.
pub async fn write_files(dir: &Path, files: &Files, entry: &str) -> io::Result<()> {
    let mut written = HashSet::new();
    for (name, content) in files.iter() {
        let name = if name.is_empty() { entry } else { name };
        let path = resolve(dir, name)?;
        if !written.insert(path.clone()) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("duplicate file {name}"),
            ));
        }
        write_file(&path, content, REQUEST_FILE_MODE).await?;
    }
    Ok(())
}

/// Write `content` to `path` with permission bits `mode`, creating parent
/// directories as needed.
pub async fn write_file(path: &Path, content: &str, mode: u32) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await?;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

/// Copy regular files matching the glob `pattern` into `dir`, keeping their
/// base names. Files already present in `dir` are left as they are.
pub async fn copy_files(pattern: &str, dir: &Path) -> io::Result<()> {
    let matches = glob::glob(pattern).map_err(|e| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("pattern {pattern}: {e}"))
    })?;
    for entry in matches {
        let src = entry.map_err(io::Error::from)?;
        if !tokio::fs::metadata(&src).await?.is_file() {
            continue;
        }
        let Some(name) = src.file_name() else {
            continue;
        };
        let dst = dir.join(name);
        if tokio::fs::try_exists(&dst).await? {
            continue;
        }
        tokio::fs::copy(&src, &dst).await?;
    }
    Ok(())
}

fn resolve(dir: &Path, name: &str) -> io::Result<PathBuf> {
    let relative = Path::new(name);
    let inside = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    let named = relative
        .components()
        .any(|c| matches!(c, Component::Normal(_)));
    if !inside || !named {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid file name {name:?}"),
        ));
    }
    Ok(dir.join(relative))
}
