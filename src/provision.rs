/// Sandbox provisioning: fixture copies, module symlinks and the
/// `node_modules` link.
///
/// Every operation is started at once and joined; the first failure
/// fails the whole step. Operations that already finished stay on disk,
/// the next `init()` wipes the directory anyway.
use std::path::{Path, PathBuf};

use futures::future::try_join_all;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::SandboxConfig;
use crate::error::{Result, SandboxError};
use crate::host::HostEnv;
use crate::layout::SandboxLayout;

/// Populates a freshly created sandbox directory from a resolved config.
///
/// Relative `copyFiles` entries are taken from the host working directory.
pub async fn provision(
    layout: &SandboxLayout,
    config: &SandboxConfig,
    project_root: &Path,
    env: &HostEnv,
) -> Result<()> {
    let linked = layout.linked_modules();
    tokio::fs::create_dir_all(&linked)
        .await
        .map_err(|e| SandboxError::io(&linked, e))?;

    let copies = try_join_all(
        config
            .copy_files
            .iter()
            .map(|src| copy_into(env.absolutize(Path::new(src)), layout.root())),
    );
    let links = try_join_all(
        config
            .link_modules
            .iter()
            .map(|(name, target)| symlink_dir(Path::new(target), linked.join(name))),
    );
    let node_modules = symlink_dir(project_root.join("node_modules"), layout.node_modules());

    tokio::try_join!(copies, links, node_modules)?;

    debug!(
        "Provisioned {} ({} copies, {} linked modules)",
        layout.root().display(),
        config.copy_files.len(),
        config.link_modules.len()
    );
    Ok(())
}

/// Copies `src` (file or directory) to `<dest_root>/<basename of src>`.
async fn copy_into(src: PathBuf, dest_root: &Path) -> Result<()> {
    let name = src
        .file_name()
        .ok_or_else(|| SandboxError::InvalidCopySource {
            path: src.to_string_lossy().into_owned(),
        })?;
    let dest = dest_root.join(name);

    debug!("Copying {} → {}", src.display(), dest.display());
    let task_src = src.clone();
    tokio::task::spawn_blocking(move || copy_tree(&task_src, &dest))
        .await
        .map_err(|e| SandboxError::io(&src, std::io::Error::other(e)))?
}

/// Recursive copy. Nested symlinks are recreated, not followed.
fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    let meta = std::fs::metadata(src).map_err(|e| SandboxError::io(src, e))?;
    if meta.is_file() {
        std::fs::copy(src, dest).map_err(|e| SandboxError::io(src, e))?;
        return Ok(());
    }

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(src).to_path_buf();
            SandboxError::io(path, e.into())
        })?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| SandboxError::io(entry.path(), std::io::Error::other(e)))?;
        let target = dest.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| SandboxError::io(&target, e))?;
        } else if file_type.is_symlink() {
            let link = std::fs::read_link(entry.path())
                .map_err(|e| SandboxError::io(entry.path(), e))?;
            symlink_sync(&link, &target).map_err(|e| SandboxError::io(&target, e))?;
        } else {
            std::fs::copy(entry.path(), &target).map_err(|e| SandboxError::io(entry.path(), e))?;
        }
    }
    Ok(())
}

/// Links `link` to `target`, creating missing parents of `link`
/// (`linked_modules/@scope/` for scoped package names).
async fn symlink_dir(target: impl AsRef<Path>, link: PathBuf) -> Result<()> {
    let target = target.as_ref();
    debug!("Linking {} → {}", link.display(), target.display());

    if let Some(parent) = link.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| SandboxError::io(parent, e))?;
    }

    #[cfg(unix)]
    let res = tokio::fs::symlink(target, &link).await;
    #[cfg(windows)]
    let res = tokio::fs::symlink_dir(target, &link).await;

    res.map_err(|e| SandboxError::io(link, e))
}

#[cfg(unix)]
fn symlink_sync(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_sync(target: &Path, link: &Path) -> std::io::Result<()> {
    let resolved = link.parent().map(|p| p.join(target)).unwrap_or_default();
    if resolved.is_dir() {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    }
}
