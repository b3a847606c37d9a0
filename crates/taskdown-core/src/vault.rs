use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::{find_config_root, load_config, TaskdownConfig};

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("no vault directory at {0}")]
    NotFound(PathBuf),
}

/// Where the markdown task files live, plus the config that located them.
#[derive(Debug, Clone)]
pub struct VaultResolution {
    pub vault_dir: PathBuf,
    pub repo_root: PathBuf,
    pub config: Option<TaskdownConfig>,
}

/// Resolve the vault directory starting from `root`.
///
/// Precedence: the config `root_dir` override, then a `tasks/` subdirectory,
/// then `root` itself. The config is discovered by walking ancestors, so
/// commands work from anywhere inside the tree.
pub fn resolve_vault(root: &Path) -> Result<VaultResolution, VaultError> {
    if !root.is_dir() {
        return Err(VaultError::NotFound(root.to_path_buf()));
    }
    let repo_root = find_config_root(root).unwrap_or_else(|| root.to_path_buf());
    let config = load_config(&repo_root);

    if let Some(sub) = config
        .as_ref()
        .and_then(|c| c.root_dir.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        let candidate = repo_root.join(sub);
        if candidate.is_dir() {
            return Ok(VaultResolution {
                vault_dir: candidate,
                repo_root,
                config,
            });
        }
    }

    let tasks = repo_root.join("tasks");
    let vault_dir = if tasks.is_dir() { tasks } else { repo_root.clone() };
    Ok(VaultResolution {
        vault_dir,
        repo_root,
        config,
    })
}

/// All `.md` files under `dir`, recursively, in a stable sorted order.
/// Dot-directories (including the derived `.index`) are skipped.
pub fn list_markdown_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    collect_markdown(dir, &mut files);
    files.sort();
    files
}

fn collect_markdown(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if path.is_dir() {
            if !name.starts_with('.') {
                collect_markdown(&path, out);
            }
        } else if path.extension().map(|ext| ext == "md").unwrap_or(false) {
            out.push(path);
        }
    }
}
