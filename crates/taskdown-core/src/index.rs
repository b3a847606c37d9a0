use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs2::FileExt;
use log::debug;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::hierarchy::{build_file_hierarchy, FileHierarchy};
use crate::metadata;
use crate::scanner::scan_file;
use crate::task::{
    AreaHeading, IndexedFile, Project, SectionHeading, Task, TaskIndex, INDEX_VERSION,
};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("failed to access index: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize index: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("index version {found} is not supported (expected {expected})")]
    VersionMismatch { found: u64, expected: u32 },
}

/// A non-fatal anomaly found while indexing. Indexing never throws; every
/// structural problem lands here and the build still returns a best-effort
/// index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub message: String,
}

impl Warning {
    pub fn new(file: &str, line: impl Into<Option<usize>>, message: impl Into<String>) -> Self {
        Self {
            file: file.to_string(),
            line: line.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub files: usize,
    pub projects: usize,
    pub tasks: usize,
    pub completed: usize,
    pub dropped: usize,
}

#[derive(Debug)]
pub struct BuildOutcome {
    pub index: TaskIndex,
    pub stats: BuildStats,
    pub warnings: Vec<Warning>,
}

/// Build the index by reading each path from disk. Unreadable files become
/// warnings and are skipped; the build itself never fails.
pub fn build_index(paths: &[PathBuf]) -> BuildOutcome {
    let mut sources = Vec::with_capacity(paths.len());
    let mut io_warnings = Vec::new();
    for path in paths {
        let label = path.to_string_lossy().to_string();
        match fs::read_to_string(path) {
            Ok(text) => sources.push((label, text)),
            Err(err) => {
                io_warnings.push(Warning::new(&label, None, format!("failed to read: {err}")));
            }
        }
    }
    let mut outcome = build_index_from_sources(&sources);
    outcome.warnings.splice(0..0, io_warnings);
    outcome
}

/// Build the index from in-memory `(path, text)` sources.
///
/// One pass per file assigns project context and file-local hierarchy; a
/// final pass resolves parent/children references into global-id space,
/// silently pruning references whose target was never inserted (every such
/// drop already produced its own warning).
pub fn build_index_from_sources(sources: &[(String, String)]) -> BuildOutcome {
    let mut warnings = Vec::new();
    let mut stats = BuildStats::default();

    let mut files = Vec::new();
    let mut areas: BTreeMap<String, AreaHeading> = BTreeMap::new();
    let mut projects: BTreeMap<String, Project> = BTreeMap::new();
    let mut sections: BTreeMap<String, SectionHeading> = BTreeMap::new();
    let mut tasks: BTreeMap<String, Task> = BTreeMap::new();
    // Arena-index -> global-id translation, per file, for the link pass.
    let mut link_maps: Vec<(FileHierarchy, Vec<Option<String>>)> = Vec::new();

    for (path, text) in sources {
        stats.files += 1;
        let scan = scan_file(text);
        let title = scan.frontmatter_str("title").map(|t| t.to_string());
        let hierarchy = build_file_hierarchy(scan);
        debug!(
            "scanned {}: {} project(s), {} task line(s)",
            path,
            hierarchy.projects.len(),
            hierarchy.tasks.len()
        );

        for area in &hierarchy.areas {
            if let Some(existing) = areas.get(&area.area) {
                warnings.push(Warning::new(
                    path,
                    area.line_number,
                    format!(
                        "duplicate area `{}` (first defined in {}:{}), keeping the first",
                        area.area, existing.file_path, existing.line_number
                    ),
                ));
                continue;
            }
            areas.insert(
                area.area.clone(),
                AreaHeading {
                    area: area.area.clone(),
                    name: area.name.clone(),
                    file_path: path.clone(),
                    line_number: area.line_number,
                    heading_level: area.heading_level,
                },
            );
        }

        for project in &hierarchy.projects {
            if let Some(existing) = projects.get(&project.id) {
                warnings.push(Warning::new(
                    path,
                    project.line_number,
                    format!(
                        "duplicate project `{}` (first defined in {}:{}), keeping the first",
                        project.id, existing.file_path, existing.line_number
                    ),
                ));
                continue;
            }
            projects.insert(
                project.id.clone(),
                Project {
                    id: project.id.clone(),
                    name: project.name.clone(),
                    area: project.area.clone(),
                    file_path: path.clone(),
                    line_number: project.line_number,
                },
            );
        }

        register_sections(&hierarchy, &mut sections);

        let mut arena_globals: Vec<Option<String>> = Vec::with_capacity(hierarchy.tasks.len());
        let mut file_task_count = 0usize;
        for file_task in &hierarchy.tasks {
            let raw = &file_task.raw;
            let Some(local_id) = raw.local_id.clone() else {
                arena_globals.push(None);
                continue;
            };
            let Some(project_id) = file_task.project_id.clone() else {
                warnings.push(Warning::new(
                    path,
                    raw.line_number,
                    format!("task `{}` has no project context, dropping", local_id),
                ));
                stats.dropped += 1;
                arena_globals.push(None);
                continue;
            };
            let global_id = format!("{}:{}", project_id, local_id);
            if let Some(existing) = tasks.get(&global_id) {
                warnings.push(Warning::new(
                    path,
                    raw.line_number,
                    format!(
                        "duplicate task id `{}` (first defined in {}:{}), keeping the first",
                        global_id, existing.file_path, existing.line_number
                    ),
                ));
                stats.dropped += 1;
                arena_globals.push(None);
                continue;
            }

            let pairs = &raw.metadata;
            let project_area = projects.get(&project_id).and_then(|p| p.area.clone());
            let task = Task {
                global_id: global_id.clone(),
                local_id,
                project_id,
                text: raw.text.clone(),
                completed: raw.completed,
                energy: metadata::get(pairs, "energy")
                    .unwrap_or("normal")
                    .to_string(),
                priority: metadata::get(pairs, "priority").map(|v| v.to_string()),
                est: metadata::get(pairs, "est").map(|v| v.to_string()),
                due: metadata::get(pairs, "due").map(|v| v.to_string()),
                plan: metadata::get(pairs, "plan").map(|v| v.to_string()),
                bucket: metadata::get(pairs, "bucket").map(|v| v.to_string()),
                area: metadata::get(pairs, "area")
                    .map(|v| v.to_string())
                    .or(project_area),
                tags: metadata::get(pairs, "tags")
                    .map(|v| {
                        v.split(',')
                            .map(|t| t.trim().to_string())
                            .filter(|t| !t.is_empty())
                            .collect()
                    })
                    .unwrap_or_default(),
                created: metadata::get(pairs, "created").map(|v| v.to_string()),
                updated: metadata::get(pairs, "updated").map(|v| v.to_string()),
                file_path: path.clone(),
                line_number: raw.line_number,
                indent_level: raw.indent_level,
                parent_id: None,
                children_ids: Vec::new(),
            };
            if task.completed {
                stats.completed += 1;
            }
            file_task_count += 1;
            tasks.insert(global_id.clone(), task);
            arena_globals.push(Some(global_id));
        }

        files.push(IndexedFile {
            path: path.clone(),
            title,
            task_count: file_task_count,
            hash: content_hash(text),
        });
        link_maps.push((hierarchy, arena_globals));
    }

    // Link pass: rewrite parent/children from arena indices to global ids.
    for (hierarchy, arena_globals) in &link_maps {
        for (idx, file_task) in hierarchy.tasks.iter().enumerate() {
            let Some(global_id) = arena_globals[idx].as_ref() else {
                continue;
            };
            let parent_id = file_task
                .parent
                .and_then(|parent| arena_globals[parent].clone());
            let children_ids: Vec<String> = file_task
                .children
                .iter()
                .filter_map(|&child| arena_globals[child].clone())
                .collect();
            if let Some(task) = tasks.get_mut(global_id) {
                task.parent_id = parent_id;
                task.children_ids = children_ids;
            }
        }
    }

    stats.projects = projects.len();
    stats.tasks = tasks.len();

    BuildOutcome {
        index: TaskIndex {
            version: INDEX_VERSION,
            generated_at: Utc::now().to_rfc3339(),
            files,
            areas,
            projects,
            sections,
            tasks,
        },
        stats,
        warnings,
    }
}

/// Sections are organizational only: those without a project context are
/// skipped, ids are slugs unique within their project.
fn register_sections(hierarchy: &FileHierarchy, sections: &mut BTreeMap<String, SectionHeading>) {
    let mut ids: Vec<Option<String>> = Vec::with_capacity(hierarchy.sections.len());
    for section in &hierarchy.sections {
        let Some(project_id) = section.project_id.clone() else {
            ids.push(None);
            continue;
        };
        let base = format!("{}:{}", project_id, slugify(&section.name));
        let mut id = base.clone();
        let mut suffix = 2;
        while sections.contains_key(&id) {
            id = format!("{}-{}", base, suffix);
            suffix += 1;
        }
        let parent_id = section
            .parent
            .and_then(|parent| ids.get(parent).cloned().flatten());
        sections.insert(
            id.clone(),
            SectionHeading {
                id: id.clone(),
                project_id,
                name: section.name.clone(),
                parent_id,
                heading_level: section.heading_level,
            },
        );
        ids.push(Some(id));
    }
}

fn slugify(name: &str) -> String {
    let mut slug = String::new();
    for ch in name.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "section".to_string()
    } else {
        slug
    }
}

fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn index_dir(vault_dir: &Path) -> PathBuf {
    vault_dir.join(".index")
}

pub fn index_path(vault_dir: &Path) -> PathBuf {
    index_dir(vault_dir).join("index.json")
}

/// Persist the index as pretty JSON, holding an exclusive lock for the
/// duration of the write.
pub fn write_index(path: &Path, index: &TaskIndex) -> Result<(), IndexError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.lock_exclusive()?;
    let body = serde_json::to_string_pretty(index)?;
    let result = file
        .write_all(body.as_bytes())
        .and_then(|_| file.write_all(b"\n"));
    fs2::FileExt::unlock(&file)?;
    result?;
    Ok(())
}

/// Read a persisted index, rejecting any version other than the current one
/// instead of silently misinterpreting an older shape.
pub fn read_index(path: &Path) -> Result<TaskIndex, IndexError> {
    let text = fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&text)?;
    let found = value.get("version").and_then(|v| v.as_u64()).unwrap_or(0);
    if found != u64::from(INDEX_VERSION) {
        return Err(IndexError::VersionMismatch {
            found,
            expected: INDEX_VERSION,
        });
    }
    Ok(serde_json::from_value(value)?)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub ok: bool,
    pub stale: Vec<String>,
    pub missing: Vec<String>,
    pub extra: Vec<String>,
}

/// Compare a persisted index against a freshly built one by file hash.
pub fn check_index(persisted: &TaskIndex, current: &TaskIndex) -> IndexReport {
    let persisted_files: BTreeMap<&str, &str> = persisted
        .files
        .iter()
        .map(|f| (f.path.as_str(), f.hash.as_str()))
        .collect();
    let current_files: BTreeMap<&str, &str> = current
        .files
        .iter()
        .map(|f| (f.path.as_str(), f.hash.as_str()))
        .collect();

    let mut stale = Vec::new();
    let mut missing = Vec::new();
    for (path, hash) in &current_files {
        match persisted_files.get(path) {
            Some(persisted_hash) if persisted_hash == hash => {}
            Some(_) => stale.push((*path).to_string()),
            None => missing.push((*path).to_string()),
        }
    }
    let extra: Vec<String> = persisted_files
        .keys()
        .filter(|path| !current_files.contains_key(*path))
        .map(|path| (*path).to_string())
        .collect();

    IndexReport {
        ok: stale.is_empty() && missing.is_empty() && extra.is_empty(),
        stale,
        missing,
        extra,
    }
}
