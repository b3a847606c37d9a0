use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Index schema version. Bump when the persisted shape changes; readers
/// reject any other value instead of guessing.
pub const INDEX_VERSION: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    pub file_path: String,
    pub line_number: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaHeading {
    pub area: String,
    pub name: String,
    pub file_path: String,
    pub line_number: usize,
    pub heading_level: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionHeading {
    pub id: String,
    pub project_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub heading_level: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// `project:local`, unique across the whole index.
    pub global_id: String,
    pub local_id: String,
    pub project_id: String,
    pub text: String,
    pub completed: bool,
    /// Defaults to `"normal"` when the task carries no `energy:` metadata.
    pub energy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub est: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    pub file_path: String,
    pub line_number: usize,
    pub indent_level: usize,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children_ids: Vec<String>,
}

impl Task {
    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// One source file's entry in the index, with a content hash for staleness
/// checks against the persisted index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedFile {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub task_count: usize,
    pub hash: String,
}

/// The root aggregate. Always rebuilt wholesale from the markdown sources,
/// never patched in place; hierarchy links are string ids, so the value
/// serializes without cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskIndex {
    pub version: u32,
    pub generated_at: String,
    pub files: Vec<IndexedFile>,
    pub areas: BTreeMap<String, AreaHeading>,
    pub projects: BTreeMap<String, Project>,
    pub sections: BTreeMap<String, SectionHeading>,
    pub tasks: BTreeMap<String, Task>,
}

impl TaskIndex {
    /// Tasks ordered by source position (file path, then line), the order
    /// commands treat as "original" before any explicit sort.
    pub fn tasks_in_source_order(&self) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.values().collect();
        tasks.sort_by(|a, b| {
            (&a.file_path, a.line_number).cmp(&(&b.file_path, b.line_number))
        });
        tasks
    }
}

/// Compare dotted local ids numerically where possible: `1.2` sorts before
/// `1.10`, and a shorter prefix sorts before its extensions.
pub fn natural_id_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ordering = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(xn), Ok(yn)) => xn.cmp(&yn),
                    _ => x.cmp(y),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}
