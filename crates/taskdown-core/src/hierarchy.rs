use crate::scanner::{
    AreaHeadingRaw, FileScan, ProjectHeading, RawTask, ScanItem, UnclassifiedHeading,
};

/// A section heading with its project context and parent section resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSection {
    pub name: String,
    pub line_number: usize,
    pub heading_level: usize,
    pub project_id: Option<String>,
    /// Index of the enclosing section within the same file, if any.
    pub parent: Option<usize>,
}

/// A task with its file-local hierarchy resolved.
///
/// Parents and children are arena indices into [`FileHierarchy::tasks`];
/// translation into global ids happens in the index assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    pub raw: RawTask,
    pub project_id: Option<String>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileHierarchy {
    pub projects: Vec<ProjectHeading>,
    pub areas: Vec<AreaHeadingRaw>,
    pub sections: Vec<ResolvedSection>,
    pub unclassified: Vec<UnclassifiedHeading>,
    pub tasks: Vec<FileTask>,
}

/// Fold state threaded through the line walk.
///
/// `open` is a stack of arena indices for the tasks whose indentation is
/// still "open" above the current line; `section_open` is the analogous
/// stack for section headings keyed by heading level.
#[derive(Debug, Default)]
struct WalkState {
    current_project: Option<String>,
    open: Vec<usize>,
    section_open: Vec<usize>,
}

/// Resolve project context and parent/child links for one scanned file.
///
/// Tasks are stored in a flat arena in source order. For each task, entries
/// at an indent level >= the task's own are discarded from the open stack,
/// then the parent is the nearest remaining entry that carries a local id;
/// id-less entries stay on the stack so deeper tasks chain past them but
/// never resolve as anyone's parent. Every heading resets the stack, so task
/// nesting never crosses a heading boundary.
pub fn build_file_hierarchy(scan: FileScan) -> FileHierarchy {
    let mut out = FileHierarchy::default();
    let mut state = WalkState::default();

    for item in scan.items {
        match item {
            ScanItem::Project(heading) => {
                state.current_project = Some(heading.id.clone());
                state.open.clear();
                state.section_open.clear();
                out.projects.push(heading);
            }
            ScanItem::Area(heading) => {
                state.open.clear();
                out.areas.push(heading);
            }
            ScanItem::Section(heading) => {
                state.open.clear();
                while let Some(&top) = state.section_open.last() {
                    if out.sections[top].heading_level >= heading.heading_level {
                        state.section_open.pop();
                    } else {
                        break;
                    }
                }
                let parent = state.section_open.last().copied();
                out.sections.push(ResolvedSection {
                    name: heading.name,
                    line_number: heading.line_number,
                    heading_level: heading.heading_level,
                    project_id: state.current_project.clone(),
                    parent,
                });
                state.section_open.push(out.sections.len() - 1);
            }
            ScanItem::Unclassified(heading) => {
                state.open.clear();
                out.unclassified.push(heading);
            }
            ScanItem::Task(raw) => {
                let level = raw.indent_level;
                while let Some(&top) = state.open.last() {
                    if out.tasks[top].raw.indent_level >= level {
                        state.open.pop();
                    } else {
                        break;
                    }
                }
                let parent = state
                    .open
                    .iter()
                    .rev()
                    .find(|&&idx| out.tasks[idx].raw.local_id.is_some())
                    .copied();
                out.tasks.push(FileTask {
                    raw,
                    project_id: state.current_project.clone(),
                    parent,
                    children: Vec::new(),
                });
                state.open.push(out.tasks.len() - 1);
            }
        }
    }

    // Second pass: children in source order from the completed parent links.
    for idx in 0..out.tasks.len() {
        if let Some(parent) = out.tasks[idx].parent {
            out.tasks[parent].children.push(idx);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::scan_file;
    use pretty_assertions::assert_eq;

    fn hierarchy(text: &str) -> FileHierarchy {
        build_file_hierarchy(scan_file(text))
    }

    fn parents(h: &FileHierarchy) -> Vec<Option<usize>> {
        h.tasks.iter().map(|t| t.parent).collect()
    }

    #[test]
    fn indent_stack_resolves_parents() {
        let h = hierarchy(
            "# P [project:p]\n\
             - [ ] A [id:1]\n\
             \x20\x20- [ ] B [id:1.1]\n\
             \x20\x20- [ ] C [id:1.2]\n\
             \x20\x20\x20\x20- [ ] D [id:1.2.1]\n\
             - [ ] E [id:2]\n",
        );
        assert_eq!(parents(&h), vec![None, Some(0), Some(0), Some(2), None]);
        assert_eq!(h.tasks[0].children, vec![1, 2]);
        assert_eq!(h.tasks[2].children, vec![3]);
    }

    #[test]
    fn dedent_by_more_than_one_level_discards_deep_ancestors() {
        let h = hierarchy(
            "# P [project:p]\n\
             - [ ] A [id:1]\n\
             \x20\x20- [ ] B [id:1.1]\n\
             \x20\x20\x20\x20- [ ] C [id:1.1.1]\n\
             \x20- [ ] D [id:2]\n",
        );
        // D at indent 1 pops both B (2) and C (4); its parent is A.
        assert_eq!(parents(&h), vec![None, Some(0), Some(1), Some(0)]);
    }

    #[test]
    fn id_less_ancestor_occupies_the_stack_but_never_parents() {
        let h = hierarchy(
            "# P [project:p]\n\
             - [ ] A [id:1]\n\
             \x20\x20- [ ] anonymous\n\
             \x20\x20\x20\x20- [ ] C [id:1.9]\n",
        );
        // The anonymous task has no resolvable parent link of its own to give,
        // so C chains past it to A.
        assert_eq!(parents(&h), vec![None, Some(0), Some(0)]);
        assert_eq!(h.tasks[0].children, vec![1, 2]);
    }

    #[test]
    fn top_level_task_with_no_id_bearing_ancestor_has_no_parent() {
        let h = hierarchy("# P [project:p]\n\x20\x20- [ ] floating [id:1]\n");
        assert_eq!(parents(&h), vec![None]);
    }

    #[test]
    fn project_context_tracks_last_project_heading() {
        let h = hierarchy(
            "- [ ] orphan [id:0]\n\
             # A [project:a]\n\
             - [ ] first [id:1]\n\
             # B [project:b]\n\
             - [ ] second [id:1]\n",
        );
        assert_eq!(h.tasks[0].project_id, None);
        assert_eq!(h.tasks[1].project_id.as_deref(), Some("a"));
        assert_eq!(h.tasks[2].project_id.as_deref(), Some("b"));
    }

    #[test]
    fn headings_reset_task_nesting() {
        let h = hierarchy(
            "# A [project:a]\n\
             - [ ] one [id:1]\n\
             ## Later\n\
             \x20\x20- [ ] indented but unrelated [id:2]\n",
        );
        // Without the reset, task 2 would chain under task 1 across the heading.
        assert_eq!(parents(&h), vec![None, None]);
    }

    #[test]
    fn sections_nest_by_heading_level_within_a_project() {
        let h = hierarchy(
            "# A [project:a]\n\
             ## Alpha\n\
             ### Inner\n\
             ## Beta\n",
        );
        assert_eq!(h.sections.len(), 3);
        assert_eq!(h.sections[0].parent, None);
        assert_eq!(h.sections[1].parent, Some(0));
        assert_eq!(h.sections[2].parent, None);
        assert!(h
            .sections
            .iter()
            .all(|s| s.project_id.as_deref() == Some("a")));
    }
}
