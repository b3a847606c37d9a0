use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Value;

use crate::metadata;

static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.+)$").expect("regex"));
static CHECKBOX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*)- \[([ xX])\]\s+(.+)$").expect("regex"));

/// A project-declaring heading: `# Name [project:slug]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectHeading {
    pub id: String,
    pub name: String,
    pub area: Option<String>,
    pub line_number: usize,
    pub heading_level: usize,
}

/// An area-declaring heading: `# Name [area:slug]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaHeadingRaw {
    pub area: String,
    pub name: String,
    pub line_number: usize,
    pub heading_level: usize,
}

/// A heading without metadata, a purely organizational subdivision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeadingRaw {
    pub name: String,
    pub line_number: usize,
    pub heading_level: usize,
}

/// A heading whose metadata names neither `project:` nor `area:`.
///
/// The scanner does not classify these; they are kept so lint can flag them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnclassifiedHeading {
    pub name: String,
    pub pairs: Vec<(String, String)>,
    pub line_number: usize,
    pub heading_level: usize,
}

/// A checkbox line before hierarchy resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTask {
    pub text: String,
    pub completed: bool,
    /// Literal count of leading whitespace characters; a tab counts as one.
    pub indent_level: usize,
    pub local_id: Option<String>,
    pub metadata: Vec<(String, String)>,
    pub line_number: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanItem {
    Project(ProjectHeading),
    Area(AreaHeadingRaw),
    Section(SectionHeadingRaw),
    Unclassified(UnclassifiedHeading),
    Task(RawTask),
}

impl ScanItem {
    pub fn line_number(&self) -> usize {
        match self {
            ScanItem::Project(h) => h.line_number,
            ScanItem::Area(h) => h.line_number,
            ScanItem::Section(h) => h.line_number,
            ScanItem::Unclassified(h) => h.line_number,
            ScanItem::Task(t) => t.line_number,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileScan {
    /// Flat scalar frontmatter entries; empty when absent or malformed.
    pub frontmatter: BTreeMap<String, Value>,
    pub items: Vec<ScanItem>,
}

impl FileScan {
    pub fn frontmatter_str(&self, key: &str) -> Option<&str> {
        self.frontmatter.get(key).and_then(|value| value.as_str())
    }
}

/// Scan one file's text into classified line items.
///
/// Pure function of the text. Line numbers are 1-based positions in the
/// original text, frontmatter included, so edit operations can address lines
/// directly. Malformed frontmatter degrades to "no frontmatter".
pub fn scan_file(text: &str) -> FileScan {
    let lines: Vec<&str> = text.lines().collect();
    let (frontmatter, body_start) = parse_frontmatter(&lines);

    let mut items = Vec::new();
    for (idx, line) in lines.iter().enumerate().skip(body_start) {
        let line_number = idx + 1;
        if let Some(caps) = CHECKBOX.captures(line) {
            let indent = caps.get(1).map(|m| m.as_str().chars().count()).unwrap_or(0);
            let marker = caps.get(2).map(|m| m.as_str()).unwrap_or(" ");
            let body = caps.get(3).map(|m| m.as_str()).unwrap_or("");
            let parsed = metadata::parse(body);
            let local_id = metadata::get(&parsed.pairs, "id").map(|v| v.to_string());
            items.push(ScanItem::Task(RawTask {
                text: parsed.text,
                completed: marker.eq_ignore_ascii_case("x"),
                indent_level: indent,
                local_id,
                metadata: parsed.pairs,
                line_number,
            }));
            continue;
        }
        if let Some(caps) = HEADING.captures(line) {
            let level = caps.get(1).map(|m| m.as_str().len()).unwrap_or(1);
            let body = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            items.push(classify_heading(body, level, line_number));
        }
    }

    FileScan { frontmatter, items }
}

fn classify_heading(body: &str, heading_level: usize, line_number: usize) -> ScanItem {
    let parsed = metadata::parse(body);
    if !parsed.has_metadata {
        return ScanItem::Section(SectionHeadingRaw {
            name: parsed.text,
            line_number,
            heading_level,
        });
    }
    if let Some(project) = metadata::get(&parsed.pairs, "project") {
        return ScanItem::Project(ProjectHeading {
            id: project.to_string(),
            name: parsed.text,
            area: metadata::get(&parsed.pairs, "area").map(|v| v.to_string()),
            line_number,
            heading_level,
        });
    }
    if let Some(area) = metadata::get(&parsed.pairs, "area") {
        return ScanItem::Area(AreaHeadingRaw {
            area: area.to_string(),
            name: parsed.text,
            line_number,
            heading_level,
        });
    }
    ScanItem::Unclassified(UnclassifiedHeading {
        name: parsed.text,
        pairs: parsed.pairs,
        line_number,
        heading_level,
    })
}

/// Returns the frontmatter map and the 0-based index of the first body line.
///
/// Only flat scalar values survive; nested values are ignored. Any parse
/// failure yields an empty map and a body starting at line 0.
fn parse_frontmatter(lines: &[&str]) -> (BTreeMap<String, Value>, usize) {
    if lines.first().map(|l| l.trim()) != Some("---") {
        return (BTreeMap::new(), 0);
    }
    let Some(end) = lines
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, line)| line.trim() == "---")
        .map(|(idx, _)| idx)
    else {
        return (BTreeMap::new(), 0);
    };

    let block = lines[1..end].join("\n");
    let Ok(Value::Mapping(map)) = serde_yaml::from_str::<Value>(&block) else {
        return (BTreeMap::new(), end + 1);
    };

    let mut frontmatter = BTreeMap::new();
    for (key, value) in map {
        let Value::String(key) = key else { continue };
        match value {
            Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                frontmatter.insert(key, value);
            }
            _ => {}
        }
    }
    (frontmatter, end + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn classifies_project_area_and_section_headings() {
        let text = "# Ops [area:ops]\n## Deploys [project:deploy area:ops]\n### Backlog\n";
        let scan = scan_file(text);
        assert_eq!(scan.items.len(), 3);
        match &scan.items[0] {
            ScanItem::Area(area) => {
                assert_eq!(area.area, "ops");
                assert_eq!(area.name, "Ops");
                assert_eq!(area.heading_level, 1);
            }
            other => panic!("expected area, got {other:?}"),
        }
        match &scan.items[1] {
            ScanItem::Project(project) => {
                assert_eq!(project.id, "deploy");
                assert_eq!(project.area.as_deref(), Some("ops"));
                assert_eq!(project.line_number, 2);
            }
            other => panic!("expected project, got {other:?}"),
        }
        match &scan.items[2] {
            ScanItem::Section(section) => assert_eq!(section.name, "Backlog"),
            other => panic!("expected section, got {other:?}"),
        }
    }

    #[test]
    fn heading_with_unrelated_metadata_is_unclassified() {
        let scan = scan_file("# Weird [color:red]\n");
        match &scan.items[0] {
            ScanItem::Unclassified(heading) => {
                assert_eq!(heading.name, "Weird");
                assert_eq!(heading.pairs, vec![("color".to_string(), "red".to_string())]);
            }
            other => panic!("expected unclassified, got {other:?}"),
        }
    }

    #[test]
    fn parses_checkbox_tasks_with_indent_and_state() {
        let text = "- [ ] Top [id:1]\n  - [x] Child [id:1.1 energy:low]\n\t- [X] Tab child\n";
        let scan = scan_file(text);
        let tasks: Vec<&RawTask> = scan
            .items
            .iter()
            .filter_map(|item| match item {
                ScanItem::Task(task) => Some(task),
                _ => None,
            })
            .collect();
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].indent_level, 0);
        assert!(!tasks[0].completed);
        assert_eq!(tasks[0].local_id.as_deref(), Some("1"));
        assert_eq!(tasks[0].text, "Top");
        assert_eq!(tasks[1].indent_level, 2);
        assert!(tasks[1].completed);
        // A tab is a single whitespace character, not an expanded width.
        assert_eq!(tasks[2].indent_level, 1);
        assert!(tasks[2].completed);
        assert_eq!(tasks[2].local_id, None);
    }

    #[test]
    fn frontmatter_is_stripped_but_line_numbers_stay_absolute() {
        let text = "---\ntitle: Inbox\npriority: 3\n---\n# P [project:p]\n- [ ] T [id:1]\n";
        let scan = scan_file(text);
        assert_eq!(scan.frontmatter_str("title"), Some("Inbox"));
        assert_eq!(
            scan.frontmatter.get("priority").and_then(|v| v.as_i64()),
            Some(3)
        );
        assert_eq!(scan.items[0].line_number(), 5);
        assert_eq!(scan.items[1].line_number(), 6);
    }

    #[test]
    fn unterminated_frontmatter_degrades_to_no_frontmatter() {
        let text = "---\ntitle: Inbox\n- [ ] T [id:1]\n";
        let scan = scan_file(text);
        assert!(scan.frontmatter.is_empty());
        // The opening --- is treated as plain text and the task still scans.
        assert_eq!(scan.items.len(), 1);
        assert_eq!(scan.items[0].line_number(), 3);
    }

    #[test]
    fn malformed_yaml_frontmatter_is_ignored_but_still_skipped() {
        let text = "---\n: [unbalanced\n---\n- [ ] T [id:1]\n";
        let scan = scan_file(text);
        assert!(scan.frontmatter.is_empty());
        assert_eq!(scan.items.len(), 1);
        assert_eq!(scan.items[0].line_number(), 4);
    }

    #[test]
    fn nested_frontmatter_values_are_dropped() {
        let text = "---\ntitle: Inbox\nmeta:\n  nested: true\n---\n";
        let scan = scan_file(text);
        assert_eq!(scan.frontmatter_str("title"), Some("Inbox"));
        assert!(!scan.frontmatter.contains_key("meta"));
    }

    #[test]
    fn non_task_non_heading_lines_are_ignored() {
        let text = "Some prose.\n- a plain bullet\n* [ ] not our checkbox style\n";
        let scan = scan_file(text);
        assert!(scan.items.is_empty());
    }
}
