use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::hierarchy::build_file_hierarchy;
use crate::index::Warning;
use crate::metadata;
use crate::scanner::{scan_file, ScanItem};

/// The stricter checks the indexing path deliberately skips: the codec drops
/// malformed tokens silently, the scanner leaves unclassifiable headings
/// alone, and dotted-id/indentation mismatches are tolerated. Lint surfaces
/// all of them as findings without ever failing.
pub fn lint_source(path: &str, text: &str) -> Vec<Warning> {
    let mut findings = Vec::new();
    let scan = scan_file(text);

    for item in &scan.items {
        let line_number = item.line_number();
        let source_line = text.lines().nth(line_number - 1).unwrap_or("");
        if let Some(tokens) = metadata::raw_tokens(source_line) {
            for token in tokens {
                let malformed = match token.split_once(':') {
                    Some((key, value)) => key.is_empty() || value.is_empty(),
                    None => true,
                };
                if malformed {
                    findings.push(Warning::new(
                        path,
                        line_number,
                        format!("malformed metadata token `{}` is ignored", token),
                    ));
                }
            }
        }
        if let ScanItem::Unclassified(heading) = item {
            findings.push(Warning::new(
                path,
                heading.line_number,
                format!(
                    "heading `{}` has metadata but names neither project: nor area:",
                    heading.name
                ),
            ));
        }
    }

    let hierarchy = build_file_hierarchy(scan);

    // Dotted local ids suggest nesting; flag where the suggestion disagrees
    // with what the indentation actually produced.
    for task in &hierarchy.tasks {
        let Some(local_id) = task.raw.local_id.as_deref() else {
            continue;
        };
        let Some((implied_parent, _)) = local_id.rsplit_once('.') else {
            continue;
        };
        let actual_parent = task
            .parent
            .and_then(|idx| hierarchy.tasks[idx].raw.local_id.as_deref());
        if actual_parent != Some(implied_parent) {
            let actual = actual_parent.unwrap_or("none");
            findings.push(Warning::new(
                path,
                task.raw.line_number,
                format!(
                    "id `{}` implies parent `{}` but indentation gives `{}`",
                    local_id, implied_parent, actual
                ),
            ));
        }
    }

    // Duplicate local ids inside one project within this file.
    let mut seen: HashMap<(String, String), usize> = HashMap::new();
    for task in &hierarchy.tasks {
        let (Some(project), Some(local)) = (task.project_id.clone(), task.raw.local_id.clone())
        else {
            continue;
        };
        match seen.get(&(project.clone(), local.clone())) {
            Some(first_line) => findings.push(Warning::new(
                path,
                task.raw.line_number,
                format!(
                    "duplicate id `{}` in project `{}` (first used on line {})",
                    local, project, first_line
                ),
            )),
            None => {
                seen.insert((project, local), task.raw.line_number);
            }
        }
    }

    findings.sort_by_key(|w| w.line);
    findings
}

/// Lint a set of files from disk; unreadable files are reported as findings.
pub fn lint_files(paths: &[PathBuf]) -> Vec<Warning> {
    let mut findings = Vec::new();
    for path in paths {
        let label = path.to_string_lossy().to_string();
        match fs::read_to_string(path) {
            Ok(text) => findings.extend(lint_source(&label, &text)),
            Err(err) => findings.push(Warning::new(&label, None, format!("failed to read: {err}"))),
        }
    }
    findings
}
