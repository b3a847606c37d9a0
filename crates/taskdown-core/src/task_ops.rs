use std::fs;
use std::path::Path;

use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::metadata;

static TASK_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*- \[)([ xX])(\]\s+)(.*)$").expect("regex"));

#[derive(Debug, Error)]
pub enum EditError {
    #[error("line {0} is out of range")]
    OutOfRange(usize),
    #[error("line {0} is not a task line")]
    NotATask(usize),
    #[error("edit IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Today's date in the `YYYY-MM-DD` form task metadata uses.
pub fn today_stamp() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

fn rewrite_line(
    text: &str,
    line_number: usize,
    f: impl FnOnce(&regex::Captures) -> String,
) -> Result<String, EditError> {
    let mut lines: Vec<String> = text.lines().map(|l| l.to_string()).collect();
    if line_number == 0 || line_number > lines.len() {
        return Err(EditError::OutOfRange(line_number));
    }
    let idx = line_number - 1;
    let caps = TASK_LINE
        .captures(&lines[idx])
        .ok_or(EditError::NotATask(line_number))?;
    lines[idx] = f(&caps);
    let mut rendered = lines.join("\n");
    if text.ends_with('\n') {
        rendered.push('\n');
    }
    Ok(rendered)
}

/// Flip the checkbox on one task line. The rest of the line, including its
/// metadata block, is left byte-for-byte intact.
pub fn set_completed(text: &str, line_number: usize, completed: bool) -> Result<String, EditError> {
    rewrite_line(text, line_number, |caps| {
        format!(
            "{}{}{}{}",
            &caps[1],
            if completed { "x" } else { " " },
            &caps[3],
            &caps[4]
        )
    })
}

/// Set (or with `None`, remove) one metadata key on a task line, rewriting
/// the trailing block through the codec. Existing keys keep their position;
/// new keys append at the end of the block.
pub fn upsert_metadata(
    text: &str,
    line_number: usize,
    key: &str,
    value: Option<&str>,
) -> Result<String, EditError> {
    rewrite_line(text, line_number, |caps| {
        let parsed = metadata::parse(&caps[4]);
        let mut pairs = parsed.pairs;
        match value {
            Some(value) => {
                match pairs.iter_mut().find(|(k, _)| k == key) {
                    Some(pair) => pair.1 = value.to_string(),
                    None => pairs.push((key.to_string(), value.to_string())),
                }
            }
            None => pairs.retain(|(k, _)| k != key),
        }
        let head = format!("{}{}{}", &caps[1], &caps[2], &caps[3]);
        if pairs.is_empty() {
            format!("{}{}", head, parsed.text)
        } else {
            format!("{}{} {}", head, parsed.text, metadata::serialize(&pairs))
        }
    })
}

pub fn set_completed_in_file(
    path: &Path,
    line_number: usize,
    completed: bool,
) -> Result<(), EditError> {
    let text = fs::read_to_string(path)?;
    let updated = set_completed(&text, line_number, completed)?;
    fs::write(path, updated)?;
    Ok(())
}

pub fn upsert_metadata_in_file(
    path: &Path,
    line_number: usize,
    key: &str,
    value: Option<&str>,
) -> Result<(), EditError> {
    let text = fs::read_to_string(path)?;
    let updated = upsert_metadata(&text, line_number, key, value)?;
    fs::write(path, updated)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FILE: &str = "# P [project:p]\n- [ ] One [id:1 due:2026-08-10]\n  - [x] Two [id:1.1]\n";

    #[test]
    fn set_completed_flips_only_the_checkbox() {
        let updated = set_completed(FILE, 2, true).expect("edit");
        assert_eq!(
            updated,
            "# P [project:p]\n- [x] One [id:1 due:2026-08-10]\n  - [x] Two [id:1.1]\n"
        );
        let reverted = set_completed(&updated, 3, false).expect("edit");
        assert!(reverted.contains("- [ ] Two [id:1.1]"));
    }

    #[test]
    fn upsert_replaces_in_place_and_appends_new_keys() {
        let updated = upsert_metadata(FILE, 2, "due", Some("2026-09-01")).expect("edit");
        assert!(updated.contains("- [ ] One [id:1 due:2026-09-01]"));
        let updated = upsert_metadata(&updated, 2, "updated", Some("2026-08-07")).expect("edit");
        assert!(updated.contains("- [ ] One [id:1 due:2026-09-01 updated:2026-08-07]"));
    }

    #[test]
    fn upsert_none_removes_the_key_and_can_drop_the_block() {
        let updated = upsert_metadata(FILE, 3, "id", None).expect("edit");
        assert!(updated.contains("  - [x] Two\n"));
    }

    #[test]
    fn upsert_adds_a_block_when_none_exists() {
        let text = "# P [project:p]\n- [ ] Bare task\n";
        let updated = upsert_metadata(text, 2, "id", Some("9")).expect("edit");
        assert!(updated.contains("- [ ] Bare task [id:9]"));
    }

    #[test]
    fn non_task_lines_are_rejected() {
        assert!(matches!(
            set_completed(FILE, 1, true),
            Err(EditError::NotATask(1))
        ));
        assert!(matches!(
            set_completed(FILE, 99, true),
            Err(EditError::OutOfRange(99))
        ));
    }

    #[test]
    fn missing_trailing_newline_is_preserved() {
        let text = "# P [project:p]\n- [ ] One [id:1]";
        let updated = set_completed(text, 2, true).expect("edit");
        assert_eq!(updated, "# P [project:p]\n- [x] One [id:1]");
    }
}
