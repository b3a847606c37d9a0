use once_cell::sync::Lazy;
use regex::Regex;

static TRAILING_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\[\]]*)\]\s*$").expect("regex"));

/// Result of stripping the trailing `[key:value ...]` block off a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMetadata {
    /// Key/value pairs in source order.
    pub pairs: Vec<(String, String)>,
    /// The line with the metadata block removed, right-trimmed.
    pub text: String,
    /// Whether a trailing `[...]` group was present at all.
    pub has_metadata: bool,
}

/// Parse a single trailing `[key:value ...]` group off `line`.
///
/// Tokens inside the block are split on whitespace and each token at its
/// first `:`. Tokens without a colon, or with an empty key or value, are
/// dropped silently; flagging them is the lint module's job.
pub fn parse(line: &str) -> ParsedMetadata {
    let Some(caps) = TRAILING_BLOCK.captures(line) else {
        return ParsedMetadata {
            pairs: Vec::new(),
            text: line.trim_end().to_string(),
            has_metadata: false,
        };
    };

    let whole = caps.get(0).expect("capture 0");
    let interior = caps.get(1).map(|m| m.as_str()).unwrap_or("");

    let mut pairs = Vec::new();
    for token in interior.split_whitespace() {
        let Some((key, value)) = token.split_once(':') else {
            continue;
        };
        if key.is_empty() || value.is_empty() {
            continue;
        }
        pairs.push((key.to_string(), value.to_string()));
    }

    ParsedMetadata {
        pairs,
        text: line[..whole.start()].trim_end().to_string(),
        has_metadata: true,
    }
}

/// Re-emit a `[k:v ...]` block in the order the caller supplies.
///
/// Pairs with an empty value are omitted. Round-trip identity is only
/// guaranteed for pair lists produced by [`parse`].
pub fn serialize(pairs: &[(String, String)]) -> String {
    let body = pairs
        .iter()
        .filter(|(key, value)| !key.is_empty() && !value.is_empty())
        .map(|(key, value)| format!("{}:{}", key, value))
        .collect::<Vec<_>>()
        .join(" ");
    format!("[{}]", body)
}

/// The raw whitespace-split tokens of the trailing block, if one exists.
/// [`parse`] drops malformed tokens silently; lint uses this to flag them.
pub fn raw_tokens(line: &str) -> Option<Vec<String>> {
    let caps = TRAILING_BLOCK.captures(line)?;
    let interior = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    Some(interior.split_whitespace().map(|t| t.to_string()).collect())
}

/// Look up the first value for `key` in a pair list.
pub fn get<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_trailing_block_and_strips_text() {
        let parsed = parse("Write the report [id:1.2 due:2026-08-10 energy:low]");
        assert!(parsed.has_metadata);
        assert_eq!(parsed.text, "Write the report");
        assert_eq!(
            parsed.pairs,
            vec![
                ("id".to_string(), "1.2".to_string()),
                ("due".to_string(), "2026-08-10".to_string()),
                ("energy".to_string(), "low".to_string()),
            ]
        );
    }

    #[test]
    fn only_the_trailing_group_is_metadata() {
        let parsed = parse("See [the docs] first [id:3]");
        assert_eq!(parsed.text, "See [the docs] first");
        assert_eq!(parsed.pairs, vec![("id".to_string(), "3".to_string())]);
    }

    #[test]
    fn no_block_means_no_metadata() {
        let parsed = parse("Plain text line");
        assert!(!parsed.has_metadata);
        assert!(parsed.pairs.is_empty());
        assert_eq!(parsed.text, "Plain text line");
    }

    #[test]
    fn malformed_tokens_are_dropped_silently() {
        let parsed = parse("Task [id:1 nonsense :empty-key empty-value: ok:yes]");
        assert!(parsed.has_metadata);
        assert_eq!(
            parsed.pairs,
            vec![
                ("id".to_string(), "1".to_string()),
                ("ok".to_string(), "yes".to_string()),
            ]
        );
    }

    #[test]
    fn value_keeps_colons_after_the_first() {
        let parsed = parse("Task [at:12:30]");
        assert_eq!(parsed.pairs, vec![("at".to_string(), "12:30".to_string())]);
    }

    #[test]
    fn serialize_round_trips_parse_output() {
        let parsed = parse("Task [id:1 bucket:today tags:a,b]");
        let rendered = serialize(&parsed.pairs);
        assert_eq!(rendered, "[id:1 bucket:today tags:a,b]");
        let reparsed = parse(&format!("Task {}", rendered));
        assert_eq!(reparsed.pairs, parsed.pairs);
    }

    #[test]
    fn serialize_omits_empty_values() {
        let pairs = vec![
            ("id".to_string(), "1".to_string()),
            ("due".to_string(), String::new()),
        ];
        assert_eq!(serialize(&pairs), "[id:1]");
    }

    #[test]
    fn get_returns_first_match() {
        let parsed = parse("Task [id:1 id:2]");
        assert_eq!(get(&parsed.pairs, "id"), Some("1"));
        assert_eq!(get(&parsed.pairs, "missing"), None);
    }
}
