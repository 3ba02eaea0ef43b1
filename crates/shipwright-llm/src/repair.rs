//! Structural repair of JSON embedded in model output.
//!
//! Models wrap JSON in prose, code fences, or trailing commentary. Strategies
//! run in a fixed order and the first one that yields valid JSON wins:
//!
//! 1. strict parse of the trimmed text
//! 2. first balanced `{...}` span (string- and escape-aware bracket counting)
//! 3. greedy `{.*}` match: first `{` to last `}`
//! 4. line scan from the first line with `{` to the line that closes the outermost brace

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Which strategy produced the accepted value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStrategy {
    Strict,
    BalancedBraces,
    GreedyBraces,
    LineScan,
}

static GREEDY_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// Parse `raw` as JSON, repairing it if needed.
#[must_use]
pub fn parse_json(raw: &str) -> Option<(Value, RepairStrategy)> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some((value, RepairStrategy::Strict));
    }

    let candidates: [(RepairStrategy, fn(&str) -> Option<&str>); 3] = [
        (RepairStrategy::BalancedBraces, first_balanced_object),
        (RepairStrategy::GreedyBraces, greedy_object),
        (RepairStrategy::LineScan, line_scan_object),
    ];

    candidates.into_iter().find_map(|(strategy, extract)| {
        let span = extract(raw)?;
        serde_json::from_str::<Value>(span)
            .ok()
            .map(|value| (value, strategy))
    })
}

/// First `{...}` span whose braces balance, ignoring braces inside strings.
fn first_balanced_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in raw[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Some(&raw[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}

fn greedy_object(raw: &str) -> Option<&str> {
    GREEDY_OBJECT.find(raw).map(|m| m.as_str())
}

/// Lines from the first one containing `{` through the one that brings the
/// naive brace count back to zero, trimmed to the outer braces.
fn line_scan_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth: i64 = 0;
    let mut pos = start;

    for line in raw[start..].split_inclusive('\n') {
        for ch in line.chars() {
            match ch {
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
        }
        pos += line.len();
        if depth <= 0 {
            let block = &raw[start..pos];
            let end = block.rfind('}')?;
            return Some(&block[..=end]);
        }
    }
    None
}
