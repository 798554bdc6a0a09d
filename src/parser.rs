//! Best-effort parsing of free-form backend output into typed records.
//!
//! The grammar is tolerant but bounded: a malformed record is dropped on
//! its own, never failing the batch, and none of these functions return
//! an error or panic. Total garbage input yields an empty result.

use std::collections::HashMap;

use crate::review::{CommentCategory, ReviewComment};

/// Lines the prompt templates embed as formatting instructions; backends
/// routinely echo them back, so they are never records.
const BOILERPLATE_PREFIXES: &[&str] = &["For example:", "Only include"];

const DEFAULT_SEVERITY: &str = "MEDIUM";

/// Minimum field count for a pipe-delimited comment record:
/// filePath|lineNumber|category|severity|comment[|suggestedFix].
const MIN_PIPE_FIELDS: usize = 5;

fn is_boilerplate(line: &str) -> bool {
    BOILERPLATE_PREFIXES
        .iter()
        .any(|prefix| line.starts_with(prefix))
}

/// Free-line mode: each line is either a pipe-delimited record or a
/// `path: issue` observation. Anything else is skipped.
pub fn parse_review_comments(response: &str) -> Vec<ReviewComment> {
    let mut comments = Vec::new();

    for raw_line in response.lines() {
        let line = raw_line.trim();
        if line.is_empty() || is_boilerplate(line) {
            continue;
        }

        if line.contains('|') {
            if let Some(comment) = parse_pipe_record(line) {
                comments.push(comment);
            }
            continue;
        }

        if let Some(comment) = parse_colon_record(line) {
            comments.push(comment);
        }
    }

    comments
}

fn parse_pipe_record(line: &str) -> Option<ReviewComment> {
    let parts: Vec<&str> = line.split('|').collect();
    if parts.len() < MIN_PIPE_FIELDS {
        return None;
    }

    // A line number that does not parse drops this record only.
    let line_number: u32 = parts[1].trim().parse().ok()?;

    let suggested_fix = if parts.len() > MIN_PIPE_FIELDS {
        let fix = parts[MIN_PIPE_FIELDS..].join("|").trim().to_string();
        if fix.is_empty() { None } else { Some(fix) }
    } else {
        None
    };

    Some(ReviewComment {
        file_path: parts[0].trim().to_string(),
        line_number: Some(line_number),
        category: CommentCategory::parse(parts[2]),
        severity: parts[3].trim().to_string(),
        body: parts[4].trim().to_string(),
        suggested_fix,
        resolved: false,
    })
}

fn parse_colon_record(line: &str) -> Option<ReviewComment> {
    let (file_path, body) = line.split_once(':')?;
    let file_path = file_path.trim();
    let body = body.trim();
    if file_path.is_empty() || body.is_empty() {
        return None;
    }

    Some(ReviewComment {
        file_path: file_path.to_string(),
        line_number: None,
        category: CommentCategory::Uncategorized,
        severity: DEFAULT_SEVERITY.to_string(),
        body: body.to_string(),
        suggested_fix: None,
        resolved: false,
    })
}

/// List mode: every non-blank line is one suggestion, in appearance
/// order, duplicates preserved.
pub fn parse_suggestion_list(response: &str) -> Vec<String> {
    response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Key-value mode for quality metrics: `NAME|score|explanation` maps
/// NAME to "score|explanation". Lines with fewer than three fields are
/// dropped.
pub fn parse_quality_metrics(response: &str) -> HashMap<String, String> {
    let mut metrics = HashMap::new();

    for line in response.lines() {
        let parts: Vec<&str> = line.split('|').collect();
        if parts.len() >= 3 {
            metrics.insert(
                parts[0].trim().to_string(),
                format!("{}|{}", parts[1].trim(), parts[2].trim()),
            );
        }
    }

    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_pipe_record_with_five_fields() {
        let response = "src/auth.rs|42|SECURITY|HIGH|Token is logged in plain text\n";
        let comments = parse_review_comments(response);
        assert_eq!(comments.len(), 1);
        let c = &comments[0];
        assert_eq!(c.file_path, "src/auth.rs");
        assert_eq!(c.line_number, Some(42));
        assert_eq!(c.category, CommentCategory::Security);
        assert_eq!(c.severity, "HIGH");
        assert_eq!(c.body, "Token is logged in plain text");
        assert_eq!(c.suggested_fix, None);
    }

    #[test]
    fn test_pipe_record_with_suggested_fix() {
        let response = "a.rs|7|STYLE|LOW|Long line|Wrap at 100 columns\n";
        let comments = parse_review_comments(response);
        assert_eq!(comments.len(), 1);
        assert_eq!(
            comments[0].suggested_fix.as_deref(),
            Some("Wrap at 100 columns")
        );
    }

    #[test]
    fn test_extra_pipes_fold_into_suggested_fix() {
        let response = "a.rs|7|LOGIC|HIGH|Off by one|use a..=b|not a..b\n";
        let comments = parse_review_comments(response);
        assert_eq!(
            comments[0].suggested_fix.as_deref(),
            Some("use a..=b|not a..b")
        );
    }

    #[test]
    fn test_short_pipe_record_is_skipped_without_affecting_siblings() {
        let response = "a.rs|1|LOGIC|HIGH|First\nb.rs|2|STYLE\nc.rs|3|LOGIC|LOW|Third\n";
        let comments = parse_review_comments(response);
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].file_path, "a.rs");
        assert_eq!(comments[1].file_path, "c.rs");
    }

    #[test]
    fn test_unparseable_line_number_drops_single_record() {
        let response = "a.rs|forty|LOGIC|HIGH|Bad line\nb.rs|2|LOGIC|LOW|Good line\n";
        let comments = parse_review_comments(response);
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].file_path, "b.rs");
    }

    #[test]
    fn test_colon_record_defaults() {
        // A bare `path: issue` observation carries no category or
        // severity token, so the fallbacks apply.
        let response = "Login.java: Missing null check for user input.\n";
        let comments = parse_review_comments(response);
        assert_eq!(comments.len(), 1);
        let c = &comments[0];
        assert_eq!(c.file_path, "Login.java");
        assert_eq!(c.body, "Missing null check for user input.");
        assert_eq!(c.category, CommentCategory::Uncategorized);
        assert_eq!(c.severity, "MEDIUM");
        assert_eq!(c.line_number, None);
    }

    #[test]
    fn test_boilerplate_lines_are_discarded() {
        let response = "For example: a.rs|1|LOGIC|HIGH|sample\n\
                        Only include lines in that exact format.\n\
                        real.rs|3|LOGIC|HIGH|Actual issue\n";
        let comments = parse_review_comments(response);
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].file_path, "real.rs");
    }

    #[test]
    fn test_prose_without_delimiters_is_skipped() {
        let comments = parse_review_comments("No comments needed.\n");
        assert!(comments.is_empty());
    }

    #[test]
    fn test_blank_response_yields_no_comments() {
        assert!(parse_review_comments("\n\n  \n").is_empty());
    }

    #[test]
    fn test_suggestion_list_preserves_order_and_duplicates() {
        let response = "Add a test for empty input\n\nCheck overflow\nCheck overflow\n";
        let suggestions = parse_suggestion_list(response);
        assert_eq!(
            suggestions,
            vec![
                "Add a test for empty input".to_string(),
                "Check overflow".to_string(),
                "Check overflow".to_string(),
            ]
        );
    }

    #[test]
    fn test_suggestion_list_of_blank_lines_is_empty() {
        assert!(parse_suggestion_list("\n   \n\t\n").is_empty());
    }

    #[test]
    fn test_quality_metrics_require_three_fields() {
        let response = "COMPLEXITY|7|High cyclomatic complexity\nMAINTAINABILITY|5\n";
        let metrics = parse_quality_metrics(response);
        assert_eq!(metrics.len(), 1);
        assert_eq!(
            metrics.get("COMPLEXITY").map(String::as_str),
            Some("7|High cyclomatic complexity")
        );
        assert!(!metrics.contains_key("MAINTAINABILITY"));
    }

    #[test]
    fn test_quality_metrics_ignore_extra_fields() {
        let metrics = parse_quality_metrics("SECURITY|9|Solid|extra|fields\n");
        assert_eq!(metrics.get("SECURITY").map(String::as_str), Some("9|Solid"));
    }

    proptest! {
        #[test]
        fn test_parsers_never_panic(response in any::<String>()) {
            parse_review_comments(&response);
            parse_suggestion_list(&response);
            parse_quality_metrics(&response);
        }

        #[test]
        fn test_suggestion_count_bounded_by_line_count(response in any::<String>()) {
            let suggestions = parse_suggestion_list(&response);
            prop_assert!(suggestions.len() <= response.lines().count());
        }
    }
}
