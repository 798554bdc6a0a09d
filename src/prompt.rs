//! Deterministic prompt rendering for each analysis task kind.
//!
//! The output-format contract embedded in each template is what the
//! parser module expects back; the two must move together.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Review,
    TestSuggestions,
    DocumentationSuggestions,
    RefactoringSuggestions,
    QualityAnalysis,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskKind::Review => "review",
            TaskKind::TestSuggestions => "test-suggestions",
            TaskKind::DocumentationSuggestions => "documentation-suggestions",
            TaskKind::RefactoringSuggestions => "refactoring-suggestions",
            TaskKind::QualityAnalysis => "quality-analysis",
        };
        write!(f, "{s}")
    }
}

/// Render the instruction string for one task. Plain interpolation only;
/// the same inputs always produce the same prompt.
pub fn build_prompt(kind: TaskKind, input: &str, context: &str, file_path: Option<&str>) -> String {
    let file_line = match file_path {
        Some(path) => format!("File under review: {path}\n\n"),
        None => String::new(),
    };

    match kind {
        TaskKind::Review => format!(
            "You are an expert code reviewer. Review the following code changes for \
             logic correctness, security vulnerabilities, performance issues, code style, \
             missing test coverage, documentation gaps, and refactoring opportunities.\n\n\
             Project context:\n{context}\n\n\
             {file_line}Code changes:\n{input}\n\n\
             Report one issue per line, with fields separated by `|`:\n\
             filePath|lineNumber|category|severity|comment|suggestedFix\n\
             For example: src/auth.rs|42|SECURITY|HIGH|Token is logged in plain text|Redact the token before logging\n\
             Only include lines in that exact format. The suggestedFix field is optional. \
             Valid categories: LOGIC, SECURITY, PERFORMANCE, STYLE, TEST_COVERAGE, \
             DOCUMENTATION, REFACTORING.\n\
             If the changes are clean, respond with: No comments needed."
        ),
        TaskKind::TestSuggestions => format!(
            "You are a testing expert. Suggest test cases for the following code changes.\n\n\
             Project context:\n{context}\n\n\
             {file_line}Code changes:\n{input}\n\n\
             Cover unit tests, edge cases, and integration scenarios. \
             Write exactly one suggestion per line, with no numbering and no blank lines \
             between suggestions."
        ),
        TaskKind::DocumentationSuggestions => format!(
            "You are a documentation expert. Suggest documentation improvements for the \
             following code changes.\n\n\
             Project context:\n{context}\n\n\
             {file_line}Code changes:\n{input}\n\n\
             Consider function documentation, module documentation, and usage examples. \
             Write exactly one suggestion per line, with no numbering and no blank lines \
             between suggestions."
        ),
        TaskKind::RefactoringSuggestions => format!(
            "You are a refactoring expert. Suggest refactoring improvements for the \
             following code changes.\n\n\
             Project context:\n{context}\n\n\
             {file_line}Code changes:\n{input}\n\n\
             Consider structure, duplication, naming, and design patterns. \
             Write exactly one suggestion per line, with no numbering and no blank lines \
             between suggestions."
        ),
        TaskKind::QualityAnalysis => format!(
            "Analyze the quality of the following code changes.\n\n\
             Project context:\n{context}\n\n\
             {file_line}Code changes:\n{input}\n\n\
             Respond with exactly these lines, where score is 1-10:\n\
             COMPLEXITY|score|explanation\n\
             MAINTAINABILITY|score|explanation\n\
             RELIABILITY|score|explanation\n\
             SECURITY|score|explanation\n\
             PERFORMANCE|score|explanation"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_are_deterministic() {
        let a = build_prompt(TaskKind::Review, "diff body", "a web service", None);
        let b = build_prompt(TaskKind::Review, "diff body", "a web service", None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_inputs_are_interpolated() {
        let prompt = build_prompt(
            TaskKind::QualityAnalysis,
            "fn main() {}",
            "CLI tool",
            Some("src/main.rs"),
        );
        assert!(prompt.contains("fn main() {}"));
        assert!(prompt.contains("CLI tool"));
        assert!(prompt.contains("File under review: src/main.rs"));
        assert!(prompt.contains("COMPLEXITY|score|explanation"));
    }

    #[test]
    fn test_review_prompt_matches_parser_contract() {
        let prompt = build_prompt(TaskKind::Review, "diff", "ctx", None);
        // The parser discards echoed instruction lines by these prefixes.
        assert!(prompt.contains("For example:"));
        assert!(prompt.contains("Only include"));
        assert!(prompt.contains("filePath|lineNumber|category|severity|comment|suggestedFix"));
    }

    #[test]
    fn test_file_line_omitted_when_absent() {
        let prompt = build_prompt(TaskKind::TestSuggestions, "diff", "ctx", None);
        assert!(!prompt.contains("File under review"));
    }
}
