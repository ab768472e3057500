//! Question lists: command line, a questions file, or the built-in defaults.

use anyhow::{Context, bail};
use std::path::Path;

const ESSAY_QUESTIONS: &[&str] = &[
    "What did the author do growing up?",
    "What did the author do after his time at Y Combinator?",
    "Why did the author start Viaweb and what happened to it?",
];

const FILING_QUESTIONS: &[&str] = &[
    "What was the cost due to research and development v.s. sales and marketing for uber and lyft in 2019 in millions of USD? Give your answer as a JSON.",
];

const DOCS_QUESTIONS: &[&str] =
    &["How would you migrate an existing indexing system to llamaindex.io?"];

/// Built-in questions for a pipeline.
pub fn defaults(pipeline: &str) -> Vec<String> {
    let list = match pipeline {
        "metadata" => FILING_QUESTIONS,
        "agentic" => DOCS_QUESTIONS,
        _ => ESSAY_QUESTIONS,
    };
    list.iter().map(|q| q.to_string()).collect()
}

/// The questions to run and a name for where they came from.
///
/// Inline questions win over a file; a relative file path is looked up in
/// `questions_dir` first, then as given.
pub fn resolve(
    pipeline: &str,
    inline: &[String],
    file: Option<&Path>,
    questions_dir: &Path,
) -> anyhow::Result<(String, Vec<String>)> {
    if !inline.is_empty() {
        return Ok(("inline".to_string(), inline.to_vec()));
    }
    let Some(file) = file else {
        return Ok(("built-in".to_string(), defaults(pipeline)));
    };

    let candidate = questions_dir.join(file);
    let path = if file.is_relative() && candidate.exists() {
        candidate
    } else {
        file.to_path_buf()
    };
    let lines = aisearch_core::persistence::load_lines(&path)
        .with_context(|| format!("reading questions from {}", path.display()))?
        .with_context(|| format!("questions file {} not found", path.display()))?;
    let questions: Vec<String> = lines
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    if questions.is_empty() {
        bail!("questions file {} holds no questions", path.display());
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok((name, questions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_inline_questions_win() {
        let (source, questions) = resolve(
            "basic",
            &["Who bought Viaweb?".to_string()],
            Some(Path::new("ignored.txt")),
            Path::new("/nonexistent"),
        )
        .unwrap();
        assert_eq!(source, "inline");
        assert_eq!(questions, vec!["Who bought Viaweb?".to_string()]);
    }

    #[test]
    fn test_defaults_per_pipeline() {
        let (source, questions) = resolve("agentic", &[], None, Path::new(".")).unwrap();
        assert_eq!(source, "built-in");
        assert!(questions[0].contains("llamaindex.io"));
        assert_eq!(defaults("basic").len(), 3);
    }

    #[test]
    fn test_file_in_questions_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("scenario-based.txt"),
            "What is a node?\n\n  What is an index?  \n",
        )
        .unwrap();
        let (source, questions) = resolve(
            "basic",
            &[],
            Some(Path::new("scenario-based.txt")),
            dir.path(),
        )
        .unwrap();
        assert_eq!(source, "scenario-based.txt");
        assert_eq!(questions, vec!["What is a node?", "What is an index?"]);
    }

    #[test]
    fn test_missing_or_empty_file_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(resolve("basic", &[], Some(Path::new("missing.txt")), dir.path()).is_err());
        std::fs::write(dir.path().join("empty.txt"), "\n").unwrap();
        assert!(resolve("basic", &[], Some(Path::new("empty.txt")), dir.path()).is_err());
    }
}
