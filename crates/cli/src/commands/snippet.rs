//! Condense raw failure output into the snippet posted to the run thread

use anyhow::Context;
use clap::Args;
use std::io::Read;
use std::path::PathBuf;
use testrelay_common::snippet::{truncate_snippet, THREAD_SNIPPET_LIMIT};
use testrelay_common::extract_snippet;
use testrelay_reporter::context::api_failure_message;

#[derive(Args, Debug, Clone)]
pub struct SnippetArgs {
    /// Files holding raw error text, one error per file (`-` or none reads stdin)
    pub files: Vec<PathBuf>,

    /// Render the full thread message for this test title
    #[arg(long)]
    pub title: Option<String>,
}

fn read_errors(files: &[PathBuf]) -> anyhow::Result<Vec<String>> {
    if files.is_empty() || files.iter().all(|f| f.as_os_str() == "-") {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return Ok(vec![text]);
    }

    files
        .iter()
        .filter(|f| f.as_os_str() != "-")
        .map(|f| {
            std::fs::read_to_string(f).with_context(|| format!("reading {}", f.display()))
        })
        .collect()
}

/// Snippet text, or the full thread message when a title is given
pub fn render(errors: &[String], title: Option<&str>) -> String {
    match title {
        Some(title) => api_failure_message(title, None, errors),
        None => truncate_snippet(extract_snippet(errors).trim(), THREAD_SNIPPET_LIMIT),
    }
}

pub fn execute(args: SnippetArgs) -> anyhow::Result<()> {
    let errors = read_errors(&args.files)?;
    println!("{}", render(&errors, args.title.as_deref()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASSERTION: &str = "\u{1b}[2mexpect(\u{1b}[22mreceived\u{1b}[2m).\u{1b}[22mtoBe\n\
Error: expect(received).toBe(expected)\n\
\n\
Expected: 200\n\
Received: 500\n\
    at tests/api.spec.ts:12:5";

    #[test]
    fn test_render_condenses_assertion() {
        let errors = vec![ASSERTION.to_string()];
        assert_eq!(
            render(&errors, None),
            "Error: expect(received).toBe(expected)\nExpected: 200\nReceived: 500"
        );
    }

    #[test]
    fn test_render_with_title_builds_thread_message() {
        let errors = vec![ASSERTION.to_string()];
        let message = render(&errors, Some("orders api"));
        assert!(message.starts_with("❌ **orders api**\n```\nError: expect"));
        assert!(message.ends_with("Received: 500\n```"));
    }

    #[test]
    fn test_read_errors_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, "first").unwrap();
        std::fs::write(&b, "second").unwrap();

        let errors = read_errors(&[a, b]).unwrap();
        assert_eq!(errors, vec!["first".to_string(), "second".to_string()]);
        assert!(read_errors(&[dir.path().join("missing.txt")]).is_err());
    }
}
