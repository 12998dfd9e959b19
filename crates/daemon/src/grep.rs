//! Ripgrep subprocess adapter (spec §6, §9 design notes).
//!
//! Spawn with captured stdout, collect to end, parse after close — the
//! pattern spec §9 calls out for "subprocess + stream parsing".

use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct GrepHit {
    pub path: String,
    pub line: usize,
    pub column: usize,
    pub text: String,
}

/// `rg --color=never --no-heading --line-number --column -w <pattern> <workspace>`.
/// Exit code 1 means "no match" and is not an error; anything else non-zero
/// yields an empty result.
pub async fn run_grep(pattern: &str, workspace: &std::path::Path) -> Vec<GrepHit> {
    let output = Command::new("rg")
        .arg("--color=never")
        .arg("--no-heading")
        .arg("--line-number")
        .arg("--column")
        .arg("-w")
        .arg(pattern)
        .arg(workspace)
        .output()
        .await;

    let output = match output {
        Ok(o) => o,
        Err(err) => {
            tracing::warn!(error = %err, "failed to spawn rg");
            return Vec::new();
        }
    };

    match output.status.code() {
        Some(0) => {}
        Some(1) => return Vec::new(),
        _ => {
            tracing::warn!(
                stderr = %String::from_utf8_lossy(&output.stderr),
                "rg exited with an error"
            );
            return Vec::new();
        }
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout.lines().filter_map(parse_grep_line).collect()
}

/// Parse `path:line:col:text`, tolerating a Windows drive-letter colon
/// (`C:\foo\bar.rs:12:4:...`) in the first field.
fn parse_grep_line(line: &str) -> Option<GrepHit> {
    let mut rest = line;
    let mut drive_prefix = String::new();

    if rest.len() >= 2 && rest.as_bytes()[1] == b':' && rest.as_bytes()[0].is_ascii_alphabetic() {
        drive_prefix = rest[..2].to_string();
        rest = &rest[2..];
    }

    let mut parts = rest.splitn(3, ':');
    let path_part = parts.next()?;
    let line_part = parts.next()?;
    let rest_part = parts.next()?;

    let (col_str, text) = rest_part.split_once(':')?;
    let line_no: usize = line_part.parse().ok()?;
    let column: usize = col_str.parse().ok()?;

    Some(GrepHit {
        path: format!("{drive_prefix}{path_part}"),
        line: line_no,
        column,
        text: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_line() {
        let hit = parse_grep_line("src/a.ts:12:4:takeDamage()").unwrap();
        assert_eq!(hit.path, "src/a.ts");
        assert_eq!(hit.line, 12);
        assert_eq!(hit.column, 4);
        assert_eq!(hit.text, "takeDamage()");
    }

    #[test]
    fn parses_windows_drive_letter_path() {
        let hit = parse_grep_line(r"C:\proj\src\a.ts:12:4:takeDamage()").unwrap();
        assert_eq!(hit.path, r"C:\proj\src\a.ts");
        assert_eq!(hit.line, 12);
        assert_eq!(hit.column, 4);
    }

    #[test]
    fn rejects_malformed_line() {
        assert!(parse_grep_line("not a grep line").is_none());
    }
}
