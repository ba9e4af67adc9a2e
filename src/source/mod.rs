//! KIF file loading.
//!
//! A source file is UTF-8 text of top-level S-expressions separated by
//! arbitrary whitespace, with `;` line comments. The loader accumulates
//! characters until parenthesis depth returns to zero, then parses and
//! submits each block; malformed blocks are skipped with a warning so
//! one bad expression cannot poison a whole file.

use std::path::Path;

use thiserror::Error;
use tracing::warn;

use crate::engine::Engine;
use crate::kb::NoteId;
use crate::term::parse_all;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// One skipped block and why.
#[derive(Debug, Clone)]
pub struct LoadIssue {
    /// 1-based line where the block starts.
    pub line: u32,
    pub message: String,
}

/// Outcome of loading a file or string of KIF.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Terms submitted to the engine.
    pub submitted: usize,
    /// Blocks skipped as malformed.
    pub skipped: Vec<LoadIssue>,
}

/// Load KIF from a file and submit every well-formed top-level term.
pub fn load_kif_file(
    engine: &Engine,
    path: impl AsRef<Path>,
    source: &str,
    note: Option<NoteId>,
) -> Result<LoadReport, SourceError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|error| SourceError::Io {
        path: path.display().to_string(),
        source: error,
    })?;
    Ok(load_kif_str(engine, &text, source, note))
}

/// Load KIF from a string. Malformed blocks are recorded and skipped.
pub fn load_kif_str(
    engine: &Engine,
    text: &str,
    source: &str,
    note: Option<NoteId>,
) -> LoadReport {
    let mut report = LoadReport::default();
    for block in split_blocks(text) {
        match parse_all(&block.text) {
            Ok(terms) => {
                for term in terms {
                    engine.submit_term(term, source, note.clone());
                    report.submitted += 1;
                }
            }
            Err(error) => {
                warn!(line = block.line, %error, "skipping malformed block");
                report.skipped.push(LoadIssue {
                    line: block.line,
                    message: error.to_string(),
                });
            }
        }
    }
    report
}

struct Block {
    line: u32,
    text: String,
}

/// Split input into top-level blocks: runs of text over which the
/// parenthesis depth returns to zero, respecting strings and comments.
fn split_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut current = String::new();
    let mut start_line = 1u32;
    let mut line = 1u32;
    let mut depth: i64 = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut in_comment = false;

    for c in text.chars() {
        if c == '\n' {
            line += 1;
            in_comment = false;
        }
        if in_comment {
            current.push(c);
            continue;
        }
        if in_string {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            ';' => {
                in_comment = true;
                current.push(c);
            }
            '"' => {
                in_string = true;
                current.push(c);
            }
            '(' => {
                if depth == 0 && current.trim().is_empty() {
                    current.clear();
                    start_line = line;
                }
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth -= 1;
                current.push(c);
                if depth <= 0 {
                    blocks.push(Block {
                        line: start_line,
                        text: std::mem::take(&mut current),
                    });
                    depth = 0;
                }
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        blocks.push(Block {
            line: start_line,
            text: current,
        });
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_top_level_blocks() {
        let blocks = split_blocks("(p A)\n(q (r B))\n");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].text.trim(), "(p A)");
        assert_eq!(blocks[1].text.trim(), "(q (r B))");
        assert_eq!(blocks[1].line, 2);
    }

    #[test]
    fn comments_and_strings_do_not_affect_depth() {
        let blocks = split_blocks("(p \"a ) b\") ; (not a block\n(q B)");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].text.trim(), "(p \"a ) b\")");
    }

    #[test]
    fn unbalanced_tail_is_kept_as_a_block() {
        let blocks = split_blocks("(p A) (q");
        assert_eq!(blocks.len(), 2);
    }
}
