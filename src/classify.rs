//! Changed-file filtering and pull request type classification.

use log::debug;
use regex::RegexSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::config::FilterConfig;
use crate::error::Result;
use crate::types::ChangedFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrType {
    Docs,
    Tests,
    Backend,
    Frontend,
    Unknown,
}

impl PrType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrType::Docs => "docs",
            PrType::Tests => "tests",
            PrType::Backend => "backend",
            PrType::Frontend => "frontend",
            PrType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Set the category only if none is set yet.
    Fill,
    /// Like `Fill`, and skip the remaining rules for this file.
    FillAndStop,
    /// Replace whatever category is set.
    Override,
}

struct Rule {
    matches: fn(&Path) -> bool,
    category: PrType,
    mode: Mode,
}

const DOC_DIRS: &[&str] = &["docs", "examples", "site"];
const DOC_EXTENSIONS: &[&str] = &["md", "rst", "adoc"];
const BACKEND_EXTENSIONS: &[&str] = &["go", "java", "cpp", "py", "c", "rs"];
const FRONTEND_EXTENSIONS: &[&str] = &["ts", "js", "html"];

/// Evaluated top to bottom for every file.
static RULES: &[Rule] = &[
    Rule {
        matches: in_doc_dir,
        category: PrType::Docs,
        mode: Mode::FillAndStop,
    },
    Rule {
        matches: mentions_tests,
        category: PrType::Tests,
        mode: Mode::FillAndStop,
    },
    Rule {
        matches: has_doc_extension,
        category: PrType::Docs,
        mode: Mode::Fill,
    },
    Rule {
        matches: has_backend_extension,
        category: PrType::Backend,
        mode: Mode::Override,
    },
    Rule {
        matches: has_frontend_extension,
        category: PrType::Frontend,
        mode: Mode::Override,
    },
];

fn in_doc_dir(path: &Path) -> bool {
    path.parent().map_or(false, |dir| {
        dir.components()
            .any(|c| DOC_DIRS.iter().any(|d| c.as_os_str() == *d))
    })
}

fn mentions_tests(path: &Path) -> bool {
    let path = path.to_string_lossy();
    path.contains("test") || path.contains("integration")
}

fn extension_in(path: &Path, table: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |ext| table.contains(&ext))
}

fn has_doc_extension(path: &Path) -> bool {
    extension_in(path, DOC_EXTENSIONS)
}

fn has_backend_extension(path: &Path) -> bool {
    extension_in(path, BACKEND_EXTENSIONS)
}

fn has_frontend_extension(path: &Path) -> bool {
    extension_in(path, FRONTEND_EXTENSIONS)
}

/// Guesses what kind of change a pull request is from its file paths.
pub fn classify<'a>(paths: impl IntoIterator<Item = &'a str>) -> PrType {
    let mut result: Option<PrType> = None;

    for name in paths {
        let path = Path::new(name);
        for rule in RULES {
            if !(rule.matches)(path) {
                continue;
            }
            match rule.mode {
                Mode::Fill | Mode::FillAndStop => {
                    result.get_or_insert(rule.category);
                }
                Mode::Override => result = Some(rule.category),
            }
            if rule.mode == Mode::FillAndStop {
                break;
            }
        }
        debug!("{}: {:?}", name, result);
    }

    result.unwrap_or(PrType::Unknown)
}

/// Decides which changed files count and how much.
#[derive(Debug, Clone)]
pub struct PathPolicy {
    ignore: RegexSet,
    truncate: RegexSet,
    truncate_lines: u64,
}

impl PathPolicy {
    pub fn new(config: &FilterConfig) -> Result<Self> {
        Ok(Self {
            ignore: RegexSet::new(&config.ignore_patterns)?,
            truncate: RegexSet::new(&config.truncate_patterns)?,
            truncate_lines: config.truncate_lines,
        })
    }

    pub fn is_ignored(&self, path: &str) -> bool {
        self.ignore.is_match(path)
    }

    pub fn retain(&self, files: Vec<ChangedFile>) -> Vec<ChangedFile> {
        files
            .into_iter()
            .filter(|f| {
                let ignored = self.is_ignored(&f.filename);
                if ignored {
                    debug!("ignoring {}", f.filename);
                }
                !ignored
            })
            .collect()
    }

    /// Added lines credited for a file; mostly-generated files are capped.
    pub fn credited_additions(&self, file: &ChangedFile) -> u64 {
        if self.truncate.is_match(&file.filename) && file.additions > self.truncate_lines {
            debug!(
                "truncating {} from {} to {} lines added",
                file.filename, file.additions, self.truncate_lines
            );
            self.truncate_lines
        } else {
            file.additions
        }
    }
}
