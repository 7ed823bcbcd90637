//! Where sensitive-word lists come from.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{GuardError, Result};

/// Loads the keyword list for a named source.
#[async_trait]
pub trait WordSource: Send + Sync {
    /// Return every keyword of `source`. Order does not matter.
    async fn load(&self, source: &str) -> Result<Vec<String>>;
}

/// In-memory word lists, mainly for tests and the `scan` command.
#[derive(Debug, Default, Clone)]
pub struct StaticWordSource {
    lists: HashMap<String, Vec<String>>,
}

impl StaticWordSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a list under `source`.
    #[must_use]
    pub fn with_list<I, S>(mut self, source: impl Into<String>, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lists
            .insert(source.into(), words.into_iter().map(Into::into).collect());
        self
    }
}

#[async_trait]
impl WordSource for StaticWordSource {
    async fn load(&self, source: &str) -> Result<Vec<String>> {
        self.lists
            .get(source)
            .cloned()
            .ok_or_else(|| GuardError::PatternBuild {
                source_key: source.to_string(),
                message: "unknown word source".to_string(),
            })
    }
}

/// Reads `<dir>/<source>.txt`: one keyword per line, `#` starts a comment
/// line, blank lines are skipped.
#[derive(Debug, Clone)]
pub struct FileWordSource {
    dir: PathBuf,
}

impl FileWordSource {
    /// Source rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the word files.
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn path_for(&self, source: &str) -> Result<PathBuf> {
        // Source keys come from rule config; keep them inside `dir`.
        if source.is_empty() || source.contains(['/', '\\']) || source.contains("..") {
            return Err(GuardError::PatternBuild {
                source_key: source.to_string(),
                message: "invalid source name".to_string(),
            });
        }
        Ok(self.dir.join(format!("{source}.txt")))
    }
}

/// Parse a word file body.
pub fn parse_word_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(ToString::to_string)
        .collect()
}

#[async_trait]
impl WordSource for FileWordSource {
    async fn load(&self, source: &str) -> Result<Vec<String>> {
        let path = self.path_for(source)?;
        let content =
            tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| GuardError::PatternBuild {
                    source_key: source.to_string(),
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
        Ok(parse_word_list(&content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_word_list() {
        let words = parse_word_list("# banned\nbad\n\n  worse  \n#tail\n");
        assert_eq!(words, vec!["bad", "worse"]);
    }

    #[tokio::test]
    async fn test_static_source() {
        let source = StaticWordSource::new().with_list("default", ["bad", "worse"]);
        assert_eq!(source.load("default").await.unwrap().len(), 2);
        assert!(matches!(
            source.load("missing").await,
            Err(GuardError::PatternBuild { .. })
        ));
    }

    #[tokio::test]
    async fn test_file_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("default.txt"), "# list\nbad\nworse\n").unwrap();

        let source = FileWordSource::new(dir.path());
        assert_eq!(source.load("default").await.unwrap(), vec!["bad", "worse"]);
        assert!(source.load("absent").await.is_err());
        assert!(source.load("../etc/passwd").await.is_err());
    }
}
