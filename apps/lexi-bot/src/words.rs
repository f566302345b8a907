use std::path::Path;

use anyhow::{bail, Context, Result};
use rand::Rng;

/// Newline-separated vocabulary served to users.
#[derive(Debug, Clone)]
pub struct WordList {
    words: Vec<String>,
}

impl WordList {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading word list {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("word list {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let words: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect();
        if words.is_empty() {
            bail!("no words found");
        }
        Ok(Self { words })
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn random<R: Rng>(&self, rng: &mut R) -> &str {
        &self.words[rng.random_range(0..self.words.len())]
    }
}
