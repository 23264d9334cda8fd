//! Key Pattern Module
//!
//! Glob matching for key enumeration, following the store's `MATCH` syntax:
//! `*` matches any run of characters, `?` matches exactly one, and `\`
//! escapes the next character.

use regex::Regex;

use crate::error::{StoreError, StoreResult};

// == Key Pattern ==
/// A compiled glob pattern.
#[derive(Debug, Clone)]
pub struct KeyPattern {
    glob: String,
    regex: Regex,
}

impl KeyPattern {
    // == Compile ==
    /// Compiles a glob into an anchored regular expression.
    pub fn compile(glob: &str) -> StoreResult<Self> {
        let mut source = String::with_capacity(glob.len() + 8);
        source.push('^');

        let mut chars = glob.chars();
        while let Some(c) = chars.next() {
            match c {
                '*' => source.push_str(".*"),
                '?' => source.push('.'),
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        source.push_str(&regex::escape(&escaped.to_string()));
                    }
                }
                other => source.push_str(&regex::escape(&other.to_string())),
            }
        }
        source.push('$');

        let regex = Regex::new(&source)
            .map_err(|e| StoreError::Backend(format!("invalid pattern '{}': {}", glob, e)))?;

        Ok(Self {
            glob: glob.to_string(),
            regex,
        })
    }

    // == Matches ==
    /// Returns true if the whole key matches the pattern.
    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }

    /// The original glob text.
    pub fn as_str(&self) -> &str {
        &self.glob
    }
}
