//! AI Provider Module
//!
//! The billable upstream behind the gated routes. Deployments plug in their
//! real client; the binary ships a local deterministic provider so the gate
//! can run without credentials.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ratelimit::OperationClass;

// == Completion ==
/// Provider output for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub operation: OperationClass,
    pub content: String,
    pub model: String,
}

// == AI Provider ==
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Runs one billable call. Errors are provider messages.
    async fn complete(
        &self,
        operation: OperationClass,
        prompt: &str,
    ) -> std::result::Result<Completion, String>;
}

// == Local Provider ==
/// Deterministic stand-in: context extraction returns the most frequent
/// significant terms, chat returns a short acknowledgement.
#[derive(Debug, Clone, Default)]
pub struct LocalProvider;

/// Terms reported by context extraction.
const MAX_TERMS: usize = 5;

impl LocalProvider {
    fn key_terms(prompt: &str) -> Vec<String> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for word in prompt
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() > 3)
        {
            *counts.entry(word.to_lowercase()).or_default() += 1;
        }

        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.into_iter().take(MAX_TERMS).map(|(w, _)| w).collect()
    }
}

#[async_trait]
impl AiProvider for LocalProvider {
    async fn complete(
        &self,
        operation: OperationClass,
        prompt: &str,
    ) -> std::result::Result<Completion, String> {
        let content = match operation {
            OperationClass::AiContext => Self::key_terms(prompt).join(", "),
            OperationClass::AiChat => format!(
                "Received {} words. Review the lesson material on: {}",
                prompt.split_whitespace().count(),
                Self::key_terms(prompt).join(", ")
            ),
        };

        Ok(Completion {
            operation,
            content,
            model: "local".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_context_extraction_ranks_terms() {
        let provider = LocalProvider;
        let out = provider
            .complete(
                OperationClass::AiContext,
                "Ownership and borrowing: ownership moves, borrowing lends. Ownership!",
            )
            .await
            .unwrap();
        assert_eq!(out.content, "ownership, borrowing, lends, moves");
        assert_eq!(out.model, "local");
    }

    #[tokio::test]
    async fn test_chat_is_deterministic() {
        let provider = LocalProvider;
        let a = provider.complete(OperationClass::AiChat, "explain lifetimes please").await;
        let b = provider.complete(OperationClass::AiChat, "explain lifetimes please").await;
        assert_eq!(a, b);
        assert!(a.unwrap().content.starts_with("Received 3 words"));
    }
}
