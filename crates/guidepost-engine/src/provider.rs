use async_trait::async_trait;
use std::collections::HashMap;

use guidepost_core::{GuidepostError, Result};

/// External discovery collaborator. A `discover` step consults the session
/// cache first; only a miss reaches this trait. Implementations may be
/// slow (inventory scans, API calls) — the executor suspends across the
/// call and applies the result atomically.
#[async_trait]
pub trait FactProvider: Send + Sync {
    async fn discover(
        &self,
        key: &str,
        profile: Option<&HashMap<String, String>>,
    ) -> Result<String>;
}

/// Fixed-answer provider for tests and offline corpora.
pub struct StaticFactProvider {
    facts: HashMap<String, String>,
}

impl StaticFactProvider {
    pub fn new(facts: HashMap<String, String>) -> Self {
        Self { facts }
    }

    pub fn empty() -> Self {
        Self {
            facts: HashMap::new(),
        }
    }
}

#[async_trait]
impl FactProvider for StaticFactProvider {
    async fn discover(
        &self,
        key: &str,
        _profile: Option<&HashMap<String, String>>,
    ) -> Result<String> {
        self.facts
            .get(key)
            .cloned()
            .ok_or_else(|| GuidepostError::Discovery {
                key: key.to_string(),
                reason: "no such fact".into(),
            })
    }
}

/// Resolves facts from the session's bound profile. The default provider
/// for interactive use: operators bind what they know up front, and
/// anything a workflow asks for beyond that surfaces as a discovery error
/// instead of a guess.
pub struct ProfileFactProvider;

#[async_trait]
impl FactProvider for ProfileFactProvider {
    async fn discover(
        &self,
        key: &str,
        profile: Option<&HashMap<String, String>>,
    ) -> Result<String> {
        profile
            .and_then(|p| p.get(key))
            .cloned()
            .ok_or_else(|| GuidepostError::Discovery {
                key: key.to_string(),
                reason: "not present in the session profile".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn profile_provider_reads_bound_facts() {
        let mut profile = HashMap::new();
        profile.insert("environment".to_string(), "staging".to_string());

        let value = ProfileFactProvider
            .discover("environment", Some(&profile))
            .await
            .unwrap();
        assert_eq!(value, "staging");

        let err = ProfileFactProvider
            .discover("region", Some(&profile))
            .await
            .unwrap_err();
        assert!(matches!(err, GuidepostError::Discovery { .. }));

        let err = ProfileFactProvider.discover("anything", None).await.unwrap_err();
        assert!(matches!(err, GuidepostError::Discovery { .. }));
    }
}
