//! In-memory schema registry, for offline runs and tests

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CompatibilityLevel, RegisteredSchema, SchemaRegistry};
use crate::error::RegistryError;

/// Calls received by an [`InMemorySchemaRegistry`], in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCall {
    GetCompatibility(String),
    SetCompatibility(String, CompatibilityLevel),
    CreateSchema(String),
}

#[derive(Debug, Default)]
struct State {
    /// Schema text -> id, shared by every subject
    ids: HashMap<String, u32>,
    /// Subject -> registered schema texts, oldest first
    subjects: HashMap<String, Vec<String>>,
    compatibility: HashMap<String, CompatibilityLevel>,
    failing: HashSet<String>,
    calls: Vec<RegistryCall>,
}

/// Registry keeping everything in memory.
///
/// Ids are assigned sequentially from 1; registering an identical schema
/// again answers the existing id and version.
#[derive(Debug, Default)]
pub struct InMemorySchemaRegistry {
    state: Mutex<State>,
}

impl InMemorySchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `subject` a compatibility level without recording a call
    pub async fn preset_compatibility(&self, subject: &str, level: CompatibilityLevel) {
        let mut state = self.state.lock().await;
        state.compatibility.insert(subject.to_string(), level);
        state.subjects.entry(subject.to_string()).or_default();
    }

    /// Make every registration under `subject` fail
    pub async fn fail_subject(&self, subject: &str) {
        self.state.lock().await.failing.insert(subject.to_string());
    }

    pub async fn calls(&self) -> Vec<RegistryCall> {
        self.state.lock().await.calls.clone()
    }

    /// Number of schema registrations received
    pub async fn create_calls(&self) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|call| matches!(call, RegistryCall::CreateSchema(_)))
            .count()
    }

    pub async fn compatibility(&self, subject: &str) -> Option<CompatibilityLevel> {
        self.state.lock().await.compatibility.get(subject).copied()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }
}

#[async_trait]
impl SchemaRegistry for InMemorySchemaRegistry {
    async fn get_compatibility(
        &self,
        subject: &str,
    ) -> Result<Option<CompatibilityLevel>, RegistryError> {
        let mut state = self.state.lock().await;
        state
            .calls
            .push(RegistryCall::GetCompatibility(subject.to_string()));
        if !state.subjects.contains_key(subject) {
            return Ok(None);
        }
        Ok(Some(
            state
                .compatibility
                .get(subject)
                .copied()
                .unwrap_or_default(),
        ))
    }

    async fn set_compatibility(
        &self,
        subject: &str,
        level: CompatibilityLevel,
    ) -> Result<(), RegistryError> {
        let mut state = self.state.lock().await;
        state
            .calls
            .push(RegistryCall::SetCompatibility(subject.to_string(), level));
        state.compatibility.insert(subject.to_string(), level);
        Ok(())
    }

    async fn create_schema(
        &self,
        subject: &str,
        schema: &str,
    ) -> Result<RegisteredSchema, RegistryError> {
        let mut state = self.state.lock().await;
        state
            .calls
            .push(RegistryCall::CreateSchema(subject.to_string()));
        if state.failing.contains(subject) {
            return Err(RegistryError::Status {
                code: 500,
                message: format!("registration of {subject} rejected"),
            });
        }

        let next_id = state.ids.len() as u32 + 1;
        let id = *state.ids.entry(schema.to_string()).or_insert(next_id);
        let versions = state.subjects.entry(subject.to_string()).or_default();
        let version = match versions.iter().position(|known| known == schema) {
            Some(idx) => idx + 1,
            None => {
                versions.push(schema.to_string());
                versions.len()
            }
        };

        Ok(RegisteredSchema {
            id,
            version: version as u32,
            subject: subject.to_string(),
            schema: schema.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_identical_schema_keeps_id_and_version() {
        let registry = InMemorySchemaRegistry::new();
        let first = registry.create_schema("a", r#""string""#).await.unwrap();
        let again = registry.create_schema("a", r#""string""#).await.unwrap();
        let other = registry.create_schema("a", r#""long""#).await.unwrap();

        assert_eq!((first.id, first.version), (1, 1));
        assert_eq!((again.id, again.version), (1, 1));
        assert_eq!((other.id, other.version), (2, 2));
        assert_eq!(registry.create_calls().await, 3);
    }

    #[tokio::test]
    async fn test_unknown_subject_has_no_compatibility() {
        let registry = InMemorySchemaRegistry::new();
        assert_eq!(registry.get_compatibility("a").await.unwrap(), None);

        registry.create_schema("a", r#""string""#).await.unwrap();
        assert_eq!(
            registry.get_compatibility("a").await.unwrap(),
            Some(CompatibilityLevel::Forward)
        );

        registry
            .set_compatibility("a", CompatibilityLevel::Full)
            .await
            .unwrap();
        assert_eq!(
            registry.get_compatibility("a").await.unwrap(),
            Some(CompatibilityLevel::Full)
        );
    }

    #[tokio::test]
    async fn test_failing_subject() {
        let registry = InMemorySchemaRegistry::new();
        registry.fail_subject("broken").await;
        assert!(matches!(
            registry.create_schema("broken", "{}").await,
            Err(RegistryError::Status { code: 500, .. })
        ));
        assert_eq!(
            registry.calls().await,
            vec![RegistryCall::CreateSchema("broken".to_string())]
        );
    }
}
