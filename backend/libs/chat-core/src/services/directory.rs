use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::ChatResult;

/// Display identity supplied by the identity collaborator. The messaging
/// core stores user ids only; profiles are projected onto views after the
/// core operations run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub display_name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

impl UserProfile {
    /// Stand-in for an id the directory no longer resolves (deactivated
    /// account). Projection must not fail on these.
    pub fn placeholder(id: Uuid) -> Self {
        Self {
            id,
            display_name: "unknown".to_string(),
            email: None,
            avatar_url: None,
        }
    }
}

/// Read-side lookup against the identity collaborator.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolve the given ids to profiles. Ids the directory does not know
    /// are simply absent from the result, never errors.
    async fn lookup(&self, user_ids: &[Uuid]) -> ChatResult<HashMap<Uuid, UserProfile>>;
}

/// Fixed in-process directory for tests and embedding.
#[derive(Clone, Default)]
pub struct StaticUserDirectory {
    profiles: HashMap<Uuid, UserProfile>,
}

impl StaticUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.profiles.insert(profile.id, profile);
        self
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn lookup(&self, user_ids: &[Uuid]) -> ChatResult<HashMap<Uuid, UserProfile>> {
        Ok(user_ids
            .iter()
            .filter_map(|id| self.profiles.get(id).cloned())
            .map(|profile| (profile.id, profile))
            .collect())
    }
}
