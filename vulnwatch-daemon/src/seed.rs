//! Seed data for the in-memory store.
//!
//! User and project management lives outside the daemon; the seed file
//! provides the users (email contacts) and projects the API operates on.
//!
//! ```toml
//! [[users]]
//! id = 1
//! email = "dev@example.com"
//! name = "Dev"
//!
//! [[projects]]
//! owner = 1
//! name = "web"
//! ```

use std::collections::HashSet;
use std::path::Path;

use anyhow::Result;
use serde::Deserialize;

use vulnwatch_core::store::MemoryStore;
use vulnwatch_core::types::{Project, UserId, UserProfile};

/// Parsed seed file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeedData {
    /// Users with their email contact.
    pub users: Vec<UserProfile>,
    /// Projects to create, in order (ids are assigned from 1).
    pub projects: Vec<SeedProject>,
}

/// A project entry in the seed file.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedProject {
    /// Owning user.
    pub owner: UserId,
    /// Project name.
    pub name: String,
}

impl SeedData {
    /// Parse seed data from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self> {
        let seed: Self = toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("failed to parse seed file: {}", e))?;
        seed.validate()?;
        Ok(seed)
    }

    /// Load seed data from a TOML file.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to read seed file {}: {}", path.display(), e))?;
        Self::parse(&content)
    }

    /// Check that user ids are unique and every project owner exists.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for user in &self.users {
            if !ids.insert(user.id) {
                return Err(anyhow::anyhow!("duplicate user id {} in seed file", user.id));
            }
        }
        for project in &self.projects {
            if !ids.contains(&project.owner) {
                return Err(anyhow::anyhow!(
                    "project '{}' references unknown owner {}",
                    project.name,
                    project.owner
                ));
            }
        }
        Ok(())
    }

    /// Load users and projects into the store.
    pub async fn apply(&self, store: &MemoryStore) -> Vec<Project> {
        for user in &self.users {
            store.upsert_user(user.clone()).await;
        }
        let mut projects = Vec::with_capacity(self.projects.len());
        for project in &self.projects {
            projects.push(store.create_project(project.owner, project.name.clone()).await);
        }
        tracing::info!(
            users = self.users.len(),
            projects = projects.len(),
            "seed data loaded"
        );
        projects
    }
}
