use super::{RegistryAdapter, RegistryError};
use crate::models::ImageRef;
use crate::version::{self, CandidateTags};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Connection details for one GitLab project's container registry. All three
/// values must be present; the reconciler treats an unconfigured adapter as
/// "no images" rather than an error.
#[derive(Debug, Clone)]
pub struct GitLabConfig {
    pub base_url: String,
    pub token: String,
    pub project_id: String,
}

impl GitLabConfig {
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("GITLAB_BASE_URL").ok()?;
        let token = std::env::var("GITLAB_TOKEN").ok()?;
        let project_id = std::env::var("GITLAB_PROJECT_ID").ok()?;
        if base_url.is_empty() || token.is_empty() || project_id.is_empty() {
            return None;
        }
        Some(Self {
            base_url,
            token,
            project_id,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct GitLabRepository {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<GitLabTag>,
}

#[derive(Debug, Deserialize)]
pub struct GitLabTag {
    pub name: String,
}

pub struct GitLabAdapter {
    config: GitLabConfig,
    client: Client,
}

impl GitLabAdapter {
    pub fn new(config: GitLabConfig) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| RegistryError::AbnormalResponse(e.to_string()))?;
        Ok(Self { config, client })
    }

    /// One pass over the project's registry repositories, tag names inlined.
    async fn list_repositories(&self) -> Result<Vec<GitLabRepository>, RegistryError> {
        let url = format!(
            "{}/api/v4/projects/{}/registry/repositories",
            self.config.base_url.trim_end_matches('/'),
            self.config.project_id
        );
        let response = self
            .client
            .get(&url)
            .query(&[("tags", "true"), ("per_page", "100")])
            .header("PRIVATE-TOKEN", &self.config.token)
            .send()
            .await
            .map_err(|e| RegistryError::AbnormalResponse(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RegistryError::AbnormalResponse(format!(
                "repository listing returned HTTP {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| RegistryError::AbnormalResponse(e.to_string()))
    }

    async fn find_repository(&self, image: &ImageRef) -> Result<GitLabRepository, RegistryError> {
        self.list_repositories()
            .await?
            .into_iter()
            .find(|r| r.name == image.name)
            .ok_or_else(|| RegistryError::ImageNotFound(image.name.clone()))
    }
}

#[async_trait]
impl RegistryAdapter for GitLabAdapter {
    /// GitLab scopes images by project, so the "namespace" is just the
    /// repository name, looked up to confirm the image exists.
    async fn resolve_namespace(&self, image: &ImageRef) -> Result<String, RegistryError> {
        Ok(self.find_repository(image).await?.name)
    }

    async fn list_candidate_tags(
        &self,
        _namespace: &str,
        image: &ImageRef,
        current_tag: &str,
    ) -> Result<CandidateTags, RegistryError> {
        let repository = self.find_repository(image).await?;
        let names: Vec<String> = repository.tags.into_iter().map(|t| t.name).collect();
        let updatable = version::candidates_from_names(current_tag, &names);

        debug!(
            image = %image.name,
            tags = names.len(),
            candidates = updatable.len(),
            "enumerated GitLab registry tags"
        );

        Ok(CandidateTags { names, updatable })
    }

    /// The registry listing carries no per-tag dates, so the latest-refresh
    /// path never fires for GitLab-hosted images.
    async fn tag_timestamp(
        &self,
        _namespace: &str,
        image: &ImageRef,
        tag: &str,
    ) -> Result<NaiveDateTime, RegistryError> {
        Err(RegistryError::DateNotFound {
            image: image.name.clone(),
            tag: tag.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_requires_all_three_values() {
        // SAFETY: test-only process-local mutation; this is the only test
        // touching the GITLAB_* variables.
        unsafe {
            std::env::set_var("GITLAB_BASE_URL", "https://gitlab.example.com");
            std::env::set_var("GITLAB_TOKEN", "glpat-secret");
            std::env::remove_var("GITLAB_PROJECT_ID");
        }
        assert!(GitLabConfig::from_env().is_none());

        unsafe { std::env::set_var("GITLAB_PROJECT_ID", "42") };
        let config = GitLabConfig::from_env().unwrap();
        assert_eq!(config.project_id, "42");

        // Present but empty counts as absent.
        unsafe { std::env::set_var("GITLAB_TOKEN", "") };
        assert!(GitLabConfig::from_env().is_none());

        unsafe {
            std::env::remove_var("GITLAB_BASE_URL");
            std::env::remove_var("GITLAB_TOKEN");
            std::env::remove_var("GITLAB_PROJECT_ID");
        }
    }

    #[test]
    fn test_repository_decoding() {
        let raw = r#"[
            {"id": 1, "name": "app", "path": "group/project/app",
             "tags": [{"name": "latest"}, {"name": "3.2.1"}]},
            {"id": 2, "name": "worker", "tags": []}
        ]"#;
        let repositories: Vec<GitLabRepository> = serde_json::from_str(raw).unwrap();
        assert_eq!(repositories.len(), 2);
        assert_eq!(repositories[0].name, "app");
        assert_eq!(repositories[0].tags.len(), 2);
        assert_eq!(repositories[0].tags[1].name, "3.2.1");
        assert!(repositories[1].tags.is_empty());
    }
}
