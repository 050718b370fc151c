pub mod dockerhub;
pub mod gitlab;

use crate::models::ImageRef;
use crate::version::CandidateTags;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use thiserror::Error;

pub use dockerhub::DockerHubAdapter;
pub use gitlab::{GitLabAdapter, GitLabConfig};

/// Failures a registry can answer with. All of them are per-image and
/// non-fatal: the reconciler journals them and moves on. Missing GitLab
/// credentials are not an error at all; the adapter is simply absent and the
/// image yields no candidates.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("image {0} not found in the registry")]
    ImageNotFound(String),

    #[error("no publish date for {image}:{tag}")]
    DateNotFound { image: String, tag: String },

    #[error("registry answered abnormally: {0}")]
    AbnormalResponse(String),
}

impl RegistryError {
    /// Stable identifier used as the notification dedupe key, so a recurring
    /// fault produces one message until its kind changes.
    pub fn log_id(&self) -> &'static str {
        match self {
            RegistryError::ImageNotFound(_) => "registry_image_not_found",
            RegistryError::DateNotFound { .. } => "registry_date_not_found",
            RegistryError::AbnormalResponse(_) => "registry_abnormal_response",
        }
    }
}

/// Uniform surface over DockerHub and the GitLab container registry.
///
/// Adapters are stateless besides their HTTP client; a pagination cursor
/// lives only for the duration of one `list_candidate_tags` call.
#[async_trait]
pub trait RegistryAdapter: Send + Sync {
    /// Registry-side namespace of the image (`library` for official
    /// DockerHub images).
    async fn resolve_namespace(&self, image: &ImageRef) -> Result<String, RegistryError>;

    /// Tags comparable to the current one, deduplicated by content digest
    /// where the registry exposes digests.
    async fn list_candidate_tags(
        &self,
        namespace: &str,
        image: &ImageRef,
        current_tag: &str,
    ) -> Result<CandidateTags, RegistryError>;

    /// Publish timestamp of one specific tag.
    async fn tag_timestamp(
        &self,
        namespace: &str,
        image: &ImageRef,
        tag: &str,
    ) -> Result<NaiveDateTime, RegistryError>;
}
