use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// VersioningHandler declares "watch this Deployment's container images and
/// keep them fresh under the configured version frontier".
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "updraft.dev",
    version = "v1alpha1",
    kind = "VersioningHandler",
    plural = "versioninghandlers",
    shortname = "vh",
    namespaced,
    printcolumn = r#"{"name":"Deployment", "type":"string", "jsonPath":".spec.deployment"}"#,
    printcolumn = r#"{"name":"Registry", "type":"string", "jsonPath":".spec.containerregistry"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct VersioningHandlerSpec {
    /// Name of the Deployment to watch.
    pub deployment: String,

    /// Registry the image versions are discovered from (`dockerhub` or
    /// `gitlab`). Kept as a plain string so that an unrecognized value is
    /// journaled per tick rather than failing watch decoding.
    pub containerregistry: String,
}

/// Registry families the operator can discover versions from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryKind {
    DockerHub,
    GitLab,
}

#[derive(Debug, Error)]
pub enum RegistryKindError {
    #[error("unrecognized container registry: {0}")]
    Unrecognized(String),
}

impl FromStr for RegistryKind {
    type Err = RegistryKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dockerhub" => Ok(RegistryKind::DockerHub),
            "gitlab" => Ok(RegistryKind::GitLab),
            _ => Err(RegistryKindError::Unrecognized(s.to_string())),
        }
    }
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryKind::DockerHub => write!(f, "dockerhub"),
            RegistryKind::GitLab => write!(f, "gitlab"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_kind_parsing() {
        assert_eq!(
            "dockerhub".parse::<RegistryKind>().unwrap(),
            RegistryKind::DockerHub
        );
        assert_eq!(
            "GitLab".parse::<RegistryKind>().unwrap(),
            RegistryKind::GitLab
        );
        assert!("quay".parse::<RegistryKind>().is_err());
    }

    #[test]
    fn test_handler_spec_roundtrip() {
        let spec = VersioningHandlerSpec {
            deployment: "nginx".to_string(),
            containerregistry: "dockerhub".to_string(),
        };

        let json = serde_json::to_string(&spec).unwrap();
        let back: VersioningHandlerSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back.deployment, "nginx");
        assert_eq!(back.containerregistry, "dockerhub");
    }
}
