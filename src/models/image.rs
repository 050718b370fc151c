use serde::{Deserialize, Serialize};
use std::fmt;

/// A parsed container image reference: optional registry/namespace prefix,
/// short name and tag.
///
/// Examples:
///   "nginx:1.25.0"                                    -> (None, "nginx", "1.25.0")
///   "registry.example.com/containers/app:3.2"         -> (Some(...), "app", "3.2")
///   "localhost:5000/myimage"                          -> (Some("localhost:5000"), "myimage", "latest")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Everything before the short name: registry host and repository
    /// namespace, without the trailing slash.
    pub prefix: Option<String>,

    /// Short image name, the last path segment.
    pub name: String,

    /// Image tag; `latest` when the reference carries none.
    pub tag: String,
}

impl ImageRef {
    pub fn parse(image: &str) -> Self {
        // A ':' whose right side contains '/' belongs to a registry port, not
        // a tag ("localhost:5000/myimage").
        let (repository, tag) = match image.rsplit_once(':') {
            Some((_, after)) if after.contains('/') => (image, "latest"),
            Some((before, after)) => (before, after),
            None => (image, "latest"),
        };

        let (prefix, name) = match repository.rsplit_once('/') {
            Some((prefix, name)) => (Some(prefix.to_string()), name.to_string()),
            None => (None, repository.to_string()),
        };

        Self {
            prefix,
            name,
            tag: tag.to_string(),
        }
    }

    /// The full repository path without the tag.
    pub fn repository(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix, self.name),
            None => self.name.clone(),
        }
    }

    /// A `containers/` path segment marks a GitLab-hosted image; anything
    /// else is assumed to live on DockerHub.
    pub fn is_gitlab(&self) -> bool {
        self.prefix
            .as_deref()
            .is_some_and(|p| p.split('/').any(|segment| segment == "containers"))
    }

    /// The same reference with a different tag.
    pub fn with_tag(&self, tag: &str) -> Self {
        Self {
            prefix: self.prefix.clone(),
            name: self.name.clone(),
            tag: tag.to_string(),
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository(), self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_ref() {
        let image = ImageRef::parse("nginx:1.25.0");
        assert_eq!(image.prefix, None);
        assert_eq!(image.name, "nginx");
        assert_eq!(image.tag, "1.25.0");
    }

    #[test]
    fn test_parse_prefixed_ref() {
        let image = ImageRef::parse("gcr.io/project/image:v1.0");
        assert_eq!(image.prefix.as_deref(), Some("gcr.io/project"));
        assert_eq!(image.name, "image");
        assert_eq!(image.tag, "v1.0");
    }

    #[test]
    fn test_parse_untagged_defaults_to_latest() {
        let image = ImageRef::parse("nginx");
        assert_eq!(image.name, "nginx");
        assert_eq!(image.tag, "latest");
    }

    #[test]
    fn test_parse_registry_port_without_tag() {
        let image = ImageRef::parse("localhost:5000/myimage");
        assert_eq!(image.prefix.as_deref(), Some("localhost:5000"));
        assert_eq!(image.name, "myimage");
        assert_eq!(image.tag, "latest");
    }

    #[test]
    fn test_parse_registry_port_with_tag() {
        let image = ImageRef::parse("registry.example.com:5000/image:v2.0");
        assert_eq!(image.prefix.as_deref(), Some("registry.example.com:5000"));
        assert_eq!(image.name, "image");
        assert_eq!(image.tag, "v2.0");
    }

    #[test]
    fn test_gitlab_detection() {
        assert!(ImageRef::parse("registry.gitlab.com/group/containers/app:3.2").is_gitlab());
        assert!(!ImageRef::parse("docker.io/library/nginx:1.25.0").is_gitlab());
        // The segment must match exactly, not as a substring.
        assert!(!ImageRef::parse("example.com/containerstuff/app:1.0").is_gitlab());
    }

    #[test]
    fn test_render_parse_roundtrip() {
        for raw in [
            "nginx:1.25.0",
            "gcr.io/project/image:v1.0",
            "registry.gitlab.com/group/containers/app:3.2",
            "localhost:5000/myimage:latest",
        ] {
            let parsed = ImageRef::parse(raw);
            assert_eq!(ImageRef::parse(&parsed.to_string()), parsed);
            assert_eq!(parsed.to_string(), raw);
        }
    }

    #[test]
    fn test_with_tag() {
        let image = ImageRef::parse("nginx:1.25.0").with_tag("1.26.0");
        assert_eq!(image.to_string(), "nginx:1.26.0");
    }
}
