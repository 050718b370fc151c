use super::{RegistryAdapter, RegistryError};
use crate::models::ImageRef;
use crate::version::{self, Candidate, CandidateTags};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use lazy_static::lazy_static;
use pep440_rs::Version;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

const SEARCH_URL: &str = "https://hub.docker.com/api/content/v1/products/search";
const REPOSITORIES_URL: &str = "https://hub.docker.com/v2/repositories";

// The search endpoint rejects plain API clients; it expects something that
// looks like the Explore page.
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/115.0";

lazy_static! {
    /// The shape of a DockerHub `last_updated` value, fractional seconds and
    /// offset optional: `2022-06-15T13:14:25.654498Z`.
    static ref DOCKER_DATETIME: Regex = Regex::new(
        r"^[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}(\.[0-9]+)?([zZ]|([\+-])([01]\d|2[0-3]):?([0-5]\d)?)?"
    )
    .unwrap();
}

/// Parse a DockerHub timestamp. The fractional part and zone suffix are
/// validated, then dropped before parsing, so `2022-06-15T13:14:25.654498Z`
/// and `2022-06-15T13:14:25` land on the same instant.
pub fn parse_docker_datetime(raw: &str) -> Option<NaiveDateTime> {
    if !DOCKER_DATETIME.is_match(raw) {
        return None;
    }
    let truncated = raw.split('.').next()?;
    NaiveDateTime::parse_from_str(truncated, "%Y-%m-%dT%H:%M:%S").ok()
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    summaries: Option<Vec<DockerHubSearchSummary>>,
}

#[derive(Debug, Deserialize)]
pub struct DockerHubSearchSummary {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct TagsPage {
    #[serde(default)]
    results: Vec<DockerHubTagEntry>,
}

#[derive(Debug, Deserialize)]
pub struct DockerHubTagEntry {
    pub name: String,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub images: Vec<DockerHubTagImage>,
}

#[derive(Debug, Deserialize)]
pub struct DockerHubTagImage {
    #[serde(default)]
    pub digest: Option<String>,
}

impl DockerHubTagEntry {
    /// Content digest of the tag, from the tag itself or its first image.
    fn content_digest(&self) -> Option<&str> {
        self.digest
            .as_deref()
            .or_else(|| self.images.iter().find_map(|i| i.digest.as_deref()))
    }
}

pub struct DockerHubAdapter {
    client: Client,
}

impl DockerHubAdapter {
    pub fn new() -> Result<Self, RegistryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .map_err(|e| RegistryError::AbnormalResponse(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RegistryAdapter for DockerHubAdapter {
    /// Resolve the namespace the way a user searching the Explore bar would:
    /// an exact name match is an official image under `library`, otherwise
    /// the first hit containing the name donates its namespace.
    async fn resolve_namespace(&self, image: &ImageRef) -> Result<String, RegistryError> {
        let response = self
            .client
            .get(SEARCH_URL)
            .query(&[("page_size", "100"), ("q", image.name.as_str())])
            .header("Accept", "application/json")
            .header("Search-Version", "v3")
            .send()
            .await
            .map_err(|e| RegistryError::AbnormalResponse(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RegistryError::AbnormalResponse(format!(
                "search returned HTTP {}",
                response.status()
            )));
        }

        let search: SearchResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::AbnormalResponse(e.to_string()))?;

        let summaries = search
            .summaries
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RegistryError::ImageNotFound(image.name.clone()))?;

        for summary in &summaries {
            if summary.name.contains(&image.name) {
                let namespace = if summary.name == image.name {
                    "library".to_string()
                } else {
                    summary
                        .name
                        .split('/')
                        .next()
                        .unwrap_or_default()
                        .to_string()
                };
                return Ok(namespace);
            }
        }

        Err(RegistryError::ImageNotFound(image.name.clone()))
    }

    /// Walk the tag pages newest-first until the registry errors out or the
    /// running tag's exact partition triple shows up. Tags sharing a digest
    /// are the same image under different labels; only the first label is
    /// kept.
    async fn list_candidate_tags(
        &self,
        namespace: &str,
        image: &ImageRef,
        current_tag: &str,
    ) -> Result<CandidateTags, RegistryError> {
        let current = version::split_tag(current_tag);
        let mut names = Vec::new();
        let mut updatable: Vec<Candidate> = Vec::new();
        let mut seen_digests: HashSet<String> = HashSet::new();
        let mut page = 1u32;

        'pages: loop {
            let url = format!(
                "{}/{}/{}/tags/?page={}",
                REPOSITORIES_URL, namespace, image.name, page
            );
            let Ok(response) = self.client.get(&url).send().await else {
                break;
            };
            if !response.status().is_success() {
                break;
            }
            let Ok(body) = response.json::<TagsPage>().await else {
                break;
            };
            if body.results.is_empty() {
                break;
            }

            for entry in body.results {
                if let Some(digest) = entry.content_digest()
                    && !seen_digests.insert(digest.to_string())
                {
                    continue;
                }
                names.push(entry.name.clone());

                let Some(parts) = version::split_tag(&entry.name) else {
                    continue;
                };
                let Some(current) = &current else {
                    continue;
                };
                if parts.prefix != current.prefix || parts.suffix != current.suffix {
                    continue;
                }
                if parts.number == current.number {
                    // Reached the tag the Deployment is running; everything
                    // newer has been seen.
                    break 'pages;
                }
                if let Ok(parsed) = Version::from_str(&parts.number) {
                    updatable.push(Candidate {
                        version: parsed,
                        number: parts.number,
                        tag: entry.name,
                    });
                }
            }

            page += 1;
        }

        debug!(
            image = %image.name,
            tags = names.len(),
            candidates = updatable.len(),
            "enumerated DockerHub tags"
        );

        Ok(CandidateTags { names, updatable })
    }

    async fn tag_timestamp(
        &self,
        namespace: &str,
        image: &ImageRef,
        tag: &str,
    ) -> Result<NaiveDateTime, RegistryError> {
        let url = format!(
            "{}/{}/{}/tags/{}",
            REPOSITORIES_URL, namespace, image.name, tag
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RegistryError::AbnormalResponse(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::ImageNotFound(format!(
                "{}:{}",
                image.name, tag
            )));
        }
        if !response.status().is_success() {
            return Err(RegistryError::AbnormalResponse(format!(
                "tag endpoint returned HTTP {}",
                response.status()
            )));
        }

        let entry: DockerHubTagEntry = response
            .json()
            .await
            .map_err(|e| RegistryError::AbnormalResponse(e.to_string()))?;

        entry
            .last_updated
            .as_deref()
            .and_then(parse_docker_datetime)
            .ok_or_else(|| RegistryError::DateNotFound {
                image: image.name.clone(),
                tag: tag.to_string(),
            })
    }
}
