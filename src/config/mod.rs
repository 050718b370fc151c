use crate::notify::{EmailConfig, TelegramConfig};
use crate::registry::GitLabConfig;
use std::time::Duration;
use tracing::info;

/// Operator-wide settings, read from the environment once at startup.
///
/// Credential groups (GitLab, email, Telegram) are `Some` only when every
/// variable of the group is present; a partial group counts as absent.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Frontier splitting a dotted version into locked and free regions.
    /// Zero or negative disables the frontier.
    pub versions_frontier: i32,

    /// How often each handler's reconciliation tick fires.
    pub refresh_frequency: Duration,

    /// Restart `latest`-tagged Deployments when upstream pushes a fresh
    /// `latest`.
    pub latest_preference: bool,

    pub gitlab: Option<GitLabConfig>,
    pub email: Option<EmailConfig>,
    pub telegram: Option<TelegramConfig>,
}

const DEFAULT_REFRESH_SECONDS: u64 = 600;

impl OperatorConfig {
    pub fn from_env() -> Self {
        let versions_frontier = std::env::var("VERSIONS_FRONTIER")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let refresh_seconds = std::env::var("REFRESH_FREQUENCY_IN_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|&s| s > 0)
            .unwrap_or(DEFAULT_REFRESH_SECONDS);

        let latest_preference = std::env::var("LATEST_PREFERENCE")
            .map(|v| v == "true")
            .unwrap_or(false);

        let config = Self {
            versions_frontier,
            refresh_frequency: Duration::from_secs(refresh_seconds),
            latest_preference,
            gitlab: GitLabConfig::from_env(),
            email: EmailConfig::from_env(),
            telegram: TelegramConfig::from_env(),
        };

        info!(
            frontier = config.versions_frontier,
            refresh_seconds,
            latest_preference = config.latest_preference,
            gitlab = config.gitlab.is_some(),
            email = config.email.is_some(),
            telegram = config.telegram.is_some(),
            "operator configuration loaded"
        );

        config
    }
}
