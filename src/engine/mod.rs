use chrono::NaiveDateTime;

/// What the operator does about one container after looking at the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Patch the Deployment's container to the given tag.
    UpdateTo(String),
    /// Rollout-restart the Deployment so it pulls a fresh `latest`.
    Restart,
    /// A newer version exists but crosses the frontier; tell the operators.
    NotifyOnly,
    NoAction,
}

/// Everything the decision needs, already discovered by the adapters.
#[derive(Debug, Clone)]
pub struct Observation<'a> {
    pub current_tag: &'a str,
    /// Largest tag inside the frontier's free region, empty when none.
    pub latest_auto_updatable: &'a str,
    /// Newest tag overall, empty when nothing parses.
    pub latest_overall: &'a str,
    /// Publish date of the running tag, when the registry exposes one.
    pub current_date: Option<NaiveDateTime>,
    /// Publish date of the `latest` tag, when the registry exposes one.
    pub latest_date: Option<NaiveDateTime>,
    /// Whether `latest`-tagged workloads should restart on upstream pushes.
    pub latest_preference: bool,
}

/// Choose an action for one container. Pure; failures in discovery never
/// reach this point, and the same observation always yields the same
/// decision.
pub fn decide(observation: &Observation<'_>) -> Decision {
    let current = observation.current_tag;
    let auto = observation.latest_auto_updatable;
    let overall = observation.latest_overall;

    if current == "latest" && auto == "latest" {
        // A fresh latest upstream only matters when the operator opted into
        // restarts and both publish dates are known.
        if observation.latest_preference
            && let (Some(current_date), Some(latest_date)) =
                (observation.current_date, observation.latest_date)
            && current_date < latest_date
        {
            return Decision::Restart;
        }
        return Decision::NoAction;
    }

    if current != auto && auto != "latest" && !auto.is_empty() {
        return Decision::UpdateTo(auto.to_string());
    }

    if overall != current && overall != auto {
        return Decision::NotifyOnly;
    }

    Decision::NoAction
}
