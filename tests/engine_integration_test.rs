// Integration tests for the update decision engine
//
// These drive the discovery outputs (candidate tags, frontier filtering)
// through the decision engine the way a reconciliation tick does, and pin
// the decision invariants.

use chrono::{NaiveDate, NaiveDateTime};
use updraft::{
    CandidateTags, Decision, ImageRef, Observation, candidates_from_names, decide,
    latest_auto_updatable, latest_overall,
};

fn names(tags: &[&str]) -> Vec<String> {
    tags.iter().map(|t| t.to_string()).collect()
}

fn date(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2022, 6, day)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

/// Run the discovery half of a tick and feed the engine, like the
/// reconciler does for one container.
fn decide_for(current: &str, tags: &[&str], frontier: i32, latest_preference: bool) -> Decision {
    let listing = names(tags);
    let candidates = CandidateTags {
        updatable: candidates_from_names(current, &listing),
        names: listing,
    };
    let latest_overall = latest_overall(&candidates.names);
    let latest_auto = latest_auto_updatable(current, &candidates, frontier);

    decide(&Observation {
        current_tag: current,
        latest_auto_updatable: &latest_auto,
        latest_overall: &latest_overall,
        current_date: None,
        latest_date: None,
        latest_preference,
    })
}

#[test]
fn test_update_within_frontier() {
    let decision = decide_for("3.2.1", &["3.2.3", "3.2.5"], 2, false);
    assert_eq!(decision, Decision::UpdateTo("3.2.5".to_string()));
}

#[test]
fn test_major_jump_notifies_instead_of_updating() {
    let decision = decide_for("3.2.2", &["4.2.1"], 2, false);
    assert_eq!(decision, Decision::NotifyOnly);
}

#[test]
fn test_up_to_date_is_noop() {
    let decision = decide_for("3.2.5", &["3.2.5", "3.2.1"], 2, false);
    assert_eq!(decision, Decision::NoAction);
}

#[test]
fn test_within_frontier_update_beats_blocked_newer_version() {
    // 3.2.5 is reachable, 4.0.0 is not; the reachable one wins and the
    // engine does not fall through to notify.
    let decision = decide_for("3.2.1", &["3.2.5", "4.0.0"], 2, false);
    assert_eq!(decision, Decision::UpdateTo("3.2.5".to_string()));
}

#[test]
fn test_update_decision_never_selects_current_or_latest() {
    for tags in [
        &["3.2.5", "latest"][..],
        &["3.2.3", "3.2.5"][..],
        &["latest"][..],
    ] {
        match decide_for("3.2.1", tags, 2, false) {
            Decision::UpdateTo(tag) => {
                assert_ne!(tag, "3.2.1");
                assert_ne!(tag, "latest");
            },
            Decision::Restart => panic!("restart requires a latest-tagged image"),
            Decision::NotifyOnly | Decision::NoAction => {},
        }
    }
}

#[test]
fn test_restart_requires_latest_tag_and_preference() {
    let observation = Observation {
        current_tag: "latest",
        latest_auto_updatable: "latest",
        latest_overall: "latest",
        current_date: Some(date(14, 9)),
        latest_date: Some(date(15, 13)),
        latest_preference: true,
    };
    assert_eq!(decide(&observation), Decision::Restart);

    // Without the preference the same observation is a no-op.
    let muted = Observation {
        latest_preference: false,
        ..observation.clone()
    };
    assert_eq!(decide(&muted), Decision::NoAction);

    // And a stale upstream latest does not restart anything.
    let unchanged = Observation {
        latest_date: Some(date(14, 9)),
        ..observation
    };
    assert_eq!(decide(&unchanged), Decision::NoAction);
}

#[test]
fn test_notify_only_means_a_newer_version_exists() {
    // Whenever the pipeline notifies, the overall newest tag differs from
    // the current one.
    for (current, tags) in [
        ("3.2.2", &["4.2.1"][..]),
        ("3.2.1", &["4.0.0", "3.1.0"][..]),
        ("2.0", &["3.0", "latest"][..]),
    ] {
        let listing = names(tags);
        let candidates = CandidateTags {
            updatable: candidates_from_names(current, &listing),
            names: listing,
        };
        let overall = latest_overall(&candidates.names);
        if decide_for(current, tags, 2, false) == Decision::NotifyOnly {
            assert_ne!(overall, current);
            assert!(!overall.is_empty());
        }
    }
}

#[test]
fn test_decisions_are_idempotent() {
    for (current, tags) in [
        ("3.2.1", &["3.2.5", "4.0.0"][..]),
        ("3.2.2", &["4.2.1"][..]),
        ("3.2.5", &["3.2.5"][..]),
    ] {
        assert_eq!(
            decide_for(current, tags, 2, false),
            decide_for(current, tags, 2, false)
        );
    }
}

#[test]
fn test_image_ref_roundtrip_through_update() {
    // An applied decision rewrites only the tag of the reference.
    let image = ImageRef::parse("registry.gitlab.com/group/containers/app:3.2.1");
    let updated = image.with_tag("3.2.5");
    assert_eq!(
        updated.to_string(),
        "registry.gitlab.com/group/containers/app:3.2.5"
    );
    assert_eq!(ImageRef::parse(&updated.to_string()), updated);
    assert!(updated.is_gitlab());
}
