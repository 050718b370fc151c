use lazy_static::lazy_static;
use pep440_rs::Version;
use regex::Regex;
use std::str::FromStr;

lazy_static! {
    /// The version number embedded in a tag: the first run of digits and dots.
    static ref VERSION_SUBSTRING: Regex = Regex::new(r"(\d\.?)+").unwrap();
}

/// A tag split around its embedded version number.
///
/// `3.8-alpine` becomes `{ prefix: "", number: "3.8", suffix: "-alpine" }`.
/// Tags are only comparable when both prefix and suffix match exactly;
/// `3.8-alpine` and `3.8` are different flavours of the same release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagParts {
    pub prefix: String,
    pub number: String,
    pub suffix: String,
}

/// Split a tag around its version number, or `None` for tags like `latest`
/// and `stable` that carry no digits.
pub fn split_tag(tag: &str) -> Option<TagParts> {
    let found = VERSION_SUBSTRING.find(tag)?;
    Some(TagParts {
        prefix: tag[..found.start()].to_string(),
        number: found.as_str().to_string(),
        suffix: tag[found.end()..].to_string(),
    })
}

/// Whether the whole string is a well-formed PEP 440 version.
pub fn is_pep440(v: &str) -> bool {
    Version::from_str(v).is_ok()
}

/// Partition tags into PEP 440-parsable and everything else.
pub fn filter_pep440(tags: &[String]) -> (Vec<String>, Vec<String>) {
    let mut valid = Vec::new();
    let mut invalid = Vec::new();
    for tag in tags {
        if is_pep440(tag) {
            valid.push(tag.clone());
        } else {
            invalid.push(tag.clone());
        }
    }
    (valid, invalid)
}

/// Decide whether moving from `curr` to `cand` stays within the automatic
/// update region defined by the version frontier.
///
/// The frontier splits a dotted version number into a locked prefix and a
/// free suffix: `frontier = 2` reads `3.5.2.1` as `3.5|.2.1`. A change before
/// the frontier is too big to apply unattended; a change after it is routine.
///
/// A frontier of zero or less, or one deeper than the shorter version number,
/// disables the check entirely.
pub fn should_auto_update(curr: &str, cand: &str, frontier: i32) -> bool {
    if curr == "latest" && cand == "latest" {
        return true;
    }
    let cand_levels: Vec<&str> = cand.split('.').collect();
    let curr_levels: Vec<&str> = curr.split('.').collect();
    let shortest = cand_levels.len().min(curr_levels.len());
    if frontier <= 0 || frontier as usize > shortest {
        return true;
    }
    if curr == cand {
        return false;
    }
    let frontier = frontier as usize;
    // Segments compare as strings, matching the behaviour this operator
    // replaces ("10" < "9"). Pinned by tests; do not switch to numeric
    // comparison without revisiting them.
    for i in 0..frontier {
        if cand_levels[i] > curr_levels[i] {
            return false;
        }
    }
    for i in frontier..shortest {
        if cand_levels[i] > curr_levels[i] {
            return true;
        }
    }
    // Equal at every shared level: if the current number is the shorter one,
    // the candidate refines it (3.1.5 -> 3.1.5.1).
    shortest == curr_levels.len()
}

/// The newest tag overall. `latest` wins outright when present; otherwise the
/// maximum PEP 440-parsable tag, rendered normalized. Empty when nothing
/// qualifies.
pub fn latest_overall(tags: &[String]) -> String {
    if tags.iter().any(|t| t == "latest") {
        return "latest".to_string();
    }
    let (valid, _) = filter_pep440(tags);
    valid
        .iter()
        .filter_map(|v| Version::from_str(v).ok())
        .max()
        .map(|v| v.to_string())
        .unwrap_or_default()
}

/// A discovered tag that is flavour-comparable to the current one, keyed by
/// its parsed version number.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub version: Version,
    /// The version number exactly as extracted from the tag.
    pub number: String,
    /// The full tag name the version was extracted from.
    pub tag: String,
}

/// What a registry adapter discovered for one image.
#[derive(Debug, Clone, Default)]
pub struct CandidateTags {
    /// Every tag name observed, in registry order, `latest` included.
    pub names: Vec<String>,
    /// The flavour-comparable subset with parsable version numbers.
    pub updatable: Vec<Candidate>,
}

/// Build candidates from a plain tag listing: keep tags whose prefix and
/// suffix partitions match the current tag's, excluding the current version
/// number itself.
pub fn candidates_from_names(current_tag: &str, names: &[String]) -> Vec<Candidate> {
    let Some(curr) = split_tag(current_tag) else {
        return Vec::new();
    };
    names
        .iter()
        .filter_map(|name| {
            let parts = split_tag(name)?;
            if parts.prefix != curr.prefix
                || parts.suffix != curr.suffix
                || parts.number == curr.number
            {
                return None;
            }
            let version = Version::from_str(&parts.number).ok()?;
            Some(Candidate {
                version,
                number: parts.number,
                tag: name.clone(),
            })
        })
        .collect()
}

/// The largest discovered tag the current image may move to automatically:
/// strictly newer than the current version and inside the frontier's free
/// region. Empty when no candidate qualifies.
///
/// A `latest`-tagged image can only "update" to `latest` itself, which the
/// decision engine turns into a restart or a no-op.
pub fn latest_auto_updatable(current_tag: &str, candidates: &CandidateTags, frontier: i32) -> String {
    if current_tag == "latest" {
        if candidates.names.iter().any(|n| n == "latest") {
            return "latest".to_string();
        }
        return String::new();
    }

    let Some(curr) = split_tag(current_tag) else {
        return String::new();
    };
    let Ok(curr_version) = Version::from_str(&curr.number) else {
        return String::new();
    };

    candidates
        .updatable
        .iter()
        .filter(|c| c.version > curr_version && should_auto_update(&curr.number, &c.number, frontier))
        .max_by(|a, b| a.version.cmp(&b.version))
        .map(|c| c.tag.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(tags: &[&str]) -> Vec<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_split_tag_partitions() {
        let parts = split_tag("3.8-alpine").unwrap();
        assert_eq!(parts.prefix, "");
        assert_eq!(parts.number, "3.8");
        assert_eq!(parts.suffix, "-alpine");

        let parts = split_tag("v1.2.3").unwrap();
        assert_eq!(parts.prefix, "v");
        assert_eq!(parts.number, "1.2.3");
        assert_eq!(parts.suffix, "");

        assert!(split_tag("latest").is_none());
        assert!(split_tag("stable").is_none());
    }

    #[test]
    fn test_frontier_disabled() {
        // Negative or zero frontier always allows the update.
        assert!(should_auto_update("3.2.0", "3.2.1", -1));
        assert!(should_auto_update("3.2.0", "3.2.1", 0));
        // A frontier deeper than the shorter version number counts as
        // disabled too.
        assert!(should_auto_update("3.2.0", "3.2.1", 5));
    }

    #[test]
    fn test_frontier_at_shared_depth() {
        // With the frontier at the shared depth the locked region covers
        // every compared segment, so a newer suffix cannot trigger...
        assert!(!should_auto_update("3.2.0", "3.2.1", 3));
        // ...but a finer-grained successor of a shorter current version
        // still passes.
        assert!(should_auto_update("3.2", "3.2.1", 2));
    }

    #[test]
    fn test_frontier_blocks_locked_prefix() {
        assert!(!should_auto_update("3.2.2", "4.2.1", 2));
        assert!(!should_auto_update("3.2.2", "4.2.5", 2));
    }

    #[test]
    fn test_frontier_allows_free_suffix() {
        assert!(should_auto_update("3.2.2", "3.2.5", 2));
    }

    #[test]
    fn test_equal_versions_do_not_update() {
        assert!(!should_auto_update("3.2.5", "3.2.5", 2));
    }

    #[test]
    fn test_latest_refresh_is_updatable() {
        assert!(should_auto_update("latest", "latest", 2));
    }

    #[test]
    fn test_shorter_candidate_with_newer_suffix() {
        // 3.1.2.1 -> 3.1.5: the shared levels show a newer suffix.
        assert!(should_auto_update("3.1.2.1", "3.1.5", 2));
        assert!(!should_auto_update("3.1.2.1", "3.2.5", 2));
    }

    #[test]
    fn test_finer_grained_successor() {
        // 3.1.2 -> 3.1.5.1 and the substring case 3.1.5 -> 3.1.5.1.
        assert!(should_auto_update("3.1.2", "3.1.5.1", 2));
        assert!(should_auto_update("3.1.5", "3.1.5.1", 2));
        // The reverse is not a successor.
        assert!(!should_auto_update("3.2.5.1", "3.1.2", 2));
    }

    #[test]
    fn test_not_symmetric() {
        // A major jump is blocked, but the reverse direction slides through
        // the free region.
        assert!(!should_auto_update("3.2.2", "4.2.1", 2));
        assert!(should_auto_update("4.2.1", "3.2.2", 2));
    }

    #[test]
    fn frontier_pins_string_segment_comparison() {
        // Segments compare lexicographically, so "10" sorts below "9". This
        // mirrors the behaviour of the tooling this operator replaces and is
        // intentionally preserved.
        assert!("10" < "9");
        // 1.9.0 -> 1.10 is newer numerically, but "10" > "9" is false under
        // string comparison, so the free region never triggers.
        assert!(!should_auto_update("1.9.0", "1.10", 1));
        // A 2 -> 10 major jump slips through the locked region for the same
        // reason.
        assert!(should_auto_update("2.0.0", "10.0.0", 1));
        // Single-digit majors are still caught.
        assert!(!should_auto_update("2.0.0", "9.0.0", 1));
    }

    #[test]
    fn test_filter_pep440() {
        let (valid, invalid) = filter_pep440(&names(&["3.2.1", "latest", "3.8-alpine", "1.0rc1"]));
        assert_eq!(valid, names(&["3.2.1", "1.0rc1"]));
        assert_eq!(invalid, names(&["latest", "3.8-alpine"]));
    }

    #[test]
    fn test_latest_overall_prefers_latest_tag() {
        assert_eq!(latest_overall(&names(&["3.2.1", "latest", "3.3.0"])), "latest");
    }

    #[test]
    fn test_latest_overall_max_pep440() {
        assert_eq!(latest_overall(&names(&["3.2.1", "3.10.0", "3.3.0"])), "3.10.0");
        assert_eq!(latest_overall(&names(&["alpine", "stable"])), "");
        assert_eq!(latest_overall(&[]), "");
    }

    #[test]
    fn test_candidates_respect_flavour_partitions() {
        let candidates = candidates_from_names(
            "3.8-alpine",
            &names(&["3.9-alpine", "3.9", "3.8-alpine", "latest", "3.10-slim"]),
        );
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].tag, "3.9-alpine");
        assert_eq!(candidates[0].number, "3.9");
    }

    #[test]
    fn test_latest_auto_updatable_picks_largest_within_frontier() {
        let candidates = CandidateTags {
            names: names(&["3.2.1", "3.2.5", "4.0.0"]),
            updatable: candidates_from_names("3.2.1", &names(&["3.2.1", "3.2.5", "4.0.0"])),
        };
        assert_eq!(latest_auto_updatable("3.2.1", &candidates, 2), "3.2.5");
        // Frontier disabled: the major jump wins.
        assert_eq!(latest_auto_updatable("3.2.1", &candidates, 0), "4.0.0");
    }

    #[test]
    fn test_latest_auto_updatable_empty_when_blocked() {
        let candidates = CandidateTags {
            names: names(&["4.0.0"]),
            updatable: candidates_from_names("3.2.1", &names(&["4.0.0"])),
        };
        assert_eq!(latest_auto_updatable("3.2.1", &candidates, 2), "");
    }

    #[test]
    fn test_latest_auto_updatable_latest_only() {
        let candidates = CandidateTags {
            names: names(&["latest"]),
            updatable: Vec::new(),
        };
        assert_eq!(latest_auto_updatable("latest", &candidates, 2), "latest");
        // A versioned current tag cannot move to a bare latest.
        assert_eq!(latest_auto_updatable("3.2.1", &candidates, 2), "");
    }

    #[test]
    fn test_latest_auto_updatable_ignores_older_candidates() {
        let candidates = CandidateTags {
            names: names(&["3.1.0", "3.2.0"]),
            updatable: candidates_from_names("3.2.1", &names(&["3.1.0", "3.2.0"])),
        };
        assert_eq!(latest_auto_updatable("3.2.1", &candidates, 2), "");
    }
}
