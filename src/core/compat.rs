//! Compatibility evaluation
//!
//! Pure functions mapping an installed-to-target version delta plus the
//! remote breaking-change list to a verdict. Re-run on every catalog
//! refresh; never cached, since breaking-change data can change upstream.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A breaking change registered against a library release.
///
/// `capability` scopes the change: a change tagged `mqtt` does not block a
/// hub that never declared the `mqtt` capability. `since` is the first
/// version carrying the change; an absent `since` applies to any upgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakingChange {
    pub description: String,
    #[serde(default)]
    pub capability: Option<String>,
    #[serde(default)]
    pub since: Option<String>,
}

/// Result of evaluating one catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub compatible: bool,
    /// Descriptions of the changes that block this upgrade. Empty iff
    /// compatible.
    pub breaking_changes: Vec<String>,
}

/// Evaluate whether upgrading from `current` to `latest` is expected to
/// break this hub, given its declared capability set.
///
/// Deterministic and side-effect-free. An up-to-date (or downgraded-remote)
/// entry is always compatible with an empty list.
pub fn evaluate(
    current: &str,
    latest: &str,
    changes: &[BreakingChange],
    capabilities: &[String],
) -> Verdict {
    if !is_newer(current, latest) {
        return Verdict {
            compatible: true,
            breaking_changes: Vec::new(),
        };
    }

    let applicable: Vec<String> = changes
        .iter()
        .filter(|c| applies_to_delta(c.since.as_deref(), current, latest))
        .filter(|c| match &c.capability {
            Some(cap) => capabilities.iter().any(|declared| declared == cap),
            None => true,
        })
        .map(|c| c.description.clone())
        .collect();

    Verdict {
        compatible: applicable.is_empty(),
        breaking_changes: applicable,
    }
}

/// True when `latest` is strictly newer than `current`.
pub fn is_newer(current: &str, latest: &str) -> bool {
    cmp_versions(current, latest) == Ordering::Less
}

/// A change first shipped in `since` applies when `current < since <= latest`.
/// A change without `since` applies to every upgrade delta.
fn applies_to_delta(since: Option<&str>, current: &str, latest: &str) -> bool {
    match since {
        None => true,
        Some(since) => {
            cmp_versions(current, since) == Ordering::Less
                && cmp_versions(since, latest) != Ordering::Greater
        }
    }
}

/// Compare two version strings. Prefers strict semver; falls back to
/// segment-wise numeric comparison for non-semver tags like `1.2`.
fn cmp_versions(a: &str, b: &str) -> Ordering {
    if let (Ok(va), Ok(vb)) = (semver::Version::parse(a), semver::Version::parse(b)) {
        return va.cmp(&vb);
    }

    let parse = |v: &str| -> Vec<u64> {
        v.split('.')
            .map(|s| {
                s.chars()
                    .take_while(char::is_ascii_digit)
                    .collect::<String>()
                    .parse::<u64>()
                    .unwrap_or(0)
            })
            .collect()
    };

    let pa = parse(a);
    let pb = parse(b);
    for i in 0..std::cmp::max(pa.len(), pb.len()) {
        let av = pa.get(i).unwrap_or(&0);
        let bv = pb.get(i).unwrap_or(&0);
        match av.cmp(bv) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(desc: &str, capability: Option<&str>, since: Option<&str>) -> BreakingChange {
        BreakingChange {
            description: desc.to_string(),
            capability: capability.map(String::from),
            since: since.map(String::from),
        }
    }

    fn caps(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_is_newer() {
        assert!(is_newer("1.2.3", "1.2.4"));
        assert!(is_newer("1.2.3", "2.0.0"));
        assert!(is_newer("0.10.4", "0.11.5"));
        assert!(!is_newer("1.2.3", "1.2.3"));
        assert!(!is_newer("1.11.5", "1.10.4"));
        // non-semver tags fall back to numeric segments
        assert!(is_newer("1.2", "1.10"));
        assert!(!is_newer("1.10", "1.2"));
    }

    #[test]
    fn test_up_to_date_is_compatible() {
        let v = evaluate(
            "0.14.0",
            "0.14.0",
            &[change("renamed permit-join API", None, None)],
            &caps(&["zigbee"]),
        );
        assert!(v.compatible);
        assert!(v.breaking_changes.is_empty());
    }

    #[test]
    fn test_untagged_change_blocks() {
        let v = evaluate(
            "0.14.0",
            "0.15.0",
            &[change("event payload schema changed", None, None)],
            &[],
        );
        assert!(!v.compatible);
        assert_eq!(v.breaking_changes, vec!["event payload schema changed"]);
    }

    #[test]
    fn test_capability_scoping() {
        let changes = [
            change("MQTT v5 only", Some("mqtt"), None),
            change("drops WEP support", Some("wifi"), None),
        ];
        // hub only uses mqtt, so only the mqtt change applies
        let v = evaluate("1.0.0", "2.0.0", &changes, &caps(&["mqtt"]));
        assert!(!v.compatible);
        assert_eq!(v.breaking_changes, vec!["MQTT v5 only"]);

        // hub uses neither capability: clean upgrade
        let v = evaluate("1.0.0", "2.0.0", &changes, &caps(&["zigbee"]));
        assert!(v.compatible);
    }

    #[test]
    fn test_since_outside_delta_ignored() {
        let changes = [change("config format rewrite", None, Some("0.12.0"))];
        // change shipped before our installed version, already absorbed
        let v = evaluate("0.12.0", "0.14.0", &changes, &[]);
        assert!(v.compatible);
        // change lands inside the delta
        let v = evaluate("0.11.0", "0.14.0", &changes, &[]);
        assert!(!v.compatible);
        // change is beyond the target version
        let v = evaluate("0.10.0", "0.11.9", &changes, &[]);
        assert!(v.compatible);
    }

    #[test]
    fn test_evaluate_is_deterministic() {
        let changes = [change("a", None, None), change("b", Some("mqtt"), None)];
        let first = evaluate("1.0.0", "1.1.0", &changes, &caps(&["mqtt"]));
        let second = evaluate("1.0.0", "1.1.0", &changes, &caps(&["mqtt"]));
        assert_eq!(first, second);
    }
}
