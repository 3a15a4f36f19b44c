//! Record-level conflict resolution.
//!
//! `resolve` is pure: given the local version and whichever remote
//! versions exist for the same logical record, it picks a winner per the
//! configured policy and reports which origins hold a losing version and
//! must be sent the winner. The winner always carries a version strictly
//! greater than every input, so a resolution can never loop.

use crate::sync::types::{ConflictPolicy, Origin, SyncableRecord};

/// Outcome of resolving one logical record.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub winner: SyncableRecord,
    /// Origins that presented a losing version; the winner must be
    /// re-pushed to each of them.
    pub repush: Vec<Origin>,
}

/// Fixed origin priority for deterministic tie-breaks:
/// Local > Backend > Calendar.
fn origin_rank(origin: Origin) -> u8 {
    match origin {
        Origin::Local => 3,
        Origin::Backend => 2,
        Origin::Calendar => 1,
    }
}

/// Resolve a conflict between up to three versions of one record.
///
/// Deletion handling runs before the policy: a deletion whose version is
/// equal to or newer than every surviving edit wins outright, so a delete
/// is never silently undone by an older edit. A strictly newer edit may
/// still supersede a deletion.
pub fn resolve(
    local: &SyncableRecord,
    remote: Option<&SyncableRecord>,
    external: Option<&SyncableRecord>,
    policy: ConflictPolicy,
) -> Resolution {
    let mut candidates: Vec<&SyncableRecord> = vec![local];
    candidates.extend(remote);
    candidates.extend(external);

    let max_version = candidates.iter().map(|c| c.version).max().unwrap_or(0);

    let chosen = pick_deletion(&candidates).unwrap_or_else(|| match policy {
        ConflictPolicy::NewerWins => pick_newest(&candidates),
        ConflictPolicy::LocalWins => local,
        ConflictPolicy::RemoteWins => remote.or(external).unwrap_or(local),
    });

    let mut winner = chosen.clone();
    winner.version = max_version + 1;

    let repush = candidates
        .iter()
        .filter(|c| !std::ptr::eq(**c, chosen))
        .map(|c| c.origin)
        .collect();

    Resolution { winner, repush }
}

/// A deletion wins when no surviving edit is strictly newer than it.
fn pick_deletion<'a>(candidates: &[&'a SyncableRecord]) -> Option<&'a SyncableRecord> {
    let best_deletion = candidates
        .iter()
        .filter(|c| c.deleted)
        .max_by_key(|c| (c.version, origin_rank(c.origin)))
        .copied()?;
    let newest_edit = candidates
        .iter()
        .filter(|c| !c.deleted)
        .map(|c| c.version)
        .max();
    match newest_edit {
        Some(edit_version) if edit_version > best_deletion.version => None,
        _ => Some(best_deletion),
    }
}

fn pick_newest<'a>(candidates: &[&'a SyncableRecord]) -> &'a SyncableRecord {
    candidates
        .iter()
        .max_by_key(|c| (c.updated_at, origin_rank(c.origin)))
        .copied()
        .expect("at least the local candidate is present")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::types::RecordKind;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap()
    }

    fn record(origin: Origin, version: i64, updated_at: DateTime<Utc>) -> SyncableRecord {
        SyncableRecord {
            id: "rec-1".to_string(),
            kind: RecordKind::Item,
            origin,
            version,
            updated_at,
            deleted: false,
            data: serde_json::json!({"origin": origin.as_str(), "v": version}),
        }
    }

    #[test]
    fn test_newer_wins_prefers_later_timestamp() {
        let local = record(Origin::Local, 3, base_time() + Duration::seconds(10));
        let remote = record(Origin::Backend, 2, base_time() + Duration::seconds(5));
        let res = resolve(&local, Some(&remote), None, ConflictPolicy::NewerWins);
        assert_eq!(res.winner.data, local.data);
        assert!(res.winner.version > 3);
        assert_eq!(res.repush, vec![Origin::Backend]);
    }

    #[test]
    fn test_newer_wins_tie_breaks_by_origin_priority() {
        let local = record(Origin::Local, 1, base_time());
        let remote = record(Origin::Backend, 2, base_time());
        let external = record(Origin::Calendar, 3, base_time());
        let res = resolve(
            &local,
            Some(&remote),
            Some(&external),
            ConflictPolicy::NewerWins,
        );
        assert_eq!(res.winner.origin, Origin::Local);
        assert_eq!(res.winner.version, 4);
        assert_eq!(res.repush, vec![Origin::Backend, Origin::Calendar]);
    }

    #[test]
    fn test_local_wins_ignores_timestamps_and_bumps_version() {
        let local = record(Origin::Local, 1, base_time());
        let remote = record(Origin::Backend, 7, base_time() + Duration::hours(1));
        let res = resolve(&local, Some(&remote), None, ConflictPolicy::LocalWins);
        assert_eq!(res.winner.origin, Origin::Local);
        // The decision still propagates: version above all inputs.
        assert_eq!(res.winner.version, 8);
        assert_eq!(res.repush, vec![Origin::Backend]);
    }

    #[test]
    fn test_remote_wins_prefers_backend_over_calendar() {
        let local = record(Origin::Local, 5, base_time() + Duration::hours(2));
        let remote = record(Origin::Backend, 2, base_time());
        let external = record(Origin::Calendar, 3, base_time());
        let res = resolve(
            &local,
            Some(&remote),
            Some(&external),
            ConflictPolicy::RemoteWins,
        );
        assert_eq!(res.winner.origin, Origin::Backend);
        assert_eq!(res.winner.version, 6);
        assert_eq!(res.repush, vec![Origin::Local, Origin::Calendar]);
    }

    #[test]
    fn test_deletion_beats_equal_or_older_edit() {
        let mut local = record(Origin::Local, 4, base_time());
        local.deleted = true;
        // Remote edit at the same version must not undo the delete.
        let remote = record(Origin::Backend, 4, base_time() + Duration::hours(3));
        let res = resolve(&local, Some(&remote), None, ConflictPolicy::NewerWins);
        assert!(res.winner.deleted);
        assert_eq!(res.winner.version, 5);
    }

    #[test]
    fn test_strictly_newer_edit_supersedes_deletion() {
        let mut local = record(Origin::Local, 4, base_time());
        local.deleted = true;
        let remote = record(Origin::Backend, 5, base_time() + Duration::hours(3));
        let res = resolve(&local, Some(&remote), None, ConflictPolicy::NewerWins);
        assert!(!res.winner.deleted);
        assert_eq!(res.winner.origin, Origin::Backend);
    }

    #[test]
    fn test_local_wins_still_honors_local_deletion() {
        // Local deleted at v4; remote edited on top of v4 without seeing
        // the delete. The deletion holds.
        let mut local = record(Origin::Local, 4, base_time());
        local.deleted = true;
        let remote = record(Origin::Backend, 4, base_time() + Duration::minutes(30));
        let res = resolve(&local, Some(&remote), None, ConflictPolicy::LocalWins);
        assert!(res.winner.deleted);
        assert!(res.winner.version > 4);
        assert_eq!(res.repush, vec![Origin::Backend]);
    }

    #[test]
    fn test_winner_version_exceeds_all_inputs() {
        let local = record(Origin::Local, 9, base_time());
        let remote = record(Origin::Backend, 12, base_time() - Duration::hours(1));
        let external = record(Origin::Calendar, 11, base_time() - Duration::hours(2));
        for policy in [
            ConflictPolicy::NewerWins,
            ConflictPolicy::LocalWins,
            ConflictPolicy::RemoteWins,
        ] {
            let res = resolve(&local, Some(&remote), Some(&external), policy);
            assert_eq!(res.winner.version, 13);
        }
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let local = record(Origin::Local, 2, base_time());
        let remote = record(Origin::Backend, 3, base_time());
        let a = resolve(&local, Some(&remote), None, ConflictPolicy::NewerWins);
        let b = resolve(&local, Some(&remote), None, ConflictPolicy::NewerWins);
        assert_eq!(a, b);
    }
}
