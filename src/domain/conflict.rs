//! Last-writer-wins conflict resolution.
//!
//! [`decide`] is the single policy applied to every synchronizable entity
//! type: the value with the strictly newer `updated_at` wins. A conflict
//! is flagged when two writers demonstrably diverged — the incoming write
//! is stale, or it is newer but was based on a server state the server
//! has since moved past. The policy is deliberately uniform and free of
//! per-field merging so that every decision can be replayed from the
//! ledger and explained to support staff.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Which value the resolver kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    /// The incoming value wins and becomes the server state.
    UseLatest,
    /// The server value is kept; the incoming write is discarded.
    KeepExisting,
}

impl ResolutionAction {
    /// Returns the action as its stored string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UseLatest => "use_latest",
            Self::KeepExisting => "keep_existing",
        }
    }

    /// Parses an action from its stored string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "use_latest" => Some(Self::UseLatest),
            "keep_existing" => Some(Self::KeepExisting),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResolutionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest committed server-side state of an entity.
#[derive(Debug, Clone)]
pub struct ServerState {
    /// Version timestamp of the committed value.
    pub updated_at: DateTime<Utc>,
    /// The committed value itself.
    pub data: serde_json::Value,
}

/// A mutation attempt arriving from a device.
///
/// `base_updated_at` is the server version the device last saw before
/// producing this write; it is what lets the resolver tell a clean
/// fast-forward apart from two writers diverging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingWrite {
    /// Entity the write targets.
    pub entity_id: uuid::Uuid,
    /// Client-side mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Server version the device last observed, when the client knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_updated_at: Option<DateTime<Utc>>,
    /// The proposed entity value.
    pub data: serde_json::Value,
}

/// Outcome of a [`decide`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Whether two writers diverged on this entity.
    pub conflict: bool,
    /// Which value wins.
    pub action: ResolutionAction,
}

/// Decides between the current server state and an incoming write.
///
/// Deterministic for a given (server state, incoming write) pair:
///
/// - no server state → the write is a create; `use_latest`, no conflict
/// - incoming strictly newer → `use_latest`; conflict only if the server
///   had also progressed past the device's `base_updated_at`
/// - timestamps equal → `keep_existing`, no conflict (idempotent replay
///   of the already-committed write)
/// - incoming older → `keep_existing`, conflict
#[must_use]
pub fn decide(server: Option<&ServerState>, incoming: &IncomingWrite) -> Resolution {
    let Some(server) = server else {
        return Resolution {
            conflict: false,
            action: ResolutionAction::UseLatest,
        };
    };

    if incoming.updated_at > server.updated_at {
        let diverged = incoming
            .base_updated_at
            .is_some_and(|base| base < server.updated_at);
        return Resolution {
            conflict: diverged,
            action: ResolutionAction::UseLatest,
        };
    }

    if incoming.updated_at == server.updated_at {
        return Resolution {
            conflict: false,
            action: ResolutionAction::KeepExisting,
        };
    }

    Resolution {
        conflict: true,
        action: ResolutionAction::KeepExisting,
    }
}

/// Returns the value the resolver kept, given the decision.
#[must_use]
pub fn resolved_value<'a>(
    resolution: Resolution,
    server: Option<&'a ServerState>,
    incoming: &'a IncomingWrite,
) -> &'a serde_json::Value {
    match resolution.action {
        ResolutionAction::UseLatest => &incoming.data,
        // KeepExisting implies a server state existed.
        ResolutionAction::KeepExisting => server.map_or(&incoming.data, |s| &s.data),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(minute: u32) -> DateTime<Utc> {
        let Some(dt) = Utc.with_ymd_and_hms(2026, 8, 1, 10, minute, 0).single() else {
            panic!("valid timestamp");
        };
        dt
    }

    fn server_at(minute: u32) -> ServerState {
        ServerState {
            updated_at: ts(minute),
            data: serde_json::json!({"from": "server"}),
        }
    }

    fn incoming_at(minute: u32, base: Option<u32>) -> IncomingWrite {
        IncomingWrite {
            entity_id: uuid::Uuid::new_v4(),
            updated_at: ts(minute),
            base_updated_at: base.map(ts),
            data: serde_json::json!({"from": "device"}),
        }
    }

    #[test]
    fn missing_entity_is_a_create() {
        let r = decide(None, &incoming_at(5, None));
        assert!(!r.conflict);
        assert_eq!(r.action, ResolutionAction::UseLatest);
    }

    #[test]
    fn newer_incoming_wins_without_conflict_when_based_on_current() {
        let server = server_at(10);
        let r = decide(Some(&server), &incoming_at(15, Some(10)));
        assert!(!r.conflict);
        assert_eq!(r.action, ResolutionAction::UseLatest);
    }

    #[test]
    fn newer_incoming_wins_with_conflict_when_writers_diverged() {
        // Device based its write on the :05 state; another writer moved
        // the server to :10 in the meantime.
        let server = server_at(10);
        let r = decide(Some(&server), &incoming_at(15, Some(5)));
        assert!(r.conflict);
        assert_eq!(r.action, ResolutionAction::UseLatest);
    }

    #[test]
    fn newer_incoming_without_base_does_not_flag_conflict() {
        let server = server_at(10);
        let r = decide(Some(&server), &incoming_at(15, None));
        assert!(!r.conflict);
        assert_eq!(r.action, ResolutionAction::UseLatest);
    }

    #[test]
    fn equal_timestamps_keep_existing_without_conflict() {
        let server = server_at(10);
        let r = decide(Some(&server), &incoming_at(10, Some(10)));
        assert!(!r.conflict);
        assert_eq!(r.action, ResolutionAction::KeepExisting);
    }

    #[test]
    fn older_incoming_is_a_conflict_and_loses() {
        let server = server_at(10);
        let r = decide(Some(&server), &incoming_at(5, None));
        assert!(r.conflict);
        assert_eq!(r.action, ResolutionAction::KeepExisting);
    }

    #[test]
    fn decision_is_deterministic() {
        let server = server_at(10);
        let incoming = incoming_at(5, Some(3));
        let first = decide(Some(&server), &incoming);
        for _ in 0..10 {
            assert_eq!(decide(Some(&server), &incoming), first);
        }
    }

    #[test]
    fn resolved_value_follows_the_action() {
        let server = server_at(10);
        let loser = incoming_at(5, None);
        let r = decide(Some(&server), &loser);
        assert_eq!(
            resolved_value(r, Some(&server), &loser),
            &serde_json::json!({"from": "server"})
        );

        let winner = incoming_at(15, None);
        let r = decide(Some(&server), &winner);
        assert_eq!(
            resolved_value(r, Some(&server), &winner),
            &serde_json::json!({"from": "device"})
        );
    }
}
