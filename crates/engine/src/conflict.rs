use std::collections::BTreeMap;

use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};

use crate::model::{Booking, Event, Resource};
use crate::window::TimeWindow;

// ---------------------------------------------------------------------------
// Scope and overlap rule
// ---------------------------------------------------------------------------

/// The identity a commitment is checked against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Scope {
    Resource(String),
    Event(String),
}

/// Which overlap test to apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OverlapRule {
    /// Only windows starting on the same calendar day can collide. Used for
    /// day-plus-times bookings and event resource assignments.
    #[default]
    SameDay,
    /// Full date-time comparison, for records carrying explicit date-times.
    Timestamp,
}

impl OverlapRule {
    pub fn collides(self, a: &TimeWindow, b: &TimeWindow) -> bool {
        match self {
            OverlapRule::SameDay => a.overlaps_same_day(b),
            OverlapRule::Timestamp => a.overlaps(b),
        }
    }
}

// ---------------------------------------------------------------------------
// Commitments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitmentKind {
    Booking,
    Event,
}

/// Display-friendly reference to a conflicting commitment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitmentRef {
    pub id: String,
    pub kind: CommitmentKind,
    pub window: TimeWindow,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl CommitmentRef {
    pub fn describe(&self) -> String {
        match &self.label {
            Some(label) => format!("'{}' at {}", label, self.window),
            None => format!("at {}", self.window),
        }
    }
}

/// Anything that occupies calendar time for some scope.
pub trait Commitment {
    fn commitment_id(&self) -> &str;
    fn window(&self) -> TimeWindow;
    fn occupies(&self, scope: &Scope) -> bool;
    fn to_ref(&self) -> CommitmentRef;
}

impl Commitment for Booking {
    fn commitment_id(&self) -> &str {
        &self.id
    }

    fn window(&self) -> TimeWindow {
        Booking::window(self)
    }

    fn occupies(&self, scope: &Scope) -> bool {
        match scope {
            Scope::Resource(id) => self.resource_id.as_deref() == Some(id.as_str()),
            Scope::Event(id) => self.event_id.as_deref() == Some(id.as_str()),
        }
    }

    fn to_ref(&self) -> CommitmentRef {
        CommitmentRef {
            id: self.id.clone(),
            kind: CommitmentKind::Booking,
            window: Booking::window(self),
            label: self
                .purpose
                .clone()
                .or_else(|| self.resource_name.clone())
                .or_else(|| self.event_title.clone()),
        }
    }
}

impl Commitment for Event {
    fn commitment_id(&self) -> &str {
        &self.id
    }

    fn window(&self) -> TimeWindow {
        Event::window(self)
    }

    /// An event occupies itself and every resource assigned to it.
    fn occupies(&self, scope: &Scope) -> bool {
        match scope {
            Scope::Resource(id) => self.uses_resource(id),
            Scope::Event(id) => self.id == *id,
        }
    }

    fn to_ref(&self) -> CommitmentRef {
        CommitmentRef {
            id: self.id.clone(),
            kind: CommitmentKind::Event,
            window: Event::window(self),
            label: Some(self.title.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Every commitment in `existing` that occupies `scope` and collides with
/// `candidate`, in input order.
///
/// Status is not looked at: callers pass only the commitments that should
/// block (usually confirmed bookings). The record named by `exclude_id` is
/// skipped so an edited record never conflicts with its own prior version.
pub fn find_conflicts<'a, C, I>(
    candidate: &TimeWindow,
    scope: &Scope,
    existing: I,
    exclude_id: Option<&str>,
    rule: OverlapRule,
) -> Vec<&'a C>
where
    C: Commitment + 'a,
    I: IntoIterator<Item = &'a C>,
{
    existing
        .into_iter()
        .filter(|c| is_conflict(*c, candidate, scope, exclude_id, rule))
        .collect()
}

/// First match only, for single booking attempts where one conflict is
/// enough to refuse.
pub fn first_conflict<'a, C, I>(
    candidate: &TimeWindow,
    scope: &Scope,
    existing: I,
    exclude_id: Option<&str>,
    rule: OverlapRule,
) -> Option<&'a C>
where
    C: Commitment + 'a,
    I: IntoIterator<Item = &'a C>,
{
    existing
        .into_iter()
        .find(|c| is_conflict(*c, candidate, scope, exclude_id, rule))
}

fn is_conflict<C: Commitment>(
    c: &C,
    candidate: &TimeWindow,
    scope: &Scope,
    exclude_id: Option<&str>,
    rule: OverlapRule,
) -> bool {
    if exclude_id.is_some_and(|id| !id.is_empty() && c.commitment_id() == id) {
        return false;
    }
    c.occupies(scope) && rule.collides(candidate, &c.window())
}

/// Conflicting events for one assigned resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceConflict {
    pub resource_id: String,
    pub resource_name: String,
    pub events: Vec<CommitmentRef>,
}

/// Check every resource assigned to `draft` against the other events'
/// assignments on the same day. Returns one entry per conflicting resource
/// with the full list of events it collides with.
///
/// When `draft` has an id (editing), the stored version of it is excluded.
pub fn event_resource_conflicts(
    draft: &Event,
    all_events: &[Event],
    resources: &[Resource],
) -> Vec<ResourceConflict> {
    let window = draft.window();
    let exclude = Some(draft.id.as_str()).filter(|id| !id.is_empty());

    let mut seen: Vec<&str> = Vec::new();
    let mut conflicts = Vec::new();

    for resource_id in &draft.assigned_resource_ids {
        if seen.contains(&resource_id.as_str()) {
            continue;
        }
        seen.push(resource_id);

        let scope = Scope::Resource(resource_id.clone());
        let hits = find_conflicts(&window, &scope, all_events, exclude, OverlapRule::SameDay);
        if hits.is_empty() {
            continue;
        }

        let resource_name = resources
            .iter()
            .find(|r| r.id == *resource_id)
            .map(|r| r.name.clone())
            .unwrap_or_else(|| "Unknown".to_string());
        conflicts.push(ResourceConflict {
            resource_id: resource_id.clone(),
            resource_name,
            events: hits.into_iter().map(Commitment::to_ref).collect(),
        });
    }

    conflicts
}

// ---------------------------------------------------------------------------
// Double-booking audit
// ---------------------------------------------------------------------------

/// A group of confirmed bookings on one resource that transitively overlap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoubleBooking {
    pub resource_id: String,
    pub bookings: Vec<CommitmentRef>,
}

/// Find confirmed resource bookings that already overlap each other.
///
/// Concurrent approvals can both pass their pre-check against a stale
/// snapshot; this reports the result. Overlapping pairs are merged into
/// clusters (A overlaps B, B overlaps C gives one cluster of three).
/// Clusters are ordered by resource id, bookings by input order.
pub fn audit_double_bookings(bookings: &[Booking]) -> Vec<DoubleBooking> {
    let mut by_resource: BTreeMap<&str, Vec<&Booking>> = BTreeMap::new();
    for b in bookings.iter().filter(|b| b.is_confirmed()) {
        if let Some(rid) = b.resource_id.as_deref() {
            by_resource.entry(rid).or_default().push(b);
        }
    }

    let mut found = Vec::new();
    for (resource_id, group) in by_resource {
        let n = group.len();
        if n < 2 {
            continue;
        }

        let mut sets: UnionFind<usize> = UnionFind::new(n);
        let mut involved = vec![false; n];
        for i in 0..n {
            for j in (i + 1)..n {
                if group[i].window().overlaps(&group[j].window()) {
                    sets.union(i, j);
                    involved[i] = true;
                    involved[j] = true;
                }
            }
        }

        // Cluster label -> member indices, keyed by first appearance
        let labels = sets.into_labeling();
        let mut clusters: Vec<(usize, Vec<usize>)> = Vec::new();
        for i in (0..n).filter(|&i| involved[i]) {
            match clusters.iter_mut().find(|(label, _)| *label == labels[i]) {
                Some((_, members)) => members.push(i),
                None => clusters.push((labels[i], vec![i])),
            }
        }

        for (_, members) in clusters {
            found.push(DoubleBooking {
                resource_id: resource_id.to_string(),
                bookings: members.into_iter().map(|i| group[i].to_ref()).collect(),
            });
        }
    }

    found
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
