use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use repset_attendance::{AttendanceEvent, AttendanceLogId, DenialReason};
use repset_core::TenantId;
use repset_events::EventEnvelope;
use repset_members::MemberId;
use repset_memberships::MembershipId;

use crate::projections::cursor::{CursorDecision, StreamCursors};
use crate::read_model::TenantStore;

/// Result of one check-in attempt as recorded in the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    Accepted {
        membership_id: MembershipId,
        activity: String,
        remaining: u32,
    },
    Denied {
        reason: DenialReason,
    },
}

/// One line of the attendance feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceEntry {
    pub occurred_at: DateTime<Utc>,
    pub member_id: Option<MemberId>,
    pub outcome: EntryOutcome,
}

/// All check-in attempts for one tenant-day, newest last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayFeed {
    pub log_id: AttendanceLogId,
    pub date: NaiveDate,
    pub accepted_count: u64,
    pub denied_count: u64,
    pub entries: Vec<AttendanceEntry>,
}

#[derive(Debug, Error)]
pub enum AttendanceFeedError {
    #[error("failed to deserialize attendance event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Attendance feed projection.
///
/// Mirrors the per-day attendance log into a queryable feed so the front desk
/// can review who came in today and why anyone was turned away.
#[derive(Debug)]
pub struct AttendanceFeedProjection<S>
where
    S: TenantStore<NaiveDate, DayFeed>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> AttendanceFeedProjection<S>
where
    S: TenantStore<NaiveDate, DayFeed>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get_day(&self, tenant_id: TenantId, date: NaiveDate) -> Option<DayFeed> {
        self.store.get(tenant_id, &date)
    }

    /// Day feeds within `[from, to]`, ordered by date.
    pub fn range(&self, tenant_id: TenantId, from: NaiveDate, to: NaiveDate) -> Vec<DayFeed> {
        let mut days: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|feed| feed.date >= from && feed.date <= to)
            .collect();
        days.sort_by_key(|feed| feed.date);
        days
    }

    /// Apply a published envelope into the projection.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), AttendanceFeedError> {
        if envelope.aggregate_type() != "attendance.log" {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        match self.cursors.check(tenant_id, aggregate_id, seq) {
            CursorDecision::Duplicate => return Ok(()),
            CursorDecision::OutOfOrder { last } => {
                return Err(AttendanceFeedError::NonMonotonicSequence { last, found: seq });
            }
            CursorDecision::Apply => {}
        }

        let event: AttendanceEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| AttendanceFeedError::Deserialize(e.to_string()))?;

        let (event_tenant, log_id, date) = match &event {
            AttendanceEvent::CheckInAccepted(e) => (e.tenant_id, e.log_id, e.date),
            AttendanceEvent::CheckInDenied(e) => (e.tenant_id, e.log_id, e.date),
        };

        if event_tenant != tenant_id {
            return Err(AttendanceFeedError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }

        if log_id.0 != aggregate_id {
            return Err(AttendanceFeedError::TenantIsolation(
                "event log_id does not match envelope aggregate_id".to_string(),
            ));
        }

        let mut feed = self.store.get(tenant_id, &date).unwrap_or(DayFeed {
            log_id,
            date,
            accepted_count: 0,
            denied_count: 0,
            entries: Vec::new(),
        });

        match event {
            AttendanceEvent::CheckInAccepted(e) => {
                feed.accepted_count += 1;
                feed.entries.push(AttendanceEntry {
                    occurred_at: e.occurred_at,
                    member_id: Some(e.member_id),
                    outcome: EntryOutcome::Accepted {
                        membership_id: e.membership_id,
                        activity: e.activity,
                        remaining: e.remaining,
                    },
                });
            }
            AttendanceEvent::CheckInDenied(e) => {
                feed.denied_count += 1;
                feed.entries.push(AttendanceEntry {
                    occurred_at: e.occurred_at,
                    member_id: e.member_id,
                    outcome: EntryOutcome::Denied { reason: e.reason },
                });
            }
        }

        self.store.upsert(tenant_id, date, feed);
        self.cursors.advance(tenant_id, aggregate_id, seq);
        Ok(())
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), AttendanceFeedError> {
        let mut envs: Vec<_> = envelopes.into_iter().collect();

        let mut tenants = envs.iter().map(|e| e.tenant_id()).collect::<Vec<_>>();
        tenants.sort_by_key(|t| *t.as_uuid().as_bytes());
        tenants.dedup();
        for tenant in tenants {
            self.store.clear_tenant(tenant);
            self.cursors.clear_tenant(tenant);
        }

        envs.sort_by_key(|e| {
            (
                *e.tenant_id().as_uuid().as_bytes(),
                *e.aggregate_id().as_uuid().as_bytes(),
                e.sequence_number(),
            )
        });

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}
