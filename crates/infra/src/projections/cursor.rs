//! Shared per-stream cursor tracking for idempotent projections.

use std::collections::HashMap;
use std::sync::RwLock;

use repset_core::{AggregateId, TenantId};

/// Cursor key: one cursor per (tenant, aggregate) stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

/// Outcome of checking an incoming sequence number against a stream cursor.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CursorDecision {
    /// First unseen event after the cursor; apply it and advance.
    Apply,
    /// Replayed or duplicate delivery; safe to skip.
    Duplicate,
    /// Sequence violates monotonicity for this stream.
    OutOfOrder { last: u64 },
}

/// In-memory cursors tracking the highest applied sequence per stream.
///
/// At-least-once delivery means projections may see the same envelope twice;
/// the cursor turns redelivery into a no-op. The first event of a stream may
/// carry any positive sequence, after which strictly consecutive increments
/// are required.
#[derive(Debug, Default)]
pub struct StreamCursors {
    inner: RwLock<HashMap<CursorKey, u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `seq` against the cursor for `(tenant_id, aggregate_id)`.
    pub fn check(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        seq: u64,
    ) -> CursorDecision {
        let last = self.last(tenant_id, aggregate_id);

        if seq == 0 {
            return CursorDecision::OutOfOrder { last };
        }

        if seq <= last {
            return CursorDecision::Duplicate;
        }

        if last != 0 && seq != last + 1 {
            return CursorDecision::OutOfOrder { last };
        }

        CursorDecision::Apply
    }

    /// Record `seq` as applied for the stream.
    pub fn advance(&self, tenant_id: TenantId, aggregate_id: AggregateId, seq: u64) {
        if let Ok(mut cursors) = self.inner.write() {
            cursors.insert(
                CursorKey {
                    tenant_id,
                    aggregate_id,
                },
                seq,
            );
        }
    }

    /// Forget all cursors for a tenant (rebuild support).
    pub fn clear_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut cursors) = self.inner.write() {
            cursors.retain(|k, _| k.tenant_id != tenant_id);
        }
    }

    fn last(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> u64 {
        match self.inner.read() {
            Ok(cursors) => *cursors
                .get(&CursorKey {
                    tenant_id,
                    aggregate_id,
                })
                .unwrap_or(&0),
            Err(_) => 0,
        }
    }
}
