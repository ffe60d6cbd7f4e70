//! Application services: infra wiring plus the operations routes call into.
//!
//! One `AppServices` instance owns the event-sourced write path (dispatcher
//! over the in-memory store and bus) and the read path (projections fed by a
//! background subscriber). It also implements the check-in seams, so the door
//! flow runs against the same dispatcher and read models as everything else.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;

use repset_attendance::{
    AssignmentRecord, AttendanceCommand, AttendanceGateway, AttendanceLog, CheckInError,
    CheckInReceipt, CheckInService, ConsumeOutcome, DenialReason, GatewayError, MemberRecord,
    RecordAcceptedCheckIn, RecordDeniedCheckIn, attendance_stream_id,
};
use repset_cashbook::{
    Actor, CloseDailyCash, DailyCash, DailyCashCommand, OpenDailyCash, RangeSummary,
    RecordTransaction, TransactionCategory, TransactionEntry, TransactionKind, day_stream_id,
};
use repset_core::{Aggregate, AggregateId, DomainError, TenantId, UserId};
use repset_events::{EventBus, EventEnvelope, InMemoryEventBus};
use repset_infra::{
    command_dispatcher::{CommandDispatcher, DispatchError},
    event_store::{InMemoryEventStore, StoredEvent},
    projections::{
        attendance_feed::{AttendanceFeedProjection, DayFeed},
        daily_cash::{DailyCashView, DailyCashViewProjection},
        member_directory::{MemberDirectoryProjection, MemberView},
        membership_roster::{AssignmentView, MembershipRosterProjection},
    },
    read_model::InMemoryTenantStore,
};
use repset_members::{
    AccrueDebt, MemberCommand, MemberEvent, MemberId, MemberStatus, SettleDebt,
};
use repset_memberships::{
    AssignMembership, ConsumeAttendance, MembershipAssignment, MembershipCommand, MembershipEvent,
    MembershipId, PaymentStatus,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub type Dispatcher = CommandDispatcher<
    Arc<InMemoryEventStore>,
    Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>,
>;
pub type Directory = MemberDirectoryProjection<Arc<InMemoryTenantStore<MemberId, MemberView>>>;
pub type Roster = MembershipRosterProjection<Arc<InMemoryTenantStore<MembershipId, AssignmentView>>>;
pub type CashBook = DailyCashViewProjection<Arc<InMemoryTenantStore<NaiveDate, DailyCashView>>>;
pub type Feed = AttendanceFeedProjection<Arc<InMemoryTenantStore<NaiveDate, DayFeed>>>;

pub struct AppServices {
    dispatcher: Arc<Dispatcher>,
    directory: Arc<Directory>,
    roster: Arc<Roster>,
    cash: Arc<CashBook>,
    feed: Arc<Feed>,
}

/// Wire up in-memory infrastructure: store, bus, dispatcher, projections, and
/// the bus→projection subscriber.
pub fn build_services() -> AppServices {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Arc<InMemoryEventBus<EventEnvelope<JsonValue>>> = Arc::new(InMemoryEventBus::new());

    let directory: Arc<Directory> = Arc::new(MemberDirectoryProjection::new(Arc::new(
        InMemoryTenantStore::new(),
    )));
    let roster: Arc<Roster> = Arc::new(MembershipRosterProjection::new(Arc::new(
        InMemoryTenantStore::new(),
    )));
    let cash: Arc<CashBook> = Arc::new(DailyCashViewProjection::new(Arc::new(
        InMemoryTenantStore::new(),
    )));
    let feed: Arc<Feed> = Arc::new(AttendanceFeedProjection::new(Arc::new(
        InMemoryTenantStore::new(),
    )));

    // Background subscriber: bus → projections.
    {
        let sub = bus.subscribe();
        let directory = directory.clone();
        let roster = roster.clone();
        let cash = cash.clone();
        let feed = feed.clone();
        tokio::task::spawn_blocking(move || {
            while let Ok(env) = sub.recv() {
                if let Err(e) = directory.apply_envelope(&env) {
                    tracing::warn!("member directory apply failed: {e}");
                }
                if let Err(e) = roster.apply_envelope(&env) {
                    tracing::warn!("membership roster apply failed: {e}");
                }
                if let Err(e) = cash.apply_envelope(&env) {
                    tracing::warn!("daily cash apply failed: {e}");
                }
                if let Err(e) = feed.apply_envelope(&env) {
                    tracing::warn!("attendance feed apply failed: {e}");
                }
            }
        });
    }

    let dispatcher = Arc::new(CommandDispatcher::new(store, bus));

    AppServices {
        dispatcher,
        directory,
        roster,
        cash,
        feed,
    }
}

/// Outcome of a membership assignment (write side plus debt bookkeeping).
#[derive(Debug, Clone, Copy)]
pub struct AssignmentOutcome {
    pub events_committed: usize,
    /// Whether the plan cost was added to the member's outstanding debt.
    /// Set only for pending-payment assignments with a positive cost.
    pub debt_accrued: bool,
}

/// Outcome of a debt settlement (write side plus best-effort cash record).
#[derive(Debug, Clone, Copy)]
pub struct DebtSettlementOutcome {
    pub remaining_debt: i64,
    /// Whether the payment was recorded in today's cash ledger. False when
    /// the ledger is already closed; the debt is still settled.
    pub cash_recorded: bool,
}

impl AppServices {
    /// Generic passthrough to the command dispatcher.
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: repset_events::Event + Serialize + DeserializeOwned,
    {
        self.dispatcher
            .dispatch::<A>(tenant_id, aggregate_id, aggregate_type, command, make_aggregate)
    }

    // --- read side -------------------------------------------------------

    pub fn member(&self, tenant_id: TenantId, member_id: &MemberId) -> Option<MemberView> {
        self.directory.get(tenant_id, member_id)
    }

    pub fn members(&self, tenant_id: TenantId) -> Vec<MemberView> {
        self.directory.list(tenant_id)
    }

    pub fn search_members(&self, tenant_id: TenantId, query: &str) -> Vec<MemberView> {
        self.directory.search_by_name(tenant_id, query)
    }

    pub fn assignment(
        &self,
        tenant_id: TenantId,
        membership_id: &MembershipId,
    ) -> Option<AssignmentView> {
        self.roster.get(tenant_id, membership_id)
    }

    pub fn assignments_for_member(
        &self,
        tenant_id: TenantId,
        member_id: MemberId,
    ) -> Vec<AssignmentView> {
        self.roster.list_for_member(tenant_id, member_id)
    }

    pub fn cash_day(&self, tenant_id: TenantId, date: NaiveDate) -> Option<DailyCashView> {
        self.cash.get_day(tenant_id, date)
    }

    pub fn cash_summary(
        &self,
        tenant_id: TenantId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RangeSummary {
        self.cash.summarize_range(tenant_id, from, to)
    }

    pub fn attendance_day(&self, tenant_id: TenantId, date: NaiveDate) -> Option<DayFeed> {
        self.feed.get_day(tenant_id, date)
    }

    // --- cashbook write path ---------------------------------------------

    /// Open the ledger for `date` if it is not open yet, and return the
    /// ledger as it now stands.
    ///
    /// Safe against the two-scanners race: the day id is derived from
    /// (tenant, date), so concurrent opens target the same stream and the
    /// loser sees a conflict, which we treat as "already open". Either way
    /// the caller gets the current state, rehydrated from the store rather
    /// than the (possibly lagging) projection.
    pub fn get_or_open_day(
        &self,
        tenant_id: TenantId,
        date: NaiveDate,
        opening_amount: i64,
        opened_by: Actor,
    ) -> Result<DailyCash, DispatchError> {
        let ledger_id = day_stream_id(tenant_id, date);
        let result = self.dispatch::<DailyCash>(
            tenant_id,
            ledger_id.0,
            "cashbook.daily_cash",
            DailyCashCommand::OpenDailyCash(OpenDailyCash {
                tenant_id,
                daily_cash_id: ledger_id,
                date,
                opening_amount,
                opened_by,
                occurred_at: Utc::now(),
            }),
            |_, id| DailyCash::empty(repset_cashbook::DailyCashId(id)),
        );

        match result {
            // Committed, or already open (or closed): idempotent success.
            Ok(_) | Err(DispatchError::Conflict(_)) | Err(DispatchError::Concurrency(_)) => {
                self.dispatcher.rehydrate::<DailyCash>(tenant_id, ledger_id.0, |_, id| {
                    DailyCash::empty(repset_cashbook::DailyCashId(id))
                })
            }
            Err(other) => Err(other),
        }
    }

    pub fn record_entry(
        &self,
        tenant_id: TenantId,
        date: NaiveDate,
        entry: TransactionEntry,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        let ledger_id = day_stream_id(tenant_id, date);
        self.dispatch::<DailyCash>(
            tenant_id,
            ledger_id.0,
            "cashbook.daily_cash",
            DailyCashCommand::RecordTransaction(RecordTransaction {
                tenant_id,
                daily_cash_id: ledger_id,
                entry_id: uuid::Uuid::now_v7(),
                entry,
                occurred_at: Utc::now(),
            }),
            |_, id| DailyCash::empty(repset_cashbook::DailyCashId(id)),
        )
    }

    pub fn close_day(
        &self,
        tenant_id: TenantId,
        date: NaiveDate,
        closing_amount: i64,
        closed_by: Actor,
        notes: Option<String>,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        let ledger_id = day_stream_id(tenant_id, date);
        self.dispatch::<DailyCash>(
            tenant_id,
            ledger_id.0,
            "cashbook.daily_cash",
            DailyCashCommand::CloseDailyCash(CloseDailyCash {
                tenant_id,
                daily_cash_id: ledger_id,
                closing_amount,
                closed_by,
                notes,
                occurred_at: Utc::now(),
            }),
            |_, id| DailyCash::empty(repset_cashbook::DailyCashId(id)),
        )
    }

    // --- membership assignment --------------------------------------------

    /// Assign a membership; when payment is left pending, the plan cost
    /// becomes member debt.
    ///
    /// The assignment is the authoritative write; the debt accrual is a
    /// best-effort second dispatch against the member stream (a transient
    /// failure there does not undo the assignment).
    pub fn assign_membership(
        &self,
        tenant_id: TenantId,
        cmd: AssignMembership,
    ) -> Result<AssignmentOutcome, DispatchError> {
        let member_id = cmd.member_id;
        let membership_id = cmd.membership_id;
        let unpaid_cost =
            (cmd.payment_status == PaymentStatus::Pending && cmd.cost > 0).then_some(cmd.cost);
        let activity = cmd.activity.clone();

        let committed = self.dispatch::<MembershipAssignment>(
            tenant_id,
            membership_id.0,
            "memberships.assignment",
            MembershipCommand::AssignMembership(cmd),
            |_, id| MembershipAssignment::empty(MembershipId(id)),
        )?;

        let debt_accrued = match unpaid_cost {
            Some(amount) => self
                .dispatch::<repset_members::Member>(
                    tenant_id,
                    member_id.0,
                    "members.member",
                    MemberCommand::AccrueDebt(AccrueDebt {
                        tenant_id,
                        member_id,
                        amount,
                        description: format!("pending membership: {activity}"),
                        occurred_at: Utc::now(),
                    }),
                    |_, id| repset_members::Member::empty(MemberId(id)),
                )
                .map(|_| true)
                .unwrap_or_else(|err| {
                    tracing::warn!(
                        %tenant_id, %member_id, %membership_id, error = ?err,
                        "membership assigned but debt accrual failed"
                    );
                    false
                }),
            None => false,
        };

        Ok(AssignmentOutcome {
            events_committed: committed.len(),
            debt_accrued,
        })
    }

    // --- debt settlement --------------------------------------------------

    /// Settle member debt and record the payment as membership income in
    /// today's cash ledger.
    ///
    /// The settlement is the authoritative write; the cash record is
    /// best-effort (a closed ledger does not undo the settlement).
    pub fn settle_debt(
        &self,
        tenant_id: TenantId,
        member_id: MemberId,
        amount: i64,
        payment_method: repset_cashbook::PaymentMethod,
        actor: Actor,
    ) -> Result<DebtSettlementOutcome, DispatchError> {
        let committed = self.dispatch::<repset_members::Member>(
            tenant_id,
            member_id.0,
            "members.member",
            MemberCommand::SettleDebt(SettleDebt {
                tenant_id,
                member_id,
                amount,
                occurred_at: Utc::now(),
            }),
            |_, id| repset_members::Member::empty(MemberId(id)),
        )?;

        let remaining_debt = committed
            .iter()
            .find_map(|stored| {
                match serde_json::from_value::<MemberEvent>(stored.payload.clone()) {
                    Ok(MemberEvent::DebtSettled(e)) => Some(e.remaining_debt),
                    _ => None,
                }
            })
            .unwrap_or(0);

        let today = Utc::now().date_naive();
        let entry = TransactionEntry {
            kind: TransactionKind::Income,
            category: TransactionCategory::Membership,
            amount,
            description: "debt settlement".to_string(),
            recorded_by: actor.clone(),
            payment_method,
            member_id: Some(member_id),
            membership_id: None,
        };

        let cash_recorded = self
            .get_or_open_day(tenant_id, today, 0, actor)
            .and_then(|_| self.record_entry(tenant_id, today, entry))
            .map(|_| true)
            .unwrap_or_else(|err| {
                tracing::warn!(%tenant_id, %member_id, error = ?err, "debt settled but cash record failed");
                false
            });

        Ok(DebtSettlementOutcome {
            remaining_debt,
            cash_recorded,
        })
    }

    // --- check-in ---------------------------------------------------------

    pub fn check_in(
        &self,
        tenant_id: TenantId,
        credential: &str,
        now: DateTime<Utc>,
    ) -> Result<CheckInReceipt, CheckInError> {
        CheckInService::new(self, self, self).check_in(tenant_id, credential, now)
    }
}

pub fn actor_for(principal: &crate::context::PrincipalContext) -> Actor {
    Actor {
        user_id: UserId::from_uuid(*principal.principal_id().as_uuid()),
        display_name: principal.principal_id().to_string(),
    }
}

// Check-in seams, backed by the projections and the dispatcher.

impl repset_attendance::MemberDirectory for &AppServices {
    fn member(&self, tenant_id: TenantId, member_id: MemberId) -> Option<MemberRecord> {
        self.directory.get(tenant_id, &member_id).map(|view| MemberRecord {
            member_id: view.member_id,
            first_name: view.first_name,
            last_name: view.last_name,
            active: view.status == MemberStatus::Active,
        })
    }
}

impl repset_attendance::MembershipRoster for &AppServices {
    fn assignments_for(&self, tenant_id: TenantId, member_id: MemberId) -> Vec<AssignmentRecord> {
        self.roster
            .list_for_member(tenant_id, member_id)
            .into_iter()
            .map(|view| AssignmentRecord {
                membership_id: view.membership_id,
                activity: view.activity,
                end_date: view.end_date,
                active: view.status == repset_memberships::MembershipStatus::Active,
            })
            .collect()
    }
}

impl AttendanceGateway for &AppServices {
    fn consume_attendance(
        &self,
        tenant_id: TenantId,
        membership_id: MembershipId,
        on: NaiveDate,
        at: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, GatewayError> {
        let committed = self
            .dispatch::<MembershipAssignment>(
                tenant_id,
                membership_id.0,
                "memberships.assignment",
                MembershipCommand::ConsumeAttendance(ConsumeAttendance {
                    tenant_id,
                    membership_id,
                    on,
                    occurred_at: at,
                }),
                |_, id| MembershipAssignment::empty(MembershipId(id)),
            )
            .map_err(map_gateway_error)?;

        let remaining = committed
            .iter()
            .find_map(|stored| {
                match serde_json::from_value::<MembershipEvent>(stored.payload.clone()) {
                    Ok(MembershipEvent::AttendanceConsumed(e)) => Some(e.remaining),
                    _ => None,
                }
            })
            .ok_or_else(|| {
                GatewayError::Unavailable("consumption committed no attendance event".to_string())
            })?;

        Ok(ConsumeOutcome { remaining })
    }

    fn record_accepted(
        &self,
        tenant_id: TenantId,
        member_id: MemberId,
        membership_id: MembershipId,
        activity: &str,
        remaining: u32,
        at: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        let date = at.date_naive();
        let log_id = attendance_stream_id(tenant_id, date);
        self.dispatch::<AttendanceLog>(
            tenant_id,
            log_id.0,
            "attendance.log",
            AttendanceCommand::RecordAcceptedCheckIn(RecordAcceptedCheckIn {
                tenant_id,
                log_id,
                date,
                member_id,
                membership_id,
                activity: activity.to_string(),
                remaining,
                occurred_at: at,
            }),
            |_, id| AttendanceLog::empty(repset_attendance::AttendanceLogId(id)),
        )
        .map_err(map_gateway_error)?;
        Ok(())
    }

    fn record_denied(
        &self,
        tenant_id: TenantId,
        member_id: Option<MemberId>,
        reason: DenialReason,
        at: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        let date = at.date_naive();
        let log_id = attendance_stream_id(tenant_id, date);
        self.dispatch::<AttendanceLog>(
            tenant_id,
            log_id.0,
            "attendance.log",
            AttendanceCommand::RecordDeniedCheckIn(RecordDeniedCheckIn {
                tenant_id,
                log_id,
                date,
                member_id,
                reason,
                occurred_at: at,
            }),
            |_, id| AttendanceLog::empty(repset_attendance::AttendanceLogId(id)),
        )
        .map_err(map_gateway_error)?;
        Ok(())
    }
}

fn map_gateway_error(err: DispatchError) -> GatewayError {
    match err {
        DispatchError::Concurrency(_) => GatewayError::Concurrency,
        DispatchError::Conflict(msg) => GatewayError::Rejected(DomainError::Conflict(msg)),
        DispatchError::Validation(msg) => GatewayError::Rejected(DomainError::Validation(msg)),
        DispatchError::InvariantViolation(msg) => {
            GatewayError::Rejected(DomainError::InvariantViolation(msg))
        }
        DispatchError::NotFound => GatewayError::Rejected(DomainError::NotFound),
        DispatchError::Unauthorized => GatewayError::Rejected(DomainError::Unauthorized),
        other => GatewayError::Unavailable(format!("{other:?}")),
    }
}
