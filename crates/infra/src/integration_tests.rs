//! Integration tests for the full event-sourced pipeline.
//!
//! Command → EventStore → EventBus → Projection → ReadModel
//!
//! Verifies:
//! - Commands produce events that update read models correctly
//! - Tenant isolation is preserved end to end
//! - Optimistic concurrency keeps the attendance quota honest under
//!   concurrent consumption

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use chrono::{NaiveDate, Utc};
    use serde_json::Value as JsonValue;

    use repset_cashbook::{
        Actor, CloseDailyCash, DailyCash, DailyCashCommand, DailyCashId, OpenDailyCash,
        PaymentMethod, RecordTransaction, TransactionCategory, TransactionEntry, TransactionKind,
        day_stream_id,
    };
    use repset_core::{AggregateId, TenantId, UserId};
    use repset_events::{EventEnvelope, InMemoryEventBus};
    use repset_members::{MemberCommand, MemberId, MemberStatus, RegisterMember};
    use repset_memberships::{
        AssignMembership, ConsumeAttendance, MembershipAssignment, MembershipCommand, MembershipId,
        MembershipStatus, PaymentStatus,
    };

    use crate::command_dispatcher::{CommandDispatcher, DispatchError};
    use crate::event_store::InMemoryEventStore;
    use crate::projections::attendance_feed::{AttendanceFeedProjection, DayFeed, EntryOutcome};
    use crate::projections::daily_cash::{DailyCashView, DailyCashViewProjection};
    use crate::projections::member_directory::{MemberDirectoryProjection, MemberView};
    use crate::projections::membership_roster::{AssignmentView, MembershipRosterProjection};
    use crate::read_model::InMemoryTenantStore;
    use crate::workers::{ProjectionWorker, WorkerHandle};

    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
    type Dispatcher = CommandDispatcher<InMemoryEventStore, Bus>;
    type Directory = MemberDirectoryProjection<Arc<InMemoryTenantStore<MemberId, MemberView>>>;
    type Roster =
        MembershipRosterProjection<Arc<InMemoryTenantStore<MembershipId, AssignmentView>>>;
    type CashView = DailyCashViewProjection<Arc<InMemoryTenantStore<NaiveDate, DailyCashView>>>;
    type Feed = AttendanceFeedProjection<Arc<InMemoryTenantStore<NaiveDate, DayFeed>>>;

    struct Harness {
        dispatcher: Arc<Dispatcher>,
        directory: Arc<Directory>,
        roster: Arc<Roster>,
        cash: Arc<CashView>,
        feed: Arc<Feed>,
        // Keeps the bus→projection worker alive for the test's lifetime.
        _worker: WorkerHandle,
    }

    fn setup() -> Harness {
        let store = InMemoryEventStore::new();
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let dispatcher = Arc::new(CommandDispatcher::new(store, bus.clone()));

        let directory = Arc::new(MemberDirectoryProjection::new(Arc::new(
            InMemoryTenantStore::new(),
        )));
        let roster = Arc::new(MembershipRosterProjection::new(Arc::new(
            InMemoryTenantStore::new(),
        )));
        let cash = Arc::new(DailyCashViewProjection::new(Arc::new(
            InMemoryTenantStore::new(),
        )));
        let feed = Arc::new(AttendanceFeedProjection::new(Arc::new(
            InMemoryTenantStore::new(),
        )));

        // The worker subscribes before spawn returns, so no event published
        // afterwards can be missed.
        let worker = ProjectionWorker::spawn("projections", bus.clone(), None, {
            let directory = directory.clone();
            let roster = roster.clone();
            let cash = cash.clone();
            let feed = feed.clone();
            move |env: EventEnvelope<JsonValue>| -> Result<(), String> {
                directory.apply_envelope(&env).map_err(|e| e.to_string())?;
                roster.apply_envelope(&env).map_err(|e| e.to_string())?;
                cash.apply_envelope(&env).map_err(|e| e.to_string())?;
                feed.apply_envelope(&env).map_err(|e| e.to_string())?;
                Ok(())
            }
        });

        Harness {
            dispatcher,
            directory,
            roster,
            cash,
            feed,
            _worker: worker,
        }
    }

    /// The subscriber thread drains the bus; give it a moment.
    fn wait_for_processing() {
        thread::sleep(Duration::from_millis(50));
    }

    fn register_member(h: &Harness, tenant_id: TenantId, member_id: MemberId, name: &str) {
        h.dispatcher
            .dispatch(
                tenant_id,
                member_id.0,
                "members.member",
                MemberCommand::RegisterMember(RegisterMember {
                    tenant_id,
                    member_id,
                    first_name: name.to_string(),
                    last_name: "Tester".to_string(),
                    contact: None,
                    occurred_at: Utc::now(),
                }),
                |_, id| repset_members::Member::empty(MemberId(id)),
            )
            .unwrap();
    }

    fn assign_membership(
        h: &Harness,
        tenant_id: TenantId,
        membership_id: MembershipId,
        member_id: MemberId,
        max_attendances: u32,
    ) {
        h.dispatcher
            .dispatch(
                tenant_id,
                membership_id.0,
                "memberships.assignment",
                MembershipCommand::AssignMembership(AssignMembership {
                    tenant_id,
                    membership_id,
                    member_id,
                    activity: "crossfit".to_string(),
                    start_date: date(2026, 8, 1),
                    end_date: date(2026, 8, 31),
                    cost: 45_000,
                    payment_status: PaymentStatus::Paid,
                    max_attendances,
                    occurred_at: Utc::now(),
                }),
                |_, id| MembershipAssignment::empty(MembershipId(id)),
            )
            .unwrap();
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn cashier() -> Actor {
        Actor {
            user_id: UserId::new(),
            display_name: "Front Desk".to_string(),
        }
    }

    #[test]
    fn registered_member_reaches_the_directory() {
        let h = setup();
        let tenant_id = TenantId::new();
        let member_id = MemberId(AggregateId::new());

        register_member(&h, tenant_id, member_id, "Ana");
        wait_for_processing();

        let view = h.directory.get(tenant_id, &member_id).unwrap();
        assert_eq!(view.first_name, "Ana");
        assert_eq!(view.status, MemberStatus::Active);
        assert_eq!(view.total_debt, 0);
    }

    #[test]
    fn rehydrate_folds_history_without_dispatching() {
        let h = setup();
        let tenant_id = TenantId::new();
        let day = date(2026, 8, 21);
        let ledger_id = day_stream_id(tenant_id, day);

        h.dispatcher
            .dispatch(
                tenant_id,
                ledger_id.0,
                "cashbook.daily_cash",
                DailyCashCommand::OpenDailyCash(OpenDailyCash {
                    tenant_id,
                    daily_cash_id: ledger_id,
                    date: day,
                    opening_amount: 100_00,
                    opened_by: cashier(),
                    occurred_at: Utc::now(),
                }),
                |_, id| DailyCash::empty(DailyCashId(id)),
            )
            .unwrap();

        // No projection involved: state comes straight from the stream.
        let ledger = h
            .dispatcher
            .rehydrate::<DailyCash>(tenant_id, ledger_id.0, |_, id| {
                DailyCash::empty(DailyCashId(id))
            })
            .unwrap();
        assert!(ledger.is_open());
        assert_eq!(ledger.opening_amount(), 100_00);
        assert_eq!(ledger.current_balance(), 100_00);

        // Another tenant owns no such stream and gets the empty aggregate.
        let other = h
            .dispatcher
            .rehydrate::<DailyCash>(TenantId::new(), ledger_id.0, |_, id| {
                DailyCash::empty(DailyCashId(id))
            })
            .unwrap();
        assert!(!other.is_open());
    }

    #[test]
    fn read_models_do_not_leak_across_tenants() {
        let h = setup();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();
        let member_id = MemberId(AggregateId::new());

        register_member(&h, tenant_a, member_id, "Ana");
        wait_for_processing();

        assert!(h.directory.get(tenant_a, &member_id).is_some());
        assert!(h.directory.get(tenant_b, &member_id).is_none());
        assert!(h.directory.list(tenant_b).is_empty());
    }

    #[test]
    fn consumed_attendance_updates_the_roster() {
        let h = setup();
        let tenant_id = TenantId::new();
        let member_id = MemberId(AggregateId::new());
        let membership_id = MembershipId(AggregateId::new());

        register_member(&h, tenant_id, member_id, "Ana");
        assign_membership(&h, tenant_id, membership_id, member_id, 12);

        h.dispatcher
            .dispatch(
                tenant_id,
                membership_id.0,
                "memberships.assignment",
                MembershipCommand::ConsumeAttendance(ConsumeAttendance {
                    tenant_id,
                    membership_id,
                    on: date(2026, 8, 10),
                    occurred_at: Utc::now(),
                }),
                |_, id| MembershipAssignment::empty(MembershipId(id)),
            )
            .unwrap();
        wait_for_processing();

        let view = h.roster.get(tenant_id, &membership_id).unwrap();
        assert_eq!(view.remaining_attendances, 11);
        assert_eq!(view.status, MembershipStatus::Active);

        let for_member = h.roster.list_for_member(tenant_id, member_id);
        assert_eq!(for_member.len(), 1);
    }

    #[test]
    fn cash_day_flows_from_open_to_closed_view() {
        let h = setup();
        let tenant_id = TenantId::new();
        let day = date(2026, 8, 14);
        let ledger_id = day_stream_id(tenant_id, day);

        h.dispatcher
            .dispatch(
                tenant_id,
                ledger_id.0,
                "cashbook.daily_cash",
                DailyCashCommand::OpenDailyCash(OpenDailyCash {
                    tenant_id,
                    daily_cash_id: ledger_id,
                    date: day,
                    opening_amount: 10_000,
                    opened_by: cashier(),
                    occurred_at: Utc::now(),
                }),
                |_, id| DailyCash::empty(DailyCashId(id)),
            )
            .unwrap();

        h.dispatcher
            .dispatch(
                tenant_id,
                ledger_id.0,
                "cashbook.daily_cash",
                DailyCashCommand::RecordTransaction(RecordTransaction {
                    tenant_id,
                    daily_cash_id: ledger_id,
                    entry_id: uuid::Uuid::now_v7(),
                    entry: TransactionEntry {
                        kind: TransactionKind::Income,
                        category: TransactionCategory::Membership,
                        amount: 25_000,
                        description: "monthly plan".to_string(),
                        recorded_by: cashier(),
                        payment_method: PaymentMethod::Cash,
                        member_id: None,
                        membership_id: None,
                    },
                    occurred_at: Utc::now(),
                }),
                |_, id| DailyCash::empty(DailyCashId(id)),
            )
            .unwrap();

        h.dispatcher
            .dispatch(
                tenant_id,
                ledger_id.0,
                "cashbook.daily_cash",
                DailyCashCommand::CloseDailyCash(CloseDailyCash {
                    tenant_id,
                    daily_cash_id: ledger_id,
                    closing_amount: 34_500,
                    closed_by: cashier(),
                    notes: None,
                    occurred_at: Utc::now(),
                }),
                |_, id| DailyCash::empty(DailyCashId(id)),
            )
            .unwrap();
        wait_for_processing();

        let view = h.cash.get_day(tenant_id, day).unwrap();
        assert_eq!(view.opening_amount, 10_000);
        assert_eq!(view.total_income, 25_000);
        assert_eq!(view.total_expense, 0);
        assert_eq!(view.current_balance(), 35_000);
        assert_eq!(view.closing_amount, Some(34_500));
        assert_eq!(view.discrepancy, Some(-500));

        let summary = h.cash.summarize_range(tenant_id, day, day);
        assert_eq!(summary.total_income, 25_000);
        assert_eq!(
            summary.income_by_category.get(&TransactionCategory::Membership),
            Some(&25_000)
        );
    }

    #[test]
    fn recording_into_a_closed_ledger_is_a_conflict() {
        let h = setup();
        let tenant_id = TenantId::new();
        let day = date(2026, 8, 14);
        let ledger_id = day_stream_id(tenant_id, day);

        h.dispatcher
            .dispatch(
                tenant_id,
                ledger_id.0,
                "cashbook.daily_cash",
                DailyCashCommand::OpenDailyCash(OpenDailyCash {
                    tenant_id,
                    daily_cash_id: ledger_id,
                    date: day,
                    opening_amount: 0,
                    opened_by: cashier(),
                    occurred_at: Utc::now(),
                }),
                |_, id| DailyCash::empty(DailyCashId(id)),
            )
            .unwrap();

        h.dispatcher
            .dispatch(
                tenant_id,
                ledger_id.0,
                "cashbook.daily_cash",
                DailyCashCommand::CloseDailyCash(CloseDailyCash {
                    tenant_id,
                    daily_cash_id: ledger_id,
                    closing_amount: 0,
                    closed_by: cashier(),
                    notes: None,
                    occurred_at: Utc::now(),
                }),
                |_, id| DailyCash::empty(DailyCashId(id)),
            )
            .unwrap();

        let result = h.dispatcher.dispatch(
            tenant_id,
            ledger_id.0,
            "cashbook.daily_cash",
            DailyCashCommand::RecordTransaction(RecordTransaction {
                tenant_id,
                daily_cash_id: ledger_id,
                entry_id: uuid::Uuid::now_v7(),
                entry: TransactionEntry {
                    kind: TransactionKind::Expense,
                    category: TransactionCategory::Supplier,
                    amount: 100,
                    description: "late invoice".to_string(),
                    recorded_by: cashier(),
                    payment_method: PaymentMethod::Cash,
                    member_id: None,
                    membership_id: None,
                },
                occurred_at: Utc::now(),
            }),
            |_, id| DailyCash::empty(DailyCashId(id)),
        );

        assert!(matches!(result, Err(DispatchError::Conflict(_))));
    }

    #[test]
    fn audit_log_entries_reach_the_attendance_feed() {
        use repset_attendance::{
            AttendanceCommand, AttendanceLog, AttendanceLogId, DenialReason, RecordAcceptedCheckIn,
            RecordDeniedCheckIn, attendance_stream_id,
        };

        let h = setup();
        let tenant_id = TenantId::new();
        let day = date(2026, 8, 14);
        let log_id = attendance_stream_id(tenant_id, day);
        let member_id = MemberId(AggregateId::new());
        let membership_id = MembershipId(AggregateId::new());

        h.dispatcher
            .dispatch(
                tenant_id,
                log_id.0,
                "attendance.log",
                AttendanceCommand::RecordAcceptedCheckIn(RecordAcceptedCheckIn {
                    tenant_id,
                    log_id,
                    date: day,
                    member_id,
                    membership_id,
                    activity: "crossfit".to_string(),
                    remaining: 9,
                    occurred_at: Utc::now(),
                }),
                |_, id| AttendanceLog::empty(AttendanceLogId(id)),
            )
            .unwrap();

        h.dispatcher
            .dispatch(
                tenant_id,
                log_id.0,
                "attendance.log",
                AttendanceCommand::RecordDeniedCheckIn(RecordDeniedCheckIn {
                    tenant_id,
                    log_id,
                    date: day,
                    member_id: None,
                    reason: DenialReason::InvalidCredential,
                    occurred_at: Utc::now(),
                }),
                |_, id| AttendanceLog::empty(AttendanceLogId(id)),
            )
            .unwrap();
        wait_for_processing();

        let feed = h.feed.get_day(tenant_id, day).unwrap();
        assert_eq!(feed.accepted_count, 1);
        assert_eq!(feed.denied_count, 1);
        assert_eq!(feed.entries.len(), 2);
        assert!(matches!(
            feed.entries[0].outcome,
            EntryOutcome::Accepted { remaining: 9, .. }
        ));
        assert!(matches!(
            feed.entries[1].outcome,
            EntryOutcome::Denied {
                reason: DenialReason::InvalidCredential
            }
        ));
    }

    /// Concurrent consumption cannot oversell the quota: each dispatch pins
    /// the stream version it loaded, so of any two racing appends exactly one
    /// lands and the loser re-reads state that may already be exhausted.
    #[test]
    fn concurrent_consumption_never_exceeds_the_quota() {
        let h = setup();
        let tenant_id = TenantId::new();
        let member_id = MemberId(AggregateId::new());
        let membership_id = MembershipId(AggregateId::new());
        let quota = 10u32;

        register_member(&h, tenant_id, member_id, "Ana");
        assign_membership(&h, tenant_id, membership_id, member_id, quota);

        let mut handles = Vec::new();
        for _ in 0..50 {
            let dispatcher = h.dispatcher.clone();
            handles.push(thread::spawn(move || -> bool {
                loop {
                    let result = dispatcher.dispatch(
                        tenant_id,
                        membership_id.0,
                        "memberships.assignment",
                        MembershipCommand::ConsumeAttendance(ConsumeAttendance {
                            tenant_id,
                            membership_id,
                            on: date(2026, 8, 10),
                            occurred_at: Utc::now(),
                        }),
                        |_, id| MembershipAssignment::empty(MembershipId(id)),
                    );

                    match result {
                        Ok(events) => return !events.is_empty(),
                        // Version race: someone else appended first, retry.
                        Err(DispatchError::Concurrency(_)) => continue,
                        // Deterministic rejection (quota exhausted / expired).
                        Err(DispatchError::Conflict(_)) => return false,
                        Err(other) => panic!("unexpected dispatch failure: {other:?}"),
                    }
                }
            }));
        }

        let admitted = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|admitted| *admitted)
            .count();

        assert_eq!(admitted as u32, quota);
        wait_for_processing();

        let view = h.roster.get(tenant_id, &membership_id).unwrap();
        assert_eq!(view.remaining_attendances, 0);
        assert_eq!(view.status, MembershipStatus::Expired);
    }

    #[test]
    fn tenant_filtered_worker_ignores_other_tenants_and_stops_on_shutdown() {
        let store = InMemoryEventStore::new();
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let dispatcher = Arc::new(CommandDispatcher::new(store, bus.clone()));

        let directory = Arc::new(MemberDirectoryProjection::new(Arc::new(
            InMemoryTenantStore::new(),
        )));

        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();

        let worker = ProjectionWorker::spawn("directory", bus.clone(), Some(tenant_a), {
            let directory = directory.clone();
            move |env: EventEnvelope<JsonValue>| directory.apply_envelope(&env)
        });

        let h = Harness {
            dispatcher,
            directory: directory.clone(),
            roster: Arc::new(MembershipRosterProjection::new(Arc::new(
                InMemoryTenantStore::new(),
            ))),
            cash: Arc::new(DailyCashViewProjection::new(Arc::new(
                InMemoryTenantStore::new(),
            ))),
            feed: Arc::new(AttendanceFeedProjection::new(Arc::new(
                InMemoryTenantStore::new(),
            ))),
            _worker: worker,
        };

        let member_a = MemberId(AggregateId::new());
        let member_b = MemberId(AggregateId::new());
        register_member(&h, tenant_a, member_a, "Ana");
        register_member(&h, tenant_b, member_b, "Bea");
        wait_for_processing();

        assert!(directory.get(tenant_a, &member_a).is_some());
        assert!(directory.get(tenant_b, &member_b).is_none());

        // Graceful shutdown joins the worker thread; a hang here fails the
        // test on the harness timeout.
        let Harness { _worker: worker, .. } = h;
        worker.shutdown();
    }
}
