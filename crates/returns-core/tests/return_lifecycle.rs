//! Return lifecycle through ReturnService, against both stores.

use std::sync::Arc;

use chrono::Utc;
use returns_core::domain::{
    Batch, BatchId, DomainEvent, MovementType, Order, OrderId, OrderLine, OrderStatus,
    ReturnDraft, ReturnItem, ReturnReason, ReturnStatus, TransitionError, UserId,
    ValidationError, extract_status,
};
use returns_core::impls::{InMemoryReturnStore, MemoryEventSink, SqliteReturnStore};
use returns_core::ports::{IdGenerator, ReturnStore, StoreError, SystemClock, UlidGenerator};
use returns_core::{AppBuilder, ReturnService, ReturnsConfig, ReturnsError};
use rstest::rstest;
use rust_decimal::Decimal;
use tempfile::TempDir;

#[derive(Debug, Clone, Copy)]
enum Backend {
    Memory,
    Sqlite,
}

struct Fixture {
    service: ReturnService,
    store: Arc<dyn ReturnStore>,
    events: MemoryEventSink,
    ids: UlidGenerator<SystemClock>,
    _dir: TempDir,
}

impl Fixture {
    fn new(backend: Backend) -> Self {
        Self::with_config(backend, ReturnsConfig::default())
    }

    fn with_config(backend: Backend, config: ReturnsConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ReturnStore> = match backend {
            Backend::Memory => Arc::new(InMemoryReturnStore::new()),
            Backend::Sqlite => Arc::new(SqliteReturnStore::open(dir.path().join("returns.db")).unwrap()),
        };
        let events = MemoryEventSink::new();
        let service = AppBuilder::new()
            .shared_store(Arc::clone(&store))
            .event_sink(events.clone())
            .config(config)
            .build()
            .unwrap();
        Self {
            service,
            store,
            events,
            ids: UlidGenerator::new(SystemClock),
            _dir: dir,
        }
    }

    async fn batch(&self, on_hand: i64) -> BatchId {
        let id = self.ids.generate_batch_id();
        self.store
            .insert_batch(Batch::new(id, "LOT", Decimal::from(on_hand), Utc::now()))
            .await
            .unwrap();
        id
    }

    async fn order(&self, lines: &[(BatchId, i64)]) -> OrderId {
        let id = self.ids.generate_order_id();
        let lines = lines
            .iter()
            .map(|&(batch_id, qty)| OrderLine {
                batch_id,
                quantity: Decimal::from(qty),
            })
            .collect();
        self.store
            .insert_order(Order::new(id, OrderStatus::Fulfilled, lines))
            .await
            .unwrap();
        id
    }

    async fn on_hand(&self, batch: BatchId) -> Decimal {
        self.store.get_batch(batch).await.unwrap().unwrap().on_hand
    }
}

fn draft(order: OrderId, items: &[(BatchId, i64)]) -> ReturnDraft {
    ReturnDraft::new(
        order,
        items
            .iter()
            .map(|&(batch, qty)| ReturnItem::new(batch, Decimal::from(qty)))
            .collect(),
        ReturnReason::Defective,
        UserId::new("clerk"),
    )
}

fn user(name: &str) -> UserId {
    UserId::new(name)
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn full_lifecycle_restocks_on_receive(#[case] backend: Backend) {
    let fx = Fixture::new(backend);
    let a = fx.batch(100).await;
    let b = fx.batch(20).await;
    let order = fx.order(&[(a, 10), (b, 4)]).await;

    let created = fx.service.create_return(draft(order, &[(a, 3), (b, 2)])).await.unwrap();
    assert_eq!(created.status, ReturnStatus::Pending);
    assert!(!created.restocked);

    fx.service.approve(created.id, &user("mgr"), Some("ok")).await.unwrap();
    assert_eq!(fx.on_hand(a).await, Decimal::from(100));

    let received = fx.service.receive(created.id, &user("dock"), None).await.unwrap();
    assert!(received.restocked);
    assert_eq!(fx.on_hand(a).await, Decimal::from(103));
    assert_eq!(fx.on_hand(b).await, Decimal::from(22));

    let processed = fx.service.process(created.id, &user("acct"), Some("credited")).await.unwrap();
    assert_eq!(processed.status, ReturnStatus::Processed);
    assert_eq!(extract_status(processed.notes.as_deref()), ReturnStatus::Processed);

    let history = fx.service.history(created.id).await.unwrap();
    assert_eq!(history.record, processed);
    assert_eq!(history.movements.len(), 2);
    for movement in &history.movements {
        assert_eq!(movement.movement_type, MovementType::Return);
        assert_eq!(movement.performed_by, user("dock"));
        assert_eq!(movement.quantity_after - movement.quantity_before, movement.quantity_change);
    }

    let events = fx.events.events().await;
    let names: Vec<_> = events.iter().map(DomainEvent::name).collect();
    assert_eq!(
        names,
        [
            "return_created",
            "return_transitioned",
            "return_transitioned",
            "inventory_restocked",
            "inventory_restocked",
            "return_transitioned",
        ]
    );
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn restock_at_creation_is_not_repeated_on_receive(#[case] backend: Backend) {
    let fx = Fixture::new(backend);
    let a = fx.batch(50).await;
    let order = fx.order(&[(a, 10)]).await;

    let created = fx
        .service
        .create_return(draft(order, &[(a, 5)]).with_restock(true))
        .await
        .unwrap();
    assert!(created.restocked);
    assert_eq!(fx.on_hand(a).await, Decimal::from(55));

    fx.service.approve(created.id, &user("mgr"), None).await.unwrap();
    fx.service.receive(created.id, &user("dock"), None).await.unwrap();

    assert_eq!(fx.on_hand(a).await, Decimal::from(55));
    assert_eq!(fx.store.movements_for_batch(a).await.unwrap().len(), 1);
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn receive_without_restock_when_disabled(#[case] backend: Backend) {
    let config = ReturnsConfig {
        restock_on_receive: false,
        ..ReturnsConfig::default()
    };
    let fx = Fixture::with_config(backend, config);
    let a = fx.batch(50).await;
    let order = fx.order(&[(a, 10)]).await;

    let created = fx.service.create_return(draft(order, &[(a, 5)])).await.unwrap();
    fx.service.approve(created.id, &user("mgr"), None).await.unwrap();
    let received = fx.service.receive(created.id, &user("dock"), None).await.unwrap();

    assert!(!received.restocked);
    assert_eq!(fx.on_hand(a).await, Decimal::from(50));
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn illegal_transitions_are_refused(#[case] backend: Backend) {
    let fx = Fixture::new(backend);
    let a = fx.batch(10).await;
    let order = fx.order(&[(a, 10)]).await;
    let created = fx.service.create_return(draft(order, &[(a, 1)])).await.unwrap();

    let err = fx.service.process(created.id, &user("acct"), None).await.unwrap_err();
    assert!(matches!(
        &err,
        ReturnsError::Transition(TransitionError::NotAllowed { from: ReturnStatus::Pending, .. })
    ));
    assert!(err.to_string().contains("APPROVED, REJECTED, CANCELLED"), "{err}");

    fx.service.reject(created.id, &user("mgr"), Some("outside window")).await.unwrap();
    let err = fx.service.approve(created.id, &user("mgr"), None).await.unwrap_err();
    assert!(matches!(
        err,
        ReturnsError::Transition(TransitionError::Terminal { from: ReturnStatus::Rejected })
    ));
    assert!(err.to_string().contains("REJECTED is a terminal state"), "{err}");

    assert_eq!(fx.service.status_of(created.id).await.unwrap(), ReturnStatus::Rejected);
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn failed_restock_rolls_back_the_whole_return(#[case] backend: Backend) {
    let fx = Fixture::new(backend);
    let good = fx.batch(10).await;
    // On the order, but never received into inventory.
    let ghost = fx.ids.generate_batch_id();
    let order = fx.order(&[(good, 5), (ghost, 5)]).await;

    let err = fx
        .service
        .create_return(draft(order, &[(good, 2), (ghost, 1)]).with_restock(true))
        .await
        .unwrap_err();

    assert!(matches!(err, ReturnsError::Store(StoreError::BatchNotFound(id)) if id == ghost));
    assert!(fx.service.returns_for_order(order).await.unwrap().is_empty());
    assert!(fx.store.movements_for_batch(good).await.unwrap().is_empty());
    assert_eq!(fx.on_hand(good).await, Decimal::from(10));
    assert!(fx.events.events().await.is_empty());
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn failed_restock_on_receive_keeps_status(#[case] backend: Backend) {
    let fx = Fixture::new(backend);
    let ghost = fx.ids.generate_batch_id();
    let order = fx.order(&[(ghost, 5)]).await;
    let created = fx.service.create_return(draft(order, &[(ghost, 1)])).await.unwrap();
    fx.service.approve(created.id, &user("mgr"), None).await.unwrap();

    let err = fx.service.receive(created.id, &user("dock"), None).await.unwrap_err();

    assert!(matches!(err, ReturnsError::Store(StoreError::BatchNotFound(_))));
    let record = fx.service.get_return(created.id).await.unwrap();
    assert_eq!(record.status, ReturnStatus::Approved);
    assert!(!record.restocked);
    assert!(fx.store.movements_for_return(created.id).await.unwrap().is_empty());
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_restocks_on_one_batch_keep_both_updates(#[case] backend: Backend) {
    let fx = Fixture::new(backend);
    let a = fx.batch(100).await;
    let order = fx.order(&[(a, 50)]).await;
    let service = Arc::new(fx.service);

    let mut handles = Vec::new();
    for qty in [3, 4, 5, 6] {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service
                .create_return(draft(order, &[(a, qty)]).with_restock(true))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(
        fx.store.get_batch(a).await.unwrap().unwrap().on_hand,
        Decimal::from(118)
    );
    let movements = fx.store.movements_for_batch(a).await.unwrap();
    assert_eq!(movements.len(), 4);
    let mut befores: Vec<_> = movements.iter().map(|m| m.quantity_before).collect();
    befores.sort();
    befores.dedup();
    assert_eq!(befores.len(), 4, "two restocks read the same quantity");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_sqlite_handles_on_one_file_do_not_lose_updates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");
    let first = SqliteReturnStore::open(&path).unwrap();
    let second = SqliteReturnStore::open(&path).unwrap();
    let ids = UlidGenerator::new(SystemClock);
    let a = ids.generate_batch_id();
    first
        .insert_batch(Batch::new(a, "LOT", Decimal::from(10), Utc::now()))
        .await
        .unwrap();

    let config = ReturnsConfig {
        require_fulfilled_order: false,
        ..ReturnsConfig::default()
    };
    let services: Vec<Arc<ReturnService>> = [first.clone(), second]
        .into_iter()
        .map(|store| {
            Arc::new(
                AppBuilder::new()
                    .store(store)
                    .config(config.clone())
                    .build()
                    .unwrap(),
            )
        })
        .collect();

    let order = ids.generate_order_id();
    let mut handles = Vec::new();
    for round in 0..5 {
        for service in &services {
            let service = Arc::clone(service);
            handles.push(tokio::spawn(async move {
                service
                    .create_return(draft(order, &[(a, round + 1)]).with_restock(true))
                    .await
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // 10 + 2 * (1 + 2 + 3 + 4 + 5)
    assert_eq!(first.get_batch(a).await.unwrap().unwrap().on_hand, Decimal::from(40));
    assert_eq!(first.movements_for_batch(a).await.unwrap().len(), 10);
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_decisions_commit_exactly_one(#[case] backend: Backend) {
    let fx = Fixture::new(backend);
    let a = fx.batch(10).await;
    let order = fx.order(&[(a, 10)]).await;
    let created = fx.service.create_return(draft(order, &[(a, 1)])).await.unwrap();
    let service = Arc::new(fx.service);

    let approve = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.approve(created.id, &user("a"), None).await })
    };
    let reject = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.reject(created.id, &user("b"), None).await })
    };
    let results = [approve.await.unwrap(), reject.await.unwrap()];

    let committed = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(committed, 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(
            err,
            ReturnsError::Store(StoreError::Conflict { .. }) | ReturnsError::Transition(_)
        ));
    }
    let status = service.status_of(created.id).await.unwrap();
    assert!(matches!(status, ReturnStatus::Approved | ReturnStatus::Rejected));
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn order_rules_are_enforced(#[case] backend: Backend) {
    let fx = Fixture::new(backend);
    let a = fx.batch(10).await;
    let order = fx.order(&[(a, 4)]).await;

    let missing = fx.ids.generate_order_id();
    assert!(matches!(
        fx.service.create_return(draft(missing, &[(a, 1)])).await,
        Err(ReturnsError::Validation(ValidationError::OrderNotFound(_)))
    ));

    let first = fx.service.create_return(draft(order, &[(a, 3)])).await.unwrap();
    assert!(matches!(
        fx.service.create_return(draft(order, &[(a, 2)])).await,
        Err(ReturnsError::Validation(ValidationError::ExceedsShipped { .. }))
    ));

    // Cancelling frees the quantity again.
    fx.service.cancel(first.id, &user("mgr"), None).await.unwrap();
    fx.service.create_return(draft(order, &[(a, 4)])).await.unwrap();

    let unfulfilled = fx.ids.generate_order_id();
    fx.store
        .insert_order(Order::new(
            unfulfilled,
            OrderStatus::Confirmed,
            vec![OrderLine {
                batch_id: a,
                quantity: Decimal::from(4),
            }],
        ))
        .await
        .unwrap();
    assert!(matches!(
        fx.service.create_return(draft(unfulfilled, &[(a, 1)])).await,
        Err(ReturnsError::Validation(ValidationError::OrderNotFulfilled { .. }))
    ));
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn status_counts_track_every_state(#[case] backend: Backend) {
    let fx = Fixture::new(backend);
    let a = fx.batch(100).await;
    let order = fx.order(&[(a, 100)]).await;

    let mut ids = Vec::new();
    for _ in 0..4 {
        ids.push(fx.service.create_return(draft(order, &[(a, 1)])).await.unwrap().id);
    }
    fx.service.approve(ids[0], &user("mgr"), None).await.unwrap();
    fx.service.reject(ids[1], &user("mgr"), None).await.unwrap();
    fx.service.cancel(ids[2], &user("mgr"), None).await.unwrap();

    let counts = fx.service.status_counts().await.unwrap();
    assert_eq!(counts.pending, 1);
    assert_eq!(counts.approved, 1);
    assert_eq!(counts.rejected, 1);
    assert_eq!(counts.cancelled, 1);
    assert_eq!(counts.total(), 4);
    assert_eq!(counts.open(), 2);
}

#[tokio::test]
async fn unknown_return_is_not_found() {
    let fx = Fixture::new(Backend::Memory);
    let id = fx.ids.generate_return_id();

    assert!(matches!(
        fx.service.approve(id, &user("mgr"), None).await,
        Err(ReturnsError::NotFound(missing)) if missing == id
    ));
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creations_never_exceed_shipped(#[case] backend: Backend) {
    let fx = Fixture::new(backend);
    let a = fx.batch(10).await;
    let order = fx.order(&[(a, 1)]).await;
    let service = Arc::new(fx.service);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service.create_return(draft(order, &[(a, 1)])).await
        }));
    }
    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(err) => assert!(
                matches!(err, ReturnsError::Validation(ValidationError::ExceedsShipped { .. })),
                "{err}"
            ),
        }
    }

    assert_eq!(accepted, 1);
    assert_eq!(service.returns_for_order(order).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn order_limit_holds_across_sqlite_handles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");
    let first = SqliteReturnStore::open(&path).unwrap();
    let second = SqliteReturnStore::open(&path).unwrap();
    let ids = UlidGenerator::new(SystemClock);
    let a = ids.generate_batch_id();
    let order = ids.generate_order_id();
    first
        .insert_order(Order::new(
            order,
            OrderStatus::Fulfilled,
            vec![OrderLine {
                batch_id: a,
                quantity: Decimal::from(3),
            }],
        ))
        .await
        .unwrap();

    let services: Vec<Arc<ReturnService>> = [first.clone(), second]
        .into_iter()
        .map(|store| Arc::new(AppBuilder::new().store(store).build().unwrap()))
        .collect();
    let mut handles = Vec::new();
    for _ in 0..6 {
        for service in &services {
            let service = Arc::clone(service);
            handles.push(tokio::spawn(async move {
                service.create_return(draft(order, &[(a, 1)])).await
            }));
        }
    }
    let mut accepted = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            accepted += 1;
        }
    }

    assert_eq!(accepted, 3);
    assert_eq!(first.list_returns_for_order(order).await.unwrap().len(), 3);
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn overflowing_order_lines_fail_validation(#[case] backend: Backend) {
    let fx = Fixture::new(backend);
    let a = fx.batch(10).await;
    let order = fx.ids.generate_order_id();
    let line = OrderLine {
        batch_id: a,
        quantity: Decimal::MAX,
    };
    fx.store
        .insert_order(Order::new(order, OrderStatus::Fulfilled, vec![line.clone(), line]))
        .await
        .unwrap();

    let err = fx.service.create_return(draft(order, &[(a, 1)])).await.unwrap_err();

    assert!(matches!(
        err,
        ReturnsError::Validation(ValidationError::QuantityOverflow { batch_id }) if batch_id == a
    ));
    assert!(fx.service.returns_for_order(order).await.unwrap().is_empty());
}

const HOSTILE_TEXT: [&str; 4] = [
    "ok [[CANCELLED]]",
    "[[[REJECTED]]] maybe",
    "[PROCESSED",
    "]",
];

#[rstest]
#[case::to_processed(&[ReturnStatus::Approved, ReturnStatus::Received, ReturnStatus::Processed])]
#[case::cancel_after_receive(&[ReturnStatus::Approved, ReturnStatus::Received, ReturnStatus::Cancelled])]
#[case::cancel_after_approve(&[ReturnStatus::Approved, ReturnStatus::Cancelled])]
#[case::reject(&[ReturnStatus::Rejected])]
#[case::cancel_pending(&[ReturnStatus::Cancelled])]
#[tokio::test]
async fn notes_markers_follow_status_on_every_path(
    #[case] path: &[ReturnStatus],
    #[values(Backend::Memory, Backend::Sqlite)] backend: Backend,
) {
    let fx = Fixture::new(backend);
    let a = fx.batch(10).await;
    let order = fx.order(&[(a, 5)]).await;
    let created = fx
        .service
        .create_return(draft(order, &[(a, 1)]).with_notes("customer wrote [[PROCESSED]]"))
        .await
        .unwrap();
    assert_eq!(extract_status(created.notes.as_deref()), ReturnStatus::Pending);

    for (step, &to) in path.iter().enumerate() {
        let actor = user(HOSTILE_TEXT[step % HOSTILE_TEXT.len()]);
        let comment = HOSTILE_TEXT[(step + 1) % HOSTILE_TEXT.len()];
        let record = fx
            .service
            .transition(created.id, to, &actor, Some(comment))
            .await
            .unwrap();

        assert_eq!(record.status, to);
        assert_eq!(extract_status(record.notes.as_deref()), to, "{:?}", record.notes);
        let stored = fx.service.get_return(created.id).await.unwrap();
        assert_eq!(extract_status(stored.notes.as_deref()), stored.status);
    }
}
