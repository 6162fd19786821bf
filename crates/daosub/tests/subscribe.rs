//! Subscribe flow tests
//!
//! Drive the coordinator against the memory store and the fake processor, reporting
//! completions by hand the way the processor callback would.

mod common;

use std::time::Duration;

use common::*;
use daosub::database::OrderDatabase;
use daosub::notify::NotificationSource;
use daosub::{CommunityId, CoordinatorBuilder, Error, OrderStatus, SubscriptionOrder};
use daosub_fake_processor::FakePaymentProcessor;
use tokio_util::sync::CancellationToken;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_subscribe_happy_path() {
    let harness = harness();
    let coordinator = harness.coordinator.clone();

    let waiting = tokio::spawn(async move {
        coordinator
            .subscribe(&CancellationToken::new(), &community_id(), SUBSCRIBER)
            .await
    });

    let order = harness.submitted_order().await;
    assert_eq!(order.status, OrderStatus::Submitted);

    let requests = harness.processor.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].amount, 10.0);
    assert_eq!(requests[0].from_object, SUBSCRIBER);
    assert_eq!(requests[0].to_subject, OWNER);
    assert_eq!(requests[0].channel, "sub_dao");
    assert_eq!(requests[0].bind_order, order.id);
    assert_eq!(
        requests[0].return_uri,
        format!(
            "https://api.example.com/pay/notify?method=sub_dao&order_id={}",
            order.id
        )
    );

    let tx_id = order.tx_id.clone().unwrap();
    harness
        .coordinator
        .completion_reporter()
        .report_completion(&order.id, &tx_id, OrderStatus::Success)
        .await
        .unwrap();

    let outcome = waiting.await.unwrap().unwrap();
    assert_eq!(outcome.order_id, order.id);
    assert_eq!(outcome.tx_id.as_deref(), Some(tx_id.as_str()));
    assert_eq!(outcome.status, OrderStatus::Success);

    // Second call is answered from the store
    let again = harness
        .coordinator
        .subscribe(&CancellationToken::new(), &community_id(), SUBSCRIBER)
        .await
        .unwrap();
    assert_eq!(again, outcome);
    assert_eq!(harness.processor.requests().await.len(), 1);
    assert_eq!(harness.coordinator.bus().active_subscribers(), 0);

    harness.coordinator.wait_dispatches().await;
    let sent = harness.notifier.sent().await;
    assert_eq!(sent.len(), 2);

    let to_subscriber = sent.iter().find(|n| n.to == "u1").unwrap();
    assert_eq!(
        to_subscriber.content,
        "Subscribe to rustaceans dao successfully, pay 10.000000 FavT"
    );
    assert_eq!(to_subscriber.network_id, "net-1");
    assert_eq!(to_subscriber.region, "eu");
    assert_eq!(to_subscriber.from_type, NotificationSource::Orange);

    let to_owner = sent.iter().find(|n| n.to == "u2").unwrap();
    assert_eq!(
        to_owner.content,
        "Alice(alice) subscribed to your dao received 10.000000 FavT"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_subscribes_create_one_order() {
    let harness = harness_with(
        FakePaymentProcessor::new(Duration::from_millis(50), None),
        CoordinatorBuilder::new(),
    );

    let mut handles = Vec::new();
    for _ in 0..8 {
        let coordinator = harness.coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator
                .subscribe(&CancellationToken::new(), &community_id(), SUBSCRIBER)
                .await
        }));
    }

    let order = harness.submitted_order().await;
    harness.waiters(&order, 8).await;

    let tx_id = order.tx_id.clone().unwrap();
    harness
        .coordinator
        .completion_reporter()
        .report_completion(&order.id, &tx_id, OrderStatus::Success)
        .await
        .unwrap();

    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.order_id, order.id);
        assert_eq!(outcome.tx_id.as_deref(), Some(tx_id.as_str()));
        assert_eq!(outcome.status, OrderStatus::Success);
    }

    assert_eq!(harness.processor.requests().await.len(), 1);
    assert_eq!(
        harness
            .store
            .get_orders_by_status(OrderStatus::Success)
            .await
            .unwrap()
            .len(),
        1
    );

    // One notice each for subscriber and owner, however many callers waited
    harness.coordinator.wait_dispatches().await;
    assert_eq!(harness.notifier.sent().await.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_leaves_order_submitted() {
    let harness = harness();
    let cancel = CancellationToken::new();

    let coordinator = harness.coordinator.clone();
    let token = cancel.clone();
    let waiting = tokio::spawn(async move {
        coordinator
            .subscribe(&token, &community_id(), SUBSCRIBER)
            .await
    });

    let order = harness.submitted_order().await;
    harness.waiters(&order, 1).await;

    cancel.cancel();
    assert!(matches!(waiting.await.unwrap(), Err(Error::Cancelled)));

    let stored = harness.store.get_order(&order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Submitted);
    assert_eq!(stored.tx_id, order.tx_id);
    assert_eq!(harness.coordinator.bus().active_subscribers(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_resume_attaches_to_submitted_order() {
    let harness = harness();

    // First caller gives up right after the payment started
    let cancel = CancellationToken::new();
    let coordinator = harness.coordinator.clone();
    let token = cancel.clone();
    let first = tokio::spawn(async move {
        coordinator
            .subscribe(&token, &community_id(), SUBSCRIBER)
            .await
    });
    let order = harness.submitted_order().await;
    harness.waiters(&order, 1).await;
    cancel.cancel();
    assert!(matches!(first.await.unwrap(), Err(Error::Cancelled)));

    // Two callers come back and wait on the same order
    let mut handles = Vec::new();
    for _ in 0..2 {
        let coordinator = harness.coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator
                .subscribe(&CancellationToken::new(), &community_id(), SUBSCRIBER)
                .await
        }));
    }
    harness.waiters(&order, 2).await;

    let tx_id = order.tx_id.clone().unwrap();
    harness
        .coordinator
        .completion_reporter()
        .report_completion(&order.id, &tx_id, OrderStatus::Success)
        .await
        .unwrap();

    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.order_id, order.id);
        assert_eq!(outcome.status, OrderStatus::Success);
    }

    assert_eq!(harness.processor.requests().await.len(), 1);
    assert_eq!(harness.order().await.unwrap().id, order.id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_notifier_failure_is_not_fatal() {
    let harness = harness();
    harness.notifier.set_fail(true);

    let coordinator = harness.coordinator.clone();
    let waiting = tokio::spawn(async move {
        coordinator
            .subscribe(&CancellationToken::new(), &community_id(), SUBSCRIBER)
            .await
    });

    let order = harness.submitted_order().await;
    harness.waiters(&order, 1).await;
    harness
        .coordinator
        .completion_reporter()
        .report_completion(&order.id, order.tx_id.as_deref().unwrap(), OrderStatus::Success)
        .await
        .unwrap();

    let outcome = waiting.await.unwrap().unwrap();
    assert_eq!(outcome.status, OrderStatus::Success);

    harness.coordinator.wait_dispatches().await;
    assert!(harness.notifier.sent().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_payment_sends_no_notifications() {
    let harness = harness();

    let coordinator = harness.coordinator.clone();
    let waiting = tokio::spawn(async move {
        coordinator
            .subscribe(&CancellationToken::new(), &community_id(), SUBSCRIBER)
            .await
    });

    let order = harness.submitted_order().await;
    harness.waiters(&order, 1).await;
    harness
        .coordinator
        .completion_reporter()
        .report_completion(&order.id, order.tx_id.as_deref().unwrap(), OrderStatus::Failed)
        .await
        .unwrap();

    let outcome = waiting.await.unwrap().unwrap();
    assert_eq!(outcome.status, OrderStatus::Failed);

    // Terminal failure is final for the pair
    let again = harness
        .coordinator
        .subscribe(&CancellationToken::new(), &community_id(), SUBSCRIBER)
        .await
        .unwrap();
    assert_eq!(again.status, OrderStatus::Failed);
    assert_eq!(harness.processor.requests().await.len(), 1);

    harness.coordinator.wait_dispatches().await;
    assert!(harness.notifier.sent().await.is_empty());
}

#[tokio::test]
async fn test_late_waiter_sees_terminal_order() {
    let harness = harness();
    let cancel = CancellationToken::new();
    cancel.cancel();

    // Creates the order, starts the payment, and returns right away
    let result = harness
        .coordinator
        .subscribe(&cancel, &community_id(), SUBSCRIBER)
        .await;
    assert!(matches!(result, Err(Error::Cancelled)));

    let order = harness.order().await.unwrap();
    let tx_id = order.tx_id.clone().unwrap();

    // Nobody listens when the completion arrives
    harness
        .coordinator
        .completion_reporter()
        .report_completion(&order.id, &tx_id, OrderStatus::Success)
        .await
        .unwrap();

    let outcome = harness
        .coordinator
        .subscribe(&CancellationToken::new(), &community_id(), SUBSCRIBER)
        .await
        .unwrap();
    assert_eq!(outcome.status, OrderStatus::Success);
    assert_eq!(outcome.tx_id, Some(tx_id));
    assert_eq!(harness.processor.requests().await.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_completion_during_initiation_is_not_missed() {
    let harness = harness_with(
        FakePaymentProcessor::new(Duration::from_millis(200), None),
        CoordinatorBuilder::new(),
    );

    let coordinator = harness.coordinator.clone();
    let waiting = tokio::spawn(async move {
        coordinator
            .subscribe(&CancellationToken::new(), &community_id(), SUBSCRIBER)
            .await
    });

    // The processor reports before its initiation call has returned
    let order = wait_created(&harness).await;
    harness.waiters(&order, 1).await;
    harness
        .coordinator
        .completion_reporter()
        .report_completion(&order.id, "tx-early", OrderStatus::Success)
        .await
        .unwrap();

    let outcome = waiting.await.unwrap().unwrap();
    assert_eq!(outcome.tx_id.as_deref(), Some("tx-early"));
    assert_eq!(outcome.status, OrderStatus::Success);

    // The late tx id from the initiator is refused, the callback's one is kept
    let stored = harness.store.get_order(&order.id).await.unwrap().unwrap();
    assert_eq!(stored.tx_id.as_deref(), Some("tx-early"));
    assert_eq!(stored.status, OrderStatus::Success);
}

#[tokio::test]
async fn test_initiation_failure_leaves_created_order() {
    let harness = harness();
    harness.processor.set_fail(true);

    let result = harness
        .coordinator
        .subscribe(&CancellationToken::new(), &community_id(), SUBSCRIBER)
        .await;
    assert!(matches!(result, Err(Error::PaymentInitiationFailed(_))));

    let order = harness.order().await.unwrap();
    assert_eq!(order.status, OrderStatus::Created);
    assert!(order.tx_id.is_none());
    assert_eq!(harness.coordinator.bus().active_subscribers(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_refused_initiation_is_retried_right_away() {
    let harness = harness();
    harness.processor.set_fail(true);

    let result = harness
        .coordinator
        .subscribe(&CancellationToken::new(), &community_id(), SUBSCRIBER)
        .await;
    assert!(matches!(result, Err(Error::PaymentInitiationFailed(_))));
    let refused = harness.order().await.unwrap();
    assert!(refused.initiation_failed);

    // The next call pays again for the same order instead of waiting on nothing
    harness.processor.set_fail(false);
    let coordinator = harness.coordinator.clone();
    let waiting = tokio::spawn(async move {
        coordinator
            .subscribe(&CancellationToken::new(), &community_id(), SUBSCRIBER)
            .await
    });

    let order = harness.submitted_order().await;
    assert_eq!(order.id, refused.id);
    assert_eq!(order.status, OrderStatus::Submitted);
    assert!(!order.initiation_failed);

    harness
        .coordinator
        .completion_reporter()
        .report_completion(&order.id, order.tx_id.as_deref().unwrap(), OrderStatus::Success)
        .await
        .unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), waiting)
        .await
        .expect("retry must not hang")
        .unwrap()
        .unwrap();
    assert_eq!(outcome.order_id, refused.id);
    assert_eq!(outcome.status, OrderStatus::Success);

    let requests = harness.processor.requests().await;
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|request| request.bind_order == refused.id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_waiter_on_refused_initiation_retries() {
    let harness = harness_with(
        FakePaymentProcessor::new(Duration::from_millis(300), None),
        CoordinatorBuilder::new(),
    );
    harness.processor.set_fail(true);

    let coordinator = harness.coordinator.clone();
    let first = tokio::spawn(async move {
        coordinator
            .subscribe(&CancellationToken::new(), &community_id(), SUBSCRIBER)
            .await
    });

    // Second caller attaches while the first initiation is still in flight
    let order = wait_created(&harness).await;
    let coordinator = harness.coordinator.clone();
    let second = tokio::spawn(async move {
        coordinator
            .subscribe(&CancellationToken::new(), &community_id(), SUBSCRIBER)
            .await
    });
    harness.waiters(&order, 2).await;

    assert!(matches!(
        first.await.unwrap(),
        Err(Error::PaymentInitiationFailed(_))
    ));
    harness.processor.set_fail(false);

    let submitted = harness.submitted_order().await;
    assert_eq!(submitted.id, order.id);
    harness
        .coordinator
        .completion_reporter()
        .report_completion(
            &order.id,
            submitted.tx_id.as_deref().unwrap(),
            OrderStatus::Success,
        )
        .await
        .unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), second)
        .await
        .expect("released waiter must not hang")
        .unwrap()
        .unwrap();
    assert_eq!(outcome.order_id, order.id);
    assert_eq!(outcome.status, OrderStatus::Success);
    assert_eq!(harness.processor.requests().await.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_lost_tx_id_write_never_pays_twice() {
    let harness = harness_losing_tx_ids();
    let cancel = CancellationToken::new();
    cancel.cancel();

    // Payment starts but its tx id never reaches the store
    for _ in 0..3 {
        let result = harness
            .coordinator
            .subscribe(&cancel, &community_id(), SUBSCRIBER)
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    let order = harness.order().await.unwrap();
    assert_eq!(order.status, OrderStatus::Created);
    assert!(order.tx_id.is_none());
    assert!(!order.initiation_failed);
    assert_eq!(harness.processor.requests().await.len(), 1);

    // The callback reconciles the order and wakes the waiting caller
    let coordinator = harness.coordinator.clone();
    let waiting = tokio::spawn(async move {
        coordinator
            .subscribe(&CancellationToken::new(), &community_id(), SUBSCRIBER)
            .await
    });
    harness.waiters(&order, 1).await;

    harness
        .coordinator
        .completion_reporter()
        .report_completion(&order.id, "tx-callback", OrderStatus::Success)
        .await
        .unwrap();

    let outcome = waiting.await.unwrap().unwrap();
    assert_eq!(outcome.tx_id.as_deref(), Some("tx-callback"));
    assert_eq!(outcome.status, OrderStatus::Success);
    assert_eq!(harness.processor.requests().await.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_owner_identity_only_skips_owner_notice() {
    let harness = harness();
    let community = CommunityId::from(ORPHAN_COMMUNITY);

    let coordinator = harness.coordinator.clone();
    let target = community.clone();
    let waiting = tokio::spawn(async move {
        coordinator
            .subscribe(&CancellationToken::new(), &target, SUBSCRIBER)
            .await
    });

    let mut order = None;
    for _ in 0..1_000 {
        order = harness
            .order_in(SUBSCRIBER, &community)
            .await
            .filter(|order| order.tx_id.is_some());
        if order.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let order = order.expect("order never submitted");
    harness.waiters(&order, 1).await;

    harness
        .coordinator
        .completion_reporter()
        .report_completion(&order.id, order.tx_id.as_deref().unwrap(), OrderStatus::Success)
        .await
        .unwrap();

    let outcome = waiting.await.unwrap().unwrap();
    assert_eq!(outcome.status, OrderStatus::Success);

    harness.coordinator.wait_dispatches().await;
    let sent = harness.notifier.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "u1");
    assert_eq!(
        sent[0].content,
        "Subscribe to ferris dao successfully, pay 2.000000 FavT"
    );
}

#[tokio::test]
async fn test_unknown_community_or_identity() {
    let harness = harness();

    let result = harness
        .coordinator
        .subscribe(
            &CancellationToken::new(),
            &CommunityId::from("missing"),
            SUBSCRIBER,
        )
        .await;
    assert!(matches!(result, Err(Error::CommunityNotFound(_))));

    let result = harness
        .coordinator
        .subscribe(&CancellationToken::new(), &community_id(), "mallory")
        .await;
    assert!(matches!(result, Err(Error::IdentityNotFound(_))));

    assert!(harness.order_for("mallory").await.is_none());
    assert!(harness.processor.requests().await.is_empty());
}

#[tokio::test]
async fn test_pending_orders_are_counted() {
    let harness = harness();
    let cancel = CancellationToken::new();
    cancel.cancel();

    for subscriber in [SUBSCRIBER, "bob"] {
        let _ = harness
            .coordinator
            .subscribe(&cancel, &community_id(), subscriber)
            .await;
    }

    assert_eq!(harness.coordinator.check_pending_orders().await.unwrap(), 2);
}

async fn wait_created(harness: &Harness) -> SubscriptionOrder {
    for _ in 0..1_000 {
        if let Some(order) = harness.order().await {
            return order;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    panic!("order never created");
}
