//! Integration tests for the sign-in merge.
//!
//! Reconciliation runs once per anonymous -> authenticated edge. It is
//! additive: shared lines sum, nothing on either side is deleted.

use std::sync::Arc;
use std::time::Duration;

use cart_sync::storage::CartPersistence;
use cart_sync::{JsonFileStorage, ReconcileOutcome, SessionCell};
use cart_sync_core::Cart;
use cart_sync_integration_tests::{
    Call, FakeCartService, TestContext, cart, engine_over, id, product, qty, token,
};
use secrecy::SecretString;

#[tokio::test(start_paused = true)]
async fn test_anonymous_cart_is_pushed_on_sign_in() {
    let ctx = TestContext::anonymous();
    ctx.engine.add(product("A"), qty(2)).unwrap();

    ctx.sign_in().await;
    ctx.settle().await;

    assert_eq!(
        ctx.service.mutations(),
        vec![Call::Add("A".into()), Call::Increase("A".into())]
    );
    assert_eq!(ctx.service.server(), cart(&[("A", 2)]));
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_carts_are_summed_without_deletes() {
    let ctx = TestContext::anonymous_with_server(cart(&[("B", 1), ("C", 1)]));
    ctx.engine.add(product("A"), qty(1)).unwrap();
    ctx.engine.add(product("B"), qty(3)).unwrap();

    ctx.sign_in().await;
    ctx.settle().await;

    let expected = cart(&[("A", 1), ("B", 4), ("C", 1)]);
    assert_eq!(ctx.engine.cart(), expected);
    assert_eq!(ctx.service.server(), expected);
    assert!(!ctx.service.mutations().iter().any(Call::is_destructive));
}

#[tokio::test(start_paused = true)]
async fn test_empty_local_cart_adopts_server_cart() {
    let server = cart(&[("S", 2)]);
    let ctx = TestContext::anonymous_with_server(server.clone());

    ctx.session.sign_in(token());
    let outcome = ctx.engine.auth_changed().await.unwrap();
    ctx.settle().await;

    assert_eq!(outcome, Some(ReconcileOutcome::AdoptedServer));
    assert_eq!(ctx.engine.cart(), server);
    assert!(ctx.service.mutations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_merged_cart_is_persisted() {
    let ctx = TestContext::anonymous_with_server(cart(&[("S", 1)]));
    ctx.engine.add(product("L"), qty(1)).unwrap();

    ctx.sign_in().await;

    let reopened = cart_sync_integration_tests::engine_over(
        &ctx.service,
        &ctx.session,
        ctx.storage.clone(),
    );
    assert_eq!(reopened.cart(), cart(&[("L", 1), ("S", 1)]));
}

#[tokio::test(start_paused = true)]
async fn test_repeated_checks_reconcile_once() {
    let ctx = TestContext::anonymous_with_server(cart(&[("A", 1)]));
    ctx.engine.add(product("A"), qty(1)).unwrap();

    ctx.sign_in().await;
    assert_eq!(ctx.engine.auth_changed().await.unwrap(), None);
    assert_eq!(ctx.engine.auth_changed().await.unwrap(), None);
    ctx.settle().await;

    assert_eq!(ctx.engine.cart(), cart(&[("A", 2)]));
    assert_eq!(ctx.service.server(), cart(&[("A", 2)]));
}

#[tokio::test(start_paused = true)]
async fn test_sign_out_keeps_local_cart_and_stops_syncing() {
    let ctx = TestContext::anonymous();
    ctx.engine.add(product("A"), qty(1)).unwrap();
    ctx.sign_in().await;
    ctx.settle().await;
    ctx.service.reset_calls();

    ctx.sign_out().await;
    ctx.engine.set_qty(&id("A"), 5).unwrap();
    ctx.settle().await;

    assert_eq!(ctx.engine.cart(), cart(&[("A", 5)]));
    assert!(ctx.service.calls().is_empty());
    assert_eq!(ctx.service.server(), cart(&[("A", 1)]));
}

#[tokio::test(start_paused = true)]
async fn test_sign_in_after_sign_out_merges_again() {
    let ctx = TestContext::anonymous();
    ctx.engine.add(product("A"), qty(1)).unwrap();
    ctx.sign_in().await;
    ctx.settle().await;

    ctx.sign_out().await;
    ctx.engine.add(product("B"), qty(1)).unwrap();
    ctx.sign_in().await;
    ctx.settle().await;

    // The kept local cart is a second contribution to the merge
    let expected = cart(&[("A", 2), ("B", 1)]);
    assert_eq!(ctx.engine.cart(), expected);
    assert_eq!(ctx.service.server(), expected);
}

#[tokio::test(start_paused = true)]
async fn test_both_empty_is_in_sync() {
    let ctx = TestContext::anonymous_with_server(Cart::new());

    ctx.session.sign_in(token());
    let outcome = ctx.engine.auth_changed().await.unwrap();

    assert_eq!(outcome, Some(ReconcileOutcome::AlreadyInSync));
}

#[tokio::test(start_paused = true)]
async fn test_change_during_sign_in_fetch_keeps_server_lines() {
    let ctx = TestContext::anonymous_with_server(cart(&[("B", 1)]));
    ctx.engine.add(product("A"), qty(1)).unwrap();
    ctx.service.set_latency(Duration::from_secs(1));

    ctx.session.sign_in(token());
    let (outcome, added) = tokio::join!(ctx.engine.auth_changed(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        ctx.engine.add(product("C"), qty(1))
    });
    assert_eq!(outcome.unwrap(), Some(ReconcileOutcome::Pushed));
    added.unwrap();
    ctx.settle().await;

    let expected = cart(&[("A", 1), ("B", 1), ("C", 1)]);
    assert_eq!(ctx.engine.cart(), expected);
    assert_eq!(ctx.service.server(), expected);
    assert!(!ctx.service.mutations().iter().any(Call::is_destructive));
}

#[tokio::test(start_paused = true)]
async fn test_reconciled_session_is_not_merged_again_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(FakeCartService::default());
    let storage = || -> Arc<dyn CartPersistence> { Arc::new(JsonFileStorage::new(dir.path())) };

    // First run: anonymous-era cart is merged and pushed
    let session = Arc::new(SessionCell::signed_in(token()));
    let engine = engine_over(&service, &session, storage());
    engine.add(product("A"), qty(2)).unwrap();
    assert_eq!(
        engine.auth_changed().await.unwrap(),
        Some(ReconcileOutcome::Pushed)
    );
    engine.sync().wait_idle().await.unwrap();
    engine.sync().shutdown();
    let pushed = service.mutations();
    assert_eq!(service.server(), cart(&[("A", 2)]));

    // Second run, same session: nothing is doubled
    let session = Arc::new(SessionCell::signed_in(token()));
    let engine = engine_over(&service, &session, storage());
    assert_eq!(
        engine.auth_changed().await.unwrap(),
        Some(ReconcileOutcome::Resumed)
    );
    engine.sync().wait_idle().await.unwrap();
    engine.sync().shutdown();
    assert_eq!(engine.cart(), cart(&[("A", 2)]));
    assert_eq!(service.server(), cart(&[("A", 2)]));
    assert_eq!(service.mutations(), pushed);

    // A new session is a new sign-in and merges
    let session = Arc::new(SessionCell::signed_in(SecretString::from(
        "another-session-token",
    )));
    let engine = engine_over(&service, &session, storage());
    assert_eq!(
        engine.auth_changed().await.unwrap(),
        Some(ReconcileOutcome::Pushed)
    );
    engine.sync().wait_idle().await.unwrap();
    assert_eq!(engine.cart(), cart(&[("A", 4)]));
    assert_eq!(service.server(), cart(&[("A", 4)]));
}

#[tokio::test(start_paused = true)]
async fn test_local_changes_after_resume_are_pushed() {
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(FakeCartService::default());
    let session = Arc::new(SessionCell::signed_in(token()));

    let engine = engine_over(&service, &session, Arc::new(JsonFileStorage::new(dir.path())));
    engine.auth_changed().await.unwrap();
    engine.sync().wait_idle().await.unwrap();
    engine.sync().shutdown();

    let engine = engine_over(&service, &session, Arc::new(JsonFileStorage::new(dir.path())));
    engine.add(product("B"), qty(1)).unwrap();
    assert_eq!(
        engine.auth_changed().await.unwrap(),
        Some(ReconcileOutcome::Resumed)
    );
    engine.sync().wait_idle().await.unwrap();

    assert_eq!(service.server(), cart(&[("B", 1)]));
    assert_eq!(service.mutations(), vec![Call::Add("B".into())]);
}
