mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use pitchwire_app::guard::LOGIN_ROUTE;
use pitchwire_app::view::ViewUpdate;
use pitchwire_core::error::{FetchError, SNAPSHOT_ERROR_BANNER};
use pitchwire_core::projection::MatchPage;
use pitchwire_core::protocol::{ChannelState, CloseReason, MatchStatus};
use pitchwire_core::session::{MemoryBackend, SessionStore};
use tokio::sync::Notify;

fn ready_view(page: MatchPage) -> pitchwire_core::projection::MatchView {
    match page {
        MatchPage::Ready { view, .. } => view,
        other => panic!("expected ready page, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn live_update_is_merged_into_snapshot() {
    let connector = Arc::new(FakeConnector::new());
    let feed = connector.accept_next();
    let snapshots = FakeSnapshots::new().with("m1", Ok(snapshot("m1", MatchStatus::Scheduled)));
    let mut h = Harness::start(signed_in(), snapshots, Arc::clone(&connector));

    h.show("m1").await;
    let view = ready_view(h.ready_and_open().await);
    assert!(!view.is_live);
    assert_eq!(view.team1.score, 0);

    feed.push(r#"{"match_id":"m1","status":"ONGOING","team1_score":45}"#);
    let view = ready_view(h.ready_page().await);
    assert!(view.is_live);
    assert_eq!(view.status_label, "ONGOING");
    assert_eq!(view.team1.score, 45);
    assert_eq!(view.team2.score, 0);

    let (snapshots, _) = h.close().await;
    assert_eq!(snapshots.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn updates_for_other_matches_are_ignored() {
    let connector = Arc::new(FakeConnector::new());
    let feed = connector.accept_next();
    let snapshots = FakeSnapshots::new().with("m1", Ok(snapshot("m1", MatchStatus::Ongoing)));
    let mut h = Harness::start(signed_in(), snapshots, Arc::clone(&connector));

    h.show("m1").await;
    ready_view(h.ready_and_open().await);

    feed.push(r#"{"match_id":"m2","team1_score":999,"status":"COMPLETED"}"#);
    feed.push("{not json");
    feed.push(r#"{"match_id":"m1","team2_score":7}"#);

    // The first page after the foreign and malformed frames reflects only
    // the m1 update.
    let view = ready_view(h.ready_page().await);
    assert_eq!(view.team1.score, 0);
    assert_eq!(view.team2.score, 7);
    assert!(view.is_live);

    h.close().await;
}

#[tokio::test(start_paused = true)]
async fn reconnects_after_transport_error_and_keeps_merging() {
    let connector = Arc::new(FakeConnector::new());
    let first = connector.accept_next();
    let second = connector.accept_next();
    let snapshots = FakeSnapshots::new().with("m1", Ok(snapshot("m1", MatchStatus::Ongoing)));
    let mut h = Harness::start(signed_in(), snapshots, Arc::clone(&connector));

    h.show("m1").await;
    ready_view(h.ready_and_open().await);

    let failed_at = tokio::time::Instant::now();
    first.fail("connection reset");
    h.wait_for(|u| {
        matches!(
            u,
            ViewUpdate::Channel(ChannelState::Closed(CloseReason::Error(_)))
        )
    })
    .await;
    h.channel_state(ChannelState::Connecting).await;
    h.channel_state(ChannelState::Open).await;
    assert!(failed_at.elapsed() <= Duration::from_millis(3000) + Duration::from_millis(100));
    assert_eq!(connector.attempts(), 2);

    second.push(r#"{"match_id":"m1","team1_score":12,"striker":"Rao"}"#);
    let view = ready_view(h.ready_page().await);
    assert_eq!(view.team1.score, 12);
    assert_eq!(
        view.current.map(|c| c.striker),
        Some("Rao".to_string())
    );

    h.close().await;
}

#[tokio::test(start_paused = true)]
async fn unauthenticated_view_redirects_without_fetching() {
    let connector = Arc::new(FakeConnector::new());
    let mut h = Harness::start(signed_out(), FakeSnapshots::new(), Arc::clone(&connector));

    h.show("m1").await;
    let update = h.wait_for(|u| matches!(u, ViewUpdate::Redirect(_))).await;
    assert_eq!(update, ViewUpdate::Redirect(LOGIN_ROUTE));

    tokio::time::sleep(Duration::from_secs(10)).await;
    let (snapshots, connector) = h.close().await;
    assert_eq!(snapshots.calls(), 0);
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn waits_for_identity_before_activating() {
    let connector = Arc::new(FakeConnector::new());
    let _feed = connector.accept_next();
    let snapshots = FakeSnapshots::new().with("m1", Ok(snapshot("m1", MatchStatus::Scheduled)));
    let session = SessionStore::new(Box::new(MemoryBackend::with_user(alice())));
    let mut h = Harness::start(session, snapshots, Arc::clone(&connector));

    let update = h.wait_for(|_| true).await;
    assert_eq!(update, ViewUpdate::Page(Box::new(MatchPage::Loading)));

    h.show("m1").await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.snapshots.calls(), 0);
    assert_eq!(connector.attempts(), 0);

    h.session.initialize();
    ready_view(h.ready_page().await);
    assert_eq!(h.snapshots.calls(), 1);
    assert_eq!(connector.attempts(), 1);

    h.close().await;
}

#[tokio::test(start_paused = true)]
async fn snapshot_failure_shows_error_banner() {
    let connector = Arc::new(FakeConnector::new());
    let _feed = connector.accept_next();
    let snapshots = FakeSnapshots::new().with("m1", Err(FetchError::Status(500)));
    let mut h = Harness::start(signed_in(), snapshots, Arc::clone(&connector));

    h.show("m1").await;
    let update = h
        .wait_for(|u| matches!(u, ViewUpdate::Page(p) if matches!(**p, MatchPage::NotFound { .. })))
        .await;
    assert_eq!(
        update,
        ViewUpdate::Page(Box::new(MatchPage::NotFound {
            error: Some(SNAPSHOT_ERROR_BANNER.to_string()),
        }))
    );

    // No retry.
    tokio::time::sleep(Duration::from_secs(30)).await;
    let (snapshots, _) = h.close().await;
    assert_eq!(snapshots.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn update_before_snapshot_is_dropped() {
    let gate = Arc::new(Notify::new());
    let connector = Arc::new(FakeConnector::new());
    let feed = connector.accept_next();
    let snapshots = FakeSnapshots::gated(Arc::clone(&gate))
        .with("m1", Ok(snapshot("m1", MatchStatus::Scheduled)));
    let mut h = Harness::start(signed_in(), snapshots, Arc::clone(&connector));

    h.show("m1").await;
    h.channel_state(ChannelState::Open).await;
    feed.push(r#"{"match_id":"m1","team1_score":45}"#);
    tokio::time::sleep(Duration::from_secs(1)).await;

    gate.notify_one();
    let view = ready_view(h.ready_page().await);
    assert_eq!(view.team1.score, 0);

    h.close().await;
}

#[tokio::test(start_paused = true)]
async fn close_cancels_pending_reconnect() {
    let connector = Arc::new(FakeConnector::new());
    let snapshots = FakeSnapshots::new().with("m1", Ok(snapshot("m1", MatchStatus::Ongoing)));
    let mut h = Harness::start(signed_in(), snapshots, Arc::clone(&connector));

    // No connection registered: the first connect is refused and a
    // reconnect is pending when the view closes.
    h.show("m1").await;
    h.wait_for(|u| {
        matches!(
            u,
            ViewUpdate::Channel(ChannelState::Closed(CloseReason::Error(_)))
        )
    })
    .await;

    let (_, connector) = h.close().await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn switching_matches_closes_the_old_channel() {
    let connector = Arc::new(FakeConnector::new());
    let first = connector.accept_next();
    let second = connector.accept_next();
    let snapshots = FakeSnapshots::new()
        .with("m1", Ok(snapshot("m1", MatchStatus::Ongoing)))
        .with("m2", Ok(snapshot("m2", MatchStatus::Scheduled)));
    let mut h = Harness::start(signed_in(), snapshots, Arc::clone(&connector));

    h.show("m1").await;
    ready_view(h.ready_and_open().await);

    h.show("m2").await;
    let view = ready_view(h.ready_and_open().await);
    assert_eq!(view.match_id.as_str(), "m2");
    assert_eq!(connector.closed(), 1);
    assert_eq!(connector.attempts(), 2);

    // Frames on the old connection go nowhere.
    first.push(r#"{"match_id":"m1","team1_score":100}"#);
    second.push(r#"{"match_id":"m2","team2_score":3}"#);
    let view = ready_view(h.ready_page().await);
    assert_eq!(view.match_id.as_str(), "m2");
    assert_eq!(view.team2.score, 3);

    // Re-showing the same match does not reactivate.
    h.show("m2").await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.snapshots.calls(), 2);

    h.close().await;
}

#[tokio::test(start_paused = true)]
async fn logout_tears_down_and_redirects() {
    let connector = Arc::new(FakeConnector::new());
    let _feed = connector.accept_next();
    let snapshots = FakeSnapshots::new().with("m1", Ok(snapshot("m1", MatchStatus::Ongoing)));
    let mut h = Harness::start(signed_in(), snapshots, Arc::clone(&connector));

    h.show("m1").await;
    ready_view(h.ready_and_open().await);

    h.session.clear().unwrap();
    let update = h.wait_for(|u| matches!(u, ViewUpdate::Redirect(_))).await;
    assert_eq!(update, ViewUpdate::Redirect(LOGIN_ROUTE));
    assert_eq!(connector.closed(), 1);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(connector.attempts(), 1);

    h.close().await;
}
