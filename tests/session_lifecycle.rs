//! End-to-end lifecycle scenarios over an in-memory signaling store:
//! connect, self-heal, restart-then-replace, and presence-driven disposal,
//! plus the talkback channel's independence from the primary stream.

mod harness;

use std::sync::Arc;
use std::time::Duration;

use harness::{init_tracing, test_config, wait_until, FakeLinkFactory};
use proctorcast::media::{LocalTracks, MediaKind, RemoteStream, RemoteTrackInfo};
use proctorcast::peer::LinkConnectivity;
use proctorcast::signaling::{InMemorySignaling, SignalPath, SignalingTransport};
use proctorcast::{
    BroadcastStatus, Broadcaster, TalkbackListener, TalkbackSpeaker, TalkbackStatus, ViewStatus,
    Viewer,
};

fn path(raw: &str) -> SignalPath {
    SignalPath::parse(raw).unwrap()
}

/// Viewer announces, broadcaster offers, viewer answers; both sides reach
/// connected and the broadcaster counts one active viewer.
#[tokio::test]
async fn viewer_and_broadcaster_connect() {
    init_tracing();
    let store = Arc::new(InMemorySignaling::new());
    let b_links = FakeLinkFactory::auto_connecting();
    let v_links = FakeLinkFactory::auto_connecting();

    let broadcaster = Broadcaster::start(
        test_config("b1"),
        store.clone(),
        b_links.clone(),
        LocalTracks::audio_video("b1"),
    )
    .await
    .unwrap();
    assert_eq!(broadcaster.status(), BroadcastStatus::Ready);

    let viewer = Viewer::start(test_config("v1"), store.clone(), v_links.clone(), "b1")
        .await
        .unwrap();

    assert!(
        wait_until(Duration::from_secs(2), || {
            broadcaster.active_connections() == 1 && viewer.status() == ViewStatus::Connected
        })
        .await
    );
    assert_eq!(broadcaster.status(), BroadcastStatus::Streaming);
    assert_eq!(broadcaster.viewer_counts().total, 1);

    // The handshake ran over the expected wire paths.
    assert!(store.read(&path("channel/b1")).is_some());
    assert!(store.read(&path("channel/b1/viewers/v1")).is_some());
    assert!(store.read(&path("channel/b1/offers/v1")).is_some());
    assert!(store.read(&path("channel/b1/answers/v1")).is_some());

    viewer.stop().await;
    broadcaster.stop().await;
}

/// A transient disconnect that heals inside the grace window causes no
/// teardown: same link, same subscriptions.
#[tokio::test]
async fn disconnect_that_self_heals_is_not_torn_down() {
    init_tracing();
    let store = Arc::new(InMemorySignaling::new());
    let b_links = FakeLinkFactory::manual();
    let v_links = FakeLinkFactory::manual();

    let broadcaster = Broadcaster::start(
        test_config("b1"),
        store.clone(),
        b_links.clone(),
        LocalTracks::audio_video("b1"),
    )
    .await
    .unwrap();
    let viewer = Viewer::start(test_config("v1"), store.clone(), v_links.clone(), "b1")
        .await
        .unwrap();

    // Let the handshake complete, then bring both sides up by script.
    assert!(
        wait_until(Duration::from_secs(2), || {
            !b_links.links_for("v1").is_empty()
                && b_links.links_for("v1")[0]
                    .ops()
                    .contains(&"set_remote_answer".to_string())
        })
        .await
    );
    let b_link = b_links.links_for("v1")[0].clone();
    b_link.emit_connectivity(LinkConnectivity::Connected);
    v_links.last().emit_connectivity(LinkConnectivity::Connected);
    assert!(wait_until(Duration::from_secs(1), || broadcaster.active_connections() == 1).await);

    let subs_before = store.subscription_count();

    // Disconnect, then heal well inside the 60ms test grace window.
    b_link.emit_connectivity(LinkConnectivity::Disconnected);
    tokio::time::sleep(Duration::from_millis(20)).await;
    b_link.emit_connectivity(LinkConnectivity::Connected);

    // Past the grace window: still the original link, nothing replaced.
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(b_links.links_for("v1").len(), 1);
    assert!(!b_link.is_closed());
    assert_eq!(store.subscription_count(), subs_before);
    assert_eq!(broadcaster.active_connections(), 1);

    viewer.stop().await;
    broadcaster.stop().await;
}

/// A connectivity failure gets exactly one ICE restart; when that does not
/// land either, the session is replaced and the successor renegotiates.
#[tokio::test]
async fn failure_restarts_once_then_replaces() {
    init_tracing();
    let store = Arc::new(InMemorySignaling::new());
    let b_links = FakeLinkFactory::manual();
    let v_links = FakeLinkFactory::manual();

    let broadcaster = Broadcaster::start(
        test_config("b1"),
        store.clone(),
        b_links.clone(),
        LocalTracks::audio_video("b1"),
    )
    .await
    .unwrap();
    let viewer = Viewer::start(test_config("v1"), store.clone(), v_links.clone(), "b1")
        .await
        .unwrap();

    assert!(
        wait_until(Duration::from_secs(2), || {
            !b_links.links_for("v1").is_empty()
                && b_links.links_for("v1")[0]
                    .ops()
                    .contains(&"set_remote_answer".to_string())
        })
        .await
    );
    let first = b_links.links_for("v1")[0].clone();
    first.emit_connectivity(LinkConnectivity::Connected);
    v_links.last().emit_connectivity(LinkConnectivity::Connected);
    assert!(wait_until(Duration::from_secs(1), || broadcaster.active_connections() == 1).await);

    // Fail and never recover: one restart offer, then replacement.
    first.emit_connectivity(LinkConnectivity::Failed);
    assert!(wait_until(Duration::from_secs(1), || first.restart_count() == 1).await);

    assert!(
        wait_until(Duration::from_secs(2), || b_links.links_for("v1").len() == 2).await
    );
    assert_eq!(first.restart_count(), 1);
    assert!(first.is_closed());
    assert!(first.is_detached());

    // The successor negotiates from scratch and can connect.
    let second = b_links.links_for("v1")[1].clone();
    assert!(
        wait_until(Duration::from_secs(2), || {
            second.ops().contains(&"set_remote_answer".to_string())
        })
        .await
    );
    second.emit_connectivity(LinkConnectivity::Connected);
    assert!(wait_until(Duration::from_secs(1), || broadcaster.active_connections() == 1).await);

    viewer.stop().await;
    broadcaster.stop().await;
}

/// Removing a viewer's presence while its session is connected disposes
/// the session and empties its signaling paths.
#[tokio::test]
async fn presence_removal_disposes_connected_session() {
    init_tracing();
    let store = Arc::new(InMemorySignaling::new());
    let b_links = FakeLinkFactory::auto_connecting();
    let v_links = FakeLinkFactory::auto_connecting();

    let broadcaster = Broadcaster::start(
        test_config("b1"),
        store.clone(),
        b_links.clone(),
        LocalTracks::audio_video("b1"),
    )
    .await
    .unwrap();
    let viewer = Viewer::start(test_config("v1"), store.clone(), v_links.clone(), "b1")
        .await
        .unwrap();
    assert!(wait_until(Duration::from_secs(2), || broadcaster.active_connections() == 1).await);

    // Presence vanishes abruptly, as if the viewer's connection dropped.
    store.remove(&path("channel/b1/viewers/v1")).await.unwrap();

    assert!(
        wait_until(Duration::from_secs(1), || broadcaster.viewer_counts().total == 0).await
    );
    assert!(store.read(&path("channel/b1/offers/v1")).is_none());
    assert!(store.read(&path("channel/b1/ice/v1/broadcaster")).is_none());
    assert!(b_links.links_for("v1")[0].is_closed());
    assert_eq!(broadcaster.status(), BroadcastStatus::Ready);

    viewer.stop().await;
    broadcaster.stop().await;
}

/// Received media is surfaced only after the settle delay, and a track
/// update within the same stream does not re-surface it.
#[tokio::test]
async fn remote_media_settles_before_surfacing() {
    init_tracing();
    let store = Arc::new(InMemorySignaling::new());
    let b_links = FakeLinkFactory::auto_connecting();
    let v_links = FakeLinkFactory::auto_connecting();

    let broadcaster = Broadcaster::start(
        test_config("b1"),
        store.clone(),
        b_links.clone(),
        LocalTracks::audio_video("b1"),
    )
    .await
    .unwrap();
    let viewer = Viewer::start(test_config("v1"), store.clone(), v_links.clone(), "b1")
        .await
        .unwrap();
    assert!(
        wait_until(Duration::from_secs(2), || viewer.status() == ViewStatus::Connected).await
    );
    assert!(viewer.media().is_none());

    let audio = RemoteTrackInfo {
        id: "audio-b1".to_string(),
        kind: MediaKind::Audio,
    };
    let video = RemoteTrackInfo {
        id: "video-b1".to_string(),
        kind: MediaKind::Video,
    };
    v_links.last().emit_remote_media(RemoteStream {
        stream_id: "stream-b1".to_string(),
        tracks: vec![audio.clone()],
    });

    assert!(
        wait_until(Duration::from_secs(1), || viewer.media().is_some()).await
    );
    let surfaced = viewer.media().unwrap();
    assert_eq!(surfaced.stream_id, "stream-b1");

    // Second track within the same stream: identity unchanged, so the
    // sink-side state must not be reset.
    v_links.last().emit_remote_media(RemoteStream {
        stream_id: "stream-b1".to_string(),
        tracks: vec![audio, video],
    });
    tokio::time::sleep(Duration::from_millis(60)).await;
    let after = viewer.media().unwrap();
    assert_eq!(after.stream_id, "stream-b1");
    assert_eq!(after.tracks.len(), 1);

    viewer.stop().await;
    broadcaster.stop().await;
}

/// Talkback connects with swapped roles and is fully independent of the
/// primary stream for the same pair of participants.
#[tokio::test]
async fn talkback_is_independent_of_primary_stream() {
    init_tracing();
    let store = Arc::new(InMemorySignaling::new());
    let b_links = FakeLinkFactory::auto_connecting();
    let v_links = FakeLinkFactory::auto_connecting();
    let s_links = FakeLinkFactory::auto_connecting();
    let l_links = FakeLinkFactory::auto_connecting();

    let broadcaster = Broadcaster::start(
        test_config("b1"),
        store.clone(),
        b_links.clone(),
        LocalTracks::audio_video("b1"),
    )
    .await
    .unwrap();
    let viewer = Viewer::start(test_config("v1"), store.clone(), v_links.clone(), "b1")
        .await
        .unwrap();
    assert!(wait_until(Duration::from_secs(2), || broadcaster.active_connections() == 1).await);

    let listener = TalkbackListener::start(test_config("b1"), store.clone(), l_links.clone(), "b1")
        .await
        .unwrap();
    let speaker = TalkbackSpeaker::start(
        test_config("a1"),
        store.clone(),
        s_links.clone(),
        "b1",
        LocalTracks::audio_only("a1"),
    )
    .await
    .unwrap();
    assert!(speaker.is_speaking());

    assert!(
        wait_until(Duration::from_secs(2), || {
            speaker.status() == TalkbackStatus::Live && listener.is_hearing()
        })
        .await
    );
    assert!(store.read(&path("talkback/b1/admin/a1")).is_some());
    assert!(store.read(&path("talkback/b1/offers/a1")).is_some());

    // Ending talkback leaves the primary stream untouched.
    speaker.stop().await;
    assert!(
        wait_until(Duration::from_secs(1), || listener.counts().total == 0).await
    );
    assert!(!speaker.is_speaking());
    assert_eq!(broadcaster.active_connections(), 1);
    assert_eq!(viewer.status(), ViewStatus::Connected);

    listener.stop().await;
    viewer.stop().await;
    broadcaster.stop().await;
}

/// The viewer parks while the broadcaster is gone and reconnects to a
/// fresh session when presence returns.
#[tokio::test]
async fn viewer_survives_broadcaster_restart() {
    init_tracing();
    let store = Arc::new(InMemorySignaling::new());
    let b_links = FakeLinkFactory::auto_connecting();
    let v_links = FakeLinkFactory::auto_connecting();

    let broadcaster = Broadcaster::start(
        test_config("b1"),
        store.clone(),
        b_links.clone(),
        LocalTracks::audio_video("b1"),
    )
    .await
    .unwrap();
    let viewer = Viewer::start(test_config("v1"), store.clone(), v_links.clone(), "b1")
        .await
        .unwrap();
    assert!(
        wait_until(Duration::from_secs(2), || viewer.status() == ViewStatus::Connected).await
    );
    broadcaster.stop().await;

    assert!(
        wait_until(Duration::from_secs(2), || viewer.status() == ViewStatus::Connecting).await
    );

    let broadcaster2 = Broadcaster::start(
        test_config("b1"),
        store.clone(),
        b_links.clone(),
        LocalTracks::audio_video("b1"),
    )
    .await
    .unwrap();
    assert!(
        wait_until(Duration::from_secs(2), || {
            viewer.status() == ViewStatus::Connected && broadcaster2.active_connections() == 1
        })
        .await
    );
    assert!(v_links.created_count() >= 2);

    viewer.stop().await;
    broadcaster2.stop().await;
}
