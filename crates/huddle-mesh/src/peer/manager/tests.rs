use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::*;
use crate::media::{MediaConstraints, MediaSource};
use crate::testing::{EngineOp, FakeEngine, FakeMedia};

struct Harness {
    engine: FakeEngine,
    manager: PeerManager,
    inputs: mpsc::UnboundedReceiver<SessionInput>,
}

fn harness(engine: FakeEngine) -> Harness {
    let (tx, rx) = mpsc::unbounded_channel();
    let options = PeerManagerOptions {
        ice_servers: IceServers::default(),
        data_channel_label: "huddle".into(),
        gathering_timeout: Duration::from_millis(2000),
    };
    let mut manager = PeerManager::new(Arc::new(engine.clone()), options, tx);
    manager.set_local_id("alice");
    Harness {
        engine,
        manager,
        inputs: rx,
    }
}

impl Harness {
    /// Feed queued engine callbacks and timers back in, as the session
    /// loop does.
    async fn pump(&mut self) -> Vec<PeerEffect> {
        let mut effects = Vec::new();
        while let Ok(input) = self.inputs.try_recv() {
            match input {
                SessionInput::Engine {
                    participant_id,
                    epoch,
                    event,
                } => effects.extend(self.manager.handle_engine(&participant_id, epoch, event).await),
                SessionInput::Timer {
                    participant_id,
                    epoch,
                    kind: TimerKind::GatheringGrace,
                } => effects.extend(self.manager.on_gathering_timeout(&participant_id, epoch)),
                _ => {}
            }
        }
        effects
    }

    /// Drive an initiator link for `peer` all the way to `Connected`.
    async fn connect_initiator(&mut self, peer: &str) {
        self.manager.add_peer(peer, Role::Initiator, None, 0).await;
        self.pump().await;
        self.manager.handle_signal(answer_from(peer, "v=0 answer")).await;
        self.engine.establish(peer);
        self.pump().await;
        assert_eq!(self.manager.state(peer), Some(ConnectionState::Connected));
    }
}

fn states(effects: &[PeerEffect], peer: &str) -> Vec<ConnectionState> {
    effects
        .iter()
        .filter_map(|e| match e {
            PeerEffect::StateChanged {
                participant_id, state, ..
            } if participant_id == peer => Some(*state),
            _ => None,
        })
        .collect()
}

fn sent(effects: &[PeerEffect]) -> Vec<SignalingMessage> {
    effects
        .iter()
        .filter_map(|e| match e {
            PeerEffect::Send(message) => Some(message.clone()),
            _ => None,
        })
        .collect()
}

fn candidate(n: u32) -> IceCandidateInit {
    IceCandidateInit::new(format!("candidate:c{n} 1 udp 1 192.168.1.{n} 4000 typ host"))
}

fn offer_from(peer: &str, sdp: &str, candidates: Vec<IceCandidateInit>) -> SignalingMessage {
    SignalingMessage::Offer {
        from_participant: peer.into(),
        to_participant: "alice".into(),
        offer: SessionDescription::offer(sdp),
        candidates,
    }
}

fn answer_from(peer: &str, sdp: &str) -> SignalingMessage {
    SignalingMessage::Answer {
        from_participant: peer.into(),
        to_participant: "alice".into(),
        answer: SessionDescription::answer(sdp),
        candidates: Vec::new(),
    }
}

fn trickle_from(peer: &str, c: IceCandidateInit) -> SignalingMessage {
    SignalingMessage::IceCandidate {
        from_participant: peer.into(),
        to_participant: "alice".into(),
        candidate: c,
    }
}

#[tokio::test]
async fn initiator_walks_offer_path() {
    let mut h = harness(FakeEngine::new());

    let effects = h.manager.add_peer("bob", Role::Initiator, None, 0).await;
    assert_eq!(states(&effects, "bob"), [ConnectionState::New, ConnectionState::Gathering]);
    assert!(sent(&effects).is_empty());
    assert!(h.engine.ops("bob").contains(&EngineOp::Created {
        negotiate_data_channel: true
    }));

    let effects = h.pump().await;
    assert_eq!(states(&effects, "bob"), [ConnectionState::Offering]);
    let messages = sent(&effects);
    assert_eq!(messages.len(), 1);
    match &messages[0] {
        SignalingMessage::Offer {
            from_participant,
            to_participant,
            candidates,
            ..
        } => {
            assert_eq!(from_participant, "alice");
            assert_eq!(to_participant, "bob");
            assert_eq!(candidates.len(), 1);
        }
        other => panic!("expected an offer, got {other:?}"),
    }

    let effects = h.manager.handle_signal(answer_from("bob", "v=0 answer")).await;
    assert_eq!(states(&effects, "bob"), [ConnectionState::Connecting]);

    h.engine.establish("bob");
    let effects = h.pump().await;
    assert_eq!(states(&effects, "bob"), [ConnectionState::Connected]);
    assert!(effects.contains(&PeerEffect::SideChannelReady {
        participant_id: "bob".into(),
        ready: true,
    }));
    assert!(effects
        .iter()
        .any(|e| matches!(e, PeerEffect::RemoteStream { participant_id, .. } if participant_id == "bob")));
    assert!(h.manager.is_side_channel_ready("bob"));
}

#[tokio::test]
async fn responder_walks_answer_path() {
    let mut h = harness(FakeEngine::new());

    let effects = h.manager.add_peer("bob", Role::Responder, None, 0).await;
    assert_eq!(states(&effects, "bob"), [ConnectionState::New]);
    assert!(h.engine.ops("bob").contains(&EngineOp::Created {
        negotiate_data_channel: false
    }));
    assert!(!h
        .engine
        .ops("bob")
        .iter()
        .any(|op| matches!(op, EngineOp::CreateOffer { .. })));

    let effects = h
        .manager
        .handle_signal(offer_from("bob", "v=0 offer", vec![candidate(1)]))
        .await;
    assert_eq!(states(&effects, "bob"), [ConnectionState::Answering]);

    let effects = h.pump().await;
    assert_eq!(states(&effects, "bob"), [ConnectionState::Connecting]);
    let messages = sent(&effects);
    assert!(matches!(
        &messages[..],
        [SignalingMessage::Answer { to_participant, candidates, .. }] if to_participant == "bob" && candidates.len() == 1
    ));

    h.engine.establish("bob");
    let effects = h.pump().await;
    assert_eq!(states(&effects, "bob"), [ConnectionState::Connected]);
}

#[tokio::test]
async fn early_candidates_apply_in_arrival_order() {
    let mut h = harness(FakeEngine::new());
    h.manager.add_peer("bob", Role::Responder, None, 0).await;

    for n in 1..=3 {
        let effects = h.manager.handle_signal(trickle_from("bob", candidate(n))).await;
        assert!(effects.is_empty());
    }
    assert!(h.engine.added_candidates("bob").is_empty());

    h.manager
        .handle_signal(offer_from("bob", "v=0 offer", vec![candidate(4)]))
        .await;

    let expected: Vec<String> = (1..=4).map(|n| candidate(n).candidate).collect();
    assert_eq!(h.engine.added_candidates("bob"), expected);

    // Later trickle goes straight to the engine.
    h.manager.handle_signal(trickle_from("bob", candidate(5))).await;
    assert_eq!(h.engine.added_candidates("bob").len(), 5);
}

#[tokio::test]
async fn offer_at_initiator_is_ignored() {
    let mut h = harness(FakeEngine::new());
    h.manager.add_peer("bob", Role::Initiator, None, 0).await;
    h.pump().await;

    let effects = h.manager.handle_signal(offer_from("bob", "v=0 glare", Vec::new())).await;
    assert!(effects.is_empty());
    assert_eq!(h.manager.state("bob"), Some(ConnectionState::Offering));
    assert!(!h.engine.ops("bob").contains(&EngineOp::CreateAnswer));
}

#[tokio::test]
async fn answer_at_responder_is_ignored() {
    let mut h = harness(FakeEngine::new());
    h.manager.add_peer("bob", Role::Responder, None, 0).await;

    let effects = h.manager.handle_signal(answer_from("bob", "v=0 answer")).await;
    assert!(effects.is_empty());
    assert_eq!(h.manager.state("bob"), Some(ConnectionState::New));
}

#[tokio::test(start_paused = true)]
async fn gathering_grace_sends_partial_offer() {
    let mut h = harness(FakeEngine::silent());
    h.manager.add_peer("bob", Role::Initiator, None, 0).await;
    h.engine.emit("bob", EngineEvent::IceCandidate(candidate(1)));
    assert!(h.pump().await.is_empty());

    tokio::time::sleep(Duration::from_millis(2100)).await;

    let effects = h.pump().await;
    assert_eq!(states(&effects, "bob"), [ConnectionState::Offering]);
    assert!(matches!(
        &sent(&effects)[..],
        [SignalingMessage::Offer { candidates, .. }] if candidates.len() == 1
    ));
}

#[tokio::test]
async fn stale_epoch_events_are_dropped() {
    let mut h = harness(FakeEngine::new());
    h.manager.add_peer("bob", Role::Initiator, None, 0).await;
    let first = h.manager.epoch("bob").unwrap();

    h.manager.add_peer("bob", Role::Initiator, None, 0).await;
    let second = h.manager.epoch("bob").unwrap();
    assert!(second > first);

    let effects = h
        .manager
        .handle_engine("bob", first, EngineEvent::TransportStateChanged(TransportState::Connected))
        .await;
    assert!(effects.is_empty());
    assert_eq!(h.manager.state("bob"), Some(ConnectionState::Gathering));
    assert!(h.engine.ops("bob").contains(&EngineOp::Close));

    // The replaced link's gathering output is dropped too: only one offer.
    let effects = h.pump().await;
    assert_eq!(sent(&effects).len(), 1);
}

#[tokio::test]
async fn malformed_offer_fails_without_retry() {
    let mut h = harness(FakeEngine::new());
    h.manager.add_peer("bob", Role::Responder, None, 0).await;

    let effects = h
        .manager
        .handle_signal(offer_from("bob", "bogus", Vec::new()))
        .await;
    assert_eq!(states(&effects, "bob"), [ConnectionState::Failed]);
    assert!(effects.iter().any(|e| matches!(
        e,
        PeerEffect::Failed { retryable: false, role: Role::Responder, .. }
    )));
    assert!(!h.manager.contains("bob"));
}

#[tokio::test]
async fn malformed_candidate_fails_link() {
    let mut h = harness(FakeEngine::new());
    h.manager.add_peer("bob", Role::Responder, None, 0).await;
    h.manager
        .handle_signal(offer_from("bob", "v=0 offer", Vec::new()))
        .await;

    let effects = h
        .manager
        .handle_signal(trickle_from("bob", IceCandidateInit::new("bogus")))
        .await;
    assert_eq!(states(&effects, "bob"), [ConnectionState::Failed]);
    assert!(h.manager.is_empty());
}

#[tokio::test]
async fn transport_failure_is_retryable() {
    let mut h = harness(FakeEngine::new());
    h.connect_initiator("bob").await;

    h.engine
        .emit("bob", EngineEvent::TransportStateChanged(TransportState::Failed));
    let effects = h.pump().await;
    assert_eq!(states(&effects, "bob"), [ConnectionState::Failed]);
    assert!(effects.iter().any(|e| matches!(
        e,
        PeerEffect::Failed { retryable: true, role: Role::Initiator, retry_count: 0, .. }
    )));
}

#[tokio::test]
async fn ice_restart_recovers_disconnected_link() {
    let mut h = harness(FakeEngine::new());
    h.connect_initiator("bob").await;

    h.engine
        .emit("bob", EngineEvent::TransportStateChanged(TransportState::Disconnected));
    let effects = h.pump().await;
    assert_eq!(states(&effects, "bob"), [ConnectionState::Disconnected]);
    assert!(effects.contains(&PeerEffect::SideChannelReady {
        participant_id: "bob".into(),
        ready: false,
    }));

    let effects = h.manager.reoffer("bob").await;
    assert!(matches!(&sent(&effects)[..], [SignalingMessage::Offer { .. }]));
    assert_eq!(h.manager.retry_count("bob"), Some(1));
    assert!(h.engine.ops("bob").contains(&EngineOp::CreateOffer { ice_restart: true }));

    // Candidates of the restart trickle out individually.
    let effects = h.pump().await;
    assert!(matches!(&sent(&effects)[..], [SignalingMessage::IceCandidate { .. }]));

    let effects = h.manager.handle_signal(answer_from("bob", "v=0 restart answer")).await;
    assert!(states(&effects, "bob").is_empty());

    h.engine
        .emit("bob", EngineEvent::TransportStateChanged(TransportState::Connected));
    let effects = h.pump().await;
    assert_eq!(states(&effects, "bob"), [ConnectionState::Connected]);
    assert_eq!(h.manager.retry_count("bob"), Some(0));
}

#[tokio::test]
async fn responder_answers_restart_in_place() {
    let mut h = harness(FakeEngine::new());
    h.manager.add_peer("bob", Role::Responder, None, 0).await;
    h.manager
        .handle_signal(offer_from("bob", "v=0 offer", Vec::new()))
        .await;
    h.pump().await;
    h.engine.establish("bob");
    h.pump().await;
    let epoch = h.manager.epoch("bob");

    let effects = h
        .manager
        .handle_signal(offer_from("bob", "v=0 restart", Vec::new()))
        .await;
    assert!(states(&effects, "bob").is_empty());
    assert!(matches!(&sent(&effects)[..], [SignalingMessage::Answer { .. }]));
    assert_eq!(h.manager.epoch("bob"), epoch);
    assert_eq!(h.manager.state("bob"), Some(ConnectionState::Connected));
}

#[tokio::test]
async fn fresh_offer_mid_negotiation_recreates_responder() {
    let mut h = harness(FakeEngine::new());
    h.manager.add_peer("bob", Role::Responder, None, 0).await;
    h.manager
        .handle_signal(offer_from("bob", "v=0 first", Vec::new()))
        .await;
    assert_eq!(h.manager.state("bob"), Some(ConnectionState::Answering));
    let answering = h.manager.epoch("bob").unwrap();

    // Still answering the first offer when the second one lands.
    let effects = h
        .manager
        .handle_signal(offer_from("bob", "v=0 second", vec![candidate(2)]))
        .await;
    assert_eq!(states(&effects, "bob"), [ConnectionState::New, ConnectionState::Answering]);
    let second = h.manager.epoch("bob").unwrap();
    assert!(second > answering);
    assert_eq!(h.manager.role("bob"), Some(Role::Responder));
    assert!(h.engine.ops("bob").contains(&EngineOp::Close));
    assert!(h
        .engine
        .ops("bob")
        .contains(&EngineOp::SetRemote(SessionDescription::offer("v=0 second"))));

    // Only the fresh link answers.
    let effects = h.pump().await;
    assert_eq!(states(&effects, "bob"), [ConnectionState::Connecting]);
    assert_eq!(sent(&effects).len(), 1);

    // Same again once the link is already connecting.
    let effects = h
        .manager
        .handle_signal(offer_from("bob", "v=0 third", Vec::new()))
        .await;
    assert_eq!(states(&effects, "bob"), [ConnectionState::New, ConnectionState::Answering]);
    assert!(h.manager.epoch("bob").unwrap() > second);
    let effects = h.pump().await;
    assert!(matches!(&sent(&effects)[..], [SignalingMessage::Answer { to_participant, .. }] if to_participant == "bob"));
}

#[tokio::test]
async fn reoffer_requires_established_initiator() {
    let mut h = harness(FakeEngine::new());
    h.manager.add_peer("bob", Role::Initiator, None, 0).await;
    h.pump().await;
    assert!(h.manager.reoffer("bob").await.is_empty());

    h.manager.add_peer("carol", Role::Responder, None, 0).await;
    assert!(h.manager.reoffer("carol").await.is_empty());
}

#[tokio::test]
async fn signaling_gap_restarts_only_unfinished_negotiations() {
    let mut h = harness(FakeEngine::new());
    h.manager.add_peer("bob", Role::Initiator, None, 0).await;
    h.pump().await;
    h.connect_initiator("dave").await;
    h.manager.add_peer("carol", Role::Responder, None, 0).await;
    h.manager
        .handle_signal(offer_from("carol", "v=0 offer", Vec::new()))
        .await;

    let before: Vec<_> = ["bob", "carol", "dave"]
        .iter()
        .map(|id| h.manager.epoch(id))
        .collect();

    let effects = h.manager.restart_after_signaling_gap().await;
    assert_eq!(states(&effects, "bob"), [ConnectionState::New, ConnectionState::Gathering]);
    assert_eq!(states(&effects, "carol"), [ConnectionState::New]);
    assert!(states(&effects, "dave").is_empty());

    assert_ne!(h.manager.epoch("bob"), before[0]);
    assert_ne!(h.manager.epoch("carol"), before[1]);
    assert_eq!(h.manager.epoch("dave"), before[2]);
    assert_eq!(h.manager.state("dave"), Some(ConnectionState::Connected));
}

#[tokio::test]
async fn late_candidates_trickle_after_offer() {
    let mut h = harness(FakeEngine::new());
    h.manager.add_peer("bob", Role::Initiator, None, 0).await;
    h.pump().await;

    h.engine.emit("bob", EngineEvent::IceCandidate(candidate(9)));
    let effects = h.pump().await;
    assert!(matches!(
        &sent(&effects)[..],
        [SignalingMessage::IceCandidate { to_participant, candidate: c, .. }]
            if to_participant == "bob" && *c == candidate(9)
    ));
}

#[tokio::test]
async fn side_channel_needs_connected_state() {
    let mut h = harness(FakeEngine::new());
    h.manager.add_peer("bob", Role::Initiator, None, 0).await;
    h.pump().await;

    h.engine.emit("bob", EngineEvent::DataChannelOpen);
    let effects = h.pump().await;
    assert!(!effects
        .iter()
        .any(|e| matches!(e, PeerEffect::SideChannelReady { .. })));
    assert!(!h.manager.is_side_channel_ready("bob"));
    assert_eq!(
        h.manager.send_data("bob", "hi").await,
        Err(EngineError::DataChannelClosed)
    );
    assert_eq!(
        h.manager.send_data("nobody", "hi").await,
        Err(EngineError::DataChannelClosed)
    );

    h.manager.handle_signal(answer_from("bob", "v=0 answer")).await;
    h.engine
        .emit("bob", EngineEvent::TransportStateChanged(TransportState::Connected));
    let effects = h.pump().await;
    assert!(effects.contains(&PeerEffect::SideChannelReady {
        participant_id: "bob".into(),
        ready: true,
    }));
    h.manager.send_data("bob", "hi").await.unwrap();
    assert_eq!(h.engine.sent_data("bob"), ["hi"]);
}

#[tokio::test]
async fn close_all_releases_shared_camera() {
    let mut h = harness(FakeEngine::new());
    let media = Arc::new(FakeMedia::default());
    let handle = media.capture(MediaConstraints::default()).await.unwrap();
    let camera = LocalStream::new(handle.clone(), media.clone());

    h.manager
        .add_peer("bob", Role::Initiator, Some(camera.clone()), 0)
        .await;
    h.manager
        .add_peer("carol", Role::Responder, Some(camera.clone()), 0)
        .await;
    assert!(h.engine.ops("carol").contains(&EngineOp::Attach(handle.clone())));
    drop(camera);
    assert!(media.stopped().is_empty());

    let effects = h.manager.close_all().await;
    assert_eq!(states(&effects, "bob"), [ConnectionState::Closed]);
    assert_eq!(states(&effects, "carol"), [ConnectionState::Closed]);
    assert!(h.manager.is_empty());
    assert_eq!(media.stopped(), [handle]);
}

#[tokio::test]
async fn screen_stream_follows_new_links() {
    let mut h = harness(FakeEngine::new());
    let media = Arc::new(FakeMedia::default());
    h.manager.add_peer("bob", Role::Responder, None, 0).await;

    let screen_handle = media.capture_screen().await.unwrap();
    let screen = LocalStream::new(screen_handle.clone(), media.clone());
    assert!(h.manager.set_screen_stream(Some(screen)).await.is_empty());
    assert!(h.engine.ops("bob").contains(&EngineOp::Attach(screen_handle.clone())));

    h.manager.add_peer("carol", Role::Responder, None, 0).await;
    assert!(h.engine.ops("carol").contains(&EngineOp::Attach(screen_handle.clone())));

    h.manager.set_screen_stream(None).await;
    assert!(h.engine.ops("bob").contains(&EngineOp::Detach(screen_handle.clone())));
    assert!(h.engine.ops("carol").contains(&EngineOp::Detach(screen_handle.clone())));
    assert_eq!(media.stopped(), [screen_handle]);
}
