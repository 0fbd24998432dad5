mod common;

use common::{offers_to, FakeFactory};
use interview_room::error::RoomError;
use interview_room::hub::HubSender;
use interview_room::peer::ice::apply_pending_candidates;
use interview_room::peer::{
    CandidateQueue, ConnectionEvents, ConnectionFactory, FlushReport, IceCandidate, LocalTrack,
    NegotiationState, Negotiator, SessionDescription, TrackKind,
};
use interview_room::signaling::ClientMessage;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;

struct Setup {
    negotiator: Negotiator,
    outgoing: mpsc::UnboundedReceiver<ClientMessage>,
    factory: Arc<FakeFactory>,
}

fn setup() -> Setup {
    let (hub, outgoing) = HubSender::channel();
    let (events, _rx) = mpsc::unbounded_channel();
    let factory = Arc::new(FakeFactory::default());
    Setup {
        negotiator: Negotiator::new(factory.clone(), hub, events),
        outgoing,
        factory,
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ClientMessage>) -> Vec<ClientMessage> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}

#[tokio::test]
async fn candidates_before_offer_are_applied_in_order_after_remote_description() {
    let mut s = setup();
    s.negotiator
        .receive_ice_candidate("peer", IceCandidate::new("c1 typ host"))
        .await
        .unwrap();
    s.negotiator
        .receive_ice_candidate("peer", IceCandidate::new("c2 typ srflx"))
        .await
        .unwrap();
    assert_eq!(s.negotiator.pending_candidates(), 2);
    assert_eq!(s.negotiator.state(), NegotiationState::Idle);

    s.negotiator
        .receive_offer("peer", "remote-offer".into(), &[])
        .await
        .unwrap();

    assert_eq!(s.negotiator.state(), NegotiationState::Stable);
    assert_eq!(s.negotiator.pending_candidates(), 0);
    let record = s.factory.record(0);
    let rec = record.lock().unwrap();
    assert_eq!(
        rec.calls,
        [
            "set_remote:remote-offer",
            "candidate:c1 typ host",
            "candidate:c2 typ srflx",
            "create_answer",
            "set_local:Answer",
        ]
    );
    drop(rec);

    let sent = drain(&mut s.outgoing);
    assert!(matches!(
        sent.as_slice(),
        [ClientMessage::SendAnswer { target_id, .. }] if target_id == "peer"
    ));
}

#[tokio::test]
async fn failing_candidate_does_not_stop_the_flush() {
    let mut s = setup();
    for c in ["c1", "bad c2", "c3"] {
        s.negotiator
            .receive_ice_candidate("peer", IceCandidate::new(c))
            .await
            .unwrap();
    }

    s.negotiator
        .receive_offer("peer", "remote-offer".into(), &[])
        .await
        .unwrap();

    assert_eq!(s.negotiator.state(), NegotiationState::Stable);
    assert_eq!(s.negotiator.pending_candidates(), 0);
    let record = s.factory.record(0);
    let rec = record.lock().unwrap();
    assert_eq!(rec.candidates, ["c1", "c3"]);
    assert_eq!(
        &rec.calls[..4],
        [
            "set_remote:remote-offer",
            "candidate:c1",
            "rejected:bad c2",
            "candidate:c3",
        ]
    );
    drop(rec);
    assert!(matches!(
        drain(&mut s.outgoing).as_slice(),
        [ClientMessage::SendAnswer { .. }]
    ));
}

#[tokio::test]
async fn flush_report_counts_each_outcome() {
    let factory = FakeFactory::default();
    let (tx, _rx) = mpsc::unbounded_channel();
    let pc = factory
        .create(ConnectionEvents::new(1, tx))
        .await
        .unwrap();
    pc.set_remote_description(&SessionDescription::offer("remote-offer"))
        .await
        .unwrap();

    let mut queue = CandidateQueue::new();
    queue.push("peer", IceCandidate::new("c1"));
    queue.push("other", IceCandidate::new("x"));
    queue.push("peer", IceCandidate::new("bad c2"));
    queue.push("peer", IceCandidate::new("c3"));

    let report = apply_pending_candidates(&*pc, "peer", &mut queue).await;

    assert_eq!(
        report,
        FlushReport {
            applied: 2,
            failed: 1,
            foreign: 1,
        }
    );
    assert!(queue.is_empty());
    assert_eq!(factory.record(0).lock().unwrap().candidates, ["c1", "c3"]);
}

#[tokio::test]
async fn queued_candidates_from_another_peer_are_dropped() {
    let mut s = setup();
    s.negotiator
        .receive_ice_candidate("stranger", IceCandidate::new("x"))
        .await
        .unwrap();
    s.negotiator
        .receive_ice_candidate("peer", IceCandidate::new("y"))
        .await
        .unwrap();
    s.negotiator
        .receive_offer("peer", "remote-offer".into(), &[])
        .await
        .unwrap();
    assert_eq!(s.factory.record(0).lock().unwrap().candidates, ["y"]);
}

#[tokio::test]
async fn candidate_after_remote_description_is_applied_immediately() {
    let mut s = setup();
    s.negotiator.create_offer("peer", &[]).await.unwrap();
    s.negotiator
        .receive_ice_candidate("peer", IceCandidate::new("early"))
        .await
        .unwrap();
    assert_eq!(s.negotiator.pending_candidates(), 1);

    s.negotiator
        .receive_answer("peer", "remote-answer".into())
        .await
        .unwrap();
    s.negotiator
        .receive_ice_candidate("peer", IceCandidate::new("late"))
        .await
        .unwrap();

    assert_eq!(s.negotiator.pending_candidates(), 0);
    assert_eq!(
        s.factory.record(0).lock().unwrap().candidates,
        ["early", "late"]
    );
}

#[tokio::test]
async fn second_offer_from_other_peer_is_rejected() {
    let mut s = setup();
    s.negotiator
        .receive_offer("peer", "remote-offer".into(), &[])
        .await
        .unwrap();
    drain(&mut s.outgoing);

    let err = s
        .negotiator
        .receive_offer("other", "other-offer".into(), &[])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RoomError::DuplicatePeerLink { ref existing, ref requested }
            if existing == "peer" && requested == "other"
    ));
    assert_eq!(s.factory.count(), 1);
    assert_eq!(s.negotiator.remote_id(), Some("peer"));
    assert_eq!(s.negotiator.state(), NegotiationState::Stable);
    assert!(drain(&mut s.outgoing).is_empty());
}

#[tokio::test]
async fn offer_while_calling_is_rejected() {
    let mut s = setup();
    s.negotiator.create_offer("peer", &[]).await.unwrap();
    let err = s
        .negotiator
        .receive_offer("peer", "glare".into(), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::DuplicatePeerLink { .. }));
    assert_eq!(s.negotiator.state(), NegotiationState::OfferSent);
}

#[tokio::test]
async fn second_create_offer_is_rejected() {
    let mut s = setup();
    s.negotiator.create_offer("peer", &[]).await.unwrap();
    let err = s.negotiator.create_offer("other", &[]).await.unwrap_err();
    assert!(matches!(err, RoomError::DuplicatePeerLink { .. }));
    assert_eq!(s.factory.count(), 1);
    assert_eq!(offers_to(&drain(&mut s.outgoing), "peer"), 1);
}

#[tokio::test]
async fn answer_without_link_is_an_error() {
    let mut s = setup();
    let err = s
        .negotiator
        .receive_answer("peer", "remote-answer".into())
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::NoPeerLink));
}

#[tokio::test]
async fn answer_from_wrong_peer_is_unexpected() {
    let mut s = setup();
    s.negotiator.create_offer("peer", &[]).await.unwrap();
    let err = s
        .negotiator
        .receive_answer("other", "remote-answer".into())
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::UnexpectedMessage { message: "answer", .. }));
    assert_eq!(s.negotiator.state(), NegotiationState::OfferSent);
}

#[tokio::test]
async fn candidate_from_wrong_peer_is_unexpected() {
    let mut s = setup();
    s.negotiator.create_offer("peer", &[]).await.unwrap();
    let err = s
        .negotiator
        .receive_ice_candidate("other", IceCandidate::new("c"))
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::UnexpectedMessage { .. }));
    assert_eq!(s.negotiator.pending_candidates(), 0);
}

#[tokio::test]
async fn offer_carries_local_tracks() {
    let mut s = setup();
    let tracks = [
        LocalTrack::silent(TrackKind::Audio, "local"),
        LocalTrack::silent(TrackKind::Video, "local"),
    ];
    s.negotiator.create_offer("peer", &tracks).await.unwrap();
    let record = s.factory.record(0);
    let rec = record.lock().unwrap();
    assert_eq!(rec.tracks.len(), 2);
    assert_eq!(
        &rec.calls[..3],
        ["add_track:audio", "add_track:video", "create_offer"]
    );
}

#[tokio::test]
async fn renegotiation_waits_for_stable() {
    let mut s = setup();
    s.negotiator.create_offer("peer", &[]).await.unwrap();
    drain(&mut s.outgoing);

    let track = LocalTrack::silent(TrackKind::Video, "local");
    assert!(s.negotiator.attach_track(&track).await.unwrap());
    assert!(!s.negotiator.renegotiate().await.unwrap());
    assert!(s.negotiator.link().unwrap().renegotiate_pending);
    assert!(drain(&mut s.outgoing).is_empty());

    s.negotiator
        .receive_answer("peer", "remote-answer".into())
        .await
        .unwrap();
    assert_eq!(offers_to(&drain(&mut s.outgoing), "peer"), 1);
    assert_eq!(s.negotiator.state(), NegotiationState::OfferSent);
    assert!(!s.negotiator.link().unwrap().renegotiate_pending);
}

#[tokio::test]
async fn failed_deferred_renegotiation_keeps_applied_answer() {
    let mut s = setup();
    s.negotiator.create_offer("peer", &[]).await.unwrap();
    let track = LocalTrack::silent(TrackKind::Audio, "local");
    assert!(s.negotiator.attach_track(&track).await.unwrap());
    assert!(!s.negotiator.renegotiate().await.unwrap());
    drain(&mut s.outgoing);
    s.factory.fail_create_offer.store(true, Ordering::SeqCst);

    s.negotiator
        .receive_answer("peer", "remote-answer".into())
        .await
        .unwrap();

    assert_eq!(s.negotiator.state(), NegotiationState::Stable);
    assert!(s
        .factory
        .record(0)
        .lock()
        .unwrap()
        .calls
        .contains(&"set_remote:remote-answer".to_string()));
    assert!(drain(&mut s.outgoing).is_empty());
}

#[tokio::test]
async fn discarding_pending_candidates_empties_queue() {
    let mut s = setup();
    s.negotiator
        .receive_ice_candidate("peer", IceCandidate::new("c1"))
        .await
        .unwrap();
    assert_eq!(s.negotiator.discard_pending_candidates(), 1);
    assert_eq!(s.negotiator.pending_candidates(), 0);
}

#[tokio::test]
async fn closed_negotiator_refuses_signaling() {
    let mut s = setup();
    s.negotiator.create_offer("peer", &[]).await.unwrap();
    s.negotiator.close().await;
    assert_eq!(s.negotiator.state(), NegotiationState::Closed);
    assert!(s.factory.record(0).lock().unwrap().closed);
    assert!(matches!(
        s.negotiator
            .receive_offer("peer", "late".into(), &[])
            .await,
        Err(RoomError::Closed)
    ));
    assert_eq!(s.factory.count(), 1);
}
