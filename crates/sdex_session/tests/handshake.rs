//! End-to-end tests for the handshake state machine and message flow,
//! driving two session managers against scripted in-memory transports.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use sdex_crypto::hash::registration_digest;
use sdex_crypto::rsa::{generate_key_pair, KeyPair};
use sdex_proto::events::{Ack, ClientEvent, InboundEvent};
use sdex_proto::message::{Message, FIRST_PARTY_CONTACT_ID};
use sdex_session::{HandshakeState, RetryPolicy, SessionError, SessionManager, Transport, TransportError};

const TEST_KEY_BITS: usize = 1024;

/// Records every emitted event and replies with a scripted ack queue
/// (defaulting to `Delivered` once the script runs out).
#[derive(Default)]
struct ScriptedTransport {
    events: Mutex<Vec<ClientEvent>>,
    acks: Mutex<VecDeque<Ack>>,
}

impl ScriptedTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn script(self: &Arc<Self>, acks: impl IntoIterator<Item = Ack>) {
        self.acks.lock().unwrap().extend(acks);
    }

    fn take_events(&self) -> Vec<ClientEvent> {
        std::mem::take(&mut self.events.lock().unwrap())
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn emit(&self, event: ClientEvent) -> Result<Ack, TransportError> {
        self.events.lock().unwrap().push(event);
        Ok(self
            .acks
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ack::Delivered))
    }
}

struct FailingTransport {
    calls: AtomicU32,
}

/// Fails the first `failures_remaining` emissions, then behaves like a
/// recording transport acking `Delivered`.
struct RecoveringTransport {
    failures_remaining: AtomicU32,
    events: Mutex<Vec<ClientEvent>>,
}

#[async_trait]
impl Transport for RecoveringTransport {
    async fn emit(&self, event: ClientEvent) -> Result<Ack, TransportError> {
        if self.failures_remaining.load(Ordering::SeqCst) > 0 {
            self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
            return Err(TransportError::Failed("connection reset".into()));
        }
        self.events.lock().unwrap().push(event);
        Ok(Ack::Delivered)
    }
}

#[async_trait]
impl Transport for FailingTransport {
    async fn emit(&self, _event: ClientEvent) -> Result<Ack, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::Failed("connection reset".into()))
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(1),
        ack_timeout: Duration::from_secs(5),
    }
}

fn manager(pair: &KeyPair, transport: Arc<dyn Transport>) -> SessionManager {
    SessionManager::new(pair.clone(), "1234", transport, fast_retry(), 32)
}

fn sole_chat_init(events: Vec<ClientEvent>) -> InboundEvent {
    assert_eq!(events.len(), 1);
    match events.into_iter().next().unwrap() {
        ClientEvent::ChatInit(p) => InboundEvent::ChatInit(p),
        other => panic!("expected chatInit, got {}", other.event_name()),
    }
}

#[tokio::test]
async fn registration_sends_the_salted_digest() {
    let pair = generate_key_pair(TEST_KEY_BITS).unwrap();
    let transport = ScriptedTransport::new();
    transport.script([Ack::Salt("a1b2c3d4".into()), Ack::Status(true)]);
    let mgr = manager(&pair, transport.clone());

    mgr.register().await.unwrap();

    let events = transport.take_events();
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], ClientEvent::RegisterInit));
    match &events[1] {
        ClientEvent::RegisterFollowUp(p) => {
            assert_eq!(p.public_key, pair.public_key);
            assert_eq!(p.digest, registration_digest(&pair.private_key, "a1b2c3d4"));
        }
        other => panic!("expected registerFollowUp, got {}", other.event_name()),
    }
}

#[tokio::test]
async fn registration_without_a_salt_is_a_communication_error() {
    let pair = generate_key_pair(TEST_KEY_BITS).unwrap();
    let transport = ScriptedTransport::new();
    transport.script([Ack::Status(true)]);
    let mgr = manager(&pair, transport);

    assert!(matches!(
        mgr.register().await,
        Err(SessionError::Communication(_))
    ));
}

#[tokio::test]
async fn directed_handshake_establishes_a_shared_key() {
    let pair_a = generate_key_pair(TEST_KEY_BITS).unwrap();
    let pair_b = generate_key_pair(TEST_KEY_BITS).unwrap();
    let transport_a = ScriptedTransport::new();
    let transport_b = ScriptedTransport::new();
    let alice = manager(&pair_a, transport_a.clone());
    let bob = manager(&pair_b, transport_b.clone());

    alice.initiate_chat(&pair_b.public_key).await.unwrap();
    assert_eq!(
        alice.state_for(&pair_b.public_key).await,
        HandshakeState::Established
    );

    let reply = bob
        .handle_event(sole_chat_init(transport_a.take_events()))
        .await
        .unwrap();
    assert!(reply.is_none());
    assert!(transport_b.take_events().is_empty());

    let key_a = alice.session_key_for(&pair_b.public_key).await.unwrap();
    let key_b = bob.session_key_for(&pair_a.public_key).await.unwrap();
    assert_eq!(key_a, key_b);
    assert_eq!(key_a.len(), 64);

    // Bob also learned Alice's context hashes.
    let (init_hash, password_hash) = alice.own_hashes().await.unwrap();
    assert_eq!(
        bob.counterpart_hashes(&pair_a.public_key).await,
        Some((init_hash, password_hash))
    );
}

#[tokio::test]
async fn re_initiating_reuses_the_negotiated_key() {
    let pair_a = generate_key_pair(TEST_KEY_BITS).unwrap();
    let pair_b = generate_key_pair(TEST_KEY_BITS).unwrap();
    let transport = ScriptedTransport::new();
    let alice = manager(&pair_a, transport.clone());

    alice.initiate_chat(&pair_b.public_key).await.unwrap();
    let key = alice.session_key_for(&pair_b.public_key).await.unwrap();
    transport.take_events();

    alice.initiate_chat(&pair_b.public_key).await.unwrap();
    assert!(transport.take_events().is_empty());
    assert_eq!(alice.session_key_for(&pair_b.public_key).await.unwrap(), key);
}

#[tokio::test]
async fn chat_init_addressed_to_someone_else_is_rejected() {
    let pair_a = generate_key_pair(TEST_KEY_BITS).unwrap();
    let pair_b = generate_key_pair(TEST_KEY_BITS).unwrap();
    let pair_c = generate_key_pair(TEST_KEY_BITS).unwrap();
    let transport_a = ScriptedTransport::new();
    let alice = manager(&pair_a, transport_a.clone());
    // Alice addresses Carol, but the event is delivered to Bob.
    alice.initiate_chat(&pair_c.public_key).await.unwrap();
    let bob = manager(&pair_b, ScriptedTransport::new());

    assert!(matches!(
        bob.handle_event(sole_chat_init(transport_a.take_events())).await,
        Err(SessionError::Communication(_))
    ));
    assert!(bob.session_key_for(&pair_a.public_key).await.is_none());
}

/// Both sides initiate before either opener lands. Whichever delivery order
/// the relay produces, both must converge on the key originally chosen by the
/// party whose public key sorts greater (the responder).
#[tokio::test]
async fn simultaneous_initiation_converges_in_both_delivery_orders() {
    let pair_x = generate_key_pair(TEST_KEY_BITS).unwrap();
    let pair_y = generate_key_pair(TEST_KEY_BITS).unwrap();
    let (responder_pair, initiator_pair) = if pair_x.public_key > pair_y.public_key {
        (pair_x, pair_y)
    } else {
        (pair_y, pair_x)
    };

    for responder_first in [true, false] {
        let transport_r = ScriptedTransport::new();
        let transport_i = ScriptedTransport::new();
        let responder = manager(&responder_pair, transport_r.clone());
        let initiator = manager(&initiator_pair, transport_i.clone());

        responder.initiate_chat(&initiator_pair.public_key).await.unwrap();
        initiator.initiate_chat(&responder_pair.public_key).await.unwrap();
        let responder_key = responder
            .session_key_for(&initiator_pair.public_key)
            .await
            .unwrap();

        let to_responder = sole_chat_init(transport_i.take_events());
        let to_initiator = sole_chat_init(transport_r.take_events());

        if responder_first {
            responder.handle_event(to_responder).await.unwrap();
            initiator.handle_event(to_initiator).await.unwrap();
        } else {
            initiator.handle_event(to_initiator).await.unwrap();
            responder.handle_event(to_responder).await.unwrap();
        }

        // The responder answered with a follow-up carrying its original key.
        let follow_up = match transport_r.take_events().as_slice() {
            [ClientEvent::ChatInitFollowUp(p)] => InboundEvent::ChatInitFollowUp(p.clone()),
            other => panic!("expected exactly one chatInitFollowUp, got {other:?}"),
        };
        initiator.handle_event(follow_up).await.unwrap();

        assert_eq!(
            responder
                .session_key_for(&initiator_pair.public_key)
                .await
                .unwrap(),
            responder_key
        );
        assert_eq!(
            initiator
                .session_key_for(&responder_pair.public_key)
                .await
                .unwrap(),
            responder_key
        );
    }
}

/// A key installed by an initiation whose opener never got through was never
/// learned by the peer; a later retry must emit a fresh `chatInit` instead of
/// silently "reusing" the undelivered key.
#[tokio::test]
async fn failed_initiation_can_be_retried() {
    let pair_a = generate_key_pair(TEST_KEY_BITS).unwrap();
    let pair_b = generate_key_pair(TEST_KEY_BITS).unwrap();
    let transport = Arc::new(RecoveringTransport {
        failures_remaining: AtomicU32::new(2),
        events: Mutex::new(Vec::new()),
    });
    let alice = manager(&pair_a, transport.clone());

    assert!(matches!(
        alice.initiate_chat(&pair_b.public_key).await,
        Err(SessionError::HandshakeFailed(_))
    ));
    assert_ne!(
        alice.state_for(&pair_b.public_key).await,
        HandshakeState::Established
    );

    alice.initiate_chat(&pair_b.public_key).await.unwrap();
    assert_eq!(
        alice.state_for(&pair_b.public_key).await,
        HandshakeState::Established
    );

    let events = std::mem::take(&mut *transport.events.lock().unwrap());
    assert_eq!(events.len(), 1, "the retry must re-emit the opener");
    match &events[0] {
        ClientEvent::ChatInit(p) => assert_eq!(p.public_key_to, pair_b.public_key),
        other => panic!("expected chatInit, got {}", other.event_name()),
    }
}

#[tokio::test]
async fn retry_exhaustion_fails_the_handshake() {
    let pair = generate_key_pair(TEST_KEY_BITS).unwrap();
    let other = generate_key_pair(TEST_KEY_BITS).unwrap();
    let transport = Arc::new(FailingTransport {
        calls: AtomicU32::new(0),
    });
    let mgr = manager(&pair, transport.clone());

    assert!(matches!(
        mgr.initiate_chat(&other.public_key).await,
        Err(SessionError::HandshakeFailed(_))
    ));
    assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn sending_without_a_handshake_is_a_precondition_error() {
    let pair = generate_key_pair(TEST_KEY_BITS).unwrap();
    let other = generate_key_pair(TEST_KEY_BITS).unwrap();
    let mgr = manager(&pair, ScriptedTransport::new());
    let msg = Message::new(FIRST_PARTY_CONTACT_ID, 7, "hi".into(), Utc::now(), false);

    assert!(matches!(
        mgr.send_message(&msg, &other.public_key).await,
        Err(SessionError::Precondition(_))
    ));
}

#[tokio::test]
async fn message_survives_the_full_send_and_ingest_path() {
    let pair_a = generate_key_pair(TEST_KEY_BITS).unwrap();
    let pair_b = generate_key_pair(TEST_KEY_BITS).unwrap();
    let transport_a = ScriptedTransport::new();
    let alice = manager(&pair_a, transport_a.clone());
    let bob = manager(&pair_b, ScriptedTransport::new());

    alice.initiate_chat(&pair_b.public_key).await.unwrap();
    bob.handle_event(sole_chat_init(transport_a.take_events()))
        .await
        .unwrap();

    let sent = Message::new(
        FIRST_PARTY_CONTACT_ID,
        7,
        "Did you get my last message?".into(),
        Utc::now(),
        false,
    );
    transport_a.script([Ack::Status(true)]);
    alice.send_message(&sent, &pair_b.public_key).await.unwrap();

    let transported = match alice
        .handle_event(match transport_a.take_events().into_iter().next().unwrap() {
            ClientEvent::Chat(m) => InboundEvent::Chat(m),
            other => panic!("expected chat, got {}", other.event_name()),
        })
        .await
        .unwrap()
    {
        Some(m) => m,
        None => panic!("chat events must surface to the caller"),
    };
    assert_ne!(transported.text, sent.text);

    let received = bob.ingest_message(&transported, 3).await.unwrap();
    assert_eq!(received.text, sent.text);
    assert_eq!(received.contact_id_from, 3);
    assert_eq!(received.contact_id_to, FIRST_PARTY_CONTACT_ID);
    assert!(received.unread);
    assert_eq!(received.created_at, sent.created_at);
}

#[tokio::test]
async fn relay_refusal_surfaces_as_a_communication_error() {
    let pair_a = generate_key_pair(TEST_KEY_BITS).unwrap();
    let pair_b = generate_key_pair(TEST_KEY_BITS).unwrap();
    let transport = ScriptedTransport::new();
    let alice = manager(&pair_a, transport.clone());

    alice.initiate_chat(&pair_b.public_key).await.unwrap();
    transport.take_events();

    let msg = Message::new(FIRST_PARTY_CONTACT_ID, 7, "hi".into(), Utc::now(), false);
    transport.script([Ack::Status(false)]);
    assert!(matches!(
        alice.send_message(&msg, &pair_b.public_key).await,
        Err(SessionError::Communication(_))
    ));
}
