use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::channel::mpsc;
use futures::task::{Spawn, SpawnExt};
use futures::{future, stream, SinkExt, StreamExt};

use common::dummy_connector::{ConnRequest, DummyConnector};

use crypto::hash::hash_buffer;

use signer::{create_signer, ChannelSign, SignerClient};
use timer::{create_timer_incoming, TimerClient};

use proto::channel::messages::{
    ChannelConfig, ChannelMessage, ChannelRole, NetAddress, ResumeInfo, SignTag,
};
use proto::crypto::{ChannelId, PublicKey, Signature, TxId};

use crate::handle::{open_channel, ChannelHandle};
use crate::types::ChannelEvent;

pub type ChannelConnector = DummyConnector<ChannelMessage, ChannelMessage, NetAddress>;
type ChannelConnRequest = ConnRequest<ChannelMessage, ChannelMessage, NetAddress>;

/// Session channel capacity inside the relay. Deep enough that neither
/// party ever blocks on the relay in tests.
const RELAY_CHANNEL_LEN: usize = 0x20;

pub fn initiator_id() -> PublicKey {
    PublicKey::from(&[0xaa; PublicKey::len()])
}

pub fn responder_id() -> PublicKey {
    PublicKey::from(&[0xbb; PublicKey::len()])
}

pub fn listen_address() -> NetAddress {
    NetAddress {
        host: "localhost".to_owned(),
        port: 3001,
    }
}

/// Deterministic test signature: a hash of the message, salted with a per
/// party seed.
fn test_signature(seed: u8, message: &[u8]) -> Signature {
    let first = hash_buffer(&[&[seed][..], message].concat());
    let second = hash_buffer(first.as_ref());
    let mut sig = [0u8; Signature::len()];
    sig[..32].copy_from_slice(&first);
    sig[32..].copy_from_slice(&second);
    Signature::from(&sig)
}

/// Spawn a signer service around an arbitrary signing rule.
pub fn spawn_signer(
    spawner: &impl Spawn,
    channel_sign: impl ChannelSign + Send + 'static,
) -> SignerClient {
    let (requests_sender, signer_fut) = create_signer(channel_sign);
    spawner.spawn(signer_fut).unwrap();
    SignerClient::new(requests_sender)
}

/// A signer that signs everything deterministically, except while `reject`
/// is set, when it declines every request.
pub fn spawn_test_signer(
    spawner: &impl Spawn,
    seed: u8,
    reject: Arc<AtomicBool>,
) -> SignerClient {
    spawn_signer(spawner, move |_tag: SignTag, message: &[u8]| {
        if reject.load(Ordering::SeqCst) {
            return None;
        }
        Some(test_signature(seed, message))
    })
}

/// An in-memory relay doubling as the ledger: it pairs the two transport
/// sessions, forwards peer messages in order, confirms funding transactions
/// and answers on-chain submissions with the full confirmation sequence.
/// While `drop_proposals` is set, Propose messages vanish in transit; every
/// swallowed proposal is reported over the returned stream. While
/// `fail_on_chain` is set, submissions are answered with OnChainFailure.
/// Sending on the returned kill sender tears the current session down,
/// simulating transport loss on both sides.
pub fn create_relay(
    spawner: &impl Spawn,
    drop_proposals: Arc<AtomicBool>,
    fail_on_chain: Arc<AtomicBool>,
) -> (
    ChannelConnector,
    ChannelConnector,
    mpsc::UnboundedReceiver<()>,
    mpsc::Sender<()>,
) {
    let (req_sender_a, req_receiver_a) = mpsc::channel(0);
    let (req_sender_b, req_receiver_b) = mpsc::channel(0);
    let (swallowed_sender, swallowed_receiver) = mpsc::unbounded();
    let (kill_sender, kill_receiver) = mpsc::channel(0);
    spawner
        .spawn(relay_loop(
            req_receiver_a,
            req_receiver_b,
            drop_proposals,
            fail_on_chain,
            swallowed_sender,
            kill_receiver,
        ))
        .unwrap();
    (
        DummyConnector::new(req_sender_a),
        DummyConnector::new(req_sender_b),
        swallowed_receiver,
        kill_sender,
    )
}

async fn relay_loop(
    mut req_receiver_a: mpsc::Receiver<ChannelConnRequest>,
    mut req_receiver_b: mpsc::Receiver<ChannelConnRequest>,
    drop_proposals: Arc<AtomicBool>,
    fail_on_chain: Arc<AtomicBool>,
    swallowed_sender: mpsc::UnboundedSender<()>,
    mut kill_receiver: mpsc::Receiver<()>,
) {
    // Every iteration is one paired session; reconnects (reestablish)
    // simply start the next one.
    loop {
        let conn_request_a = match req_receiver_a.next().await {
            Some(conn_request) => conn_request,
            None => return,
        };
        let conn_request_b = match req_receiver_b.next().await {
            Some(conn_request) => conn_request,
            None => return,
        };

        let (to_a_sender, to_a_receiver) = mpsc::channel(RELAY_CHANNEL_LEN);
        let (from_a_sender, from_a_receiver) = mpsc::channel(RELAY_CHANNEL_LEN);
        let (to_b_sender, to_b_receiver) = mpsc::channel(RELAY_CHANNEL_LEN);
        let (from_b_sender, from_b_receiver) = mpsc::channel(RELAY_CHANNEL_LEN);
        conn_request_a.reply(Some((from_a_sender, to_a_receiver)));
        conn_request_b.reply(Some((from_b_sender, to_b_receiver)));

        relay_session(
            from_a_receiver,
            to_a_sender,
            from_b_receiver,
            to_b_sender,
            &drop_proposals,
            &fail_on_chain,
            &swallowed_sender,
            &mut kill_receiver,
        )
        .await;
    }
}

enum RelayEvent {
    FromA(ChannelMessage),
    AClosed,
    FromB(ChannelMessage),
    BClosed,
    Kill,
}

async fn relay_session(
    from_a: mpsc::Receiver<ChannelMessage>,
    mut to_a: mpsc::Sender<ChannelMessage>,
    from_b: mpsc::Receiver<ChannelMessage>,
    mut to_b: mpsc::Sender<ChannelMessage>,
    drop_proposals: &Arc<AtomicBool>,
    fail_on_chain: &Arc<AtomicBool>,
    swallowed_sender: &mpsc::UnboundedSender<()>,
    kill_receiver: &mut mpsc::Receiver<()>,
) {
    let from_a = from_a
        .map(RelayEvent::FromA)
        .chain(stream::once(future::ready(RelayEvent::AClosed)));
    let from_b = from_b
        .map(RelayEvent::FromB)
        .chain(stream::once(future::ready(RelayEvent::BClosed)));
    let kill = kill_receiver.map(|_| RelayEvent::Kill);
    let mut events = stream::select(from_a, stream::select(from_b, kill));

    let mut opt_funding_a: Option<Vec<u8>> = None;
    let mut opt_funding_b: Option<Vec<u8>> = None;
    let mut a_closed = false;
    let mut b_closed = false;

    while let Some(event) = events.next().await {
        match event {
            // Dropping both session senders severs the transport for both
            // parties at once:
            RelayEvent::Kill => return,
            RelayEvent::AClosed => a_closed = true,
            RelayEvent::BClosed => b_closed = true,
            RelayEvent::FromA(message) => {
                relay_message(
                    message,
                    &mut to_a,
                    &mut to_b,
                    &mut opt_funding_a,
                    &mut opt_funding_b,
                    drop_proposals,
                    fail_on_chain,
                    swallowed_sender,
                )
                .await
            }
            RelayEvent::FromB(message) => {
                relay_message(
                    message,
                    &mut to_b,
                    &mut to_a,
                    &mut opt_funding_b,
                    &mut opt_funding_a,
                    drop_proposals,
                    fail_on_chain,
                    swallowed_sender,
                )
                .await
            }
        }
        if a_closed && b_closed {
            return;
        }
    }
}

/// Handle one message from a party; `to_own` leads back to the sender,
/// `to_peer` to the other party.
async fn relay_message(
    message: ChannelMessage,
    to_own: &mut mpsc::Sender<ChannelMessage>,
    to_peer: &mut mpsc::Sender<ChannelMessage>,
    own_funding: &mut Option<Vec<u8>>,
    peer_funding: &mut Option<Vec<u8>>,
    drop_proposals: &Arc<AtomicBool>,
    fail_on_chain: &Arc<AtomicBool>,
    swallowed_sender: &mpsc::UnboundedSender<()>,
) {
    match message {
        ChannelMessage::FundingSigned { funding_tx, .. } => {
            *own_funding = Some(funding_tx);
            // Once both parties signed, the ledger confirms the funding
            // transaction and assigns the channel id:
            if let (Some(funding_tx), Some(_)) = (own_funding.as_ref(), peer_funding.as_ref()) {
                let channel_id = ChannelId::from(hash_buffer(funding_tx).as_array_ref());
                let tx_id =
                    TxId::from(hash_buffer(&[b"FUND", &funding_tx[..]].concat()).as_array_ref());
                let locked = ChannelMessage::FundingLocked {
                    channel_id,
                    tx_id,
                };
                let _ = to_own.send(locked.clone()).await;
                let _ = to_peer.send(locked).await;
            }
        }
        ChannelMessage::Propose(proposal) => {
            if drop_proposals.load(Ordering::SeqCst) {
                let _ = swallowed_sender.unbounded_send(());
                return;
            }
            let _ = to_peer.send(ChannelMessage::Propose(proposal)).await;
        }
        ChannelMessage::SubmitOnChain { channel_id, tx } => {
            if fail_on_chain.load(Ordering::SeqCst) {
                // The ledger rejects the transaction; both parties learn
                // about it:
                let failure = ChannelMessage::OnChainFailure {
                    channel_id: channel_id.clone(),
                };
                let _ = to_own.send(failure.clone()).await;
                let _ = to_peer.send(failure).await;
                return;
            }
            // The ledger accepts the transaction. The submitter sees the
            // full confirmation sequence; the counterparty observes the
            // inclusion and the completed locks:
            let tx_id = TxId::from(hash_buffer(&tx).as_array_ref());
            let _ = to_own
                .send(ChannelMessage::OnChainTx {
                    channel_id: channel_id.clone(),
                    tx_id: tx_id.clone(),
                })
                .await;
            let _ = to_own
                .send(ChannelMessage::OwnFundsLocked {
                    channel_id: channel_id.clone(),
                    tx_id: tx_id.clone(),
                })
                .await;
            let _ = to_own
                .send(ChannelMessage::FundsLocked {
                    channel_id: channel_id.clone(),
                    tx_id: tx_id.clone(),
                })
                .await;
            let _ = to_peer
                .send(ChannelMessage::OnChainTx {
                    channel_id: channel_id.clone(),
                    tx_id: tx_id.clone(),
                })
                .await;
            let _ = to_peer
                .send(ChannelMessage::FundsLocked { channel_id, tx_id })
                .await;
        }
        message @ ChannelMessage::Accept { .. }
        | message @ ChannelMessage::Reject { .. }
        | message @ ChannelMessage::Relay(..)
        | message @ ChannelMessage::Reestablish { .. }
        | message @ ChannelMessage::Leave { .. } => {
            let _ = to_peer.send(message).await;
        }
        // Ledger originated messages cannot arrive from a party:
        other => panic!("relay: unexpected message from party: {:?}", other),
    }
}

pub struct PairParams {
    pub initiator_amount: u128,
    pub responder_amount: u128,
    pub channel_reserve: u128,
    pub push_amount: u128,
    pub ttl: usize,
}

impl Default for PairParams {
    fn default() -> Self {
        PairParams {
            initiator_amount: 1_000_000_000_000_000,
            responder_amount: 1_000_000_000_000_000,
            channel_reserve: 0,
            push_amount: 3,
            ttl: 8,
        }
    }
}

pub fn pair_config(
    role: ChannelRole,
    params: &PairParams,
    resume: Option<ResumeInfo>,
) -> ChannelConfig {
    ChannelConfig {
        role,
        initiator_id: initiator_id(),
        responder_id: responder_id(),
        initiator_amount: params.initiator_amount,
        responder_amount: params.responder_amount,
        channel_reserve: params.channel_reserve,
        push_amount: params.push_amount,
        lock_period: 16,
        ttl: params.ttl,
        address: listen_address(),
        resume,
    }
}

pub struct TestChannelPair {
    pub initiator: ChannelHandle,
    pub initiator_events: mpsc::Receiver<ChannelEvent>,
    pub responder: ChannelHandle,
    pub responder_events: mpsc::Receiver<ChannelEvent>,
    pub initiator_ticks: mpsc::Sender<()>,
    pub responder_ticks: mpsc::Sender<()>,
    /// While set, the responder's signer declines every request.
    pub responder_rejects: Arc<AtomicBool>,
    /// While set, the relay swallows Propose messages.
    pub drop_proposals: Arc<AtomicBool>,
    /// While set, the ledger rejects every submitted transaction.
    pub fail_on_chain: Arc<AtomicBool>,
    /// One item per proposal the relay swallowed.
    pub swallowed: mpsc::UnboundedReceiver<()>,
    /// Tears the current relay session down, severing both transports.
    pub relay_kill: mpsc::Sender<()>,
    // Kept around so a left channel can be reestablished:
    pub initiator_connector: ChannelConnector,
    pub responder_connector: ChannelConnector,
    pub initiator_signer: SignerClient,
    pub responder_signer: SignerClient,
    pub initiator_timer: TimerClient,
    pub responder_timer: TimerClient,
}

/// Open a fully working channel pair over an in-memory relay.
pub async fn setup_channel_pair(
    spawner: impl Spawn + Clone,
    params: PairParams,
) -> TestChannelPair {
    let responder_rejects = Arc::new(AtomicBool::new(false));
    let drop_proposals = Arc::new(AtomicBool::new(false));
    let fail_on_chain = Arc::new(AtomicBool::new(false));

    let (initiator_connector, responder_connector, swallowed, relay_kill) = create_relay(
        &spawner,
        Arc::clone(&drop_proposals),
        Arc::clone(&fail_on_chain),
    );

    let initiator_signer =
        spawn_test_signer(&spawner, 0x01, Arc::new(AtomicBool::new(false)));
    let responder_signer = spawn_test_signer(&spawner, 0x02, Arc::clone(&responder_rejects));

    let (initiator_ticks, initiator_tick_receiver) = mpsc::channel::<()>(0);
    let initiator_timer =
        create_timer_incoming(initiator_tick_receiver, spawner.clone()).unwrap();
    let (responder_ticks, responder_tick_receiver) = mpsc::channel::<()>(0);
    let responder_timer =
        create_timer_incoming(responder_tick_receiver, spawner.clone()).unwrap();

    let initiator_open = open_channel(
        pair_config(ChannelRole::Initiator, &params, None),
        initiator_connector.clone(),
        initiator_signer.clone(),
        initiator_timer.clone(),
        spawner.clone(),
    );
    let responder_open = open_channel(
        pair_config(ChannelRole::Responder, &params, None),
        responder_connector.clone(),
        responder_signer.clone(),
        responder_timer.clone(),
        spawner.clone(),
    );

    let (initiator_res, responder_res) = future::join(initiator_open, responder_open).await;
    let (initiator, initiator_events) = initiator_res.unwrap();
    let (responder, responder_events) = responder_res.unwrap();

    TestChannelPair {
        initiator,
        initiator_events,
        responder,
        responder_events,
        initiator_ticks,
        responder_ticks,
        responder_rejects,
        drop_proposals,
        fail_on_chain,
        swallowed,
        relay_kill,
        initiator_connector,
        responder_connector,
        initiator_signer,
        responder_signer,
        initiator_timer,
        responder_timer,
    }
}
