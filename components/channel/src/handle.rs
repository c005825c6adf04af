use std::collections::HashMap;

use futures::channel::{mpsc, oneshot};
use futures::task::{Spawn, SpawnExt};
use futures::{FutureExt, SinkExt};

use common::conn::Connector;
use common::multi_consumer::{multi_consumer_service, MultiConsumerClient};

use signer::SignerClient;
use timer::TimerClient;

use proto::channel::messages::{ChannelConfig, ChannelMessage, NetAddress};
use proto::crypto::{PublicKey, TxId};

use crate::channel::channel_loop;
use crate::types::{
    ChannelError, ChannelEvent, ChannelRequest, LeaveOutcome, OnChainNotify, OpenChannelError,
    UpdateOutcome,
};

/// A cloneable handle to a running channel service.
/// All balance changing calls run as negotiation rounds against the
/// counterparty; at most one round may be in flight at a time.
#[derive(Clone)]
pub struct ChannelHandle {
    requests_sender: mpsc::Sender<ChannelRequest>,
    events_client: MultiConsumerClient<ChannelEvent>,
}

impl ChannelHandle {
    fn new(
        requests_sender: mpsc::Sender<ChannelRequest>,
        events_client: MultiConsumerClient<ChannelEvent>,
    ) -> Self {
        ChannelHandle {
            requests_sender,
            events_client,
        }
    }

    async fn request<T>(
        &self,
        request: ChannelRequest,
        response_receiver: oneshot::Receiver<T>,
    ) -> Result<T, ChannelError> {
        let mut requests_sender = self.requests_sender.clone();
        requests_sender
            .send(request)
            .await
            .map_err(|_| ChannelError::ChannelClosed)?;
        response_receiver
            .await
            .map_err(|_| ChannelError::ResponseCanceled)
    }

    /// Propose an off-chain transfer round.
    pub async fn update(
        &self,
        from: PublicKey,
        to: PublicKey,
        amount: u128,
    ) -> Result<UpdateOutcome, ChannelError> {
        let (response_sender, response_receiver) = oneshot::channel();
        let request = ChannelRequest::Update {
            from,
            to,
            amount,
            response_sender,
        };
        self.request(request, response_receiver).await?
    }

    /// Propose a deposit round, increasing our balance once the on-chain
    /// leg completes. Progress of the on-chain leg is reported over
    /// `opt_hooks`, if supplied.
    pub async fn deposit(
        &self,
        amount: u128,
        opt_hooks: Option<mpsc::Sender<OnChainNotify>>,
    ) -> Result<UpdateOutcome, ChannelError> {
        let (response_sender, response_receiver) = oneshot::channel();
        let request = ChannelRequest::Deposit {
            amount,
            opt_hooks,
            response_sender,
        };
        self.request(request, response_receiver).await?
    }

    /// Propose a withdraw round, decreasing our balance once the on-chain
    /// leg completes.
    pub async fn withdraw(
        &self,
        amount: u128,
        opt_hooks: Option<mpsc::Sender<OnChainNotify>>,
    ) -> Result<UpdateOutcome, ChannelError> {
        let (response_sender, response_receiver) = oneshot::channel();
        let request = ChannelRequest::Withdraw {
            amount,
            opt_hooks,
            response_sender,
        };
        self.request(request, response_receiver).await?
    }

    /// Propose the final shutdown round. On acceptance the co-signed
    /// closing transaction is submitted; resolves to its transaction id.
    pub async fn shutdown(&self) -> Result<TxId, ChannelError> {
        let (response_sender, response_receiver) = oneshot::channel();
        let request = ChannelRequest::Shutdown { response_sender };
        self.request(request, response_receiver).await?
    }

    /// Send a plain message to the counterparty. Fire and forget.
    pub async fn send_message(&self, recipient: PublicKey, info: String) -> Result<(), ChannelError> {
        let mut requests_sender = self.requests_sender.clone();
        requests_sender
            .send(ChannelRequest::SendMessage { recipient, info })
            .await
            .map_err(|_| ChannelError::ChannelClosed)
    }

    /// Current balances of the given addresses. Unknown addresses are
    /// absent from the result.
    pub async fn balances(
        &self,
        addresses: Vec<PublicKey>,
    ) -> Result<HashMap<PublicKey, u128>, ChannelError> {
        let (response_sender, response_receiver) = oneshot::channel();
        let request = ChannelRequest::Balances {
            addresses,
            response_sender,
        };
        self.request(request, response_receiver).await
    }

    /// A proof of inclusion blob for the given accounts over the current
    /// state. Both parties derive equal proofs for the same round.
    pub async fn poi(&self, accounts: Vec<PublicKey>) -> Result<String, ChannelError> {
        let (response_sender, response_receiver) = oneshot::channel();
        let request = ChannelRequest::Poi {
            accounts,
            response_sender,
        };
        self.request(request, response_receiver).await?
    }

    /// The current authoritative state as an opaque blob.
    pub async fn state(&self) -> Result<String, ChannelError> {
        let (response_sender, response_receiver) = oneshot::channel();
        let request = ChannelRequest::State { response_sender };
        self.request(request, response_receiver).await?
    }

    /// Leave the channel without closing it. The returned outcome carries
    /// everything needed to reestablish later through
    /// `ChannelConfig::resume`.
    pub async fn leave(&self) -> Result<LeaveOutcome, ChannelError> {
        let (response_sender, response_receiver) = oneshot::channel();
        let request = ChannelRequest::Leave { response_sender };
        self.request(request, response_receiver).await?
    }

    /// Register another events consumer. Every consumer receives every
    /// event from the moment of subscription.
    pub async fn subscribe(&self) -> Result<mpsc::Receiver<ChannelEvent>, ChannelError> {
        let mut events_client = self.events_client.clone();
        events_client
            .request_stream()
            .await
            .map_err(|_| ChannelError::ChannelClosed)
    }
}

/// Open (or reestablish) a channel: connect through the relay, run the
/// setup exchange, and spawn the channel service. Resolves once the channel
/// reached the open state, with a handle and a pre-subscribed events
/// stream.
pub async fn open_channel<C, S>(
    config: ChannelConfig,
    mut connector: C,
    signer: SignerClient,
    mut timer_client: TimerClient,
    spawner: S,
) -> Result<(ChannelHandle, mpsc::Receiver<ChannelEvent>), OpenChannelError>
where
    C: Connector<Address = NetAddress, SendItem = ChannelMessage, RecvItem = ChannelMessage>,
    S: Spawn,
{
    config.validate()?;

    let conn_pair = connector
        .connect(config.address.clone())
        .await
        .ok_or(OpenChannelError::ConnectFailed)?;

    let timer_stream = timer_client
        .request_timer_stream()
        .await
        .map_err(|_| OpenChannelError::RequestTimerStreamFailed)?;

    // Event fan-out. The first consumer stream is requested before the
    // service is spawned, so no event can be missed.
    let (event_sender, event_receiver) = mpsc::channel(0);
    let (mc_sender, mc_receiver) = mpsc::channel(0);
    spawner
        .spawn(multi_consumer_service(event_receiver, mc_receiver).map(|_| ()))
        .map_err(|_| OpenChannelError::SpawnError)?;
    let mut events_client = MultiConsumerClient::new(mc_sender);
    let events_receiver = events_client
        .request_stream()
        .await
        .map_err(|_| OpenChannelError::SpawnError)?;

    let (requests_sender, requests_receiver) = mpsc::channel(0);
    let (setup_sender, setup_receiver) = oneshot::channel();

    let loop_fut = channel_loop(
        config,
        signer,
        conn_pair,
        requests_receiver,
        timer_stream,
        event_sender,
        setup_sender,
    )
    .map(|res| {
        if let Err(error) = res {
            warn!("channel_loop() error: {:?}", error);
        }
    });
    spawner
        .spawn(loop_fut)
        .map_err(|_| OpenChannelError::SpawnError)?;

    match setup_receiver.await {
        Ok(Ok(())) => Ok((
            ChannelHandle::new(requests_sender, events_client),
            events_receiver,
        )),
        Ok(Err(setup_error)) => Err(setup_error.into()),
        Err(_) => Err(OpenChannelError::SetupCanceled),
    }
}
