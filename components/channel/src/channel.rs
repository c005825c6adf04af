use futures::channel::{mpsc, oneshot};
use futures::{future, stream, SinkExt, StreamExt};

use signer::SignerClient;
use timer::TimerTick;

use common::conn::ConnPair;

use proto::channel::messages::{
    ChannelConfig, ChannelMessage, MessageInfo, OffchainState, StateProposal, UpdateKind,
};
use proto::channel::serialize::{poi_to_blob, state_to_blob};
use proto::channel::signature_buff::{cosigned_tx_buffer, state_signing_buffer};
use proto::crypto::{PublicKey, Signature, TxId};

use crate::negotiation::{
    ack_tag, propose_tag, AcceptedNegotiation, NegotiationPhase, PendingNegotiation,
    PendingResponse,
};
use crate::setup::{funding_exchange, reestablish_exchange, SetupError};
use crate::transition::{apply_kind, attach_signature, validate_proposal};
use crate::types::{
    ChannelError, ChannelEvent, ChannelRequest, ChannelStatus, LeaveOutcome, OnChainNotify,
    UpdateOutcome,
};
use crate::poi::{build_proof, project_balances};

#[derive(Debug)]
pub enum ChannelLoopError {
    /// The transport writer failed mid-operation.
    SendFailed,
}

enum Event {
    Request(ChannelRequest),
    RequestsClosed,
    Transport(ChannelMessage),
    TransportClosed,
    TimerTick,
}

struct ChannelService {
    config: ChannelConfig,
    signer: SignerClient,
    status: ChannelStatus,
    /// The last co-signed, authoritative state.
    state: OffchainState,
    /// A round we proposed, not yet resolved.
    opt_pending: Option<PendingNegotiation>,
    /// An on-chain round we accepted, waiting for its ledger leg.
    opt_accepted: Option<AcceptedNegotiation>,
    event_sender: mpsc::Sender<ChannelEvent>,
    writer: mpsc::Sender<ChannelMessage>,
    leaving: bool,
}

/// The channel service loop. Performs setup (funding or reestablish) over
/// the transport session, reports the outcome through `setup_sender`, and
/// then serves requests and peer messages until the handles are dropped,
/// the application leaves, or the transport dies.
pub async fn channel_loop(
    config: ChannelConfig,
    signer: SignerClient,
    conn_pair: ConnPair<ChannelMessage, ChannelMessage>,
    incoming_requests: mpsc::Receiver<ChannelRequest>,
    timer_stream: mpsc::Receiver<TimerTick>,
    event_sender: mpsc::Sender<ChannelEvent>,
    setup_sender: oneshot::Sender<Result<(), SetupError>>,
) -> Result<(), ChannelLoopError> {
    let (writer, reader) = conn_pair;

    let setup_result = match config.resume.clone() {
        None => funding_exchange(&config, &signer, writer, reader).await,
        Some(resume) => reestablish_exchange(&config, &resume, writer, reader).await,
    };
    let (state, writer, reader) = match setup_result {
        Ok(setup) => {
            let _ = setup_sender.send(Ok(()));
            setup
        }
        Err(setup_error) => {
            warn!("channel setup failed: {:?}", setup_error);
            let _ = setup_sender.send(Err(setup_error));
            return Ok(());
        }
    };

    let mut service = ChannelService {
        config,
        signer,
        status: ChannelStatus::Open,
        state,
        opt_pending: None,
        opt_accepted: None,
        event_sender,
        writer,
        leaving: false,
    };
    service.emit(ChannelEvent::StatusChanged(ChannelStatus::Open)).await;

    let incoming_requests = incoming_requests
        .map(Event::Request)
        .chain(stream::once(future::ready(Event::RequestsClosed)));
    let reader = reader
        .map(Event::Transport)
        .chain(stream::once(future::ready(Event::TransportClosed)));
    let timer_stream = timer_stream.map(|_| Event::TimerTick);

    let mut events = stream::select(reader, stream::select(incoming_requests, timer_stream));

    while let Some(event) = events.next().await {
        let res = match event {
            Event::Request(request) => service.handle_request(request).await,
            Event::RequestsClosed => break,
            Event::Transport(message) => service.handle_message(message).await,
            Event::TransportClosed => {
                service.transport_lost().await;
                break;
            }
            Event::TimerTick => {
                service.handle_timer_tick().await;
                Ok(())
            }
        };
        if res.is_err() {
            // The relay side of the session is gone:
            service.transport_lost().await;
            break;
        }
        if service.leaving {
            break;
        }
    }
    Ok(())
}

impl ChannelService {
    async fn emit(&mut self, event: ChannelEvent) {
        let _ = self.event_sender.send(event).await;
    }

    async fn set_status(&mut self, status: ChannelStatus) {
        if self.status == status {
            return;
        }
        self.status = status;
        // Micro transitions in and out of UpdatePending are not interesting
        // to subscribers; only lifecycle changes are surfaced.
        match status {
            ChannelStatus::Open
            | ChannelStatus::UpdatePending
            | ChannelStatus::Unfunded
            | ChannelStatus::Reestablishing => {}
            ChannelStatus::Closing | ChannelStatus::Closed | ChannelStatus::Died => {
                self.emit(ChannelEvent::StatusChanged(status)).await;
            }
        }
    }

    fn local_id(&self) -> PublicKey {
        self.config.local_id().clone()
    }

    async fn transport_lost(&mut self) {
        if self.leaving || self.status == ChannelStatus::Closed {
            return;
        }
        if let Some(pending) = self.opt_pending.take() {
            pending.resolve_error(ChannelError::TransportFailure);
        }
        self.opt_accepted = None;
        self.set_status(ChannelStatus::Died).await;
    }

    async fn handle_request(&mut self, request: ChannelRequest) -> Result<(), ChannelLoopError> {
        match request {
            ChannelRequest::Update {
                from,
                to,
                amount,
                response_sender,
            } => {
                let kind = UpdateKind::Transfer { from, to, amount };
                self.start_negotiation(
                    kind,
                    None,
                    PendingResponse::Negotiation(response_sender),
                )
                .await
            }
            ChannelRequest::Deposit {
                amount,
                opt_hooks,
                response_sender,
            } => {
                let kind = UpdateKind::Deposit { amount };
                self.start_negotiation(
                    kind,
                    opt_hooks,
                    PendingResponse::Negotiation(response_sender),
                )
                .await
            }
            ChannelRequest::Withdraw {
                amount,
                opt_hooks,
                response_sender,
            } => {
                let kind = UpdateKind::Withdraw { amount };
                self.start_negotiation(
                    kind,
                    opt_hooks,
                    PendingResponse::Negotiation(response_sender),
                )
                .await
            }
            ChannelRequest::Shutdown { response_sender } => {
                self.start_negotiation(
                    UpdateKind::Shutdown,
                    None,
                    PendingResponse::Shutdown(response_sender),
                )
                .await
            }
            ChannelRequest::SendMessage { recipient, info } => {
                if self.status == ChannelStatus::Closed {
                    return Ok(());
                }
                let message_info = MessageInfo {
                    channel_id: self.state.channel_id.clone(),
                    from: self.local_id(),
                    to: recipient,
                    info,
                };
                self.writer
                    .send(ChannelMessage::Relay(message_info))
                    .await
                    .map_err(|_| ChannelLoopError::SendFailed)
            }
            ChannelRequest::Balances {
                addresses,
                response_sender,
            } => {
                let _ = response_sender.send(project_balances(&self.state, &addresses));
                Ok(())
            }
            ChannelRequest::Poi {
                accounts,
                response_sender,
            } => {
                let res = match build_proof(&self.state, &accounts) {
                    Ok(proof) => {
                        poi_to_blob(&proof).map_err(|_| ChannelError::SerializeFailed)
                    }
                    Err(transition_error) => {
                        Err(ChannelError::InvalidRequest(transition_error))
                    }
                };
                let _ = response_sender.send(res);
                Ok(())
            }
            ChannelRequest::State { response_sender } => {
                let res = state_to_blob(&self.state).map_err(|_| ChannelError::SerializeFailed);
                let _ = response_sender.send(res);
                Ok(())
            }
            ChannelRequest::Leave { response_sender } => self.handle_leave(response_sender).await,
        }
    }

    async fn start_negotiation(
        &mut self,
        kind: UpdateKind,
        opt_hooks: Option<mpsc::Sender<OnChainNotify>>,
        response: PendingResponse,
    ) -> Result<(), ChannelLoopError> {
        if self.status == ChannelStatus::Closing || self.status == ChannelStatus::Closed {
            Self::respond_error(response, ChannelError::ChannelClosed);
            return Ok(());
        }
        if self.opt_pending.is_some() || self.opt_accepted.is_some() {
            Self::respond_error(response, ChannelError::NegotiationInProgress);
            return Ok(());
        }

        let local_id = self.local_id();
        let mut proposed =
            match apply_kind(&self.state, &kind, &local_id, self.config.channel_reserve) {
                Ok(proposed) => proposed,
                Err(transition_error) => {
                    Self::respond_error(response, ChannelError::InvalidRequest(transition_error));
                    return Ok(());
                }
            };

        let opt_signature = match self
            .signer
            .request_signature(propose_tag(&kind), state_signing_buffer(&proposed))
            .await
        {
            Ok(opt_signature) => opt_signature,
            Err(_) => {
                Self::respond_error(response, ChannelError::SignerFailure);
                return Ok(());
            }
        };
        let signature = match opt_signature {
            Some(signature) => signature,
            None => {
                // Our own signer declined the round:
                Self::respond_rejected(response);
                return Ok(());
            }
        };
        if attach_signature(&mut proposed, &self.config, &local_id, signature).is_err() {
            Self::respond_error(response, ChannelError::SignerFailure);
            return Ok(());
        }

        self.writer
            .send(ChannelMessage::Propose(StateProposal {
                kind: kind.clone(),
                proposer: local_id,
                state: proposed.clone(),
            }))
            .await
            .map_err(|_| ChannelLoopError::SendFailed)?;

        self.opt_pending = Some(PendingNegotiation {
            kind,
            proposed,
            ticks_left: self.config.ttl,
            phase: NegotiationPhase::AwaitingAccept,
            opt_hooks,
            response,
        });
        self.set_status(ChannelStatus::UpdatePending).await;
        Ok(())
    }

    fn respond_error(response: PendingResponse, error: ChannelError) {
        match response {
            PendingResponse::Negotiation(response_sender) => {
                let _ = response_sender.send(Err(error));
            }
            PendingResponse::Shutdown(response_sender) => {
                let _ = response_sender.send(Err(error));
            }
        }
    }

    fn respond_rejected(response: PendingResponse) {
        match response {
            PendingResponse::Negotiation(response_sender) => {
                let _ = response_sender.send(Ok(UpdateOutcome::Rejected));
            }
            PendingResponse::Shutdown(response_sender) => {
                let _ = response_sender.send(Err(ChannelError::ShutdownRejected));
            }
        }
    }

    async fn handle_leave(
        &mut self,
        response_sender: oneshot::Sender<Result<LeaveOutcome, ChannelError>>,
    ) -> Result<(), ChannelLoopError> {
        // A round in flight cannot survive a leave; its round number was
        // never committed, reestablish starts over from the last co-signed
        // state.
        if let Some(pending) = self.opt_pending.take() {
            pending.resolve_error(ChannelError::TransportFailure);
        }
        self.opt_accepted = None;

        let res = state_to_blob(&self.state)
            .map(|state| LeaveOutcome {
                channel_id: self.state.channel_id.clone(),
                state,
            })
            .map_err(|_| ChannelError::SerializeFailed);

        // Best effort courtesy notification:
        let leave_message = ChannelMessage::Leave {
            channel_id: self.state.channel_id.clone(),
        };
        let _ = self.writer.send(leave_message).await;

        let _ = response_sender.send(res);
        self.leaving = true;
        Ok(())
    }

    async fn handle_message(&mut self, message: ChannelMessage) -> Result<(), ChannelLoopError> {
        match message {
            ChannelMessage::Propose(proposal) => self.handle_propose(proposal).await,
            ChannelMessage::Accept {
                round, signature, ..
            } => self.handle_accept(round, signature).await,
            ChannelMessage::Reject { round, .. } => {
                self.handle_reject(round).await;
                Ok(())
            }
            ChannelMessage::OnChainTx { tx_id, .. } => self.handle_on_chain_tx(tx_id).await,
            ChannelMessage::OwnFundsLocked { .. } => {
                self.handle_own_funds_locked().await;
                Ok(())
            }
            ChannelMessage::FundsLocked { .. } => {
                self.handle_funds_locked().await;
                Ok(())
            }
            ChannelMessage::OnChainFailure { .. } => {
                self.handle_on_chain_failure().await;
                Ok(())
            }
            ChannelMessage::Relay(message_info) => {
                self.emit(ChannelEvent::Message(message_info)).await;
                Ok(())
            }
            ChannelMessage::Leave { .. } => {
                // The peer left cleanly. Our side of the session will see
                // the transport close shortly; nothing to do here.
                Ok(())
            }
            other => {
                warn!("channel_loop: unexpected message: {:?}", other);
                Ok(())
            }
        }
    }

    /// An inbound proposal from the counterparty. Validate, countersign and
    /// commit, or reject.
    async fn handle_propose(&mut self, proposal: StateProposal) -> Result<(), ChannelLoopError> {
        if self.status == ChannelStatus::Closed || self.status == ChannelStatus::Closing {
            return Ok(());
        }

        let reject = ChannelMessage::Reject {
            channel_id: self.state.channel_id.clone(),
            round: proposal.state.round,
        };

        // Simultaneous proposals: ours is in flight, theirs is declined.
        // Same while an accepted on-chain round still awaits its ledger leg.
        if self.opt_pending.is_some() || self.opt_accepted.is_some() {
            return self
                .writer
                .send(reject)
                .await
                .map_err(|_| ChannelLoopError::SendFailed);
        }

        if let Err(transition_error) = validate_proposal(&self.state, &proposal, &self.config) {
            warn!("invalid proposal from peer: {:?}", transition_error);
            return self
                .writer
                .send(reject)
                .await
                .map_err(|_| ChannelLoopError::SendFailed);
        }

        let opt_signature = match self
            .signer
            .request_signature(
                ack_tag(&proposal.kind),
                state_signing_buffer(&proposal.state),
            )
            .await
        {
            Ok(opt_signature) => opt_signature,
            Err(_) => {
                return self
                    .writer
                    .send(reject)
                    .await
                    .map_err(|_| ChannelLoopError::SendFailed);
            }
        };
        let signature = match opt_signature {
            Some(signature) => signature,
            None => {
                return self
                    .writer
                    .send(reject)
                    .await
                    .map_err(|_| ChannelLoopError::SendFailed);
            }
        };

        let mut new_state = proposal.state;
        let local_id = self.local_id();
        if attach_signature(&mut new_state, &self.config, &local_id, signature.clone()).is_err() {
            return Ok(());
        }

        self.writer
            .send(ChannelMessage::Accept {
                channel_id: new_state.channel_id.clone(),
                round: new_state.round,
                signature,
            })
            .await
            .map_err(|_| ChannelLoopError::SendFailed)?;

        // A plain transfer commits at Accept. On-chain kinds stay tentative
        // until the proposer's submission confirms; otherwise a failed
        // submission would leave the two sides on different rounds.
        match proposal.kind {
            UpdateKind::Transfer { .. } => {
                self.state = new_state;
            }
            UpdateKind::Deposit { .. } | UpdateKind::Withdraw { .. } => {
                self.opt_accepted = Some(AcceptedNegotiation {
                    kind: proposal.kind,
                    state: new_state,
                });
            }
            UpdateKind::Shutdown => {
                self.opt_accepted = Some(AcceptedNegotiation {
                    kind: proposal.kind,
                    state: new_state,
                });
                self.set_status(ChannelStatus::Closing).await;
            }
        }
        Ok(())
    }

    /// The counterparty co-signed our proposed round.
    async fn handle_accept(
        &mut self,
        round: u128,
        signature: Signature,
    ) -> Result<(), ChannelLoopError> {
        let mut pending = match self.opt_pending.take() {
            Some(pending) => pending,
            None => {
                warn!("Accept without a pending round");
                return Ok(());
            }
        };
        match pending.phase {
            NegotiationPhase::AwaitingAccept => {}
            NegotiationPhase::AwaitingOnChain { .. } => {
                self.opt_pending = Some(pending);
                return Ok(());
            }
        }
        if pending.proposed.round != round {
            warn!("Accept for round {}, expected {}", round, pending.proposed.round);
            self.opt_pending = Some(pending);
            return Ok(());
        }

        let remote_id = self.config.remote_id().clone();
        if attach_signature(&mut pending.proposed, &self.config, &remote_id, signature).is_err() {
            self.opt_pending = Some(pending);
            return Ok(());
        }

        match pending.kind {
            UpdateKind::Transfer { .. } => {
                // Purely off-chain; commit right away.
                self.commit_pending(pending).await;
                Ok(())
            }
            UpdateKind::Deposit { .. } | UpdateKind::Withdraw { .. } => {
                self.submit_on_chain(&pending.proposed).await?;
                pending.phase = NegotiationPhase::AwaitingOnChain {
                    tx_id: None,
                    own_locked: false,
                };
                self.opt_pending = Some(pending);
                Ok(())
            }
            UpdateKind::Shutdown => {
                self.submit_on_chain(&pending.proposed).await?;
                pending.phase = NegotiationPhase::AwaitingOnChain {
                    tx_id: None,
                    own_locked: false,
                };
                self.opt_pending = Some(pending);
                self.set_status(ChannelStatus::Closing).await;
                Ok(())
            }
        }
    }

    async fn submit_on_chain(&mut self, state: &OffchainState) -> Result<(), ChannelLoopError> {
        self.writer
            .send(ChannelMessage::SubmitOnChain {
                channel_id: state.channel_id.clone(),
                tx: cosigned_tx_buffer(state),
            })
            .await
            .map_err(|_| ChannelLoopError::SendFailed)
    }

    /// Commit a co-signed pending round and resolve its caller.
    async fn commit_pending(&mut self, pending: PendingNegotiation) {
        self.state = pending.proposed.clone();
        match state_to_blob(&self.state) {
            Ok(blob) => pending.resolve_accepted(blob),
            Err(_) => pending.resolve_error(ChannelError::SerializeFailed),
        }
        self.set_status(ChannelStatus::Open).await;
    }

    async fn handle_reject(&mut self, round: u128) {
        let reject_matches = match &self.opt_pending {
            Some(pending) => match pending.phase {
                NegotiationPhase::AwaitingAccept => pending.proposed.round == round,
                // Too late; the round was already co-signed and submitted.
                NegotiationPhase::AwaitingOnChain { .. } => false,
            },
            None => false,
        };
        if !reject_matches {
            warn!("Reject for round {} ignored", round);
            return;
        }
        let pending = match self.opt_pending.take() {
            Some(pending) => pending,
            None => return,
        };
        pending.resolve_rejected();
        self.set_status(ChannelStatus::Open).await;
    }

    async fn handle_on_chain_tx(&mut self, tx_id: TxId) -> Result<(), ChannelLoopError> {
        if let Some(mut pending) = self.opt_pending.take() {
            match &mut pending.phase {
                NegotiationPhase::AwaitingOnChain {
                    tx_id: pending_tx_id,
                    ..
                } => *pending_tx_id = Some(tx_id.clone()),
                NegotiationPhase::AwaitingAccept => {
                    self.opt_pending = Some(pending);
                    return Ok(());
                }
            }
            pending.notify_hooks(OnChainNotify::OnChainTx(tx_id.clone())).await;

            if let UpdateKind::Shutdown = pending.kind {
                // The closing transaction confirmed; the channel is finalized.
                self.state = pending.proposed.clone();
                pending.resolve_closed(tx_id);
                self.set_status(ChannelStatus::Closed).await;
                return Ok(());
            }
            self.opt_pending = Some(pending);
            return Ok(());
        }

        if let Some(accepted) = self.opt_accepted.take() {
            if let UpdateKind::Shutdown = accepted.kind {
                self.state = accepted.state;
                self.set_status(ChannelStatus::Closed).await;
            } else {
                // Deposit/withdraw commit only once both locks are reported:
                self.opt_accepted = Some(accepted);
            }
        }
        Ok(())
    }

    async fn handle_own_funds_locked(&mut self) {
        let mut pending = match self.opt_pending.take() {
            Some(pending) => pending,
            None => return,
        };
        match &mut pending.phase {
            NegotiationPhase::AwaitingOnChain { own_locked, .. } => *own_locked = true,
            NegotiationPhase::AwaitingAccept => {
                self.opt_pending = Some(pending);
                return;
            }
        }
        pending.notify_hooks(OnChainNotify::OwnLocked).await;
        self.opt_pending = Some(pending);
    }

    async fn handle_funds_locked(&mut self) {
        if let Some(mut pending) = self.opt_pending.take() {
            match pending.phase {
                NegotiationPhase::AwaitingOnChain { .. } => {}
                NegotiationPhase::AwaitingAccept => {
                    self.opt_pending = Some(pending);
                    return;
                }
            }
            pending.notify_hooks(OnChainNotify::Locked).await;
            // Both sides are locked; the on-chain leg is complete.
            self.commit_pending(pending).await;
            return;
        }

        // The accepted round becomes authoritative on our side too:
        if let Some(accepted) = self.opt_accepted.take() {
            self.state = accepted.state;
            self.set_status(ChannelStatus::Open).await;
        }
    }

    async fn handle_on_chain_failure(&mut self) {
        if let Some(pending) = self.opt_pending.take() {
            match pending.phase {
                NegotiationPhase::AwaitingOnChain { .. } => {}
                NegotiationPhase::AwaitingAccept => {
                    self.opt_pending = Some(pending);
                    return;
                }
            }
            // The off-chain state is only advanced once the on-chain leg
            // completes, so a failed submission simply drops the round.
            pending.resolve_error(ChannelError::OnChainSubmitFailed);
            self.set_status(ChannelStatus::Open).await;
            return;
        }

        // Same on the accepting side; the tentative round never happened.
        if self.opt_accepted.take().is_some() {
            self.set_status(ChannelStatus::Open).await;
        }
    }

    async fn handle_timer_tick(&mut self) {
        let timed_out = match &mut self.opt_pending {
            Some(pending) => match pending.phase {
                NegotiationPhase::AwaitingAccept => {
                    pending.ticks_left = pending.ticks_left.saturating_sub(1);
                    pending.ticks_left == 0
                }
                // The on-chain leg has no negotiation timeout:
                NegotiationPhase::AwaitingOnChain { .. } => false,
            },
            None => false,
        };
        if !timed_out {
            return;
        }
        let pending = match self.opt_pending.take() {
            Some(pending) => pending,
            None => return,
        };
        info!(
            "negotiation round {} timed out after {} ticks",
            pending.proposed.round, self.config.ttl
        );
        pending.resolve_rejected();
        self.set_status(ChannelStatus::Open).await;
    }
}
