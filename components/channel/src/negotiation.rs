use futures::channel::{mpsc, oneshot};
use futures::SinkExt;

use proto::channel::messages::{OffchainState, SignTag, UpdateKind};
use proto::crypto::TxId;

use crate::types::{ChannelError, OnChainNotify, UpdateOutcome};

/// The tag the proposer signs under, per kind of round.
pub fn propose_tag(kind: &UpdateKind) -> SignTag {
    match kind {
        UpdateKind::Transfer { .. } => SignTag::Update,
        UpdateKind::Deposit { .. } => SignTag::DepositTx,
        UpdateKind::Withdraw { .. } => SignTag::WithdrawTx,
        UpdateKind::Shutdown => SignTag::ShutdownSign,
    }
}

/// The tag the accepting counterparty signs under, per kind of round.
pub fn ack_tag(kind: &UpdateKind) -> SignTag {
    match kind {
        UpdateKind::Transfer { .. } => SignTag::UpdateAck,
        UpdateKind::Deposit { .. } => SignTag::DepositAck,
        UpdateKind::Withdraw { .. } => SignTag::WithdrawAck,
        UpdateKind::Shutdown => SignTag::ShutdownSignAck,
    }
}

pub enum NegotiationPhase {
    /// Waiting for the counterparty's Accept or Reject.
    AwaitingAccept,
    /// Accepted; waiting for the submitted on-chain transaction to confirm
    /// and (for deposit/withdraw) for both locks.
    AwaitingOnChain {
        tx_id: Option<TxId>,
        own_locked: bool,
    },
}

/// A round proposed by the counterparty that we already co-signed.
/// For on-chain kinds the new state is not authoritative yet; it commits
/// once the ledger reports the locks, and is dropped if the submission
/// fails, mirroring the proposer's side.
pub struct AcceptedNegotiation {
    pub kind: UpdateKind,
    pub state: OffchainState,
}

/// The response channel held open while a proposed round is in flight.
pub enum PendingResponse {
    Negotiation(oneshot::Sender<Result<UpdateOutcome, ChannelError>>),
    Shutdown(oneshot::Sender<Result<TxId, ChannelError>>),
}

/// A round we proposed and have not yet resolved.
pub struct PendingNegotiation {
    pub kind: UpdateKind,
    /// The successor state, carrying our signature, and after Accept the
    /// counterparty's as well.
    pub proposed: OffchainState,
    /// Remaining time ticks until the round times out.
    pub ticks_left: usize,
    pub phase: NegotiationPhase,
    pub opt_hooks: Option<mpsc::Sender<OnChainNotify>>,
    pub response: PendingResponse,
}

impl PendingNegotiation {
    /// Notify the on-chain hooks channel, if one was supplied.
    /// A gone receiver is not an error.
    pub async fn notify_hooks(&mut self, notify: OnChainNotify) {
        if let Some(hooks) = &mut self.opt_hooks {
            if hooks.send(notify).await.is_err() {
                self.opt_hooks = None;
            }
        }
    }

    pub fn resolve_accepted(self, state_blob: String) {
        match self.response {
            PendingResponse::Negotiation(response_sender) => {
                let _ = response_sender.send(Ok(UpdateOutcome::Accepted { state: state_blob }));
            }
            // A shutdown round resolves through `resolve_closed`:
            PendingResponse::Shutdown(response_sender) => {
                let _ = response_sender.send(Err(ChannelError::ResponseCanceled));
            }
        }
    }

    pub fn resolve_rejected(self) {
        match self.response {
            PendingResponse::Negotiation(response_sender) => {
                let _ = response_sender.send(Ok(UpdateOutcome::Rejected));
            }
            PendingResponse::Shutdown(response_sender) => {
                let _ = response_sender.send(Err(ChannelError::ShutdownRejected));
            }
        }
    }

    pub fn resolve_closed(self, tx_id: TxId) {
        match self.response {
            PendingResponse::Shutdown(response_sender) => {
                let _ = response_sender.send(Ok(tx_id));
            }
            PendingResponse::Negotiation(response_sender) => {
                let _ = response_sender.send(Err(ChannelError::ResponseCanceled));
            }
        }
    }

    pub fn resolve_error(self, error: ChannelError) {
        match self.response {
            PendingResponse::Negotiation(response_sender) => {
                let _ = response_sender.send(Err(error));
            }
            PendingResponse::Shutdown(response_sender) => {
                let _ = response_sender.send(Err(error));
            }
        }
    }
}
