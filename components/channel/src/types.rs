use std::collections::HashMap;
use std::fmt;

use derive_more::From;

use futures::channel::{mpsc, oneshot};

use proto::channel::messages::{ConfigError, MessageInfo};
use proto::crypto::{ChannelId, PublicKey, TxId};

use crate::setup::SetupError;
use crate::transition::TransitionError;

/// Lifecycle state of the channel, as observed by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Funding not yet confirmed on chain.
    Unfunded,
    /// Funded, no negotiation in flight.
    Open,
    /// A negotiation round is in flight.
    UpdatePending,
    /// Shutdown was accepted; waiting for the closing transaction.
    Closing,
    /// The channel is finalized. No further updates are possible.
    Closed,
    /// Resuming from a previously saved state.
    Reestablishing,
    /// The transport failed outside of a clean leave.
    Died,
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ChannelStatus::Unfunded => "unfunded",
            ChannelStatus::Open => "open",
            ChannelStatus::UpdatePending => "update-pending",
            ChannelStatus::Closing => "closing",
            ChannelStatus::Closed => "closed",
            ChannelStatus::Reestablishing => "reestablishing",
            ChannelStatus::Died => "died",
        };
        write!(f, "{}", s)
    }
}

/// Events emitted over the channel's event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    StatusChanged(ChannelStatus),
    /// An inbound peer message.
    Message(MessageInfo),
}

/// Progress notifications for the on-chain leg of a deposit or withdraw
/// round, delivered in order over the hooks channel supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnChainNotify {
    /// The co-signed transaction was included on chain.
    OnChainTx(TxId),
    /// Our own funds entered the lock period.
    OwnLocked,
    /// Both sides' funds are locked; the round can complete.
    Locked,
}

/// The result of a negotiation round, as seen by its proposer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The counterparty co-signed; `state` is the new authoritative state
    /// blob.
    Accepted { state: String },
    /// Declined by the counterparty, or timed out. The channel state is
    /// unchanged.
    Rejected,
}

impl UpdateOutcome {
    pub fn is_accepted(&self) -> bool {
        match self {
            UpdateOutcome::Accepted { .. } => true,
            UpdateOutcome::Rejected => false,
        }
    }
}

/// What `leave()` hands back: everything needed to reestablish later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveOutcome {
    pub channel_id: ChannelId,
    /// Last authoritative state blob, for `ResumeInfo::offchain_tx`.
    pub state: String,
}

#[derive(Debug)]
pub enum ChannelError {
    /// Another negotiation round is already in flight.
    NegotiationInProgress,
    /// The request violates a balance rule, locally.
    InvalidRequest(TransitionError),
    /// The channel is closing or closed.
    ChannelClosed,
    /// The shutdown proposal was declined by the counterparty.
    ShutdownRejected,
    /// The on-chain submission of a co-signed transaction failed.
    OnChainSubmitFailed,
    /// The local signer failed (not: declined).
    SignerFailure,
    /// The transport session failed mid-request.
    TransportFailure,
    /// Could not encode the requested blob.
    SerializeFailed,
    ResponseCanceled,
}

#[derive(Debug, From)]
pub enum OpenChannelError {
    InvalidConfig(ConfigError),
    ConnectFailed,
    RequestTimerStreamFailed,
    SpawnError,
    FundingRefused,
    PushRoundRejected,
    Desync,
    InvalidResumeData,
    TransportClosed,
    SignerFailure,
    SetupCanceled,
}

impl From<SetupError> for OpenChannelError {
    fn from(setup_error: SetupError) -> Self {
        match setup_error {
            SetupError::FundingRefused => OpenChannelError::FundingRefused,
            SetupError::PushRoundRejected => OpenChannelError::PushRoundRejected,
            SetupError::Desync => OpenChannelError::Desync,
            SetupError::InvalidResumeData => OpenChannelError::InvalidResumeData,
            SetupError::TransportClosed | SetupError::SendFailed => {
                OpenChannelError::TransportClosed
            }
            SetupError::SignerFailure => OpenChannelError::SignerFailure,
        }
    }
}

/// Requests sent from a `ChannelHandle` to the channel service.
pub enum ChannelRequest {
    Update {
        from: PublicKey,
        to: PublicKey,
        amount: u128,
        response_sender: oneshot::Sender<Result<UpdateOutcome, ChannelError>>,
    },
    Deposit {
        amount: u128,
        opt_hooks: Option<mpsc::Sender<OnChainNotify>>,
        response_sender: oneshot::Sender<Result<UpdateOutcome, ChannelError>>,
    },
    Withdraw {
        amount: u128,
        opt_hooks: Option<mpsc::Sender<OnChainNotify>>,
        response_sender: oneshot::Sender<Result<UpdateOutcome, ChannelError>>,
    },
    Shutdown {
        response_sender: oneshot::Sender<Result<TxId, ChannelError>>,
    },
    SendMessage {
        recipient: PublicKey,
        info: String,
    },
    Balances {
        addresses: Vec<PublicKey>,
        response_sender: oneshot::Sender<HashMap<PublicKey, u128>>,
    },
    Poi {
        accounts: Vec<PublicKey>,
        response_sender: oneshot::Sender<Result<String, ChannelError>>,
    },
    State {
        response_sender: oneshot::Sender<Result<String, ChannelError>>,
    },
    Leave {
        response_sender: oneshot::Sender<Result<LeaveOutcome, ChannelError>>,
    },
}
