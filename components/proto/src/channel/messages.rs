use im::hashmap::HashMap as ImHashMap;

use serde::{Deserialize, Serialize};

use common::canonical_serialize::CanonicalSerialize;

use crate::crypto::{ChannelId, HashResult, PublicKey, Signature, TxId};

/// The side of the channel this party took when the channel was set up.
/// Roles are fixed for the channel's lifetime, and are symmetric in authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelRole {
    Initiator,
    Responder,
}

/// Transport endpoint of the channel service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetAddress {
    pub host: String,
    pub port: u16,
}

/// Data required to resume a previously left channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeInfo {
    pub channel_id: ChannelId,
    /// Encoded `OffchainState` blob, as previously returned by `leave()`.
    pub offchain_tx: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    EqualParticipants,
    InitiatorAmountBelowReserve,
    ResponderAmountBelowReserve,
    PushAmountExceedsFunds,
    ZeroTtl,
}

/// Immutable channel configuration, supplied at construction.
/// All amounts are in the smallest ledger unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub role: ChannelRole,
    pub initiator_id: PublicKey,
    pub responder_id: PublicKey,
    pub initiator_amount: u128,
    pub responder_amount: u128,
    /// Minimum balance each side must retain after any accepted update.
    pub channel_reserve: u128,
    /// Amount moved from initiator to responder during the opening round.
    pub push_amount: u128,
    /// Dispute window (in time ticks) for on chain deposit/withdraw locks.
    pub lock_period: u64,
    /// Round timeout, in time ticks.
    pub ttl: usize,
    pub address: NetAddress,
    /// Present only on the reestablish path.
    pub resume: Option<ResumeInfo>,
}

impl ChannelConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initiator_id == self.responder_id {
            return Err(ConfigError::EqualParticipants);
        }
        if self.ttl == 0 {
            return Err(ConfigError::ZeroTtl);
        }
        if self.responder_amount < self.channel_reserve {
            return Err(ConfigError::ResponderAmountBelowReserve);
        }
        // The push amount leaves the initiator's side immediately, so the
        // reserve must still hold after it was applied:
        let after_push = self
            .initiator_amount
            .checked_sub(self.push_amount)
            .ok_or(ConfigError::PushAmountExceedsFunds)?;
        if after_push < self.channel_reserve {
            return Err(ConfigError::InitiatorAmountBelowReserve);
        }
        Ok(())
    }

    /// Public key of the local party.
    pub fn local_id(&self) -> &PublicKey {
        match self.role {
            ChannelRole::Initiator => &self.initiator_id,
            ChannelRole::Responder => &self.responder_id,
        }
    }

    /// Public key of the remote party.
    pub fn remote_id(&self) -> &PublicKey {
        match self.role {
            ChannelRole::Initiator => &self.responder_id,
            ChannelRole::Responder => &self.initiator_id,
        }
    }
}

/// Serialize the balances map as a vector sorted by participant id, so that
/// equal states always encode to equal blobs.
mod sorted_balances_serde {
    use super::{ImHashMap, PublicKey};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(
        balances: &ImHashMap<PublicKey, u128>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut balances: Vec<(PublicKey, u128)> = balances
            .iter()
            .map(|(public_key, amount)| (public_key.clone(), *amount))
            .collect();
        balances.sort_by(|(a, _), (b, _)| a.cmp(b));
        balances.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<ImHashMap<PublicKey, u128>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let balances: Vec<(PublicKey, u128)> = Vec::deserialize(deserializer)?;
        Ok(balances.into_iter().collect())
    }
}

/// A versioned snapshot of the channel's off-chain state.
/// Becomes authoritative only once both participants' signatures are attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffchainState {
    pub channel_id: ChannelId,
    /// Strictly increasing round number. Round 0 is the unfunded base state.
    pub round: u128,
    #[serde(with = "sorted_balances_serde")]
    pub balances: ImHashMap<PublicKey, u128>,
    pub initiator_signature: Option<Signature>,
    pub responder_signature: Option<Signature>,
}

impl OffchainState {
    pub fn is_cosigned(&self) -> bool {
        self.initiator_signature.is_some() && self.responder_signature.is_some()
    }

    /// Total channel value held in this state.
    pub fn total(&self) -> u128 {
        self.balances.values().sum()
    }

    pub fn balance(&self, id: &PublicKey) -> Option<u128> {
        self.balances.get(id).cloned()
    }

    /// Balances, ordered by participant id.
    /// Used wherever a deterministic encoding is required.
    pub fn sorted_balances(&self) -> Vec<(PublicKey, u128)> {
        let mut balances: Vec<_> = self
            .balances
            .iter()
            .map(|(public_key, amount)| (public_key.clone(), *amount))
            .collect();
        balances.sort_by(|(a, _), (b, _)| a.cmp(b));
        balances
    }
}

impl CanonicalSerialize for OffchainState {
    /// Canonical encoding of the state, excluding the signatures.
    /// This is exactly the buffer both parties sign.
    fn canonical_serialize(&self) -> Vec<u8> {
        let mut res_data = Vec::new();
        res_data.extend_from_slice(&self.channel_id.canonical_serialize());
        res_data.extend_from_slice(&self.round.canonical_serialize());
        res_data.extend_from_slice(&self.sorted_balances().canonical_serialize());
        res_data
    }
}

/// The balance rule applied by a negotiation round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateKind {
    /// Plain off-chain transfer between the two participants.
    Transfer {
        from: PublicKey,
        to: PublicKey,
        amount: u128,
    },
    /// Balance increase of the proposer, funded by an on-chain deposit.
    Deposit { amount: u128 },
    /// Balance decrease of the proposer, paired with an on-chain withdrawal.
    Withdraw { amount: u128 },
    /// Final round; the co-signed closing transaction pays the balances out.
    Shutdown,
}

/// What the Signing Port is being asked to sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignTag {
    FundingCreate,
    FundingSign,
    Update,
    UpdateAck,
    DepositTx,
    DepositAck,
    WithdrawTx,
    WithdrawAck,
    ShutdownSign,
    ShutdownSignAck,
}

/// An in-flight proposal, sent over the transport.
/// `state` carries the proposer's signature; the counterparty's is missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateProposal {
    pub kind: UpdateKind,
    pub proposer: PublicKey,
    pub state: OffchainState,
}

/// An inbound peer message, surfaced to the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInfo {
    pub channel_id: ChannelId,
    pub from: PublicKey,
    pub to: PublicKey,
    pub info: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoiEntry {
    pub account: PublicKey,
    pub amount: u128,
}

/// Evidence that the listed balances are part of the channel state at
/// `round`. Derivable unilaterally by either side from its own state copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOfInclusion {
    pub channel_id: ChannelId,
    pub round: u128,
    pub entries: Vec<PoiEntry>,
    pub state_hash: HashResult,
}

/// Items exchanged over the transport session.
/// The session is FIFO per direction; peer messages are relayed through the
/// channel service, ledger notifications originate from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelMessage {
    /// Locally signed funding transaction, submitted for on-chain inclusion.
    FundingSigned {
        funding_tx: Vec<u8>,
        signature: Signature,
    },
    /// The funding transaction was confirmed on chain.
    FundingLocked { channel_id: ChannelId, tx_id: TxId },
    /// A new negotiation round, signed by the proposer.
    Propose(StateProposal),
    /// Counterparty co-signature over the proposed round.
    Accept {
        channel_id: ChannelId,
        round: u128,
        signature: Signature,
    },
    /// Explicit decline of the proposed round.
    Reject { channel_id: ChannelId, round: u128 },
    /// Co-signed on chain transaction (deposit/withdraw/close), submitted
    /// for inclusion.
    SubmitOnChain { channel_id: ChannelId, tx: Vec<u8> },
    /// Submission acknowledged; carries the on-chain transaction id.
    OnChainTx { channel_id: ChannelId, tx_id: TxId },
    /// Our own side of the on-chain operation entered the lock period.
    OwnFundsLocked { channel_id: ChannelId, tx_id: TxId },
    /// Both sides observed the lock; the dispute window has been entered.
    FundsLocked { channel_id: ChannelId, tx_id: TxId },
    /// The on-chain submission failed.
    OnChainFailure { channel_id: ChannelId },
    /// Plain message relay. No balance effect, no acknowledgment.
    Relay(MessageInfo),
    /// Last known state blob, exchanged when resuming a channel.
    Reestablish { channel_id: ChannelId, state: String },
    /// Courtesy notification of a clean disconnect.
    Leave { channel_id: ChannelId },
}
