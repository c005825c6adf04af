use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};

use signer::SignerClient;

use proto::channel::messages::{
    ChannelConfig, ChannelMessage, ChannelRole, OffchainState, ResumeInfo, SignTag, StateProposal,
    UpdateKind,
};
use proto::channel::serialize::blob_to_state;
use proto::channel::signature_buff::{funding_tx_buffer, state_signing_buffer};

use crate::negotiation::{ack_tag, propose_tag};
use crate::transition::{apply_kind, attach_signature, initial_state, validate_proposal};

pub type TransportWriter = mpsc::Sender<ChannelMessage>;
pub type TransportReader = mpsc::Receiver<ChannelMessage>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupError {
    /// The local signer declined to sign the funding transaction.
    FundingRefused,
    /// The opening push round was declined by either side.
    PushRoundRejected,
    /// The two resumed states cannot be reconciled.
    Desync,
    /// The supplied resume blob could not be decoded.
    InvalidResumeData,
    TransportClosed,
    SendFailed,
    SignerFailure,
}

/// Everything that happens before the channel is open: sign and submit the
/// funding transaction, wait for on-chain confirmation, and run the opening
/// push round that takes the state from round 0 to round 1.
pub async fn funding_exchange(
    config: &ChannelConfig,
    signer: &SignerClient,
    mut writer: TransportWriter,
    mut reader: TransportReader,
) -> Result<(OffchainState, TransportWriter, TransportReader), SetupError> {
    let funding_tx = funding_tx_buffer(config);
    let tag = match config.role {
        ChannelRole::Initiator => SignTag::FundingCreate,
        ChannelRole::Responder => SignTag::FundingSign,
    };
    let signature = signer
        .request_signature(tag, funding_tx.clone())
        .await
        .map_err(|_| SetupError::SignerFailure)?
        .ok_or(SetupError::FundingRefused)?;

    writer
        .send(ChannelMessage::FundingSigned {
            funding_tx,
            signature,
        })
        .await
        .map_err(|_| SetupError::SendFailed)?;

    // Wait for the funding transaction to confirm. The confirmation carries
    // the channel id, derived from the funding transaction.
    let channel_id = loop {
        match reader.next().await.ok_or(SetupError::TransportClosed)? {
            ChannelMessage::FundingLocked { channel_id, .. } => break channel_id,
            other => warn!("funding_exchange: unexpected message: {:?}", other),
        }
    };

    let base_state = initial_state(config, channel_id);
    match config.role {
        ChannelRole::Initiator => push_round_propose(config, signer, base_state, writer, reader).await,
        ChannelRole::Responder => push_round_accept(config, signer, base_state, writer, reader).await,
    }
}

/// The initiator's side of the opening push round: a plain transfer of
/// `push_amount` to the responder. Runs even for a zero push amount, so that
/// both sides always end setup on a co-signed round 1.
async fn push_round_propose(
    config: &ChannelConfig,
    signer: &SignerClient,
    base_state: OffchainState,
    mut writer: TransportWriter,
    mut reader: TransportReader,
) -> Result<(OffchainState, TransportWriter, TransportReader), SetupError> {
    let kind = UpdateKind::Transfer {
        from: config.initiator_id.clone(),
        to: config.responder_id.clone(),
        amount: config.push_amount,
    };
    // The config was validated, so the push rule must apply cleanly:
    let mut proposed = apply_kind(&base_state, &kind, &config.initiator_id, config.channel_reserve)
        .map_err(|_| SetupError::PushRoundRejected)?;

    let signature = signer
        .request_signature(propose_tag(&kind), state_signing_buffer(&proposed))
        .await
        .map_err(|_| SetupError::SignerFailure)?
        .ok_or(SetupError::PushRoundRejected)?;
    attach_signature(&mut proposed, config, &config.initiator_id, signature)
        .map_err(|_| SetupError::PushRoundRejected)?;

    writer
        .send(ChannelMessage::Propose(StateProposal {
            kind,
            proposer: config.initiator_id.clone(),
            state: proposed.clone(),
        }))
        .await
        .map_err(|_| SetupError::SendFailed)?;

    loop {
        match reader.next().await.ok_or(SetupError::TransportClosed)? {
            ChannelMessage::Accept {
                round, signature, ..
            } if round == proposed.round => {
                attach_signature(&mut proposed, config, &config.responder_id, signature)
                    .map_err(|_| SetupError::PushRoundRejected)?;
                return Ok((proposed, writer, reader));
            }
            ChannelMessage::Reject { .. } => return Err(SetupError::PushRoundRejected),
            other => warn!("push_round_propose: unexpected message: {:?}", other),
        }
    }
}

/// The responder's side of the opening push round. Only the exact configured
/// push transfer is acceptable here.
async fn push_round_accept(
    config: &ChannelConfig,
    signer: &SignerClient,
    base_state: OffchainState,
    mut writer: TransportWriter,
    mut reader: TransportReader,
) -> Result<(OffchainState, TransportWriter, TransportReader), SetupError> {
    let expected_kind = UpdateKind::Transfer {
        from: config.initiator_id.clone(),
        to: config.responder_id.clone(),
        amount: config.push_amount,
    };

    loop {
        let proposal = match reader.next().await.ok_or(SetupError::TransportClosed)? {
            ChannelMessage::Propose(proposal) => proposal,
            other => {
                warn!("push_round_accept: unexpected message: {:?}", other);
                continue;
            }
        };

        if proposal.kind != expected_kind
            || validate_proposal(&base_state, &proposal, config).is_err()
        {
            writer
                .send(ChannelMessage::Reject {
                    channel_id: base_state.channel_id.clone(),
                    round: proposal.state.round,
                })
                .await
                .map_err(|_| SetupError::SendFailed)?;
            return Err(SetupError::PushRoundRejected);
        }

        let opt_signature = signer
            .request_signature(ack_tag(&proposal.kind), state_signing_buffer(&proposal.state))
            .await
            .map_err(|_| SetupError::SignerFailure)?;
        let signature = match opt_signature {
            Some(signature) => signature,
            None => {
                writer
                    .send(ChannelMessage::Reject {
                        channel_id: base_state.channel_id.clone(),
                        round: proposal.state.round,
                    })
                    .await
                    .map_err(|_| SetupError::SendFailed)?;
                return Err(SetupError::PushRoundRejected);
            }
        };

        let mut state = proposal.state;
        attach_signature(&mut state, config, &config.responder_id, signature)
            .map_err(|_| SetupError::PushRoundRejected)?;
        writer
            .send(ChannelMessage::Accept {
                channel_id: state.channel_id.clone(),
                round: state.round,
                signature: state
                    .responder_signature
                    .clone()
                    .ok_or(SetupError::PushRoundRejected)?,
            })
            .await
            .map_err(|_| SetupError::SendFailed)?;
        return Ok((state, writer, reader));
    }
}

/// Exchange last known states with the peer and reconcile them.
pub async fn reestablish_exchange(
    config: &ChannelConfig,
    resume: &ResumeInfo,
    mut writer: TransportWriter,
    mut reader: TransportReader,
) -> Result<(OffchainState, TransportWriter, TransportReader), SetupError> {
    let local_state = blob_to_state(&resume.offchain_tx).map_err(|_| SetupError::InvalidResumeData)?;
    if local_state.channel_id != resume.channel_id {
        return Err(SetupError::InvalidResumeData);
    }
    if local_state.balance(&config.initiator_id).is_none()
        || local_state.balance(&config.responder_id).is_none()
    {
        return Err(SetupError::InvalidResumeData);
    }

    writer
        .send(ChannelMessage::Reestablish {
            channel_id: resume.channel_id.clone(),
            state: resume.offchain_tx.clone(),
        })
        .await
        .map_err(|_| SetupError::SendFailed)?;

    let remote_blob = loop {
        match reader.next().await.ok_or(SetupError::TransportClosed)? {
            ChannelMessage::Reestablish { state, .. } => break state,
            other => warn!("reestablish_exchange: unexpected message: {:?}", other),
        }
    };
    let remote_state = blob_to_state(&remote_blob).map_err(|_| SetupError::Desync)?;

    let state = resolve_states(local_state, remote_state)?;
    Ok((state, writer, reader))
}

/// Pick the authoritative state out of the two resumed copies.
/// Equal rounds must be identical; otherwise the higher round wins, provided
/// it is co-signed. Anything else is an unrecoverable desync.
fn resolve_states(
    local: OffchainState,
    remote: OffchainState,
) -> Result<OffchainState, SetupError> {
    if local.channel_id != remote.channel_id {
        return Err(SetupError::Desync);
    }
    if local.round == remote.round {
        if local == remote && local.is_cosigned() {
            return Ok(local);
        }
        return Err(SetupError::Desync);
    }
    let higher = if local.round > remote.round {
        local
    } else {
        remote
    };
    if higher.is_cosigned() {
        Ok(higher)
    } else {
        Err(SetupError::Desync)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use im::hashmap::HashMap as ImHashMap;

    use proto::crypto::{ChannelId, PublicKey, Signature};

    fn cosigned_state(round: u128) -> OffchainState {
        let mut balances = ImHashMap::new();
        balances.insert(PublicKey::from(&[0xaa; PublicKey::len()]), 60u128);
        balances.insert(PublicKey::from(&[0xbb; PublicKey::len()]), 40u128);
        OffchainState {
            channel_id: ChannelId::from(&[0x55; ChannelId::len()]),
            round,
            balances,
            initiator_signature: Some(Signature::from(&[0x01; Signature::len()])),
            responder_signature: Some(Signature::from(&[0x02; Signature::len()])),
        }
    }

    #[test]
    fn test_resolve_states_equal_rounds() {
        let state = cosigned_state(4);
        assert_eq!(resolve_states(state.clone(), state.clone()), Ok(state));

        // Same round, different balances:
        let local = cosigned_state(4);
        let mut remote = cosigned_state(4);
        remote
            .balances
            .insert(PublicKey::from(&[0xaa; PublicKey::len()]), 61u128);
        assert_eq!(resolve_states(local, remote), Err(SetupError::Desync));
    }

    #[test]
    fn test_resolve_states_higher_round_wins() {
        let local = cosigned_state(4);
        let remote = cosigned_state(7);
        assert_eq!(
            resolve_states(local, remote.clone()),
            Ok(remote.clone())
        );

        // A higher round without both signatures proves nothing:
        let mut remote = cosigned_state(7);
        remote.responder_signature = None;
        assert_eq!(
            resolve_states(cosigned_state(4), remote),
            Err(SetupError::Desync)
        );
    }
}
