use futures::channel::mpsc;
use futures::prelude::*;

use proto::channel::messages::SignTag;
use proto::crypto::Signature;

use crate::messages::{ResponseSignature, ToSigner};

/// A capability for signing proposed channel transactions.
/// Returning `None` models unilateral rejection of the proposal.
pub trait ChannelSign {
    fn sign(&self, tag: SignTag, message: &[u8]) -> Option<Signature>;
}

impl<F> ChannelSign for F
where
    F: Fn(SignTag, &[u8]) -> Option<Signature>,
{
    fn sign(&self, tag: SignTag, message: &[u8]) -> Option<Signature> {
        (self)(tag, message)
    }
}

/// Create a signer service around a `ChannelSign` implementation.
/// Returns a requests sender together with the service future, which the
/// caller is expected to spawn.
pub fn create_signer<S: ChannelSign>(
    channel_sign: S,
) -> (mpsc::Sender<ToSigner>, impl Future<Output = ()>) {
    let (requests_sender, requests_receiver) = mpsc::channel::<ToSigner>(0);
    let signer = requests_receiver.for_each(move |request| {
        match request {
            ToSigner::RequestSignature {
                tag,
                message,
                response_sender,
            } => {
                let _ = response_sender.send(ResponseSignature {
                    opt_signature: channel_sign.sign(tag, &message),
                });
                // It is possible that sending the response didn't work.
                // We don't care about this.
                future::ready(())
            }
        }
    });

    (requests_sender, signer)
}
