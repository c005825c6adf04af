use futures::channel::oneshot;

use proto::channel::messages::SignTag;
use proto::crypto::Signature;

/// A response to a signature request.
/// `opt_signature = None` means the signer declined to sign; this is a
/// first class outcome, not an error.
#[derive(Debug)]
pub struct ResponseSignature {
    pub opt_signature: Option<Signature>,
}

#[derive(Debug)]
pub enum ToSigner {
    RequestSignature {
        tag: SignTag,
        message: Vec<u8>,
        response_sender: oneshot::Sender<ResponseSignature>,
    },
}
