use futures::channel::{mpsc, oneshot};
use futures::SinkExt;

use proto::channel::messages::SignTag;
use proto::crypto::Signature;

use crate::messages::ToSigner;

#[derive(Debug)]
pub enum SignerClientError {
    RequestSendFailed,
    OneshotReceiverCanceled,
}

/// A cloneable client for the signer service.
#[derive(Debug, Clone)]
pub struct SignerClient {
    requests_sender: mpsc::Sender<ToSigner>,
}

impl SignerClient {
    pub fn new(requests_sender: mpsc::Sender<ToSigner>) -> Self {
        SignerClient { requests_sender }
    }

    /// Request a signature over a proposed transaction.
    /// Resolves to `None` if the signer declined to sign.
    pub async fn request_signature(
        &self,
        tag: SignTag,
        message: Vec<u8>,
    ) -> Result<Option<Signature>, SignerClientError> {
        let (response_sender, response_receiver) = oneshot::channel();
        let request = ToSigner::RequestSignature {
            tag,
            message,
            response_sender,
        };

        let mut requests_sender = self.requests_sender.clone();
        requests_sender
            .send(request)
            .await
            .map_err(|_| SignerClientError::RequestSendFailed)?;

        let response = response_receiver
            .await
            .map_err(|_| SignerClientError::OneshotReceiverCanceled)?;
        Ok(response.opt_signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use futures::executor::LocalPool;
    use futures::task::SpawnExt;

    use crate::signer::create_signer;

    #[test]
    fn test_signer_client_basic() {
        let channel_sign =
            |_tag: SignTag, _message: &[u8]| Some(Signature::from(&[0x77; Signature::len()]));
        let (requests_sender, signer) = create_signer(channel_sign);
        let signer_client = SignerClient::new(requests_sender);

        let mut local_pool = LocalPool::new();
        let spawner = local_pool.spawner();
        spawner.spawn(signer).unwrap();

        // SignerClient can be cloned:
        let signer_client = signer_client.clone();

        let opt_signature = local_pool
            .run_until(signer_client.request_signature(SignTag::Update, vec![1, 2, 3]))
            .unwrap();
        assert_eq!(
            opt_signature,
            Some(Signature::from(&[0x77; Signature::len()]))
        );
    }
}
