use std::marker::Unpin;

use futures::channel::{mpsc, oneshot};
use futures::{future, stream, SinkExt, Stream, StreamExt};

/// Capacity of a single consumer stream.
/// A short burst of items does not block the producer on a slow consumer.
const CONSUMER_CHANNEL_LEN: usize = 0x20;

#[derive(Debug)]
pub enum MultiConsumerError {}

#[derive(Debug)]
pub enum MultiConsumerClientError {
    SendError,
    ReceiveError,
}

pub struct MultiConsumerRequest<T> {
    response_sender: oneshot::Sender<mpsc::Receiver<T>>,
}

#[derive(Clone)]
pub struct MultiConsumerClient<T> {
    request_sender: mpsc::Sender<MultiConsumerRequest<T>>,
}

impl<T> MultiConsumerClient<T> {
    pub fn new(request_sender: mpsc::Sender<MultiConsumerRequest<T>>) -> Self {
        MultiConsumerClient { request_sender }
    }

    pub async fn request_stream(&mut self) -> Result<mpsc::Receiver<T>, MultiConsumerClientError> {
        // Prepare request:
        let (response_sender, response_receiver) = oneshot::channel();
        let multi_consumer_request = MultiConsumerRequest { response_sender };

        // Send request:
        self.request_sender
            .send(multi_consumer_request)
            .await
            .map_err(|_| MultiConsumerClientError::SendError)?;

        // Wait for response:
        response_receiver
            .await
            .map_err(|_| MultiConsumerClientError::ReceiveError)
    }
}

/// A MultiConsumer loop event
#[allow(clippy::enum_variant_names)]
enum Event<T> {
    IncomingItem(T),
    IncomingItemsClosed,
    IncomingRequest(MultiConsumerRequest<T>),
    IncomingRequestsClosed,
}

/// A service for splitting a stream into multiple streams.
/// Requires that the sent item is Clone.
/// Should be used together with a MultiConsumerClient to request new streams.
pub async fn multi_consumer_service<T, I>(
    incoming_items: I,
    incoming_requests: mpsc::Receiver<MultiConsumerRequest<T>>,
) -> Result<(), MultiConsumerError>
where
    T: Clone,
    I: Stream<Item = T> + Unpin,
{
    let incoming_items = incoming_items
        .map(Event::IncomingItem)
        .chain(stream::once(future::ready(Event::IncomingItemsClosed)));

    let incoming_requests = incoming_requests
        .map(Event::IncomingRequest)
        .chain(stream::once(future::ready(Event::IncomingRequestsClosed)));

    let mut incoming = stream::select(incoming_items, incoming_requests);
    let mut incoming_requests_closed = false;
    let mut senders: Vec<mpsc::Sender<T>> = Vec::new();

    while let Some(event) = incoming.next().await {
        match event {
            Event::IncomingItem(t) => {
                let mut new_senders = Vec::new();
                for mut sender in senders {
                    if sender.send(t.clone()).await.is_ok() {
                        new_senders.push(sender);
                    }
                }
                senders = new_senders;
                if senders.is_empty() && incoming_requests_closed {
                    // There are no more clients, and new clients can not register.
                    // We exit.
                    return Ok(());
                }
            }
            Event::IncomingItemsClosed => break,
            Event::IncomingRequest(request) => {
                let (sender, receiver) = mpsc::channel(CONSUMER_CHANNEL_LEN);
                if request.response_sender.send(receiver).is_ok() {
                    senders.push(sender);
                }
            }
            Event::IncomingRequestsClosed => incoming_requests_closed = true,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use futures::executor::LocalPool;
    use futures::task::SpawnExt;

    #[test]
    fn test_multi_consumer_fan_out() {
        let mut local_pool = LocalPool::new();
        let spawner = local_pool.spawner();

        let (mut items_sender, items_receiver) = mpsc::channel(0);
        let (requests_sender, requests_receiver) = mpsc::channel(0);

        spawner
            .spawn(async move {
                let _ = multi_consumer_service(items_receiver, requests_receiver).await;
            })
            .unwrap();

        let mut client = MultiConsumerClient::new(requests_sender);
        let mut stream_a = local_pool.run_until(client.request_stream()).unwrap();
        let mut stream_b = local_pool.run_until(client.request_stream()).unwrap();

        local_pool.run_until(items_sender.send(3u32)).unwrap();
        assert_eq!(local_pool.run_until(stream_a.next()), Some(3u32));
        assert_eq!(local_pool.run_until(stream_b.next()), Some(3u32));

        // A dropped consumer does not block the others:
        drop(stream_a);
        local_pool.run_until(items_sender.send(4u32)).unwrap();
        assert_eq!(local_pool.run_until(stream_b.next()), Some(4u32));
    }
}
