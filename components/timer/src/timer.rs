use std::time::Duration;

use futures::channel::{mpsc, oneshot};
use futures::task::{Spawn, SpawnExt};
use futures::{future, stream, FutureExt, SinkExt, Stream, StreamExt};

use futures_timer::Delay;

use common::conn::BoxStream;

#[derive(Debug, Clone)]
pub struct TimerTick;

#[derive(Debug)]
pub enum TimerError {
    SpawnError,
}

#[derive(Debug)]
pub enum TimerClientError {
    SendFailure,
    ResponseCanceled,
}

struct TimerRequest {
    response_sender: oneshot::Sender<mpsc::Receiver<TimerTick>>,
}

#[derive(Clone)]
pub struct TimerClient {
    sender: mpsc::Sender<TimerRequest>,
}

impl TimerClient {
    fn new(sender: mpsc::Sender<TimerRequest>) -> TimerClient {
        TimerClient { sender }
    }

    /// Register as a tick consumer. Every consumer receives every tick.
    pub async fn request_timer_stream(
        &mut self,
    ) -> Result<mpsc::Receiver<TimerTick>, TimerClientError> {
        let (response_sender, response_receiver) = oneshot::channel();
        let timer_request = TimerRequest { response_sender };
        self.sender
            .send(timer_request)
            .await
            .map_err(|_| TimerClientError::SendFailure)?;

        response_receiver
            .await
            .map_err(|_| TimerClientError::ResponseCanceled)
    }
}

enum TimerEvent {
    Incoming,
    IncomingDone,
    Request(TimerRequest),
    RequestsDone,
}

async fn timer_loop<M>(incoming: M, from_client: mpsc::Receiver<TimerRequest>)
where
    M: Stream<Item = ()> + Unpin,
{
    let incoming = incoming
        .map(|_| TimerEvent::Incoming)
        .chain(stream::once(future::ready(TimerEvent::IncomingDone)));
    let from_client = from_client
        .map(TimerEvent::Request)
        .chain(stream::once(future::ready(TimerEvent::RequestsDone)));

    let mut events = stream::select(incoming, from_client);
    let mut tick_senders: Vec<mpsc::Sender<TimerTick>> = Vec::new();
    let mut requests_done = false;

    while let Some(event) = events.next().await {
        match event {
            TimerEvent::Incoming => {
                let mut temp_tick_senders = Vec::new();
                temp_tick_senders.append(&mut tick_senders);
                for mut tick_sender in temp_tick_senders {
                    if tick_sender.send(TimerTick).await.is_ok() {
                        tick_senders.push(tick_sender);
                    }
                }
            }
            TimerEvent::Request(timer_request) => {
                let (tick_sender, tick_receiver) = mpsc::channel(0);
                tick_senders.push(tick_sender);
                let _ = timer_request.response_sender.send(tick_receiver);
            }
            TimerEvent::IncomingDone => break,
            TimerEvent::RequestsDone => requests_done = true,
        }
        if requests_done && tick_senders.is_empty() {
            break;
        }
    }
    info!("timer loop exited");
}

/// Create a timer service that broadcasts everything from the incoming
/// Stream. Useful for testing, as this function allows full control over the
/// rate of incoming ticks.
pub fn create_timer_incoming<M>(incoming: M, spawner: impl Spawn) -> Result<TimerClient, TimerError>
where
    M: Stream<Item = ()> + Unpin + Send + 'static,
{
    let (sender, receiver) = mpsc::channel::<TimerRequest>(0);
    spawner
        .spawn(timer_loop(incoming, receiver))
        .map_err(|_| TimerError::SpawnError)?;
    Ok(TimerClient::new(sender))
}

/// Create a timer service that ticks every `dur`.
pub fn create_timer(dur: Duration, spawner: impl Spawn) -> Result<TimerClient, TimerError> {
    let interval: BoxStream<'static, ()> = Box::pin(stream::unfold((), move |()| {
        Delay::new(dur).map(|_| Some(((), ())))
    }));
    create_timer_incoming(interval, spawner)
}
