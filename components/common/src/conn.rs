use core::pin::Pin;
use futures::channel::mpsc;
use futures::{Future, Stream};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// A pair of (sender, receiver) representing one side of a duplex,
/// message oriented communication channel.
pub type ConnPair<SendItem, RecvItem> = (mpsc::Sender<SendItem>, mpsc::Receiver<RecvItem>);

/// Connect to a remote entity
pub trait Connector {
    type Address;
    type SendItem;
    type RecvItem;

    fn connect(
        &mut self,
        address: Self::Address,
    ) -> BoxFuture<'_, Option<ConnPair<Self::SendItem, Self::RecvItem>>>;
}
