use bytes::BytesMut;
use futures::unsync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::{Future, Sink, Stream};
use tokio_core::reactor::Handle;
use tokio_io::codec::length_delimited::{Builder, Framed};
use tokio_io::{AsyncRead, AsyncWrite};

use errors::{Error, Result};

/// Maximal protocol message size (128 MB)
pub const MAX_MSG_SIZE: usize = 128 * 1024 * 1024;

pub type SendType = Vec<u8>;

/// Write half of a connection; the queued frames are flushed by the
/// connection's writer future on the event loop.
#[derive(Clone)]
pub struct Sender {
    channel_sender: UnboundedSender<SendType>,
}

impl Sender {
    pub(crate) fn new(channel_sender: UnboundedSender<SendType>) -> Self {
        Sender { channel_sender }
    }

    pub fn send(&self, data: SendType) {
        // A missing receiver means the connection already went down; the
        // frame can only be dropped at this point.
        if self.channel_sender.unbounded_send(data).is_err() {
            debug!("dropping frame for a closed connection");
        }
    }
}

pub fn create_protocol_stream<S>(stream: S) -> Framed<S, SendType>
where
    S: AsyncRead + AsyncWrite + 'static,
{
    Builder::new()
        .little_endian()
        .max_frame_length(MAX_MSG_SIZE)
        .new_framed(stream)
}

pub struct Connection<S>
where
    S: AsyncRead + AsyncWrite + 'static,
{
    stream: Framed<S, SendType>,
    channel_receiver: UnboundedReceiver<SendType>,
    channel_sender: UnboundedSender<SendType>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + 'static,
{
    pub fn from(stream: Framed<S, SendType>) -> Self {
        let (channel_sender, channel_receiver) = mpsc::unbounded();
        Connection {
            stream,
            channel_receiver,
            channel_sender,
        }
    }

    pub fn sender(&self) -> Sender {
        Sender::new(self.channel_sender.clone())
    }

    /// Spawn the reader/writer pair for this connection. `on_message` is
    /// called for every incoming frame; returning an error tears the
    /// connection down. `on_close` runs exactly once, with the error that
    /// ended the connection or `None` for a plain end-of-stream.
    pub fn start<OnMessage, OnClose>(self, handle: &Handle, on_message: OnMessage, on_close: OnClose)
    where
        OnMessage: Fn(BytesMut) -> Result<()> + 'static,
        OnClose: FnOnce(Option<Error>) + 'static,
    {
        let Connection {
            stream,
            channel_receiver,
            ..
        } = self;
        let (write, read) = stream.split();
        let send_future = channel_receiver
            .map_err(|_| Error::from("connection send channel failed"))
            .forward(write)
            .map(|_| ());
        let read_future = read.map_err(Error::from).for_each(on_message);
        let future = read_future.select(send_future).then(move |result| {
            match result {
                Ok(_) => on_close(None),
                Err((error, _)) => on_close(Some(error)),
            }
            Ok(())
        });
        handle.spawn(future);
    }
}
