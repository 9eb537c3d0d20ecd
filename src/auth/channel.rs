//! Blocking message transport between two protocol parties.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver, Sender};

use bytes::Bytes;
use tracing::trace;

use crate::protocol::{self, Error, MAX_RECORD_LEN, Message, MessageType};

/// Synchronous request/response transport.
///
/// `receive` blocks until the next record arrives. A closed peer is
/// reported as [`Error::ChannelClosed`].
pub trait MessageChannel {
    /// Send one message.
    fn send(&mut self, message: &Message) -> protocol::Result<()>;

    /// Block for the next message.
    fn receive(&mut self) -> protocol::Result<Message>;

    /// Block for the next message and require one of `expected` types.
    fn receive_expecting(&mut self, expected: &[MessageType]) -> protocol::Result<Message> {
        let message = self.receive()?;
        if expected.contains(&message.message_type()) {
            Ok(message)
        } else {
            Err(Error::UnexpectedType {
                found: message.message_type(),
            })
        }
    }
}

impl<C: MessageChannel + ?Sized> MessageChannel for &mut C {
    fn send(&mut self, message: &Message) -> protocol::Result<()> {
        (**self).send(message)
    }

    fn receive(&mut self) -> protocol::Result<Message> {
        (**self).receive()
    }
}

/// One JSON record per `\n`-terminated line over any byte stream.
#[derive(Debug)]
pub struct LineChannel<R, W> {
    reader: R,
    writer: W,
    tracing: bool,
    buf: Vec<u8>,
}

impl<R: BufRead, W: Write> LineChannel<R, W> {
    /// Wrap a reader/writer pair.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            tracing: false,
            buf: Vec::with_capacity(1024),
        }
    }

    /// Log every message sent and received at `trace` level.
    #[must_use]
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.tracing = enabled;
        self
    }

    /// Toggle message tracing.
    pub fn set_tracing(&mut self, enabled: bool) {
        self.tracing = enabled;
    }
}

impl LineChannel<BufReader<TcpStream>, TcpStream> {
    /// Channel over a connected socket.
    pub fn from_tcp(stream: TcpStream) -> protocol::Result<Self> {
        let writer = stream.try_clone()?;
        Ok(Self::new(BufReader::new(stream), writer))
    }
}

impl<R: BufRead, W: Write> MessageChannel for LineChannel<R, W> {
    fn send(&mut self, message: &Message) -> protocol::Result<()> {
        if self.tracing {
            trace!(direction = "send", ?message, "message");
        }
        let record = message.encode()?;
        self.writer.write_all(&record)?;
        self.writer.flush()?;
        Ok(())
    }

    fn receive(&mut self) -> protocol::Result<Message> {
        self.buf.clear();
        let limit = (MAX_RECORD_LEN + 1) as u64;
        let read = self
            .reader
            .by_ref()
            .take(limit)
            .read_until(b'\n', &mut self.buf)?;

        if read == 0 {
            return Err(Error::ChannelClosed);
        }
        if self.buf.last() != Some(&b'\n') && self.buf.len() > MAX_RECORD_LEN {
            return Err(Error::RecordTooLarge {
                max: MAX_RECORD_LEN,
            });
        }

        let message = Message::decode(&self.buf)?;
        if self.tracing {
            trace!(direction = "receive", ?message, "message");
        }
        Ok(message)
    }
}

/// In-process duplex channel; records still pass through the codec.
#[derive(Debug)]
pub struct MemoryChannel {
    tx: Sender<Bytes>,
    rx: Receiver<Bytes>,
}

impl MemoryChannel {
    /// Two connected endpoints.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel();
        let (b_tx, a_rx) = mpsc::channel();
        (Self { tx: a_tx, rx: a_rx }, Self { tx: b_tx, rx: b_rx })
    }

    /// Inject a raw record, bypassing the encoder.
    pub fn send_raw(&mut self, record: impl Into<Bytes>) -> protocol::Result<()> {
        self.tx
            .send(record.into())
            .map_err(|_| Error::ChannelClosed)
    }
}

impl MessageChannel for MemoryChannel {
    fn send(&mut self, message: &Message) -> protocol::Result<()> {
        self.send_raw(message.encode()?)
    }

    fn receive(&mut self) -> protocol::Result<Message> {
        let record = self.rx.recv().map_err(|_| Error::ChannelClosed)?;
        Message::decode(&record)
    }
}
