//! Connection handlers and the blocking worker pool that runs them.

use std::io;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use super::app::MessageBuilder;
use super::chap::ChapServer;
use super::channel::{LineChannel, MessageChannel};
use super::crypto::MasterKey;
use super::nonce::NonceCache;
use super::secrets::SecretStore;
use super::service::ServiceServer;
use super::tgs::TicketServer;
use crate::protocol::{Message, MessageType};

/// Default number of worker threads.
pub const DEFAULT_WORKERS: usize = 10;

/// Serves one accepted connection to completion.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Handle every exchange of one connection. Returning closes it.
    fn handle(&self, channel: &mut dyn MessageChannel);
}

/// The authority: challenge-response, then ticket-granting for the
/// principal just authenticated.
#[derive(Debug)]
pub struct KdcHandler {
    store: Arc<SecretStore>,
    cache: Arc<NonceCache>,
    ticket_lifetime_secs: u64,
}

impl KdcHandler {
    /// Create the handler.
    #[must_use]
    pub const fn new(store: Arc<SecretStore>, cache: Arc<NonceCache>, ticket_lifetime_secs: u64) -> Self {
        Self {
            store,
            cache,
            ticket_lifetime_secs,
        }
    }
}

impl ConnectionHandler for KdcHandler {
    fn handle(&self, channel: &mut dyn MessageChannel) {
        let mut chap = ChapServer::new(Arc::clone(&self.store), Arc::clone(&self.cache));
        if !chap.run(channel) {
            info!("principal not authenticated");
            return;
        }
        let Some(principal) = chap.authenticated_identity() else {
            return;
        };
        info!(principal, "principal authenticated");

        TicketServer::new(Arc::clone(&self.store), self.ticket_lifetime_secs)
            .bound_to(principal)
            .run(channel);
    }
}

/// A demonstration service: after the handshake it answers one message
/// with its payload upper-cased.
#[derive(Debug)]
pub struct EchoHandler {
    service: String,
    master_key: MasterKey,
    cache: Arc<NonceCache>,
}

impl EchoHandler {
    /// Create the handler.
    pub fn new(service: impl Into<String>, master_key: MasterKey, cache: Arc<NonceCache>) -> Self {
        Self {
            service: service.into(),
            master_key,
            cache,
        }
    }
}

impl ConnectionHandler for EchoHandler {
    fn handle(&self, channel: &mut dyn MessageChannel) {
        let mut handshake = ServiceServer::new(
            self.service.clone(),
            self.master_key.clone(),
            Arc::clone(&self.cache),
        );
        if !handshake.run(channel) {
            info!("service handshake failed");
            return;
        }
        let (Some(principal), Some(session_key)) = (handshake.principal(), handshake.session_key())
        else {
            return;
        };
        info!(principal, "handshake complete");

        let builder = MessageBuilder::new(
            self.service.clone(),
            principal,
            Arc::clone(&self.cache),
            session_key.clone(),
        );
        let request = match channel.receive_expecting(&[MessageType::ServiceMessage]) {
            Ok(Message::ServiceMessage(request)) => request,
            Ok(_) => return,
            Err(err) => {
                debug!(error = %err, "no service message");
                return;
            }
        };
        let payload = match builder.open(&request) {
            Ok(payload) => payload,
            Err(err) => {
                debug!(error = %err, "service message discarded");
                return;
            }
        };

        let answer = String::from_utf8_lossy(&payload).to_uppercase();
        match builder.build(answer.as_bytes()) {
            Ok(reply) => {
                if let Err(err) = channel.send(&reply.into()) {
                    debug!(error = %err, "reply not delivered");
                }
            }
            Err(err) => debug!(error = %err, "could not seal reply"),
        }
    }
}

/// Fixed set of threads each running one connection at a time.
pub struct WorkerPool {
    sender: Option<Sender<TcpStream>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers serving connections with `handler`. When
    /// `trace_messages` is set every message is logged at `trace` level.
    pub fn new<H: ConnectionHandler>(size: usize, handler: Arc<H>, trace_messages: bool) -> io::Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..size.max(1))
            .map(|index| {
                let receiver = Arc::clone(&receiver);
                let handler = Arc::clone(&handler);
                thread::Builder::new()
                    .name(format!("kdc-worker-{index}"))
                    .spawn(move || worker_loop(&receiver, handler.as_ref(), trace_messages))
            })
            .collect::<io::Result<Vec<_>>>()?;

        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// Number of worker threads.
    #[must_use]
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue an accepted connection. Fails only once the pool is shutting
    /// down.
    pub fn submit(&self, stream: TcpStream) -> io::Result<()> {
        self.sender
            .as_ref()
            .ok_or_else(|| io::Error::other("worker pool stopped"))?
            .send(stream)
            .map_err(|_| io::Error::other("worker pool stopped"))
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the queue lets every worker finish its connection and exit.
        drop(self.sender.take());
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop<H: ConnectionHandler>(receiver: &Mutex<Receiver<TcpStream>>, handler: &H, trace_messages: bool) {
    loop {
        let next = receiver.lock().recv();
        let Ok(stream) = next else {
            break;
        };
        serve_connection(stream, handler, trace_messages);
    }
}

fn serve_connection<H: ConnectionHandler>(stream: TcpStream, handler: &H, trace_messages: bool) {
    let peer = stream.peer_addr().ok();
    let span = info_span!("connection", id = %Uuid::new_v4(), peer = ?peer);
    let _entered = span.enter();

    let mut channel = match LineChannel::from_tcp(stream) {
        Ok(channel) => channel.with_tracing(trace_messages),
        Err(err) => {
            warn!(error = %err, "could not set up channel");
            return;
        }
    };
    debug!("connection accepted");
    handler.handle(&mut channel);
    debug!("connection closed");
}

/// Accept connections on `listener` forever, handing each to `pool`.
pub fn serve(listener: &TcpListener, pool: &WorkerPool) -> io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, workers = pool.size(), "listening");
    }
    for incoming in listener.incoming() {
        match incoming {
            Ok(stream) => pool.submit(stream)?,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => warn!(error = %err, "accept failed"),
        }
    }
    Ok(())
}
