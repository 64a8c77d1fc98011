//! Plaintext or TLS transport with reader and writer workers.
//!
//! A [`Connection`] owns the socket. After [`Connection::connect`] two
//! tasks run until the connection closes:
//!
//! - the **reader** feeds socket bytes to a [`Parser`] and hands each
//!   decoded [`Message`] to the installed [`InboundHandler`], or to the
//!   fallback incoming queue when no handler is set;
//! - the **writer** drains the outgoing queue, asks the [`RateLimiter`] for
//!   admission and writes each line.
//!
//! A read or write failure cancels both workers. On cancellation the writer
//! closes the outgoing queue, flushes what is already queued and shuts the
//! socket down.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tern_ratelimit::{EnforcementMode, RateLimiter};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::ClientConfig;
use crate::error::{IrcError, IrcResult};
use crate::parser::Parser;
use crate::tls;
use crate::wire::Message;

const READ_BUFFER_SIZE: usize = 4096;

/// Receives decoded inbound messages in wire order.
///
/// Called from the reader task; the next line is not decoded until the
/// call returns. A call still pending when the connection closes is
/// dropped. Implementations must not close the connection from here.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    /// Handles one inbound message.
    async fn on_message(&self, message: Message);
}

/// A byte stream the workers can drive: plain TCP or TLS over TCP.
trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Transport for T {}

type BoxedTransport = Box<dyn Transport>;

/// An IRC transport connection.
pub struct Connection {
    address: String,
    host: String,
    tls: bool,
    tls_verify: bool,
    limiter: Arc<RateLimiter>,
    mode: EnforcementMode,

    outgoing_tx: mpsc::Sender<Message>,
    outgoing_rx: Mutex<Option<mpsc::Receiver<Message>>>,
    incoming_tx: mpsc::Sender<Message>,
    incoming_rx: Mutex<Option<mpsc::Receiver<Message>>>,
    handler: Mutex<Option<Arc<dyn InboundHandler>>>,

    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    closing: AtomicBool,
}

impl Connection {
    /// Creates an unconnected connection. The outgoing queue accepts
    /// messages immediately; they are written once connected.
    pub fn new(config: &ClientConfig) -> Self {
        let (outgoing_tx, outgoing_rx) = mpsc::channel(config.outgoing_capacity.max(1));
        let (incoming_tx, incoming_rx) = mpsc::channel(config.incoming_capacity.max(1));

        Self {
            address: config.address.clone(),
            host: config.host().to_string(),
            tls: config.tls,
            tls_verify: config.tls_verify,
            limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            mode: config.rate_limit.mode,
            outgoing_tx,
            outgoing_rx: Mutex::new(Some(outgoing_rx)),
            incoming_tx,
            incoming_rx: Mutex::new(Some(incoming_rx)),
            handler: Mutex::new(None),
            cancel: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            closing: AtomicBool::new(false),
        }
    }

    /// Installs the inbound handler. Must be called before [`Connection::connect`].
    pub fn set_handler(&self, handler: Arc<dyn InboundHandler>) {
        *self.handler.lock() = Some(handler);
    }

    /// Takes the fallback incoming queue, used when no handler is installed.
    pub fn take_incoming(&self) -> Option<mpsc::Receiver<Message>> {
        self.incoming_rx.lock().take()
    }

    /// Returns a producer for the outgoing queue.
    pub fn sender(&self) -> mpsc::Sender<Message> {
        self.outgoing_tx.clone()
    }

    /// Queues a line, waiting while the queue is full.
    pub async fn send(&self, message: Message) -> IrcResult<()> {
        self.outgoing_tx.send(message).await.map_err(|_| IrcError::Closed)
    }

    /// Queues a line without waiting.
    pub fn try_send(&self, message: Message) -> IrcResult<()> {
        self.outgoing_tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => IrcError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => IrcError::Closed,
        })
    }

    /// Dials the server and starts the workers.
    pub async fn connect(&self) -> IrcResult<()> {
        if self.cancel.is_cancelled() {
            return Err(IrcError::Closed);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(IrcError::AlreadyConnected);
        }

        info!(address = %self.address, tls = self.tls, "Connecting");

        let tcp = TcpStream::connect(&self.address)
            .await
            .map_err(|source| IrcError::Connect {
                address: self.address.clone(),
                source,
            })?;
        if let Err(e) = tcp.set_nodelay(true) {
            debug!(address = %self.address, error = %e, "Failed to set TCP_NODELAY");
        }

        let stream: BoxedTransport = if self.tls {
            Box::new(tls::upgrade(tcp, &self.host, &self.address, self.tls_verify).await?)
        } else {
            Box::new(tcp)
        };

        let outgoing_rx = self.outgoing_rx.lock().take().ok_or(IrcError::AlreadyConnected)?;
        let (read_half, write_half) = tokio::io::split(stream);

        let inbound = match self.handler.lock().clone() {
            Some(handler) => Inbound::Handler(handler),
            None => Inbound::Queue(self.incoming_tx.clone()),
        };

        let reader = tokio::spawn(run_reader(
            read_half,
            inbound,
            self.cancel.clone(),
            self.address.clone(),
        ));
        let writer = tokio::spawn(run_writer(
            write_half,
            outgoing_rx,
            Arc::clone(&self.limiter),
            self.mode,
            self.cancel.clone(),
            self.address.clone(),
        ));
        self.workers.lock().extend([reader, writer]);

        info!(address = %self.address, "Connected");
        Ok(())
    }

    /// Stops both workers and closes the socket. Idempotent.
    pub async fn close(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(address = %self.address, "Closing connection");
        self.cancel.cancel();
        self.wait().await;
    }

    /// Waits for the workers to exit without requesting it.
    pub async fn wait(&self) {
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(address = %self.address, error = %e, "Connection worker failed");
            }
        }
    }

    /// Resolves once the connection has been closed or has failed.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }

    /// Returns `true` once the connection has been closed or has failed.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Address this connection dials.
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.address)
            .field("tls", &self.tls)
            .field("closed", &self.is_closed())
            .finish()
    }
}

enum Inbound {
    Handler(Arc<dyn InboundHandler>),
    Queue(mpsc::Sender<Message>),
}

async fn run_reader(
    mut read_half: ReadHalf<BoxedTransport>,
    inbound: Inbound,
    cancel: CancellationToken,
    address: String,
) {
    let mut parser = Parser::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    'read: loop {
        let n = tokio::select! {
            _ = cancel.cancelled() => break,
            result = read_half.read(&mut buf) => match result {
                Ok(0) => {
                    info!(address = %address, "Server closed the connection");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    warn!(address = %address, error = %e, "Read failed");
                    break;
                }
            },
        };

        for message in parser.feed(&buf[..n]) {
            trace!(address = %address, line = %message, "Received");
            // Delivery may wait on downstream queues; closing must not.
            match &inbound {
                Inbound::Handler(handler) => {
                    tokio::select! {
                        _ = cancel.cancelled() => break 'read,
                        _ = handler.on_message(message) => {}
                    }
                }
                Inbound::Queue(tx) => {
                    tokio::select! {
                        _ = cancel.cancelled() => break 'read,
                        result = tx.send(message) => {
                            if result.is_err() {
                                trace!(address = %address, "Incoming queue dropped, discarding line");
                            }
                        }
                    }
                }
            }
        }
    }

    cancel.cancel();
}

async fn run_writer(
    mut write_half: WriteHalf<BoxedTransport>,
    mut outgoing: mpsc::Receiver<Message>,
    limiter: Arc<RateLimiter>,
    mode: EnforcementMode,
    cancel: CancellationToken,
    address: String,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            message = outgoing.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        admit(&limiter, mode, &message, &cancel, &address).await;
        if let Err(e) = write_line(&mut write_half, &message).await {
            warn!(address = %address, error = %e, "Write failed");
            cancel.cancel();
            return;
        }
    }

    // Closing: refuse new lines, flush what was already queued.
    cancel.cancel();
    outgoing.close();
    while let Ok(message) = outgoing.try_recv() {
        if !limiter.check(&rate_key(&message)) {
            debug!(address = %address, command = %message.command, "Rate limit exceeded while flushing");
        }
        if write_line(&mut write_half, &message).await.is_err() {
            break;
        }
    }

    if let Err(e) = write_half.shutdown().await {
        trace!(address = %address, error = %e, "Socket shutdown failed");
    }
}

/// Applies the enforcement policy to one outbound line.
async fn admit(
    limiter: &RateLimiter,
    mode: EnforcementMode,
    message: &Message,
    cancel: &CancellationToken,
    address: &str,
) {
    let key = rate_key(message);
    if limiter.check(&key) {
        return;
    }

    match mode {
        EnforcementMode::Advisory => {
            warn!(address = %address, key = %key, command = %message.command, "Rate limit exceeded");
        }
        EnforcementMode::Throttle if !limiter.can_admit() => {
            warn!(address = %address, key = %key, "Rate limit has zero capacity, sending unthrottled");
        }
        EnforcementMode::Throttle => {
            debug!(address = %address, key = %key, "Rate limit exceeded, delaying line");
            loop {
                let wait = limiter.retry_after(&key).max(Duration::from_millis(1));
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(wait) => {}
                }
                if limiter.check(&key) {
                    return;
                }
            }
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, message: &Message) -> std::io::Result<()> {
    let line = message.serialize();
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    trace!(command = %message.command, "Sent");
    Ok(())
}

/// Rate-limit key of an outbound line: the target of chat lines, otherwise the command.
pub fn rate_key(message: &Message) -> String {
    match message.command.to_ascii_uppercase().as_str() {
        "PRIVMSG" | "NOTICE" => match message.param(0) {
            Some(target) => target.to_lowercase(),
            None => message.command.to_ascii_uppercase(),
        },
        command => command.to_string(),
    }
}
