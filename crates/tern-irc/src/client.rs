//! IRC session client.
//!
//! [`Client`] layers the session state machine over a [`Connection`]:
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──▶ Registering ──376/422──▶ Ready
//!       │                       │               │                     │
//!       └───────────────────────┴───────────────┴─────────────────────┴──▶ Closed
//! ```
//!
//! On connect the client sends `CAP LS 302`, `PASS` (when configured),
//! `NICK` and `USER`, then starts the keepalive task. Inbound traffic is
//! handled internally (PING, CAP, registration numerics, MODE) and then
//! forwarded to the message callback.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::config::ClientConfig;
use crate::connection::{Connection, InboundHandler};
use crate::error::{IrcError, IrcResult};
use crate::mode::ModeStore;
use crate::wire::Message;

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Not yet connected.
    Disconnected,
    /// Dialling the server.
    Connecting,
    /// Connected, waiting for the end of the MOTD.
    Registering,
    /// Registration complete.
    Ready,
    /// Closed by request, timeout or transport failure.
    Closed,
}

/// What the server has told us about itself.
#[derive(Debug, Clone, Default)]
pub struct ServerInformation {
    /// Capabilities from `CAP LS`; valueless capabilities map to `""`.
    pub capabilities: HashMap<String, String>,
    /// Modes per nick or channel.
    pub modes: HashMap<String, ModeStore>,
}

/// Our identity as confirmed by the server.
#[derive(Debug, Clone, Default)]
pub struct ClientInformation {
    /// Current nick.
    pub nick: String,
    /// Username.
    pub user: String,
    /// Host the server shows to others (numeric 396).
    pub displayed_host: String,
}

/// Callback receiving every inbound message after internal handling.
pub type MessageCallback = Arc<dyn Fn(Message) -> BoxFuture<'static, ()> + Send + Sync>;

/// Callback fired once when registration completes.
pub type PostInitCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    message: Option<MessageCallback>,
    post_init: Option<PostInitCallback>,
}

/// An IRC session.
pub struct Client {
    shared: Arc<ClientShared>,
    connection: Arc<Connection>,
    keepalive: Mutex<Option<JoinHandle<()>>>,
}

struct ClientShared {
    config: ClientConfig,
    outgoing: mpsc::Sender<Message>,
    state: RwLock<ClientState>,
    server: RwLock<ServerInformation>,
    info: RwLock<ClientInformation>,
    callbacks: RwLock<Callbacks>,
    /// Time of the last inbound message; the keepalive deadline follows it.
    activity: watch::Sender<Instant>,
    ready_fired: AtomicBool,
}

impl Client {
    /// Creates a client. Unset timings are replaced by their defaults.
    pub fn new(config: ClientConfig) -> Self {
        let config = config.normalized();
        let connection = Arc::new(Connection::new(&config));
        let (activity, _) = watch::channel(Instant::now());

        let shared = Arc::new(ClientShared {
            outgoing: connection.sender(),
            state: RwLock::new(ClientState::Disconnected),
            server: RwLock::new(ServerInformation::default()),
            info: RwLock::new(ClientInformation {
                nick: config.nick.clone(),
                user: config.user.clone(),
                displayed_host: String::new(),
            }),
            callbacks: RwLock::new(Callbacks::default()),
            activity,
            ready_fired: AtomicBool::new(false),
            config,
        });

        connection.set_handler(Arc::clone(&shared) as Arc<dyn InboundHandler>);

        Self {
            shared,
            connection,
            keepalive: Mutex::new(None),
        }
    }

    // =========================================================================
    // Callbacks
    // =========================================================================

    /// Sets the callback receiving every inbound message.
    pub fn set_message_handler<F, Fut>(&self, callback: F)
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: MessageCallback = Arc::new(move |message| Box::pin(callback(message)));
        self.shared.callbacks.write().message = Some(callback);
    }

    /// Sets the callback fired once registration completes.
    pub fn set_post_init_callback<F, Fut>(&self, callback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: PostInitCallback = Arc::new(move || Box::pin(callback()));
        self.shared.callbacks.write().post_init = Some(callback);
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Connects, sends the registration burst and starts the keepalive task.
    ///
    /// An invalid configuration or a failed dial or burst leaves the
    /// session [`ClientState::Closed`].
    pub async fn connect(&self) -> IrcResult<()> {
        {
            let mut state = self.shared.state.write();
            match *state {
                ClientState::Disconnected => *state = ClientState::Connecting,
                ClientState::Closed => return Err(IrcError::Closed),
                _ => return Err(IrcError::AlreadyConnected),
            }
        }

        if let Err(e) = self.shared.config.validate() {
            self.shared.set_state(ClientState::Closed);
            return Err(e);
        }
        if let Err(e) = self.connection.connect().await {
            self.shared.set_state(ClientState::Closed);
            return Err(e);
        }
        self.shared.set_state(ClientState::Registering);

        if let Err(e) = self.send_registration().await {
            self.shared.set_state(ClientState::Closed);
            self.connection.close().await;
            return Err(e);
        }

        self.shared.activity.send_replace(Instant::now());
        let handle = tokio::spawn(run_keepalive(
            Arc::clone(&self.shared),
            Arc::clone(&self.connection),
        ));
        *self.keepalive.lock() = Some(handle);

        Ok(())
    }

    async fn send_registration(&self) -> IrcResult<()> {
        let config = &self.shared.config;
        let mut burst = vec![Message::new("CAP").with_params(["LS", "302"])];
        if let Some(password) = &config.password {
            burst.push(Message::new("PASS").with_params([password.as_str()]));
        }
        burst.push(Message::nick(config.nick.as_str()));
        burst.push(
            Message::new("USER")
                .with_params([config.user.as_str(), "0", "*"])
                .with_trailing(config.real_name.as_str()),
        );
        for message in burst {
            self.connection.send(message).await?;
        }
        Ok(())
    }

    /// Closes the session and waits for every worker to exit.
    pub async fn close(&self) {
        self.shared.set_state(ClientState::Closed);
        self.connection.close().await;
        self.wait().await;
    }

    /// Waits until the session ends and every worker has exited.
    pub async fn wait(&self) {
        let keepalive = self.keepalive.lock().take();
        if let Some(handle) = keepalive
            && let Err(e) = handle.await
        {
            warn!(address = %self.connection.address(), error = %e, "Keepalive task failed");
        }
        self.connection.wait().await;
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    /// Queues a line, waiting while the outgoing queue is full.
    pub async fn send_message(&self, message: Message) -> IrcResult<()> {
        self.connection.send(message).await
    }

    /// Queues a line without waiting.
    pub fn try_send_message(&self, message: Message) -> IrcResult<()> {
        self.connection.try_send(message)
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Current session state.
    pub fn state(&self) -> ClientState {
        *self.shared.state.read()
    }

    /// Current nick.
    pub fn nick(&self) -> String {
        self.shared.info.read().nick.clone()
    }

    /// Snapshot of our identity.
    pub fn client_info(&self) -> ClientInformation {
        self.shared.info.read().clone()
    }

    /// Snapshot of the server's capabilities and tracked modes.
    pub fn server_info(&self) -> ServerInformation {
        self.shared.server.read().clone()
    }

    /// Modes tracked for `target`.
    pub fn modes(&self, target: &str) -> Option<ModeStore> {
        self.shared.server.read().modes.get(target).cloned()
    }

    /// The configuration in effect.
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("address", &self.shared.config.address)
            .field("state", &self.state())
            .finish()
    }
}

impl ClientShared {
    fn set_state(&self, next: ClientState) {
        let previous = std::mem::replace(&mut *self.state.write(), next);
        if previous != next {
            info!(address = %self.config.address, from = ?previous, to = ?next, "Client state changed");
        }
    }

    async fn send(&self, message: Message) {
        if self.outgoing.send(message).await.is_err() {
            debug!(address = %self.config.address, "Outgoing queue closed, reply dropped");
        }
    }

    fn is_own_nick(&self, nick: &str) -> bool {
        self.info.read().nick.eq_ignore_ascii_case(nick)
    }

    async fn handle_cap(&self, message: &Message) {
        if message.param(1) != Some("LS") {
            return;
        }

        if let Some(listing) = message.last_param() {
            let mut server = self.server.write();
            for token in listing.split(' ').filter(|t| !t.is_empty()) {
                let (key, value) = token.split_once('=').unwrap_or((token, ""));
                server.capabilities.insert(key.to_string(), value.to_string());
            }
        }

        // `CAP * LS * :...` announces more lines to come.
        let continued = message.params.len() >= 3 && message.param(2) == Some("*");
        if continued {
            return;
        }

        debug!(
            address = %self.config.address,
            capabilities = self.server.read().capabilities.len(),
            "Capability listing complete"
        );
        self.send(Message::new("CAP").with_params(["END"])).await;
    }

    async fn complete_registration(&self) {
        if self.ready_fired.swap(true, Ordering::SeqCst) {
            return;
        }
        self.set_state(ClientState::Ready);

        let callback = self.callbacks.read().post_init.clone();
        if let Some(callback) = callback {
            callback().await;
        }
    }
}

#[async_trait]
impl InboundHandler for ClientShared {
    async fn on_message(&self, message: Message) {
        self.activity.send_replace(Instant::now());

        match message.command.as_str() {
            "PING" => {
                let token = message.last_param().unwrap_or_default().to_string();
                self.send(Message::pong(token)).await;
            }
            "CAP" => self.handle_cap(&message).await,
            "001" => {
                if let Some(nick) = message.param(0) {
                    self.info.write().nick = nick.to_string();
                }
            }
            "NICK" => {
                let renamed = message.parsed_source().is_some_and(|s| self.is_own_nick(s.nick()));
                if renamed && let Some(nick) = message.last_param() {
                    info!(address = %self.config.address, nick = %nick, "Nick changed");
                    self.info.write().nick = nick.to_string();
                }
            }
            "396" => {
                if let Some(host) = message.param(1) {
                    self.info.write().displayed_host = host.to_string();
                }
            }
            "MODE" => {
                // Only a mode string closing the line is tracked; `MODE #chan +o nick`
                // changes a member's prefix, not the channel.
                let modes = match (message.trailing.as_deref(), message.params.len()) {
                    (Some(trailing), 1) => Some(trailing),
                    (None, 2) => message.param(1),
                    _ => None,
                };
                if let (Some(target), Some(modes)) = (message.param(0), modes) {
                    self.server
                        .write()
                        .modes
                        .entry(target.to_string())
                        .or_default()
                        .apply(modes);
                }
            }
            "376" | "422" => self.complete_registration().await,
            _ => {}
        }

        let callback = self.callbacks.read().message.clone();
        if let Some(callback) = callback {
            callback(message).await;
        }
    }
}

/// Sends periodic pings and closes the session after prolonged silence.
async fn run_keepalive(shared: Arc<ClientShared>, connection: Arc<Connection>) {
    let frequency = shared.config.ping_frequency();
    let timeout = shared.config.ping_timeout();
    let mut activity = shared.activity.subscribe();

    let mut ticker = tokio::time::interval_at(Instant::now() + frequency, frequency);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let deadline = tokio::time::sleep_until(*activity.borrow_and_update() + timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = connection.closed() => {
                debug!(address = %shared.config.address, "Connection closed, stopping keepalive");
                break;
            }
            _ = ticker.tick() => {
                let token = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs()
                    .to_string();
                trace!(address = %shared.config.address, token = %token, "Sending keepalive ping");
                shared.send(Message::ping(token)).await;
            }
            changed = activity.changed() => {
                if changed.is_err() {
                    break;
                }
                let last = *activity.borrow_and_update();
                deadline.as_mut().reset(last + timeout);
            }
            _ = &mut deadline => {
                warn!(address = %shared.config.address, timeout_secs = timeout.as_secs(), "Ping timeout");
                connection.close().await;
                break;
            }
        }
    }

    shared.set_state(ClientState::Closed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
    use tokio::net::tcp::OwnedReadHalf;
    use tokio::net::{TcpListener, TcpStream};

    type ServerLines = Lines<BufReader<OwnedReadHalf>>;

    async fn scripted_server() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        (listener, address)
    }

    async fn accept(listener: &TcpListener) -> (ServerLines, tokio::net::tcp::OwnedWriteHalf) {
        let (socket, _): (TcpStream, _) = listener.accept().await.unwrap();
        let (read, write) = socket.into_split();
        (BufReader::new(read).lines(), write)
    }

    async fn next_line(lines: &mut ServerLines) -> String {
        tokio::time::timeout(Duration::from_secs(5), lines.next_line())
            .await
            .expect("timed out waiting for client line")
            .unwrap()
            .expect("client closed the connection")
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test]
    async fn test_registration_handshake() {
        let (listener, address) = scripted_server().await;
        let config = ClientConfig {
            real_name: "Tern Bot".into(),
            ..ClientConfig::new(address, "tern").with_password("hunter2")
        };
        let client = Client::new(config);

        let post_init = Arc::new(AtomicUsize::new(0));
        let fired = Arc::clone(&post_init);
        client.set_post_init_callback(move || {
            let fired = Arc::clone(&fired);
            async move {
                fired.fetch_add(1, Ordering::SeqCst);
            }
        });

        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        client.set_message_handler(move |message: Message| {
            let seen_tx = seen_tx.clone();
            async move {
                let _ = seen_tx.send(message.command);
            }
        });

        client.connect().await.unwrap();
        assert_eq!(client.state(), ClientState::Registering);

        let (mut lines, mut write) = accept(&listener).await;
        assert_eq!(next_line(&mut lines).await, "CAP LS 302");
        assert_eq!(next_line(&mut lines).await, "PASS hunter2");
        assert_eq!(next_line(&mut lines).await, "NICK tern");
        assert_eq!(next_line(&mut lines).await, "USER tern 0 * :Tern Bot");

        write
            .write_all(b":srv CAP * LS * :multi-prefix\r\n:srv CAP * LS :sasl=PLAIN,EXTERNAL\r\n")
            .await
            .unwrap();
        assert_eq!(next_line(&mut lines).await, "CAP END");

        write
            .write_all(
                b":srv 001 tern_ :Welcome\r\n\
                  :srv 396 tern_ cloak.example :is now your displayed host\r\n\
                  :tern_ MODE tern_ :+iw\r\n\
                  :srv 376 tern_ :End of /MOTD command.\r\n\
                  :srv 422 tern_ :MOTD File is missing\r\n",
            )
            .await
            .unwrap();

        wait_for(|| client.state() == ClientState::Ready).await;
        wait_for(|| seen_rx.try_recv().is_ok_and(|command| command == "422")).await;

        assert_eq!(post_init.load(Ordering::SeqCst), 1);
        assert_eq!(client.nick(), "tern_");
        assert_eq!(client.client_info().displayed_host, "cloak.example");
        let server = client.server_info();
        assert_eq!(server.capabilities["multi-prefix"], "");
        assert_eq!(server.capabilities["sasl"], "PLAIN,EXTERNAL");
        let modes = client.modes("tern_").unwrap();
        assert!(modes.has_mode('i') && modes.has_mode('w'));

        write.write_all(b"PING :abc123\r\n").await.unwrap();
        assert_eq!(next_line(&mut lines).await, "PONG :abc123");

        write.write_all(b":tern_!t@cloak.example NICK :tern\r\n").await.unwrap();
        wait_for(|| client.nick() == "tern").await;

        client.send_message(Message::privmsg("#rust", "hi")).await.unwrap();
        assert_eq!(next_line(&mut lines).await, "PRIVMSG #rust :hi");

        client.close().await;
        assert_eq!(client.state(), ClientState::Closed);
        assert!(matches!(client.connect().await, Err(IrcError::Closed)));
    }

    #[tokio::test]
    async fn test_ping_timeout_closes_session() {
        let (listener, address) = scripted_server().await;
        let config = ClientConfig {
            ping_frequency_secs: 1,
            ping_timeout_secs: 1,
            ..ClientConfig::new(address, "tern")
        };
        let client = Client::new(config);
        client.connect().await.unwrap();

        let (mut lines, _write) = accept(&listener).await;
        assert_eq!(next_line(&mut lines).await, "CAP LS 302");

        // The server never answers: the session times out.
        tokio::time::timeout(Duration::from_secs(5), client.wait())
            .await
            .expect("session did not time out");
        assert_eq!(client.state(), ClientState::Closed);
    }

    #[tokio::test]
    async fn test_answered_pings_keep_session_alive() {
        let (listener, address) = scripted_server().await;
        let config = ClientConfig {
            ping_frequency_secs: 1,
            ping_timeout_secs: 2,
            ..ClientConfig::new(address, "tern")
        };
        let client = Client::new(config);
        client.connect().await.unwrap();

        let (mut lines, mut write) = accept(&listener).await;
        let (pings_tx, mut pings_rx) = mpsc::unbounded_channel();
        let server = tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(token) = line.strip_prefix("PING :") {
                    let _ = pings_tx.send(token.to_string());
                    let pong = format!(":srv PONG srv :{token}\r\n");
                    if write.write_all(pong.as_bytes()).await.is_err() {
                        break;
                    }
                }
            }
        });

        // Well past the timeout: only the answered pings keep the session up.
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_ne!(client.state(), ClientState::Closed);

        let mut tokens = Vec::new();
        while let Ok(token) = pings_rx.try_recv() {
            tokens.push(token);
        }
        assert!(tokens.len() >= 2, "expected periodic pings, got {tokens:?}");
        assert!(tokens.iter().all(|t| t.parse::<u64>().is_ok()));

        client.close().await;
        assert_eq!(client.state(), ClientState::Closed);
        server.abort();
    }

    #[tokio::test]
    async fn test_mode_with_arguments_is_not_tracked() {
        let (listener, address) = scripted_server().await;
        let client = Client::new(ClientConfig::new(address, "tern"));
        client.connect().await.unwrap();

        let (_lines, mut write) = accept(&listener).await;
        write
            .write_all(
                b":op MODE #rust +o tern\r\n\
                  :op MODE #rust :+nt\r\n\
                  :tern MODE tern +i\r\n",
            )
            .await
            .unwrap();

        wait_for(|| client.modes("tern").is_some()).await;
        let channel = client.modes("#rust").unwrap();
        assert!(channel.has_mode('n') && channel.has_mode('t'));
        assert!(!channel.has_mode('o'));
        assert!(client.modes("tern").unwrap().has_mode('i'));

        client.close().await;
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_on_connect() {
        let mut config = ClientConfig::new("127.0.0.1:1", "tern");
        config.rate_limit.target_max_tokens = 0;
        let client = Client::new(config);

        assert!(matches!(client.connect().await, Err(IrcError::InvalidConfig(_))));
        assert_eq!(client.state(), ClientState::Closed);
    }

    #[tokio::test]
    async fn test_failed_registration_burst_marks_closed() {
        let (listener, address) = scripted_server().await;
        let mut config = ClientConfig::new(address, "tern").with_password("hunter2");
        // One queued line and a throttled writer: the burst cannot finish
        // before the peer goes away.
        config.outgoing_capacity = 1;
        config.rate_limit.mode = tern_ratelimit::EnforcementMode::Throttle;
        config.rate_limit.global_max_tokens = 1;
        config.rate_limit.global_ms_per_token = 60_000;
        let client = Client::new(config);

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let result = tokio::time::timeout(Duration::from_secs(5), client.connect())
            .await
            .expect("connect hung on a closed peer");
        assert!(matches!(result, Err(IrcError::Closed)));
        assert_eq!(client.state(), ClientState::Closed);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_server_disconnect_closes_session() {
        let (listener, address) = scripted_server().await;
        let client = Client::new(ClientConfig::new(address, "tern"));
        client.connect().await.unwrap();

        let (lines, write) = accept(&listener).await;
        drop((lines, write));

        tokio::time::timeout(Duration::from_secs(5), client.wait())
            .await
            .expect("session did not end");
        assert_eq!(client.state(), ClientState::Closed);
    }

    #[tokio::test]
    async fn test_connect_failure_marks_closed() {
        let (listener, address) = scripted_server().await;
        drop(listener);
        let client = Client::new(ClientConfig::new(address, "tern"));
        assert!(client.connect().await.is_err());
        assert_eq!(client.state(), ClientState::Closed);
    }
}
