//! Runtime orchestration.
//!
//! [`TernRuntime`] owns the application context, starts the bus dispatcher,
//! registers the configured platforms and tears everything down on shutdown.
//!
//! ```rust,ignore
//! use tern_runtime::TernRuntime;
//!
//! let runtime = TernRuntime::builder().config_file("tern.toml").build()?;
//! runtime.register_module(Arc::new(MyModule)).await?;
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::join_all;
use tern_adapter_irc::{IrcNetworkConfig, IrcPlatform};
use tern_adapter_terminal::TerminalPlatform;
use tern_core::{AppContext, BoxedModule, Bus, Module};
use tokio::signal;
use tracing::{error, info, warn};

use crate::config::{ConfigLoader, ConfigResult, TernConfig};
use crate::error::RuntimeResult;
use crate::logging;

/// The Tern runtime.
pub struct TernRuntime {
    config: TernConfig,
    context: AppContext,
    running: AtomicBool,
}

impl TernRuntime {
    /// Creates a runtime from the default config locations.
    ///
    /// Falls back to the built-in defaults when loading fails.
    pub fn new() -> Self {
        let config = ConfigLoader::new().load().unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load config ({e}), using defaults");
            TernConfig::default()
        });

        Self::from_config(&config)
    }

    /// Creates a runtime builder for custom configuration.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from configuration and initializes logging.
    pub fn from_config(config: &TernConfig) -> Self {
        logging::init_from_config(&config.logging);

        info!(
            log_level = %config.logging.level,
            log_format = ?config.logging.format,
            bus_capacity = config.bus.queue_capacity,
            "Runtime initialized from configuration"
        );

        let bus = Bus::with_capacity(config.bus.queue_capacity);
        Self::with_context(config.clone(), AppContext::new(bus))
    }

    /// Creates a runtime around an existing context. Logging is left alone.
    pub fn with_context(config: TernConfig, context: AppContext) -> Self {
        Self {
            config,
            context,
            running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &TernConfig {
        &self.config
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub fn bus(&self) -> &Bus {
        self.context.bus()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Registers a feature module. Allowed before and after [`TernRuntime::start`].
    pub async fn register_module(&self, module: BoxedModule) -> RuntimeResult<()> {
        self.bus().register(module).await?;
        Ok(())
    }

    /// Starts the dispatcher and the configured platforms.
    ///
    /// An IRC network that cannot connect is logged and unregistered; the
    /// rest of the runtime keeps going.
    pub async fn start(&self) -> RuntimeResult<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("Runtime is already running");
            return Ok(());
        }

        info!("Starting Tern runtime");
        self.bus().start()?;

        if let Some(terminal) = &self.config.terminal {
            let platform = Arc::new(TerminalPlatform::from_config(terminal));
            self.bus().register(platform).await?;
        }

        join_all(self.config.irc.iter().map(|network| self.start_irc_network(network))).await;

        let modules = self.bus().modules().await.len();
        info!(modules, "Runtime started");
        Ok(())
    }

    async fn start_irc_network(&self, network: &IrcNetworkConfig) {
        let platform = Arc::new(IrcPlatform::from_config(network));
        let ident = platform.identifier();

        // Registered first so the post-registration callback can reach the bus.
        if let Err(e) = self.bus().register(platform.clone()).await {
            error!(module = %ident, error = %e, "Failed to register IRC platform");
            return;
        }

        match platform.connect().await {
            Ok(()) => {
                info!(module = %ident, address = %network.client.address, "IRC network connected");
            }
            Err(e) => {
                warn!(
                    module = %ident,
                    address = %network.client.address,
                    error = %e,
                    "Failed to connect IRC network"
                );
                self.bus().unregister(&ident).await;
            }
        }
    }

    /// Stops the bus, unregistering every module.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            warn!("Runtime is not running");
        }

        info!("Stopping Tern runtime");
        self.context.request_shutdown();
        self.bus().stop().await;
        info!("Runtime stopped");
    }

    /// Runs until Ctrl+C, SIGTERM or [`AppContext::request_shutdown`].
    pub async fn run(&self) -> RuntimeResult<()> {
        self.start().await?;

        info!("Tern runtime is now running. Press Ctrl+C to stop.");
        let outcome = self.wait_for_shutdown().await;

        self.stop().await;
        outcome
    }

    /// Runs until `shutdown` resolves or shutdown is requested through the context.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;

        tokio::select! {
            _ = shutdown => {}
            _ = self.context.shutdown_requested() => {
                info!("Shutdown requested");
            }
        }

        self.stop().await;
        Ok(())
    }

    async fn wait_for_shutdown(&self) -> RuntimeResult<()> {
        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

            tokio::select! {
                result = signal::ctrl_c() => {
                    result?;
                    info!("Received Ctrl+C, shutting down");
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down");
                }
                _ = self.context.shutdown_requested() => {
                    info!("Shutdown requested");
                }
            }
        }

        #[cfg(not(unix))]
        {
            tokio::select! {
                result = signal::ctrl_c() => {
                    result?;
                    info!("Received Ctrl+C, shutting down");
                }
                _ = self.context.shutdown_requested() => {
                    info!("Shutdown requested");
                }
            }
        }

        Ok(())
    }
}

impl Default for TernRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for a [`TernRuntime`] with custom configuration sources.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
        }
    }

    /// Loads this file instead of searching.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges a programmatic base configuration.
    pub fn merge(mut self, config: TernConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    pub fn build(self) -> ConfigResult<TernRuntime> {
        let config = self.config_loader.load()?;
        Ok(TernRuntime::from_config(&config))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use parking_lot::Mutex;
    use tern_adapter_terminal::TerminalConfig;
    use tern_core::{BusMessage, IncomingChat, ModuleIdentifier, PlainText, async_trait};
    use tern_irc::ClientConfig;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Module for Recorder {
        fn identifier(&self) -> ModuleIdentifier {
            ModuleIdentifier::new("Module", "Recorder")
        }

        async fn on_message(&self, message: &BusMessage) -> anyhow::Result<()> {
            if let BusMessage::IncomingChat(chat) = message {
                self.seen.lock().push(chat.text.plain_text());
            }
            Ok(())
        }
    }

    fn runtime(config: TernConfig) -> TernRuntime {
        let bus = Bus::with_capacity(config.bus.queue_capacity);
        TernRuntime::with_context(config, AppContext::new(bus))
    }

    fn network(sub: &str, address: String) -> IrcNetworkConfig {
        IrcNetworkConfig::new(sub, ClientConfig::new(address, "tern"))
    }

    #[tokio::test]
    async fn test_run_until_stops_bus() {
        let runtime = runtime(TernConfig::default());
        runtime.run_until(async {}).await.unwrap();

        assert!(!runtime.is_running());
        assert!(runtime.bus().is_stopped());
        assert!(runtime.context().shutdown_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_custom_module_receives_chat() {
        let runtime = runtime(TernConfig::default());
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        runtime.register_module(recorder.clone()).await.unwrap();
        runtime.start().await.unwrap();

        runtime
            .bus()
            .publish(IncomingChat {
                source: ModuleIdentifier::new("Terminal", "std"),
                sender: "Terminal:std:console".into(),
                reply_to: "console".into(),
                text: PlainText::shared("hello"),
            })
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while recorder.seen.lock().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(*recorder.seen.lock(), vec!["hello".to_string()]);

        runtime.stop().await;
        assert!(!runtime.bus().is_registered(&recorder.identifier()).await);
    }

    #[tokio::test]
    async fn test_terminal_platform_registered() {
        let runtime = runtime(TernConfig {
            terminal: Some(TerminalConfig::default()),
            ..Default::default()
        });
        runtime.start().await.unwrap();

        let terminal = ModuleIdentifier::new("Terminal", "std");
        assert!(runtime.bus().is_registered(&terminal).await);

        runtime.stop().await;
    }

    #[tokio::test]
    async fn test_unreachable_network_is_unregistered() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let runtime = runtime(TernConfig {
            irc: vec![network("down", address)],
            ..Default::default()
        });
        runtime.start().await.unwrap();

        assert!(!runtime.bus().is_registered(&ModuleIdentifier::new("IRC", "down")).await);
        assert!(runtime.is_running());

        runtime.stop().await;
    }

    #[tokio::test]
    async fn test_network_connects_and_registers() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let runtime = runtime(TernConfig {
            irc: vec![network("up", address)],
            ..Default::default()
        });

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut lines = BufReader::new(socket).lines();
            lines.next_line().await.unwrap()
        });

        runtime.start().await.unwrap();
        assert!(runtime.bus().is_registered(&ModuleIdentifier::new("IRC", "up")).await);

        let first = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.as_deref(), Some("CAP LS 302"));

        runtime.stop().await;
        assert!(runtime.bus().modules().await.is_empty());
    }

    #[tokio::test]
    async fn test_context_shutdown_ends_run() {
        let runtime = Arc::new(runtime(TernConfig::default()));

        let task = tokio::spawn({
            let runtime = runtime.clone();
            async move { runtime.run_until(futures::future::pending()).await }
        });

        tokio::time::timeout(Duration::from_secs(5), async {
            while !runtime.is_running() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        runtime.context().request_shutdown();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(runtime.bus().is_stopped());
    }
}
