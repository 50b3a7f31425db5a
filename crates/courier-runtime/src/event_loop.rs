//! Event loop
//!
//! [`EventLoop`] spawns a single driver task that owns the client handle and
//! the [`BotContext`]. Each iteration it rebuilds the client if the session
//! was invalidated, makes sure the connection parameters went out, drains
//! producer commands, polls the client with a bounded timeout, dispatches what
//! arrived and transmits every request queued along the way.
//!
//! Stopping clears a shared flag and joins the driver; an in-flight poll
//! returns within one poll timeout. Handlers still pending at that point are
//! dropped without being called.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use courier_core::{
    BotConfig, ClientError, ClientFactory, CourierError, CourierResult, MessagingClient,
    RequestCorrelator, SystemTimeSource,
};

use crate::context::{BotContext, BotStats, SharedTimeSource};
use crate::dispatch::dispatch;
use crate::handle::{create_command_channel, BotHandle, Command, CommandReceiver};
use crate::responder::Responder;

/// Empty polls between two idle heartbeat records
const HEARTBEAT_INTERVAL: u64 = 10;

// ----------------------------------------------------------------------------
// Event Loop
// ----------------------------------------------------------------------------

pub struct EventLoop<F: ClientFactory> {
    config: BotConfig,
    factory: Option<F>,
    responder: Option<Box<dyn Responder>>,
    time_source: SharedTimeSource,
    running: Arc<AtomicBool>,
    driver: Option<JoinHandle<CourierResult<()>>>,
    handle: Option<BotHandle>,
    stats: watch::Receiver<BotStats>,
    stats_sender: Option<watch::Sender<BotStats>>,
}

impl<F> EventLoop<F>
where
    F: ClientFactory + 'static,
{
    /// Create a stopped loop; the configuration is validated here
    pub fn new(config: BotConfig, factory: F) -> CourierResult<Self> {
        config.validate()?;
        let (stats_sender, stats) = watch::channel(BotStats::default());

        Ok(Self {
            config,
            factory: Some(factory),
            responder: None,
            time_source: Arc::new(SystemTimeSource),
            running: Arc::new(AtomicBool::new(false)),
            driver: None,
            handle: None,
            stats,
            stats_sender: Some(stats_sender),
        })
    }

    pub fn with_responder<R: Responder + 'static>(mut self, responder: R) -> Self {
        self.responder = Some(Box::new(responder));
        self
    }

    pub fn with_time_source(mut self, time_source: SharedTimeSource) -> Self {
        self.time_source = time_source;
        self
    }

    /// Spawn the driver task and return a handle for producers
    pub fn start(&mut self) -> CourierResult<BotHandle> {
        if self.is_running() {
            return Err(CourierError::config_error("event loop already running"));
        }
        let (Some(mut factory), Some(stats_sender)) = (self.factory.take(), self.stats_sender.take())
        else {
            return Err(CourierError::config_error("event loop cannot be restarted after stop"));
        };

        let mut ctx = BotContext::new(&self.config, Arc::clone(&self.time_source))?;
        if let Some(responder) = self.responder.take() {
            ctx.set_responder(responder);
        }
        let client = factory.create()?;
        let (command_sender, commands) = create_command_channel(self.config.runtime.command_buffer_size);

        let driver = Driver {
            factory,
            client: Some(client),
            ctx,
            commands,
            stats: stats_sender,
            running: Arc::clone(&self.running),
            poll_timeout: self.config.runtime.poll_timeout(),
            idle_polls: 0,
        };

        self.running.store(true, Ordering::SeqCst);
        self.driver = Some(tokio::spawn(driver.run()));

        let handle = BotHandle::new(command_sender);
        self.handle = Some(handle.clone());
        info!(
            poll_timeout_ms = self.config.runtime.poll_timeout_ms,
            policy = ?self.config.runtime.restart_policy,
            "event loop started"
        );
        Ok(handle)
    }

    /// Clear the running flag and wait for the driver to finish its iteration
    pub async fn stop(&mut self) -> CourierResult<()> {
        self.running.store(false, Ordering::SeqCst);
        self.handle = None;

        let Some(driver) = self.driver.take() else {
            return Ok(());
        };
        match driver.await {
            Ok(result) => result,
            Err(join_error) => Err(CourierError::channel_error(format!(
                "event loop task failed: {join_error}"
            ))),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && self.driver.is_some()
    }

    pub fn handle(&self) -> Option<BotHandle> {
        self.handle.clone()
    }

    /// Latest snapshot published by the driver
    pub fn stats(&self) -> BotStats {
        self.stats.borrow().clone()
    }

    /// Receiver notified on every published snapshot
    pub fn subscribe_stats(&self) -> watch::Receiver<BotStats> {
        self.stats.clone()
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }
}

// ----------------------------------------------------------------------------
// Driver Task
// ----------------------------------------------------------------------------

struct Driver<F: ClientFactory> {
    factory: F,
    client: Option<F::Client>,
    ctx: BotContext,
    commands: CommandReceiver,
    stats: watch::Sender<BotStats>,
    running: Arc<AtomicBool>,
    poll_timeout: Duration,
    idle_polls: u64,
}

impl<F: ClientFactory> Driver<F> {
    async fn run(mut self) -> CourierResult<()> {
        debug!("driver task starting");

        while self.running.load(Ordering::SeqCst) {
            self.iterate().await;
        }

        let dropped = self.ctx.stats().pending_requests;
        info!(dropped_handlers = dropped, "event loop stopped");
        Ok(())
    }

    async fn iterate(&mut self) {
        if self.ctx.needs_restart() || self.client.is_none() {
            self.restart_client();
        }
        if self.client.is_some() {
            self.ctx.ensure_parameters_sent();
        }
        self.drain_commands();
        self.transmit();

        let Some(client) = self.client.as_mut() else {
            // Creation failed; back off one poll interval before retrying.
            self.stats.send_replace(self.ctx.stats());
            tokio::time::sleep(self.poll_timeout).await;
            return;
        };

        match client.poll(self.poll_timeout).await {
            Ok(Some(incoming)) => {
                self.idle_polls = 0;
                dispatch(&mut self.ctx, incoming);
            }
            Ok(None) => {
                self.idle_polls += 1;
                if self.idle_polls % HEARTBEAT_INTERVAL == 0 {
                    debug!(
                        authorized = self.ctx.auth().is_authorized(),
                        idle_polls = self.idle_polls,
                        "waiting for updates"
                    );
                }
            }
            Err(error) => {
                warn!(%error, "poll failed");
                if error.requires_restart() {
                    self.ctx.auth.force_restart();
                } else {
                    tokio::time::sleep(self.poll_timeout).await;
                }
            }
        }

        self.transmit();
        self.stats.send_replace(self.ctx.stats());
    }

    fn restart_client(&mut self) {
        let created = match self.client.take() {
            Some(old) => {
                info!(client = old.name(), "recreating client");
                self.factory.recreate(old)
            }
            None => self.factory.create(),
        };

        match created {
            Ok(client) => {
                self.client = Some(client);
                self.ctx.after_restart();
            }
            Err(error) => {
                error!(%error, "client creation failed");
            }
        }
    }

    fn drain_commands(&mut self) {
        loop {
            let command = match self.commands.try_recv() {
                Ok(command) => command,
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => break,
            };

            match command {
                Command::Send { request, reply } => {
                    let id = self.ctx.send(request);
                    let _ = reply.send(id);
                }
                Command::Call { request, reply } => {
                    self.ctx.send_with(request, move |_, result| {
                        let _ = reply.send(result);
                    });
                }
                Command::Status { reply } => {
                    let _ = reply.send(self.ctx.stats());
                }
                Command::Restart => {
                    info!("restart requested");
                    self.ctx.auth.force_restart();
                }
            }
        }
    }

    /// Hand every queued request to the client, in queue order
    fn transmit(&mut self) {
        let queued = self.ctx.correlator.drain_outbox();
        if queued.is_empty() {
            return;
        }

        for outbound in queued {
            let id = outbound.id;
            let kind = outbound.request.kind();
            let result = match self.client.as_mut() {
                Some(client) => client.send(outbound),
                None => Err(CourierError::transport("no client handle")),
            };

            if let Err(error) = result {
                warn!(request_id = id.value(), kind, %error, "request not transmitted");
                RequestCorrelator::resolve(
                    &mut self.ctx,
                    id,
                    Err(ClientError::transmit_failed(error.to_string())),
                );
            }
        }
    }
}
