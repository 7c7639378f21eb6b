use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::display::{DisplayEvent, StreamDisplay};
use super::machine::{Effect, Event, StreamMachine};
use crate::stream::CacheBuster;
use crate::view::SharedView;

/// User actions forwarded to the watchdog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogCommand {
    ManualRetry,
    Visibility(bool),
}

#[derive(Debug, Error)]
#[error("video watchdog is not running")]
pub struct WatchdogClosed;

/// Cloneable handle for sending commands to a running watchdog
#[derive(Debug, Clone)]
pub struct WatchdogHandle {
    commands: mpsc::Sender<WatchdogCommand>,
}

impl WatchdogHandle {
    pub(crate) fn from_sender(commands: mpsc::Sender<WatchdogCommand>) -> Self {
        Self { commands }
    }

    pub async fn manual_retry(&self) -> Result<(), WatchdogClosed> {
        self.send(WatchdogCommand::ManualRetry).await
    }

    pub async fn set_visibility(&self, visible: bool) -> Result<(), WatchdogClosed> {
        self.send(WatchdogCommand::Visibility(visible)).await
    }

    async fn send(&self, command: WatchdogCommand) -> Result<(), WatchdogClosed> {
        self.commands.send(command).await.map_err(|_| WatchdogClosed)
    }
}

/// Drives a `StreamMachine` against a display.
///
/// The machine state lives inside this task only. Display outcomes, the
/// health ticker, the backoff timer and user commands are all serialized
/// through one `select!` loop.
pub struct StreamWatchdog<D: StreamDisplay> {
    machine: StreamMachine,
    display: D,
    display_events: mpsc::Receiver<DisplayEvent>,
    commands: mpsc::Receiver<WatchdogCommand>,
    view: SharedView,
    cache_buster: CacheBuster,
    health_interval: Duration,
    retry_sleep: Pin<Box<Sleep>>,
    retry_armed: bool,
}

impl<D: StreamDisplay> StreamWatchdog<D> {
    pub fn new(
        machine: StreamMachine,
        display: D,
        display_events: mpsc::Receiver<DisplayEvent>,
        view: SharedView,
        health_interval: Duration,
    ) -> (Self, WatchdogHandle) {
        let (command_tx, commands) = mpsc::channel(16);
        let watchdog = Self {
            machine,
            display,
            display_events,
            commands,
            view,
            cache_buster: CacheBuster::new(),
            health_interval,
            retry_sleep: Box::pin(tokio::time::sleep(Duration::ZERO)),
            retry_armed: false,
        };
        (watchdog, WatchdogHandle::from_sender(command_tx))
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!("🎥 Starting video watchdog for lot {}", self.machine.lot());

        let mut health = tokio::time::interval_at(Instant::now() + self.health_interval, self.health_interval);
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let token = self.cache_buster.next_token();
        self.dispatch(Event::Start { token }).await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                _ = health.tick() => {
                    let stalled = self.display.snapshot().is_stalled();
                    if stalled {
                        debug!("Health check: display loaded but empty");
                    }
                    self.dispatch(Event::HealthCheck { stalled }).await;
                }

                _ = &mut self.retry_sleep, if self.retry_armed => {
                    self.retry_armed = false;
                    let token = self.cache_buster.next_token();
                    self.dispatch(Event::RetryDue { token }).await;
                }

                Some(event) = self.display_events.recv() => {
                    let event = match event {
                        DisplayEvent::Loaded { generation, width, height } => {
                            Event::Loaded { generation, width, height }
                        }
                        DisplayEvent::Failed { generation, reason } => {
                            debug!("Display reported failure: {}", reason);
                            Event::LoadFailed { generation }
                        }
                    };
                    self.dispatch(event).await;
                }

                Some(command) = self.commands.recv() => {
                    let token = self.cache_buster.next_token();
                    let event = match command {
                        WatchdogCommand::ManualRetry => Event::ManualRetry { token },
                        WatchdogCommand::Visibility(visible) => Event::VisibilityChanged {
                            visible,
                            stalled: self.display.snapshot().is_stalled(),
                            token,
                        },
                    };
                    self.dispatch(event).await;
                }
            }
        }

        self.retry_armed = false;
        self.display.clear();
        info!("🛑 Video watchdog stopped for lot {}", self.machine.lot());
    }

    async fn dispatch(&mut self, event: Event) {
        let effects = self.machine.handle(event);
        if effects.is_empty() {
            return;
        }

        for effect in &effects {
            match effect {
                Effect::AssignSource { url, generation } => {
                    debug!("Assigning stream source {} (generation {})", url, generation);
                    self.display.set_source(url.clone(), *generation);
                }
                Effect::ScheduleRetry { attempt, delay } => {
                    if self.retry_armed {
                        warn!("Retry {} requested while another is pending, replacing it", attempt);
                    }
                    self.retry_sleep.as_mut().reset(Instant::now() + *delay);
                    self.retry_armed = true;
                }
                Effect::ShowDisplay => self.display.set_visible(true),
                Effect::HideDisplay => self.display.set_visible(false),
                _ => {}
            }
        }

        let mut view = self.view.write().await;
        if let Some(details) = view.details.as_mut() {
            for effect in &effects {
                details.stream.apply(effect);
            }
            details.stream.sync(self.machine.state());
        }
    }
}
