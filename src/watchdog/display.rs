use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::mjpeg::{jpeg_dimensions, FrameScanner};

/// What the display element currently shows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DisplaySnapshot {
    /// The element finished (or gave up) loading its source
    pub complete: bool,
    pub natural_width: u32,
    pub natural_height: u32,
    pub visible: bool,
}

impl DisplaySnapshot {
    /// Loaded, but nothing to show
    pub fn is_stalled(&self) -> bool {
        self.complete && self.natural_width == 0
    }
}

/// Load outcome reported back for a source assignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayEvent {
    Loaded { generation: u64, width: u32, height: u32 },
    Failed { generation: u64, reason: String },
}

/// Surface that renders the video stream.
///
/// Assigning a source starts loading it in the background; the outcome is
/// delivered later as a `DisplayEvent` tagged with the same generation.
pub trait StreamDisplay: Send {
    fn set_source(&mut self, url: Url, generation: u64);
    fn snapshot(&self) -> DisplaySnapshot;
    fn set_visible(&mut self, visible: bool);
    /// Stop loading and drop the current source
    fn clear(&mut self);
}

/// Display backed by an HTTP MJPEG stream
pub struct HttpStreamDisplay {
    http: reqwest::Client,
    events: mpsc::Sender<DisplayEvent>,
    first_frame_timeout: Duration,
    state: Arc<watch::Sender<DisplaySnapshot>>,
    loader: Option<JoinHandle<()>>,
}

impl HttpStreamDisplay {
    pub fn new(
        events: mpsc::Sender<DisplayEvent>,
        connect_timeout: Duration,
        first_frame_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        // No overall request timeout: the stream body never ends on its own
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        let (state, _) = watch::channel(DisplaySnapshot { visible: true, ..Default::default() });
        Ok(Self {
            http,
            events,
            first_frame_timeout,
            state: Arc::new(state),
            loader: None,
        })
    }

    fn stop_loader(&mut self) {
        if let Some(loader) = self.loader.take() {
            loader.abort();
        }
    }
}

impl StreamDisplay for HttpStreamDisplay {
    fn set_source(&mut self, url: Url, generation: u64) {
        self.stop_loader();
        self.state.send_modify(|s| {
            s.complete = false;
            s.natural_width = 0;
            s.natural_height = 0;
        });

        let loader = StreamLoader {
            http: self.http.clone(),
            url,
            generation,
            first_frame_timeout: self.first_frame_timeout,
            state: self.state.clone(),
            events: self.events.clone(),
        };
        self.loader = Some(tokio::spawn(loader.run()));
    }

    fn snapshot(&self) -> DisplaySnapshot {
        *self.state.borrow()
    }

    fn set_visible(&mut self, visible: bool) {
        self.state.send_modify(|s| s.visible = visible);
    }

    fn clear(&mut self) {
        self.stop_loader();
        self.state.send_modify(|s| {
            s.complete = false;
            s.natural_width = 0;
            s.natural_height = 0;
        });
    }
}

impl Drop for HttpStreamDisplay {
    fn drop(&mut self) {
        self.stop_loader();
    }
}

struct StreamLoader {
    http: reqwest::Client,
    url: Url,
    generation: u64,
    first_frame_timeout: Duration,
    state: Arc<watch::Sender<DisplaySnapshot>>,
    events: mpsc::Sender<DisplayEvent>,
}

impl StreamLoader {
    async fn run(self) {
        let deadline = Instant::now() + self.first_frame_timeout;
        debug!("📺 Loading video stream {}", self.url);

        let mut response = match tokio::time::timeout_at(deadline, self.http.get(self.url.clone()).send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return self.fail(format!("request failed: {}", e)).await,
            Err(_) => return self.fail("timed out waiting for response".to_string()).await,
        };

        let status = response.status();
        if !status.is_success() {
            return self.fail(format!("HTTP {}", status)).await;
        }

        let mut scanner = FrameScanner::new();
        let mut frames: u64 = 0;
        loop {
            let chunk = if frames == 0 {
                match tokio::time::timeout_at(deadline, response.chunk()).await {
                    Ok(chunk) => chunk,
                    Err(_) => return self.fail("no frame received in time".to_string()).await,
                }
            } else {
                response.chunk().await
            };

            match chunk {
                Ok(Some(bytes)) => {
                    scanner.push(&bytes);
                    while let Some(frame) = scanner.next_frame() {
                        let (width, height) = match jpeg_dimensions(&frame) {
                            Ok(dimensions) => dimensions,
                            Err(e) => {
                                debug!("Skipping undecodable frame ({} bytes): {}", frame.len(), e);
                                continue;
                            }
                        };
                        frames += 1;
                        self.state.send_modify(|s| {
                            s.complete = true;
                            s.natural_width = width;
                            s.natural_height = height;
                        });
                        if frames == 1 {
                            self.report(DisplayEvent::Loaded { generation: self.generation, width, height }).await;
                        }
                    }
                }
                Ok(None) if frames == 0 => {
                    info!("📭 Video stream ended before the first frame");
                    self.mark_empty();
                    self.report(DisplayEvent::Loaded { generation: self.generation, width: 0, height: 0 }).await;
                    return;
                }
                Ok(None) => {
                    // No error event: the health monitor picks this up
                    warn!("📴 Video stream closed after {} frames ({} bytes unparsed)", frames, scanner.buffered());
                    self.mark_empty();
                    return;
                }
                Err(e) if frames == 0 => return self.fail(format!("stream read failed: {}", e)).await,
                Err(e) => {
                    warn!("📴 Video stream dropped after {} frames: {}", frames, e);
                    self.mark_empty();
                    return;
                }
            }
        }
    }

    fn mark_empty(&self) {
        self.state.send_modify(|s| {
            s.complete = true;
            s.natural_width = 0;
            s.natural_height = 0;
        });
    }

    async fn fail(&self, reason: String) {
        warn!("❌ Video stream load failed: {}", reason);
        self.mark_empty();
        self.report(DisplayEvent::Failed { generation: self.generation, reason }).await;
    }

    async fn report(&self, event: DisplayEvent) {
        if self.events.send(event).await.is_err() {
            debug!("Display event dropped, watchdog is gone");
        }
    }
}
