use chrono::{DateTime, Local, TimeZone};
use std::fmt::Display;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::view::SharedView;

/// e.g. `Monday, October 19, 2026 at 02:03:04 PM`
pub fn format_datetime<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    now.format("%A, %B %-d, %Y at %I:%M:%S %p").to_string()
}

/// Refresh the page's date/time line until cancelled
pub async fn run_clock(view: SharedView, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let text = format_datetime(&Local::now());
                view.write().await.datetime = text;
            }
        }
    }
}
