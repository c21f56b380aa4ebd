use log::debug;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::FeedbackConfig;
use crate::surface::{Slot, Toast, ToastKind, UiSurface};

/// Drives the loading overlay, the error region and toast notifications.
///
/// Every timer it starts hangs off one shutdown token, so [`Feedback::shutdown`]
/// leaves nothing running.
pub struct Feedback {
    surface: Arc<dyn UiSurface>,
    settings: FeedbackConfig,
    shutdown: CancellationToken,
    pending_hide: Mutex<Option<CancellationToken>>,
    next_toast_id: AtomicU64,
}

impl Feedback {
    pub fn new(surface: Arc<dyn UiSurface>, settings: FeedbackConfig) -> Self {
        Self {
            surface,
            settings,
            shutdown: CancellationToken::new(),
            pending_hide: Mutex::new(None),
            next_toast_id: AtomicU64::new(1),
        }
    }

    /// Shows the overlay and starts the phase timer. The returned guard ends
    /// the loading state exactly once, either through `finish` or on drop.
    pub fn begin_loading(self: &Arc<Self>) -> LoadingGuard {
        // a completion hide still pending from the last upload must not close this overlay
        if let Some(token) = self.pending_hide.lock().take() {
            token.cancel();
        }

        let first_label = self.settings.phases.first().cloned().unwrap_or_default();
        self.surface.show_loading(&first_label);

        let phase_timer = if self.settings.phased_progress {
            let token = self.shutdown.child_token();
            let surface = Arc::clone(&self.surface);
            let phases = self.settings.phases.clone();
            let every = self.settings.phase_interval();
            let cancel = token.clone();
            spawn_timer(async move { run_phases(surface, phases, every, cancel).await });
            Some(token)
        } else {
            None
        };

        LoadingGuard {
            feedback: Arc::clone(self),
            phase_timer,
            finished: false,
        }
    }

    pub fn show_error(&self, message: &str) {
        log::error!("{}", message);
        self.surface.set_error(message);
        self.surface.scroll_into_view(Slot::Error);
    }

    pub fn clear_error(&self) {
        self.surface.clear_error();
    }

    /// Adds a toast that hides itself after the display duration and is
    /// removed once the exit animation has had time to play.
    pub fn show_toast(&self, message: &str, kind: ToastKind) -> u64 {
        let id = self.next_toast_id.fetch_add(1, Ordering::Relaxed);
        self.surface.add_toast(Toast {
            id,
            message: message.to_string(),
            kind,
            visible: false,
        });
        self.surface.set_toast_visible(id, true);

        let surface = Arc::clone(&self.surface);
        let token = self.shutdown.child_token();
        let (shown_for, exit) = (self.settings.toast_duration(), self.settings.toast_exit());
        spawn_timer(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    surface.remove_toast(id);
                    return;
                }
                _ = sleep(shown_for) => {}
            }
            surface.set_toast_visible(id, false);
            tokio::select! {
                _ = token.cancelled() => {}
                _ = sleep(exit) => {}
            }
            surface.remove_toast(id);
        });
        id
    }

    /// Cancels every phase, hide and toast timer.
    pub fn shutdown(&self) {
        debug!("Cancelling feedback timers");
        self.shutdown.cancel();
    }

    fn settle(&self, success: bool) {
        if success && self.settings.phased_progress {
            self.surface.complete_loading(&self.settings.completion_label);

            let token = self.shutdown.child_token();
            *self.pending_hide.lock() = Some(token.clone());
            let surface = Arc::clone(&self.surface);
            let delay = self.settings.completion_hide();
            spawn_timer(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = sleep(delay) => surface.hide_loading(),
                }
            });
        } else {
            self.surface.hide_loading();
        }
    }
}

pub struct LoadingGuard {
    feedback: Arc<Feedback>,
    phase_timer: Option<CancellationToken>,
    finished: bool,
}

impl LoadingGuard {
    pub fn finish(mut self, success: bool) {
        self.end(success);
    }

    fn end(&mut self, success: bool) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Some(timer) = self.phase_timer.take() {
            timer.cancel();
        }
        self.feedback.settle(success);
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.end(false);
    }
}

async fn run_phases(
    surface: Arc<dyn UiSurface>,
    phases: Vec<String>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + every, every);
    let total = phases.len() as f32;
    for (index, label) in phases.iter().enumerate() {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let progress = (index + 1) as f32 * (100.0 / total);
        debug!("Loading phase {}: {}", index + 1, label);
        surface.set_loading_phase(label, progress);
    }
}

fn spawn_timer<F>(timer: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(timer);
        }
        Err(_) => log::warn!("No async runtime available, timer skipped"),
    }
}
