use image::RgbaImage;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// Named regions of the window the controller writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Result,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub id: u64,
    pub message: String,
    pub kind: ToastKind,
    pub visible: bool,
}

/// What the result slot shows after a successful transformation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultView {
    /// Encoded image bytes as returned by the service
    pub image: Vec<u8>,
    pub description: Option<String>,
    pub toy_description: Option<String>,
    pub main_object: Option<String>,
    pub detected_objects: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadingView {
    pub overlay_visible: bool,
    pub spinner_visible: bool,
    pub checkmark_visible: bool,
    pub progress_percent: f32,
    pub phase_label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoView {
    pub label: String,
    pub width: u32,
    pub height: u32,
}

/// The injected rendering surface.
///
/// Implementations only store what they are told; all decisions live in the
/// controller so it can run against [`SharedSurface`] in tests.
pub trait UiSurface: Send + Sync {
    fn bind_video(&self, video: VideoView);
    fn hide_video(&self);

    fn show_preview(&self, image: RgbaImage);

    fn show_result(&self, result: ResultView);

    fn set_error(&self, message: &str);
    fn clear_error(&self);

    fn show_loading(&self, phase_label: &str);
    fn set_loading_phase(&self, phase_label: &str, progress_percent: f32);
    fn complete_loading(&self, label: &str);
    fn hide_loading(&self);

    fn add_toast(&self, toast: Toast);
    fn set_toast_visible(&self, id: u64, visible: bool);
    fn remove_toast(&self, id: u64);

    fn scroll_into_view(&self, slot: Slot);
}

#[derive(Debug, Default)]
pub struct SurfaceState {
    pub video: Option<VideoView>,
    pub preview: Option<RgbaImage>,
    pub preview_generation: u64,
    pub result: Option<ResultView>,
    pub result_generation: u64,
    pub error: String,
    pub loading: LoadingView,
    /// True between `show_loading` and the first `complete_loading`/`hide_loading`
    pub busy: bool,
    pub loading_started: u32,
    pub loading_ended: u32,
    pub phase_updates: u32,
    pub toasts: Vec<Toast>,
    pub scroll_request: Option<Slot>,
}

impl SurfaceState {
    fn end_busy(&mut self) {
        if self.busy {
            self.busy = false;
            self.loading_ended += 1;
        }
    }
}

type RepaintHook = Arc<dyn Fn() + Send + Sync>;

/// In-memory surface shared between the controller and whoever renders it.
#[derive(Clone, Default)]
pub struct SharedSurface {
    state: Arc<Mutex<SurfaceState>>,
    repaint: Arc<Mutex<Option<RepaintHook>>>,
}

impl SharedSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called after every mutation so an idle GUI wakes up.
    pub fn set_repaint_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.repaint.lock() = Some(Arc::new(hook));
    }

    pub fn lock(&self) -> MutexGuard<'_, SurfaceState> {
        self.state.lock()
    }

    pub fn take_scroll_request(&self) -> Option<Slot> {
        self.state.lock().scroll_request.take()
    }

    fn update(&self, f: impl FnOnce(&mut SurfaceState)) {
        f(&mut self.state.lock());
        let hook = self.repaint.lock().clone();
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl UiSurface for SharedSurface {
    fn bind_video(&self, video: VideoView) {
        self.update(|s| s.video = Some(video));
    }

    fn hide_video(&self) {
        self.update(|s| s.video = None);
    }

    fn show_preview(&self, image: RgbaImage) {
        self.update(|s| {
            s.preview = Some(image);
            s.preview_generation += 1;
        });
    }

    fn show_result(&self, result: ResultView) {
        self.update(|s| {
            s.result = Some(result);
            s.result_generation += 1;
        });
    }

    fn set_error(&self, message: &str) {
        self.update(|s| s.error = message.to_string());
    }

    fn clear_error(&self) {
        self.update(|s| s.error.clear());
    }

    fn show_loading(&self, phase_label: &str) {
        self.update(|s| {
            s.loading = LoadingView {
                overlay_visible: true,
                spinner_visible: true,
                checkmark_visible: false,
                progress_percent: 0.0,
                phase_label: phase_label.to_string(),
            };
            s.busy = true;
            s.loading_started += 1;
        });
    }

    fn set_loading_phase(&self, phase_label: &str, progress_percent: f32) {
        self.update(|s| {
            s.loading.phase_label = phase_label.to_string();
            s.loading.progress_percent = progress_percent;
            s.phase_updates += 1;
        });
    }

    fn complete_loading(&self, label: &str) {
        self.update(|s| {
            s.loading.spinner_visible = false;
            s.loading.checkmark_visible = true;
            s.loading.progress_percent = 100.0;
            s.loading.phase_label = label.to_string();
            s.end_busy();
        });
    }

    fn hide_loading(&self) {
        self.update(|s| {
            s.loading.overlay_visible = false;
            s.end_busy();
        });
    }

    fn add_toast(&self, toast: Toast) {
        self.update(|s| s.toasts.push(toast));
    }

    fn set_toast_visible(&self, id: u64, visible: bool) {
        self.update(|s| {
            if let Some(toast) = s.toasts.iter_mut().find(|t| t.id == id) {
                toast.visible = visible;
            }
        });
    }

    fn remove_toast(&self, id: u64) {
        self.update(|s| s.toasts.retain(|t| t.id != id));
    }

    fn scroll_into_view(&self, slot: Slot) {
        self.update(|s| s.scroll_request = Some(slot));
    }
}
