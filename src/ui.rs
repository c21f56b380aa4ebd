use eframe::egui;
use image::RgbImage;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::camera::FacingMode;
use crate::controller::ImageTransformer;
use crate::surface::{LoadingView, SharedSurface, Slot, Toast, ToastKind, VideoView};
use crate::texture::SurfaceTextures;

// ============================================================================
// CONSTANTS FOR UI STYLING
// ============================================================================
const IMAGE_MAX_WIDTH: f32 = 400.0;
const CAMERA_FRAME_INTERVAL: Duration = Duration::from_millis(33);
const ACCENT: egui::Color32 = egui::Color32::from_rgb(26, 115, 232);
const SUCCESS_GREEN: egui::Color32 = egui::Color32::from_rgb(52, 168, 83);
const ERROR_RED: egui::Color32 = egui::Color32::from_rgb(200, 40, 40);
const TOAST_FADE_SECS: f32 = 0.3;

/// Text parts of the surface copied out once per frame so the lock is not
/// held while widgets are laid out.
struct FrameView {
    video: Option<VideoView>,
    error: String,
    loading: LoadingView,
    toasts: Vec<Toast>,
    description: Option<String>,
    toy_description: Option<String>,
    main_object: Option<String>,
    detected_objects: Option<String>,
    has_result: bool,
}

pub struct TransformerApp {
    controller: Arc<ImageTransformer>,
    surface: SharedSurface,
    runtime: tokio::runtime::Handle,
    default_facing: FacingMode,
    textures: SurfaceTextures,

    // Camera
    live_frame: Arc<Mutex<Option<RgbImage>>>,
    frame_in_flight: Arc<AtomicBool>,
    last_camera_update: Option<Instant>,
}

impl TransformerApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        controller: Arc<ImageTransformer>,
        surface: SharedSurface,
        runtime: tokio::runtime::Handle,
        default_facing: FacingMode,
    ) -> Self {
        let ctx = cc.egui_ctx.clone();
        surface.set_repaint_hook(move || ctx.request_repaint());

        Self {
            controller,
            surface,
            runtime,
            default_facing,
            textures: SurfaceTextures::default(),
            live_frame: Arc::new(Mutex::new(None)),
            frame_in_flight: Arc::new(AtomicBool::new(false)),
            last_camera_update: None,
        }
    }

    /// Runs a controller operation off the UI thread.
    fn dispatch<F, Fut>(&self, operation: F)
    where
        F: FnOnce(Arc<ImageTransformer>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.runtime.spawn(operation(Arc::clone(&self.controller)));
    }

    fn frame_view(&mut self, ctx: &egui::Context) -> FrameView {
        let state = self.surface.lock();
        self.textures.sync(ctx, &state);
        let result = state.result.as_ref();
        FrameView {
            video: state.video.clone(),
            error: state.error.clone(),
            loading: state.loading.clone(),
            toasts: state.toasts.clone(),
            description: result.and_then(|r| r.description.clone()),
            toy_description: result.and_then(|r| r.toy_description.clone()),
            main_object: result.and_then(|r| r.main_object.clone()),
            detected_objects: result.and_then(|r| r.detected_objects.clone()),
            has_result: result.is_some(),
        }
    }

    fn update_camera_video(&mut self, ctx: &egui::Context, active: bool) {
        if !active {
            self.textures.clear_camera();
            self.last_camera_update = None;
            return;
        }

        if let Some(frame) = self.live_frame.lock().take() {
            self.textures.update_camera(ctx, &frame);
        }

        let due = match self.last_camera_update {
            None => true,
            Some(last) => last.elapsed() >= CAMERA_FRAME_INTERVAL,
        };
        if due && !self.frame_in_flight.swap(true, Ordering::SeqCst) {
            self.last_camera_update = Some(Instant::now());
            let slot = Arc::clone(&self.live_frame);
            let in_flight = Arc::clone(&self.frame_in_flight);
            let ctx = ctx.clone();
            self.dispatch(move |controller| async move {
                if let Some(frame) = controller.latest_frame().await {
                    *slot.lock() = Some(frame);
                    ctx.request_repaint();
                }
                in_flight.store(false, Ordering::SeqCst);
            });
        }
        ctx.request_repaint_after(CAMERA_FRAME_INTERVAL);
    }

    fn pick_file(&self) {
        if let Some(path) = rfd::FileDialog::new()
            .add_filter("Image Files", &["png", "jpg", "jpeg", "gif", "bmp", "webp", "tiff"])
            .add_filter("All Files", &["*"])
            .pick_file()
        {
            self.dispatch(move |controller| async move {
                controller.select_path(&path).await;
            });
        }
    }
}

// ============================================================================
// MAIN UPDATE LOOP
// ============================================================================

impl eframe::App for TransformerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let view = self.frame_view(ctx);
        let scroll = self.surface.take_scroll_request();
        self.update_camera_video(ctx, view.video.is_some());

        egui::TopBottomPanel::top("title").show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.heading(egui::RichText::new("🎨 Image Transformation").color(ACCENT));
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().auto_shrink([false, false]).show(ui, |ui| {
                self.render_upload_section(ui);
                ui.separator();
                self.render_camera_section(ui, &view);
                ui.separator();
                self.render_result_section(ui, &view, scroll);
            });
        });

        render_loading_overlay(ctx, &view.loading);
        render_toasts(ctx, &view.toasts);
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.runtime.block_on(self.controller.shutdown());
    }
}

// ============================================================================
// SECTIONS
// ============================================================================

impl TransformerApp {
    fn render_upload_section(&mut self, ui: &mut egui::Ui) {
        ui.heading("Upload Image");
        ui.horizontal(|ui| {
            if ui.button("📁 Choose image…").clicked() {
                self.pick_file();
            }
            match self.controller.selected_name() {
                Some(name) => ui.label(name),
                None => ui.weak("No file selected"),
            };
        });

        if let Some(preview) = self.textures.preview() {
            ui.add(egui::Image::new(preview).max_width(IMAGE_MAX_WIDTH));
        }

        let idle = !self.controller.is_uploading();
        if ui.add_enabled(idle, egui::Button::new("🎨 Transform image")).clicked() {
            self.dispatch(|controller| async move {
                controller.upload_selected().await;
            });
        }
    }

    fn render_camera_section(&mut self, ui: &mut egui::Ui, view: &FrameView) {
        ui.heading("Take Photo");

        if let (Some(video), Some(texture)) = (&view.video, self.textures.camera()) {
            ui.add(egui::Image::new(texture).max_width(IMAGE_MAX_WIDTH));
            ui.weak(format!("{} ({}x{})", video.label, video.width, video.height));
        } else if view.video.is_some() {
            ui.spinner();
        }

        ui.horizontal(|ui| {
            let default_facing = self.default_facing;
            if ui.button("📷 Start camera").clicked() {
                self.dispatch(move |controller| async move {
                    controller.start_camera(default_facing).await;
                });
            }
            let other = match default_facing {
                FacingMode::User => FacingMode::Environment,
                FacingMode::Environment => FacingMode::User,
            };
            if ui.button(format!("🔄 Use {} camera", other)).clicked() {
                self.dispatch(move |controller| async move {
                    controller.start_camera(other).await;
                });
            }
            if ui.button("⏹ Stop camera").clicked() {
                self.dispatch(|controller| async move {
                    controller.stop_camera().await;
                });
            }
            if ui.button("📸 Take photo").clicked() {
                self.dispatch(|controller| async move {
                    controller.capture_photo().await;
                });
            }
        });
    }

    fn render_result_section(&mut self, ui: &mut egui::Ui, view: &FrameView, scroll: Option<Slot>) {
        ui.heading("Result");

        if let Some(texture) = self.textures.result() {
            let response = ui.add(egui::Image::new(texture).max_width(IMAGE_MAX_WIDTH));
            if scroll == Some(Slot::Result) {
                response.scroll_to_me(Some(egui::Align::Center));
            }
        } else if view.has_result {
            ui.weak("The returned image could not be displayed");
        }

        for text in [
            &view.description,
            &view.toy_description,
            &view.main_object,
            &view.detected_objects,
        ]
        .into_iter()
        .flatten()
        {
            ui.label(text);
        }

        if !view.error.is_empty() {
            let response = ui.colored_label(ERROR_RED, &view.error);
            if scroll == Some(Slot::Error) {
                response.scroll_to_me(Some(egui::Align::Center));
            }
        }
    }
}

// ============================================================================
// OVERLAYS
// ============================================================================

fn render_loading_overlay(ctx: &egui::Context, loading: &LoadingView) {
    if !loading.overlay_visible {
        return;
    }

    let backdrop = egui::LayerId::new(egui::Order::Foreground, egui::Id::new("loading_backdrop"));
    ctx.layer_painter(backdrop)
        .rect_filled(ctx.screen_rect(), 0.0, egui::Color32::from_black_alpha(180));

    egui::Area::new("loading_overlay")
        .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
        .order(egui::Order::Tooltip)
        .show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                if loading.checkmark_visible {
                    ui.label(egui::RichText::new("✓").size(48.0).color(SUCCESS_GREEN));
                }
                if loading.spinner_visible {
                    ui.add(egui::Spinner::new().size(50.0).color(ACCENT));
                }
                ui.label(
                    egui::RichText::new("Transforming your image...")
                        .color(egui::Color32::WHITE)
                        .size(18.0),
                );
                ui.add(
                    egui::ProgressBar::new(loading.progress_percent / 100.0)
                        .desired_width(200.0)
                        .fill(ACCENT),
                );
                ui.label(egui::RichText::new(&loading.phase_label).color(egui::Color32::WHITE));
            });
        });

    ctx.request_repaint();
}

fn render_toasts(ctx: &egui::Context, toasts: &[Toast]) {
    if toasts.is_empty() {
        return;
    }

    egui::Area::new("toasts")
        .anchor(egui::Align2::RIGHT_BOTTOM, egui::vec2(-20.0, -20.0))
        .order(egui::Order::Tooltip)
        .show(ctx, |ui| {
            for toast in toasts {
                let alpha = ctx.animate_bool_with_time(
                    egui::Id::new(("toast", toast.id)),
                    toast.visible,
                    TOAST_FADE_SECS,
                );
                let [r, g, b, _] = match toast.kind {
                    ToastKind::Success => SUCCESS_GREEN,
                    ToastKind::Error => ERROR_RED,
                    ToastKind::Info => ACCENT,
                }
                .to_array();

                egui::Frame::none()
                    .fill(egui::Color32::from_rgba_unmultiplied(r, g, b, (alpha * 230.0) as u8))
                    .rounding(8.0)
                    .inner_margin(egui::Margin::symmetric(20.0, 12.0))
                    .show(ui, |ui| {
                        ui.label(
                            egui::RichText::new(&toast.message)
                                .color(egui::Color32::WHITE.gamma_multiply(alpha))
                                .size(16.0),
                        );
                    });
                ui.add_space(8.0);
            }
        });
}
