use egui::{ColorImage, Context, TextureHandle, TextureOptions};
use image::RgbImage;

use crate::surface::SurfaceState;

/// GPU textures for the image slots, rebuilt only when the surface changes.
#[derive(Default)]
pub struct SurfaceTextures {
    camera: Option<TextureHandle>,
    preview: Option<TextureHandle>,
    preview_generation: u64,
    result: Option<TextureHandle>,
    result_generation: u64,
}

impl SurfaceTextures {
    pub fn camera(&self) -> Option<&TextureHandle> {
        self.camera.as_ref()
    }

    pub fn preview(&self) -> Option<&TextureHandle> {
        self.preview.as_ref()
    }

    pub fn result(&self) -> Option<&TextureHandle> {
        self.result.as_ref()
    }

    pub fn update_camera(&mut self, ctx: &Context, frame: &RgbImage) {
        // skip empty frames, they flash white
        if frame.width() == 0 || frame.height() == 0 {
            return;
        }

        let size = [frame.width() as usize, frame.height() as usize];
        let color_image = ColorImage::from_rgb(size, frame.as_raw());

        match &mut self.camera {
            Some(texture) if texture.size() == size => {
                texture.set(color_image, TextureOptions::LINEAR);
            }
            _ => {
                self.camera = Some(ctx.load_texture("camera_video", color_image, TextureOptions::LINEAR));
            }
        }
    }

    pub fn clear_camera(&mut self) {
        self.camera = None;
    }

    pub fn sync(&mut self, ctx: &Context, state: &SurfaceState) {
        if state.preview_generation != self.preview_generation {
            self.preview_generation = state.preview_generation;
            self.preview = state.preview.as_ref().map(|preview| {
                let size = [preview.width() as usize, preview.height() as usize];
                let color_image = ColorImage::from_rgba_unmultiplied(size, preview.as_raw());
                ctx.load_texture("input_preview", color_image, TextureOptions::LINEAR)
            });
        }

        if state.result_generation != self.result_generation {
            self.result_generation = state.result_generation;
            self.result = state.result.as_ref().and_then(|result| {
                match image::load_from_memory(&result.image) {
                    Ok(img) => {
                        let rgba = img.to_rgba8();
                        let size = [rgba.width() as usize, rgba.height() as usize];
                        let color_image = ColorImage::from_rgba_unmultiplied(size, rgba.as_raw());
                        Some(ctx.load_texture("result_image", color_image, TextureOptions::LINEAR))
                    }
                    Err(e) => {
                        log::warn!("Result image could not be decoded: {}", e);
                        None
                    }
                }
            });
        }
    }
}
