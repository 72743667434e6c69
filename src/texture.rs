use egui::{Context, TextureHandle, TextureOptions};
use image::RgbImage;

use crate::ui::UplinkApp;

/// Upload an RGB frame into an egui texture slot, reusing the existing
/// texture when the size is unchanged to avoid reallocation flicker.
pub fn update_texture(
    ctx: &Context,
    slot: &mut Option<TextureHandle>,
    name: &str,
    image: &RgbImage,
) {
    // Skip invalid frames to prevent white flash
    if image.width() == 0 || image.height() == 0 {
        return;
    }

    let size = [image.width() as usize, image.height() as usize];
    let pixels = image.as_flat_samples();
    let color_image = egui::ColorImage::from_rgb(size, pixels.as_slice());

    match slot {
        Some(texture) => {
            if texture.size() == size {
                texture.set(color_image, TextureOptions::NEAREST);
            } else {
                *texture = ctx.load_texture(name, color_image, TextureOptions::NEAREST);
            }
        }
        None => {
            *slot = Some(ctx.load_texture(name, color_image, TextureOptions::NEAREST));
        }
    }
}

impl UplinkApp {
    /// Live camera preview surface - updated at preview rate.
    pub fn update_camera_texture(&mut self, ctx: &Context, image: &RgbImage) {
        update_texture(ctx, &mut self.camera_texture, "camera_preview", image);
    }

    /// Locally captured or selected image, shown without re-fetching.
    pub fn update_local_texture(&mut self, ctx: &Context, image: &RgbImage) {
        update_texture(ctx, &mut self.local_texture, "local_image", image);
    }

    /// Server-processed result fetched from the display URL.
    pub fn update_result_texture(&mut self, ctx: &Context, image: &RgbImage) {
        update_texture(ctx, &mut self.result_texture, "result_image", image);
    }
}
