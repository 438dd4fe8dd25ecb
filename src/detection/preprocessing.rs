use image::{DynamicImage, Rgb, RgbImage};
use rten_tensor::NdTensor;

/// Blur applied to every scan before detection. Matches a 5x5 Gaussian kernel.
pub const DENOISE_SIGMA: f32 = 1.1;

const LETTERBOX_FILL: Rgb<u8> = Rgb([114, 114, 114]);

/// Reduce sensor noise while keeping the original dimensions.
pub fn denoise(img: &DynamicImage) -> DynamicImage {
    img.blur(DENOISE_SIGMA)
}

/// How an image was placed inside the square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    /// Map a point from model input space back to the original image.
    pub fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Resize keeping aspect ratio, pad to `target_size` square and convert to
/// a normalized NCHW tensor.
pub fn to_model_input(img: &DynamicImage, target_size: u32) -> (NdTensor<f32, 4>, Letterbox) {
    let rgb_img = img.to_rgb8();
    let (orig_width, orig_height) = rgb_img.dimensions();

    let max_dim = orig_width.max(orig_height).max(1);
    let scale = target_size as f32 / max_dim as f32;
    let new_width = ((orig_width as f32 * scale) as u32).clamp(1, target_size);
    let new_height = ((orig_height as f32 * scale) as u32).clamp(1, target_size);

    let resized = image::imageops::resize(
        &rgb_img,
        new_width,
        new_height,
        image::imageops::FilterType::Triangle,
    );

    let mut letterboxed = RgbImage::from_pixel(target_size, target_size, LETTERBOX_FILL);
    let x_offset = (target_size - new_width) / 2;
    let y_offset = (target_size - new_height) / 2;
    image::imageops::overlay(&mut letterboxed, &resized, x_offset.into(), y_offset.into());

    let size = target_size as usize;
    let mut data = Vec::with_capacity(3 * size * size);
    for c in 0..3 {
        for y in 0..target_size {
            for x in 0..target_size {
                data.push(letterboxed.get_pixel(x, y)[c] as f32 / 255.0);
            }
        }
    }

    let tensor = NdTensor::from_data([1, 3, size, size], data);
    let letterbox = Letterbox {
        scale,
        pad_x: x_offset as f32,
        pad_y: y_offset as f32,
    };
    (tensor, letterbox)
}
