//! Classical enhancement filters offered for visual inspection of a scan.

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use imageproc::contours::{BorderType, find_contours};
use imageproc::contrast::{ThresholdType, threshold};
use imageproc::edges::canny;
use imageproc::integral_image::{integral_image, sum_image_pixels};

/// Convert image to grayscale
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Detect edges using Canny edge detector
pub fn detect_edges(img: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    canny(img, low_threshold, high_threshold)
}

/// Contrast-limited adaptive histogram equalization.
///
/// The image is split into a `grid` x `grid` layout of tiles. Each tile's
/// histogram is clipped at `clip_limit` times the mean bin height before the
/// excess is spread evenly, and pixel values are interpolated bilinearly
/// between the mappings of the four nearest tiles.
pub fn clahe(img: &GrayImage, clip_limit: f32, grid: u32) -> GrayImage {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return img.clone();
    }

    let tile_w = width.div_ceil(grid.clamp(1, width));
    let tile_h = height.div_ceil(grid.clamp(1, height));
    let grid_x = width.div_ceil(tile_w);
    let grid_y = height.div_ceil(tile_h);

    let mut luts = vec![[0u8; 256]; (grid_x * grid_y) as usize];
    for ty in 0..grid_y {
        for tx in 0..grid_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[img.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            let count = (x1 - x0) * (y1 - y0);

            let limit = ((clip_limit * count as f32 / 256.0) as u32).max(1);
            let mut excess = 0u32;
            for bin in hist.iter_mut() {
                if *bin > limit {
                    excess += *bin - limit;
                    *bin = limit;
                }
            }
            let bonus = excess / 256;
            let residual = excess % 256;
            for (i, bin) in hist.iter_mut().enumerate() {
                *bin += bonus + u32::from((i as u32) < residual);
            }

            let lut = &mut luts[(ty * grid_x + tx) as usize];
            let mut cdf = 0u32;
            for (value, bin) in hist.iter().enumerate() {
                cdf += bin;
                lut[value] = (cdf as f32 * 255.0 / count as f32).round().min(255.0) as u8;
            }
        }
    }

    // Tile index pair and weight of the second tile along one axis
    let neighbours = |pos: u32, tile: u32, tiles: u32| -> (u32, u32, f32) {
        let f = (pos as f32 + 0.5) / tile as f32 - 0.5;
        if f <= 0.0 {
            return (0, 0, 0.0);
        }
        let t0 = (f.floor() as u32).min(tiles - 1);
        let t1 = (t0 + 1).min(tiles - 1);
        (t0, t1, (f - t0 as f32).clamp(0.0, 1.0))
    };

    GrayImage::from_fn(width, height, |x, y| {
        let value = img.get_pixel(x, y)[0] as usize;
        let (tx0, tx1, wx) = neighbours(x, tile_w, grid_x);
        let (ty0, ty1, wy) = neighbours(y, tile_h, grid_y);
        let lookup = |tx: u32, ty: u32| luts[(ty * grid_x + tx) as usize][value] as f32;

        let top = lookup(tx0, ty0) * (1.0 - wx) + lookup(tx1, ty0) * wx;
        let bottom = lookup(tx0, ty1) * (1.0 - wx) + lookup(tx1, ty1) * wx;
        Luma([(top * (1.0 - wy) + bottom * wy).round().clamp(0.0, 255.0) as u8])
    })
}

/// Binary threshold against the mean of the surrounding
/// `(2 * block_radius + 1)` square, minus `offset`.
pub fn adaptive_threshold(img: &GrayImage, block_radius: u32, offset: i32) -> GrayImage {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return img.clone();
    }
    let integral = integral_image::<_, u64>(img);

    GrayImage::from_fn(width, height, |x, y| {
        let x0 = x.saturating_sub(block_radius);
        let y0 = y.saturating_sub(block_radius);
        let x1 = (x + block_radius).min(width - 1);
        let y1 = (y + block_radius).min(height - 1);
        let sum = sum_image_pixels(&integral, x0, y0, x1, y1)[0];
        let mean = sum as f64 / ((x1 - x0 + 1) * (y1 - y0 + 1)) as f64;

        let value = img.get_pixel(x, y)[0] as f64;
        if value > mean - offset as f64 {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Fixed binary threshold: values above `level` become white.
pub fn binary_threshold(img: &GrayImage, level: u8) -> GrayImage {
    threshold(img, level, ThresholdType::Binary)
}

/// Draw the outer borders of bright regions on a black canvas.
pub fn draw_outer_contours(img: &DynamicImage, level: u8, color: Rgb<u8>) -> RgbImage {
    let binary = binary_threshold(&to_grayscale(img), level);
    let (width, height) = binary.dimensions();
    let mut canvas = RgbImage::new(width, height);

    let contours = find_contours::<u32>(&binary);
    for contour in contours
        .iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
    {
        for point in &contour.points {
            // Two pixels wide
            for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                let (px, py) = (point.x + dx, point.y + dy);
                if px < width && py < height {
                    canvas.put_pixel(px, py, color);
                }
            }
        }
    }

    canvas
}
