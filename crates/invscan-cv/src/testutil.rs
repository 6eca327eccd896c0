//! Synthetic frames for unit tests

use crate::bbox::Roi;
use crate::utils::ImageUtils;
use image::{Rgba, RgbaImage};

pub(crate) const BACKGROUND: Rgba<u8> = Rgba([20, 20, 24, 255]);

pub(crate) const BORDERS: [[u8; 3]; 4] = [
    [70, 200, 90],
    [60, 130, 240],
    [170, 70, 230],
    [250, 160, 30],
];

const ART_COLORS: [[u8; 3]; 5] = [
    [220, 40, 40],
    [30, 200, 200],
    [240, 240, 240],
    [30, 30, 30],
    [120, 120, 120],
];

/// Distinct 64x64 item art per seed, kept clear of the border palette.
pub(crate) fn icon_art(seed: u32) -> RgbaImage {
    let size = 64u32;
    let bg = ART_COLORS[(seed % 5) as usize];
    let mut fg = ART_COLORS[((seed / 5 + seed + 2) % 5) as usize];
    if fg == bg {
        fg = ART_COLORS[((seed + 1) % 5) as usize];
    }
    let offset = (seed * 7) % 16;

    RgbaImage::from_fn(size, size, |x, y| {
        let inside = match seed % 4 {
            0 => {
                let dx = x as i32 - 32 - (offset as i32 - 8);
                let dy = y as i32 - 32;
                dx * dx + dy * dy < 18 * 18
            }
            1 => ((x + offset) / 8) % 2 == 0,
            2 => ((x + y + offset) / 10) % 2 == 0,
            _ => (x < 32 + offset / 2) ^ (y < 28 + offset / 3),
        };
        let c = if inside { fg } else { bg };
        Rgba([c[0], c[1], c[2], 255])
    })
}

pub(crate) fn fill(frame: &mut RgbaImage, roi: &Roi, color: Rgba<u8>) {
    for y in roi.y.max(0)..(roi.bottom() as i32).min(frame.height() as i32) {
        for x in roi.x.max(0)..(roi.right() as i32).min(frame.width() as i32) {
            frame.put_pixel(x as u32, y as u32, color);
        }
    }
}

/// Draw a bordered slot at `slot`; the art is scaled into the inner area.
pub(crate) fn draw_icon(frame: &mut RgbaImage, slot: &Roi, border: [u8; 3], art: &RgbaImage) {
    let thickness = border_thickness(slot.width);
    fill(frame, slot, Rgba([border[0], border[1], border[2], 255]));

    let inner = slot.width - 2 * thickness;
    let scaled = ImageUtils::resize(art, inner, inner);
    for y in 0..inner {
        for x in 0..inner {
            frame.put_pixel(
                slot.x as u32 + thickness + x,
                slot.y as u32 + thickness + y,
                *scaled.get_pixel(x, y),
            );
        }
    }
}

pub(crate) fn border_thickness(size: u32) -> u32 {
    (size / 20).max(2)
}

/// Dark frame with `count` bordered icons in a row starting at (`left`, `top`).
pub(crate) fn hotbar_frame(
    width: u32,
    height: u32,
    icon_size: u32,
    spacing: u32,
    left: u32,
    top: u32,
    seeds: &[u32],
) -> (RgbaImage, Vec<Roi>) {
    let mut frame = RgbaImage::from_pixel(width, height, BACKGROUND);
    let mut slots = Vec::new();

    for (i, &seed) in seeds.iter().enumerate() {
        let x = left + i as u32 * (icon_size + spacing);
        let slot = Roi::new(x as i32, top as i32, icon_size, icon_size);
        draw_icon(&mut frame, &slot, BORDERS[i % BORDERS.len()], &icon_art(seed));
        slots.push(slot);
    }

    (frame, slots)
}

/// Bright, high-variance frame resembling busy gameplay.
pub(crate) fn busy_frame(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        if ((x / 7) + (y / 5)) % 2 == 0 {
            Rgba([235, 225, 210, 255])
        } else {
            Rgba([40, 90, 60, 255])
        }
    })
}
