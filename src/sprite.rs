use anyhow::{Context, Result};
use image::{ImageFormat, Rgba, RgbaImage};
use std::path::Path;
use tracing::debug;

use crate::models::{EmbeddingMatrix, Vocabulary};

pub const SPRITE_UNIT_SIZE: u32 = 100;

const TRANSPARENT: Rgba<u8> = Rgba([255, 255, 255, 0]);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Tiles per side: the smallest square grid holding `n` tiles.
pub fn grid_side(n: usize) -> u32 {
    let mut side = (n as f64).sqrt().floor() as u32;
    while (side as usize) * (side as usize) < n {
        side += 1;
    }
    side
}

/// Frame colour for a sentiment in [-1, 1]: red when negative, cyan when positive.
pub fn sentiment_colour(sentiment: f32) -> Rgba<u8> {
    let s = (sentiment.clamp(-1.0, 1.0) * 127.0) as i32;
    let lo = (127 - s) as u8;
    let hi = (127 + s) as u8;
    Rgba([lo, hi, hi, 255])
}

/// One tile per matched word, row-major in matrix order, coloured by the
/// word's sentiment.
pub fn render_sprite(words: &Vocabulary, matrix: &EmbeddingMatrix) -> RgbaImage {
    let side = grid_side(matrix.len()).max(1);
    let px = side * SPRITE_UNIT_SIZE;
    let mut img = RgbaImage::from_pixel(px, px, TRANSPARENT);

    for (i, word) in matrix.words.iter().enumerate() {
        let sentiment = words.get(word).map(|b| b.sentiment).unwrap_or(0.0);
        let x0 = (i as u32 % side) * SPRITE_UNIT_SIZE;
        let y0 = (i as u32 / side) * SPRITE_UNIT_SIZE;
        fill_rect(&mut img, x0 + 10, y0 + 10, x0 + 90, y0 + 90, sentiment_colour(sentiment));
        fill_rect(&mut img, x0 + 20, y0 + 20, x0 + 80, y0 + 80, WHITE);
    }
    img
}

// inclusive bounds
fn fill_rect(img: &mut RgbaImage, x0: u32, y0: u32, x1: u32, y1: u32, colour: Rgba<u8>) {
    for y in y0..=y1.min(img.height() - 1) {
        for x in x0..=x1.min(img.width() - 1) {
            img.put_pixel(x, y, colour);
        }
    }
}

pub fn write_sprite(path: &Path, words: &Vocabulary, matrix: &EmbeddingMatrix) -> Result<()> {
    let img = render_sprite(words, matrix);
    img.save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("writing sprite {}", path.display()))?;
    debug!("Sprite written - path={}, tiles={}", path.display(), matrix.len());
    Ok(())
}
