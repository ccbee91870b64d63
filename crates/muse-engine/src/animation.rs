//! Procedural looping animation built from one still image.
//!
//! Frame `i` of [`FRAME_COUNT`] is the source rotated counter-clockwise by
//! `3·i` degrees about its centre, scaled by `1 + 0.07·i`, then cropped back
//! to the source size from the top-left corner. The crop is deliberately not
//! centred: larger frames drift towards the bottom-right as they zoom.

use anyhow::{bail, Context, Result};
use image::codecs::gif::{GifEncoder, Repeat};
use image::imageops::{self, FilterType};
use image::{Delay, Frame, Rgba, RgbaImage};

pub const FRAME_COUNT: usize = 8;
pub const SCALE_STEP: f64 = 0.07;
pub const ROTATION_STEP_DEGREES: f64 = 3.0;
pub const FRAME_DELAY_MS: u32 = 200;

const RESIZE_FILTER: FilterType = FilterType::CatmullRom;
const GIF_ENCODE_SPEED: i32 = 10;
const FILL: Rgba<u8> = Rgba([0, 0, 0, 0]);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameGeometry {
    pub index: usize,
    pub scale: f64,
    pub rotation_degrees: f64,
}

impl FrameGeometry {
    pub fn for_index(index: usize) -> Self {
        Self {
            index,
            scale: 1.0 + index as f64 * SCALE_STEP,
            rotation_degrees: index as f64 * ROTATION_STEP_DEGREES,
        }
    }

    /// Size of the rotated image after scaling, before the crop.
    pub fn scaled_size(&self, width: u32, height: u32) -> (u32, u32) {
        (
            (f64::from(width) * self.scale).round() as u32,
            (f64::from(height) * self.scale).round() as u32,
        )
    }
}

#[derive(Debug, Clone)]
pub struct AnimationFrame {
    pub geometry: FrameGeometry,
    pub image: RgbaImage,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnimationComposer;

impl AnimationComposer {
    pub fn new() -> Self {
        Self
    }

    pub fn geometry(&self) -> Vec<FrameGeometry> {
        (0..FRAME_COUNT).map(FrameGeometry::for_index).collect()
    }

    pub fn frames(&self, source: &RgbaImage) -> Vec<AnimationFrame> {
        self.geometry()
            .into_iter()
            .map(|geometry| AnimationFrame {
                geometry,
                image: render_frame(source, geometry),
            })
            .collect()
    }

    /// Builds the frames for `source` and encodes them as an endlessly
    /// looping GIF, [`FRAME_DELAY_MS`] per frame.
    pub fn compose(&self, source: &RgbaImage) -> Result<Vec<u8>> {
        let (width, height) = source.dimensions();
        if width == 0 || height == 0 {
            bail!("cannot animate an empty {width}x{height} image");
        }
        let bytes = encode_gif(self.frames(source))?;
        tracing::debug!(width, height, bytes = bytes.len(), "animation composed");
        Ok(bytes)
    }
}

fn render_frame(source: &RgbaImage, geometry: FrameGeometry) -> RgbaImage {
    let (width, height) = source.dimensions();
    let rotated = rotate_about_center(source, geometry.rotation_degrees);
    let (scaled_w, scaled_h) = geometry.scaled_size(width, height);
    let scaled = if (scaled_w, scaled_h) == (width, height) {
        rotated
    } else {
        imageops::resize(&rotated, scaled_w, scaled_h, RESIZE_FILTER)
    };
    imageops::crop_imm(&scaled, 0, 0, width, height).to_image()
}

/// Rotates counter-clockwise about the centre, keeping the canvas size.
/// Nearest-neighbour sampling; uncovered pixels become transparent.
pub fn rotate_about_center(source: &RgbaImage, degrees: f64) -> RgbaImage {
    if degrees == 0.0 {
        return source.clone();
    }
    let (width, height) = source.dimensions();
    let (sin, cos) = degrees.to_radians().sin_cos();
    let cx = f64::from(width) / 2.0;
    let cy = f64::from(height) / 2.0;

    RgbaImage::from_fn(width, height, |x, y| {
        let dx = f64::from(x) + 0.5 - cx;
        let dy = f64::from(y) + 0.5 - cy;
        let sx = (cx + dx * cos - dy * sin).floor();
        let sy = (cy + dx * sin + dy * cos).floor();
        if sx < 0.0 || sy < 0.0 || sx >= f64::from(width) || sy >= f64::from(height) {
            return FILL;
        }
        *source.get_pixel(sx as u32, sy as u32)
    })
}

fn encode_gif(frames: Vec<AnimationFrame>) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    {
        let mut encoder = GifEncoder::new_with_speed(&mut bytes, GIF_ENCODE_SPEED);
        encoder
            .set_repeat(Repeat::Infinite)
            .context("failed to set GIF loop count")?;
        encoder
            .encode_frames(frames.into_iter().map(|frame| {
                Frame::from_parts(
                    frame.image,
                    0,
                    0,
                    Delay::from_numer_denom_ms(FRAME_DELAY_MS, 1),
                )
            }))
            .context("failed to encode GIF frames")?;
    }
    Ok(bytes)
}

/// Loop count from the NETSCAPE2.0 application block; `Some(0)` loops forever.
pub fn gif_loop_count(bytes: &[u8]) -> Option<u16> {
    const MARKER: &[u8] = b"NETSCAPE2.0";
    let start = bytes
        .windows(MARKER.len())
        .position(|window| window == MARKER)?
        + MARKER.len();
    match bytes.get(start..start + 4)? {
        [0x03, 0x01, lo, hi] => Some(u16::from_le_bytes([*lo, *hi])),
        _ => None,
    }
}
