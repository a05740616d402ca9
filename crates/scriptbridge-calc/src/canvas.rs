use crate::error::{CalcError, Result};

/// Largest canvas accepted by [`Canvas::new`], in pixels.
pub const MAX_PIXELS: u64 = 16 * 1024 * 1024;

const BACKGROUND: [u8; 3] = [255, 255, 255];
const INK: [u8; 3] = [0, 0, 0];
const MARGIN: u32 = 4;

/// An RGB raster that `plot()` draws into while a capture is active.
#[derive(Debug, Clone)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let area = u64::from(width) * u64::from(height);
        if area == 0 || area > MAX_PIXELS {
            return Err(CalcError::Graphics(format!(
                "invalid canvas size {width}x{height}"
            )));
        }
        let mut pixels = Vec::with_capacity(area as usize * 3);
        for _ in 0..area {
            pixels.extend_from_slice(&BACKGROUND);
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn set(&mut self, x: i64, y: i64) {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        self.pixels[offset..offset + 3].copy_from_slice(&INK);
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        Some([
            self.pixels[offset],
            self.pixels[offset + 1],
            self.pixels[offset + 2],
        ])
    }

    fn line(&mut self, (mut x0, mut y0): (i64, i64), (x1, y1): (i64, i64)) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            self.set(x0, y0);
            if x0 == x1 && y0 == y1 {
                return;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    /// Draw `values` as a line series scaled to fill the canvas.
    ///
    /// Index runs along x, value along y (larger values higher up).
    /// Non-finite values break the line.
    pub fn plot(&mut self, values: &[f32]) {
        let finite = values.iter().copied().filter(|v| v.is_finite());
        let (lo, hi) = finite.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        if lo > hi {
            return;
        }

        let inner_w = i64::from(self.width.saturating_sub(2 * MARGIN).max(1));
        let inner_h = i64::from(self.height.saturating_sub(2 * MARGIN).max(1));
        let span = if hi > lo { hi - lo } else { 1.0 };
        let steps = values.len().saturating_sub(1).max(1) as f32;

        let point = |i: usize, v: f32| -> (i64, i64) {
            let x = (i as f32 / steps * (inner_w - 1) as f32).round() as i64;
            let y = ((v - lo) / span * (inner_h - 1) as f32).round() as i64;
            (i64::from(MARGIN) + x, i64::from(MARGIN) + inner_h - 1 - y)
        };

        let mut previous = None;
        for (i, v) in values.iter().enumerate() {
            if !v.is_finite() {
                previous = None;
                continue;
            }
            let current = point(i, *v);
            match previous {
                Some(from) => self.line(from, current),
                None => self.set(current.0, current.1),
            }
            previous = Some(current);
        }
    }

    /// Encode as a binary PPM (P6) image.
    pub fn to_ppm(&self) -> Vec<u8> {
        let header = format!("P6\n{} {}\n255\n", self.width, self.height);
        let mut out = Vec::with_capacity(header.len() + self.pixels.len());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&self.pixels);
        out
    }
}
