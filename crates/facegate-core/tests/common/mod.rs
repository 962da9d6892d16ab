//! Synthetic 320×240 capture builders shared by the integration tests.
#![allow(dead_code)]

use facegate_core::Frame;

pub const WIDTH: usize = 320;
pub const HEIGHT: usize = 240;

/// Row-major canvas with helpers to paint filled rectangles.
pub struct Canvas {
    data: Vec<u8>,
}

impl Canvas {
    pub fn new(background: u8) -> Self {
        Self { data: vec![background; WIDTH * HEIGHT] }
    }

    pub fn fill(mut self, x: usize, y: usize, w: usize, h: usize, value: u8) -> Self {
        for yy in y..y + h {
            for xx in x..x + w {
                self.data[yy * WIDTH + xx] = value;
            }
        }
        self
    }

    /// Horizontal ramp `100 + column` over the given rows of a face box.
    pub fn ramp(mut self, x: usize, y: usize, w: usize, h: usize) -> Self {
        for yy in y..y + h {
            for i in 0..w {
                self.data[yy * WIDTH + x + i] = 100 + (i % 150) as u8;
            }
        }
        self
    }

    pub fn frame(self) -> Frame {
        Frame::from_luma(WIDTH as u32, HEIGHT as u32, self.data).unwrap()
    }
}

/// Tones for a face with two eyes and a mouth.
pub struct Tones {
    pub background: u8,
    pub skin: u8,
    pub eye: u8,
    pub mouth: u8,
}

pub const NORMAL: Tones = Tones { background: 20, skin: 190, eye: 40, mouth: 90 };
pub const BRIGHT: Tones = Tones { background: 30, skin: 215, eye: 55, mouth: 110 };

pub fn face_at(ox: usize, oy: usize, t: &Tones) -> Frame {
    Canvas::new(t.background)
        .fill(ox, oy, 120, 150, t.skin)
        .fill(ox + 25, oy + 45, 20, 14, t.eye)
        .fill(ox + 75, oy + 45, 20, 14, t.eye)
        .fill(ox + 35, oy + 110, 50, 10, t.mouth)
        .frame()
}

/// Enrollable face used as "alice".
pub fn alice() -> Frame {
    face_at(100, 40, &NORMAL)
}

/// Same subject under brighter lighting.
pub fn alice_bright() -> Frame {
    face_at(100, 40, &BRIGHT)
}

/// Same subject, further right and lower in the frame.
pub fn alice_shifted() -> Frame {
    face_at(140, 60, &NORMAL)
}

/// A second, clearly different enrollable face: wide eyes over a textured lower half.
pub fn bob() -> Frame {
    Canvas::new(20)
        .fill(100, 40, 120, 150, 190)
        .ramp(100, 130, 120, 60)
        .fill(120, 80, 26, 18, 40)
        .fill(174, 80, 26, 18, 40)
        .frame()
}

/// Face-sized region with a smooth ramp and no eyes: detectable, not live.
pub fn ramp_face() -> Frame {
    Canvas::new(20).ramp(100, 40, 120, 150).frame()
}

pub fn eyeless_face() -> Frame {
    Canvas::new(20).fill(100, 40, 120, 150, 190).frame()
}

pub fn two_faces() -> Frame {
    Canvas::new(20)
        .fill(10, 40, 120, 150, 190)
        .fill(180, 40, 120, 150, 190)
        .frame()
}

/// Subject darker than the wall behind it.
pub fn face_on_light_wall() -> Frame {
    face_at(100, 40, &Tones { background: 230, skin: 150, eye: 40, mouth: 60 })
}

pub fn blank() -> Frame {
    Canvas::new(20).frame()
}
