//! Test fixtures: generated outfit images

#![allow(dead_code)]

use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

/// Test fixture describing a generated outfit image
#[derive(Debug, Clone)]
pub struct OutfitFixture {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub description: &'static str,
}

pub const OUTFIT_FIXTURES: &[OutfitFixture] = &[
    OutfitFixture {
        name: "small_png",
        width: 32,
        height: 48,
        format: ImageFormat::Png,
        description: "Tiny PNG, single upload chunk",
    },
    OutfitFixture {
        name: "portrait_jpeg",
        width: 480,
        height: 640,
        format: ImageFormat::Jpeg,
        description: "Phone-sized JPEG portrait",
    },
];

impl OutfitFixture {
    /// Encode a two-tone "shirt over jeans" image in the fixture's format.
    pub fn encode(&self) -> Vec<u8> {
        let img = RgbImage::from_fn(self.width, self.height, |_, y| {
            if y < self.height / 2 {
                Rgb([20, 20, 20])
            } else {
                Rgb([40, 60, 140])
            }
        });

        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, self.format)
            .expect("Failed to encode fixture image");
        buf.into_inner()
    }
}

pub fn small_png() -> Vec<u8> {
    OUTFIT_FIXTURES[0].encode()
}
