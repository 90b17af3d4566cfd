//! Indexed framebuffer and rasterizer.
//!
//! `Console` owns the drawing state for one runtime session: the 128x128
//! index buffer, the sprite table, the tile map, and the palette. Every
//! write is an opaque palette-index overwrite; there is no blending.
//! Missing sprite or tile ids are treated as "nothing to draw", never as an
//! error, so content bugs cannot crash a running game.

use alloc::vec::Vec;

use crate::assets::{Palette, Sprite, TileMap, EMPTY_TILE, SPRITE_PIXELS, SPRITE_SIDE};
use crate::font;

pub const SCREEN_W: usize = 128;
pub const SCREEN_H: usize = 128;
pub const SCREEN_SIZE: usize = SCREEN_W * SCREEN_H;

pub struct Console {
    /// Screen buffer: one palette index (0-15) per pixel, row-major.
    pub screen: [u8; SCREEN_SIZE],
    sprites: Vec<Sprite>,
    pub map: TileMap,
    palette: Palette,
}

impl Console {
    pub fn new(sprites: Vec<Sprite>, map: TileMap, palette: Palette) -> Self {
        Console {
            screen: [0u8; SCREEN_SIZE],
            sprites,
            map,
            palette,
        }
    }

    fn sprite(&self, id: i32) -> Option<&Sprite> {
        self.sprites.iter().find(|s| s.id == id)
    }

    /// Write one pixel if it lands on the canvas.
    fn pset(&mut self, x: i32, y: i32, col: u8) {
        if x < 0 || y < 0 || x >= SCREEN_W as i32 || y >= SCREEN_H as i32 {
            return;
        }
        self.screen[y as usize * SCREEN_W + x as usize] = col & 0x0F;
    }

    /// Fill the whole canvas with one palette color.
    pub fn cls(&mut self, col: u8) {
        self.screen.fill(col & 0x0F);
    }

    /// Draw sprite `id` with its top-left corner at `(x, y)`.
    ///
    /// Pixels holding the no-pixel sentinel or palette index 0 are skipped;
    /// index 0 acts as the universal transparent color. An unknown id draws
    /// nothing.
    pub fn spr(&mut self, id: i32, x: i32, y: i32) {
        let pixels = match self.sprite(id) {
            Some(s) if s.data.len() == SPRITE_PIXELS => {
                let mut p = [0i16; SPRITE_PIXELS];
                p.copy_from_slice(&s.data);
                p
            }
            _ => return,
        };
        for (i, &col) in pixels.iter().enumerate() {
            if col <= 0 {
                continue;
            }
            let px = (i % SPRITE_SIDE) as i32;
            let py = (i / SPRITE_SIDE) as i32;
            self.pset(x + px, y + py, col as u8);
        }
    }

    /// Render a string with the built-in font. `\n` returns to the starting
    /// x and advances one line; there is no wrapping.
    pub fn print(&mut self, text: &str, x: i32, y: i32, col: u8) {
        let mut cur_x = x;
        let mut cur_y = y;
        for ch in text.chars() {
            if ch == '\n' {
                cur_x = x;
                cur_y += font::CHAR_H;
                continue;
            }
            if let Some(glyph) = font::glyph(ch) {
                for (row, &bits) in glyph.iter().enumerate() {
                    for bit in 0..3 {
                        if bits & (0x08 >> bit) != 0 {
                            self.pset(cur_x + bit, cur_y + row as i32, col);
                        }
                    }
                }
            }
            cur_x += font::CHAR_W;
        }
    }

    /// Draw a `w x h` window of tiles starting at `(map_x, map_y)` in
    /// tile-space, with its top-left at `(draw_x, draw_y)` on screen. Empty
    /// tiles draw nothing.
    pub fn map_draw(&mut self, map_x: i32, map_y: i32, draw_x: i32, draw_y: i32, w: i32, h: i32) {
        for iy in 0..h {
            for ix in 0..w {
                let id = self.map.tile_at(map_x + ix, map_y + iy);
                if id == EMPTY_TILE {
                    continue;
                }
                self.spr(
                    id,
                    draw_x + ix * SPRITE_SIDE as i32,
                    draw_y + iy * SPRITE_SIDE as i32,
                );
            }
        }
    }

    /// Tile read with the external convention: empty and out-of-range both
    /// read as 0. (Internally the empty sentinel is -1; scripts that check
    /// `mget(...) == 0` rely on the 0 mapping.)
    pub fn mget(&self, tx: i32, ty: i32) -> i32 {
        let tile = self.map.tile_at(tx, ty);
        if tile == EMPTY_TILE {
            0
        } else {
            tile
        }
    }

    /// Tile write into the host-owned map. Out-of-range writes are dropped.
    pub fn mset(&mut self, tx: i32, ty: i32, id: i32) {
        self.map.set_tile(tx, ty, id);
    }

    /// Convert the index buffer to RGBA through the palette.
    /// `out` must hold at least `SCREEN_SIZE * 4` bytes.
    pub fn screen_to_rgba_buf(&self, out: &mut [u8]) {
        for (&idx, rgba) in self.screen.iter().zip(out.chunks_exact_mut(4)) {
            rgba.copy_from_slice(&self.palette.rgba(idx));
        }
    }

    /// Hand the tile map back when the session is torn down, so `mset`
    /// edits made by the script reach the host.
    pub fn into_map(self) -> TileMap {
        self.map
    }
}

#[cfg(feature = "std")]
impl Console {
    pub fn screen_to_rgba(&self) -> alloc::vec::Vec<u8> {
        let mut rgba = alloc::vec![0u8; SCREEN_SIZE * 4];
        self.screen_to_rgba_buf(&mut rgba);
        rgba
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
