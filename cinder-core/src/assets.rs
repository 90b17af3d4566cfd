//! Project asset model: sprites, tile map, sound bank, palette.
//!
//! These are the host-owned data the runtime consumes. Everything that can
//! arrive from outside (user edits, loaded snapshots, generated payloads) is
//! funneled through `sanitize` before a session touches it: wrong-shaped data
//! is dropped, out-of-range values are clamped.

use alloc::string::String;
use alloc::string::ToString;
use alloc::vec;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

/// Sprites are 8x8.
pub const SPRITE_SIDE: usize = 8;
/// Pixels per sprite, row-major.
pub const SPRITE_PIXELS: usize = SPRITE_SIDE * SPRITE_SIDE;
/// Tile map dimensions, fixed for the 128x128 target resolution.
pub const MAP_W: usize = 32;
pub const MAP_H: usize = 16;
/// Number of palette entries. The index is the only color identifier used
/// anywhere else.
pub const PALETTE_SIZE: usize = 16;
/// Tile value meaning "empty, draw nothing".
pub const EMPTY_TILE: i32 = -1;

// ---------------------------------------------------------------------------
// Sprite
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sprite {
    pub id: i32,
    pub name: String,
    /// 64 palette indices, row-major over the 8x8 grid. Values at or below
    /// zero are never drawn.
    pub data: Vec<i16>,
}

impl Sprite {
    pub fn empty(id: i32) -> Self {
        Sprite {
            id,
            name: String::new(),
            data: vec![0; SPRITE_PIXELS],
        }
    }

    /// Clamp pixel values into -1..=15. Returns `false` when the pixel array
    /// has the wrong length, in which case the sprite must be discarded.
    pub fn sanitize(&mut self) -> bool {
        if self.data.len() != SPRITE_PIXELS {
            return false;
        }
        for px in self.data.iter_mut() {
            *px = (*px).clamp(-1, (PALETTE_SIZE - 1) as i16);
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Tile map
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileMap {
    pub width: u32,
    pub height: u32,
    /// `width * height` entries, row-major. Each entry is a sprite id or
    /// `EMPTY_TILE`.
    pub tiles: Vec<i32>,
}

impl TileMap {
    pub fn empty() -> Self {
        TileMap {
            width: MAP_W as u32,
            height: MAP_H as u32,
            tiles: vec![EMPTY_TILE; MAP_W * MAP_H],
        }
    }

    /// Force the fixed runtime dimensions, padding or truncating the tile
    /// array to match.
    pub fn sanitize(&mut self) {
        self.width = MAP_W as u32;
        self.height = MAP_H as u32;
        self.tiles.resize(MAP_W * MAP_H, EMPTY_TILE);
    }

    /// Raw tile lookup. Out-of-range coordinates read as `EMPTY_TILE`.
    pub fn tile_at(&self, tx: i32, ty: i32) -> i32 {
        if tx < 0 || ty < 0 || tx >= self.width as i32 || ty >= self.height as i32 {
            return EMPTY_TILE;
        }
        self.tiles[ty as usize * self.width as usize + tx as usize]
    }

    /// Write a tile. Out-of-range writes are silently dropped.
    pub fn set_tile(&mut self, tx: i32, ty: i32, id: i32) {
        if tx < 0 || ty < 0 || tx >= self.width as i32 || ty >= self.height as i32 {
            return;
        }
        self.tiles[ty as usize * self.width as usize + tx as usize] = id;
    }
}

impl Default for TileMap {
    fn default() -> Self {
        TileMap::empty()
    }
}

// ---------------------------------------------------------------------------
// Sound
// ---------------------------------------------------------------------------

/// Oscillator kinds a sound descriptor can ask for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveKind {
    Square,
    Sawtooth,
    Triangle,
    Sine,
    Noise,
}

/// Parametric sound descriptor. `attack`/`decay`/`release` are durations in
/// seconds; `sustain` is a level fraction of `volume`, not a duration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sound {
    pub id: i32,
    pub name: String,
    #[serde(rename = "type")]
    pub wave: WaveKind,
    pub frequency: f64,
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
    pub volume: f64,
}

impl Sound {
    /// Clamp every field into its legal range. Non-finite values fall back
    /// to silence-safe defaults.
    pub fn sanitize(&mut self) {
        if !self.frequency.is_finite() {
            self.frequency = 440.0;
        }
        self.frequency = self.frequency.clamp(1.0, 20_000.0);
        for t in [&mut self.attack, &mut self.decay, &mut self.release] {
            if !t.is_finite() || *t < 0.0 {
                *t = 0.0;
            }
        }
        self.sustain = if self.sustain.is_finite() {
            self.sustain.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.volume = if self.volume.is_finite() {
            self.volume.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    /// Total audible duration of the envelope.
    pub fn duration(&self) -> f64 {
        self.attack + self.decay + self.release
    }
}

// ---------------------------------------------------------------------------
// Palette
// ---------------------------------------------------------------------------

/// 16 RGBA colors. Sprites, draw calls and clears refer to colors only by
/// index into this table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Palette {
    colors: [[u8; 4]; PALETTE_SIZE],
}

impl Palette {
    /// The classic 16-color set the console ships with.
    pub const DEFAULT_COLORS: [[u8; 4]; PALETTE_SIZE] = [
        [0, 0, 0, 255],       // 0 black
        [29, 43, 83, 255],    // 1 dark blue
        [126, 37, 83, 255],   // 2 dark purple
        [0, 135, 81, 255],    // 3 dark green
        [171, 82, 54, 255],   // 4 brown
        [95, 87, 79, 255],    // 5 dark grey
        [194, 195, 199, 255], // 6 light grey
        [255, 241, 232, 255], // 7 white
        [255, 0, 77, 255],    // 8 red
        [255, 163, 0, 255],   // 9 orange
        [255, 236, 39, 255],  // 10 yellow
        [0, 228, 54, 255],    // 11 green
        [41, 173, 255, 255],  // 12 blue
        [131, 118, 156, 255], // 13 indigo
        [255, 119, 168, 255], // 14 pink
        [255, 204, 170, 255], // 15 peach
    ];

    /// Build a palette from `#RRGGBB` hex strings. Missing or malformed
    /// entries fall back to the default color at that index.
    pub fn from_hex(entries: &[String]) -> Self {
        let mut colors = Self::DEFAULT_COLORS;
        for (i, slot) in colors.iter_mut().enumerate() {
            if let Some(rgba) = entries.get(i).and_then(|s| parse_hex_color(s)) {
                *slot = rgba;
            }
        }
        Palette { colors }
    }

    /// Color for a palette index. The index is masked into range, so any
    /// u8 is safe to pass.
    pub fn rgba(&self, index: u8) -> [u8; 4] {
        self.colors[(index & 0x0F) as usize]
    }
}

impl Default for Palette {
    fn default() -> Self {
        Palette {
            colors: Self::DEFAULT_COLORS,
        }
    }
}

/// Parse `#RRGGBB` (leading `#` optional) into RGBA.
fn parse_hex_color(s: &str) -> Option<[u8; 4]> {
    let hex = s.strip_prefix('#').unwrap_or(s);
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some([r, g, b, 255])
}

// ---------------------------------------------------------------------------
// Project snapshot
// ---------------------------------------------------------------------------

/// Everything the host hands to a runtime session: the asset tables plus the
/// script source. Serialized as plain JSON by whatever persistence layer the
/// host uses; the shape here is the contract, not the format.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub sprites: Vec<Sprite>,
    #[serde(default)]
    pub map: TileMap,
    #[serde(default)]
    pub sounds: Vec<Sound>,
    /// Palette as `#RRGGBB` strings, the form the editors trade in.
    #[serde(default)]
    pub palette: Vec<String>,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub docs: String,
}

impl Project {
    /// Sanitize every asset in place: sprites with malformed pixel arrays
    /// are dropped, everything else is clamped. Returns how many sprites
    /// were discarded.
    pub fn sanitize(&mut self) -> usize {
        let before = self.sprites.len();
        self.sprites.retain_mut(|s| s.sanitize());
        self.map.sanitize();
        for sound in &mut self.sounds {
            sound.sanitize();
        }
        before - self.sprites.len()
    }
}

/// Pixels of the default smiley on sprite 0, as (x, y) pairs drawn in
/// color 10.
const SMILEY_PIXELS: [(usize, usize); 8] = [
    (2, 3),
    (5, 3),
    (1, 5),
    (6, 5),
    (2, 6),
    (3, 6),
    (4, 6),
    (5, 6),
];

const STARTER_CODE: &str = "\
-- starter cart: move the smiley with the d-pad

x = 60
y = 60
t = 0

function _init()
  log(\"cinder ready\")
end

function _update()
  t = t + 1
  if btn(0) then x = x - 1 end
  if btn(1) then x = x + 1 end
  if btn(2) then y = y - 1 end
  if btn(3) then y = y + 1 end
  if btnp(4) then sfx(0) end
end

function _draw()
  cls(0)
  map(0, 0, 0, 0, 32, 16)
  spr(0, x, y)
  print(\"cinder\", 52, 8, 7)
end
";

impl Default for Project {
    /// The starter project: 64 empty sprites with a smiley on sprite 0, an
    /// empty map, 8 identical default sounds, the default palette, and a
    /// small movement demo script.
    fn default() -> Self {
        let mut sprites: Vec<Sprite> = (0..64).map(Sprite::empty).collect();
        for (x, y) in SMILEY_PIXELS {
            sprites[0].data[y * SPRITE_SIDE + x] = 10;
        }
        let sounds = (0..8)
            .map(|i| Sound {
                id: i,
                name: String::new(),
                wave: WaveKind::Square,
                frequency: 440.0,
                attack: 0.01,
                decay: 0.1,
                sustain: 0.1,
                release: 0.1,
                volume: 0.5,
            })
            .collect();
        Project {
            sprites,
            map: TileMap::empty(),
            sounds,
            palette: Vec::new(),
            code: STARTER_CODE.to_string(),
            docs: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sprite_sanitize_rejects_wrong_length() {
        let mut short = Sprite {
            id: 0,
            name: String::new(),
            data: vec![0; 63],
        };
        assert!(!short.sanitize());

        let mut long = Sprite {
            id: 0,
            name: String::new(),
            data: vec![0; 65],
        };
        assert!(!long.sanitize());
    }

    #[test]
    fn sprite_sanitize_clamps_pixels() {
        let mut sprite = Sprite::empty(0);
        sprite.data[0] = -7;
        sprite.data[1] = 99;
        sprite.data[2] = 15;
        assert!(sprite.sanitize());
        assert_eq!(sprite.data[0], -1);
        assert_eq!(sprite.data[1], 15);
        assert_eq!(sprite.data[2], 15);
    }

    #[test]
    fn tilemap_sanitize_forces_dimensions() {
        let mut map = TileMap {
            width: 7,
            height: 3,
            tiles: vec![5; 10],
        };
        map.sanitize();
        assert_eq!(map.width as usize, MAP_W);
        assert_eq!(map.height as usize, MAP_H);
        assert_eq!(map.tiles.len(), MAP_W * MAP_H);
        // Padding uses the empty sentinel.
        assert_eq!(map.tiles[10], EMPTY_TILE);
        assert_eq!(map.tiles[0], 5);
    }

    #[test]
    fn tilemap_out_of_range_reads_and_writes() {
        let mut map = TileMap::empty();
        assert_eq!(map.tile_at(-1, 0), EMPTY_TILE);
        assert_eq!(map.tile_at(0, MAP_H as i32), EMPTY_TILE);
        map.set_tile(MAP_W as i32, 0, 9);
        map.set_tile(0, -1, 9);
        assert!(map.tiles.iter().all(|&t| t == EMPTY_TILE));
    }

    #[test]
    fn sound_sanitize_clamps_fields() {
        let mut sound = Sound {
            id: 0,
            name: String::new(),
            wave: WaveKind::Sine,
            frequency: -20.0,
            attack: -1.0,
            decay: f64::NAN,
            sustain: 3.0,
            release: 0.2,
            volume: -0.5,
        };
        sound.sanitize();
        assert_eq!(sound.frequency, 1.0);
        assert_eq!(sound.attack, 0.0);
        assert_eq!(sound.decay, 0.0);
        assert_eq!(sound.sustain, 1.0);
        assert_eq!(sound.release, 0.2);
        assert_eq!(sound.volume, 0.0);
    }

    #[test]
    fn sound_duration_is_envelope_sum() {
        let sound = Sound {
            id: 0,
            name: String::new(),
            wave: WaveKind::Square,
            frequency: 440.0,
            attack: 0.01,
            decay: 0.1,
            sustain: 0.1,
            release: 0.1,
            volume: 0.5,
        };
        assert!((sound.duration() - 0.21).abs() < 1e-12);
    }

    #[test]
    fn palette_parses_hex_and_falls_back() {
        let entries = vec![
            "#102030".to_string(),
            "not-a-color".to_string(),
            "405060".to_string(),
        ];
        let palette = Palette::from_hex(&entries);
        assert_eq!(palette.rgba(0), [0x10, 0x20, 0x30, 255]);
        assert_eq!(palette.rgba(1), Palette::DEFAULT_COLORS[1]);
        assert_eq!(palette.rgba(2), [0x40, 0x50, 0x60, 255]);
        // Entries beyond the provided list use defaults too.
        assert_eq!(palette.rgba(15), Palette::DEFAULT_COLORS[15]);
    }

    #[test]
    fn palette_index_is_masked() {
        let palette = Palette::default();
        assert_eq!(palette.rgba(16), palette.rgba(0));
        assert_eq!(palette.rgba(0xFF), palette.rgba(15));
    }

    #[test]
    fn default_project_shape() {
        let project = Project::default();
        assert_eq!(project.sprites.len(), 64);
        assert_eq!(project.sounds.len(), 8);
        assert!(!project.code.is_empty());
        // Sprite 0 carries the smiley: exactly 8 pixels of color 10.
        let lit = project.sprites[0].data.iter().filter(|&&p| p == 10).count();
        assert_eq!(lit, 8);
        assert!(project.map.tiles.iter().all(|&t| t == EMPTY_TILE));
    }

    #[test]
    fn project_sanitize_drops_bad_sprites() {
        let mut project = Project::default();
        project.sprites[3].data.truncate(10);
        let dropped = project.sanitize();
        assert_eq!(dropped, 1);
        assert_eq!(project.sprites.len(), 63);
        assert!(project.sprites.iter().all(|s| s.id != 3));
    }

    #[test]
    fn project_json_round_trip() {
        let project = Project::default();
        let json = serde_json::to_string(&project).unwrap();
        let back: Project = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sprites, project.sprites);
        assert_eq!(back.map, project.map);
        assert_eq!(back.sounds, project.sounds);
        assert_eq!(back.code, project.code);
    }

    #[test]
    fn project_json_missing_fields_default() {
        let project: Project = serde_json::from_str("{}").unwrap();
        assert!(project.sprites.is_empty());
        assert_eq!(project.map, TileMap::empty());
        assert!(project.code.is_empty());
    }

    #[test]
    fn wave_kind_serde_names() {
        let json = serde_json::to_string(&WaveKind::Sawtooth).unwrap();
        assert_eq!(json, "\"sawtooth\"");
        let back: WaveKind = serde_json::from_str("\"noise\"").unwrap();
        assert_eq!(back, WaveKind::Noise);
    }
}
