//! Lua API layer: the sandbox's entire capability surface.
//!
//! The Lua state is created with no standard libraries at all, then exactly
//! the console API is registered into its globals. Nothing else is reachable
//! from script code: no `os`, no `io`, no `require`. Console, audio, input
//! and RNG state are shared with the host through `Lua::set_app_data`.

use mlua::prelude::*;
use mlua::{LuaOptions, StdLib};

use cinder_core::assets::{MAP_H, MAP_W};
use cinder_core::audio::AudioEngine;
use cinder_core::console::Console;
use cinder_core::input::ButtonState;
use cinder_core::rng::Xorshift64;

// ---------------------------------------------------------------------------
// Value coercion helpers
// ---------------------------------------------------------------------------

/// Convert a Lua value to f64, `None` for nil/absent/unconvertible.
fn val_to_f64(v: &LuaValue) -> Option<f64> {
    match v {
        LuaValue::Integer(n) => Some(*n as f64),
        LuaValue::Number(n) => Some(*n),
        LuaValue::String(s) => s.to_str().ok().and_then(|s| s.parse::<f64>().ok()),
        _ => None,
    }
}

/// Convert a Lua value to an integer, flooring fractional positions the way
/// every drawing call expects.
fn val_to_i32(v: &LuaValue) -> Option<i32> {
    val_to_f64(v).map(|n| n.floor() as i32)
}

/// Render a Lua value for `print`/`log`.
fn val_to_display(v: &LuaValue) -> String {
    match v {
        LuaValue::String(s) => s.to_str().map(|s| s.to_string()).unwrap_or_default(),
        LuaValue::Integer(n) => n.to_string(),
        LuaValue::Number(n) => format!("{n}"),
        LuaValue::Boolean(b) => (if *b { "true" } else { "false" }).to_string(),
        LuaValue::Nil => "nil".to_string(),
        LuaValue::Table(_) => "[table]".to_string(),
        _ => String::new(),
    }
}

/// Borrow a piece of session state out of Lua app data.
macro_rules! app_state_mut {
    ($lua:expr, $ty:ty) => {
        $lua.app_data_mut::<$ty>()
            .ok_or_else(|| mlua::Error::runtime("session state detached"))
    };
}

macro_rules! app_state_ref {
    ($lua:expr, $ty:ty) => {
        $lua.app_data_ref::<$ty>()
            .ok_or_else(|| mlua::Error::runtime("session state detached"))
    };
}

// ---------------------------------------------------------------------------
// Sandbox construction
// ---------------------------------------------------------------------------

/// Build a Lua state whose global namespace holds the console API and
/// nothing else.
pub fn create_sandbox() -> LuaResult<Lua> {
    let lua = Lua::new_with(StdLib::NONE, LuaOptions::default())?;
    register_graphics(&lua)?;
    register_map(&lua)?;
    register_input(&lua)?;
    register_audio(&lua)?;
    register_math(&lua)?;
    register_diagnostics(&lua)?;
    Ok(lua)
}

// ---------------------------------------------------------------------------
// Graphics
// ---------------------------------------------------------------------------

fn register_graphics(lua: &Lua) -> LuaResult<()> {
    let globals = lua.globals();

    globals.set(
        "cls",
        lua.create_function(|lua, args: LuaMultiValue| {
            let col = args.get(0).and_then(val_to_i32).unwrap_or(0);
            let mut con = app_state_mut!(lua, Console)?;
            con.cls(col as u8);
            Ok(())
        })?,
    )?;

    globals.set(
        "spr",
        lua.create_function(|lua, args: LuaMultiValue| {
            let id = args.get(0).and_then(val_to_i32).unwrap_or(0);
            let x = args.get(1).and_then(val_to_i32).unwrap_or(0);
            let y = args.get(2).and_then(val_to_i32).unwrap_or(0);
            let mut con = app_state_mut!(lua, Console)?;
            con.spr(id, x, y);
            Ok(())
        })?,
    )?;

    globals.set(
        "print",
        lua.create_function(|lua, args: LuaMultiValue| {
            let text = args.get(0).map(val_to_display).unwrap_or_default();
            let x = args.get(1).and_then(val_to_i32).unwrap_or(0);
            let y = args.get(2).and_then(val_to_i32).unwrap_or(0);
            let col = args.get(3).and_then(val_to_i32).unwrap_or(7);
            let mut con = app_state_mut!(lua, Console)?;
            con.print(&text, x, y, col as u8);
            Ok(())
        })?,
    )?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Tile map
// ---------------------------------------------------------------------------

fn register_map(lua: &Lua) -> LuaResult<()> {
    let globals = lua.globals();

    globals.set(
        "map",
        lua.create_function(|lua, args: LuaMultiValue| {
            let map_x = args.get(0).and_then(val_to_i32).unwrap_or(0);
            let map_y = args.get(1).and_then(val_to_i32).unwrap_or(0);
            let draw_x = args.get(2).and_then(val_to_i32).unwrap_or(0);
            let draw_y = args.get(3).and_then(val_to_i32).unwrap_or(0);
            let w = args.get(4).and_then(val_to_i32).unwrap_or(MAP_W as i32);
            let h = args.get(5).and_then(val_to_i32).unwrap_or(MAP_H as i32);
            let mut con = app_state_mut!(lua, Console)?;
            con.map_draw(map_x, map_y, draw_x, draw_y, w, h);
            Ok(())
        })?,
    )?;

    globals.set(
        "mget",
        lua.create_function(|lua, args: LuaMultiValue| {
            let tx = args.get(0).and_then(val_to_i32).unwrap_or(0);
            let ty = args.get(1).and_then(val_to_i32).unwrap_or(0);
            let con = app_state_ref!(lua, Console)?;
            Ok(con.mget(tx, ty))
        })?,
    )?;

    globals.set(
        "mset",
        lua.create_function(|lua, args: LuaMultiValue| {
            let tx = args.get(0).and_then(val_to_i32).unwrap_or(0);
            let ty = args.get(1).and_then(val_to_i32).unwrap_or(0);
            let id = args.get(2).and_then(val_to_i32).unwrap_or(0);
            let mut con = app_state_mut!(lua, Console)?;
            con.mset(tx, ty, id);
            Ok(())
        })?,
    )?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

fn register_input(lua: &Lua) -> LuaResult<()> {
    let globals = lua.globals();

    globals.set(
        "btn",
        lua.create_function(|lua, args: LuaMultiValue| {
            let i = args.get(0).and_then(val_to_i32).unwrap_or(-1);
            let buttons = app_state_ref!(lua, ButtonState)?;
            Ok(buttons.btn(i))
        })?,
    )?;

    globals.set(
        "btnp",
        lua.create_function(|lua, args: LuaMultiValue| {
            let i = args.get(0).and_then(val_to_i32).unwrap_or(-1);
            let buttons = app_state_ref!(lua, ButtonState)?;
            Ok(buttons.btnp(i))
        })?,
    )?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Audio
// ---------------------------------------------------------------------------

fn register_audio(lua: &Lua) -> LuaResult<()> {
    let globals = lua.globals();

    globals.set(
        "sfx",
        lua.create_function(|lua, args: LuaMultiValue| {
            let id = args.get(0).and_then(val_to_i32).unwrap_or(-1);
            let mut audio = app_state_mut!(lua, AudioEngine)?;
            audio.sfx(id);
            Ok(())
        })?,
    )?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Numeric helpers
// ---------------------------------------------------------------------------

fn register_math(lua: &Lua) -> LuaResult<()> {
    let globals = lua.globals();

    globals.set(
        "flr",
        lua.create_function(|_lua, args: LuaMultiValue| {
            let x = args.get(0).and_then(val_to_f64).unwrap_or(0.0);
            Ok(x.floor())
        })?,
    )?;

    globals.set(
        "ceil",
        lua.create_function(|_lua, args: LuaMultiValue| {
            let x = args.get(0).and_then(val_to_f64).unwrap_or(0.0);
            Ok(x.ceil())
        })?,
    )?;

    globals.set(
        "abs",
        lua.create_function(|_lua, args: LuaMultiValue| {
            let x = args.get(0).and_then(val_to_f64).unwrap_or(0.0);
            Ok(x.abs())
        })?,
    )?;

    globals.set(
        "max",
        lua.create_function(|_lua, args: LuaMultiValue| {
            let a = args.get(0).and_then(val_to_f64).unwrap_or(0.0);
            let b = args.get(1).and_then(val_to_f64).unwrap_or(0.0);
            Ok(a.max(b))
        })?,
    )?;

    globals.set(
        "min",
        lua.create_function(|_lua, args: LuaMultiValue| {
            let a = args.get(0).and_then(val_to_f64).unwrap_or(0.0);
            let b = args.get(1).and_then(val_to_f64).unwrap_or(0.0);
            Ok(a.min(b))
        })?,
    )?;

    globals.set(
        "sin",
        lua.create_function(|_lua, args: LuaMultiValue| {
            let x = args.get(0).and_then(val_to_f64).unwrap_or(0.0);
            Ok(x.sin())
        })?,
    )?;

    globals.set(
        "cos",
        lua.create_function(|_lua, args: LuaMultiValue| {
            let x = args.get(0).and_then(val_to_f64).unwrap_or(0.0);
            Ok(x.cos())
        })?,
    )?;

    globals.set(
        "rnd",
        lua.create_function(|lua, args: LuaMultiValue| {
            let max = args.get(0).and_then(val_to_f64).unwrap_or(1.0);
            let mut rng = app_state_mut!(lua, Xorshift64)?;
            Ok(rng.next_f64() * max)
        })?,
    )?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

fn register_diagnostics(lua: &Lua) -> LuaResult<()> {
    let globals = lua.globals();

    globals.set(
        "log",
        lua.create_function(|_lua, args: LuaMultiValue| {
            let text = args.get(0).map(val_to_display).unwrap_or_default();
            eprintln!("[cinder] {text}");
            Ok(())
        })?,
    )?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
