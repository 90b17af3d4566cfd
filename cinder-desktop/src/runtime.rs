//! The script runtime: one sandboxed session per run of a project.
//!
//! A session moves through `Initializing -> Running -> Stopped`; loading
//! failures never produce a session at all. Faults are fatal: the session
//! halts, reports a single `RuntimeFault`, and requires a fresh load to run
//! again. Ticks are driven by the host's frame callback, one `_update` plus
//! one `_draw` per call, with no wall-clock catch-up.

use mlua::prelude::*;
use std::fmt;
use thiserror::Error;

use cinder_core::assets::{Palette, Project, TileMap};
use cinder_core::audio::AudioEngine;
use cinder_core::console::Console;
use cinder_core::input::{ButtonState, BUTTON_COUNT};
use cinder_core::rng::Xorshift64;

use crate::api;

/// Seed for the session RNG. Fixed, so a session's `rnd()` stream is
/// reproducible run to run.
const SESSION_SEED: u64 = 0x51D3_C0DE_0000_0001;

/// Which lifecycle hook a fault was raised from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Init,
    Update,
    Draw,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Init => "_init",
            Phase::Update => "_update",
            Phase::Draw => "_draw",
        })
    }
}

/// The script failed to compile or bind. The session never started.
#[derive(Debug, Error)]
#[error("script load failed: {0}")]
pub struct LoadError(pub String);

/// An uncaught script error. Fatal: the session halts and will not resume.
#[derive(Debug, Error)]
#[error("uncaught error in {phase}: {message}")]
pub struct RuntimeFault {
    pub phase: Phase,
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Faulted,
    StoppedByHost,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Running,
    Stopped(StopReason),
}

/// One run of a project: the sandboxed Lua state plus the session-scoped
/// console, audio, input and RNG state living in its app data.
pub struct Session {
    lua: Lua,
    state: SessionState,
    ticks: u64,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("ticks", &self.ticks)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Bind the API, install session state, and execute the script chunk.
    ///
    /// The project is copied and sanitized first; the original stays
    /// untouched until `finish` hands the (possibly mutated) tile map back.
    /// Any Lua error while executing the chunk is a fatal `LoadError`.
    pub fn load(project: &Project) -> Result<Session, LoadError> {
        let mut project = project.clone();
        let dropped = project.sanitize();
        if dropped > 0 {
            eprintln!("[cinder] dropped {dropped} malformed sprite(s)");
        }

        let lua = api::create_sandbox().map_err(|e| LoadError(e.to_string()))?;
        let palette = Palette::from_hex(&project.palette);
        lua.set_app_data(Console::new(project.sprites, project.map, palette));
        lua.set_app_data(AudioEngine::new(project.sounds));
        lua.set_app_data(ButtonState::new());
        lua.set_app_data(Xorshift64::new(SESSION_SEED));

        lua.load(&project.code)
            .set_name("script")
            .exec()
            .map_err(|e| LoadError(e.to_string()))?;

        Ok(Session {
            lua,
            state: SessionState::Initializing,
            ticks: 0,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True until the session reaches a terminal state.
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            SessionState::Initializing | SessionState::Running
        )
    }

    /// Ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Call an optional lifecycle hook. A hook the script does not define
    /// is a no-op.
    fn call_hook(&self, name: &str, phase: Phase) -> Result<(), RuntimeFault> {
        if let Ok(func) = self.lua.globals().get::<LuaFunction>(name) {
            func.call::<()>(()).map_err(|e| RuntimeFault {
                phase,
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Run `_init` exactly once. A fault here is terminal; the session never
    /// enters `Running`.
    pub fn init(&mut self) -> Result<(), RuntimeFault> {
        if self.state != SessionState::Initializing {
            return Ok(());
        }
        match self.call_hook("_init", Phase::Init) {
            Ok(()) => {
                self.state = SessionState::Running;
                Ok(())
            }
            Err(fault) => {
                self.teardown(StopReason::Faulted);
                Err(fault)
            }
        }
    }

    /// One tick: `_update`, then `_draw`. A fault in `_update` skips `_draw`
    /// for this tick and halts the session, so no later tick runs either.
    /// Ticks against a non-running session are no-ops.
    pub fn tick(&mut self) -> Result<(), RuntimeFault> {
        if self.state != SessionState::Running {
            return Ok(());
        }
        self.ticks += 1;
        if let Err(fault) = self.call_hook("_update", Phase::Update) {
            self.teardown(StopReason::Faulted);
            return Err(fault);
        }
        if let Err(fault) = self.call_hook("_draw", Phase::Draw) {
            self.teardown(StopReason::Faulted);
            return Err(fault);
        }
        Ok(())
    }

    /// Host-issued stop. Safe to call at any time and idempotent; takes
    /// effect before the next tick.
    pub fn stop(&mut self) {
        if self.is_active() {
            self.teardown(StopReason::StoppedByHost);
        }
    }

    fn teardown(&mut self, reason: StopReason) {
        if matches!(self.state, SessionState::Stopped(_)) {
            return;
        }
        self.state = SessionState::Stopped(reason);
        if let Some(mut audio) = self.lua.app_data_mut::<AudioEngine>() {
            audio.stop_all();
        }
    }

    /// Latch this tick's physical button state. Ignored once the session has
    /// stopped; the per-session input binding ends with the session.
    pub fn update_input(&mut self, held: [bool; BUTTON_COUNT]) {
        if !self.is_active() {
            return;
        }
        if let Some(mut buttons) = self.lua.app_data_mut::<ButtonState>() {
            buttons.latch(held);
        }
    }

    /// Rasterized frame as RGBA. `out` must hold 128*128*4 bytes.
    pub fn screen_rgba(&self, out: &mut [u8]) {
        if let Some(console) = self.lua.app_data_ref::<Console>() {
            console.screen_to_rgba_buf(out);
        }
    }

    /// Mix pending voices into `buf` on the host's audio clock.
    pub fn generate_audio(&mut self, sample_rate: u32, buf: &mut [f32]) {
        match self.lua.app_data_mut::<AudioEngine>() {
            Some(mut audio) => audio.generate_samples(sample_rate, buf),
            None => buf.fill(0.0),
        }
    }

    /// Consume the session and hand the tile map back to the host, so tile
    /// edits the script made through `mset` survive the session.
    pub fn finish(self) -> Option<TileMap> {
        self.lua.remove_app_data::<Console>().map(Console::into_map)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
