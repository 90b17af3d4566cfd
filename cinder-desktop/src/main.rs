mod api;
mod audio_output;
mod runtime;

use macroquad::prelude::*;

use cinder_core::assets::Project;
use cinder_core::console::{SCREEN_H, SCREEN_W};
use cinder_core::input::BUTTON_COUNT;

use audio_output::{AudioOutput, SAMPLES_PER_FRAME, SAMPLE_RATE};
use runtime::Session;

fn window_conf() -> Conf {
    Conf {
        window_title: "Cinder".to_owned(),
        window_width: 512,
        window_height: 512,
        window_resizable: true,
        ..Default::default()
    }
}

fn load_project(path: &str) -> Result<Project, String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("read {path}: {e}"))?;
    serde_json::from_str(&text).map_err(|e| format!("parse {path}: {e}"))
}

/// Poll the six logical buttons: arrows, Z (A), X (B).
fn gather_buttons() -> [bool; BUTTON_COUNT] {
    [
        is_key_down(KeyCode::Left),
        is_key_down(KeyCode::Right),
        is_key_down(KeyCode::Up),
        is_key_down(KeyCode::Down),
        is_key_down(KeyCode::Z),
        is_key_down(KeyCode::X),
    ]
}

#[macroquad::main(window_conf)]
async fn main() {
    let mut project = match std::env::args().nth(1) {
        Some(path) => load_project(&path).unwrap_or_else(|e| {
            eprintln!("[cinder] {e}; starting with the default project");
            Project::default()
        }),
        None => Project::default(),
    };

    let mut audio_output = AudioOutput::new();
    let mut fault_msg: Option<String> = None;

    let mut session = match Session::load(&project) {
        Ok(mut session) => {
            if let Err(fault) = session.init() {
                eprintln!("[cinder] {fault}");
                fault_msg = Some(fault.to_string());
            }
            Some(session)
        }
        Err(e) => {
            eprintln!("[cinder] {e}");
            fault_msg = Some(e.to_string());
            None
        }
    };

    let image = Image::gen_image_color(SCREEN_W as u16, SCREEN_H as u16, BLACK);
    let texture = Texture2D::from_image(&image);
    texture.set_filter(FilterMode::Nearest);

    let mut rgba = vec![0u8; SCREEN_W * SCREEN_H * 4];
    let mut samples = [0.0f32; SAMPLES_PER_FRAME];

    loop {
        // Integer scale that fits the window, canvas centered.
        let sw = screen_width();
        let sh = screen_height();
        let scale = (sw / SCREEN_W as f32).min(sh / SCREEN_H as f32).floor().max(1.0);
        let offset_x = (sw - SCREEN_W as f32 * scale) / 2.0;
        let offset_y = (sh - SCREEN_H as f32 * scale) / 2.0;

        let mut ended = false;
        if let Some(ref mut s) = session {
            if s.is_active() {
                s.update_input(gather_buttons());
                if let Err(fault) = s.tick() {
                    eprintln!("[cinder] {fault}");
                    fault_msg = Some(fault.to_string());
                }
                s.generate_audio(SAMPLE_RATE, &mut samples);
                audio_output.queue_frame(&samples).await;
                if is_key_pressed(KeyCode::Escape) {
                    s.stop();
                }
            }
            s.screen_rgba(&mut rgba);
            ended = !s.is_active();
        }

        if ended {
            if let Some(s) = session.take() {
                // Tile edits the script made through mset go back to the
                // host's copy of the project.
                if let Some(map) = s.finish() {
                    project.map = map;
                }
            }
            audio_output.stop();
            if fault_msg.is_none() {
                break;
            }
        }

        // Quit from the fault overlay.
        if session.is_none() && fault_msg.is_some() && is_key_pressed(KeyCode::Escape) {
            break;
        }

        let frame = Image {
            bytes: rgba.clone(),
            width: SCREEN_W as u16,
            height: SCREEN_H as u16,
        };
        texture.update(&frame);

        clear_background(Color::new(0.08, 0.08, 0.10, 1.0));
        draw_texture_ex(
            &texture,
            offset_x,
            offset_y,
            WHITE,
            DrawTextureParams {
                dest_size: Some(vec2(SCREEN_W as f32 * scale, SCREEN_H as f32 * scale)),
                ..Default::default()
            },
        );

        if let Some(ref msg) = fault_msg {
            draw_text(msg, 4.0, sh - 8.0, 16.0, RED);
        }

        next_frame().await;
    }
}
