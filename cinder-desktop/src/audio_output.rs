//! Frame-synchronized audio output.
//!
//! Each displayed frame, the host pulls one frame's worth of mono samples
//! from the synthesis engine and hands them here. The samples are wrapped in
//! a minimal in-memory WAV and played through macroquad's audio system.
//! macroquad has no raw PCM streaming API, but decoding a ~1.5 KB WAV per
//! frame is cheap and keeps the dependency set unchanged.
//!
//! macroquad never frees `Sound` handles on drop, so a small ring of recent
//! handles is kept: pushing a new frame stops and evicts the oldest, which
//! bounds live handles and cuts off stale playback. Audio trails the video
//! by one frame, which is normal for frame-synchronized retro output.

use macroquad::audio::{load_sound_from_bytes, play_sound, stop_sound, PlaySoundParams, Sound};

/// Output sample rate.
pub const SAMPLE_RATE: u32 = 44_100;

/// The runtime targets 60 logical ticks per second.
const TARGET_FPS: u32 = 60;

/// Mono samples per frame at the target rate: 735.
pub const SAMPLES_PER_FRAME: usize = (SAMPLE_RATE / TARGET_FPS) as usize;

/// Frames whose loudest sample sits below this are skipped entirely;
/// floating-point residue from the mixer should not schedule playback.
const SILENCE_FLOOR: f32 = 0.001;

/// Sound handles kept alive: the playing frame plus a little slack for
/// frames still draining.
const HANDLE_RING: usize = 4;

pub struct AudioOutput {
    handles: Vec<Sound>,
    next_slot: usize,
    /// Master volume, applied to the PCM data while encoding.
    volume: f32,
    /// Reused WAV scratch buffer.
    wav: Vec<u8>,
}

impl AudioOutput {
    pub fn new() -> Self {
        AudioOutput {
            handles: Vec::with_capacity(HANDLE_RING),
            next_slot: 0,
            volume: 1.0,
            wav: Vec::with_capacity(44 + SAMPLES_PER_FRAME * 2),
        }
    }

    #[allow(dead_code)]
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    #[allow(dead_code)]
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Encode and play one frame of samples. Silent frames are dropped
    /// before any encoding happens.
    pub async fn queue_frame(&mut self, samples: &[f32]) {
        if self.volume < SILENCE_FLOOR || peak(samples) < SILENCE_FLOOR {
            return;
        }
        encode_wav_mono16(samples, SAMPLE_RATE, self.volume, &mut self.wav);
        match load_sound_from_bytes(&self.wav).await {
            Ok(sound) => {
                play_sound(
                    &sound,
                    PlaySoundParams {
                        looped: false,
                        volume: 1.0,
                    },
                );
                self.retain_handle(sound);
            }
            Err(e) => eprintln!("[cinder] audio frame rejected: {e}"),
        }
    }

    /// Ring-buffer the handle; the evicted slot is stopped first.
    fn retain_handle(&mut self, sound: Sound) {
        if self.handles.len() < HANDLE_RING {
            self.handles.push(sound);
            self.next_slot = self.handles.len() % HANDLE_RING;
        } else {
            stop_sound(&self.handles[self.next_slot]);
            self.handles[self.next_slot] = sound;
            self.next_slot = (self.next_slot + 1) % HANDLE_RING;
        }
    }

    /// Stop everything still draining and drop the handles. Called when the
    /// session ends.
    pub fn stop(&mut self) {
        for handle in &self.handles {
            stop_sound(handle);
        }
        self.handles.clear();
        self.next_slot = 0;
    }
}

/// Loudest absolute sample in the buffer.
fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
}

/// Encode f32 samples as a 16-bit mono PCM WAV into `out`, scaling by
/// `volume` and clamping afterwards. `out` is cleared first and reused
/// across frames.
fn encode_wav_mono16(samples: &[f32], sample_rate: u32, volume: f32, out: &mut Vec<u8>) {
    let data_len = (samples.len() * 2) as u32;
    out.clear();
    out.reserve(44 + samples.len() * 2);

    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes()); // PCM chunk size
    out.extend_from_slice(&1u16.to_le_bytes()); // format: PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
    out.extend_from_slice(&2u16.to_le_bytes()); // block align
    out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for &sample in samples {
        let scaled = (sample * volume).clamp(-1.0, 1.0);
        let pcm = (scaled * i16::MAX as f32) as i16;
        out.extend_from_slice(&pcm.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_header_layout() {
        let mut buf = Vec::new();
        encode_wav_mono16(&[0.0; 100], SAMPLE_RATE, 1.0, &mut buf);

        assert_eq!(buf.len(), 44 + 200);
        assert_eq!(&buf[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(buf[4..8].try_into().unwrap()), 236);
        assert_eq!(&buf[8..12], b"WAVE");
        assert_eq!(&buf[12..16], b"fmt ");
        // channels, sample rate, bits per sample
        assert_eq!(u16::from_le_bytes(buf[22..24].try_into().unwrap()), 1);
        assert_eq!(
            u32::from_le_bytes(buf[24..28].try_into().unwrap()),
            SAMPLE_RATE
        );
        assert_eq!(u16::from_le_bytes(buf[34..36].try_into().unwrap()), 16);
        assert_eq!(&buf[36..40], b"data");
        assert_eq!(u32::from_le_bytes(buf[40..44].try_into().unwrap()), 200);
    }

    #[test]
    fn wav_samples_scale_and_clamp() {
        let mut buf = Vec::new();
        encode_wav_mono16(&[1.0, -1.0, 0.0, 0.5, 2.0], SAMPLE_RATE, 1.0, &mut buf);
        let sample = |i: usize| i16::from_le_bytes(buf[44 + i * 2..46 + i * 2].try_into().unwrap());
        assert_eq!(sample(0), i16::MAX);
        assert_eq!(sample(1), -i16::MAX);
        assert_eq!(sample(2), 0);
        assert!((sample(3) - i16::MAX / 2).abs() <= 1);
        assert_eq!(sample(4), i16::MAX); // clamped
    }

    #[test]
    fn wav_volume_scales_pcm() {
        let mut buf = Vec::new();
        encode_wav_mono16(&[1.0], SAMPLE_RATE, 0.5, &mut buf);
        let s = i16::from_le_bytes(buf[44..46].try_into().unwrap());
        assert!((s - i16::MAX / 2).abs() <= 1);
    }

    #[test]
    fn wav_buffer_is_reused_cleanly() {
        let mut buf = Vec::new();
        encode_wav_mono16(&[0.0; 500], SAMPLE_RATE, 1.0, &mut buf);
        assert_eq!(buf.len(), 44 + 1000);
        encode_wav_mono16(&[0.0; 10], SAMPLE_RATE, 1.0, &mut buf);
        assert_eq!(buf.len(), 44 + 20);
    }

    #[test]
    fn peak_finds_loudest_magnitude() {
        assert_eq!(peak(&[]), 0.0);
        assert_eq!(peak(&[0.0, -0.7, 0.3]), 0.7);
    }

    #[test]
    fn silence_floor_catches_residue() {
        assert!(peak(&[0.0005, -0.0008]) < SILENCE_FLOOR);
        assert!(peak(&[0.0, 0.01]) >= SILENCE_FLOOR);
    }

    #[test]
    fn volume_is_clamped() {
        let mut output = AudioOutput::new();
        assert_eq!(output.volume(), 1.0);
        output.set_volume(3.0);
        assert_eq!(output.volume(), 1.0);
        output.set_volume(-1.0);
        assert_eq!(output.volume(), 0.0);
    }

    #[test]
    fn samples_per_frame_matches_target_rate() {
        assert_eq!(SAMPLES_PER_FRAME, 735);
    }
}
