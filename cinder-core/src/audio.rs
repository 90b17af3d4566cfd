//! Sound synthesis: parametric descriptors rendered as fire-and-forget
//! voices.
//!
//! Each `sfx` trigger spawns an independent `Voice` holding an oscillator
//! (or noise source) and a piecewise-linear amplitude envelope. Voices mix
//! into a shared output bus in `generate_samples`, which the host drives on
//! its audio clock, decoupled from the tick loop. Voices are not pooled or
//! capped; the bank is small enough that unbounded concurrency is fine.

use alloc::vec::Vec;
use core::f64::consts::TAU;

use crate::assets::{Sound, WaveKind};
use crate::rng::Xorshift64;

/// Lowest frequency the pitch slide will reach.
const SLIDE_FLOOR_HZ: f64 = 10.0;
/// Extra lifetime for tonal voices past the envelope end, so the slide's
/// final samples are rendered instead of being cut off. The envelope is
/// already at zero, so the tail is silent.
const TONAL_TAIL: f64 = 0.1;

// ---------------------------------------------------------------------------
// Waveforms
// ---------------------------------------------------------------------------

/// One sample (-1.0 ..= 1.0) of a periodic waveform at `phase` in 0..1.
/// Noise has no phase; it is generated per-voice and returns 0 here.
pub fn waveform_sample(wave: WaveKind, phase: f64) -> f64 {
    match wave {
        WaveKind::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        WaveKind::Sawtooth => 2.0 * phase - 1.0,
        WaveKind::Triangle => {
            if phase < 0.5 {
                4.0 * phase - 1.0
            } else {
                3.0 - 4.0 * phase
            }
        }
        WaveKind::Sine => libm::sin(phase * TAU),
        WaveKind::Noise => 0.0,
    }
}

// ---------------------------------------------------------------------------
// Voice
// ---------------------------------------------------------------------------

/// One live instance of a triggered sound. Owned by the engine until its
/// schedule completes.
pub struct Voice {
    wave: WaveKind,
    frequency: f64,
    attack: f64,
    decay: f64,
    sustain: f64,
    release: f64,
    volume: f64,
    /// Oscillator phase accumulator in 0..1.
    phase: f64,
    /// Seconds rendered so far.
    elapsed: f64,
    rng: Xorshift64,
}

impl Voice {
    pub fn from_sound(sound: &Sound, seed: u64) -> Self {
        Voice {
            wave: sound.wave,
            frequency: sound.frequency,
            attack: sound.attack,
            decay: sound.decay,
            sustain: sound.sustain,
            release: sound.release,
            volume: sound.volume,
            phase: 0.0,
            elapsed: 0.0,
            rng: Xorshift64::new(seed),
        }
    }

    /// The four envelope keyframes as (seconds since trigger, amplitude):
    /// silence, peak after attack, sustain level after decay, silence after
    /// release.
    pub fn envelope_keyframes(&self) -> [(f64, f64); 4] {
        let a = self.attack;
        let d = self.decay;
        let r = self.release;
        [
            (0.0, 0.0),
            (a, self.volume),
            (a + d, self.volume * self.sustain),
            (a + d + r, 0.0),
        ]
    }

    /// Amplitude at `t` seconds after the trigger: linear ramps between the
    /// keyframes, zero outside them.
    pub fn envelope_at(&self, t: f64) -> f64 {
        let a = self.attack;
        let d = self.decay;
        let r = self.release;
        let sustain_level = self.volume * self.sustain;
        if t < 0.0 {
            0.0
        } else if t < a {
            self.volume * (t / a)
        } else if t < a + d {
            self.volume + (sustain_level - self.volume) * ((t - a) / d)
        } else if t < a + d + r {
            sustain_level * (1.0 - (t - a - d) / r)
        } else {
            0.0
        }
    }

    /// Oscillator frequency at `t` seconds after the trigger.
    ///
    /// Tonal voices sweep exponentially from the descriptor frequency down
    /// to `max(10 Hz, frequency / 2)` over the decay+release span (measured
    /// from the trigger), then hold. A stylistic sweep, not a physical
    /// model. Noise has no pitch.
    pub fn frequency_at(&self, t: f64) -> f64 {
        let target = if self.frequency / 2.0 > SLIDE_FLOOR_HZ {
            self.frequency / 2.0
        } else {
            SLIDE_FLOOR_HZ
        };
        let span = self.decay + self.release;
        if span <= 0.0 {
            return target;
        }
        let k = (t / span).clamp(0.0, 1.0);
        self.frequency * libm::pow(target / self.frequency, k)
    }

    /// Seconds this voice stays alive. Tonal voices get the slide tail;
    /// noise covers exactly the envelope.
    pub fn lifetime(&self) -> f64 {
        let envelope = self.attack + self.decay + self.release;
        match self.wave {
            WaveKind::Noise => envelope,
            _ => envelope + TONAL_TAIL,
        }
    }

    fn finished(&self) -> bool {
        self.elapsed >= self.lifetime()
    }

    /// Render the next sample and advance the voice by `dt` seconds.
    fn next_sample(&mut self, dt: f64) -> f64 {
        let t = self.elapsed;
        self.elapsed += dt;
        let env = self.envelope_at(t);
        let raw = match self.wave {
            WaveKind::Noise => self.rng.next_bipolar(),
            wave => {
                self.phase += self.frequency_at(t) * dt;
                if self.phase >= 1.0 {
                    self.phase -= libm::floor(self.phase);
                }
                waveform_sample(wave, self.phase)
            }
        };
        raw * env
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct AudioEngine {
    sounds: Vec<Sound>,
    voices: Vec<Voice>,
    /// Bumped per trigger; seeds each voice's noise stream.
    triggers: u64,
}

impl AudioEngine {
    pub fn new(sounds: Vec<Sound>) -> Self {
        AudioEngine {
            sounds,
            voices: Vec::new(),
            triggers: 0,
        }
    }

    /// Trigger sound `id`. An unknown id is a no-op. Returns immediately;
    /// the voice renders when the host next pulls samples.
    pub fn sfx(&mut self, id: i32) {
        if let Some(sound) = self.sounds.iter().find(|s| s.id == id) {
            self.triggers = self.triggers.wrapping_add(1);
            let seed = self.triggers.wrapping_mul(0x2545_F491_4F6C_DD1D);
            self.voices.push(Voice::from_sound(sound, seed));
        }
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Drop every live voice. Used on session teardown.
    pub fn stop_all(&mut self) {
        self.voices.clear();
    }

    /// Mix every live voice into `buf` as mono f32 samples, clamped to
    /// [-1, 1]. Finished voices are retired afterwards. Every element of
    /// `buf` is overwritten.
    pub fn generate_samples(&mut self, sample_rate: u32, buf: &mut [f32]) {
        let dt = 1.0 / sample_rate as f64;
        for slot in buf.iter_mut() {
            let mut mix = 0.0f64;
            for voice in self.voices.iter_mut() {
                if !voice.finished() {
                    mix += voice.next_sample(dt);
                }
            }
            *slot = mix.clamp(-1.0, 1.0) as f32;
        }
        self.voices.retain(|v| !v.finished());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;
    use alloc::vec;

    fn sound(wave: WaveKind) -> Sound {
        Sound {
            id: 0,
            name: String::new(),
            wave,
            frequency: 440.0,
            attack: 0.01,
            decay: 0.1,
            sustain: 0.1,
            release: 0.1,
            volume: 0.5,
        }
    }

    fn engine(wave: WaveKind) -> AudioEngine {
        AudioEngine::new(vec![sound(wave)])
    }

    #[test]
    fn envelope_keyframes_match_descriptor() {
        let voice = Voice::from_sound(&sound(WaveKind::Square), 1);
        let kf = voice.envelope_keyframes();
        let expected = [(0.0, 0.0), (0.01, 0.5), (0.11, 0.05), (0.21, 0.0)];
        for (got, want) in kf.iter().zip(expected.iter()) {
            assert!((got.0 - want.0).abs() < 1e-12, "time {} vs {}", got.0, want.0);
            assert!((got.1 - want.1).abs() < 1e-12, "level {} vs {}", got.1, want.1);
        }
    }

    #[test]
    fn envelope_boundary_values() {
        let voice = Voice::from_sound(&sound(WaveKind::Square), 1);
        assert_eq!(voice.envelope_at(0.0), 0.0);
        assert!((voice.envelope_at(0.01) - 0.5).abs() < 1e-12);
        assert!((voice.envelope_at(0.11) - 0.05).abs() < 1e-12);
        assert_eq!(voice.envelope_at(0.21), 0.0);
        assert_eq!(voice.envelope_at(1.0), 0.0);
        assert_eq!(voice.envelope_at(-0.5), 0.0);
    }

    #[test]
    fn envelope_ramps_are_monotone() {
        let voice = Voice::from_sound(&sound(WaveKind::Sine), 1);
        // Rising through the attack.
        assert!(voice.envelope_at(0.005) < voice.envelope_at(0.009));
        // Falling through the decay.
        assert!(voice.envelope_at(0.05) > voice.envelope_at(0.10));
        // Falling through the release.
        assert!(voice.envelope_at(0.12) > voice.envelope_at(0.20));
    }

    #[test]
    fn pitch_slide_spans_decay_plus_release() {
        let voice = Voice::from_sound(&sound(WaveKind::Square), 1);
        assert!((voice.frequency_at(0.0) - 440.0).abs() < 1e-9);
        // Slide completes at decay + release = 0.2 s, landing on f/2.
        assert!((voice.frequency_at(0.2) - 220.0).abs() < 1e-9);
        assert!((voice.frequency_at(5.0) - 220.0).abs() < 1e-9);
        // Strictly decreasing in between.
        assert!(voice.frequency_at(0.05) > voice.frequency_at(0.15));
    }

    #[test]
    fn pitch_slide_floors_at_ten_hertz() {
        let mut low = sound(WaveKind::Square);
        low.frequency = 12.0;
        let voice = Voice::from_sound(&low, 1);
        assert!((voice.frequency_at(10.0) - SLIDE_FLOOR_HZ).abs() < 1e-9);
    }

    #[test]
    fn tonal_voice_outlives_envelope_by_tail() {
        let voice = Voice::from_sound(&sound(WaveKind::Square), 1);
        assert!((voice.lifetime() - 0.31).abs() < 1e-12);
        let noise = Voice::from_sound(&sound(WaveKind::Noise), 1);
        assert!((noise.lifetime() - 0.21).abs() < 1e-12);
    }

    #[test]
    fn waveform_sample_shapes() {
        assert_eq!(waveform_sample(WaveKind::Square, 0.25), 1.0);
        assert_eq!(waveform_sample(WaveKind::Square, 0.75), -1.0);
        assert!((waveform_sample(WaveKind::Sawtooth, 0.0) + 1.0).abs() < 1e-12);
        assert!((waveform_sample(WaveKind::Sawtooth, 1.0) - 1.0).abs() < 1e-12);
        assert!((waveform_sample(WaveKind::Triangle, 0.0) + 1.0).abs() < 1e-12);
        assert!((waveform_sample(WaveKind::Triangle, 0.5) - 1.0).abs() < 1e-12);
        assert!(waveform_sample(WaveKind::Sine, 0.0).abs() < 1e-12);
        assert!((waveform_sample(WaveKind::Sine, 0.25) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn sfx_unknown_id_is_a_no_op() {
        let mut engine = engine(WaveKind::Square);
        engine.sfx(42);
        assert_eq!(engine.active_voices(), 0);
    }

    #[test]
    fn sfx_spawns_independent_voices() {
        let mut engine = engine(WaveKind::Square);
        engine.sfx(0);
        engine.sfx(0);
        engine.sfx(0);
        assert_eq!(engine.active_voices(), 3);
    }

    #[test]
    fn silence_when_nothing_is_playing() {
        let mut engine = engine(WaveKind::Square);
        let mut buf = vec![1.0f32; 512];
        engine.generate_samples(44_100, &mut buf);
        assert!(buf.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn voice_produces_audio_within_range() {
        for wave in [
            WaveKind::Square,
            WaveKind::Sawtooth,
            WaveKind::Triangle,
            WaveKind::Sine,
            WaveKind::Noise,
        ] {
            let mut engine = engine(wave);
            engine.sfx(0);
            let mut buf = vec![0.0f32; 4410];
            engine.generate_samples(44_100, &mut buf);
            assert!(
                buf.iter().any(|&s| s != 0.0),
                "{:?} produced only silence",
                wave
            );
            assert!(buf.iter().all(|&s| (-1.0..=1.0).contains(&s)));
        }
    }

    #[test]
    fn voice_retires_after_its_schedule() {
        let mut engine = engine(WaveKind::Square);
        engine.sfx(0);
        // Lifetime is 0.31 s; render half a second.
        let mut buf = vec![0.0f32; 22_050];
        engine.generate_samples(44_100, &mut buf);
        assert_eq!(engine.active_voices(), 0);
    }

    #[test]
    fn noise_voice_covers_envelope_then_retires() {
        let mut engine = engine(WaveKind::Noise);
        engine.sfx(0);
        let mut buf = vec![0.0f32; 22_050];
        engine.generate_samples(44_100, &mut buf);
        assert_eq!(engine.active_voices(), 0);
        // Samples past the envelope end (0.21 s => sample 9261) are silent.
        assert!(buf[9500..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn amplitude_tracks_the_envelope() {
        let mut engine = engine(WaveKind::Square);
        engine.sfx(0);
        let mut buf = vec![0.0f32; 13_230]; // 0.3 s
        engine.generate_samples(44_100, &mut buf);
        // Near the attack peak (t ~ 0.01, sample 441) amplitude approaches
        // the descriptor volume; near the end it has decayed well below.
        let peak: f32 = buf[300..600].iter().fold(0.0, |m, &s| m.max(s.abs()));
        let late: f32 = buf[9000..9200].iter().fold(0.0, |m, &s| m.max(s.abs()));
        assert!(peak > 0.4, "peak {}", peak);
        assert!(late < 0.06, "late {}", late);
    }

    #[test]
    fn mix_is_clamped() {
        let mut bank = sound(WaveKind::Square);
        bank.volume = 1.0;
        bank.sustain = 1.0;
        let mut engine = AudioEngine::new(vec![bank]);
        for _ in 0..8 {
            engine.sfx(0);
        }
        let mut buf = vec![0.0f32; 2048];
        engine.generate_samples(44_100, &mut buf);
        assert!(buf.iter().all(|&s| (-1.0..=1.0).contains(&s)));
        assert!(buf.iter().any(|&s| s.abs() > 0.9));
    }

    #[test]
    fn stop_all_drops_voices() {
        let mut engine = engine(WaveKind::Square);
        engine.sfx(0);
        engine.sfx(0);
        engine.stop_all();
        assert_eq!(engine.active_voices(), 0);
    }

    #[test]
    fn identical_triggers_render_identically() {
        let mut a = engine(WaveKind::Noise);
        let mut b = engine(WaveKind::Noise);
        a.sfx(0);
        b.sfx(0);
        let mut buf_a = vec![0.0f32; 1024];
        let mut buf_b = vec![0.0f32; 1024];
        a.generate_samples(44_100, &mut buf_a);
        b.generate_samples(44_100, &mut buf_b);
        assert_eq!(buf_a, buf_b);
    }
}
