//! Reference engine — a small polyphonic synth that speaks the engine contract.
//!
//! It models the core of the parameter surface (drive, level, noise, ADSR,
//! waveform, post gain, limiter, notes). Everything else is accepted and
//! ignored, so any command the bridge routes can be applied to it.

use crate::codec;
use crate::engine::{Arg, EngineCall, EngineLoader, SynthEngine};
use crate::error::{EngineError, EngineFault};

use super::envelope::Adsr;
use super::oscillator::Waveform;
use super::voice::Voice;

pub const VOICE_COUNT: usize = 8;

/// Header of an empty WebAssembly binary: magic followed by version 1.
pub const MODULE_HEADER: [u8; 8] = [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

#[derive(Debug)]
pub struct ReferenceEngine {
    voices: Vec<Voice>,
    adsr: Adsr,
    waveform: Waveform,
    drive: f32,
    level: f32,
    noise_level: f32,
    noise_drone: bool,
    noise_gate_follow: bool,
    post_gain: f32,
    limiter: f32,
    noise: u32,
    stamp: u64,
}

impl ReferenceEngine {
    pub fn new(sample_rate: f32) -> Self {
        ReferenceEngine {
            voices: (0..VOICE_COUNT).map(|_| Voice::new(sample_rate)).collect(),
            adsr: Adsr::default(),
            waveform: Waveform::Sine,
            drive: 0.0,
            level: 0.8,
            noise_level: 0.0,
            noise_drone: false,
            noise_gate_follow: true,
            post_gain: 1.0,
            limiter: 1.0,
            noise: 0x9E37_79B9,
            stamp: 0,
        }
    }

    /// Voices currently holding a note or releasing one.
    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| !v.is_free()).count()
    }

    fn note_on(&mut self, note_id: i32, frequency: f32, mod_index: f32) {
        self.stamp += 1;
        let index = self
            .voices
            .iter()
            .position(|v| v.note_id() == Some(note_id))
            .or_else(|| self.voices.iter().position(Voice::is_free))
            .or_else(|| {
                self.voices
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, v)| v.started())
                    .map(|(i, _)| i)
            });
        if let Some(i) = index {
            self.voices[i].start(note_id, frequency, mod_index, self.adsr, self.stamp);
        }
    }

    fn note_off(&mut self, note_id: i32) {
        for voice in self.voices.iter_mut().filter(|v| v.note_id() == Some(note_id)) {
            voice.release();
        }
    }

    /// xorshift32 mapped to [-1, 1).
    fn next_noise(&mut self) -> f32 {
        let mut x = self.noise;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.noise = x;
        (x as f32 / u32::MAX as f32) * 2.0 - 1.0
    }
}

impl SynthEngine for ReferenceEngine {
    fn apply(&mut self, call: &EngineCall) -> Result<(), EngineFault> {
        let bad = call.args().as_slice().iter().any(|a| match a {
            Arg::Number(v) => !v.is_finite(),
            _ => false,
        });
        if bad {
            return Err(EngineFault::new(call.setter(), "non-finite argument"));
        }

        match *call {
            EngineCall::SetDrive { val } => self.drive = val.max(0.0),
            EngineCall::SetFmLevel { level } => self.level = level.clamp(0.0, 1.0),
            EngineCall::SetNoiseLevel { level } => self.noise_level = level.clamp(0.0, 1.0),
            EngineCall::SetNoiseDrone { enabled } => self.noise_drone = enabled,
            EngineCall::SetNoiseGateFollow { follow } => self.noise_gate_follow = follow,
            EngineCall::SetPostGain { gain } => self.post_gain = gain.max(0.0),
            EngineCall::SetLimiter { amount } => self.limiter = amount.clamp(0.0, 1.0),
            EngineCall::SetAdsr {
                attack_ms,
                decay_ms,
                sustain,
                release_ms,
            } => {
                self.adsr = Adsr {
                    attack_ms,
                    decay_ms,
                    sustain,
                    release_ms,
                }
                .sanitized();
            }
            EngineCall::SetSynthType { synth_type } => {
                self.waveform = Waveform::from_synth_type(synth_type);
                for voice in &mut self.voices {
                    voice.set_waveform(self.waveform);
                }
            }
            EngineCall::NoteOn {
                note_id,
                frequency,
                mod_index,
            } => self.note_on(note_id, frequency, mod_index),
            EngineCall::NoteOff { note_id } => self.note_off(note_id),
            EngineCall::AllNotesOff {} => self.voices.iter_mut().for_each(Voice::release),
            EngineCall::Panic {} => self.voices.iter_mut().for_each(Voice::kill),
            _ => log::trace!("{} not modeled", call.setter()),
        }
        Ok(())
    }

    fn render_block(&mut self, output: &mut [f32]) -> Result<(), EngineFault> {
        let gate_noise = self.noise_drone || !self.noise_gate_follow || self.active_voices() > 0;
        let drive = 1.0 + self.drive;
        for sample in output.iter_mut() {
            let mut mix = 0.0;
            for voice in &mut self.voices {
                mix += voice.next_sample();
            }
            mix *= self.level / VOICE_COUNT as f32 * 2.0;
            if gate_noise && self.noise_level > 0.0 {
                mix += self.next_noise() * self.noise_level;
            }
            let post = mix * drive * self.post_gain;
            let limited = post + (post.tanh() - post) * self.limiter;
            *sample = limited.clamp(-1.0, 1.0);
        }
        Ok(())
    }
}

/// Builds [`ReferenceEngine`]s, accepting any payload with a valid
/// WebAssembly binary header.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceLoader;

impl EngineLoader for ReferenceLoader {
    type Engine = ReferenceEngine;

    fn load(&mut self, module: &[u8], sample_rate: f32) -> Result<ReferenceEngine, EngineError> {
        validate_header(module)?;
        Ok(ReferenceEngine::new(sample_rate))
    }
}

fn validate_header(module: &[u8]) -> Result<(), EngineError> {
    if module.len() < MODULE_HEADER.len() {
        return Err(EngineError::MalformedModule {
            reason: format!("expected an 8 byte header, got {} bytes", module.len()),
        });
    }
    if module[..4] != MODULE_HEADER[..4] {
        return Err(EngineError::MalformedModule {
            reason: format!("bad magic {:?}", codec::decode(&module[..4])),
        });
    }
    let version = u32::from_le_bytes([module[4], module[5], module[6], module[7]]);
    if version != 1 {
        return Err(EngineError::MalformedModule {
            reason: format!("unsupported version {version}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48000.0;

    fn engine() -> ReferenceEngine {
        ReferenceLoader.load(&MODULE_HEADER, SR).unwrap()
    }

    fn block(engine: &mut ReferenceEngine) -> Vec<f32> {
        let mut out = vec![0.0; 128];
        engine.render_block(&mut out).unwrap();
        out
    }

    fn note(id: i32) -> EngineCall {
        EngineCall::NoteOn {
            note_id: id,
            frequency: 220.0 + id as f32 * 10.0,
            mod_index: 0.0,
        }
    }

    #[test]
    fn loader_checks_header() {
        assert!(ReferenceLoader.load(&MODULE_HEADER, SR).is_ok());
        let err = ReferenceLoader.load(&[], SR).err().unwrap();
        assert_eq!(
            err.to_string(),
            "Malformed engine module: expected an 8 byte header, got 0 bytes"
        );
        let err = ReferenceLoader.load(b"ELF\x7f\x01\x00\x00\x00", SR).err().unwrap();
        assert!(err.to_string().contains("bad magic"), "got {err}");
        let mut v2 = MODULE_HEADER;
        v2[4] = 2;
        let err = ReferenceLoader.load(&v2, SR).err().unwrap();
        assert!(err.to_string().contains("unsupported version 2"));
    }

    #[test]
    fn silent_without_notes() {
        let mut e = engine();
        assert!(block(&mut e).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn note_on_makes_sound_and_note_off_releases() {
        let mut e = engine();
        e.apply(&EngineCall::SetAdsr {
            attack_ms: 0.0,
            decay_ms: 0.0,
            sustain: 1.0,
            release_ms: 1.0,
        })
        .unwrap();
        e.apply(&note(1)).unwrap();
        let out = block(&mut e);
        assert!(out.iter().any(|&s| s.abs() > 1e-4), "Note should be audible");
        assert_eq!(e.active_voices(), 1);

        e.apply(&EngineCall::NoteOff { note_id: 1 }).unwrap();
        for _ in 0..40 {
            block(&mut e);
        }
        assert_eq!(e.active_voices(), 0);
    }

    #[test]
    fn voices_are_stolen_oldest_first() {
        let mut e = engine();
        for id in 0..(VOICE_COUNT as i32 + 2) {
            e.apply(&note(id)).unwrap();
        }
        assert_eq!(e.active_voices(), VOICE_COUNT);
        let held: Vec<_> = e.voices.iter().filter_map(Voice::note_id).collect();
        assert!(!held.contains(&0) && !held.contains(&1), "Oldest notes are stolen");
        assert!(held.contains(&9));
    }

    #[test]
    fn panic_silences_at_once() {
        let mut e = engine();
        e.apply(&note(3)).unwrap();
        e.apply(&note(4)).unwrap();
        block(&mut e);
        e.apply(&EngineCall::Panic {}).unwrap();
        assert_eq!(e.active_voices(), 0);
        assert!(block(&mut e).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn drone_noise_plays_without_notes() {
        let mut e = engine();
        e.apply(&EngineCall::SetNoiseLevel { level: 0.5 }).unwrap();
        assert!(block(&mut e).iter().all(|&s| s == 0.0), "Gated noise needs a note");
        e.apply(&EngineCall::SetNoiseDrone { enabled: true }).unwrap();
        assert!(block(&mut e).iter().any(|&s| s != 0.0));
    }

    #[test]
    fn output_stays_in_range_when_driven_hard() {
        let mut e = engine();
        e.apply(&EngineCall::SetDrive { val: 50.0 }).unwrap();
        e.apply(&EngineCall::SetPostGain { gain: 10.0 }).unwrap();
        e.apply(&EngineCall::SetLimiter { amount: 0.0 }).unwrap();
        for id in 0..4 {
            e.apply(&note(id)).unwrap();
        }
        for _ in 0..10 {
            assert!(block(&mut e).iter().all(|s| s.abs() <= 1.0));
        }
    }

    #[test]
    fn unmodeled_calls_are_accepted() {
        let mut e = engine();
        assert!(e.apply(&EngineCall::SetCombFreq { freq: 300.0 }).is_ok());
        assert!(e.apply(&EngineCall::SetChaosEnabled { enabled: true }).is_ok());
    }

    #[test]
    fn non_finite_arguments_fault() {
        let mut e = engine();
        let fault = e.apply(&EngineCall::SetCutoff { freq: f32::NAN }).unwrap_err();
        assert_eq!(fault.operation, "set_cutoff");
    }
}
