//! Offline renderer — drives a processor through a timed command script and
//! collects the output, optionally as a WAV byte buffer.

use serde_json::Value;

use crate::command::Command;
use crate::config::ProcessorConfig;
use crate::engine::EngineLoader;
use crate::error::{BridgeError, MessageError};
use crate::notification::Notification;
use crate::processor;

/// A command due before the given quantum is rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub quantum: usize,
    pub command: Command,
}

impl Cue {
    pub fn new(quantum: usize, command: Command) -> Self {
        Cue { quantum, command }
    }

    /// Parse `{"quantum": n, "message": {...}}`. A missing quantum means 0;
    /// a present one must be a non-negative integer.
    pub fn from_value(value: Value) -> Result<Cue, MessageError> {
        let Value::Object(mut map) = value else {
            return Err(MessageError::NotAnObject);
        };
        let quantum = match map.get("quantum") {
            None | Some(Value::Null) => 0,
            Some(v) => v
                .as_u64()
                .and_then(|q| usize::try_from(q).ok())
                .ok_or(MessageError::InvalidIndex { field: "quantum" })?,
        };
        let message = map
            .remove("message")
            .ok_or(MessageError::MissingField { field: "message" })?;
        Ok(Cue {
            quantum,
            command: Command::from_value(message)?,
        })
    }
}

/// Stereo output of an offline render.
#[derive(Debug, Clone)]
pub struct RenderedAudio {
    pub sample_rate: u32,
    pub left: Vec<f32>,
    pub right: Vec<f32>,
    /// Everything the processor reported, in order.
    pub notifications: Vec<Notification>,
}

impl RenderedAudio {
    pub fn frames(&self) -> usize {
        self.left.len()
    }

    /// Interleaved 16-bit PCM.
    pub fn to_pcm_i16(&self) -> Vec<i16> {
        self.left
            .iter()
            .zip(&self.right)
            .flat_map(|(&l, &r)| [to_i16(l), to_i16(r)])
            .collect()
    }

    /// 16-bit stereo PCM in a RIFF/WAVE container.
    pub fn to_wav(&self) -> Vec<u8> {
        const CHANNELS: u16 = 2;
        const SAMPLE_BYTES: u16 = 2;
        let frame_bytes = CHANNELS * SAMPLE_BYTES;
        let pcm = self.to_pcm_i16();

        let mut out = Vec::with_capacity(44 + pcm.len() * SAMPLE_BYTES as usize);
        write_chunk(&mut out, b"RIFF", |riff| {
            riff.extend_from_slice(b"WAVE");
            write_chunk(riff, b"fmt ", |fmt| {
                fmt.extend_from_slice(&1u16.to_le_bytes()); // integer PCM
                fmt.extend_from_slice(&CHANNELS.to_le_bytes());
                fmt.extend_from_slice(&self.sample_rate.to_le_bytes());
                fmt.extend_from_slice(&(self.sample_rate * u32::from(frame_bytes)).to_le_bytes());
                fmt.extend_from_slice(&frame_bytes.to_le_bytes());
                fmt.extend_from_slice(&(SAMPLE_BYTES * 8).to_le_bytes());
            });
            write_chunk(riff, b"data", |data| {
                data.extend(pcm.iter().flat_map(|s| s.to_le_bytes()));
            });
        });
        out
    }
}

/// Append a RIFF chunk: id, little-endian body length, then the body.
fn write_chunk(out: &mut Vec<u8>, id: &[u8; 4], body: impl FnOnce(&mut Vec<u8>)) {
    out.extend_from_slice(id);
    let len_at = out.len();
    out.extend_from_slice(&[0; 4]);
    body(out);
    let len = (out.len() - len_at - 4) as u32;
    out[len_at..len_at + 4].copy_from_slice(&len.to_le_bytes());
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Run `cues` through a fresh processor for `quanta` render quanta.
///
/// Cues are posted on the control port just before their quantum, so they
/// take the same path live messages do.
pub fn render_script<L: EngineLoader>(
    config: ProcessorConfig,
    loader: L,
    cues: &[Cue],
    quanta: usize,
) -> Result<RenderedAudio, BridgeError> {
    let frames = config.quantum_frames;
    let sample_rate = config.sample_rate as u32;
    let (control, mut processor) = processor::connect(config, loader)?;

    let mut order: Vec<&Cue> = cues.iter().collect();
    order.sort_by_key(|cue| cue.quantum);
    let mut pending = order.into_iter().peekable();

    let mut left = Vec::with_capacity(frames * quanta);
    let mut right = Vec::with_capacity(frames * quanta);
    let mut notifications = Vec::new();
    let mut l = vec![0.0f32; frames];
    let mut r = vec![0.0f32; frames];

    for quantum in 0..quanta {
        while let Some(cue) = pending.next_if(|cue| cue.quantum <= quantum) {
            control.send(cue.command.clone())?;
        }
        l.fill(0.0);
        r.fill(0.0);
        processor.run_quantum(&mut [l.as_mut_slice(), r.as_mut_slice()]);
        left.extend_from_slice(&l);
        right.extend_from_slice(&r);
        notifications.extend(control.drain());
    }

    if processor.render_faults() > 0 {
        log::warn!("Offline render had {} faulted quanta", processor.render_faults());
    }

    Ok(RenderedAudio {
        sample_rate,
        left,
        right,
        notifications,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::{MODULE_HEADER, ReferenceLoader};
    use serde_json::json;

    fn cue(quantum: usize, message: Value) -> Cue {
        Cue::new(quantum, Command::from_value(message).unwrap())
    }

    fn song() -> Vec<Cue> {
        vec![
            Cue::new(0, Command::init(MODULE_HEADER.to_vec())),
            cue(0, json!({"kind": "set-adsr", "attack": 1, "decay": 10, "sustain": 0.8, "release": 5})),
            cue(1, json!({"kind": "note-on", "noteId": 1, "frequency": 440, "modIndex": 0})),
            cue(20, json!({"kind": "note-off", "noteId": 1})),
        ]
    }

    #[test]
    fn renders_requested_length() {
        let audio = render_script(ProcessorConfig::default(), ReferenceLoader, &song(), 40).unwrap();
        assert_eq!(audio.frames(), 40 * 128);
        assert_eq!(audio.right.len(), audio.left.len());
        assert_eq!(audio.sample_rate, 48000);
    }

    #[test]
    fn note_is_audible_and_stereo_matches() {
        let audio = render_script(ProcessorConfig::default(), ReferenceLoader, &song(), 40).unwrap();
        assert!(audio.left[..128].iter().all(|&s| s == 0.0), "Nothing plays before note-on");
        assert!(audio.left.iter().any(|&s| s.abs() > 0.01), "Note should be audible");
        assert_eq!(audio.left, audio.right);
        assert_eq!(audio.notifications.first(), Some(&Notification::Ready));
    }

    #[test]
    fn failed_init_renders_silence() {
        let cues = vec![
            Cue::new(0, Command::init(b"nope".to_vec())),
            cue(1, json!({"kind": "note-on", "noteId": 1, "frequency": 440, "modIndex": 0})),
        ];
        let audio = render_script(ProcessorConfig::default(), ReferenceLoader, &cues, 4).unwrap();
        assert!(audio.left.iter().all(|&s| s == 0.0));
        assert!(matches!(audio.notifications.first(), Some(Notification::Error { .. })));
    }

    #[test]
    fn invalid_config_is_an_error() {
        let config = ProcessorConfig {
            quantum_frames: 0,
            ..Default::default()
        };
        assert!(render_script(config, ReferenceLoader, &[], 1).is_err());
    }

    #[test]
    fn cue_from_json() {
        let parsed = Cue::from_value(json!({"quantum": 3, "message": {"kind": "panic"}})).unwrap();
        assert_eq!(parsed.quantum, 3);
        assert_eq!(parsed.command.kind(), "panic");
        assert!(Cue::from_value(json!([1, 2])).is_err());
        let unscheduled = Cue::from_value(json!({"message": {"kind": "panic"}})).unwrap();
        assert_eq!(unscheduled.quantum, 0);
    }

    #[test]
    fn cue_quantum_must_be_a_whole_number() {
        for bad in [json!(-1), json!(2.5), json!("3"), json!(true)] {
            let err = Cue::from_value(json!({"quantum": bad, "message": {"kind": "panic"}})).unwrap_err();
            assert_eq!(err, MessageError::InvalidIndex { field: "quantum" }, "quantum {bad}");
        }
        assert_eq!(
            Cue::from_value(json!({"quantum": 1})).unwrap_err(),
            MessageError::MissingField { field: "message" }
        );
    }

    #[test]
    fn wav_header_valid() {
        let audio = render_script(ProcessorConfig::default(), ReferenceLoader, &song(), 2).unwrap();
        let wav = audio.to_wav();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");

        let sr = u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]);
        assert_eq!(sr, 48000);
        let ch = u16::from_le_bytes([wav[22], wav[23]]);
        assert_eq!(ch, 2);

        // 2 quanta * 128 frames * 2 channels * 2 bytes
        let data_size = u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]);
        assert_eq!(data_size, 1024);
        assert_eq!(wav.len(), 44 + 1024);

        let riff_size = u32::from_le_bytes([wav[4], wav[5], wav[6], wav[7]]);
        assert_eq!(riff_size as usize, wav.len() - 8);
        let fmt_size = u32::from_le_bytes([wav[16], wav[17], wav[18], wav[19]]);
        assert_eq!(fmt_size, 16);
        let byte_rate = u32::from_le_bytes([wav[28], wav[29], wav[30], wav[31]]);
        assert_eq!(byte_rate, 48000 * 4);
        assert_eq!(u16::from_le_bytes([wav[32], wav[33]]), 4);
        assert_eq!(u16::from_le_bytes([wav[34], wav[35]]), 16);
    }

    #[test]
    fn pcm_conversion_clamps() {
        let audio = RenderedAudio {
            sample_rate: 8000,
            left: vec![2.0, -1.0],
            right: vec![0.0, 0.5],
            notifications: Vec::new(),
        };
        assert_eq!(audio.to_pcm_i16(), vec![i16::MAX, 0, -i16::MAX, 16383]);
    }
}
