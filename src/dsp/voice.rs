//! One sounding note: an oscillator shaped by an envelope.

use super::envelope::{Adsr, Envelope};
use super::oscillator::{Oscillator, Waveform};

#[derive(Debug, Clone)]
pub struct Voice {
    oscillator: Oscillator,
    envelope: Envelope,
    /// Note id the control surface assigned; `None` while free.
    note_id: Option<i32>,
    /// Brightness scale taken from the note's modulation index.
    mod_index: f32,
    /// Monotonic start stamp, used to steal the oldest voice.
    started: u64,
}

impl Voice {
    pub fn new(sample_rate: f32) -> Self {
        Voice {
            oscillator: Oscillator::new(Waveform::Sine, sample_rate),
            envelope: Envelope::new(Adsr::default(), sample_rate),
            note_id: None,
            mod_index: 0.0,
            started: 0,
        }
    }

    pub fn start(&mut self, note_id: i32, frequency: f32, mod_index: f32, adsr: Adsr, stamp: u64) {
        self.note_id = Some(note_id);
        self.mod_index = mod_index.max(0.0);
        self.started = stamp;
        self.oscillator.frequency = frequency.max(0.0);
        self.oscillator.reset();
        self.envelope.adsr = adsr;
        self.envelope.gate_on();
    }

    pub fn release(&mut self) {
        self.envelope.gate_off();
        self.note_id = None;
    }

    pub fn kill(&mut self) {
        self.envelope.kill();
        self.note_id = None;
    }

    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.oscillator.waveform = waveform;
    }

    pub fn note_id(&self) -> Option<i32> {
        self.note_id
    }

    pub fn started(&self) -> u64 {
        self.started
    }

    /// Neither held nor releasing.
    pub fn is_free(&self) -> bool {
        self.note_id.is_none() && self.envelope.is_idle()
    }

    pub fn next_sample(&mut self) -> f32 {
        if self.envelope.is_idle() {
            return 0.0;
        }
        let raw = self.oscillator.next_sample();
        // A higher modulation index pushes the shape into gentle saturation.
        let shaped = if self.mod_index > 0.0 {
            (raw * (1.0 + self.mod_index)).tanh()
        } else {
            raw
        };
        shaped * self.envelope.next_sample()
    }
}
