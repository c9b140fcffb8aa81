//! Command dispatch — routes tagged commands to engine calls.
//!
//! The routing table is closed and built once. Each entry pairs a payload
//! schema with the engine call it produces and, for the parameters the
//! control surface shows round-trip feedback for, an acknowledgment key.
//!
//! Readiness gating happens before validation: while the engine is not ready
//! a recognized command is dropped silently. Unknown kinds are always
//! reported, ready or not.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde_json::{Map, Value};

use crate::command::{Args, Command, Field, Payload};
use crate::engine::{EngineCall, SynthEngine};
use crate::error::{EngineFault, MessageError, PayloadError};
use crate::lifecycle::{InitOutcome, Lifecycle};
use crate::notification::Notification;

type Build = fn(&Args) -> EngineCall;

/// One row of the routing table.
#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    pub kind: &'static str,
    pub fields: &'static [Field],
    /// Acknowledgment key, for kinds the control surface confirms.
    pub ack: Option<&'static str>,
    build: Build,
}

impl CommandSpec {
    /// Validate `fields` and build the engine call.
    pub fn to_call(&self, fields: &Map<String, Value>) -> Result<EngineCall, PayloadError> {
        let args = Args::validate(self.kind, self.fields, fields)?;
        Ok((self.build)(&args))
    }

    fn ack_value(&self, fields: &Map<String, Value>) -> Value {
        match self.fields {
            [single] => single.lookup(fields).cloned().unwrap_or(Value::Null),
            many => Value::Object(
                many.iter()
                    .map(|f| {
                        let value = f.lookup(fields).cloned().unwrap_or(Value::Null);
                        (f.name.to_string(), value)
                    })
                    .collect(),
            ),
        }
    }
}

const NONE: &[Field] = &[];
const VALUE: &[Field] = &[Field::number("value")];
const VALUE_FLAG: &[Field] = &[Field::flag("value")];
const VALUE_INDEX: &[Field] = &[Field::index("value")];
const SYNTH_TYPE: &[Field] = &[Field::index("synthType").or("value")];
const ADSR: &[Field] = &[
    Field::number("attack"),
    Field::number("decay"),
    Field::number("sustain"),
    Field::number("release"),
];
const SUB: &[Field] = &[Field::number("level"), Field::number("detune")];
const SATURATION: &[Field] = &[Field::number("drive"), Field::number("mix")];
const LFO: &[Field] = &[
    Field::number("rate"),
    Field::number("depth"),
    Field::integer("shape"),
];
const SAMPLE_HOLD: &[Field] = &[
    Field::number("rate"),
    Field::number("depth"),
    Field::number("slew"),
];
const JITTER: &[Field] = &[Field::number("amount"), Field::number("bandHz")];
const CHORUS: &[Field] = &[
    Field::number("mix"),
    Field::number("rate"),
    Field::number("depth"),
    Field::number("feedback"),
];
const MOD_ROUTING: &[Field] = &[
    Field::number("lfoCutoff"),
    Field::number("lfoFold"),
    Field::number("shCutoff"),
    Field::number("shFold"),
    Field::number("shBit"),
    Field::number("jitterPitch"),
];
const NOTE_ON: &[Field] = &[
    Field::integer("noteId"),
    Field::number("frequency"),
    Field::number("modIndex"),
];
const NOTE_OFF: &[Field] = &[Field::integer("noteId")];

/// The closed kind → handler mapping.
pub struct CommandTable {
    entries: HashMap<&'static str, CommandSpec>,
}

impl CommandTable {
    /// The shared table, built on first use.
    pub fn global() -> &'static CommandTable {
        static TABLE: OnceLock<CommandTable> = OnceLock::new();
        TABLE.get_or_init(CommandTable::build)
    }

    pub fn get(&self, kind: &str) -> Option<&CommandSpec> {
        self.entries.get(kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    /// Kinds that emit an acknowledgment, with their keys.
    pub fn acknowledged(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.entries
            .values()
            .filter_map(|spec| spec.ack.map(|key| (spec.kind, key)))
    }

    fn add(&mut self, kind: &'static str, fields: &'static [Field], ack: Option<&'static str>, build: Build) {
        let previous = self.entries.insert(
            kind,
            CommandSpec {
                kind,
                fields,
                ack,
                build,
            },
        );
        debug_assert!(previous.is_none(), "duplicate command kind {kind}");
    }

    fn build() -> CommandTable {
        let mut t = CommandTable {
            entries: HashMap::with_capacity(64),
        };

        // ── Core levels ─────────────────────────────────────────
        t.add("param", VALUE, Some("drive"), |a| EngineCall::SetDrive { val: a.number(0) });
        t.add("noise-level", VALUE, Some("noise_level"), |a| EngineCall::SetNoiseLevel {
            level: a.number(0),
        });
        t.add("noise-gate-follow", VALUE_FLAG, Some("noise_gate_follow"), |a| {
            EngineCall::SetNoiseGateFollow { follow: a.flag(0) }
        });
        t.add("noise-drone", VALUE_FLAG, None, |a| EngineCall::SetNoiseDrone { enabled: a.flag(0) });
        t.add("fm-level", VALUE, Some("fm_level"), |a| EngineCall::SetFmLevel { level: a.number(0) });
        t.add("cutoff", VALUE, Some("cutoff"), |a| EngineCall::SetCutoff { freq: a.number(0) });
        t.add("resonance", VALUE, Some("resonance"), |a| EngineCall::SetResonance { res: a.number(0) });
        t.add("feedback", VALUE, Some("feedback"), |a| EngineCall::SetFeedback { fb: a.number(0) });
        t.add("fold-amount", VALUE, Some("fold_amount"), |a| EngineCall::SetFoldAmount {
            amount: a.number(0),
        });
        t.add("bit-depth", VALUE, Some("bit_depth"), |a| EngineCall::SetBitDepth { depth: a.number(0) });

        // ── Envelope ────────────────────────────────────────────
        t.add("set-adsr", ADSR, None, |a| EngineCall::SetAdsr {
            attack_ms: a.number(0),
            decay_ms: a.number(1),
            sustain: a.number(2),
            release_ms: a.number(3),
        });

        // ── Post processing ─────────────────────────────────────
        t.add("set-sub", SUB, None, |a| EngineCall::SetSub {
            level: a.number(0),
            detune: a.number(1),
        });
        t.add("set-saturation", SATURATION, None, |a| EngineCall::SetSaturation {
            drive: a.number(0),
            mix: a.number(1),
        });
        t.add("set-tilt", VALUE, None, |a| EngineCall::SetTilt { value: a.number(0) });
        t.add("set-post-gain", VALUE, None, |a| EngineCall::SetPostGain { gain: a.number(0) });
        t.add("set-limiter", VALUE, None, |a| EngineCall::SetLimiter { amount: a.number(0) });
        t.add("set-spasm", VALUE, None, |a| EngineCall::SetSpasm { value: a.number(0) });

        // ── Modulation sources ──────────────────────────────────
        t.add("set-lfo", LFO, None, |a| EngineCall::SetLfo {
            rate_hz: a.number(0),
            depth: a.number(1),
            shape: a.integer(2),
        });
        t.add("set-sample-hold", SAMPLE_HOLD, None, |a| EngineCall::SetSampleHold {
            rate_hz: a.number(0),
            depth: a.number(1),
            slew_ms: a.number(2),
        });
        t.add("set-jitter", JITTER, None, |a| EngineCall::SetJitter {
            amount: a.number(0),
            band_hz: a.number(1),
        });
        t.add("set-chorus", CHORUS, None, |a| EngineCall::SetChorus {
            mix: a.number(0),
            rate_hz: a.number(1),
            depth_ms: a.number(2),
            feedback: a.number(3),
        });
        t.add("set-mod-routing", MOD_ROUTING, None, |a| EngineCall::SetModRouting {
            lfo_cutoff: a.number(0),
            lfo_fold: a.number(1),
            sh_cutoff: a.number(2),
            sh_fold: a.number(3),
            sh_bit: a.number(4),
            jitter_pitch: a.number(5),
        });
        t.add("mod-index", VALUE, None, |a| EngineCall::SetModIndex { mod_index: a.number(0) });

        // ── Wave synthesis ──────────────────────────────────────
        t.add("set-synth-type", SYNTH_TYPE, None, |a| EngineCall::SetSynthType {
            synth_type: a.index(0),
        });
        t.add("set-fm-ratio", VALUE, None, |a| EngineCall::SetFmRatio { ratio: a.number(0) });
        t.add("set-wavetable-pos", VALUE, None, |a| EngineCall::SetWavetablePosition {
            position: a.number(0),
        });
        t.add("set-wave-morph", VALUE, None, |a| EngineCall::SetWaveMorphSpeed { speed: a.number(0) });
        t.add("set-harmonics-count", VALUE_INDEX, None, |a| EngineCall::SetHarmonicsCount {
            count: a.index(0),
        });
        t.add("set-harmonic-rolloff", VALUE, None, |a| EngineCall::SetHarmonicRolloff {
            rolloff: a.number(0),
        });
        t.add("set-phase-dist-amt", VALUE, None, |a| EngineCall::SetPhaseDistAmount {
            amount: a.number(0),
        });
        t.add("set-phase-resonance", VALUE, None, |a| EngineCall::SetPhaseResonancePoint {
            point: a.number(0),
        });
        t.add("set-vector-x", VALUE, None, |a| EngineCall::SetVectorX { x: a.number(0) });
        t.add("set-vector-y", VALUE, None, |a| EngineCall::SetVectorY { y: a.number(0) });
        t.add("set-grain-size", VALUE, None, |a| EngineCall::SetGrainSize { size: a.number(0) });
        t.add("set-grain-density", VALUE, None, |a| EngineCall::SetGrainDensity {
            density: a.number(0),
        });
        t.add("set-modal-stiffness", VALUE, None, |a| EngineCall::SetModalStiffness {
            stiffness: a.number(0),
        });
        t.add("set-modal-inharmonicity", VALUE, None, |a| EngineCall::SetModalInharmonicity {
            inharmonicity: a.number(0),
        });

        // ── Filter character ────────────────────────────────────
        t.add("filter-q", VALUE, None, |a| EngineCall::SetFilterQ { q: a.number(0) });
        t.add("filter-damping", VALUE, None, |a| EngineCall::SetFilterDamping {
            damping: a.number(0),
        });
        t.add("filter-drive", VALUE, None, |a| EngineCall::SetFilterDrive { drive: a.number(0) });

        // ── Chaos and drift ─────────────────────────────────────
        t.add("chaos-mode", VALUE_INDEX, None, |a| EngineCall::SetChaosMode { mode: a.index(0) });
        t.add("chaos-rate", VALUE, None, |a| EngineCall::SetChaosRate { rate: a.number(0) });
        t.add("chaos-enabled", VALUE_FLAG, None, |a| EngineCall::SetChaosEnabled {
            enabled: a.flag(0),
        });
        t.add("drift-amount", VALUE, None, |a| EngineCall::SetDriftAmount { amount: a.number(0) });
        t.add("drift-speed", VALUE, None, |a| EngineCall::SetDriftSpeed { speed: a.number(0) });
        t.add("drift-type", VALUE_INDEX, None, |a| EngineCall::SetDriftType {
            drift_type: a.index(0),
        });
        t.add("diffusion-mix", VALUE, None, |a| EngineCall::SetDiffusionMix { mix: a.number(0) });

        // ── Sync, ring and comb ─────────────────────────────────
        t.add("sync-amount", VALUE, Some("sync_amount"), |a| EngineCall::SetSyncAmount {
            amount: a.number(0),
        });
        t.add("ring-mix", VALUE, Some("ring_mix"), |a| EngineCall::SetRingMix { mix: a.number(0) });
        t.add("ring-ratio", VALUE, Some("ring_ratio"), |a| EngineCall::SetRingRatio {
            ratio: a.number(0),
        });
        t.add("comb-mix", VALUE, Some("comb_mix"), |a| EngineCall::SetCombMix { mix: a.number(0) });
        t.add("comb-freq", VALUE, Some("comb_freq"), |a| EngineCall::SetCombFreq { freq: a.number(0) });
        t.add("comb-feedback", VALUE, Some("comb_feedback"), |a| EngineCall::SetCombFeedback {
            feedback: a.number(0),
        });
        t.add("comb-damp", VALUE, Some("comb_damp"), |a| EngineCall::SetCombDamp { damp: a.number(0) });

        // ── Notes ───────────────────────────────────────────────
        t.add("note-on", NOTE_ON, None, |a| EngineCall::NoteOn {
            note_id: a.integer(0),
            frequency: a.number(1),
            mod_index: a.number(2),
        });
        t.add("note-off", NOTE_OFF, None, |a| EngineCall::NoteOff { note_id: a.integer(0) });
        t.add("all-notes-off", NONE, None, |_| EngineCall::AllNotesOff {});
        t.add("panic", NONE, None, |_| EngineCall::Panic {});

        t
    }
}

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Applied { call: EngineCall, acknowledged: bool },
    /// Recognized, but the engine is not ready.
    NotReady,
    Unrecognized,
    Rejected(PayloadError),
    /// The engine refused the call.
    Faulted(EngineFault),
    Init(InitOutcome),
    Malformed(MessageError),
}

pub struct Dispatcher {
    table: &'static CommandTable,
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher {
            table: CommandTable::global(),
        }
    }

    pub fn table(&self) -> &'static CommandTable {
        self.table
    }

    /// Apply a non-initialization command.
    ///
    /// Notifications (acks and warnings) are handed to `emit`.
    pub fn dispatch<E: SynthEngine>(
        &self,
        command: &Command,
        lifecycle: &mut Lifecycle<E>,
        now: u64,
        emit: &mut dyn FnMut(Notification),
    ) -> Outcome {
        let Some(spec) = self.table.get(command.kind()) else {
            log::warn!(
                "Unknown message type \"{}\": {}",
                command.kind(),
                command.payload_value()
            );
            emit(Notification::unknown_kind(command.kind(), now));
            return Outcome::Unrecognized;
        };

        let Some(engine) = lifecycle.engine_mut() else {
            return Outcome::NotReady;
        };

        let empty = Map::new();
        let fields = match command.payload() {
            Payload::Fields(fields) => fields,
            Payload::Module(_) => &empty,
        };

        let call = match spec.to_call(fields) {
            Ok(call) => call,
            Err(e) => {
                log::warn!("{e}");
                emit(Notification::Warning {
                    message: e.to_string(),
                    original_type: spec.kind.to_string(),
                    timestamp: now,
                });
                return Outcome::Rejected(e);
            }
        };

        if let Err(fault) = engine.apply(&call) {
            log::warn!("{} → {fault}", spec.kind);
            return Outcome::Faulted(fault);
        }

        match spec.ack {
            Some(key) => {
                emit(Notification::Ack {
                    key,
                    value: spec.ack_value(fields),
                    timestamp: now,
                });
                Outcome::Applied {
                    call,
                    acknowledged: true,
                }
            }
            None => {
                log::debug!("{}: {:?}", spec.kind, call);
                Outcome::Applied {
                    call,
                    acknowledged: false,
                }
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
