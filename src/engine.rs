//! Engine contract — the operations the bridge drives on a synthesis engine.
//!
//! The engine itself is an external collaborator. The bridge only relies on
//! a closed set of operations ([`EngineCall`]), a block fill
//! ([`SynthEngine::render_block`]) and a constructor from an opaque module
//! payload ([`EngineLoader`]).

use crate::error::{EngineError, EngineFault};

/// Most arguments any single engine operation takes (`set_mod_routing`).
pub const MAX_ARGS: usize = 6;

/// A single typed argument to an engine operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arg {
    Number(f32),
    Integer(i32),
    Index(usize),
    Flag(bool),
}

impl Arg {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Arg::Number(v) => v as f64,
            Arg::Integer(v) => v as f64,
            Arg::Index(v) => v as f64,
            Arg::Flag(v) => {
                if v {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

impl From<f32> for Arg {
    fn from(v: f32) -> Self {
        Arg::Number(v)
    }
}

impl From<i32> for Arg {
    fn from(v: i32) -> Self {
        Arg::Integer(v)
    }
}

impl From<usize> for Arg {
    fn from(v: usize) -> Self {
        Arg::Index(v)
    }
}

impl From<bool> for Arg {
    fn from(v: bool) -> Self {
        Arg::Flag(v)
    }
}

/// Fixed-capacity argument list; building one never allocates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArgList {
    items: [Arg; MAX_ARGS],
    len: usize,
}

impl ArgList {
    pub fn from_slice(args: &[Arg]) -> Self {
        let mut items = [Arg::Number(0.0); MAX_ARGS];
        let len = args.len().min(MAX_ARGS);
        items[..len].copy_from_slice(&args[..len]);
        ArgList { items, len }
    }

    pub fn as_slice(&self) -> &[Arg] {
        &self.items[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

macro_rules! engine_calls {
    ($(
        $(#[$meta:meta])*
        $variant:ident => $setter:literal { $($field:ident : $ty:ident),* $(,)? }
    ),* $(,)?) => {
        /// One operation against the engine, with its arguments.
        #[derive(Debug, Clone, Copy, PartialEq)]
        pub enum EngineCall {
            $(
                $(#[$meta])*
                $variant { $($field: $ty),* },
            )*
        }

        impl EngineCall {
            /// The engine method this call maps to.
            pub fn setter(&self) -> &'static str {
                match self {
                    $(EngineCall::$variant { .. } => $setter,)*
                }
            }

            /// Arguments in engine call order.
            pub fn args(&self) -> ArgList {
                match *self {
                    $(EngineCall::$variant { $($field),* } => {
                        ArgList::from_slice(&[$(Arg::from($field)),*])
                    })*
                }
            }
        }
    };
}

engine_calls! {
    SetDrive => "set_drive" { val: f32 },
    SetNoiseLevel => "set_noise_level" { level: f32 },
    SetNoiseGateFollow => "set_noise_gate_follow" { follow: bool },
    SetNoiseDrone => "set_noise_drone" { enabled: bool },
    SetFmLevel => "set_fm_level" { level: f32 },
    SetCutoff => "set_cutoff" { freq: f32 },
    SetResonance => "set_resonance" { res: f32 },
    SetFeedback => "set_feedback" { fb: f32 },
    SetFoldAmount => "set_fold_amount" { amount: f32 },
    SetBitDepth => "set_bit_depth" { depth: f32 },
    /// Envelope times are in milliseconds, sustain is a level.
    SetAdsr => "set_adsr" { attack_ms: f32, decay_ms: f32, sustain: f32, release_ms: f32 },
    SetSub => "set_sub" { level: f32, detune: f32 },
    SetSaturation => "set_saturation" { drive: f32, mix: f32 },
    SetTilt => "set_tilt" { value: f32 },
    SetPostGain => "set_post_gain" { gain: f32 },
    SetLimiter => "set_limiter" { amount: f32 },
    SetLfo => "set_lfo" { rate_hz: f32, depth: f32, shape: i32 },
    SetSampleHold => "set_sample_hold" { rate_hz: f32, depth: f32, slew_ms: f32 },
    SetJitter => "set_jitter" { amount: f32, band_hz: f32 },
    SetChorus => "set_chorus" { mix: f32, rate_hz: f32, depth_ms: f32, feedback: f32 },
    /// Engine-specific instability control.
    SetSpasm => "set_spasm" { value: f32 },
    SetModRouting => "set_mod_routing" {
        lfo_cutoff: f32,
        lfo_fold: f32,
        sh_cutoff: f32,
        sh_fold: f32,
        sh_bit: f32,
        jitter_pitch: f32,
    },
    SetModIndex => "set_mod_index" { mod_index: f32 },
    SetSynthType => "set_synth_type" { synth_type: usize },
    SetFmRatio => "set_fm_ratio" { ratio: f32 },
    SetWavetablePosition => "set_wavetable_position" { position: f32 },
    SetWaveMorphSpeed => "set_wave_morph_speed" { speed: f32 },
    SetHarmonicsCount => "set_harmonics_count" { count: usize },
    SetHarmonicRolloff => "set_harmonic_rolloff" { rolloff: f32 },
    SetPhaseDistAmount => "set_phase_dist_amount" { amount: f32 },
    SetPhaseResonancePoint => "set_phase_resonance_point" { point: f32 },
    SetVectorX => "set_vector_x" { x: f32 },
    SetVectorY => "set_vector_y" { y: f32 },
    SetGrainSize => "set_grain_size" { size: f32 },
    SetGrainDensity => "set_grain_density" { density: f32 },
    SetModalStiffness => "set_modal_stiffness" { stiffness: f32 },
    SetModalInharmonicity => "set_modal_inharmonicity" { inharmonicity: f32 },
    SetFilterQ => "set_filter_q" { q: f32 },
    SetFilterDamping => "set_filter_damping" { damping: f32 },
    SetFilterDrive => "set_filter_drive" { drive: f32 },
    SetChaosMode => "set_chaos_mode" { mode: usize },
    SetChaosRate => "set_chaos_rate" { rate: f32 },
    SetChaosEnabled => "set_chaos_enabled" { enabled: bool },
    SetDriftAmount => "set_drift_amount" { amount: f32 },
    SetDriftSpeed => "set_drift_speed" { speed: f32 },
    SetDriftType => "set_drift_type" { drift_type: usize },
    SetDiffusionMix => "set_diffusion_mix" { mix: f32 },
    SetSyncAmount => "set_sync_amount" { amount: f32 },
    SetRingMix => "set_ring_mix" { mix: f32 },
    SetRingRatio => "set_ring_ratio" { ratio: f32 },
    SetCombMix => "set_comb_mix" { mix: f32 },
    SetCombFreq => "set_comb_freq" { freq: f32 },
    SetCombFeedback => "set_comb_feedback" { feedback: f32 },
    SetCombDamp => "set_comb_damp" { damp: f32 },
    NoteOn => "note_on" { note_id: i32, frequency: f32, mod_index: f32 },
    NoteOff => "note_off" { note_id: i32 },
    AllNotesOff => "all_notes_off" {},
    /// Hard stop of every voice, active or releasing.
    Panic => "panic" {},
}

/// A synthesis engine driven by the bridge.
///
/// Owned exclusively by the render context. Dropping it releases the
/// underlying resource.
pub trait SynthEngine {
    /// Apply one parameter or note operation.
    fn apply(&mut self, call: &EngineCall) -> Result<(), EngineFault>;

    /// Fill `output` with exactly `output.len()` mono samples.
    fn render_block(&mut self, output: &mut [f32]) -> Result<(), EngineFault>;
}

/// Builds an engine from an opaque module payload.
pub trait EngineLoader {
    type Engine: SynthEngine;

    fn load(&mut self, module: &[u8], sample_rate: f32) -> Result<Self::Engine, EngineError>;
}

impl<E, F> EngineLoader for F
where
    E: SynthEngine,
    F: FnMut(&[u8], f32) -> Result<E, EngineError>,
{
    type Engine = E;

    fn load(&mut self, module: &[u8], sample_rate: f32) -> Result<E, EngineError> {
        self(module, sample_rate)
    }
}
