pub mod codec;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod notification;
pub mod port;
pub mod processor;
pub mod renderer;
pub mod worklet;

#[cfg(test)]
pub(crate) mod testing;

pub use command::Command;
pub use config::ProcessorConfig;
pub use dispatch::{CommandTable, Dispatcher, Outcome};
pub use engine::{EngineCall, EngineLoader, SynthEngine};
pub use error::{BridgeError, EngineError, EngineFault};
pub use lifecycle::{InitOutcome, LifecycleState};
pub use notification::Notification;
pub use port::ControlPort;
pub use processor::{Processor, connect};

use serde_json::Value;
use wasm_bindgen::prelude::*;

use crate::renderer::Cue;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the noise_worklet version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// Parse a JSON array of `{"quantum": n, "message": {...}}` cues.
pub fn parse_script(source: &str) -> Result<Vec<Cue>, BridgeError> {
    let value: Value = serde_json::from_str(source).map_err(|e| BridgeError::Script {
        message: e.to_string(),
    })?;
    let Value::Array(items) = value else {
        return Err(BridgeError::Script {
            message: "script must be an array of cues".into(),
        });
    };
    items
        .into_iter()
        .map(|item| Cue::from_value(item).map_err(BridgeError::from))
        .collect()
}

/// WASM-exposed: render a cue script through the reference engine to a WAV
/// byte array. `options` uses the same shape as `processorOptions`.
#[wasm_bindgen]
pub fn render_script_wav(script: &str, options: &str, quanta: usize) -> Result<Vec<u8>, JsValue> {
    let config = if options.trim().is_empty() {
        ProcessorConfig::default()
    } else {
        ProcessorConfig::from_json(options).map_err(|e| JsValue::from_str(&format!("{e}")))?
    };
    let cues = parse_script(script).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    let audio = renderer::render_script(config, dsp::ReferenceLoader, &cues, quanta)
        .map_err(|e| JsValue::from_str(&format!("{e}")))?;
    Ok(audio.to_wav())
}
