//! AudioWorklet surface — hosts a [`Processor`] whose engine is a JS object.
//!
//! The worklet's JS shell forwards `port.onmessage` data to
//! [`WorkletProcessor::on_message`], calls [`WorkletProcessor::process`]
//! from its own `process()`, and posts whatever
//! [`WorkletProcessor::take_notifications`] returns back to the control side.

use js_sys::{Array, ArrayBuffer, Float32Array, Function, Reflect, Uint8Array};
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

use crate::command::{Command, INIT_KINDS};
use crate::config::ProcessorConfig;
use crate::engine::{Arg, EngineCall, EngineLoader, SynthEngine};
use crate::error::{EngineError, EngineFault};
use crate::port::ControlPort;
use crate::processor::{self, Processor};

/// Best-effort text for a thrown JS value.
fn describe(value: &JsValue) -> String {
    if let Some(s) = value.as_string() {
        return s;
    }
    Reflect::get(value, &JsValue::from_str("message"))
        .ok()
        .and_then(|m| m.as_string())
        .unwrap_or_else(|| format!("{value:?}"))
}

fn to_js(arg: &Arg) -> JsValue {
    match *arg {
        Arg::Flag(v) => JsValue::from_bool(v),
        other => JsValue::from_f64(other.as_f64()),
    }
}

/// Engine object produced by the JS factory, driven by method name.
pub struct JsEngine {
    inner: JsValue,
    process: Function,
    scratch: Float32Array,
}

impl JsEngine {
    fn new(inner: JsValue) -> Result<Self, EngineError> {
        let process = Reflect::get(&inner, &JsValue::from_str("process"))
            .ok()
            .and_then(|f| f.dyn_into::<Function>().ok())
            .ok_or_else(|| EngineError::Construction {
                message: "engine has no process method".into(),
            })?;
        Ok(JsEngine {
            inner,
            process,
            scratch: Float32Array::new_with_length(0),
        })
    }
}

impl SynthEngine for JsEngine {
    fn apply(&mut self, call: &EngineCall) -> Result<(), EngineFault> {
        let setter = call.setter();
        let method = Reflect::get(&self.inner, &JsValue::from_str(setter))
            .map_err(|e| EngineFault::new(setter, describe(&e)))?
            .dyn_into::<Function>()
            .map_err(|_| EngineFault::new(setter, "engine does not expose this method"))?;

        let args = Array::new();
        for arg in call.args().as_slice() {
            args.push(&to_js(arg));
        }
        method
            .apply(&self.inner, &args)
            .map(|_| ())
            .map_err(|e| EngineFault::new(setter, describe(&e)))
    }

    fn render_block(&mut self, output: &mut [f32]) -> Result<(), EngineFault> {
        if self.scratch.length() as usize != output.len() {
            self.scratch = Float32Array::new_with_length(output.len() as u32);
        }
        self.process
            .call1(&self.inner, &self.scratch)
            .map_err(|e| EngineFault::new("process", describe(&e)))?;
        self.scratch.copy_to(output);
        Ok(())
    }
}

impl Drop for JsEngine {
    fn drop(&mut self) {
        let free = Reflect::get(&self.inner, &JsValue::from_str("free"))
            .ok()
            .and_then(|f| f.dyn_into::<Function>().ok());
        if let Some(free) = free {
            if let Err(e) = free.call0(&self.inner) {
                log::warn!("Engine free() threw: {}", describe(&e));
            }
        }
    }
}

/// Calls `factory(moduleBytes, sampleRate)`; the factory returns the engine.
pub struct JsEngineLoader {
    factory: Function,
}

impl EngineLoader for JsEngineLoader {
    type Engine = JsEngine;

    fn load(&mut self, module: &[u8], sample_rate: f32) -> Result<JsEngine, EngineError> {
        let bytes = Uint8Array::from(module);
        let engine = self
            .factory
            .call2(&JsValue::NULL, &bytes, &JsValue::from_f64(sample_rate as f64))
            .map_err(|e| {
                if e.is_instance_of::<Uint8Array>() {
                    EngineError::Thrown {
                        bytes: Uint8Array::new(&e).to_vec(),
                    }
                } else {
                    EngineError::Construction {
                        message: describe(&e),
                    }
                }
            })?;
        if engine.is_undefined() || engine.is_null() {
            return Err(EngineError::Construction {
                message: "factory returned no engine".into(),
            });
        }
        JsEngine::new(engine)
    }
}

/// Binary module bytes under `payload` or `wasmBytes`, when sent as a
/// typed array or buffer rather than a plain array.
fn binary_module(data: &JsValue) -> Option<Vec<u8>> {
    for key in ["payload", "wasmBytes"] {
        let Ok(value) = Reflect::get(data, &JsValue::from_str(key)) else {
            continue;
        };
        if value.is_instance_of::<Uint8Array>() || value.is_instance_of::<ArrayBuffer>() {
            return Some(Uint8Array::new(&value).to_vec());
        }
    }
    None
}

/// `sampleRate` of the AudioWorkletGlobalScope, if running inside one.
fn context_sample_rate() -> Option<f32> {
    Reflect::get(&js_sys::global(), &JsValue::from_str("sampleRate"))
        .ok()?
        .as_f64()
        .map(|rate| rate as f32)
}

fn message_kind(data: &JsValue) -> Option<String> {
    ["kind", "type"]
        .iter()
        .find_map(|key| Reflect::get(data, &JsValue::from_str(key)).ok()?.as_string())
}

#[wasm_bindgen]
pub struct WorkletProcessor {
    processor: Processor<JsEngineLoader>,
    control: ControlPort,
}

#[wasm_bindgen]
impl WorkletProcessor {
    /// `options` is the worklet's `processorOptions` (may be undefined).
    #[wasm_bindgen(constructor)]
    pub fn new(options: JsValue, factory: Function) -> Result<WorkletProcessor, JsValue> {
        let options: Value = if options.is_undefined() || options.is_null() {
            Value::Null
        } else {
            serde_wasm_bindgen::from_value(options).map_err(|e| JsValue::from_str(&format!("{e}")))?
        };
        let config = ProcessorConfig::from_options(options, context_sample_rate())
            .map_err(|e| JsValue::from_str(&format!("{e}")))?;
        let (control, processor) = processor::connect(config, JsEngineLoader { factory })
            .map_err(|e| JsValue::from_str(&format!("{e}")))?;
        Ok(WorkletProcessor { processor, control })
    }

    /// Deliver one message from the control side.
    #[wasm_bindgen(js_name = onMessage)]
    pub fn on_message(&mut self, data: JsValue) {
        let is_init = message_kind(&data).is_some_and(|k| INIT_KINDS.contains(&k.as_str()));
        if is_init {
            if let Some(bytes) = binary_module(&data) {
                self.processor.handle_message(Command::init(bytes));
                return;
            }
        }
        let value = serde_wasm_bindgen::from_value::<Value>(data).unwrap_or(Value::Null);
        self.processor.handle_json(value);
    }

    /// Render one quantum. `right` may be empty for mono outputs.
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) -> bool {
        if right.is_empty() {
            self.processor.process(&mut [left])
        } else {
            self.processor.process(&mut [left, right])
        }
    }

    /// Notifications produced since the last call, as plain JS objects.
    #[wasm_bindgen(js_name = takeNotifications)]
    pub fn take_notifications(&self) -> Result<JsValue, JsValue> {
        let pending = self.control.drain();
        pending
            .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
            .map_err(|e| JsValue::from_str(&format!("{e}")))
    }

    #[wasm_bindgen(getter)]
    pub fn ready(&self) -> bool {
        self.processor.is_ready()
    }

    #[wasm_bindgen(getter, js_name = droppedNotifications)]
    pub fn dropped_notifications(&self) -> f64 {
        self.processor.dropped_notifications() as f64
    }

    #[wasm_bindgen(getter, js_name = renderFaults)]
    pub fn render_faults(&self) -> f64 {
        self.processor.render_faults() as f64
    }
}
