//! Engine doubles shared by the unit tests.

use std::cell::Cell;
use std::rc::Rc;

use crate::engine::{EngineCall, EngineLoader, SynthEngine};
use crate::error::{EngineError, EngineFault};

/// Records every call and fills blocks with a ramp: `sample[i] = offset + i * 0.01`.
#[derive(Debug)]
pub struct RecordingEngine {
    pub sample_rate: f32,
    /// Module bytes the loader was given.
    pub module: Vec<u8>,
    pub calls: Vec<EngineCall>,
    pub blocks: usize,
    pub offset: f32,
    pub fail_calls: bool,
    pub fail_render: bool,
    pub panic_render: bool,
    pub drops: Option<Rc<Cell<usize>>>,
}

impl RecordingEngine {
    pub fn new(sample_rate: f32) -> Self {
        RecordingEngine {
            sample_rate,
            module: Vec::new(),
            calls: Vec::new(),
            blocks: 0,
            offset: 0.5,
            fail_calls: false,
            fail_render: false,
            panic_render: false,
            drops: None,
        }
    }
}

impl SynthEngine for RecordingEngine {
    fn apply(&mut self, call: &EngineCall) -> Result<(), EngineFault> {
        if self.fail_calls {
            return Err(EngineFault::new(call.setter(), "rejected by engine"));
        }
        self.calls.push(*call);
        Ok(())
    }

    fn render_block(&mut self, output: &mut [f32]) -> Result<(), EngineFault> {
        if self.panic_render {
            panic!("render exploded");
        }
        for (i, sample) in output.iter_mut().enumerate() {
            *sample = self.offset + i as f32 * 0.01;
        }
        self.blocks += 1;
        if self.fail_render {
            return Err(EngineFault::new("process", "memory access out of bounds"));
        }
        Ok(())
    }
}

impl Drop for RecordingEngine {
    fn drop(&mut self) {
        if let Some(drops) = &self.drops {
            drops.set(drops.get() + 1);
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordingLoader {
    pub loads: usize,
    pub failure: Option<EngineError>,
    pub fail_render: bool,
    pub panic_render: bool,
    pub fail_calls: bool,
    pub drops: Option<Rc<Cell<usize>>>,
}

impl RecordingLoader {
    pub fn failing(error: EngineError) -> Self {
        RecordingLoader {
            failure: Some(error),
            ..Default::default()
        }
    }
}

impl EngineLoader for RecordingLoader {
    type Engine = RecordingEngine;

    fn load(&mut self, module: &[u8], sample_rate: f32) -> Result<RecordingEngine, EngineError> {
        self.loads += 1;
        if let Some(err) = self.failure.clone() {
            return Err(err);
        }
        let mut engine = RecordingEngine::new(sample_rate);
        engine.module = module.to_vec();
        engine.fail_render = self.fail_render;
        engine.panic_render = self.panic_render;
        engine.fail_calls = self.fail_calls;
        engine.drops = self.drops.clone();
        Ok(engine)
    }
}
