//! Render-side processor: message delivery and the per-quantum render loop.
//!
//! Everything here runs in the render context. Messages are delivered
//! between quanta, never during one, so the engine is only ever touched
//! from one place at a time and no locking is needed.

use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;

use crate::command::{Command, INIT_KINDS};
use crate::config::ProcessorConfig;
use crate::dispatch::{Dispatcher, Outcome};
use crate::engine::{EngineLoader, SynthEngine};
use crate::error::{BridgeError, EngineError, EngineFault, MessageError};
use crate::lifecycle::{InitOutcome, Lifecycle, LifecycleState};
use crate::notification::{self, Notification};
use crate::port::{self, ControlPort, RenderPort};

/// Validate `config` and build a connected control port and processor.
pub fn connect<L: EngineLoader>(
    config: ProcessorConfig,
    loader: L,
) -> Result<(ControlPort, Processor<L>), BridgeError> {
    config.validate()?;
    log::debug!(
        "Processor at {} Hz, {} frames per quantum ({:?} deadline), {} channels",
        config.sample_rate,
        config.quantum_frames,
        config.quantum_budget(),
        config.output_channels
    );
    let (control, render) = port::channel(config.notification_capacity);
    Ok((control, Processor::new(config, loader, render)))
}

pub struct Processor<L: EngineLoader> {
    config: ProcessorConfig,
    loader: L,
    lifecycle: Lifecycle<L::Engine>,
    dispatcher: Dispatcher,
    port: RenderPort,
    clock: fn() -> u64,
    render_faults: u64,
}

impl<L: EngineLoader> Processor<L> {
    pub fn new(config: ProcessorConfig, loader: L, port: RenderPort) -> Self {
        Processor {
            config,
            loader,
            lifecycle: Lifecycle::new(),
            dispatcher: Dispatcher::new(),
            port,
            clock: notification::now_millis,
            render_faults: 0,
        }
    }

    /// Replace the timestamp source for notifications.
    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        self.lifecycle.is_ready()
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn engine(&self) -> Option<&L::Engine> {
        self.lifecycle.engine()
    }

    /// Quanta whose render failed and were replaced by silence.
    pub fn render_faults(&self) -> u64 {
        self.render_faults
    }

    pub fn dropped_notifications(&self) -> u64 {
        self.port.dropped()
    }

    /// Deliver one command. This is the port's message callback.
    pub fn handle_message(&mut self, command: Command) -> Outcome {
        if command.is_init() {
            return Outcome::Init(self.initialize(&command));
        }
        let now = (self.clock)();
        let port = &mut self.port;
        self.dispatcher
            .dispatch(&command, &mut self.lifecycle, now, &mut |n| port.emit(n))
    }

    /// Deliver a raw wire message.
    pub fn handle_json(&mut self, message: Value) -> Outcome {
        let kind = message
            .get("kind")
            .or_else(|| message.get("type"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        match Command::from_value(message) {
            Ok(command) => self.handle_message(command),
            // An init whose module bytes are unreadable is a failed init, not noise.
            Err(MessageError::InvalidModuleBytes { field }) if INIT_KINDS.contains(&kind.as_str()) => {
                let outcome = if self.lifecycle.begin() {
                    self.lifecycle.complete(Err(EngineError::MalformedModule {
                        reason: format!("`{field}` is not a byte array"),
                    }))
                } else {
                    InitOutcome::Ignored
                };
                self.report_init(&kind, &outcome);
                Outcome::Init(outcome)
            }
            Err(e) => {
                log::warn!("Dropping malformed message: {e}");
                let now = (self.clock)();
                self.port.emit(Notification::Warning {
                    message: e.to_string(),
                    original_type: kind,
                    timestamp: now,
                });
                Outcome::Malformed(e)
            }
        }
    }

    /// Deliver every queued command, in arrival order. Returns how many.
    pub fn poll_messages(&mut self) -> usize {
        let mut delivered = 0;
        while let Some(command) = self.port.try_recv() {
            self.handle_message(command);
            delivered += 1;
        }
        delivered
    }

    /// Render one quantum into `outputs` (one slice per channel).
    ///
    /// Always returns `true` so the host keeps the processor alive. While
    /// the engine is not ready the buffers are left untouched.
    pub fn process(&mut self, outputs: &mut [&mut [f32]]) -> bool {
        let Some((mono, rest)) = outputs.split_first_mut() else {
            return true;
        };
        let Some(engine) = self.lifecycle.engine_mut() else {
            return true;
        };
        // Channels past the configured count are not ours to write.
        let extra = self.config.output_channels.saturating_sub(1);
        let rest_len = rest.len();
        let rest = &mut rest[..extra.min(rest_len)];

        let rendered = if mono.len() == self.config.quantum_frames {
            panic::catch_unwind(AssertUnwindSafe(|| engine.render_block(&mut mono[..])))
                .unwrap_or_else(|_| Err(EngineFault::new("render_block", "engine panicked")))
        } else {
            Err(EngineFault::new(
                "render_block",
                format!(
                    "host quantum is {} frames, expected {}",
                    mono.len(),
                    self.config.quantum_frames
                ),
            ))
        };

        if let Err(fault) = rendered {
            if self.render_faults == 0 {
                log::error!("Render fault, outputting silence: {fault}");
            }
            self.render_faults += 1;
            mono.fill(0.0);
            for channel in rest.iter_mut() {
                channel.fill(0.0);
            }
            return true;
        }

        // Stereo is a copy of the mono render, not a second render.
        for channel in rest.iter_mut() {
            let n = channel.len().min(mono.len());
            channel[..n].copy_from_slice(&mono[..n]);
        }
        true
    }

    /// Deliver pending messages, then render.
    pub fn run_quantum(&mut self, outputs: &mut [&mut [f32]]) -> bool {
        self.poll_messages();
        self.process(outputs)
    }

    fn initialize(&mut self, command: &Command) -> InitOutcome {
        let module = command.module().unwrap_or_default();
        let outcome = self
            .lifecycle
            .initialize(&mut self.loader, module, self.config.sample_rate);
        self.report_init(command.kind(), &outcome);
        outcome
    }

    fn report_init(&mut self, kind: &str, outcome: &InitOutcome) {
        match outcome {
            InitOutcome::Ready => self.port.emit(Notification::Ready),
            InitOutcome::Failed(reason) => self.port.emit(Notification::Error {
                reason: reason.clone(),
            }),
            InitOutcome::Ignored => log::debug!("Ignoring repeated {kind}"),
        }
    }
}
