//! Engine lifecycle: Uninitialized → Initializing → Ready | Failed.
//!
//! `Ready` and `Failed` are terminal for the owning processor. The engine
//! lives inside the `Ready` state, so nothing can reach it before
//! construction finishes or after the lifecycle is dropped.

use std::panic::{self, AssertUnwindSafe};

use crate::codec;
use crate::engine::{EngineLoader, SynthEngine};
use crate::error::EngineError;

/// Observable lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Ready,
    Failed(String),
}

/// Result of an initialization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    Ready,
    Failed(String),
    /// Initialization was already started; the request changed nothing.
    Ignored,
}

enum Slot<E> {
    Uninitialized,
    Initializing,
    Ready(E),
    Failed(String),
}

pub struct Lifecycle<E> {
    slot: Slot<E>,
}

impl<E: SynthEngine> Lifecycle<E> {
    pub fn new() -> Self {
        Lifecycle {
            slot: Slot::Uninitialized,
        }
    }

    /// Construct the engine from `module` and settle in `Ready` or `Failed`.
    ///
    /// Never panics: loader errors and loader panics both become `Failed`.
    pub fn initialize<L>(&mut self, loader: &mut L, module: &[u8], sample_rate: f32) -> InitOutcome
    where
        L: EngineLoader<Engine = E>,
    {
        if !self.begin() {
            return InitOutcome::Ignored;
        }
        // The engine's glue decodes strings while it is being constructed.
        codec::install();
        let result = panic::catch_unwind(AssertUnwindSafe(|| loader.load(module, sample_rate)))
            .unwrap_or(Err(EngineError::Panicked));
        self.complete(result)
    }

    /// Move `Uninitialized → Initializing`. Returns false from any other state.
    pub fn begin(&mut self) -> bool {
        if matches!(self.slot, Slot::Uninitialized) {
            self.slot = Slot::Initializing;
            true
        } else {
            false
        }
    }

    /// Settle an initialization started with [`Lifecycle::begin`].
    pub fn complete(&mut self, result: Result<E, EngineError>) -> InitOutcome {
        if !matches!(self.slot, Slot::Initializing) {
            return InitOutcome::Ignored;
        }
        match result {
            Ok(engine) => {
                self.slot = Slot::Ready(engine);
                log::info!("Engine ready");
                InitOutcome::Ready
            }
            Err(e) => {
                let reason = e.to_string();
                log::error!("Engine initialization failed: {reason}");
                self.slot = Slot::Failed(reason.clone());
                InitOutcome::Failed(reason)
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.slot, Slot::Ready(_))
    }

    pub fn state(&self) -> LifecycleState {
        match &self.slot {
            Slot::Uninitialized => LifecycleState::Uninitialized,
            Slot::Initializing => LifecycleState::Initializing,
            Slot::Ready(_) => LifecycleState::Ready,
            Slot::Failed(reason) => LifecycleState::Failed(reason.clone()),
        }
    }

    pub fn engine(&self) -> Option<&E> {
        match &self.slot {
            Slot::Ready(engine) => Some(engine),
            _ => None,
        }
    }

    pub fn engine_mut(&mut self) -> Option<&mut E> {
        match &mut self.slot {
            Slot::Ready(engine) => Some(engine),
            _ => None,
        }
    }
}

impl<E: SynthEngine> Default for Lifecycle<E> {
    fn default() -> Self {
        Self::new()
    }
}
