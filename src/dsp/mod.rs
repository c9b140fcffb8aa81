//! Reference engine — pure Rust synthesis behind the engine contract.
//!
//! Lets the bridge run natively (offline render, tests) with the same
//! message surface the hosted engine exposes.

pub mod engine;
pub mod envelope;
pub mod oscillator;
pub mod voice;

pub use engine::{MODULE_HEADER, ReferenceEngine, ReferenceLoader};
