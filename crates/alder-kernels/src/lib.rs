//! Alder domain kernel gateway.
//!
//! Eight orchestrators (`core`, `memory`, `code`, `governance`,
//! `verification`, `intelligence`, `infrastructure`, `federation`) behind
//! one operation: `invoke(KernelRequest) -> KernelResponse`. Each kernel
//! reduces free text to a token from its closed capability vocabulary,
//! plans a declared set of internal operations, executes them gathering
//! timings and data sources, aggregates a templated answer, and attaches
//! the execution trace and data provenance. Unknown intents are rejected
//! with a structured error; nothing in a request is ever executed as a
//! code path.
//!
//! Mutating plan steps go through the governance engine with the kernel's
//! confidence; everything else is read-only over the platform's stores.

#![deny(unsafe_code)]

mod capability;
mod gateway;
mod services;
mod trace;

pub use capability::{parse_intent, vocabulary, Capability};
pub use gateway::{GatewayConfig, KernelGateway};
pub use services::{KernelServices, NoteStore, ReadinessBoard};
pub use trace::TraceRecorder;

use alder_types::{CoreError, KernelName};
use thiserror::Error;

/// Errors from kernel invocation.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("kernel '{kernel}' cannot interpret intent '{intent}'; known capabilities: {vocabulary:?}")]
    UnknownIntent {
        kernel: KernelName,
        intent: String,
        vocabulary: Vec<&'static str>,
    },

    /// A governed step was denied; the trace built up to the denial rides
    /// along for the API surface.
    #[error("{source}")]
    Denied {
        source: CoreError,
        partial_trace: Box<alder_types::ExecutionTrace>,
    },

    #[error(transparent)]
    Core(#[from] CoreError),
}
