use thiserror::Error;

use crate::isa::IMM2_BOUND;

/// Fatal emission errors. There is no warning path: a successful emission
/// means the returned text is complete and internally consistent, and a
/// failed one returns no text at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmitError {
    #[error("{component}: IMM2_BOUND violated, {what} = {value} does not fit below {IMM2_BOUND}")]
    AddressOverflow {
        component: &'static str,
        what: &'static str,
        value: usize,
    },

    #[error("{component}: {constraint} (got {value})")]
    ShapeViolation {
        component: &'static str,
        constraint: &'static str,
        value: usize,
    },

    #[error("{component}: needs {needed} free {kind} registers, only {available} supplied")]
    RegisterStarvation {
        component: &'static str,
        kind: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("unsupported stage `{value}`, expected `prefill` or `decode`")]
    UnsupportedStage { value: String },
}
