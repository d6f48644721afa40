//! Work distribution for assembly phases.
//!
//! A phase is described by a flat index space `[0, N)`. Workers repeatedly claim the next
//! index from a [`JobDispenser`], translate it into an element (and, for multi-function phases,
//! a function) through a [`DomainMap`], and stop once the dispenser is exhausted or cancelled.
use std::fmt;

mod dispenser;
mod domain;
mod pool;

pub use dispenser::*;
pub use domain::*;
pub use pool::*;

/// The kinds of threaded phases run by the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Residual,
    Jacobian,
    Matrix,
    AdjointResidualProduct,
    FunctionEvaluation,
    FunctionDesignSensitivity,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Residual => "residual assembly",
            Phase::Jacobian => "Jacobian assembly",
            Phase::Matrix => "matrix assembly",
            Phase::AdjointResidualProduct => "adjoint-residual product",
            Phase::FunctionEvaluation => "function evaluation",
            Phase::FunctionDesignSensitivity => "function design sensitivity",
        };
        write!(f, "{name}")
    }
}
