//! Errors reported by assembly phases and by [`AssemblerBuilder`](crate::assembly::AssemblerBuilder).
use crate::schedule::Phase;
use nalgebra_sparse::pattern::SparsityPatternFormatError;
use nalgebra_sparse::SparseFormatError;
use std::error::Error;
use thiserror::Error;

/// Failure of an assembly phase or of assembler construction.
///
/// Everything except [`AssemblyError::Kernel`] and [`AssemblyError::Function`] is detected
/// before any worker thread is started.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(
        "element {element} declares {declared} variables, but its {num_nodes} nodes \
         with {vars_per_node} variables per node require {expected}"
    )]
    ElementSize {
        element: usize,
        declared: usize,
        expected: usize,
        num_nodes: usize,
        vars_per_node: usize,
    },

    #[error("element {element} references node {node}, but only {num_nodes} nodes exist")]
    NodeOutOfRange { element: usize, node: usize, num_nodes: usize },

    #[error("dependent node {dependent} is invalid: {reason}")]
    InvalidDependentNode { dependent: usize, reason: String },

    #[error("auxiliary element refers to element {element}, but only {num_elements} elements exist")]
    AuxiliaryOutOfRange { element: usize, num_elements: usize },

    #[error("auxiliary element for element {element} declares {declared} variables, expected {expected}")]
    AuxiliarySize {
        element: usize,
        declared: usize,
        expected: usize,
    },

    #[error("{name} has dimensions {actual:?}, expected {expected:?}")]
    DimensionMismatch {
        name: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("function {function} has element {element} in its domain, but only {num_elements} elements exist")]
    FunctionDomain {
        function: usize,
        element: usize,
        num_elements: usize,
    },

    #[error("{phase} failed on element {element}")]
    Kernel {
        phase: Phase,
        element: usize,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },

    #[error("function {function} failed during {stage}")]
    Function {
        function: usize,
        stage: &'static str,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },

    #[error("failed to build worker pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    SparsityPattern(#[from] SparsityPatternFormatError),

    #[error(transparent)]
    SparseFormat(#[from] SparseFormatError),
}

impl AssemblyError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Checks that a vector argument has the expected length.
    pub(crate) fn check_len(name: &'static str, expected: usize, actual: usize) -> Result<(), Self> {
        Self::check_shape(name, (expected, 1), (actual, 1))
    }

    pub(crate) fn check_shape(
        name: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    ) -> Result<(), Self> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::DimensionMismatch { name, expected, actual })
        }
    }
}
