//! The assembler and its threaded phases.
//!
//! An [`Assembler`] is configured once through [`AssemblerBuilder`]. After that, the caller
//! updates the nodal state with the `set_*` methods and runs any of the phases:
//!
//! - [`Assembler::assemble_residual`]
//! - [`Assembler::assemble_jacobian`]
//! - [`Assembler::assemble_matrix`]
//! - [`Assembler::add_adjoint_residual_products`]
//! - [`Assembler::evaluate_functions`]
//! - [`Assembler::add_function_dv_sens`]
//!
//! Each phase validates its arguments, starts a fresh worker pool, and returns once every
//! worker has been joined.
use crate::auxiliary::AuxiliaryElements;
use crate::connectivity::NodeMap;
use crate::element::Element;
use crate::error::AssemblyError;
use crate::schedule::ThreadConfig;
use crate::workspace::ScratchSizes;
use crate::{Real, SPATIAL_DIM};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;
use std::fmt;
use std::sync::Arc;

mod adjoint;
mod builder;
mod functions;
mod global;
mod matrix;
mod residual;

pub use builder::AssemblerBuilder;
pub use global::*;

use builder::validate_auxiliary_elements;

/// The shared nodal state read by all phases.
#[derive(Debug, Clone)]
pub(crate) struct NodalState<T> {
    pub time: T,
    pub xpts: DVector<T>,
    pub vars: DVector<T>,
    pub dvars: DVector<T>,
    pub ddvars: DVector<T>,
}

impl<T: Real> NodalState<T> {
    fn zeros(num_nodes: usize, vars_per_node: usize) -> Self {
        let n = vars_per_node * num_nodes;
        Self {
            time: T::zero(),
            xpts: DVector::zeros(SPATIAL_DIM * num_nodes),
            vars: DVector::zeros(n),
            dvars: DVector::zeros(n),
            ddvars: DVector::zeros(n),
        }
    }
}

/// Threaded assembly over a fixed set of elements.
pub struct Assembler<T: Real> {
    vars_per_node: usize,
    node_map: NodeMap<T>,
    elements: Vec<Arc<dyn Element<T>>>,
    auxiliary: AuxiliaryElements<T>,
    num_design_vars: usize,
    threads: ThreadConfig,
    state: NodalState<T>,
    scratch_sizes: ScratchSizes,
}

impl<T: Real> fmt::Debug for Assembler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assembler")
            .field("vars_per_node", &self.vars_per_node)
            .field("num_nodes", &self.num_nodes())
            .field("num_dependent_nodes", &self.node_map.num_dependent_nodes())
            .field("num_elements", &self.num_elements())
            .field("num_auxiliary_elements", &self.auxiliary.len())
            .field("num_design_vars", &self.num_design_vars)
            .field("threads", &self.threads)
            .finish()
    }
}

impl<T: Real> Assembler<T> {
    pub fn vars_per_node(&self) -> usize {
        self.vars_per_node
    }

    /// The number of independent nodes.
    pub fn num_nodes(&self) -> usize {
        self.node_map.num_nodes()
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    /// The length of global state and residual vectors.
    pub fn num_variables(&self) -> usize {
        self.vars_per_node * self.num_nodes()
    }

    pub fn num_design_vars(&self) -> usize {
        self.num_design_vars
    }

    pub fn node_map(&self) -> &NodeMap<T> {
        &self.node_map
    }

    pub fn elements(&self) -> &[Arc<dyn Element<T>>] {
        &self.elements
    }

    pub fn auxiliary_elements(&self) -> &AuxiliaryElements<T> {
        &self.auxiliary
    }

    pub fn thread_config(&self) -> &ThreadConfig {
        &self.threads
    }

    pub fn time(&self) -> T {
        self.state.time
    }

    pub fn variables(&self) -> &DVector<T> {
        &self.state.vars
    }

    pub fn first_derivatives(&self) -> &DVector<T> {
        &self.state.dvars
    }

    pub fn second_derivatives(&self) -> &DVector<T> {
        &self.state.ddvars
    }

    pub fn nodes(&self) -> &DVector<T> {
        &self.state.xpts
    }

    pub fn set_time(&mut self, time: T) {
        self.state.time = time;
    }

    pub fn set_variables(&mut self, vars: &DVector<T>) -> Result<(), AssemblyError> {
        AssemblyError::check_len("variables", self.num_variables(), vars.len())?;
        self.state.vars.copy_from(vars);
        Ok(())
    }

    pub fn set_first_derivatives(&mut self, dvars: &DVector<T>) -> Result<(), AssemblyError> {
        AssemblyError::check_len("first derivatives", self.num_variables(), dvars.len())?;
        self.state.dvars.copy_from(dvars);
        Ok(())
    }

    pub fn set_second_derivatives(&mut self, ddvars: &DVector<T>) -> Result<(), AssemblyError> {
        AssemblyError::check_len("second derivatives", self.num_variables(), ddvars.len())?;
        self.state.ddvars.copy_from(ddvars);
        Ok(())
    }

    /// Sets the nodal coordinates, stored as `[x0, y0, z0, x1, y1, z1, ...]`.
    pub fn set_nodes(&mut self, xpts: &DVector<T>) -> Result<(), AssemblyError> {
        AssemblyError::check_len("nodes", SPATIAL_DIM * self.num_nodes(), xpts.len())?;
        self.state.xpts.copy_from(xpts);
        Ok(())
    }

    /// Replaces the auxiliary elements after validating them against the element set.
    pub fn set_auxiliary_elements(&mut self, auxiliary: AuxiliaryElements<T>) -> Result<(), AssemblyError> {
        validate_auxiliary_elements(&self.elements, &auxiliary)?;
        self.auxiliary = auxiliary;
        Ok(())
    }

    pub fn set_num_threads(&mut self, num_threads: usize) -> Result<(), AssemblyError> {
        let threads = ThreadConfig {
            num_threads,
            ..self.threads.clone()
        };
        threads.validate()?;
        self.threads = threads;
        Ok(())
    }

    pub fn set_thread_config(&mut self, threads: ThreadConfig) -> Result<(), AssemblyError> {
        threads.validate()?;
        self.threads = threads;
        Ok(())
    }

    pub fn create_vector(&self) -> DVector<T> {
        DVector::zeros(self.num_variables())
    }

    pub fn create_dense_matrix(&self) -> DMatrix<T> {
        DMatrix::zeros(self.num_variables(), self.num_variables())
    }

    /// Creates a zero CSR matrix with the sparsity pattern implied by the connectivity.
    pub fn create_csr_matrix(&self) -> Result<CsrMatrix<T>, AssemblyError> {
        let pattern = self.node_map.sparsity_pattern(self.vars_per_node)?;
        let values = vec![T::zero(); pattern.nnz()];
        Ok(CsrMatrix::try_from_pattern_and_values(pattern, values)?)
    }

    /// A zero matrix for design sensitivities of `num_quantities` quantities, with one column
    /// per quantity.
    pub fn create_dv_sens(&self, num_quantities: usize) -> DMatrix<T> {
        DMatrix::zeros(self.num_design_vars, num_quantities)
    }
}
