//! The element kernel contract.
//!
//! Elements are opaque to the assembler: it only gathers their nodal data into local buffers,
//! calls into the kernel and scatters the local result into the global accumulators.
use crate::Real;
use eyre::eyre;
use nalgebra::{DMatrixViewMut, DVectorViewMut};
use serde::{Deserialize, Serialize};

/// Matrices that an element may provide in addition to its Jacobian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementMatrixType {
    Stiffness,
    Mass,
    GeometricStiffness,
}

/// Whether element matrices are added as computed or transposed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatrixOrientation {
    #[default]
    Normal,
    Transpose,
}

/// Coefficients of the linear combination
/// `alpha * dR/du + beta * dR/du' + gamma * dR/du''`
/// that makes up the Jacobian of a time-dependent residual `R(u, u', u'')`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JacobianCoefficients<T> {
    pub alpha: T,
    pub beta: T,
    pub gamma: T,
}

impl<T: Real> JacobianCoefficients<T> {
    pub fn new(alpha: T, beta: T, gamma: T) -> Self {
        Self { alpha, beta, gamma }
    }

    /// The derivative with respect to the state only.
    pub fn stiffness() -> Self {
        Self::new(T::one(), T::zero(), T::zero())
    }
}

/// Element-local copy of the shared nodal state.
///
/// `xpts` holds `3 * num_nodes` coordinates, while `vars`, `dvars` and `ddvars` hold
/// `num_variables` entries each, ordered node by node. Phases that only need the state and the
/// coordinates (typed matrices and functions) leave `dvars` and `ddvars` empty.
#[derive(Debug, Clone, Copy)]
pub struct ElementState<'a, T> {
    pub time: T,
    pub xpts: &'a [T],
    pub vars: &'a [T],
    pub dvars: &'a [T],
    pub ddvars: &'a [T],
}

/// A finite element kernel.
///
/// All `add_*` methods *add* their contribution to the output, which the assembler zeroes
/// before the first call for each element. Outputs have dimension `num_variables()`.
///
/// Kernels report failure through the returned `Result`; the assembler aborts the phase and
/// returns the first failure to the caller.
pub trait Element<T: Real>: Send + Sync {
    fn num_nodes(&self) -> usize;

    fn num_variables(&self) -> usize;

    fn add_residual(&self, state: &ElementState<T>, residual: DVectorViewMut<T>) -> eyre::Result<()>;

    fn add_jacobian(
        &self,
        state: &ElementState<T>,
        coefficients: &JacobianCoefficients<T>,
        jacobian: DMatrixViewMut<T>,
    ) -> eyre::Result<()>;

    fn add_matrix(
        &self,
        matrix_type: ElementMatrixType,
        _state: &ElementState<T>,
        _matrix: DMatrixViewMut<T>,
    ) -> eyre::Result<()> {
        Err(eyre!("element does not provide a {matrix_type:?} matrix"))
    }

    /// Adds `scale * adjoint^T dR/dx` to `dv_sens`, where `x` are the design variables.
    ///
    /// The default implementation is for elements that do not depend on design variables.
    fn add_adjoint_residual_product(
        &self,
        _state: &ElementState<T>,
        _scale: T,
        _adjoint: &[T],
        _dv_sens: &mut [T],
    ) -> eyre::Result<()> {
        Ok(())
    }
}
