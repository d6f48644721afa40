use eyre::eyre;
use nalgebra::{DMatrixViewMut, DVectorViewMut};
use parasm::element::{Element, ElementMatrixType, ElementState, JacobianCoefficients};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A two-node spring with lumped mass and damping, acting independently on each of the
/// `vars_per_node` components.
///
/// The residual is `R = k K u + c u' + m u''`, where `K` is the unit spring matrix.
#[derive(Debug, Clone)]
pub struct SpringElement {
    vars_per_node: usize,
    stiffness: f64,
    damping: f64,
    mass: f64,
    design_var: Option<usize>,
}

impl SpringElement {
    pub fn new(vars_per_node: usize, stiffness: f64, mass: f64) -> Self {
        Self {
            vars_per_node,
            stiffness,
            damping: 0.0,
            mass,
            design_var: None,
        }
    }

    pub fn with_damping(self, damping: f64) -> Self {
        Self { damping, ..self }
    }

    /// Makes the stiffness the design variable with the given index.
    pub fn with_design_var(self, design_var: Option<usize>) -> Self {
        Self { design_var, ..self }
    }

    /// Adds `scale * K` to `matrix`, where `K` is the unit spring matrix.
    fn add_unit_stiffness(&self, scale: f64, matrix: &mut DMatrixViewMut<f64>) {
        let d = self.vars_per_node;
        for c in 0..d {
            matrix[(c, c)] += scale;
            matrix[(d + c, d + c)] += scale;
            matrix[(c, d + c)] -= scale;
            matrix[(d + c, c)] -= scale;
        }
    }

    /// `K u` for the unit spring matrix `K`, component `i`.
    fn unit_force(&self, vars: &[f64], i: usize) -> f64 {
        let d = self.vars_per_node;
        let c = i % d;
        let extension = vars[c] - vars[d + c];
        if i < d {
            extension
        } else {
            -extension
        }
    }
}

impl Element<f64> for SpringElement {
    fn num_nodes(&self) -> usize {
        2
    }

    fn num_variables(&self) -> usize {
        2 * self.vars_per_node
    }

    fn add_residual(&self, state: &ElementState<f64>, mut residual: DVectorViewMut<f64>) -> eyre::Result<()> {
        for i in 0..self.num_variables() {
            residual[i] += self.stiffness * self.unit_force(state.vars, i)
                + self.damping * state.dvars[i]
                + self.mass * state.ddvars[i];
        }
        Ok(())
    }

    fn add_jacobian(
        &self,
        _state: &ElementState<f64>,
        coefficients: &JacobianCoefficients<f64>,
        mut jacobian: DMatrixViewMut<f64>,
    ) -> eyre::Result<()> {
        self.add_unit_stiffness(coefficients.alpha * self.stiffness, &mut jacobian);
        for i in 0..self.num_variables() {
            jacobian[(i, i)] += coefficients.beta * self.damping + coefficients.gamma * self.mass;
        }
        Ok(())
    }

    fn add_matrix(
        &self,
        matrix_type: ElementMatrixType,
        _state: &ElementState<f64>,
        mut matrix: DMatrixViewMut<f64>,
    ) -> eyre::Result<()> {
        match matrix_type {
            ElementMatrixType::Stiffness => self.add_unit_stiffness(self.stiffness, &mut matrix),
            ElementMatrixType::Mass => {
                for i in 0..self.num_variables() {
                    matrix[(i, i)] += self.mass;
                }
            }
            ElementMatrixType::GeometricStiffness => {
                return Err(eyre!("springs have no geometric stiffness"));
            }
        }
        Ok(())
    }

    fn add_adjoint_residual_product(
        &self,
        state: &ElementState<f64>,
        scale: f64,
        adjoint: &[f64],
        dv_sens: &mut [f64],
    ) -> eyre::Result<()> {
        if let Some(dv) = self.design_var {
            let product: f64 = (0..self.num_variables())
                .map(|i| adjoint[i] * self.unit_force(state.vars, i))
                .sum();
            dv_sens[dv] += scale * product;
        }
        Ok(())
    }
}

/// Adds a constant to every residual entry and to the diagonal of every matrix, and counts
/// how often it is called.
#[derive(Debug)]
pub struct CountingElement {
    num_nodes: usize,
    vars_per_node: usize,
    value: f64,
    calls: AtomicUsize,
}

impl CountingElement {
    pub fn new(num_nodes: usize, vars_per_node: usize, value: f64) -> Self {
        Self {
            num_nodes,
            vars_per_node,
            value,
            calls: AtomicUsize::new(0),
        }
    }

    /// The total number of kernel calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl Element<f64> for CountingElement {
    fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    fn num_variables(&self) -> usize {
        self.num_nodes * self.vars_per_node
    }

    fn add_residual(&self, _state: &ElementState<f64>, mut residual: DVectorViewMut<f64>) -> eyre::Result<()> {
        self.count();
        residual.add_scalar_mut(self.value);
        Ok(())
    }

    fn add_jacobian(
        &self,
        _state: &ElementState<f64>,
        _coefficients: &JacobianCoefficients<f64>,
        mut jacobian: DMatrixViewMut<f64>,
    ) -> eyre::Result<()> {
        self.count();
        for i in 0..self.num_variables() {
            jacobian[(i, i)] += self.value;
        }
        Ok(())
    }

    fn add_matrix(
        &self,
        _matrix_type: ElementMatrixType,
        _state: &ElementState<f64>,
        mut matrix: DMatrixViewMut<f64>,
    ) -> eyre::Result<()> {
        self.count();
        for i in 0..self.num_variables() {
            matrix[(i, i)] += self.value;
        }
        Ok(())
    }

    fn add_adjoint_residual_product(
        &self,
        _state: &ElementState<f64>,
        scale: f64,
        adjoint: &[f64],
        dv_sens: &mut [f64],
    ) -> eyre::Result<()> {
        self.count();
        if let Some(first) = dv_sens.first_mut() {
            *first += scale * self.value * adjoint.iter().sum::<f64>();
        }
        Ok(())
    }
}

/// Fails on every kernel call.
#[derive(Debug)]
pub struct FailingElement {
    num_nodes: usize,
    vars_per_node: usize,
    calls: AtomicUsize,
}

impl FailingElement {
    pub fn new(num_nodes: usize, vars_per_node: usize) -> Self {
        Self {
            num_nodes,
            vars_per_node,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail(&self) -> eyre::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(eyre!("element kernel failed"))
    }
}

impl Element<f64> for FailingElement {
    fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    fn num_variables(&self) -> usize {
        self.num_nodes * self.vars_per_node
    }

    fn add_residual(&self, _state: &ElementState<f64>, _residual: DVectorViewMut<f64>) -> eyre::Result<()> {
        self.fail()
    }

    fn add_jacobian(
        &self,
        _state: &ElementState<f64>,
        _coefficients: &JacobianCoefficients<f64>,
        _jacobian: DMatrixViewMut<f64>,
    ) -> eyre::Result<()> {
        self.fail()
    }

    fn add_adjoint_residual_product(
        &self,
        _state: &ElementState<f64>,
        _scale: f64,
        _adjoint: &[f64],
        _dv_sens: &mut [f64],
    ) -> eyre::Result<()> {
        self.fail()
    }
}

/// Subtracts a fixed nodal load from the residual. Intended as an auxiliary element.
#[derive(Debug, Clone)]
pub struct NodalLoad {
    loads: Vec<f64>,
}

impl NodalLoad {
    /// `loads` holds one entry per element variable.
    pub fn new(loads: Vec<f64>) -> Self {
        Self { loads }
    }
}

impl Element<f64> for NodalLoad {
    fn num_nodes(&self) -> usize {
        // Loads are only ever attached to two-node elements in the tests
        2
    }

    fn num_variables(&self) -> usize {
        self.loads.len()
    }

    fn add_residual(&self, _state: &ElementState<f64>, mut residual: DVectorViewMut<f64>) -> eyre::Result<()> {
        for (r, load) in residual.iter_mut().zip(&self.loads) {
            *r -= load;
        }
        Ok(())
    }

    fn add_jacobian(
        &self,
        _state: &ElementState<f64>,
        _coefficients: &JacobianCoefficients<f64>,
        _jacobian: DMatrixViewMut<f64>,
    ) -> eyre::Result<()> {
        Ok(())
    }
}

/// Records the x-coordinate of the first node of every element it is applied to.
///
/// With [`chain_nodes`](crate::chain_nodes), the first node of element `i` in a chain lies at
/// `x = i`, so the recorded coordinates identify the elements.
#[derive(Debug)]
pub struct RecordingElement {
    num_nodes: usize,
    vars_per_node: usize,
    visits: Mutex<Vec<usize>>,
}

impl RecordingElement {
    pub fn new(num_nodes: usize, vars_per_node: usize) -> Self {
        Self {
            num_nodes,
            vars_per_node,
            visits: Mutex::new(Vec::new()),
        }
    }

    /// The recorded element indices in ascending order.
    pub fn visits(&self) -> Vec<usize> {
        let mut visits = self.visits.lock().clone();
        visits.sort_unstable();
        visits
    }

    fn record(&self, state: &ElementState<f64>) {
        self.visits.lock().push(state.xpts[0].round() as usize);
    }
}

impl Element<f64> for RecordingElement {
    fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    fn num_variables(&self) -> usize {
        self.num_nodes * self.vars_per_node
    }

    fn add_residual(&self, state: &ElementState<f64>, _residual: DVectorViewMut<f64>) -> eyre::Result<()> {
        self.record(state);
        Ok(())
    }

    fn add_jacobian(
        &self,
        state: &ElementState<f64>,
        _coefficients: &JacobianCoefficients<f64>,
        _jacobian: DMatrixViewMut<f64>,
    ) -> eyre::Result<()> {
        self.record(state);
        Ok(())
    }
}
