use crate::assembly::{AccumulatorGate, Assembler};
use crate::error::AssemblyError;
use crate::schedule::{run_phase, Phase};
use crate::workspace::{ScratchArena, StateFields};
use crate::Real;
use nalgebra::DMatrix;

impl<T: Real> Assembler<T> {
    /// Adds `psi_k^T dR/dx` to column `k` of `dv_sens` for every column `psi_k` of `adjoints`,
    /// where `x` are the design variables.
    ///
    /// `adjoints` has one column of length [`num_variables`](Self::num_variables) per adjoint
    /// vector and `dv_sens` has [`num_design_vars`](Self::num_design_vars) rows and one column
    /// per adjoint vector. Each worker accumulates into a private matrix that is added to
    /// `dv_sens` once, after the worker has run out of elements. Auxiliary elements do not
    /// contribute.
    pub fn add_adjoint_residual_products(
        &self,
        adjoints: &DMatrix<T>,
        dv_sens: &mut DMatrix<T>,
    ) -> Result<(), AssemblyError> {
        let num_adjoints = adjoints.ncols();
        let num_dvs = self.num_design_vars;
        let nv = self.num_variables();
        AssemblyError::check_shape("adjoints", (nv, num_adjoints), adjoints.shape())?;
        AssemblyError::check_shape("design sensitivities", (num_dvs, num_adjoints), dv_sens.shape())?;

        let vpn = self.vars_per_node;
        let gate = AccumulatorGate::new(dv_sens);
        run_phase(Phase::AdjointResidualProduct, &self.threads, self.num_elements(), |worker| {
            let mut scratch = ScratchArena::for_vectors(&self.scratch_sizes);
            let mut local_sens = DMatrix::zeros(num_dvs, num_adjoints);
            while let Some(element_index) = worker.claim() {
                let element = self.elements[element_index].as_ref();
                let n = element.num_variables();
                let state = scratch
                    .state
                    .gather(&self.state, &self.node_map, element_index, vpn, StateFields::All);

                let result = (0..num_adjoints).try_for_each(|k| {
                    let adjoint = &adjoints.as_slice()[nv * k..nv * (k + 1)];
                    self.node_map
                        .gather(element_index, vpn, adjoint, &mut scratch.adjoint);
                    let column = &mut local_sens.as_mut_slice()[num_dvs * k..num_dvs * (k + 1)];
                    element.add_adjoint_residual_product(&state, T::one(), &scratch.adjoint[..n], column)
                });
                if let Err(err) = result {
                    worker.fail(element_index, err);
                    return;
                }
            }
            gate.scatter_add(|dv_sens| **dv_sens += &local_sens);
        })?;
        Ok(())
    }
}
