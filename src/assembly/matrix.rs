use crate::assembly::{AccumulatorGate, Assembler, MatrixAccumulator};
use crate::auxiliary::AuxiliaryCursor;
use crate::element::{ElementMatrixType, JacobianCoefficients, MatrixOrientation};
use crate::error::AssemblyError;
use crate::schedule::{run_phase, Phase};
use crate::workspace::{vector_mut, ScratchArena, StateFields};
use crate::Real;
use nalgebra::DVector;

impl<T: Real> Assembler<T> {
    /// Adds the Jacobian `alpha * dR/du + beta * dR/du' + gamma * dR/du''` of every element,
    /// and of the auxiliary elements attached to it, to `matrix`.
    ///
    /// If `residual` is given, the residual is assembled into it in the same pass. Neither
    /// output is zeroed first.
    pub fn assemble_jacobian(
        &self,
        coefficients: &JacobianCoefficients<T>,
        orientation: MatrixOrientation,
        residual: Option<&mut DVector<T>>,
        matrix: &mut dyn MatrixAccumulator<T>,
    ) -> Result<(), AssemblyError> {
        let n = self.num_variables();
        if let Some(residual) = &residual {
            AssemblyError::check_len("residual", n, residual.len())?;
        }
        AssemblyError::check_shape("matrix", (n, n), (matrix.nrows(), matrix.ncols()))?;

        let vpn = self.vars_per_node;
        let gate = AccumulatorGate::new((residual, matrix));
        run_phase(Phase::Jacobian, &self.threads, self.num_elements(), |worker| {
            let mut scratch = ScratchArena::for_matrices(&self.scratch_sizes);
            let mut auxiliary = self.auxiliary.cursor();
            while let Some(element_index) = worker.claim() {
                let result = self
                    .compute_element_jacobian(element_index, coefficients, &mut scratch, &mut auxiliary)
                    .and_then(|n| {
                        let (dofs, element_matrix) =
                            scratch
                                .matrix
                                .scatter_view(&self.node_map, element_index, vpn, n, orientation);
                        let element_residual = &scratch.residual[..n];
                        gate.scatter_add(|(residual, matrix)| {
                            if let Some(residual) = residual {
                                self.node_map
                                    .scatter_add(element_index, vpn, element_residual, residual.as_mut_slice());
                            }
                            matrix.add_element_matrix(dofs, element_matrix)
                        })
                    });
                if let Err(err) = result {
                    worker.fail(element_index, err);
                    break;
                }
            }
        })?;
        Ok(())
    }

    /// Adds the element matrix of the given type of every element to `matrix`.
    ///
    /// Kernels receive the coordinates and the state variables only. Auxiliary elements do
    /// not contribute to typed matrices.
    pub fn assemble_matrix(
        &self,
        matrix_type: ElementMatrixType,
        orientation: MatrixOrientation,
        matrix: &mut dyn MatrixAccumulator<T>,
    ) -> Result<(), AssemblyError> {
        let n = self.num_variables();
        AssemblyError::check_shape("matrix", (n, n), (matrix.nrows(), matrix.ncols()))?;

        let vpn = self.vars_per_node;
        let gate = AccumulatorGate::new(matrix);
        run_phase(Phase::Matrix, &self.threads, self.num_elements(), |worker| {
            let mut scratch = ScratchArena::for_matrices(&self.scratch_sizes);
            while let Some(element_index) = worker.claim() {
                let element = self.elements[element_index].as_ref();
                let n = element.num_variables();
                let state = scratch.state.gather(
                    &self.state,
                    &self.node_map,
                    element_index,
                    vpn,
                    StateFields::VarsAndNodes,
                );
                scratch.matrix.clear(n);
                let result = element
                    .add_matrix(matrix_type, &state, scratch.matrix.local_mut(n))
                    .and_then(|_| {
                        let (dofs, element_matrix) =
                            scratch
                                .matrix
                                .scatter_view(&self.node_map, element_index, vpn, n, orientation);
                        gate.scatter_add(|matrix| matrix.add_element_matrix(dofs, element_matrix))
                    });
                if let Err(err) = result {
                    worker.fail(element_index, err);
                    break;
                }
            }
        })?;
        Ok(())
    }

    /// Computes the residual and the Jacobian of an element into the scratch buffers and
    /// returns the number of element variables.
    fn compute_element_jacobian(
        &self,
        element_index: usize,
        coefficients: &JacobianCoefficients<T>,
        scratch: &mut ScratchArena<T>,
        auxiliary: &mut AuxiliaryCursor<T>,
    ) -> eyre::Result<usize> {
        let element = self.elements[element_index].as_ref();
        let n = element.num_variables();
        let state = scratch.state.gather(
            &self.state,
            &self.node_map,
            element_index,
            self.vars_per_node,
            StateFields::All,
        );

        scratch.residual[..n].fill(T::zero());
        scratch.matrix.clear(n);
        element.add_residual(&state, vector_mut(&mut scratch.residual, n))?;
        element.add_jacobian(&state, coefficients, scratch.matrix.local_mut(n))?;
        for entry in auxiliary.advance_to(element_index) {
            let aux = entry.element();
            aux.add_residual(&state, vector_mut(&mut scratch.residual, n))?;
            aux.add_jacobian(&state, coefficients, scratch.matrix.local_mut(n))?;
        }
        Ok(n)
    }
}
