use crate::assembly::{AccumulatorGate, Assembler};
use crate::auxiliary::AuxiliaryCursor;
use crate::error::AssemblyError;
use crate::schedule::{run_phase, Phase};
use crate::workspace::{vector_mut, ScratchArena, StateFields};
use crate::Real;
use nalgebra::DVector;

impl<T: Real> Assembler<T> {
    /// Adds the residual of every element, and of the auxiliary elements attached to it, to
    /// `residual`.
    ///
    /// The residual is not zeroed first.
    pub fn assemble_residual(&self, residual: &mut DVector<T>) -> Result<(), AssemblyError> {
        AssemblyError::check_len("residual", self.num_variables(), residual.len())?;

        let vpn = self.vars_per_node;
        let gate = AccumulatorGate::new(residual);
        run_phase(Phase::Residual, &self.threads, self.num_elements(), |worker| {
            let mut scratch = ScratchArena::for_vectors(&self.scratch_sizes);
            let mut auxiliary = self.auxiliary.cursor();
            while let Some(element_index) = worker.claim() {
                match self.compute_element_residual(element_index, &mut scratch, &mut auxiliary) {
                    Ok(n) => gate.scatter_add(|residual| {
                        self.node_map
                            .scatter_add(element_index, vpn, &scratch.residual[..n], residual.as_mut_slice())
                    }),
                    Err(err) => {
                        worker.fail(element_index, err);
                        break;
                    }
                }
            }
        })?;
        Ok(())
    }

    /// Computes the residual of an element into the scratch residual buffer and returns its
    /// length.
    fn compute_element_residual(
        &self,
        element_index: usize,
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
        element.add_residual(&state, vector_mut(&mut scratch.residual, n))?;
        for entry in auxiliary.advance_to(element_index) {
            entry
                .element()
                .add_residual(&state, vector_mut(&mut scratch.residual, n))?;
        }
        Ok(n)
    }
}
