use crate::assembly::{AccumulatorGate, Assembler};
use crate::error::AssemblyError;
use crate::function::Function;
use crate::schedule::{run_phase, DomainMap, Phase};
use crate::workspace::{ScratchArena, StateFields};
use crate::Real;
use itertools::izip;
use log::debug;
use nalgebra::DMatrix;

impl<T: Real> Assembler<T> {
    /// Evaluates all functions and returns their values in input order.
    ///
    /// Evaluation runs `max(num_iterations)` passes. Pass `i` involves every function with more
    /// than `i` iterations: each is initialized, evaluated over its domain on the worker pool
    /// and finalized with the merged shared work buffer.
    pub fn evaluate_functions(&self, functions: &mut [&mut dyn Function<T>]) -> Result<Vec<T>, AssemblyError> {
        {
            let domains = DomainMap::new(functions.iter().map(|f| f.domain()), self.num_elements());
            self.check_function_domains(&domains)?;
        }

        let num_passes = functions
            .iter()
            .map(|f| f.num_iterations())
            .max()
            .unwrap_or(0);
        for iteration in 0..num_passes {
            let participating: Vec<usize> = (0..functions.len())
                .filter(|&k| functions[k].num_iterations() > iteration)
                .collect();
            debug!(
                "function evaluation pass {iteration}: {} of {} functions",
                participating.len(),
                functions.len()
            );

            for &k in &participating {
                functions[k]
                    .init_evaluation(iteration)
                    .map_err(|err| AssemblyError::Function {
                        function: k,
                        stage: "initialization",
                        source: err.into(),
                    })?;
            }

            let shared_work = {
                let active: Vec<&dyn Function<T>> = participating.iter().map(|&k| &*functions[k]).collect();
                self.evaluation_pass(iteration, &active)?
            };

            for (&k, shared) in participating.iter().zip(&shared_work) {
                functions[k]
                    .final_evaluation(iteration, shared)
                    .map_err(|err| AssemblyError::Function {
                        function: k,
                        stage: "final evaluation",
                        source: err.into(),
                    })?;
            }
        }

        Ok(functions.iter().map(|f| f.value()).collect())
    }

    /// Runs one threaded evaluation pass and returns the merged shared work buffer of every
    /// function.
    fn evaluation_pass(&self, iteration: usize, functions: &[&dyn Function<T>]) -> Result<Vec<Vec<T>>, AssemblyError> {
        let domains = DomainMap::new(functions.iter().map(|f| f.domain()), self.num_elements());
        let shared_work: Vec<Vec<T>> = functions
            .iter()
            .map(|f| vec![T::zero(); f.shared_work_size()])
            .collect();

        let vpn = self.vars_per_node;
        let gate = AccumulatorGate::new(shared_work);
        run_phase(Phase::FunctionEvaluation, &self.threads, domains.total(), |worker| {
            let mut scratch = ScratchArena::for_vectors(&self.scratch_sizes);
            let mut cursor = domains.cursor();
            let mut work: Vec<Vec<T>> = functions
                .iter()
                .map(|f| {
                    let mut work = vec![T::zero(); f.eval_work_size()];
                    f.pre_eval_thread(iteration, &mut work);
                    work
                })
                .collect();

            while let Some(unit) = worker.claim().and_then(|flat| cursor.resolve(flat)) {
                let element_index = unit.element_index;
                let element = self.elements[element_index].as_ref();
                let state = scratch.state.gather(
                    &self.state,
                    &self.node_map,
                    element_index,
                    vpn,
                    StateFields::VarsAndNodes,
                );
                let function = functions[unit.quantity];
                if let Err(err) =
                    function.element_wise_eval(iteration, element, element_index, &state, &mut work[unit.quantity])
                {
                    worker.fail(element_index, err);
                    return;
                }
            }

            gate.scatter_add(|shared| {
                for (function, work, shared) in izip!(functions, &work, shared.iter_mut()) {
                    function.post_eval_thread(iteration, work, shared);
                }
            });
        })?;

        Ok(gate.into_inner())
    }

    /// Adds the derivative of every function with respect to the design variables to the
    /// corresponding column of `dv_sens`.
    ///
    /// `dv_sens` has [`num_design_vars`](Self::num_design_vars) rows and one column per function.
    /// Functions should have been evaluated at the current state beforehand.
    pub fn add_function_dv_sens(
        &self,
        functions: &[&dyn Function<T>],
        dv_sens: &mut DMatrix<T>,
    ) -> Result<(), AssemblyError> {
        let num_dvs = self.num_design_vars;
        let num_functions = functions.len();
        AssemblyError::check_shape("design sensitivities", (num_dvs, num_functions), dv_sens.shape())?;
        let domains = DomainMap::new(functions.iter().map(|f| f.domain()), self.num_elements());
        self.check_function_domains(&domains)?;

        let vpn = self.vars_per_node;
        let gate = AccumulatorGate::new(dv_sens);
        run_phase(Phase::FunctionDesignSensitivity, &self.threads, domains.total(), |worker| {
            let mut scratch = ScratchArena::for_vectors(&self.scratch_sizes);
            let mut cursor = domains.cursor();
            let mut local_sens = DMatrix::zeros(num_dvs, num_functions);
            let mut work: Vec<Vec<T>> = functions
                .iter()
                .map(|f| vec![T::zero(); f.dv_sens_work_size()])
                .collect();

            while let Some(unit) = worker.claim().and_then(|flat| cursor.resolve(flat)) {
                let element_index = unit.element_index;
                let k = unit.quantity;
                let element = self.elements[element_index].as_ref();
                let state = scratch.state.gather(
                    &self.state,
                    &self.node_map,
                    element_index,
                    vpn,
                    StateFields::VarsAndNodes,
                );
                let column = &mut local_sens.as_mut_slice()[num_dvs * k..num_dvs * (k + 1)];
                if let Err(err) =
                    functions[k].element_wise_dv_sens(element, element_index, &state, &mut work[k], column)
                {
                    worker.fail(element_index, err);
                    return;
                }
            }

            gate.scatter_add(|dv_sens| **dv_sens += &local_sens);
        })?;
        Ok(())
    }

    fn check_function_domains(&self, domains: &DomainMap) -> Result<(), AssemblyError> {
        match domains.find_out_of_range() {
            Some((function, element)) => Err(AssemblyError::FunctionDomain {
                function,
                element,
                num_elements: self.num_elements(),
            }),
            None => Ok(()),
        }
    }
}
