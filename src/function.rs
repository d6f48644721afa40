//! The function kernel contract used by function evaluation and design sensitivities.
use crate::element::{Element, ElementState};
use crate::schedule::ElementDomain;
use crate::Real;

/// A scalar quantity of interest computed from element contributions.
///
/// Evaluation is split into one or more iterations. Each iteration is driven by the assembler
/// as follows:
///
/// 1. [`init_evaluation`](Self::init_evaluation) with exclusive access,
/// 2. on every worker thread: [`pre_eval_thread`](Self::pre_eval_thread) on a private work
///    buffer of [`eval_work_size`](Self::eval_work_size) entries, then
///    [`element_wise_eval`](Self::element_wise_eval) for each element of the function's domain
///    claimed by the worker, then [`post_eval_thread`](Self::post_eval_thread) under a lock
///    to fold the private buffer into a shared buffer of
///    [`shared_work_size`](Self::shared_work_size) entries,
/// 3. [`final_evaluation`](Self::final_evaluation) with the merged shared buffer.
///
/// The element state passed to functions holds coordinates and state variables only.
pub trait Function<T: Real>: Send + Sync {
    fn domain(&self) -> ElementDomain<'_>;

    fn num_iterations(&self) -> usize {
        1
    }

    fn eval_work_size(&self) -> usize {
        0
    }

    fn shared_work_size(&self) -> usize {
        0
    }

    fn dv_sens_work_size(&self) -> usize {
        0
    }

    fn init_evaluation(&mut self, _iteration: usize) -> eyre::Result<()> {
        Ok(())
    }

    fn pre_eval_thread(&self, _iteration: usize, work: &mut [T]) {
        work.fill(T::zero());
    }

    fn element_wise_eval(
        &self,
        iteration: usize,
        element: &dyn Element<T>,
        element_index: usize,
        state: &ElementState<T>,
        work: &mut [T],
    ) -> eyre::Result<()>;

    /// Called under the accumulator lock once per worker and iteration.
    fn post_eval_thread(&self, _iteration: usize, work: &[T], shared: &mut [T]) {
        for (s, w) in shared.iter_mut().zip(work) {
            *s += *w;
        }
    }

    fn final_evaluation(&mut self, iteration: usize, shared: &[T]) -> eyre::Result<()>;

    fn value(&self) -> T;

    /// Adds the derivative of the element's contribution to the function with respect to the
    /// design variables to `dv_sens`.
    ///
    /// The default implementation is for functions that do not depend on design variables.
    fn element_wise_dv_sens(
        &self,
        _element: &dyn Element<T>,
        _element_index: usize,
        _state: &ElementState<T>,
        _work: &mut [T],
        _dv_sens: &mut [T],
    ) -> eyre::Result<()> {
        Ok(())
    }
}
