use eyre::eyre;
use parasm::element::{Element, ElementState};
use parasm::function::Function;
use parasm::schedule::ElementDomain;

/// The sum of all element-local state variables over a domain.
///
/// Nodes shared by several elements of the domain are counted once per element. The design
/// sensitivity treats the sum as scaled by design variable `scale_design_var`, evaluated at one.
#[derive(Debug, Clone, Default)]
pub struct StateSum {
    elements: Option<Vec<usize>>,
    scale_design_var: Option<usize>,
    value: f64,
    init_calls: usize,
    final_calls: usize,
}

impl StateSum {
    pub fn entire() -> Self {
        Self::default()
    }

    pub fn subset(elements: Vec<usize>) -> Self {
        Self {
            elements: Some(elements),
            ..Self::default()
        }
    }

    pub fn with_scale_design_var(self, design_var: usize) -> Self {
        Self {
            scale_design_var: Some(design_var),
            ..self
        }
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls
    }

    pub fn final_calls(&self) -> usize {
        self.final_calls
    }
}

impl Function<f64> for StateSum {
    fn domain(&self) -> ElementDomain<'_> {
        match &self.elements {
            Some(elements) => ElementDomain::Subset(elements),
            None => ElementDomain::Entire,
        }
    }

    fn eval_work_size(&self) -> usize {
        1
    }

    fn shared_work_size(&self) -> usize {
        1
    }

    fn init_evaluation(&mut self, _iteration: usize) -> eyre::Result<()> {
        self.init_calls += 1;
        self.value = 0.0;
        Ok(())
    }

    fn element_wise_eval(
        &self,
        _iteration: usize,
        _element: &dyn Element<f64>,
        _element_index: usize,
        state: &ElementState<f64>,
        work: &mut [f64],
    ) -> eyre::Result<()> {
        work[0] += state.vars.iter().sum::<f64>();
        Ok(())
    }

    fn final_evaluation(&mut self, _iteration: usize, shared: &[f64]) -> eyre::Result<()> {
        self.final_calls += 1;
        self.value = shared[0];
        Ok(())
    }

    fn value(&self) -> f64 {
        self.value
    }

    fn element_wise_dv_sens(
        &self,
        _element: &dyn Element<f64>,
        _element_index: usize,
        state: &ElementState<f64>,
        _work: &mut [f64],
        dv_sens: &mut [f64],
    ) -> eyre::Result<()> {
        if let Some(dv) = self.scale_design_var {
            dv_sens[dv] += state.vars.iter().sum::<f64>();
        }
        Ok(())
    }
}

/// The sum of squared deviations of the element-local state variables from their mean,
/// computed in two iterations: the first finds the mean, the second the deviations.
#[derive(Debug, Clone, Default)]
pub struct SquaredDeviation {
    mean: f64,
    value: f64,
    /// The iteration of every `init_evaluation` and `final_evaluation` call, in call order.
    pub init_iterations: Vec<usize>,
    pub final_iterations: Vec<usize>,
}

impl SquaredDeviation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }
}

impl Function<f64> for SquaredDeviation {
    fn domain(&self) -> ElementDomain<'_> {
        ElementDomain::Entire
    }

    fn num_iterations(&self) -> usize {
        2
    }

    fn eval_work_size(&self) -> usize {
        2
    }

    fn shared_work_size(&self) -> usize {
        2
    }

    fn init_evaluation(&mut self, iteration: usize) -> eyre::Result<()> {
        self.init_iterations.push(iteration);
        Ok(())
    }

    fn element_wise_eval(
        &self,
        iteration: usize,
        _element: &dyn Element<f64>,
        _element_index: usize,
        state: &ElementState<f64>,
        work: &mut [f64],
    ) -> eyre::Result<()> {
        for &v in state.vars {
            if iteration == 0 {
                work[0] += v;
                work[1] += 1.0;
            } else {
                work[0] += (v - self.mean).powi(2);
            }
        }
        Ok(())
    }

    fn final_evaluation(&mut self, iteration: usize, shared: &[f64]) -> eyre::Result<()> {
        self.final_iterations.push(iteration);
        match iteration {
            0 if shared[1] > 0.0 => self.mean = shared[0] / shared[1],
            0 => self.mean = 0.0,
            1 => self.value = shared[0],
            _ => return Err(eyre!("unexpected iteration {iteration}")),
        }
        Ok(())
    }

    fn value(&self) -> f64 {
        self.value
    }
}
