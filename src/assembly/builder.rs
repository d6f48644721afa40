use crate::assembly::{Assembler, NodalState};
use crate::auxiliary::AuxiliaryElements;
use crate::connectivity::{DependentNodes, NodeMap};
use crate::element::Element;
use crate::error::AssemblyError;
use crate::schedule::ThreadConfig;
use crate::workspace::ScratchSizes;
use crate::Real;
use fenris_nested_vec::NestedVec;
use std::sync::Arc;

/// Builder for [`Assembler`].
///
/// Elements are added together with their connectivity. All sizes are validated in
/// [`build`](Self::build).
pub struct AssemblerBuilder<T: Real> {
    vars_per_node: usize,
    num_nodes: usize,
    element_nodes: NestedVec<usize>,
    elements: Vec<Arc<dyn Element<T>>>,
    dependent_nodes: DependentNodes<T>,
    auxiliary: AuxiliaryElements<T>,
    num_design_vars: usize,
    threads: ThreadConfig,
}

impl<T: Real> AssemblerBuilder<T> {
    pub fn new(vars_per_node: usize, num_nodes: usize) -> Self {
        Self {
            vars_per_node,
            num_nodes,
            element_nodes: NestedVec::new(),
            elements: Vec::new(),
            dependent_nodes: DependentNodes::new(),
            auxiliary: AuxiliaryElements::new(),
            num_design_vars: 0,
            threads: ThreadConfig::default(),
        }
    }

    pub fn with_element(mut self, nodes: &[usize], element: Arc<dyn Element<T>>) -> Self {
        self.add_element(nodes, element);
        self
    }

    pub fn add_element(&mut self, nodes: &[usize], element: Arc<dyn Element<T>>) {
        self.element_nodes.push(nodes);
        self.elements.push(element);
    }

    /// Adds elements that all share the same kernel.
    pub fn with_elements<'a>(
        mut self,
        connectivity: impl IntoIterator<Item = &'a [usize]>,
        element: Arc<dyn Element<T>>,
    ) -> Self {
        for nodes in connectivity {
            self.add_element(nodes, Arc::clone(&element));
        }
        self
    }

    pub fn with_dependent_nodes(mut self, dependent_nodes: DependentNodes<T>) -> Self {
        self.dependent_nodes = dependent_nodes;
        self
    }

    pub fn with_auxiliary_elements(mut self, auxiliary: AuxiliaryElements<T>) -> Self {
        self.auxiliary = auxiliary;
        self
    }

    pub fn with_num_design_vars(mut self, num_design_vars: usize) -> Self {
        self.num_design_vars = num_design_vars;
        self
    }

    pub fn with_threads(mut self, threads: ThreadConfig) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.threads.num_threads = num_threads;
        self
    }

    pub fn build(self) -> Result<Assembler<T>, AssemblyError> {
        let vpn = self.vars_per_node;
        if vpn == 0 {
            return Err(AssemblyError::invalid_config("vars_per_node must be at least 1"));
        }
        self.threads.validate()?;

        let node_map = NodeMap::try_new(self.num_nodes, self.element_nodes, self.dependent_nodes)?;
        for (index, element) in self.elements.iter().enumerate() {
            let num_nodes = node_map.element_nodes(index).len();
            if element.num_nodes() != num_nodes || element.num_variables() != vpn * num_nodes {
                return Err(AssemblyError::ElementSize {
                    element: index,
                    declared: element.num_variables(),
                    expected: vpn * num_nodes,
                    num_nodes,
                    vars_per_node: vpn,
                });
            }
        }
        validate_auxiliary_elements(&self.elements, &self.auxiliary)?;

        let scratch_sizes = ScratchSizes {
            vars_per_node: vpn,
            max_element_nodes: node_map.max_element_nodes(),
            max_element_variables: vpn * node_map.max_element_nodes(),
            max_independent_nodes: node_map.max_element_independent_nodes(),
            has_dependent_nodes: node_map.num_dependent_nodes() > 0,
        };

        Ok(Assembler {
            vars_per_node: vpn,
            state: NodalState::zeros(node_map.num_nodes(), vpn),
            node_map,
            elements: self.elements,
            auxiliary: self.auxiliary,
            num_design_vars: self.num_design_vars,
            threads: self.threads,
            scratch_sizes,
        })
    }
}

/// Checks that every auxiliary element refers to an existing element of the same size.
pub(crate) fn validate_auxiliary_elements<T: Real>(
    elements: &[Arc<dyn Element<T>>],
    auxiliary: &AuxiliaryElements<T>,
) -> Result<(), AssemblyError> {
    for entry in auxiliary.entries() {
        let index = entry.element_index();
        let element = elements
            .get(index)
            .ok_or(AssemblyError::AuxiliaryOutOfRange {
                element: index,
                num_elements: elements.len(),
            })?;
        if entry.element().num_variables() != element.num_variables() {
            return Err(AssemblyError::AuxiliarySize {
                element: index,
                declared: entry.element().num_variables(),
                expected: element.num_variables(),
            });
        }
    }
    Ok(())
}
