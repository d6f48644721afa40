//! Mapping between element-local and global degrees of freedom.
//!
//! Elements reference nodes by index. Indices `0 .. num_nodes` are *independent* nodes, which
//! own entries in the global vectors. Indices `num_nodes .. num_nodes + num_dependent` are
//! *dependent* nodes: each is a fixed weighted combination of independent nodes and owns no
//! global entries of its own.
use crate::error::AssemblyError;
use crate::Real;
use fenris_nested_vec::NestedVec;
use itertools::izip;
use nalgebra::Scalar;
use nalgebra_sparse::pattern::SparsityPattern;
use std::collections::BTreeSet;

/// Dependent nodes, each given as a list of independent nodes with weights.
#[derive(Debug, Clone, PartialEq)]
pub struct DependentNodes<T> {
    nodes: NestedVec<usize>,
    weights: NestedVec<T>,
}

impl<T> Default for DependentNodes<T> {
    fn default() -> Self {
        Self {
            nodes: NestedVec::new(),
            weights: NestedVec::new(),
        }
    }
}

impl<T: Scalar> DependentNodes<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a dependent node with the given independent nodes and weights.
    ///
    /// # Panics
    ///
    /// Panics if `nodes` and `weights` have different lengths.
    pub fn push(&mut self, nodes: &[usize], weights: &[T]) {
        assert_eq!(nodes.len(), weights.len(), "Each independent node needs exactly one weight");
        self.nodes.push(nodes);
        self.weights.push(weights);
    }

    pub fn with_node(mut self, nodes: &[usize], weights: &[T]) -> Self {
        self.push(nodes, weights);
        self
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The independent nodes and weights of dependent node `index`.
    pub fn get(&self, index: usize) -> Option<(&[usize], &[T])> {
        Some((self.nodes.get(index)?, self.weights.get(index)?))
    }
}

/// Element connectivity together with the dependent nodes it may refer to.
#[derive(Debug, Clone)]
pub struct NodeMap<T> {
    num_nodes: usize,
    element_nodes: NestedVec<usize>,
    dependent_nodes: DependentNodes<T>,
    max_element_nodes: usize,
    max_element_independent_nodes: usize,
}

impl<T: Real> NodeMap<T> {
    /// Validates and stores the connectivity.
    ///
    /// Fails if an element refers to a node that does not exist, or if a dependent node is
    /// empty or refers to anything but independent nodes.
    pub fn try_new(
        num_nodes: usize,
        element_nodes: NestedVec<usize>,
        dependent_nodes: DependentNodes<T>,
    ) -> Result<Self, AssemblyError> {
        for dependent in 0..dependent_nodes.len() {
            let nodes = dependent_nodes.get(dependent).map_or(&[][..], |(nodes, _)| nodes);
            if nodes.is_empty() {
                return Err(AssemblyError::InvalidDependentNode {
                    dependent,
                    reason: "no independent nodes given".to_string(),
                });
            }
            if let Some(&node) = nodes.iter().find(|&&node| node >= num_nodes) {
                return Err(AssemblyError::InvalidDependentNode {
                    dependent,
                    reason: format!("node {node} is not an independent node"),
                });
            }
        }

        let total_nodes = num_nodes + dependent_nodes.len();
        let mut max_element_nodes = 0;
        let mut max_element_independent_nodes = 0;
        for (element, nodes) in element_nodes.iter().enumerate() {
            if let Some(&node) = nodes.iter().find(|&&node| node >= total_nodes) {
                return Err(AssemblyError::NodeOutOfRange {
                    element,
                    node,
                    num_nodes: total_nodes,
                });
            }
            let independent_count: usize = nodes
                .iter()
                .map(|&node| match node.checked_sub(num_nodes) {
                    Some(dependent) => dependent_nodes.get(dependent).map_or(0, |(n, _)| n.len()),
                    None => 1,
                })
                .sum();
            max_element_nodes = max_element_nodes.max(nodes.len());
            max_element_independent_nodes = max_element_independent_nodes.max(independent_count);
        }

        Ok(Self {
            num_nodes,
            element_nodes,
            dependent_nodes,
            max_element_nodes,
            max_element_independent_nodes,
        })
    }

    /// The number of independent nodes.
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn num_dependent_nodes(&self) -> usize {
        self.dependent_nodes.len()
    }

    pub fn num_elements(&self) -> usize {
        self.element_nodes.len()
    }

    pub fn element_nodes(&self, element_index: usize) -> &[usize] {
        self.element_nodes.get(element_index).unwrap_or(&[])
    }

    pub fn dependent_nodes(&self) -> &DependentNodes<T> {
        &self.dependent_nodes
    }

    pub fn max_element_nodes(&self) -> usize {
        self.max_element_nodes
    }

    /// The largest number of independent nodes an element expands to, counting each
    /// dependent node as the number of independent nodes it combines.
    pub fn max_element_independent_nodes(&self) -> usize {
        self.max_element_independent_nodes
    }

    pub fn element_has_dependent_nodes(&self, element_index: usize) -> bool {
        self.element_nodes(element_index)
            .iter()
            .any(|&node| node >= self.num_nodes)
    }

    fn dependent(&self, node: usize) -> (&[usize], &[T]) {
        self.dependent_nodes
            .get(node - self.num_nodes)
            .unwrap_or((&[][..], &[][..]))
    }

    /// Copies the `dim` values per node of the element's nodes from `global` into `local`.
    ///
    /// The values of a dependent node are the weighted sum of the values of its independent
    /// nodes. Returns the number of nodes of the element.
    pub fn gather(&self, element_index: usize, dim: usize, global: &[T], local: &mut [T]) -> usize {
        let nodes = self.element_nodes(element_index);
        for (local_node, &node) in nodes.iter().enumerate() {
            let local_values = &mut local[dim * local_node..dim * (local_node + 1)];
            if node < self.num_nodes {
                local_values.copy_from_slice(&global[dim * node..dim * (node + 1)]);
            } else {
                local_values.fill(T::zero());
                let (independent, weights) = self.dependent(node);
                for (&node, &w) in izip!(independent, weights) {
                    for (l, &g) in izip!(local_values.iter_mut(), &global[dim * node..dim * (node + 1)]) {
                        *l += w * g;
                    }
                }
            }
        }
        nodes.len()
    }

    /// Adds the `dim` values per node in `local` to the corresponding entries of `global`.
    ///
    /// The values of a dependent node are distributed to its independent nodes, scaled by
    /// the weights. This is the transpose of [`gather`](Self::gather).
    pub fn scatter_add(&self, element_index: usize, dim: usize, local: &[T], global: &mut [T]) {
        let nodes = self.element_nodes(element_index);
        for (local_node, &node) in nodes.iter().enumerate() {
            let local_values = &local[dim * local_node..dim * (local_node + 1)];
            if node < self.num_nodes {
                for (g, &l) in izip!(&mut global[dim * node..dim * (node + 1)], local_values) {
                    *g += l;
                }
            } else {
                let (independent, weights) = self.dependent(node);
                for (&node, &w) in izip!(independent, weights) {
                    for (g, &l) in izip!(&mut global[dim * node..dim * (node + 1)], local_values) {
                        *g += w * l;
                    }
                }
            }
        }
    }

    /// Expands the nodes of an element into independent nodes.
    ///
    /// Entry `k` of the output states that local node `local_nodes[k]` contributes to
    /// independent node `nodes[k]` with weight `weights[k]`. Independent nodes contribute to
    /// themselves with weight one. Returns the number of entries written.
    pub fn expand_element(
        &self,
        element_index: usize,
        nodes: &mut [usize],
        weights: &mut [T],
        local_nodes: &mut [usize],
    ) -> usize {
        let mut count = 0;
        for (local_node, &node) in self.element_nodes(element_index).iter().enumerate() {
            if node < self.num_nodes {
                nodes[count] = node;
                weights[count] = T::one();
                local_nodes[count] = local_node;
                count += 1;
            } else {
                let (independent, dependent_weights) = self.dependent(node);
                for (&node, &w) in izip!(independent, dependent_weights) {
                    nodes[count] = node;
                    weights[count] = w;
                    local_nodes[count] = local_node;
                    count += 1;
                }
            }
        }
        count
    }

    /// The independent nodes coupled by an element, in no particular order and possibly with
    /// duplicates.
    fn independent_element_nodes(&self, element_index: usize, output: &mut Vec<usize>) {
        output.clear();
        for &node in self.element_nodes(element_index) {
            if node < self.num_nodes {
                output.push(node);
            } else {
                output.extend_from_slice(self.dependent(node).0);
            }
        }
    }

    /// Computes the sparsity pattern of a matrix assembled over all elements with
    /// `vars_per_node` variables per node.
    pub fn sparsity_pattern(&self, vars_per_node: usize) -> Result<SparsityPattern, AssemblyError> {
        // Collecting into a BTreeSet stores each entry exactly once, which matters because
        // neighboring elements produce many duplicate entries
        let d = vars_per_node;
        let mut matrix_entries = BTreeSet::new();
        let mut element_nodes = Vec::new();
        for element_index in 0..self.num_elements() {
            self.independent_element_nodes(element_index, &mut element_nodes);
            for &node_i in &element_nodes {
                for &node_j in &element_nodes {
                    for s_i in 0..d {
                        for s_j in 0..d {
                            matrix_entries.insert((d * node_i + s_i, d * node_j + s_j));
                        }
                    }
                }
            }
        }

        let num_rows = d * self.num_nodes;
        let mut offsets = Vec::with_capacity(num_rows + 1);
        let mut column_indices = Vec::with_capacity(matrix_entries.len());

        offsets.push(0);
        for (i, j) in matrix_entries {
            // Loop to correctly handle consecutive empty rows
            while i + 1 > offsets.len() {
                offsets.push(column_indices.len());
            }
            column_indices.push(j);
        }

        while offsets.len() < num_rows + 1 {
            offsets.push(column_indices.len());
        }

        Ok(SparsityPattern::try_from_offsets_and_indices(
            num_rows,
            num_rows,
            offsets,
            column_indices,
        )?)
    }
}
