//! Per-worker scratch buffers.
//!
//! Every worker of a phase owns one [`ScratchArena`], allocated when the worker starts and
//! dropped when it returns. Buffers are sized from global maxima over all elements, so no
//! allocation happens while elements are processed. The contents of a buffer are undefined
//! until they are written for the current element.
use crate::assembly::NodalState;
use crate::connectivity::NodeMap;
use crate::element::{ElementState, MatrixOrientation};
use crate::{Real, SPATIAL_DIM};
use nalgebra::{DMatrixView, DMatrixViewMut, DVectorViewMut};

/// Global maxima that determine the size of the scratch buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct ScratchSizes {
    pub vars_per_node: usize,
    pub max_element_nodes: usize,
    pub max_element_variables: usize,
    /// The largest number of independent nodes an element expands to.
    pub max_independent_nodes: usize,
    pub has_dependent_nodes: bool,
}

/// Which parts of the nodal state a phase hands to its kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StateFields {
    All,
    /// Coordinates and state variables only, with empty derivative slices.
    VarsAndNodes,
}

#[derive(Debug)]
pub(crate) struct StateBuffers<T> {
    xpts: Vec<T>,
    vars: Vec<T>,
    dvars: Vec<T>,
    ddvars: Vec<T>,
}

impl<T: Real> StateBuffers<T> {
    fn new(sizes: &ScratchSizes) -> Self {
        let s = sizes.max_element_variables;
        Self {
            xpts: vec![T::zero(); SPATIAL_DIM * sizes.max_element_nodes],
            vars: vec![T::zero(); s],
            dvars: vec![T::zero(); s],
            ddvars: vec![T::zero(); s],
        }
    }

    /// Copies the nodal state of an element into the local buffers.
    pub fn gather(
        &mut self,
        state: &NodalState<T>,
        node_map: &NodeMap<T>,
        element_index: usize,
        vars_per_node: usize,
        fields: StateFields,
    ) -> ElementState<'_, T> {
        let num_nodes = node_map.gather(element_index, SPATIAL_DIM, state.xpts.as_slice(), &mut self.xpts);
        let n = node_map.gather(element_index, vars_per_node, state.vars.as_slice(), &mut self.vars) * vars_per_node;
        let num_derivatives = match fields {
            StateFields::All => {
                node_map.gather(element_index, vars_per_node, state.dvars.as_slice(), &mut self.dvars);
                node_map.gather(element_index, vars_per_node, state.ddvars.as_slice(), &mut self.ddvars);
                n
            }
            StateFields::VarsAndNodes => 0,
        };

        ElementState {
            time: state.time,
            xpts: &self.xpts[..SPATIAL_DIM * num_nodes],
            vars: &self.vars[..n],
            dvars: &self.dvars[..num_derivatives],
            ddvars: &self.ddvars[..num_derivatives],
        }
    }
}

/// Buffers for element matrices and their global degrees of freedom.
#[derive(Debug)]
pub(crate) struct MatrixScratch<T> {
    matrix: Vec<T>,
    dofs: Vec<usize>,
    nodes: Vec<usize>,
    weights: Vec<T>,
    local_nodes: Vec<usize>,
    expanded: Vec<T>,
}

impl<T: Real> MatrixScratch<T> {
    fn new(sizes: &ScratchSizes) -> Self {
        let s = sizes.max_element_variables;
        let sw = sizes.max_independent_nodes;
        let expanded_size = if sizes.has_dependent_nodes {
            sizes.vars_per_node * sw
        } else {
            0
        };
        Self {
            matrix: vec![T::zero(); s * s],
            dofs: vec![0; s.max(expanded_size)],
            nodes: vec![0; sw],
            weights: vec![T::zero(); sw],
            local_nodes: vec![0; sw],
            expanded: vec![T::zero(); expanded_size * expanded_size],
        }
    }

    fn empty() -> Self {
        Self {
            matrix: Vec::new(),
            dofs: Vec::new(),
            nodes: Vec::new(),
            weights: Vec::new(),
            local_nodes: Vec::new(),
            expanded: Vec::new(),
        }
    }

    /// Zeroes the `n x n` element matrix.
    pub fn clear(&mut self, n: usize) {
        self.matrix[..n * n].fill(T::zero());
    }

    /// The `n x n` element matrix.
    pub fn local_mut(&mut self, n: usize) -> DMatrixViewMut<'_, T> {
        DMatrixViewMut::from_slice(&mut self.matrix[..n * n], n, n)
    }

    /// Returns the global degrees of freedom of an element together with the matrix to add
    /// at those degrees of freedom.
    ///
    /// The element matrix must have been computed into [`local_mut`](Self::local_mut) beforehand.
    /// Elements with dependent nodes are expanded to their independent nodes, so the returned
    /// matrix may be larger than the element matrix.
    pub fn scatter_view(
        &mut self,
        node_map: &NodeMap<T>,
        element_index: usize,
        vars_per_node: usize,
        n: usize,
        orientation: MatrixOrientation,
    ) -> (&[usize], DMatrixView<'_, T>) {
        let vpn = vars_per_node;
        if orientation == MatrixOrientation::Transpose {
            DMatrixViewMut::from_slice(&mut self.matrix[..n * n], n, n).transpose_mut();
        }

        if !node_map.element_has_dependent_nodes(element_index) {
            for (local_node, &node) in node_map.element_nodes(element_index).iter().enumerate() {
                for d in 0..vpn {
                    self.dofs[vpn * local_node + d] = vpn * node + d;
                }
            }
            return (&self.dofs[..n], DMatrixView::from_slice(&self.matrix[..n * n], n, n));
        }

        let count = node_map.expand_element(element_index, &mut self.nodes, &mut self.weights, &mut self.local_nodes);
        let m = vpn * count;
        for (k, &node) in self.nodes[..count].iter().enumerate() {
            for d in 0..vpn {
                self.dofs[vpn * k + d] = vpn * node + d;
            }
        }

        // Entry (p, q) of the expanded matrix is w_p * w_q * A(local(p), local(q)), block-wise
        for q in 0..count {
            let (w_q, lq) = (self.weights[q], self.local_nodes[q]);
            for b in 0..vpn {
                let col = vpn * q + b;
                let local_col = vpn * lq + b;
                for p in 0..count {
                    let w = self.weights[p] * w_q;
                    let lp = self.local_nodes[p];
                    for a in 0..vpn {
                        let row = vpn * p + a;
                        let local_row = vpn * lp + a;
                        self.expanded[row + m * col] = w * self.matrix[local_row + n * local_col];
                    }
                }
            }
        }

        (&self.dofs[..m], DMatrixView::from_slice(&self.expanded[..m * m], m, m))
    }
}

/// The private buffers of a single worker.
#[derive(Debug)]
pub(crate) struct ScratchArena<T> {
    pub state: StateBuffers<T>,
    pub residual: Vec<T>,
    pub matrix: MatrixScratch<T>,
    pub adjoint: Vec<T>,
}

impl<T: Real> ScratchArena<T> {
    /// Buffers for phases that produce element vectors only.
    pub fn for_vectors(sizes: &ScratchSizes) -> Self {
        let s = sizes.max_element_variables;
        Self {
            state: StateBuffers::new(sizes),
            residual: vec![T::zero(); s],
            matrix: MatrixScratch::empty(),
            adjoint: vec![T::zero(); s],
        }
    }

    /// Buffers for phases that produce element matrices.
    pub fn for_matrices(sizes: &ScratchSizes) -> Self {
        Self {
            state: StateBuffers::new(sizes),
            residual: vec![T::zero(); sizes.max_element_variables],
            matrix: MatrixScratch::new(sizes),
            adjoint: Vec::new(),
        }
    }
}

/// The first `n` entries of `buffer` as a vector.
pub(crate) fn vector_mut<T: Real>(buffer: &mut [T], n: usize) -> DVectorViewMut<'_, T> {
    DVectorViewMut::from_slice(&mut buffer[..n], n)
}
