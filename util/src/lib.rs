//! Mock kernels and small meshes shared by the tests and benchmarks of `parasm`.
use nalgebra::DVector;
use num::Float;
use parasm::assembly::{Assembler, AssemblerBuilder};
use parasm::element::Element;
use parasm::SPATIAL_DIM;
use std::sync::Arc;

mod elements;
mod functions;

pub use elements::*;
pub use functions::*;

/// Connectivity of a chain of two-node elements, where element `i` connects nodes `i` and
/// `i + 1`.
pub fn chain_connectivity(num_elements: usize) -> Vec<[usize; 2]> {
    (0..num_elements).map(|i| [i, i + 1]).collect()
}

/// Coordinates of `num_nodes` nodes on the x-axis, with node `i` at `x = i`.
pub fn chain_nodes(num_nodes: usize) -> DVector<f64> {
    let mut xpts = DVector::zeros(SPATIAL_DIM * num_nodes);
    for i in 0..num_nodes {
        xpts[SPATIAL_DIM * i] = i as f64;
    }
    xpts
}

/// An assembler over a chain of springs with the given number of threads.
///
/// Spring `i` has stiffness `1 + i` and mass `0.5`, and depends on design variable
/// `i % num_design_vars` if there are any design variables.
pub fn spring_chain_assembler(
    num_elements: usize,
    vars_per_node: usize,
    num_design_vars: usize,
    num_threads: usize,
) -> Assembler<f64> {
    let num_nodes = if num_elements == 0 { 0 } else { num_elements + 1 };
    let mut builder = AssemblerBuilder::new(vars_per_node, num_nodes)
        .with_num_design_vars(num_design_vars)
        .with_num_threads(num_threads);
    for (i, nodes) in chain_connectivity(num_elements).iter().enumerate() {
        let design_var = (num_design_vars > 0).then(|| i % num_design_vars);
        let spring = SpringElement::new(vars_per_node, 1.0 + i as f64, 0.5).with_design_var(design_var);
        builder.add_element(nodes, Arc::new(spring) as Arc<dyn Element<f64>>);
    }
    let mut assembler = builder
        .build()
        .expect("Spring chain is a valid configuration");
    assembler
        .set_nodes(&chain_nodes(num_nodes))
        .expect("Node vector has the correct size");
    assembler
}

/// A deterministic, non-trivial vector of length `n`.
pub fn sample_vector(n: usize, seed: f64) -> DVector<f64> {
    DVector::from_fn(n, |i, _| (seed + 0.37 * i as f64).sin() + 0.1 * i as f64)
}

/// The largest entry-wise difference between `a` and `b`, relative to the largest magnitude
/// in `b`.
pub fn max_relative_difference<T: Float>(a: &[T], b: &[T]) -> T {
    assert_eq!(a.len(), b.len(), "Slices must have the same length");
    let scale = b.iter().fold(T::zero(), |m, x| m.max(x.abs()));
    let max_diff = a
        .iter()
        .zip(b)
        .fold(T::zero(), |m, (x, y)| m.max((*x - *y).abs()));
    if scale > T::zero() {
        max_diff / scale
    } else {
        max_diff
    }
}
