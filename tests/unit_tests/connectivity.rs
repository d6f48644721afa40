use matrixcompare::assert_scalar_eq;
use parasm::connectivity::{DependentNodes, NodeMap};
use parasm::error::AssemblyError;
use parasm::nalgebra_sparse::pattern::SparsityPattern;
use parasm::nested_vec::NestedVec;
use proptest::prelude::*;

/// Three independent nodes and one dependent node `3 = 0.25 * n0 + 0.75 * n2`, with elements
/// `[0, 1]`, `[1, 3]` and `[3, 2, 0]`.
fn mixed_node_map() -> NodeMap<f64> {
    let dependent = DependentNodes::new().with_node(&[0, 2], &[0.25, 0.75]);
    let elements = NestedVec::from(vec![vec![0, 1], vec![1, 3], vec![3, 2, 0]]);
    NodeMap::try_new(3, elements, dependent).unwrap()
}

#[test]
fn node_map_reports_maxima() {
    let map = mixed_node_map();
    assert_eq!(map.num_nodes(), 3);
    assert_eq!(map.num_dependent_nodes(), 1);
    assert_eq!(map.num_elements(), 3);
    assert_eq!(map.max_element_nodes(), 3);
    assert_eq!(map.max_element_independent_nodes(), 4);
    assert!(!map.element_has_dependent_nodes(0));
    assert!(map.element_has_dependent_nodes(1));
    assert!(map.element_has_dependent_nodes(2));
}

#[test]
fn gather_combines_dependent_nodes() {
    let map = mixed_node_map();
    let global = [1.0, 10.0, 2.0, 20.0, 3.0, 30.0];
    let mut local = [0.0; 6];

    assert_eq!(map.gather(0, 2, &global, &mut local), 2);
    assert_eq!(&local[..4], &[1.0, 10.0, 2.0, 20.0]);

    assert_eq!(map.gather(1, 2, &global, &mut local), 2);
    assert_eq!(&local[..2], &[2.0, 20.0]);
    assert_scalar_eq!(local[2], 0.25 * 1.0 + 0.75 * 3.0, comp = float);
    assert_scalar_eq!(local[3], 0.25 * 10.0 + 0.75 * 30.0, comp = float);
}

#[test]
fn scatter_distributes_dependent_nodes() {
    let map = mixed_node_map();
    let mut global = [0.0; 3];
    map.scatter_add(2, 1, &[4.0, 1.0, 2.0], &mut global);
    assert_eq!(global, [0.25 * 4.0 + 2.0, 0.0, 0.75 * 4.0 + 1.0]);

    // Contributions accumulate
    map.scatter_add(0, 1, &[1.0, 1.0], &mut global);
    assert_eq!(global, [0.25 * 4.0 + 3.0, 1.0, 0.75 * 4.0 + 1.0]);
}

#[test]
fn expand_element_lists_independent_contributions() {
    let map = mixed_node_map();
    let mut nodes = [0; 4];
    let mut weights = [0.0; 4];
    let mut local_nodes = [0; 4];

    let count = map.expand_element(2, &mut nodes, &mut weights, &mut local_nodes);
    assert_eq!(count, 4);
    assert_eq!(nodes, [0, 2, 2, 0]);
    assert_eq!(weights, [0.25, 0.75, 1.0, 1.0]);
    assert_eq!(local_nodes, [0, 0, 1, 2]);

    let count = map.expand_element(0, &mut nodes, &mut weights, &mut local_nodes);
    assert_eq!(count, 2);
    assert_eq!(&nodes[..2], &[0, 1]);
    assert_eq!(&weights[..2], &[1.0, 1.0]);
}

#[test]
fn node_map_rejects_invalid_connectivity() {
    let result = NodeMap::try_new(3, NestedVec::from(vec![vec![0, 1], vec![2, 3]]), DependentNodes::<f64>::new());
    assert!(matches!(
        result,
        Err(AssemblyError::NodeOutOfRange {
            element: 1,
            node: 3,
            num_nodes: 3
        })
    ));

    let dependent = DependentNodes::new().with_node(&[], &[]);
    let result = NodeMap::<f64>::try_new(3, NestedVec::new(), dependent);
    assert!(matches!(result, Err(AssemblyError::InvalidDependentNode { dependent: 0, .. })));

    // Dependent nodes may only combine independent nodes
    let dependent = DependentNodes::new()
        .with_node(&[0, 1], &[0.5, 0.5])
        .with_node(&[3], &[1.0]);
    let result = NodeMap::<f64>::try_new(3, NestedVec::new(), dependent);
    assert!(matches!(result, Err(AssemblyError::InvalidDependentNode { dependent: 1, .. })));
}

#[test]
#[should_panic]
fn dependent_node_needs_one_weight_per_node() {
    DependentNodes::<f64>::new().push(&[0, 1], &[1.0]);
}

#[test]
fn sparsity_pattern_of_chain() {
    let elements = NestedVec::from(vec![vec![0, 1], vec![1, 2]]);
    let map = NodeMap::<f64>::try_new(3, elements, DependentNodes::new()).unwrap();

    let pattern = map.sparsity_pattern(1).unwrap();
    let expected =
        SparsityPattern::try_from_offsets_and_indices(3, 3, vec![0, 2, 5, 7], vec![0, 1, 0, 1, 2, 1, 2]).unwrap();
    assert_eq!(pattern, expected);

    let pattern = map.sparsity_pattern(2).unwrap();
    assert_eq!(pattern.major_dim(), 6);
    assert_eq!(pattern.lane(0), &[0, 1, 2, 3]);
    assert_eq!(pattern.lane(2), &[0, 1, 2, 3, 4, 5]);
    assert_eq!(pattern.lane(5), &[2, 3, 4, 5]);
}

#[test]
fn sparsity_pattern_expands_dependent_nodes() {
    // Node 3 depends on nodes 1 and 2, so element [0, 3] couples 0, 1 and 2
    let dependent = DependentNodes::new().with_node(&[1, 2], &[0.5, 0.5]);
    let elements = NestedVec::from(vec![vec![0, 3]]);
    let map = NodeMap::<f64>::try_new(3, elements, dependent).unwrap();

    let pattern = map.sparsity_pattern(1).unwrap();
    assert_eq!(pattern.major_dim(), 3);
    for row in 0..3 {
        assert_eq!(pattern.lane(row), &[0, 1, 2]);
    }
}

#[test]
fn empty_connectivity_has_empty_pattern() {
    let map = NodeMap::<f64>::try_new(2, NestedVec::new(), DependentNodes::new()).unwrap();
    let pattern = map.sparsity_pattern(3).unwrap();
    assert_eq!(pattern.major_dim(), 6);
    assert_eq!(pattern.nnz(), 0);
}

proptest! {
    #[test]
    fn gather_and_scatter_are_adjoint(
        global in proptest::collection::vec(-10.0..10.0f64, 8),
        local in proptest::collection::vec(-10.0..10.0f64, 6),
        w in 0.0..1.0f64,
        element in 0usize..3,
    ) {
        // <gather(g), l> == <g, scatter(l)> for dim = 2
        let dependent = DependentNodes::new().with_node(&[0, 2], &[w, 1.0 - w]);
        let elements = NestedVec::from(vec![vec![0, 1], vec![1, 4], vec![4, 2, 3]]);
        let map = NodeMap::try_new(4, elements, dependent).unwrap();
        let n = 2 * map.element_nodes(element).len();

        let mut gathered = vec![0.0; 6];
        map.gather(element, 2, &global, &mut gathered);
        let lhs: f64 = gathered[..n].iter().zip(&local).map(|(a, b)| a * b).sum();

        let mut scattered = vec![0.0; 8];
        map.scatter_add(element, 2, &local[..n], &mut scattered);
        let rhs: f64 = global.iter().zip(&scattered).map(|(a, b)| a * b).sum();

        prop_assert!((lhs - rhs).abs() <= 1e-10 * (1.0 + lhs.abs()));
    }
}
