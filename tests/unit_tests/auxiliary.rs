use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector};
use parasm::assembly::AssemblerBuilder;
use parasm::auxiliary::AuxiliaryElements;
use parasm::element::{Element, JacobianCoefficients, MatrixOrientation};
use parasm::error::AssemblyError;
use std::sync::Arc;
use util::{chain_connectivity, chain_nodes, CountingElement, NodalLoad, RecordingElement};

fn counting(value: f64) -> Arc<dyn Element<f64>> {
    Arc::new(CountingElement::new(2, 1, value))
}

fn same_element(element: &dyn Element<f64>, other: &Arc<dyn Element<f64>>) -> bool {
    let element = element as *const dyn Element<f64>;
    element.cast::<()>() == Arc::as_ptr(other).cast::<()>()
}

fn element_indices(auxiliary: &AuxiliaryElements<f64>) -> Vec<usize> {
    auxiliary
        .entries()
        .iter()
        .map(|entry| entry.element_index())
        .collect()
}

#[test]
fn auxiliary_elements_are_sorted_on_insertion() {
    let mut auxiliary = AuxiliaryElements::<f64>::new();
    auxiliary.add(3, counting(1.0));
    auxiliary.add(1, counting(2.0));
    auxiliary.add(3, counting(3.0));
    auxiliary.add(0, counting(4.0));
    auxiliary.add(1, counting(5.0));

    assert_eq!(auxiliary.len(), 5);
    assert_eq!(element_indices(&auxiliary), vec![0, 1, 1, 3, 3]);
}

#[test]
fn auxiliary_elements_for_the_same_element_keep_insertion_order() {
    let a = counting(1.0);
    let b = counting(2.0);
    let c = counting(3.0);

    let from_add = AuxiliaryElements::<f64>::new()
        .with_element(4, Arc::clone(&a))
        .with_element(2, Arc::clone(&c))
        .with_element(4, Arc::clone(&b));
    let collected: AuxiliaryElements<f64> = vec![(4, Arc::clone(&a)), (2, Arc::clone(&c)), (4, Arc::clone(&b))]
        .into_iter()
        .collect();

    for auxiliary in [from_add, collected] {
        assert_eq!(element_indices(&auxiliary), vec![2, 4, 4]);
        let entries = auxiliary.entries();
        assert!(same_element(entries[1].element(), &a));
        assert!(same_element(entries[2].element(), &b));
    }
}

#[test]
fn auxiliary_cursor_returns_runs_for_increasing_elements() {
    let auxiliary = AuxiliaryElements::<f64>::new()
        .with_element(1, counting(1.0))
        .with_element(1, counting(2.0))
        .with_element(3, counting(3.0));

    let mut cursor = auxiliary.cursor();
    let runs: Vec<usize> = (0..5).map(|e| cursor.advance_to(e).len()).collect();
    assert_eq!(runs, vec![0, 2, 0, 1, 0]);
    assert_eq!(cursor.position(), 3);
}

#[test]
fn auxiliary_cursor_skips_elements_that_are_not_visited() {
    let auxiliary = AuxiliaryElements::<f64>::new()
        .with_element(0, counting(1.0))
        .with_element(2, counting(2.0))
        .with_element(5, counting(3.0));

    let mut cursor = auxiliary.cursor();
    let run = cursor.advance_to(2);
    assert_eq!(run.len(), 1);
    assert_eq!(run[0].element_index(), 2);
    assert!(cursor.advance_to(4).is_empty());
    assert_eq!(cursor.advance_to(5).len(), 1);
    assert!(cursor.advance_to(6).is_empty());
}

#[test]
fn auxiliary_elements_are_applied_once_to_their_element() {
    let a = Arc::new(RecordingElement::new(2, 1));
    let b = Arc::new(RecordingElement::new(2, 1));
    let c = Arc::new(RecordingElement::new(2, 1));
    let auxiliary = AuxiliaryElements::<f64>::new()
        .with_element(1, a.clone())
        .with_element(1, b.clone())
        .with_element(3, c.clone());

    let primary: Vec<_> = (0..5).map(|_| Arc::new(CountingElement::new(2, 1, 0.0))).collect();
    let mut builder = AssemblerBuilder::new(1, 6)
        .with_auxiliary_elements(auxiliary)
        .with_num_threads(3);
    for (element, nodes) in primary.iter().zip(chain_connectivity(5)) {
        builder.add_element(&nodes, element.clone());
    }
    let mut assembler = builder.build().unwrap();
    assembler.set_nodes(&chain_nodes(6)).unwrap();

    let mut residual = assembler.create_vector();
    assembler.assemble_residual(&mut residual).unwrap();

    assert_eq!(a.visits(), vec![1]);
    assert_eq!(b.visits(), vec![1]);
    assert_eq!(c.visits(), vec![3]);
    assert!(primary.iter().all(|element| element.calls() == 1));

    let mut matrix = assembler.create_dense_matrix();
    assembler
        .assemble_jacobian(
            &JacobianCoefficients::stiffness(),
            MatrixOrientation::Normal,
            None,
            &mut matrix,
        )
        .unwrap();
    // The Jacobian phase applies the residual and the Jacobian of each auxiliary element
    assert_eq!(a.visits(), vec![1, 1, 1]);
    assert_eq!(c.visits(), vec![3, 3, 3]);
}

#[test]
fn auxiliary_loads_are_added_before_scatter() {
    let auxiliary = AuxiliaryElements::<f64>::new()
        .with_element(0, Arc::new(NodalLoad::new(vec![1.0, 2.0])))
        .with_element(1, Arc::new(NodalLoad::new(vec![10.0, 20.0])))
        .with_element(1, Arc::new(NodalLoad::new(vec![100.0, 200.0])));
    let assembler = AssemblerBuilder::new(1, 3)
        .with_elements(chain_connectivity(2).iter().map(|n| n.as_slice()), counting(0.0))
        .with_auxiliary_elements(auxiliary)
        .with_num_threads(2)
        .build()
        .unwrap();

    let mut residual = assembler.create_vector();
    assembler.assemble_residual(&mut residual).unwrap();
    assert_matrix_eq!(residual, DVector::from_column_slice(&[-1.0, -112.0, -220.0]));

    // Loads do not contribute to the Jacobian
    let mut residual = assembler.create_vector();
    let mut matrix = DMatrix::zeros(3, 3);
    assembler
        .assemble_jacobian(
            &JacobianCoefficients::stiffness(),
            MatrixOrientation::Normal,
            Some(&mut residual),
            &mut matrix,
        )
        .unwrap();
    assert_matrix_eq!(residual, DVector::from_column_slice(&[-1.0, -112.0, -220.0]));
    assert_matrix_eq!(matrix, DMatrix::<f64>::zeros(3, 3));
}

#[test]
fn invalid_auxiliary_elements_are_rejected() {
    let builder = || {
        AssemblerBuilder::new(1, 3).with_elements(chain_connectivity(2).iter().map(|n| n.as_slice()), counting(0.0))
    };

    let out_of_range = AuxiliaryElements::<f64>::new().with_element(2, counting(1.0));
    let result = builder().with_auxiliary_elements(out_of_range).build();
    assert!(matches!(
        result,
        Err(AssemblyError::AuxiliaryOutOfRange {
            element: 2,
            num_elements: 2
        })
    ));

    let wrong_size = AuxiliaryElements::<f64>::new().with_element(1, Arc::new(NodalLoad::new(vec![1.0, 2.0, 3.0])));
    let result = builder().with_auxiliary_elements(wrong_size).build();
    assert!(matches!(
        result,
        Err(AssemblyError::AuxiliarySize {
            element: 1,
            declared: 3,
            expected: 2
        })
    ));

    let mut assembler = builder().build().unwrap();
    let out_of_range = AuxiliaryElements::<f64>::new().with_element(7, counting(1.0));
    assert!(assembler.set_auxiliary_elements(out_of_range).is_err());
    assert!(assembler.auxiliary_elements().is_empty());
}

#[test]
fn auxiliary_elements_and_cursor_are_debug_printable() {
    let auxiliary = AuxiliaryElements::<f64>::new()
        .with_element(2, counting(1.0))
        .with_element(0, counting(2.0));
    let printed = format!("{auxiliary:?}");
    assert!(printed.contains("element_index: 0"));
    assert!(printed.contains("element_index: 2"));

    let mut cursor = auxiliary.cursor();
    cursor.advance_to(1);
    assert_eq!(format!("{cursor:?}"), "AuxiliaryCursor { position: 1, len: 2 }");
}
