//! Global accumulators and the lock that serializes writes to them.
use crate::Real;
use eyre::eyre;
use nalgebra::{DMatrix, DMatrixView};
use nalgebra_sparse::CsrMatrix;
use parking_lot::Mutex;

/// A global matrix that element matrices can be added to.
pub trait MatrixAccumulator<T: Real>: Send {
    fn nrows(&self) -> usize;

    fn ncols(&self) -> usize;

    /// Adds `element_matrix[(i, j)]` to the global entry `(dofs[i], dofs[j])` for all `i, j`.
    ///
    /// Indices in `dofs` may repeat, in which case all contributions are added.
    fn add_element_matrix(&mut self, dofs: &[usize], element_matrix: DMatrixView<T>) -> eyre::Result<()>;
}

impl<T: Real> MatrixAccumulator<T> for DMatrix<T> {
    fn nrows(&self) -> usize {
        self.nrows()
    }

    fn ncols(&self) -> usize {
        self.ncols()
    }

    fn add_element_matrix(&mut self, dofs: &[usize], element_matrix: DMatrixView<T>) -> eyre::Result<()> {
        for (local_col, &global_col) in dofs.iter().enumerate() {
            for (local_row, &global_row) in dofs.iter().enumerate() {
                self[(global_row, global_col)] += element_matrix[(local_row, local_col)];
            }
        }
        Ok(())
    }
}

/// Adds into the existing sparsity pattern. An element entry that is not part of the
/// pattern is an error; entries added before the error remain in the matrix.
impl<T: Real> MatrixAccumulator<T> for CsrMatrix<T> {
    fn nrows(&self) -> usize {
        self.nrows()
    }

    fn ncols(&self) -> usize {
        self.ncols()
    }

    fn add_element_matrix(&mut self, dofs: &[usize], element_matrix: DMatrixView<T>) -> eyre::Result<()> {
        for (local_row, &global_row) in dofs.iter().enumerate() {
            let mut row = self
                .get_row_mut(global_row)
                .ok_or_else(|| eyre!("row {global_row} is out of bounds"))?;
            let (columns, values) = row.cols_and_values_mut();
            for (local_col, &global_col) in dofs.iter().enumerate() {
                // Column indices of a CSR row are sorted
                let idx = columns
                    .binary_search(&global_col)
                    .map_err(|_| eyre!("entry ({global_row}, {global_col}) is not in the sparsity pattern"))?;
                values[idx] += element_matrix[(local_row, local_col)];
            }
        }
        Ok(())
    }
}

/// Serializes access to a shared accumulator.
///
/// Workers compute their contributions without holding the lock and only take it to add the
/// finished local result.
#[derive(Debug)]
pub struct AccumulatorGate<A> {
    target: Mutex<A>,
}

impl<A: Send> AccumulatorGate<A> {
    pub fn new(target: A) -> Self {
        Self {
            target: Mutex::new(target),
        }
    }

    /// Runs `add` with exclusive access to the accumulator.
    pub fn scatter_add<R>(&self, add: impl FnOnce(&mut A) -> R) -> R {
        let mut target = self.target.lock();
        add(&mut *target)
    }

    pub fn into_inner(self) -> A {
        self.target.into_inner()
    }
}
