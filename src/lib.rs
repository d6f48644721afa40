//! parasm
//! ======
//!
//! Threaded scheduling, buffering and reduction for finite element assembly.
//!
//! An [`Assembler`](assembly::Assembler) owns a set of opaque element kernels together with
//! the connectivity that maps element-local degrees of freedom to global ones. Each assembly
//! phase (residual, Jacobian, typed matrices, adjoint-residual products, function evaluation
//! and function design sensitivities) runs on a pool of worker threads that claim elements one
//! at a time from a shared counter, compute into private scratch buffers and fold the result
//! into the caller's accumulator behind a single lock.

use nalgebra::RealField;

pub mod assembly;
pub mod auxiliary;
pub mod connectivity;
pub mod element;
pub mod error;
pub mod function;
pub mod schedule;

pub(crate) mod workspace;

pub extern crate fenris_nested_vec as nested_vec;
pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

/// Number of coordinates stored per node.
pub const SPATIAL_DIM: usize = 3;

/// Scalar type used throughout the assembly engine.
pub trait Real: RealField + Copy + Send + Sync {}

impl<T: RealField + Copy + Send + Sync> Real for T {}
