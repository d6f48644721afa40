//! Auxiliary elements: extra kernels attached to existing elements, such as applied loads.
//!
//! An auxiliary element shares the nodes, the local state and the local output buffers of the
//! element it is attached to. Its contribution is added to the element's local result before
//! the result is scattered into the global accumulators.
use crate::element::Element;
use crate::Real;
use std::fmt;
use std::sync::Arc;

/// An element kernel attached to the element with index `element_index`.
#[derive(Clone)]
pub struct AuxiliaryElement<T> {
    element_index: usize,
    element: Arc<dyn Element<T>>,
}

impl<T: Real> AuxiliaryElement<T> {
    pub fn new(element_index: usize, element: Arc<dyn Element<T>>) -> Self {
        Self { element_index, element }
    }

    pub fn element_index(&self) -> usize {
        self.element_index
    }

    pub fn element(&self) -> &dyn Element<T> {
        self.element.as_ref()
    }
}

impl<T: Real> fmt::Debug for AuxiliaryElement<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuxiliaryElement")
            .field("element_index", &self.element_index)
            .field("num_variables", &self.element.num_variables())
            .finish()
    }
}

/// A collection of auxiliary elements, always sorted by element index.
///
/// Elements attached to the same element index keep the order in which they were added.
#[derive(Clone)]
pub struct AuxiliaryElements<T> {
    entries: Vec<AuxiliaryElement<T>>,
}

impl<T: Real> fmt::Debug for AuxiliaryElements<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.entries).finish()
    }
}

impl<T> Default for AuxiliaryElements<T> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<T: Real> AuxiliaryElements<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, element_index: usize, element: Arc<dyn Element<T>>) {
        let position = self
            .entries
            .partition_point(|entry| entry.element_index <= element_index);
        self.entries
            .insert(position, AuxiliaryElement::new(element_index, element));
    }

    pub fn with_element(mut self, element_index: usize, element: Arc<dyn Element<T>>) -> Self {
        self.add(element_index, element);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[AuxiliaryElement<T>] {
        &self.entries
    }

    pub fn cursor(&self) -> AuxiliaryCursor<'_, T> {
        AuxiliaryCursor {
            entries: &self.entries,
            position: 0,
        }
    }
}

impl<T: Real> FromIterator<(usize, Arc<dyn Element<T>>)> for AuxiliaryElements<T> {
    fn from_iter<I: IntoIterator<Item = (usize, Arc<dyn Element<T>>)>>(iter: I) -> Self {
        let mut entries: Vec<_> = iter
            .into_iter()
            .map(|(element_index, element)| AuxiliaryElement::new(element_index, element))
            .collect();
        // Stable, so entries for the same element keep their relative order
        entries.sort_by_key(|entry| entry.element_index);
        Self { entries }
    }
}

/// Walks the auxiliary elements alongside an increasing sequence of element indices.
///
/// The cursor only moves forward: once it has passed an element index, auxiliary elements
/// for that index or smaller ones are never returned again.
#[derive(Clone)]
pub struct AuxiliaryCursor<'a, T> {
    entries: &'a [AuxiliaryElement<T>],
    position: usize,
}

impl<'a, T: Real> fmt::Debug for AuxiliaryCursor<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuxiliaryCursor")
            .field("position", &self.position)
            .field("len", &self.entries.len())
            .finish()
    }
}

impl<'a, T: Real> AuxiliaryCursor<'a, T> {
    /// Returns the auxiliary elements attached to `element_index` and moves past them.
    pub fn advance_to(&mut self, element_index: usize) -> &'a [AuxiliaryElement<T>] {
        let entries = self.entries;
        while self.position < entries.len() && entries[self.position].element_index < element_index {
            self.position += 1;
        }
        let begin = self.position;
        while self.position < entries.len() && entries[self.position].element_index == element_index {
            self.position += 1;
        }
        &entries[begin..self.position]
    }

    pub fn position(&self) -> usize {
        self.position
    }
}
