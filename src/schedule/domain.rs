//! Translation of flat work indices into functions and elements.
/// The set of elements visited on behalf of a single quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementDomain<'a> {
    /// Every element of the assembler, in index order.
    Entire,
    /// An explicit list of element indices. The list need not be contiguous or sorted.
    Subset(&'a [usize]),
}

impl<'a> ElementDomain<'a> {
    pub fn size(&self, num_elements: usize) -> usize {
        match self {
            ElementDomain::Entire => num_elements,
            ElementDomain::Subset(elements) => elements.len(),
        }
    }
}

/// A unit of work: the element `element_index` visited on behalf of quantity `quantity`,
/// where `local_index` is the position of the element within the quantity's domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkUnit {
    pub quantity: usize,
    pub local_index: usize,
    pub element_index: usize,
}

/// Maps a flat index space onto the concatenation of several element domains.
///
/// Quantity `k` owns the flat indices `offsets[k] .. offsets[k + 1]`. Quantities with an empty
/// domain own no indices.
#[derive(Debug, Clone)]
pub struct DomainMap<'a> {
    domains: Vec<ElementDomain<'a>>,
    offsets: Vec<usize>,
    num_elements: usize,
}

impl<'a> DomainMap<'a> {
    pub fn new(domains: impl IntoIterator<Item = ElementDomain<'a>>, num_elements: usize) -> Self {
        let domains: Vec<_> = domains.into_iter().collect();
        let mut offsets = Vec::with_capacity(domains.len() + 1);
        offsets.push(0);
        let mut total = 0;
        for domain in &domains {
            total += domain.size(num_elements);
            offsets.push(total);
        }

        Self {
            domains,
            offsets,
            num_elements,
        }
    }

    /// A map with a single quantity covering every element, so that flat index and element
    /// index coincide.
    pub fn entire(num_elements: usize) -> Self {
        Self::new([ElementDomain::Entire], num_elements)
    }

    pub fn num_quantities(&self) -> usize {
        self.domains.len()
    }

    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    pub fn domains(&self) -> &[ElementDomain<'a>] {
        &self.domains
    }

    /// Cumulative domain sizes, with `num_quantities() + 1` entries.
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// The size of the flat index space.
    pub fn total(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    /// Returns the first `(quantity, element)` pair of a subset domain that refers to an
    /// element outside the element range.
    pub fn find_out_of_range(&self) -> Option<(usize, usize)> {
        self.domains
            .iter()
            .enumerate()
            .find_map(|(quantity, domain)| match domain {
                ElementDomain::Entire => None,
                ElementDomain::Subset(elements) => elements
                    .iter()
                    .copied()
                    .find(|&element| element >= self.num_elements)
                    .map(|element| (quantity, element)),
            })
    }

    pub fn cursor(&self) -> DomainCursor<'_, 'a> {
        DomainCursor { map: self, quantity: 0 }
    }

    /// Resolves a flat index without caching. Prefer [`DomainCursor::resolve`] in loops.
    pub fn resolve(&self, flat_index: usize) -> Option<WorkUnit> {
        self.cursor().resolve(flat_index)
    }
}

/// Resolves flat indices against a [`DomainMap`], remembering the quantity of the previous
/// lookup.
///
/// Since the indices claimed by a worker increase, the cached quantity usually still contains
/// the next index, or the next index lies in one of the following quantities. An index that
/// lies before the cached quantity restarts the scan from the first quantity.
#[derive(Debug, Clone)]
pub struct DomainCursor<'m, 'a> {
    map: &'m DomainMap<'a>,
    quantity: usize,
}

impl<'m, 'a> DomainCursor<'m, 'a> {
    pub fn resolve(&mut self, flat_index: usize) -> Option<WorkUnit> {
        let offsets = &self.map.offsets;
        if flat_index >= self.map.total() {
            return None;
        }

        if flat_index < offsets[self.quantity] {
            self.quantity = 0;
        }
        // Terminates because flat_index < offsets[num_quantities]
        while flat_index >= offsets[self.quantity + 1] {
            self.quantity += 1;
        }

        let local_index = flat_index - offsets[self.quantity];
        let element_index = match self.map.domains[self.quantity] {
            ElementDomain::Entire => local_index,
            ElementDomain::Subset(elements) => elements[local_index],
        };

        Some(WorkUnit {
            quantity: self.quantity,
            local_index,
            element_index,
        })
    }

    /// The quantity of the most recent lookup.
    pub fn cached_quantity(&self) -> usize {
        self.quantity
    }
}
