//! Capacity-bounded packing
//!
//! Online first-fit: items are placed in input order into the first open bin
//! with enough remaining capacity. Items larger than the capacity can never
//! be placed and are returned as the remainder. No re-sorting happens, so bin
//! contents keep their insertion order and packing is deterministic.

/// Anything with a packing weight.
pub trait Packable {
    /// Weight in bytes.
    fn size(&self) -> u64;
}

/// A capacity-bounded group of items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bin<T> {
    items: Vec<T>,
    remaining: u64,
}

impl<T: Packable> Bin<T> {
    fn seeded(item: T, capacity: u64) -> Self {
        let remaining = capacity - item.size();
        Self {
            items: vec![item],
            remaining,
        }
    }

    fn try_push(&mut self, item: T) -> Result<(), T> {
        if item.size() <= self.remaining {
            self.remaining -= item.size();
            self.items.push(item);
            Ok(())
        } else {
            Err(item)
        }
    }
}

impl<T> Bin<T> {
    /// Items in insertion order.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Capacity left in this bin.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Consume the bin, keeping its items.
    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

/// Result of [`first_fit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packing<T> {
    pub bins: Vec<Bin<T>>,
    pub remainder: Vec<T>,
}

/// Pack `items` into bins of `capacity` using online first-fit.
///
/// # Arguments
/// * `items` - Items in the order they should be considered
/// * `capacity` - Capacity of every bin
///
/// # Returns
/// * `Packing<T>` - Bins in creation order plus the items whose size exceeds
///   `capacity`
pub fn first_fit<T, I>(items: I, capacity: u64) -> Packing<T>
where
    T: Packable,
    I: IntoIterator<Item = T>,
{
    let mut bins: Vec<Bin<T>> = Vec::new();
    let mut remainder = Vec::new();

    'items: for item in items {
        let mut item = item;
        for bin in bins.iter_mut() {
            match bin.try_push(item) {
                Ok(()) => continue 'items,
                Err(rejected) => item = rejected,
            }
        }

        if item.size() <= capacity {
            bins.push(Bin::seeded(item, capacity));
        } else {
            remainder.push(item);
        }
    }

    Packing { bins, remainder }
}
