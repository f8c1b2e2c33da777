//! Growth-time policy for the associative array.
//!
//! When an insert pushes the load factor past one half, the table asks its
//! fill-up handler whether to extend. The default handler always extends;
//! a vetoing handler pins the capacity and accepts the longer probe chains
//! of an over-full table. Vetoing is the escape hatch for callers where an
//! external authority owns the sizing, such as a fixed-capacity arena.

use crate::assoc_array::AssocArray;
use crate::description::Description;

/// The outcome of a fill-up consultation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillUp {
    /// Proceed with the rehash into a larger slot array.
    Extend,
    /// Keep the current capacity; the caller accepts an over-full table.
    Veto,
}

/// Policy hook consulted when an insert crosses the load-factor threshold.
pub trait FillUpHandler<D: Description>: Sized {
    /// Decides whether the table may extend. Called after the triggering
    /// element has already been inserted.
    fn handle(table: &AssocArray<D, Self>) -> FillUp;
}

/// The default policy: always extend.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtendAtFillUp;

impl<D: Description> FillUpHandler<D> for ExtendAtFillUp {
    fn handle(_table: &AssocArray<D, Self>) -> FillUp {
        FillUp::Extend
    }
}

/// A policy that never extends. The table keeps its construction-time
/// capacity and the load factor may exceed one half; inserts keep working
/// until every slot is used.
#[derive(Debug, Default, Clone, Copy)]
pub struct VetoAtFillUp;

impl<D: Description> FillUpHandler<D> for VetoAtFillUp {
    fn handle(_table: &AssocArray<D, Self>) -> FillUp {
        FillUp::Veto
    }
}
