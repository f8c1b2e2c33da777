#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod assoc_array;

/// The caller-supplied capability bundle.
///
/// This module provides the `Description` trait through which the table
/// interrogates and mutates its elements generically.
pub mod description;

/// Growth-time policy hooks.
///
/// This module provides the `FillUpHandler` trait together with the
/// default extending policy and a capacity-pinning veto policy.
pub mod fill_up;

pub use assoc_array::AssocArray;
pub use assoc_array::Iter;
#[cfg(feature = "stats")]
pub use assoc_array::Stats;
pub use description::Description;
pub use fill_up::ExtendAtFillUp;
pub use fill_up::FillUp;
pub use fill_up::FillUpHandler;
pub use fill_up::VetoAtFillUp;
