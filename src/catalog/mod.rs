//! Media catalog collaborators
//!
//! The engine reports every file it confirms to a [`Catalog`]. During simulated
//! runs it also asks the catalog whether an item is already known, so that new
//! metadata only fills in what is missing.
//!
//! - [`InMemoryCatalog`]: records held in memory, matched by [`MatchPolicy`]

mod memory;
mod traits;

pub use memory::{InMemoryCatalog, MatchPolicy};
pub use traits::Catalog;
