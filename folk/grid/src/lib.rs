#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Parameter assignments and the grids that enumerate them.

/// Open, ordered parameter records.
pub mod assignment;
/// Grid traits and the cross-product grid.
pub mod grid;

pub use assignment::{render_value, Assignment};
pub use grid::{ConstrainedGrid, GridIter, ParamGrid, ParameterGrid};
