//! Safe SQL rendering: identifiers quoted, values as parameters.

mod builder;
pub mod params;
pub use builder::*;
pub use params::*;
