//! What the dump means: struct layouts, symbols and kernel versions. None of this comes
//! from the dump itself, it is supplied separately for the exact kernel build.
pub mod metadata;
pub mod symbols;
pub mod types;
pub mod version;
pub mod versioned;
pub mod view;

pub use metadata::*;
pub use symbols::*;
pub use types::*;
pub use version::*;
pub use versioned::*;
pub use view::*;
