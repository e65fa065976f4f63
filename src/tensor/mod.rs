//! Tensor index and views
//!
//! [`TensorIndex`] turns a parsed header into validated absolute byte ranges;
//! [`TensorView`] is what callers get back for a single tensor.

pub mod index;
pub mod view;

pub use index::*;
pub use view::*;
