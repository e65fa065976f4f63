//! Reading safetensors files
//!
//! [`SafeOpen`] ties a file, its mapping, the optional page lock and the
//! tensor index together and tears them down in that reverse order.

pub mod safe_open;

pub use safe_open::*;
