//! Library crate describing the trained classifier that gets converted.
//!
//! It reads and writes the on-disk artifact and infers the shapes flowing
//! through each layer so the weights can be checked before conversion.

pub mod artifact;
pub mod error;
pub mod model;
pub mod reference;

pub use artifact::TrainedModel;
pub use error::{Error, Result};
