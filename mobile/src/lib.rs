//! Conversion of the trained digit classifier into a Core ML package for
//! on-device inference.

pub mod convert;
pub mod driver;
pub mod error;
pub mod package;
pub mod protos;

pub use convert::{convert, ConvertOptions};
pub use driver::{check_and_convert, DriverConfig, Outcome};
pub use error::{Error, Result};
pub use package::MlModel;
