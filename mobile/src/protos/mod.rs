include!(concat!(env!("OUT_DIR"), "/coreml-protos/mod.rs"));

pub use coreml::*;
