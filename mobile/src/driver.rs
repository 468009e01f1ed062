//! The fixed conversion run: find the trained digit model, convert it to
//! Core ML, stamp the package metadata and save it.

use std::io::Write;
use std::path::PathBuf;

use tracing::info;
use trained_model::TrainedModel;

use crate::convert::{convert, ConvertOptions};
use crate::error::Result;
use crate::package::MlModel;

pub const DEFAULT_INPUT: &str = "mnist_cnn.safetensors";
pub const DEFAULT_OUTPUT: &str = "mnist_cnn.mlmodel";

pub const IMAGE_INPUT: &str = "image";
pub const OUTPUT: &str = "output1";

pub const AUTHOR: &str = "Tim LeMaster";
pub const LICENSE: &str = "MIT";
pub const SHORT_DESCRIPTION: &str = "Reads a handwritten digit. The model is based on keras mnist examples here. https://github.com/fchollet/keras/blob/master/examples/mnist_cnn.py.";
pub const INPUT_DESCRIPTION: &str = "A 28x28 pixel Image";
pub const OUTPUT_DESCRIPTION: &str = "A one-hot Multiarray were the index with the biggest float value (0-1) is the recognized digit. ";

pub const NOTICE_CONVERTING: &str = "converting...";
pub const NOTICE_CONVERTED: &str = "model converted";
pub const NOTICE_NO_MODEL: &str = "no model found";

/// Where to read the trained model and where to write the package.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriverConfig {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from(DEFAULT_INPUT),
            output: PathBuf::from(DEFAULT_OUTPUT),
        }
    }
}

/// How a run ended when no error occurred.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Converted { output: PathBuf },
    NoModel,
}

/// Assign the fixed author, license and feature descriptions.
pub fn apply_metadata(package: &mut MlModel) -> Result<()> {
    package.set_author(AUTHOR);
    package.set_license(LICENSE);
    package.set_short_description(SHORT_DESCRIPTION);
    package.set_input_description(IMAGE_INPUT, INPUT_DESCRIPTION)?;
    package.set_output_description(OUTPUT, OUTPUT_DESCRIPTION)?;
    Ok(())
}

/// Convert the model at `config.input` if it exists, writing user-facing
/// notices to `notices`.
pub fn check_and_convert<W: Write>(config: &DriverConfig, notices: &mut W) -> Result<Outcome> {
    if !config.input.is_file() {
        info!(path = %config.input.display(), "input model missing");
        writeln!(notices, "{NOTICE_NO_MODEL}")?;
        return Ok(Outcome::NoModel);
    }

    let model = TrainedModel::load(&config.input)?;
    writeln!(notices, "{NOTICE_CONVERTING}")?;

    let options = ConvertOptions::default()
        .with_input_name(IMAGE_INPUT)
        .with_image_input(IMAGE_INPUT)
        .with_output_name(OUTPUT);
    let mut package = convert(&model, &options)?;
    apply_metadata(&mut package)?;
    package.save(&config.output)?;

    writeln!(notices, "{NOTICE_CONVERTED}")?;
    Ok(Outcome::Converted {
        output: config.output.clone(),
    })
}
