//! Write the reference MNIST CNN with random weights to disk.
//!
//! The converter needs an artifact to work on; this produces one with the
//! right architecture without a training run.

use std::path::PathBuf;

use trained_model::reference;

/// Application that exports the reference model.
pub struct ExportApp {
    output: PathBuf,
}

impl ExportApp {
    /// Create a new export application.
    pub fn new(output: PathBuf) -> Self {

        Self { output }
    }

    /// Build the model and save it.
    pub fn run(&self) -> trained_model::Result<()> {

        let model = reference::mnist_cnn()?;
        model.save(&self.output)?;
        println!("Saved reference model to {:?}", self.output);
        Ok(())
    }
}

fn main() {

    let args: Vec<String> = std::env::args().collect();
    let output = match args.len() {
        1 => PathBuf::from("mnist_cnn.safetensors"),
        2 => PathBuf::from(&args[1]),
        _ => {
            eprintln!("usage: export-reference [output]");
            std::process::exit(2);
        }
    };
    let app = ExportApp::new(output);
    if let Err(err) = app.run() {
        eprintln!("export failed: {err}");
        std::process::exit(1);
    }

}
