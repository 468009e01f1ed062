//! Converted Core ML package and its descriptive metadata.

use std::fs;
use std::io::Write;
use std::path::Path;

use protobuf::Message;
use tracing::info;

use crate::error::{Error, Result};
use crate::protos::{FeatureDescription, Model};

/// A Core ML model ready to be saved as an `.mlmodel` file.
#[derive(Clone, Debug, PartialEq)]
pub struct MlModel {
    spec: Model,
}

fn find_feature<'a>(
    features: &'a mut [FeatureDescription],
    kind: &'static str,
    name: &str,
) -> Result<&'a mut FeatureDescription> {
    features
        .iter_mut()
        .find(|f| f.name == name)
        .ok_or_else(|| Error::UnknownFeature {
            kind,
            name: name.to_string(),
        })
}

impl MlModel {
    pub fn from_spec(spec: Model) -> Self {
        Self { spec }
    }

    /// Underlying protobuf message.
    pub fn spec(&self) -> &Model {
        &self.spec
    }

    pub fn into_spec(self) -> Model {
        self.spec
    }

    pub fn author(&self) -> &str {
        &self.spec.description.metadata.author
    }

    pub fn set_author(&mut self, author: impl Into<String>) {
        self.metadata_mut().author = author.into();
    }

    pub fn license(&self) -> &str {
        &self.spec.description.metadata.license
    }

    pub fn set_license(&mut self, license: impl Into<String>) {
        self.metadata_mut().license = license.into();
    }

    pub fn short_description(&self) -> &str {
        &self.spec.description.metadata.short_description
    }

    pub fn set_short_description(&mut self, description: impl Into<String>) {
        self.metadata_mut().short_description = description.into();
    }

    pub fn input_names(&self) -> Vec<&str> {
        self.spec.description.input.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn output_names(&self) -> Vec<&str> {
        self.spec.description.output.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn input_description(&self, name: &str) -> Option<&str> {
        self.spec
            .description
            .input
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.short_description.as_str())
    }

    /// Describe the input feature `name`; fails if the model has no such input.
    pub fn set_input_description(&mut self, name: &str, description: impl Into<String>) -> Result<()> {
        let features = &mut self.spec.description.mut_or_insert_default().input;
        find_feature(features, "input", name)?.short_description = description.into();
        Ok(())
    }

    pub fn output_description(&self, name: &str) -> Option<&str> {
        self.spec
            .description
            .output
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.short_description.as_str())
    }

    /// Describe the output feature `name`; fails if the model has no such output.
    pub fn set_output_description(&mut self, name: &str, description: impl Into<String>) -> Result<()> {
        let features = &mut self.spec.description.mut_or_insert_default().output;
        find_feature(features, "output", name)?.short_description = description.into();
        Ok(())
    }

    fn metadata_mut(&mut self) -> &mut crate::protos::Metadata {
        self.spec
            .description
            .mut_or_insert_default()
            .metadata
            .mut_or_insert_default()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.spec.write_to_bytes()?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self::from_spec(Model::parse_from_bytes(bytes)?))
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_bytes(&fs::read(path)?)
    }

    /// Write the package to `path`, replacing any existing file atomically.
    ///
    /// The bytes go to a temporary file next to `path` which is renamed into
    /// place once fully written; on failure the temporary file is removed and
    /// the previous contents of `path` are left alone. A replaced file keeps
    /// its permissions; a new one gets the umask default like `fs::write`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut builder = tempfile::Builder::new();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            builder.permissions(fs::Permissions::from_mode(0o666));
        }
        let mut tmp = builder.tempfile_in(dir)?;
        if let Ok(existing) = fs::metadata(path) {
            tmp.as_file().set_permissions(existing.permissions())?;
        }
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        info!(path = %path.display(), bytes = bytes.len(), "saved Core ML package");
        Ok(())
    }
}
