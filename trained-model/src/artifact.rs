//! On-disk trained model: a safetensors file whose metadata carries the
//! Keras `model_config` JSON and whose tensors are the layer weights.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::Path;

use bytemuck::cast_slice;
use memmap2::MmapOptions;
use ndarray::{ArrayD, IxDyn};
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::{Architecture, Layer, Shape};

/// Metadata key holding the architecture JSON.
pub const MODEL_CONFIG_KEY: &str = "model_config";
pub const KERAS_VERSION_KEY: &str = "keras_version";
pub const BACKEND_KEY: &str = "backend";

/// A sequential classifier together with its weights.
#[derive(Clone, Debug)]
pub struct TrainedModel {
    architecture: Architecture,
    weights: BTreeMap<String, ArrayD<f32>>,
    keras_version: Option<String>,
    backend: Option<String>,
}

fn weight_key(layer: &str, param: &str) -> String {
    format!("{layer}/{param}")
}

fn decode_f32(data: &[u8]) -> Vec<f32> {
    match bytemuck::try_cast_slice::<u8, f32>(data) {
        Ok(values) if cfg!(target_endian = "little") => values.to_vec(),
        _ => data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    }
}

impl TrainedModel {
    /// Build a model, checking every weight against the inferred layer shapes.
    pub fn new(architecture: Architecture, weights: BTreeMap<String, ArrayD<f32>>) -> Result<Self> {
        let model = Self {
            architecture,
            weights,
            keras_version: None,
            backend: None,
        };
        model.validate()?;
        Ok(model)
    }

    pub fn with_keras_version(mut self, version: impl Into<String>) -> Self {
        self.keras_version = Some(version.into());
        self
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    fn validate(&self) -> Result<()> {
        let shapes = self.architecture.shapes()?;
        for (layer, input) in self.architecture.layers.iter().zip(shapes) {
            for (param, expected) in layer.weight_shapes(input)? {
                let actual = self.weight(layer.name(), param)?.shape();
                if actual != expected.as_slice() {
                    return Err(Error::ShapeMismatch {
                        name: weight_key(layer.name(), param),
                        expected,
                        actual: actual.to_vec(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn architecture(&self) -> &Architecture {
        &self.architecture
    }

    pub fn layers(&self) -> &[Layer] {
        &self.architecture.layers
    }

    pub fn input_shape(&self) -> Result<Shape> {
        self.architecture.input_shape()
    }

    pub fn keras_version(&self) -> Option<&str> {
        self.keras_version.as_deref()
    }

    pub fn backend(&self) -> Option<&str> {
        self.backend.as_deref()
    }

    /// Look up `param` (`kernel` or `bias`) of `layer`.
    pub fn weight(&self, layer: &str, param: &str) -> Result<&ArrayD<f32>> {
        self.weights
            .get(&weight_key(layer, param))
            .ok_or_else(|| Error::MissingWeight {
                layer: layer.to_string(),
                param: param.to_string(),
            })
    }

    pub fn weight_names(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(String::as_str)
    }

    /// Decode a model from an in-memory safetensors buffer.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (_, metadata) = SafeTensors::read_metadata(bytes)?;
        let info = metadata.metadata().clone().unwrap_or_default();
        let config = info.get(MODEL_CONFIG_KEY).ok_or(Error::MissingConfig)?;
        let architecture = Architecture::from_json(config)?;

        let tensors = SafeTensors::deserialize(bytes)?;
        let mut weights = BTreeMap::new();
        for (name, view) in tensors.tensors() {
            if view.dtype() != Dtype::F32 {
                return Err(Error::UnsupportedDtype {
                    name,
                    dtype: format!("{:?}", view.dtype()),
                });
            }
            let values = decode_f32(view.data());
            let array = ArrayD::from_shape_vec(IxDyn(view.shape()), values)?;
            // Keras names variables `conv2d_1/kernel:0`.
            let key = name.strip_suffix(":0").unwrap_or(&name).to_string();
            debug!(tensor = %key, shape = ?view.shape(), "decoded weight");
            weights.insert(key, array);
        }

        let mut model = Self::new(architecture, weights)?;
        model.keras_version = info.get(KERAS_VERSION_KEY).cloned();
        model.backend = info.get(BACKEND_KEY).cloned();
        Ok(model)
    }

    /// Load a model, memory-mapping the file when possible.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let model = match unsafe { MmapOptions::new().map(&file) } {
            Ok(mmap) => Self::from_bytes(&mmap)?,
            Err(err) => {
                debug!(error = %err, "mmap failed, reading file");
                Self::from_bytes(&std::fs::read(path)?)?
            }
        };
        info!(
            path = %path.display(),
            layers = model.layers().len(),
            tensors = model.weights.len(),
            "loaded trained model"
        );
        Ok(model)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let buffers: Vec<(&String, Vec<usize>, Vec<f32>)> = self
            .weights
            .iter()
            .map(|(name, array)| (name, array.shape().to_vec(), array.iter().copied().collect()))
            .collect();
        let mut views = Vec::with_capacity(buffers.len());
        for (name, shape, values) in &buffers {
            let view = TensorView::new(Dtype::F32, shape.clone(), cast_slice(values.as_slice()))?;
            views.push((name.as_str(), view));
        }

        let mut info = HashMap::new();
        info.insert(MODEL_CONFIG_KEY.to_string(), self.architecture.to_json()?);
        if let Some(version) = &self.keras_version {
            info.insert(KERAS_VERSION_KEY.to_string(), version.clone());
        }
        if let Some(backend) = &self.backend {
            info.insert(BACKEND_KEY.to_string(), backend.clone());
        }
        Ok(safetensors::serialize(views, &Some(info))?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, &bytes)?;
        info!(path = %path.display(), bytes = bytes.len(), "saved trained model");
        Ok(())
    }
}
