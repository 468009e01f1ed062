use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Shape of the activations flowing between layers, batch dimension excluded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    /// Channels-last feature map.
    Image {
        height: usize,
        width: usize,
        channels: usize,
    },
    /// Flat feature vector.
    Flat(usize),
}

impl Shape {
    /// Total number of scalars in one sample, `None` on overflow.
    pub fn checked_len(&self) -> Option<usize> {
        match *self {
            Shape::Image {
                height,
                width,
                channels,
            } => height.checked_mul(width)?.checked_mul(channels),
            Shape::Flat(n) => Some(n),
        }
    }

    /// Parse a Keras `batch_input_shape` such as `[null, 28, 28, 1]`.
    pub fn from_batch_input_shape(dims: &[Option<usize>]) -> Result<Self> {
        let dims = dims
            .iter()
            .skip(1)
            .map(|d| d.ok_or(Error::MissingInputShape))
            .collect::<Result<Vec<usize>>>()?;
        match dims.as_slice() {
            [n] => Ok(Shape::Flat(*n)),
            [height, width, channels] => Ok(Shape::Image {
                height: *height,
                width: *width,
                channels: *channels,
            }),
            _ => Err(Error::MissingInputShape),
        }
    }
}

/// Element-wise nonlinearity attached to a layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Sigmoid,
    HardSigmoid,
    Tanh,
    Softmax,
    Softplus,
    Softsign,
    Elu,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Padding {
    #[default]
    Valid,
    Same,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    #[default]
    ChannelsLast,
    ChannelsFirst,
}

fn default_unit() -> [usize; 2] {
    [1, 1]
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputLayer {
    pub name: String,
    pub batch_input_shape: Vec<Option<usize>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conv2D {
    pub name: String,
    pub filters: usize,
    pub kernel_size: [usize; 2],
    #[serde(default = "default_unit")]
    pub strides: [usize; 2],
    #[serde(default)]
    pub padding: Padding,
    #[serde(default)]
    pub data_format: DataFormat,
    #[serde(default = "default_unit")]
    pub dilation_rate: [usize; 2],
    #[serde(default)]
    pub activation: Activation,
    #[serde(default = "default_true")]
    pub use_bias: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_input_shape: Option<Vec<Option<usize>>>,
}

/// Shared by max and average pooling.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pooling2D {
    pub name: String,
    pub pool_size: [usize; 2],
    /// Keras writes `null` to mean "same as pool_size".
    #[serde(default)]
    pub strides: Option<[usize; 2]>,
    #[serde(default)]
    pub padding: Padding,
    #[serde(default)]
    pub data_format: DataFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_input_shape: Option<Vec<Option<usize>>>,
}

impl Pooling2D {
    pub fn effective_strides(&self) -> [usize; 2] {
        self.strides.unwrap_or(self.pool_size)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    pub name: String,
    pub units: usize,
    #[serde(default)]
    pub activation: Activation,
    #[serde(default = "default_true")]
    pub use_bias: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_input_shape: Option<Vec<Option<usize>>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dropout {
    pub name: String,
    pub rate: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_input_shape: Option<Vec<Option<usize>>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Flatten {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_input_shape: Option<Vec<Option<usize>>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActivationLayer {
    pub name: String,
    pub activation: Activation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_input_shape: Option<Vec<Option<usize>>>,
}

/// One entry of a Keras sequential model config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class_name", content = "config")]
pub enum Layer {
    InputLayer(InputLayer),
    Conv2D(Conv2D),
    MaxPooling2D(Pooling2D),
    AveragePooling2D(Pooling2D),
    Dense(Dense),
    Dropout(Dropout),
    Flatten(Flatten),
    Activation(ActivationLayer),
}

impl Layer {
    pub fn name(&self) -> &str {
        match self {
            Layer::InputLayer(l) => &l.name,
            Layer::Conv2D(l) => &l.name,
            Layer::MaxPooling2D(l) | Layer::AveragePooling2D(l) => &l.name,
            Layer::Dense(l) => &l.name,
            Layer::Dropout(l) => &l.name,
            Layer::Flatten(l) => &l.name,
            Layer::Activation(l) => &l.name,
        }
    }

    pub fn batch_input_shape(&self) -> Option<&[Option<usize>]> {
        match self {
            Layer::InputLayer(l) => Some(&l.batch_input_shape),
            Layer::Conv2D(l) => l.batch_input_shape.as_deref(),
            Layer::MaxPooling2D(l) | Layer::AveragePooling2D(l) => l.batch_input_shape.as_deref(),
            Layer::Dense(l) => l.batch_input_shape.as_deref(),
            Layer::Flatten(l) => l.batch_input_shape.as_deref(),
            Layer::Dropout(l) => l.batch_input_shape.as_deref(),
            Layer::Activation(l) => l.batch_input_shape.as_deref(),
        }
    }

    /// Expected weight shapes for this layer given its input shape.
    pub fn weight_shapes(&self, input: Shape) -> Result<Vec<(&'static str, Vec<usize>)>> {
        match self {
            Layer::Conv2D(conv) => {
                let channels = image_channels(self.name(), input)?;
                let [kh, kw] = conv.kernel_size;
                let mut shapes = vec![("kernel", vec![kh, kw, channels, conv.filters])];
                if conv.use_bias {
                    shapes.push(("bias", vec![conv.filters]));
                }
                Ok(shapes)
            }
            Layer::Dense(dense) => {
                let inputs = match input {
                    Shape::Flat(n) => n,
                    Shape::Image { .. } => return Err(self.invalid("dense layers need a flat input")),
                };
                let mut shapes = vec![("kernel", vec![inputs, dense.units])];
                if dense.use_bias {
                    shapes.push(("bias", vec![dense.units]));
                }
                Ok(shapes)
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Shape produced by this layer when fed `input`.
    pub fn output_shape(&self, input: Shape) -> Result<Shape> {
        match self {
            Layer::InputLayer(_) | Layer::Dropout(_) | Layer::Activation(_) => Ok(input),
            Layer::Flatten(_) => input
                .checked_len()
                .map(Shape::Flat)
                .ok_or_else(|| self.invalid("flattened size overflows")),
            Layer::Dense(dense) => match input {
                Shape::Flat(_) => Ok(Shape::Flat(dense.units)),
                Shape::Image { .. } => Err(self.invalid("dense layers need a flat input")),
            },
            Layer::Conv2D(conv) => {
                self.require_channels_last(conv.data_format)?;
                let (height, width) = image_dims(self.name(), input)?;
                let [kh, kw] = conv.kernel_size;
                let [sh, sw] = conv.strides;
                let [dh, dw] = conv.dilation_rate;
                Ok(Shape::Image {
                    height: self.window_output(height, kh, sh, dh, conv.padding)?,
                    width: self.window_output(width, kw, sw, dw, conv.padding)?,
                    channels: conv.filters,
                })
            }
            Layer::MaxPooling2D(pool) | Layer::AveragePooling2D(pool) => {
                self.require_channels_last(pool.data_format)?;
                let channels = image_channels(self.name(), input)?;
                let (height, width) = image_dims(self.name(), input)?;
                let [kh, kw] = pool.pool_size;
                let [sh, sw] = pool.effective_strides();
                Ok(Shape::Image {
                    height: self.window_output(height, kh, sh, 1, pool.padding)?,
                    width: self.window_output(width, kw, sw, 1, pool.padding)?,
                    channels,
                })
            }
        }
    }

    fn window_output(&self, size: usize, kernel: usize, stride: usize, dilation: usize, padding: Padding) -> Result<usize> {
        if kernel == 0 || stride == 0 || dilation == 0 {
            return Err(self.invalid("kernel, stride and dilation must be positive"));
        }
        match padding {
            Padding::Same => Ok(size.div_ceil(stride)),
            Padding::Valid => {
                let span = (kernel - 1)
                    .checked_mul(dilation)
                    .and_then(|s| s.checked_add(1))
                    .ok_or_else(|| self.invalid("dilated window overflows"))?;
                if size < span {
                    return Err(self.invalid(&format!("window {span} larger than input {size}")));
                }
                Ok((size - span) / stride + 1)
            }
        }
    }

    fn require_channels_last(&self, format: DataFormat) -> Result<()> {
        match format {
            DataFormat::ChannelsLast => Ok(()),
            DataFormat::ChannelsFirst => Err(self.invalid("only channels_last data is supported")),
        }
    }

    fn invalid(&self, reason: &str) -> Error {
        Error::InvalidLayer {
            layer: self.name().to_string(),
            reason: reason.to_string(),
        }
    }
}

fn image_dims(layer: &str, input: Shape) -> Result<(usize, usize)> {
    match input {
        Shape::Image { height, width, .. } => Ok((height, width)),
        Shape::Flat(_) => Err(Error::InvalidLayer {
            layer: layer.to_string(),
            reason: "expected an image input".to_string(),
        }),
    }
}

fn image_channels(layer: &str, input: Shape) -> Result<usize> {
    match input {
        Shape::Image { channels, .. } => Ok(channels),
        Shape::Flat(_) => Err(Error::InvalidLayer {
            layer: layer.to_string(),
            reason: "expected an image input".to_string(),
        }),
    }
}

/// Layer stack of a sequential model.
#[derive(Clone, Debug, PartialEq)]
pub struct Architecture {
    pub name: Option<String>,
    pub layers: Vec<Layer>,
}

#[derive(Deserialize)]
struct RawModelConfig {
    class_name: String,
    config: RawLayers,
}

// Keras 2.0/2.1 store the layer list directly; 2.2 wraps it with the model name.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawLayers {
    Named {
        #[serde(default)]
        name: Option<String>,
        layers: Vec<Layer>,
    },
    Bare(Vec<Layer>),
}

#[derive(Serialize)]
struct ModelConfigOut<'a> {
    class_name: &'static str,
    config: NamedLayersOut<'a>,
}

#[derive(Serialize)]
struct NamedLayersOut<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    layers: &'a [Layer],
}

impl Architecture {
    pub fn new(layers: Vec<Layer>) -> Self {
        Self { name: None, layers }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Parse the Keras `model_config` JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawModelConfig = serde_json::from_str(json)?;
        if raw.class_name != "Sequential" {
            return Err(Error::UnsupportedModel(raw.class_name));
        }
        Ok(match raw.config {
            RawLayers::Named { name, layers } => Self { name, layers },
            RawLayers::Bare(layers) => Self { name: None, layers },
        })
    }

    pub fn to_json(&self) -> Result<String> {
        let out = ModelConfigOut {
            class_name: "Sequential",
            config: NamedLayersOut {
                name: self.name.as_deref(),
                layers: &self.layers,
            },
        };
        Ok(serde_json::to_string(&out)?)
    }

    /// Input shape declared by the first layer.
    pub fn input_shape(&self) -> Result<Shape> {
        let first = self.layers.first().ok_or(Error::MissingInputShape)?;
        let dims = first.batch_input_shape().ok_or(Error::MissingInputShape)?;
        let shape = Shape::from_batch_input_shape(dims)?;
        if shape.checked_len().is_none() {
            return Err(first.invalid("input size overflows"));
        }
        Ok(shape)
    }

    /// Input shape of every layer followed by the final output shape.
    pub fn shapes(&self) -> Result<Vec<Shape>> {
        let mut shape = self.input_shape()?;
        let mut shapes = Vec::with_capacity(self.layers.len() + 1);
        shapes.push(shape);
        for layer in &self.layers {
            shape = layer.output_shape(shape)?;
            shapes.push(shape);
        }
        Ok(shapes)
    }

    pub fn output_shape(&self) -> Result<Shape> {
        self.shapes()?.pop().ok_or(Error::MissingInputShape)
    }
}
