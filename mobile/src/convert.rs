//! Translation of a trained sequential model into a Core ML neural network.

use ndarray::ArrayD;
use protobuf::{EnumOrUnknown, MessageField};
use tracing::{debug, info};
use trained_model::model::{Activation, Conv2D, Dense, Layer, Padding, Pooling2D, Shape};
use trained_model::TrainedModel;

use crate::error::{Error, Result};
use crate::package::MlModel;
use crate::protos::{
    activation_params, array_feature_type, convolution_layer_params, feature_type,
    flatten_layer_params, image_feature_type, neural_network_layer, pooling_layer_params,
    ActivationELU, ActivationLinear, ActivationParams, ActivationReLU, ActivationSigmoid,
    ActivationSigmoidHard, ActivationSoftplus, ActivationSoftsign, ActivationTanh,
    ArrayFeatureType, ConvolutionLayerParams, FeatureDescription, FeatureType, FlattenLayerParams,
    ImageFeatureType, InnerProductLayerParams, Model, ModelDescription, NeuralNetwork,
    NeuralNetworkLayer, PoolingLayerParams, SamePadding, SoftmaxLayerParams, ValidPadding,
    WeightParams,
};

/// Core ML specification version written for neural network models.
pub const SPECIFICATION_VERSION: i32 = 1;

/// Naming of the converted model's features.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvertOptions {
    pub input_names: Vec<String>,
    /// Inputs to expose as images instead of multi-arrays.
    pub image_input_names: Vec<String>,
    pub output_names: Vec<String>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            input_names: vec!["input1".to_string()],
            image_input_names: Vec::new(),
            output_names: vec!["output1".to_string()],
        }
    }
}

impl ConvertOptions {
    pub fn with_input_name(mut self, name: impl Into<String>) -> Self {
        self.input_names = vec![name.into()];
        self
    }

    pub fn with_image_input(mut self, name: impl Into<String>) -> Self {
        self.image_input_names.push(name.into());
        self
    }

    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_names = vec![name.into()];
        self
    }

    fn single(names: &[String], kind: &str) -> Result<String> {
        match names {
            [name] => Ok(name.clone()),
            _ => Err(Error::Options(format!(
                "a sequential model has exactly one {kind}, got {} names",
                names.len()
            ))),
        }
    }

    fn validate(&self) -> Result<(String, String)> {
        let input = Self::single(&self.input_names, "input")?;
        let output = Self::single(&self.output_names, "output")?;
        if let Some(unknown) = self.image_input_names.iter().find(|n| **n != input) {
            return Err(Error::Options(format!("image input {unknown} is not a model input")));
        }
        Ok((input, output))
    }
}

/// Accumulates layers and threads blob names from one layer to the next.
struct NetworkBuilder {
    layers: Vec<NeuralNetworkLayer>,
    blob: String,
}

impl NetworkBuilder {
    fn new(input: &str) -> Self {
        Self {
            layers: Vec::new(),
            blob: input.to_string(),
        }
    }

    fn push(&mut self, name: &str, params: neural_network_layer::Layer) {
        let output = format!("{name}_output");
        let mut layer = NeuralNetworkLayer::new();
        layer.name = name.to_string();
        layer.input = vec![std::mem::replace(&mut self.blob, output.clone())];
        layer.output = vec![output];
        layer.layer = Some(params);
        debug!(layer = name, input = %layer.input[0], "emitted layer");
        self.layers.push(layer);
    }

    /// Emit the activation fused into `layer`; linear activations need no layer.
    fn push_fused_activation(&mut self, layer: &str, activation: Activation) {
        if activation != Activation::Linear {
            self.push(&format!("{layer}__activation__"), activation_layer(activation));
        }
    }

    fn finish(mut self, output: &str) -> Result<NeuralNetwork> {
        let last = self.layers.last_mut().ok_or(Error::EmptyNetwork)?;
        last.output = vec![output.to_string()];
        let mut network = NeuralNetwork::new();
        network.layers = self.layers;
        Ok(network)
    }
}

fn weights(values: Vec<f32>) -> MessageField<WeightParams> {
    let mut params = WeightParams::new();
    params.float_value = values;
    MessageField::some(params)
}

fn activation_layer(activation: Activation) -> neural_network_layer::Layer {
    use activation_params::Nonlinearity;

    let nonlinearity = match activation {
        Activation::Softmax => return neural_network_layer::Layer::Softmax(SoftmaxLayerParams::new()),
        Activation::Linear => {
            let mut linear = ActivationLinear::new();
            linear.alpha = 1.0;
            Nonlinearity::Linear(linear)
        }
        Activation::Relu => Nonlinearity::Relu(ActivationReLU::new()),
        Activation::Sigmoid => Nonlinearity::Sigmoid(ActivationSigmoid::new()),
        Activation::HardSigmoid => {
            // Keras: clip(0.2 * x + 0.5, 0, 1)
            let mut hard = ActivationSigmoidHard::new();
            hard.alpha = 0.2;
            hard.beta = 0.5;
            Nonlinearity::SigmoidHard(hard)
        }
        Activation::Tanh => Nonlinearity::Tanh(ActivationTanh::new()),
        Activation::Softplus => Nonlinearity::Softplus(ActivationSoftplus::new()),
        Activation::Softsign => Nonlinearity::Softsign(ActivationSoftsign::new()),
        Activation::Elu => {
            let mut elu = ActivationELU::new();
            elu.alpha = 1.0;
            Nonlinearity::Elu(elu)
        }
    };
    let mut params = ActivationParams::new();
    params.nonlinearity = Some(nonlinearity);
    neural_network_layer::Layer::Activation(params)
}

fn kernel_channels(input: Shape) -> u64 {
    match input {
        Shape::Image { channels, .. } => channels as u64,
        Shape::Flat(n) => n as u64,
    }
}

fn to_u64(values: [usize; 2]) -> Vec<u64> {
    values.iter().map(|&v| v as u64).collect()
}

fn convolution(model: &TrainedModel, conv: &Conv2D, input: Shape) -> Result<ConvolutionLayerParams> {
    let mut params = ConvolutionLayerParams::new();
    params.output_channels = conv.filters as u64;
    params.kernel_channels = kernel_channels(input);
    params.n_groups = 1;
    params.kernel_size = to_u64(conv.kernel_size);
    params.stride = to_u64(conv.strides);
    params.dilation_factor = to_u64(conv.dilation_rate);
    params.padding = Some(match conv.padding {
        Padding::Valid => convolution_layer_params::Padding::Valid(ValidPadding::new()),
        Padding::Same => convolution_layer_params::Padding::Same(SamePadding::new()),
    });

    // Keras stores [kh, kw, in, out]; Core ML wants [out, in, kh, kw].
    let kernel: &ArrayD<f32> = model.weight(&conv.name, "kernel")?;
    let reordered = kernel.view().permuted_axes(&[3usize, 2, 0, 1][..]);
    params.weights = weights(reordered.iter().copied().collect());

    if conv.use_bias {
        params.has_bias = true;
        params.bias = weights(model.weight(&conv.name, "bias")?.iter().copied().collect());
    }
    Ok(params)
}

fn pooling(pool: &Pooling2D, max: bool) -> PoolingLayerParams {
    use pooling_layer_params::PoolingType;

    let mut params = PoolingLayerParams::new();
    params.pooling_type = EnumOrUnknown::new(if max { PoolingType::MAX } else { PoolingType::AVERAGE });
    params.kernel_size = to_u64(pool.pool_size);
    params.stride = to_u64(pool.effective_strides());
    params.padding = Some(match pool.padding {
        Padding::Valid => pooling_layer_params::Padding::Valid(ValidPadding::new()),
        Padding::Same => pooling_layer_params::Padding::Same(SamePadding::new()),
    });
    params.avg_pool_exclude_padding = !max && pool.padding == Padding::Same;
    params
}

fn inner_product(model: &TrainedModel, dense: &Dense) -> Result<InnerProductLayerParams> {
    let mut params = InnerProductLayerParams::new();
    params.output_channels = dense.units as u64;

    // Keras stores [in, out]; Core ML wants [out, in].
    let kernel = model.weight(&dense.name, "kernel")?;
    params.input_channels = kernel.shape()[0] as u64;
    params.weights = weights(kernel.t().iter().copied().collect());

    if dense.use_bias {
        params.has_bias = true;
        params.bias = weights(model.weight(&dense.name, "bias")?.iter().copied().collect());
    }
    Ok(params)
}

fn flatten() -> FlattenLayerParams {
    let mut params = FlattenLayerParams::new();
    params.mode = EnumOrUnknown::new(flatten_layer_params::FlattenOrder::CHANNEL_LAST);
    params
}

/// Multi-array dimensions in Core ML's channel-first order.
fn array_shape(shape: Shape) -> Vec<i64> {
    match shape {
        Shape::Image {
            height,
            width,
            channels,
        } => vec![channels as i64, height as i64, width as i64],
        Shape::Flat(n) => vec![n as i64],
    }
}

fn array_feature(name: &str, shape: Shape) -> FeatureDescription {
    let mut array = ArrayFeatureType::new();
    array.shape = array_shape(shape);
    array.data_type = EnumOrUnknown::new(array_feature_type::ArrayDataType::DOUBLE);

    let mut type_info = FeatureType::new();
    type_info.kind = Some(feature_type::Kind::MultiArrayType(array));

    let mut feature = FeatureDescription::new();
    feature.name = name.to_string();
    feature.type_info = MessageField::some(type_info);
    feature
}

fn image_feature(name: &str, shape: Shape) -> Result<FeatureDescription> {
    use image_feature_type::ColorSpace;

    let invalid = |reason: &str| Error::InvalidImageInput {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    let (height, width, channels) = match shape {
        Shape::Image {
            height,
            width,
            channels,
        } => (height, width, channels),
        Shape::Flat(_) => return Err(invalid("model input is a flat vector")),
    };
    let color_space = match channels {
        1 => ColorSpace::GRAYSCALE,
        3 => ColorSpace::RGB,
        n => return Err(invalid(&format!("{n} channels, expected 1 or 3"))),
    };

    let mut image = ImageFeatureType::new();
    image.width = width as i64;
    image.height = height as i64;
    image.color_space = EnumOrUnknown::new(color_space);

    let mut type_info = FeatureType::new();
    type_info.kind = Some(feature_type::Kind::ImageType(image));

    let mut feature = FeatureDescription::new();
    feature.name = name.to_string();
    feature.type_info = MessageField::some(type_info);
    Ok(feature)
}

/// Convert `model` into a Core ML neural network package.
pub fn convert(model: &TrainedModel, options: &ConvertOptions) -> Result<MlModel> {
    let (input_name, output_name) = options.validate()?;
    let shapes = model.architecture().shapes()?;

    let mut builder = NetworkBuilder::new(&input_name);
    for (layer, &input) in model.layers().iter().zip(&shapes) {
        match layer {
            Layer::InputLayer(_) => {}
            Layer::Dropout(dropout) => {
                info!(layer = %dropout.name, rate = dropout.rate, "skipping dropout");
            }
            Layer::Conv2D(conv) => {
                let params = convolution(model, conv, input)?;
                builder.push(&conv.name, neural_network_layer::Layer::Convolution(params));
                builder.push_fused_activation(&conv.name, conv.activation);
            }
            Layer::MaxPooling2D(pool) => {
                builder.push(&pool.name, neural_network_layer::Layer::Pooling(pooling(pool, true)));
            }
            Layer::AveragePooling2D(pool) => {
                builder.push(&pool.name, neural_network_layer::Layer::Pooling(pooling(pool, false)));
            }
            Layer::Flatten(flat) => {
                builder.push(&flat.name, neural_network_layer::Layer::Flatten(flatten()));
            }
            Layer::Dense(dense) => {
                let params = inner_product(model, dense)?;
                builder.push(&dense.name, neural_network_layer::Layer::InnerProduct(params));
                builder.push_fused_activation(&dense.name, dense.activation);
            }
            Layer::Activation(act) => {
                builder.push(&act.name, activation_layer(act.activation));
            }
        }
    }
    let network = builder.finish(&output_name)?;

    let input_shape = shapes[0];
    let output_shape = shapes[shapes.len() - 1];
    let input = if options.image_input_names.contains(&input_name) {
        image_feature(&input_name, input_shape)?
    } else {
        array_feature(&input_name, input_shape)
    };

    let mut description = ModelDescription::new();
    description.input = vec![input];
    description.output = vec![array_feature(&output_name, output_shape)];

    let mut spec = Model::new();
    spec.specification_version = SPECIFICATION_VERSION;
    spec.description = MessageField::some(description);
    info!(layers = network.layers.len(), input = %input_name, output = %output_name, "converted model");
    spec.kind = Some(crate::protos::model::Kind::NeuralNetwork(network));

    Ok(MlModel::from_spec(spec))
}
