//! The Keras `mnist_cnn` example architecture with randomly initialized
//! weights, used to produce artifacts without running a training job.

use std::collections::BTreeMap;

use ndarray::{ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::Result;
use crate::model::{
    Activation, Architecture, Conv2D, DataFormat, Dense, Dropout, Flatten, Layer, Padding, Pooling2D,
};
use crate::TrainedModel;

/// Side length of an MNIST digit image.
pub const IMAGE_SIZE: usize = 28;

/// Number of digit classes.
pub const NUM_CLASSES: usize = 10;

/// Layer stack of the `mnist_cnn.py` example.
pub fn mnist_cnn_architecture() -> Architecture {
    let layers = vec![
        Layer::Conv2D(Conv2D {
            name: "conv2d_1".to_string(),
            filters: 32,
            kernel_size: [3, 3],
            strides: [1, 1],
            padding: Padding::Valid,
            data_format: DataFormat::ChannelsLast,
            dilation_rate: [1, 1],
            activation: Activation::Relu,
            use_bias: true,
            batch_input_shape: Some(vec![None, Some(IMAGE_SIZE), Some(IMAGE_SIZE), Some(1)]),
        }),
        Layer::Conv2D(Conv2D {
            name: "conv2d_2".to_string(),
            filters: 64,
            kernel_size: [3, 3],
            strides: [1, 1],
            padding: Padding::Valid,
            data_format: DataFormat::ChannelsLast,
            dilation_rate: [1, 1],
            activation: Activation::Relu,
            use_bias: true,
            batch_input_shape: None,
        }),
        Layer::MaxPooling2D(Pooling2D {
            name: "max_pooling2d_1".to_string(),
            pool_size: [2, 2],
            strides: None,
            padding: Padding::Valid,
            data_format: DataFormat::ChannelsLast,
            batch_input_shape: None,
        }),
        Layer::Dropout(Dropout {
            name: "dropout_1".to_string(),
            rate: 0.25,
            batch_input_shape: None,
        }),
        Layer::Flatten(Flatten {
            name: "flatten_1".to_string(),
            batch_input_shape: None,
        }),
        Layer::Dense(Dense {
            name: "dense_1".to_string(),
            units: 128,
            activation: Activation::Relu,
            use_bias: true,
            batch_input_shape: None,
        }),
        Layer::Dropout(Dropout {
            name: "dropout_2".to_string(),
            rate: 0.5,
            batch_input_shape: None,
        }),
        Layer::Dense(Dense {
            name: "dense_2".to_string(),
            units: NUM_CLASSES,
            activation: Activation::Softmax,
            use_bias: true,
            batch_input_shape: None,
        }),
    ];
    Architecture::new(layers).with_name("sequential_1")
}

/// Fill every weight of `architecture` with values drawn from `rng`.
pub fn random_weights<R: Rng>(
    architecture: &Architecture,
    rng: &mut R,
) -> Result<BTreeMap<String, ArrayD<f32>>> {
    let shapes = architecture.shapes()?;
    let mut weights = BTreeMap::new();
    for (layer, input) in architecture.layers.iter().zip(shapes) {
        for (param, shape) in layer.weight_shapes(input)? {
            let array = ArrayD::from_shape_fn(IxDyn(&shape), |_| rng.gen_range(-0.1f32..0.1));
            weights.insert(format!("{}/{}", layer.name(), param), array);
        }
    }
    Ok(weights)
}

/// Reference model with thread-local random weights.
pub fn mnist_cnn() -> Result<TrainedModel> {
    let architecture = mnist_cnn_architecture();
    let weights = random_weights(&architecture, &mut rand::thread_rng())?;
    Ok(TrainedModel::new(architecture, weights)?.with_backend("tensorflow"))
}

/// Reference model whose weights depend only on `seed`.
pub fn mnist_cnn_seeded(seed: u64) -> Result<TrainedModel> {
    let architecture = mnist_cnn_architecture();
    let weights = random_weights(&architecture, &mut StdRng::seed_from_u64(seed))?;
    Ok(TrainedModel::new(architecture, weights)?.with_backend("tensorflow"))
}
