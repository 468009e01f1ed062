use trained_model::model::{Activation, Architecture, Layer, Padding, Shape};
use trained_model::reference::mnist_cnn_architecture;
use trained_model::Error;

// Sequential config as written by Keras 2.1 (bare layer list).
const KERAS_21_CONFIG: &str = r#"{
    "class_name": "Sequential",
    "config": [
        {"class_name": "Conv2D", "config": {"name": "conv2d_1", "trainable": true,
            "batch_input_shape": [null, 28, 28, 1], "dtype": "float32", "filters": 32,
            "kernel_size": [3, 3], "strides": [1, 1], "padding": "valid",
            "data_format": "channels_last", "dilation_rate": [1, 1], "activation": "relu",
            "use_bias": true}},
        {"class_name": "MaxPooling2D", "config": {"name": "max_pooling2d_1", "trainable": true,
            "pool_size": [2, 2], "padding": "valid", "strides": [2, 2],
            "data_format": "channels_last"}},
        {"class_name": "Dropout", "config": {"name": "dropout_1", "trainable": true, "rate": 0.25}},
        {"class_name": "Flatten", "config": {"name": "flatten_1", "trainable": true}},
        {"class_name": "Dense", "config": {"name": "dense_1", "trainable": true, "units": 10,
            "activation": "softmax", "use_bias": true}}
    ]
}"#;

#[test]
fn parses_bare_layer_list() {
    let arch = Architecture::from_json(KERAS_21_CONFIG).unwrap();
    assert_eq!(arch.name, None);
    assert_eq!(arch.layers.len(), 5);
    let names: Vec<&str> = arch.layers.iter().map(Layer::name).collect();
    assert_eq!(names, ["conv2d_1", "max_pooling2d_1", "dropout_1", "flatten_1", "dense_1"]);
    match &arch.layers[0] {
        Layer::Conv2D(conv) => {
            assert_eq!(conv.filters, 32);
            assert_eq!(conv.activation, Activation::Relu);
            assert_eq!(conv.padding, Padding::Valid);
        }
        other => panic!("unexpected first layer {other:?}"),
    }
}

#[test]
fn parses_named_layer_list() {
    let json = r#"{"class_name": "Sequential", "config": {"name": "sequential_1", "layers": [
        {"class_name": "InputLayer", "config": {"name": "input_1", "batch_input_shape": [null, 784]}},
        {"class_name": "Dense", "config": {"name": "dense_1", "units": 10}}
    ]}}"#;
    let arch = Architecture::from_json(json).unwrap();
    assert_eq!(arch.name.as_deref(), Some("sequential_1"));
    assert_eq!(arch.input_shape().unwrap(), Shape::Flat(784));
    match &arch.layers[1] {
        Layer::Dense(dense) => {
            assert_eq!(dense.activation, Activation::Linear);
            assert!(dense.use_bias);
        }
        other => panic!("unexpected layer {other:?}"),
    }
}

#[test]
fn config_survives_json_round_trip() {
    let arch = mnist_cnn_architecture();
    let parsed = Architecture::from_json(&arch.to_json().unwrap()).unwrap();
    assert_eq!(parsed, arch);
}

#[test]
fn rejects_functional_models() {
    let json = r#"{"class_name": "Model", "config": {"layers": []}}"#;
    let err = Architecture::from_json(json).unwrap_err();
    assert!(matches!(err, Error::UnsupportedModel(ref class) if class == "Model"));
}

#[test]
fn rejects_unknown_layer_class() {
    let json = r#"{"class_name": "Sequential", "config": [
        {"class_name": "LSTM", "config": {"name": "lstm_1", "units": 4}}
    ]}"#;
    assert!(matches!(Architecture::from_json(json), Err(Error::Config(_))));
}

#[test]
fn infers_mnist_cnn_shapes() {
    let shapes = mnist_cnn_architecture().shapes().unwrap();
    let image = |height, width, channels| Shape::Image { height, width, channels };
    assert_eq!(
        shapes,
        vec![
            image(28, 28, 1),
            image(26, 26, 32),
            image(24, 24, 64),
            image(12, 12, 64),
            image(12, 12, 64),
            Shape::Flat(9216),
            Shape::Flat(128),
            Shape::Flat(128),
            Shape::Flat(10),
        ]
    );
}

#[test]
fn same_padding_rounds_up_with_stride() {
    let json = r#"{"class_name": "Sequential", "config": [
        {"class_name": "Conv2D", "config": {"name": "c", "filters": 4, "kernel_size": [3, 3],
            "strides": [2, 2], "padding": "same", "batch_input_shape": [null, 7, 5, 3]}},
        {"class_name": "AveragePooling2D", "config": {"name": "p", "pool_size": [2, 2],
            "strides": null, "padding": "same"}}
    ]}"#;
    let arch = Architecture::from_json(json).unwrap();
    assert_eq!(
        arch.output_shape().unwrap(),
        Shape::Image { height: 2, width: 2, channels: 4 }
    );
}

#[test]
fn dilation_widens_valid_window() {
    let json = r#"{"class_name": "Sequential", "config": [
        {"class_name": "Conv2D", "config": {"name": "c", "filters": 1, "kernel_size": [3, 3],
            "dilation_rate": [2, 2], "batch_input_shape": [null, 9, 9, 1]}}
    ]}"#;
    let arch = Architecture::from_json(json).unwrap();
    assert_eq!(
        arch.output_shape().unwrap(),
        Shape::Image { height: 5, width: 5, channels: 1 }
    );
}

#[test]
fn rejects_channels_first() {
    let json = r#"{"class_name": "Sequential", "config": [
        {"class_name": "Conv2D", "config": {"name": "c", "filters": 1, "kernel_size": [3, 3],
            "data_format": "channels_first", "batch_input_shape": [null, 1, 28, 28]}}
    ]}"#;
    let arch = Architecture::from_json(json).unwrap();
    assert!(matches!(arch.shapes(), Err(Error::InvalidLayer { ref layer, .. }) if layer == "c"));
}

#[test]
fn dense_needs_flat_input() {
    let json = r#"{"class_name": "Sequential", "config": [
        {"class_name": "Dense", "config": {"name": "d", "units": 3,
            "batch_input_shape": [null, 4, 4, 1]}}
    ]}"#;
    let arch = Architecture::from_json(json).unwrap();
    assert!(matches!(arch.shapes(), Err(Error::InvalidLayer { .. })));
}

#[test]
fn missing_input_shape_is_an_error() {
    let json = r#"{"class_name": "Sequential", "config": [
        {"class_name": "Flatten", "config": {"name": "f"}}
    ]}"#;
    let arch = Architecture::from_json(json).unwrap();
    assert!(matches!(arch.input_shape(), Err(Error::MissingInputShape)));
}

#[test]
fn dropout_or_activation_can_declare_input_shape() {
    let json = r#"{"class_name": "Sequential", "config": [
        {"class_name": "Dropout", "config": {"name": "drop", "rate": 0.2,
            "batch_input_shape": [null, 4]}},
        {"class_name": "Dense", "config": {"name": "d", "units": 3}}
    ]}"#;
    let arch = Architecture::from_json(json).unwrap();
    assert_eq!(arch.input_shape().unwrap(), Shape::Flat(4));
    assert_eq!(arch.output_shape().unwrap(), Shape::Flat(3));

    let json = r#"{"class_name": "Sequential", "config": [
        {"class_name": "Activation", "config": {"name": "act", "activation": "tanh",
            "batch_input_shape": [null, 8, 8, 3]}},
        {"class_name": "Flatten", "config": {"name": "f"}}
    ]}"#;
    let arch = Architecture::from_json(json).unwrap();
    assert_eq!(
        arch.input_shape().unwrap(),
        Shape::Image { height: 8, width: 8, channels: 3 }
    );
    assert_eq!(arch.output_shape().unwrap(), Shape::Flat(192));
    assert_eq!(Architecture::from_json(&arch.to_json().unwrap()).unwrap(), arch);
}

#[cfg(target_pointer_width = "64")]
#[test]
fn oversized_input_shape_is_rejected() {
    let json = r#"{"class_name": "Sequential", "config": [
        {"class_name": "Flatten", "config": {"name": "f",
            "batch_input_shape": [null, 4294967296, 4294967296, 2]}}
    ]}"#;
    let arch = Architecture::from_json(json).unwrap();
    assert!(matches!(arch.input_shape(), Err(Error::InvalidLayer { ref layer, .. }) if layer == "f"));
}

#[cfg(target_pointer_width = "64")]
#[test]
fn oversized_flatten_is_rejected() {
    let json = r#"{"class_name": "Sequential", "config": [
        {"class_name": "Conv2D", "config": {"name": "c", "filters": 4611686018427387904,
            "kernel_size": [1, 1], "batch_input_shape": [null, 2, 2, 1]}},
        {"class_name": "Flatten", "config": {"name": "f"}}
    ]}"#;
    let arch = Architecture::from_json(json).unwrap();
    assert!(matches!(arch.shapes(), Err(Error::InvalidLayer { ref layer, .. }) if layer == "f"));
}

#[cfg(target_pointer_width = "64")]
#[test]
fn oversized_dilation_is_rejected() {
    let json = r#"{"class_name": "Sequential", "config": [
        {"class_name": "Conv2D", "config": {"name": "c", "filters": 1,
            "kernel_size": [4294967297, 1], "dilation_rate": [4294967296, 1],
            "batch_input_shape": [null, 9, 9, 1]}}
    ]}"#;
    let arch = Architecture::from_json(json).unwrap();
    assert!(matches!(arch.shapes(), Err(Error::InvalidLayer { ref layer, .. }) if layer == "c"));
}
