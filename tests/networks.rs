use masknet::optim::{Adam, SGD};
use masknet::rng::derive_layer_seeds;
use masknet::{
    build_conv_network, build_dense_network, Activation, ConvSpec, Initializer, Layer, MaskError,
    MaskFunction, MaskedLayer, MaskedLayerOptions, RegularizationCoefficients, Tensor,
};

fn options(seed: u64) -> MaskedLayerOptions {
    MaskedLayerOptions::new(Activation::Relu, seed, Initializer::He, MaskFunction::Mask)
}

fn snapshot(net: &masknet::Network) -> (Vec<Tensor>, Vec<Tensor>) {
    let layers = net.masked_layers();
    let weights = layers.iter().map(|l| l.weight().unwrap().clone()).collect();
    let scores = layers.iter().map(|l| l.score().unwrap().clone()).collect();
    (weights, scores)
}

fn kernel_shapes(net: &masknet::Network) -> Vec<Vec<usize>> {
    net.masked_layers()
        .iter()
        .map(|l| l.kernel_shape().unwrap().to_vec())
        .collect()
}

#[test]
fn mlp_with_one_hidden_layer() {
    let net = build_dense_network(&[10, 20, 2], &options(42)).unwrap();
    assert_eq!(net.masked_layers().len(), 2);
    assert_eq!(kernel_shapes(&net), vec![vec![10, 20], vec![20, 2]]);
    let layers = net.masked_layers();
    assert_eq!(layers[0].activation(), Activation::Relu);
    assert_eq!(layers[1].activation(), Activation::Softmax);
    assert_eq!(net.output_shape(), &[2]);
}

#[test]
fn mlp_without_hidden_layers_is_a_softmax_head() {
    let net = build_dense_network(&[5, 3], &options(7)).unwrap();
    assert_eq!(kernel_shapes(&net), vec![vec![5, 3]]);
    assert_eq!(net.masked_layers()[0].activation(), Activation::Softmax);
}

#[test]
fn mlp_needs_two_widths() {
    assert!(matches!(
        build_dense_network(&[5], &options(1)),
        Err(MaskError::InvalidArchitecture { .. })
    ));
}

#[test]
fn mlp_layer_seeds_are_derived() {
    let net = build_dense_network(&[6, 5, 4, 3], &options(42)).unwrap();
    let seeds = derive_layer_seeds(42, 4);
    let layers = net.masked_layers();
    assert_eq!(layers[0].seed(), seeds[0]);
    assert_eq!(layers[1].seed(), seeds[1]);
    assert_eq!(layers[2].seed(), seeds[3]);

    let single = build_dense_network(&[6, 3], &options(42)).unwrap();
    assert_eq!(single.masked_layers()[0].seed(), derive_layer_seeds(42, 2)[0]);
}

#[test]
fn same_seed_builds_identical_networks() {
    let a = build_dense_network(&[4, 8, 2], &options(3)).unwrap();
    let b = build_dense_network(&[4, 8, 2], &options(3)).unwrap();
    for (la, lb) in a.masked_layers().iter().zip(b.masked_layers()) {
        assert_eq!(la.weight().unwrap(), lb.weight().unwrap());
        assert_eq!(la.score().unwrap(), lb.score().unwrap());
    }
    assert_ne!(a.name(), b.name());
}

#[test]
fn cnn_threads_shapes_through_pooling() {
    let arch = [ConvSpec::conv(3, 3, 8), ConvSpec::Pool, ConvSpec::conv(3, 3, 16)];
    let net = build_conv_network(&[8, 8, 1], &arch, &[10], &options(42)).unwrap();
    assert_eq!(
        kernel_shapes(&net),
        vec![vec![3, 3, 1, 8], vec![3, 3, 8, 16], vec![256, 10]]
    );
    let names: Vec<&str> = net.layers().iter().map(|l| l.name()).collect();
    assert_eq!(names.iter().filter(|n| n.starts_with("max_pool2d")).count(), 1);
    assert!(names.contains(&"flatten"));
    assert!(net.masked_layers().iter().all(|l| l.seed() == 42));

    let x = Tensor::full(vec![2, 8, 8, 1], 0.5);
    let y = net.forward(&x).unwrap();
    assert_eq!(y.shape, vec![2, 10]);
}

#[test]
fn cnn_rejects_rank_two_input() {
    let err = build_conv_network(&[8, 8], &[ConvSpec::conv(3, 3, 4)], &[2], &options(1));
    assert!(matches!(err, Err(MaskError::InvalidInputRank { .. })));
}

#[test]
fn zero_alpha_registers_nothing() {
    let net = build_dense_network(&[5, 3], &options(1)).unwrap();
    assert!(net.ledger().is_empty());
    assert_eq!(net.regularization_loss().unwrap(), 0.0);
}

#[test]
fn dense_regularizer_is_scaled_mask_mean() {
    let opts = options(1).with_regularization(RegularizationCoefficients::alpha_only(0.5));
    let net = build_dense_network(&[5, 3], &opts).unwrap();
    assert_eq!(net.ledger().len(), 1);
    // fresh scores keep every weight, so mean(mask) is 1
    assert!((net.regularization_loss().unwrap() - 0.5).abs() < 1e-6);
}

#[test]
fn conv_regularizer_is_affine_in_mask_mean() {
    let opts = options(1).with_regularization(RegularizationCoefficients::new(0.5, 1.0, 2.0));
    let net = build_conv_network(&[4, 4, 1], &[ConvSpec::conv(3, 3, 2)], &[3], &opts).unwrap();
    assert_eq!(net.ledger().len(), 2);
    // conv: 0.5 * (1 + 2 * 1), dense head: 0.5 * 1
    assert!((net.regularization_loss().unwrap() - 2.0).abs() < 1e-6);
}

#[test]
fn frozen_weights_only_move_scores() {
    let opts = options(5).trainable(false, true);
    let mut net = build_dense_network(&[4, 6, 3], &opts).unwrap();
    let (weights, scores) = snapshot(&net);

    let x = Tensor::new((0..8).map(|v| v as f32 * 0.25 - 1.0).collect(), vec![2, 4]);
    net.train_step(&x, &[0, 2], &mut SGD::new(0.1, 0.0)).unwrap();

    let layers = net.masked_layers();
    for (i, layer) in layers.iter().enumerate() {
        assert_eq!(layer.weight().unwrap(), &weights[i]);
    }
    assert!(layers.iter().zip(&scores).any(|(l, s)| l.score().unwrap() != s));
}

#[test]
fn frozen_scores_only_move_weights() {
    let opts = options(5).trainable(true, false);
    let mut net = build_dense_network(&[4, 6, 3], &opts).unwrap();
    let (weights, scores) = snapshot(&net);

    let x = Tensor::new((0..8).map(|v| v as f32 * 0.25 - 1.0).collect(), vec![2, 4]);
    net.train_step(&x, &[1, 0], &mut SGD::new(0.1, 0.0)).unwrap();

    let layers = net.masked_layers();
    for (i, layer) in layers.iter().enumerate() {
        assert_eq!(layer.score().unwrap(), &scores[i]);
    }
    assert!(layers.iter().zip(&weights).any(|(l, w)| l.weight().unwrap() != w));
}

#[test]
fn training_reduces_the_data_loss() {
    let mut net = build_dense_network(&[2, 8, 2], &options(11)).unwrap();
    let x = Tensor::new(vec![1.0, 0.0, 0.0, 1.0, 0.9, 0.1, 0.1, 0.9], vec![4, 2]);
    let targets = [0, 1, 0, 1];
    let mut sgd = SGD::new(0.2, 0.0);
    let first = net.train_step(&x, &targets, &mut sgd).unwrap();
    let mut last = first;
    for _ in 0..50 {
        last = net.train_step(&x, &targets, &mut sgd).unwrap();
    }
    assert!(last.data_loss < first.data_loss);
    assert_eq!(last.regularization_loss, 0.0);
}

#[test]
fn set_weight_through_the_network() {
    let mut net = build_dense_network(&[3, 2], &options(2)).unwrap();
    let layer = net.masked_layer_mut(0).unwrap();
    layer.set_weight(Tensor::full(vec![3, 2], 0.25)).unwrap();
    assert!(layer.set_weight(Tensor::zeros(vec![2, 3])).is_err());
    assert_eq!(net.masked_layers()[0].weight().unwrap().data, vec![0.25; 6]);
}

#[test]
fn prune_summary_counts_every_masked_weight() {
    let net = build_dense_network(&[10, 20, 2], &options(42)).unwrap();
    let stats = net.prune_summary().unwrap();
    assert_eq!(stats.total, 10 * 20 + 20 * 2);
    assert_eq!(stats.nonzero, stats.total);
}

#[test]
fn names_encode_architecture_and_seed() {
    let net = build_dense_network(&[10, 20, 2], &options(42)).unwrap();
    let name = net.name();
    assert!(name.starts_with("FC10_20_2_ID"), "{name}");
    assert!(name.ends_with("_S42"), "{name}");
    let id = &name["FC10_20_2_ID".len()..name.len() - "_S42".len()];
    assert_eq!(id.len(), 7);
    assert!(id.chars().all(|c| c.is_ascii_hexdigit()));

    let arch = [ConvSpec::conv(3, 3, 4), ConvSpec::Pool];
    let cnn = build_conv_network(&[8, 8, 1], &arch, &[5], &options(9)).unwrap();
    assert!(cnn.name().starts_with("CNN3x3x4_P_FC5_ID"), "{}", cnn.name());
}

#[test]
fn unknown_tags_are_configuration_errors() {
    assert!(matches!(
        MaskedLayerOptions::from_tags("relu", 1, "xavier", "mask"),
        Err(MaskError::UnknownTag { kind: "initializer", .. })
    ));
    assert!(matches!(
        MaskedLayerOptions::from_tags("swish", 1, "he", "mask"),
        Err(MaskError::UnknownTag { kind: "activation", .. })
    ));
}

#[test]
fn adam_respects_frozen_weights() {
    let opts = options(8).trainable(false, true);
    let mut net = build_dense_network(&[4, 6, 3], &opts).unwrap();
    let (weights, scores) = snapshot(&net);

    let x = Tensor::new((0..8).map(|v| v as f32 * 0.25 - 1.0).collect(), vec![2, 4]);
    let mut adam = Adam::default();
    net.train_step(&x, &[2, 1], &mut adam).unwrap();

    let layers = net.masked_layers();
    for (i, layer) in layers.iter().enumerate() {
        assert_eq!(layer.weight().unwrap(), &weights[i]);
    }
    assert!(layers.iter().zip(&scores).any(|(l, s)| l.score().unwrap() != s));
}

#[test]
fn adam_respects_frozen_scores() {
    let opts = options(8).trainable(true, false);
    let mut net = build_dense_network(&[4, 6, 3], &opts).unwrap();
    let (weights, scores) = snapshot(&net);

    let x = Tensor::new((0..8).map(|v| v as f32 * 0.25 - 1.0).collect(), vec![2, 4]);
    let mut adam = Adam::default();
    net.train_step(&x, &[0, 1], &mut adam).unwrap();

    let layers = net.masked_layers();
    for (i, layer) in layers.iter().enumerate() {
        assert_eq!(layer.score().unwrap(), &scores[i]);
    }
    assert!(layers.iter().zip(&weights).any(|(l, w)| l.weight().unwrap() != w));
}

#[test]
fn train_step_rejects_out_of_range_target() {
    let mut net = build_dense_network(&[2, 2], &options(4)).unwrap();
    let x = Tensor::new(vec![0.5, -0.5, 1.0, 0.25], vec![2, 2]);
    let err = net.train_step(&x, &[0, 3], &mut SGD::new(0.1, 0.0)).unwrap_err();
    assert_eq!(
        err,
        MaskError::InvalidTarget {
            row: 1,
            target: 3,
            classes: 2
        }
    );
    // the failed step leaves the network usable
    assert!(net.train_step(&x, &[0, 1], &mut SGD::new(0.1, 0.0)).is_ok());
}

#[test]
fn train_step_needs_a_target_per_row() {
    let mut net = build_dense_network(&[2, 2], &options(4)).unwrap();
    let before = net.masked_layers()[0].weight().unwrap().clone();
    let x = Tensor::new(vec![0.5, -0.5, 1.0, 0.25], vec![2, 2]);
    let err = net.train_step(&x, &[0], &mut SGD::new(0.1, 0.0)).unwrap_err();
    assert!(matches!(err, MaskError::ShapeMismatch { .. }));
    assert_eq!(net.masked_layers()[0].weight().unwrap(), &before);
}

#[test]
fn describe_lists_every_layer() {
    let arch = [ConvSpec::conv(3, 3, 4), ConvSpec::Pool];
    let net = build_conv_network(&[8, 8, 1], &arch, &[6, 3], &options(5)).unwrap();
    let text = net.describe();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), net.len() + 1);
    assert!(lines[0].starts_with(net.name()));
    assert!(lines[1].contains("masked conv 3x3 -> 4"));
    assert!(lines.iter().any(|l| l.trim_start().starts_with("flatten")));
}
