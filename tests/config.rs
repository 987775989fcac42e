use masknet::config::{ArchitectureConfig, EngineConfig, ExperimentConfig};
use masknet::runtime;
use masknet::{ConvSpec, Initializer, MaskError, MaskFunction, MaskedLayer};
use std::fs;

const DENSE: &str = r#"
[engine]
log_level = "debug"

[architecture]
kind = "dense"
widths = [10, 20, 2]

[network]
activation = "relu"
seed = 42
initializer = "heconstant"
mask_function = "mask_rs"
p1 = 1.0

[network.regularization]
alpha = 0.01
"#;

const CONV: &str = r#"
[architecture]
kind = "conv"
input_shape = [8, 8, 1]
conv = [{ conv = { kernel = [3, 3], filters = 4 } }, "pool"]
dense = [16, 3]

[network]
activation = "relu"
seed = 7
initializer = "glorot"
mask_function = "ternary"
train_weight = false
"#;

#[test]
fn dense_experiment_parses_from_toml() {
    let cfg = ExperimentConfig::from_toml_str(DENSE).unwrap();
    assert_eq!(cfg.engine.log_level, "debug");
    assert_eq!(cfg.engine.log_style, "auto");
    assert_eq!(
        cfg.architecture,
        ArchitectureConfig::Dense {
            widths: vec![10, 20, 2]
        }
    );
    assert_eq!(cfg.network.initializer, Initializer::Heconstant);
    assert_eq!(cfg.network.mask_function, MaskFunction::MaskRs);
    assert!(cfg.network.train_weight && cfg.network.train_score);
    assert_eq!(cfg.network.regularization.alpha, 0.01);
    assert_eq!(cfg.network.regularization.beta, 0.0);
}

#[test]
fn conv_experiment_parses_and_builds() {
    let cfg = ExperimentConfig::from_toml_str(CONV).unwrap();
    assert_eq!(cfg.engine, EngineConfig::default());
    match &cfg.architecture {
        ArchitectureConfig::Conv { conv, .. } => {
            assert_eq!(conv, &vec![ConvSpec::conv(3, 3, 4), ConvSpec::Pool]);
        }
        other => panic!("unexpected architecture {other:?}"),
    }
    assert!(!cfg.network.train_weight);

    let net = runtime::build_experiment(&cfg).unwrap();
    let shapes: Vec<Vec<usize>> = net
        .masked_layers()
        .iter()
        .map(|l| l.kernel_shape().unwrap().to_vec())
        .collect();
    assert_eq!(shapes, vec![vec![3, 3, 1, 4], vec![64, 16], vec![16, 3]]);
    assert!(net.ledger().is_empty());
}

#[test]
fn unknown_mask_tag_is_rejected() {
    let bad = DENSE.replace("mask_rs", "top_k");
    assert_eq!(
        ExperimentConfig::from_toml_str(&bad).unwrap_err(),
        MaskError::UnknownTag {
            kind: "mask function",
            tag: "top_k".to_string()
        }
    );
}

#[test]
fn unknown_initializer_tag_is_rejected() {
    let bad = DENSE.replace("heconstant", "xavier");
    assert!(matches!(
        ExperimentConfig::from_toml_str(&bad),
        Err(MaskError::UnknownTag {
            kind: "initializer",
            ..
        })
    ));
}

#[test]
fn activation_alias_is_accepted() {
    let cfg = ExperimentConfig::from_toml_str(&DENSE.replace("\"relu\"", "\"identity\"")).unwrap();
    assert_eq!(cfg.network.activation, masknet::Activation::Linear);
}

#[test]
fn malformed_toml_is_a_config_error() {
    assert!(matches!(
        ExperimentConfig::from_toml_str("[architecture"),
        Err(MaskError::Config { .. })
    ));
}

#[test]
fn experiment_loads_from_json_file() {
    let path = std::env::temp_dir().join(format!("masknet-config-{}.json", std::process::id()));
    fs::write(
        &path,
        r#"{
            "architecture": { "kind": "dense", "widths": [4, 2] },
            "network": {
                "activation": "sigmoid",
                "seed": 3,
                "initializer": "ones",
                "mask_function": "flip"
            }
        }"#,
    )
    .unwrap();
    let cfg = ExperimentConfig::from_path(path.to_str().unwrap()).unwrap();
    fs::remove_file(&path).unwrap();

    let net = runtime::build_experiment(&cfg).unwrap();
    assert_eq!(net.len(), 1);
    assert_eq!(net.masked_layers()[0].weight().unwrap().data, vec![1.0; 8]);
}

#[test]
fn missing_file_is_a_config_error() {
    let err = ExperimentConfig::from_path("/nonexistent/masknet.toml").unwrap_err();
    assert!(matches!(
        err,
        MaskError::Config { ref path, .. } if path == "/nonexistent/masknet.toml"
    ));
}
