use masknet::init;
use masknet::{MaskError, MaskFunction, Tensor};

fn scores(shape: Vec<usize>, seed: u64) -> Tensor {
    // spread scores across zero so every branch of every function is hit
    let t = init::random_uniform(&shape, -1.0, 1.0, seed);
    t.map(|v| if v.abs() < 0.05 { 0.0 } else { v })
}

#[test]
fn every_mask_function_preserves_shape() {
    let shapes = [vec![7], vec![4, 5], vec![3, 3, 2, 4]];
    for m in MaskFunction::ALL {
        for shape in &shapes {
            let s = scores(shape.clone(), 1);
            assert_eq!(m.apply(&s).shape, s.shape, "{m} changed the shape");
        }
    }
}

#[test]
fn every_mask_function_stays_in_its_range() {
    let s = scores(vec![3, 3, 4, 8], 2);
    for m in MaskFunction::ALL {
        let mask = m.apply(&s);
        for &v in &mask.data {
            assert!(m.admissible(v), "{m} produced {v}");
        }
    }
}

#[test]
fn binary_and_ternary_ranges() {
    let s = scores(vec![64], 3);
    assert!(MaskFunction::Binary
        .apply(&s)
        .data
        .iter()
        .all(|&v| v == 0.0 || v == 1.0));
    assert!(MaskFunction::Ternary
        .apply(&s)
        .data
        .iter()
        .all(|&v| v == -1.0 || v == 0.0 || v == 1.0));
}

#[test]
fn mask_functions_are_deterministic() {
    let s = scores(vec![10, 10], 4);
    for m in MaskFunction::ALL {
        assert_eq!(m.apply(&s), m.apply(&s.clone()));
    }
}

#[test]
fn initial_scores_open_every_gate() {
    // scores start in [0.01, 0.1], so the plain gate keeps everything
    let s = init::score(&[6, 6], 9);
    let mask = MaskFunction::Mask.apply(&s);
    assert_eq!(mask.count_nonzero(), 36);
}

#[test]
fn surrogate_gradients_preserve_shape() {
    let s = scores(vec![5, 4], 5);
    let upstream = Tensor::full(vec![5, 4], 1.0);
    for m in MaskFunction::ALL {
        assert_eq!(m.backward(&s, &upstream).shape, vec![5, 4]);
    }
}

#[test]
fn unknown_tag_is_a_configuration_error() {
    let err = "topk".parse::<MaskFunction>().unwrap_err();
    assert_eq!(
        err,
        MaskError::UnknownTag {
            kind: "mask function",
            tag: "topk".to_string()
        }
    );
}
