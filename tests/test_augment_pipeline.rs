//! End-to-end tests for the augmentation pipeline.
//!
//! These drive `Augmentor` through its public API with small synthetic
//! stacks and check the guarantees callers rely on: label/image alignment,
//! label values never blended, reproducibility under a fixed seed and
//! configuration errors surfacing before any work is done.

use std::collections::BTreeSet;

use ndarray::Array4;
use serde_json::{json, Value};
use volaug::{Augmented, Augmentor, Error, FillPolicy, StageKind};

/// Ramp image whose voxels are all distinct.
fn ramp(shape: (usize, usize, usize, usize)) -> Array4<f32> {
    Array4::from_shape_fn(shape, |(z, y, x, c)| {
        (((z * shape.1 + y) * shape.2 + x) * shape.3 + c) as f32
    })
}

/// Labels split into two classes at the middle row.
fn two_class(shape: (usize, usize, usize, usize)) -> Array4<i64> {
    Array4::from_shape_fn(shape, |(_, y, _, _)| i64::from(y >= shape.1 / 2))
}

/// Labels with three classes in vertical bands.
fn three_class(shape: (usize, usize, usize, usize)) -> Array4<i64> {
    Array4::from_shape_fn(shape, |(_, _, x, _)| (3 * x / shape.2) as i64)
}

fn values(labels: &Array4<i64>) -> BTreeSet<i64> {
    labels.iter().copied().collect()
}

fn augmentor(raw: Value, seed: u64) -> Augmentor {
    Augmentor::from_value(&raw).unwrap().with_seed(seed)
}

fn geometric_config() -> Value {
    json!({
        "elastic_warp": { "enabled": true, "n": 4, "sigma": 3.0 },
        "flip": true,
        "rotate": { "enabled": true, "max_angle": 30.0 },
        "rotate90": true,
        "misalign": { "enabled": true, "prob": 1.0, "delta": 2, "type": "translation" },
        "rescale": { "enabled": true, "min": 0.75, "max": 1.25, "per_axis": true },
    })
}

#[test]
fn test_all_disabled_returns_copy_of_input() {
    let img = ramp((4, 16, 16, 2));
    let labels = two_class((4, 16, 16, 2));
    let raw = json!({
        "flip": false,
        "rotate90": { "enabled": false },
        "noise": { "sigma": 0.5 },
    });

    let (out, out_labels) = augmentor(raw, 0)
        .augment(img.view(), &[labels.view()])
        .unwrap()
        .into_parts();
    assert_eq!(out, img);
    assert_eq!(out_labels, vec![labels]);
}

#[test]
fn test_labels_stay_aligned_through_geometric_stages() {
    let shape = (4, 32, 32, 1);
    let img = ramp(shape);
    let labels = vec![two_class(shape), three_class(shape)];
    let views: Vec<_> = labels.iter().map(|l| l.view()).collect();

    for seed in 0..8 {
        let result = augmentor(geometric_config(), seed)
            .augment(img.view(), &views)
            .unwrap();
        let (zi, yi, xi, ci) = result.image().dim();
        assert_eq!(zi, 4);
        assert_eq!(ci, 1);
        for label in result.labels() {
            let (zl, yl, xl, _) = label.dim();
            assert_eq!((zl, yl, xl), (zi, yi, xi), "seed {}", seed);
        }
    }
}

#[test]
fn test_labels_gain_no_new_values() {
    let shape = (4, 32, 32, 1);
    let img = ramp(shape);
    let labels = three_class(shape);
    let allowed = values(&labels);

    for seed in 0..8 {
        let result = augmentor(geometric_config(), seed)
            .augment(img.view(), &[labels.view()])
            .unwrap();
        let seen = values(&result.labels()[0]);
        assert!(seen.is_subset(&allowed), "seed {}: {:?}", seed, seen);
    }
}

#[test]
fn test_fixed_seed_is_reproducible() {
    let shape = (4, 24, 24, 1);
    let img = ramp(shape);
    let labels = two_class(shape);
    let mut raw = geometric_config();
    raw["noise"] = json!({ "enabled": true, "sigma": 0.1 });
    raw["box"] = json!({ "enabled": true, "n": 2, "r": 2, "z": 2, "fill": -1.0 });

    let first = augmentor(raw.clone(), 1234)
        .augment(img.view(), &[labels.view()])
        .unwrap();
    let second = augmentor(raw, 1234)
        .augment(img.view(), &[labels.view()])
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_shared_augmentor_across_threads() {
    let shape = (4, 16, 16, 1);
    let img = ramp(shape);
    let aug = augmentor(geometric_config(), 99);
    let expected = aug.augment_image(img.view()).unwrap();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| aug.augment_image(img.view()).unwrap()))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}

#[test]
fn test_constant_fill_marks_image_and_labels_together() {
    let shape = (2, 24, 24, 1);
    let img = Array4::<f32>::ones(shape);
    let labels = Array4::<i64>::ones(shape);
    let raw = json!({ "rotate": { "enabled": true, "max_angle": 45.0 } });

    for seed in 0..6 {
        let aug = augmentor(raw.clone(), seed).with_fill_policy(FillPolicy::Constant(0.0));
        let (out, out_labels) = aug
            .augment(img.view(), &[labels.view()])
            .unwrap()
            .into_parts();
        for (v, l) in out.iter().zip(out_labels[0].iter()) {
            assert_eq!(*v < 0.5, *l == 0);
        }
    }
}

#[test]
fn test_rotate90_permutes_voxels() {
    let shape = (4, 32, 32, 1);
    let img = ramp(shape);
    let labels = two_class(shape);

    for seed in 0..8 {
        let (out, out_labels) = augmentor(json!({ "rotate90": true }), seed)
            .augment(img.view(), &[labels.view()])
            .unwrap()
            .into_parts();
        assert_eq!(out.dim(), shape);
        assert_eq!(out_labels[0].dim(), shape);

        let mut before: Vec<f32> = img.iter().copied().collect();
        let mut after: Vec<f32> = out.iter().copied().collect();
        before.sort_by(f32::total_cmp);
        after.sort_by(f32::total_cmp);
        assert_eq!(before, after);

        assert_eq!(values(&out_labels[0]), BTreeSet::from([0, 1]));
        assert_eq!(out_labels[0].sum(), labels.sum());
    }
}

#[test]
fn test_rotate90_rectangular_swaps_plane() {
    let shape = (2, 8, 12, 1);
    let img = ramp(shape);
    let mut shapes = BTreeSet::new();
    for seed in 0..32 {
        let out = augmentor(json!({ "rotate90": true }), seed)
            .augment_image(img.view())
            .unwrap();
        shapes.insert(out.dim());
    }
    assert_eq!(shapes, BTreeSet::from([(2, 8, 12, 1), (2, 12, 8, 1)]));
}

#[test]
fn test_single_box_zeroes_exact_square() {
    let shape = (4, 32, 32, 1);
    let img = Array4::<f32>::ones(shape);
    let labels = two_class(shape);
    let raw = json!({ "box": { "enabled": true, "n": 1, "r": 3, "z": 1, "fill": 0 } });

    let (out, out_labels) = augmentor(raw, 5)
        .augment(img.view(), &[labels.view()])
        .unwrap()
        .into_parts();
    assert_eq!(out.iter().filter(|&&v| v == 0.0).count(), 49);
    assert_eq!(out_labels[0], labels);
}

#[test]
fn test_elastic_without_impulses_is_identity() {
    let shape = (3, 16, 16, 1);
    let img = ramp(shape);
    let labels = three_class(shape);
    let raw = json!({ "elastic_warp": { "enabled": true, "n": 0, "sigma": 4.0 } });

    let (out, out_labels) = augmentor(raw, 8)
        .augment(img.view(), &[labels.view()])
        .unwrap()
        .into_parts();
    assert_eq!(out, img);
    assert_eq!(out_labels[0], labels);
}

#[test]
fn test_flat_legacy_keys() {
    let raw = json!({
        "elastic_warp": true,
        "elastic_n": 0,
        "elastic_sigma": 2.0,
        "misalign": true,
        "misalign_prob": 0.5,
        "misalign_delta": 3,
        "misalign_type": "slip",
    });
    let aug = Augmentor::from_value(&raw).unwrap();
    assert!(aug.config().is_enabled(StageKind::ElasticWarp));
    assert!(aug.config().is_enabled(StageKind::Misalign));

    let img = ramp((3, 16, 16, 1));
    let out = aug.augment_image(img.view()).unwrap();
    assert_eq!(out.dim(), (3, 10, 10, 1));
}

#[test]
fn test_misalign_label_shift_flag() {
    let shape = (4, 16, 16, 1);
    let img = ramp(shape);
    let labels = three_class(shape);
    let base = |shift: bool| {
        json!({ "misalign": {
            "enabled": true, "prob": 1.0, "delta": 2, "type": "translation", "label_shift": shift,
        }})
    };

    let (_, fixed) = augmentor(base(false), 3)
        .augment(img.view(), &[labels.view()])
        .unwrap()
        .into_parts();
    // Unshifted labels are the centre crop.
    let crop = labels.slice(ndarray::s![.., 2..14, 2..14, ..]).to_owned();
    assert_eq!(fixed[0], crop);

    let (_, shifted) = augmentor(base(true), 3)
        .augment(img.view(), &[labels.view()])
        .unwrap()
        .into_parts();
    assert_eq!(shifted[0].dim(), crop.dim());
    assert!(values(&shifted[0]).is_subset(&values(&labels)));
}

#[test]
fn test_image_only_call_returns_image_variant() {
    let img = ramp((2, 8, 8, 1));
    let result = augmentor(json!({ "flip": true }), 1)
        .augment::<f32, i64>(img.view(), &[])
        .unwrap();
    assert!(matches!(result, Augmented::Image(_)));
}

#[test]
fn test_integer_inputs_are_promoted() {
    let img = Array4::<u8>::from_elem((2, 8, 8, 1), 200);
    let out = Augmentor::default().augment_image(img.view()).unwrap();
    assert!(out.iter().all(|&v| v == 200.0));
}

#[test]
fn test_missing_parameters_rejected() {
    let err = Augmentor::from_value(&json!({ "noise": true })).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(err.to_string().contains("noise"));
}

#[test]
fn test_out_of_domain_parameters_rejected() {
    for raw in [
        json!({ "blur": { "enabled": true, "sigma": 1.0, "prob": 1.5 } }),
        json!({ "rescale": { "enabled": true, "min": 1.2, "max": 0.8 } }),
        json!({ "rotate": { "enabled": true, "max_angle": 270.0 } }),
        json!({ "misalign": { "enabled": true, "prob": 0.5, "delta": 2, "type": "shear" } }),
        json!({ "flip": "yes" }),
        json!([1, 2, 3]),
    ] {
        let err = Augmentor::from_value(&raw).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)), "{}", raw);
    }
}

#[test]
fn test_grey_unimplemented_at_call_time() {
    let aug = Augmentor::from_value(&json!({ "grey": true })).unwrap();
    assert!(aug.config().is_enabled(StageKind::Grey));
    let img = ramp((2, 8, 8, 1));
    let err = aug.augment_image(img.view()).unwrap_err();
    assert!(matches!(err, Error::UnimplementedFeature(_)));
}

#[test]
fn test_label_shape_mismatch_rejected() {
    let img = ramp((2, 8, 8, 1));
    let labels = Array4::<i64>::zeros((2, 8, 9, 1));
    let err = Augmentor::default()
        .augment(img.view(), &[labels.view()])
        .unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { .. }));
}

#[test]
fn test_misalign_delta_too_large() {
    let img = ramp((2, 8, 8, 1));
    let raw = json!({ "misalign": { "enabled": true, "prob": 1.0, "delta": 4, "type": "slip" } });
    let err = augmentor(raw, 0).augment_image(img.view()).unwrap_err();
    assert!(matches!(err, Error::InvalidDimensions(_)));
}

#[test]
fn test_extreme_parameters_return_errors() {
    let img = ramp((2, 16, 16, 1));
    for raw in [
        json!({ "rescale": { "enabled": true, "min": 1e10, "max": 1e10 } }),
        json!({ "misalign": { "enabled": true, "prob": 1.0, "delta": u64::MAX, "type": "slip" } }),
    ] {
        let err = augmentor(raw.clone(), 0).augment_image(img.view()).unwrap_err();
        assert!(matches!(err, Error::InvalidDimensions(_)), "{}", raw);
    }

    // An oversized box is clipped to the slice.
    let raw = json!({ "box": { "enabled": true, "n": 1, "r": u64::MAX, "z": 1, "fill": 0 } });
    let out = augmentor(raw, 0)
        .augment_image(Array4::<f32>::ones((2, 16, 16, 1)).view())
        .unwrap();
    assert_eq!(out.iter().filter(|&&v| v == 0.0).count(), 16 * 16);
}
