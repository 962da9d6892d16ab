use proptest::prelude::*;

use facegate_core::similarity::similarity;

fn pair(len: std::ops::Range<usize>) -> impl Strategy<Value = (Vec<f64>, Vec<f64>)> {
    len.prop_flat_map(|n| {
        (
            prop::collection::vec(-2.0f64..2.0, n),
            prop::collection::vec(-2.0f64..2.0, n),
        )
    })
}

fn variance(v: &[f64]) -> f64 {
    let mean = v.iter().sum::<f64>() / v.len() as f64;
    v.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / v.len() as f64
}

proptest! {
    /// similarity(a, b) == similarity(b, a), bit for bit.
    #[test]
    fn similarity_is_symmetric((a, b) in pair(1..64)) {
        prop_assert_eq!(similarity(&a, &b).to_bits(), similarity(&b, &a).to_bits());
    }

    /// Score always lies in [0, 1] and is never NaN.
    #[test]
    fn similarity_is_bounded((a, b) in pair(1..64)) {
        let s = similarity(&a, &b);
        prop_assert!((0.0..=1.0).contains(&s), "score {}", s);
    }

    /// A non-degenerate vector is maximally similar to itself, at any magnitude.
    #[test]
    fn self_similarity_is_one(
        base in prop::collection::vec(0.0f64..1.0, 2..400),
        exponent in -170i32..=200,
    ) {
        prop_assume!(variance(&base) > 1e-6);
        let scale = 10f64.powi(exponent);
        let a: Vec<f64> = base.iter().map(|x| x * scale).collect();
        let s = similarity(&a, &a);
        prop_assert!((s - 1.0).abs() < 1e-9, "scale 1e{}: score {}", exponent, s);
    }

    /// Zero vectors and constants never produce NaN.
    #[test]
    fn flat_vectors_score_finite(value in -1.0f64..1.0, n in 1usize..32) {
        let flat = vec![value; n];
        prop_assert!(similarity(&flat, &flat).is_finite());
    }
}
