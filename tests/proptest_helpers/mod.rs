#![allow(dead_code)]

use orilabel::geometry::{Point, RotatedBox};
use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

pub const EPS_GEOMETRY: f64 = 1e-6;

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

/// A well-formed box: comfortably inside a 4096px canvas, sides large enough
/// that float noise cannot push them near degeneracy, any angle.
pub fn arb_box() -> impl Strategy<Value = RotatedBox> {
    (
        100.0..4000.0f64,
        100.0..4000.0f64,
        4.0..500.0f64,
        4.0..500.0f64,
        -10.0..10.0f64,
    )
        .prop_map(|(cx, cy, w, h, theta)| RotatedBox::new(cx, cy, w, h, theta))
}

/// Two boxes guaranteed disjoint: their center distance exceeds the sum of
/// their half-diagonals.
pub fn arb_disjoint_boxes() -> impl Strategy<Value = (RotatedBox, RotatedBox)> {
    (arb_box(), arb_box()).prop_map(|(a, b)| {
        let reach_a = (a.w.hypot(a.h)) / 2.0;
        let reach_b = (b.w.hypot(b.h)) / 2.0;
        let shift = reach_a + reach_b + 1.0;
        let b = RotatedBox::new(a.cx + shift, a.cy, b.w, b.h, b.theta);
        (a, b)
    })
}

pub fn arb_point() -> impl Strategy<Value = Point> {
    (0.0..4096.0f64, 0.0..4096.0f64).prop_map(|(x, y)| Point::new(x, y))
}
