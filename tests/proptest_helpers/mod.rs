#![allow(dead_code)]

use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

pub const EPS_GEOMETRY: f64 = 1e-9;

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

/// `(cx, cy, w, h)` of a box with positive, non-degenerate size.
pub fn arb_box() -> impl Strategy<Value = (f64, f64, f64, f64)> {
    (0.05f64..0.95, 0.05f64..0.95, 0.01f64..0.5, 0.01f64..0.5)
}

/// Angles strictly inside `(-pi, pi)` so the recovered angle needs no wrap.
pub fn arb_angle() -> impl Strategy<Value = f64> {
    -3.1f64..3.1
}

/// Box values written with at most four decimals, like real label files.
pub fn arb_decimal_token() -> impl Strategy<Value = String> {
    (1u32..10_000).prop_map(|v| format!("0.{v:04}"))
}

pub fn arb_ratios() -> impl Strategy<Value = [f64; 3]> {
    (0u32..=10, 0u32..=10).prop_filter_map("ratios must sum to at most 10", |(a, b)| {
        (a + b <= 10).then(|| [a as f64 / 10.0, b as f64 / 10.0, (10 - a - b) as f64 / 10.0])
    })
}
