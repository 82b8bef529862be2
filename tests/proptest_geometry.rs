use std::path::PathBuf;

use obbkit::geom::{CornerOrder, OrientedBox};
use obbkit::label::bbox_to_poly::{parse_decimal, polygon_values};
use obbkit::label::normalize::normalize_text;
use obbkit::label::obb_to_poly::{convert_line, ObbToPolyOptions};
use obbkit::split::{assign_splits, Pair};
use proptest::prelude::*;
use rust_decimal::Decimal;

mod proptest_helpers;
use proptest_helpers::{arb_angle, arb_box, arb_decimal_token, arb_ratios, EPS_GEOMETRY};

fn pairs(n: usize) -> Vec<Pair> {
    (0..n)
        .map(|i| Pair {
            stem: format!("{i:04}"),
            image: PathBuf::from(format!("{i:04}.jpg")),
            label: PathBuf::from(format!("{i:04}.txt")),
        })
        .collect()
}

proptest! {
    #![proptest_config(proptest_helpers::proptest_config())]

    #[test]
    fn corners_recover_the_oriented_box(
        (cx, cy, w, h) in arb_box(),
        angle in arb_angle(),
    ) {
        let obb = OrientedBox::new(cx, cy, w, h, angle);
        let restored = OrientedBox::from_corners(&obb.corners());
        prop_assert!((restored.cx - cx).abs() < EPS_GEOMETRY);
        prop_assert!((restored.cy - cy).abs() < EPS_GEOMETRY);
        prop_assert!((restored.w - w).abs() < EPS_GEOMETRY);
        prop_assert!((restored.h - h).abs() < EPS_GEOMETRY);
        prop_assert!((restored.angle - angle).abs() < EPS_GEOMETRY);
    }

    #[test]
    fn converted_line_recovers_the_oriented_box(
        (cx, cy, w, h) in arb_box(),
        angle in arb_angle(),
        interleaved in any::<bool>(),
    ) {
        let order = if interleaved { CornerOrder::Interleaved } else { CornerOrder::Grouped };
        let opts = ObbToPolyOptions { order, ..Default::default() };
        let tokens = ["0".to_string(), cx.to_string(), cy.to_string(), w.to_string(), h.to_string(), angle.to_string()];
        let parts: Vec<&str> = tokens.iter().map(String::as_str).collect();

        let line = convert_line(&parts, &opts).expect("convert line");
        let values: Vec<f64> = line
            .split_whitespace()
            .skip(1)
            .map(|v| v.parse().expect("numeric output"))
            .collect();
        prop_assert_eq!(values.len(), 8);

        let flat: [f64; 8] = values.try_into().expect("eight values");
        let restored = OrientedBox::from_corners(&order.unflatten(&flat));
        prop_assert!((restored.cx - cx).abs() < EPS_GEOMETRY);
        prop_assert!((restored.w - w).abs() < EPS_GEOMETRY);
        prop_assert!((restored.h - h).abs() < EPS_GEOMETRY);
        prop_assert!((restored.angle - angle).abs() < 1e-6);
    }

    #[test]
    fn decimal_polygon_recovers_the_box_exactly(
        cx in arb_decimal_token(),
        cy in arb_decimal_token(),
        w in arb_decimal_token(),
        h in arb_decimal_token(),
    ) {
        let [cx, cy, w, h] = [cx, cy, w, h].map(|t| parse_decimal(&t).expect("decimal token"));
        let v = polygon_values(cx, cy, w, h).expect("no overflow");
        prop_assert_eq!((v[0] + v[1]) / Decimal::TWO, cx);
        prop_assert_eq!((v[4] + v[6]) / Decimal::TWO, cy);
        prop_assert_eq!(v[1] - v[0], w);
        prop_assert_eq!(v[6] - v[4], h);
        prop_assert_eq!(v[0], v[3]);
        prop_assert_eq!(v[1], v[2]);

        // Four-decimal inputs keep four decimals unless halving an odd
        // last digit needs a fifth.
        let written_scale = |size: Decimal| if size.mantissa() % 2 == 0 { 4 } else { 5 };
        for x in &v[..4] {
            prop_assert_eq!(x.scale(), written_scale(w));
        }
        for y in &v[4..] {
            prop_assert_eq!(y.scale(), written_scale(h));
        }
    }

    #[test]
    fn normalization_is_idempotent(
        classes in proptest::collection::vec(0u8..5, 0..6),
        trailing in any::<bool>(),
    ) {
        let mut text = classes
            .iter()
            .map(|c| format!("{c} 0.5 0.5 0.2 0.1 1.57"))
            .collect::<Vec<_>>()
            .join("\n");
        if trailing {
            text.push('\n');
        }
        let once = normalize_text(&text, "0").unwrap_or(text);
        prop_assert_eq!(normalize_text(&once, "0"), None);
    }

    #[test]
    fn splits_partition_pairs_at_floor_boundaries(
        n in 0usize..60,
        ratios in arb_ratios(),
        seed in any::<u64>(),
    ) {
        let input = pairs(n);
        let [train, val, test] = assign_splits(input.clone(), &ratios, seed);

        let floor = |r: f64| ((n as f64) * r).floor() as usize;
        prop_assert_eq!(train.len(), floor(ratios[0]));
        prop_assert_eq!(val.len(), floor(ratios[1]));
        prop_assert_eq!(train.len() + val.len() + test.len(), n);

        let mut all: Vec<Pair> = train.into_iter().chain(val).chain(test).collect();
        all.sort();
        prop_assert_eq!(all, input);
    }

    #[test]
    fn same_seed_gives_same_assignment(n in 0usize..40, seed in any::<u64>()) {
        let ratios = [0.7, 0.2, 0.1];
        prop_assert_eq!(
            assign_splits(pairs(n), &ratios, seed),
            assign_splits(pairs(n), &ratios, seed)
        );
    }
}
