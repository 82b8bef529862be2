//! Integration tests for the seeded dataset split.

use std::path::Path;

use obbkit::split::{split_dataset, SplitOptions, DEFAULT_OUTPUT_NAME};
use obbkit::ObbkitError;

mod common;
use common::{file_names, read_text, write_bytes, write_text};

fn create_flat_sources(base: &Path, count: usize) {
    for i in 0..count {
        write_bytes(&base.join(format!("imgs_com_box/moto_{i:02}.jpg")), b"jpeg bytes");
        write_text(
            &base.join(format!("box_motos/moto_{i:02}.txt")),
            &format!("0 0.5 0.5 0.2 0.1 0.{i}\n"),
        );
    }
}

fn options(base: &Path) -> SplitOptions {
    SplitOptions {
        base_dir: base.to_path_buf(),
        ..Default::default()
    }
}

#[test]
fn splits_into_default_output_with_floor_counts() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let base = temp.path();
    create_flat_sources(base, 10);
    write_text(&base.join("box_motos/orphan.txt"), "0 0.5 0.5 0.2 0.1\n");
    write_bytes(&base.join("imgs_com_box/lonely.png"), b"png bytes");

    let report = split_dataset(&options(base)).expect("split");
    let out = base.join(DEFAULT_OUTPUT_NAME);
    assert_eq!(report.output_dir, out);
    assert_eq!(report.counts, [7, 2, 1]);
    assert_eq!(report.labels_without_image, vec!["orphan"]);
    assert_eq!(report.images_without_label, vec!["lonely"]);

    for (split, count) in [("train", 7), ("val", 2), ("test", 1)] {
        let images = file_names(&out.join("images").join(split));
        let labels = file_names(&out.join("labels").join(split));
        assert_eq!(images.len(), count, "{split} images");
        let image_stems: Vec<&str> = images.iter().map(|n| n.trim_end_matches(".jpg")).collect();
        let label_stems: Vec<&str> = labels.iter().map(|n| n.trim_end_matches(".txt")).collect();
        assert_eq!(image_stems, label_stems, "{split} pairs");
    }

    let text = report.to_string();
    assert!(text.contains("train: copied 7 pairs."));
    assert!(text.contains("test: copied 1 pairs."));
    assert!(text.contains("Finished. Output dataset at"));
}

#[test]
fn copies_preserve_label_contents() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let base = temp.path();
    create_flat_sources(base, 3);

    split_dataset(&options(base)).expect("split");
    let out = base.join(DEFAULT_OUTPUT_NAME);
    let mut found = 0;
    for split in ["train", "val", "test"] {
        for name in file_names(&out.join("labels").join(split)) {
            let source = read_text(&base.join("box_motos").join(&name));
            assert_eq!(read_text(&out.join("labels").join(split).join(&name)), source);
            found += 1;
        }
    }
    assert_eq!(found, 3);
}

#[test]
fn same_seed_reproduces_assignment() {
    let first = tempfile::tempdir().expect("create temp dir");
    let second = tempfile::tempdir().expect("create temp dir");
    create_flat_sources(first.path(), 12);
    create_flat_sources(second.path(), 12);

    split_dataset(&options(first.path())).expect("split first");
    split_dataset(&options(second.path())).expect("split second");

    for split in ["train", "val", "test"] {
        let dir = |base: &Path| base.join(DEFAULT_OUTPUT_NAME).join("images").join(split);
        assert_eq!(file_names(&dir(first.path())), file_names(&dir(second.path())));
    }
}

#[test]
fn explicit_dirs_and_output_and_nested_sources() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let root = temp.path();
    write_bytes(&root.join("pics/a/one.jpeg"), b"x");
    write_bytes(&root.join("pics/b/two.jpg"), b"x");
    write_text(&root.join("anns/one.txt"), "0 0.5 0.5 0.1 0.1\n");
    write_text(&root.join("anns/deep/two.txt"), "0 0.5 0.5 0.1 0.1\n");

    let opts = SplitOptions {
        base_dir: root.join("unused"),
        output_dir: Some(root.join("out")),
        image_dir: Some(root.join("pics")),
        label_dir: Some(root.join("anns")),
        ratios: vec![1.0, 0.0, 0.0],
        seed: 3,
    };
    let report = split_dataset(&opts).expect("split");
    assert_eq!(report.counts, [2, 0, 0]);
    assert_eq!(
        file_names(&root.join("out/images/train")),
        vec!["one.jpeg", "two.jpg"]
    );
    assert!(root.join("out/images/test").is_dir());
}

#[test]
fn bad_ratios_fail_before_touching_disk() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let base = temp.path();
    create_flat_sources(base, 4);

    let opts = SplitOptions {
        ratios: vec![0.5, 0.3, 0.3],
        ..options(base)
    };
    let err = split_dataset(&opts).unwrap_err();
    assert!(matches!(err, ObbkitError::InvalidSplitRatios { .. }));
    assert!(!base.join(DEFAULT_OUTPUT_NAME).exists());
}

#[test]
fn no_pairs_is_an_error() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let base = temp.path();
    write_bytes(&base.join("images/a.jpg"), b"x");
    write_text(&base.join("labels/b.txt"), "0 0.5 0.5 0.1 0.1\n");

    let err = split_dataset(&options(base)).unwrap_err();
    assert!(matches!(err, ObbkitError::NoPairsFound { .. }));
}
