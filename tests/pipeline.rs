use std::path::Path;

use blood_spectra::data::loader;
use blood_spectra::{Config, Label, SpectraError, build_dataset, run};
use image::{GrayImage, Luma};

/// Ten frames per class; `pattern(frame, column)` gives the pixel value.
fn write_class(dir: &Path, width: u32, pattern: impl Fn(u32, u32) -> u8) {
    std::fs::create_dir_all(dir).unwrap();
    for frame in 0..10 {
        let img = GrayImage::from_fn(width, 6, |col, row| {
            Luma([pattern(frame, col).saturating_add((row % 2) as u8)])
        });
        img.save(dir.join(format!("img_{frame:02}.png"))).unwrap();
    }
}

fn write_config(root: &Path) -> std::path::PathBuf {
    let path = root.join("config.json");
    std::fs::write(
        &path,
        r#"{
            "class_a": { "name": "RBC", "folder": "rbc", "label": 1 },
            "class_b": { "name": "WBC", "folder": "wbc", "label": 0 },
            "gain": 5
        }"#,
    )
    .unwrap();
    path
}

#[test]
fn separable_folders_end_to_end() {
    let root = tempfile::tempdir().unwrap();
    write_class(&root.path().join("rbc"), 8, |frame, col| {
        if col < 4 { 40 + frame as u8 } else { 5 }
    });
    write_class(&root.path().join("wbc"), 8, |frame, col| {
        if col < 4 { 5 } else { 40 + frame as u8 }
    });
    let config = Config::from_file(&write_config(root.path())).unwrap();

    let (dataset, report) = run(&config).unwrap();

    assert_eq!(dataset.len(), 20);
    assert_eq!(dataset.n_columns(), 9);
    assert_eq!(dataset.labels()[..10], [Label::Positive; 10]);
    assert_eq!(dataset.labels()[10..], [Label::Negative; 10]);
    // rows alternate +0/+1 -> mean +0.5, gain 5: (40 + 0.5) * 5 = 202.5 -> 202
    assert_eq!(dataset.records()[0].spectrum.values[0], 202.0);

    assert_eq!(report.classification.accuracy, 1.0);
    assert_eq!(report.classification.confusion.total(), report.classification.n_test);
    assert_eq!(report.cluster_agreement.unwrap().agreement, 1.0);
    assert_eq!(report.scree.len(), 8);
    let ratios: Vec<f64> = report.scree.iter().map(|e| e.variance_ratio).collect();
    assert!(ratios.windows(2).all(|w| w[0] >= w[1]));
    assert!(ratios.iter().sum::<f64>() <= 1.0 + 1e-9);

    let table = root.path().join("dataset.csv");
    loader::save_file(&dataset, &table).unwrap();
    let reloaded = loader::load_file(&table).unwrap();
    assert_eq!(reloaded.labels(), dataset.labels());
    assert_eq!(reloaded.features(), dataset.features());
}

#[test]
fn identical_folders_score_chance() {
    let root = tempfile::tempdir().unwrap();
    let same = |_frame: u32, col: u32| (col * 7 % 50) as u8;
    write_class(&root.path().join("rbc"), 6, same);
    write_class(&root.path().join("wbc"), 6, same);
    let config = Config::from_file(&write_config(root.path())).unwrap();

    let (_, report) = run(&config).unwrap();

    assert!((report.classification.accuracy - 0.5).abs() < 1e-12);
    assert!((report.cluster_agreement.unwrap().agreement - 0.5).abs() < 1e-12);
}

#[test]
fn width_mismatch_between_folders() {
    let root = tempfile::tempdir().unwrap();
    write_class(&root.path().join("rbc"), 8, |_, _| 10);
    write_class(&root.path().join("wbc"), 7, |_, _| 10);
    let config = Config::from_file(&write_config(root.path())).unwrap();

    let err = build_dataset(&config).unwrap_err();
    assert!(matches!(
        err,
        SpectraError::WidthMismatch {
            expected: 8,
            actual: 7
        }
    ));
}

#[test]
fn unreadable_image_aborts_run() {
    let root = tempfile::tempdir().unwrap();
    write_class(&root.path().join("rbc"), 8, |_, _| 10);
    write_class(&root.path().join("wbc"), 8, |_, _| 20);
    std::fs::write(root.path().join("wbc").join("img_05.png"), b"truncated").unwrap();
    let config = Config::from_file(&write_config(root.path())).unwrap();

    assert!(matches!(
        build_dataset(&config),
        Err(SpectraError::Decode { .. })
    ));
}
