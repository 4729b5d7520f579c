use anyhow::Result;
use expansion::{rasterize, ExpansionBand, RasterShape};
use expression::{FillPolicy, KeyFilter, RegionKind, RowKey, Transform};
use ndarray::{stack, Array2, Array3, Axis};
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use parameters_toml::Parameters;
use pretty_assertions::assert_eq;
use roi::contour::write_geojson_collection;
use roi::Contour;
use std::fs::File;
use std::path::Path;
use tempfile::tempdir;
use vessel_quant::{run, Manifest};

const SHAPE: RasterShape = RasterShape {
    nrows: 60,
    ncols: 60,
};

/// SMA is 1.0 inside `positive` and 0.0 elsewhere, CD31 is 2.0 everywhere.
fn write_image(dir: &Path, id: &str, contours: &[Contour], positive: &Contour) -> Result<()> {
    write_geojson_collection(contours, &dir.join(format!("{id}.geojson")))?;
    let sma = rasterize(positive, SHAPE)
        .to_dense()
        .mapv(|v| if v { 1.0f32 } else { 0.0 });
    let cd31 = Array2::from_elem(SHAPE.dim(), 2.0f32);
    let values: Array3<f32> = stack![Axis(0), sma, cd31];
    values.write_npy(File::create(dir.join(format!("{id}.npy")))?)?;
    Ok(())
}

fn params() -> Result<Parameters> {
    Parameters::from_toml_str(
        r#"
        [expansion]
        pixel_interval = 5
        n_bands = 3
        max_background_band = 2

        [aggregation]
        size_threshold = 50

        [normalization]
        transform = "none"
        "#,
    )
}

#[test]
fn test_run_manifest() -> Result<()> {
    let dir = tempdir()?;
    let circle_a = Contour::regular_polygon((20.0, 30.0), 5.0, 64);
    let circle_b = Contour::regular_polygon((40.0, 30.0), 5.0, 64);
    let sliver = Contour::from_points([(1.0, 1.0), (2.0, 2.0), (3.0, 3.0), (1.0, 1.0)]);
    write_image(dir.path(), "p1", &[circle_a.clone(), circle_b.clone()], &circle_a)?;
    write_image(dir.path(), "p2", &[sliver, circle_b.clone()], &circle_a)?;
    write_image(dir.path(), "p3", &[circle_a.clone()], &circle_a)?;

    let manifest_path = dir.path().join("manifest.json");
    std::fs::write(
        &manifest_path,
        r#"{"images": [
            {"id": "p2", "contours": "p2.geojson", "intensities": "p2.npy", "channels": ["SMA", "CD31"]},
            {"id": "p1", "contours": "p1.geojson", "intensities": "p1.npy", "channels": ["SMA", "CD31"]},
            {"id": "p3", "contours": "p3.geojson", "intensities": "p3.npy", "channels": ["SMA", "CD31"],
             "raster_shape": [64, 64]}
        ]}"#,
    )?;
    let manifest = Manifest::load(&manifest_path)?;
    let params = params()?;
    assert_eq!(params.output.fill_policy, FillPolicy::Zero);
    assert_eq!(params.normalization.transform, Transform::None);

    let masks_dir = dir.path().join("masks");
    let summary = run(&manifest, &params, Some(&masks_dir))?;

    // p3 contours were traced on a 64x64 raster, its intensities are 60x60
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].0, "p3");
    assert!(format!("{:#}", summary.failures[0].1).contains("64x64"));

    // Data, Vascular Space at bands 1 and 2, Non-Vascular Space at bands 0 and 1
    let table = &summary.table;
    assert_eq!(table.len(), 3 * 5);
    assert_eq!(table.image_ids(), vec!["p1", "p2"]);
    assert_eq!(summary.n_skipped(), 1);

    let data = RowKey::new("p1", 0, ExpansionBand::INTERIOR, RegionKind::Data);
    assert_eq!(table.value(&data, "SMA")?, Some(1.0));
    assert_eq!(table.value(&data, "CD31")?, Some(2.0));
    assert!(table.get(&data)?.metadata.positive);
    let ring = RowKey::new("p1", 0, ExpansionBand(1), RegionKind::VascularSpace);
    assert_eq!(table.value(&ring, "SMA")?, Some(0.0));
    // sliver was skipped, circle b keeps its position in the contour list
    assert!(table.get(&RowKey::new("p2", 0, ExpansionBand::INTERIOR, RegionKind::Data)).is_err());
    let p2 = KeyFilter::all().image("p2").kind(RegionKind::Data);
    assert_eq!(table.select(&p2).map(|row| row.key.object_id).collect::<Vec<_>>(), vec![1]);
    assert_eq!(table.positivity_counts(&KeyFilter::all()), (1, 2));

    let labels = Array2::<u32>::read_npy(File::open(masks_dir.join("p1_expanded_masks.npy"))?)?;
    assert_eq!(labels[[30, 20]], 1);
    assert_eq!(labels[[30, 40]], 2);
    let rings = Array2::<u32>::read_npy(File::open(
        masks_dir.join("p1_expanded_masks_without_interior.npy"),
    )?)?;
    assert_eq!(rings[[30, 20]], 0);
    assert_eq!(rings[[30, 27]], 1);
    // a failed image leaves no outputs behind
    assert!(!masks_dir.join("p3_expanded_masks.npy").exists());
    assert!(!masks_dir.join("p3_expanded_masks_without_interior.npy").exists());

    let csv_path = dir.path().join("expression.csv");
    expression::save_expression_csv(
        table,
        &params.aggregation.positivity_channel,
        params.expansion.pixel_interval,
        &params.output,
        &csv_path,
    )?;
    let contents = std::fs::read_to_string(&csv_path)?;
    let lines: Vec<_> = contents.lines().collect();
    assert_eq!(lines.len(), 1 + 15);
    assert_eq!(
        lines[0],
        "Point,Vessel,Expansion,Data Type,Contour Area,Vessel Size,SMA Presence,Distance Expanded (px),SMA,CD31"
    );
    assert!(lines[1].starts_with("p1,0,0,Data,"));
    Ok(())
}
