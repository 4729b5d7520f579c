#![allow(missing_docs)]
use crate::table::{ExpressionTable, FillPolicy};
use anyhow::{Context, Result};
use expansion::ExpansionBand;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// How the exported table is laid out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputParams {
    pub fill_policy: FillPolicy,
    /// Physical length of one pixel
    pub distance_per_pixel: f64,
    pub distance_units: String,
}

impl Default for OutputParams {
    fn default() -> Self {
        OutputParams {
            fill_policy: FillPolicy::Zero,
            distance_per_pixel: 1.0,
            distance_units: "px".to_string(),
        }
    }
}

impl OutputParams {
    /// Physical distance of a band's outer edge, rounded to the nearest half unit.
    pub fn distance_expanded(&self, band: ExpansionBand, pixel_interval: u32) -> f64 {
        let distance = band.upper_bound(pixel_interval) as f64 * self.distance_per_pixel;
        (distance * 2.0).round() / 2.0
    }

    pub fn distance_column(&self) -> String {
        format!("Distance Expanded ({})", self.distance_units)
    }
}

const KEY_COLUMNS: [&str; 4] = ["Point", "Vessel", "Expansion", "Data Type"];
const AREA_COLUMN: &str = "Contour Area";
const SIZE_COLUMN: &str = "Vessel Size";

/// Write the table as CSV, one line per row. Regions without pixels are
/// written as empty cells.
pub fn write_expression_csv<W: Write>(
    table: &ExpressionTable,
    positivity_channel: &str,
    pixel_interval: u32,
    output: &OutputParams,
    writer: W,
) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);

    let presence_column = format!("{positivity_channel} Presence");
    let header = KEY_COLUMNS
        .iter()
        .map(ToString::to_string)
        .chain([
            AREA_COLUMN.to_string(),
            SIZE_COLUMN.to_string(),
            presence_column,
            output.distance_column(),
        ])
        .chain(table.channels().iter().cloned());
    writer.write_record(header)?;

    for row in table.rows() {
        let key = &row.key;
        let presence = if row.metadata.positive {
            "Positive"
        } else {
            "Negative"
        };
        let record = [
            key.image_id.clone(),
            key.object_id.to_string(),
            key.band.to_string(),
            key.kind.to_string(),
            row.metadata.area.to_string(),
            row.metadata.size.to_string(),
            presence.to_string(),
            output
                .distance_expanded(key.band, pixel_interval)
                .to_string(),
        ]
        .into_iter()
        .chain(
            row.values
                .iter()
                .map(|v| v.map_or_else(String::new, |v| v.to_string())),
        );
        writer.write_record(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// [`write_expression_csv`] into a file.
pub fn save_expression_csv(
    table: &ExpressionTable,
    positivity_channel: &str,
    pixel_interval: u32,
    output: &OutputParams,
    path: &Path,
) -> Result<()> {
    let file = std::fs::File::create(path).with_context(|| format!("While creating {path:?}"))?;
    write_expression_csv(table, positivity_channel, pixel_interval, output, file)
        .with_context(|| format!("While writing the expression table to {path:?}"))
}
