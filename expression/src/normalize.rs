#![allow(missing_docs)]
use crate::table::{ExpressionTable, TableError};
use anyhow::{ensure, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Element-wise transform of channel values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    None,
    /// ln(x + 1)
    Log1p,
    /// asinh(x / scaling_factor)
    #[default]
    Arcsinh,
}

impl Transform {
    pub fn apply(self, value: f64, scaling_factor: f64) -> f64 {
        match self {
            Transform::None => value,
            Transform::Log1p => value.ln_1p(),
            Transform::Arcsinh => (value / scaling_factor).asinh(),
        }
    }
}

/// Rescaling applied after the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scaling {
    #[default]
    None,
    /// Each channel mapped onto [0, 1]
    MinMax,
    /// Each channel divided by its maximum
    Max,
    /// Each row divided by the sum of its channels
    RowTotal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NormalizationParams {
    pub transform: Transform,
    pub scaling: Scaling,
    pub scaling_factor: f64,
}

impl Default for NormalizationParams {
    fn default() -> Self {
        NormalizationParams {
            transform: Transform::Arcsinh,
            scaling: Scaling::None,
            scaling_factor: 100.0,
        }
    }
}

impl NormalizationParams {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.scaling_factor.is_finite() && self.scaling_factor > 0.0,
            "scaling_factor must be positive, got {}",
            self.scaling_factor
        );
        Ok(())
    }
}

/// Transform and rescale the named channel columns of a table. Keys and
/// object metadata are left alone, as are regions without pixels.
///
/// Applying a transform other than [`Transform::None`] twice transforms the
/// values twice; callers normalize a table once.
pub fn normalize(
    mut table: ExpressionTable,
    channels: &[String],
    params: &NormalizationParams,
) -> Result<ExpressionTable, TableError> {
    let columns: Vec<usize> = channels
        .iter()
        .map(|c| table.channel_index(c))
        .collect::<Result<_, _>>()?;

    for row in table.rows_mut() {
        for &c in &columns {
            if let Some(v) = row.values[c].as_mut() {
                *v = params.transform.apply(*v, params.scaling_factor);
            }
        }
    }

    match params.scaling {
        Scaling::None => {}
        Scaling::MinMax | Scaling::Max => {
            for &c in &columns {
                let values = table.rows().iter().filter_map(|row| row.values[c]);
                let (offset, den) = match params.scaling {
                    Scaling::MinMax => match values.minmax().into_option() {
                        Some((min, max)) if max > min => (min, max - min),
                        Some((min, _)) => (min, 1.0),
                        None => continue,
                    },
                    _ => match values.reduce(f64::max) {
                        Some(max) if max > 0.0 => (0.0, max),
                        Some(_) => (0.0, 1.0),
                        None => continue,
                    },
                };
                for row in table.rows_mut() {
                    if let Some(v) = row.values[c].as_mut() {
                        *v = (*v - offset) / den;
                    }
                }
            }
        }
        Scaling::RowTotal => {
            for row in table.rows_mut() {
                let total: f64 = columns.iter().filter_map(|&c| row.values[c]).sum();
                if total == 0.0 {
                    continue;
                }
                for &c in &columns {
                    if let Some(v) = row.values[c].as_mut() {
                        *v /= total;
                    }
                }
            }
        }
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{ExpressionRow, ObjectMetadata, SizeClass};
    use crate::region::{RegionKind, RowKey};
    use crate::table::FillPolicy;
    use expansion::ExpansionBand;
    use pretty_assertions::assert_eq;

    fn channels() -> Vec<String> {
        vec!["SMA".to_string(), "CD31".to_string()]
    }

    fn table(values: &[[Option<f64>; 2]]) -> ExpressionTable {
        let mut table = ExpressionTable::new(channels());
        table
            .extend(values.iter().enumerate().map(|(i, v)| ExpressionRow {
                key: RowKey::new("p1", i, ExpansionBand(0), RegionKind::Data),
                metadata: ObjectMetadata {
                    area: 7,
                    size: SizeClass::Small,
                    positive: true,
                },
                values: v.to_vec(),
            }))
            .unwrap();
        table.finalize(FillPolicy::Omit)
    }

    fn params(transform: Transform, scaling: Scaling) -> NormalizationParams {
        NormalizationParams {
            transform,
            scaling,
            scaling_factor: 5.0,
        }
    }

    #[test]
    fn test_none_is_identity() {
        let original = table(&[[Some(1.5), Some(0.0)], [Some(7.0), None]]);
        let normalized = normalize(
            original.clone(),
            &channels(),
            &params(Transform::None, Scaling::None),
        )
        .unwrap();
        assert_eq!(normalized, original);
    }

    #[test]
    fn test_transforms() {
        assert_eq!(Transform::Log1p.apply(0.0, 5.0), 0.0);
        assert!((Transform::Log1p.apply(std::f64::consts::E - 1.0, 5.0) - 1.0).abs() < 1e-12);
        assert!((Transform::Arcsinh.apply(5.0, 5.0) - 1.0f64.asinh()).abs() < 1e-12);
    }

    #[test]
    fn test_only_named_channels_change() {
        let original = table(&[[Some(5.0), Some(5.0)]]);
        let normalized = normalize(
            original.clone(),
            &["SMA".to_string()],
            &params(Transform::Arcsinh, Scaling::None),
        )
        .unwrap();
        let row = &normalized.rows()[0];
        assert_eq!(row.values[0], Some(1.0f64.asinh()));
        assert_eq!(row.values[1], Some(5.0));
        assert_eq!(row.key, original.rows()[0].key);
        assert_eq!(row.metadata, original.rows()[0].metadata);
    }

    #[test]
    fn test_not_idempotent() {
        let once = normalize(
            table(&[[Some(5.0), Some(5.0)]]),
            &channels(),
            &params(Transform::Arcsinh, Scaling::None),
        )
        .unwrap();
        let twice = normalize(
            once.clone(),
            &channels(),
            &params(Transform::Arcsinh, Scaling::None),
        )
        .unwrap();
        assert_ne!(once, twice);
    }

    #[test]
    fn test_scalings() {
        let values = [[Some(1.0), Some(4.0)], [Some(3.0), None], [Some(2.0), Some(0.0)]];
        let min_max = normalize(table(&values), &channels(), &params(Transform::None, Scaling::MinMax)).unwrap();
        let column: Vec<_> = min_max.rows().iter().map(|r| r.values[0]).collect();
        assert_eq!(column, vec![Some(0.0), Some(1.0), Some(0.5)]);
        assert_eq!(min_max.rows()[1].values[1], None);

        let max = normalize(table(&values), &channels(), &params(Transform::None, Scaling::Max)).unwrap();
        let column: Vec<_> = max.rows().iter().map(|r| r.values[1]).collect();
        assert_eq!(column, vec![Some(1.0), None, Some(0.0)]);

        let row_total =
            normalize(table(&values), &channels(), &params(Transform::None, Scaling::RowTotal)).unwrap();
        assert_eq!(row_total.rows()[0].values, vec![Some(0.2), Some(0.8)]);
        assert_eq!(row_total.rows()[1].values, vec![Some(1.0), None]);
    }

    #[test]
    fn test_unknown_channel() {
        let err = normalize(
            table(&[[Some(1.0), Some(1.0)]]),
            &["Ki67".to_string()],
            &NormalizationParams::default(),
        )
        .unwrap_err();
        assert_eq!(err, TableError::UnknownChannel("Ki67".to_string()));
        assert!(NormalizationParams::default().validate().is_ok());
    }
}
