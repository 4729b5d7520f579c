//! parameters_toml
#![deny(missing_docs)]

use anyhow::{Context, Result};
use expansion::ExpansionParams;
use expression::{AggregationParams, NormalizationParams, OutputParams};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Every tunable of a run, read from parameters.toml.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Parameters {
    /// Band width, number of bands, background cap and minimum contour area.
    pub expansion: ExpansionParams,
    /// Size class and positivity thresholds.
    pub aggregation: AggregationParams,
    /// Transform and scaling of channel values.
    pub normalization: NormalizationParams,
    /// Fill policy and physical distance units of the exported table.
    pub output: OutputParams,
}

/// Compare fields against the defaults and warn about every difference.
macro_rules! report_non_default {
    ($params:expr, $defaults:expr, $changed:expr, $($section:ident . $field:ident),+ $(,)?) => {
        $(
            if $params.$section.$field != $defaults.$section.$field {
                warn!(
                    "using non-default {}.{} = {:?}",
                    stringify!($section),
                    stringify!($field),
                    $params.$section.$field
                );
                $changed.push(concat!(stringify!($section), ".", stringify!($field)));
            }
        )+
    };
}

impl Parameters {
    /// Parse and validate parameters from TOML text. Missing keys take their
    /// default value, unknown keys are an error.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let params: Parameters = toml::from_str(s)?;
        params.validate()?;
        Ok(params)
    }

    /// Load parameters from `path`, falling back to the defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "could not find parameters at {}, falling back to defaults",
                path.display()
            );
            return Ok(Parameters::default());
        }
        let s = std::fs::read_to_string(path).with_context(|| path.display().to_string())?;
        let params =
            Parameters::from_toml_str(&s).with_context(|| path.display().to_string())?;
        params.report_non_default();
        Ok(params)
    }

    /// Check every section.
    pub fn validate(&self) -> Result<()> {
        self.expansion.validate().context("[expansion]")?;
        self.aggregation.validate().context("[aggregation]")?;
        self.normalization.validate().context("[normalization]")?;
        anyhow::ensure!(
            self.output.distance_per_pixel.is_finite() && self.output.distance_per_pixel > 0.0,
            "[output]: distance_per_pixel must be positive"
        );
        Ok(())
    }

    /// Warn about every value that differs from its default and return
    /// their names.
    pub fn report_non_default(&self) -> Vec<&'static str> {
        let defaults = Parameters::default();
        let mut changed = Vec::new();
        report_non_default!(
            self,
            defaults,
            changed,
            expansion.pixel_interval,
            expansion.n_bands,
            expansion.max_background_band,
            expansion.minimum_contour_area,
            aggregation.size_threshold,
            aggregation.positivity_channel,
            aggregation.positivity_threshold,
            normalization.transform,
            normalization.scaling,
            normalization.scaling_factor,
            output.fill_policy,
            output.distance_per_pixel,
            output.distance_units,
        );
        changed
    }
}
