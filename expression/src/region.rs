#![allow(missing_docs)]
use anyhow::{bail, Error};
use expansion::ExpansionBand;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which population of pixels a row summarizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RegionKind {
    /// The object interior, band 0
    #[serde(rename = "Data")]
    Data,
    /// The exclusive annulus of one band
    #[serde(rename = "Vascular Space")]
    VascularSpace,
    /// Territory beyond the band, out to the background cap
    #[serde(rename = "Non-Vascular Space")]
    NonVascularSpace,
}

impl RegionKind {
    pub const ALL: [RegionKind; 3] = [
        RegionKind::Data,
        RegionKind::VascularSpace,
        RegionKind::NonVascularSpace,
    ];

    pub fn label(self) -> &'static str {
        match self {
            RegionKind::Data => "Data",
            RegionKind::VascularSpace => "Vascular Space",
            RegionKind::NonVascularSpace => "Non-Vascular Space",
        }
    }
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RegionKind {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match RegionKind::ALL.into_iter().find(|kind| kind.label() == s) {
            Some(kind) => Ok(kind),
            None => bail!("unknown region kind {s:?}"),
        }
    }
}

/// Unique key of a table row. The derived ordering is the canonical row order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowKey {
    pub image_id: String,
    pub object_id: usize,
    pub band: ExpansionBand,
    pub kind: RegionKind,
}

impl RowKey {
    pub fn new(
        image_id: impl Into<String>,
        object_id: usize,
        band: ExpansionBand,
        kind: RegionKind,
    ) -> Self {
        RowKey {
            image_id: image_id.into(),
            object_id,
            band,
            kind,
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(image {}, object {}, band {}, {})",
            self.image_id, self.object_id, self.band, self.kind
        )
    }
}
