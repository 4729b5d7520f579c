//! The accumulated expression table.
//!
//! Rows are appended per image and the table is finalized once: rows are
//! sorted by key and the fill policy decides what happens to regions that
//! had no pixels. Queries take any subset of the key.
#![allow(missing_docs)]

use crate::aggregate::ExpressionRow;
use crate::region::{RegionKind, RowKey};
use expansion::ExpansionBand;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::ops::RangeInclusive;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("no row for {0}")]
    MissingKey(RowKey),
    #[error("a row for {0} is already present")]
    DuplicateKey(RowKey),
    #[error("unknown channel {0:?}")]
    UnknownChannel(String),
    #[error("row for {key} has {found} channel values, the table has {expected} channels")]
    ChannelCount {
        key: RowKey,
        expected: usize,
        found: usize,
    },
    #[error("the table was finalized, row for {0} cannot be appended")]
    Finalized(RowKey),
}

/// What finalization does with regions that had no pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillPolicy {
    /// Drop rows without any channel value.
    Omit,
    /// Report missing channel values as 0.
    #[default]
    Zero,
}

/// Selects rows by any subset of the key. Unset parts match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyFilter {
    pub image_id: Option<String>,
    pub object_id: Option<usize>,
    pub bands: Option<RangeInclusive<usize>>,
    pub kind: Option<RegionKind>,
}

impl KeyFilter {
    pub fn all() -> Self {
        KeyFilter::default()
    }
    pub fn image(mut self, image_id: impl Into<String>) -> Self {
        self.image_id = Some(image_id.into());
        self
    }
    pub fn object(mut self, object_id: usize) -> Self {
        self.object_id = Some(object_id);
        self
    }
    pub fn band(self, band: ExpansionBand) -> Self {
        self.bands(band.index()..=band.index())
    }
    pub fn bands(mut self, bands: RangeInclusive<usize>) -> Self {
        self.bands = Some(bands);
        self
    }
    pub fn kind(mut self, kind: RegionKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn matches(&self, key: &RowKey) -> bool {
        self.image_id.as_ref().map_or(true, |id| *id == key.image_id)
            && self.object_id.map_or(true, |id| id == key.object_id)
            && self
                .bands
                .as_ref()
                .map_or(true, |bands| bands.contains(&key.band.index()))
            && self.kind.map_or(true, |kind| kind == key.kind)
    }
}

/// Append-only table of expression rows over a fixed list of channels.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionTable {
    channels: Vec<String>,
    rows: Vec<ExpressionRow>,
    index: BTreeMap<RowKey, usize>,
    fill: Option<FillPolicy>,
}

impl ExpressionTable {
    pub fn new(channels: Vec<String>) -> Self {
        ExpressionTable {
            channels,
            rows: Vec::new(),
            index: BTreeMap::new(),
            fill: None,
        }
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[ExpressionRow] {
        &self.rows
    }

    /// The fill policy applied by [`ExpressionTable::finalize`], if it ran.
    pub fn fill_policy(&self) -> Option<FillPolicy> {
        self.fill
    }

    pub fn push(&mut self, row: ExpressionRow) -> Result<(), TableError> {
        self.extend(std::iter::once(row))
    }

    /// Append rows. Either every row is appended or, on error, none is.
    /// A finalized table accepts no more rows.
    pub fn extend(
        &mut self,
        rows: impl IntoIterator<Item = ExpressionRow>,
    ) -> Result<(), TableError> {
        let rows: Vec<_> = rows.into_iter().collect();
        if self.fill.is_some() {
            if let Some(row) = rows.first() {
                return Err(TableError::Finalized(row.key.clone()));
            }
        }
        let mut incoming = HashSet::with_capacity(rows.len());
        for row in &rows {
            if row.values.len() != self.channels.len() {
                return Err(TableError::ChannelCount {
                    key: row.key.clone(),
                    expected: self.channels.len(),
                    found: row.values.len(),
                });
            }
            if self.index.contains_key(&row.key) || !incoming.insert(&row.key) {
                return Err(TableError::DuplicateKey(row.key.clone()));
            }
        }
        for row in rows {
            self.index.insert(row.key.clone(), self.rows.len());
            self.rows.push(row);
        }
        Ok(())
    }

    /// Sort rows by key and apply the fill policy.
    pub fn finalize(mut self, fill: FillPolicy) -> Self {
        let mut rows = std::mem::take(&mut self.rows);
        rows.sort_by(|a, b| a.key.cmp(&b.key));
        match fill {
            FillPolicy::Omit => rows.retain(|row| !row.is_no_data()),
            FillPolicy::Zero => {
                for value in rows.iter_mut().flat_map(|row| row.values.iter_mut()) {
                    value.get_or_insert(0.0);
                }
            }
        }
        self.index = rows
            .iter()
            .enumerate()
            .map(|(i, row)| (row.key.clone(), i))
            .collect();
        self.rows = rows;
        self.fill = Some(fill);
        self
    }

    pub fn channel_index(&self, channel: &str) -> Result<usize, TableError> {
        self.channels
            .iter()
            .position(|c| c == channel)
            .ok_or_else(|| TableError::UnknownChannel(channel.to_string()))
    }

    pub fn get(&self, key: &RowKey) -> Result<&ExpressionRow, TableError> {
        self.index
            .get(key)
            .map(|&i| &self.rows[i])
            .ok_or_else(|| TableError::MissingKey(key.clone()))
    }

    /// Value of one channel in one row. `None` is a region without pixels.
    pub fn value(&self, key: &RowKey, channel: &str) -> Result<Option<f64>, TableError> {
        let c = self.channel_index(channel)?;
        Ok(self.get(key)?.values[c])
    }

    pub fn select<'a>(
        &'a self,
        filter: &'a KeyFilter,
    ) -> impl Iterator<Item = &'a ExpressionRow> + 'a {
        self.rows.iter().filter(move |row| filter.matches(&row.key))
    }

    /// One channel over the selected rows, in row order.
    pub fn column(&self, channel: &str, filter: &KeyFilter) -> Result<Vec<Option<f64>>, TableError> {
        let c = self.channel_index(channel)?;
        Ok(self.select(filter).map(|row| row.values[c]).collect())
    }

    /// Per-channel mean over the selected rows, skipping regions without
    /// pixels. `None` for a channel without any value.
    pub fn mean_expression(&self, filter: &KeyFilter) -> Vec<Option<f64>> {
        let mut sums = vec![(0.0, 0usize); self.channels.len()];
        for row in self.select(filter) {
            for ((sum, n), value) in sums.iter_mut().zip(&row.values) {
                if let Some(v) = value {
                    *sum += v;
                    *n += 1;
                }
            }
        }
        sums.into_iter()
            .map(|(sum, n)| (n > 0).then(|| sum / n as f64))
            .collect()
    }

    /// Number of positive and negative objects among the selected rows.
    pub fn positivity_counts(&self, filter: &KeyFilter) -> (usize, usize) {
        let (positive, negative): (Vec<_>, Vec<_>) = self
            .select(filter)
            .map(|row| (&row.key.image_id, row.key.object_id, row.metadata.positive))
            .unique()
            .partition(|(_, _, positive)| *positive);
        (positive.len(), negative.len())
    }

    /// Distinct image ids, in row order.
    pub fn image_ids(&self) -> Vec<&str> {
        self.rows
            .iter()
            .map(|row| row.key.image_id.as_str())
            .unique()
            .collect()
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [ExpressionRow] {
        &mut self.rows
    }
}
