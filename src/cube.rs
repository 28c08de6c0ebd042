//! Hypercube model and the dense/sparse materialization decision.
//!
//! A [`Hypercube`] is an ordered list of named, typed axes. Accumulated
//! key/value pairs are materialized either as a fully allocated flat array
//! (dense) or as a sorted `(flat index, value)` list (sparse), subject to a
//! caller-supplied memory budget checked before any allocation.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::Dimension;

const VALUE_BYTES: u128 = std::mem::size_of::<f64>() as u128;
/// Dense estimate: payload plus working copy.
const DENSE_OVERHEAD: u128 = 2;
/// Sparse estimate: index + value + map overhead per entry.
const SPARSE_OVERHEAD: u128 = 6;

/// One axis: a named, typed, ordered list of distinct label values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Axis {
    pub name: String,
    #[serde(flatten)]
    pub dimension: Dimension,
    pub labels: Vec<String>,
}

impl Axis {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Shape description of a multidimensional dataset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Hypercube {
    pub axes: Vec<Axis>,
}

impl Hypercube {
    pub fn new(axes: Vec<Axis>) -> Self {
        Self { axes }
    }

    pub fn rank(&self) -> usize {
        self.axes.len()
    }

    /// Total element count; the empty product is 1 (a scalar cell).
    pub fn num_cells(&self) -> Result<usize> {
        let mut cells = 1usize;
        for axis in &self.axes {
            cells = cells
                .checked_mul(axis.len())
                .ok_or(Error::DimensionTooLarge)?;
        }
        Ok(cells)
    }

    /// Axis names must be distinct for the downstream dataset.
    pub fn validate(&self) -> Result<()> {
        let mut names: Vec<&str> = self.axes.iter().map(|a| a.name.as_str()).collect();
        names.sort_unstable();
        if let Some((dup, _)) = names.iter().tuple_windows().find(|(a, b)| a == b) {
            return Err(Error::DuplicateAxisName((*dup).to_string()));
        }
        Ok(())
    }

    /// Row-major flat index from per-axis positions.
    pub fn flat_index(&self, positions: &[usize]) -> usize {
        debug_assert_eq!(positions.len(), self.axes.len());
        let mut flat = 0usize;
        for (axis, &pos) in self.axes.iter().zip(positions) {
            flat = flat * axis.len() + pos;
        }
        flat
    }

    /// Per-axis positions from a row-major flat index.
    pub fn unflatten(&self, mut flat: usize) -> Vec<usize> {
        let mut positions = vec![0usize; self.axes.len()];
        for (i, axis) in self.axes.iter().enumerate().rev() {
            positions[i] = flat % axis.len();
            flat /= axis.len();
        }
        positions
    }
}

/// Materialized payload of a parsed hypercube.
#[derive(Debug, Clone, PartialEq)]
pub enum CubePayload {
    /// Flat array covering every cell, gaps filled with the missing value.
    Dense(Vec<f64>),
    /// Sorted (flat index, value) pairs for populated cells only.
    Sparse(Vec<(usize, f64)>),
}

impl CubePayload {
    pub fn is_dense(&self) -> bool {
        matches!(self, CubePayload::Dense(_))
    }

    /// Value at a flat index, if populated.
    pub fn value_at(&self, flat: usize) -> Option<f64> {
        match self {
            CubePayload::Dense(values) => values.get(flat).copied(),
            CubePayload::Sparse(entries) => entries
                .binary_search_by_key(&flat, |&(i, _)| i)
                .ok()
                .map(|pos| entries[pos].1),
        }
    }

    /// Populated (flat index, value) pairs in index order.
    pub fn entries(&self) -> Vec<(usize, f64)> {
        match self {
            CubePayload::Dense(values) => values
                .iter()
                .enumerate()
                .filter(|(_, v)| !v.is_nan())
                .map(|(i, &v)| (i, v))
                .collect(),
            CubePayload::Sparse(entries) => entries.clone(),
        }
    }
}

/// The finished dataset: shape plus payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCube {
    pub hypercube: Hypercube,
    pub payload: CubePayload,
}

impl ParsedCube {
    /// Hand both fields to an external variable-value container.
    pub fn store_into(self, target: &mut dyn ValueTarget) {
        target.set_hypercube(self.hypercube);
        match self.payload {
            CubePayload::Dense(values) => target.set_dense(values),
            CubePayload::Sparse(entries) => target.set_sparse(entries),
        }
    }
}

/// External "variable value" container interface. The core writes the
/// shape and the payload and treats the rest of the container as opaque.
pub trait ValueTarget {
    fn set_hypercube(&mut self, hypercube: Hypercube);
    fn set_dense(&mut self, values: Vec<f64>);
    fn set_sparse(&mut self, entries: Vec<(usize, f64)>);
}

/// Materialize accumulated `(flat index, value)` entries over a finalized
/// hypercube, choosing dense when the data occupies at least half of the
/// cells and honoring `budget_bytes` before allocating.
pub fn materialize(
    hypercube: Hypercube,
    mut entries: Vec<(usize, f64)>,
    missing_value: Option<f64>,
    budget_bytes: Option<u64>,
) -> Result<ParsedCube> {
    hypercube.validate()?;
    let cells = hypercube.num_cells()?;
    entries.sort_unstable_by_key(|&(flat, _)| flat);

    let keys = entries.len();
    let dense = keys > 0 && (keys as f64).ln() - (cells as f64).ln() >= 0.5f64.ln();

    let required = if dense {
        DENSE_OVERHEAD * cells as u128 * VALUE_BYTES
    } else {
        SPARSE_OVERHEAD * keys as u128 * VALUE_BYTES
    };
    if let Some(budget) = budget_bytes
        && required > u128::from(budget)
    {
        return Err(Error::MemoryExhausted {
            required,
            budget: u128::from(budget),
        });
    }

    let payload = if dense {
        let fill = missing_value.unwrap_or(f64::NAN);
        let mut values = vec![fill; cells];
        for (flat, value) in entries {
            values[flat] = value;
        }
        CubePayload::Dense(values)
    } else {
        let is_missing = |v: f64| v.is_nan() || missing_value.is_some_and(|m| v == m);
        entries.retain(|&(_, v)| !is_missing(v));
        CubePayload::Sparse(entries)
    };

    log::debug!(
        "materialized {} of {} cells as {}",
        keys,
        cells,
        if payload.is_dense() { "dense" } else { "sparse" }
    );
    Ok(ParsedCube { hypercube, payload })
}
