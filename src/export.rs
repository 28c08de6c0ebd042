//! Long-format CSV export of a parsed hypercube.
//!
//! The first record embeds the full axis metadata as JSON under the
//! [`METADATA_TAG`](crate::sniff::METADATA_TAG) marker, so a re-import can
//! reconstruct the exact schema without guessing. Then one header row and
//! one record per populated cell.

use std::io::Write;

use crate::cube::ParsedCube;
use crate::error::Result;
use crate::sniff::{METADATA_TAG, MetadataAxis};

/// Write `cube` as long-format CSV: metadata record, header, then one
/// `label..., value` record per populated cell.
pub fn write_cube<W: Write>(cube: &ParsedCube, writer: W) -> Result<()> {
    let mut out = csv::WriterBuilder::new().flexible(true).from_writer(writer);

    let axes: Vec<MetadataAxis> = cube
        .hypercube
        .axes
        .iter()
        .map(|axis| MetadataAxis {
            name: axis.name.clone(),
            dimension: axis.dimension.clone(),
        })
        .collect();
    let json = serde_json::to_string(&axes)?;
    out.write_record([format!("{METADATA_TAG}={json}")])?;

    let mut header: Vec<&str> = cube
        .hypercube
        .axes
        .iter()
        .map(|axis| axis.name.as_str())
        .collect();
    header.push("value");
    out.write_record(&header)?;

    let mut record = Vec::with_capacity(header.len());
    for (flat, value) in cube.payload.entries() {
        let positions = cube.hypercube.unflatten(flat);
        record.clear();
        for (axis, pos) in cube.hypercube.axes.iter().zip(&positions) {
            record.push(axis.labels[*pos].clone());
        }
        // `{}` on f64 prints the shortest string that parses back exactly.
        record.push(value.to_string());
        out.write_record(&record)?;
    }
    out.flush()?;
    Ok(())
}
