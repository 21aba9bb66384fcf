// src/services/index_reconciler.rs

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use log::{debug, info};
use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;

use crate::error::{ExportError, ExportResult};

const INDEX_MAP_HEADER: [&str; 2] = ["index", "identifier"];

/// Dense mapping between training-time positions and natural identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexMap {
    identifiers: Vec<i64>,
    seen: HashSet<i64>,
}

impl IndexMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns indices in first-occurrence order; repeated identifiers are ignored.
    pub fn from_identifiers<I: IntoIterator<Item = i64>>(identifiers: I) -> Self {
        let mut map = Self::new();
        for id in identifiers {
            map.insert_if_new(id);
        }
        map
    }

    /// Builds a map from explicit `(index, identifier)` pairs.
    ///
    /// Indices must cover `0..len` exactly once and identifiers must be unique.
    pub fn from_pairs(mut pairs: Vec<(usize, i64)>) -> Result<Self, String> {
        pairs.sort_by_key(|(idx, _)| *idx);
        let mut map = Self::new();
        for (expected, (idx, id)) in pairs.into_iter().enumerate() {
            if idx != expected {
                return Err(format!(
                    "indices must be dense from 0, expected {} but found {}",
                    expected, idx
                ));
            }
            if !map.insert_if_new(id) {
                return Err(format!("identifier {} is mapped more than once", id));
            }
        }
        Ok(map)
    }

    fn insert_if_new(&mut self, id: i64) -> bool {
        if !self.seen.insert(id) {
            return false;
        }
        self.identifiers.push(id);
        true
    }

    pub fn identifier(&self, index: usize) -> Option<i64> {
        self.identifiers.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    /// `(index, identifier)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, i64)> + '_ {
        self.identifiers.iter().copied().enumerate()
    }
}

/// Replays the training-time pass over the ratings file.
///
/// Rows are scanned in file order and every unseen value of `id_column` gets
/// the next index. The result only matches training if the file and its row
/// order are identical to what the model was trained on.
///
/// Header names are compared after trimming whitespace. Rows may have fewer
/// or more fields than the header as long as the id field is present; a row
/// too short to reach it is a data file error.
pub fn reconcile_index_map(ratings_path: &Path, id_column: &str) -> ExportResult<IndexMap> {
    info!(
        "Recreating the {}-to-index mapping from {}",
        id_column,
        ratings_path.display()
    );
    let start = Instant::now();

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(ratings_path)
        .map_err(|e| ExportError::data_file(ratings_path, e.to_string()))?;

    let headers = reader
        .headers()
        .map_err(|e| ExportError::data_file(ratings_path, e.to_string()))?
        .clone();
    let column = headers
        .iter()
        .position(|h| h.trim() == id_column)
        .ok_or_else(|| {
            ExportError::data_file(
                ratings_path,
                format!("column '{}' not found in header {:?}", id_column, headers),
            )
        })?;
    debug!("Column '{}' is at position {}", id_column, column);

    let mut map = IndexMap::new();
    let mut record = StringRecord::new();
    let mut rows = 0usize;
    loop {
        let has_row = reader
            .read_record(&mut record)
            .map_err(|e| ExportError::data_file(ratings_path, e.to_string()))?;
        if !has_row {
            break;
        }
        rows += 1;

        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let raw = record.get(column).ok_or_else(|| {
            ExportError::data_file(
                ratings_path,
                format!("line {} has no '{}' field", line, id_column),
            )
        })?;
        let id = parse_identifier(raw).ok_or_else(|| {
            ExportError::data_file(
                ratings_path,
                format!("line {}: '{}' is not an integer identifier", line, raw),
            )
        })?;
        map.insert_if_new(id);
    }

    info!(
        "Mapped {} unique identifiers from {} rows in {:.2?}",
        map.len(),
        rows,
        start.elapsed()
    );
    Ok(map)
}

/// Accepts plain integers and integral floats such as `"31.0"`.
fn parse_identifier(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(id) = raw.parse::<i64>() {
        return Some(id);
    }
    let value = raw.parse::<f64>().ok()?;
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}

/// Loads a persisted `index,identifier` mapping verbatim.
pub fn load_index_map(path: &Path) -> ExportResult<IndexMap> {
    info!("Loading persisted index map from {}", path.display());
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| ExportError::data_file(path, e.to_string()))?;

    let mut pairs = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| ExportError::data_file(path, e.to_string()))?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let (Some(raw_index), Some(raw_id)) = (record.get(0), record.get(1)) else {
            return Err(ExportError::data_file(
                path,
                format!("line {} must have index and identifier fields", line),
            ));
        };
        let index = raw_index.trim().parse::<usize>().map_err(|_| {
            ExportError::data_file(path, format!("line {}: invalid index '{}'", line, raw_index))
        })?;
        let id = parse_identifier(raw_id).ok_or_else(|| {
            ExportError::data_file(
                path,
                format!("line {}: invalid identifier '{}'", line, raw_id),
            )
        })?;
        pairs.push((index, id));
    }

    let map = IndexMap::from_pairs(pairs).map_err(|e| ExportError::data_file(path, e))?;
    info!("Loaded {} index mappings", map.len());
    Ok(map)
}

/// Persists `map` so later runs can load it instead of re-deriving it.
pub fn write_index_map(map: &IndexMap, path: &Path) -> ExportResult<()> {
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .map_err(|e| ExportError::data_file(path, e.to_string()))?;
    writer
        .write_record(INDEX_MAP_HEADER)
        .map_err(|e| ExportError::data_file(path, e.to_string()))?;
    for (index, id) in map.iter() {
        writer
            .write_record([index.to_string(), id.to_string()])
            .map_err(|e| ExportError::data_file(path, e.to_string()))?;
    }
    writer
        .flush()
        .map_err(|e| ExportError::data_file(path, e.to_string()))?;
    info!("Wrote {} index mappings to {}", map.len(), path.display());
    Ok(())
}
