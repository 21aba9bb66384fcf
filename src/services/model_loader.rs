// src/services/model_loader.rs

use candle_core::{DType, Device, Tensor};
use log::{debug, info};
use std::path::Path;
use std::time::Instant;

use crate::error::{ExportError, ExportResult};
use crate::services::types::EmbeddingMatrix;

/// Loads the weight matrix of `layer` from a safetensors model file.
///
/// Tensors are read onto the CPU; the matrix is returned as `f32` rows in
/// training-index order.
pub fn load_embedding_matrix(model_path: &Path, layer: &str) -> ExportResult<EmbeddingMatrix> {
    info!("Loading the trained model from {}", model_path.display());
    if !model_path.is_file() {
        return Err(ExportError::load(model_path, "model file does not exist"));
    }

    let start = Instant::now();
    let weights = candle_core::safetensors::load(model_path, &Device::Cpu)
        .map_err(|e| ExportError::load(model_path, e.to_string()))?;
    debug!("Model tensors: {:?}", weights.keys());
    info!("Model loaded successfully in {:.2?}", start.elapsed());

    let tensor_name = resolve_layer_name(weights.keys(), layer)
        .map_err(|e| match e {
            LayerLookupError::Missing(available) => ExportError::LayerNotFound {
                layer: layer.to_string(),
                available,
            },
            LayerLookupError::Ambiguous(candidates) => ExportError::load(
                model_path,
                format!("layer '{}' is ambiguous, candidates: {:?}", layer, candidates),
            ),
        })?;

    let tensor = &weights[&tensor_name];
    let matrix = tensor_to_matrix(tensor)
        .map_err(|message| ExportError::load(model_path, format!("{}: {}", tensor_name, message)))?;

    info!(
        "Extracted embedding matrix '{}' with shape: ({}, {})",
        tensor_name,
        matrix.num_rows(),
        matrix.dim()
    );
    Ok(matrix)
}

#[derive(Debug, PartialEq)]
enum LayerLookupError {
    Missing(Vec<String>),
    Ambiguous(Vec<String>),
}

/// Finds the tensor holding `layer`'s weights.
///
/// An exact name wins; otherwise exactly one `layer.<suffix>` or
/// `layer/<suffix>` name must exist.
fn resolve_layer_name<'a>(
    names: impl Iterator<Item = &'a String>,
    layer: &str,
) -> Result<String, LayerLookupError> {
    let mut names: Vec<&String> = names.collect();
    names.sort();

    if names.iter().any(|n| n.as_str() == layer) {
        return Ok(layer.to_string());
    }

    let dotted = format!("{}.", layer);
    let slashed = format!("{}/", layer);
    let candidates: Vec<String> = names
        .iter()
        .filter(|n| n.starts_with(&dotted) || n.starts_with(&slashed))
        .map(|n| n.to_string())
        .collect();

    match candidates.len() {
        0 => Err(LayerLookupError::Missing(
            names.into_iter().cloned().collect(),
        )),
        1 => Ok(candidates[0].clone()),
        _ => Err(LayerLookupError::Ambiguous(candidates)),
    }
}

fn tensor_to_matrix(tensor: &Tensor) -> Result<EmbeddingMatrix, String> {
    match tensor.dtype() {
        DType::F16 | DType::BF16 | DType::F32 | DType::F64 => {}
        other => return Err(format!("expected a float tensor, found {:?}", other)),
    }
    let (rows, dim) = tensor
        .dims2()
        .map_err(|_| format!("expected a rank-2 tensor, found shape {:?}", tensor.dims()))?;
    debug!("Converting {}x{} tensor to f32 rows", rows, dim);

    let rows = tensor
        .to_dtype(DType::F32)
        .and_then(|t| t.to_vec2::<f32>())
        .map_err(|e| e.to_string())?;
    EmbeddingMatrix::from_rows(rows)
}
