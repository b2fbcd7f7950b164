use std::path::Path;

use json::JsonValue;
use tracing::info;

use crate::{
    datatypes::{DomainExtents, ModelMetadata},
    error::FegridError,
};

/// Loads the input file and checks its top-level layout
///
/// # Arguments
/// * `input_file` - Path to a json file with a `metadata` object
///
/// # Returns
/// The parsed json document
pub fn load_input_file(input_file: &Path) -> Result<JsonValue, FegridError> {
    let file_string = match std::fs::read_to_string(input_file) {
        Ok(f) => f,
        Err(_err) => {
            return Err(FegridError::Input(format!(
                "Unable to open input file {}",
                input_file.display()
            )))
        }
    };

    parse_input(&file_string)
}

/// Parses input json text and checks its top-level layout
pub fn parse_input(contents: &str) -> Result<JsonValue, FegridError> {
    let input_json = match json::parse(contents) {
        Ok(j) => j,
        Err(err) => {
            return Err(FegridError::Input(format!(
                "Error in input file json: {err}"
            )))
        }
    };

    if !input_json.has_key("metadata") || !input_json["metadata"].is_object() {
        return Err(FegridError::Input(
            "Input json missing metadata object".to_string(),
        ));
    }

    Ok(input_json)
}

/// Reads an optional number from an object, rejecting values of the wrong type
fn optional_f64(object: &JsonValue, key: &str) -> Result<Option<f64>, FegridError> {
    if !object.has_key(key) || object[key].is_null() {
        return Ok(None);
    }
    match object[key].as_f64() {
        Some(v) => Ok(Some(v)),
        None => Err(FegridError::Input(format!(
            "Bad value for {key}: expected a number, got {}",
            object[key].dump()
        ))),
    }
}

fn parse_domain(domain: &JsonValue) -> Result<DomainExtents, FegridError> {
    if !domain.is_object() {
        return Err(FegridError::Input(
            "Input json domain must be an object".to_owned(),
        ));
    }

    let mut bounds = [0.0; 4];
    for (slot, key) in bounds
        .iter_mut()
        .zip(["x_min", "x_max", "y_min", "y_max"])
    {
        *slot = match optional_f64(domain, key)? {
            Some(v) => v,
            None => {
                return Err(FegridError::Input(format!(
                    "Input json domain missing {key}"
                )))
            }
        };
    }

    DomainExtents::new(bounds[0], bounds[1], bounds[2], bounds[3])
}

/// Parses the model metadata from input json. Absent keys keep their defaults.
///
/// # Arguments
/// * `input_json` - The json document returned by [`parse_input`]
///
/// # Returns
/// A ModelMetadata instance
pub fn parse_input_metadata(input_json: &JsonValue) -> Result<ModelMetadata, FegridError> {
    let metadata_json = &input_json["metadata"];
    let mut metadata = ModelMetadata::default();

    if let Some(conductivity) = optional_f64(metadata_json, "conductivity")? {
        metadata.conductivity = conductivity;
    }
    if let Some(tolerance) = optional_f64(metadata_json, "boundary_tolerance")? {
        metadata.boundary_tolerance = tolerance;
    }
    if metadata_json.has_key("area_weighted") {
        metadata.area_weighted = match metadata_json["area_weighted"].as_bool() {
            Some(b) => b,
            None => {
                return Err(FegridError::Input(
                    "Bad value for area_weighted: expected a boolean".to_owned(),
                ))
            }
        };
    }
    if metadata_json.has_key("domain") {
        metadata.extents = Some(parse_domain(&metadata_json["domain"])?);
    }

    validate_metadata(&metadata)?;

    Ok(metadata)
}

/// Rejects physically meaningless parameters
pub fn validate_metadata(metadata: &ModelMetadata) -> Result<(), FegridError> {
    if !(metadata.conductivity > 0.0) || !metadata.conductivity.is_finite() {
        return Err(FegridError::Input(format!(
            "Conductivity must be positive and finite, got {}",
            metadata.conductivity
        )));
    }
    if !(metadata.boundary_tolerance >= 0.0) {
        return Err(FegridError::Input(format!(
            "Boundary tolerance must be non-negative, got {}",
            metadata.boundary_tolerance
        )));
    }
    Ok(())
}

/// Loads and validates model metadata from an input file
pub fn load(input_file: &Path) -> Result<ModelMetadata, FegridError> {
    let input_json = load_input_file(input_file)?;
    let metadata = parse_input_metadata(&input_json)?;
    info!(
        "loaded model metadata from {}: conductivity {}",
        input_file.display(),
        metadata.conductivity
    );
    Ok(metadata)
}
