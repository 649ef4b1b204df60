use std::{fs, path::Path};

use crate::error::{ExtractError, Result};

use super::feature::RawFeature;

pub fn features_to_collection(features: &[RawFeature]) -> geojson::FeatureCollection {
    features.iter().map(geojson::Feature::from).collect()
}

pub fn read_feature_collection(filepath: &Path) -> Result<geojson::FeatureCollection> {
    let contents = fs::read_to_string(filepath).map_err(|err| ExtractError::io(filepath, err))?;
    parse_feature_collection(contents.as_bytes())
}

/// Parses a GeoJSON document into a FeatureCollection. A single Feature is
/// wrapped into a collection of one.
pub fn parse_feature_collection(contents: &[u8]) -> Result<geojson::FeatureCollection> {
    let text = std::str::from_utf8(contents)
        .map_err(|err| ExtractError::protocol(format!("GeoJSON is not UTF-8: {}", err)))?;
    let geojson: geojson::GeoJson = text
        .parse()
        .map_err(|err| ExtractError::protocol(format!("Invalid GeoJSON: {}", err)))?;
    match geojson {
        geojson::GeoJson::FeatureCollection(collection) => Ok(collection),
        geojson::GeoJson::Feature(feature) => Ok(std::iter::once(feature).collect()),
        geojson::GeoJson::Geometry(_) => Err(ExtractError::protocol(
            "Expected a FeatureCollection, got a bare geometry",
        )),
    }
}

/// Writes the collection next to its destination first and renames it into
/// place, so a failed write never leaves a truncated output file.
pub fn write_feature_collection(
    collection: &geojson::FeatureCollection,
    output_filepath: &Path,
) -> Result<()> {
    let geojson_contents = geojson::GeoJson::from(collection.clone()).to_string();
    let tmp_filepath = output_filepath.with_extension("geojson.tmp");
    fs::write(&tmp_filepath, geojson_contents)
        .map_err(|err| ExtractError::io(&tmp_filepath, err))?;
    fs::rename(&tmp_filepath, output_filepath).map_err(|err| {
        let _ = fs::remove_file(&tmp_filepath);
        ExtractError::io(output_filepath, err)
    })?;
    log::info!(
        "Wrote {} features to {:?}",
        collection.features.len(),
        output_filepath
    );
    Ok(())
}
