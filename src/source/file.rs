use std::path::PathBuf;

use crate::{
    error::Result,
    geofile::{boundary::Boundary, feature::RawFeature, geojson::read_feature_collection},
    schema::data_model::CategorySchema,
};

/// Features read from a local GeoJSON file, filtered like a database query
/// would filter them: inside the boundary, and carrying at least one of the
/// category's required tags.
pub struct FileSource {
    infile: PathBuf,
}

impl FileSource {
    pub fn new(infile: PathBuf) -> Self {
        Self { infile }
    }

    pub fn get_features(
        &self,
        boundary: &Boundary,
        schema: &CategorySchema,
    ) -> Result<Vec<RawFeature>> {
        log::info!("Reading features from {:?}", self.infile);
        let collection = read_feature_collection(&self.infile)?;
        let total = collection.features.len();
        let required: Vec<&str> = schema.not_null_tags().collect();
        let features: Vec<RawFeature> = collection
            .features
            .into_iter()
            .filter_map(RawFeature::from_geojson)
            .filter(|feature| boundary.contains(&feature.geometry))
            .filter(|feature| {
                required.is_empty()
                    || required.iter().any(|tag| {
                        feature
                            .properties
                            .get(*tag)
                            .map_or(false, |value| !value.is_null())
                    })
            })
            .collect();
        log::info!("Kept {} of {} features", features.len(), total);
        Ok(features)
    }
}
