use std::path::Path;

use crate::{
    cancel::CancellationToken,
    clean::{resolve_form_path, TagCleaner},
    config::Config,
    error::Result,
    geofile::{
        boundary::Boundary,
        geojson::{features_to_collection, write_feature_collection},
    },
    schema::category::Category,
    source::{transport::HttpTransport, FeatureSource},
};

/// Gets the category's features from the source, cleans their tags against
/// the category's form and writes the result to `output_filepath`. Nothing is
/// written when any step fails.
pub fn extract<T: HttpTransport>(
    source: &mut FeatureSource<T>,
    boundary: &Boundary,
    category: Category,
    config: &Config,
    cleaner: &dyn TagCleaner,
    output_filepath: &Path,
    cancel: &CancellationToken,
) -> Result<geojson::FeatureCollection> {
    let features = source.get_features(boundary, category, &config.data_models_dir, cancel)?;
    log::info!("Got {} {} features", features.len(), category);

    let form = resolve_form_path(&config.xlsforms_dir, category);
    log::debug!("Cleaning tags with form {:?}", form);
    let collection = cleaner.clean(features_to_collection(&features), &form)?;

    cancel.check()?;
    write_feature_collection(&collection, output_filepath)?;
    Ok(collection)
}
