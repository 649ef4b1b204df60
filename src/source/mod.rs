use std::path::Path;

use crate::{
    cancel::CancellationToken,
    error::Result,
    geofile::{boundary::Boundary, feature::RawFeature, geojson::parse_feature_collection},
    osm::download::OverpassClient,
    query::{
        filter::build_filter_document,
        sql::{build_sql_queries_with_join, TagJoin},
    },
    schema::{category::Category, data_model::CategorySchema},
};

use self::{
    file::FileSource,
    postgres::LocalQueryEngine,
    snapshot::RemoteSnapshotClient,
    transport::{HttpTransport, ReqwestTransport},
};

pub mod file;
pub mod postgres;
pub mod snapshot;
#[cfg(test)]
pub mod test_support;
pub mod transport;

/// Where raw features come from. Chosen once at startup.
pub enum FeatureSource<T: HttpTransport = ReqwestTransport> {
    Postgres {
        engine: LocalQueryEngine,
        tag_join: TagJoin,
    },
    Snapshot(RemoteSnapshotClient<T>),
    Overpass(OverpassClient<T>),
    File(FileSource),
}

impl<T: HttpTransport> FeatureSource<T> {
    pub fn name(&self) -> &'static str {
        match self {
            FeatureSource::Postgres { .. } => "postgres",
            FeatureSource::Snapshot(_) => "snapshot",
            FeatureSource::Overpass(_) => "overpass",
            FeatureSource::File(_) => "file",
        }
    }

    /// Point features of `category` inside the boundary, each carrying
    /// `id`, `title` and `label`. Overpass only knows about buildings and
    /// ignores the category.
    pub fn get_features(
        &mut self,
        boundary: &Boundary,
        category: Category,
        data_models_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawFeature>> {
        log::info!("Getting {} features from {}", category, self.name());
        match self {
            FeatureSource::Postgres { engine, tag_join } => {
                let schema = CategorySchema::load(data_models_dir, category)?;
                let statements = build_sql_queries_with_join(&schema, *tag_join);
                cancel.check()?;
                engine.query(&statements, boundary)
            }
            FeatureSource::Snapshot(client) => {
                let schema = CategorySchema::load(data_models_dir, category)?;
                let filter = build_filter_document(&schema, boundary)?;
                let export = client.submit_and_fetch(&filter, cancel)?;
                features_from_export(&export)
            }
            FeatureSource::Overpass(client) => client.get_features(boundary, cancel),
            FeatureSource::File(source) => {
                let schema = CategorySchema::load(data_models_dir, category)?;
                source.get_features(boundary, &schema)
            }
        }
    }
}

/// Features of an exported GeoJSON document. The export is requested with
/// centroids, but every geometry is reduced again so only points come out.
pub fn features_from_export(export: &[u8]) -> Result<Vec<RawFeature>> {
    let collection = parse_feature_collection(export)?;
    let total = collection.features.len();
    let features: Vec<RawFeature> = collection
        .features
        .into_iter()
        .filter_map(RawFeature::from_geojson)
        .collect();
    if features.len() < total {
        log::warn!(
            "Dropped {} exported features without geometry",
            total - features.len()
        );
    }
    log::info!("Snapshot export holds {} features", features.len());
    Ok(features)
}
