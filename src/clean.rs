use std::path::{Path, PathBuf};

use crate::{error::Result, schema::category::Category};

/// Converts raw OSM tags into the vocabulary of a field form.
pub trait TagCleaner {
    fn clean(
        &self,
        collection: geojson::FeatureCollection,
        form: &Path,
    ) -> Result<geojson::FeatureCollection>;
}

/// Passes the collection through untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityCleaner;

impl TagCleaner for IdentityCleaner {
    fn clean(
        &self,
        collection: geojson::FeatureCollection,
        form: &Path,
    ) -> Result<geojson::FeatureCollection> {
        log::debug!(
            "Keeping {} features as they are, form {:?} not applied",
            collection.features.len(),
            form
        );
        Ok(collection)
    }
}

/// The category's `.xls` form when there is one, otherwise its `.xlsx` form.
pub fn resolve_form_path(xlsforms_dir: &Path, category: Category) -> PathBuf {
    let xls = xlsforms_dir.join(format!("{}.xls", category.name()));
    if xls.exists() {
        xls
    } else {
        xls.with_extension("xlsx")
    }
}
