use geo::Centroid;
use serde_json::Value;

/// Tag and attribute mapping carried by every feature.
pub type Properties = geojson::JsonObject;

/// A feature on its way from a data source to the tag cleaner. The geometry
/// is always a point; areal and linear source geometries are reduced to their
/// centroid before a `RawFeature` is built.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFeature {
    pub geometry: geo::Point,
    pub properties: Properties,
}

impl RawFeature {
    /// Build a feature from any geometry by reducing it to its centroid and
    /// running the shared `id`/`title`/`label` synthesis.
    ///
    /// Returns `None` for empty geometries, which have no centroid.
    pub fn from_geometry(
        geometry: &geo::Geometry,
        properties: Properties,
        id: Option<Value>,
    ) -> Option<Self> {
        let centroid = match geometry {
            geo::Geometry::Point(point) => Some(*point),
            other => other.centroid(),
        }?;
        Some(Self::from_point(centroid, properties, id))
    }

    /// Build a feature from a GeoJSON feature as exported by the snapshot
    /// service or read from disk. Nested `tags` are flattened; the id is the
    /// feature id, or `osm_id` when the feature has none.
    pub fn from_geojson(feature: geojson::Feature) -> Option<Self> {
        let geometry = geo::Geometry::<f64>::try_from(feature.geometry?).ok()?;
        let properties = flatten_tags(feature.properties.unwrap_or_default());
        let id = match feature.id {
            Some(geojson::feature::Id::String(id)) => Some(Value::String(id)),
            Some(geojson::feature::Id::Number(id)) => Some(Value::Number(id)),
            None => properties.get("osm_id").filter(|id| !id.is_null()).cloned(),
        };
        Self::from_geometry(&geometry, properties, id)
    }

    pub fn from_point(geometry: geo::Point, mut properties: Properties, id: Option<Value>) -> Self {
        synthesize_labels(&mut properties, id);
        Self {
            geometry,
            properties,
        }
    }
}

/// Adds `id` when one is known, and `title`/`label` copied from `name`
/// (JSON null when the feature has no name). Applied identically to the
/// features of every data source.
pub fn synthesize_labels(properties: &mut Properties, id: Option<Value>) {
    if let Some(id) = id {
        properties.insert("id".to_string(), id);
    }
    let name = properties
        .get("name")
        .filter(|name| !name.is_null())
        .cloned()
        .unwrap_or(Value::Null);
    properties.insert("title".to_string(), name.clone());
    properties.insert("label".to_string(), name);
}

/// Flattens a nested `tags` object into the top-level properties. Existing
/// top-level keys win.
pub fn flatten_tags(mut properties: Properties) -> Properties {
    if let Some(Value::Object(tags)) = properties.remove("tags") {
        for (key, value) in tags {
            properties.entry(key).or_insert(value);
        }
    }
    properties
}

impl From<&RawFeature> for geojson::Feature {
    fn from(value: &RawFeature) -> Self {
        geojson::Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&value.geometry))),
            id: None,
            properties: Some(value.properties.clone()),
            foreign_members: None,
        }
    }
}
