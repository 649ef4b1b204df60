use geo::Centroid;
use serde_json::Value;

use crate::{
    error::{ExtractError, Result},
    geofile::feature::{Properties, RawFeature},
};

use super::download::OverpassElement;

/// Closes the way's vertices into an exterior ring and reduces it to the
/// ring's polygon centroid. Ways whose ring encloses no area fall back to the
/// centroid of the line.
pub fn way_to_feature(way: &OverpassElement) -> Result<RawFeature> {
    let ring: geo::LineString = way
        .geometry
        .iter()
        .flatten()
        .map(|coord| (coord.lon, coord.lat))
        .collect();
    if ring.0.is_empty() {
        return Err(ExtractError::protocol(format!(
            "Way {} has no geometry",
            way.id
        )));
    }
    let exterior = geo::Polygon::new(ring.clone(), vec![]);
    let centroid = exterior
        .centroid()
        .or_else(|| ring.centroid())
        .ok_or_else(|| ExtractError::protocol(format!("Way {} has no centroid", way.id)))?;

    let properties: Properties = way
        .tags
        .iter()
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect();
    Ok(RawFeature::from_point(
        centroid,
        properties,
        Some(Value::from(way.id)),
    ))
}
