use serde_json::{json, Map, Value};

use crate::{
    error::Result,
    geofile::boundary::Boundary,
    schema::data_model::CategorySchema,
};

/// Filter document for the snapshot API: the boundary, the required tags as a
/// `join_or` filter, the geometry types to export and a request for centroids.
pub fn build_filter_document(schema: &CategorySchema, boundary: &Boundary) -> Result<Value> {
    let join_or: Map<String, Value> = schema
        .not_null_tags()
        .map(|tag| (tag.to_string(), json!([])))
        .collect();
    let geometry_types: Vec<&str> = schema
        .source_tables
        .iter()
        .filter_map(|table| table.snapshot_geometry_type())
        .collect();

    Ok(json!({
        "geometry": boundary.to_geojson_value()?,
        "filters": {
            "tags": {
                "all_geometry": {
                    "join_or": join_or,
                },
            },
        },
        "geometryType": geometry_types,
        "centroid": true,
    }))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{
        geofile::boundary::Boundary,
        schema::data_model::{CategorySchema, SourceTable, TagPredicate},
    };

    use super::build_filter_document;

    fn boundary() -> Boundary {
        Boundary::from_bbox_str("0,0,1,1").unwrap()
    }

    #[test]
    fn test_relations_are_dropped() {
        let schema = CategorySchema {
            source_tables: vec![SourceTable::Nodes, SourceTable::Relations],
            selected_tags: None,
            required_tags: vec![],
        };
        let document = build_filter_document(&schema, &boundary()).unwrap();
        assert_eq!(json!(["point"]), document["geometryType"]);
    }

    #[test]
    fn test_geometry_type_order_is_preserved() {
        let schema = CategorySchema {
            source_tables: vec![
                SourceTable::WaysLine,
                SourceTable::Nodes,
                SourceTable::WaysPoly,
            ],
            selected_tags: None,
            required_tags: vec![],
        };
        let document = build_filter_document(&schema, &boundary()).unwrap();
        assert_eq!(
            json!(["linestring", "point", "polygon"]),
            document["geometryType"]
        );
    }

    #[test]
    fn test_full_document() {
        let schema = CategorySchema {
            source_tables: vec![SourceTable::WaysPoly],
            selected_tags: None,
            required_tags: vec![
                ("building".to_string(), TagPredicate::NotNull),
                (
                    "shop".to_string(),
                    TagPredicate::Unrecognized("yes".to_string()),
                ),
            ],
        };
        let document = build_filter_document(&schema, &boundary()).unwrap();
        assert_eq!(
            json!({
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]]],
                },
                "filters": {"tags": {"all_geometry": {"join_or": {"building": []}}}},
                "geometryType": ["polygon"],
                "centroid": true,
            }),
            document
        );
    }
}
