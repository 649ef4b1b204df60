use std::str::FromStr;

use postgres::{Client, NoTls, Row};
use serde_json::Value;

use crate::{
    config::DatabaseConfig,
    error::{ExtractError, Result},
    geofile::{
        boundary::Boundary,
        feature::{flatten_tags, Properties, RawFeature},
    },
};

/// Source tables that get a boundary-clipped temporary view, in the order the
/// view substitution is tried.
pub const CLIPPED_VIEWS: [(&str, &str); 3] = [
    ("ways_poly", "ways_view"),
    ("nodes", "nodes_view"),
    ("ways_line", "lines_view"),
];

/// Runs data model queries against a PostGIS import of OSM data.
pub struct LocalQueryEngine {
    client: Client,
}

impl LocalQueryEngine {
    pub fn connect(config: &DatabaseConfig) -> Result<Self> {
        let dbname = config.dbname.as_deref().ok_or_else(|| ExtractError::Connection {
            message: "no database name given".to_string(),
        })?;
        let host = config.host.as_deref().unwrap_or("localhost");
        log::info!("Opening database connection to {} on {}", dbname, host);

        let mut pg_config = postgres::Config::new();
        pg_config.host(host).dbname(dbname).user(&config.user_or_default());
        if let Some(port) = config.port {
            pg_config.port(port);
        }
        if let Some(password) = &config.password {
            pg_config.password(password);
        }
        let client = pg_config
            .connect(NoTls)
            .map_err(|err| ExtractError::Connection {
                message: format!("couldn't connect to {}: {}", dbname, err),
            })?;
        log::info!("Opened session in {}", dbname);
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Executes each statement against boundary-clipped views and maps the
    /// rows to point features. The views are recreated on every call.
    pub fn query(&mut self, statements: &[String], boundary: &Boundary) -> Result<Vec<RawFeature>> {
        if self.client.is_closed() {
            return Err(ExtractError::Connection {
                message: "database session is closed".to_string(),
            });
        }
        self.client.batch_execute(&view_statements(boundary))?;

        let mut features = Vec::new();
        for statement in statements {
            let statement = rewrite_for_view(statement);
            log::debug!("{}", statement);
            let rows = self.client.query(statement.as_str(), &[])?;
            log::info!("Query returned {} records", rows.len());
            for row in &rows {
                if let Some(feature) = row_to_feature(row)? {
                    features.push(feature);
                }
            }
        }
        Ok(features)
    }
}

/// `DROP VIEW IF EXISTS` plus `CREATE TEMP VIEW` for every clipped table.
pub fn view_statements(boundary: &Boundary) -> String {
    let ewkt = boundary.to_ewkt();
    CLIPPED_VIEWS
        .iter()
        .map(|(table, view)| {
            format!(
                "DROP VIEW IF EXISTS {view};CREATE TEMP VIEW {view} AS SELECT * FROM {table} \
                 WHERE ST_CONTAINS(ST_GeomFromEWKT('{ewkt}'), geom);",
                view = view,
                table = table,
                ewkt = ewkt
            )
        })
        .collect()
}

/// Points the first `FROM <table>` of the statement at its clipped view. Only
/// one table per statement is rewritten.
pub fn rewrite_for_view(statement: &str) -> String {
    for (table, view) in CLIPPED_VIEWS {
        let needle = format!("FROM {}", table);
        if let Some(start) = find_token(statement, &needle) {
            let mut rewritten = String::with_capacity(statement.len() + view.len());
            rewritten.push_str(&statement[..start]);
            rewritten.push_str("FROM ");
            rewritten.push_str(view);
            rewritten.push_str(&statement[start + needle.len()..]);
            return rewritten;
        }
    }
    statement.to_string()
}

fn find_token(haystack: &str, needle: &str) -> Option<usize> {
    haystack.match_indices(needle).map(|(index, _)| index).find(|index| {
        let before = haystack[..*index].chars().next_back();
        let after = haystack[index + needle.len()..].chars().next();
        before.map_or(true, char::is_whitespace) && after.map_or(true, char::is_whitespace)
    })
}

/// Parses the WKT of a centroid with an optional `SRID=<n>;` prefix.
/// `POINT EMPTY`, the centroid of an empty geometry, gives `None`.
pub fn parse_centroid(ewkt: &str) -> Result<Option<geo::Point>> {
    let wkt_text = match ewkt.split_once(';') {
        Some((srid, wkt_text)) if srid.trim().to_ascii_uppercase().starts_with("SRID=") => wkt_text,
        _ => ewkt,
    };
    let parsed = wkt::Wkt::<f64>::from_str(wkt_text.trim()).map_err(|err| {
        ExtractError::protocol(format!("Malformed centroid {:?}: {}", ewkt, err))
    })?;
    match parsed {
        wkt::Wkt { item: wkt::Geometry::Point(wkt::types::Point(None)) } => Ok(None),
        other => geo::Point::try_from(other).map(Some).map_err(|err| {
            ExtractError::protocol(format!("Centroid {:?} is not a point: {}", ewkt, err))
        }),
    }
}

fn row_to_feature(row: &Row) -> Result<Option<RawFeature>> {
    let id: Option<i64> = row.try_get("id")?;
    let centroid: Option<String> = row.try_get("centroid")?;
    let Some(centroid) = centroid else {
        log::warn!("Skipping row {:?} without geometry", id);
        return Ok(None);
    };

    let mut properties = Properties::new();
    for (index, column) in row.columns().iter().enumerate() {
        match column.name() {
            "id" | "centroid" => {}
            "tags" => {
                if let Some(Value::Object(tags)) = row.try_get::<_, Option<Value>>(index)? {
                    properties.extend(tags);
                }
            }
            name => {
                let value: Option<String> = row.try_get(index)?;
                properties.insert(name.to_string(), value.map_or(Value::Null, Value::String));
            }
        }
    }
    build_feature(id, &centroid, properties)
}

/// Turns one result row into a feature with `id` taken from `osm_id`. Rows
/// with an empty centroid are skipped.
pub fn build_feature(
    id: Option<i64>,
    centroid: &str,
    properties: Properties,
) -> Result<Option<RawFeature>> {
    let Some(point) = parse_centroid(centroid)? else {
        log::warn!("Skipping row {:?} with an empty centroid", id);
        return Ok(None);
    };
    Ok(Some(RawFeature::from_point(
        point,
        flatten_tags(properties),
        id.map(Value::from),
    )))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rstest::rstest;
    use serde_json::{json, Value};

    use crate::{
        geofile::{boundary::Boundary, feature::Properties},
        query::sql::build_sql_queries,
        schema::data_model::{CategorySchema, SourceTable, TagPredicate},
    };

    use super::{build_feature, parse_centroid, rewrite_for_view, view_statements, LocalQueryEngine};

    #[rstest]
    #[case("SRID=4326;POINT(36.81 -1.29)", 36.81, -1.29)]
    #[case("POINT(1 2)", 1.0, 2.0)]
    #[case("  POINT(-0.5 51.25) ", -0.5, 51.25)]
    #[case("POINT (1 2)", 1.0, 2.0)]
    #[case("SRID=4326;POINT (1 2)", 1.0, 2.0)]
    fn test_parse_centroid(#[case] ewkt: &str, #[case] lon: f64, #[case] lat: f64) {
        let point = parse_centroid(ewkt).unwrap().unwrap();
        assert_abs_diff_eq!(point, geo::Point::new(lon, lat), epsilon = 1e-12);
    }

    #[rstest]
    #[case("SRID=4326;LINESTRING(0 0,1 1)")]
    #[case("POINT(1)")]
    #[case("POINTS(1 2)")]
    #[case("POINT(a b)")]
    fn test_parse_malformed_centroid(#[case] ewkt: &str) {
        assert!(parse_centroid(ewkt).is_err());
    }

    #[rstest]
    #[case("POINT EMPTY")]
    #[case("SRID=4326;POINT EMPTY")]
    fn test_empty_centroid(#[case] ewkt: &str) {
        assert_eq!(None, parse_centroid(ewkt).unwrap());
    }

    #[test]
    fn test_row_with_empty_centroid_is_skipped() {
        let mut properties = Properties::new();
        properties.insert("tags".to_string(), json!({"amenity": "clinic"}));
        assert_eq!(
            None,
            build_feature(Some(7), "SRID=4326;POINT EMPTY", properties).unwrap()
        );
    }

    #[rstest]
    #[case(
        "SELECT osm_id AS id FROM ways_poly WHERE tags->>'building' IS NOT NULL",
        "SELECT osm_id AS id FROM ways_view WHERE tags->>'building' IS NOT NULL"
    )]
    #[case("SELECT osm_id AS id FROM nodes", "SELECT osm_id AS id FROM nodes_view")]
    #[case("SELECT osm_id AS id FROM ways_line", "SELECT osm_id AS id FROM lines_view")]
    #[case("SELECT osm_id AS id FROM relations", "SELECT osm_id AS id FROM relations")]
    #[case("SELECT osm_id AS id FROM nodes_extra", "SELECT osm_id AS id FROM nodes_extra")]
    fn test_rewrite_for_view(#[case] statement: &str, #[case] expected: &str) {
        assert_eq!(expected, rewrite_for_view(statement));
    }

    #[test]
    fn test_rewrite_touches_first_table_only() {
        let statement = "SELECT * FROM ways_poly JOIN x ON true WHERE id IN (SELECT id FROM ways_poly)";
        assert_eq!(
            "SELECT * FROM ways_view JOIN x ON true WHERE id IN (SELECT id FROM ways_poly)",
            rewrite_for_view(statement)
        );
    }

    #[test]
    fn test_views_are_dropped_before_creation() {
        let statements = view_statements(&Boundary::from_bbox_str("0,0,1,1").unwrap());
        for view in ["ways_view", "nodes_view", "lines_view"] {
            let drop = statements
                .find(&format!("DROP VIEW IF EXISTS {};", view))
                .unwrap();
            let create = statements
                .find(&format!("CREATE TEMP VIEW {} AS", view))
                .unwrap();
            assert!(drop < create);
        }
        let boundary = Boundary::from_bbox_str("0,0,1,1").unwrap();
        assert!(statements.contains(&format!("ST_GeomFromEWKT('{}')", boundary.to_ewkt())));
        assert!(boundary.to_ewkt().starts_with("SRID=4326;POLYGON"));
    }

    #[test]
    fn test_build_feature_synthesizes_labels() {
        let mut properties = Properties::new();
        properties.insert("tags".to_string(), json!({"name": "Town Hall", "amenity": "townhall"}));
        let feature = build_feature(Some(1234), "SRID=4326;POINT(1 2)", properties)
            .unwrap()
            .unwrap();
        assert_eq!(json!(1234), feature.properties["id"]);
        assert_eq!(json!("Town Hall"), feature.properties["title"]);
        assert_eq!(json!("Town Hall"), feature.properties["label"]);
        assert_eq!(json!("townhall"), feature.properties["amenity"]);
        assert_eq!(geo::Point::new(1.0, 2.0), feature.geometry);
    }

    #[test]
    fn test_build_feature_without_name() {
        let feature = build_feature(Some(1), "POINT(1 2)", Properties::new())
            .unwrap()
            .unwrap();
        assert_eq!(Value::Null, feature.properties["title"]);
        assert_eq!(Value::Null, feature.properties["label"]);
    }

    /// Needs a PostGIS database, e.g.
    /// `FIELDWORK_TEST_DATABASE_URL="host=localhost user=postgres dbname=fieldwork_test"`.
    #[test]
    #[ignore = "needs PostGIS"]
    fn test_query_returns_only_contained_features() {
        let url = std::env::var("FIELDWORK_TEST_DATABASE_URL")
            .expect("FIELDWORK_TEST_DATABASE_URL must point at a PostGIS database");
        let mut client = postgres::Client::connect(&url, postgres::NoTls).unwrap();
        client
            .batch_execute(
                "CREATE EXTENSION IF NOT EXISTS postgis;
                 CREATE TEMP TABLE nodes (osm_id bigint, geom geometry(Point, 4326), tags jsonb);
                 CREATE TEMP TABLE ways_poly (osm_id bigint, geom geometry(Polygon, 4326), tags jsonb);
                 CREATE TEMP TABLE ways_line (osm_id bigint, geom geometry(LineString, 4326), tags jsonb);
                 INSERT INTO nodes VALUES
                   (1, ST_GeomFromEWKT('SRID=4326;POINT(0.5 0.5)'), '{\"amenity\": \"clinic\", \"name\": \"Inside\"}'),
                   (2, ST_GeomFromEWKT('SRID=4326;POINT(5 5)'), '{\"amenity\": \"clinic\", \"name\": \"Outside\"}'),
                   (3, ST_GeomFromEWKT('SRID=4326;POINT(0.2 0.2)'), '{\"shop\": \"bakery\"}');
                 INSERT INTO ways_poly VALUES
                   (10, ST_GeomFromEWKT('SRID=4326;POLYGON((0.1 0.1,0.3 0.1,0.3 0.3,0.1 0.3,0.1 0.1))'), '{\"amenity\": \"school\"}'),
                   (11, ST_GeomFromEWKT('SRID=4326;POLYGON((0.9 0.9,1.5 0.9,1.5 1.5,0.9 1.5,0.9 0.9))'), '{\"amenity\": \"school\"}');",
            )
            .unwrap();
        let mut engine = LocalQueryEngine::from_client(client);
        let schema = CategorySchema {
            source_tables: vec![SourceTable::Nodes, SourceTable::WaysPoly],
            selected_tags: None,
            required_tags: vec![("amenity".to_string(), TagPredicate::NotNull)],
        };
        let boundary = Boundary::from_bbox_str("0,0,1,1").unwrap();

        let features = engine
            .query(&build_sql_queries(&schema), &boundary)
            .unwrap();

        let mut ids: Vec<i64> = features
            .iter()
            .map(|feature| feature.properties["id"].as_i64().unwrap())
            .collect();
        ids.sort_unstable();
        assert_eq!(vec![1, 10], ids);
        for feature in &features {
            assert!(boundary.contains(&feature.geometry));
        }
    }
}
