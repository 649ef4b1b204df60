use serde::Deserialize;

use crate::schema::data_model::{CategorySchema, SourceTable};

/// Centroid of the source geometry as EWKT, e.g. `SRID=4326;POINT(36.8 -1.3)`.
pub const CENTROID_COLUMN: &str = "ST_AsEWKT(ST_Centroid(geom)) AS centroid";

/// How the required-tag conditions are combined.
///
/// `Or` keeps every row carrying any one of the required tags, which is the
/// long-standing behaviour of the data models. `And` demands all of them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagJoin {
    #[default]
    Or,
    And,
}

impl TagJoin {
    fn separator(&self) -> &'static str {
        match self {
            TagJoin::Or => " OR ",
            TagJoin::And => " AND ",
        }
    }
}

/// One statement per source table, combining required tags with `OR`.
pub fn build_sql_queries(schema: &CategorySchema) -> Vec<String> {
    build_sql_queries_with_join(schema, TagJoin::Or)
}

pub fn build_sql_queries_with_join(schema: &CategorySchema, join: TagJoin) -> Vec<String> {
    schema
        .source_tables
        .iter()
        .filter(|table| **table != SourceTable::Relations)
        .map(|table| build_statement(schema, *table, join))
        .collect()
}

fn build_statement(schema: &CategorySchema, table: SourceTable, join: TagJoin) -> String {
    let mut columns: Vec<String> = Vec::new();
    if let Some(selected_tags) = &schema.selected_tags {
        columns.extend(selected_tags.iter().map(|tag| {
            format!(
                "tags->>'{}' AS {}",
                escape_literal(&tag.source),
                quote_identifier(&tag.output)
            )
        }));
        columns.push("osm_id AS id".to_string());
        columns.push(CENTROID_COLUMN.to_string());
    } else {
        columns.push("osm_id AS id".to_string());
        columns.push(CENTROID_COLUMN.to_string());
        columns.push("tags".to_string());
    }

    let mut query = format!(
        "SELECT {} FROM {}",
        columns.join(", "),
        table.table_name()
    );

    let conditions: Vec<String> = schema
        .not_null_tags()
        .map(|tag| format!("tags->>'{}' IS NOT NULL", escape_literal(tag)))
        .collect();
    if !conditions.is_empty() {
        query.push_str(" WHERE ");
        query.push_str(&conditions.join(join.separator()));
    }
    query
}

fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

fn quote_identifier(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}
