use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::error::{ExtractError, Result};

use super::category::Category;

/// Source tables of an OSM database import.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTable {
    Nodes,
    WaysPoly,
    WaysLine,
    Relations,
}

impl SourceTable {
    pub fn table_name(&self) -> &'static str {
        match self {
            SourceTable::Nodes => "nodes",
            SourceTable::WaysPoly => "ways_poly",
            SourceTable::WaysLine => "ways_line",
            SourceTable::Relations => "relations",
        }
    }

    /// Geometry type understood by the snapshot API. Relations are not supported.
    pub fn snapshot_geometry_type(&self) -> Option<&'static str> {
        match self {
            SourceTable::Nodes => Some("point"),
            SourceTable::WaysPoly => Some("polygon"),
            SourceTable::WaysLine => Some("linestring"),
            SourceTable::Relations => None,
        }
    }
}

/// Presence predicate on a required tag. Only `not null` has a meaning today.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TagPredicate {
    NotNull,
    Unrecognized(String),
}

impl From<&str> for TagPredicate {
    fn from(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("not null") {
            TagPredicate::NotNull
        } else {
            TagPredicate::Unrecognized(value.to_string())
        }
    }
}

/// A tag projected into the output under its own field name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectedTag {
    pub output: String,
    pub source: String,
}

/// Declarative data model of a category: which tables to read, which tags to
/// keep and which tags a feature must carry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategorySchema {
    pub source_tables: Vec<SourceTable>,
    pub selected_tags: Option<Vec<SelectedTag>>,
    pub required_tags: Vec<(String, TagPredicate)>,
}

#[derive(Deserialize, Debug)]
struct RawDataModel {
    from: Vec<SourceTable>,
    #[serde(default)]
    select: Option<Mapping>,
    #[serde(rename = "where", default)]
    where_clause: Option<RawWhere>,
}

#[derive(Deserialize, Debug)]
struct RawWhere {
    #[serde(default)]
    tags: Vec<Mapping>,
}

impl CategorySchema {
    pub fn data_model_path(data_models_dir: &Path, category: Category) -> PathBuf {
        data_models_dir.join(format!("{}.yaml", category.name()))
    }

    pub fn load(data_models_dir: &Path, category: Category) -> Result<Self> {
        let path = Self::data_model_path(data_models_dir, category);
        if !path.exists() {
            return Err(ExtractError::config(format!(
                "Data model {:?} not found for category {}",
                path, category
            )));
        }
        let contents = read_to_string(&path).map_err(|err| ExtractError::io(&path, err))?;
        log::debug!("Loaded data model {:?}", path);
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let raw: RawDataModel = serde_yaml::from_str(contents)
            .map_err(|err| ExtractError::config(format!("Malformed data model: {}", err)))?;

        let selected_tags = raw.select.as_ref().and_then(parse_selected_tags);

        let mut required_tags: Vec<(String, TagPredicate)> = Vec::new();
        if let Some(where_clause) = raw.where_clause {
            for mapping in &where_clause.tags {
                for (key, value) in mapping {
                    let tag = yaml_scalar(key).ok_or_else(|| {
                        ExtractError::config(format!("Non-scalar tag name {:?} in where.tags", key))
                    })?;
                    let predicate = yaml_scalar(value).unwrap_or_default();
                    // Later entries for the same tag replace earlier ones.
                    required_tags.retain(|(existing, _)| *existing != tag);
                    required_tags.push((tag, TagPredicate::from(predicate.as_str())));
                }
            }
        }

        Ok(Self {
            source_tables: raw.from,
            selected_tags,
            required_tags,
        })
    }

    /// Required tags whose predicate is `not null`, in data model order.
    pub fn not_null_tags(&self) -> impl Iterator<Item = &str> {
        self.required_tags
            .iter()
            .filter(|(_, predicate)| *predicate == TagPredicate::NotNull)
            .map(|(tag, _)| tag.as_str())
    }
}

/// `select.tags` lists the output fields; each one is looked up in `select`
/// for its source tag. Entries may also be inline `{output: source}` pairs.
fn parse_selected_tags(select: &Mapping) -> Option<Vec<SelectedTag>> {
    let tags = match select.get(Value::from("tags")) {
        Some(Value::Sequence(tags)) => tags,
        _ => return None,
    };
    let selected = tags
        .iter()
        .filter_map(|entry| match entry {
            Value::Mapping(pair) => pair.iter().next().and_then(|(output, source)| {
                Some(SelectedTag {
                    output: yaml_scalar(output)?,
                    source: yaml_scalar(source)?,
                })
            }),
            other => {
                let output = yaml_scalar(other)?;
                let source = select
                    .get(Value::from(output.as_str()))
                    .and_then(yaml_scalar)
                    .unwrap_or_else(|| output.clone());
                Some(SelectedTag { output, source })
            }
        })
        .collect();
    Some(selected)
}

fn yaml_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}
