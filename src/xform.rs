use std::{fs::read_to_string, path::Path, sync::LazyLock};

use regex::Regex;

use crate::error::{ExtractError, Result};

/// `jr://file/...` reference to a GeoJSON instance, up to the first quote,
/// whitespace or tag delimiter.
static GEOJSON_REFERENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"jr://file[^\s"'<>]*?\.geojson"#).expect("valid regex"));

/// File name of the GeoJSON the XForm loads through `jr://file/...`, which is
/// where the extract has to be written for the form to pick it up.
pub fn output_name_from_xform(xform_filepath: &Path) -> Result<String> {
    if !xform_filepath.exists() {
        return Err(ExtractError::config(format!(
            "XForm {:?} not found",
            xform_filepath
        )));
    }
    let contents =
        read_to_string(xform_filepath).map_err(|err| ExtractError::io(xform_filepath, err))?;
    output_name_from_xform_str(&contents).ok_or_else(|| {
        ExtractError::config(format!(
            "XForm {:?} references no jr://file GeoJSON",
            xform_filepath
        ))
    })
}

pub fn output_name_from_xform_str(contents: &str) -> Option<String> {
    let reference = GEOJSON_REFERENCE_RE.find(contents)?.as_str();
    reference
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}
