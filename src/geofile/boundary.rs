use std::{fs::read_to_string, path::Path};

use geo::Contains;
use wkt::ToWkt;

use crate::error::{ExtractError, Result};

/// Spatial reference id of geographic WGS84 coordinates.
const WGS84_SRID: u32 = 4326;

/// Area of interest that constrains every query, in lon/lat coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    polygon: geo::Polygon,
}

impl Boundary {
    pub fn new(polygon: geo::Polygon) -> Result<Self> {
        if polygon.exterior().0.len() < 4 {
            return Err(ExtractError::config(
                "Boundary polygon needs at least three distinct vertices",
            ));
        }
        Ok(Self { polygon })
    }

    /// Accepts either a path to a GeoJSON file or a `minx,miny,maxx,maxy` string.
    pub fn load(boundary: &str) -> Result<Self> {
        let path = Path::new(boundary);
        if path.exists() {
            return Self::from_file(path);
        }
        Self::from_bbox_str(boundary).map_err(|err| {
            ExtractError::config(format!(
                "Boundary {:?} is neither an existing file nor a BBOX string ({})",
                boundary, err
            ))
        })
    }

    pub fn from_file(filepath: &Path) -> Result<Self> {
        log::debug!("Reading boundary from {:?}", filepath);
        let contents = read_to_string(filepath).map_err(|err| ExtractError::io(filepath, err))?;
        Self::from_geojson_str(&contents)
    }

    /// A bare geometry, a Feature, or the first feature of a FeatureCollection.
    pub fn from_geojson_str(contents: &str) -> Result<Self> {
        let geojson: geojson::GeoJson = contents
            .parse()
            .map_err(|err| ExtractError::config(format!("Boundary is not GeoJSON: {}", err)))?;
        let geometry = match geojson {
            geojson::GeoJson::FeatureCollection(collection) => collection
                .features
                .into_iter()
                .next()
                .and_then(|feature| feature.geometry),
            geojson::GeoJson::Feature(feature) => feature.geometry,
            geojson::GeoJson::Geometry(geometry) => Some(geometry),
        }
        .ok_or_else(|| ExtractError::config("Boundary has no geometry"))?;

        let geometry = geo::Geometry::<f64>::try_from(geometry.value).map_err(|err| {
            ExtractError::config(format!("Unsupported boundary geometry: {}", err))
        })?;
        match geometry {
            geo::Geometry::Polygon(polygon) => Self::new(polygon),
            geo::Geometry::MultiPolygon(multi_polygon) => {
                let first = multi_polygon
                    .0
                    .into_iter()
                    .next()
                    .ok_or_else(|| ExtractError::config("Boundary MultiPolygon is empty"))?;
                Self::new(first)
            }
            other => Err(ExtractError::config(format!(
                "Boundary must be a polygon, got {:?}",
                other
            ))),
        }
    }

    pub fn from_bbox_str(bbox: &str) -> Result<Self> {
        let parts: Vec<&str> = if bbox.contains(',') {
            bbox.split(',').collect()
        } else {
            bbox.split_whitespace().collect()
        };
        let values = parts
            .iter()
            .map(|part| part.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<f64>, _>>()
            .map_err(|_| ExtractError::config(format!("Failed to parse BBOX string: {}", bbox)))?;
        let &[min_x, min_y, max_x, max_y] = values.as_slice() else {
            return Err(ExtractError::config(format!(
                "BBOX string malformed, expected 4 values: {}",
                bbox
            )));
        };
        if min_x >= max_x || min_y >= max_y {
            return Err(ExtractError::config(format!(
                "BBOX string has an empty extent: {}",
                bbox
            )));
        }
        Self::new(geo::Polygon::new(
            vec![
                (min_x, min_y),
                (max_x, min_y),
                (max_x, max_y),
                (min_x, max_y),
                (min_x, min_y),
            ]
            .into(),
            vec![],
        ))
    }

    pub fn contains(&self, point: &geo::Point) -> bool {
        self.polygon.contains(point)
    }

    pub fn to_wkt(&self) -> String {
        self.polygon.wkt_string()
    }

    pub fn to_ewkt(&self) -> String {
        format!("SRID={};{}", WGS84_SRID, self.to_wkt())
    }

    /// Exterior ring flattened for the Overpass `poly:` filter, which takes
    /// space separated `lat lon` pairs.
    pub fn overpass_poly(&self) -> String {
        self.polygon
            .exterior()
            .coords()
            .map(|coord| format!("{} {}", coord.y, coord.x))
            .collect::<Vec<String>>()
            .join(" ")
    }

    pub fn to_geojson_value(&self) -> Result<serde_json::Value> {
        let geometry = geojson::Geometry::new(geojson::Value::from(&self.polygon));
        serde_json::to_value(geometry)
            .map_err(|err| ExtractError::config(format!("Cannot encode boundary: {}", err)))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rstest::rstest;
    use testdir::testdir;

    use crate::error::ExtractError;

    use super::Boundary;

    fn parse_polygon(wkt_text: &str) -> geo::Polygon {
        geo::Polygon::try_from(wkt::Wkt::<f64>::from_str(wkt_text).unwrap()).unwrap()
    }

    const SQUARE: &str = r#"{"type": "Polygon", "coordinates": [[[0, 0], [10, 0], [10, 10], [0, 10], [0, 0]]]}"#;

    #[test]
    fn test_bare_geometry() {
        let boundary = Boundary::from_geojson_str(SQUARE).unwrap();
        assert!(boundary.contains(&geo::Point::new(5.0, 5.0)));
        assert!(!boundary.contains(&geo::Point::new(15.0, 5.0)));
    }

    #[test]
    fn test_first_feature_of_collection() {
        let collection = format!(
            r#"{{"type": "FeatureCollection", "features": [
                {{"type": "Feature", "properties": {{}}, "geometry": {}}},
                {{"type": "Feature", "properties": {{}}, "geometry": {{"type": "Point", "coordinates": [1, 1]}}}}
            ]}}"#,
            SQUARE
        );
        let boundary = Boundary::from_geojson_str(&collection).unwrap();
        assert_eq!(Boundary::from_geojson_str(SQUARE).unwrap(), boundary);
    }

    #[test]
    fn test_point_boundary_is_rejected() {
        let err =
            Boundary::from_geojson_str(r#"{"type": "Point", "coordinates": [1, 2]}"#).unwrap_err();
        assert!(err.to_string().contains("must be a polygon"));
    }

    #[rstest]
    #[case("1,2,3,4")]
    #[case("1 2 3 4")]
    #[case(" 1 , 2 , 3 , 4 ")]
    fn test_bbox_strings(#[case] bbox: &str) {
        let boundary = Boundary::from_bbox_str(bbox).unwrap();
        let expected: geo::Polygon = geo::Polygon::new(
            vec![(1.0, 2.0), (3.0, 2.0), (3.0, 4.0), (1.0, 4.0), (1.0, 2.0)].into(),
            vec![],
        );
        assert_eq!(expected, parse_polygon(&boundary.to_wkt()));
    }

    #[rstest]
    #[case("1,2,3")]
    #[case("a,b,c,d")]
    #[case("3,2,1,4")]
    fn test_malformed_bbox_strings(#[case] bbox: &str) {
        assert!(Boundary::from_bbox_str(bbox).is_err());
    }

    #[test]
    fn test_ewkt_and_overpass_poly() {
        let boundary = Boundary::from_bbox_str("1.5,2,3,4").unwrap();
        let ewkt = boundary.to_ewkt();
        let wkt_text = ewkt.strip_prefix("SRID=4326;").unwrap();
        assert_eq!(
            Boundary::from_bbox_str("1.5,2,3,4").unwrap(),
            Boundary::new(parse_polygon(wkt_text)).unwrap()
        );
        assert_eq!("2 1.5 2 3 4 3 4 1.5 2 1.5", boundary.overpass_poly());
    }

    #[test]
    fn test_load_prefers_existing_file() {
        let dir = testdir!();
        let path = dir.join("aoi.geojson");
        std::fs::write(&path, SQUARE).unwrap();
        let boundary = Boundary::load(path.to_str().unwrap()).unwrap();
        assert!(boundary.contains(&geo::Point::new(1.0, 1.0)));
    }

    #[test]
    fn test_load_reports_missing_file_and_bad_bbox() {
        let missing = testdir!().join("aoi.geojsn");
        let err = Boundary::load(missing.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ExtractError::Config { .. }));
        assert!(err
            .to_string()
            .contains("neither an existing file nor a BBOX string"));
    }
}
