pub mod boundary;
pub mod feature;
pub mod geojson;
