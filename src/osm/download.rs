use std::{collections::BTreeMap, time::Duration};

use serde::Deserialize;

use crate::{
    cancel::CancellationToken,
    error::{ExtractError, Result},
    geofile::{boundary::Boundary, feature::RawFeature},
    source::transport::{with_retry, HttpTransport, ReqwestTransport, RetryPolicy},
};

use super::conversion::way_to_feature;

pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

/// An element of an Overpass `out body geom` response. Ways carry their
/// vertex coordinates inline in `geometry`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct OverpassElement {
    #[serde(rename = "type")]
    pub element_type: String,
    pub id: i64,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub geometry: Vec<Option<LatLon>>,
}

#[derive(Deserialize, Debug)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

/// Buildings inside the boundary polygon, with way geometries inlined.
pub fn build_building_query(boundary: &Boundary) -> String {
    format!(
        "[out:json];way[\"building\"](poly:\"{}\");(._;>;);out body geom;",
        boundary.overpass_poly()
    )
}

/// The ways of an Overpass JSON response; the recursed nodes are dropped.
pub fn parse_overpass_ways(response: &[u8]) -> Result<Vec<OverpassElement>> {
    let response: OverpassResponse = serde_json::from_slice(response)
        .map_err(|err| ExtractError::protocol(format!("Invalid Overpass response: {}", err)))?;
    Ok(response
        .elements
        .into_iter()
        .filter(|element| element.element_type == "way")
        .collect())
}

pub struct OverpassClient<T: HttpTransport = ReqwestTransport> {
    transport: T,
    url: String,
    retry: RetryPolicy,
}

impl OverpassClient<ReqwestTransport> {
    pub fn new(url: &str, request_timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        Ok(Self::with_transport(
            ReqwestTransport::new(request_timeout)?,
            url,
            retry,
        ))
    }
}

impl<T: HttpTransport> OverpassClient<T> {
    pub fn with_transport(transport: T, url: &str, retry: RetryPolicy) -> Self {
        Self {
            transport,
            url: url.to_string(),
            retry,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// POSTs the query as the form field `data`, retrying transient failures.
    pub fn download(&self, query: &str, cancel: &CancellationToken) -> Result<Vec<u8>> {
        log::debug!("Overpass query: {}", query);
        with_retry(&self.retry, cancel, "Overpass query", || {
            self.transport.post_form(&self.url, &[("data", query)])
        })
    }

    /// Building centroids inside the boundary. Only buildings are queried,
    /// whatever category is being extracted.
    pub fn get_features(
        &self,
        boundary: &Boundary,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawFeature>> {
        log::info!("Extracting buildings from {}", self.url);
        let response = self.download(&build_building_query(boundary), cancel)?;
        let ways = parse_overpass_ways(&response)?;
        log::info!("Overpass returned {} ways", ways.len());
        let mut features = Vec::with_capacity(ways.len());
        for way in &ways {
            match way_to_feature(way) {
                Ok(feature) => features.push(feature),
                Err(err) => log::warn!("Skipping way {}: {}", way.id, err),
            }
        }
        Ok(features)
    }
}
