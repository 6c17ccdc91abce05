//! Providers backed by public web services.
//!
//! | Factor      | Service                                   |
//! |-------------|-------------------------------------------|
//! | land cover  | OpenStreetMap Overpass (`landuse` tags)   |
//! | soil        | ISRIC SoilGrids v2 (clay, phh2o at 0-5cm) |
//! | solar       | Google Solar `buildingInsights`           |
//! | air quality | Google Air Quality `currentConditions`    |
//!
//! Every request carries a timeout. Transport errors, non-success statuses and bodies that
//! lack the expected fields all become [`ProviderError::Unavailable`]; an elapsed timeout
//! becomes [`ProviderError::Timeout`].
//!
//! # Usage
//!
//! ```rust,ignore
//! let soil = SoilGridsProvider::new(SOIL_GRIDS_URL, Duration::from_secs(10))?;
//! let providers = ProviderSet::new().with_soil(soil);
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{AirQualityProvider, LandCoverProvider, ProviderError, SoilProvider, SolarProvider};
use crate::sample::{AirQualitySample, LandCoverElement, LandCoverSample, SoilSample, SolarSample};
use crate::spatial::Coordinate;

pub const SOIL_GRIDS_URL: &str = "https://rest.isric.org/soilgrids/v2.0";
pub const OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";
pub const GOOGLE_SOLAR_URL: &str = "https://solar.googleapis.com/v1";
pub const GOOGLE_AIR_QUALITY_URL: &str = "https://airquality.googleapis.com/v1";

pub const DEFAULT_OVERPASS_RADIUS_M: u32 = 500;

fn build_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().timeout(timeout).build()
}

fn request_error(service: &str, timeout: Duration, err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(timeout)
    } else {
        ProviderError::unavailable(format!("{service} request failed: {err}"))
    }
}

/// Sends the request and returns the body of a successful response.
async fn send(
    service: &str,
    timeout: Duration,
    request: reqwest::RequestBuilder,
) -> Result<String, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| request_error(service, timeout, e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::unavailable(format!(
            "{service} returned status {status}"
        )));
    }
    response
        .text()
        .await
        .map_err(|e| request_error(service, timeout, e))
}

fn parse_json<T: for<'de> Deserialize<'de>>(service: &str, body: &str) -> Result<T, ProviderError> {
    serde_json::from_str(body)
        .map_err(|e| ProviderError::unavailable(format!("{service} response unreadable: {e}")))
}

// ---------------------------------------------------------------------------
// SoilGrids
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SoilGridsResponse {
    properties: SoilGridsProperties,
}

#[derive(Debug, Deserialize)]
struct SoilGridsProperties {
    #[serde(default)]
    layers: Vec<SoilGridsLayer>,
}

#[derive(Debug, Deserialize)]
struct SoilGridsLayer {
    name: String,
    #[serde(default)]
    unit_measure: Option<SoilGridsUnit>,
    #[serde(default)]
    depths: Vec<SoilGridsDepth>,
}

#[derive(Debug, Deserialize)]
struct SoilGridsUnit {
    d_factor: f64,
}

#[derive(Debug, Deserialize)]
struct SoilGridsDepth {
    label: String,
    values: SoilGridsValues,
}

#[derive(Debug, Deserialize)]
struct SoilGridsValues {
    mean: Option<f64>,
}

impl SoilGridsLayer {
    /// Topsoil mean in conventional units. SoilGrids stores clay as g/kg and pH as pH*10;
    /// `d_factor` converts both.
    fn topsoil_mean(&self) -> Option<f64> {
        let depth = self.depths.iter().find(|d| d.label == "0-5cm")?;
        let raw = depth.values.mean?;
        let factor = self
            .unit_measure
            .as_ref()
            .map(|u| u.d_factor)
            .filter(|f| *f > 0.0)
            .unwrap_or(1.0);
        Some(raw / factor)
    }
}

/// Reads clay (%) and pH from a SoilGrids `properties/query` response.
pub fn parse_soil_grids(body: &str) -> Result<SoilSample, ProviderError> {
    let response: SoilGridsResponse = parse_json("SoilGrids", body)?;
    let layer = |name: &str| {
        response
            .properties
            .layers
            .iter()
            .find(|l| l.name == name)
            .and_then(SoilGridsLayer::topsoil_mean)
    };
    let sample = SoilSample {
        // g/kg / d_factor 10 gives %
        clay_pct: layer("clay"),
        ph: layer("phh2o"),
    };
    if sample.clay_pct.is_none() && sample.ph.is_none() {
        return Err(ProviderError::unavailable(
            "SoilGrids has no topsoil clay or pH for this location",
        ));
    }
    Ok(sample)
}

pub struct SoilGridsProvider {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl SoilGridsProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into(),
            timeout,
        })
    }
}

#[async_trait]
impl SoilProvider for SoilGridsProvider {
    fn name(&self) -> &str {
        "soil_grids"
    }

    async fn soil(&self, at: Coordinate) -> Result<SoilSample, ProviderError> {
        let url = format!("{}/properties/query", self.base_url.trim_end_matches('/'));
        let request = self.client.get(url).query(&[
            ("lon", at.lng.to_string()),
            ("lat", at.lat.to_string()),
            ("property", "clay".to_string()),
            ("property", "phh2o".to_string()),
            ("depth", "0-5cm".to_string()),
            ("value", "mean".to_string()),
        ]);
        let body = send("SoilGrids", self.timeout, request).await?;
        parse_soil_grids(&body)
    }
}

// ---------------------------------------------------------------------------
// Overpass
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(default)]
    tags: Option<OverpassTags>,
}

#[derive(Debug, Deserialize)]
struct OverpassTags {
    landuse: Option<String>,
}

pub fn parse_overpass(body: &str) -> Result<LandCoverSample, ProviderError> {
    let response: OverpassResponse = parse_json("Overpass", body)?;
    let elements = response
        .elements
        .into_iter()
        .map(|el| LandCoverElement {
            landuse: el.tags.and_then(|t| t.landuse),
        })
        .collect();
    Ok(LandCoverSample { elements })
}

pub fn overpass_query(at: Coordinate, radius_m: u32) -> String {
    let around = format!("around:{radius_m},{},{}", at.lat, at.lng);
    format!(
        "[out:json][timeout:25];\
         (way[\"landuse\"]({around});relation[\"landuse\"]({around}););\
         out tags;"
    )
}

/// Land-use elements within `radius_m` of the location.
pub struct OverpassLandCoverProvider {
    client: reqwest::Client,
    base_url: String,
    radius_m: u32,
    timeout: Duration,
}

impl OverpassLandCoverProvider {
    pub fn new(
        base_url: impl Into<String>,
        radius_m: u32,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into(),
            radius_m,
            timeout,
        })
    }
}

#[async_trait]
impl LandCoverProvider for OverpassLandCoverProvider {
    fn name(&self) -> &str {
        "overpass"
    }

    async fn land_cover(&self, at: Coordinate) -> Result<LandCoverSample, ProviderError> {
        let query = overpass_query(at, self.radius_m);
        let request = self.client.post(&self.base_url).form(&[("data", query)]);
        let body = send("Overpass", self.timeout, request).await?;
        parse_overpass(&body)
    }
}

// ---------------------------------------------------------------------------
// Google Solar
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildingInsights {
    solar_potential: Option<SolarPotential>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SolarPotential {
    max_sunshine_hours_per_year: Option<f64>,
}

pub fn parse_building_insights(body: &str) -> Result<SolarSample, ProviderError> {
    let insights: BuildingInsights = parse_json("Google Solar", body)?;
    insights
        .solar_potential
        .and_then(|p| p.max_sunshine_hours_per_year)
        .map(|hours| SolarSample {
            sunshine_hours_per_year: hours,
        })
        .ok_or_else(|| ProviderError::unavailable("Google Solar reported no sunshine hours"))
}

pub struct GoogleSolarProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl GoogleSolarProvider {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: GOOGLE_SOLAR_URL.to_string(),
            api_key: api_key.into(),
            timeout,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SolarProvider for GoogleSolarProvider {
    fn name(&self) -> &str {
        "google_solar"
    }

    async fn solar(&self, at: Coordinate) -> Result<SolarSample, ProviderError> {
        let url = format!(
            "{}/buildingInsights:findClosest",
            self.base_url.trim_end_matches('/')
        );
        let request = self.client.get(url).query(&[
            ("location.latitude", at.lat.to_string()),
            ("location.longitude", at.lng.to_string()),
            ("requiredQuality", "HIGH".to_string()),
            ("key", self.api_key.clone()),
        ]);
        let body = send("Google Solar", self.timeout, request).await?;
        parse_building_insights(&body)
    }
}

// ---------------------------------------------------------------------------
// Google Air Quality
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct LookupRequest {
    location: LookupLocation,
}

#[derive(Debug, Serialize)]
struct LookupLocation {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct CurrentConditions {
    #[serde(default)]
    indexes: Vec<AirQualityIndex>,
}

#[derive(Debug, Deserialize)]
struct AirQualityIndex {
    aqi: Option<f64>,
}

pub fn parse_current_conditions(body: &str) -> Result<AirQualitySample, ProviderError> {
    let conditions: CurrentConditions = parse_json("Google Air Quality", body)?;
    conditions
        .indexes
        .first()
        .and_then(|index| index.aqi)
        .map(|aqi| AirQualitySample { aqi })
        .ok_or_else(|| ProviderError::unavailable("Google Air Quality reported no index"))
}

/// Reads the first index of `currentConditions:lookup`, the Universal AQI unless the account
/// is configured for a local index.
pub struct GoogleAirQualityProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl GoogleAirQualityProvider {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: GOOGLE_AIR_QUALITY_URL.to_string(),
            api_key: api_key.into(),
            timeout,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl AirQualityProvider for GoogleAirQualityProvider {
    fn name(&self) -> &str {
        "google_air_quality"
    }

    async fn air_quality(&self, at: Coordinate) -> Result<AirQualitySample, ProviderError> {
        let url = format!(
            "{}/currentConditions:lookup",
            self.base_url.trim_end_matches('/')
        );
        let request = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&LookupRequest {
                location: LookupLocation {
                    latitude: at.lat,
                    longitude: at.lng,
                },
            });
        let body = send("Google Air Quality", self.timeout, request).await?;
        parse_current_conditions(&body)
    }
}
