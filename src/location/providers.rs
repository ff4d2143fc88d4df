//! Network providers: ureq JSON transport, Nominatim reverse geocoding,
//! IP geolocation endpoints, and the REST backend for profiles and listings.

use super::collaborators::{
    Address, JsonFetcher, ListingCounter, Position, ProfileSource, ReverseGeocoder, SavedAddress,
    Session,
};
use super::types::LocationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Run a blocking ureq call off the async executor.
async fn run_blocking<T, F>(f: F) -> Result<T, LocationError>
where
    F: FnOnce() -> Result<T, LocationError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| LocationError::ProviderUnavailable(format!("request worker failed: {}", e)))?
}

fn describe_ureq_error(url: &str, err: ureq::Error) -> String {
    match err {
        ureq::Error::Status(code, _) => format!("{} returned HTTP {}", url, code),
        other => other.to_string(),
    }
}

// ─── JSON transport ─────────────────────────────────────────────

/// Blocking ureq agent wrapped for async callers.
#[derive(Clone)]
pub struct UreqFetcher {
    agent: ureq::Agent,
}

impl UreqFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .user_agent(user_agent)
            .timeout(timeout)
            .build();
        Self { agent }
    }
}

#[async_trait]
impl JsonFetcher for UreqFetcher {
    async fn get_json(&self, url: &str, query: &[(String, String)]) -> Result<Value, LocationError> {
        let agent = self.agent.clone();
        let url = url.to_string();
        let query = query.to_vec();

        run_blocking(move || {
            let mut request = agent.get(&url);
            for (key, value) in &query {
                request = request.query(key, value);
            }
            let response = request
                .call()
                .map_err(|e| LocationError::ProviderUnavailable(describe_ureq_error(&url, e)))?;
            response
                .into_json::<Value>()
                .map_err(|e| LocationError::InvalidResponse(e.to_string()))
        })
        .await
    }
}

// ─── Nominatim reverse geocoding ────────────────────────────────

pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";

#[derive(Deserialize, Debug, Default)]
struct NominatimReverse {
    #[serde(default)]
    address: Option<NominatimAddress>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
    state: Option<String>,
    #[serde(rename = "ISO3166-2-lvl4")]
    iso_subdivision: Option<String>,
}

/// Reverse geocoder backed by OpenStreetMap Nominatim.
pub struct NominatimGeocoder {
    http: Arc<dyn JsonFetcher>,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(http: Arc<dyn JsonFetcher>, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    async fn reverse(&self, position: Position) -> Result<Address, LocationError> {
        let url = format!("{}/reverse", self.base_url);
        let query = vec![
            ("lat".to_string(), position.latitude.to_string()),
            ("lon".to_string(), position.longitude.to_string()),
            ("format".to_string(), "jsonv2".to_string()),
            ("zoom".to_string(), "10".to_string()),
            ("addressdetails".to_string(), "1".to_string()),
        ];
        let body = self.http.get_json(&url, &query).await?;
        parse_reverse(body)
    }
}

fn parse_reverse(body: Value) -> Result<Address, LocationError> {
    let reverse: NominatimReverse = serde_json::from_value(body)
        .map_err(|e| LocationError::InvalidResponse(e.to_string()))?;

    if let Some(err) = reverse.error {
        return Err(LocationError::InvalidResponse(err));
    }

    let address = reverse
        .address
        .ok_or_else(|| LocationError::InvalidResponse("reverse geocode has no address".into()))?;

    // "BR-SC" → "SC" when no state name is present
    let subdivision_code = address
        .iso_subdivision
        .as_deref()
        .and_then(|code| code.split_once('-'))
        .map(|(_, sub)| sub.to_string());

    Ok(Address {
        city: address
            .city
            .or(address.town)
            .or(address.village)
            .or(address.municipality),
        region: address.state.or(subdivision_code),
    })
}

// ─── IP-based geolocation ───────────────────────────────────────

/// One IP geolocation endpoint and where its JSON keeps city and region.
///
/// Field names are top-level keys, or JSON pointers when they start with `/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpProvider {
    pub name: String,
    pub url: String,
    pub city_field: String,
    pub region_field: String,
}

impl IpProvider {
    pub fn new(name: &str, url: &str, city_field: &str, region_field: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            city_field: city_field.to_string(),
            region_field: region_field.to_string(),
        }
    }

    /// Pull `(city, region)` out of a provider response, if both are present.
    pub fn extract(&self, body: &Value) -> Option<(String, String)> {
        let city = field_str(body, &self.city_field)?;
        let region = field_str(body, &self.region_field)?;
        Some((city, region))
    }
}

fn field_str(body: &Value, field: &str) -> Option<String> {
    let value = if field.starts_with('/') {
        body.pointer(field)
    } else {
        body.get(field)
    }?;
    let s = value.as_str()?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// The default provider chain, in the order it is tried.
pub fn default_ip_providers() -> Vec<IpProvider> {
    vec![
        IpProvider::new("ipapi.co", "https://ipapi.co/json/", "city", "region_code"),
        IpProvider::new("ipwho.is", "https://ipwho.is/", "city", "region_code"),
        IpProvider::new("ip-api.com", "http://ip-api.com/json/", "city", "region"),
        IpProvider::new("freeipapi", "https://freeipapi.com/api/json", "cityName", "regionName"),
    ]
}

// ─── REST backend (profiles + listings) ─────────────────────────

/// PostgREST-style backend holding user profiles and listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub url: String,
    pub api_key: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "default_profiles_table")]
    pub profiles_table: String,
    #[serde(default = "default_listings_table")]
    pub listings_table: String,
}

fn default_profiles_table() -> String {
    "profiles".into()
}

fn default_listings_table() -> String {
    "establishments".into()
}

#[derive(Deserialize)]
struct ProfileRow {
    city: Option<String>,
    state: Option<String>,
}

pub struct RestBackend {
    agent: ureq::Agent,
    config: BackendConfig,
}

impl RestBackend {
    pub fn new(config: BackendConfig, user_agent: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .user_agent(user_agent)
            .timeout(timeout)
            .build();
        Self { agent, config }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.url.trim_end_matches('/'), table)
    }

    fn bearer(&self) -> String {
        let token = self
            .config
            .access_token
            .as_deref()
            .unwrap_or(&self.config.api_key);
        format!("Bearer {}", token)
    }
}

#[async_trait]
impl ProfileSource for RestBackend {
    async fn current_session(&self) -> Result<Option<Session>, LocationError> {
        Ok(match (&self.config.access_token, &self.config.user_id) {
            (Some(_), Some(user_id)) => Some(Session {
                user_id: user_id.clone(),
            }),
            _ => None,
        })
    }

    async fn saved_address(&self, user_id: &str) -> Result<Option<SavedAddress>, LocationError> {
        let request = self
            .agent
            .get(&self.table_url(&self.config.profiles_table))
            .set("apikey", &self.config.api_key)
            .set("Authorization", &self.bearer())
            .query("select", "city,state")
            .query("id", &format!("eq.{}", user_id))
            .query("limit", "1");
        let url = self.table_url(&self.config.profiles_table);

        run_blocking(move || {
            let rows: Vec<ProfileRow> = request
                .call()
                .map_err(|e| LocationError::ProviderUnavailable(describe_ureq_error(&url, e)))?
                .into_json()
                .map_err(|e| LocationError::InvalidResponse(e.to_string()))?;
            Ok(rows.into_iter().next().map(|row| SavedAddress {
                city: row.city,
                region: row.state,
            }))
        })
        .await
    }
}

#[async_trait]
impl ListingCounter for RestBackend {
    async fn count_active(&self, city: &str, region: &str) -> Result<u64, LocationError> {
        // ilike without wildcards is a case-insensitive equality match
        let request = self
            .agent
            .head(&self.table_url(&self.config.listings_table))
            .set("apikey", &self.config.api_key)
            .set("Authorization", &self.bearer())
            .set("Prefer", "count=exact")
            .query("select", "id")
            .query("city", &format!("ilike.{}", city))
            .query("state", &format!("ilike.{}", region))
            .query("is_active", "eq.true");
        let url = self.table_url(&self.config.listings_table);

        run_blocking(move || {
            let response = request
                .call()
                .map_err(|e| LocationError::VerifierQueryFailed(describe_ureq_error(&url, e)))?;
            response
                .header("content-range")
                .and_then(parse_content_range_total)
                .ok_or_else(|| {
                    LocationError::VerifierQueryFailed("response carries no total count".into())
                })
        })
        .await
    }
}

/// "0-24/3573" or "*/0" → total.
fn parse_content_range_total(header: &str) -> Option<u64> {
    header.rsplit('/').next()?.trim().parse().ok()
}
