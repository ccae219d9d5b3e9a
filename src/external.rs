use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::UpstreamConfig;
use crate::error::{AppError, AppResult};

/// The fixed category list the UI offers. The server deliberately does not
/// enforce it; posts keep category as free text.
pub const CATEGORIES: &[&str] = &[
    "Infrastructure",
    "Public Utilities",
    "Urban Maintenance",
    "Public Safety & Law Enforcement",
    "Emergency Services",
    "Traffic & Transportation",
    "Environmental Issues",
    "Civic Administration",
    "Public Health & Hygiene",
    "Community & Social Issues",
];

fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .expect("failed to build HTTP client")
}

// -- Complaint triage --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplaintRequest {
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub citizen_email: String,
}

/// Forwards complaint data to the external triage service.
pub struct TriageClient {
    client: reqwest::Client,
    triage_url: String,
}

impl TriageClient {
    pub fn new(upstream: &UpstreamConfig) -> Self {
        Self {
            client: http_client(upstream.timeout_secs),
            triage_url: upstream.triage_url.clone(),
        }
    }

    /// Coordinates are forwarded as strings and the address field carries
    /// the raw "lat,lon" pair, matching what the triage service expects.
    pub async fn submit_complaint(&self, req: &ComplaintRequest) -> AppResult<Value> {
        let body = json!({
            "description": req.description,
            "latitude": req.latitude.to_string(),
            "longitude": req.longitude.to_string(),
            "citizen_email": req.citizen_email,
            "address": format!("{},{}", req.latitude, req.longitude),
        });

        let response = self
            .client
            .post(&self.triage_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::BadGateway(format!("Triage service unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::BadGateway(
                "Failed to submit complaint to external service".into(),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::BadGateway(format!("Invalid triage response: {}", e)))
    }
}

// -- Reverse geocoding --

/// Nominatim-style reverse geocoder. Failure never propagates; the raw
/// coordinate pair is a serviceable address and keeps post creation alive.
pub struct Geocoder {
    client: reqwest::Client,
    geocoder_url: String,
}

impl Geocoder {
    pub fn new(upstream: &UpstreamConfig) -> Self {
        Self {
            client: http_client(upstream.timeout_secs),
            geocoder_url: upstream.geocoder_url.clone(),
        }
    }

    pub async fn reverse(&self, latitude: f64, longitude: f64) -> String {
        match self.try_reverse(latitude, longitude).await {
            Some(address) => address,
            None => format!("{},{}", latitude, longitude),
        }
    }

    async fn try_reverse(&self, latitude: f64, longitude: f64) -> Option<String> {
        let response = self
            .client
            .get(&self.geocoder_url)
            .query(&[
                ("format", "json".to_string()),
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("addressdetails", "1".to_string()),
            ])
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body: Value = response.json().await.ok()?;
        body.get("display_name")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

// -- Category inference --

/// Asks a generative-language endpoint to pick one of [`CATEGORIES`].
/// A reply outside the list falls back to "Other"; transport failures are
/// surfaced so the UI can ask the user to pick manually.
pub struct Categorizer {
    client: reqwest::Client,
    categorizer_url: String,
    api_key: Option<String>,
}

impl Categorizer {
    pub fn new(upstream: &UpstreamConfig) -> Self {
        Self {
            client: http_client(upstream.timeout_secs),
            categorizer_url: upstream.categorizer_url.clone(),
            api_key: upstream.categorizer_api_key.clone(),
        }
    }

    pub async fn categorize(&self, description: &str) -> AppResult<String> {
        let prompt = build_prompt(description);
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let mut request = self.client.post(&self.categorizer_url).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.query(&[("key", key)]);
        }

        let response = request.send().await.map_err(|e| {
            AppError::BadGateway(format!("Categorizer unreachable: {}", e))
        })?;
        if !response.status().is_success() {
            return Err(AppError::BadGateway(format!(
                "Categorizer returned {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::BadGateway(format!("Invalid categorizer response: {}", e)))?;

        let reply = body
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .unwrap_or("");

        Ok(match_category(reply))
    }
}

fn build_prompt(description: &str) -> String {
    let mut prompt = String::from(
        "Categorize the following complaint into one of these categories. \
         Return ONLY the category name, nothing else:\n",
    );
    for category in CATEGORIES {
        prompt.push_str("- ");
        prompt.push_str(category);
        prompt.push('\n');
    }
    prompt.push_str("\nComplaint: \"");
    prompt.push_str(description);
    prompt.push('"');
    prompt
}

/// Case-insensitive match against the fixed list; anything else is "Other".
pub fn match_category(reply: &str) -> String {
    let reply = reply.trim();
    CATEGORIES
        .iter()
        .find(|c| c.eq_ignore_ascii_case(reply))
        .map(|c| c.to_string())
        .unwrap_or_else(|| "Other".to_string())
}
