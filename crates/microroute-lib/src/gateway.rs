//! External directions provider used when the local network cannot answer.
//!
//! Every failure is returned as a [`GatewayFailure`] value; nothing here
//! panics or propagates an [`crate::Error`] once the client is built.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::RoutingConfig;
use crate::error::{Error, Result};
use crate::geo::Coordinate;
use crate::instructions::{Instruction, Maneuver};
use crate::routing::TravelMode;

/// Confidence attached to routes from the Google provider.
pub const GOOGLE_CONFIDENCE: f64 = 0.9;

/// Normalised route from an external provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalRoute {
    pub geometry: Vec<Coordinate>,
    pub distance_m: f64,
    pub duration_s: f64,
    /// Plain-text instructions, markup removed, not yet locale adapted.
    pub instructions: Vec<Instruction>,
    pub confidence: f64,
}

/// Classified provider failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayFailure {
    #[error("no directions API credential configured")]
    MissingCredentials,
    #[error("directions API returned status {status}: {message}")]
    ApiStatus { status: String, message: String },
    #[error("directions request timed out")]
    Timeout,
    #[error("network error calling directions API: {message}")]
    Network { message: String },
    #[error("could not decode directions response: {message}")]
    Decode { message: String },
}

/// Source of external turn-by-turn directions.
pub trait DirectionsProvider: Send + Sync {
    fn name(&self) -> &str;

    fn directions(
        &self,
        origin: &Coordinate,
        destination: &Coordinate,
        mode: TravelMode,
    ) -> std::result::Result<ExternalRoute, GatewayFailure>;
}

/// Google Directions API client.
pub struct GoogleDirections {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    language: String,
}

impl GoogleDirections {
    /// Build a client from configuration. A missing key is not an error
    /// here; each call reports [`GatewayFailure::MissingCredentials`].
    pub fn new(config: &RoutingConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.external_timeout)?,
            api_key: config.directions_api_key.clone(),
            base_url: config.directions_base_url.clone(),
            language: config.language.clone(),
        })
    }

    fn request(
        &self,
        api_key: &str,
        origin: &Coordinate,
        destination: &Coordinate,
        mode: TravelMode,
    ) -> std::result::Result<GoogleResponse, GatewayFailure> {
        let response = self
            .client
            .get(&self.base_url)
            .header(ACCEPT, "application/json")
            .query(&[
                ("origin", origin.to_string()),
                ("destination", destination.to_string()),
                ("mode", google_mode(mode).to_string()),
                ("language", self.language.clone()),
                ("key", api_key.to_string()),
            ])
            .send()
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayFailure::ApiStatus {
                status: status.as_u16().to_string(),
                message: status
                    .canonical_reason()
                    .unwrap_or("unexpected HTTP status")
                    .to_string(),
            });
        }

        response
            .json::<GoogleResponse>()
            .map_err(|err| GatewayFailure::Decode {
                message: err.to_string(),
            })
    }
}

impl DirectionsProvider for GoogleDirections {
    fn name(&self) -> &str {
        "google"
    }

    fn directions(
        &self,
        origin: &Coordinate,
        destination: &Coordinate,
        mode: TravelMode,
    ) -> std::result::Result<ExternalRoute, GatewayFailure> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(GatewayFailure::MissingCredentials);
        };

        debug!(%origin, %destination, %mode, "requesting external directions");
        let result = self
            .request(api_key, origin, destination, mode)
            .and_then(|response| normalize(response, mode));
        if let Err(failure) = &result {
            warn!(provider = "google", error = %failure, "external directions failed");
        }
        result
    }
}

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(user_agent())
        .build()
        .map_err(|err| Error::GatewayClient {
            message: err.to_string(),
        })
}

fn user_agent() -> String {
    format!("microroute-lib/{}", env!("CARGO_PKG_VERSION"))
}

fn classify_transport(err: reqwest::Error) -> GatewayFailure {
    if err.is_timeout() {
        GatewayFailure::Timeout
    } else {
        GatewayFailure::Network {
            message: err.to_string(),
        }
    }
}

fn google_mode(mode: TravelMode) -> &'static str {
    match mode {
        TravelMode::Walking => "walking",
        TravelMode::Cycling => "bicycling",
        TravelMode::Driving => "driving",
    }
}

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    routes: Vec<GoogleRoute>,
}

#[derive(Debug, Deserialize)]
struct GoogleRoute {
    overview_polyline: GooglePolyline,
    #[serde(default)]
    legs: Vec<GoogleLeg>,
}

#[derive(Debug, Deserialize)]
struct GooglePolyline {
    points: String,
}

#[derive(Debug, Deserialize)]
struct GoogleLeg {
    distance: GoogleValue,
    duration: GoogleValue,
    #[serde(default)]
    steps: Vec<GoogleStep>,
}

#[derive(Debug, Deserialize)]
struct GoogleValue {
    value: f64,
}

#[derive(Debug, Deserialize)]
struct GoogleStep {
    html_instructions: String,
    #[serde(default)]
    distance: Option<GoogleValue>,
    #[serde(default)]
    maneuver: Option<String>,
}

fn normalize(
    response: GoogleResponse,
    mode: TravelMode,
) -> std::result::Result<ExternalRoute, GatewayFailure> {
    if response.status != "OK" {
        let message = response
            .error_message
            .unwrap_or_else(|| format!("API returned status: {}", response.status));
        return Err(GatewayFailure::ApiStatus {
            status: response.status,
            message,
        });
    }

    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| GatewayFailure::Decode {
            message: "response contained no routes".to_string(),
        })?;
    let leg = route
        .legs
        .into_iter()
        .next()
        .ok_or_else(|| GatewayFailure::Decode {
            message: "route contained no legs".to_string(),
        })?;
    let geometry = decode_polyline(&route.overview_polyline.points)?;

    let step_count = leg.steps.len();
    let mut instructions: Vec<Instruction> = leg
        .steps
        .into_iter()
        .map(|step| {
            let text = strip_markup(&step.html_instructions);
            let maneuver = step
                .maneuver
                .as_deref()
                .and_then(Maneuver::from_provider_code)
                .unwrap_or_else(|| Maneuver::infer(&text, false));
            Instruction::new(text, maneuver, step.distance.map_or(0.0, |d| d.value))
        })
        .filter(|instruction| !instruction.text.is_empty())
        .collect();
    if step_count > 0 {
        instructions.push(Instruction::arrival());
    }

    let duration_s = if leg.duration.value > 0.0 {
        leg.duration.value
    } else {
        mode.estimate_duration(leg.distance.value)
    };

    Ok(ExternalRoute {
        geometry,
        distance_m: leg.distance.value,
        duration_s,
        instructions,
        confidence: GOOGLE_CONFIDENCE,
    })
}

/// Decode a Google encoded polyline (precision 1e5).
pub fn decode_polyline(encoded: &str) -> std::result::Result<Vec<Coordinate>, GatewayFailure> {
    let bytes = encoded.as_bytes();
    let mut points = Vec::new();
    let mut index = 0;
    let mut lat: i64 = 0;
    let mut lng: i64 = 0;

    while index < bytes.len() {
        lat += next_polyline_value(bytes, &mut index)?;
        lng += next_polyline_value(bytes, &mut index)?;
        points.push(Coordinate::new(lat as f64 / 1e5, lng as f64 / 1e5));
    }
    Ok(points)
}

fn next_polyline_value(bytes: &[u8], index: &mut usize) -> std::result::Result<i64, GatewayFailure> {
    let mut result: i64 = 0;
    let mut shift = 0;
    loop {
        let byte = *bytes.get(*index).ok_or_else(|| GatewayFailure::Decode {
            message: "truncated polyline".to_string(),
        })?;
        *index += 1;
        if !(63..=126).contains(&byte) || shift > 60 {
            return Err(GatewayFailure::Decode {
                message: format!("invalid polyline byte {byte}"),
            });
        }
        let chunk = i64::from(byte - 63);
        result |= (chunk & 0x1f) << shift;
        shift += 5;
        if chunk < 0x20 {
            break;
        }
    }
    Ok(if result & 1 == 1 {
        !(result >> 1)
    } else {
        result >> 1
    })
}

/// Remove HTML tags and common entities, collapsing whitespace.
pub fn strip_markup(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => {
                in_tag = true;
                text.push(' ');
            }
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}
