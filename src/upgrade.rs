//! HTTP/1.1 → h2c upgrade handshake (RFC 7540 Section 3.2).
//!
//! Only the header lists are modelled; parsing and writing the HTTP/1.1
//! messages themselves is up to the caller. Once the handshake succeeds the
//! [`UpgradeTarget`] fabricates stream 1 for the HTTP/1.1 request and the
//! connection continues with HTTP/2 framing.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use tracing::{debug, warn};

use crate::error::{H2Error, H2Result};
use crate::handler::UpgradeTarget;
use crate::settings::Settings;

pub const HTTP2_SETTINGS_HEADER: &str = "HTTP2-Settings";
pub const UPGRADE_PROTOCOL: &str = "h2c";

/// HTTP/1.1 header list as `(name, value)` pairs.
pub type HttpHeaders = Vec<(String, String)>;

fn header<'a>(headers: &'a [(String, String)], name: &str) -> impl Iterator<Item = &'a str> + 'a {
    let name = name.to_ascii_lowercase();
    headers
        .iter()
        .filter(move |(n, _)| n.eq_ignore_ascii_case(&name))
        .map(|(_, v)| v.as_str())
}

/// Whether a comma-separated header value lists `token`.
fn has_token(value: &str, token: &str) -> bool {
    value
        .split(',')
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

/// Encode a SETTINGS payload for the `HTTP2-Settings` header.
pub fn encode_settings_header(settings: &Settings) -> String {
    URL_SAFE_NO_PAD.encode(settings.encode())
}

// ============================================================================
// Client
// ============================================================================

/// Client half: adds the upgrade headers and checks the 101 response.
#[derive(Debug, Clone)]
pub struct ClientUpgradeCodec {
    settings: Settings,
}

impl ClientUpgradeCodec {
    /// `settings` are the local SETTINGS advertised in the request.
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn prepare_upgrade_request(&self, headers: &mut HttpHeaders) {
        headers.retain(|(n, _)| {
            !n.eq_ignore_ascii_case("connection")
                && !n.eq_ignore_ascii_case("upgrade")
                && !n.eq_ignore_ascii_case(HTTP2_SETTINGS_HEADER)
        });
        headers.push((
            "Connection".to_string(),
            format!("Upgrade, {}", HTTP2_SETTINGS_HEADER),
        ));
        headers.push(("Upgrade".to_string(), UPGRADE_PROTOCOL.to_string()));
        headers.push((
            HTTP2_SETTINGS_HEADER.to_string(),
            encode_settings_header(&self.settings),
        ));
    }

    /// Handle the server's response to the upgrade request.
    ///
    /// Returns `Ok(false)` when the server answered with anything other than
    /// 101: the request is then served over HTTP/1.1 and nothing changes.
    pub fn upgrade_to(
        &self,
        status: u16,
        headers: &[(String, String)],
        target: Option<&mut dyn UpgradeTarget>,
    ) -> H2Result<bool> {
        if status != 101 {
            debug!(status, "[H2] upgrade declined by server");
            return Ok(false);
        }
        if !header(headers, "upgrade").any(|v| has_token(v, UPGRADE_PROTOCOL)) {
            return Err(H2Error::protocol("101 response without upgrade: h2c"));
        }
        let target = target.ok_or_else(|| {
            warn!("[H2] upgrade completed without an HTTP/2 handler");
            H2Error::protocol("no HTTP/2 handler for the upgraded connection")
        })?;
        target.on_client_upgrade()?;
        Ok(true)
    }
}

// ============================================================================
// Server
// ============================================================================

/// Server half: validates the request and produces the 101 headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerUpgradeCodec;

impl ServerUpgradeCodec {
    pub fn new() -> Self {
        Self
    }

    /// Decode an `HTTP2-Settings` value. Padded input is tolerated.
    pub fn decode_settings_header(value: &str) -> H2Result<Settings> {
        let trimmed = value.trim().trim_end_matches('=');
        let payload = URL_SAFE_NO_PAD
            .decode(trimmed)
            .map_err(|e| H2Error::protocol(format!("invalid HTTP2-Settings header: {}", e)))?;
        Settings::decode(&payload)
    }

    /// Validate an upgrade request and return the client's SETTINGS.
    pub fn prepare_upgrade_response(&self, request: &[(String, String)]) -> H2Result<Settings> {
        if !header(request, "upgrade").any(|v| has_token(v, UPGRADE_PROTOCOL)) {
            return Err(H2Error::protocol("request does not ask for h2c"));
        }
        let connection: Vec<&str> = header(request, "connection").collect();
        let lists = |token| connection.iter().any(|v| has_token(v, token));
        if !lists("upgrade") || !lists(HTTP2_SETTINGS_HEADER) {
            return Err(H2Error::protocol(
                "Connection header must list Upgrade and HTTP2-Settings",
            ));
        }
        let mut values = header(request, HTTP2_SETTINGS_HEADER);
        let value = match (values.next(), values.next()) {
            (Some(value), None) => value,
            (None, _) => return Err(H2Error::protocol("missing HTTP2-Settings header")),
            (Some(_), Some(_)) => {
                return Err(H2Error::protocol("more than one HTTP2-Settings header"))
            }
        };
        Self::decode_settings_header(value)
    }

    /// Complete the upgrade and return the 101 response headers.
    pub fn upgrade_to(
        &self,
        target: Option<&mut dyn UpgradeTarget>,
        settings: &Settings,
    ) -> H2Result<HttpHeaders> {
        let target = target.ok_or_else(|| {
            warn!("[H2] upgrade requested without an HTTP/2 handler");
            H2Error::protocol("no HTTP/2 handler for the upgraded connection")
        })?;
        target.on_server_upgrade(settings)?;
        Ok(vec![
            ("Connection".to_string(), "Upgrade".to_string()),
            ("Upgrade".to_string(), UPGRADE_PROTOCOL.to_string()),
        ])
    }
}
