//! Identity service (IMS) JWT exchange.
//!
//! Signs a service-account JWT with the configured private key and trades it
//! for an access token. Each call carries the full credential payload; no
//! session state is kept between calls.

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::token::{IdentityProvider, TokenRequest};

const EXCHANGE_PATH: &str = "/ims/exchange/jwt";
const JWT_LIFETIME_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

pub struct ImsClient {
    client: Client,
    host: String,
}

impl ImsClient {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            host: host.into().trim_end_matches('/').to_string(),
        }
    }

    fn provider_error(&self, status: Option<u16>, error: impl Into<String>) -> Error {
        Error::auth_provider_failed(&self.host, status, error)
    }

    fn sign(&self, request: &TokenRequest, now_secs: i64) -> Result<String> {
        let pem = normalize_private_key(&request.private_key);
        let key = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| self.provider_error(None, format!("invalid private key: {}", e)))?;
        let claims = jwt_claims(&self.host, request, now_secs);

        encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| self.provider_error(None, format!("failed to sign JWT: {}", e)))
    }
}

impl IdentityProvider for ImsClient {
    fn request_token(&self, request: &TokenRequest) -> Result<String> {
        let jwt = self.sign(request, chrono::Utc::now().timestamp())?;
        let url = format!("{}{}", self.host, EXCHANGE_PATH);
        crate::log_debug!("auth", "Exchanging JWT at {}", url);

        let form = [
            ("client_id", request.client_id.as_str()),
            ("client_secret", request.client_secret.as_str()),
            ("jwt_token", jwt.as_str()),
        ];
        let response = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .map_err(|e| self.provider_error(None, e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| self.provider_error(Some(status.as_u16()), e.to_string()))?;

        parse_exchange_response(status.as_u16(), &body)
            .map_err(|(status, error)| self.provider_error(status, error))
    }
}

/// Claims for the service-account JWT. One `<host>/s/<scope>` flag per scope.
pub fn jwt_claims(host: &str, request: &TokenRequest, now_secs: i64) -> Value {
    let mut claims = Map::new();
    claims.insert("exp".into(), Value::from(now_secs + JWT_LIFETIME_SECS));
    claims.insert("iss".into(), Value::from(request.ims_org_id.clone()));
    claims.insert("sub".into(), Value::from(request.technical_account_id.clone()));
    claims.insert(
        "aud".into(),
        Value::from(format!("{}/c/{}", host, request.client_id)),
    );
    for scope in &request.scopes {
        claims.insert(format!("{}/s/{}", host, scope), Value::Bool(true));
    }
    Value::Object(claims)
}

/// CI secrets often carry the PEM with literal `\n` sequences.
fn normalize_private_key(raw: &str) -> String {
    raw.trim().replace("\\n", "\n")
}

fn parse_exchange_response(
    status: u16,
    body: &str,
) -> std::result::Result<String, (Option<u16>, String)> {
    let parsed: Option<ExchangeResponse> = serde_json::from_str(body).ok();

    if !(200..300).contains(&status) {
        let reason = parsed
            .and_then(|r| r.error_description.or(r.error))
            .unwrap_or_else(|| body.trim().to_string());
        return Err((Some(status), reason));
    }

    parsed
        .and_then(|r| r.access_token)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| (Some(status), "response did not contain an access_token".to_string()))
}
