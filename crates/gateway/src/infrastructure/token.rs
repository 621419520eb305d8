//! Signed token issuance for authenticated channel subscriptions

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use candela_ports::{Clock, PortError, PortResult, TokenProvider};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Default lifetime of an issued token
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(120);

#[derive(Serialize)]
struct Header<'a> {
    alg: &'static str,
    typ: &'static str,
    kid: &'a str,
    nonce: String,
}

#[derive(Serialize)]
struct Claims<'a> {
    sub: &'a str,
    iss: &'static str,
    nbf: i64,
    exp: i64,
}

/// Issues compact HS256 JWTs, one per call, each with a fresh nonce
pub struct HmacTokenProvider {
    key_name: String,
    secret: String,
    lifetime: Duration,
    clock: Arc<dyn Clock>,
}

impl HmacTokenProvider {
    pub fn new(key_name: impl Into<String>, secret: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        HmacTokenProvider {
            key_name: key_name.into(),
            secret: secret.into(),
            lifetime: TOKEN_LIFETIME,
            clock,
        }
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    fn encode<T: Serialize>(part: &T) -> PortResult<String> {
        let json = serde_json::to_vec(part).map_err(|e| PortError::Serialization(e.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    fn sign(&self, message: &str) -> PortResult<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| PortError::Token(e.to_string()))?;
        mac.update(message.as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }
}

impl TokenProvider for HmacTokenProvider {
    fn issue(&self) -> PortResult<String> {
        if self.secret.is_empty() {
            return Err(PortError::Token("empty signing secret".to_string()));
        }
        let now = self.clock.now().timestamp();
        let header = Header {
            alg: "HS256",
            typ: "JWT",
            kid: &self.key_name,
            nonce: uuid::Uuid::new_v4().simple().to_string(),
        };
        let claims = Claims {
            sub: &self.key_name,
            iss: "candela",
            nbf: now,
            exp: now + self.lifetime.as_secs() as i64,
        };

        let signing_input = format!("{}.{}", Self::encode(&header)?, Self::encode(&claims)?);
        let signature = self.sign(&signing_input)?;
        Ok(format!("{}.{}", signing_input, signature))
    }
}

/// Returns the same pre-issued token every time
pub struct StaticTokenProvider(String);

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        StaticTokenProvider(token.into())
    }
}

impl TokenProvider for StaticTokenProvider {
    fn issue(&self) -> PortResult<String> {
        Ok(self.0.clone())
    }
}
