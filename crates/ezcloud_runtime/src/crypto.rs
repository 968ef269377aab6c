//! JWT and digest helpers.
//!
//! These back the developer-token permission gate and the crypto
//! namespace injected into sandboxed code.

use crate::context::SystemConfig;
use ezcloud_core::{CloudError, CloudResult};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use md5::{Digest, Md5};
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// Fallback signing secret when the system config carries none.
pub const DEFAULT_JWT_SECRET: &str = "ezcloud";

/// Default token lifetime: seven days.
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 7 * 24 * 3600;

/// The crypto helper suite, configured from the resolved system record.
#[derive(Debug, Clone)]
pub struct CryptoSuite {
    secret: String,
}

impl Default for CryptoSuite {
    fn default() -> Self {
        Self::new(DEFAULT_JWT_SECRET)
    }
}

impl CryptoSuite {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Reads `global_config.jwt_secret`, falling back to the default.
    pub fn from_system(system: &SystemConfig) -> Self {
        let secret = system
            .global_config
            .get("jwt_secret")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_JWT_SECRET);
        Self::new(secret)
    }

    /// Issues an HS256 token over the given claims object.
    ///
    /// An `expires_in` key inside the claims controls the lifetime
    /// (seconds); `exp` is always set from it.
    pub fn gen_jwt(&self, claims: &Value) -> CloudResult<String> {
        let mut body = match claims {
            Value::Object(map) => Value::Object(map.clone()),
            Value::Null => json!({}),
            other => json!({ "data": other }),
        };
        let ttl = body
            .get("expires_in")
            .and_then(Value::as_i64)
            .unwrap_or(DEFAULT_TOKEN_TTL_SECS);
        let exp = unix_now() + ttl;
        if let Some(map) = body.as_object_mut() {
            map.insert("exp".to_string(), json!(exp));
            map.insert("expires_in".to_string(), json!(ttl));
        }
        encode(
            &Header::default(),
            &body,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| CloudError::crypto(format!("token encoding failed: {e}")))
    }

    /// Decodes and validates an HS256 token, returning its claims.
    pub fn parse_jwt(&self, token: &str) -> CloudResult<Value> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        decode::<Value>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| CloudError::crypto(format!("token decoding failed: {e}")))
    }

    /// Lowercase 32-character md5 hex digest.
    pub fn md5_hex(input: &str) -> String {
        let mut hasher = Md5::new();
        hasher.update(input.as_bytes());
        hex::encode(hasher.finalize())
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_known_vector() {
        assert_eq!(
            CryptoSuite::md5_hex("abc"),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn test_jwt_round_trip() {
        let suite = CryptoSuite::new("secret");
        let token = suite.gen_jwt(&json!({ "sub": "dev" })).unwrap();
        let claims = suite.parse_jwt(&token).unwrap();
        assert_eq!(claims["sub"], json!("dev"));
        assert_eq!(claims["expires_in"], json!(DEFAULT_TOKEN_TTL_SECS));
        assert!(claims["exp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_jwt_wrong_secret_rejected() {
        let token = CryptoSuite::new("a").gen_jwt(&json!({ "sub": "dev" })).unwrap();
        assert!(CryptoSuite::new("b").parse_jwt(&token).is_err());
    }

    #[test]
    fn test_secret_from_system_config() {
        let system = SystemConfig {
            global_config: json!({ "jwt_secret": "s3cr3t" }),
            ..SystemConfig::default()
        };
        let token = CryptoSuite::from_system(&system)
            .gen_jwt(&json!({ "sub": "x" }))
            .unwrap();
        assert!(CryptoSuite::new("s3cr3t").parse_jwt(&token).is_ok());
        assert!(CryptoSuite::default().parse_jwt(&token).is_err());
    }
}
