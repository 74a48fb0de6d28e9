// BitMEX realtime endpoints, topic classification and request signing

use hmac::{Hmac, Mac};
use reqwest::Url;
use serde::Deserialize;
use sha2::Sha256;

use crate::error::FeedError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNED_METHOD: &str = "GET";
pub const SIGNED_PATH: &str = "/realtime";
pub const SIGNATURE_TTL_SECS: u64 = 60;

/// Tables that only stream after authentication.
pub const PRIVATE_TABLES: [&str; 5] = ["execution", "order", "position", "margin", "wallet"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Environment {
    Devhk,
    #[default]
    Testnet,
    Prod,
}

impl Environment {
    pub fn url(&self) -> &'static str {
        match self {
            Environment::Devhk => "wss://ws.devhk.bitmex.com/realtime",
            Environment::Testnet => "wss://ws.testnet.bitmex.com/realtime",
            Environment::Prod => "wss://ws.bitmex.com/realtime",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Environment::Devhk => "DevHK",
            Environment::Testnet => "Testnet",
            Environment::Prod => "Production",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "devhk" => Some(Environment::Devhk),
            "testnet" => Some(Environment::Testnet),
            "prod" | "production" => Some(Environment::Prod),
            _ => None,
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Environment::parse(&s).ok_or_else(|| format!("unknown environment '{}'", s))
    }
}

/// Table part of a topic: "orderBookL2:XBTUSD" -> "orderBookL2".
pub fn topic_table(topic: &str) -> &str {
    topic.split(':').next().unwrap_or(topic)
}

pub fn is_private_topic(topic: &str) -> bool {
    PRIVATE_TABLES.contains(&topic_table(topic))
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self { api_key: api_key.into(), api_secret: api_secret.into() }
    }

    pub fn is_complete(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

// Never print the secret
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Hex HMAC-SHA256 of an arbitrary message.
pub fn sign_message(secret: &str, message: &str) -> Result<String, FeedError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| FeedError::Signing(e.to_string()))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// BitMEX request signature: hex(HMAC_SHA256(secret, verb + path + expires + data)).
pub fn generate_signature(secret: &str, method: &str, path: &str, expires: u64, data: &str) -> Result<String, FeedError> {
    sign_message(secret, &format!("{}{}{}{}", method, path, expires, data))
}

/// Realtime URL with `api-expires`, `api-signature` and `api-key` appended.
/// `now_secs` is the current unix time in seconds.
pub fn authenticated_url(base: &str, creds: &Credentials, now_secs: u64) -> Result<Url, FeedError> {
    let expires = now_secs + SIGNATURE_TTL_SECS;
    let signature = generate_signature(&creds.api_secret, SIGNED_METHOD, SIGNED_PATH, expires, "")?;
    Url::parse_with_params(
        base,
        &[
            ("api-expires", expires.to_string()),
            ("api-signature", signature),
            ("api-key", creds.api_key.clone()),
        ],
    )
    .map_err(|e| FeedError::InvalidUrl(e.to_string()))
}

pub fn plain_url(base: &str) -> Result<Url, FeedError> {
    Url::parse(base).map_err(|e| FeedError::InvalidUrl(e.to_string()))
}
