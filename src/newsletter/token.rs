//! Stateless unsubscribe tokens: `base64url(email).base64url(hmac_sha256(payload))`.
//!
//! Tokens carry no timestamp and stay valid for as long as the secret does.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::utils::validation::normalize_email;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Debug, Default)]
pub struct TokenCodec {
    secret: Option<SecretString>,
}

impl TokenCodec {
    /// A blank secret counts as no secret.
    pub fn new(secret: Option<SecretString>) -> Self {
        let secret = secret.filter(|s| !s.expose_secret().trim().is_empty());
        Self { secret }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Returns `None` when no secret is configured.
    pub fn encode(&self, email: &str) -> Option<String> {
        let secret = self.secret.as_ref()?;
        let payload = URL_SAFE_NO_PAD.encode(normalize_email(email));
        let signature = URL_SAFE_NO_PAD.encode(sign(secret, &payload)?);
        Some(format!("{payload}.{signature}"))
    }

    /// Returns the normalized email for a token signed with this secret.
    pub fn decode(&self, token: &str) -> Option<String> {
        let secret = self.secret.as_ref()?;
        let (payload, signature) = token.trim().split_once('.')?;
        let payload = payload.trim_end_matches('=');
        if payload.is_empty() || signature.is_empty() {
            return None;
        }

        let provided = decode_segment(signature)?;
        let expected = sign(secret, payload)?;
        if provided.len() != expected.len() || !bool::from(provided.ct_eq(&expected)) {
            return None;
        }

        let email = String::from_utf8(decode_segment(payload)?).ok()?;
        let email = normalize_email(&email);
        (!email.is_empty()).then_some(email)
    }
}

fn sign(secret: &SecretString, payload: &str) -> Option<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes()).ok()?;
    mac.update(payload.as_bytes());
    Some(mac.finalize().into_bytes().to_vec())
}

// Accepts padded input as well; padding is never emitted.
fn decode_segment(segment: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD.decode(segment.trim_end_matches('=')).ok()
}
