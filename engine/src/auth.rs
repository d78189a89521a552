//! Signed bearer tokens for the document server.
//!
//! A token names one user and proves knowledge of the shared secret:
//! `{user_id}.{hex(HMAC-SHA256(secret, user_id))}`. The client signs a token
//! for the user of every request; the server verifies it and then checks the
//! named user against the addressed documents.

use crate::error::{Error, Result};
use crate::UserId;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn mac_for(secret: &str, user_id: &str) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Config(format!("invalid signing secret: {e}")))?;
    mac.update(user_id.as_bytes());
    Ok(mac)
}

/// Sign a bearer token for `user_id`.
pub fn sign_user_token(secret: &str, user_id: &str) -> Result<String> {
    let signature = mac_for(secret, user_id)?.finalize().into_bytes();
    Ok(format!("{user_id}.{}", hex::encode(signature)))
}

/// Check a bearer token and return the user it names.
///
/// The signature comparison is constant-time.
pub fn verify_user_token(secret: &str, token: &str) -> Option<UserId> {
    let (user_id, signature) = token.rsplit_once('.')?;
    if user_id.is_empty() {
        return None;
    }
    let signature = hex::decode(signature).ok()?;
    mac_for(secret, user_id)
        .ok()?
        .verify_slice(&signature)
        .ok()
        .map(|()| user_id.to_string())
}
