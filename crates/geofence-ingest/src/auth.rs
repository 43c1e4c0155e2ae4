use geofence_domain::canonical_json_value;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::IngestError;

type HmacSha256 = Hmac<Sha256>;

/// Recomputes HMAC-SHA256 over the canonicalised payload (every field except
/// `sig`) using `device_key` as the secret, and compares it against the
/// claimed `sig` in constant time (§4.1 step 4).
pub fn verify_signature(payload: &Value, device_key: &str) -> Result<(), IngestError> {
    let claimed = payload
        .get("sig")
        .and_then(Value::as_str)
        .ok_or_else(|| IngestError::MalformedPayload("missing sig field".to_string()))?;

    let mut stripped = payload.clone();
    if let Some(obj) = stripped.as_object_mut() {
        obj.remove("sig");
    }
    let canonical = canonical_json_value(&stripped);

    let mut mac =
        HmacSha256::new_from_slice(device_key.as_bytes()).expect("HMAC accepts any key length");
    mac.update(canonical.as_bytes());
    let expected = mac.finalize().into_bytes();
    let expected_hex = hex_encode(&expected);

    if expected_hex.as_bytes().ct_eq(claimed.as_bytes()).into() {
        Ok(())
    } else {
        Err(IngestError::SignatureMismatch)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
