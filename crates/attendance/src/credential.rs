use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use repset_core::AggregateId;
use repset_members::MemberId;

/// The scanned string named nothing resembling a member.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("credential is not a valid member reference")]
pub struct InvalidCredential;

/// QR payload as the member app encodes it.
#[derive(Debug, Serialize, Deserialize)]
struct QrPayload {
    #[serde(rename = "memberId")]
    member_id: uuid::Uuid,
}

/// Encode a member id into the QR credential handed to the member app.
pub fn encode_credential(member_id: MemberId) -> String {
    let payload = QrPayload {
        member_id: *member_id.0.as_uuid(),
    };
    // Serializing a uuid into a two-field-free struct cannot fail.
    let json = serde_json::to_string(&payload).unwrap_or_default();
    STANDARD.encode(json)
}

/// Decode a scanned credential into a member id.
///
/// Primary format is base64-wrapped JSON `{"memberId": ...}`. Anything that
/// fails that path is retried as a literal member id, so hand-typed ids at
/// the front desk keep working.
pub fn decode_credential(raw: &str) -> Result<MemberId, InvalidCredential> {
    let trimmed = raw.trim();

    if let Ok(bytes) = STANDARD.decode(trimmed) {
        if let Ok(payload) = serde_json::from_slice::<QrPayload>(&bytes) {
            return Ok(MemberId::new(AggregateId::from_uuid(payload.member_id)));
        }
    }

    trimmed
        .parse::<uuid::Uuid>()
        .map(|id| MemberId::new(AggregateId::from_uuid(id)))
        .map_err(|_| InvalidCredential)
}
