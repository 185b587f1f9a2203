use super::TokenError;
use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const ALG: &str = "HS256";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
}

impl TokenHeader {
    fn hs256() -> Self {
        Self {
            alg: ALG.to_string(),
            typ: "JWT".to_string(),
        }
    }
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: DeserializeOwned>(s: &str) -> Result<T, TokenError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

fn mac(secret: &[u8], signing_input: &str) -> Result<HmacSha256, TokenError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| TokenError::Invalid)?;
    mac.update(signing_input.as_bytes());
    Ok(mac)
}

/// Create an HS256 signed JWT.
///
/// # Errors
/// Returns an error if the claims cannot be serialized.
pub fn sign_hs256<T: Serialize>(secret: &[u8], claims: &T) -> anyhow::Result<String> {
    let header_b64 = b64e_json(&TokenHeader::hs256())?;
    let claims_b64 = b64e_json(claims)?;
    let signing_input = format!("{header_b64}.{claims_b64}");

    let signature = mac(secret, &signing_input)?.finalize().into_bytes();
    let signature_b64 = Base64UrlUnpadded::encode_string(&signature);

    Ok(format!("{signing_input}.{signature_b64}"))
}

/// Check structure and signature of an HS256 JWT and decode its claims.
///
/// Claim validation (`sub`, `exp`) is left to the caller.
///
/// # Errors
/// - `Malformed` when the token is not three base64url JSON segments,
/// - `Invalid` when the algorithm or signature does not match.
pub fn verify_hs256<T: DeserializeOwned>(secret: &[u8], token: &str) -> Result<T, TokenError> {
    let mut parts = token.trim().split('.');
    let (Some(header_b64), Some(claims_b64), Some(signature_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed);
    };

    let header: TokenHeader = b64d_json(header_b64)?;
    if header.alg != ALG {
        return Err(TokenError::Invalid);
    }

    let signature =
        Base64UrlUnpadded::decode_vec(signature_b64).map_err(|_| TokenError::Malformed)?;
    let signing_input = format!("{header_b64}.{claims_b64}");
    mac(secret, &signing_input)?
        .verify_slice(&signature)
        .map_err(|_| TokenError::Invalid)?;

    b64d_json(claims_b64)
}
