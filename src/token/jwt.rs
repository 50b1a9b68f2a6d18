use chrono::{TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::{Maker, Payload, TokenError};

pub const MIN_SECRET_KEY_SIZE: usize = 32;

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    jti: Uuid,
    sub: String, // username
    iat: i64,
    exp: i64,
}

impl From<&Payload> for Claims {
    fn from(p: &Payload) -> Self {
        Self {
            jti: p.id,
            sub: p.username.clone(),
            iat: p.issued_at.timestamp(),
            exp: p.expired_at.timestamp(),
        }
    }
}

pub struct JwtMaker {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtMaker {
    pub fn new(secret_key: &str) -> Result<Self, TokenError> {
        if secret_key.len() < MIN_SECRET_KEY_SIZE {
            return Err(TokenError::InvalidKeySize {
                min: MIN_SECRET_KEY_SIZE,
            });
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret_key.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret_key.as_bytes()),
        })
    }

    fn sign(&self, payload: &Payload) -> Result<String, TokenError> {
        encode(
            &Header::new(Algorithm::HS256),
            &Claims::from(payload),
            &self.encoding_key,
        )
        .map_err(|e| TokenError::Signing(e.to_string()))
    }
}

impl Maker for JwtMaker {
    fn create_token(
        &self,
        username: &str,
        duration: Duration,
    ) -> Result<(String, Payload), TokenError> {
        let payload = Payload::new(username, duration)?;
        let token = self.sign(&payload)?;
        Ok((token, payload))
    }

    fn verify_token(&self, token: &str) -> Result<Payload, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            }
        })?;

        let claims = data.claims;
        let issued_at = Utc
            .timestamp_opt(claims.iat, 0)
            .single()
            .ok_or(TokenError::Invalid)?;
        let expired_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or(TokenError::Invalid)?;

        Ok(Payload {
            id: claims.jti,
            username: claims.sub,
            issued_at,
            expired_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::random_string;

    #[test]
    fn test_create_and_verify() {
        let maker = JwtMaker::new(&random_string(32)).unwrap();
        let (token, payload) = maker
            .create_token("alice", Duration::from_secs(60))
            .unwrap();

        let verified = maker.verify_token(&token).unwrap();
        assert_eq!(verified.id, payload.id);
        assert_eq!(verified.username, "alice");
        assert_eq!(verified.expired_at.timestamp(), payload.expired_at.timestamp());
    }

    #[test]
    fn test_expired_token() {
        let maker = JwtMaker::new(&random_string(32)).unwrap();
        let mut payload = Payload::new("alice", Duration::from_secs(60)).unwrap();
        payload.expired_at = Utc::now() - chrono::Duration::minutes(1);
        let token = maker.sign(&payload).unwrap();

        assert_eq!(maker.verify_token(&token), Err(TokenError::Expired));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let maker = JwtMaker::new(&random_string(32)).unwrap();
        let other = JwtMaker::new(&random_string(32)).unwrap();
        let (token, _) = maker.create_token("alice", Duration::from_secs(60)).unwrap();

        assert_eq!(other.verify_token(&token), Err(TokenError::Invalid));
        assert_eq!(maker.verify_token("garbage"), Err(TokenError::Invalid));
    }

    #[test]
    fn test_short_key() {
        assert!(matches!(
            JwtMaker::new("short"),
            Err(TokenError::InvalidKeySize { min: 32 })
        ));
    }
}
