use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Claims carried by every access token. `account_type` is snapshotted at
/// issue time; billing webhooks update the row and the next refresh picks
/// up the new tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub account_type: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    expiry: Duration,
}

impl JwtService {
    pub fn new(secret: &str, issuer: &str, audience: &str, expiry_days: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.to_string(),
            audience: audience.to_string(),
            expiry: Duration::days(expiry_days),
        }
    }

    pub fn issue(&self, user_id: Uuid, email: &str, account_type: &str) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            account_type: account_type.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            exp: (now + self.expiry).timestamp(),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| AppError::unauthorized("invalid or expired token"))?;
        Ok(data.claims)
    }

    /// Sliding renewal: any still-valid token can be traded for a fresh one
    /// with the same identity claims and a new seven day window.
    pub fn refresh(&self, token: &str) -> Result<String, AppError> {
        let claims = self.verify(token)?;
        self.issue(claims.sub, &claims.email, &claims.account_type)
    }
}
