//! Proceed tokens
//!
//! A passed validation is turned into a short-lived HS256 token. Face
//! verification only commits attendance when it is presented with a
//! token for the same user, the same day and the proposed attendance type.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::validation::{AttendanceType, ProceedData};

const AUDIENCE: &str = "attendance-proceed";
const LEEWAY_SECS: i64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProceedClaims {
    pub sub: Uuid,
    pub aud: String,
    pub typ: AttendanceType,
    pub date: NaiveDate,
    pub dist: f64,
    pub score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct ProceedTokens {
    secret: String,
    ttl: Duration,
}

impl ProceedTokens {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            secret: secret.to_string(),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    pub fn issue(
        &self,
        user_id: Uuid,
        data: &ProceedData,
        security_score: u8,
        now: DateTime<Utc>,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = ProceedClaims {
            sub: user_id,
            aud: AUDIENCE.to_string(),
            typ: data.attendance_type,
            date: data.date,
            dist: data.distance_meters,
            score: security_score,
            net: data.network_signature.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(self.secret.as_bytes()))
    }

    /// Expiry is checked against `now` rather than the system clock
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<ProceedClaims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::default();
        validation.set_audience(&[AUDIENCE]);
        validation.validate_exp = false;
        let data = decode::<ProceedClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )?;

        if data.claims.exp + LEEWAY_SECS < now.timestamp() {
            return Err(ErrorKind::ExpiredSignature.into());
        }
        Ok(data.claims)
    }
}
