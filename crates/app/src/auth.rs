use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use metrics::counter;
use subtle::ConstantTimeEq;
use tracing::warn;

use armory_util::StatisticsCredentials;

use crate::error::ApiError;

pub const STATISTICS_REALM: &str = "statistics";

/// HTTP basic authentication against a single configured user.
#[derive(Clone)]
pub struct BasicAuth {
    user: Vec<u8>,
    password: Vec<u8>,
}

impl BasicAuth {
    pub fn new(credentials: &StatisticsCredentials) -> Self {
        Self {
            user: credentials.user.as_bytes().to_vec(),
            password: credentials.password.as_bytes().to_vec(),
        }
    }

    /// Rejects the request with a `statistics` challenge unless the
    /// `Authorization` header carries the configured credentials.
    pub fn authorize(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        self.check(headers).map_err(|reason| {
            counter!("http_auth_failures_total").increment(1);
            warn!(stage = "http", reason, "basic auth rejected");
            ApiError::unauthorized(STATISTICS_REALM)
        })
    }

    fn check(&self, headers: &HeaderMap) -> Result<(), &'static str> {
        let value = headers
            .get(header::AUTHORIZATION)
            .ok_or("missing authorization header")?
            .to_str()
            .map_err(|_| "authorization header is not ascii")?;
        let (scheme, encoded) = value
            .trim_start()
            .split_once(' ')
            .ok_or("authorization scheme is not basic")?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return Err("authorization scheme is not basic");
        }
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|_| "credentials are not valid base64")?;

        let separator = decoded
            .iter()
            .position(|byte| *byte == b':')
            .ok_or("credentials lack a separator")?;
        let (user, password) = (&decoded[..separator], &decoded[separator + 1..]);

        let user_ok = user.ct_eq(self.user.as_slice());
        let password_ok = password.ct_eq(self.password.as_slice());
        if (user_ok & password_ok).into() {
            Ok(())
        } else {
            Err("credentials mismatch")
        }
    }
}
