// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
//! Bearer-token verification (SPEC_FULL.md §6: "token issuance and refresh are out of this
//! core's scope; this core only verifies a token someone else issued"). `JwtVerifier` holds the
//! shared signing secret and decodes a `{sub, exp}` claim set — the same shape
//! `testutil::sign_test_token` produces — into a `UserDescriptor`.
//!
//! There is deliberately no user profile store here: `display_name` is derived from the
//! subject's id rather than looked up, since full user records (registration, profile fields)
//! are an external collaborator's responsibility (spec.md §1).

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use domain::{CoreError, UserDescriptor};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[allow(dead_code)]
    exp: i64,
}

#[derive(Clone)]
pub struct JwtVerifier {
    secret: String,
}

impl JwtVerifier {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    pub fn verify(&self, token: &str) -> Result<UserDescriptor, CoreError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| CoreError::AuthFailure(format!("invalid bearer token: {e}")))?;

        let user_id = Uuid::parse_str(&data.claims.sub)
            .map_err(|e| CoreError::AuthFailure(format!("malformed subject claim: {e}")))?;

        Ok(UserDescriptor {
            user_id,
            display_name: placeholder_display_name(user_id),
        })
    }
}

/// `display-<first 8 hex chars>`, good enough to distinguish roster entries in a UI without
/// this core taking on a profile store of its own.
fn placeholder_display_name(user_id: Uuid) -> String {
    format!("user-{}", &user_id.simple().to_string()[..8])
}

/// Extracts and verifies the bearer token from every request it's used on, rejecting with the
/// `CoreError`'s mapped HTTP status on failure.
pub struct AuthUser(pub UserDescriptor);

#[async_trait::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| (StatusCode::UNAUTHORIZED, "missing bearer token".to_owned()))?;
        let token = raw
            .strip_prefix("Bearer ")
            .ok_or_else(|| (StatusCode::UNAUTHORIZED, "malformed Authorization header".to_owned()))?;

        state.jwt.verify(token).map(AuthUser).map_err(|e| {
            let status = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::UNAUTHORIZED);
            (status, e.message().to_owned())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_well_formed_token_verifies_to_its_subject() {
        let verifier = JwtVerifier::new("test-secret".to_owned());
        let user_id = Uuid::new_v4();
        let token = testutil::sign_test_token(user_id, "test-secret");

        let user = verifier.verify(&token).unwrap();
        assert_eq!(user.user_id, user_id);
    }

    #[test]
    fn an_expired_token_is_rejected() {
        let verifier = JwtVerifier::new("test-secret".to_owned());
        let token = testutil::sign_expired_test_token(Uuid::new_v4(), "test-secret");

        let err = verifier.verify(&token).unwrap_err();
        assert!(matches!(err, CoreError::AuthFailure(_)));
    }

    #[test]
    fn a_token_signed_with_the_wrong_secret_is_rejected() {
        let verifier = JwtVerifier::new("test-secret".to_owned());
        let token = testutil::sign_test_token(Uuid::new_v4(), "a-different-secret");

        let err = verifier.verify(&token).unwrap_err();
        assert!(matches!(err, CoreError::AuthFailure(_)));
    }
}
