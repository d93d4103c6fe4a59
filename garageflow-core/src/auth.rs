use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Tenant of the authenticated caller, stored in request extensions.
#[derive(Clone, Copy, Debug)]
pub struct CurrentTenant(pub Uuid);

/// Claims expected inside the JWT for authenticated users.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - the user's UUID as a string.
    pub sub: String,
    /// Garage the user works for; every operation is scoped to it.
    pub tenant_id: Uuid,
    pub exp: usize,
}

/// HS256 keys derived from `JWT_SECRET`.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtKeys {
    pub fn from_secret(secret: &str) -> Arc<Self> {
        Arc::new(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        })
    }

    /// Signs `claims`; used by tooling and tests.
    pub fn issue(&self, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
    }

    fn verify(&self, token: &str) -> Option<Claims> {
        decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|e| debug!("Rejected bearer token: {}", e))
            .ok()
    }
}

/// Middleware to validate a Bearer JWT in the `Authorization` header.
///
/// On success the caller's tenant is attached to the request; on failure a
/// `401` is returned.
pub async fn jwt_middleware(
    State(keys): State<Arc<JwtKeys>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = match req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
    {
        Some(s) if s.starts_with("Bearer ") => &s[7..],
        _ => return Err(StatusCode::UNAUTHORIZED),
    };

    let claims = keys.verify(token).ok_or(StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(CurrentTenant(claims.tenant_id));

    Ok(next.run(req).await)
}
