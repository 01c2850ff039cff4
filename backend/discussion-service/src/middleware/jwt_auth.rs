use std::future::{ready, Future, Ready};
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    Error, FromRequest, HttpMessage, HttpRequest,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::MIN_JWT_SECRET_LEN;
use crate::error::ServiceError;

/// Claims issued by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Verified caller identity, stored in request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// HS256 token verification.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Result<Self, ServiceError> {
        if secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ServiceError::Internal(format!(
                "JWT secret must be at least {} bytes",
                MIN_JWT_SECRET_LEN
            )));
        }
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Ok(Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    pub fn verify(&self, token: &str) -> Result<Identity, ServiceError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            tracing::warn!("JWT validation failed: {}", e);
            ServiceError::Unauthenticated("Invalid or expired token".to_string())
        })?;

        let user_id = Uuid::parse_str(&data.claims.sub).map_err(|_| {
            tracing::warn!(sub = %data.claims.sub, "Token subject is not a UUID");
            ServiceError::Unauthenticated("Invalid token: malformed user_id".to_string())
        })?;

        Ok(Identity {
            user_id,
            email: data.claims.email,
            display_name: data.claims.name,
        })
    }
}

/// Rejects requests without a valid `Authorization: Bearer` token.
#[derive(Clone)]
pub struct JwtAuthMiddleware {
    verifier: Arc<JwtVerifier>,
}

impl JwtAuthMiddleware {
    pub fn new(verifier: Arc<JwtVerifier>) -> Self {
        Self { verifier }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtAuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = JwtAuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtAuthMiddlewareService {
            service: Rc::new(service),
            verifier: self.verifier.clone(),
        }))
    }
}

pub struct JwtAuthMiddlewareService<S> {
    service: Rc<S>,
    verifier: Arc<JwtVerifier>,
}

impl<S, B> Service<ServiceRequest> for JwtAuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let verifier = self.verifier.clone();

        Box::pin(async move {
            let auth_header = req
                .headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .ok_or_else(|| ServiceError::Unauthenticated("Missing Authorization header".to_string()))?;

            let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
                ServiceError::Unauthenticated("Invalid Authorization header format".to_string())
            })?;

            let identity = verifier.verify(token)?;
            req.extensions_mut().insert(identity);

            service.call(req).await
        })
    }
}

impl FromRequest for Identity {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<Identity>()
                .cloned()
                .ok_or_else(|| ServiceError::Unauthenticated("User not authenticated".to_string()).into()),
        )
    }
}
