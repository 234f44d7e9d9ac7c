//! Authenticates every request in the scope it wraps.
//!
//! The bearer token is verified once, here, and the claims are stored in the request extensions for the
//! [`crate::middleware::AclMiddlewareFactory`] and the [`JwtClaims`] extractor to pick up. Requests without a valid
//! token never reach a handler.
use std::{pin::Pin, rc::Rc, sync::Arc};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
    HttpMessage,
};
use futures::{
    future::{ok, Ready},
    Future,
};
use log::*;

use crate::{
    auth::{bearer_token, JwtClaims, TokenVerifier},
    errors::ServerError,
};

pub struct JwtAuthMiddlewareFactory {
    verifier: Arc<TokenVerifier>,
}

impl JwtAuthMiddlewareFactory {
    pub fn new(verifier: Arc<TokenVerifier>) -> Self {
        Self { verifier }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtAuthMiddlewareFactory
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
        ok(JwtAuthMiddlewareService { verifier: Arc::clone(&self.verifier), service: Rc::new(service) })
    }
}

pub struct JwtAuthMiddlewareService<S> {
    verifier: Arc<TokenVerifier>,
    service: Rc<S>,
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
        let service = Rc::clone(&self.service);
        let claims = bearer_token(req.request()).and_then(|token| self.verifier.verify(token));
        Box::pin(async move {
            match claims {
                Ok(claims) => {
                    trace!("💻️ {} authenticated for {} {}", claims.sub, req.method(), req.path());
                    req.extensions_mut().insert::<JwtClaims>(claims);
                    service.call(req).await
                },
                Err(e) => {
                    debug!("💻️ Rejected unauthenticated request to {}. {e}", req.path());
                    Err(ServerError::AuthenticationError(e).into())
                },
            }
        })
    }
}
