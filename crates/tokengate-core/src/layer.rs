//! Tower middleware wrapping any downstream service with a [`Gate`]
//!
//! ```ignore
//! let gate = Gate::from_settings(GateSettings::bearer(["secret1"]))?;
//! let app = Router::new()
//!     .route("/", get(handler))
//!     .layer(GateLayer::new(gate));
//! ```

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use futures_util::future::{ready, Either, Ready};
use tower::{Layer, Service};

use crate::gate::{Decision, Gate};

/// Layer producing [`GateService`]s that share one immutable gate.
#[derive(Debug, Clone)]
pub struct GateLayer {
    gate: Arc<Gate>,
}

impl GateLayer {
    pub fn new(gate: Gate) -> Self {
        Self {
            gate: Arc::new(gate),
        }
    }

    pub fn from_shared(gate: Arc<Gate>) -> Self {
        Self { gate }
    }

    pub fn gate(&self) -> &Arc<Gate> {
        &self.gate
    }
}

impl<S> Layer<S> for GateLayer {
    type Service = GateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GateService {
            inner,
            gate: self.gate.clone(),
        }
    }
}

/// A service that only reaches `inner` for authorized requests.
///
/// Rejections and session upgrades are answered directly; forwarded requests
/// are passed through untouched.
#[derive(Debug, Clone)]
pub struct GateService<S> {
    inner: S,
    gate: Arc<Gate>,
}

impl<S> GateService<S> {
    pub fn new(inner: S, gate: Arc<Gate>) -> Self {
        Self { inner, gate }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S, B> Service<Request<B>> for GateService<S>
where
    S: Service<Request<B>, Response = Response> + Clone,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Either<S::Future, Ready<Result<Response, S::Error>>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        // Take the service that was driven to readiness and leave a fresh
        // clone behind. Answering directly drops it, releasing whatever
        // capacity `poll_ready` reserved.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        match self.gate.decide(req.headers(), req.uri()) {
            Decision::Forward => Either::Left(inner.call(req)),
            decision => Either::Right(ready(Ok(decision.into_response()))),
        }
    }
}
