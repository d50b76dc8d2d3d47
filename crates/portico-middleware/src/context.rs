//! Pipeline context types.
//!
//! The [`PipelineContext`] carries state through the stages of a single
//! request. A fresh context is created for every request, so nothing a
//! stage writes here can leak into a concurrent request.

use crate::event::FetchEvent;
use http::HeaderMap;
use std::any::{Any, TypeId};
use std::collections::HashMap;

/// Request section of the context.
#[derive(Debug, Clone, Default)]
pub struct RequestState {
    /// Rewritten request headers for downstream consumers.
    ///
    /// `None` until a stage annotates the request.
    pub headers: Option<HeaderMap>,
}

/// The user resolved from the session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    /// Subject identifier from the token.
    pub id: String,
    /// Whether the account has been approved.
    pub is_approved: bool,
}

impl SessionUser {
    /// Creates a user with the given id. Approval is resolved downstream.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_approved: false,
        }
    }
}

/// Context that flows through the middleware pipeline.
///
/// # Example
///
/// ```
/// use portico_middleware::context::{PipelineContext, SessionUser};
/// use portico_middleware::FetchEvent;
///
/// let mut ctx = PipelineContext::new(FetchEvent::new());
/// assert!(ctx.request_headers().is_none());
///
/// ctx.set_user(SessionUser::new("user-123"));
/// assert_eq!(ctx.user().unwrap().id, "user-123");
/// ```
#[derive(Debug)]
pub struct PipelineContext {
    request: RequestState,
    user: Option<SessionUser>,
    event: FetchEvent,

    /// Type-erased extension data.
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl PipelineContext {
    /// Creates an empty context for the request described by `event`.
    #[must_use]
    pub fn new(event: FetchEvent) -> Self {
        Self {
            request: RequestState::default(),
            user: None,
            event,
            extensions: HashMap::new(),
        }
    }

    /// Returns the request section.
    #[must_use]
    pub fn request(&self) -> &RequestState {
        &self.request
    }

    /// Replaces the request section.
    pub fn set_request(&mut self, request: RequestState) {
        self.request = request;
    }

    /// Returns the rewritten request headers, if any stage set them.
    #[must_use]
    pub fn request_headers(&self) -> Option<&HeaderMap> {
        self.request.headers.as_ref()
    }

    /// Stores rewritten request headers for downstream stages.
    pub fn set_request_headers(&mut self, headers: HeaderMap) {
        self.request.headers = Some(headers);
    }

    /// Returns the session user, if authenticated.
    #[must_use]
    pub fn user(&self) -> Option<&SessionUser> {
        self.user.as_ref()
    }

    /// Sets the session user.
    ///
    /// This should only be called by the auth stage.
    pub fn set_user(&mut self, user: SessionUser) {
        self.user = Some(user);
    }

    /// Returns the fetch event of this request.
    #[must_use]
    pub fn event(&self) -> &FetchEvent {
        &self.event
    }

    /// Stores a typed extension value.
    ///
    /// Extensions are how custom stages hand data to later stages; the
    /// standard stages neither read nor write them.
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed extension value.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Removes and returns a typed extension value.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }
}
