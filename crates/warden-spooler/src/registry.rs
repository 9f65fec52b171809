//! The set of handlers a spooler drives.

use std::fmt;
use std::sync::Arc;

use warden_core::error::DomainError;
use warden_core::handler::Handler;

/// Handlers keyed by view name, built once at startup.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn Handler>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.view_names()).finish()
    }
}

impl HandlerRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidArgument` if the view name is empty, or
    /// `DomainError::AlreadyExists` if another handler owns the view.
    pub fn register(&mut self, handler: Arc<dyn Handler>) -> Result<&mut Self, DomainError> {
        let view_name = handler.view_model();
        if view_name.is_empty() {
            return Err(DomainError::InvalidArgument("handler has no view name".into()));
        }
        if self.handlers.iter().any(|h| h.view_model() == view_name) {
            return Err(DomainError::AlreadyExists(format!(
                "handler for view {view_name} already registered"
            )));
        }
        self.handlers.push(handler);
        Ok(self)
    }

    /// Registered handlers, in registration order.
    #[must_use]
    pub fn handlers(&self) -> &[Arc<dyn Handler>] {
        &self.handlers
    }

    /// Registered view names, in registration order.
    pub fn view_names(&self) -> impl Iterator<Item = &str> {
        self.handlers.iter().map(|h| h.view_model())
    }

    /// Number of handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
