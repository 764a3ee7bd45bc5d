use std::sync::{Arc, PoisonError, RwLock};

use crate::error::StreamError;

type Handler = Arc<dyn Fn(&StreamError) + Send + Sync>;

/// Optional observer for stream errors raised on the decode task.
///
/// The handler is cloned out of the lock before it runs, so it may replace
/// itself. It never influences control flow.
#[derive(Default)]
pub(crate) struct ErrorHook {
    handler: RwLock<Option<Handler>>,
}

impl ErrorHook {
    pub fn set<F>(&self, handler: F)
    where
        F: Fn(&StreamError) + Send + Sync + 'static,
    {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handler));
    }

    pub fn clear(&self) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_set(&self) -> bool {
        self.handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn report(&self, err: &StreamError) {
        let handler = self
            .handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(handler) = handler {
            handler(err);
        }
    }
}
