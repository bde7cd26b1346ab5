use std::sync::Arc;

use crate::dispatcher::EventDispatcher;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<EventDispatcher>,
    /// Slack signing secret; requests are not verified when unset
    pub signing_secret: Option<Arc<str>>,
}

impl AppState {
    pub fn new(dispatcher: Arc<EventDispatcher>, signing_secret: Option<String>) -> Self {
        Self {
            dispatcher,
            signing_secret: signing_secret.map(Arc::from),
        }
    }
}
