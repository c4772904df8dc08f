use std::sync::Arc;
use std::time::Duration;

use crate::pipeline::Pipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// Upper bound on the whole request, model calls included.
    pub request_deadline: Duration,
}
