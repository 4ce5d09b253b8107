use std::sync::Arc;

use redstring_core::Core;

use crate::scheduler::Scheduler;

/// axum's `State` extractor wants a cheap `Clone`; both handles stay
/// behind `Arc`s so every handler and the background tick task share the
/// same process-wide `Core` and `Scheduler`.
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<Core>,
    pub scheduler: Arc<Scheduler>,
}

impl AppState {
    pub fn new(core: Arc<Core>) -> Self {
        let scheduler = Arc::new(Scheduler::new(core.clone()));
        Self { core, scheduler }
    }
}
