//! Scoped stack of release actions.
//!
//! Acquiring a temporary disk image or a mounted volume pushes the matching
//! release onto a [`ResourceStack`]. [`ResourceStack::release_all`] undoes
//! them newest-first, whether the surrounding sequence succeeded or not.

use crate::bundler::error::Result;
use std::future::Future;
use std::pin::Pin;

type ReleaseFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
type ReleaseAction = Box<dyn FnOnce() -> ReleaseFuture + Send>;

/// LIFO stack of pending release actions.
#[derive(Default)]
pub struct ResourceStack {
    actions: Vec<(String, ReleaseAction)>,
}

impl std::fmt::Debug for ResourceStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceStack")
            .field("pending", &self.labels())
            .finish()
    }
}

impl ResourceStack {
    /// Empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the release for a resource that has just been acquired.
    ///
    /// Releases must tolerate the resource already being gone.
    pub fn push<F, Fut>(&mut self, label: impl Into<String>, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let label = label.into();
        log::debug!("Registered release action: {}", label);
        self.actions
            .push((label, Box::new(move || Box::pin(action()) as ReleaseFuture)));
    }

    /// Labels of pending actions, oldest first.
    pub fn labels(&self) -> Vec<&str> {
        self.actions.iter().map(|(label, _)| label.as_str()).collect()
    }

    /// Number of pending actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every pending action once, newest first.
    ///
    /// A failing action is logged and the remaining ones still run.
    pub async fn release_all(&mut self) {
        while let Some((label, action)) = self.actions.pop() {
            log::debug!("Releasing: {}", label);
            if let Err(e) = action().await {
                log::error!("Release action '{}' failed: {}", label, e);
            }
        }
    }
}

impl Drop for ResourceStack {
    fn drop(&mut self) {
        if !self.actions.is_empty() {
            log::warn!(
                "Resource stack dropped with {} unreleased action(s): {}",
                self.actions.len(),
                self.labels().join(", ")
            );
        }
    }
}
