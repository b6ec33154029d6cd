use std::sync::Arc;

use super::local::LocalShell;
use super::traits::{CommandOutput, Shell};
use crate::error::{HavocError, Result};
use crate::topology::{CommandPlan, Route};

/// Sends a [`CommandPlan`] to the shell its route names.
///
/// Holds at most one remote shell; it is shared by every command of the owning manager.
#[derive(Clone)]
pub struct Dispatcher {
    local: Arc<dyn Shell>,
    remote: Option<Arc<dyn Shell>>,
}

impl Dispatcher {
    pub fn new(local: Arc<dyn Shell>, remote: Option<Arc<dyn Shell>>) -> Self {
        Self { local, remote }
    }

    pub fn local_only() -> Self {
        Self::new(Arc::new(LocalShell::new()), None)
    }

    pub fn with_remote(remote: Arc<dyn Shell>) -> Self {
        Self::new(Arc::new(LocalShell::new()), Some(remote))
    }

    pub async fn run(&self, plan: &CommandPlan) -> Result<CommandOutput> {
        self.shell(plan.route)?.execute(&plan.command).await
    }

    pub fn shell(&self, route: Route) -> Result<&Arc<dyn Shell>> {
        match route {
            Route::Local => Ok(&self.local),
            Route::Remote => self.remote.as_ref().ok_or_else(|| {
                HavocError::Configuration("no remote session configured for this node".to_string())
            }),
        }
    }

    /// Releases the remote session, if any.
    pub async fn close(&self) {
        if let Some(remote) = &self.remote {
            remote.close().await;
        }
    }
}
