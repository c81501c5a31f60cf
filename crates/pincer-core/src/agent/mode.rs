//! Execution mode state.
//!
//! The mode is owned by a [`ModeManager`] (driven by the UI or server); the
//! tool interceptor only ever reads it through a [`ModeReader`].

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// How proposed tool calls are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Tools execute normally (subject to approval policy).
    #[default]
    Normal,
    /// Write operations are simulated, never applied.
    PlanOnly,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::PlanOnly => write!(f, "plan_only"),
        }
    }
}

/// Sole owner and writer of the execution mode.
pub struct ModeManager {
    mode: Arc<RwLock<ExecutionMode>>,
}

impl ModeManager {
    pub fn new(initial: ExecutionMode) -> Self {
        Self {
            mode: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn set(&self, mode: ExecutionMode) {
        let previous = {
            let mut guard = self.mode.write();
            std::mem::replace(&mut *guard, mode)
        };
        if previous != mode {
            tracing::info!(%previous, next = %mode, "execution mode changed");
        }
    }

    pub fn current(&self) -> ExecutionMode {
        *self.mode.read()
    }

    /// Read-only handle for components that must never mutate the mode.
    pub fn reader(&self) -> ModeReader {
        ModeReader {
            mode: self.mode.clone(),
        }
    }
}

impl Default for ModeManager {
    fn default() -> Self {
        Self::new(ExecutionMode::default())
    }
}

/// Cheap cloneable read-only view of the execution mode.
#[derive(Clone)]
pub struct ModeReader {
    mode: Arc<RwLock<ExecutionMode>>,
}

impl ModeReader {
    pub fn current(&self) -> ExecutionMode {
        *self.mode.read()
    }
}
