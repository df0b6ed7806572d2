//! In-memory stack backend for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use super::{Stack, StackBackend};
use crate::error::{DeployError, DeployResult};

/// Keeps deployed stacks in process memory.
///
/// Data is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStackBackend {
    stacks: RwLock<HashMap<String, Stack>>,
    rejection: Option<String>,
    applies: AtomicUsize,
}

impl MemoryStackBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that rejects every stack with `diagnostic`.
    #[must_use]
    pub fn failing(diagnostic: impl Into<String>) -> Self {
        Self {
            rejection: Some(diagnostic.into()),
            ..Self::default()
        }
    }

    /// Number of stacks submitted successfully.
    pub fn apply_count(&self) -> usize {
        self.applies.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StackBackend for MemoryStackBackend {
    async fn current(&self, name: &str) -> DeployResult<Option<Stack>> {
        let stacks = self
            .stacks
            .read()
            .map_err(|_| DeployError::internal("lock poisoned"))?;
        Ok(stacks.get(name).cloned())
    }

    async fn apply(&self, stack: &Stack) -> DeployResult<()> {
        if let Some(diagnostic) = &self.rejection {
            return Err(DeployError::stack_apply(&stack.name, diagnostic.clone()));
        }

        let mut stacks = self
            .stacks
            .write()
            .map_err(|_| DeployError::internal("lock poisoned"))?;
        stacks.insert(stack.name.clone(), stack.clone());
        self.applies.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
