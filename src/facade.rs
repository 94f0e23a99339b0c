use std::sync::Arc;

use crate::connectors::{BackendDispatcher, Operation, Outcome};
use crate::error::Result;
use crate::registry::{TargetKind, TargetRegistry};

/// Entry point for callers: resolve a target by name, dispatch one operation
/// against it, hand back the backend's result untouched.
///
/// Nothing is retried and the registry is never written here.
#[derive(Clone)]
pub struct OperationFacade {
    registry: TargetRegistry,
    dispatcher: Arc<BackendDispatcher>,
}

impl OperationFacade {
    pub fn new(registry: TargetRegistry, dispatcher: Arc<BackendDispatcher>) -> Self {
        Self {
            registry,
            dispatcher,
        }
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    pub async fn perform(
        &self,
        target_name: &str,
        kind: TargetKind,
        operation: Operation,
    ) -> Result<Outcome> {
        let op_name = operation.name();
        let target = self.registry.resolve_for_dispatch(kind, target_name).await?;

        tracing::info!(%target_name, %kind, operation = op_name, "Dispatching operation");

        match self.dispatcher.execute(&target, &operation).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::warn!(
                    %target_name,
                    %kind,
                    operation = op_name,
                    error = %e,
                    "Operation failed"
                );
                Err(e.into())
            }
        }
    }
}
