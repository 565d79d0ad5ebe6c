//! Operation strategy: which mutation RPC a run issues and whether the walk
//! recurses into pending children.

use crate::client::{ClientResult, WorkflowExecution, WorkflowServiceClient};
use crate::params::{BatchOperation, BatchParams};

#[derive(Clone, Debug)]
enum Mutation {
    Terminate { reason: String },
    Cancel,
    Signal { signal_name: String, input: String },
}

/// Resolved once at activity entry from normalized parameters; immutable for
/// the rest of the run.
#[derive(Clone, Debug)]
pub(crate) struct OperationStrategy {
    mutation: Mutation,
    apply_to_children: bool,
}

impl OperationStrategy {
    pub(crate) fn resolve(params: &BatchParams) -> Self {
        match &params.operation {
            BatchOperation::Terminate { terminate_children } => Self {
                mutation: Mutation::Terminate {
                    reason: params.reason.clone(),
                },
                apply_to_children: terminate_children.unwrap_or(true),
            },
            BatchOperation::Cancel { cancel_children } => Self {
                mutation: Mutation::Cancel,
                apply_to_children: cancel_children.unwrap_or(true),
            },
            BatchOperation::Signal { signal_name, input } => Self {
                mutation: Mutation::Signal {
                    signal_name: signal_name.clone(),
                    input: input.clone(),
                },
                apply_to_children: false,
            },
        }
    }

    /// Whether the walk enqueues pending children of a mutated target.
    pub(crate) fn applies_to_children(&self) -> bool {
        self.apply_to_children
    }

    /// Apply the mutation to one target.
    pub(crate) async fn mutate<C>(
        &self,
        client: &C,
        execution: &WorkflowExecution,
    ) -> ClientResult<()>
    where
        C: WorkflowServiceClient + ?Sized,
    {
        match &self.mutation {
            Mutation::Terminate { reason } => {
                client.terminate_execution(execution, reason, &[]).await
            }
            Mutation::Cancel => client.cancel_execution(execution).await,
            Mutation::Signal { signal_name, input } => {
                client.signal_execution(execution, signal_name, input).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn strategy_for(operation: BatchOperation) -> OperationStrategy {
        let params =
            BatchParams::new("deals", "q", "r", operation).normalized(&Config::default());
        OperationStrategy::resolve(&params)
    }

    #[test]
    fn terminate_and_cancel_walk_children_by_default() {
        assert!(strategy_for(BatchOperation::Terminate {
            terminate_children: None
        })
        .applies_to_children());
        assert!(strategy_for(BatchOperation::Cancel {
            cancel_children: None
        })
        .applies_to_children());
    }

    #[test]
    fn child_walk_can_be_disabled() {
        assert!(!strategy_for(BatchOperation::Terminate {
            terminate_children: Some(false)
        })
        .applies_to_children());
        assert!(!strategy_for(BatchOperation::Cancel {
            cancel_children: Some(false)
        })
        .applies_to_children());
    }

    #[test]
    fn signal_never_walks_children() {
        assert!(!strategy_for(BatchOperation::Signal {
            signal_name: "pause".to_string(),
            input: String::new(),
        })
        .applies_to_children());
    }
}
