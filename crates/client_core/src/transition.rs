//! Forward-only transitions layered over the permissive [`Controller`].

use tracing::warn;

use crate::{
    controller::{Controller, LifecycleState},
    error::TransitionError,
};

/// Sets `next` unless it would move the controller to an earlier stage.
///
/// Staying on the same stage is allowed, so re-announcing the current state or
/// switching between sibling outcomes goes through.
pub fn advance<S: LifecycleState>(controller: &Controller<S>, next: S) -> Result<(), TransitionError> {
    controller
        .replace_state_with(|current| {
            if next.stage() < current.stage() {
                return Err(TransitionError::Regression {
                    from: format!("{current:?}"),
                    from_stage: current.stage(),
                    to: format!("{next:?}"),
                    to_stage: next.stage(),
                });
            }
            Ok(next)
        })
        .inspect_err(|error| warn!(%error, "rejected lifecycle transition"))
}
