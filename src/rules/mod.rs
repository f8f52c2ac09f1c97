//! Rule windows and the rule event bus.
//!
//! Both dispatch to priority-ordered handlers, stop once a handler cancels, and
//! contain handler failures: an error or panic is logged and dispatch moves on.

mod events;
mod window;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::error;

pub use events::{RuleEvent, RuleEventBus, RuleEventKind, SubscriptionId};
pub(crate) use window::push_unique;
pub use window::{
    DispatchReport, FnRuleProvider, RuleProvider, RuleWindow, RuleWindowContext,
    RuleWindowDispatcher,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct RuleError(pub String);

impl RuleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Runs one handler. Returns false when it failed or panicked.
pub(crate) fn run_guarded<F>(handler_id: &str, stage: &str, handler: F) -> bool
where
    F: FnOnce() -> Result<(), RuleError>,
{
    match panic::catch_unwind(AssertUnwindSafe(handler)) {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            error!(handler = handler_id, stage, error = %err, "rule handler failed");
            false
        }
        Err(payload) => {
            error!(
                handler = handler_id,
                stage,
                panic = %panic_message(payload.as_ref()),
                "rule handler panicked"
            );
            false
        }
    }
}
