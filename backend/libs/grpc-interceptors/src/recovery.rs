//! Panic recovery stage
//!
//! A panic anywhere below this stage is caught, logged with its stack trace
//! and turned into the registry's internal error. The process keeps serving.

use crate::chain::{BoxFuture, Next, Stage};
use crate::context::RequestContext;
use error_types::ErrorRegistry;
use futures::FutureExt;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Once};
use tracing::error;

thread_local! {
    static LAST_BACKTRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Capture a backtrace on every panic for the recovery stage to pick up.
///
/// The previously installed hook still runs afterwards.
pub fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            LAST_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(Backtrace::force_capture()));
            previous(info);
        }));
    });
}

fn take_backtrace() -> Option<Backtrace> {
    LAST_BACKTRACE.with(|slot| slot.borrow_mut().take())
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

pub struct RecoveryStage {
    registry: Arc<ErrorRegistry>,
}

impl RecoveryStage {
    pub fn new(registry: Arc<ErrorRegistry>) -> Self {
        install_panic_hook();
        Self { registry }
    }
}

impl<Req, Resp> Stage<Req, Resp> for RecoveryStage
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn name(&self) -> &'static str {
        "recovery"
    }

    fn call<'a>(
        &'a self,
        ctx: RequestContext,
        req: Req,
        next: Next<'a, Req, Resp>,
    ) -> BoxFuture<'a, anyhow::Result<Resp>> {
        let method = ctx.method().to_string();

        Box::pin(async move {
            match AssertUnwindSafe(next.run(ctx, req)).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    let stacktrace = take_backtrace()
                        .map(|backtrace| backtrace.to_string())
                        .unwrap_or_else(|| "unavailable".to_string());

                    error!(
                        event = "panic_recovered",
                        method = %method,
                        panic = %message,
                        stacktrace = %stacktrace,
                        "Recovered from panic in request handler"
                    );

                    let internal = self
                        .registry
                        .internal()
                        .with_cause(anyhow::anyhow!("panic: {}", message));
                    Err(internal.into())
                }
            }
        })
    }
}
