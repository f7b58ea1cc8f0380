//! Containment for panics raised by workflow code.

use std::any::Any;

use metrics::counter;
use relay_core::ids::ConnectionId;
use tracing::error;

use crate::metrics::WORKFLOW_PANICS_TOTAL;

/// Where workflow code was running when it panicked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PanicSite {
    /// `Workflow::start`.
    Start,
    /// A listener registered with `Session::on`.
    Listener,
    /// A handler registered with `Session::on_async`.
    AsyncHandler,
}

impl PanicSite {
    fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Listener => "listener",
            Self::AsyncHandler => "async_handler",
        }
    }
}

/// Log a caught panic against its connection and count it.
pub(crate) fn report_panic(
    connection_id: &ConnectionId,
    workflow: &str,
    site: PanicSite,
    panic: &(dyn Any + Send),
) {
    error!(
        connection_id = %connection_id,
        workflow,
        site = site.as_str(),
        panic = panic_message(panic),
        "workflow code panicked"
    );
    counter!(
        WORKFLOW_PANICS_TOTAL,
        "workflow" => workflow.to_owned(),
        "site" => site.as_str()
    )
    .increment(1);
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::catch_unwind;

    use relay_core::logging::capture_logs;
    use tracing::Level;

    use crate::testing::session_pair;

    fn panic_with_str() {
        panic!("boom");
    }

    fn panic_with_string() {
        std::panic::panic_any(String::from("formatted"));
    }

    fn panic_with_number() {
        std::panic::panic_any(7_u8);
    }

    #[test]
    fn panic_message_from_str_and_string() {
        let payload = catch_unwind(panic_with_str).unwrap_err();
        assert_eq!(panic_message(&*payload), "boom");

        let payload = catch_unwind(panic_with_string).unwrap_err();
        assert_eq!(panic_message(&*payload), "formatted");

        let payload = catch_unwind(panic_with_number).unwrap_err();
        assert_eq!(panic_message(&*payload), "non-string panic payload");
    }

    #[tokio::test]
    async fn report_logs_against_connection() {
        let (logs, _guard) = capture_logs();
        let (session, _device) = session_pair("wf_api");
        let payload = catch_unwind(panic_with_str).unwrap_err();

        report_panic(session.id(), session.workflow(), PanicSite::Listener, &*payload);

        let events: Vec<_> = logs
            .events()
            .into_iter()
            .filter(|e| e.level == Level::ERROR && e.message.contains("workflow code panicked"))
            .collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].field("connection_id"), Some(session.id().as_str()));
        assert_eq!(events[0].field("site"), Some("listener"));
        assert_eq!(events[0].field("panic"), Some("boom"));
    }
}
