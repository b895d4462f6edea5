use crate::utils::logging::pretty_json_if_debug;
use mysql_broadcast_schema::ChangeNotification;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::{debug, error, info};

/// Consumer of decoded change notifications.
///
/// Called on the request path; implementations that do real work should hand
/// the notification off (e.g. to a channel) rather than block.
pub trait Dispatch: Send + Sync {
    fn dispatch(&self, notification: ChangeNotification);
}

impl<F> Dispatch for F
where
    F: Fn(ChangeNotification) + Send + Sync,
{
    fn dispatch(&self, notification: ChangeNotification) {
        self(notification)
    }
}

/// Default sink: records each notification in the log and drops it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDispatch;

impl Dispatch for LogDispatch {
    fn dispatch(&self, notification: ChangeNotification) {
        info!(
            table = notification.table().unwrap_or("-"),
            op = notification.op().unwrap_or("-"),
            fields = notification.fields().len(),
            received_at = %notification.received_at(),
            "Change notification received"
        );
        if let Some(json) = pretty_json_if_debug(&notification) {
            debug!("Change notification payload:\n{json}");
        }
    }
}

/// Runs `sink`, containing any panic so the listener keeps serving.
pub(crate) fn dispatch_guarded(sink: &dyn Dispatch, notification: ChangeNotification) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| sink.dispatch(notification))) {
        let reason = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "<non-string panic>".to_string());
        error!(reason = %reason, "Dispatch sink panicked; notification dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[test]
    fn closures_are_sinks() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            move |n: ChangeNotification| seen.lock().unwrap().push(n)
        };

        let n = ChangeNotification::from_value(json!({"table": "orders"})).unwrap();
        dispatch_guarded(&sink, n.clone());

        assert_eq!(*seen.lock().unwrap(), vec![n]);
    }

    struct Faulty;

    impl Dispatch for Faulty {
        fn dispatch(&self, _notification: ChangeNotification) {
            panic!("consumer bug");
        }
    }

    #[test]
    fn panicking_sink_is_contained() {
        let n = ChangeNotification::from_value(json!({})).unwrap();
        dispatch_guarded(&Faulty, n);
    }
}
