//! Wire-level record types shared between the ingress listener and dispatch sinks.

pub mod notification;

pub use notification::{ChangeNotification, NotificationError};
