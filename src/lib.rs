pub mod config;
pub mod error;
pub mod ingress;
pub mod lifecycle;
pub mod mysql;
pub(crate) mod utils;

pub use error::{Fault, IngressError, ServiceError, SupervisorError};
pub use mysql_broadcast_schema::ChangeNotification;
