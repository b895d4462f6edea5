//! HTTP endpoint that receives row-change callbacks from database triggers.

pub mod dispatch;
pub mod listener;
pub mod router;

pub use dispatch::{Dispatch, LogDispatch};
pub use listener::ChangeListener;
pub use router::{IngressState, ingress_router};
