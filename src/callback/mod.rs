pub mod handler;
pub mod params;

pub use handler::{CallbackHandler, CallbackOutcome, CallbackReport, CallbackState};
pub use params::{is_safe_next, strip_one_time_params, CallbackParams};
