pub mod account;
pub mod bootstrap;
pub mod navigation;
pub mod reconciler;
pub mod status;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use bootstrap::{BootstrapOutcome, SessionBootstrapper};
pub use navigation::{
    navigation_intent, NavigationPhase, NavigationTrigger, Navigator, Redirect, RedirectQueue,
};
pub use reconciler::EventReconciler;
pub use status::{AuthStatus, SessionSnapshot};
pub use store::{SessionSettings, SessionStore};
