pub mod event;
pub mod identity;
pub mod link;
pub mod profile;

pub use event::{AuthEvent, AuthEventKind};
pub use identity::{Credentials, Identity, Session};
pub use link::LinkType;
pub use profile::{OnboardingStatus, Profile, ProfileDraft};
