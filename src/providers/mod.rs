pub mod base;
pub mod events;
pub mod gotrue_provider;
pub mod plain_provider;

// Re-export the primary provider items so code outside can do
// "use crate::providers::{IdentityProvider, create_identity_provider};"
pub use base::{
    create_identity_provider, FragmentTokens, IdentityProvider, IdentityProviderConfig,
    OtpVerification, SignUpOutcome,
};
pub use events::EventBus;
