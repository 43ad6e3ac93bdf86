mod approle;
mod renewer;
mod store;
mod token_info;

pub use approle::{AppRoleAuthenticator, LoginOutcome, RotationStatus};
pub use renewer::{RenewalEvents, RenewalHandle, RenewedEvent, TokenRenewer};
pub use store::{CredentialSource, CredentialStore};
pub use token_info::TokenInfo;
