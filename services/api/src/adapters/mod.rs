pub mod content_llm;
pub mod db;
pub mod google_auth;
pub mod password_auth;
pub mod paypal;

pub use content_llm::OpenAiContentAdapter;
pub use db::DbAdapter;
pub use google_auth::GoogleIdentityProvider;
pub use password_auth::PasswordIdentityProvider;
pub use paypal::PayPalGateway;
