// handlers/protected/mod.rs - Handlers under /api that need a credential
//
// Every handler takes the credential as `Result<Credential, AccessError>` so
// malformed path and body input is reported before authentication.

pub mod migrate;
pub mod users;

pub use migrate::indicators_put as migrate_indicators;
pub use migrate::users_post as migrate_users;
pub use users::search as users_search;
