pub mod user_profile;
pub mod workspace_user;

pub use user_profile::UserProfile;
pub use workspace_user::WorkspaceUser;

use serde::de::DeserializeOwned;

use super::schema::Row;

/// Convert validated store rows into a typed model
pub fn from_rows<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>, serde_json::Error> {
    rows.into_iter()
        .map(|row| serde_json::from_value(serde_json::Value::Object(row)))
        .collect()
}
