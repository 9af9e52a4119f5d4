// handlers/v1/mod.rs - Versioned workspace reads
//
// These accept either the workspace API key header or a session.

pub mod workspaces;

pub use workspaces::{group_count, inventory_units_count, users_list};
