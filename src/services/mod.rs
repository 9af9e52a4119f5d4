pub mod count;
pub mod sync;

pub use count::{scoped_count, CountQuery};
pub use sync::{prepare_records, sync_collection, SyncError};
