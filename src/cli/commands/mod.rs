pub mod api_key;
pub mod migrate;
pub mod serve;
pub mod token;
