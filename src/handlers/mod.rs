// handlers/mod.rs - Handler tiers
//
// public    - no credential (/, /health)
// protected - session or workspace credential (/api/*)
// v1        - versioned workspace reads that also accept an API key (/api/v1/*)
pub mod public;
pub mod protected;
pub mod v1;
