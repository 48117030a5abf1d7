// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "registry/mod.rs"]
pub mod registry;

#[path = "google/mod.rs"]
pub mod google;

#[path = "twitter/mod.rs"]
pub mod twitter;
