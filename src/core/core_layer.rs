// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "registry/registry_store.rs"]
pub mod registry;

#[path = "discovery/discovery_service.rs"]
pub mod discovery;

#[path = "extraction/mod.rs"]
pub mod extraction;

#[path = "outreach/stage_runner.rs"]
pub mod outreach;
