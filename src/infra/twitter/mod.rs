// Twitter infra layer.
// - `twitter_client.rs` posts tweets via the v2 API.

#[path = "twitter_client.rs"]
pub mod twitter_client;

pub use twitter_client::TwitterApiClient;
