//! Watch what the user is doing; keep Spotify's mood in sync.
//!
//! The pipeline: an [`sampler::ActivitySampler`] observes the active
//! application, the [`engine::SyncEngine`] debounces observations and maps
//! them through a [`mapping::MappingTable`], and the [`api_client::ApiClient`]
//! (holding a refreshable [`auth::CredentialStore`]) tells Spotify to switch
//! playback context. [`engine::Monitor`] drives ticks from a worker thread.

pub mod api_client;
pub mod auth;
pub mod config;
pub mod engine;
pub mod mapping;
pub mod platform;
pub mod sampler;
pub mod util;

#[cfg(test)]
pub mod testing;

pub use api_client::{ApiClient, ApiError, UserProfile};
pub use auth::{AuthError, Credential, CredentialStore, TokenFile, TokenStore};
pub use config::{Config, SamplerKind};
pub use engine::{ContextPlayer, Monitor, SyncEngine};
pub use mapping::{MappingEntry, MappingTable};
pub use sampler::{ActivitySampler, ForegroundSampler, ProcessScanSampler, SamplerError};
