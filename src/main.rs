//! spotify-autopilot daemon: watch the active application and steer
//! Spotify playback to match.

use anyhow::{bail, Context, Result};
use log::{info, warn};
use std::sync::mpsc;

use spotify_autopilot::auth::{Credential, CredentialStore, TokenFile};
use spotify_autopilot::config::{Config, SamplerKind};
use spotify_autopilot::engine::{Monitor, SyncEngine};
use spotify_autopilot::sampler::{ActivitySampler, ForegroundSampler, ProcessScanSampler};
use spotify_autopilot::{platform, ApiClient, MappingTable};

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!(
        "spotify-autopilot {} starting on {}",
        env!("CARGO_PKG_VERSION"),
        platform::name()
    );

    let mut config = Config::load()?;
    config.apply_env_overrides();
    if config.client_id.is_empty() || config.client_secret.is_empty() {
        bail!(
            "missing Spotify app credentials; set client_id/client_secret in {} \
             or export SPOTIFY_CLIENT_ID / SPOTIFY_CLIENT_SECRET",
            Config::path()?.display()
        );
    }

    let credentials = build_credentials(&config)?;
    let mut client = ApiClient::new(credentials);
    match client.me() {
        Ok(profile) => {
            let name = profile
                .display_name
                .filter(|n| !n.is_empty())
                .unwrap_or(profile.id);
            info!("authorized as {name}");
        }
        Err(e) => warn!("could not verify the account ({e}); continuing anyway"),
    }

    let mappings = MappingTable::from_entries(config.mappings.clone());
    if mappings.is_empty() && config.fallback_context.is_none() {
        warn!(
            "no mappings configured; edit {} to add some",
            Config::path()?.display()
        );
    }

    let sampler: Box<dyn ActivitySampler + Send> = match config.sampler {
        SamplerKind::Foreground => Box::new(ForegroundSampler::new()),
        SamplerKind::ProcessScan => Box::new(ProcessScanSampler::new(mappings.match_keys())),
    };
    let engine = SyncEngine::new(
        sampler,
        Box::new(client),
        mappings,
        config.fallback_context.clone(),
    );
    let mut monitor = Monitor::new(engine, config.poll_interval());
    monitor.start();

    wait_for_shutdown()?;
    info!("shutting down");
    monitor.stop();
    Ok(())
}

/// Load the stored credential (seeding from `SPOTIFY_REFRESH_TOKEN` on
/// first run) and refresh it so the daemon starts with a live access
/// token.
fn build_credentials(config: &Config) -> Result<CredentialStore> {
    let credentials_path = Config::credentials_path()?;
    let mut store = CredentialStore::new(
        config.client_id.clone(),
        config.client_secret.clone(),
        Box::new(TokenFile::new(credentials_path.clone())),
    );

    if !store.load_persisted()? {
        match std::env::var("SPOTIFY_REFRESH_TOKEN") {
            Ok(token) if !token.is_empty() => {
                info!("seeding credentials from SPOTIFY_REFRESH_TOKEN");
                store.initialize(Credential::from_refresh_token(token));
            }
            _ => bail!(
                "no stored credentials at {}; run the authorization flow once and \
                 put the refresh token in SPOTIFY_REFRESH_TOKEN (or a .env file)",
                credentials_path.display()
            ),
        }
    }

    store.refresh().context(
        "could not refresh the access token; the stored refresh token may have been revoked",
    )?;
    Ok(store)
}

fn wait_for_shutdown() -> Result<()> {
    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("Failed to set Ctrl+C handler")?;
    rx.recv().ok();
    Ok(())
}
