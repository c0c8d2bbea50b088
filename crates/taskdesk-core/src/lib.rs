pub mod cli;
pub mod commands;
pub mod config;
pub mod controller;
pub mod datastore;
pub mod datetime;
pub mod export;
pub mod filter;
pub mod i18n;
pub mod protect;
pub mod render;
pub mod rpc;
pub mod service;
pub mod task;
pub mod view;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

use crate::task::Viewer;

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let pre = cli::preprocess_args(&raw_args)?;
    let cli = cli::GlobalCli::parse_from(pre.cleaned_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(verbose = cli.verbose, quiet = cli.quiet, "starting mytasks");
    debug!(?pre.rc_overrides, "preprocessed rc overrides");

    let mut cfg = config::Config::load(cli.rcfile.as_deref())?;
    cfg.apply_overrides(
        pre.rc_overrides
            .into_iter()
            .chain(cli.rc_overrides.into_iter().map(|kv| (kv.key, kv.value))),
    );

    let data_dir = config::resolve_data_dir(&cfg, cli.data.as_deref())
        .context("failed to resolve data directory")?;

    let store = datastore::DataStore::open(&data_dir)
        .with_context(|| format!("failed to open datastore at {}", data_dir.display()))?;

    let viewer = resolve_viewer(&cfg, cli.user, cli.roles, cli.organization);
    info!(user = %viewer.user, roles = ?viewer.roles, "resolved viewer");

    let elevated_role = cfg
        .get("role.elevated")
        .unwrap_or_else(|| "System Manager".to_string());
    let service =
        service::LocalTaskService::new(store, viewer, &elevated_role, cfg.lang());

    let renderer = render::Renderer::new(&cfg)?;
    let inv = cli::Invocation::parse(&cfg, cli.rest)?;

    commands::dispatch(service, &cfg, &renderer, inv)?;

    info!("done");
    Ok(())
}

/// Flags win over rc keys; there is always an acting user, so an
/// unconfigured session falls back to a local placeholder identity.
fn resolve_viewer(
    cfg: &config::Config,
    user_flag: Option<String>,
    role_flags: Vec<String>,
    org_flag: Option<String>,
) -> Viewer {
    let user = user_flag
        .or_else(|| cfg.get("user.name"))
        .unwrap_or_else(|| "user@local".to_string());

    let roles: Vec<String> = if role_flags.is_empty() {
        cfg.get("user.roles")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    } else {
        role_flags
    };

    let mut viewer = Viewer::new(
        &user,
        &roles.iter().map(String::as_str).collect::<Vec<_>>(),
    );
    viewer.organization = org_flag.or_else(|| cfg.get("user.organization"));
    viewer
}
