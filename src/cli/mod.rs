//! cli
//!
//! The `pw` ops binary: sweeps, HACT recomputes, outbox drains, and
//! entity inspection. The CLI runs with a system actor carrying the
//! Partnership Manager role; it is an operations tool, not a user
//! surface.

use std::sync::Arc;

use anyhow::{bail, Context as _};

use crate::config::EngineConfig;
use crate::core::amendment::InterventionAmendment;
use crate::core::agreement::Agreement;
use crate::core::intervention::Intervention;
use crate::core::partner::Partner;
use crate::core::permissions::Role;
use crate::core::types::PartnerId;
use crate::engine::{hact, sweep, Actor, Context};
use crate::store::Store;
use crate::sync::{HttpDownstream, SyncWorker};

pub mod args;

pub use args::{Cli, Commands};

/// Run one CLI invocation.
pub fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => crate::config::load_from_path(path)?,
        None => crate::config::load()?,
    };
    let store = Store::open(config.data_dir())?;
    let ctx = Context::new(
        Actor::new("system@pactwork", vec![Role::PartnershipManager]),
        config.tenant.tenant_code()?,
        config.tenant.local_currency.clone(),
    );

    match cli.command {
        Commands::Sweep => {
            let report = sweep::run_auto_transitions(&store, &ctx)?;
            println!(
                "swept: {} ended, {} closed, {} expired, {} flagged stale, {} skipped",
                report.ended, report.closed, report.expired, report.stale_flagged, report.skipped
            );
        }
        Commands::Hact { partner } => match partner {
            Some(id) => {
                let partner_id = PartnerId::parse(&id).context("invalid partner id")?;
                let values = hact::recompute_partner_hact(&store, &ctx, partner_id)?;
                println!("{}", serde_json::to_string_pretty(&values)?);
            }
            None => {
                let recomputed = sweep::run_nightly_hact(&store, &ctx)?;
                println!("recomputed {} partners", recomputed);
            }
        },
        Commands::Outbox => {
            let report = drain_outbox(&store, &config)?;
            println!(
                "outbox: {} delivered, {} failed, {} skipped",
                report.delivered, report.failed, report.skipped
            );
        }
        Commands::Show { kind, id } => show(&store, &kind, &id)?,
    }
    Ok(())
}

fn drain_outbox(store: &Store, config: &EngineConfig) -> anyhow::Result<crate::sync::DrainReport> {
    let Some(downstream_config) = config.downstream.as_ref().filter(|d| d.enabled) else {
        bail!("downstream sync is not enabled in the configuration");
    };
    let downstream = Arc::new(HttpDownstream::new(&downstream_config.url)?);
    let worker = SyncWorker::new(
        store.clone(),
        downstream,
        config.tenant.business_area_code.clone(),
    );
    let runtime = tokio::runtime::Runtime::new()?;
    Ok(runtime.block_on(worker.drain())?)
}

fn show(store: &Store, kind: &str, id: &str) -> anyhow::Result<()> {
    let json = match kind {
        "partner" => serde_json::to_value(store.get_required::<Partner>(id)?)?,
        "agreement" => serde_json::to_value(store.get_required::<Agreement>(id)?)?,
        "intervention" => serde_json::to_value(store.get_required::<Intervention>(id)?)?,
        "amendment" => serde_json::to_value(store.get_required::<InterventionAmendment>(id)?)?,
        other => bail!("unknown entity kind: {}", other),
    };
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
