//! Command-line cut-volume measurement.
//!
//! Measures the terrain volume inside a polygon against either synthetic
//! terrain or the Open-Elevation API, logs progress, and optionally writes a
//! JSON report with the result and mesh buffers.

mod args;
mod report;

use std::{f64::consts::TAU, sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use clap::Parser;
use cutvol::{
    Completion, CutVolumeSession, ElevationService, OpenElevationClient, SamplingJob,
    SyntheticTerrain,
};
use glam::DVec3;

use crate::args::{CliArgs, ServiceKind};
use crate::report::Report;

/// Mean Earth radius used to turn the synthetic wavelength into an angle.
const MEAN_EARTH_RADIUS: f64 = 6_371_000.0;

type Session = CutVolumeSession<dyn ElevationService>;

#[tokio::main]
async fn main() -> Result<()> {
    {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    let args = CliArgs::parse();
    let config = args.measure_config()?;
    let corners = args.corners()?;

    let service: Arc<dyn ElevationService> = match args.service {
        ServiceKind::Synthetic => {
            let base = args.base_height;
            let amplitude = args.amplitude;
            let k = TAU * MEAN_EARTH_RADIUS / args.wavelength.max(1.0);
            let mut terrain = SyntheticTerrain::new(move |p| {
                base + amplitude * (p.longitude * k).sin() * (p.latitude * k).cos()
            });
            if let Some(max_level) = args.max_level {
                terrain = terrain.with_max_level(max_level);
            }
            Arc::new(terrain)
        }
        ServiceKind::OpenElevation => {
            let mut client = OpenElevationClient::new()?;
            if let Some(url) = &args.url {
                client = client.with_base_url(url);
            }
            if let Some(max_level) = args.max_level {
                client = client.with_max_level(max_level);
            }
            client
                .prefetch(&corners)
                .await
                .context("failed to fetch corner elevations")?;
            Arc::new(client)
        }
    };

    let positions: Vec<DVec3> = corners
        .iter()
        .map(|&c| config.ellipsoid.cartographic_to_cartesian(c))
        .collect();

    let mut session: Session = CutVolumeSession::new(service, config);
    let timeout = args.timeout.map(Duration::from_secs_f64);

    let job = session.submit(&positions).context("cannot measure polygon")?;
    if run_job(&mut session, job, timeout).await? == Completion::Cancelled {
        return Ok(());
    }

    if let Some(level) = args.refine
        && let Some(job) = session.set_detail_level(level)?
        && run_job(&mut session, job, timeout).await? == Completion::Cancelled
    {
        return Ok(());
    }

    let Some(measurement) = session.measurement() else {
        bail!("no measurement was published");
    };

    println!("{}", measurement.label_text());

    if let Some(path) = &args.output {
        let report = Report::new(measurement, session.config(), args.include_meshes);
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), "wrote report");
    }

    session.cleanup();
    Ok(())
}

/// Run a sampling job on the runtime, logging progress, and apply its outcome.
async fn run_job(
    session: &mut Session,
    job: SamplingJob<dyn ElevationService>,
    timeout: Option<Duration>,
) -> Result<Completion> {
    let generation = job.generation();
    tracing::info!(generation, points = job.point_count(), "sampling terrain");

    let (progress_tx, progress_rx) = async_channel::unbounded::<f64>();
    let printer = tokio::spawn(async move {
        let mut last_percent = None;
        while let Ok(progress) = progress_rx.recv().await {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let percent = (progress * 100.0).floor() as u32;
            if last_percent.is_none_or(|last| percent >= last + 10 || percent == 100) {
                tracing::info!(generation, "sampling {percent}%");
                last_percent = Some(percent);
            }
        }
    });

    let mut handle = tokio::spawn(job.run(move |progress| {
        let _ = progress_tx.try_send(progress);
    }));

    let outcome = match timeout {
        Some(limit) => {
            if let Ok(joined) = tokio::time::timeout(limit, &mut handle).await {
                joined
            } else {
                tracing::warn!(generation, ?limit, "sampling timed out, cancelling");
                session.cancel();
                handle.await
            }
        }
        None => handle.await,
    }
    .context("sampling task failed")?;

    printer.await.context("progress task failed")?;

    let completion = session.complete(outcome)?;
    if completion == Completion::Cancelled {
        tracing::warn!(generation, "measurement cancelled");
    }
    Ok(completion)
}
