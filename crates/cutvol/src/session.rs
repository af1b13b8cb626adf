//! The measurement session state machine.
//!
//! A session freezes one polygon at a time and drives it through
//! subdivision, elevation sampling, volume estimation and mesh building.
//! Sampling is the only asynchronous step; it runs as a [`SamplingJob`] that
//! owns everything it needs, so callers can spawn it on any executor and
//! hand the [`JobOutcome`] back with [`CutVolumeSession::complete`].
//!
//! Every job carries a generation number. Starting a new job, cancelling or
//! cleaning up cancels the current job and bumps the generation, so outcomes
//! of superseded jobs are recognised and dropped.

use std::sync::Arc;

use glam::DVec3;

use crate::config::MeasureConfig;
use crate::ellipsoid::{Ellipsoid, SurfacePoint};
use crate::error::{Error, Result};
use crate::mesh::MeshBuilder;
use crate::polygon::Polygon;
use crate::sampler::{CancelToken, ElevationSampler};
use crate::service::ElevationService;
use crate::subdivide::{PolygonSubdivider, granularity_for};
use crate::types::{MeshBuffers, Triangle, VolumeResult};
use crate::volume::{VolumeEstimator, floor_height};

/// Where a session is in its measurement cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No sampling in progress.
    Idle,
    /// A sampling job of the given generation is outstanding.
    Sampling {
        /// Generation of the outstanding job.
        generation: u64,
    },
    /// A measurement has been published.
    Computed,
}

/// How a job outcome was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// A new measurement was published.
    Published,
    /// The outcome belonged to a superseded job and was dropped.
    Superseded,
    /// The job was cancelled; nothing was published.
    Cancelled,
}

/// A published measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// Volume, heights and centroid.
    pub result: VolumeResult,
    /// Height-coloured prism mesh.
    pub fill: MeshBuffers,
    /// Outline of the sampled top surface.
    pub wireframe: MeshBuffers,
    /// The sampled dense mesh, in subdivision order.
    pub triangles: Vec<Triangle>,
    /// Where the volume label is placed.
    pub label_position: DVec3,
}

impl Measurement {
    /// Text for the volume label.
    #[must_use]
    pub fn label_text(&self) -> String {
        self.result.label_text()
    }
}

/// A pending elevation sampling pass.
///
/// Running the job does not touch the session; pass the outcome to
/// [`CutVolumeSession::complete`].
#[derive(Debug)]
pub struct SamplingJob<S: ?Sized> {
    generation: u64,
    points: Vec<SurfacePoint>,
    service: Arc<S>,
    cancel: CancelToken,
    divisions: usize,
    ellipsoid: Ellipsoid,
}

impl<S: ElevationService + ?Sized> SamplingJob<S> {
    /// The generation this job belongs to.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of dense-mesh vertices to sample.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// A handle that cancels this job.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Sample all dense-mesh vertices, reporting progress in `0..=1`.
    pub async fn run(self, on_progress: impl FnMut(f64)) -> JobOutcome {
        let result = ElevationSampler::new(self.service.as_ref(), self.ellipsoid)
            .with_divisions(self.divisions)
            .sample(&self.points, on_progress, &self.cancel)
            .await;

        JobOutcome {
            generation: self.generation,
            result,
        }
    }
}

/// The result of running a [`SamplingJob`].
#[derive(Debug)]
pub struct JobOutcome {
    generation: u64,
    result: Result<Vec<SurfacePoint>>,
}

impl JobOutcome {
    /// The generation of the job that produced this outcome.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// The polygon currently being measured and its floor height.
#[derive(Debug, Clone)]
struct Frozen {
    polygon: Polygon,
    min_height: f64,
}

/// Orchestrates cut-volume measurements for one polygon at a time.
#[derive(Debug)]
pub struct CutVolumeSession<S: ?Sized> {
    config: MeasureConfig,
    state: SessionState,
    generation: u64,
    frozen: Option<Frozen>,
    cancel: Option<CancelToken>,
    measurement: Option<Measurement>,
    service: Arc<S>,
}

impl<S: ElevationService + ?Sized> CutVolumeSession<S> {
    /// Create an idle session.
    #[must_use]
    pub fn new(service: Arc<S>, config: MeasureConfig) -> Self {
        Self {
            config: config.normalized(),
            state: SessionState::Idle,
            generation: 0,
            frozen: None,
            cancel: None,
            measurement: None,
            service,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Current settings.
    #[must_use]
    pub fn config(&self) -> &MeasureConfig {
        &self.config
    }

    /// The generation of the most recent job.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The polygon being measured, if any.
    #[must_use]
    pub fn polygon(&self) -> Option<&Polygon> {
        self.frozen.as_ref().map(|f| &f.polygon)
    }

    /// The published measurement, if any.
    #[must_use]
    pub fn measurement(&self) -> Option<&Measurement> {
        self.measurement.as_ref()
    }

    /// Freeze a polygon and prepare its sampling job.
    ///
    /// Any outstanding job is superseded. On failure the session returns to
    /// idle and keeps the previously published measurement.
    pub fn submit(&mut self, positions: &[DVec3]) -> Result<SamplingJob<S>> {
        self.supersede();

        match Polygon::new(&self.config.ellipsoid, positions) {
            Ok(polygon) => self.start(polygon),
            Err(e) => {
                self.state = SessionState::Idle;
                Err(e)
            }
        }
    }

    /// Submit a polygon, sample it and apply the outcome.
    pub async fn measure(
        &mut self,
        positions: &[DVec3],
        on_progress: impl FnMut(f64),
    ) -> Result<Completion> {
        let job = self.submit(positions)?;
        let outcome = job.run(on_progress).await;
        self.complete(outcome)
    }

    /// Apply the outcome of a sampling job.
    ///
    /// Outcomes from superseded jobs are dropped. A cancelled job returns the
    /// session to idle without an error.
    ///
    /// # Errors
    ///
    /// Sampling and estimation errors are returned after the session has
    /// returned to idle.
    pub fn complete(&mut self, outcome: JobOutcome) -> Result<Completion> {
        let current = SessionState::Sampling {
            generation: outcome.generation,
        };
        if self.state != current {
            tracing::debug!(
                generation = outcome.generation,
                current = self.generation,
                "dropping superseded sampling outcome"
            );
            return Ok(Completion::Superseded);
        }

        self.cancel = None;
        self.state = SessionState::Idle;

        let points = match outcome.result {
            Ok(points) => points,
            Err(Error::Cancelled) => {
                tracing::debug!(generation = outcome.generation, "sampling cancelled");
                return Ok(Completion::Cancelled);
            }
            Err(e) => {
                tracing::warn!(generation = outcome.generation, error = %e, "sampling failed");
                return Err(e);
            }
        };

        let Some(frozen) = &self.frozen else {
            return Ok(Completion::Superseded);
        };

        let triangles = Triangle::from_flat(&points);
        let result = VolumeEstimator::new(self.config.ellipsoid).estimate(
            &frozen.polygon,
            &triangles,
            frozen.min_height,
        )?;

        let builder = MeshBuilder::from_config(&self.config);
        let fill = builder.build_fill_mesh(&triangles, result.min_height, result.max_height)?;
        let wireframe = builder.build_wireframe(&triangles)?;
        let label_position =
            result.label_position(&self.config.ellipsoid, self.config.label_height_offset);

        tracing::info!(
            generation = outcome.generation,
            volume = result.volume,
            label = %result,
            "published measurement"
        );

        self.measurement = Some(Measurement {
            result,
            fill,
            wireframe,
            triangles,
            label_position,
        });
        self.state = SessionState::Computed;
        Ok(Completion::Published)
    }

    /// Change the detail level.
    ///
    /// If a polygon is frozen, the current measurement is discarded and a new
    /// sampling job at the new granularity is returned. The polygon stays
    /// frozen if the job cannot be prepared, so the change can be retried.
    pub fn set_detail_level(&mut self, detail_level: u32) -> Result<Option<SamplingJob<S>>> {
        self.config.detail_level = MeasureConfig::clamp_detail_level(detail_level);

        let Some(polygon) = self.polygon().cloned() else {
            return Ok(None);
        };

        self.supersede();
        self.measurement = None;
        self.start(polygon).map(Some)
    }

    /// Change the display lift of both meshes. Geometry is not rebuilt.
    pub fn set_vertical_offset(&mut self, vertical_offset: f64) {
        self.config.vertical_offset = vertical_offset;

        if let Some(measurement) = &mut self.measurement {
            let ellipsoid = self.config.ellipsoid;
            measurement.fill.set_vertical_offset(&ellipsoid, vertical_offset);
            measurement
                .wireframe
                .set_vertical_offset(&ellipsoid, vertical_offset);
        }
    }

    /// Cancel the outstanding job, if any. Its outcome completes as cancelled.
    pub fn cancel(&mut self) {
        if let Some(token) = &self.cancel {
            token.cancel();
        }
    }

    /// Discard everything and return to idle. Safe to call repeatedly.
    pub fn cleanup(&mut self) {
        if self.frozen.is_some() || self.measurement.is_some() || self.cancel.is_some() {
            tracing::debug!(generation = self.generation, "cleaning up session");
        }

        self.supersede();
        self.frozen = None;
        self.measurement = None;
        self.state = SessionState::Idle;
    }

    /// Cancel the outstanding job and start a new generation.
    fn supersede(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        self.generation += 1;
    }

    /// Subdivide a polygon and prepare its sampling job.
    fn start(&mut self, polygon: Polygon) -> Result<SamplingJob<S>> {
        let prepared = self.prepare(&polygon);
        let (min_height, triangles) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                self.state = SessionState::Idle;
                return Err(e);
            }
        };

        let cancel = CancelToken::new();
        let job = SamplingJob {
            generation: self.generation,
            points: Triangle::flatten(&triangles),
            service: Arc::clone(&self.service),
            cancel: cancel.clone(),
            divisions: self.config.batch_divisions,
            ellipsoid: self.config.ellipsoid,
        };

        tracing::info!(
            generation = self.generation,
            corners = polygon.len(),
            triangles = triangles.len(),
            min_height,
            "starting measurement"
        );

        self.frozen = Some(Frozen {
            polygon,
            min_height,
        });
        self.cancel = Some(cancel);
        self.state = SessionState::Sampling {
            generation: self.generation,
        };
        Ok(job)
    }

    fn prepare(&self, polygon: &Polygon) -> Result<(f64, Vec<Triangle>)> {
        let min_height = floor_height(self.service.as_ref(), polygon)?;

        let max_level = polygon
            .cartographics()
            .map(|c| self.service.maximum_level_near(&c))
            .max()
            .unwrap_or(0);
        let granularity = granularity_for(max_level, self.config.detail_level);

        let triangles =
            PolygonSubdivider::new(self.config.ellipsoid).subdivide(polygon, granularity)?;
        Ok((min_height, triangles))
    }
}
