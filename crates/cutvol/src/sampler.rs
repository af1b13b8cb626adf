//! Batched terrain height sampling.
//!
//! Points are split into a fixed number of roughly equal batches that are
//! resolved strictly one after another, so a sampling pass never has more
//! than one request outstanding. Progress is reported after each batch and
//! cancellation is checked before each one.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::ellipsoid::{Cartographic, Ellipsoid, SurfacePoint};
use crate::error::{Error, Result};
use crate::service::ElevationService;

/// Default number of batches a sampling pass is divided into.
pub const DEFAULT_DIVISIONS: usize = 100;

/// A cooperative cancellation flag shared between a job and its owner.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Resolves terrain heights for a point list through an [`ElevationService`].
#[derive(Debug)]
pub struct ElevationSampler<'a, S: ?Sized> {
    service: &'a S,
    ellipsoid: Ellipsoid,
    divisions: usize,
}

impl<'a, S: ElevationService + ?Sized> ElevationSampler<'a, S> {
    /// Create a sampler using [`DEFAULT_DIVISIONS`] batches.
    #[must_use]
    pub fn new(service: &'a S, ellipsoid: Ellipsoid) -> Self {
        Self {
            service,
            ellipsoid,
            divisions: DEFAULT_DIVISIONS,
        }
    }

    /// Set the number of batches (at least one).
    #[must_use]
    pub fn with_divisions(mut self, divisions: usize) -> Self {
        self.divisions = divisions.max(1);
        self
    }

    /// Replace each point's height with the terrain height at its footprint.
    ///
    /// The output has the same length and order as `points`. `on_progress`
    /// receives non-decreasing values and, on success only, a final `1.0`.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if `cancel` is set before any batch or before
    ///   completion; partial results are discarded.
    /// - [`Error::ElevationQueryFailed`] if the service fails or returns the
    ///   wrong number of heights or a non-finite height.
    pub async fn sample(
        &self,
        points: &[SurfacePoint],
        mut on_progress: impl FnMut(f64),
        cancel: &CancelToken,
    ) -> Result<Vec<SurfacePoint>> {
        let batch_size = points.len().div_ceil(self.divisions).max(1);
        let batch_count = points.len().div_ceil(batch_size);

        tracing::info!(
            points = points.len(),
            batches = batch_count,
            batch_size,
            "sampling terrain heights"
        );

        let mut resolved = Vec::with_capacity(points.len());
        let mut footprints: Vec<Cartographic> = Vec::with_capacity(batch_size);

        for (index, batch) in points.chunks(batch_size).enumerate() {
            if cancel.is_cancelled() {
                tracing::debug!(batch = index, "sampling cancelled");
                return Err(Error::Cancelled);
            }

            footprints.clear();
            footprints.extend(batch.iter().map(SurfacePoint::cartographic));

            let heights = self
                .service
                .query_heights(&footprints)
                .await
                .map_err(|e| Error::elevation(Some(index), e))?;

            if heights.len() != batch.len() {
                return Err(Error::elevation(
                    Some(index),
                    format!("expected {} heights, got {}", batch.len(), heights.len()),
                ));
            }

            for (point, height) in batch.iter().zip(heights) {
                if !height.is_finite() {
                    return Err(Error::elevation(
                        Some(index),
                        format!("non-finite height {height}"),
                    ));
                }
                resolved.push(point.with_height(&self.ellipsoid, height));
            }

            tracing::debug!(batch = index, size = batch.len(), "resolved batch");

            let completed = index + 1;
            if completed < batch_count {
                #[allow(clippy::cast_precision_loss)]
                on_progress(completed as f64 / self.divisions as f64);
            }
        }

        if cancel.is_cancelled() {
            tracing::debug!("sampling cancelled before completion");
            return Err(Error::Cancelled);
        }

        on_progress(1.0);
        Ok(resolved)
    }
}
