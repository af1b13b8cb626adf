//! The elevation service interface.
//!
//! The measurement core never talks to terrain data directly. Everything it
//! needs goes through [`ElevationService`]:
//!
//! - [`query_heights`](ElevationService::query_heights): accurate heights for
//!   a batch of points (asynchronous, possibly remote)
//! - [`maximum_level_near`](ElevationService::maximum_level_near): the finest
//!   terrain level available at a point
//! - [`height_at`](ElevationService::height_at): a cheap synchronous estimate
//!   from data that is already at hand

use std::{
    future::Future,
    pin::Pin,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::ellipsoid::Cartographic;
use crate::error::ServiceError;

/// Future type for height queries.
pub type HeightsFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<f64>, ServiceError>> + Send + 'a>>;

/// A source of terrain heights.
pub trait ElevationService: Send + Sync {
    /// Resolve terrain-accurate heights for `points`.
    ///
    /// Must return exactly one height per point, in input order.
    fn query_heights<'a>(&'a self, points: &'a [Cartographic]) -> HeightsFuture<'a>;

    /// The finest terrain tile level available near `point`.
    fn maximum_level_near(&self, point: &Cartographic) -> u32;

    /// A cheap height estimate at `point`, if one is available.
    fn height_at(&self, point: &Cartographic) -> Option<f64>;
}

type HeightField = dyn Fn(&Cartographic) -> f64 + Send + Sync;

/// An analytic terrain defined by a height function.
///
/// Useful for tests and offline demonstrations. Every call to
/// [`query_heights`](ElevationService::query_heights) is counted.
pub struct SyntheticTerrain {
    field: Box<HeightField>,
    max_level: u32,
    requests: AtomicUsize,
}

impl SyntheticTerrain {
    /// Default terrain level reported by synthetic terrain.
    pub const DEFAULT_MAX_LEVEL: u32 = 12;

    /// Create terrain from a height function.
    #[must_use]
    pub fn new(field: impl Fn(&Cartographic) -> f64 + Send + Sync + 'static) -> Self {
        Self {
            field: Box::new(field),
            max_level: Self::DEFAULT_MAX_LEVEL,
            requests: AtomicUsize::new(0),
        }
    }

    /// Create terrain at a constant height.
    #[must_use]
    pub fn flat(height: f64) -> Self {
        Self::new(move |_| height)
    }

    /// Set the terrain level reported by [`maximum_level_near`](ElevationService::maximum_level_near).
    #[must_use]
    pub fn with_max_level(mut self, max_level: u32) -> Self {
        self.max_level = max_level;
        self
    }

    /// Number of height queries issued so far.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Evaluate the height function.
    #[must_use]
    pub fn height(&self, point: &Cartographic) -> f64 {
        (self.field)(point)
    }
}

impl std::fmt::Debug for SyntheticTerrain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntheticTerrain")
            .field("max_level", &self.max_level)
            .field("requests", &self.request_count())
            .finish_non_exhaustive()
    }
}

impl ElevationService for SyntheticTerrain {
    fn query_heights<'a>(&'a self, points: &'a [Cartographic]) -> HeightsFuture<'a> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let heights = points.iter().map(|p| self.height(p)).collect();
        Box::pin(async move { Ok(heights) })
    }

    fn maximum_level_near(&self, _point: &Cartographic) -> u32 {
        self.max_level
    }

    fn height_at(&self, point: &Cartographic) -> Option<f64> {
        Some(self.height(point))
    }
}
