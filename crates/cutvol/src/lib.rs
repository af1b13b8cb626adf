//! Terrain cut-volume measurement.
//!
//! Given a closed polygon on the globe, this crate estimates the volume of
//! terrain standing above the polygon's lowest corner, and builds a
//! height-coloured prism mesh plus a wireframe for display.
//!
//! # Pipeline
//!
//! 1. [`PolygonSubdivider`] triangulates the polygon at height zero and
//!    refines it to a granularity derived from the terrain resolution.
//! 2. [`ElevationSampler`] resolves terrain heights for every mesh vertex in
//!    sequential batches through an [`ElevationService`].
//! 3. [`VolumeEstimator`] sums footprint area times mean height above the
//!    floor for every triangle.
//! 4. [`MeshBuilder`] produces the fill mesh and wireframe buffers.
//!
//! [`CutVolumeSession`] drives the whole cycle and handles re-measurement,
//! supersession and cleanup.
//!
//! # Design principles
//!
//! - **Runtime-agnostic**: the only asynchronous step returns boxed `Send`
//!   futures and works with any executor
//! - **Injected collaborators**: terrain access and the reference ellipsoid
//!   are passed in, never looked up globally
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cutvol::{CutVolumeSession, MeasureConfig, SyntheticTerrain};
//!
//! let terrain = Arc::new(SyntheticTerrain::flat(120.0));
//! let mut session = CutVolumeSession::new(terrain, MeasureConfig::default());
//!
//! session.measure(&corners, |p| println!("{:.0}%", p * 100.0)).await?;
//! println!("{}", session.measurement().unwrap().label_text());
//! ```

pub mod cache;
#[cfg(not(target_family = "wasm"))]
pub mod client;
pub mod config;
pub mod ellipsoid;
mod error;
pub mod mesh;
pub mod polygon;
pub mod sampler;
pub mod service;
pub mod session;
pub mod subdivide;
pub mod types;
pub mod volume;

pub use cache::HeightCache;
#[cfg(not(target_family = "wasm"))]
pub use client::{OpenElevationClient, RequestError};
pub use config::{FillPalette, MeasureConfig};
pub use ellipsoid::{Cartographic, Ellipsoid, SurfacePoint};
pub use error::{Error, Result, ServiceError};
pub use mesh::MeshBuilder;
pub use polygon::Polygon;
pub use sampler::{CancelToken, ElevationSampler};
pub use service::{ElevationService, HeightsFuture, SyntheticTerrain};
pub use session::{Completion, CutVolumeSession, JobOutcome, Measurement, SamplingJob, SessionState};
pub use subdivide::{PolygonSubdivider, granularity_for};
pub use types::{BoundingSphere, MeshBuffers, Topology, Triangle, VolumeResult};
pub use volume::VolumeEstimator;
