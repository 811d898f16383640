//! # Core Module
//!
//! Shared-ownership primitives used throughout the terrain core.
//!
//! ## Key Components
//! - `MtResource`: Thread-safe reference-counted resource with read-write locking
//! - `StResource`: Single-threaded reference-counted resource with interior mutability
//!
//! Worker threads only ever see `MtResource` handles. Everything GPU-related lives
//! behind `StResource` and stays on the render thread.
//!
//! ## Usage
//! ```rust
//! use voxel_terrain::core::{MtResource, StResource};
//!
//! let counter = MtResource::new(0);
//! *counter.get_mut() += 1;
//! assert_eq!(*counter.get(), 1);
//!
//! let local = StResource::new(String::from("device"));
//! assert_eq!(local.get().as_str(), "device");
//! ```

pub mod mt_resource;
pub mod st_resource;

pub use mt_resource::MtResource;
pub use st_resource::StResource;
