//! # Voxel Data
//!
//! Everything the terrain core knows about blocks and the world they live in.
//!
//! ## Architecture
//!
//! * **Block**: block types, their render properties and the six block sides
//! * **Chunk**: 16x16x16 sections of blocks and their procedural generation
//! * **World**: the `WorldView` trait the core reads through, and `VoxelWorld`
//! * **WorldSlice**: immutable 3x3x3 snapshots handed to build tasks
//! * **ChunkTracker**: which columns the host world has reported as loaded
//!
//! ## Thread Safety
//!
//! * Sections are immutable once shared; edits copy on write
//! * The world is shared with worker threads as `MtResource<dyn WorldView>`, but build
//!   tasks only ever read the snapshot taken for them on the main thread

pub mod block;
pub mod chunk;
pub mod chunk_tracker;
pub mod world;
pub mod world_slice;

pub use chunk_tracker::ChunkTracker;
pub use world::{share_world, VoxelWorld, WorldView};
pub use world_slice::WorldSlice;
