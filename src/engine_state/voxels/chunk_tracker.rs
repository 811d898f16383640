//! Per-column load state, as reported by the host world.

use std::collections::HashMap;

use cgmath::Point2;

pub const FLAG_HAS_BLOCK_DATA: u8 = 1 << 0;
pub const FLAG_HAS_LIGHT_DATA: u8 = 1 << 1;
pub const FLAG_ALL: u8 = FLAG_HAS_BLOCK_DATA | FLAG_HAS_LIGHT_DATA;

/// Tracks which columns have block and light data. Load and unload notifications are
/// only forwarded to the renderer when they change the tracked state.
#[derive(Default)]
pub struct ChunkTracker {
    columns: HashMap<Point2<i32>, u8>,
}

impl ChunkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the column as having block data. Returns `true` if it did not before.
    pub fn load_chunk(&mut self, x: i32, z: i32) -> bool {
        let flags = self.columns.entry(Point2::new(x, z)).or_insert(0);
        let changed = *flags & FLAG_HAS_BLOCK_DATA == 0;
        *flags |= FLAG_HAS_BLOCK_DATA;
        changed
    }

    /// Forgets the column. Returns `true` if it had block data, so columns that only
    /// ever received light data are dropped silently.
    pub fn unload_chunk(&mut self, x: i32, z: i32) -> bool {
        self.columns
            .remove(&Point2::new(x, z))
            .is_some_and(|flags| flags & FLAG_HAS_BLOCK_DATA != 0)
    }

    pub fn on_light_data_added(&mut self, x: i32, z: i32) {
        *self.columns.entry(Point2::new(x, z)).or_insert(0) |= FLAG_HAS_LIGHT_DATA;
    }

    pub fn get_flags(&self, x: i32, z: i32) -> u8 {
        self.columns.get(&Point2::new(x, z)).copied().unwrap_or(0)
    }

    /// Whether the column and all eight columns around it carry every flag in `flags`.
    pub fn has_merged_flags(&self, x: i32, z: i32, flags: u8) -> bool {
        (-1..=1).all(|dx| (-1..=1).all(|dz| self.get_flags(x + dx, z + dz) & flags == flags))
    }

    /// Loaded columns, in no particular order.
    pub fn columns(&self) -> impl Iterator<Item = Point2<i32>> + '_ {
        self.columns
            .iter()
            .filter(|(_, flags)| **flags & FLAG_HAS_BLOCK_DATA != 0)
            .map(|(position, _)| *position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_changes_are_reported_once() {
        let mut tracker = ChunkTracker::new();

        assert!(tracker.load_chunk(0, 0));
        assert!(!tracker.load_chunk(0, 0));
        assert!(tracker.unload_chunk(0, 0));
        assert!(!tracker.unload_chunk(0, 0));
    }

    #[test]
    fn light_only_columns_are_not_reported_as_unloaded() {
        let mut tracker = ChunkTracker::new();

        tracker.on_light_data_added(4, 4);
        assert!(!tracker.unload_chunk(4, 4));
        assert_eq!(tracker.get_flags(4, 4), 0);

        tracker.on_light_data_added(5, 5);
        assert!(tracker.load_chunk(5, 5));
        assert!(tracker.unload_chunk(5, 5));
    }

    #[test]
    fn merged_flags_need_all_neighbours() {
        let mut tracker = ChunkTracker::new();

        for x in -1..=1 {
            for z in -1..=1 {
                tracker.load_chunk(x, z);
            }
        }

        assert!(tracker.has_merged_flags(0, 0, FLAG_HAS_BLOCK_DATA));
        assert!(!tracker.has_merged_flags(0, 0, FLAG_ALL));
        assert!(!tracker.has_merged_flags(1, 0, FLAG_HAS_BLOCK_DATA));

        for x in -1..=1 {
            for z in -1..=1 {
                tracker.on_light_data_added(x, z);
            }
        }

        assert!(tracker.has_merged_flags(0, 0, FLAG_ALL));
    }
}
