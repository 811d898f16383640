//! # Buffer Arena
//!
//! A sub-allocator that packs many small geometry allocations into one large device
//! buffer. Every region owns one arena for its vertex data.
//!
//! ## Architecture
//!
//! The buffer is described by a doubly-linked list of segments ordered by offset. Each
//! segment is either free or used; together they tile `[0, capacity)` exactly. The list
//! nodes live in a generational [`thunderdome::Arena`], so a [`SegmentId`] keeps naming
//! the same allocation while the arena moves it around, and a stale id is detected
//! instead of silently aliasing a newer allocation.
//!
//! Allocation is best-fit: an exact match is taken as-is, otherwise the allocation is
//! split off the high end of the smallest free segment that fits. Freed segments are
//! merged with free neighbours on both sides.
//!
//! When an upload does not fit, the arena grows. Growing moves every used segment to the
//! end of a new, larger buffer (adjacent used segments are moved with a single copy),
//! leaving one free segment at the front large enough for the pending uploads.
//! [`BufferArena::compact`] does the opposite and packs used segments to the front
//! without growing, which removes the holes left behind by frees.
//!
//! ## Performance Considerations
//!
//! * Offsets and lengths are in elements of `stride` bytes
//! * Segment ids survive growth and compaction; cached offsets do not. Callers
//!   re-resolve them with [`BufferArena::segment`] after a resize, or patch them with the
//!   free segments returned by [`BufferArena::compact`]

use thunderdome::{Arena, Index};

use crate::core::StResource;

use super::{BufferHandle, BufferPool, DeviceHandle};

/// Stable name of an allocation inside one [`BufferArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SegmentId(Index);

/// A range of elements inside an arena's buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferSegment {
    pub id: SegmentId,
    /// Offset in elements from the start of the buffer
    pub offset: u32,
    /// Length in elements
    pub length: u32,
}

impl BufferSegment {
    pub fn end(&self) -> u32 {
        self.offset + self.length
    }
}

/// Geometry waiting to be copied into an arena. The byte length must be a non-zero
/// multiple of the arena's stride.
#[derive(Clone, Debug)]
pub struct PendingUpload {
    pub data: Vec<u8>,
}

impl PendingUpload {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

/// Result of [`BufferArena::upload`].
#[derive(Debug)]
pub struct UploadOutcome {
    /// One segment per upload, in the order the uploads were given
    pub segments: Vec<BufferSegment>,
    /// Whether the arena had to grow. If so, every previously handed out offset is
    /// stale and must be re-resolved.
    pub resized: bool,
}

#[derive(Debug)]
struct SegmentNode {
    offset: u32,
    length: u32,
    free: bool,
    prev: Option<Index>,
    next: Option<Index>,
}

impl SegmentNode {
    fn end(&self) -> u32 {
        self.offset + self.length
    }
}

pub struct BufferArena {
    device: DeviceHandle,
    pool: StResource<BufferPool>,
    buffer: BufferHandle,
    buffer_size: u64,
    nodes: Arena<SegmentNode>,
    head: Option<Index>,
    capacity: u32,
    used: u32,
    stride: u32,
    resize_increment: u32,
}

impl BufferArena {
    /// Creates an arena of `capacity` elements of `stride` bytes, taking its buffer
    /// from `pool`.
    ///
    /// # Panics
    /// Panics if `stride` is zero.
    pub fn new(
        device: DeviceHandle,
        pool: StResource<BufferPool>,
        capacity: u32,
        stride: u32,
    ) -> Self {
        assert!(stride > 0, "Arena stride must be non-zero");

        let (buffer, buffer_size) = pool
            .get_mut()
            .acquire("region arena", capacity as u64 * stride as u64);

        let mut nodes = Arena::new();
        let head = (capacity > 0).then(|| {
            nodes.insert(SegmentNode {
                offset: 0,
                length: capacity,
                free: true,
                prev: None,
                next: None,
            })
        });

        Self {
            device,
            pool,
            buffer,
            buffer_size,
            nodes,
            head,
            capacity,
            used: 0,
            stride,
            resize_increment: capacity / 16,
        }
    }

    /// Allocates `size` elements, or returns `None` if no free segment is large enough.
    ///
    /// # Panics
    /// Panics if `size` is zero.
    pub fn alloc(&mut self, size: u32) -> Option<BufferSegment> {
        assert!(size > 0, "Cannot allocate an empty segment");

        let index = self.find_free(size)?;
        let node = &mut self.nodes[index];

        let allocated = if node.length == size {
            node.free = false;
            index
        } else {
            node.length -= size;
            let offset = node.end();
            let next = node.next;

            let split = self.nodes.insert(SegmentNode {
                offset,
                length: size,
                free: false,
                prev: Some(index),
                next,
            });

            self.nodes[index].next = Some(split);
            if let Some(next) = next {
                self.nodes[next].prev = Some(split);
            }

            split
        };

        self.used += size;
        self.debug_check();

        Some(self.to_segment(allocated))
    }

    /// Frees a segment, merging it with any free neighbours.
    ///
    /// # Panics
    /// Panics if the segment was already freed.
    pub fn free(&mut self, segment: BufferSegment) {
        let index = segment.id.0;

        let node = match self.nodes.get_mut(index) {
            Some(node) if !node.free => node,
            _ => panic!("Already freed"),
        };

        node.free = true;
        self.used -= node.length;

        let (prev, next) = (node.prev, node.next);

        if next.is_some_and(|next| self.nodes[next].free) {
            self.merge_next(index);
        }

        if let Some(prev) = prev.filter(|&prev| self.nodes[prev].free) {
            self.merge_next(prev);
        }

        self.debug_check();
    }

    /// Copies every upload into the arena, growing it if they do not all fit.
    ///
    /// # Panics
    /// Panics if an upload is empty or not a multiple of the stride, and if some uploads
    /// still do not fit after growing.
    pub fn upload(&mut self, uploads: &[PendingUpload]) -> UploadOutcome {
        let total_bytes: u64 = uploads.iter().map(|u| u.data.len() as u64).sum();
        let staging = self
            .device
            .get_mut()
            .create_buffer("arena staging", total_bytes.max(self.stride as u64));

        let mut staged = Vec::with_capacity(uploads.len());
        let mut staging_offset = 0;

        for upload in uploads {
            let elements = self.to_elements(upload.data.len() as u64);
            assert!(
                elements > 0 && self.to_bytes(elements) == upload.data.len() as u64,
                "Upload of {} bytes is not a whole number of {}-byte elements",
                upload.data.len(),
                self.stride
            );

            self.device
                .get_mut()
                .write_buffer(staging, staging_offset, &upload.data);
            staged.push((staging_offset, elements));
            staging_offset += upload.data.len() as u64;
        }

        let mut segments: Vec<Option<BufferSegment>> = staged
            .iter()
            .map(|&(offset, elements)| self.try_upload(staging, offset, elements))
            .collect();

        let missing: u32 = staged
            .iter()
            .zip(&segments)
            .filter(|(_, segment)| segment.is_none())
            .map(|(&(_, elements), _)| elements)
            .sum();

        let resized = missing > 0;

        if resized {
            self.ensure_capacity(missing);

            for (slot, &(offset, elements)) in segments.iter_mut().zip(&staged) {
                if slot.is_none() {
                    *slot = self.try_upload(staging, offset, elements);
                }
            }
        }

        self.device.get_mut().delete_buffer(staging);

        let segments = segments
            .into_iter()
            .map(|segment| segment.map(|s| self.to_segment(s.id.0)))
            .collect::<Option<Vec<_>>>()
            .unwrap_or_else(|| panic!("Failed to upload all buffers"));

        UploadOutcome { segments, resized }
    }

    /// Grows the arena so that at least `elements` more elements can be allocated.
    pub fn ensure_capacity(&mut self, elements: u32) {
        let needed = elements as i64 - (self.capacity - self.used) as i64;
        let capacity = self.capacity as i64;
        let new_capacity =
            (capacity + self.resize_increment as i64).max(capacity + needed) as u32;

        self.resize(new_capacity);
    }

    /// Packs every used segment to the front of a fresh buffer, leaving a single free
    /// segment at the end.
    ///
    /// Returns the free segments that existed before compaction, sorted by offset. A
    /// used segment's new offset is its old offset minus the lengths of the removed
    /// segments that preceded it.
    pub fn compact(&mut self) -> Vec<BufferSegment> {
        let removed = self.repack(self.capacity, 0);

        log::debug!(
            "Compacted arena: removed {} free segments, {}/{} elements used",
            removed.len(),
            self.used,
            self.capacity
        );

        removed
    }

    /// Share of the buffer that is free but outside the largest free segment.
    ///
    /// Zero when all free space is contiguous, whether at the front, the back or in
    /// the middle of the buffer.
    pub fn fragmentation(&self) -> f32 {
        if self.capacity == 0 {
            return 0.0;
        }

        let largest = self
            .iter_nodes()
            .filter(|(_, node)| node.free)
            .map(|(_, node)| node.length)
            .max()
            .unwrap_or(0);

        (self.capacity - self.used - largest) as f32 / self.capacity as f32
    }

    /// Looks up the current placement of a live allocation.
    pub fn segment(&self, id: SegmentId) -> Option<BufferSegment> {
        self.nodes
            .get(id.0)
            .filter(|node| !node.free)
            .map(|_| self.to_segment(id.0))
    }

    /// All segments in offset order, together with whether each one is free.
    pub fn segments(&self) -> impl Iterator<Item = (BufferSegment, bool)> + '_ {
        self.iter_nodes()
            .map(|(index, node)| (self.to_segment(index), node.free))
    }

    /// Validates every structural invariant of the segment list.
    ///
    /// # Panics
    /// Panics describing the first violated invariant.
    pub fn check_assertions(&self) {
        let mut expected_offset = 0;
        let mut used = 0;
        let mut count = 0;
        let mut prev: Option<(Index, bool)> = None;

        for (index, node) in self.iter_nodes() {
            assert!(node.length > 0, "Segment at {} has zero length", node.offset);
            assert_eq!(
                node.offset, expected_offset,
                "Segment list has a gap or overlap"
            );
            assert_eq!(
                node.prev,
                prev.map(|(p, _)| p),
                "Segment back-link is inconsistent"
            );

            if let Some((_, prev_free)) = prev {
                assert!(
                    !(prev_free && node.free),
                    "Adjacent free segments at {} were not merged",
                    node.offset
                );
            }

            if !node.free {
                used += node.length;
            }

            expected_offset = node.end();
            prev = Some((index, node.free));
            count += 1;
        }

        assert_eq!(expected_offset, self.capacity, "Segments do not cover the arena");
        assert_eq!(used, self.used, "Used element count is out of sync");
        assert!(self.used <= self.capacity, "Arena is over-committed");
        assert_eq!(count, self.nodes.len(), "Orphaned segments in the arena");
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    pub fn device_used_memory(&self) -> u64 {
        self.to_bytes(self.used)
    }

    pub fn device_allocated_memory(&self) -> u64 {
        self.to_bytes(self.capacity)
    }

    pub fn to_bytes(&self, elements: u32) -> u64 {
        elements as u64 * self.stride as u64
    }

    pub fn to_elements(&self, bytes: u64) -> u32 {
        (bytes / self.stride as u64) as u32
    }

    /// Returns the arena's buffer to the pool.
    pub fn delete(self) {
        self.pool.get_mut().release(self.buffer, self.buffer_size);
    }

    fn try_upload(
        &mut self,
        staging: BufferHandle,
        staging_offset: u64,
        elements: u32,
    ) -> Option<BufferSegment> {
        let segment = self.alloc(elements)?;

        self.device.get_mut().copy_buffer(
            staging,
            staging_offset,
            self.buffer,
            self.to_bytes(segment.offset),
            self.to_bytes(segment.length),
        );

        Some(segment)
    }

    fn resize(&mut self, new_capacity: u32) {
        assert!(
            self.used <= new_capacity,
            "New capacity {} is smaller than the {} used elements",
            new_capacity,
            self.used
        );

        let old_capacity = self.capacity;
        self.repack(new_capacity, new_capacity - self.used);

        log::debug!(
            "Resized arena from {} to {} elements ({} used)",
            old_capacity,
            new_capacity,
            self.used
        );
    }

    /// Moves every used segment into a new buffer of `new_capacity` elements, laid out
    /// back to back starting at `used_start`. Free space becomes at most one segment
    /// before and one after the used run. Returns the free segments that were removed.
    fn repack(&mut self, new_capacity: u32, used_start: u32) -> Vec<BufferSegment> {
        let mut removed = Vec::new();
        let mut live = Vec::new();

        for (index, node) in self.iter_nodes() {
            if node.free {
                removed.push(self.to_segment(index));
            } else {
                live.push(index);
            }
        }

        // (source offset, destination offset, length) with adjacent used segments merged
        let mut copies: Vec<(u32, u32, u32)> = Vec::new();
        let mut destination = used_start;

        for &index in &live {
            let node = &self.nodes[index];

            match copies.last_mut() {
                Some((src, dst, len)) if *src + *len == node.offset && *dst + *len == destination => {
                    *len += node.length;
                }
                _ => copies.push((node.offset, destination, node.length)),
            }

            destination += node.length;
        }

        let (buffer, buffer_size) = self
            .pool
            .get_mut()
            .acquire("region arena", self.to_bytes(new_capacity));

        {
            let mut device = self.device.get_mut();
            for &(src, dst, len) in &copies {
                device.copy_buffer(
                    self.buffer,
                    self.to_bytes(src),
                    buffer,
                    self.to_bytes(dst),
                    self.to_bytes(len),
                );
            }
        }

        self.pool.get_mut().release(self.buffer, self.buffer_size);
        self.buffer = buffer;
        self.buffer_size = buffer_size;

        for segment in &removed {
            self.nodes.remove(segment.id.0);
        }

        let mut order = Vec::with_capacity(live.len() + 2);

        if used_start > 0 {
            order.push(self.nodes.insert(SegmentNode {
                offset: 0,
                length: used_start,
                free: true,
                prev: None,
                next: None,
            }));
        }

        let mut offset = used_start;
        for &index in &live {
            let node = &mut self.nodes[index];
            node.offset = offset;
            offset += node.length;
            order.push(index);
        }

        if offset < new_capacity {
            order.push(self.nodes.insert(SegmentNode {
                offset,
                length: new_capacity - offset,
                free: true,
                prev: None,
                next: None,
            }));
        }

        for (i, &index) in order.iter().enumerate() {
            let node = &mut self.nodes[index];
            node.prev = i.checked_sub(1).map(|p| order[p]);
            node.next = order.get(i + 1).copied();
        }

        self.head = order.first().copied();
        self.capacity = new_capacity;
        self.debug_check();

        removed
    }

    fn find_free(&self, size: u32) -> Option<Index> {
        let mut best: Option<(Index, u32)> = None;

        for (index, node) in self.iter_nodes() {
            if !node.free || node.length < size {
                continue;
            }

            if node.length == size {
                return Some(index);
            }

            if best.map_or(true, |(_, length)| node.length < length) {
                best = Some((index, node.length));
            }
        }

        best.map(|(index, _)| index)
    }

    /// Absorbs the segment after `index` into it.
    fn merge_next(&mut self, index: Index) {
        let Some(next) = self.nodes[index].next else {
            return;
        };

        let absorbed = self.nodes.remove(next).unwrap_or_else(|| {
            panic!("Segment list references a missing segment")
        });

        let node = &mut self.nodes[index];
        node.length += absorbed.length;
        node.next = absorbed.next;

        if let Some(after) = absorbed.next {
            self.nodes[after].prev = Some(index);
        }
    }

    fn iter_nodes(&self) -> impl Iterator<Item = (Index, &SegmentNode)> + '_ {
        let mut cursor = self.head;

        std::iter::from_fn(move || {
            let index = cursor?;
            let node = &self.nodes[index];
            cursor = node.next;
            Some((index, node))
        })
    }

    fn to_segment(&self, index: Index) -> BufferSegment {
        let node = &self.nodes[index];

        BufferSegment {
            id: SegmentId(index),
            offset: node.offset,
            length: node.length,
        }
    }

    fn debug_check(&self) {
        if cfg!(debug_assertions) {
            self.check_assertions();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::buffer_state::{share_device, GpuDevice, HeadlessDevice};

    const STRIDE: u32 = 4;

    fn arena(capacity: u32) -> (StResource<HeadlessDevice>, BufferArena) {
        let device = StResource::new(HeadlessDevice::new());
        let shared = share_device(&device);
        let pool = StResource::new(BufferPool::new(shared.clone()));

        (device, BufferArena::new(shared, pool, capacity, STRIDE))
    }

    fn tagged(tag: u8, elements: u32) -> PendingUpload {
        PendingUpload::new(vec![tag; (elements * STRIDE) as usize])
    }

    fn read(device: &StResource<HeadlessDevice>, arena: &BufferArena, segment: BufferSegment) -> Vec<u8> {
        device
            .get()
            .read_buffer(
                arena.buffer(),
                arena.to_bytes(segment.offset),
                arena.to_bytes(segment.length),
            )
            .unwrap_or_default()
    }

    #[test]
    fn freed_middle_segment_is_reused_without_growing() {
        let (_device, mut arena) = arena(1000);

        let _a = arena.alloc(100).unwrap();
        let b = arena.alloc(50).unwrap();
        let _c = arena.alloc(100).unwrap();

        arena.free(b);
        let d = arena.alloc(150).unwrap();

        assert_eq!(arena.capacity(), 1000);
        assert_eq!(arena.used(), 350);
        assert_eq!(d.length, 150);
        arena.check_assertions();
    }

    #[test]
    fn allocation_splits_from_the_high_end() {
        let (_device, mut arena) = arena(1000);

        let a = arena.alloc(100).unwrap();
        let b = arena.alloc(50).unwrap();

        assert_eq!((a.offset, a.length), (900, 100));
        assert_eq!((b.offset, b.length), (850, 50));
    }

    #[test]
    fn exact_fit_is_preferred() {
        let (_device, mut arena) = arena(1000);

        let _a = arena.alloc(100).unwrap();
        let b = arena.alloc(40).unwrap();
        let _c = arena.alloc(100).unwrap();
        arena.free(b);

        let d = arena.alloc(40).unwrap();
        assert_eq!(d.offset, b.offset);
        assert_eq!(arena.segments().count(), 4);
    }

    #[test]
    fn free_merges_both_neighbours() {
        let (_device, mut arena) = arena(300);

        let a = arena.alloc(100).unwrap();
        let b = arena.alloc(100).unwrap();
        let c = arena.alloc(100).unwrap();

        arena.free(a);
        arena.free(c);
        assert_eq!(arena.segments().count(), 3);

        arena.free(b);
        let segments: Vec<_> = arena.segments().collect();
        assert_eq!(segments.len(), 1);
        assert!(segments[0].1);
        assert_eq!(segments[0].0.length, 300);
        assert!(arena.is_empty());
    }

    #[test]
    #[should_panic(expected = "Already freed")]
    fn double_free_panics() {
        let (_device, mut arena) = arena(100);

        let a = arena.alloc(10).unwrap();
        arena.free(a);
        arena.free(a);
    }

    #[test]
    fn alloc_fails_when_nothing_fits() {
        let (_device, mut arena) = arena(100);

        assert!(arena.alloc(60).is_some());
        assert!(arena.alloc(60).is_none());
        assert_eq!(arena.used(), 60);
    }

    #[test]
    fn upload_grows_and_preserves_contents() {
        let (device, mut arena) = arena(64);

        let first = arena.upload(&[tagged(1, 20), tagged(2, 20), tagged(3, 20)]);
        assert!(!first.resized);

        let second = arena.upload(&[tagged(4, 30), tagged(5, 10)]);
        assert!(second.resized);
        assert!(arena.capacity() >= 100);
        arena.check_assertions();

        for (tag, segment) in (1u8..).zip(first.segments.iter().chain(&second.segments)) {
            let current = arena.segment(segment.id).unwrap();
            let bytes = read(&device, &arena, current);

            assert_eq!(bytes.len() as u64, arena.to_bytes(current.length));
            assert!(bytes.iter().all(|&b| b == tag), "segment {} lost its contents", tag);
        }
    }

    #[test]
    fn growth_merges_adjacent_copies() {
        let (device, mut arena) = arena(64);

        arena.upload(&[tagged(1, 16), tagged(2, 16), tagged(3, 16)]);
        let before = device.get().analytics().copy_count();

        arena.ensure_capacity(64);

        assert_eq!(device.get().analytics().copy_count() - before, 1);
        assert_eq!(arena.capacity(), 112);
    }

    #[test]
    fn growth_is_at_least_the_resize_increment() {
        let (_device, mut arena) = arena(160);

        arena.alloc(100).unwrap();
        arena.ensure_capacity(1);

        assert_eq!(arena.capacity(), 170);
    }

    #[test]
    fn compaction_packs_segments_and_reports_removed_gaps() {
        let (device, mut arena) = arena(100);

        let uploaded = arena.upload(&[tagged(1, 10), tagged(2, 10), tagged(3, 10), tagged(4, 10)]);
        let [a, b, c, d] = uploaded.segments[..] else {
            panic!("expected four segments");
        };

        arena.free(b);
        assert!(arena.fragmentation() > 0.0);

        let removed = arena.compact();
        assert!(removed.windows(2).all(|w| w[0].offset < w[1].offset));
        assert_eq!(arena.fragmentation(), 0.0);

        for (tag, old) in [(1u8, a), (3, c), (4, d)] {
            let shift: u32 = removed
                .iter()
                .filter(|gap| gap.offset < old.offset)
                .map(|gap| gap.length)
                .sum();
            let current = arena.segment(old.id).unwrap();

            assert_eq!(current.offset, old.offset - shift);
            assert!(read(&device, &arena, current).iter().all(|&b| b == tag));
        }

        assert_eq!(arena.segments().next().map(|(s, free)| (s.offset, free)), Some((0, false)));
    }

    #[test]
    fn random_operations_keep_invariants() {
        let (_device, mut arena) = arena(512);
        let mut rng = fastrand::Rng::with_seed(7);
        let mut live = Vec::new();

        for _ in 0..2000 {
            if live.is_empty() || rng.bool() {
                let size = rng.u32(1..48);
                match arena.alloc(size) {
                    Some(segment) => live.push(segment.id),
                    None => arena.ensure_capacity(size),
                }
            } else {
                let id = live.swap_remove(rng.usize(..live.len()));
                let segment = arena.segment(id).unwrap();
                arena.free(segment);
            }

            if rng.u8(..) < 8 {
                arena.compact();
            }

            arena.check_assertions();
            let sum: u32 = live.iter().filter_map(|id| arena.segment(*id)).map(|s| s.length).sum();
            assert_eq!(sum, arena.used());
        }
    }

    #[test]
    fn delete_returns_the_buffer_to_the_pool() {
        let device = StResource::new(HeadlessDevice::new());
        let shared = share_device(&device);
        let pool = StResource::new(BufferPool::new(shared.clone()));

        let arena = BufferArena::new(shared, pool.clone(), 32, STRIDE);
        arena.delete();

        assert_eq!(pool.get().reserved_buffers(), 1);
        assert_eq!(device.get().buffer_count(), 1);
    }
}
