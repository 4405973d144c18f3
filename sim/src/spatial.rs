//! Bounded-region index with change notifications.
//!
//! Occupants register an integer [`Extent`] on a [`Layer`] and get back a
//! [`RegionToken`]. Range queries only visit the sparse buckets an extent
//! covers, so lookups stay O(k) in the number of nearby entries rather than
//! O(n) over everything registered.
//!
//! Entries registered with a callback are *listeners*. A listener is invoked
//! once whenever an occupant on the same layer moves within, enters, or
//! leaves its extent, and whenever a change is reported on that layer through
//! [`RegionIndex::trigger`] or [`RegionIndex::trigger_all`]. Listener entries
//! moving around notify no one.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Integer rectangle in grid cells. Half-open on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Extent {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Extent {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// A single-cell extent.
    pub fn cell(x: i32, y: i32) -> Self {
        Self::new(x, y, 1, 1)
    }

    /// Square extent of `radius` cells around a centre cell.
    pub fn around(x: i32, y: i32, radius: i32) -> Self {
        let side = radius.saturating_mul(2).saturating_add(1);
        Self::new(x.saturating_sub(radius), y.saturating_sub(radius), side, side)
    }

    /// Bounding extent of a set of cells, `None` if the set is empty.
    pub fn bounding(cells: impl IntoIterator<Item = (i32, i32)>) -> Option<Self> {
        let mut iter = cells.into_iter();
        let (x0, y0) = iter.next()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (x0, y0, x0, y0);
        for (x, y) in iter {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        Some(Self::new(
            min_x,
            min_y,
            max_x.saturating_sub(min_x).saturating_add(1),
            max_y.saturating_sub(min_y).saturating_add(1),
        ))
    }

    /// Exclusive right edge, saturating at `i32::MAX`.
    #[inline]
    pub fn max_x(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge, saturating at `i32::MAX`.
    #[inline]
    pub fn max_y(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// True iff both axis intervals intersect with non-zero length.
    #[inline]
    pub fn overlaps(&self, other: &Extent) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.max_x()
            && other.x < self.max_x()
            && self.y < other.max_y()
            && other.y < self.max_y()
    }

    #[inline]
    pub fn contains_cell(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.max_x() && y >= self.y && y < self.max_y()
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{} {}x{}]", self.x, self.y, self.width, self.height)
    }
}

/// Partition an entry belongs to. Notifications never cross layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layer {
    /// Moving radbolts.
    Radbolts,
    /// Creatures and colonists that radbolts can hit.
    Living,
    /// Cells whose reachability changed.
    Reachability,
}

/// Opaque handle to one live index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionToken {
    slot: u32,
    generation: u32,
}

/// Description of one change delivered to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionChange {
    pub layer: Layer,
    /// Occupant that moved or left; `None` for reported changes.
    pub source: Option<Entity>,
    pub old: Option<Extent>,
    pub new: Option<Extent>,
}

/// Listener callback. Runs while the index is mutably borrowed, so it can
/// only record work to be done later.
pub type ChangeCallback = Box<dyn FnMut(&RegionChange) + Send + Sync>;

struct Entry {
    layer: Layer,
    extent: Extent,
    owner: Entity,
    callback: Option<ChangeCallback>,
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

/// Sparse bucketed index over integer extents.
#[derive(Resource)]
pub struct RegionIndex {
    /// Bucket side length in cells.
    bucket_size: i32,
    slots: Vec<Slot>,
    free: Vec<u32>,
    buckets: HashMap<(i32, i32), Vec<u32>>,
    live: usize,
    notifications_sent: u64,
}

impl fmt::Debug for RegionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionIndex")
            .field("bucket_size", &self.bucket_size)
            .field("live", &self.live)
            .field("buckets", &self.buckets.len())
            .field("notifications_sent", &self.notifications_sent)
            .finish()
    }
}

impl Default for RegionIndex {
    fn default() -> Self {
        Self::new(16)
    }
}

impl RegionIndex {
    /// Create an empty index with the given bucket side length in cells.
    pub fn new(bucket_size: i32) -> Self {
        Self {
            bucket_size: bucket_size.max(1),
            slots: Vec::new(),
            free: Vec::new(),
            buckets: HashMap::new(),
            live: 0,
            notifications_sent: 0,
        }
    }

    /// Register an entry and return its token.
    pub fn insert(
        &mut self,
        layer: Layer,
        extent: Extent,
        owner: Entity,
        callback: Option<ChangeCallback>,
    ) -> RegionToken {
        let entry = Entry { layer, extent, owner, callback };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot as usize].entry = Some(entry);
                slot
            }
            None => {
                self.slots.push(Slot { generation: 0, entry: Some(entry) });
                (self.slots.len() - 1) as u32
            }
        };
        self.bucket(slot, extent);
        self.live += 1;

        let token = RegionToken {
            slot,
            generation: self.slots[slot as usize].generation,
        };
        debug!(?layer, %extent, ?owner, ?token, "region entry inserted");
        token
    }

    /// Move an entry. Unchanged extents are a no-op and notify nobody.
    pub fn update(&mut self, token: RegionToken, extent: Extent) {
        let resolved = self.resolve(token);
        debug_assert!(resolved.is_some(), "stale region token {token:?}");
        let Some(slot) = resolved else { return };

        let Some(entry) = self.slots[slot as usize].entry.as_mut() else { return };
        let old = entry.extent;
        if old == extent {
            return;
        }
        entry.extent = extent;
        let layer = entry.layer;
        let owner = entry.owner;
        let is_listener = entry.callback.is_some();

        self.unbucket(slot, old);
        self.bucket(slot, extent);

        if !is_listener {
            let change = RegionChange {
                layer,
                source: Some(owner),
                old: Some(old),
                new: Some(extent),
            };
            self.notify(&change, &[old, extent], Some(slot));
        }
    }

    /// Release an entry. Its callback is dropped before anyone else is told.
    pub fn remove(&mut self, token: RegionToken) {
        let resolved = self.resolve(token);
        debug_assert!(resolved.is_some(), "stale region token {token:?}");
        let Some(slot) = resolved else { return };

        let Some(entry) = self.slots[slot as usize].entry.take() else { return };
        let s = &mut self.slots[slot as usize];
        s.generation = s.generation.wrapping_add(1);
        self.free.push(slot);
        self.live -= 1;
        self.unbucket(slot, entry.extent);
        debug!(layer = ?entry.layer, extent = %entry.extent, owner = ?entry.owner, "region entry removed");

        if entry.callback.is_none() {
            let change = RegionChange {
                layer: entry.layer,
                source: Some(entry.owner),
                old: Some(entry.extent),
                new: None,
            };
            self.notify(&change, &[entry.extent], None);
        }
    }

    /// Report an external change on `layer` covering `extent`.
    /// Returns the number of listeners invoked.
    pub fn trigger(&mut self, layer: Layer, extent: Extent) -> usize {
        self.trigger_all(layer, &[extent])
    }

    /// Report one external change spanning several areas. A listener
    /// overlapping more than one of them is still invoked once. The change
    /// carries the bounding extent of `areas`.
    pub fn trigger_all(&mut self, layer: Layer, areas: &[Extent]) -> usize {
        let areas: Vec<Extent> = areas.iter().copied().filter(|a| !a.is_empty()).collect();
        let Some(bounds) = Extent::bounding(
            areas
                .iter()
                .flat_map(|a| [(a.x, a.y), (a.max_x() - 1, a.max_y() - 1)]),
        ) else {
            return 0;
        };
        let change = RegionChange {
            layer,
            source: None,
            old: None,
            new: Some(bounds),
        };
        self.notify(&change, &areas, None)
    }

    /// Owners of all live entries overlapping the rectangle, any layer.
    pub fn query(&self, x: i32, y: i32, width: i32, height: i32) -> Vec<Entity> {
        self.collect(&Extent::new(x, y, width, height), None)
    }

    /// Owners of live entries on `layer` overlapping `extent`.
    pub fn query_layer(&self, layer: Layer, extent: Extent) -> Vec<Entity> {
        self.collect(&extent, Some(layer))
    }

    pub fn extent(&self, token: RegionToken) -> Option<Extent> {
        self.entry(token).map(|e| e.extent)
    }

    pub fn owner(&self, token: RegionToken) -> Option<Entity> {
        self.entry(token).map(|e| e.owner)
    }

    pub fn contains(&self, token: RegionToken) -> bool {
        self.resolve(token).is_some()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Total callback invocations since creation.
    pub fn notifications_sent(&self) -> u64 {
        self.notifications_sent
    }

    /// Number of non-empty buckets (for debugging).
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    // ------------------------------------------------------------------

    fn resolve(&self, token: RegionToken) -> Option<u32> {
        let slot = self.slots.get(token.slot as usize)?;
        (slot.generation == token.generation && slot.entry.is_some()).then_some(token.slot)
    }

    fn entry(&self, token: RegionToken) -> Option<&Entry> {
        let slot = self.resolve(token)?;
        self.slots[slot as usize].entry.as_ref()
    }

    /// Inclusive bucket range covered by an extent, `None` when empty.
    fn bucket_range(&self, extent: &Extent) -> Option<(i32, i32, i32, i32)> {
        if extent.is_empty() {
            return None;
        }
        let b = self.bucket_size;
        Some((
            extent.x.div_euclid(b),
            extent.y.div_euclid(b),
            (extent.max_x() - 1).div_euclid(b),
            (extent.max_y() - 1).div_euclid(b),
        ))
    }

    fn bucket(&mut self, slot: u32, extent: Extent) {
        let Some((bx0, by0, bx1, by1)) = self.bucket_range(&extent) else { return };
        for by in by0..=by1 {
            for bx in bx0..=bx1 {
                self.buckets.entry((bx, by)).or_default().push(slot);
            }
        }
    }

    fn unbucket(&mut self, slot: u32, extent: Extent) {
        let Some((bx0, by0, bx1, by1)) = self.bucket_range(&extent) else { return };
        for by in by0..=by1 {
            for bx in bx0..=bx1 {
                if let Some(slots) = self.buckets.get_mut(&(bx, by)) {
                    if let Some(pos) = slots.iter().position(|&s| s == slot) {
                        slots.swap_remove(pos);
                    }
                    if slots.is_empty() {
                        self.buckets.remove(&(bx, by));
                    }
                }
            }
        }
    }

    /// Append the slots stored in any bucket touched by `extent`. Entries
    /// spanning several buckets appear more than once; callers dedup.
    ///
    /// Ranges wider than the number of occupied buckets scan the bucket map
    /// instead, so a huge rectangle over a sparse index stays cheap.
    fn candidates(&self, extent: &Extent, out: &mut Vec<u32>) {
        let Some((bx0, by0, bx1, by1)) = self.bucket_range(extent) else { return };
        let span = (i64::from(bx1) - i64::from(bx0) + 1) * (i64::from(by1) - i64::from(by0) + 1);
        if span > self.buckets.len() as i64 {
            for (&(bx, by), slots) in &self.buckets {
                if (bx0..=bx1).contains(&bx) && (by0..=by1).contains(&by) {
                    out.extend_from_slice(slots);
                }
            }
            return;
        }
        for by in by0..=by1 {
            for bx in bx0..=bx1 {
                if let Some(slots) = self.buckets.get(&(bx, by)) {
                    out.extend_from_slice(slots);
                }
            }
        }
    }

    fn collect(&self, extent: &Extent, layer: Option<Layer>) -> Vec<Entity> {
        let mut slots = Vec::new();
        self.candidates(extent, &mut slots);
        slots.sort_unstable();
        slots.dedup();
        slots
            .into_iter()
            .filter_map(|slot| self.slots[slot as usize].entry.as_ref())
            .filter(|e| layer.map_or(true, |l| e.layer == l) && e.extent.overlaps(extent))
            .map(|e| e.owner)
            .collect()
    }

    /// Invoke every listener on the change's layer that overlaps any of
    /// `areas`, once each, skipping `exclude`.
    fn notify(&mut self, change: &RegionChange, areas: &[Extent], exclude: Option<u32>) -> usize {
        let mut slots = Vec::new();
        for area in areas {
            self.candidates(area, &mut slots);
        }
        slots.sort_unstable();
        slots.dedup();
        slots.retain(|&slot| {
            Some(slot) != exclude
                && self.slots[slot as usize].entry.as_ref().is_some_and(|e| {
                    e.layer == change.layer
                        && e.callback.is_some()
                        && areas.iter().any(|a| e.extent.overlaps(a))
                })
        });

        for &slot in &slots {
            if let Some(callback) = self.slots[slot as usize]
                .entry
                .as_mut()
                .and_then(|e| e.callback.as_mut())
            {
                callback(change);
            }
        }
        self.notifications_sent += slots.len() as u64;
        slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, ChangeCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        let callback: ChangeCallback = Box::new(move |_| {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        (count, callback)
    }

    #[test]
    fn test_insert_and_query() {
        let mut index = RegionIndex::new(4);
        let e1 = Entity::from_raw(1);
        let e2 = Entity::from_raw(2);

        index.insert(Layer::Radbolts, Extent::cell(1, 1), e1, None);
        index.insert(Layer::Living, Extent::new(10, 10, 3, 3), e2, None);

        assert_eq!(index.query(0, 0, 5, 5), vec![e1]);
        assert_eq!(index.query(11, 11, 1, 1), vec![e2]);
        assert_eq!(index.query(0, 0, 20, 20).len(), 2);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_query_empty_index() {
        let index = RegionIndex::default();
        assert!(index.query(-100, -100, 200, 200).is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn test_half_open_overlap() {
        let mut index = RegionIndex::new(8);
        let e = Entity::from_raw(7);
        index.insert(Layer::Living, Extent::new(0, 0, 2, 2), e, None);

        // Touching edges do not overlap
        assert!(index.query(2, 0, 1, 1).is_empty());
        assert!(index.query(0, 2, 2, 1).is_empty());
        // Zero-area queries never match
        assert!(index.query(0, 0, 0, 5).is_empty());
        assert_eq!(index.query(1, 1, 1, 1), vec![e]);
    }

    #[test]
    fn test_entry_spanning_buckets_reported_once() {
        let mut index = RegionIndex::new(2);
        let e = Entity::from_raw(3);
        index.insert(Layer::Living, Extent::new(-3, -3, 7, 7), e, None);
        assert_eq!(index.query(-10, -10, 20, 20), vec![e]);
    }

    #[test]
    fn test_update_moves_entry() {
        let mut index = RegionIndex::new(4);
        let e = Entity::from_raw(1);
        let token = index.insert(Layer::Radbolts, Extent::cell(0, 0), e, None);

        index.update(token, Extent::cell(9, 9));
        assert!(index.query(0, 0, 1, 1).is_empty());
        assert_eq!(index.query(9, 9, 1, 1), vec![e]);
        assert_eq!(index.extent(token), Some(Extent::cell(9, 9)));
    }

    #[test]
    fn test_remove_releases_token() {
        let mut index = RegionIndex::new(4);
        let e = Entity::from_raw(1);
        let token = index.insert(Layer::Radbolts, Extent::cell(0, 0), e, None);
        index.remove(token);

        assert!(!index.contains(token));
        assert!(index.query(0, 0, 1, 1).is_empty());
        assert_eq!(index.bucket_count(), 0);

        // Slot reuse issues a fresh generation
        let again = index.insert(Layer::Radbolts, Extent::cell(0, 0), e, None);
        assert_ne!(again, token);
        assert!(!index.contains(token));
    }

    #[test]
    #[should_panic(expected = "stale region token")]
    fn test_stale_token_panics_in_debug() {
        let mut index = RegionIndex::new(4);
        let token = index.insert(Layer::Radbolts, Extent::cell(0, 0), Entity::from_raw(1), None);
        index.remove(token);
        index.update(token, Extent::cell(1, 1));
    }

    #[test]
    fn test_same_extent_update_is_silent() {
        let mut index = RegionIndex::new(4);
        let (count, callback) = counter();
        index.insert(Layer::Living, Extent::new(0, 0, 4, 4), Entity::from_raw(1), Some(callback));
        let mover = index.insert(Layer::Living, Extent::cell(1, 1), Entity::from_raw(2), None);

        index.update(mover, Extent::cell(2, 2));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        index.update(mover, Extent::cell(2, 2));
        index.update(mover, Extent::cell(2, 2));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_notification_once_per_update_not_per_cell() {
        let mut index = RegionIndex::new(1);
        let (count, callback) = counter();
        index.insert(Layer::Living, Extent::new(0, 0, 10, 10), Entity::from_raw(1), Some(callback));
        let mover = index.insert(Layer::Living, Extent::new(0, 0, 3, 3), Entity::from_raw(2), None);

        index.update(mover, Extent::new(4, 4, 3, 3));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(index.notifications_sent(), 1);
    }

    #[test]
    fn test_notifications_respect_layer_and_overlap() {
        let mut index = RegionIndex::new(4);
        let (near, near_cb) = counter();
        let (far, far_cb) = counter();
        let (other_layer, other_cb) = counter();
        index.insert(Layer::Living, Extent::new(0, 0, 2, 2), Entity::from_raw(1), Some(near_cb));
        index.insert(Layer::Living, Extent::new(50, 50, 2, 2), Entity::from_raw(2), Some(far_cb));
        index.insert(Layer::Radbolts, Extent::new(0, 0, 2, 2), Entity::from_raw(3), Some(other_cb));

        let mover = index.insert(Layer::Living, Extent::cell(1, 1), Entity::from_raw(4), None);
        index.remove(mover);

        assert_eq!(near.load(Ordering::SeqCst), 1);
        assert_eq!(far.load(Ordering::SeqCst), 0);
        assert_eq!(other_layer.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_removed_listener_stops_receiving() {
        let mut index = RegionIndex::new(4);
        let (count, callback) = counter();
        let listener =
            index.insert(Layer::Reachability, Extent::new(0, 0, 4, 4), Entity::from_raw(1), Some(callback));

        assert_eq!(index.trigger(Layer::Reachability, Extent::cell(2, 2)), 1);
        index.remove(listener);
        assert_eq!(index.trigger(Layer::Reachability, Extent::cell(2, 2)), 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_trigger_all_invokes_each_listener_once() {
        let mut index = RegionIndex::new(2);
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        index.insert(
            Layer::Reachability,
            Extent::new(6, 3, 4, 4),
            Entity::from_raw(1),
            Some(Box::new(move |change: &RegionChange| {
                sink.lock().unwrap().push(*change);
            })),
        );
        let (other, other_cb) = counter();
        index.insert(Layer::Reachability, Extent::cell(0, 0), Entity::from_raw(2), Some(other_cb));

        // A whole block of changed cells, 16 of them under the first listener
        let cells: Vec<Extent> = (0..10)
            .flat_map(|y| (6..10).map(move |x| Extent::cell(x, y)))
            .collect();
        assert_eq!(index.trigger_all(Layer::Reachability, &cells), 1);
        assert_eq!(index.notifications_sent(), 1);
        assert_eq!(other.load(Ordering::SeqCst), 0);
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[RegionChange {
                layer: Layer::Reachability,
                source: None,
                old: None,
                new: Some(Extent::new(6, 0, 4, 10)),
            }]
        );

        assert_eq!(index.trigger_all(Layer::Reachability, &[]), 0);
    }

    #[test]
    fn test_trigger_with_multi_cell_area_counts_once() {
        let mut index = RegionIndex::new(1);
        let (count, callback) = counter();
        index.insert(Layer::Reachability, Extent::new(0, 0, 5, 5), Entity::from_raw(1), Some(callback));

        assert_eq!(index.trigger(Layer::Reachability, Extent::new(-2, -2, 10, 10)), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_huge_query_over_sparse_index() {
        let mut index = RegionIndex::new(1);
        let e = Entity::from_raw(1);
        index.insert(Layer::Living, Extent::cell(3, 4), e, None);

        assert_eq!(index.query(-200_000, -200_000, 400_000, 400_000), vec![e]);
        assert_eq!(index.query(i32::MIN, i32::MIN, i32::MAX, i32::MAX).len(), 0);
        assert_eq!(index.query(-1_000_000_000, -1_000_000_000, i32::MAX, i32::MAX), vec![e]);
        let (count, callback) = counter();
        index.insert(Layer::Reachability, Extent::cell(0, 0), Entity::from_raw(2), Some(callback));
        assert_eq!(index.trigger(Layer::Reachability, Extent::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX)), 0);
        assert_eq!(index.trigger(Layer::Reachability, Extent::new(-5, -5, i32::MAX, i32::MAX)), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_wide_extents_saturate_instead_of_overflowing() {
        let mut index = RegionIndex::new(4);
        let e = Entity::from_raw(1);
        index.insert(Layer::Living, Extent::cell(20, 0), e, None);

        assert_eq!(index.query(10, 0, i32::MAX, 1), vec![e]);
        assert_eq!(Extent::new(10, 0, i32::MAX, 1).max_x(), i32::MAX);
        assert!(Extent::new(i32::MAX - 1, 0, 5, 5).contains_cell(i32::MAX - 1, 2));
        assert_eq!(Extent::around(i32::MAX, 0, 2).max_x(), i32::MAX);
    }

    #[test]
    fn test_listener_movement_notifies_nobody() {
        let mut index = RegionIndex::new(4);
        let (count, callback) = counter();
        let (_, other_cb) = counter();
        index.insert(Layer::Reachability, Extent::new(0, 0, 4, 4), Entity::from_raw(1), Some(callback));
        let moving =
            index.insert(Layer::Reachability, Extent::cell(1, 1), Entity::from_raw(2), Some(other_cb));

        index.update(moving, Extent::cell(2, 2));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_change_payload() {
        let mut index = RegionIndex::new(4);
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        index.insert(
            Layer::Radbolts,
            Extent::new(0, 0, 8, 8),
            Entity::from_raw(1),
            Some(Box::new(move |change: &RegionChange| {
                sink.lock().unwrap().push(*change);
            })),
        );
        let source = Entity::from_raw(2);
        let token = index.insert(Layer::Radbolts, Extent::cell(0, 0), source, None);
        index.update(token, Extent::cell(1, 0));

        let seen = seen.lock().unwrap();
        assert_eq!(
            seen.as_slice(),
            &[RegionChange {
                layer: Layer::Radbolts,
                source: Some(source),
                old: Some(Extent::cell(0, 0)),
                new: Some(Extent::cell(1, 0)),
            }]
        );
    }

    #[test]
    fn test_extent_bounding() {
        let ext = Extent::bounding([(2, 3), (-1, 5), (0, 0)]).unwrap();
        assert_eq!(ext, Extent::new(-1, 0, 4, 6));
        assert!(Extent::bounding(std::iter::empty()).is_none());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Insert(Extent),
        Update(usize, Extent),
        Remove(usize),
    }

    fn extent_strategy() -> impl Strategy<Value = Extent> {
        (-20i32..20, -20i32..20, 0i32..6, 0i32..6).prop_map(|(x, y, w, h)| Extent::new(x, y, w, h))
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            extent_strategy().prop_map(Op::Insert),
            (any::<usize>(), extent_strategy()).prop_map(|(i, e)| Op::Update(i, e)),
            any::<usize>().prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn prop_query_matches_brute_force(
            ops in prop::collection::vec(op_strategy(), 0..60),
            queries in prop::collection::vec(extent_strategy(), 1..8),
            bucket in 1i32..9,
        ) {
            let mut index = RegionIndex::new(bucket);
            let mut model: Vec<(RegionToken, Extent, Entity)> = Vec::new();
            let mut next = 0u32;

            for op in ops {
                match op {
                    Op::Insert(extent) => {
                        let owner = Entity::from_raw(next);
                        next += 1;
                        let token = index.insert(Layer::Living, extent, owner, None);
                        model.push((token, extent, owner));
                    }
                    Op::Update(i, extent) if !model.is_empty() => {
                        let i = i % model.len();
                        index.update(model[i].0, extent);
                        model[i].1 = extent;
                    }
                    Op::Remove(i) if !model.is_empty() => {
                        let i = i % model.len();
                        let (token, _, _) = model.swap_remove(i);
                        index.remove(token);
                    }
                    _ => {}
                }
            }

            prop_assert_eq!(index.len(), model.len());
            for q in queries {
                let mut got: Vec<u32> =
                    index.query(q.x, q.y, q.width, q.height).iter().map(|e| e.index()).collect();
                let mut want: Vec<u32> = model
                    .iter()
                    .filter(|(_, extent, _)| extent.overlaps(&q))
                    .map(|(_, _, owner)| owner.index())
                    .collect();
                got.sort_unstable();
                want.sort_unstable();
                prop_assert_eq!(got, want);
            }
        }
    }
}
