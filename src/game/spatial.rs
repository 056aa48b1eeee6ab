//! Spatial hash grid for broad-phase queries
//!
//! The world bounds are divided into a fixed `cols x rows` array of cells.
//! Each cell heads an index-linked list of occupancy nodes; an entity owns
//! one node per cell its box covers, so insert, move and remove cost
//! O(cells spanned) instead of a rebuild.
//!
//! The grid also owns every entity and drives the per-tick step sweep.
//! While an entity's hook runs it is checked out of its slot, which lets
//! the hook borrow the grid mutably. Checked-out entities are invisible to
//! [`SpatialHash::get`] and [`SpatialHash::select`].

use hashbrown::HashMap;
use smallvec::SmallVec;
use std::cell::Cell;
use std::collections::BTreeMap;
use tracing::{debug, trace};

use crate::game::collision::{bodies_overlap, rect_rect, Rect};
use crate::game::entity::{Body, CollisionEvent, CollisionType, Entity, EntityId, EntityKind};
use crate::util::math::saturate;
use crate::util::vec2::Vec2;

/// Cell coordinates `(column, row)`
pub type CellCoord = (usize, usize);

/// Errors from grid construction and bookkeeping
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpatialError {
    #[error("Grid bounds must have positive area, got {width}x{height}")]
    DegenerateBounds { width: f64, height: f64 },
    #[error("Grid needs at least one cell per axis, got {0}x{1}")]
    NoCells(usize, usize),
    #[error("Entity {0} is already tracked by this grid")]
    AlreadyTracked(EntityId),
    #[error("Entity {0} is not tracked by this grid")]
    UnknownEntity(EntityId),
    #[error("Entity {0} is already being removed")]
    AlreadyRemoved(EntityId),
    #[error("Entity {0} is checked out by a running hook")]
    CheckedOut(EntityId),
}

/// Inclusive rectangle of cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub min: CellCoord,
    pub max: CellCoord,
}

impl CellRange {
    pub fn contains(&self, (x, y): CellCoord) -> bool {
        x >= self.min.0 && x <= self.max.0 && y >= self.min.1 && y <= self.max.1
    }

    pub fn len(&self) -> usize {
        (self.max.0 - self.min.0 + 1) * (self.max.1 - self.min.1 + 1)
    }

    /// Always false: a range covers at least the one clamped cell
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Row-major iteration over every covered cell
    pub fn cells(&self) -> impl Iterator<Item = CellCoord> {
        let (min, max) = (self.min, self.max);
        (min.1..=max.1).flat_map(move |y| (min.0..=max.0).map(move |x| (x, y)))
    }
}

/// Handle to an occupancy node in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

#[derive(Debug, Clone)]
struct Node {
    entity: EntityId,
    cell: usize,
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

/// Cells an entity currently occupies, with its node in each
#[derive(Debug, Clone)]
pub struct Occupancy {
    range: CellRange,
    nodes: SmallVec<[NodeId; 4]>,
}

impl Occupancy {
    pub fn range(&self) -> CellRange {
        self.range
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }
}

struct Slot {
    /// `None` while a hook holds the entity
    entity: Option<Box<dyn Entity>>,
    occupancy: Occupancy,
    step_key: Option<u64>,
    query_stamp: Cell<u64>,
    pending_removal: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Unsorted,
    /// Ascending center distance from the selector origin
    Nearest,
}

/// Filter for [`SpatialHash::select`]
#[derive(Debug, Clone, Default)]
pub struct Selector {
    pub kind: Option<EntityKind>,
    pub origin: Option<Vec2>,
    /// Size of a box centered on `origin`; entities must overlap it
    pub bounds: Option<Vec2>,
    pub sort: SortOrder,
    pub limit: Option<usize>,
}

impl Selector {
    pub fn of_kind(kind: EntityKind) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }

    pub fn around(mut self, origin: Vec2, bounds: Vec2) -> Self {
        self.origin = Some(origin);
        self.bounds = Some(bounds);
        self
    }

    pub fn nearest(mut self) -> Self {
        self.sort = SortOrder::Nearest;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Statistics about the grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridStats {
    pub entities: usize,
    pub stepping: usize,
    pub occupied_cells: usize,
    pub max_per_cell: usize,
    pub nodes: usize,
}

/// Uniform grid over fixed world bounds
pub struct SpatialHash {
    bounds: Rect,
    dimensions: (usize, usize),
    /// Head node of each cell list, row-major
    cells: Vec<Option<NodeId>>,
    nodes: Vec<Node>,
    free_nodes: Vec<NodeId>,
    slots: HashMap<EntityId, Slot>,
    step_table: BTreeMap<u64, EntityId>,
    next_step_key: u64,
    query_id: Cell<u64>,
    /// Largest dimensions seen, used to widen the collision broad phase
    max_extent: Vec2,
}

impl SpatialHash {
    /// Create a grid over `bounds` with `dimensions` cells per axis
    pub fn new(bounds: Rect, dimensions: (usize, usize)) -> Result<Self, SpatialError> {
        if !(bounds.width() > 0.0 && bounds.height() > 0.0) {
            return Err(SpatialError::DegenerateBounds {
                width: bounds.width(),
                height: bounds.height(),
            });
        }
        if dimensions.0 == 0 || dimensions.1 == 0 {
            return Err(SpatialError::NoCells(dimensions.0, dimensions.1));
        }

        Ok(Self {
            bounds,
            dimensions,
            cells: vec![None; dimensions.0 * dimensions.1],
            nodes: Vec::with_capacity(crate::game::constants::grid::NODE_ARENA_CAPACITY),
            free_nodes: Vec::new(),
            slots: HashMap::new(),
            step_table: BTreeMap::new(),
            next_step_key: 0,
            query_id: Cell::new(0),
            max_extent: Vec2::ZERO,
        })
    }

    /// Create a grid from a top-left origin and a world size
    pub fn from_origin_size(
        origin: Vec2,
        size: Vec2,
        dimensions: (usize, usize),
    ) -> Result<Self, SpatialError> {
        Self::new(Rect::from_origin_size(origin, size), dimensions)
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn dimensions(&self) -> (usize, usize) {
        self.dimensions
    }

    /// Number of tracked entities, including checked-out ones
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.slots.contains_key(&id)
    }

    /// Map a world point to its cell.
    ///
    /// The position is normalized within the bounds and saturated, so points
    /// off the map land in a boundary cell.
    pub fn cell_index(&self, point: Vec2) -> CellCoord {
        let size = self.bounds.size();
        let nx = saturate((point.x - self.bounds.min.x) / size.x);
        let ny = saturate((point.y - self.bounds.min.y) / size.y);
        (
            (nx * (self.dimensions.0 - 1) as f64).floor() as usize,
            (ny * (self.dimensions.1 - 1) as f64).floor() as usize,
        )
    }

    /// Cells covered by a box of `size` sampled at half-extents around
    /// `position`
    pub fn cell_range(&self, position: Vec2, size: Vec2) -> CellRange {
        let half = size / 2.0;
        CellRange {
            min: self.cell_index(position - half),
            max: self.cell_index(position + half),
        }
    }

    #[inline]
    fn cell_offset(&self, (x, y): CellCoord) -> usize {
        y * self.dimensions.0 + x
    }

    fn link(&mut self, cell: usize, entity: EntityId) -> NodeId {
        let head = self.cells[cell];
        let node = Node {
            entity,
            cell,
            prev: None,
            next: head,
        };

        let id = match self.free_nodes.pop() {
            Some(id) => {
                self.nodes[id.0 as usize] = node;
                id
            }
            None => {
                self.nodes.push(node);
                NodeId((self.nodes.len() - 1) as u32)
            }
        };

        if let Some(head) = head {
            self.nodes[head.0 as usize].prev = Some(id);
        }
        self.cells[cell] = Some(id);
        id
    }

    fn unlink(&mut self, id: NodeId) {
        let Node { cell, prev, next, .. } = self.nodes[id.0 as usize];

        match prev {
            Some(prev) => self.nodes[prev.0 as usize].next = next,
            None => self.cells[cell] = next,
        }
        if let Some(next) = next {
            self.nodes[next.0 as usize].prev = prev;
        }

        let node = &mut self.nodes[id.0 as usize];
        node.prev = None;
        node.next = None;
        self.free_nodes.push(id);
    }

    fn link_range(&mut self, entity: EntityId, range: CellRange) -> SmallVec<[NodeId; 4]> {
        let mut nodes = SmallVec::with_capacity(range.len());
        for coord in range.cells() {
            let cell = self.cell_offset(coord);
            nodes.push(self.link(cell, entity));
        }
        nodes
    }

    /// Relink `id` if `range` differs from its stored range.
    /// Returns true when the occupancy changed.
    fn reindex(&mut self, id: EntityId, range: CellRange) -> bool {
        let old_nodes = match self.slots.get_mut(&id) {
            Some(slot) if slot.occupancy.range != range => std::mem::take(&mut slot.occupancy.nodes),
            _ => return false,
        };

        for node in old_nodes {
            self.unlink(node);
        }
        let nodes = self.link_range(id, range);
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.occupancy = Occupancy { range, nodes };
        }
        true
    }

    fn track_extent(&mut self, body: &Body) {
        self.max_extent = self.max_extent.max(body.dimensions);
    }

    /// Take ownership of an entity and index it
    pub fn insert(&mut self, mut entity: Box<dyn Entity>) -> Result<EntityId, SpatialError> {
        let id = entity.id();
        if self.slots.contains_key(&id) {
            return Err(SpatialError::AlreadyTracked(id));
        }

        let range = self.cell_range(entity.body().position, entity.body().dimensions);
        self.track_extent(entity.body());
        let nodes = self.link_range(id, range);

        let step_key = if entity.as_steppable().is_some() {
            let key = self.next_step_key;
            self.next_step_key += 1;
            self.step_table.insert(key, id);
            Some(key)
        } else {
            None
        };

        debug!("Inserted {:?} {} into {} cells", entity.kind(), id, nodes.len());

        self.slots.insert(
            id,
            Slot {
                entity: Some(entity),
                occupancy: Occupancy { range, nodes },
                step_key,
                query_stamp: Cell::new(0),
                pending_removal: false,
            },
        );
        Ok(id)
    }

    /// Re-sync an entity's cells with its current position and size.
    ///
    /// Returns `Ok(false)` when the covered range is unchanged; the existing
    /// nodes are kept as they are.
    pub fn update_client(&mut self, id: EntityId) -> Result<bool, SpatialError> {
        let slot = self.slots.get(&id).ok_or(SpatialError::UnknownEntity(id))?;
        let entity = slot.entity.as_ref().ok_or(SpatialError::CheckedOut(id))?;
        let body = entity.body().clone();

        self.track_extent(&body);
        let range = self.cell_range(body.position, body.dimensions);
        Ok(self.reindex(id, range))
    }

    /// Remove an entity, running its removal hook before it is unlinked.
    ///
    /// If the entity is checked out (its own hook is running, or it removed
    /// itself during `step`), it is dropped from the step table now and
    /// finishes removal as soon as the hook returns.
    pub fn remove(&mut self, id: EntityId) -> Result<(), SpatialError> {
        let slot = self.slots.get_mut(&id).ok_or(SpatialError::UnknownEntity(id))?;
        if slot.pending_removal {
            return Err(SpatialError::AlreadyRemoved(id));
        }
        slot.pending_removal = true;
        if let Some(key) = slot.step_key.take() {
            self.step_table.remove(&key);
        }

        match slot.entity.take() {
            Some(entity) => self.finish_removal(id, entity),
            None => trace!("Deferred removal of checked-out entity {}", id),
        }
        Ok(())
    }

    fn finish_removal(&mut self, id: EntityId, mut entity: Box<dyn Entity>) {
        if let Some(hook) = entity.as_removable() {
            hook.on_remove(self);
        }

        if let Some(slot) = self.slots.remove(&id) {
            if let Some(key) = slot.step_key {
                self.step_table.remove(&key);
            }
            for node in slot.occupancy.nodes {
                self.unlink(node);
            }
        }
        debug!("Removed {:?} {}", entity.kind(), id);
    }

    fn check_out(&mut self, id: EntityId) -> Option<Box<dyn Entity>> {
        self.slots.get_mut(&id).and_then(|slot| slot.entity.take())
    }

    /// Return a checked-out entity, completing a deferred removal or
    /// re-indexing it
    fn check_in(&mut self, id: EntityId, entity: Box<dyn Entity>) {
        let pending = self.slots.get(&id).map_or(true, |slot| slot.pending_removal);
        if pending {
            self.finish_removal(id, entity);
            return;
        }

        self.track_extent(entity.body());
        let range = self.cell_range(entity.body().position, entity.body().dimensions);
        self.reindex(id, range);
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.entity = Some(entity);
        }
    }

    /// Entities whose cells intersect the cells covered by a box of `size`
    /// centered on `position`. Each entity appears once, in no particular
    /// order.
    pub fn find_near(&self, position: Vec2, size: Vec2) -> Vec<EntityId> {
        let query = self.query_id.get().wrapping_add(1);
        self.query_id.set(query);

        let range = self.cell_range(position, size);
        let mut found = Vec::new();
        for coord in range.cells() {
            let mut cursor = self.cells[self.cell_offset(coord)];
            while let Some(node_id) = cursor {
                let node = &self.nodes[node_id.0 as usize];
                if let Some(slot) = self.slots.get(&node.entity) {
                    if slot.query_stamp.get() != query {
                        slot.query_stamp.set(query);
                        found.push(node.entity);
                    }
                }
                cursor = node.next;
            }
        }
        found
    }

    /// Linear scan of all resident entities through a [`Selector`]
    pub fn select(&self, selector: &Selector) -> Vec<&dyn Entity> {
        let window = match (selector.origin, selector.bounds) {
            (Some(origin), Some(bounds)) => Some((origin - bounds / 2.0, bounds)),
            _ => None,
        };

        let mut matches: Vec<&dyn Entity> = self
            .slots
            .values()
            .filter_map(|slot| slot.entity.as_deref())
            .filter(|entity| selector.kind.map_or(true, |kind| entity.kind() == kind))
            .filter(|entity| {
                window.map_or(true, |(min, size)| {
                    let body = entity.body();
                    rect_rect(body.position, body.dimensions, min, size)
                })
            })
            .collect();

        match (selector.sort, selector.origin) {
            (SortOrder::Nearest, Some(origin)) => {
                matches.sort_by(|a, b| {
                    let da = a.body().center().distance_sq_to(origin);
                    let db = b.body().center().distance_sq_to(origin);
                    da.partial_cmp(&db)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.id().cmp(&b.id()))
                });
            }
            _ => matches.sort_by_key(|entity| entity.id()),
        }

        if let Some(limit) = selector.limit {
            matches.truncate(limit);
        }
        matches
    }

    /// Look up an entity. `None` means it was removed (or is checked out).
    pub fn get(&self, id: EntityId) -> Option<&dyn Entity> {
        self.slots.get(&id)?.entity.as_deref()
    }

    /// Mutable lookup. Call [`SpatialHash::update_client`] after moving the
    /// entity, or use [`SpatialHash::modify`].
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut (dyn Entity + 'static)> {
        self.slots.get_mut(&id)?.entity.as_deref_mut()
    }

    pub fn get_as<T: Entity>(&self, id: EntityId) -> Option<&T> {
        self.get(id)?.as_any().downcast_ref::<T>()
    }

    pub fn get_as_mut<T: Entity>(&mut self, id: EntityId) -> Option<&mut T> {
        self.get_mut(id)?.as_any_mut().downcast_mut::<T>()
    }

    /// Run `f` on an entity and re-index it afterwards
    pub fn modify<R>(&mut self, id: EntityId, f: impl FnOnce(&mut dyn Entity) -> R) -> Option<R> {
        let result = f(self.get_mut(id)?);
        let body = self.get(id)?.body().clone();
        self.track_extent(&body);
        let range = self.cell_range(body.position, body.dimensions);
        self.reindex(id, range);
        Some(result)
    }

    /// Step every steppable entity once, in registration order.
    ///
    /// Each entity is re-indexed right after its own step. Entities removed
    /// earlier in the sweep are skipped; entities inserted during the sweep
    /// are first stepped on the next call.
    pub fn step(&mut self, dt: f64) {
        let keys: Vec<u64> = self.step_table.keys().copied().collect();
        for key in keys {
            let Some(&id) = self.step_table.get(&key) else {
                continue;
            };
            let Some(mut entity) = self.check_out(id) else {
                continue;
            };

            if let Some(stepper) = entity.as_steppable() {
                stepper.step(self, dt);
            }
            self.check_in(id, entity);
        }
    }

    /// Explicit collision pass.
    ///
    /// Every active, collidable entity (in id order) gathers the overlapping
    /// passive or active entities and receives them in one
    /// [`CollisionEvent`]. Entities removed earlier in the pass are skipped.
    /// Returns the number of handlers invoked.
    pub fn resolve_collisions(&mut self) -> usize {
        let mut active: Vec<EntityId> = self
            .slots
            .iter()
            .filter_map(|(id, slot)| {
                let entity = slot.entity.as_ref()?;
                (entity.body().collision.kind == CollisionType::Active).then_some(*id)
            })
            .collect();
        active.sort_unstable();

        let mut handled = 0;
        for id in active {
            let Some(body) = self.get(id).map(|entity| entity.body().clone()) else {
                continue;
            };

            let objects = self.overlapping(&body);
            if objects.is_empty() {
                continue;
            }

            let Some(mut entity) = self.check_out(id) else {
                continue;
            };
            if let Some(handler) = entity.as_collidable() {
                handler.collision(CollisionEvent {
                    grid: &mut *self,
                    objects: &objects,
                });
                handled += 1;
            }
            self.check_in(id, entity);
        }
        handled
    }

    /// Resident entities whose shapes overlap `body`.
    ///
    /// Cells are sampled around the top-left position, so the broad phase is
    /// widened by the largest extent in the grid to catch every overlap.
    fn overlapping(&self, body: &Body) -> Vec<EntityId> {
        let min = body.position - self.max_extent * 1.5;
        let max = body.position + body.dimensions + self.max_extent * 0.5;

        let mut objects: Vec<EntityId> = self
            .find_near((min + max) / 2.0, max - min)
            .into_iter()
            .filter(|other| *other != body.id)
            .filter(|other| {
                self.get(*other)
                    .is_some_and(|entity| bodies_overlap(body, entity.body()))
            })
            .collect();
        objects.sort_unstable();
        objects
    }

    /// Read-only occupancy record for an entity
    pub fn occupancy(&self, id: EntityId) -> Option<&Occupancy> {
        self.slots.get(&id).map(|slot| &slot.occupancy)
    }

    /// Entities linked into one cell, head first
    pub fn cell_entities(&self, coord: CellCoord) -> Vec<EntityId> {
        let mut out = Vec::new();
        if coord.0 >= self.dimensions.0 || coord.1 >= self.dimensions.1 {
            return out;
        }

        let mut cursor = self.cells[self.cell_offset(coord)];
        while let Some(node_id) = cursor {
            let node = &self.nodes[node_id.0 as usize];
            out.push(node.entity);
            cursor = node.next;
        }
        out
    }

    /// Ids of all tracked entities, sorted
    pub fn ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.slots.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn stats(&self) -> GridStats {
        let mut occupied_cells = 0;
        let mut max_per_cell = 0;
        for x in 0..self.dimensions.0 {
            for y in 0..self.dimensions.1 {
                let count = self.cell_entities((x, y)).len();
                if count > 0 {
                    occupied_cells += 1;
                    max_per_cell = max_per_cell.max(count);
                }
            }
        }

        GridStats {
            entities: self.slots.len(),
            stepping: self.step_table.len(),
            occupied_cells,
            max_per_cell,
            nodes: self.nodes.len() - self.free_nodes.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::{Collidable, CollisionDescriptor, Removable, Steppable};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use std::any::Any;
    use std::cell::RefCell;
    use std::rc::Rc;

    type StepFn = Box<dyn FnMut(&mut Body, &mut SpatialHash)>;
    type RemoveFn = Box<dyn FnMut(EntityId, &mut SpatialHash)>;
    type CollideFn = Box<dyn FnMut(&[EntityId], &mut SpatialHash)>;

    /// Test entity whose hooks are closures
    struct Probe {
        body: Body,
        kind: EntityKind,
        on_step: Option<StepFn>,
        on_remove: Option<RemoveFn>,
        on_collision: Option<CollideFn>,
    }

    impl Probe {
        fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
            Self {
                body: Body::new(
                    EntityId::next(),
                    Vec2::new(x, y),
                    Vec2::new(w, h),
                    CollisionDescriptor::passive_rect(),
                ),
                kind: EntityKind::Effect,
                on_step: None,
                on_remove: None,
                on_collision: None,
            }
        }

        fn with_kind(mut self, kind: EntityKind) -> Self {
            self.kind = kind;
            self
        }

        fn stepping(mut self, f: impl FnMut(&mut Body, &mut SpatialHash) + 'static) -> Self {
            self.on_step = Some(Box::new(f));
            self
        }

        fn removing(mut self, f: impl FnMut(EntityId, &mut SpatialHash) + 'static) -> Self {
            self.on_remove = Some(Box::new(f));
            self
        }

        fn colliding(mut self, f: impl FnMut(&[EntityId], &mut SpatialHash) + 'static) -> Self {
            self.body.collision = CollisionDescriptor::active_rect();
            self.on_collision = Some(Box::new(f));
            self
        }
    }

    impl Steppable for Probe {
        fn step(&mut self, grid: &mut SpatialHash, _dt: f64) {
            if let Some(f) = self.on_step.as_mut() {
                f(&mut self.body, grid);
            }
        }
    }

    impl Removable for Probe {
        fn on_remove(&mut self, grid: &mut SpatialHash) {
            let id = self.body.id;
            if let Some(f) = self.on_remove.as_mut() {
                f(id, grid);
            }
        }
    }

    impl Collidable for Probe {
        fn collision(&mut self, event: CollisionEvent<'_>) {
            if let Some(f) = self.on_collision.as_mut() {
                f(event.objects, event.grid);
            }
        }
    }

    impl Entity for Probe {
        fn kind(&self) -> EntityKind {
            self.kind
        }
        fn body(&self) -> &Body {
            &self.body
        }
        fn body_mut(&mut self) -> &mut Body {
            &mut self.body
        }
        fn as_steppable(&mut self) -> Option<&mut dyn Steppable> {
            if self.on_step.is_some() {
                Some(self)
            } else {
                None
            }
        }
        fn as_collidable(&mut self) -> Option<&mut dyn Collidable> {
            if self.on_collision.is_some() {
                Some(self)
            } else {
                None
            }
        }
        fn as_removable(&mut self) -> Option<&mut dyn Removable> {
            Some(self)
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn grid_10x10() -> SpatialHash {
        SpatialHash::new(Rect::new(Vec2::ZERO, Vec2::new(10.0, 10.0)), (4, 4)).unwrap()
    }

    fn insert(grid: &mut SpatialHash, probe: Probe) -> EntityId {
        grid.insert(Box::new(probe)).unwrap()
    }

    /// Every tracked entity is linked into exactly the cells of the range
    /// computed from its current body, once each
    fn assert_consistent(grid: &SpatialHash) {
        let (cols, rows) = grid.dimensions();
        for id in grid.ids() {
            let body = grid.get(id).unwrap().body().clone();
            let expected = grid.cell_range(body.position, body.dimensions);
            let occupancy = grid.occupancy(id).unwrap();
            assert_eq!(occupancy.range(), expected, "stale range for {id}");
            assert_eq!(occupancy.nodes().len(), expected.len());

            for x in 0..cols {
                for y in 0..rows {
                    let hits = grid.cell_entities((x, y)).iter().filter(|e| **e == id).count();
                    let want = usize::from(expected.contains((x, y)));
                    assert_eq!(hits, want, "{id} linked {hits} times into ({x}, {y})");
                }
            }
        }
    }

    #[test]
    fn test_rejects_degenerate_construction() {
        let flat = Rect::new(Vec2::ZERO, Vec2::new(10.0, 0.0));
        assert!(matches!(
            SpatialHash::new(flat, (4, 4)),
            Err(SpatialError::DegenerateBounds { .. })
        ));

        let bounds = Rect::new(Vec2::ZERO, Vec2::new(10.0, 10.0));
        assert_eq!(SpatialHash::new(bounds, (0, 4)).err(), Some(SpatialError::NoCells(0, 4)));
    }

    #[test]
    fn test_find_near_end_to_end() {
        let mut grid = grid_10x10();
        let a = insert(&mut grid, Probe::new(5.0, 5.0, 1.0, 1.0));
        let b = insert(&mut grid, Probe::new(5.5, 5.5, 1.0, 1.0));

        let mut found = grid.find_near(Vec2::new(5.0, 5.0), Vec2::new(2.0, 2.0));
        found.sort_unstable();
        let mut expected = vec![a, b];
        expected.sort_unstable();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_find_near_dedups_multi_cell_entities() {
        let mut grid = grid_10x10();
        let big = insert(&mut grid, Probe::new(5.0, 5.0, 8.0, 8.0));
        assert!(grid.occupancy(big).unwrap().nodes().len() > 1);

        let found = grid.find_near(Vec2::new(5.0, 5.0), Vec2::new(10.0, 10.0));
        assert_eq!(found, vec![big]);
    }

    #[test]
    fn test_find_near_excludes_distant_cells() {
        let mut grid = grid_10x10();
        let near = insert(&mut grid, Probe::new(1.0, 1.0, 0.5, 0.5));
        insert(&mut grid, Probe::new(9.0, 9.0, 0.5, 0.5));

        let found = grid.find_near(Vec2::new(1.0, 1.0), Vec2::new(1.0, 1.0));
        assert_eq!(found, vec![near]);
    }

    #[test]
    fn test_off_map_entities_clamp_to_boundary_cells() {
        let mut grid = grid_10x10();
        assert_eq!(grid.cell_index(Vec2::new(1_000.0, -1_000.0)), (3, 0));
        assert_eq!(grid.cell_index(Vec2::new(f64::NAN, 5.0)).0, 0);

        let far = insert(&mut grid, Probe::new(1_000.0, -1_000.0, 1.0, 1.0));
        let range = grid.occupancy(far).unwrap().range();
        assert_eq!(range, CellRange { min: (3, 0), max: (3, 0) });
        assert_eq!(range.len(), 1);
        assert!(!range.is_empty());
        assert_eq!(grid.find_near(Vec2::new(50.0, -50.0), Vec2::ONE), vec![far]);
    }

    #[test]
    fn test_update_noop_keeps_nodes() {
        let mut grid = grid_10x10();
        let id = insert(&mut grid, Probe::new(5.0, 5.0, 1.0, 1.0));
        let before: Vec<NodeId> = grid.occupancy(id).unwrap().nodes().to_vec();

        // Small move inside the same cell
        grid.get_mut(id).unwrap().body_mut().position = Vec2::new(5.2, 5.1);
        assert_eq!(grid.update_client(id), Ok(false));
        assert_eq!(grid.occupancy(id).unwrap().nodes(), before.as_slice());

        grid.get_mut(id).unwrap().body_mut().position = Vec2::new(9.0, 1.0);
        assert_eq!(grid.update_client(id), Ok(true));
        assert_consistent(&grid);
    }

    #[test]
    fn test_random_operations_stay_consistent() {
        let mut grid = SpatialHash::new(Rect::new(Vec2::ZERO, Vec2::new(40.0, 30.0)), (8, 6)).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(0xC0FFEE);
        let mut live: Vec<EntityId> = Vec::new();

        for _ in 0..2_000 {
            match rng.gen_range(0..3) {
                0 => {
                    let probe = Probe::new(
                        rng.gen_range(-5.0..45.0),
                        rng.gen_range(-5.0..35.0),
                        rng.gen_range(0.1..12.0),
                        rng.gen_range(0.1..12.0),
                    );
                    live.push(insert(&mut grid, probe));
                }
                1 if !live.is_empty() => {
                    let id = live[rng.gen_range(0..live.len())];
                    let to = Vec2::new(rng.gen_range(-5.0..45.0), rng.gen_range(-5.0..35.0));
                    grid.modify(id, |e| e.body_mut().position = to).unwrap();
                }
                2 if !live.is_empty() => {
                    let id = live.swap_remove(rng.gen_range(0..live.len()));
                    grid.remove(id).unwrap();
                }
                _ => {}
            }
        }

        assert_eq!(grid.len(), live.len());
        assert_consistent(&grid);
        let expected_nodes: usize = live.iter().map(|id| grid.occupancy(*id).unwrap().nodes().len()).sum();
        assert_eq!(grid.stats().nodes, expected_nodes);
    }

    #[test]
    fn test_double_insert_and_double_remove_fail() {
        let mut grid = grid_10x10();
        let probe = Probe::new(1.0, 1.0, 1.0, 1.0);
        let mut twin = Probe::new(2.0, 2.0, 1.0, 1.0);
        twin.body.id = probe.body.id;

        let id = insert(&mut grid, probe);
        assert_eq!(grid.insert(Box::new(twin)), Err(SpatialError::AlreadyTracked(id)));

        grid.remove(id).unwrap();
        assert_eq!(grid.remove(id), Err(SpatialError::UnknownEntity(id)));
        assert!(grid.get(id).is_none());
        assert!(grid.cell_entities((0, 0)).is_empty());
    }

    #[test]
    fn test_remove_hook_runs_before_unlink() {
        let mut grid = grid_10x10();
        let seen = Rc::new(Cell::new(false));
        let seen_in_hook = seen.clone();

        let id = insert(
            &mut grid,
            Probe::new(5.0, 5.0, 1.0, 1.0).removing(move |id, grid| {
                let near = grid.find_near(Vec2::new(5.0, 5.0), Vec2::ONE);
                seen_in_hook.set(near.contains(&id));
                assert_eq!(grid.remove(id), Err(SpatialError::AlreadyRemoved(id)));
            }),
        );

        grid.remove(id).unwrap();
        assert!(seen.get());
        assert!(!grid.contains(id));
    }

    #[test]
    fn test_step_order_and_reindex() {
        let mut grid = grid_10x10();
        let order = Rc::new(RefCell::new(Vec::new()));

        let mut ids = Vec::new();
        for i in 0..3 {
            let log = order.clone();
            let probe = Probe::new(1.0 + i as f64, 1.0, 0.5, 0.5).stepping(move |body, _| {
                log.borrow_mut().push(body.id);
                body.position.x += 6.0;
            });
            ids.push(insert(&mut grid, probe));
        }
        // Not steppable, never visited
        insert(&mut grid, Probe::new(3.0, 3.0, 0.5, 0.5));

        grid.step(16.0);
        assert_eq!(*order.borrow(), ids);
        assert_eq!(grid.stats().stepping, 3);
        assert_consistent(&grid);
        assert_eq!(grid.occupancy(ids[0]).unwrap().range().min.0, 2);
    }

    #[test]
    fn test_later_steps_see_earlier_positions() {
        let mut grid = grid_10x10();
        let mover = insert(
            &mut grid,
            Probe::new(0.5, 0.5, 0.5, 0.5).stepping(|body, _| body.position = Vec2::new(9.0, 9.0)),
        );

        let observed = Rc::new(Cell::new(false));
        let flag = observed.clone();
        insert(
            &mut grid,
            Probe::new(9.0, 1.0, 0.5, 0.5).stepping(move |_, grid| {
                flag.set(grid.find_near(Vec2::new(9.0, 9.0), Vec2::ONE).contains(&mover));
            }),
        );

        grid.step(16.0);
        assert!(observed.get());
    }

    #[test]
    fn test_removed_mid_sweep_is_skipped() {
        let mut grid = grid_10x10();
        let stepped = Rc::new(RefCell::new(Vec::new()));

        let victim_slot = Rc::new(Cell::new(None::<EntityId>));
        let target = victim_slot.clone();
        let log = stepped.clone();
        let killer = insert(
            &mut grid,
            Probe::new(1.0, 1.0, 0.5, 0.5).stepping(move |body, grid| {
                log.borrow_mut().push(body.id);
                if let Some(victim) = target.get() {
                    grid.remove(victim).unwrap();
                }
            }),
        );

        let log = stepped.clone();
        let victim = insert(
            &mut grid,
            Probe::new(2.0, 2.0, 0.5, 0.5).stepping(move |body, _| log.borrow_mut().push(body.id)),
        );
        victim_slot.set(Some(victim));

        let log = stepped.clone();
        let bystander = insert(
            &mut grid,
            Probe::new(3.0, 3.0, 0.5, 0.5).stepping(move |body, _| log.borrow_mut().push(body.id)),
        );

        grid.step(16.0);
        assert_eq!(*stepped.borrow(), vec![killer, bystander]);
        assert!(grid.get(victim).is_none());
        assert_consistent(&grid);
    }

    #[test]
    fn test_self_removal_completes_after_step() {
        let mut grid = grid_10x10();
        let hook_ran = Rc::new(Cell::new(false));
        let flag = hook_ran.clone();

        let id = insert(
            &mut grid,
            Probe::new(1.0, 1.0, 0.5, 0.5)
                .stepping(|body, grid| {
                    let id = body.id;
                    grid.remove(id).unwrap();
                    // Still checked out, so lookups miss it
                    assert!(grid.get(id).is_none());
                })
                .removing(move |_, _| flag.set(true)),
        );

        grid.step(16.0);
        assert!(hook_ran.get());
        assert!(!grid.contains(id));
        assert!(grid.cell_entities((0, 0)).is_empty());

        // Nothing left to step
        grid.step(16.0);
        assert_eq!(grid.stats().stepping, 0);
    }

    #[test]
    fn test_select_filters_sorts_and_limits() {
        let mut grid = grid_10x10();
        let far = insert(&mut grid, Probe::new(8.0, 8.0, 1.0, 1.0).with_kind(EntityKind::Player));
        let near = insert(&mut grid, Probe::new(2.0, 2.0, 1.0, 1.0).with_kind(EntityKind::Player));
        insert(&mut grid, Probe::new(1.0, 1.0, 1.0, 1.0).with_kind(EntityKind::Enemy));

        let players: Vec<EntityId> = grid
            .select(&Selector::of_kind(EntityKind::Player).around(Vec2::ZERO, Vec2::splat(40.0)).nearest())
            .iter()
            .map(|e| e.id())
            .collect();
        assert_eq!(players, vec![near, far]);

        let boxed: Vec<EntityId> = grid
            .select(&Selector::of_kind(EntityKind::Player).around(Vec2::new(2.5, 2.5), Vec2::splat(2.0)))
            .iter()
            .map(|e| e.id())
            .collect();
        assert_eq!(boxed, vec![near]);

        let limited = grid.select(&Selector::default().around(Vec2::ZERO, Vec2::splat(40.0)).nearest().limit(1));
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].kind(), EntityKind::Enemy);
    }

    #[test]
    fn test_collision_pass_reports_overlaps() {
        let mut grid = grid_10x10();
        let hits = Rc::new(RefCell::new(Vec::new()));
        let log = hits.clone();

        let active = insert(
            &mut grid,
            Probe::new(4.0, 4.0, 1.0, 1.0).colliding(move |objects, _| log.borrow_mut().extend_from_slice(objects)),
        );
        let overlapping = insert(&mut grid, Probe::new(4.5, 4.5, 1.0, 1.0));
        let mut ghost = Probe::new(4.2, 4.2, 1.0, 1.0);
        ghost.body.collision = CollisionDescriptor::none();
        insert(&mut grid, ghost);
        insert(&mut grid, Probe::new(7.0, 7.0, 1.0, 1.0));
        // Large entity indexed far from its top-left corner still overlaps
        let wide = insert(&mut grid, Probe::new(0.0, 4.6, 4.5, 0.2));

        assert_eq!(grid.resolve_collisions(), 1);
        let mut expected = vec![overlapping, wide];
        expected.sort_unstable();
        assert_eq!(*hits.borrow(), expected);
        assert!(grid.get(active).is_some());
    }

    #[test]
    fn test_collision_pass_skips_removed_entities() {
        let mut grid = grid_10x10();
        let count = Rc::new(Cell::new(0));

        // Two active entities that destroy each other; only the first runs
        let c1 = count.clone();
        insert(
            &mut grid,
            Probe::new(4.0, 4.0, 1.0, 1.0).colliding(move |objects, grid| {
                c1.set(c1.get() + 1);
                for other in objects {
                    let _ = grid.remove(*other);
                }
            }),
        );
        let c2 = count.clone();
        insert(
            &mut grid,
            Probe::new(4.5, 4.5, 1.0, 1.0).colliding(move |_, _| c2.set(c2.get() + 1)),
        );

        assert_eq!(grid.resolve_collisions(), 1);
        assert_eq!(count.get(), 1);
        assert_eq!(grid.len(), 1);
    }
}
