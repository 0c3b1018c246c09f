//! Bookkeeping of the navmesh of every bound.
//!
//! Builds are handed out as [`BuildTicket`]s and run wherever the host likes. A finished build only
//! replaces the bound's [`NavmeshBundle`] if no newer build was requested in the meantime, and readers
//! always get a complete bundle through an [`Arc`].

use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
};

use glam::Vec3A;
use thiserror::Error;

use crate::{
    config::NavmeshConfig,
    main_api::{NavmeshBuildError, NavmeshBundle, build_navmesh_cancellable},
    math::Aabb3d,
    query::{AgentProperties, PointProjection, QueryError},
    trimesh::TriMesh,
};

/// Identifies a bound registered in a [`NavmeshRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct BoundId(pub u32);

impl fmt::Display for BoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bound #{}", self.0)
    }
}

/// A reference to one polygon of one bound's navmesh.
///
/// The upper 32 bits hold the [`BoundId`], the lower 32 bits the polygon index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct NodeRef(pub u64);

impl NodeRef {
    /// Packs a bound and a polygon index.
    pub fn new(bound_id: BoundId, polygon_index: usize) -> Result<Self, NodeRefError> {
        let polygon = u32::try_from(polygon_index)
            .map_err(|_| NodeRefError::PolygonIndexTooLarge { polygon_index })?;
        Ok(Self(((bound_id.0 as u64) << 32) | polygon as u64))
    }

    /// The bound the polygon belongs to.
    #[inline]
    pub fn bound_id(self) -> BoundId {
        BoundId((self.0 >> 32) as u32)
    }

    /// The index of the polygon in its bound's [`PolygonMesh`](crate::PolygonMesh).
    #[inline]
    pub fn polygon_index(self) -> u32 {
        self.0 as u32
    }
}

/// Errors that can occur when creating a [`NodeRef`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeRefError {
    /// Happens when the polygon index does not fit into 32 bits.
    #[error("polygon index {polygon_index} does not fit into a node reference")]
    PolygonIndexTooLarge {
        /// The rejected polygon index
        polygon_index: usize,
    },
}

/// A request to build the navmesh of one bound, issued by [`NavmeshRegistry::take_build_tickets`].
#[derive(Debug, Clone)]
pub struct BuildTicket {
    /// The bound to build.
    pub bound_id: BoundId,
    /// The world space box of the bound.
    pub bounds: Aabb3d,
    /// The build generation of the bound this ticket belongs to.
    pub generation: u64,
    cancel: Arc<AtomicBool>,
}

impl BuildTicket {
    /// Whether a newer ticket superseded this one or its bound was unregistered.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// The flag that is set once this ticket is cancelled.
    pub fn cancel_flag(&self) -> &AtomicBool {
        &self.cancel
    }

    /// Builds the navmesh for this ticket, giving up early once the ticket is cancelled.
    pub fn build(
        &self,
        trimesh: &TriMesh,
        config: &NavmeshConfig,
    ) -> Result<NavmeshBundle, NavmeshBuildError> {
        build_navmesh_cancellable(self.bound_id, self.bounds, trimesh, config, &self.cancel)
    }
}

#[derive(Debug)]
struct BoundEntry {
    bounds: Aabb3d,
    generation: u64,
    dirty: bool,
    in_flight: Option<Arc<AtomicBool>>,
    bundle: Option<Arc<NavmeshBundle>>,
}

impl BoundEntry {
    fn cancel_in_flight(&mut self) {
        if let Some(cancel) = self.in_flight.take() {
            cancel.store(true, Ordering::Relaxed);
        }
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    next_id: u32,
    bounds: BTreeMap<BoundId, BoundEntry>,
}

/// Keeps track of the registered bounds, their pending builds and their current navmeshes.
///
/// All methods take `&self`, so the registry can be shared between threads with an [`Arc`].
#[derive(Debug, Default)]
pub struct NavmeshRegistry {
    state: Mutex<RegistryState>,
}

impl NavmeshRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a new bound. It starts out dirty, so the next [`Self::take_build_tickets`] includes it.
    pub fn register_bound(&self, bounds: Aabb3d) -> Result<BoundId, RegistryError> {
        let mut state = self.state();
        let id = BoundId(state.next_id);
        state.next_id = state
            .next_id
            .checked_add(1)
            .ok_or(RegistryError::TooManyBounds)?;
        state.bounds.insert(
            id,
            BoundEntry {
                bounds,
                generation: 0,
                dirty: true,
                in_flight: None,
                bundle: None,
            },
        );
        tracing::debug!(bound = id.0, "registered bound");
        Ok(id)
    }

    /// Removes a bound and its navmesh. A build in flight for it is cancelled.
    pub fn unregister_bound(&self, bound_id: BoundId) -> Result<(), RegistryError> {
        let mut entry = self
            .state()
            .bounds
            .remove(&bound_id)
            .ok_or(RegistryError::UnknownBound { bound_id })?;
        entry.cancel_in_flight();
        tracing::debug!(bound = bound_id.0, "unregistered bound");
        Ok(())
    }

    /// Requests a rebuild of a bound. Several requests before the next
    /// [`Self::take_build_tickets`] result in a single build.
    pub fn mark_dirty(&self, bound_id: BoundId) -> Result<(), RegistryError> {
        let mut state = self.state();
        let entry = state
            .bounds
            .get_mut(&bound_id)
            .ok_or(RegistryError::UnknownBound { bound_id })?;
        entry.dirty = true;
        Ok(())
    }

    /// Requests a rebuild of every bound.
    pub fn rebuild_all(&self) {
        for entry in self.state().bounds.values_mut() {
            entry.dirty = true;
        }
    }

    /// Issues one ticket per dirty bound.
    ///
    /// A build still in flight for such a bound is cancelled, its result will be discarded.
    pub fn take_build_tickets(&self) -> Vec<BuildTicket> {
        let mut state = self.state();
        let mut tickets = Vec::new();
        for (&bound_id, entry) in state.bounds.iter_mut().filter(|(_, entry)| entry.dirty) {
            if entry.in_flight.is_some() {
                tracing::trace!(bound = bound_id.0, "superseding build in flight");
            }
            entry.cancel_in_flight();
            entry.dirty = false;
            entry.generation += 1;
            let cancel = Arc::new(AtomicBool::new(false));
            entry.in_flight = Some(cancel.clone());
            tickets.push(BuildTicket {
                bound_id,
                bounds: entry.bounds,
                generation: entry.generation,
                cancel,
            });
        }
        tickets
    }

    /// Stores the result of a ticket's build.
    ///
    /// Returns `false` and drops the bundle if the ticket was superseded, cancelled or its bound removed.
    pub fn complete_build(&self, ticket: BuildTicket, bundle: NavmeshBundle) -> bool {
        let mut state = self.state();
        let Some(entry) = state.bounds.get_mut(&ticket.bound_id) else {
            return false;
        };
        if entry.generation != ticket.generation || ticket.is_cancelled() {
            tracing::debug!(
                bound = ticket.bound_id.0,
                generation = ticket.generation,
                current = entry.generation,
                "discarding outdated navmesh build"
            );
            return false;
        }
        entry.in_flight = None;
        entry.bundle = Some(Arc::new(bundle));
        true
    }

    /// Gives up on a ticket, for example because its build failed. The bound keeps its previous navmesh.
    pub fn abandon_build(&self, ticket: BuildTicket) {
        let mut state = self.state();
        if let Some(entry) = state.bounds.get_mut(&ticket.bound_id) {
            if entry.generation == ticket.generation {
                entry.cancel_in_flight();
            }
        }
    }

    /// The current navmesh of a bound, if one was built.
    pub fn bundle(&self, bound_id: BoundId) -> Option<Arc<NavmeshBundle>> {
        self.state()
            .bounds
            .get(&bound_id)
            .and_then(|entry| entry.bundle.clone())
    }

    /// The number of tickets that were issued but not yet completed, abandoned or superseded.
    pub fn remaining_build_tasks(&self) -> usize {
        self.state()
            .bounds
            .values()
            .filter(|entry| entry.in_flight.is_some())
            .count()
    }

    /// The bound with the lowest id containing `point`.
    pub fn bound_for_location(&self, point: Vec3A) -> Option<BoundId> {
        self.state()
            .bounds
            .iter()
            .find(|(_, entry)| entry.bounds.contains(point))
            .map(|(&id, _)| id)
    }

    fn bundle_at(&self, point: Vec3A) -> Result<Arc<NavmeshBundle>, QueryError> {
        let bound_id = self
            .bound_for_location(point)
            .ok_or(QueryError::NotFound { point })?;
        self.bundle(bound_id)
            .ok_or(QueryError::UnknownBound { bound_id })
    }

    /// Finds a path on the navmesh of the bound containing `start`.
    pub fn find_path(
        &self,
        agent: &AgentProperties,
        start: Vec3A,
        end: Vec3A,
    ) -> Result<Vec<Vec3A>, QueryError> {
        self.bundle_at(start)?.find_path(agent, start, end)
    }

    /// Projects a point onto the navmesh of the bound containing it.
    pub fn project_point(&self, point: Vec3A, extent: Vec3A) -> Result<PointProjection, QueryError> {
        self.bundle_at(point)?.project_point(point, extent)
    }
}

/// Errors that can occur when managing bounds in a [`NavmeshRegistry`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Happens when the bound was never registered or already removed.
    #[error("{bound_id} is not registered")]
    UnknownBound {
        /// The requested bound
        bound_id: BoundId,
    },
    /// Happens when the 32-bit bound id space is exhausted.
    #[error("ran out of bound ids")]
    TooManyBounds,
}
