//! Watershed partitioning
//!   - floods the distance field from its deepest level down, two levels at a time
//!   - existing regions grow into each newly uncovered level before new regions are seeded
//!   - seeds refuse spans that would touch another region, even diagonally, so regions never bridge
//!   - small regions are merged into their best connected neighbour or dropped afterwards
//!   * see [`OpenHeightfield::clean_null_region_borders`] for the cleanup that follows

use std::collections::BTreeMap;

use crate::{
    OpenHeightfield,
    math::rotate_cw,
    region::{Region, RegionBuildError, RegionId, RegionIdCounter},
};

impl OpenHeightfield {
    /// Partitions the walkable spans into regions of connected, non-overlapping spans.
    ///
    /// # Arguments
    ///
    /// - `traversable_border_size` - The agent radius. Spans closer than this to a border do not seed regions. [Units: vx]
    /// - `min_spans_for_regions` - Regions with at most this many spans are merged into a neighbour or removed.
    ///
    /// The distance field must be up to date, see [`OpenHeightfield::build_distance_field`].
    pub fn build_regions(
        &mut self,
        traversable_border_size: u16,
        min_spans_for_regions: usize,
    ) -> Result<(), RegionBuildError> {
        for span in &mut self.spans {
            span.region = RegionId::NONE;
            span.distance_to_core = 0;
            span.flags = Default::default();
        }
        let mut region_ids = RegionIdCounter::default();

        let min_distance = traversable_border_size.saturating_add(self.min_edge_distance());
        let expand_iters = 4 + 2 * traversable_border_size as usize;
        let mut level = self.max_edge_distance() & !1;

        let mut flooded = Vec::with_capacity(256);
        while level > min_distance {
            self.collect_unassigned(level, &mut flooded);
            if region_ids.last_id() != RegionId::NONE {
                self.expand_regions(&mut flooded, (level > 0).then_some(expand_iters));
            }
            let fill_to = level.saturating_sub(2).max(min_distance);
            for &i in &flooded {
                if !self.spans[i].region.is_none() {
                    continue;
                }
                self.flood_new_region(i, fill_to, &mut region_ids)?;
            }
            level = level.saturating_sub(2);
        }

        self.collect_unassigned(min_distance, &mut flooded);
        // Spans no region reaches stay in the null region.
        self.expand_regions(&mut flooded, (min_distance > 0).then_some(expand_iters * 8));

        self.filter_small_regions(min_spans_for_regions);
        self.clean_null_region_borders(&mut region_ids)?;
        self.rebuild_regions();
        tracing::debug!(
            regions = self.regions.len(),
            ids_used = region_ids.last_id().0,
            "built regions"
        );
        Ok(())
    }

    fn collect_unassigned(&self, min_edge_distance: u16, spans: &mut Vec<usize>) {
        spans.clear();
        spans.extend(
            self.spans
                .iter()
                .enumerate()
                .filter(|(_, span)| {
                    span.region.is_none() && span.edge_distance >= min_edge_distance
                })
                .map(|(i, _)| i),
        );
    }

    /// Grows existing regions over the pending spans.
    ///
    /// Every pass decides all pending spans against the state at the start of the pass and only then
    /// applies the assignments, so no region gets a head start from the iteration order.
    /// `max_iter` of `None` grows until nothing changes.
    pub(crate) fn expand_regions(&mut self, pending: &mut Vec<usize>, max_iter: Option<usize>) {
        pending.retain(|&i| self.spans[i].region.is_none());
        let mut dirty_entries = Vec::new();
        let mut iter = 0;
        while !pending.is_empty() {
            if max_iter.is_some_and(|max_iter| iter >= max_iter) {
                break;
            }
            iter += 1;

            dirty_entries.clear();
            for &i in pending.iter() {
                if let Some((region, distance_to_core)) = self.best_expansion(i) {
                    dirty_entries.push(DirtyEntry {
                        index: i,
                        region,
                        distance_to_core,
                    });
                }
            }
            if dirty_entries.is_empty() {
                break;
            }
            for entry in &dirty_entries {
                let span = &mut self.spans[entry.index];
                span.region = entry.region;
                span.distance_to_core = entry.distance_to_core;
            }
            pending.retain(|&i| self.spans[i].region.is_none());
        }
    }

    /// The neighbouring region closest to its core, joined through a neighbour that is itself
    /// held by at least two spans of its region.
    fn best_expansion(&self, i: usize) -> Option<(RegionId, u16)> {
        let mut best: Option<(RegionId, u16)> = None;
        for dir in 0..4 {
            let Some(neighbour) = self.neighbour(i, dir) else {
                continue;
            };
            let region = self.spans[neighbour].region;
            if region.is_none() {
                continue;
            }
            let same_region_neighbours = (0..4)
                .filter_map(|d| self.neighbour(neighbour, d))
                .filter(|&n| self.spans[n].region == region)
                .count();
            if same_region_neighbours < 2 {
                continue;
            }
            let distance = self.spans[neighbour].distance_to_core.saturating_add(2);
            if best.is_none_or(|(_, best_distance)| distance < best_distance) {
                best = Some((region, distance));
            }
        }
        best
    }

    /// Floods a new region from `root` through spans with an edge distance of at least `fill_to`.
    ///
    /// Spans touching another region through an axis neighbour or the diagonal next to it are
    /// left unassigned. Returns whether the region kept any span. An empty flood does not use up an id.
    pub(crate) fn flood_new_region(
        &mut self,
        root: usize,
        fill_to: u16,
        region_ids: &mut RegionIdCounter,
    ) -> Result<bool, RegionBuildError> {
        let region = region_ids.peek_id()?;
        self.spans[root].region = region;
        self.spans[root].distance_to_core = 0;

        let mut size = 0_usize;
        let mut stack = vec![root];
        while let Some(i) = stack.pop() {
            if self.touches_other_region(i, region) {
                self.spans[i].region = RegionId::NONE;
                continue;
            }
            size += 1;
            for dir in 0..4 {
                let Some(neighbour) = self.neighbour(i, dir) else {
                    continue;
                };
                let neighbour_span = &mut self.spans[neighbour];
                if !neighbour_span.region.is_none() || neighbour_span.edge_distance < fill_to {
                    continue;
                }
                neighbour_span.region = region;
                neighbour_span.distance_to_core = 0;
                stack.push(neighbour);
            }
        }

        if size == 0 {
            return Ok(false);
        }
        region_ids.next_id()?;
        tracing::trace!(region = region.0, size, "flooded new region");
        Ok(true)
    }

    fn touches_other_region(&self, i: usize, region: RegionId) -> bool {
        let is_other = |n: usize| {
            let other = self.spans[n].region;
            !other.is_none() && other != region
        };
        (0..4).any(|dir| {
            let Some(neighbour) = self.neighbour(i, dir) else {
                return false;
            };
            is_other(neighbour)
                || self
                    .neighbour(neighbour, rotate_cw(dir))
                    .is_some_and(is_other)
        })
    }

    /// Merges every region with at most `min_spans` spans into the neighbouring region it shares the
    /// most edges with, or returns its spans to the null region if it has no neighbour.
    ///
    /// Regions are visited from the highest id down. Ties prefer the larger neighbour, then the lower id.
    pub fn filter_small_regions(&mut self, min_spans: usize) {
        let mut members = self.region_members();
        let ids: Vec<RegionId> = members.keys().rev().copied().collect();
        for id in ids {
            let Some(spans) = members.get(&id) else {
                continue;
            };
            if spans.len() > min_spans {
                continue;
            }

            let mut contact: BTreeMap<RegionId, usize> = BTreeMap::new();
            for &i in spans {
                for dir in 0..4 {
                    let Some(neighbour) = self.neighbour(i, dir) else {
                        continue;
                    };
                    let other = self.spans[neighbour].region;
                    if !other.is_none() && other != id {
                        *contact.entry(other).or_default() += 1;
                    }
                }
            }
            let target = contact
                .iter()
                .max_by(|(a_id, a_contact), (b_id, b_contact)| {
                    let a_size = members.get(a_id).map_or(0, Vec::len);
                    let b_size = members.get(b_id).map_or(0, Vec::len);
                    a_contact
                        .cmp(b_contact)
                        .then(a_size.cmp(&b_size))
                        .then(b_id.cmp(a_id))
                })
                .map(|(id, _)| *id);

            let Some(spans) = members.remove(&id) else {
                continue;
            };
            let new_region = target.unwrap_or(RegionId::NONE);
            tracing::trace!(
                region = id.0,
                size = spans.len(),
                into = new_region.0,
                "filtered small region"
            );
            for &i in &spans {
                self.spans[i].region = new_region;
            }
            if let Some(target) = target {
                members.entry(target).or_default().extend(spans);
            }
        }
        self.rebuild_regions();
    }

    fn region_members(&self) -> BTreeMap<RegionId, Vec<usize>> {
        let mut members: BTreeMap<RegionId, Vec<usize>> = BTreeMap::new();
        for (i, span) in self.spans.iter().enumerate() {
            if !span.region.is_none() {
                members.entry(span.region).or_default().push(i);
            }
        }
        members
    }

    /// Rebuilds [`OpenHeightfield::regions`] from the span assignments. Empty regions disappear.
    pub(crate) fn rebuild_regions(&mut self) {
        self.regions = self
            .region_members()
            .into_iter()
            .map(|(id, spans)| Region { id, spans })
            .collect();
    }
}

#[derive(Clone, Debug)]
struct DirtyEntry {
    index: usize,
    region: RegionId,
    distance_to_core: u16,
}
