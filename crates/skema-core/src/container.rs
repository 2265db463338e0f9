//! The scheme container — single source of truth for the item tree,
//! connector topology, selection set and derived spatial state.
//!
//! Items live in a flat arena (`StableDiGraph`) with parent→child edges;
//! the persisted nested form is flattened on load and re-nested on save.
//! Every mutation that touches geometry goes through here so that world
//! transforms, connector paths and curve attachments are never stale.
//!
//! Continuous queries (selectors, hit tests, snapping probes) run on every
//! pointer move and therefore degrade to `None`/empty instead of failing.

use crate::geometry::{Area, Outline, Point, ScreenTransform, Transform};
use crate::id::ItemId;
use crate::model::{Connector, ConnectorEnd, Item, Scheme, Shape};
use petgraph::Direction;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use smallvec::{SmallVec, smallvec};
use std::collections::{HashMap, HashSet};

/// How many points approximate an ellipse outline.
const ELLIPSE_OUTLINE_SEGMENTS: usize = 32;

/// A resolved element reference: selectors can denote items or connectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element {
    Item(ItemId),
    Connector(ItemId),
}

/// Result of a snapping probe against item outlines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestPointToItem {
    pub item_id: ItemId,
    pub point: Point,
    /// Relative position (0..1) along the item's outline.
    pub position: f32,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragEdge {
    Top,
    Bottom,
    Left,
    Right,
}

/// A resize handle on the selection boundary box.
#[derive(Debug, Clone, PartialEq)]
pub struct Dragger {
    pub x: f32,
    pub y: f32,
    pub s: f32,
    pub edges: SmallVec<[DragEdge; 2]>,
}

pub struct SchemeContainer {
    graph: StableDiGraph<Item, ()>,
    id_index: HashMap<ItemId, NodeIndex>,
    group_index: HashMap<String, Vec<ItemId>>,
    pub connectors: Vec<Connector>,
    pub selected_items: Vec<ItemId>,
    pub screen_transform: ScreenTransform,
    pub active_boundary_box: Option<Area>,
    /// Bounding box of all items, kept up to date by reindexing.
    pub boundary_box: Area,
    // Scheme metadata carried through load/save untouched.
    scheme_id: Option<String>,
    name: String,
    description: String,
    tags: Vec<String>,
    modified_time: Option<String>,
    style: crate::model::SchemeStyle,
}

impl Default for SchemeContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemeContainer {
    pub fn new() -> Self {
        Self {
            graph: StableDiGraph::new(),
            id_index: HashMap::new(),
            group_index: HashMap::new(),
            connectors: Vec::new(),
            selected_items: Vec::new(),
            screen_transform: ScreenTransform::default(),
            active_boundary_box: None,
            boundary_box: Area::new(0.0, 0.0, 100.0, 100.0),
            scheme_id: None,
            name: String::new(),
            description: String::new(),
            tags: Vec::new(),
            modified_time: None,
            style: crate::model::SchemeStyle::default(),
        }
    }

    pub fn from_scheme(scheme: Scheme) -> Self {
        let mut container = Self::new();
        container.set_scheme(scheme);
        container
    }

    // ─── Load / save ─────────────────────────────────────────────────────

    /// Replace the whole content with the given document. The nested
    /// `childItems` form is flattened into the arena.
    pub fn set_scheme(&mut self, scheme: Scheme) {
        self.graph.clear();
        self.id_index.clear();
        self.selected_items.clear();
        self.connectors = scheme.connectors;
        self.scheme_id = scheme.id;
        self.name = scheme.name;
        self.description = scheme.description;
        self.tags = scheme.tags;
        self.modified_time = scheme.modified_time;
        self.style = scheme.style;
        for item in scheme.items {
            self.insert_item_recursive(None, item);
        }
        self.reindex();
    }

    /// Produce the persisted document form: nested items, connectors with
    /// derived state stripped by serialization.
    pub fn to_scheme(&self) -> Scheme {
        let items = self
            .top_level_indices()
            .into_iter()
            .map(|idx| self.export_item(idx))
            .collect();
        Scheme {
            id: self.scheme_id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            modified_time: self.modified_time.clone(),
            style: self.style.clone(),
            items,
            connectors: self.connectors.clone(),
        }
    }

    fn export_item(&self, idx: NodeIndex) -> Item {
        let mut item = self.graph[idx].clone();
        item.child_items = self
            .child_indices(idx)
            .into_iter()
            .map(|c| self.export_item(c))
            .collect();
        item
    }

    fn insert_item_recursive(&mut self, parent: Option<NodeIndex>, mut item: Item) -> NodeIndex {
        let children = std::mem::take(&mut item.child_items);
        let id = item.id;
        let idx = self.graph.add_node(item);
        self.id_index.insert(id, idx);
        if let Some(parent_idx) = parent {
            self.graph.add_edge(parent_idx, idx, ());
        }
        for child in children {
            self.insert_item_recursive(Some(idx), child);
        }
        idx
    }

    // ─── Tree structure ──────────────────────────────────────────────────

    fn index_of(&self, id: ItemId) -> Option<NodeIndex> {
        self.id_index.get(&id).copied()
    }

    fn parent_index(&self, idx: NodeIndex) -> Option<NodeIndex> {
        self.graph.neighbors_directed(idx, Direction::Incoming).next()
    }

    /// Children in document (insertion) order. Sorted by `NodeIndex` so the
    /// result is deterministic regardless of adjacency iteration order.
    fn child_indices(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut children: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .collect();
        children.sort();
        children
    }

    fn top_level_indices(&self) -> Vec<NodeIndex> {
        let mut roots: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&idx| self.parent_index(idx).is_none())
            .collect();
        roots.sort();
        roots
    }

    pub fn parent_of(&self, id: ItemId) -> Option<ItemId> {
        self.index_of(id)
            .and_then(|idx| self.parent_index(idx))
            .map(|p| self.graph[p].id)
    }

    pub fn children_of(&self, id: ItemId) -> Vec<ItemId> {
        self.index_of(id)
            .map(|idx| {
                self.child_indices(idx)
                    .into_iter()
                    .map(|c| self.graph[c].id)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn top_level_items(&self) -> Vec<ItemId> {
        self.top_level_indices()
            .into_iter()
            .map(|idx| self.graph[idx].id)
            .collect()
    }

    /// All item ids in deterministic order.
    pub fn all_item_ids(&self) -> Vec<ItemId> {
        let mut indices: Vec<NodeIndex> = self.graph.node_indices().collect();
        indices.sort();
        indices.into_iter().map(|idx| self.graph[idx].id).collect()
    }

    pub fn items_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Check if `ancestor` is a parent/grandparent/etc. of `descendant`.
    pub fn is_ancestor_of(&self, ancestor: ItemId, descendant: ItemId) -> bool {
        if ancestor == descendant {
            return false;
        }
        let mut current = match self.index_of(descendant) {
            Some(idx) => idx,
            None => return false,
        };
        while let Some(parent) = self.parent_index(current) {
            if self.graph[parent].id == ancestor {
                return true;
            }
            current = parent;
        }
        false
    }

    // ─── Item access & mutation ──────────────────────────────────────────

    pub fn find_item_by_id(&self, id: ItemId) -> Option<&Item> {
        self.index_of(id).map(|idx| &self.graph[idx])
    }

    pub fn find_item_by_id_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        self.index_of(id).map(|idx| &mut self.graph[idx])
    }

    pub fn items_iter(&self) -> impl Iterator<Item = &Item> {
        self.graph.node_weights()
    }

    /// Insert a top-level item. The item (and any nested `childItems`) is
    /// indexed before this returns, so follow-up queries see it.
    pub fn add_item(&mut self, item: Item) -> ItemId {
        let id = item.id;
        self.insert_item_recursive(None, item);
        self.reindex();
        id
    }

    /// Insert an item under a parent; falls back to the root level when the
    /// parent is unknown.
    pub fn add_child_item(&mut self, parent: ItemId, item: Item) -> ItemId {
        let id = item.id;
        let parent_idx = self.index_of(parent);
        self.insert_item_recursive(parent_idx, item);
        self.reindex();
        id
    }

    /// Remove an item and its whole subtree. Connectors touching any
    /// removed item are dropped with it.
    pub fn delete_item(&mut self, id: ItemId) {
        let Some(idx) = self.index_of(id) else {
            return;
        };
        let mut doomed = vec![idx];
        let mut queue = vec![idx];
        while let Some(current) = queue.pop() {
            for child in self.child_indices(current) {
                doomed.push(child);
                queue.push(child);
            }
        }
        let doomed_ids: HashSet<ItemId> = doomed.iter().map(|&i| self.graph[i].id).collect();
        self.connectors
            .retain(|c| !doomed_ids.contains(&c.source_item.item) && !doomed_ids.contains(&c.destination_item.item));
        self.selected_items.retain(|sid| !doomed_ids.contains(sid));
        for i in doomed {
            let removed = self.graph.remove_node(i);
            if let Some(item) = removed {
                self.id_index.remove(&item.id);
            }
        }
        self.reindex();
    }

    pub fn delete_selected_items(&mut self) {
        let selected = std::mem::take(&mut self.selected_items);
        for id in selected {
            self.delete_item(id);
        }
    }

    /// Pick a display name that is not in use yet: `Rect`, `Rect 2`, ...
    pub fn generate_unique_name(&self, base: &str) -> String {
        let names: HashSet<&str> = self.items_iter().map(|item| item.name.as_str()).collect();
        if !names.contains(base) {
            return base.to_string();
        }
        let mut i = 2;
        loop {
            let candidate = format!("{base} {i}");
            if !names.contains(candidate.as_str()) {
                return candidate;
            }
            i += 1;
        }
    }

    // ─── Selectors ───────────────────────────────────────────────────────

    /// Resolve a selector to zero or more elements. Supported forms:
    /// `self`, `#<id>` (item, then connector), `group: <name>`,
    /// `shape: <name>`. Unresolvable selectors yield an empty list — this
    /// runs on every pointer move and must never fail.
    pub fn find_elements_by_selector(&self, selector: &str, self_item: Option<ItemId>) -> Vec<Element> {
        let selector = selector.trim();
        if selector == "self" {
            return self_item
                .filter(|id| self.index_of(*id).is_some())
                .map(|id| vec![Element::Item(id)])
                .unwrap_or_default();
        }
        if let Some(id_str) = selector.strip_prefix('#') {
            let id = ItemId::intern(id_str);
            if self.index_of(id).is_some() {
                return vec![Element::Item(id)];
            }
            if self.connectors.iter().any(|c| c.id == id) {
                return vec![Element::Connector(id)];
            }
            return Vec::new();
        }
        if let Some(group) = selector.strip_prefix("group:") {
            return self
                .group_index
                .get(group.trim())
                .map(|ids| ids.iter().map(|&id| Element::Item(id)).collect())
                .unwrap_or_default();
        }
        if let Some(shape) = selector.strip_prefix("shape:") {
            let shape = shape.trim();
            let mut indices: Vec<NodeIndex> = self.graph.node_indices().collect();
            indices.sort();
            return indices
                .into_iter()
                .filter(|&idx| self.graph[idx].shape.name() == shape)
                .map(|idx| Element::Item(self.graph[idx].id))
                .collect();
        }
        Vec::new()
    }

    pub fn find_first_element_by_selector(&self, selector: &str, self_item: Option<ItemId>) -> Option<Element> {
        self.find_elements_by_selector(selector, self_item).into_iter().next()
    }

    pub fn find_connector_by_id(&self, id: ItemId) -> Option<&Connector> {
        self.connectors.iter().find(|c| c.id == id)
    }

    pub fn find_connector_by_id_mut(&mut self, id: ItemId) -> Option<&mut Connector> {
        self.connectors.iter_mut().find(|c| c.id == id)
    }

    // ─── Selection ───────────────────────────────────────────────────────

    /// Exclusive mode replaces the selection; inclusive mode toggles
    /// membership.
    pub fn select_item(&mut self, id: ItemId, inclusive: bool) {
        if self.index_of(id).is_none() {
            return;
        }
        if inclusive {
            if let Some(pos) = self.selected_items.iter().position(|&s| s == id) {
                self.selected_items.remove(pos);
                if let Some(item) = self.find_item_by_id_mut(id) {
                    item.meta.selected = false;
                }
            } else {
                self.add_to_selection(id);
            }
        } else {
            self.deselect_all_items();
            self.add_to_selection(id);
        }
    }

    fn add_to_selection(&mut self, id: ItemId) {
        if !self.selected_items.contains(&id) {
            self.selected_items.push(id);
            if let Some(item) = self.find_item_by_id_mut(id) {
                item.meta.selected = true;
            }
        }
    }

    pub fn deselect_all_items(&mut self) {
        let selected = std::mem::take(&mut self.selected_items);
        for id in selected {
            if let Some(item) = self.find_item_by_id_mut(id) {
                item.meta.selected = false;
            }
        }
    }

    pub fn select_connector(&mut self, id: ItemId) {
        self.deselect_all_connectors();
        if let Some(connector) = self.find_connector_by_id_mut(id) {
            connector.meta.selected = true;
        }
    }

    pub fn deselect_all_connectors(&mut self) {
        for connector in &mut self.connectors {
            connector.meta.selected = false;
        }
    }

    /// Box selection. Regular items are tested with their world anchor
    /// point against the world-space box; viewport-type overlay items with
    /// their raw area position against the screen-space box.
    pub fn select_by_boundary_box(&mut self, world_box: Area, screen_box: Area, inclusive: bool) {
        if !inclusive {
            self.deselect_all_items();
        }
        for id in self.all_item_ids() {
            let Some(item) = self.find_item_by_id(id) else {
                continue;
            };
            let inside = match item.area.kind {
                crate::geometry::AreaKind::Viewport => screen_box.contains(item.area.x, item.area.y),
                crate::geometry::AreaKind::Relative => {
                    let anchor = item.meta.transform.apply(Point::ZERO);
                    world_box.contains(anchor.x, anchor.y)
                }
            };
            if inside {
                self.add_to_selection(id);
            }
        }
    }

    pub fn set_active_boundary_box(&mut self, area: Option<Area>) {
        self.active_boundary_box = area;
    }

    // ─── Coordinate conversion ───────────────────────────────────────────

    /// Convert an item-local point to world space through the ancestor
    /// transform chain.
    pub fn world_point_on_item(&self, x: f32, y: f32, item: &Item) -> Point {
        item.meta.transform.apply(Point::new(x, y))
    }

    /// Exact inverse of [`world_point_on_item`](Self::world_point_on_item).
    pub fn local_point_on_item(&self, x: f32, y: f32, item: &Item) -> Point {
        item.meta.transform.apply_inverse(Point::new(x, y))
    }

    /// The area origin that would place the item's local `(0, 0)` at the
    /// given world point, in the item's current parent space.
    pub fn relative_point_for_item(&self, wx: f32, wy: f32, id: ItemId) -> Option<Point> {
        let idx = self.index_of(id)?;
        let parent_tf = self
            .parent_index(idx)
            .map(|p| self.graph[p].meta.transform)
            .unwrap_or(Transform::IDENTITY);
        let item = &self.graph[idx];
        let local_target = parent_tf.apply_inverse(Point::new(wx, wy));
        let desired = Transform {
            x: local_target.x,
            y: local_target.y,
            r: item.area.r,
        };
        Some(desired.area_origin(&item.area))
    }

    // ─── Transform reindexing ────────────────────────────────────────────

    /// Recompute derived state after structural or geometric changes:
    /// group index, world transforms, attachments, connector paths and the
    /// scheme boundary box.
    pub fn reindex(&mut self) {
        self.group_index.clear();
        for idx in self.graph.node_indices().collect::<Vec<_>>() {
            let item = &self.graph[idx];
            let id = item.id;
            for group in item.groups.clone() {
                self.group_index.entry(group).or_default().push(id);
            }
        }
        for ids in self.group_index.values_mut() {
            ids.sort();
        }

        for root in self.top_level_indices() {
            self.reindex_transforms_rec(root, Transform::IDENTITY, &[]);
        }

        let curve_ids: Vec<ItemId> = self
            .items_iter()
            .filter(|item| matches!(&item.shape, Shape::Curve(c) if c.connector))
            .map(|item| item.id)
            .collect();
        for id in curve_ids {
            self.readjust_item(id);
        }

        let connector_ids: Vec<ItemId> = self.connectors.iter().map(|c| c.id).collect();
        for id in connector_ids {
            self.build_connector(id);
        }

        self.recompute_boundary_box();
    }

    /// Recompute `meta.transform` for an item and all of its descendants.
    /// Invoked after any geometry edit — descendants never keep a transform
    /// older than their nearest ancestor edit.
    pub fn reindex_item_transforms(&mut self, id: ItemId) {
        let Some(idx) = self.index_of(id) else {
            return;
        };
        let (parent_tf, ancestors) = match self.parent_index(idx) {
            Some(parent) => {
                let p = &self.graph[parent];
                let mut chain = vec![p.id];
                chain.extend(p.meta.ancestor_ids.iter().copied());
                (p.meta.transform, chain)
            }
            None => (Transform::IDENTITY, Vec::new()),
        };
        self.reindex_transforms_rec(idx, parent_tf, &ancestors);
    }

    fn reindex_transforms_rec(&mut self, idx: NodeIndex, parent_tf: Transform, ancestors: &[ItemId]) {
        let id;
        {
            let item = &mut self.graph[idx];
            item.meta.transform = parent_tf.compose(&Transform::for_area(&item.area));
            item.meta.ancestor_ids = ancestors.to_vec();
            id = item.id;
        }
        let child_tf = self.graph[idx].meta.transform;
        let mut chain = vec![id];
        chain.extend_from_slice(ancestors);
        for child in self.child_indices(idx) {
            self.reindex_transforms_rec(child, child_tf, &chain);
        }
    }

    fn recompute_boundary_box(&mut self) {
        let mut min = Point::new(f32::MAX, f32::MAX);
        let mut max = Point::new(f32::MIN, f32::MIN);
        let mut any = false;
        for item in self.items_iter() {
            let corners = [
                Point::ZERO,
                Point::new(item.area.w, 0.0),
                Point::new(item.area.w, item.area.h),
                Point::new(0.0, item.area.h),
            ];
            for c in corners {
                let w = item.meta.transform.apply(c);
                min.x = min.x.min(w.x);
                min.y = min.y.min(w.y);
                max.x = max.x.max(w.x);
                max.y = max.y.max(w.y);
                any = true;
            }
        }
        self.boundary_box = if any {
            Area::new(min.x, min.y, max.x - min.x, max.y - min.y)
        } else {
            Area::new(0.0, 0.0, 100.0, 100.0)
        };
    }

    // ─── Reparenting ─────────────────────────────────────────────────────

    /// Move an item under a new parent, keeping its world-space position by
    /// recomputing the local area. Reparenting that would create a cycle is
    /// a silent no-op.
    pub fn remount_item_inside_other_item(&mut self, item_id: ItemId, new_parent_id: ItemId) {
        if item_id == new_parent_id || self.is_ancestor_of(item_id, new_parent_id) {
            return;
        }
        let (Some(idx), Some(parent_idx)) = (self.index_of(item_id), self.index_of(new_parent_id)) else {
            return;
        };
        let parent_world = self.graph[parent_idx].meta.transform;
        self.remount_with_parent_transform(idx, Some(parent_idx), parent_world);
    }

    /// Move an item to the scheme root, keeping its world-space position.
    pub fn remount_item_to_root(&mut self, item_id: ItemId) {
        let Some(idx) = self.index_of(item_id) else {
            return;
        };
        self.remount_with_parent_transform(idx, None, Transform::IDENTITY);
    }

    fn remount_with_parent_transform(
        &mut self,
        idx: NodeIndex,
        new_parent: Option<NodeIndex>,
        parent_world: Transform,
    ) {
        let item_world = self.graph[idx].meta.transform;
        let local = parent_world.inverse().compose(&item_world);
        {
            let item = &mut self.graph[idx];
            item.area.r = local.r;
            let origin = local.area_origin(&item.area);
            item.area.x = origin.x;
            item.area.y = origin.y;
        }
        if let Some(old_parent) = self.parent_index(idx)
            && let Some(edge) = self.graph.find_edge(old_parent, idx)
        {
            self.graph.remove_edge(edge);
        }
        if let Some(parent_idx) = new_parent {
            self.graph.add_edge(parent_idx, idx, ());
        }
        let id = self.graph[idx].id;
        self.reindex_item_transforms(id);
    }

    /// Among `candidates`, find the smallest-area item whose bounds fully
    /// contain `area` (all four corners tested in the candidate's local
    /// space). Ties keep the first encountered. The new item itself and its
    /// descendants are never candidates.
    pub fn find_item_suitable_for_parent(
        &self,
        candidates: &[ItemId],
        area: &Area,
        exclude: ItemId,
    ) -> Option<ItemId> {
        let corners = [
            Point::new(area.x, area.y),
            Point::new(area.x + area.w, area.y),
            Point::new(area.x + area.w, area.y + area.h),
            Point::new(area.x, area.y + area.h),
        ];
        let mut min_area = -1.0f32;
        let mut found = None;
        for &candidate_id in candidates {
            if candidate_id == exclude || self.is_ancestor_of(exclude, candidate_id) {
                continue;
            }
            let Some(item) = self.find_item_by_id(candidate_id) else {
                continue;
            };
            let fits = corners.iter().all(|corner| {
                let local = self.local_point_on_item(corner.x, corner.y, item);
                item.area.contains_local_point(local)
            });
            if fits {
                let candidate_area = item.area.w * item.area.h;
                if min_area < 0.0 || min_area > candidate_area {
                    found = Some(candidate_id);
                    min_area = candidate_area;
                }
            }
        }
        found
    }

    // ─── Outlines & hit testing ──────────────────────────────────────────

    /// The item's outline in world space.
    pub fn item_outline(&self, item: &Item) -> Option<Outline> {
        let (local_points, closed) = match &item.shape {
            Shape::Rect(_) | Shape::Text(_) | Shape::Component(_) | Shape::Overlay(_) => (
                vec![
                    Point::ZERO,
                    Point::new(item.area.w, 0.0),
                    Point::new(item.area.w, item.area.h),
                    Point::new(0.0, item.area.h),
                ],
                true,
            ),
            Shape::Ellipse(_) => {
                let rx = item.area.w / 2.0;
                let ry = item.area.h / 2.0;
                let points = (0..ELLIPSE_OUTLINE_SEGMENTS)
                    .map(|i| {
                        let angle = i as f32 / ELLIPSE_OUTLINE_SEGMENTS as f32 * std::f32::consts::TAU;
                        Point::new(rx + rx * angle.cos(), ry + ry * angle.sin())
                    })
                    .collect();
                (points, true)
            }
            Shape::Curve(props) => {
                let points = props.outline_points();
                if points.is_empty() {
                    return None;
                }
                (points, props.closed)
            }
        };
        let world = local_points
            .into_iter()
            .map(|p| item.meta.transform.apply(p))
            .collect();
        Some(Outline::new(world, closed))
    }

    fn is_effectively_visible(&self, item: &Item) -> bool {
        if !item.visible {
            return false;
        }
        item.meta
            .ancestor_ids
            .iter()
            .all(|&aid| self.find_item_by_id(aid).map(|a| a.visible).unwrap_or(true))
    }

    /// Scan candidate outlines for the nearest point within
    /// `threshold_distance` of `(x, y)`, skipping `exclude` and all of its
    /// descendants. Used for connector snapping.
    pub fn find_closest_point_to_items(
        &self,
        x: f32,
        y: f32,
        threshold_distance: f32,
        exclude: Option<ItemId>,
        only_visible: bool,
    ) -> Option<ClosestPointToItem> {
        let query = Point::new(x, y);
        let mut best: Option<ClosestPointToItem> = None;
        for id in self.all_item_ids() {
            let Some(item) = self.find_item_by_id(id) else {
                continue;
            };
            if let Some(ex) = exclude
                && (item.id == ex || item.meta.ancestor_ids.contains(&ex))
            {
                continue;
            }
            if only_visible && !self.is_effectively_visible(item) {
                continue;
            }
            let Some(outline) = self.item_outline(item) else {
                continue;
            };
            let Some(found) = outline.closest_point(query) else {
                continue;
            };
            if found.distance <= threshold_distance
                && best.map(|b| found.distance < b.distance).unwrap_or(true)
            {
                best = Some(ClosestPointToItem {
                    item_id: id,
                    point: found.point,
                    position: found.position,
                    distance: found.distance,
                });
            }
        }
        best
    }

    /// The topmost visible item containing the world point, children before
    /// their parents, later siblings before earlier ones.
    pub fn find_hovered_item(&self, x: f32, y: f32) -> Option<ItemId> {
        for idx in self.top_level_indices().into_iter().rev() {
            if let Some(found) = self.hovered_in_subtree(idx, x, y) {
                return Some(found);
            }
        }
        None
    }

    fn hovered_in_subtree(&self, idx: NodeIndex, x: f32, y: f32) -> Option<ItemId> {
        if !self.graph[idx].visible {
            return None;
        }
        for child in self.child_indices(idx).into_iter().rev() {
            if let Some(found) = self.hovered_in_subtree(child, x, y) {
                return Some(found);
            }
        }
        let item = &self.graph[idx];
        let local = self.local_point_on_item(x, y, item);
        if item.area.contains_local_point(local) {
            return Some(item.id);
        }
        None
    }

    /// Resize handles for the given item: four corners plus four edge
    /// midpoints, positioned in world space.
    pub fn provide_bounding_box_draggers(&self, item: &Item) -> Vec<Dragger> {
        let s = 5.0;
        let w = item.area.w;
        let h = item.area.h;
        let spots: [(f32, f32, SmallVec<[DragEdge; 2]>); 8] = [
            (0.0, 0.0, smallvec![DragEdge::Top, DragEdge::Left]),
            (w, 0.0, smallvec![DragEdge::Top, DragEdge::Right]),
            (w, h, smallvec![DragEdge::Bottom, DragEdge::Right]),
            (0.0, h, smallvec![DragEdge::Bottom, DragEdge::Left]),
            ((w / 2.0).floor(), 0.0, smallvec![DragEdge::Top]),
            ((w / 2.0).floor(), h, smallvec![DragEdge::Bottom]),
            (w, (h / 2.0).floor(), smallvec![DragEdge::Right]),
            (0.0, (h / 2.0).floor(), smallvec![DragEdge::Left]),
        ];
        spots
            .into_iter()
            .map(|(lx, ly, edges)| {
                let world = self.world_point_on_item(lx, ly, item);
                Dragger {
                    x: world.x,
                    y: world.y,
                    s,
                    edges,
                }
            })
            .collect()
    }

    // ─── Connectors ──────────────────────────────────────────────────────

    /// Recompute a connector's render path from the current endpoint
    /// outline positions and its reroute points. Idempotent: unchanged
    /// inputs produce an identical path.
    pub fn build_connector(&mut self, connector_id: ItemId) -> bool {
        let Some(ci) = self.connectors.iter().position(|c| c.id == connector_id) else {
            return false;
        };
        let source = self.connectors[ci].source_item;
        let destination = self.connectors[ci].destination_item;
        let Some(source_point) = self.attachment_point(source) else {
            return false;
        };
        let Some(destination_point) = self.attachment_point(destination) else {
            return false;
        };
        let connector = &mut self.connectors[ci];
        let mut path = Vec::with_capacity(connector.reroutes.len() + 2);
        path.push(source_point);
        path.extend(connector.reroutes.iter().copied());
        path.push(destination_point);
        connector.path = path;
        true
    }

    fn attachment_point(&self, end: ConnectorEnd) -> Option<Point> {
        let item = self.find_item_by_id(end.item)?;
        let outline = self.item_outline(item)?;
        outline.point_at_position(end.position)
    }

    /// Create a connector between two items, attached at the outline points
    /// facing the other item's center.
    pub fn connect_items(&mut self, source_id: ItemId, destination_id: ItemId) -> Option<ItemId> {
        if source_id == destination_id {
            return None;
        }
        let source = self.find_item_by_id(source_id)?;
        let destination = self.find_item_by_id(destination_id)?;
        let source_outline = self.item_outline(source)?;
        let destination_outline = self.item_outline(destination)?;
        let source_center =
            self.world_point_on_item(source.area.w / 2.0, source.area.h / 2.0, source);
        let destination_center = self.world_point_on_item(
            destination.area.w / 2.0,
            destination.area.h / 2.0,
            destination,
        );
        let source_attach = source_outline.closest_point(destination_center)?;
        let destination_attach = destination_outline.closest_point(source_center)?;

        let id = ItemId::unique("connector");
        let connector = Connector::new(
            id,
            ConnectorEnd {
                item: source_id,
                position: source_attach.position,
            },
            ConnectorEnd {
                item: destination_id,
                position: destination_attach.position,
            },
        );
        self.connectors.push(connector);
        self.build_connector(id);
        Some(id)
    }

    /// Insert a reroute point on the path segment nearest to `(x, y)`.
    /// Returns the new reroute's index.
    pub fn add_reroute(&mut self, x: f32, y: f32, connector_id: ItemId) -> Option<usize> {
        self.build_connector(connector_id);
        let ci = self.connectors.iter().position(|c| c.id == connector_id)?;
        let p = Point::new(x, y);
        let path = &self.connectors[ci].path;
        if path.len() < 2 {
            return None;
        }
        let mut best_segment = 0;
        let mut best_distance = f32::MAX;
        for i in 0..path.len() - 1 {
            let (candidate, _) = crate::geometry::closest_point_on_segment(path[i], path[i + 1], p);
            let d = candidate.distance_to(p);
            if d < best_distance {
                best_distance = d;
                best_segment = i;
            }
        }
        let connector = &mut self.connectors[ci];
        let index = best_segment.min(connector.reroutes.len());
        connector.reroutes.insert(index, p);
        self.build_connector(connector_id);
        Some(index)
    }

    /// Re-derive geometry on `id` that depends on other items: a connector
    /// curve's edge points snap back onto their attached outlines.
    pub fn readjust_item(&mut self, id: ItemId) {
        let Some(item) = self.find_item_by_id(id) else {
            return;
        };
        let Shape::Curve(props) = &item.shape else {
            return;
        };
        if !props.connector || props.points.is_empty() {
            return;
        }
        let transform = item.meta.transform;
        let source_world = props
            .source_item
            .as_deref()
            .and_then(|sel| self.attached_outline_point(sel, props.source_item_position));
        let destination_world = props
            .destination_item
            .as_deref()
            .and_then(|sel| self.attached_outline_point(sel, props.destination_item_position));

        let Some(item) = self.find_item_by_id_mut(id) else {
            return;
        };
        let Shape::Curve(props) = &mut item.shape else {
            return;
        };
        if let Some(world) = source_world {
            let local = transform.apply_inverse(world);
            if let Some(first) = props.points.first_mut() {
                first.set_pos(local);
            }
        }
        if let Some(world) = destination_world {
            let local = transform.apply_inverse(world);
            if let Some(last) = props.points.last_mut() {
                last.set_pos(local);
            }
        }
    }

    fn attached_outline_point(&self, selector: &str, position: f32) -> Option<Point> {
        let element = self.find_first_element_by_selector(selector, None)?;
        let Element::Item(attached_id) = element else {
            return None;
        };
        let attached = self.find_item_by_id(attached_id)?;
        self.item_outline(attached)?.point_at_position(position)
    }

    /// After an item's geometry changed, rebuild everything that tracks it:
    /// scheme connectors touching the item and connector curves attached to
    /// it. Returns the ids of every rebuilt element so the caller can emit
    /// redraw notifications.
    pub fn rebuild_dependants(&mut self, id: ItemId) -> Vec<ItemId> {
        let mut rebuilt = Vec::new();
        let connector_ids: Vec<ItemId> = self
            .connectors
            .iter()
            .filter(|c| c.touches(id))
            .map(|c| c.id)
            .collect();
        for cid in connector_ids {
            if self.build_connector(cid) {
                rebuilt.push(cid);
            }
        }

        let id_selector = format!("#{id}");
        let attached_curves: Vec<ItemId> = self
            .items_iter()
            .filter(|item| match &item.shape {
                Shape::Curve(c) if c.connector => {
                    c.source_item.as_deref() == Some(id_selector.as_str())
                        || c.destination_item.as_deref() == Some(id_selector.as_str())
                }
                _ => false,
            })
            .map(|item| item.id)
            .collect();
        for curve_id in attached_curves {
            self.readjust_item(curve_id);
            rebuilt.push(curve_id);
        }
        rebuilt
    }
}
