use std::collections::{BTreeMap, HashMap};

use rand::rngs::StdRng;

use crate::device::{Detached, Device, UpdateContext};
use crate::error::{CoreError, CoreResult};
use crate::event::EventLog;
use crate::geometry::Pose;
use crate::id::ModelId;
use crate::matrix::{Region, SpatialIndex};
use crate::model::{Model, ModelKind};

/// Owns every model of a world, indexed by id and by name.
///
/// The id index owns the models and iterates in creation order. The name
/// index is a secondary lookup; names are only required to be unique among
/// siblings, so one name may map to several models in different scopes.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: BTreeMap<ModelId, Model>,
    by_name: HashMap<String, Vec<ModelId>>,
    roots: Vec<ModelId>,
    next_id: u32,
}

impl ModelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Create / destroy
    // -----------------------------------------------------------------------

    /// Register a new model with a fresh id and attach it to its parent.
    ///
    /// Fails with [`CoreError::DuplicateName`] if a sibling already uses
    /// `name`, and with [`CoreError::ParentNotFound`] for an unknown parent.
    pub fn create(
        &mut self,
        parent: Option<ModelId>,
        name: &str,
        device: Box<dyn Device>,
    ) -> CoreResult<ModelId> {
        if let Some(p) = parent.filter(|p| !self.models.contains_key(p)) {
            return Err(CoreError::ParentNotFound(p));
        }
        if self.name_taken(parent, name) {
            let scope = parent
                .and_then(|p| self.models.get(&p))
                .map(|m| m.name().to_string())
                .unwrap_or_else(|| "world".to_string());
            return Err(CoreError::DuplicateName {
                name: name.to_string(),
                scope,
            });
        }

        let id = ModelId(self.next_id);
        self.next_id += 1;

        match parent.and_then(|p| self.models.get_mut(&p)) {
            Some(parent_model) => parent_model.add_child(id),
            None => self.roots.push(id),
        }
        self.by_name.entry(name.to_string()).or_default().push(id);
        self.models
            .insert(id, Model::new(id, name.to_string(), parent, device));
        tracing::debug!(model = %id, name, "model registered");
        Ok(id)
    }

    /// Return `true` if a child of `parent` (or a top-level model when
    /// `parent` is `None`) is already called `name`.
    pub fn name_taken(&self, parent: Option<ModelId>, name: &str) -> bool {
        let siblings = match parent {
            Some(p) => match self.models.get(&p) {
                Some(model) => model.children(),
                None => return false,
            },
            None => self.roots.as_slice(),
        };
        siblings
            .iter()
            .filter_map(|id| self.models.get(id))
            .any(|m| m.name() == name)
    }

    /// Remove a model and its whole subtree, releasing their occupancy.
    /// Returns the removed ids, parent first.
    pub fn destroy(&mut self, id: ModelId, matrix: &mut SpatialIndex) -> CoreResult<Vec<ModelId>> {
        let parent = self
            .models
            .get(&id)
            .ok_or(CoreError::ModelNotFound(id))?
            .parent();

        match parent.and_then(|p| self.models.get_mut(&p)) {
            Some(parent_model) => parent_model.remove_child(id),
            None => self.roots.retain(|r| *r != id),
        }

        let removed = self.subtree(id);
        for mid in &removed {
            if let Some(model) = self.models.remove(mid) {
                if let Some(region) = model.footprint() {
                    matrix.clear_occupied(&region, *mid);
                }
                if let Some(ids) = self.by_name.get_mut(model.name()) {
                    ids.retain(|other| other != mid);
                    if ids.is_empty() {
                        self.by_name.remove(model.name());
                    }
                }
            }
        }
        tracing::debug!(model = %id, count = removed.len(), "model subtree destroyed");
        Ok(removed)
    }

    /// Remove every model.
    pub fn clear(&mut self, matrix: &mut SpatialIndex) {
        for root in self.roots.clone() {
            // Roots come from our own index, so destroy cannot miss.
            let _ = self.destroy(root, matrix);
        }
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// Get a model by id.
    pub fn lookup_by_id(&self, id: ModelId) -> Option<&Model> {
        self.models.get(&id)
    }

    /// Get a model by name. When several scopes use the name, the earliest
    /// created model wins.
    pub fn lookup_by_name(&self, name: &str) -> Option<&Model> {
        self.find_id_by_name(name)
            .and_then(|id| self.models.get(&id))
    }

    /// Find a model id by name.
    pub fn find_id_by_name(&self, name: &str) -> Option<ModelId> {
        self.by_name.get(name).and_then(|ids| ids.first()).copied()
    }

    /// Get a mutable reference to a model by id.
    pub fn get_mut(&mut self, id: ModelId) -> Option<&mut Model> {
        self.models.get_mut(&id)
    }

    /// Return `true` if the id is live.
    pub fn contains(&self, id: ModelId) -> bool {
        self.models.contains_key(&id)
    }

    /// Apply `f` to every live model. Callers must not rely on the order.
    pub fn for_each(&self, mut f: impl FnMut(&Model)) {
        for model in self.models.values() {
            f(model);
        }
    }

    /// Iterate over every live model.
    pub fn iter(&self) -> impl Iterator<Item = &Model> {
        self.models.values()
    }

    /// Ids of every live model, in registry order.
    pub fn ids(&self) -> Vec<ModelId> {
        self.models.keys().copied().collect()
    }

    /// Ids of live models of one kind.
    pub fn ids_of_kind(&self, kind: ModelKind) -> Vec<ModelId> {
        self.models
            .values()
            .filter(|m| m.kind() == kind)
            .map(|m| m.id())
            .collect()
    }

    /// Top-level models, in creation order.
    pub fn roots(&self) -> &[ModelId] {
        &self.roots
    }

    /// Number of live models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Return `true` if no models are registered.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    // -----------------------------------------------------------------------
    // Hierarchy
    // -----------------------------------------------------------------------

    /// The model and all its transitive children, parents before children.
    pub fn subtree(&self, id: ModelId) -> Vec<ModelId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(model) = self.models.get(&current) {
                out.push(current);
                stack.extend(model.children().iter().rev());
            }
        }
        out
    }

    /// The top-level ancestor of a model.
    pub fn root_of(&self, id: ModelId) -> Option<ModelId> {
        let mut current = self.models.get(&id)?;
        while let Some(parent) = current.parent().and_then(|p| self.models.get(&p)) {
            current = parent;
        }
        Some(current.id())
    }

    /// Return `true` if both models belong to the same ownership tree.
    pub fn is_related(&self, a: ModelId, b: ModelId) -> bool {
        match (self.root_of(a), self.root_of(b)) {
            (Some(ra), Some(rb)) => ra == rb,
            _ => false,
        }
    }

    /// Pose of a model in world coordinates.
    pub fn global_pose(&self, id: ModelId) -> Option<Pose> {
        let model = self.models.get(&id)?;
        match model.parent() {
            Some(parent) => Some(self.global_pose(parent)?.compose(&model.pose)),
            None => Some(model.pose),
        }
    }

    /// Rewrite the occupancy of a model and its subtree from their current poses.
    pub fn refresh_occupancy(&mut self, id: ModelId, matrix: &mut SpatialIndex) {
        for mid in self.subtree(id) {
            let desired = self.models.get(&mid).and_then(|m| {
                m.obstacle_return.then(|| Region::Rect {
                    pose: self.global_pose(mid).unwrap_or_default(),
                    size: m.size,
                })
            });
            if let Some(model) = self.models.get_mut(&mid) {
                if model.footprint == desired {
                    continue;
                }
                if let Some(old) = model.footprint.take() {
                    matrix.clear_occupied(&old, mid);
                }
                if let Some(new) = desired {
                    matrix.set_occupied(&new, mid);
                }
                model.footprint = desired;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Update dispatch
    // -----------------------------------------------------------------------

    /// Run one model's device update.
    ///
    /// The device is detached from its slot for the duration of the call and
    /// restored afterwards, whatever the outcome.
    pub fn update_model(
        &mut self,
        id: ModelId,
        time: u64,
        matrix: &mut SpatialIndex,
        rng: &mut StdRng,
        events: &mut EventLog,
    ) -> CoreResult<()> {
        let model = self.models.get_mut(&id).ok_or(CoreError::ModelNotFound(id))?;
        let placeholder = Box::new(Detached(model.kind()));
        let mut device = std::mem::replace(&mut model.device, placeholder);

        let mut ctx = UpdateContext {
            model: id,
            time,
            registry: self,
            matrix,
            rng,
            events,
        };
        let result = device.update(&mut ctx);

        if let Some(model) = self.models.get_mut(&id) {
            model.device = device;
            model.mark_updated(time);
        }
        result
    }
}
