//! Entity content of a single octree node.

use super::entity::{Entity, EntityProperties};
use super::octree::SpatialElement;
use crate::codec::{read_entities, write_entities, CountedRead};
use crate::types::{AABox, CreatorToken, EntityId, EntityKey, Vec3};
use crate::utils::usec_timestamp_now;
use bytes::BufMut;

/// Result of offering a server-sourced copy to an existing entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The incoming copy replaced the local properties
    Overwritten,
    /// Both local timestamps were at least as new; nothing changed
    IgnoredStale,
}

/// Returns true if `incoming` should replace `local`.
///
/// Either timestamp being strictly newer is enough. Applying the same copy a
/// second time is therefore a no-op.
pub fn should_overwrite(local: &Entity, incoming: &Entity) -> bool {
    local.last_edited < incoming.last_edited || local.last_updated < incoming.last_updated
}

/// The entities whose positions fall inside one node's box.
#[derive(Debug, Clone)]
pub struct EntityTreeElement {
    bounds: AABox,
    entities: Vec<Entity>,
    last_changed: u64,
}

impl EntityTreeElement {
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    fn index_of(&self, key: EntityKey) -> Option<usize> {
        self.entities.iter().position(|entity| entity.matches(key))
    }

    pub fn find(&self, key: EntityKey) -> Option<&Entity> {
        self.index_of(key).map(|index| &self.entities[index])
    }

    fn touch(&mut self) {
        self.last_changed = usec_timestamp_now();
    }

    /// Applies a server-sourced copy to the entity with the same id, if this
    /// element holds it.
    pub fn merge_server_edit(&mut self, incoming: &Entity) -> Option<MergeOutcome> {
        let id = incoming.id()?;
        let index = self.index_of(EntityKey::Known(id))?;

        let local = &mut self.entities[index];
        if !should_overwrite(local, incoming) {
            return Some(MergeOutcome::IgnoredStale);
        }
        local.copy_changed_properties(incoming);
        self.touch();
        Some(MergeOutcome::Overwritten)
    }

    /// Applies a local editor's partial update. Returns the edited entity.
    pub fn apply_local_edit(&mut self, key: EntityKey, properties: &EntityProperties) -> Option<&Entity> {
        let index = self.index_of(key)?;
        self.entities[index].apply_properties(properties);
        self.touch();
        Some(&self.entities[index])
    }

    /// Records `id` on the entity created with `token`.
    pub fn confirm_token(&mut self, token: CreatorToken, id: EntityId) -> bool {
        let Some(index) = self.index_of(EntityKey::Pending(token)) else {
            return false;
        };
        self.entities[index].confirm(id);
        self.touch();
        true
    }

    /// Removes and returns the entity matching `key`.
    pub fn take(&mut self, key: EntityKey) -> Option<Entity> {
        let index = self.index_of(key)?;
        self.touch();
        Some(self.entities.remove(index))
    }

    /// Removes a server echo of `id`: a copy that never carried a creator
    /// token on this peer.
    pub fn take_server_echo(&mut self, id: EntityId) -> Option<Entity> {
        let index = self
            .entities
            .iter()
            .position(|entity| entity.id() == Some(id) && entity.is_server_echo())?;
        self.touch();
        Some(self.entities.remove(index))
    }

    /// Collects entities whose sphere overlaps the sphere at `center`.
    pub fn entities_in_sphere<'a>(&'a self, center: Vec3, radius: f32, found: &mut Vec<&'a Entity>) {
        found.extend(
            self.entities
                .iter()
                .filter(|entity| entity.position.distance(center) < radius + entity.radius),
        );
    }

    /// Entity whose center is nearest `position`, with its distance.
    pub fn closest(&self, position: Vec3) -> Option<(&Entity, f32)> {
        self.entities
            .iter()
            .map(|entity| (entity, entity.position.distance(position)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Collects entities whose bounding cube touches `region`.
    pub fn entities_touching<'a>(&'a self, region: &AABox, found: &mut Vec<&'a Entity>) {
        found.extend(
            self.entities
                .iter()
                .filter(|entity| entity.bounding_box().touches(region)),
        );
    }
}

impl SpatialElement for EntityTreeElement {
    type Item = Entity;

    fn new(bounds: AABox) -> Self {
        Self {
            bounds,
            entities: Vec::new(),
            last_changed: 0,
        }
    }

    fn bounds(&self) -> AABox {
        self.bounds
    }

    fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn len(&self) -> usize {
        self.entities.len()
    }

    fn insert(&mut self, entity: Entity) {
        self.entities.push(entity);
        self.touch();
    }

    fn sweep(&mut self, now: u64, delta_seconds: f32, relocated: &mut Vec<Entity>) {
        let before = relocated.len();
        let mut moved = false;

        let mut index = 0;
        while index < self.entities.len() {
            let entity = &mut self.entities[index];
            let was_moving = entity.velocity != Vec3::ZERO;
            entity.simulate(now, delta_seconds);
            moved |= was_moving;

            if entity.should_die || !self.bounds.contains(entity.position) {
                relocated.push(self.entities.swap_remove(index));
            } else {
                index += 1;
            }
        }

        if moved || relocated.len() > before {
            self.last_changed = now;
        }
    }

    fn encode<B: BufMut>(&self, out: &mut B) {
        write_entities(self.entities.iter(), out);
    }

    fn decode(data: &[u8]) -> CountedRead<Entity> {
        read_entities(data)
    }

    fn last_changed(&self) -> u64 {
        self.last_changed
    }
}
