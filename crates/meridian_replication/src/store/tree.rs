//! The entity tree: placement, merge protocol, spatial queries and inbound
//! packet handling on top of the arena octree.

use super::element::{EntityTreeElement, MergeOutcome};
use super::entity::{Entity, EntityProperties, Identity};
use super::octree::{NodeId, Octree, SpatialElement};
use super::StoreError;
use crate::codec::{
    read_add_response, read_edit_records, read_entity_data, read_erase_payload, read_octal_code,
    write_entities, write_octal_code, CodecError, PacketHeader, PacketType, HEADER_SIZE,
    MAX_ENTITY_RUN,
};
use crate::config::{TreeConfig, TreeRole};
use crate::types::{AABox, CreatorToken, EntityId, EntityKey, Vec3, MAX_OCTAL_DEPTH};
use crate::utils::usec_timestamp_now;
use bytes::BufMut;
use tracing::{debug, trace, warn};

/// What happened to one entity offered to [`EntityTree::merge_or_store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Created,
    Merged(MergeOutcome),
    /// Position outside the world cube; the entity was dropped
    OutOfBounds,
}

/// Counters from one [`EntityTree::sweep`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub simulated: usize,
    /// Survivors moved to a different node
    pub relocated: usize,
    /// Entities discarded because they should die
    pub died: usize,
    /// Entities that left the world cube and were discarded
    pub escaped: usize,
}

/// Result of applying one inbound packet.
#[derive(Debug, Clone, PartialEq)]
pub struct PacketSummary {
    pub header: PacketHeader,
    pub created: usize,
    pub overwritten: usize,
    pub ignored_stale: usize,
    pub removed: usize,
    pub confirmed: usize,
    /// Ids handed out to token-only entities, to be reported to their creators
    pub assigned: Vec<(CreatorToken, EntityId)>,
    /// Bytes consumed, header included
    pub bytes_read: usize,
    /// The payload ended before everything it announced could be decoded
    pub truncated: bool,
}

impl PacketSummary {
    fn new(header: PacketHeader) -> Self {
        Self {
            header,
            created: 0,
            overwritten: 0,
            ignored_stale: 0,
            removed: 0,
            confirmed: 0,
            assigned: Vec::new(),
            bytes_read: HEADER_SIZE,
            truncated: false,
        }
    }

    fn count(&mut self, applied: Applied) {
        match applied {
            Applied::Created => self.created += 1,
            Applied::Merged(MergeOutcome::Overwritten) => self.overwritten += 1,
            Applied::Merged(MergeOutcome::IgnoredStale) => self.ignored_stale += 1,
            Applied::OutOfBounds => {}
        }
    }
}

/// Result of [`EntityTree::decode`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeDecode {
    pub elements: usize,
    pub entities: usize,
    pub bytes_read: usize,
    pub truncated: bool,
}

/// Sparse octree of entities.
#[derive(Debug)]
pub struct EntityTree {
    octree: Octree<EntityTreeElement>,
    config: TreeConfig,
    next_id: u32,
    last_changed: u64,
}

impl EntityTree {
    /// Creates an empty tree. `max_depth` is capped at the deepest address
    /// the wire format can carry.
    pub fn new(mut config: TreeConfig) -> Self {
        if config.max_depth > MAX_OCTAL_DEPTH {
            warn!(
                max_depth = config.max_depth,
                cap = MAX_OCTAL_DEPTH,
                "Tree depth exceeds the octal code limit, capping"
            );
            config.max_depth = MAX_OCTAL_DEPTH;
        }
        Self {
            octree: Octree::new(config.root_scale),
            config,
            next_id: 1,
            last_changed: 0,
        }
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn root_bounds(&self) -> AABox {
        self.octree.root_bounds()
    }

    pub fn node_count(&self) -> usize {
        self.octree.node_count()
    }

    pub fn entity_count(&self) -> usize {
        self.octree.elements().map(|(_, element)| element.len()).sum()
    }

    /// Every entity in the tree, in no particular order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.octree
            .elements()
            .flat_map(|(_, element)| element.entities().iter())
    }

    pub fn last_changed(&self) -> u64 {
        self.last_changed
    }

    pub fn changed_since(&self, timestamp: u64) -> bool {
        self.last_changed > timestamp
    }

    fn touch(&mut self) {
        self.last_changed = self.last_changed.max(usec_timestamp_now());
    }

    fn allocate_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    fn note_id(&mut self, entity: &Entity) {
        if let Some(EntityId(id)) = entity.id() {
            if id >= self.next_id {
                self.next_id = id.saturating_add(1);
            }
        }
    }

    fn locate(&self, key: EntityKey) -> Option<NodeId> {
        self.octree
            .elements()
            .find(|(_, element)| element.find(key).is_some())
            .map(|(id, _)| id)
    }

    /// Inserts without a uniqueness check. Returns false, dropping the
    /// entity, if its position lies outside the world cube.
    pub fn store(&mut self, entity: Entity) -> bool {
        if !self.root_bounds().contains(entity.position) {
            debug!(key = %entity.key(), position = ?entity.position, "Dropping entity outside world bounds");
            return false;
        }
        let node = self
            .octree
            .node_for(entity.position, entity.radius * 2.0, self.config.max_depth);
        self.note_id(&entity);
        if let Some(element) = self.octree.element_mut(node) {
            element.insert(entity);
        }
        self.touch();
        true
    }

    pub fn find_by_key(&self, key: EntityKey) -> Option<&Entity> {
        self.octree
            .elements()
            .find_map(|(_, element)| element.find(key))
    }

    /// Moves the entity named by `key` out of `node` if its position no
    /// longer falls inside the node's box. Returns false if the entity left
    /// the world and was dropped.
    fn rehome(&mut self, node: NodeId, key: EntityKey) -> bool {
        let Some(element) = self.octree.element_mut(node) else {
            return true;
        };
        let misplaced = element
            .find(key)
            .is_some_and(|entity| !element.contains(entity.position));
        match misplaced.then(|| element.take(key)).flatten() {
            Some(entity) => self.store(entity),
            None => true,
        }
    }

    /// Applies a server-sourced copy to the stored entity with the same id
    /// using the timestamp merge rule.
    pub fn upsert_by_server_edit(&mut self, incoming: &Entity) -> Result<MergeOutcome, StoreError> {
        let key = incoming.key();
        let Some(id) = incoming.id() else {
            return Err(StoreError::EntityNotFound(key));
        };
        let node = self.locate(key).ok_or(StoreError::EntityNotFound(key))?;
        let outcome = self
            .octree
            .element_mut(node)
            .and_then(|element| element.merge_server_edit(incoming))
            .ok_or(StoreError::EntityNotFound(key))?;

        if outcome == MergeOutcome::Overwritten {
            self.note_id(incoming);
            if !self.rehome(node, EntityKey::Known(id)) {
                debug!(%key, "Server edit moved entity outside the world");
            }
            self.touch();
        } else {
            trace!(%key, "Ignoring stale server edit");
        }
        Ok(outcome)
    }

    /// Server-sourced copy: merged if the id is known, stored otherwise.
    pub fn merge_or_store(&mut self, entity: Entity) -> Applied {
        match self.upsert_by_server_edit(&entity) {
            Ok(outcome) => Applied::Merged(outcome),
            Err(StoreError::EntityNotFound(_)) => {
                if self.store(entity) {
                    Applied::Created
                } else {
                    Applied::OutOfBounds
                }
            }
            Err(StoreError::OutsideWorld(_)) => Applied::OutOfBounds,
        }
    }

    /// Applies a local editor's change unconditionally and returns the
    /// updated entity, ready to be sent on. An edit that moves the entity
    /// outside the world removes it and returns [`StoreError::OutsideWorld`].
    pub fn upsert_by_local_edit(
        &mut self,
        key: EntityKey,
        properties: &EntityProperties,
    ) -> Result<Entity, StoreError> {
        let node = self.locate(key).ok_or(StoreError::EntityNotFound(key))?;
        let edited = self
            .octree
            .element_mut(node)
            .and_then(|element| element.apply_local_edit(key, properties))
            .cloned()
            .ok_or(StoreError::EntityNotFound(key))?;
        let kept = self.rehome(node, key);
        self.touch();
        if !kept {
            warn!(%key, position = ?edited.position, "Local edit moved entity outside the world, removed");
            return Err(StoreError::OutsideWorld(key));
        }
        Ok(edited)
    }

    /// Confirms the entity created with `token` as `id`. A server echo of
    /// `id` received before the confirmation is folded into the confirmed
    /// copy and removed.
    pub fn reconcile_creator_token(&mut self, token: CreatorToken, id: EntityId) -> bool {
        let pending = EntityKey::Pending(token);
        let Some(node) = self.locate(pending) else {
            trace!(%token, %id, "No entity for confirmed creator token");
            return false;
        };

        let echo = self
            .octree
            .node_ids()
            .into_iter()
            .find_map(|candidate| self.octree.element_mut(candidate)?.take_server_echo(id));

        let Some(element) = self.octree.element_mut(node) else {
            return false;
        };
        element.confirm_token(token, id);
        if let Some(echo) = echo {
            debug!(%token, %id, "Folding early server echo into confirmed entity");
            element.merge_server_edit(&echo);
        }

        if let Some(confirmed) = self.find_by_key(pending).cloned() {
            self.note_id(&confirmed);
        }
        self.rehome(node, pending);
        self.touch();
        true
    }

    /// Removes the entity with `id`. Returns false if there is none.
    pub fn remove_by_id(&mut self, id: EntityId) -> bool {
        let key = EntityKey::Known(id);
        let Some(node) = self.locate(key) else {
            trace!(%id, "Remove of unknown entity");
            return false;
        };
        let removed = self
            .octree
            .element_mut(node)
            .and_then(|element| element.take(key))
            .is_some();
        if removed {
            self.touch();
        }
        removed
    }

    /// Entities whose sphere overlaps the sphere at `center`.
    pub fn query_sphere(&self, center: Vec3, radius: f32) -> Vec<&Entity> {
        let mut found = Vec::new();
        for (_, element) in self.octree.elements() {
            element.entities_in_sphere(center, radius, &mut found);
        }
        found
    }

    /// Entity whose center is nearest `position`.
    pub fn closest(&self, position: Vec3) -> Option<&Entity> {
        self.octree
            .elements()
            .filter_map(|(_, element)| element.closest(position))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(entity, _)| entity)
    }

    /// Keys of the entities whose bounding cube touches `region`.
    pub fn for_bounding_box(&self, region: &AABox) -> Vec<EntityKey> {
        let mut found = Vec::new();
        for (_, element) in self.octree.elements() {
            element.entities_touching(region, &mut found);
        }
        found.into_iter().map(Entity::key).collect()
    }

    /// Simulates every entity by `delta_seconds`, re-homes the ones that left
    /// their node and drops the dead.
    pub fn sweep(&mut self, now: u64, delta_seconds: f32) -> SweepReport {
        let mut report = SweepReport::default();
        let mut relocated = Vec::new();

        for node in self.octree.node_ids() {
            if let Some(element) = self.octree.element_mut(node) {
                report.simulated += element.len();
                element.sweep(now, delta_seconds, &mut relocated);
                self.last_changed = self.last_changed.max(element.last_changed());
            }
        }

        for entity in relocated {
            if entity.should_die {
                trace!(key = %entity.key(), "Entity died");
                report.died += 1;
            } else if self.store(entity) {
                report.relocated += 1;
            } else {
                report.escaped += 1;
            }
        }
        report
    }

    pub fn collapse_empty_leaves(&mut self) -> usize {
        self.octree.collapse_empty_leaves()
    }

    /// Writes every non-empty element as octal code plus element encoding,
    /// preceded by a `u32` run count. An element holding more entities than
    /// one counted run allows is written as several runs under the same code.
    pub fn encode<B: BufMut>(&self, out: &mut B) {
        let runs: Vec<_> = self
            .octree
            .elements()
            .filter_map(|(node, element)| Some((self.octree.code(node)?, element.entities())))
            .flat_map(|(code, entities)| entities.chunks(MAX_ENTITY_RUN).map(move |run| (code, run)))
            .collect();
        out.put_u32(runs.len() as u32);
        for (code, run) in runs {
            write_octal_code(code, out);
            write_entities(run.iter(), out);
        }
    }

    /// Reads the output of [`EntityTree::encode`], merging every entity into
    /// this tree. Stops at the first malformed element.
    pub fn decode(&mut self, data: &[u8]) -> TreeDecode {
        let mut report = TreeDecode::default();
        if data.len() < 4 {
            report.truncated = true;
            return report;
        }
        let count = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        report.bytes_read = 4;

        for _ in 0..count {
            let rest = &data[report.bytes_read..];
            let Ok((_, code_len)) = read_octal_code(rest) else {
                report.truncated = true;
                break;
            };
            let read = EntityTreeElement::decode(&rest[code_len..]);
            report.bytes_read += code_len + read.bytes_read;
            report.entities += read.items.len();
            for entity in read.items {
                self.merge_or_store(entity);
            }
            if read.truncated {
                report.truncated = true;
                break;
            }
            report.elements += 1;
        }
        report
    }

    /// Decodes an inbound packet and applies it to the tree.
    ///
    /// Only an unreadable header is an error; a malformed payload is applied
    /// as far as it decodes and reported through the summary.
    pub fn process_packet(&mut self, data: &[u8]) -> Result<PacketSummary, CodecError> {
        let (header, payload) = PacketHeader::read(data)?;
        let mut summary = PacketSummary::new(header);

        match header.packet_type {
            PacketType::AddEntity | PacketType::EditEntity => {
                let read = read_edit_records(payload);
                summary.bytes_read += read.bytes_read;
                summary.truncated = read.truncated;
                for record in read.items {
                    self.apply_inbound_edit(record.entity, &mut summary);
                }
            }
            PacketType::EntityData => match read_entity_data(payload) {
                Ok((_, read)) => {
                    summary.bytes_read += read.bytes_read;
                    summary.truncated = read.truncated;
                    for entity in read.items {
                        let applied = self.merge_or_store(entity);
                        summary.count(applied);
                    }
                }
                Err(error) => {
                    debug!(%error, "Unreadable entity data payload");
                    summary.truncated = true;
                }
            },
            PacketType::EraseEntities => {
                let read = read_erase_payload(payload);
                summary.bytes_read += read.bytes_read;
                summary.truncated = read.truncated;
                for id in read.items {
                    if self.remove_by_id(id) {
                        summary.removed += 1;
                    }
                }
            }
            PacketType::AddEntityResponse => match read_add_response(payload) {
                Ok((token, id)) => {
                    summary.bytes_read += 8;
                    if self.reconcile_creator_token(token, id) {
                        summary.confirmed += 1;
                    }
                }
                Err(error) => {
                    debug!(%error, "Unreadable add-entity response");
                    summary.truncated = true;
                }
            },
        }

        if summary.truncated {
            debug!(
                packet_type = ?header.packet_type,
                sequence = header.sequence,
                bytes_read = summary.bytes_read,
                total = data.len(),
                "Discarding malformed packet tail"
            );
        }
        Ok(summary)
    }

    fn apply_inbound_edit(&mut self, mut entity: Entity, summary: &mut PacketSummary) {
        if let (Identity::Pending(token), TreeRole::Authority) = (entity.identity(), self.config.role) {
            let id = self.allocate_id();
            entity.confirm(id);
            if self.store(entity) {
                debug!(%token, %id, "Assigned id to new entity");
                summary.created += 1;
                summary.assigned.push((token, id));
            }
            return;
        }

        let applied = self.merge_or_store(entity);
        summary.count(applied);
    }
}
