//! Entities held by the octree and the partial updates local editors apply.

use crate::types::{AABox, CreatorToken, EntityId, EntityKey, Vec3};
use crate::utils::usec_timestamp_now;
use serde::{Deserialize, Serialize};

/// How an entity is identified on this peer.
///
/// Once a server confirms a locally created entity the token is kept next to
/// the id so late packets that still reference it can be recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    Pending(CreatorToken),
    Confirmed {
        id: EntityId,
        token: Option<CreatorToken>,
    },
}

/// A replicated world object.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    identity: Identity,
    pub position: Vec3,
    pub velocity: Vec3,
    pub radius: f32,
    pub color: [u8; 3],
    /// Orientation quaternion as `[x, y, z, w]`
    pub rotation: [f32; 4],
    pub model_url: String,
    /// Seconds this entity has been simulated
    pub age: f32,
    /// Seconds after which the entity dies; `0.0` never expires
    pub lifetime: f32,
    pub should_die: bool,
    /// Wall-clock time of the last edit, stamped by the edit's originator
    pub last_edited: u64,
    /// Wall-clock time this copy was last touched, by any origin
    pub last_updated: u64,
}

impl Entity {
    /// Creates an entity already confirmed by a server.
    pub fn with_id(id: EntityId, position: Vec3, radius: f32) -> Self {
        Self::blank(Identity::Confirmed { id, token: None }, position, radius)
    }

    /// Creates a locally originated entity that is still waiting for its id.
    pub fn with_token(token: CreatorToken, position: Vec3, radius: f32) -> Self {
        Self::blank(Identity::Pending(token), position, radius)
    }

    fn blank(identity: Identity, position: Vec3, radius: f32) -> Self {
        let now = usec_timestamp_now();
        Self {
            identity,
            position,
            velocity: Vec3::ZERO,
            radius,
            color: [255, 255, 255],
            rotation: [0.0, 0.0, 0.0, 1.0],
            model_url: String::new(),
            age: 0.0,
            lifetime: 0.0,
            should_die: false,
            last_edited: now,
            last_updated: now,
        }
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn id(&self) -> Option<EntityId> {
        match self.identity {
            Identity::Confirmed { id, .. } => Some(id),
            Identity::Pending(_) => None,
        }
    }

    pub fn creator_token(&self) -> Option<CreatorToken> {
        match self.identity {
            Identity::Pending(token) => Some(token),
            Identity::Confirmed { token, .. } => token,
        }
    }

    /// Preferred lookup key: the server id once known, otherwise the token.
    pub fn key(&self) -> EntityKey {
        match self.identity {
            Identity::Confirmed { id, .. } => EntityKey::Known(id),
            Identity::Pending(token) => EntityKey::Pending(token),
        }
    }

    /// True if `key` names this entity, by id or by creator token.
    pub fn matches(&self, key: EntityKey) -> bool {
        match key {
            EntityKey::Known(id) => self.id() == Some(id),
            EntityKey::Pending(token) => self.creator_token() == Some(token),
        }
    }

    /// Records the server-assigned id. The creator token is retained.
    pub fn confirm(&mut self, id: EntityId) {
        self.identity = Identity::Confirmed {
            id,
            token: self.creator_token(),
        };
    }

    /// True for a confirmed entity that never carried a token on this peer,
    /// i.e. one that arrived from a server.
    pub fn is_server_echo(&self) -> bool {
        matches!(self.identity, Identity::Confirmed { token: None, .. })
    }

    /// Cube enclosing the entity's sphere.
    pub fn bounding_box(&self) -> AABox {
        AABox::around(self.position, self.radius)
    }

    /// Advances the entity by `delta_seconds` of simulation.
    pub fn simulate(&mut self, now: u64, delta_seconds: f32) {
        self.age += delta_seconds;
        if self.velocity != Vec3::ZERO {
            self.position = self.position + self.velocity * delta_seconds;
        }
        if self.lifetime > 0.0 && self.age > self.lifetime {
            self.should_die = true;
        }
        self.last_updated = now;
    }

    /// Overwrites every replicated property with `incoming`'s, keeping this
    /// copy's identity.
    pub fn copy_changed_properties(&mut self, incoming: &Entity) {
        self.position = incoming.position;
        self.velocity = incoming.velocity;
        self.radius = incoming.radius;
        self.color = incoming.color;
        self.rotation = incoming.rotation;
        self.model_url.clone_from(&incoming.model_url);
        self.age = incoming.age;
        self.lifetime = incoming.lifetime;
        self.should_die = incoming.should_die;
        self.last_edited = incoming.last_edited;
        self.last_updated = incoming.last_updated;
    }

    /// Applies a local editor's partial update and stamps both timestamps.
    pub fn apply_properties(&mut self, properties: &EntityProperties) {
        properties.apply_to(self);
        let now = usec_timestamp_now();
        self.last_edited = now;
        self.last_updated = now;
    }
}

/// Partial update issued by a local editor. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityProperties {
    pub position: Option<Vec3>,
    pub velocity: Option<Vec3>,
    pub radius: Option<f32>,
    pub color: Option<[u8; 3]>,
    pub rotation: Option<[f32; 4]>,
    pub model_url: Option<String>,
    pub lifetime: Option<f32>,
    pub should_die: Option<bool>,
}

impl EntityProperties {
    pub fn is_empty(&self) -> bool {
        *self == EntityProperties::default()
    }

    fn apply_to(&self, entity: &mut Entity) {
        if let Some(position) = self.position {
            entity.position = position;
        }
        if let Some(velocity) = self.velocity {
            entity.velocity = velocity;
        }
        if let Some(radius) = self.radius {
            entity.radius = radius;
        }
        if let Some(color) = self.color {
            entity.color = color;
        }
        if let Some(rotation) = self.rotation {
            entity.rotation = rotation;
        }
        if let Some(model_url) = &self.model_url {
            entity.model_url.clone_from(model_url);
        }
        if let Some(lifetime) = self.lifetime {
            entity.lifetime = lifetime;
        }
        if let Some(should_die) = self.should_die {
            entity.should_die = should_die;
        }
    }
}
