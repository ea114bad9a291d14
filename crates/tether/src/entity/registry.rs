use std::collections::HashMap;

use bytes::Bytes;

use crate::def::{
    DefError, EntityDefCatalog, EntityTypeDescriptor, EntityTypeId, MethodKind, Value,
};
use crate::stream::{MemoryStream, StreamWriter};

use super::alias::AliasTable;
use super::pending::{PendingKey, PendingUpdate, PendingUpdates, UpdateEncoding};
use super::space::SpaceData;
use super::{EntityError, EntityId, SpaceId};

/// Live entities at or below this count are addressed by one-byte aliases.
pub const ALIAS_LIMIT: usize = u8::MAX as usize;

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub type_id: EntityTypeId,
    pub type_name: String,
    pub properties: HashMap<String, Value>,
    pub alias: Option<u8>,
    pub space_id: Option<SpaceId>,
}

impl Entity {
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    Created { id: EntityId, type_name: String },
    Updated { id: EntityId, properties: Vec<String> },
    Destroyed { id: EntityId, type_name: String },
    PlayerDestroyed { id: EntityId },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub entity: EntityId,
    pub method: String,
    pub args: Vec<Value>,
}

#[derive(Debug)]
pub struct EntityRegistry {
    entities: HashMap<EntityId, Entity>,
    aliases: AliasTable,
    pending: PendingUpdates,
    space: SpaceData,
    player_id: Option<EntityId>,
    events: Vec<RegistryEvent>,
}

impl EntityRegistry {
    pub fn new(max_pending_updates: usize) -> Self {
        Self {
            entities: HashMap::new(),
            aliases: AliasTable::new(),
            pending: PendingUpdates::new(max_pending_updates),
            space: SpaceData::default(),
            player_id: None,
            events: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn player_id(&self) -> Option<EntityId> {
        self.player_id
    }

    pub fn player(&self) -> Option<&Entity> {
        self.player_id.and_then(|id| self.entities.get(&id))
    }

    pub fn set_player(&mut self, id: EntityId) {
        self.player_id = Some(id);
    }

    pub fn alias_of(&self, id: EntityId) -> Option<u8> {
        self.aliases.alias_of(id)
    }

    pub fn resolve_alias(&self, alias: u8) -> Option<EntityId> {
        self.aliases.resolve(alias)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn space(&self) -> &SpaceData {
        &self.space
    }

    pub fn take_events(&mut self) -> Vec<RegistryEvent> {
        std::mem::take(&mut self.events)
    }

    fn alias_regime(&self) -> bool {
        self.entities.len() <= ALIAS_LIMIT
    }

    pub fn create_entity(
        &mut self,
        defs: &EntityDefCatalog,
        id: EntityId,
        type_id: EntityTypeId,
        initial: Bytes,
    ) -> Result<(), EntityError> {
        if self.entities.contains_key(&id) {
            return Err(EntityError::DuplicateEntity(id));
        }
        let ty = defs
            .get(type_id)
            .ok_or(EntityError::UnknownEntityType(type_id.0))?;

        let mut properties: HashMap<String, Value> = ty
            .properties
            .iter()
            .map(|p| (p.name.clone(), defs.data_types().default_value(p.data_type)))
            .collect();
        let initial =
            decode_properties(defs, ty, UpdateEncoding::Plain, &mut MemoryStream::new(initial))?;
        properties.extend(initial);

        self.entities.insert(
            id,
            Entity {
                id,
                type_id,
                type_name: ty.name.clone(),
                properties,
                alias: None,
                space_id: self.space.space_id(),
            },
        );
        log::debug!("Entity {id} ({}) created", ty.name);
        self.events.push(RegistryEvent::Created {
            id,
            type_name: ty.name.clone(),
        });

        let mut keys = vec![PendingKey::Id(id)];
        if self.alias_regime() {
            keys.extend(self.assign_alias(id).map(PendingKey::Alias));
        }
        self.replay(defs, id, &keys);
        Ok(())
    }

    fn assign_alias(&mut self, id: EntityId) -> Option<u8> {
        let alias = self.aliases.assign(id)?;
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.alias = Some(alias);
        }
        Some(alias)
    }

    fn replay(&mut self, defs: &EntityDefCatalog, id: EntityId, keys: &[PendingKey]) {
        for update in self.pending.take(keys) {
            if let Err(e) = self.apply_body(defs, id, &update) {
                log::warn!("Dropping buffered update for entity {id}: {e}");
            }
        }
    }

    /// The player's id clears the whole registry instead.
    pub fn destroy_entity(
        &mut self,
        defs: &EntityDefCatalog,
        id: EntityId,
    ) -> Result<(), EntityError> {
        if self.player_id == Some(id) {
            self.clear();
            log::info!("Player entity {id} destroyed, registry cleared");
            self.events.push(RegistryEvent::PlayerDestroyed { id });
            return Ok(());
        }

        let discarded = self.pending.discard(PendingKey::Id(id));
        if discarded > 0 {
            log::debug!("Dropped {discarded} queued updates for destroyed entity {id}");
        }
        let entity = self
            .entities
            .remove(&id)
            .ok_or(EntityError::UnknownEntity(id))?;
        self.aliases.release(id);
        log::debug!("Entity {id} ({}) destroyed", entity.type_name);
        self.events.push(RegistryEvent::Destroyed {
            id,
            type_name: entity.type_name,
        });

        if self.alias_regime() {
            self.backfill_aliases(defs);
        }
        Ok(())
    }

    fn backfill_aliases(&mut self, defs: &EntityDefCatalog) {
        let mut unaliased: Vec<EntityId> = self
            .entities
            .values()
            .filter(|e| e.alias.is_none())
            .map(|e| e.id)
            .collect();
        if unaliased.is_empty() {
            return;
        }
        unaliased.sort_unstable();
        for id in unaliased {
            if let Some(alias) = self.assign_alias(id) {
                self.replay(defs, id, &[PendingKey::Alias(alias)]);
            }
        }
    }

    /// `payload`: i32 id, then (u16 property utype, value) pairs.
    pub fn apply_update(
        &mut self,
        defs: &EntityDefCatalog,
        payload: Bytes,
    ) -> Result<(), EntityError> {
        let mut stream = MemoryStream::new(payload);
        let id = stream.read_i32()?;
        let update = PendingUpdate::new(UpdateEncoding::Plain, stream.read_remaining());
        self.apply_or_buffer(defs, PendingKey::Id(id), update)
    }

    /// `payload`: a one-byte alias while the alias regime holds, otherwise an
    /// i32 id; then property refs (one-byte index or u16 utype) with values.
    pub fn apply_optimized_update(
        &mut self,
        defs: &EntityDefCatalog,
        payload: Bytes,
    ) -> Result<(), EntityError> {
        let mut stream = MemoryStream::new(payload);
        let key = if self.alias_regime() {
            PendingKey::Alias(stream.read_u8()?)
        } else {
            PendingKey::Id(stream.read_i32()?)
        };
        let update = PendingUpdate::new(UpdateEncoding::Optimized, stream.read_remaining());
        self.apply_or_buffer(defs, key, update)
    }

    fn apply_or_buffer(
        &mut self,
        defs: &EntityDefCatalog,
        key: PendingKey,
        update: PendingUpdate,
    ) -> Result<(), EntityError> {
        let resolved = match key {
            PendingKey::Id(id) => self.entities.contains_key(&id).then_some(id),
            PendingKey::Alias(alias) => self.aliases.resolve(alias),
        };
        match resolved {
            Some(id) => self.apply_body(defs, id, &update),
            None => {
                log::debug!("Buffering update for unresolved {key:?}");
                if self.pending.push(key, update).is_some() {
                    log::warn!("Pending update queue for {key:?} full, dropped the oldest");
                }
                Ok(())
            }
        }
    }

    fn apply_body(
        &mut self,
        defs: &EntityDefCatalog,
        id: EntityId,
        update: &PendingUpdate,
    ) -> Result<(), EntityError> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(EntityError::UnknownEntity(id))?;
        let ty = defs
            .get(entity.type_id)
            .ok_or(EntityError::UnknownEntityType(entity.type_id.0))?;

        // decode everything before touching the entity
        let decoded = decode_properties(
            defs,
            ty,
            update.encoding,
            &mut MemoryStream::new(update.payload.clone()),
        )?;
        let names = decoded.iter().map(|(name, _)| name.clone()).collect();
        entity.properties.extend(decoded);
        self.events.push(RegistryEvent::Updated {
            id,
            properties: names,
        });
        Ok(())
    }

    /// Type-checks and applies a local change, returning the property utype.
    pub fn set_property(
        &mut self,
        defs: &EntityDefCatalog,
        id: EntityId,
        name: &str,
        value: Value,
    ) -> Result<u16, EntityError> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(EntityError::UnknownEntity(id))?;
        let ty = defs
            .get(entity.type_id)
            .ok_or(EntityError::UnknownEntityType(entity.type_id.0))?;
        let property = ty
            .property_by_name(name)
            .ok_or_else(|| DefError::UnknownProperty {
                entity: ty.name.clone(),
                property: name.to_string(),
            })?;
        defs.data_types()
            .encode(property.data_type, &value, &mut StreamWriter::new())?;
        entity.properties.insert(property.name.clone(), value);
        Ok(property.utype)
    }

    /// Current values of `names` on `id`: i32 id, then (u16 utype, value) pairs.
    pub fn encode_properties(
        &self,
        defs: &EntityDefCatalog,
        id: EntityId,
        names: &[String],
    ) -> Result<Bytes, EntityError> {
        let entity = self
            .entities
            .get(&id)
            .ok_or(EntityError::UnknownEntity(id))?;
        let ty = defs
            .get(entity.type_id)
            .ok_or(EntityError::UnknownEntityType(entity.type_id.0))?;

        let mut writer = StreamWriter::new();
        writer.write_i32(id);
        for name in names {
            let property = ty
                .property_by_name(name)
                .ok_or_else(|| DefError::UnknownProperty {
                    entity: ty.name.clone(),
                    property: name.clone(),
                })?;
            let value = entity
                .properties
                .get(name)
                .cloned()
                .unwrap_or_else(|| defs.data_types().default_value(property.data_type));
            writer.write_u16(property.utype);
            defs.data_types()
                .encode(property.data_type, &value, &mut writer)?;
        }
        Ok(writer.freeze())
    }

    /// `payload`: i32 id, u16 method utype, then the arguments.
    pub fn decode_method_call(
        &self,
        defs: &EntityDefCatalog,
        payload: Bytes,
    ) -> Result<MethodCall, EntityError> {
        let mut stream = MemoryStream::new(payload);
        let id = stream.read_i32()?;
        let utype = stream.read_u16()?;
        let entity = self
            .entities
            .get(&id)
            .ok_or(EntityError::UnknownEntity(id))?;
        let ty = defs
            .get(entity.type_id)
            .ok_or(EntityError::UnknownEntityType(entity.type_id.0))?;
        let method = ty
            .method_by_utype(utype)
            .filter(|m| m.kind == MethodKind::Client)
            .ok_or_else(|| DefError::UnknownMethod {
                entity: ty.name.clone(),
                method: utype.to_string(),
            })?;

        let mut args = Vec::with_capacity(method.args.len());
        for arg in &method.args {
            args.push(defs.data_types().decode(*arg, &mut stream)?);
        }
        if !stream.is_empty() {
            return Err(DefError::TrailingBytes(stream.remaining()).into());
        }
        Ok(MethodCall {
            entity: id,
            method: method.name.clone(),
            args,
        })
    }

    pub fn encode_method_call(
        &self,
        defs: &EntityDefCatalog,
        id: EntityId,
        kind: MethodKind,
        name: &str,
        args: &[Value],
    ) -> Result<Bytes, EntityError> {
        let entity = self
            .entities
            .get(&id)
            .ok_or(EntityError::UnknownEntity(id))?;
        let ty = defs
            .get(entity.type_id)
            .ok_or(EntityError::UnknownEntityType(entity.type_id.0))?;
        let method = ty
            .method_by_name(name, kind)
            .ok_or_else(|| DefError::UnknownMethod {
                entity: ty.name.clone(),
                method: name.to_string(),
            })?;
        if method.args.len() != args.len() {
            return Err(DefError::ArgumentCount {
                method: method.name.clone(),
                expected: method.args.len(),
                found: args.len(),
            }
            .into());
        }

        let mut writer = StreamWriter::new();
        writer.write_i32(id);
        writer.write_u16(method.utype);
        for (arg, value) in method.args.iter().zip(args) {
            defs.data_types().encode(*arg, value, &mut writer)?;
        }
        Ok(writer.freeze())
    }

    pub fn init_space_data(&mut self, space_id: SpaceId, values: Vec<(String, String)>) {
        self.space.init(space_id, values);
        for entity in self.entities.values_mut() {
            entity.space_id = Some(space_id);
        }
    }

    pub fn set_space_data(&mut self, space_id: SpaceId, key: String, value: String) {
        if !self.space.set(space_id, key, value) {
            log::warn!(
                "Ignoring space data for space {space_id}, current space is {:?}",
                self.space.space_id()
            );
        }
    }

    pub fn del_space_data(&mut self, space_id: SpaceId, key: &str) {
        if !self.space.remove(space_id, key) {
            log::warn!("No space data {key} in space {space_id}");
        }
    }

    /// Drops every entity, alias, pending update and the space data.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.aliases.clear();
        self.pending.clear();
        self.space.clear();
        self.player_id = None;
    }
}

fn decode_properties(
    defs: &EntityDefCatalog,
    ty: &EntityTypeDescriptor,
    encoding: UpdateEncoding,
    stream: &mut MemoryStream,
) -> Result<Vec<(String, Value)>, EntityError> {
    let indexed = encoding == UpdateEncoding::Optimized && ty.uses_property_alias();
    let mut decoded = Vec::new();
    while !stream.is_empty() {
        let property = if indexed {
            let index = stream.read_u8()?;
            ty.property_by_alias(index)
                .ok_or_else(|| EntityError::UnknownPropertyRef {
                    entity: ty.name.clone(),
                    property: index as u16,
                })?
        } else {
            let utype = stream.read_u16()?;
            ty.property_by_utype(utype)
                .ok_or_else(|| EntityError::UnknownPropertyRef {
                    entity: ty.name.clone(),
                    property: utype,
                })?
        };
        let value = defs.data_types().decode(property.data_type, stream)?;
        decoded.push((property.name.clone(), value));
    }
    Ok(decoded)
}
