use bytes::{Bytes, BytesMut};

use crate::def::EntityDefCatalog;
use crate::errors::ErrorCatalog;
use crate::persist::{PersistedSchema, SCHEMA_FORMAT, SchemaDigest};
use crate::protocol::MessageTable;

use super::error::SessionError;
use super::state::Tier;

#[derive(Debug, Clone, Default)]
struct Bodies {
    auth: Option<Bytes>,
    gameplay: Option<Bytes>,
    errors: Option<Bytes>,
    entity_defs: Option<Bytes>,
}

/// Per-session imported schema. Each catalog is installed at most once; any
/// import failure resets all of them.
#[derive(Debug, Default)]
pub struct CatalogState {
    auth: Option<MessageTable>,
    gameplay: Option<MessageTable>,
    errors: Option<ErrorCatalog>,
    entity_defs: Option<EntityDefCatalog>,
    digest: Option<SchemaDigest>,
    bodies: Bodies,
    fresh: bool,
    message_chunks: BytesMut,
    entity_def_chunks: BytesMut,
}

impl CatalogState {
    pub fn messages(&self, tier: Tier) -> Option<&MessageTable> {
        match tier {
            Tier::Auth => self.auth.as_ref(),
            Tier::Gameplay => self.gameplay.as_ref(),
        }
    }

    pub fn errors(&self) -> Option<&ErrorCatalog> {
        self.errors.as_ref()
    }

    pub fn entity_defs(&self) -> Option<&EntityDefCatalog> {
        self.entity_defs.as_ref()
    }

    pub fn digest(&self) -> Option<&SchemaDigest> {
        self.digest.as_ref()
    }

    pub fn set_digest(&mut self, digest: SchemaDigest) {
        self.digest = Some(digest);
    }

    pub fn is_complete(&self) -> bool {
        self.auth.is_some()
            && self.gameplay.is_some()
            && self.errors.is_some()
            && self.entity_defs.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.auth.is_none()
            && self.gameplay.is_none()
            && self.errors.is_none()
            && self.entity_defs.is_none()
    }

    /// True once after a complete schema was imported from the server.
    pub(crate) fn take_fresh(&mut self) -> bool {
        let fresh = self.fresh && self.is_complete();
        if fresh {
            self.fresh = false;
        }
        fresh
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn clear_chunks(&mut self) {
        self.message_chunks.clear();
        self.entity_def_chunks.clear();
    }

    pub(crate) fn append_message_chunk(&mut self, chunk: &[u8]) {
        self.message_chunks.extend_from_slice(chunk);
    }

    pub(crate) fn append_entity_def_chunk(&mut self, chunk: &[u8]) {
        self.entity_def_chunks.extend_from_slice(chunk);
    }

    /// Returns false when the tier already had a table.
    pub(crate) fn finish_messages(&mut self, tier: Tier) -> Result<bool, SessionError> {
        let body = self.message_chunks.split().freeze();
        if self.messages(tier).is_some() {
            log::warn!("Ignoring repeated {tier} message import");
            return Ok(false);
        }
        let table = self.guard(MessageTable::import(body.clone()))?;
        log::debug!("Installed {tier} message table ({} messages)", table.len());
        match tier {
            Tier::Auth => {
                self.auth = Some(table);
                self.bodies.auth = Some(body);
            }
            Tier::Gameplay => {
                self.gameplay = Some(table);
                self.bodies.gameplay = Some(body);
            }
        }
        self.fresh = true;
        Ok(true)
    }

    pub(crate) fn install_errors(&mut self, body: Bytes) -> Result<bool, SessionError> {
        if self.errors.is_some() {
            log::warn!("Ignoring repeated server error import");
            return Ok(false);
        }
        let errors = self.guard(ErrorCatalog::import(body.clone()))?;
        self.errors = Some(errors);
        self.bodies.errors = Some(body);
        self.fresh = true;
        Ok(true)
    }

    pub(crate) fn finish_entity_defs(&mut self) -> Result<bool, SessionError> {
        let body = self.entity_def_chunks.split().freeze();
        if self.entity_defs.is_some() {
            log::warn!("Ignoring repeated entity def import");
            return Ok(false);
        }
        let defs = self.guard(EntityDefCatalog::import(body.clone()))?;
        self.entity_defs = Some(defs);
        self.bodies.entity_defs = Some(body);
        self.fresh = true;
        Ok(true)
    }

    fn guard<T, E: std::fmt::Display>(&mut self, result: Result<T, E>) -> Result<T, SessionError> {
        result.map_err(|e| {
            log::error!("Schema import failed, resetting catalogs: {e}");
            self.reset();
            SessionError::schema(e)
        })
    }

    /// Replays cached bodies through the importers. All or nothing.
    pub fn install_persisted(&mut self, schema: &PersistedSchema) -> Result<(), SessionError> {
        self.reset();
        let auth = Bytes::copy_from_slice(&schema.auth_messages);
        let gameplay = Bytes::copy_from_slice(&schema.gameplay_messages);
        let errors = Bytes::copy_from_slice(&schema.server_errors);
        let entity_defs = Bytes::copy_from_slice(&schema.entity_defs);

        self.auth = Some(self.guard(MessageTable::import(auth.clone()))?);
        self.gameplay = Some(self.guard(MessageTable::import(gameplay.clone()))?);
        self.errors = Some(self.guard(ErrorCatalog::import(errors.clone()))?);
        self.entity_defs = Some(self.guard(EntityDefCatalog::import(entity_defs.clone()))?);
        self.bodies = Bodies {
            auth: Some(auth),
            gameplay: Some(gameplay),
            errors: Some(errors),
            entity_defs: Some(entity_defs),
        };
        self.digest = Some(schema.digest.clone());
        self.fresh = false;
        Ok(())
    }

    pub fn to_persisted(&self) -> Option<PersistedSchema> {
        Some(PersistedSchema {
            format: SCHEMA_FORMAT,
            digest: self.digest.clone()?,
            auth_messages: self.bodies.auth.as_ref()?.to_vec(),
            gameplay_messages: self.bodies.gameplay.as_ref()?.to_vec(),
            server_errors: self.bodies.errors.as_ref()?.to_vec(),
            entity_defs: self.bodies.entity_defs.as_ref()?.to_vec(),
        })
    }
}
