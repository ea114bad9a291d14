use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use super::{PersistedSchema, StoreError};

const SCHEMA_FILE: &str = "schema.rkyv";

pub trait SchemaStore {
    fn load(&mut self) -> Result<Option<PersistedSchema>, StoreError>;
    fn save(&mut self, schema: &PersistedSchema) -> Result<(), StoreError>;
    fn clear(&mut self) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
pub struct FileSchemaStore {
    path: PathBuf,
}

impl FileSchemaStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(SCHEMA_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SchemaStore for FileSchemaStore {
    fn load(&mut self) -> Result<Option<PersistedSchema>, StoreError> {
        match fs::read(&self.path) {
            Ok(data) => PersistedSchema::deserialize(&data).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&mut self, schema: &PersistedSchema) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let data = schema.serialize()?;
        // a reader never sees a half-written file
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &data)?;
        fs::rename(&tmp, &self.path)?;
        log::debug!("Saved schema cache to {} ({} bytes)", self.path.display(), data.len());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    data: Option<Vec<u8>>,
    saves: usize,
}

/// Shared in-process store; clones see the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemorySchemaStore {
    state: Rc<RefCell<MemoryState>>,
}

impl MemorySchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saves(&self) -> usize {
        self.state.borrow().saves
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().data.is_none()
    }

    pub fn corrupt(&self) {
        self.state.borrow_mut().data = Some(vec![0xde, 0xad]);
    }
}

impl SchemaStore for MemorySchemaStore {
    fn load(&mut self) -> Result<Option<PersistedSchema>, StoreError> {
        match &self.state.borrow().data {
            Some(data) => PersistedSchema::deserialize(data).map(Some),
            None => Ok(None),
        }
    }

    fn save(&mut self, schema: &PersistedSchema) -> Result<(), StoreError> {
        let data = schema.serialize()?;
        let mut state = self.state.borrow_mut();
        state.data = Some(data);
        state.saves += 1;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.state.borrow_mut().data = None;
        Ok(())
    }
}
