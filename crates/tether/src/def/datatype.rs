use std::collections::HashMap;

use crate::stream::{MemoryStream, StreamError, StreamWriter};

use super::DefError;
use super::value::{PrimitiveKind, Value};

const ARRAY_BASE: &str = "ARRAY";
const FIXED_DICT_BASE: &str = "FIXED_DICT";
const MAX_NESTING: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeIndex(pub(crate) usize);

impl TypeIndex {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    Primitive(PrimitiveKind),
    Array {
        element: TypeIndex,
    },
    FixedDict {
        implemented_by: String,
        keys: Vec<(String, TypeIndex)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataTypeEntry {
    pub utype: u16,
    pub name: String,
    pub data_type: DataType,
}

/// Declaration as it appears on the wire; references are still utypes or names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeBody {
    Alias(String),
    Array(u16),
    FixedDict {
        implemented_by: String,
        keys: Vec<(String, u16)>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataTypeDecl {
    pub utype: u16,
    pub name: String,
    pub body: TypeBody,
}

impl DataTypeDecl {
    pub fn alias(utype: u16, name: &str, base: &str) -> Self {
        Self {
            utype,
            name: name.to_string(),
            body: TypeBody::Alias(base.to_string()),
        }
    }

    pub fn array(utype: u16, name: &str, element: u16) -> Self {
        Self {
            utype,
            name: name.to_string(),
            body: TypeBody::Array(element),
        }
    }

    pub fn fixed_dict(utype: u16, name: &str, keys: &[(&str, u16)]) -> Self {
        Self {
            utype,
            name: name.to_string(),
            body: TypeBody::FixedDict {
                implemented_by: String::new(),
                keys: keys.iter().map(|(k, t)| (k.to_string(), *t)).collect(),
            },
        }
    }

    pub fn read(stream: &mut MemoryStream) -> Result<Self, DefError> {
        let utype = stream.read_u16()?;
        let name = stream.read_string()?;
        let base = stream.read_string()?;
        let body = match base.as_str() {
            ARRAY_BASE => TypeBody::Array(stream.read_u16()?),
            FIXED_DICT_BASE => {
                let count = stream.read_u8()?;
                let implemented_by = stream.read_string()?;
                let mut keys = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let key = stream.read_string()?;
                    let key_utype = stream.read_u16()?;
                    keys.push((key, key_utype));
                }
                TypeBody::FixedDict {
                    implemented_by,
                    keys,
                }
            }
            _ => TypeBody::Alias(base),
        };
        Ok(Self { utype, name, body })
    }

    pub fn write(&self, writer: &mut StreamWriter) {
        writer.write_u16(self.utype);
        writer.write_string(&self.name);
        match &self.body {
            TypeBody::Alias(base) => writer.write_string(base),
            TypeBody::Array(element) => {
                writer.write_string(ARRAY_BASE);
                writer.write_u16(*element);
            }
            TypeBody::FixedDict {
                implemented_by,
                keys,
            } => {
                writer.write_string(FIXED_DICT_BASE);
                writer.write_u8(keys.len() as u8);
                writer.write_string(implemented_by);
                for (key, utype) in keys {
                    writer.write_string(key);
                    writer.write_u16(*utype);
                }
            }
        }
    }
}

/// Index-addressed arena of data types.
///
/// Built in two passes so declarations may reference types that are declared
/// later in the stream: every declaration first gets a slot, then bodies are
/// resolved against the completed slot tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTypeCatalog {
    types: Vec<DataTypeEntry>,
    by_utype: HashMap<u16, TypeIndex>,
    by_name: HashMap<String, TypeIndex>,
}

impl DataTypeCatalog {
    pub fn build(decls: &[DataTypeDecl]) -> Result<Self, DefError> {
        let mut by_utype = HashMap::with_capacity(decls.len());
        let mut by_name = HashMap::with_capacity(decls.len());

        for (slot, decl) in decls.iter().enumerate() {
            if by_utype.insert(decl.utype, TypeIndex(slot)).is_some() {
                return Err(DefError::DuplicateType(decl.name.clone()));
            }
            if by_name.insert(decl.name.clone(), TypeIndex(slot)).is_some() {
                return Err(DefError::DuplicateType(decl.name.clone()));
            }
        }

        let mut types = Vec::with_capacity(decls.len());
        for slot in 0..decls.len() {
            let data_type = Self::resolve_body(decls, &by_utype, &by_name, slot)?;
            types.push(DataTypeEntry {
                utype: decls[slot].utype,
                name: decls[slot].name.clone(),
                data_type,
            });
        }

        let catalog = Self {
            types,
            by_utype,
            by_name,
        };
        catalog.check_dict_cycles()?;
        Ok(catalog)
    }

    fn resolve_body(
        decls: &[DataTypeDecl],
        by_utype: &HashMap<u16, TypeIndex>,
        by_name: &HashMap<String, TypeIndex>,
        slot: usize,
    ) -> Result<DataType, DefError> {
        let lookup = |utype: u16| {
            by_utype
                .get(&utype)
                .copied()
                .ok_or(DefError::UnknownTypeReference(utype))
        };

        let mut current = slot;
        // alias chains are followed to their target; a chain longer than the
        // declaration list must loop
        for _ in 0..=decls.len() {
            match &decls[current].body {
                TypeBody::Alias(base) => {
                    if let Some(kind) = PrimitiveKind::from_name(base) {
                        return Ok(DataType::Primitive(kind));
                    }
                    current = by_name
                        .get(base)
                        .ok_or_else(|| DefError::UnknownBaseType(base.clone()))?
                        .0;
                }
                TypeBody::Array(element) => {
                    return Ok(DataType::Array {
                        element: lookup(*element)?,
                    });
                }
                TypeBody::FixedDict {
                    implemented_by,
                    keys,
                } => {
                    let keys = keys
                        .iter()
                        .map(|(key, utype)| Ok((key.clone(), lookup(*utype)?)))
                        .collect::<Result<Vec<_>, DefError>>()?;
                    return Ok(DataType::FixedDict {
                        implemented_by: implemented_by.clone(),
                        keys,
                    });
                }
            }
        }
        Err(DefError::RecursiveType(decls[slot].name.clone()))
    }

    // A dict that contains itself without an array in between has no finite value.
    fn check_dict_cycles(&self) -> Result<(), DefError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            Active,
            Done,
        }

        fn visit(
            catalog: &DataTypeCatalog,
            marks: &mut [Mark],
            index: usize,
        ) -> Result<(), DefError> {
            match marks[index] {
                Mark::Done => return Ok(()),
                Mark::Active => {
                    return Err(DefError::RecursiveType(catalog.types[index].name.clone()));
                }
                Mark::Unvisited => {}
            }
            marks[index] = Mark::Active;
            if let DataType::FixedDict { keys, .. } = &catalog.types[index].data_type {
                for (_, key_type) in keys {
                    visit(catalog, marks, key_type.0)?;
                }
            }
            marks[index] = Mark::Done;
            Ok(())
        }

        let mut marks = vec![Mark::Unvisited; self.types.len()];
        for index in 0..self.types.len() {
            visit(self, &mut marks, index)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn get(&self, index: TypeIndex) -> Option<&DataTypeEntry> {
        self.types.get(index.0)
    }

    pub fn by_utype(&self, utype: u16) -> Option<TypeIndex> {
        self.by_utype.get(&utype).copied()
    }

    pub fn by_name(&self, name: &str) -> Option<TypeIndex> {
        self.by_name.get(name).copied()
    }

    fn entry(&self, index: TypeIndex) -> Result<&DataTypeEntry, DefError> {
        self.types
            .get(index.0)
            .ok_or(DefError::UnknownTypeIndex(index.0))
    }

    pub fn default_value(&self, index: TypeIndex) -> Value {
        match self.types.get(index.0).map(|entry| &entry.data_type) {
            Some(DataType::Primitive(kind)) => kind.default_value(),
            Some(DataType::Array { .. }) => Value::Array(Vec::new()),
            Some(DataType::FixedDict { keys, .. }) => Value::Dict(
                keys.iter()
                    .map(|(key, key_type)| (key.clone(), self.default_value(*key_type)))
                    .collect(),
            ),
            None => Value::Blob(Vec::new()),
        }
    }

    pub fn decode(&self, index: TypeIndex, stream: &mut MemoryStream) -> Result<Value, DefError> {
        self.decode_nested(index, stream, 0)
    }

    fn decode_nested(
        &self,
        index: TypeIndex,
        stream: &mut MemoryStream,
        depth: usize,
    ) -> Result<Value, DefError> {
        let entry = self.entry(index)?;
        if depth > MAX_NESTING {
            return Err(DefError::NestingTooDeep(entry.name.clone()));
        }
        match &entry.data_type {
            DataType::Primitive(kind) => Ok(kind.decode(stream)?),
            DataType::Array { element } => {
                let count = stream.read_u32()? as usize;
                let needed = count.saturating_mul(self.min_encoded_size(*element).max(1));
                if needed > stream.remaining() {
                    return Err(StreamError::ShortRead {
                        needed,
                        remaining: stream.remaining(),
                    }
                    .into());
                }
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.decode_nested(*element, stream, depth + 1)?);
                }
                Ok(Value::Array(items))
            }
            DataType::FixedDict { keys, .. } => {
                let mut fields = Vec::with_capacity(keys.len());
                for (key, key_type) in keys {
                    fields.push((key.clone(), self.decode_nested(*key_type, stream, depth + 1)?));
                }
                Ok(Value::Dict(fields))
            }
        }
    }

    /// Fewest bytes a value of `index` can occupy on the wire.
    fn min_encoded_size(&self, index: TypeIndex) -> usize {
        match self.types.get(index.0).map(|entry| &entry.data_type) {
            Some(DataType::Primitive(kind)) => kind.fixed_size().unwrap_or(match kind {
                PrimitiveKind::String => 1,
                _ => 4,
            }),
            Some(DataType::Array { .. }) => 4,
            // dicts never contain themselves except through an array
            Some(DataType::FixedDict { keys, .. }) => keys
                .iter()
                .map(|(_, key_type)| self.min_encoded_size(*key_type))
                .sum(),
            None => 0,
        }
    }

    pub fn encode(
        &self,
        index: TypeIndex,
        value: &Value,
        writer: &mut StreamWriter,
    ) -> Result<(), DefError> {
        let entry = self.entry(index)?;
        let mismatch = || DefError::TypeMismatch {
            expected: entry.name.clone(),
            found: value.type_name(),
        };
        match (&entry.data_type, value) {
            (DataType::Primitive(kind), _) => {
                if kind.encode(value, writer) {
                    Ok(())
                } else {
                    Err(mismatch())
                }
            }
            (DataType::Array { element }, Value::Array(items)) => {
                writer.write_u32(items.len() as u32);
                for item in items {
                    self.encode(*element, item, writer)?;
                }
                Ok(())
            }
            (DataType::FixedDict { keys, .. }, Value::Dict(fields)) => {
                if keys.len() != fields.len() {
                    return Err(mismatch());
                }
                for ((key, key_type), (field, field_value)) in keys.iter().zip(fields) {
                    if key != field {
                        return Err(mismatch());
                    }
                    self.encode(*key_type, field_value, writer)?;
                }
                Ok(())
            }
            _ => Err(mismatch()),
        }
    }

    /// Type-checks `value` by encoding it into a scratch buffer.
    pub fn accepts(&self, index: TypeIndex, value: &Value) -> bool {
        let mut scratch = StreamWriter::new();
        self.encode(index, value, &mut scratch).is_ok()
    }
}
