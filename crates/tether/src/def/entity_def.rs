use std::collections::HashMap;

use bitflags::bitflags;
use bytes::Bytes;

use crate::stream::{MemoryStream, StreamWriter};

use super::DefError;
use super::datatype::{DataTypeCatalog, DataTypeDecl, TypeIndex};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PropertyFlags: u32 {
        const OWN_CLIENT = 1 << 0;
        const OTHER_CLIENTS = 1 << 1;
        const BASE = 1 << 2;
        const PERSISTENT = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MethodKind {
    Client = 0,
    Base = 1,
    Cell = 2,
}

impl MethodKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Client),
            1 => Some(Self::Base),
            2 => Some(Self::Cell),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub utype: u16,
    pub name: String,
    pub data_type: TypeIndex,
    pub flags: PropertyFlags,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDescriptor {
    pub utype: u16,
    pub name: String,
    pub kind: MethodKind,
    pub args: Vec<TypeIndex>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityTypeId(pub(crate) u16);

impl EntityTypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityTypeDescriptor {
    pub utype: u16,
    pub name: String,
    pub properties: Vec<PropertyDescriptor>,
    pub methods: Vec<MethodDescriptor>,
}

impl EntityTypeDescriptor {
    pub fn property_by_utype(&self, utype: u16) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.utype == utype)
    }

    pub fn property_by_name(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Optimized frames address properties by their position while the type
    /// has few enough properties for a one-byte index.
    pub fn uses_property_alias(&self) -> bool {
        self.properties.len() <= u8::MAX as usize
    }

    pub fn property_by_alias(&self, alias: u8) -> Option<&PropertyDescriptor> {
        self.properties.get(alias as usize)
    }

    pub fn method_by_utype(&self, utype: u16) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.utype == utype)
    }

    pub fn method_by_name(&self, name: &str, kind: MethodKind) -> Option<&MethodDescriptor> {
        self.methods
            .iter()
            .find(|m| m.kind == kind && m.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDecl {
    pub utype: u16,
    pub flags: u32,
    pub name: String,
    pub data_utype: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDecl {
    pub utype: u16,
    pub kind: u8,
    pub name: String,
    pub args: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityTypeDecl {
    pub name: String,
    pub utype: u16,
    pub properties: Vec<PropertyDecl>,
    pub methods: Vec<MethodDecl>,
}

impl EntityTypeDecl {
    pub fn new(utype: u16, name: &str) -> Self {
        Self {
            name: name.to_string(),
            utype,
            properties: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn property(mut self, utype: u16, name: &str, data_utype: u16, flags: PropertyFlags) -> Self {
        self.properties.push(PropertyDecl {
            utype,
            flags: flags.bits(),
            name: name.to_string(),
            data_utype,
        });
        self
    }

    pub fn method(mut self, utype: u16, name: &str, kind: MethodKind, args: &[u16]) -> Self {
        self.methods.push(MethodDecl {
            utype,
            kind: kind as u8,
            name: name.to_string(),
            args: args.to_vec(),
        });
        self
    }

    fn read(stream: &mut MemoryStream) -> Result<Self, DefError> {
        let name = stream.read_string()?;
        let utype = stream.read_u16()?;
        let property_count = stream.read_u16()?;
        let method_count = stream.read_u16()?;

        let mut properties = Vec::with_capacity(property_count as usize);
        for _ in 0..property_count {
            properties.push(PropertyDecl {
                utype: stream.read_u16()?,
                flags: stream.read_u32()?,
                name: stream.read_string()?,
                data_utype: stream.read_u16()?,
            });
        }

        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            let utype = stream.read_u16()?;
            let kind = stream.read_u8()?;
            let method_name = stream.read_string()?;
            let argc = stream.read_u8()?;
            let mut args = Vec::with_capacity(argc as usize);
            for _ in 0..argc {
                args.push(stream.read_u16()?);
            }
            methods.push(MethodDecl {
                utype,
                kind,
                name: method_name,
                args,
            });
        }

        Ok(Self {
            name,
            utype,
            properties,
            methods,
        })
    }

    fn write(&self, writer: &mut StreamWriter) {
        writer.write_string(&self.name);
        writer.write_u16(self.utype);
        writer.write_u16(self.properties.len() as u16);
        writer.write_u16(self.methods.len() as u16);
        for property in &self.properties {
            writer.write_u16(property.utype);
            writer.write_u32(property.flags);
            writer.write_string(&property.name);
            writer.write_u16(property.data_utype);
        }
        for method in &self.methods {
            writer.write_u16(method.utype);
            writer.write_u8(method.kind);
            writer.write_string(&method.name);
            writer.write_u8(method.args.len() as u8);
            for arg in &method.args {
                writer.write_u16(*arg);
            }
        }
    }
}

/// Whole entity-def import body: data types followed by entity types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityDefDecl {
    pub data_types: Vec<DataTypeDecl>,
    pub entity_types: Vec<EntityTypeDecl>,
}

impl EntityDefDecl {
    pub fn read(stream: &mut MemoryStream) -> Result<Self, DefError> {
        let type_count = stream.read_u16()?;
        let mut data_types = Vec::with_capacity(type_count as usize);
        for _ in 0..type_count {
            data_types.push(DataTypeDecl::read(stream)?);
        }

        let entity_count = stream.read_u16()?;
        let mut entity_types = Vec::with_capacity(entity_count as usize);
        for _ in 0..entity_count {
            entity_types.push(EntityTypeDecl::read(stream)?);
        }

        if !stream.is_empty() {
            return Err(DefError::TrailingBytes(stream.remaining()));
        }

        Ok(Self {
            data_types,
            entity_types,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut writer = StreamWriter::new();
        writer.write_u16(self.data_types.len() as u16);
        for decl in &self.data_types {
            decl.write(&mut writer);
        }
        writer.write_u16(self.entity_types.len() as u16);
        for decl in &self.entity_types {
            decl.write(&mut writer);
        }
        writer.freeze()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityDefCatalog {
    data_types: DataTypeCatalog,
    types: Vec<EntityTypeDescriptor>,
    by_name: HashMap<String, EntityTypeId>,
    by_utype: HashMap<u16, EntityTypeId>,
}

impl EntityDefCatalog {
    pub fn import(body: Bytes) -> Result<Self, DefError> {
        let decl = EntityDefDecl::read(&mut MemoryStream::new(body))?;
        Self::build(&decl)
    }

    pub fn build(decl: &EntityDefDecl) -> Result<Self, DefError> {
        let data_types = DataTypeCatalog::build(&decl.data_types)?;
        let resolve = |utype: u16| {
            data_types
                .by_utype(utype)
                .ok_or(DefError::UnknownTypeReference(utype))
        };

        let mut types = Vec::with_capacity(decl.entity_types.len());
        let mut by_name = HashMap::new();
        let mut by_utype = HashMap::new();

        for (slot, entity) in decl.entity_types.iter().enumerate() {
            let id = EntityTypeId(slot as u16);
            if by_name.insert(entity.name.clone(), id).is_some()
                || by_utype.insert(entity.utype, id).is_some()
            {
                return Err(DefError::DuplicateEntityType(entity.name.clone()));
            }

            let mut properties = Vec::with_capacity(entity.properties.len());
            for property in &entity.properties {
                if properties
                    .iter()
                    .any(|p: &PropertyDescriptor| p.utype == property.utype || p.name == property.name)
                {
                    return Err(DefError::DuplicateProperty {
                        entity: entity.name.clone(),
                        property: property.name.clone(),
                    });
                }
                properties.push(PropertyDescriptor {
                    utype: property.utype,
                    name: property.name.clone(),
                    data_type: resolve(property.data_utype)?,
                    flags: PropertyFlags::from_bits_truncate(property.flags),
                });
            }

            let mut methods = Vec::with_capacity(entity.methods.len());
            for method in &entity.methods {
                let kind = MethodKind::from_u8(method.kind)
                    .ok_or(DefError::UnknownMethodKind(method.kind))?;
                let args = method
                    .args
                    .iter()
                    .map(|utype| resolve(*utype))
                    .collect::<Result<Vec<_>, _>>()?;
                methods.push(MethodDescriptor {
                    utype: method.utype,
                    name: method.name.clone(),
                    kind,
                    args,
                });
            }

            types.push(EntityTypeDescriptor {
                utype: entity.utype,
                name: entity.name.clone(),
                properties,
                methods,
            });
        }

        log::debug!(
            "Built entity defs: {} data types, {} entity types",
            data_types.len(),
            types.len()
        );

        Ok(Self {
            data_types,
            types,
            by_name,
            by_utype,
        })
    }

    pub fn data_types(&self) -> &DataTypeCatalog {
        &self.data_types
    }

    pub fn get(&self, id: EntityTypeId) -> Option<&EntityTypeDescriptor> {
        self.types.get(id.index())
    }

    pub fn by_name(&self, name: &str) -> Option<EntityTypeId> {
        self.by_name.get(name).copied()
    }

    pub fn by_utype(&self, utype: u16) -> Option<EntityTypeId> {
        self.by_utype.get(&utype).copied()
    }

    pub fn types(&self) -> impl Iterator<Item = &EntityTypeDescriptor> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
