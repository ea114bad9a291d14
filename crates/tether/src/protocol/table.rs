use std::collections::HashMap;

use bytes::Bytes;

use crate::def::PrimitiveKind;
use crate::stream::{MemoryStream, StreamWriter};

use super::ProtocolError;
use super::message::{MessageDescriptor, Route, ServerRequest};

pub const HELLO: u16 = 1;
pub const IMPORT_CLIENT_MESSAGES: u16 = 2;
pub const IMPORT_SERVER_ERRORS_DESCR: u16 = 3;
pub const IMPORT_CLIENT_ENTITY_DEF: u16 = 4;
pub const ON_HELLO_CB: u16 = 501;
pub const ON_VERSION_NOT_MATCH: u16 = 502;
pub const ON_SCRIPT_VERSION_NOT_MATCH: u16 = 503;
pub const ON_IMPORT_CLIENT_MESSAGES: u16 = 504;
pub const ON_IMPORT_CLIENT_MESSAGES_COMPLETED: u16 = 505;
pub const ON_IMPORT_SERVER_ERRORS_DESCR: u16 = 506;
pub const ON_IMPORT_CLIENT_ENTITY_DEF: u16 = 507;
pub const ON_IMPORT_CLIENT_ENTITY_DEF_COMPLETED: u16 = 508;

/// Messages both tiers understand before anything has been imported.
pub fn bootstrap_descriptors() -> Vec<MessageDescriptor> {
    use PrimitiveKind::*;
    vec![
        MessageDescriptor::with_args(HELLO, "hello", &[String, String, Blob]),
        MessageDescriptor::with_args(IMPORT_CLIENT_MESSAGES, "importClientMessages", &[]),
        MessageDescriptor::with_args(IMPORT_SERVER_ERRORS_DESCR, "importServerErrorsDescr", &[]),
        MessageDescriptor::with_args(IMPORT_CLIENT_ENTITY_DEF, "importClientEntityDef", &[]),
        MessageDescriptor::with_args(
            ON_HELLO_CB,
            "Client_onHelloCB",
            &[String, String, String, String, Int32],
        ),
        MessageDescriptor::with_args(ON_VERSION_NOT_MATCH, "Client_onVersionNotMatch", &[String]),
        MessageDescriptor::with_args(
            ON_SCRIPT_VERSION_NOT_MATCH,
            "Client_onScriptVersionNotMatch",
            &[String],
        ),
        MessageDescriptor::stream(ON_IMPORT_CLIENT_MESSAGES, "Client_onImportClientMessages"),
        MessageDescriptor::with_args(
            ON_IMPORT_CLIENT_MESSAGES_COMPLETED,
            "Client_onImportClientMessagesCompleted",
            &[],
        ),
        MessageDescriptor::stream(ON_IMPORT_SERVER_ERRORS_DESCR, "Client_onImportServerErrorsDescr"),
        MessageDescriptor::stream(ON_IMPORT_CLIENT_ENTITY_DEF, "Client_onImportClientEntityDef"),
        MessageDescriptor::with_args(
            ON_IMPORT_CLIENT_ENTITY_DEF_COMPLETED,
            "Client_onImportClientEntityDefCompleted",
            &[],
        ),
    ]
}

pub fn is_bootstrap_id(id: u16) -> bool {
    (HELLO..=IMPORT_CLIENT_ENTITY_DEF).contains(&id)
        || (ON_HELLO_CB..=ON_IMPORT_CLIENT_ENTITY_DEF_COMPLETED).contains(&id)
}

/// Message catalog of one tier. Write-once: built whole from an import body,
/// then only read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageTable {
    by_id: HashMap<u16, MessageDescriptor>,
    requests: HashMap<ServerRequest, u16>,
}

impl MessageTable {
    pub fn bootstrap() -> Self {
        let mut table = Self::default();
        for desc in bootstrap_descriptors() {
            table.insert(desc);
        }
        table
    }

    fn insert(&mut self, desc: MessageDescriptor) {
        if let Route::Outbound(request) = desc.route {
            self.requests.insert(request, desc.id);
        }
        self.by_id.insert(desc.id, desc);
    }

    pub fn import(body: Bytes) -> Result<Self, ProtocolError> {
        let mut stream = MemoryStream::new(body);
        let count = stream.read_u16()?;

        // pass one: a placeholder per declared id, rejecting collisions
        let mut declared: Vec<MessageDescriptor> = Vec::with_capacity(count as usize);
        let mut slots: HashMap<u16, usize> = HashMap::with_capacity(count as usize);
        for _ in 0..count {
            let desc = MessageDescriptor::read(&mut stream)?;
            if is_bootstrap_id(desc.id) {
                return Err(ProtocolError::ReservedMessageId(desc.id));
            }
            if slots.insert(desc.id, declared.len()).is_some() {
                return Err(ProtocolError::DuplicateMessageId(desc.id));
            }
            declared.push(desc);
        }
        if !stream.is_empty() {
            return Err(ProtocolError::TrailingImportBytes(stream.remaining()));
        }

        // pass two: resolve handler and request tags
        let mut table = Self::default();
        for mut desc in declared {
            desc.route = Route::resolve(&desc.name);
            if let Route::Outbound(request) = desc.route {
                if table.requests.contains_key(&request) {
                    return Err(ProtocolError::DuplicateRequest(desc.name));
                }
            }
            table.insert(desc);
        }

        log::debug!(
            "Imported {} messages ({} requests)",
            table.by_id.len(),
            table.requests.len()
        );
        Ok(table)
    }

    pub fn encode_import(descriptors: &[MessageDescriptor]) -> Bytes {
        let mut writer = StreamWriter::new();
        writer.write_u16(descriptors.len() as u16);
        for desc in descriptors {
            desc.write(&mut writer);
        }
        writer.freeze()
    }

    pub fn get(&self, id: u16) -> Option<&MessageDescriptor> {
        self.by_id.get(&id)
    }

    pub fn request(&self, request: ServerRequest) -> Option<&MessageDescriptor> {
        self.requests.get(&request).and_then(|id| self.by_id.get(id))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &MessageDescriptor> {
        self.by_id.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::def::Value;
    use crate::net::MessageReader;
    use crate::protocol::{ClientHandler, MessageLength};
    use glam::{Vec2, Vec3, Vec4};

    fn sample() -> Vec<MessageDescriptor> {
        use PrimitiveKind::*;
        vec![
            MessageDescriptor::with_args(10, "Loginapp_login", &[Int8, Blob, String, String]),
            MessageDescriptor::with_args(11, "Client_onLoginFailed", &[Uint16, Blob]),
            MessageDescriptor::with_args(12, "Client_onAppActiveTickCB", &[]),
            MessageDescriptor::stream(13, "Client_onUpdatePropertys"),
            MessageDescriptor::with_args(14, "Loginapp_somethingUnknown", &[Uint8]),
        ]
    }

    #[test]
    fn import_resolves_routes() {
        let table = MessageTable::import(MessageTable::encode_import(&sample())).unwrap();
        assert_eq!(table.len(), 5);
        assert_eq!(
            table.get(11).unwrap().route,
            Route::Inbound(ClientHandler::LoginFailed)
        );
        assert_eq!(table.request(ServerRequest::Login).unwrap().id, 10);
        assert_eq!(table.get(12).unwrap().length, MessageLength::Fixed(0));
        assert_eq!(table.get(14).unwrap().route, Route::Unhandled);
    }

    #[test]
    fn import_rejects_duplicate_id() {
        let mut descs = sample();
        descs.push(MessageDescriptor::with_args(11, "Client_onKicked", &[PrimitiveKind::Uint16]));
        assert_eq!(
            MessageTable::import(MessageTable::encode_import(&descs)),
            Err(ProtocolError::DuplicateMessageId(11))
        );
    }

    #[test]
    fn import_rejects_bootstrap_id() {
        let descs = vec![MessageDescriptor::with_args(ON_HELLO_CB, "Client_onKicked", &[])];
        assert_eq!(
            MessageTable::import(MessageTable::encode_import(&descs)),
            Err(ProtocolError::ReservedMessageId(ON_HELLO_CB))
        );
    }

    #[test]
    fn import_rejects_unknown_type_tag() {
        let mut writer = StreamWriter::new();
        writer.write_u16(1);
        writer.write_u16(10);
        writer.write_i16(-1);
        writer.write_string("Client_onKicked");
        writer.write_u8(0);
        writer.write_u8(1);
        writer.write_u8(99);
        assert_eq!(
            MessageTable::import(writer.freeze()),
            Err(ProtocolError::UnknownTypeTag(99))
        );
    }

    #[test]
    fn import_rejects_short_body() {
        let body = MessageTable::encode_import(&sample());
        let truncated = body.slice(..body.len() - 2);
        assert!(matches!(
            MessageTable::import(truncated),
            Err(ProtocolError::Stream(_))
        ));
    }

    #[test]
    fn args_roundtrip_through_table() {
        let table = MessageTable::import(MessageTable::encode_import(&sample())).unwrap();
        let desc = table.request(ServerRequest::Login).unwrap();
        let args = vec![
            Value::Int8(5),
            Value::Blob(vec![1, 2, 3]),
            Value::String("kira".into()),
            Value::String("secret".into()),
        ];
        let frame = desc.encode_args(&args).unwrap();

        let mut stream = MemoryStream::new(frame);
        assert_eq!(stream.read_u16().unwrap(), desc.id);
        let len = stream.read_u16().unwrap() as usize;
        let payload = stream.read_bytes(len).unwrap();
        assert_eq!(desc.decode_args(payload).unwrap(), args);
    }

    // one value per kind, in `PrimitiveKind::ALL` order
    fn lowest_values() -> Vec<Value> {
        vec![
            Value::String(String::new()),
            Value::Uint8(0),
            Value::Uint16(0),
            Value::Uint32(0),
            Value::Uint64(0),
            Value::Int8(i8::MIN),
            Value::Int16(i16::MIN),
            Value::Int32(i32::MIN),
            Value::Int64(i64::MIN),
            Value::Float(f32::MIN),
            Value::Double(f64::MIN),
            Value::Blob(Vec::new()),
            Value::Unicode(String::new()),
            Value::Vector2(Vec2::ZERO),
            Value::Vector3(Vec3::ZERO),
            Value::Vector4(Vec4::ZERO),
            Value::Bool(false),
        ]
    }

    fn highest_values(blob: Vec<u8>) -> Vec<Value> {
        vec![
            Value::String("login.example.net".into()),
            Value::Uint8(u8::MAX),
            Value::Uint16(u16::MAX),
            Value::Uint32(u32::MAX),
            Value::Uint64(u64::MAX),
            Value::Int8(i8::MAX),
            Value::Int16(i16::MAX),
            Value::Int32(i32::MAX),
            Value::Int64(i64::MAX),
            Value::Float(f32::MAX),
            Value::Double(f64::MAX),
            Value::Blob(blob),
            Value::Unicode("ключ\0値".into()),
            Value::Vector2(Vec2::new(-1.5, 2.0)),
            Value::Vector3(Vec3::new(f32::MIN, 0.0, f32::MAX)),
            Value::Vector4(Vec4::new(1.0, -2.0, 3.0, -4.0)),
            Value::Bool(true),
        ]
    }

    #[test]
    fn every_primitive_survives_framing() {
        let descs = vec![
            MessageDescriptor::with_args(20, "Client_onEveryKind", &PrimitiveKind::ALL),
            MessageDescriptor::with_args(
                21,
                "Client_onFixedKinds",
                &[PrimitiveKind::Int64, PrimitiveKind::Uint64, PrimitiveKind::Vector4],
            ),
        ];
        let table = MessageTable::import(MessageTable::encode_import(&descs)).unwrap();
        let every = table.get(20).unwrap();
        let fixed = table.get(21).unwrap();
        assert_eq!(every.length, MessageLength::Variable);
        assert_eq!(fixed.length, MessageLength::Fixed(32));

        let messages = vec![
            (every, lowest_values()),
            (every, highest_values(vec![0, 0xff, 0])),
            // past u16::MAX the frame switches to the u32 length
            (every, highest_values(vec![7; 70_000])),
            (
                fixed,
                vec![
                    Value::Int64(i64::MIN),
                    Value::Uint64(u64::MAX),
                    Value::Vector4(Vec4::splat(f32::MIN)),
                ],
            ),
        ];

        let mut reader = MessageReader::new();
        for (desc, args) in &messages {
            reader.push(&desc.encode_args(args).unwrap());
        }
        for (desc, args) in &messages {
            let frame = reader
                .next_frame(|id| table.get(id).map(|desc| desc.length))
                .unwrap()
                .unwrap();
            assert_eq!(frame.id, desc.id);
            assert_eq!(&desc.decode_args(frame.payload).unwrap(), args);
        }
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn string_with_nul_is_not_encoded() {
        let table = MessageTable::import(MessageTable::encode_import(&sample())).unwrap();
        let desc = table.request(ServerRequest::Login).unwrap();
        let args = [
            Value::Int8(5),
            Value::Blob(Vec::new()),
            Value::String("ki\0ra".into()),
            Value::String("pw".into()),
        ];
        assert_eq!(
            desc.encode_args(&args),
            Err(ProtocolError::ArgumentMismatch {
                message: "Loginapp_login".to_string(),
                index: 2,
            })
        );
    }
}
