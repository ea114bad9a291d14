#![allow(dead_code)]

use std::time::Instant;

use bytes::Bytes;
use tether::def::{
    DataTypeDecl, EntityDefDecl, EntityTypeDecl, MethodKind, PrimitiveKind, PropertyFlags, Value,
};
use tether::errors::{ErrorCatalog, ServerErrorDescriptor};
use tether::net::{
    Connector, MemoryListener, MemoryNetwork, MemoryTransport, MessageReader, ServerAddress,
    Transport,
};
use tether::persist::SchemaDigest;
use tether::protocol::{ArgStyle, MessageDescriptor, MessageTable};
use tether::session::{SessionConfig, SessionController, Tier};
use tether::stream::StreamWriter;

pub const AUTH_HOST: &str = "login.test";
pub const AUTH_PORT: u16 = 20013;
pub const GAMEPLAY_HOST: &str = "game.test";
pub const GAMEPLAY_PORT: u16 = 20015;

pub const SESSION_KEY: u64 = 0xfeed_beef;
pub const PLAYER_ID: i32 = 1001;
pub const PLAYER_UUID: u64 = 77;

pub const ERR_BAD_PASSWORD: u16 = 12;
pub const ERR_KICKED: u16 = 30;

// entity def utypes
pub const AVATAR: u16 = 1;
pub const MONSTER: u16 = 2;
pub const LEVEL: u16 = 41;
pub const NAME: u16 = 42;
pub const HP: u16 = 51;
pub const ON_CHAT: u16 = 60;
pub const JUMP: u16 = 61;

pub fn auth_address() -> ServerAddress {
    ServerAddress::new(AUTH_HOST, AUTH_PORT)
}

pub fn gameplay_address() -> ServerAddress {
    ServerAddress::new(GAMEPLAY_HOST, GAMEPLAY_PORT)
}

pub fn auth_messages() -> Vec<MessageDescriptor> {
    use PrimitiveKind::*;
    vec![
        MessageDescriptor::with_args(10, "Loginapp_login", &[Int8, Blob, String, String]),
        MessageDescriptor::with_args(11, "Loginapp_reqCreateAccount", &[String, String, Blob]),
        MessageDescriptor::with_args(12, "Loginapp_onClientActiveTick", &[]),
        MessageDescriptor::with_args(13, "Loginapp_reqAccountResetPassword", &[String]),
        MessageDescriptor::with_args(20, "Client_onLoginFailed", &[Uint16, Blob]),
        MessageDescriptor::with_args(
            21,
            "Client_onLoginSuccessfully",
            &[String, String, Uint16, Uint64, Blob],
        ),
        MessageDescriptor::with_args(22, "Client_onCreateAccountResult", &[Uint16, Blob]),
        MessageDescriptor::with_args(23, "Client_onAppActiveTickCB", &[]),
        MessageDescriptor::with_args(24, "Client_onReqAccountResetPasswordCB", &[Uint16]),
    ]
}

pub fn gameplay_messages() -> Vec<MessageDescriptor> {
    use PrimitiveKind::*;
    vec![
        MessageDescriptor::with_args(30, "Baseapp_loginBaseapp", &[String, Uint64]),
        MessageDescriptor::with_args(
            31,
            "Baseapp_reloginBaseapp",
            &[String, Uint64, Uint64, Int32],
        ),
        MessageDescriptor::with_args(32, "Baseapp_onClientActiveTick", &[]),
        MessageDescriptor::stream(33, "Baseapp_onUpdatePropertiesFromClient"),
        MessageDescriptor::stream(34, "Baseapp_onRemoteMethodCall"),
        MessageDescriptor::with_args(40, "Client_onLoginBaseappFailed", &[Uint16]),
        MessageDescriptor::with_args(41, "Client_onReloginBaseappFailed", &[Uint16]),
        MessageDescriptor::with_args(42, "Client_onReloginBaseappSuccessfully", &[Uint64]),
        MessageDescriptor::with_args(43, "Client_onCreatedProxies", &[Uint64, Int32, String]),
        MessageDescriptor::stream(44, "Client_onEntityEnterWorld"),
        MessageDescriptor::with_args(45, "Client_onEntityLeaveWorld", &[Int32]),
        MessageDescriptor::with_args(46, "Client_onEntityDestroyed", &[Int32]),
        MessageDescriptor::stream(47, "Client_onUpdatePropertys"),
        MessageDescriptor::stream(48, "Client_onUpdatePropertysOptimized"),
        MessageDescriptor::stream(49, "Client_onRemoteMethodCall"),
        MessageDescriptor::with_args(50, "Client_onKicked", &[Uint16]),
        MessageDescriptor::with_args(51, "Client_onAppActiveTickCB", &[]),
        MessageDescriptor::stream(52, "Client_initSpaceData"),
        MessageDescriptor::with_args(53, "Client_setSpaceData", &[Uint32, String, String]),
        MessageDescriptor::with_args(54, "Client_delSpaceData", &[Uint32, String]),
        // declared by the server, never handled by the client
        MessageDescriptor::with_args(55, "Client_onStreamDataStarted", &[Int16, Uint32]),
    ]
}

pub fn server_errors() -> Vec<ServerErrorDescriptor> {
    vec![
        ServerErrorDescriptor::new(0, "SUCCESS", "success"),
        ServerErrorDescriptor::new(ERR_BAD_PASSWORD, "NAME_PASSWORD", "wrong name or password"),
        ServerErrorDescriptor::new(ERR_KICKED, "ACCOUNT_LOGIN_ANOTHER", "logged in elsewhere"),
    ]
}

pub fn entity_defs() -> EntityDefDecl {
    EntityDefDecl {
        // PLAYER_NAME resolves through a later declaration
        data_types: vec![
            DataTypeDecl::alias(1, "UINT16", "UINT16"),
            DataTypeDecl::alias(3, "PLAYER_NAME", "DISPLAY_TEXT"),
            DataTypeDecl::alias(4, "INT32", "INT32"),
            DataTypeDecl::alias(5, "UINT8", "UINT8"),
            DataTypeDecl::alias(6, "DISPLAY_TEXT", "UNICODE"),
        ],
        entity_types: vec![
            EntityTypeDecl::new(AVATAR, "Avatar")
                .property(LEVEL, "level", 1, PropertyFlags::OWN_CLIENT)
                .property(NAME, "name", 3, PropertyFlags::OWN_CLIENT | PropertyFlags::OTHER_CLIENTS)
                .method(ON_CHAT, "onChat", MethodKind::Client, &[3])
                .method(JUMP, "jump", MethodKind::Base, &[5]),
            EntityTypeDecl::new(MONSTER, "Monster").property(
                HP,
                "hp",
                4,
                PropertyFlags::OTHER_CLIENTS,
            ),
        ],
    }
}

pub fn digest() -> SchemaDigest {
    SchemaDigest::new("proto-1", "defs-1")
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub tier: Tier,
    pub name: String,
    pub args: Vec<Value>,
    pub payload: Bytes,
}

/// Knobs for how the scripted server answers.
#[derive(Debug, Clone)]
pub struct Script {
    pub version: String,
    pub script_version: String,
    pub digest: SchemaDigest,
    pub reject_version: bool,
    pub reject_script_version: bool,
    pub login_error: Option<u16>,
    pub relogin_error: Option<u16>,
    pub answer_ticks: bool,
    pub entity_def_body: Option<Bytes>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            version: "2.5.0".to_string(),
            script_version: "0.1.0".to_string(),
            digest: digest(),
            reject_version: false,
            reject_script_version: false,
            login_error: None,
            relogin_error: None,
            answer_ticks: true,
            entity_def_body: None,
        }
    }
}

struct Peer {
    transport: MemoryTransport,
    reader: MessageReader,
}

pub struct FakeServer {
    network: MemoryNetwork,
    auth_listener: MemoryListener,
    gameplay_listener: MemoryListener,
    auth: Option<Peer>,
    gameplay: Option<Peer>,
    bootstrap: MessageTable,
    auth_table: MessageTable,
    gameplay_table: MessageTable,
    pub script: Script,
    pub requests: Vec<Request>,
}

impl FakeServer {
    pub fn new() -> Self {
        let network = MemoryNetwork::new();
        let auth_listener = network.listen(auth_address());
        let gameplay_listener = network.listen(gameplay_address());
        Self {
            auth_listener,
            gameplay_listener,
            network,
            auth: None,
            gameplay: None,
            bootstrap: MessageTable::bootstrap(),
            auth_table: MessageTable::import(MessageTable::encode_import(&auth_messages()))
                .unwrap(),
            gameplay_table: MessageTable::import(MessageTable::encode_import(&gameplay_messages()))
                .unwrap(),
            script: Script::default(),
            requests: Vec::new(),
        }
    }

    pub fn config(&self) -> SessionConfig {
        SessionConfig {
            auth_address: auth_address(),
            ..SessionConfig::default()
        }
    }

    pub fn connector(&self) -> Box<dyn Connector> {
        Box::new(self.network.connector())
    }

    pub fn count(&self, name: &str) -> usize {
        self.requests.iter().filter(|r| r.name == name).count()
    }

    pub fn last(&self, name: &str) -> Option<&Request> {
        self.requests.iter().rev().find(|r| r.name == name)
    }

    pub fn import_requests(&self) -> usize {
        self.count("importClientMessages")
            + self.count("importServerErrorsDescr")
            + self.count("importClientEntityDef")
    }

    pub fn auth_connected(&self) -> bool {
        self.auth.is_some()
    }

    pub fn gameplay_connected(&self) -> bool {
        self.gameplay.is_some()
    }

    /// Accepts pending connections, reads every request and answers it.
    pub fn serve(&mut self) {
        while let Some(transport) = self.auth_listener.accept() {
            self.auth = Some(Peer {
                transport,
                reader: MessageReader::new(),
            });
        }
        while let Some(transport) = self.gameplay_listener.accept() {
            self.gameplay = Some(Peer {
                transport,
                reader: MessageReader::new(),
            });
        }
        for tier in [Tier::Auth, Tier::Gameplay] {
            for request in self.receive(tier) {
                self.answer(tier, &request);
                self.requests.push(request);
            }
        }
    }

    fn receive(&mut self, tier: Tier) -> Vec<Request> {
        let (peer, table) = match tier {
            Tier::Auth => (&mut self.auth, &self.auth_table),
            Tier::Gameplay => (&mut self.gameplay, &self.gameplay_table),
        };
        let Some(connection) = peer.as_mut() else {
            return Vec::new();
        };
        match connection.transport.receive() {
            Ok(chunks) => {
                for chunk in &chunks {
                    connection.reader.push(chunk);
                }
            }
            Err(_) => {
                *peer = None;
                return Vec::new();
            }
        }

        let bootstrap = &self.bootstrap;
        let lookup = |id| bootstrap.get(id).or_else(|| table.get(id));
        let mut requests = Vec::new();
        while let Some(frame) = connection
            .reader
            .next_frame(|id| lookup(id).map(|desc| desc.length))
            .unwrap()
        {
            let desc = lookup(frame.id).unwrap();
            let args = match desc.style {
                ArgStyle::Fixed => desc.decode_args(frame.payload.clone()).unwrap(),
                ArgStyle::Stream => Vec::new(),
            };
            requests.push(Request {
                tier,
                name: desc.name.clone(),
                args,
                payload: frame.payload,
            });
        }
        requests
    }

    fn answer(&mut self, tier: Tier, request: &Request) {
        match request.name.as_str() {
            "hello" => {
                if self.script.reject_version {
                    let version = Value::String(self.script.version.clone());
                    self.push(tier, "Client_onVersionNotMatch", &[version]);
                } else if self.script.reject_script_version {
                    let version = Value::String(self.script.script_version.clone());
                    self.push(tier, "Client_onScriptVersionNotMatch", &[version]);
                } else {
                    let args = [
                        Value::String(self.script.version.clone()),
                        Value::String(self.script.script_version.clone()),
                        Value::String(self.script.digest.protocol.clone()),
                        Value::String(self.script.digest.entitydef.clone()),
                        Value::Int32(5),
                    ];
                    self.push(tier, "Client_onHelloCB", &args);
                }
            }
            "importClientMessages" => {
                let body = match tier {
                    Tier::Auth => MessageTable::encode_import(&auth_messages()),
                    Tier::Gameplay => MessageTable::encode_import(&gameplay_messages()),
                };
                self.push_chunked(tier, "Client_onImportClientMessages", &body);
                self.push(tier, "Client_onImportClientMessagesCompleted", &[]);
            }
            "importServerErrorsDescr" => {
                let body = ErrorCatalog::encode(&server_errors());
                self.push_stream(tier, "Client_onImportServerErrorsDescr", &body);
            }
            "importClientEntityDef" => {
                let body = self
                    .script
                    .entity_def_body
                    .clone()
                    .unwrap_or_else(|| entity_defs().encode());
                self.push_chunked(tier, "Client_onImportClientEntityDef", &body);
                self.push(tier, "Client_onImportClientEntityDefCompleted", &[]);
            }
            "Loginapp_login" => match self.script.login_error {
                Some(code) => self.push(
                    tier,
                    "Client_onLoginFailed",
                    &[Value::Uint16(code), Value::Blob(b"denied".to_vec())],
                ),
                None => {
                    let account = request.args[2].clone();
                    self.push(
                        tier,
                        "Client_onLoginSuccessfully",
                        &[
                            account,
                            Value::String(GAMEPLAY_HOST.to_string()),
                            Value::Uint16(GAMEPLAY_PORT),
                            Value::Uint64(SESSION_KEY),
                            Value::Blob(b"welcome".to_vec()),
                        ],
                    );
                }
            },
            "Loginapp_reqCreateAccount" => self.push(
                tier,
                "Client_onCreateAccountResult",
                &[Value::Uint16(0), Value::Blob(b"created".to_vec())],
            ),
            "Loginapp_reqAccountResetPassword" => {
                // only the scripted account exists
                let code = if request.args[0] == Value::String("kira".to_string()) {
                    0
                } else {
                    ERR_BAD_PASSWORD
                };
                self.push(tier, "Client_onReqAccountResetPasswordCB", &[Value::Uint16(code)]);
            }
            "Baseapp_loginBaseapp" => {
                if request.args[1] == Value::Uint64(SESSION_KEY) {
                    self.push(
                        tier,
                        "Client_onCreatedProxies",
                        &[
                            Value::Uint64(PLAYER_UUID),
                            Value::Int32(PLAYER_ID),
                            Value::String("Avatar".to_string()),
                        ],
                    );
                } else {
                    self.push(tier, "Client_onLoginBaseappFailed", &[Value::Uint16(ERR_BAD_PASSWORD)]);
                }
            }
            "Baseapp_reloginBaseapp" => match self.script.relogin_error {
                Some(code) => self.push(tier, "Client_onReloginBaseappFailed", &[Value::Uint16(code)]),
                None => self.push(
                    tier,
                    "Client_onReloginBaseappSuccessfully",
                    &[Value::Uint64(PLAYER_UUID + 1)],
                ),
            },
            "Loginapp_onClientActiveTick" | "Baseapp_onClientActiveTick" => {
                if self.script.answer_ticks {
                    self.push(tier, "Client_onAppActiveTickCB", &[]);
                }
            }
            _ => {}
        }
    }

    fn descriptor(&self, tier: Tier, name: &str) -> &MessageDescriptor {
        let table = match tier {
            Tier::Auth => &self.auth_table,
            Tier::Gameplay => &self.gameplay_table,
        };
        self.bootstrap
            .descriptors()
            .chain(table.descriptors())
            .find(|desc| desc.name == name)
            .unwrap_or_else(|| panic!("{tier} tier does not declare {name}"))
    }

    fn send(&mut self, tier: Tier, frame: &[u8]) {
        let peer = match tier {
            Tier::Auth => self.auth.as_mut(),
            Tier::Gameplay => self.gameplay.as_mut(),
        };
        peer.expect("tier not connected")
            .transport
            .send(frame)
            .unwrap();
    }

    pub fn push_raw(&mut self, tier: Tier, bytes: &[u8]) {
        self.send(tier, bytes);
    }

    pub fn push(&mut self, tier: Tier, name: &str, args: &[Value]) {
        let frame = self.descriptor(tier, name).encode_args(args).unwrap();
        self.send(tier, &frame);
    }

    pub fn push_stream(&mut self, tier: Tier, name: &str, payload: &[u8]) {
        let frame = self.descriptor(tier, name).frame(payload).unwrap();
        self.send(tier, &frame);
    }

    fn push_chunked(&mut self, tier: Tier, name: &str, body: &[u8]) {
        let (first, second) = body.split_at(body.len() / 2);
        self.push_stream(tier, name, first);
        self.push_stream(tier, name, second);
    }

    pub fn enter_world(&mut self, id: i32, utype: u16, initial: &[u8]) {
        let mut w = StreamWriter::new();
        w.write_i32(id);
        w.write_u16(utype);
        w.write_bytes(initial);
        self.push_stream(Tier::Gameplay, "Client_onEntityEnterWorld", &w.freeze());
    }

    pub fn kill_gameplay(&mut self) {
        if let Some(mut peer) = self.gameplay.take() {
            peer.transport.close();
        }
    }

    pub fn shutdown_gameplay(&mut self) {
        self.gameplay_listener.shutdown();
    }
}

pub fn session(server: &FakeServer) -> SessionController {
    SessionController::initialize(
        server.config(),
        server.connector(),
        Box::new(tether::persist::MemorySchemaStore::new()),
    )
}

/// Alternates server and client until the client has nothing left to do.
pub fn drive(session: &mut SessionController, server: &mut FakeServer) {
    drive_at(session, server, Instant::now());
}

pub fn drive_at(session: &mut SessionController, server: &mut FakeServer, now: Instant) {
    for _ in 0..16 {
        server.serve();
        session.process_at(now);
    }
}

pub fn login(session: &mut SessionController, server: &mut FakeServer) {
    session.login("kira", "secret", b"").unwrap();
    drive(session, server);
}
