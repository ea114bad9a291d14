use std::borrow::Cow;
use std::collections::VecDeque;
use std::time::Instant;

use bytes::Bytes;

use crate::def::{EntityDefCatalog, MethodKind, Value};
use crate::entity::{Entity, EntityError, EntityId, EntityRegistry, RegistryEvent, SpaceId};
use crate::net::{Connector, Frame, MessageReader, NetworkStats, ServerAddress, Transport};
use crate::persist::{SchemaDigest, SchemaStore};
use crate::protocol::{
    ArgStyle, Args, ClientHandler, MessageDescriptor, MessageTable, ProtocolError, Route,
    ServerRequest,
};
use crate::stream::{MemoryStream, StreamError};

use super::catalog::CatalogState;
use super::config::SessionConfig;
use super::error::{SessionError, Stage, VersionReport};
use super::event::SessionEvent;
use super::state::{ConnectionState, Tier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthIntent {
    Login,
    CreateAccount,
    ResetPassword,
}

#[derive(Debug, Clone)]
struct Credentials {
    username: String,
    password: String,
    attachment: Bytes,
}

/// What the gameplay tier handed out at login, kept for re-login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameplaySession {
    pub address: ServerAddress,
    pub account: String,
    pub session_key: u64,
    pub entity_uuid: u64,
    pub entity_id: Option<EntityId>,
    pub entity_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerVersions {
    pub version: String,
    pub script_version: String,
}

pub struct SessionController {
    config: SessionConfig,
    connector: Box<dyn Connector>,
    store: Box<dyn SchemaStore>,
    state: ConnectionState,
    tier: Tier,
    transport: Option<Box<dyn Transport>>,
    connection: u64,
    reader: MessageReader,
    bootstrap: MessageTable,
    catalogs: CatalogState,
    registry: EntityRegistry,
    events: VecDeque<SessionEvent>,
    intent: AuthIntent,
    credentials: Option<Credentials>,
    gameplay: Option<GameplaySession>,
    relogin: bool,
    server_versions: Option<ServerVersions>,
    server_datas: Bytes,
    last_failure: Option<SessionError>,
    dirty_properties: Vec<String>,
    clock: Instant,
    last_heard: Instant,
    last_tick: Instant,
    stats: NetworkStats,
    shut_down: bool,
}

impl SessionController {
    pub fn initialize(
        config: SessionConfig,
        connector: Box<dyn Connector>,
        mut store: Box<dyn SchemaStore>,
    ) -> Self {
        let mut catalogs = CatalogState::default();
        match store.load() {
            Ok(Some(schema)) => {
                let usable = config
                    .expected_digest
                    .as_ref()
                    .is_none_or(|expected| *expected == schema.digest);
                if !usable {
                    log::info!("Cached schema digest differs from the expected one, ignoring it");
                } else if let Err(e) = catalogs.install_persisted(&schema) {
                    log::warn!("Cached schema unusable: {e}");
                    if let Err(e) = store.clear() {
                        log::warn!("Failed to clear schema cache: {e}");
                    }
                } else {
                    log::info!(
                        "Installed cached schema (protocol {}, entitydef {})",
                        schema.digest.protocol,
                        schema.digest.entitydef
                    );
                }
            }
            Ok(None) => log::debug!("No cached schema"),
            Err(e) => {
                log::warn!("Cached schema unreadable, discarding it: {e}");
                if let Err(e) = store.clear() {
                    log::warn!("Failed to clear schema cache: {e}");
                }
            }
        }

        let now = Instant::now();
        let max_pending = config.max_pending_updates;
        Self {
            config,
            connector,
            store,
            state: ConnectionState::Disconnected,
            tier: Tier::Auth,
            transport: None,
            connection: 0,
            reader: MessageReader::new(),
            bootstrap: MessageTable::bootstrap(),
            catalogs,
            registry: EntityRegistry::new(max_pending),
            events: VecDeque::new(),
            intent: AuthIntent::Login,
            credentials: None,
            gameplay: None,
            relogin: false,
            server_versions: None,
            server_datas: Bytes::new(),
            last_failure: None,
            dirty_properties: Vec::new(),
            clock: now,
            last_heard: now,
            last_tick: now,
            stats: NetworkStats::default(),
            shut_down: false,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn last_failure(&self) -> Option<&SessionError> {
        self.last_failure.as_ref()
    }

    pub fn catalogs(&self) -> &CatalogState {
        &self.catalogs
    }

    pub fn gameplay_session(&self) -> Option<&GameplaySession> {
        self.gameplay.as_ref()
    }

    pub fn server_versions(&self) -> Option<&ServerVersions> {
        self.server_versions.as_ref()
    }

    pub fn server_datas(&self) -> &[u8] {
        &self.server_datas
    }

    pub fn stats(&self) -> NetworkStats {
        self.stats
    }

    pub fn server_error(&self, code: u16) -> Cow<'_, str> {
        match self.catalogs.errors() {
            Some(errors) => errors.describe(code),
            None => Cow::Owned(format!("unknown server error (code {code})")),
        }
    }

    pub fn player_id(&self) -> Option<EntityId> {
        self.registry.player_id()
    }

    pub fn player(&self) -> Option<&Entity> {
        self.registry.player()
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.registry.get(id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.registry.iter()
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn space_id(&self) -> Option<SpaceId> {
        self.registry.space().space_id()
    }

    pub fn space_data(&self, key: &str) -> Option<&str> {
        self.registry.space().get(key)
    }

    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain(..).collect()
    }

    pub fn poll_event(&mut self) -> Option<SessionEvent> {
        self.events.pop_front()
    }

    pub fn login(&mut self, username: &str, password: &str, attachment: &[u8]) -> Result<(), SessionError> {
        self.begin_auth("login", AuthIntent::Login, username, password, attachment)
    }

    pub fn create_account(
        &mut self,
        username: &str,
        password: &str,
        attachment: &[u8],
    ) -> Result<(), SessionError> {
        self.begin_auth("create_account", AuthIntent::CreateAccount, username, password, attachment)
    }

    /// Asks the login tier to mail a password reset for `username`.
    pub fn reset_password(&mut self, username: &str) -> Result<(), SessionError> {
        self.begin_auth("reset_password", AuthIntent::ResetPassword, username, "", b"")
    }

    fn begin_auth(
        &mut self,
        operation: &'static str,
        intent: AuthIntent,
        username: &str,
        password: &str,
        attachment: &[u8],
    ) -> Result<(), SessionError> {
        self.require_idle(operation)?;
        self.clock = Instant::now();
        self.intent = intent;
        self.credentials = Some(Credentials {
            username: username.to_string(),
            password: password.to_string(),
            attachment: Bytes::copy_from_slice(attachment),
        });
        self.last_failure = None;
        self.relogin = false;
        if intent == AuthIntent::Login {
            self.gameplay = None;
        }

        log::info!("Connecting to login tier at {} as {username}", self.config.auth_address);
        self.transition(ConnectionState::ConnectingLogin);
        let address = self.config.auth_address.clone();
        self.open_transport(&address, Tier::Auth, Stage::ConnectLogin)
            .inspect_err(|e| self.fail(e.clone()))?;
        self.transition(ConnectionState::LoggingInLogin);
        self.send_hello().inspect_err(|e| self.fail(e.clone()))
    }

    pub fn relogin_gameplay_tier(&mut self) -> Result<(), SessionError> {
        self.require_idle("relogin_gameplay_tier")?;
        let session = self
            .gameplay
            .clone()
            .filter(|session| session.entity_id.is_some())
            .ok_or(SessionError::NoGameplaySession)?;
        self.clock = Instant::now();
        self.last_failure = None;
        self.relogin = true;

        log::info!("Re-logging into gameplay tier at {} as {}", session.address, session.account);
        self.transition(ConnectionState::ReconnectingBase);
        self.open_transport(&session.address, Tier::Gameplay, Stage::Relogin)
            .inspect_err(|e| self.fail(e.clone()))?;
        self.transition(ConnectionState::LoggingInBase);
        self.send_hello().inspect_err(|e| self.fail(e.clone()))
    }

    fn require_idle(&self, operation: &'static str) -> Result<(), SessionError> {
        if self.shut_down || self.state != ConnectionState::Disconnected {
            return Err(SessionError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Closes every transport and drops catalogs, entities and the cached
    /// gameplay session.
    pub fn reset(&mut self) {
        self.teardown();
        self.catalogs.reset();
        self.gameplay = None;
        self.credentials = None;
        self.server_datas = Bytes::new();
        if self.state != ConnectionState::Disconnected {
            self.transition(ConnectionState::Disconnected);
        }
    }

    /// `reset` plus permanent shutdown.
    pub fn destroy(&mut self) {
        self.reset();
        if !self.shut_down {
            log::info!("Session destroyed");
        }
        self.shut_down = true;
    }

    pub fn set_player_property(&mut self, name: &str, value: Value) -> Result<(), SessionError> {
        self.require_active("set_player_property")?;
        let player = self.require_player()?;
        let defs = loaded_defs(&self.catalogs)?;
        self.registry.set_property(defs, player, name, value)?;
        if !self.dirty_properties.iter().any(|dirty| dirty == name) {
            self.dirty_properties.push(name.to_string());
        }
        Ok(())
    }

    pub fn call_base_method(&mut self, method: &str, args: &[Value]) -> Result<(), SessionError> {
        self.require_active("call_base_method")?;
        let player = self.require_player()?;
        let defs = loaded_defs(&self.catalogs)?;
        let payload = self
            .registry
            .encode_method_call(defs, player, MethodKind::Base, method, args)?;
        self.send_stream(ServerRequest::RemoteMethodCall, &payload)
            .inspect_err(|e| self.fail(e.clone()))
    }

    fn require_active(&self, operation: &'static str) -> Result<(), SessionError> {
        if self.state != ConnectionState::Active {
            return Err(SessionError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    fn require_player(&self) -> Result<EntityId, SessionError> {
        self.registry.player_id().ok_or(SessionError::InvalidState {
            operation: "player access",
            state: self.state,
        })
    }

    pub fn process(&mut self) {
        self.process_at(Instant::now());
    }

    pub fn process_at(&mut self, now: Instant) {
        self.clock = now;
        self.pump();
        self.run_timers();
    }

    fn pump(&mut self) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        let chunks = match transport.receive() {
            Ok(chunks) => chunks,
            Err(e) => {
                self.fail(self.connection_failure(e));
                return;
            }
        };
        for chunk in &chunks {
            self.reader.push(chunk);
        }

        let connection = self.connection;
        while self.connection == connection {
            let bootstrap = &self.bootstrap;
            let tier_table = self.catalogs.messages(self.tier);
            let next = self.reader.next_frame(|id| {
                bootstrap
                    .get(id)
                    .or_else(|| tier_table.and_then(|table| table.get(id)))
                    .map(|desc| desc.length)
            });
            match next {
                Ok(Some(frame)) => {
                    self.stats.record_received(frame.payload.len());
                    // once active only heartbeat answers count
                    if self.state != ConnectionState::Active {
                        self.last_heard = self.clock;
                    }
                    if let Err(e) = self.dispatch(frame) {
                        self.fail(e);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    self.fail(e.into());
                    break;
                }
            }
        }
    }

    fn run_timers(&mut self) {
        if !self.state.is_connected() {
            return;
        }
        let silent = self.clock.saturating_duration_since(self.last_heard);
        if silent > self.config.liveness_window {
            log::error!("No answer from the {} tier for {silent:?}", self.tier);
            self.fail(SessionError::LivenessTimeout);
            return;
        }
        if self.state == ConnectionState::Active
            && self.clock.saturating_duration_since(self.last_tick) >= self.config.tick_interval
        {
            self.last_tick = self.clock;
            if let Err(e) = self.send_tick() {
                self.fail(e);
            }
        }
    }

    fn send_tick(&mut self) -> Result<(), SessionError> {
        self.send(ServerRequest::ActiveTick, &[])?;
        if self.dirty_properties.is_empty() {
            return Ok(());
        }
        let names = std::mem::take(&mut self.dirty_properties);
        let player = self.require_player()?;
        let defs = loaded_defs(&self.catalogs)?;
        match self.registry.encode_properties(defs, player, &names) {
            Ok(payload) => self.send_stream(ServerRequest::UpdatePropertiesFromClient, &payload),
            Err(e) => {
                log::warn!("Dropping local property changes: {e}");
                Ok(())
            }
        }
    }

    fn connection_failure(&self, err: impl std::fmt::Display) -> SessionError {
        let stage = match self.state {
            ConnectionState::ConnectingLogin => Stage::ConnectLogin,
            ConnectionState::ConnectingBase => Stage::ConnectGameplay,
            ConnectionState::ReconnectingBase => Stage::Relogin,
            _ => match self.tier {
                Tier::Auth => Stage::Login,
                Tier::Gameplay => Stage::Gameplay,
            },
        };
        SessionError::ConnectionFailure {
            stage,
            reason: err.to_string(),
        }
    }

    fn transition(&mut self, to: ConnectionState) -> bool {
        let from = self.state;
        if !from.can_transition_to(to) {
            log::warn!("Refusing transition {from} -> {to}");
            return false;
        }
        log::info!("Session {from} -> {to}");
        self.state = to;
        self.events.push_back(SessionEvent::StateChanged { from, to });
        true
    }

    fn open_transport(
        &mut self,
        address: &ServerAddress,
        tier: Tier,
        stage: Stage,
    ) -> Result<(), SessionError> {
        match self.connector.connect(address, self.config.connect_timeout) {
            Ok(transport) => {
                if let Some(mut previous) = self.transport.replace(transport) {
                    previous.close();
                }
                self.connection += 1;
                self.reader.clear();
                self.tier = tier;
                self.last_heard = self.clock;
                self.stats.connections_opened += 1;
                log::debug!("Connected to {tier} tier at {address}");
                Ok(())
            }
            Err(e) => Err(SessionError::ConnectionFailure {
                stage,
                reason: format!("{address}: {e}"),
            }),
        }
    }

    fn teardown(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.connection += 1;
        self.reader.clear();
        self.catalogs.clear_chunks();
        self.registry.clear();
        self.registry.take_events();
        self.dirty_properties.clear();
    }

    fn fail(&mut self, err: SessionError) {
        log::error!("Session failed: {err}");
        self.teardown();
        if matches!(err, SessionError::Kicked { .. }) {
            self.gameplay = None;
        }
        if self.state != ConnectionState::Disconnected {
            self.transition(ConnectionState::Disconnected);
        }
        self.last_failure = Some(err.clone());
        self.events.push_back(SessionEvent::Failed(err));
    }

    fn request_descriptor(&self, request: ServerRequest) -> Result<&MessageDescriptor, SessionError> {
        self.bootstrap
            .request(request)
            .or_else(|| {
                self.catalogs
                    .messages(self.tier)
                    .and_then(|table| table.request(request))
            })
            .ok_or(SessionError::UnknownRequest(request))
    }

    fn send(&mut self, request: ServerRequest, args: &[Value]) -> Result<(), SessionError> {
        let frame = self.request_descriptor(request)?.encode_args(args)?;
        self.send_frame(&frame)
    }

    fn send_stream(&mut self, request: ServerRequest, payload: &[u8]) -> Result<(), SessionError> {
        let frame = self.request_descriptor(request)?.frame(payload)?;
        self.send_frame(&frame)
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<(), SessionError> {
        let result = match self.transport.as_mut() {
            Some(transport) => transport.send(frame),
            None => Err(std::io::ErrorKind::NotConnected.into()),
        };
        match result {
            Ok(()) => {
                self.stats.record_sent(frame.len());
                Ok(())
            }
            Err(e) => Err(self.connection_failure(e)),
        }
    }

    fn send_hello(&mut self) -> Result<(), SessionError> {
        let args = [
            Value::String(self.config.client_version.clone()),
            Value::String(self.config.client_script_version.clone()),
            Value::Blob(Vec::new()),
        ];
        self.send(ServerRequest::Hello, &args)
    }

    fn dispatch(&mut self, frame: Frame) -> Result<(), SessionError> {
        let (route, args) = {
            let desc = self
                .bootstrap
                .get(frame.id)
                .or_else(|| {
                    self.catalogs
                        .messages(self.tier)
                        .and_then(|table| table.get(frame.id))
                })
                .ok_or(ProtocolError::UnknownMessage(frame.id))?;
            let args = match (desc.style, desc.route) {
                (ArgStyle::Fixed, Route::Inbound(_)) => desc.decode_args(frame.payload.clone())?,
                _ => Vec::new(),
            };
            (desc.route, args)
        };

        let handler = match route {
            Route::Inbound(handler) => handler,
            _ => {
                log::debug!("Skipping unhandled message {} ({} bytes)", frame.id, frame.payload.len());
                return Ok(());
            }
        };
        log::debug!("<- {}", handler.name());
        let mut args = Args::new(handler.name(), args);
        let payload = frame.payload;

        match handler {
            ClientHandler::HelloCB => self.on_hello_cb(&mut args),
            ClientHandler::VersionNotMatch => {
                let server = args.string()?;
                Err(SessionError::VersionMismatch(VersionReport::Engine {
                    client: self.config.client_version.clone(),
                    server,
                }))
            }
            ClientHandler::ScriptVersionNotMatch => {
                let server = args.string()?;
                Err(SessionError::VersionMismatch(VersionReport::Script {
                    client: self.config.client_script_version.clone(),
                    server,
                }))
            }
            ClientHandler::ImportClientMessages => {
                self.catalogs.append_message_chunk(&payload);
                Ok(())
            }
            ClientHandler::ImportClientMessagesCompleted => {
                if self.catalogs.finish_messages(self.tier)? {
                    self.events
                        .push_back(SessionEvent::SchemaImported { tier: self.tier });
                }
                self.advance()
            }
            ClientHandler::ImportServerErrorsDescr => {
                self.catalogs.install_errors(payload)?;
                self.advance()
            }
            ClientHandler::ImportClientEntityDef => {
                self.catalogs.append_entity_def_chunk(&payload);
                Ok(())
            }
            ClientHandler::ImportClientEntityDefCompleted => {
                if self.catalogs.finish_entity_defs()? {
                    self.events
                        .push_back(SessionEvent::SchemaImported { tier: self.tier });
                }
                self.advance()
            }
            ClientHandler::LoginFailed => {
                let code = args.u16()?;
                self.server_datas = args.blob()?;
                Err(SessionError::AuthFailure {
                    code,
                    description: self.server_error(code).into_owned(),
                })
            }
            ClientHandler::LoginSuccessfully => self.on_login_successfully(&mut args),
            ClientHandler::CreateAccountResult => {
                let code = args.u16()?;
                let server_datas = args.blob()?;
                let description = self.server_error(code).into_owned();
                log::info!("Account creation answered {code}: {description}");
                self.server_datas = server_datas.clone();
                self.events.push_back(SessionEvent::AccountCreated {
                    code,
                    description,
                    server_datas,
                });
                self.teardown();
                self.transition(ConnectionState::Disconnected);
                Ok(())
            }
            ClientHandler::ReqAccountResetPasswordCB => {
                let code = args.u16()?;
                let description = self.server_error(code).into_owned();
                log::info!("Password reset answered {code}: {description}");
                self.events
                    .push_back(SessionEvent::PasswordResetRequested { code, description });
                self.teardown();
                self.transition(ConnectionState::Disconnected);
                Ok(())
            }
            ClientHandler::LoginBaseappFailed => {
                let code = args.u16()?;
                Err(SessionError::AuthFailure {
                    code,
                    description: self.server_error(code).into_owned(),
                })
            }
            ClientHandler::ReloginBaseappFailed => {
                let code = args.u16()?;
                Err(SessionError::ReLoginFailure {
                    code,
                    description: self.server_error(code).into_owned(),
                })
            }
            ClientHandler::ReloginBaseappSuccessfully => self.on_relogin_successfully(&mut args),
            ClientHandler::CreatedProxies => self.on_created_proxies(&mut args),
            ClientHandler::EntityEnterWorld => self.on_entity_enter_world(payload),
            ClientHandler::EntityLeaveWorld => {
                let id = args.i32()?;
                if Some(id) == self.registry.player_id() {
                    log::debug!("Player left its own view, keeping it");
                    return Ok(());
                }
                self.with_registry(|registry, defs| registry.destroy_entity(defs, id))
            }
            ClientHandler::EntityDestroyed => {
                let id = args.i32()?;
                self.with_registry(|registry, defs| registry.destroy_entity(defs, id))
            }
            ClientHandler::UpdatePropertys => {
                self.with_registry(|registry, defs| registry.apply_update(defs, payload))
            }
            ClientHandler::UpdatePropertysOptimized => {
                self.with_registry(|registry, defs| registry.apply_optimized_update(defs, payload))
            }
            ClientHandler::RemoteMethodCall => {
                let call = self
                    .catalogs
                    .entity_defs()
                    .map(|defs| self.registry.decode_method_call(defs, payload));
                match call {
                    Some(Ok(call)) => self.events.push_back(SessionEvent::EntityMethod(call)),
                    Some(Err(e)) => log::warn!("Dropping entity method call: {e}"),
                    None => log::warn!("Entity method call before entity defs"),
                }
                Ok(())
            }
            ClientHandler::Kicked => {
                let code = args.u16()?;
                Err(SessionError::Kicked {
                    code,
                    description: self.server_error(code).into_owned(),
                })
            }
            ClientHandler::AppActiveTickCB => {
                self.last_heard = self.clock;
                Ok(())
            }
            ClientHandler::InitSpaceData => self.on_init_space_data(payload),
            ClientHandler::SetSpaceData => {
                let space_id = args.u32()?;
                let key = args.string()?;
                let value = args.string()?;
                self.registry.set_space_data(space_id, key.clone(), value);
                self.events.push_back(SessionEvent::SpaceDataChanged {
                    space_id,
                    key: Some(key),
                });
                Ok(())
            }
            ClientHandler::DelSpaceData => {
                let space_id = args.u32()?;
                let key = args.string()?;
                self.registry.del_space_data(space_id, &key);
                self.events.push_back(SessionEvent::SpaceDataChanged {
                    space_id,
                    key: Some(key),
                });
                Ok(())
            }
        }
    }

    /// Entity traffic problems are logged, never fatal.
    fn with_registry(
        &mut self,
        apply: impl FnOnce(&mut EntityRegistry, &EntityDefCatalog) -> Result<(), EntityError>,
    ) -> Result<(), SessionError> {
        let Some(defs) = self.catalogs.entity_defs() else {
            log::warn!("Entity traffic before entity defs, dropping it");
            return Ok(());
        };
        if let Err(e) = apply(&mut self.registry, defs) {
            log::warn!("Entity update rejected: {e}");
        }
        self.drain_registry_events();
        Ok(())
    }

    fn drain_registry_events(&mut self) {
        for event in self.registry.take_events() {
            let event = match event {
                RegistryEvent::Created { id, type_name } => SessionEvent::EntityCreated {
                    id,
                    entity_type: type_name,
                },
                RegistryEvent::Updated { id, properties } => {
                    SessionEvent::EntityUpdated { id, properties }
                }
                RegistryEvent::Destroyed { id, type_name } => SessionEvent::EntityDestroyed {
                    id,
                    entity_type: type_name,
                },
                RegistryEvent::PlayerDestroyed { id } => {
                    self.events.push_back(SessionEvent::PlayerDestroyed { id });
                    log::info!("Player entity {id} destroyed by the server");
                    if let Some(mut transport) = self.transport.take() {
                        transport.close();
                    }
                    self.connection += 1;
                    self.reader.clear();
                    self.dirty_properties.clear();
                    if self.state != ConnectionState::Disconnected {
                        self.transition(ConnectionState::Disconnected);
                    }
                    continue;
                }
            };
            self.events.push_back(event);
        }
    }

    fn on_hello_cb(&mut self, args: &mut Args) -> Result<(), SessionError> {
        let version = args.string()?;
        let script_version = args.string()?;
        let digest = SchemaDigest {
            protocol: args.string()?,
            entitydef: args.string()?,
        };
        let client_type = args.i32()?;
        log::info!(
            "{} tier hello: server {version}, scripts {script_version}, client type {client_type}",
            self.tier
        );

        let changed = self
            .catalogs
            .digest()
            .is_some_and(|current| *current != digest);
        if changed {
            log::info!("Server schema changed, discarding catalogs");
            self.catalogs.reset();
            if let Err(e) = self.store.clear() {
                log::warn!("Failed to clear schema cache: {e}");
            }
        }
        if self.catalogs.is_complete() && (self.tier == Tier::Auth || self.relogin) {
            self.events.push_back(SessionEvent::SchemaReused {
                digest: digest.clone(),
            });
        }
        self.catalogs.set_digest(digest.clone());
        self.server_versions = Some(ServerVersions {
            version: version.clone(),
            script_version: script_version.clone(),
        });
        self.events.push_back(SessionEvent::HelloAccepted {
            tier: self.tier,
            server_version: version,
            server_script_version: script_version,
            digest,
        });
        self.advance()
    }

    /// Requests whatever the current tier still has to import, then logs in.
    fn advance(&mut self) -> Result<(), SessionError> {
        match self.tier {
            Tier::Auth => {
                if self.state != ConnectionState::LoggingInLogin {
                    return Ok(());
                }
                if self.catalogs.messages(Tier::Auth).is_none() {
                    return self.send(ServerRequest::ImportClientMessages, &[]);
                }
                if self.catalogs.errors().is_none() {
                    return self.send(ServerRequest::ImportServerErrorsDescr, &[]);
                }
                self.send_credentials()
            }
            Tier::Gameplay => {
                if self.state != ConnectionState::LoggingInBase {
                    return Ok(());
                }
                if self.catalogs.messages(Tier::Gameplay).is_none() {
                    return self.send(ServerRequest::ImportClientMessages, &[]);
                }
                if self.catalogs.entity_defs().is_none() {
                    return self.send(ServerRequest::ImportClientEntityDef, &[]);
                }
                self.persist_schema();
                self.send_gameplay_login()
            }
        }
    }

    fn persist_schema(&mut self) {
        if !self.config.persist_schema || !self.catalogs.take_fresh() {
            return;
        }
        let Some(schema) = self.catalogs.to_persisted() else {
            return;
        };
        match self.store.save(&schema) {
            Ok(()) => log::info!("Schema cached (protocol {})", schema.digest.protocol),
            Err(e) => log::warn!("Failed to cache schema: {e}"),
        }
    }

    fn send_credentials(&mut self) -> Result<(), SessionError> {
        let Some(credentials) = self.credentials.clone() else {
            return Err(SessionError::InvalidState {
                operation: "send credentials",
                state: self.state,
            });
        };
        match self.intent {
            AuthIntent::Login => {
                log::info!("Logging in as {}", credentials.username);
                self.send(
                    ServerRequest::Login,
                    &[
                        Value::Int8(self.config.client_type),
                        Value::Blob(credentials.attachment.to_vec()),
                        Value::String(credentials.username),
                        Value::String(credentials.password),
                    ],
                )
            }
            AuthIntent::ResetPassword => {
                log::info!("Requesting password reset for {}", credentials.username);
                self.send(
                    ServerRequest::ResetPassword,
                    &[Value::String(credentials.username)],
                )
            }
            AuthIntent::CreateAccount => {
                log::info!("Creating account {}", credentials.username);
                self.send(
                    ServerRequest::CreateAccount,
                    &[
                        Value::String(credentials.username),
                        Value::String(credentials.password),
                        Value::Blob(credentials.attachment.to_vec()),
                    ],
                )
            }
        }
    }

    fn on_login_successfully(&mut self, args: &mut Args) -> Result<(), SessionError> {
        let account = args.string()?;
        let host = args.string()?;
        let port = args.u16()?;
        let session_key = args.u64()?;
        self.server_datas = args.blob()?;

        let address = ServerAddress::new(&host, port);
        log::info!("Login accepted for {account}, gameplay tier at {address}");
        self.gameplay = Some(GameplaySession {
            address: address.clone(),
            account: account.clone(),
            session_key,
            entity_uuid: 0,
            entity_id: None,
            entity_type: None,
        });
        self.events.push_back(SessionEvent::LoginSucceeded {
            account,
            gameplay: address.clone(),
        });

        self.transition(ConnectionState::ConnectingBase);
        // replaces and closes the auth transport
        self.open_transport(&address, Tier::Gameplay, Stage::ConnectGameplay)?;
        self.transition(ConnectionState::LoggingInBase);
        self.send_hello()
    }

    fn send_gameplay_login(&mut self) -> Result<(), SessionError> {
        let session = self.gameplay.clone().ok_or(SessionError::NoGameplaySession)?;
        if self.relogin {
            let entity_id = session.entity_id.ok_or(SessionError::NoGameplaySession)?;
            self.send(
                ServerRequest::ReloginBaseapp,
                &[
                    Value::String(session.account),
                    Value::Uint64(session.session_key),
                    Value::Uint64(session.entity_uuid),
                    Value::Int32(entity_id),
                ],
            )
        } else {
            self.send(
                ServerRequest::LoginBaseapp,
                &[
                    Value::String(session.account),
                    Value::Uint64(session.session_key),
                ],
            )
        }
    }

    fn on_created_proxies(&mut self, args: &mut Args) -> Result<(), SessionError> {
        let uuid = args.u64()?;
        let id = args.i32()?;
        let entity_type = args.string()?;
        if let Some(session) = self.gameplay.as_mut() {
            session.entity_uuid = uuid;
            session.entity_id = Some(id);
            session.entity_type = Some(entity_type.clone());
        }
        self.enter_world(id, &entity_type, false)
    }

    fn on_relogin_successfully(&mut self, args: &mut Args) -> Result<(), SessionError> {
        let uuid = args.u64()?;
        let session = self.gameplay.as_mut().ok_or(SessionError::NoGameplaySession)?;
        session.entity_uuid = uuid;
        let id = session.entity_id.ok_or(SessionError::NoGameplaySession)?;
        let entity_type = session
            .entity_type
            .clone()
            .ok_or(SessionError::NoGameplaySession)?;
        self.enter_world(id, &entity_type, true)
    }

    fn enter_world(&mut self, id: EntityId, entity_type: &str, relogin: bool) -> Result<(), SessionError> {
        let defs = loaded_defs(&self.catalogs)?;
        let type_id = defs
            .by_name(entity_type)
            .ok_or_else(|| SessionError::UnknownEntityType(entity_type.to_string()))?;
        if self.registry.get(id).is_none() {
            self.registry.create_entity(defs, id, type_id, Bytes::new())?;
        }
        self.registry.set_player(id);
        self.drain_registry_events();

        self.last_heard = self.clock;
        self.last_tick = self.clock;
        if self.transition(ConnectionState::Active) {
            log::info!("Player {id} ({entity_type}) in world");
            self.events.push_back(SessionEvent::EnteredWorld {
                player: id,
                entity_type: entity_type.to_string(),
                relogin,
            });
        }
        Ok(())
    }

    fn on_entity_enter_world(&mut self, payload: Bytes) -> Result<(), SessionError> {
        let mut stream = MemoryStream::new(payload);
        let id = stream.read_i32().map_err(ProtocolError::from)?;
        let utype = stream.read_u16().map_err(ProtocolError::from)?;
        let initial = stream.read_remaining();
        self.with_registry(|registry, defs| {
            let type_id = defs
                .by_utype(utype)
                .ok_or(EntityError::UnknownEntityType(utype))?;
            registry.create_entity(defs, id, type_id, initial)
        })
    }

    fn on_init_space_data(&mut self, payload: Bytes) -> Result<(), SessionError> {
        let mut stream = MemoryStream::new(payload);
        let read = |stream: &mut MemoryStream| -> Result<_, StreamError> {
            let space_id = stream.read_u32()?;
            let mut values = Vec::new();
            while !stream.is_empty() {
                let key = stream.read_string()?;
                let value = stream.read_string()?;
                values.push((key, value));
            }
            Ok((space_id, values))
        };
        let (space_id, values) = read(&mut stream).map_err(ProtocolError::from)?;
        log::debug!("Space {space_id} initialized with {} entries", values.len());
        self.registry.init_space_data(space_id, values);
        self.events.push_back(SessionEvent::SpaceDataChanged { space_id, key: None });
        Ok(())
    }
}

fn loaded_defs(catalogs: &CatalogState) -> Result<&EntityDefCatalog, SessionError> {
    catalogs
        .entity_defs()
        .ok_or_else(|| SessionError::schema("entity defs not imported"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::MemoryNetwork;
    use crate::persist::MemorySchemaStore;

    fn controller(network: &MemoryNetwork) -> SessionController {
        SessionController::initialize(
            SessionConfig::default(),
            Box::new(network.connector()),
            Box::new(MemorySchemaStore::new()),
        )
    }

    #[test]
    fn refused_connect_fails_back_to_disconnected() {
        let network = MemoryNetwork::new();
        let mut session = controller(&network);
        let err = session.login("kira", "pw", b"").unwrap_err();
        assert!(matches!(
            err,
            SessionError::ConnectionFailure {
                stage: Stage::ConnectLogin,
                ..
            }
        ));
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(session.last_failure(), Some(&err));

        let failures = session
            .take_events()
            .into_iter()
            .filter(|event| matches!(event, SessionEvent::Failed(_)))
            .count();
        assert_eq!(failures, 1);
    }

    #[test]
    fn operations_check_preconditions() {
        let network = MemoryNetwork::new();
        let mut session = controller(&network);
        assert_eq!(
            session.relogin_gameplay_tier(),
            Err(SessionError::NoGameplaySession)
        );
        assert!(matches!(
            session.set_player_property("level", Value::Uint8(1)),
            Err(SessionError::InvalidState { .. })
        ));
        assert!(matches!(
            session.call_base_method("jump", &[]),
            Err(SessionError::InvalidState { .. })
        ));
        assert!(session.take_events().is_empty());
    }

    #[test]
    fn login_while_connected_is_rejected() {
        let network = MemoryNetwork::new();
        let listener = network.listen(SessionConfig::default().auth_address);
        let mut session = controller(&network);
        session.login("kira", "pw", b"").unwrap();
        assert_eq!(session.state(), ConnectionState::LoggingInLogin);
        assert!(listener.accept().is_some());

        assert!(matches!(
            session.login("kira", "pw", b""),
            Err(SessionError::InvalidState {
                operation: "login",
                state: ConnectionState::LoggingInLogin,
            })
        ));
        assert_eq!(session.state(), ConnectionState::LoggingInLogin);
    }

    #[test]
    fn destroyed_session_refuses_login() {
        let network = MemoryNetwork::new();
        let _listener = network.listen(SessionConfig::default().auth_address);
        let mut session = controller(&network);
        session.destroy();
        assert!(matches!(
            session.login("kira", "pw", b""),
            Err(SessionError::InvalidState { .. })
        ));
    }

    #[test]
    fn server_error_falls_back_without_catalog() {
        let network = MemoryNetwork::new();
        let session = controller(&network);
        assert_eq!(session.server_error(7), "unknown server error (code 7)");
    }
}
