use bytes::Bytes;

use crate::def::{PrimitiveKind, Value};
use crate::stream::{MemoryStream, StreamWriter};

use super::ProtocolError;

const EXTENDED_LENGTH_MARKER: u16 = u16::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageLength {
    Fixed(u16),
    Variable,
}

impl MessageLength {
    pub fn from_wire(length: i16) -> Result<Self, ProtocolError> {
        match length {
            -1 => Ok(Self::Variable),
            n if n >= 0 => Ok(Self::Fixed(n as u16)),
            n => Err(ProtocolError::InvalidLength(n)),
        }
    }

    pub fn to_wire(self) -> i16 {
        match self {
            Self::Fixed(n) => n as i16,
            Self::Variable => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ArgStyle {
    Fixed = 0,
    Stream = 1,
}

impl ArgStyle {
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0 => Ok(Self::Fixed),
            1 => Ok(Self::Stream),
            other => Err(ProtocolError::UnknownArgStyle(other)),
        }
    }
}

/// Inbound handler tag, resolved from the message name once at import time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientHandler {
    HelloCB,
    VersionNotMatch,
    ScriptVersionNotMatch,
    ImportClientMessages,
    ImportClientMessagesCompleted,
    ImportServerErrorsDescr,
    ImportClientEntityDef,
    ImportClientEntityDefCompleted,
    LoginFailed,
    LoginSuccessfully,
    CreateAccountResult,
    ReqAccountResetPasswordCB,
    LoginBaseappFailed,
    ReloginBaseappFailed,
    ReloginBaseappSuccessfully,
    CreatedProxies,
    EntityEnterWorld,
    EntityLeaveWorld,
    EntityDestroyed,
    UpdatePropertys,
    UpdatePropertysOptimized,
    RemoteMethodCall,
    Kicked,
    AppActiveTickCB,
    InitSpaceData,
    SetSpaceData,
    DelSpaceData,
}

impl ClientHandler {
    pub const ALL: [ClientHandler; 27] = [
        Self::HelloCB,
        Self::VersionNotMatch,
        Self::ScriptVersionNotMatch,
        Self::ImportClientMessages,
        Self::ImportClientMessagesCompleted,
        Self::ImportServerErrorsDescr,
        Self::ImportClientEntityDef,
        Self::ImportClientEntityDefCompleted,
        Self::LoginFailed,
        Self::LoginSuccessfully,
        Self::CreateAccountResult,
        Self::ReqAccountResetPasswordCB,
        Self::LoginBaseappFailed,
        Self::ReloginBaseappFailed,
        Self::ReloginBaseappSuccessfully,
        Self::CreatedProxies,
        Self::EntityEnterWorld,
        Self::EntityLeaveWorld,
        Self::EntityDestroyed,
        Self::UpdatePropertys,
        Self::UpdatePropertysOptimized,
        Self::RemoteMethodCall,
        Self::Kicked,
        Self::AppActiveTickCB,
        Self::InitSpaceData,
        Self::SetSpaceData,
        Self::DelSpaceData,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::HelloCB => "Client_onHelloCB",
            Self::VersionNotMatch => "Client_onVersionNotMatch",
            Self::ScriptVersionNotMatch => "Client_onScriptVersionNotMatch",
            Self::ImportClientMessages => "Client_onImportClientMessages",
            Self::ImportClientMessagesCompleted => "Client_onImportClientMessagesCompleted",
            Self::ImportServerErrorsDescr => "Client_onImportServerErrorsDescr",
            Self::ImportClientEntityDef => "Client_onImportClientEntityDef",
            Self::ImportClientEntityDefCompleted => "Client_onImportClientEntityDefCompleted",
            Self::LoginFailed => "Client_onLoginFailed",
            Self::LoginSuccessfully => "Client_onLoginSuccessfully",
            Self::CreateAccountResult => "Client_onCreateAccountResult",
            Self::ReqAccountResetPasswordCB => "Client_onReqAccountResetPasswordCB",
            Self::LoginBaseappFailed => "Client_onLoginBaseappFailed",
            Self::ReloginBaseappFailed => "Client_onReloginBaseappFailed",
            Self::ReloginBaseappSuccessfully => "Client_onReloginBaseappSuccessfully",
            Self::CreatedProxies => "Client_onCreatedProxies",
            Self::EntityEnterWorld => "Client_onEntityEnterWorld",
            Self::EntityLeaveWorld => "Client_onEntityLeaveWorld",
            Self::EntityDestroyed => "Client_onEntityDestroyed",
            Self::UpdatePropertys => "Client_onUpdatePropertys",
            Self::UpdatePropertysOptimized => "Client_onUpdatePropertysOptimized",
            Self::RemoteMethodCall => "Client_onRemoteMethodCall",
            Self::Kicked => "Client_onKicked",
            Self::AppActiveTickCB => "Client_onAppActiveTickCB",
            Self::InitSpaceData => "Client_initSpaceData",
            Self::SetSpaceData => "Client_setSpaceData",
            Self::DelSpaceData => "Client_delSpaceData",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|handler| handler.name() == name)
    }
}

/// Outbound request tag, resolved from the message name once at import time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerRequest {
    Hello,
    ImportClientMessages,
    ImportServerErrorsDescr,
    ImportClientEntityDef,
    Login,
    CreateAccount,
    ResetPassword,
    ActiveTick,
    LoginBaseapp,
    ReloginBaseapp,
    UpdatePropertiesFromClient,
    RemoteMethodCall,
}

impl ServerRequest {
    pub fn from_name(name: &str) -> Option<Self> {
        let request = match name {
            "hello" => Self::Hello,
            "importClientMessages" => Self::ImportClientMessages,
            "importServerErrorsDescr" => Self::ImportServerErrorsDescr,
            "importClientEntityDef" => Self::ImportClientEntityDef,
            "Loginapp_login" => Self::Login,
            "Loginapp_reqCreateAccount" => Self::CreateAccount,
            "Loginapp_reqAccountResetPassword" => Self::ResetPassword,
            "Loginapp_onClientActiveTick" | "Baseapp_onClientActiveTick" => Self::ActiveTick,
            "Baseapp_loginBaseapp" => Self::LoginBaseapp,
            "Baseapp_reloginBaseapp" => Self::ReloginBaseapp,
            "Baseapp_onUpdatePropertiesFromClient" => Self::UpdatePropertiesFromClient,
            "Baseapp_onRemoteMethodCall" => Self::RemoteMethodCall,
            _ => return None,
        };
        Some(request)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Inbound(ClientHandler),
    Outbound(ServerRequest),
    Unhandled,
}

impl Route {
    pub fn resolve(name: &str) -> Self {
        if let Some(handler) = ClientHandler::from_name(name) {
            Self::Inbound(handler)
        } else if let Some(request) = ServerRequest::from_name(name) {
            Self::Outbound(request)
        } else {
            Self::Unhandled
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDescriptor {
    pub id: u16,
    pub name: String,
    pub length: MessageLength,
    pub style: ArgStyle,
    pub args: Vec<PrimitiveKind>,
    pub route: Route,
}

impl MessageDescriptor {
    pub fn new(
        id: u16,
        name: &str,
        length: MessageLength,
        style: ArgStyle,
        args: Vec<PrimitiveKind>,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            length,
            style,
            args,
            route: Route::resolve(name),
        }
    }

    /// Generic-argument message; fixed length when every argument has a fixed size.
    pub fn with_args(id: u16, name: &str, args: &[PrimitiveKind]) -> Self {
        let length = args
            .iter()
            .map(|kind| kind.fixed_size())
            .sum::<Option<usize>>()
            .and_then(|total| u16::try_from(total).ok())
            .map_or(MessageLength::Variable, MessageLength::Fixed);
        Self::new(id, name, length, ArgStyle::Fixed, args.to_vec())
    }

    pub fn stream(id: u16, name: &str) -> Self {
        Self::new(id, name, MessageLength::Variable, ArgStyle::Stream, Vec::new())
    }

    pub fn frame(&self, payload: &[u8]) -> Result<Bytes, ProtocolError> {
        let mut writer = StreamWriter::with_capacity(payload.len() + 8);
        writer.write_u16(self.id);
        match self.length {
            MessageLength::Fixed(expected) => {
                if payload.len() != expected as usize {
                    return Err(ProtocolError::FixedLengthMismatch {
                        message: self.name.clone(),
                        expected: expected as usize,
                        found: payload.len(),
                    });
                }
            }
            MessageLength::Variable => {
                if payload.len() >= EXTENDED_LENGTH_MARKER as usize {
                    writer.write_u16(EXTENDED_LENGTH_MARKER);
                    writer.write_u32(payload.len() as u32);
                } else {
                    writer.write_u16(payload.len() as u16);
                }
            }
        }
        writer.write_bytes(payload);
        Ok(writer.freeze())
    }

    pub fn encode_args(&self, args: &[Value]) -> Result<Bytes, ProtocolError> {
        if self.style != ArgStyle::Fixed || args.len() != self.args.len() {
            return Err(ProtocolError::ArgumentMismatch {
                message: self.name.clone(),
                index: args.len().min(self.args.len()),
            });
        }
        let mut writer = StreamWriter::new();
        for (index, (kind, value)) in self.args.iter().zip(args).enumerate() {
            if !kind.encode(value, &mut writer) {
                return Err(ProtocolError::ArgumentMismatch {
                    message: self.name.clone(),
                    index,
                });
            }
        }
        self.frame(&writer.freeze())
    }

    pub fn decode_args(&self, payload: Bytes) -> Result<Vec<Value>, ProtocolError> {
        let mut stream = MemoryStream::new(payload);
        let mut values = Vec::with_capacity(self.args.len());
        for kind in &self.args {
            values.push(kind.decode(&mut stream)?);
        }
        if !stream.is_empty() {
            return Err(ProtocolError::TrailingBytes {
                message: self.name.clone(),
                count: stream.remaining(),
            });
        }
        Ok(values)
    }

    pub(crate) fn read(stream: &mut MemoryStream) -> Result<Self, ProtocolError> {
        let id = stream.read_u16()?;
        let length = MessageLength::from_wire(stream.read_i16()?)?;
        let name = stream.read_string()?;
        let style = ArgStyle::from_u8(stream.read_u8()?)?;
        let argc = stream.read_u8()?;
        let mut args = Vec::with_capacity(argc as usize);
        for _ in 0..argc {
            let tag = stream.read_u8()?;
            args.push(PrimitiveKind::from_tag(tag).ok_or(ProtocolError::UnknownTypeTag(tag))?);
        }
        Ok(Self {
            id,
            name,
            length,
            style,
            args,
            route: Route::Unhandled,
        })
    }

    pub(crate) fn write(&self, writer: &mut StreamWriter) {
        writer.write_u16(self.id);
        writer.write_i16(self.length.to_wire());
        writer.write_string(&self.name);
        writer.write_u8(self.style as u8);
        writer.write_u8(self.args.len() as u8);
        for kind in &self.args {
            writer.write_u8(kind.tag());
        }
    }
}
