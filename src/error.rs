use std::fmt;

use crate::codec;

#[derive(Debug)]
pub enum BridgeError {
    Config(ConfigError),
    Message(MessageError),
    /// The other side of a port was dropped.
    Disconnected,
    /// An offline render script could not be read.
    Script { message: String },
}

/// Invalid `ProcessorConfig` values.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    InvalidSampleRate { rate: f32 },
    ZeroQuantum,
    NoOutputChannels,
    ZeroNotificationCapacity,
    Parse { message: String },
}

/// An inbound message that cannot be turned into a `Command` at all.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageError {
    NotAnObject,
    MissingKind,
    InvalidModuleBytes { field: &'static str },
    MissingField { field: &'static str },
    InvalidIndex { field: &'static str },
}

/// A recognized command whose payload does not match its schema.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadError {
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
    WrongType {
        kind: &'static str,
        field: &'static str,
        expected: &'static str,
    },
}

/// Engine construction failures, reported through the `error` notification.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    MalformedModule { reason: String },
    Construction { message: String },
    /// Raw error text raised from inside the engine's own memory.
    Thrown { bytes: Vec<u8> },
    Panicked,
}

/// A failed engine call or block render. Never crosses the render loop boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineFault {
    pub operation: &'static str,
    pub message: String,
}

impl EngineFault {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        EngineFault {
            operation,
            message: message.into(),
        }
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Config(e) => write!(f, "Config error: {e}"),
            BridgeError::Message(e) => write!(f, "Message error: {e}"),
            BridgeError::Disconnected => write!(f, "Port disconnected"),
            BridgeError::Script { message } => write!(f, "Script error: {message}"),
        }
    }
}

impl std::error::Error for BridgeError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidSampleRate { rate } => write!(f, "Invalid sample rate {rate}"),
            ConfigError::ZeroQuantum => write!(f, "Quantum must be at least one frame"),
            ConfigError::NoOutputChannels => write!(f, "At least one output channel is required"),
            ConfigError::ZeroNotificationCapacity => {
                write!(f, "Notification capacity must be at least one")
            }
            ConfigError::Parse { message } => write!(f, "Invalid processor options: {message}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageError::NotAnObject => write!(f, "Message is not an object"),
            MessageError::MissingKind => write!(f, "Message has no string `kind`"),
            MessageError::InvalidModuleBytes { field } => {
                write!(f, "Field `{field}` is not a byte array")
            }
            MessageError::MissingField { field } => write!(f, "Missing field `{field}`"),
            MessageError::InvalidIndex { field } => {
                write!(f, "Field `{field}` is not a non-negative integer")
            }
        }
    }
}

impl std::error::Error for MessageError {}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadError::MissingField { kind, field } => {
                write!(f, "Malformed payload for {kind}: missing field `{field}`")
            }
            PayloadError::WrongType {
                kind,
                field,
                expected,
            } => write!(f, "Malformed payload for {kind}: field `{field}` must be {expected}"),
        }
    }
}

impl std::error::Error for PayloadError {}

impl PayloadError {
    pub fn kind(&self) -> &'static str {
        match self {
            PayloadError::MissingField { kind, .. } | PayloadError::WrongType { kind, .. } => kind,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::MalformedModule { reason } => write!(f, "Malformed engine module: {reason}"),
            EngineError::Construction { message } => write!(f, "Engine construction failed: {message}"),
            EngineError::Thrown { bytes } => {
                write!(f, "Engine construction failed: {}", codec::decode(bytes))
            }
            EngineError::Panicked => write!(f, "Engine construction panicked"),
        }
    }
}

impl std::error::Error for EngineError {}

impl fmt::Display for EngineFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.operation, self.message)
    }
}

impl std::error::Error for EngineFault {}

impl From<ConfigError> for BridgeError {
    fn from(e: ConfigError) -> Self {
        BridgeError::Config(e)
    }
}

impl From<MessageError> for BridgeError {
    fn from(e: MessageError) -> Self {
        BridgeError::Message(e)
    }
}
