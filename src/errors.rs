use thiserror::Error;

/// Errors surfaced to clients as `-ERR <message>` frames. The connection
/// stays open after any of these.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("wrong number of arguments for '{0}' command")]
    WrongArgumentCount(String),
    #[error("value is not an integer or out of range")]
    InvalidInteger,
    #[error("syntax error")]
    Syntax,
    #[error("unrecognized command '{0}'")]
    UnknownCommand(String),
    #[error("{0}")]
    General(String),
}

#[derive(Error, Debug)]
pub enum RdbError {
    #[error("not an RDB file: bad magic bytes")]
    InvalidMagic,
    #[error("invalid RDB version '{0}'")]
    InvalidVersion(String),
    #[error("expected resizedb after database selector, found 0x{0:02X}")]
    UnexpectedOpcode(u8),
    #[error("integer encoding used where a size was required")]
    InvalidLength,
    #[error("unsupported string encoding {0}")]
    UnsupportedStringEncoding(u8),
    #[error("unsupported value type 0x{0:02X}")]
    UnsupportedValueType(u8),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
