
pub type Result<T> = std::result::Result<T, Error>;
pub type UnitResult = Result<()>;

pub use std::io::Error as IoError;
pub use std::io::Result as IoResult;


/// All errors that can be produced by the engine.
///
/// Leaf layers (`BitStream`, M32, Huffman, Deflate) surface `IntegrityFailure`
/// or `Io`. The tile codec orchestrator turns backend encode failures into
/// "try the next candidate" decisions, but backend decode failures propagate
/// as `IntegrityFailure`. `InvalidArgument` is never retried.
#[derive(Debug)]
pub enum Error {
    /// Out-of-range coordinates, unknown element name, inconsistent spec.
    InvalidArgument(String),

    /// CRC mismatch, malformed record header, truncated stream,
    /// a Huffman tree read that ran past the end of its prelude.
    IntegrityFailure(String),

    /// A codec id found in the file is not registered in this handle.
    UnsupportedCodec(String),

    /// Underlying platform I/O failure.
    Io(IoError),

    /// An operation was attempted after the handle was closed.
    AlreadyClosed,

    /// Reserved; the engine is single-threaded and never actually returns this.
    WouldBlock,

    /// A metadata record lookup found nothing for the given `(name, id)`.
    NotFound,
}

impl Error {
    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Error::IntegrityFailure(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::UnsupportedCodec(message.into())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidArgument(message) => write!(formatter, "invalid argument: {}", message),
            Error::IntegrityFailure(message) => write!(formatter, "integrity failure: {}", message),
            Error::UnsupportedCodec(message) => write!(formatter, "unsupported codec: {}", message),
            Error::Io(io_error) => write!(formatter, "i/o error: {}", io_error),
            Error::AlreadyClosed => write!(formatter, "operation attempted on a closed file"),
            Error::WouldBlock => write!(formatter, "operation would block"),
            Error::NotFound => write!(formatter, "not found"),
        }
    }
}

impl std::error::Error for Error {}

/// Enable using the `?` operator on `io::Result`.
impl From<IoError> for Error {
    fn from(error: IoError) -> Self {
        Error::Io(error)
    }
}

#[inline]
pub fn usize_to_u32(value: usize, name: &'static str) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::invalid(name))
}

#[inline]
pub fn i32_to_usize(value: i32, name: &'static str) -> Result<usize> {
    if value < 0 { Err(Error::invalid(name)) }
    else { Ok(value as usize) }
}

#[inline]
pub fn usize_to_i32(value: usize, name: &'static str) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::invalid(name))
}
