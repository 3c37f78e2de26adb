//! Wire protocol.
//!
//! One connection carries exactly one call:
//!
//! ```text
//! stub                                   skeleton
//!  | -- header "RMI\x01" ------------------> |
//!  | <------------------ header "RMI\x01" -- |
//!  | -- method name ------------------------> |
//!  | -- parameter type signature -----------> |
//!  | -- argument list ----------------------> |
//!  | <------------------- "ok" | "error" ---- |
//!  | <------------- return value | fault ---- |
//! ```
//!
//! Each side writes and flushes its header before reading the peer's. Every
//! value after the header is a JSON document in a frame made of a 4-byte
//! big-endian length followed by the payload.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::contract::TypeDescriptor;
use crate::error::RemoteCallError;

pub const MAGIC: [u8; 4] = *b"RMI\x01";
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

pub const STATUS_OK: &str = "ok";
pub const STATUS_ERROR: &str = "error";

/// Trait alias for supported stream types
pub(crate) trait Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> Stream for T {}

/// A decoded call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    pub method: String,
    pub signature: Vec<TypeDescriptor>,
    pub args: Vec<Value>,
}

/// Why a call failed on the skeleton side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Fault {
    /// The error returned by the remote method, serialized as-is.
    Application(Value),
    /// The call never reached the method or could not be answered.
    Remote(RemoteCallError),
}

/// The outcome sent back to the stub.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Success(Value),
    Failure(Fault),
}

impl Reply {
    pub(crate) fn remote(err: RemoteCallError) -> Self {
        Reply::Failure(Fault::Remote(err))
    }

    /// Encodes the result of a method invocation.
    pub(crate) fn from_outcome<R, E>(outcome: Result<R, E>) -> Self
    where
        R: Serialize,
        E: Serialize,
    {
        match outcome {
            Ok(value) => match serde_json::to_value(value) {
                Ok(value) => Reply::Success(value),
                Err(e) => Reply::remote(RemoteCallError::Codec(format!(
                    "cannot encode return value: {e}"
                ))),
            },
            Err(err) => match serde_json::to_value(err) {
                Ok(value) => Reply::Failure(Fault::Application(value)),
                Err(e) => Reply::remote(RemoteCallError::Codec(format!(
                    "cannot encode remote failure: {e}"
                ))),
            },
        }
    }
}

/// Flattens serialized call arguments into the wire's argument list.
///
/// Arguments are tuples, which serialize to arrays; the empty tuple
/// serializes to `null`.
pub(crate) fn arguments<A: Serialize>(args: &A) -> Result<Vec<Value>, RemoteCallError> {
    Ok(match serde_json::to_value(args)? {
        Value::Array(values) => values,
        Value::Null => Vec::new(),
        other => vec![other],
    })
}

/// Inverse of [`arguments`], producing the value a parameter tuple decodes from.
pub(crate) fn argument_value(args: Vec<Value>) -> Value {
    if args.is_empty() {
        Value::Null
    } else {
        Value::Array(args)
    }
}

pub async fn write_header<W>(writer: &mut W) -> Result<(), RemoteCallError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&MAGIC).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_header<R>(reader: &mut R) -> Result<(), RemoteCallError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    reader.read_exact(&mut header).await?;
    if header != MAGIC {
        return Err(RemoteCallError::Protocol(format!(
            "unexpected stream header {header:02x?}"
        )));
    }
    Ok(())
}

pub async fn write_packet<W>(writer: &mut W, data: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(data.len()).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("frame of {} bytes does not fit a u32 length", data.len()),
        )
    })?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(data).await
}

/// Reads one frame, refusing lengths above `max_len` before allocating.
pub async fn read_packet<R>(reader: &mut R, max_len: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut len = [0u8; 4];
    reader.read_exact(&mut len).await?;
    let len = u32::from_be_bytes(len) as usize;
    if len > max_len {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds limit of {max_len}"),
        ));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

pub async fn write_value<W, T>(writer: &mut W, value: &T) -> Result<(), RemoteCallError>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let data = serde_json::to_vec(value)?;
    write_packet(writer, &data).await?;
    Ok(())
}

pub async fn read_value<R, T>(reader: &mut R, max_len: usize) -> Result<T, RemoteCallError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let data = read_packet(reader, max_len).await?;
    Ok(serde_json::from_slice(&data)?)
}

pub async fn write_request<W>(writer: &mut W, request: &CallRequest) -> Result<(), RemoteCallError>
where
    W: AsyncWrite + Unpin,
{
    write_value(writer, &request.method).await?;
    write_value(writer, &request.signature).await?;
    write_value(writer, &request.args).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_request<R>(reader: &mut R, max_len: usize) -> Result<CallRequest, RemoteCallError>
where
    R: AsyncRead + Unpin,
{
    let method = read_value(reader, max_len).await?;
    let signature = read_value(reader, max_len).await?;
    let args = read_value(reader, max_len).await?;
    Ok(CallRequest {
        method,
        signature,
        args,
    })
}

pub async fn write_reply<W>(writer: &mut W, reply: &Reply) -> Result<(), RemoteCallError>
where
    W: AsyncWrite + Unpin,
{
    match reply {
        Reply::Success(value) => {
            write_value(writer, STATUS_OK).await?;
            write_value(writer, value).await?;
        }
        Reply::Failure(fault) => {
            write_value(writer, STATUS_ERROR).await?;
            write_value(writer, fault).await?;
        }
    }
    writer.flush().await?;
    Ok(())
}

pub async fn read_reply<R>(reader: &mut R, max_len: usize) -> Result<Reply, RemoteCallError>
where
    R: AsyncRead + Unpin,
{
    let status: String = read_value(reader, max_len).await?;
    match status.as_str() {
        STATUS_OK => Ok(Reply::Success(read_value(reader, max_len).await?)),
        STATUS_ERROR => Ok(Reply::Failure(read_value(reader, max_len).await?)),
        other => Err(RemoteCallError::Protocol(format!(
            "unknown response status {other:?}"
        ))),
    }
}
