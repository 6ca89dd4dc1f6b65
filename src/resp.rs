use crate::protocol_constants::*;
use bytes::{Bytes, BytesMut};
use log::debug;
use std::future::Future;
use std::pin::Pin;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// One top-level value of the wire protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Option<String>),
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    pub fn encode(&self) -> Bytes {
        match self {
            RespValue::SimpleString(s) => encode_simple(s),
            RespValue::Error(message) => {
                Bytes::from(format!("{}{}{}", ERROR_PREFIX, message, CRLF))
            }
            RespValue::Integer(n) => Bytes::from(format!("{}{}{}", INTEGER_PREFIX, n, CRLF)),
            RespValue::BulkString(Some(s)) => encode_bulk(s),
            RespValue::BulkString(None) => encode_null_bulk(),
            RespValue::Array(Some(items)) => {
                let mut buf = BytesMut::new();
                buf.extend_from_slice(&encode_array_len(items.len() as i64));
                for item in items {
                    buf.extend_from_slice(&item.encode());
                }
                buf.freeze()
            }
            RespValue::Array(None) => {
                Bytes::from(format!("{}-1{}", ARRAY_PREFIX, CRLF))
            }
        }
    }

    /// A client command is an array of bulk strings; anything else is not a
    /// command and the connection is closed.
    pub fn into_args(self) -> Option<Vec<String>> {
        let RespValue::Array(Some(items)) = self else {
            return None;
        };
        if items.is_empty() {
            return None;
        }
        let mut args = Vec::with_capacity(items.len());
        for item in items {
            match item {
                RespValue::BulkString(Some(s)) => args.push(s),
                _ => return None,
            }
        }
        Some(args)
    }
}

pub fn encode_simple(s: &str) -> Bytes {
    Bytes::from(format!("{}{}{}", SIMPLE_STRING_PREFIX, s, CRLF))
}

pub fn encode_error(message: &str) -> Bytes {
    Bytes::from(format!("{}ERR {}{}", ERROR_PREFIX, message, CRLF))
}

pub fn encode_bulk(s: &str) -> Bytes {
    Bytes::from(format!(
        "{}{}{}{}{}",
        BULK_STRING_PREFIX,
        s.len(),
        CRLF,
        s,
        CRLF
    ))
}

pub fn encode_null_bulk() -> Bytes {
    Bytes::from(format!("{}-1{}", BULK_STRING_PREFIX, CRLF))
}

pub fn encode_array_len(len: i64) -> Bytes {
    Bytes::from(format!("{}{}{}", ARRAY_PREFIX, len, CRLF))
}

/// Frames a command as an array of bulk strings, the form used for both the
/// replication handshake and write propagation to replicas.
pub fn encode_command(args: &[&str]) -> Bytes {
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&encode_array_len(args.len() as i64));
    for arg in args {
        buf.extend_from_slice(&encode_bulk(arg));
    }
    buf.freeze()
}

/// Length-prefixed raw RDB payload. Unlike a bulk string there is no CRLF
/// after the bytes; this is how a master transfers the snapshot during a
/// full resynchronization.
pub fn encode_rdb(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload.len() + 16);
    buf.extend_from_slice(
        format!("{}{}{}", BULK_STRING_PREFIX, payload.len(), CRLF).as_bytes(),
    );
    buf.extend_from_slice(payload);
    buf.freeze()
}

/// Streaming parser over a buffered byte stream. `parse` yields one
/// top-level value per call; `None` covers end-of-stream and malformed
/// framing alike, and the caller treats it as connection close.
pub struct RespParser<R> {
    reader: R,
}

impl<R> RespParser<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub async fn parse(&mut self) -> Option<RespValue> {
        self.parse_value().await
    }

    // Boxed so the array arm can recurse.
    fn parse_value(&mut self) -> Pin<Box<dyn Future<Output = Option<RespValue>> + Send + '_>> {
        Box::pin(async move {
            let line = self.read_line().await?;
            if let Some(rest) = line.strip_prefix(SIMPLE_STRING_PREFIX) {
                Some(RespValue::SimpleString(rest.to_string()))
            } else if let Some(rest) = line.strip_prefix(ERROR_PREFIX) {
                Some(RespValue::Error(rest.to_string()))
            } else if let Some(rest) = line.strip_prefix(INTEGER_PREFIX) {
                match rest.parse::<i64>() {
                    Ok(n) => Some(RespValue::Integer(n)),
                    Err(_) => {
                        debug!("invalid integer line {:?}", line);
                        None
                    }
                }
            } else if let Some(rest) = line.strip_prefix(BULK_STRING_PREFIX) {
                self.parse_bulk_payload(rest).await
            } else if let Some(rest) = line.strip_prefix(ARRAY_PREFIX) {
                let len = match rest.parse::<i64>() {
                    Ok(len) if len >= -1 => len,
                    _ => {
                        debug!("invalid array length {:?}", line);
                        return None;
                    }
                };
                if len == -1 {
                    return Some(RespValue::Array(None));
                }
                let mut items = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    items.push(self.parse_value().await?);
                }
                Some(RespValue::Array(Some(items)))
            } else {
                debug!("unexpected leading byte in line {:?}", line);
                None
            }
        })
    }

    async fn parse_bulk_payload(&mut self, len_field: &str) -> Option<RespValue> {
        let len = match len_field.parse::<i64>() {
            Ok(len) if len >= -1 => len,
            _ => {
                debug!("invalid bulk length {:?}", len_field);
                return None;
            }
        };
        if len == -1 {
            return Some(RespValue::BulkString(None));
        }

        // Payload is raw bytes of exactly the declared length; the CRLF that
        // follows is framing, not content.
        let mut payload = vec![0u8; len as usize + 2];
        self.reader.read_exact(&mut payload).await.ok()?;
        if !payload.ends_with(CRLF.as_bytes()) {
            debug!("bulk string payload not terminated by CRLF");
            return None;
        }
        payload.truncate(len as usize);
        match String::from_utf8(payload) {
            Ok(s) => Some(RespValue::BulkString(Some(s))),
            Err(_) => {
                debug!("bulk string payload is not valid UTF-8");
                None
            }
        }
    }

    /// Reads `$<len>\r\n` followed by exactly `len` raw bytes. The RDB
    /// transfer after FULLRESYNC has no trailing CRLF, so none is consumed.
    pub async fn read_rdb_payload(&mut self) -> Option<Vec<u8>> {
        let line = self.read_line().await?;
        let len = match line.strip_prefix(BULK_STRING_PREFIX) {
            Some(rest) => rest.parse::<usize>().ok()?,
            None => {
                debug!("expected length-prefixed RDB payload, got {:?}", line);
                return None;
            }
        };
        let mut payload = vec![0u8; len];
        self.reader.read_exact(&mut payload).await.ok()?;
        Some(payload)
    }

    // One CRLF-terminated line, terminator stripped. `None` on end of
    // stream, missing terminator, or non-UTF-8 content.
    async fn read_line(&mut self) -> Option<String> {
        let mut buf = Vec::new();
        let n = self.reader.read_until(b'\n', &mut buf).await.ok()?;
        if n == 0 {
            return None;
        }
        if !buf.ends_with(CRLF.as_bytes()) {
            debug!("line without CRLF terminator");
            return None;
        }
        buf.truncate(buf.len() - 2);
        String::from_utf8(buf).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn parse_one(input: &[u8]) -> Option<RespValue> {
        RespParser::new(input).parse().await
    }

    fn bulk(s: &str) -> RespValue {
        RespValue::BulkString(Some(s.to_string()))
    }

    #[tokio::test]
    async fn parses_ping_command() {
        let value = parse_one(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        assert_eq!(value, RespValue::Array(Some(vec![bulk("PING")])));
    }

    #[tokio::test]
    async fn parses_set_with_options() {
        let input = b"*5\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n$2\r\nPX\r\n$3\r\n100\r\n";
        let value = parse_one(input).await.unwrap();
        let args = value.into_args().unwrap();
        assert_eq!(args, vec!["SET", "foo", "bar", "PX", "100"]);
    }

    #[tokio::test]
    async fn parses_simple_string_error_and_integer() {
        assert_eq!(
            parse_one(b"+OK\r\n").await.unwrap(),
            RespValue::SimpleString("OK".to_string())
        );
        assert_eq!(
            parse_one(b"-ERR oops\r\n").await.unwrap(),
            RespValue::Error("ERR oops".to_string())
        );
        assert_eq!(parse_one(b":-42\r\n").await.unwrap(), RespValue::Integer(-42));
    }

    #[tokio::test]
    async fn parses_null_bulk_and_null_array() {
        assert_eq!(
            parse_one(b"$-1\r\n").await.unwrap(),
            RespValue::BulkString(None)
        );
        assert_eq!(parse_one(b"*-1\r\n").await.unwrap(), RespValue::Array(None));
    }

    #[tokio::test]
    async fn bulk_payload_may_contain_crlf() {
        let value = parse_one(b"$8\r\nab\r\ncd\r\n\r\n").await.unwrap();
        assert_eq!(value, bulk("ab\r\ncd\r\n"));
    }

    #[tokio::test]
    async fn parses_pipelined_commands_in_sequence() {
        let input: &[u8] = b"*1\r\n$4\r\nPING\r\n*2\r\n$4\r\nECHO\r\n$2\r\nhi\r\n";
        let mut parser = RespParser::new(input);
        assert_eq!(
            parser.parse().await.unwrap().into_args().unwrap(),
            vec!["PING"]
        );
        assert_eq!(
            parser.parse().await.unwrap().into_args().unwrap(),
            vec!["ECHO", "hi"]
        );
        assert!(parser.parse().await.is_none());
    }

    #[tokio::test]
    async fn truncated_array_yields_none() {
        assert!(parse_one(b"*2\r\n$3\r\nGET\r\n").await.is_none());
    }

    #[tokio::test]
    async fn unknown_prefix_yields_none() {
        assert!(parse_one(b"hello\r\n").await.is_none());
    }

    #[tokio::test]
    async fn bad_length_yields_none() {
        assert!(parse_one(b"$abc\r\n").await.is_none());
        assert!(parse_one(b"*x\r\n").await.is_none());
    }

    #[tokio::test]
    async fn encode_parse_round_trip() {
        let values = vec![
            RespValue::SimpleString("PONG".to_string()),
            RespValue::Error("ERR syntax error".to_string()),
            RespValue::Integer(1234),
            bulk("hello"),
            RespValue::BulkString(None),
            RespValue::Array(None),
            RespValue::Array(Some(vec![bulk("SET"), bulk("k"), bulk("v")])),
            RespValue::Array(Some(vec![
                RespValue::Integer(1),
                RespValue::Array(Some(vec![bulk("nested")])),
            ])),
        ];
        for value in values {
            let encoded = value.encode();
            let reparsed = parse_one(&encoded).await.unwrap();
            assert_eq!(reparsed, value);
        }
    }

    #[test]
    fn encode_command_frames_args_as_bulk_array() {
        let frame = encode_command(&["REPLCONF", "listening-port", "6380"]);
        assert_eq!(
            &frame[..],
            b"*3\r\n$8\r\nREPLCONF\r\n$14\r\nlistening-port\r\n$4\r\n6380\r\n"
        );
    }

    #[test]
    fn encode_rdb_has_no_trailing_crlf() {
        let frame = encode_rdb(b"binary");
        assert_eq!(&frame[..], b"$6\r\nbinary");
    }

    #[test]
    fn encode_error_prepends_err() {
        assert_eq!(&encode_error("syntax error")[..], b"-ERR syntax error\r\n");
    }
}
