//! Small, self-contained byte primitives backing [`super::KafkaProtocol`].
//!
//! This is intentionally not a full Kafka wire codec -- the `Protocol`
//! collaborator's wire-format encoding is a trait boundary, not a worker
//! concern. What's here is just enough to let the default `Protocol`
//! implementation round-trip its own requests and responses.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, TimeZone, Utc};

use crate::error::KafkaCode;

pub fn put_str(buf: &mut BytesMut, s: &str) {
    buf.put_i32(s.len() as i32);
    buf.put_slice(s.as_bytes());
}

pub fn get_str(buf: &mut Bytes) -> String {
    let len = buf.get_i32() as usize;
    String::from_utf8_lossy(&buf.copy_to_bytes(len)).into_owned()
}

pub fn put_opt_str(buf: &mut BytesMut, s: Option<&str>) {
    match s {
        Some(s) => put_str(buf, s),
        None => buf.put_i32(-1),
    }
}

pub fn get_opt_str(buf: &mut Bytes) -> Option<String> {
    let len = buf.get_i32();
    if len < 0 {
        None
    } else {
        Some(String::from_utf8_lossy(&buf.copy_to_bytes(len as usize)).into_owned())
    }
}

pub fn put_opt_bytes(buf: &mut BytesMut, b: Option<&[u8]>) {
    match b {
        Some(b) => {
            buf.put_i32(b.len() as i32);
            buf.put_slice(b);
        }
        None => buf.put_i32(-1),
    }
}

pub fn get_opt_bytes(buf: &mut Bytes) -> Option<Vec<u8>> {
    let len = buf.get_i32();
    if len < 0 {
        None
    } else {
        Some(buf.copy_to_bytes(len as usize).to_vec())
    }
}

pub fn put_code(buf: &mut BytesMut, code: KafkaCode) {
    buf.put_i16(code.into());
}

pub fn get_code(buf: &mut Bytes) -> KafkaCode {
    KafkaCode::from(buf.get_i16())
}

pub fn put_timestamp(buf: &mut BytesMut, ts: DateTime<Utc>) {
    buf.put_i64(ts.timestamp_millis());
}

pub fn get_timestamp(buf: &mut Bytes) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(buf.get_i64()).single().unwrap_or_else(Utc::now)
}
