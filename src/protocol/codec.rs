//! Frame codec for the Luxtronik socket protocol
//!
//! Wire layout is a sequence of big-endian signed 32-bit integers:
//!
//! - Request:  `[command_code][count = 0]`, or for writes
//!             `[command_code][index][value]`
//! - Response: `[echoed command_code][element_count][element_count × i32]`
//!
//! Pure byte transformation, no I/O.

use bytes::{BufMut, BytesMut};

use super::command::Command;
use crate::error::{HeatSrvError, Result};

/// Fixed size of the response header (command code + element count).
pub const HEADER_LEN: usize = 8;

/// Upper bound on the element count a header may announce. The largest real
/// register block (calculated values) is a few hundred entries; anything far
/// beyond that indicates a desynchronized or corrupt stream.
pub const MAX_ELEMENT_COUNT: usize = 4096;

/// Build the wire frame for a command.
pub fn encode(command: &Command) -> BytesMut {
    let mut frame = BytesMut::with_capacity(12);
    frame.put_i32(command.code());
    match command {
        Command::WriteParameter { index, value } => {
            frame.put_i32(*index);
            frame.put_i32(*value);
        },
        _ => frame.put_i32(0),
    }
    frame
}

/// Decode the response header into (command code, element count).
pub fn decode_header(data: &[u8]) -> Result<(i32, usize)> {
    if data.len() < HEADER_LEN {
        return Err(HeatSrvError::MalformedHeader(format!(
            "need {HEADER_LEN} bytes, got {}",
            data.len()
        )));
    }

    let code = i32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    let count = i32::from_be_bytes([data[4], data[5], data[6], data[7]]);

    if count < 0 {
        return Err(HeatSrvError::MalformedHeader(format!(
            "negative element count: {count}"
        )));
    }
    let count = count as usize;
    if count > MAX_ELEMENT_COUNT {
        return Err(HeatSrvError::MalformedHeader(format!(
            "implausible element count: {count}"
        )));
    }

    Ok((code, count))
}

/// Decode `element_count` big-endian i32 values from the response body.
pub fn decode_body(data: &[u8], element_count: usize) -> Result<Vec<i32>> {
    let expected = element_count * 4;
    if data.len() < expected {
        return Err(HeatSrvError::TruncatedBody {
            expected,
            actual: data.len(),
        });
    }

    let mut values = Vec::with_capacity(element_count);
    for chunk in data[..expected].chunks_exact(4) {
        values.push(i32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    Ok(values)
}

/// Encode a sequence of values as a response payload (test and mock helper,
/// also the round-trip counterpart of [`decode_body`]).
pub fn encode_payload(values: &[i32]) -> BytesMut {
    let mut body = BytesMut::with_capacity(values.len() * 4);
    for v in values {
        body.put_i32(*v);
    }
    body
}
