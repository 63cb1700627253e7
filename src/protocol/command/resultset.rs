use crate::error::{Error, Result};
use crate::protocol::BinaryRowPayload;
use crate::protocol::primitive::*;
use crate::protocol::value::NullBitmap;

/// Result set metadata header
#[derive(Debug, Clone)]
pub struct ResultSetHeader {
    pub column_count: u64,
}

/// Read binary protocol result set header (column count)
pub fn read_binary_resultset_header(payload: &[u8]) -> Result<ResultSetHeader> {
    let (column_count, _rest) = read_int_lenenc(payload)?;
    Ok(ResultSetHeader { column_count })
}

/// Read a binary protocol row (`Protocol::BinaryResultsetRow`).
pub fn read_binary_row(payload: &[u8], num_columns: usize) -> Result<BinaryRowPayload<'_>> {
    let (header, data) = read_int_1(payload)?;
    if header != 0x00 {
        return Err(Error::InvalidPacket);
    }

    // NULL bitmap: ceil((num_columns + 2) / 8) bytes. The +2 offset is the
    // binary-protocol convention (bits 0 and 1 are reserved).
    let null_bitmap_len = (num_columns + 2).div_ceil(8);
    let (null_bitmap, values) = read_string_fix(data, null_bitmap_len)?;

    Ok(BinaryRowPayload {
        null_bitmap: NullBitmap::for_result_set(null_bitmap),
        values,
        num_columns,
    })
}
