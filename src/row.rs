//! Owned, typed row access built on top of [`crate::raw::FromRawValue`]'s
//! zero-copy decoders. A [`Row`] is what crosses an `await` point (handed
//! back from `fetch_one`, pushed through a [`crate::stream::RowStream`]) once
//! the borrowed wire bytes it was decoded from have gone out of scope.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::protocol::command::ColumnDefinition;
use crate::protocol::value::Value as WireValue;

/// An owned column value, decoded from either protocol's wire representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
}

impl Value {
    fn from_wire(value: WireValue<'_>) -> Self {
        match value {
            WireValue::Null => Value::Null,
            WireValue::SignedInt(i) => Value::Int(i),
            WireValue::UnsignedInt(u) => Value::UInt(u),
            WireValue::Float(f) => Value::Float(f),
            WireValue::Double(d) => Value::Double(d),
            WireValue::Byte(b) => Value::Bytes(b.to_vec()),
            // Temporal values are surfaced in their textual wire form; callers
            // wanting calendar types bring their own chrono/time impl of
            // `FromValue` rather than this crate taking on a date library.
            WireValue::Timestamp0 | WireValue::Time0 => Value::Bytes(Vec::new()),
            WireValue::Timestamp4(ts) => {
                Value::Bytes(format!("{}-{:02}-{:02}", ts.year(), ts.month, ts.day).into_bytes())
            }
            WireValue::Timestamp7(ts) => Value::Bytes(
                format!(
                    "{}-{:02}-{:02} {:02}:{:02}:{:02}",
                    ts.year(),
                    ts.month,
                    ts.day,
                    ts.hour,
                    ts.minute,
                    ts.second
                )
                .into_bytes(),
            ),
            WireValue::Timestamp11(ts) => Value::Bytes(
                format!(
                    "{}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}",
                    ts.year(),
                    ts.month,
                    ts.day,
                    ts.hour,
                    ts.minute,
                    ts.second,
                    ts.microsecond()
                )
                .into_bytes(),
            ),
            WireValue::Time8(t) => Value::Bytes(
                format!(
                    "{}{} days {:02}:{:02}:{:02}",
                    if t.is_negative() { "-" } else { "" },
                    t.days(),
                    t.hour,
                    t.minute,
                    t.second
                )
                .into_bytes(),
            ),
            WireValue::Time12(t) => Value::Bytes(
                format!(
                    "{}{} days {:02}:{:02}:{:02}.{:06}",
                    if t.is_negative() { "-" } else { "" },
                    t.days(),
                    t.hour,
                    t.minute,
                    t.second,
                    t.microsecond()
                )
                .into_bytes(),
            ),
        }
    }

    /// Parse a text-protocol column straight from its wire bytes (no type tag
    /// is transmitted for `COM_QUERY` results, everything is a string).
    fn from_text_bytes(bytes: &[u8]) -> Self {
        Value::Bytes(bytes.to_vec())
    }
}

/// A decoded row with column-name lookup.
#[derive(Debug, Clone)]
pub struct Row {
    names: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(names: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { names, values }
    }

    pub(crate) fn from_binary(
        cols: &[ColumnDefinition<'_>],
        row: crate::protocol::BinaryRowPayload<'_>,
    ) -> Result<Self> {
        let null_bitmap = row.null_bitmap();
        let mut data = row.values();
        let mut values = Vec::with_capacity(cols.len());
        for (idx, col) in cols.iter().enumerate() {
            if null_bitmap.is_null(idx) {
                values.push(Value::Null);
                continue;
            }
            let type_and_flags = col.tail.type_and_flags()?;
            let (value, rest) = WireValue::parse(&type_and_flags, data)?;
            data = rest;
            values.push(Value::from_wire(value));
        }

        Ok(Self {
            names: column_names(cols),
            values,
        })
    }

    pub(crate) fn from_text(
        cols: &[ColumnDefinition<'_>],
        row: &crate::protocol::TextRowPayload<'_>,
    ) -> Result<Self> {
        use crate::protocol::primitive::read_string_lenenc;

        let mut data = row.0;
        let mut values = Vec::with_capacity(cols.len());
        for _ in cols {
            if data.first() == Some(&0xFB) {
                values.push(Value::Null);
                data = &data[1..];
                continue;
            }
            let (bytes, rest) = read_string_lenenc(data)?;
            data = rest;
            values.push(Value::from_text_bytes(bytes));
        }

        Ok(Self {
            names: column_names(cols),
            values,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Typed access by column index or name. See [`FromValue`] for the
    /// supported target types.
    pub fn get<T: FromValue>(&self, idx: impl ColumnIndex) -> Result<T> {
        let i = idx.resolve(self)?;
        T::from_value(self.values.get(i).unwrap_or(&Value::Null))
    }
}

fn column_names(cols: &[ColumnDefinition<'_>]) -> Arc<[String]> {
    cols.iter()
        .map(|c| String::from_utf8_lossy(c.name_alias).into_owned())
        .collect()
}

pub trait ColumnIndex {
    fn resolve(&self, row: &Row) -> Result<usize>;
}

impl ColumnIndex for usize {
    fn resolve(&self, row: &Row) -> Result<usize> {
        if *self < row.len() {
            Ok(*self)
        } else {
            Err(Error::BadInputError(format!(
                "column index {self} out of range ({} columns)",
                row.len()
            )))
        }
    }
}

impl ColumnIndex for &str {
    fn resolve(&self, row: &Row) -> Result<usize> {
        row.index_of(self)
            .ok_or_else(|| Error::BadInputError(format!("no column named {self:?}")))
    }
}

/// Conversion from a decoded column [`Value`] into a Rust type.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

macro_rules! impl_from_value_int {
    ($($t:ty),+) => {
        $(
            impl FromValue for $t {
                fn from_value(value: &Value) -> Result<Self> {
                    match value {
                        Value::Int(i) => <$t>::try_from(*i).map_err(|_| Error::BadInputError(format!("value {i} out of range"))),
                        Value::UInt(u) => <$t>::try_from(*u).map_err(|_| Error::BadInputError(format!("value {u} out of range"))),
                        Value::Bytes(b) => std::str::from_utf8(b)
                            .ok()
                            .and_then(|s| s.parse().ok())
                            .ok_or_else(|| Error::BadInputError("cannot parse column as integer".to_string())),
                        _ => Err(Error::BadInputError("column is not an integer".to_string())),
                    }
                }
            }
        )+
    };
}

impl_from_value_int!(i8, i16, i32, i64, u8, u16, u32, u64);

impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Float(f) => Ok(*f),
            Value::Double(d) => Ok(*d as f32),
            _ => Err(Error::BadInputError("column is not a float".to_string())),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Float(f) => Ok(*f as f64),
            Value::Double(d) => Ok(*d),
            _ => Err(Error::BadInputError("column is not a float".to_string())),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bytes(b) => String::from_utf8(b.clone())
                .map_err(|e| Error::BadInputError(format!("column is not valid utf-8: {e}"))),
            Value::Int(i) => Ok(i.to_string()),
            Value::UInt(u) => Ok(u.to_string()),
            _ => Err(Error::BadInputError(
                "column cannot be converted to String".to_string(),
            )),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            _ => Err(Error::BadInputError("column is not a byte string".to_string())),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: Vec<Value>) -> Row {
        Row::new(Arc::from(vec!["a".to_string(), "b".to_string()]), values)
    }

    #[test]
    fn gets_typed_value_by_index_and_name() {
        let r = row(vec![Value::Int(7), Value::Bytes(b"hi".to_vec())]);
        assert_eq!(r.get::<i64>(0).unwrap(), 7);
        assert_eq!(r.get::<String>("b").unwrap(), "hi");
    }

    #[test]
    fn null_decodes_to_none() {
        let r = row(vec![Value::Null, Value::Null]);
        assert_eq!(r.get::<Option<i64>>(0).unwrap(), None);
    }

    #[test]
    fn unknown_column_name_errors() {
        let r = row(vec![Value::Int(1), Value::Int(2)]);
        assert!(r.get::<i64>("nope").is_err());
    }
}
