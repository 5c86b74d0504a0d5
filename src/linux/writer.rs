//! A [`serde::Serializer`] that turns a struct into one quadlet-file
//! section: a `[Name]` header followed by `Key=Value` lines in field
//! declaration order. Sequence fields repeat the key once per element.
//!
//! Adapted from the project's own command-line-argument/quadlet-section
//! writer split: this module plays the role of the quadlet-section half.

use std::fmt::{self, Display, Write as _};

use serde::ser::{self, Impossible};
use serde::Serialize;
use thiserror::Error;

/// Serializes `iter` by joining its items with spaces, quoting any item
/// that itself contains whitespace.
pub fn quote_spaces_join_space<'a, T, S>(iter: &'a T, serializer: S) -> Result<S::Ok, S::Error>
where
    &'a T: IntoIterator,
    <&'a T as IntoIterator>::Item: AsRef<str>,
    S: ser::Serializer,
{
    let mut output = String::new();
    let mut iter = iter.into_iter();

    if let Some(first) = iter.next() {
        quote_spaces_push(&mut output, first.as_ref());
    }
    for item in iter {
        output.push(' ');
        quote_spaces_push(&mut output, item.as_ref());
    }

    output.serialize(serializer)
}

fn quote_spaces_push(output: &mut String, item: &str) {
    if item.contains(char::is_whitespace) {
        output.push('"');
        output.push_str(item);
        output.push('"');
    } else {
        output.push_str(item);
    }
}

/// Serializes `value` to one quadlet section, including its `[Name]`
/// header.
///
/// # Errors
///
/// Returns an error if `T` is not a struct, or if it contains a field type
/// this writer does not support (e.g. a nested map).
pub fn to_string<T: Serialize>(value: T) -> Result<String, Error> {
    let mut serializer = Serializer::default();
    value.serialize(&mut serializer)?;
    Ok(serializer.output)
}

/// Like [`to_string`] but omits the `[Name]` header, for callers that
/// compose several sections in one file and write headers themselves.
pub fn to_string_no_header<T: Serialize>(value: T) -> Result<String, Error> {
    let mut serializer = Serializer {
        output: String::new(),
        no_header: true,
    };
    value.serialize(&mut serializer)?;
    Ok(serializer.output)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("error while serializing: {0}")]
    Custom(String),
    #[error("type cannot be serialized as a quadlet section")]
    InvalidType,
}

impl ser::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Self::Custom(msg.to_string())
    }
}

#[derive(Debug, Default)]
struct Serializer {
    output: String,
    no_header: bool,
}

macro_rules! reject_scalar {
    ($($f:ident: $t:ty,)*) => {
        $(
            fn $f(self, _v: $t) -> Result<Self::Ok, Self::Error> {
                Err(Error::InvalidType)
            }
        )*
    };
}

impl ser::Serializer for &mut Serializer {
    type Ok = ();
    type Error = Error;
    type SerializeSeq = Impossible<(), Error>;
    type SerializeTuple = Impossible<(), Error>;
    type SerializeTupleStruct = Impossible<(), Error>;
    type SerializeTupleVariant = Impossible<(), Error>;
    type SerializeMap = Impossible<(), Error>;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    reject_scalar! {
        serialize_bool: bool,
        serialize_i8: i8,
        serialize_i16: i16,
        serialize_i32: i32,
        serialize_i64: i64,
        serialize_u8: u8,
        serialize_u16: u16,
        serialize_u32: u32,
        serialize_u64: u64,
        serialize_f32: f32,
        serialize_f64: f64,
        serialize_char: char,
        serialize_str: &str,
        serialize_bytes: &[u8],
    }

    fn serialize_none(self) -> Result<Self::Ok, Self::Error> {
        Err(Error::InvalidType)
    }

    fn serialize_some<T: ?Sized + Serialize>(self, _value: &T) -> Result<Self::Ok, Self::Error> {
        Err(Error::InvalidType)
    }

    fn serialize_unit(self) -> Result<Self::Ok, Self::Error> {
        Err(Error::InvalidType)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Self::Ok, Self::Error> {
        Err(Error::InvalidType)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
    ) -> Result<Self::Ok, Self::Error> {
        Err(Error::InvalidType)
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(self, _name: &'static str, _value: &T) -> Result<Self::Ok, Self::Error> {
        Err(Error::InvalidType)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<Self::Ok, Self::Error> {
        Err(Error::InvalidType)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, Self::Error> {
        Err(Error::InvalidType)
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, Self::Error> {
        Err(Error::InvalidType)
    }

    fn serialize_tuple_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeTupleStruct, Self::Error> {
        Err(Error::InvalidType)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, Self::Error> {
        Err(Error::InvalidType)
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        Err(Error::InvalidType)
    }

    fn serialize_struct(self, name: &'static str, _len: usize) -> Result<Self::SerializeStruct, Self::Error> {
        if !self.no_header {
            writeln!(self.output, "[{name}]").unwrap_or_else(|e| unreachable!("write to String never fails: {e}"));
        }
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, Self::Error> {
        if !self.no_header {
            writeln!(self.output, "[{variant}]").unwrap_or_else(|e| unreachable!("write to String never fails: {e}"));
        }
        Ok(self)
    }
}

impl ser::SerializeStruct for &mut Serializer {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, key: &'static str, value: &T) -> Result<(), Self::Error> {
        value.serialize(&mut ValueSerializer { serializer: self, key })
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        Ok(())
    }
}

impl ser::SerializeStructVariant for &mut Serializer {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, key: &'static str, value: &T) -> Result<(), Self::Error> {
        ser::SerializeStruct::serialize_field(self, key, value)
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        ser::SerializeStruct::end(self)
    }
}

/// Serializes one field's value as `key=value`, suppressing the line
/// entirely for `None`, empty strings, and `false`. Sequences repeat the
/// key once per element.
struct ValueSerializer<'a> {
    serializer: &'a mut Serializer,
    key: &'static str,
}

impl ValueSerializer<'_> {
    fn write_value(&mut self, value: impl Display) {
        writeln!(self.serializer.output, "{}={value}", self.key).unwrap_or_else(|e| unreachable!("write to String never fails: {e}"));
    }
}

macro_rules! write_scalar {
    ($($f:ident: $t:ty,)*) => {
        $(
            fn $f(self, v: $t) -> Result<Self::Ok, Self::Error> {
                self.write_value(v);
                Ok(())
            }
        )*
    };
}

/// Zero-valued integers are suppressed, matching the writer's rule for
/// unset numeric fields (most unit directives have no meaningful zero).
macro_rules! write_integer {
    ($($f:ident: $t:ty,)*) => {
        $(
            fn $f(self, v: $t) -> Result<Self::Ok, Self::Error> {
                if v != 0 {
                    self.write_value(v);
                }
                Ok(())
            }
        )*
    };
}

impl ser::Serializer for &mut ValueSerializer<'_> {
    type Ok = ();
    type Error = Error;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Impossible<(), Error>;
    type SerializeStruct = Impossible<(), Error>;
    type SerializeStructVariant = Impossible<(), Error>;

    fn serialize_bool(self, v: bool) -> Result<Self::Ok, Self::Error> {
        if v {
            writeln!(self.serializer.output, "{}=yes", self.key).unwrap_or_else(|e| unreachable!("write to String never fails: {e}"));
        }
        Ok(())
    }

    write_integer! {
        serialize_i8: i8,
        serialize_i16: i16,
        serialize_i32: i32,
        serialize_i64: i64,
        serialize_u8: u8,
        serialize_u16: u16,
        serialize_u32: u32,
        serialize_u64: u64,
    }

    write_scalar! {
        serialize_f32: f32,
        serialize_f64: f64,
        serialize_char: char,
    }

    fn serialize_str(self, v: &str) -> Result<Self::Ok, Self::Error> {
        if !v.is_empty() {
            self.write_value(v);
        }
        Ok(())
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<Self::Ok, Self::Error> {
        Err(Error::InvalidType)
    }

    fn serialize_none(self) -> Result<Self::Ok, Self::Error> {
        Ok(())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Self::Ok, Self::Error> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Self::Ok, Self::Error> {
        Err(Error::InvalidType)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Self::Ok, Self::Error> {
        Err(Error::InvalidType)
    }

    fn serialize_unit_variant(self, _name: &'static str, _index: u32, variant: &'static str) -> Result<Self::Ok, Self::Error> {
        self.serialize_str(variant)
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(self, _name: &'static str, value: &T) -> Result<Self::Ok, Self::Error> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        value: &T,
    ) -> Result<Self::Ok, Self::Error> {
        value.serialize(self)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, Self::Error> {
        Ok(self)
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, Self::Error> {
        Ok(self)
    }

    fn serialize_tuple_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeTupleStruct, Self::Error> {
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, Self::Error> {
        Ok(self)
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        Err(Error::InvalidType)
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct, Self::Error> {
        Err(Error::InvalidType)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, Self::Error> {
        Err(Error::InvalidType)
    }

    fn collect_str<T: ?Sized + Display>(self, value: &T) -> Result<Self::Ok, Self::Error> {
        self.write_value(value);
        Ok(())
    }
}

impl ser::SerializeSeq for &mut ValueSerializer<'_> {
    type Ok = ();
    type Error = Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        Ok(())
    }
}

impl ser::SerializeTuple for &mut ValueSerializer<'_> {
    type Ok = ();
    type Error = Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for &mut ValueSerializer<'_> {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleVariant for &mut ValueSerializer<'_> {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        ser::SerializeSeq::end(self)
    }
}

impl fmt::Display for Serializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_struct_gets_header_and_fields() {
        #[derive(Serialize)]
        #[serde(rename_all = "PascalCase")]
        struct Test {
            one: u8,
            two: &'static str,
        }

        let sut = Test { one: 1, two: "two" };
        assert_eq!(to_string(sut).unwrap(), "[Test]\nOne=1\nTwo=two\n");
    }

    #[test]
    fn sequence_repeats_key() {
        #[derive(Serialize)]
        #[serde(rename_all = "PascalCase")]
        struct Test {
            vec: Vec<u8>,
        }

        let sut = Test { vec: vec![1, 2, 3] };
        assert_eq!(to_string(sut).unwrap(), "[Test]\nVec=1\nVec=2\nVec=3\n");
    }

    #[test]
    fn false_bool_is_omitted_true_is_yes() {
        #[derive(Serialize)]
        #[serde(rename_all = "PascalCase")]
        struct Test {
            on: bool,
            off: bool,
        }

        let sut = Test { on: true, off: false };
        assert_eq!(to_string(sut).unwrap(), "[Test]\nOn=yes\n");
    }

    #[test]
    fn empty_string_and_none_are_omitted() {
        #[derive(Serialize)]
        #[serde(rename_all = "PascalCase")]
        struct Test {
            empty: &'static str,
            absent: Option<&'static str>,
        }

        let sut = Test { empty: "", absent: None };
        assert_eq!(to_string(sut).unwrap(), "[Test]\n");
    }

    #[test]
    fn zero_integers_are_omitted() {
        #[derive(Serialize)]
        #[serde(rename_all = "PascalCase")]
        struct Test {
            retries: u32,
            timeout: u32,
        }

        let sut = Test { retries: 0, timeout: 30 };
        assert_eq!(to_string(sut).unwrap(), "[Test]\nTimeout=30\n");
    }

    #[test]
    fn no_header_variant_omits_brackets() {
        #[derive(Serialize)]
        #[serde(rename_all = "PascalCase")]
        struct Test {
            one: u8,
        }

        assert_eq!(to_string_no_header(Test { one: 1 }).unwrap(), "One=1\n");
    }
}
