//! Walks a value through serde and rejects non-finite floats.
//!
//! serde_json writes `NaN` and the infinities as `null`, which would not
//! decode back to the same value.

use serde::Serialize;
use serde::ser;

#[derive(thiserror::Error, Debug)]
#[error("{0}")]
pub(crate) struct FloatError(String);

impl ser::Error for FloatError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        FloatError(msg.to_string())
    }
}

/// Fails on the first `NaN` or infinite float reachable from `value`.
pub(crate) fn ensure_finite<T>(value: &T) -> Result<(), FloatError>
where
    T: Serialize + ?Sized,
{
    value.serialize(FiniteFloats)
}

fn check(value: f64) -> Result<(), FloatError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(FloatError(format!("non-finite float {}", value)))
    }
}

#[derive(Clone, Copy)]
struct FiniteFloats;

impl ser::Serializer for FiniteFloats {
    type Ok = ();
    type Error = FloatError;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_bool(self, _v: bool) -> Result<(), FloatError> {
        Ok(())
    }

    fn serialize_i8(self, _v: i8) -> Result<(), FloatError> {
        Ok(())
    }

    fn serialize_i16(self, _v: i16) -> Result<(), FloatError> {
        Ok(())
    }

    fn serialize_i32(self, _v: i32) -> Result<(), FloatError> {
        Ok(())
    }

    fn serialize_i64(self, _v: i64) -> Result<(), FloatError> {
        Ok(())
    }

    fn serialize_i128(self, _v: i128) -> Result<(), FloatError> {
        Ok(())
    }

    fn serialize_u8(self, _v: u8) -> Result<(), FloatError> {
        Ok(())
    }

    fn serialize_u16(self, _v: u16) -> Result<(), FloatError> {
        Ok(())
    }

    fn serialize_u32(self, _v: u32) -> Result<(), FloatError> {
        Ok(())
    }

    fn serialize_u64(self, _v: u64) -> Result<(), FloatError> {
        Ok(())
    }

    fn serialize_u128(self, _v: u128) -> Result<(), FloatError> {
        Ok(())
    }

    fn serialize_f32(self, v: f32) -> Result<(), FloatError> {
        check(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<(), FloatError> {
        check(v)
    }

    fn serialize_char(self, _v: char) -> Result<(), FloatError> {
        Ok(())
    }

    fn serialize_str(self, _v: &str) -> Result<(), FloatError> {
        Ok(())
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<(), FloatError> {
        Ok(())
    }

    fn serialize_none(self) -> Result<(), FloatError> {
        Ok(())
    }

    fn serialize_some<T>(self, value: &T) -> Result<(), FloatError>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<(), FloatError> {
        Ok(())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<(), FloatError> {
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
    ) -> Result<(), FloatError> {
        Ok(())
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<(), FloatError>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        value: &T,
    ) -> Result<(), FloatError>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(self)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self, FloatError> {
        Ok(self)
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self, FloatError> {
        Ok(self)
    }

    fn serialize_tuple_struct(self, _name: &'static str, _len: usize) -> Result<Self, FloatError> {
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self, FloatError> {
        Ok(self)
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self, FloatError> {
        Ok(self)
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self, FloatError> {
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self, FloatError> {
        Ok(self)
    }
}

impl ser::SerializeSeq for FiniteFloats {
    type Ok = ();
    type Error = FloatError;

    fn serialize_element<T>(&mut self, value: &T) -> Result<(), FloatError>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(*self)
    }

    fn end(self) -> Result<(), FloatError> {
        Ok(())
    }
}

impl ser::SerializeTuple for FiniteFloats {
    type Ok = ();
    type Error = FloatError;

    fn serialize_element<T>(&mut self, value: &T) -> Result<(), FloatError>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(*self)
    }

    fn end(self) -> Result<(), FloatError> {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for FiniteFloats {
    type Ok = ();
    type Error = FloatError;

    fn serialize_field<T>(&mut self, value: &T) -> Result<(), FloatError>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(*self)
    }

    fn end(self) -> Result<(), FloatError> {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for FiniteFloats {
    type Ok = ();
    type Error = FloatError;

    fn serialize_field<T>(&mut self, value: &T) -> Result<(), FloatError>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(*self)
    }

    fn end(self) -> Result<(), FloatError> {
        Ok(())
    }
}

impl ser::SerializeMap for FiniteFloats {
    type Ok = ();
    type Error = FloatError;

    // Float map keys become strings in JSON, so only values are checked
    fn serialize_key<T>(&mut self, _key: &T) -> Result<(), FloatError>
    where
        T: Serialize + ?Sized,
    {
        Ok(())
    }

    fn serialize_value<T>(&mut self, value: &T) -> Result<(), FloatError>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(*self)
    }

    fn end(self) -> Result<(), FloatError> {
        Ok(())
    }
}

impl ser::SerializeStruct for FiniteFloats {
    type Ok = ();
    type Error = FloatError;

    fn serialize_field<T>(&mut self, _key: &'static str, value: &T) -> Result<(), FloatError>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(*self)
    }

    fn end(self) -> Result<(), FloatError> {
        Ok(())
    }
}

impl ser::SerializeStructVariant for FiniteFloats {
    type Ok = ();
    type Error = FloatError;

    fn serialize_field<T>(&mut self, _key: &'static str, value: &T) -> Result<(), FloatError>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(*self)
    }

    fn end(self) -> Result<(), FloatError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    struct Reading {
        sensor: String,
        values: Vec<f64>,
        calibration: Option<f32>,
    }

    #[derive(Serialize)]
    enum Sample {
        Scalar(f64),
        Pair { low: f64, high: f64 },
    }

    #[test]
    fn test_finite_values_pass() {
        let reading = Reading {
            sensor: "t1".to_string(),
            values: vec![0.0, -0.0, f64::MAX, f64::MIN_POSITIVE],
            calibration: Some(1.5),
        };
        assert!(ensure_finite(&reading).is_ok());
        assert!(ensure_finite(&Sample::Pair { low: -1.0, high: 1.0 }).is_ok());
        assert!(ensure_finite("no floats here").is_ok());
    }

    #[test]
    fn test_non_finite_values_rejected() {
        assert!(ensure_finite(&f64::NAN).is_err());
        assert!(ensure_finite(&Some(f64::INFINITY)).is_err());
        assert!(ensure_finite(&f32::NEG_INFINITY).is_err());
        assert!(ensure_finite(&Sample::Scalar(f64::NAN)).is_err());
        assert!(
            ensure_finite(&Sample::Pair {
                low: 0.0,
                high: f64::INFINITY
            })
            .is_err()
        );

        let nested = Reading {
            sensor: "t2".to_string(),
            values: vec![1.0, f64::NAN],
            calibration: None,
        };
        let err = ensure_finite(&nested).unwrap_err();
        assert!(err.to_string().contains("NaN"));

        let mut map = BTreeMap::new();
        map.insert("x", (1u8, f64::NEG_INFINITY));
        assert!(ensure_finite(&map).is_err());
    }
}
