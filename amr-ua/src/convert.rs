//! Conversion of inbound client values to declared argument types.
//!
//! Clients frequently send a numerically compatible value of a different wire
//! type (an `Int32` where a `Double` is declared, or a numeric string). Those
//! are accepted; anything out of range or unparsable is rejected.

use crate::value::{DataType, ValueRank, Variant};

/// Convert `value` to `data_type` with the given rank.
///
/// The error string describes why the value was rejected; callers attach the
/// argument position.
pub fn convert(value: &Variant, data_type: DataType, rank: ValueRank) -> Result<Variant, String> {
    match rank {
        ValueRank::Scalar => convert_scalar(value, data_type),
        ValueRank::OneDimension => {
            let items = value
                .as_array()
                .ok_or_else(|| format!("expected an array, got {}", value.type_name()))?;
            items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    convert_scalar(item, data_type).map_err(|e| format!("element {i}: {e}"))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Variant::Array)
        }
        ValueRank::TwoDimensions => {
            let rows = value
                .as_array()
                .ok_or_else(|| format!("expected a two-dimensional array, got {}", value.type_name()))?;
            let mut converted = Vec::with_capacity(rows.len());
            let mut width = None;
            for (i, row) in rows.iter().enumerate() {
                let row = convert(row, data_type, ValueRank::OneDimension)
                    .map_err(|e| format!("row {i}: {e}"))?;
                let len = row.as_array().map(<[Variant]>::len).unwrap_or_default();
                match width {
                    None => width = Some(len),
                    Some(w) if w != len => {
                        return Err(format!("row {i} has {len} elements, expected {w}"));
                    }
                    Some(_) => {}
                }
                converted.push(row);
            }
            Ok(Variant::Array(converted))
        }
    }
}

fn convert_scalar(value: &Variant, data_type: DataType) -> Result<Variant, String> {
    if matches!(value, Variant::Array(_)) {
        return Err(format!("expected a scalar, got {}", value.type_name()));
    }
    if value.data_type() == Some(data_type) {
        return Ok(value.clone());
    }
    match data_type {
        DataType::Double => to_f64(value).map(Variant::Double),
        DataType::Float => to_f64(value).map(|v| Variant::Float(v as f32)),
        DataType::Byte => to_unsigned(value, u8::MAX as u64).map(|v| Variant::Byte(v as u8)),
        DataType::UInt16 => to_unsigned(value, u16::MAX as u64).map(|v| Variant::UInt16(v as u16)),
        DataType::UInt32 => to_unsigned(value, u32::MAX as u64).map(|v| Variant::UInt32(v as u32)),
        DataType::Int32 => to_signed(value, i32::MIN as i64, i32::MAX as i64).map(|v| Variant::Int32(v as i32)),
        DataType::Int64 => to_signed(value, i64::MIN, i64::MAX).map(Variant::Int64),
        DataType::Boolean => to_bool(value).map(Variant::Boolean),
        DataType::String => match value {
            Variant::Null => Ok(Variant::String(String::new())),
            other => Ok(Variant::String(other.to_string())),
        },
    }
}

fn to_f64(value: &Variant) -> Result<f64, String> {
    match value {
        Variant::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Variant::Byte(v) => Ok(*v as f64),
        Variant::UInt16(v) => Ok(*v as f64),
        Variant::Int32(v) => Ok(*v as f64),
        Variant::UInt32(v) => Ok(*v as f64),
        Variant::Int64(v) => Ok(*v as f64),
        Variant::Float(v) => Ok(*v as f64),
        Variant::Double(v) => Ok(*v),
        Variant::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("'{s}' is not a number")),
        Variant::Null | Variant::Array(_) => Err(format!("cannot convert {}", value.type_name())),
    }
}

/// Integral value of `value` as i128 so both signed and unsigned ranges can
/// be checked without overflow. Floats are rounded half-to-even.
fn to_integral(value: &Variant) -> Result<i128, String> {
    match value {
        Variant::Boolean(b) => Ok(*b as i128),
        Variant::Byte(v) => Ok(*v as i128),
        Variant::UInt16(v) => Ok(*v as i128),
        Variant::Int32(v) => Ok(*v as i128),
        Variant::UInt32(v) => Ok(*v as i128),
        Variant::Int64(v) => Ok(*v as i128),
        Variant::Float(v) => round_float(*v as f64),
        Variant::Double(v) => round_float(*v),
        Variant::String(s) => s
            .trim()
            .parse::<i128>()
            .map_err(|_| format!("'{s}' is not an integer")),
        Variant::Null | Variant::Array(_) => Err(format!("cannot convert {}", value.type_name())),
    }
}

fn round_float(v: f64) -> Result<i128, String> {
    if !v.is_finite() || v.abs() > 1e30 {
        return Err(format!("{v} is out of range"));
    }
    Ok(v.round_ties_even() as i128)
}

fn to_unsigned(value: &Variant, max: u64) -> Result<u64, String> {
    let v = to_integral(value)?;
    if v < 0 || v > max as i128 {
        return Err(format!("{value} is outside 0..={max}"));
    }
    Ok(v as u64)
}

fn to_signed(value: &Variant, min: i64, max: i64) -> Result<i64, String> {
    let v = to_integral(value)?;
    if v < min as i128 || v > max as i128 {
        return Err(format!("{value} is outside {min}..={max}"));
    }
    Ok(v as i64)
}

fn to_bool(value: &Variant) -> Result<bool, String> {
    match value {
        Variant::Boolean(b) => Ok(*b),
        Variant::String(s) => {
            let s = s.trim();
            if s.eq_ignore_ascii_case("true") {
                Ok(true)
            } else if s.eq_ignore_ascii_case("false") {
                Ok(false)
            } else {
                Err(format!("'{s}' is not a boolean"))
            }
        }
        Variant::Null | Variant::Array(_) => Err(format!("cannot convert {}", value.type_name())),
        number => to_f64(number).map(|v| v != 0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_widening_to_double() {
        assert_eq!(
            convert(&Variant::Int32(3), DataType::Double, ValueRank::Scalar),
            Ok(Variant::Double(3.0))
        );
        assert_eq!(
            convert(&Variant::from(" 1.5 "), DataType::Double, ValueRank::Scalar),
            Ok(Variant::Double(1.5))
        );
        assert_eq!(
            convert(&Variant::Boolean(true), DataType::Double, ValueRank::Scalar),
            Ok(Variant::Double(1.0))
        );
    }

    #[test]
    fn test_non_numeric_string_rejected() {
        let err = convert(&Variant::from("abc"), DataType::Double, ValueRank::Scalar).unwrap_err();
        assert!(err.contains("abc"));
    }

    #[test]
    fn test_null_only_converts_to_string() {
        assert!(convert(&Variant::Null, DataType::Double, ValueRank::Scalar).is_err());
        assert!(convert(&Variant::Null, DataType::Boolean, ValueRank::Scalar).is_err());
        assert_eq!(
            convert(&Variant::Null, DataType::String, ValueRank::Scalar),
            Ok(Variant::String(String::new()))
        );
    }

    #[test]
    fn test_unsigned_range_and_rounding() {
        assert_eq!(
            convert(&Variant::Double(2.5), DataType::Byte, ValueRank::Scalar),
            Ok(Variant::Byte(2))
        );
        assert_eq!(
            convert(&Variant::Double(3.5), DataType::Byte, ValueRank::Scalar),
            Ok(Variant::Byte(4))
        );
        assert!(convert(&Variant::Int32(256), DataType::Byte, ValueRank::Scalar).is_err());
        assert!(convert(&Variant::Int32(-1), DataType::UInt16, ValueRank::Scalar).is_err());
        assert_eq!(
            convert(&Variant::from("65535"), DataType::UInt16, ValueRank::Scalar),
            Ok(Variant::UInt16(65535))
        );
        assert!(convert(&Variant::Double(f64::NAN), DataType::UInt16, ValueRank::Scalar).is_err());
    }

    #[test]
    fn test_bool_conversion() {
        assert_eq!(
            convert(&Variant::from("TRUE"), DataType::Boolean, ValueRank::Scalar),
            Ok(Variant::Boolean(true))
        );
        assert_eq!(
            convert(&Variant::Byte(0), DataType::Boolean, ValueRank::Scalar),
            Ok(Variant::Boolean(false))
        );
        assert!(convert(&Variant::from("yes"), DataType::Boolean, ValueRank::Scalar).is_err());
    }

    #[test]
    fn test_string_from_scalars() {
        assert_eq!(
            convert(&Variant::Double(1.5), DataType::String, ValueRank::Scalar),
            Ok(Variant::from("1.5"))
        );
        assert!(convert(&Variant::from(vec![1.0]), DataType::String, ValueRank::Scalar).is_err());
    }

    #[test]
    fn test_rank_is_enforced() {
        assert!(convert(&Variant::Double(1.0), DataType::Double, ValueRank::OneDimension).is_err());
        assert_eq!(
            convert(&Variant::from(vec![1i32, 2]), DataType::Double, ValueRank::OneDimension),
            Ok(Variant::from(vec![1.0, 2.0]))
        );
        let err = convert(
            &Variant::Array(vec![Variant::Double(1.0), Variant::from("x")]),
            DataType::Double,
            ValueRank::OneDimension,
        )
        .unwrap_err();
        assert!(err.starts_with("element 1"));
    }

    #[test]
    fn test_two_dimensions_must_be_rectangular() {
        let ok = Variant::Array(vec![Variant::from(vec![1.0, 2.0]), Variant::from(vec![3.0, 4.0])]);
        assert!(convert(&ok, DataType::Double, ValueRank::TwoDimensions).is_ok());

        let ragged = Variant::Array(vec![Variant::from(vec![1.0, 2.0]), Variant::from(vec![3.0])]);
        assert!(convert(&ragged, DataType::Double, ValueRank::TwoDimensions).is_err());
    }
}
