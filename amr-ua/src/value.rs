//! Runtime values exchanged with the address space.
//!
//! A [`Variant`] is the loosely typed value a client sends or receives. Stored
//! variables and method arguments are declared with a [`DataType`] and a
//! [`ValueRank`]; [`Variant::conforms_to`] checks a value against such a
//! declaration without converting it.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use strum::{Display, EnumString};

/// Scalar wire types.
///
/// Only the types for which [`DataType::is_declarable`] holds may be used for
/// variables and method arguments. The others can still arrive from clients
/// and are accepted as conversion sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
pub enum DataType {
    Boolean,
    Byte,
    UInt16,
    Int32,
    UInt32,
    Int64,
    Float,
    Double,
    String,
}

impl DataType {
    pub fn is_declarable(self) -> bool {
        matches!(
            self,
            DataType::Boolean | DataType::Byte | DataType::UInt16 | DataType::Double | DataType::String
        )
    }
}

/// Arity of a value: scalar, one-dimensional or two-dimensional array.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
pub enum ValueRank {
    #[default]
    Scalar,
    OneDimension,
    TwoDimensions,
}

/// A dynamically typed value.
///
/// Arrays are represented as nested `Array` values; a two-dimensional value is
/// an array of arrays.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Variant {
    Null,
    Boolean(bool),
    Byte(u8),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    Float(f32),
    Double(f64),
    String(String),
    Array(Vec<Variant>),
}

macro_rules! impl_scalar_accessors {
    ($($method:ident -> $variant:ident : $ty:ty),* $(,)?) => {
        impl Variant {
            $(
                #[doc = concat!("Try to extract as ", stringify!($ty), ".")]
                pub fn $method(&self) -> Option<$ty> {
                    match self {
                        Variant::$variant(v) => Some(*v),
                        _ => None,
                    }
                }
            )*
        }
    };
}

impl_scalar_accessors! {
    as_bool -> Boolean: bool,
    as_u8 -> Byte: u8,
    as_u16 -> UInt16: u16,
    as_i32 -> Int32: i32,
    as_u32 -> UInt32: u32,
    as_i64 -> Int64: i64,
    as_f32 -> Float: f32,
    as_f64 -> Double: f64,
}

impl Variant {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Variant]> {
        match self {
            Variant::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Extract a one-dimensional array of doubles.
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        self.as_array()?.iter().map(Variant::as_f64).collect()
    }

    /// Scalar type of this value, `None` for `Null` and arrays.
    pub fn data_type(&self) -> Option<DataType> {
        Some(match self {
            Variant::Null | Variant::Array(_) => return None,
            Variant::Boolean(_) => DataType::Boolean,
            Variant::Byte(_) => DataType::Byte,
            Variant::UInt16(_) => DataType::UInt16,
            Variant::Int32(_) => DataType::Int32,
            Variant::UInt32(_) => DataType::UInt32,
            Variant::Int64(_) => DataType::Int64,
            Variant::Float(_) => DataType::Float,
            Variant::Double(_) => DataType::Double,
            Variant::String(_) => DataType::String,
        })
    }

    /// Whether the value already has exactly the declared type and rank.
    ///
    /// Empty arrays conform to any element type.
    pub fn conforms_to(&self, data_type: DataType, rank: ValueRank) -> bool {
        match (rank, self) {
            (ValueRank::Scalar, v) => v.data_type() == Some(data_type),
            (ValueRank::OneDimension, Variant::Array(items)) => items
                .iter()
                .all(|v| v.conforms_to(data_type, ValueRank::Scalar)),
            (ValueRank::TwoDimensions, Variant::Array(rows)) => rows
                .iter()
                .all(|row| row.conforms_to(data_type, ValueRank::OneDimension)),
            _ => false,
        }
    }

    /// Short type description used in error messages, e.g. `Double[]`.
    pub fn type_name(&self) -> String {
        match self {
            Variant::Null => "Null".to_string(),
            Variant::Array(items) => match items.first() {
                Some(first) => format!("{}[]", first.type_name()),
                None => "Array".to_string(),
            },
            scalar => scalar
                .data_type()
                .map(|t| t.to_string())
                .unwrap_or_default(),
        }
    }

    /// Zero value for a declaration.
    pub fn default_for(data_type: DataType, rank: ValueRank) -> Variant {
        if rank != ValueRank::Scalar {
            return Variant::Array(Vec::new());
        }
        match data_type {
            DataType::Boolean => Variant::Boolean(false),
            DataType::Byte => Variant::Byte(0),
            DataType::UInt16 => Variant::UInt16(0),
            DataType::Int32 => Variant::Int32(0),
            DataType::UInt32 => Variant::UInt32(0),
            DataType::Int64 => Variant::Int64(0),
            DataType::Float => Variant::Float(0.0),
            DataType::Double => Variant::Double(0.0),
            DataType::String => Variant::String(String::new()),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Null => Ok(()),
            Variant::Boolean(v) => write!(f, "{}", if *v { "True" } else { "False" }),
            Variant::Byte(v) => write!(f, "{v}"),
            Variant::UInt16(v) => write!(f, "{v}"),
            Variant::Int32(v) => write!(f, "{v}"),
            Variant::UInt32(v) => write!(f, "{v}"),
            Variant::Int64(v) => write!(f, "{v}"),
            Variant::Float(v) => write!(f, "{v}"),
            Variant::Double(v) => write!(f, "{v}"),
            Variant::String(v) => f.write_str(v),
            Variant::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident);* $(;)?) => {
        $(
            impl From<$ty> for Variant {
                fn from(v: $ty) -> Self {
                    Variant::$variant(v)
                }
            }
        )*
    };
}

impl_from_scalar! {
    bool => Boolean;
    u8 => Byte;
    u16 => UInt16;
    i32 => Int32;
    u32 => UInt32;
    i64 => Int64;
    f32 => Float;
    f64 => Double;
    String => String;
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Variant::String(v.to_string())
    }
}

impl<T: Into<Variant>> From<Vec<T>> for Variant {
    fn from(items: Vec<T>) -> Self {
        Variant::Array(items.into_iter().map(Into::into).collect())
    }
}

/// Nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn now() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        Timestamp(nanos)
    }

    pub fn from_nanos(nanos: u64) -> Self {
        Timestamp(nanos)
    }

    pub fn as_nanos(self) -> u64 {
        self.0
    }

    /// The current time, or one nanosecond past `prev` if the clock has not
    /// moved beyond it.
    pub fn after(prev: Timestamp) -> Self {
        Timestamp::now().max(Timestamp(prev.0.saturating_add(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_for_conforms() {
        for data_type in [DataType::Boolean, DataType::Byte, DataType::Double, DataType::String] {
            for rank in [ValueRank::Scalar, ValueRank::OneDimension] {
                let v = Variant::default_for(data_type, rank);
                assert!(v.conforms_to(data_type, rank), "{data_type} {rank:?}");
            }
        }
        assert_eq!(Variant::default_for(DataType::Double, ValueRank::Scalar), Variant::Double(0.0));
    }

    #[test]
    fn test_conforms_scalar_and_arrays() {
        assert!(Variant::Double(1.0).conforms_to(DataType::Double, ValueRank::Scalar));
        assert!(!Variant::Float(1.0).conforms_to(DataType::Double, ValueRank::Scalar));
        assert!(!Variant::Double(1.0).conforms_to(DataType::Double, ValueRank::OneDimension));

        let scan = Variant::from(vec![0.5, 1.5]);
        assert!(scan.conforms_to(DataType::Double, ValueRank::OneDimension));
        assert!(!scan.conforms_to(DataType::String, ValueRank::OneDimension));
        assert!(Variant::Array(vec![]).conforms_to(DataType::String, ValueRank::OneDimension));

        let grid = Variant::Array(vec![Variant::from(vec![1.0, 2.0]), Variant::from(vec![3.0])]);
        assert!(grid.conforms_to(DataType::Double, ValueRank::TwoDimensions));
    }

    #[test]
    fn test_type_name() {
        assert_eq!(Variant::from(vec![1.0]).type_name(), "Double[]");
        assert_eq!(Variant::from("a").type_name(), "String");
        assert_eq!(Variant::Null.type_name(), "Null");
    }

    #[test]
    fn test_timestamp_after_is_strictly_later() {
        let far = Timestamp::from_nanos(u64::MAX - 10);
        assert_eq!(Timestamp::after(far).as_nanos(), u64::MAX - 9);
        let now = Timestamp::now();
        assert!(Timestamp::after(now) > now);
    }

    #[test]
    fn test_data_type_parse() {
        assert_eq!("Double".parse::<DataType>().ok(), Some(DataType::Double));
        assert!(DataType::UInt16.is_declarable());
        assert!(!DataType::Int32.is_declarable());
    }
}
