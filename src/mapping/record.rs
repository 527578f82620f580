use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::CsvError;

use super::value::{FromValue, Value, ValueType};

/// Name and type of one record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub value_type: ValueType,
}

/// A type whose named fields can be read and written as [`Value`]s.
///
/// Implement it by hand or with [`impl_record!`](crate::impl_record).
pub trait Record: Default {
    /// Field descriptors in declaration order.
    fn fields() -> &'static [FieldDescriptor];

    /// Current value of field `name`, `None` when no such field exists.
    fn get(&self, name: &str) -> Option<Value>;

    /// Assigns field `name`, converting `value` into the field's type.
    fn set(&mut self, name: &str, value: Value) -> Result<(), CsvError>;

    fn field(name: &str) -> Option<&'static FieldDescriptor> {
        Self::fields().iter().find(|field| field.name == name)
    }
}

/// A type usable as a field of a record generated by [`impl_record!`](crate::impl_record).
pub trait FieldValue: FromValue + Into<Value> + Clone {
    const VALUE_TYPE: ValueType;
}

macro_rules! field_value {
    ($($ty:ty => $value_type:ident),* $(,)?) => {
        $(
            impl FieldValue for $ty {
                const VALUE_TYPE: ValueType = ValueType::$value_type;
            }
        )*
    };
}

field_value! {
    String => Text,
    bool => Bool,
    i64 => Integer,
    i32 => Integer,
    u32 => Integer,
    f64 => Float,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => DateTime,
}

impl<T: FieldValue> FieldValue for Option<T> {
    const VALUE_TYPE: ValueType = T::VALUE_TYPE;
}

/// Implements [`Record`](crate::mapping::record::Record) for a struct with
/// named fields. Fields are listed in the order columns should be derived.
///
/// # Examples
///
/// ```
/// use csv_batch_rs::impl_record;
/// use csv_batch_rs::mapping::{record::Record, value::Value};
///
/// #[derive(Debug, Default)]
/// struct Person {
///     name: String,
///     age: Option<i64>,
/// }
///
/// impl_record!(Person { name: String, age: Option<i64> });
///
/// let mut person = Person::default();
/// person.set("age", Value::Integer(42)).unwrap();
///
/// assert_eq!(Person::fields()[0].name, "name");
/// assert_eq!(person.get("age"), Some(Value::Integer(42)));
/// assert!(person.set("height", Value::Null).is_err());
/// ```
#[macro_export]
macro_rules! impl_record {
    ($record:ty { $($field:ident : $ty:ty),* $(,)? }) => {
        impl $crate::mapping::record::Record for $record {
            fn fields() -> &'static [$crate::mapping::record::FieldDescriptor] {
                const FIELDS: &[$crate::mapping::record::FieldDescriptor] = &[
                    $(
                        $crate::mapping::record::FieldDescriptor {
                            name: stringify!($field),
                            value_type:
                                <$ty as $crate::mapping::record::FieldValue>::VALUE_TYPE,
                        },
                    )*
                ];
                FIELDS
            }

            fn get(&self, name: &str) -> ::core::option::Option<$crate::mapping::value::Value> {
                match name {
                    $(
                        stringify!($field) => ::core::option::Option::Some(
                            ::core::convert::Into::<$crate::mapping::value::Value>::into(
                                ::core::clone::Clone::clone(&self.$field),
                            ),
                        ),
                    )*
                    _ => ::core::option::Option::None,
                }
            }

            fn set(
                &mut self,
                name: &str,
                value: $crate::mapping::value::Value,
            ) -> ::core::result::Result<(), $crate::CsvError> {
                match name {
                    $(
                        stringify!($field) => {
                            self.$field =
                                <$ty as $crate::mapping::value::FromValue>::from_value(value)?;
                            ::core::result::Result::Ok(())
                        }
                    )*
                    _ => ::core::result::Result::Err($crate::CsvError::Mapping(format!(
                        "{} has no field {:?}",
                        stringify!($record),
                        name
                    ))),
                }
            }
        }
    };
}
