use std::marker::PhantomData;

use log::debug;

use crate::{
    error::CsvError,
    filter::context::{FilterContext, RecordContext},
    item::csv::Row,
};

use super::{
    RowMapper, RowRenderer,
    column::ColumnMapping,
    converter::{DefaultConverter, ValueConverter},
    format::FormatSpec,
    record::Record,
    value::{Value, ValueType},
};

/// Readable bindings of one field, with their formats merged.
#[derive(Debug)]
struct FieldGroup {
    field: String,
    value_type: ValueType,
    bindings: Vec<usize>,
    format: Option<FormatSpec>,
}

/// Maps rows to records of type `T` and back through a [`ColumnMapping`].
///
/// Several columns may feed one field on read: their texts are joined with a
/// space and parsed with the merged format, so a date column and a time column
/// can fill a single date-time field. On write each column renders the field
/// with its own format.
///
/// # Examples
///
/// ```
/// use csv_batch_rs::impl_record;
/// use csv_batch_rs::mapping::{RowMapper, record_mapping::RecordMapping};
///
/// #[derive(Debug, Default, PartialEq)]
/// struct Point {
///     x: i64,
///     y: i64,
/// }
///
/// impl_record!(Point { x: i64, y: i64 });
///
/// let mapping = RecordMapping::<Point>::derived().unwrap();
/// let point = mapping
///     .map_row(None, vec![Some("3".to_string()), Some("-4".to_string())])
///     .unwrap();
///
/// assert_eq!(point, Point { x: 3, y: -4 });
/// ```
#[derive(Debug)]
pub struct RecordMapping<T> {
    mapping: ColumnMapping,
    groups: Vec<FieldGroup>,
    record: PhantomData<fn() -> T>,
}

impl<T: Record> RecordMapping<T> {
    /// Validates `mapping` against `T` and prepares the read groups.
    pub fn new(mapping: ColumnMapping) -> Result<Self, CsvError> {
        mapping.validate::<T>()?;

        let mut groups: Vec<FieldGroup> = Vec::new();
        for (index, binding) in mapping.bindings().iter().enumerate() {
            if !binding.access.reads() {
                continue;
            }
            let group = match groups.iter().position(|g| g.field == binding.field) {
                Some(i) => &mut groups[i],
                None => {
                    let value_type = T::field(&binding.field)
                        .map(|field| field.value_type)
                        .ok_or_else(|| {
                            CsvError::Mapping(format!("record has no field {:?}", binding.field))
                        })?;
                    groups.push(FieldGroup {
                        field: binding.field.clone(),
                        value_type,
                        bindings: Vec::new(),
                        format: None,
                    });
                    let last = groups.len() - 1;
                    &mut groups[last]
                }
            };

            group.bindings.push(index);
            if let Some(format) = &binding.format {
                group.format = Some(match group.format.take() {
                    Some(merged) => merged.merge(format)?,
                    None => format.clone(),
                });
            }
        }

        debug!(
            "Record mapping ready: {} bindings, {} readable fields",
            mapping.bindings().len(),
            groups.len()
        );

        Ok(Self {
            mapping,
            groups,
            record: PhantomData,
        })
    }

    /// Mapping derived from the fields of `T` in declaration order.
    pub fn derived() -> Result<Self, CsvError> {
        Self::new(ColumnMapping::derive::<T>())
    }

    pub fn column_mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    fn group_text(
        &self,
        group: &FieldGroup,
        header: Option<&[String]>,
        row: &Row,
    ) -> Result<Option<String>, CsvError> {
        let bindings = self.mapping.bindings();
        let mut parts = Vec::with_capacity(group.bindings.len());
        for index in &group.bindings {
            let position = bindings[*index].resolve(header)?;
            if let Some(Some(text)) = row.get(position) {
                parts.push(text.as_str());
            }
        }

        match (group.bindings.len(), parts.as_slice()) {
            (_, []) => Ok(None),
            (1, [text]) => Ok(Some((*text).to_string())),
            _ => Ok(Some(parts.join(" "))),
        }
    }
}

fn in_field(field: &str, error: CsvError) -> CsvError {
    match error {
        CsvError::Conversion(message) => {
            CsvError::Conversion(format!("field {:?}: {}", field, message))
        }
        other => other,
    }
}

impl<T: Record> RowMapper for RecordMapping<T> {
    type Item = T;

    fn check_header(&self, header: Option<&[String]>) -> Result<(), CsvError> {
        if header.is_none() && self.mapping.requires_header() {
            return Err(CsvError::MissingHeader);
        }
        for binding in self.mapping.bindings() {
            if binding.access.reads() {
                binding.resolve(header)?;
            }
        }
        Ok(())
    }

    fn map_row(&self, header: Option<&[String]>, row: Row) -> Result<T, CsvError> {
        let mut record = T::default();
        for group in &self.groups {
            let text = self.group_text(group, header, &row)?;
            let value = match &group.format {
                Some(format) => format.parse(text.as_deref(), group.value_type),
                None => DefaultConverter.parse(text.as_deref(), group.value_type),
            }
            .map_err(|error| in_field(&group.field, error))?;

            record
                .set(&group.field, value)
                .map_err(|error| in_field(&group.field, error))?;
        }
        Ok(record)
    }

    fn item_context<'a>(
        &self,
        _header: Option<&'a [String]>,
        item: &'a T,
    ) -> Option<Box<dyn FilterContext + 'a>> {
        Some(Box::new(RecordContext::new(item)))
    }
}

impl<T: Record> RowRenderer for RecordMapping<T> {
    type Item = T;

    fn header(&self, _first: Option<&T>) -> Option<Vec<String>> {
        Some(self.mapping.header())
    }

    fn render(&self, item: &T) -> Result<Row, CsvError> {
        self.mapping
            .output_columns()
            .into_iter()
            .map(|column| {
                let Some(binding) = column else {
                    return Ok(None);
                };
                let value = item.get(&binding.field).unwrap_or(Value::Null);
                match &binding.format {
                    Some(format) => format.render(&value),
                    None => DefaultConverter.render(&value),
                }
                .map_err(|error| in_field(&binding.field, error))
            })
            .collect()
    }

    fn item_context<'a>(
        &self,
        _header: Option<&'a [String]>,
        item: &'a T,
    ) -> Option<Box<dyn FilterContext + 'a>> {
        Some(Box::new(RecordContext::new(item)))
    }
}
