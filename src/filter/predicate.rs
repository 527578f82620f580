use std::{cmp::Ordering, fmt, sync::Arc};

use regex::Regex;

use crate::{
    error::CsvError,
    mapping::{
        converter::{DefaultConverter, ValueConverter},
        value::{Value, ValueType},
    },
};

use super::context::FilterContext;

/// What a predicate leaf looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Zero-based column position in the row.
    Position(usize),
    /// Column located by its name in the header row.
    Column(String),
    /// Field of a mapped record.
    Field(String),
}

impl Target {
    pub fn position(position: usize) -> Self {
        Target::Position(position)
    }

    pub fn column(name: impl Into<String>) -> Self {
        Target::Column(name.into())
    }

    pub fn field(name: impl Into<String>) -> Self {
        Target::Field(name.into())
    }
}

impl From<usize> for Target {
    fn from(position: usize) -> Self {
        Target::Position(position)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Operator {
    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
            Operator::Lt => ordering == Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Ge => ordering != Ordering::Less,
        }
    }
}

/// Accepts or rejects a row or record.
pub trait Filter: Send + Sync {
    fn accept(&self, context: &dyn FilterContext) -> Result<bool, CsvError>;
}

impl<F> Filter for F
where
    F: Fn(&dyn FilterContext) -> Result<bool, CsvError> + Send + Sync,
{
    fn accept(&self, context: &dyn FilterContext) -> Result<bool, CsvError> {
        self(context)
    }
}

/// A user-supplied filter embedded in a predicate tree.
#[derive(Clone)]
pub struct SharedFilter(Arc<dyn Filter>);

impl fmt::Debug for SharedFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedFilter(..)")
    }
}

/// Predicate tree over row or record values.
///
/// Text values are compared with the operand's type: a numeric or date operand
/// makes the row text parse as a number or ISO date first. A null value fails
/// every comparison except [`Operator::Ne`].
///
/// # Examples
///
/// ```
/// use csv_batch_rs::filter::{
///     context::RowContext,
///     predicate::{Filter, Predicate, Target},
/// };
///
/// let header = vec!["name".to_string(), "age".to_string()];
/// let row = vec![Some("Ada".to_string()), Some("36".to_string())];
///
/// let adults = Predicate::and(vec![
///     Predicate::ge(Target::column("age"), 18),
///     Predicate::not_empty(Target::column("name")),
/// ])
/// .unwrap();
///
/// assert!(adults.accept(&RowContext::new(Some(&header), &row)).unwrap());
/// ```
#[derive(Debug, Clone)]
pub enum Predicate {
    Compare {
        target: Target,
        op: Operator,
        operand: Value,
        ignore_case: bool,
    },
    /// Inclusive range.
    Between {
        target: Target,
        low: Value,
        high: Value,
    },
    IsNull(Target),
    NotNull(Target),
    /// Null or empty text.
    IsEmpty(Target),
    NotEmpty(Target),
    In {
        target: Target,
        values: Vec<Value>,
        ignore_case: bool,
    },
    Matches {
        target: Target,
        pattern: Regex,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Custom(SharedFilter),
}

impl Predicate {
    pub fn compare(target: Target, op: Operator, operand: impl Into<Value>) -> Self {
        Predicate::Compare {
            target,
            op,
            operand: operand.into(),
            ignore_case: false,
        }
    }

    pub fn eq(target: Target, operand: impl Into<Value>) -> Self {
        Self::compare(target, Operator::Eq, operand)
    }

    pub fn ne(target: Target, operand: impl Into<Value>) -> Self {
        Self::compare(target, Operator::Ne, operand)
    }

    pub fn lt(target: Target, operand: impl Into<Value>) -> Self {
        Self::compare(target, Operator::Lt, operand)
    }

    pub fn le(target: Target, operand: impl Into<Value>) -> Self {
        Self::compare(target, Operator::Le, operand)
    }

    pub fn gt(target: Target, operand: impl Into<Value>) -> Self {
        Self::compare(target, Operator::Gt, operand)
    }

    pub fn ge(target: Target, operand: impl Into<Value>) -> Self {
        Self::compare(target, Operator::Ge, operand)
    }

    /// Case-insensitive comparison; only affects text values.
    pub fn compare_ignore_case(target: Target, op: Operator, operand: impl Into<String>) -> Self {
        Predicate::Compare {
            target,
            op,
            operand: Value::Text(operand.into()),
            ignore_case: true,
        }
    }

    pub fn eq_ignore_case(target: Target, operand: impl Into<String>) -> Self {
        Self::compare_ignore_case(target, Operator::Eq, operand)
    }

    pub fn between(target: Target, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Predicate::Between {
            target,
            low: low.into(),
            high: high.into(),
        }
    }

    pub fn not_between(target: Target, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self::not(Self::between(target, low, high))
    }

    pub fn is_null(target: Target) -> Self {
        Predicate::IsNull(target)
    }

    pub fn not_null(target: Target) -> Self {
        Predicate::NotNull(target)
    }

    pub fn is_empty(target: Target) -> Self {
        Predicate::IsEmpty(target)
    }

    pub fn not_empty(target: Target) -> Self {
        Predicate::NotEmpty(target)
    }

    pub fn one_of<V: Into<Value>>(target: Target, values: impl IntoIterator<Item = V>) -> Self {
        Predicate::In {
            target,
            values: values.into_iter().map(Into::into).collect(),
            ignore_case: false,
        }
    }

    pub fn one_of_ignore_case<S: Into<String>>(
        target: Target,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        Predicate::In {
            target,
            values: values.into_iter().map(|v| Value::Text(v.into())).collect(),
            ignore_case: true,
        }
    }

    /// Regex match anywhere in the value's text; anchor the pattern to match it whole.
    pub fn matches(target: Target, pattern: &str) -> Result<Self, CsvError> {
        let pattern = Regex::new(pattern)
            .map_err(|error| CsvError::Config(format!("invalid pattern {:?}: {}", pattern, error)))?;
        Ok(Predicate::Matches { target, pattern })
    }

    pub fn and(predicates: Vec<Predicate>) -> Result<Self, CsvError> {
        if predicates.is_empty() {
            return Err(CsvError::Config("AND needs at least one predicate".to_string()));
        }
        Ok(Predicate::And(predicates))
    }

    pub fn or(predicates: Vec<Predicate>) -> Result<Self, CsvError> {
        if predicates.is_empty() {
            return Err(CsvError::Config("OR needs at least one predicate".to_string()));
        }
        Ok(Predicate::Or(predicates))
    }

    pub fn not(predicate: Predicate) -> Self {
        Predicate::Not(Box::new(predicate))
    }

    pub fn custom(filter: impl Filter + 'static) -> Self {
        Predicate::Custom(SharedFilter(Arc::new(filter)))
    }

    pub fn shared(filter: Arc<dyn Filter>) -> Self {
        Predicate::Custom(SharedFilter(filter))
    }

    fn evaluate(&self, context: &dyn FilterContext) -> Result<bool, CsvError> {
        match self {
            Predicate::Compare {
                target,
                op,
                operand,
                ignore_case,
            } => {
                let value = context.resolve(target)?;
                if value.is_null() || operand.is_null() {
                    return Ok(*op == Operator::Ne && value.is_null() != operand.is_null());
                }
                match ordering(value, operand, *ignore_case)? {
                    Some(ordering) => Ok(op.holds(ordering)),
                    None => Ok(*op == Operator::Ne),
                }
            }
            Predicate::Between { target, low, high } => {
                let value = context.resolve(target)?;
                if value.is_null() {
                    return Ok(false);
                }
                let above_low = ordering(value.clone(), low, false)?;
                let below_high = ordering(value, high, false)?;
                Ok(matches!(above_low, Some(o) if o != Ordering::Less)
                    && matches!(below_high, Some(o) if o != Ordering::Greater))
            }
            Predicate::IsNull(target) => Ok(context.resolve(target)?.is_null()),
            Predicate::NotNull(target) => Ok(!context.resolve(target)?.is_null()),
            Predicate::IsEmpty(target) => Ok(is_empty(&context.resolve(target)?)),
            Predicate::NotEmpty(target) => Ok(!is_empty(&context.resolve(target)?)),
            Predicate::In {
                target,
                values,
                ignore_case,
            } => {
                let value = context.resolve(target)?;
                if value.is_null() {
                    return Ok(false);
                }
                for candidate in values.iter().filter(|v| !v.is_null()) {
                    if ordering(value.clone(), candidate, *ignore_case)? == Some(Ordering::Equal) {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Predicate::Matches { target, pattern } => {
                let value = context.resolve(target)?;
                Ok(!value.is_null() && pattern.is_match(&value.to_string()))
            }
            Predicate::And(predicates) => {
                if predicates.is_empty() {
                    return Err(CsvError::Config("AND needs at least one predicate".to_string()));
                }
                for predicate in predicates {
                    if !predicate.evaluate(context)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Predicate::Or(predicates) => {
                if predicates.is_empty() {
                    return Err(CsvError::Config("OR needs at least one predicate".to_string()));
                }
                for predicate in predicates {
                    if predicate.evaluate(context)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Predicate::Not(predicate) => Ok(!predicate.evaluate(context)?),
            Predicate::Custom(SharedFilter(filter)) => filter.accept(context),
        }
    }
}

impl Filter for Predicate {
    fn accept(&self, context: &dyn FilterContext) -> Result<bool, CsvError> {
        self.evaluate(context)
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Text(text) => text.is_empty(),
        _ => false,
    }
}

/// Orders a non-null value against an operand, converting text to the other side's type.
///
/// Returns `None` when the conversion leaves one side null, as empty text does.
fn ordering(
    value: Value,
    operand: &Value,
    ignore_case: bool,
) -> Result<Option<Ordering>, CsvError> {
    let (value, operand) = coerce(value, operand.clone())?;
    if value.is_null() || operand.is_null() {
        return Ok(None);
    }

    if ignore_case {
        if let (Value::Text(a), Value::Text(b)) = (&value, &operand) {
            return Ok(Some(a.to_lowercase().cmp(&b.to_lowercase())));
        }
    }

    value.compare(&operand).map(Some).ok_or_else(|| {
        CsvError::Conversion(format!("cannot compare {:?} with {:?}", value, operand))
    })
}

fn coerce(value: Value, operand: Value) -> Result<(Value, Value), CsvError> {
    let converter = DefaultConverter;
    match (value.value_type(), operand.value_type()) {
        (Some(ValueType::Text), Some(target)) if target != ValueType::Text => {
            let parsed = converter.parse(value.as_text(), target)?;
            Ok((parsed, operand))
        }
        (Some(target), Some(ValueType::Text)) if target != ValueType::Text => {
            let parsed = converter.parse(operand.as_text(), target)?;
            Ok((value, parsed))
        }
        _ => Ok((value, operand)),
    }
}
