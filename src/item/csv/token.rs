/// One parsed field with its position in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvToken {
    /// Field content; `None` when the field spelled the null sentinel.
    pub value: Option<String>,
    /// Physical line (1-based) where the field starts.
    pub start_line: usize,
    /// Physical line where the field ends; differs from `start_line` for
    /// quoted fields spanning line breaks.
    pub end_line: usize,
    /// Whether the field was enclosed in quote characters.
    pub enclosed: bool,
}

impl CsvToken {
    pub fn new(value: Option<String>, start_line: usize, end_line: usize, enclosed: bool) -> Self {
        Self {
            value,
            start_line,
            end_line,
            enclosed,
        }
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    pub fn into_value(self) -> Option<String> {
        self.value
    }
}
