use std::fmt;

/// Literal prefix marking a data line in the event stream framing.
pub const DATA_PREFIX: &str = "data:";

/// Payload of one data frame with the prefix and surrounding whitespace removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record(String);

impl Record {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Record {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Returns the record carried by `line`, or `None` for separators and non-data fields.
pub fn extract_record(line: &str) -> Option<Record> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match line.strip_prefix(DATA_PREFIX) {
        Some(payload) => Some(Record(payload.trim().to_string())),
        None => {
            // `event:`, `id:`, `retry:` and `:` comments are not used by this client.
            tracing::trace!(line_len = line.len(), "ignoring non-data frame line");
            None
        }
    }
}
