// WearLog — Record Formatter
//
// A record is a one-character source tag plus a text payload, serialised as
// `<TAG>:<payload>`.  The log writer appends a newline to each one.

use std::fmt;

// ---------------------------------------------------------------------------
// Source tags
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Eda,
    Motion,
    Ppg,
    Timestamp,
}

impl Tag {
    pub fn as_char(self) -> char {
        match self {
            Self::Eda => 'E',
            Self::Motion => 'A',
            Self::Ppg => 'P',
            Self::Timestamp => 'T',
        }
    }

    /// Position of the source in the scheduler's fixed polling order.
    pub fn poll_rank(self) -> u8 {
        match self {
            Self::Eda => 0,
            Self::Motion => 1,
            Self::Ppg => 2,
            Self::Timestamp => 3,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    tag: Tag,
    payload: String,
}

impl Record {
    /// Payloads may carry `:`-separated sub-fields but never a line break or
    /// NUL, which would corrupt the newline-delimited file format.
    pub fn new(tag: Tag, payload: impl Into<String>) -> anyhow::Result<Self> {
        let payload = payload.into();
        if let Some(bad) = payload.chars().find(|c| matches!(c, '\n' | '\r' | '\0')) {
            anyhow::bail!("{} payload contains forbidden character {:?}", tag, bad);
        }
        Ok(Self { tag, payload })
    }

    pub fn timestamp(ts: &Timestamp) -> Self {
        Self {
            tag: Tag::Timestamp,
            payload: ts.to_string(),
        }
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Length of `<TAG>:<payload>` without the trailing newline.
    pub fn serialized_len(&self) -> usize {
        2 + self.payload.len()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tag, self.payload)
    }
}

// ---------------------------------------------------------------------------
// Wall-clock timestamp (rendered without padding)
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub subsecond: u16,
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}:{}:{}",
            self.year, self.month, self.day, self.hour, self.minute, self.second, self.subsecond
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_tag_and_payload() {
        let rec = Record::new(Tag::Motion, "1:2:3").unwrap();
        assert_eq!(rec.to_string(), "A:1:2:3");
        assert_eq!(rec.serialized_len(), 7);
    }

    #[test]
    fn tags_map_to_file_characters() {
        let chars: Vec<char> = [Tag::Eda, Tag::Motion, Tag::Ppg, Tag::Timestamp]
            .iter()
            .map(|t| t.as_char())
            .collect();
        assert_eq!(chars, vec!['E', 'A', 'P', 'T']);
    }

    #[test]
    fn rejects_line_breaks_and_nul() {
        assert!(Record::new(Tag::Eda, "10\n11").is_err());
        assert!(Record::new(Tag::Eda, "10\0").is_err());
        assert!(Record::new(Tag::Eda, "").is_ok());
    }

    #[test]
    fn timestamp_is_colon_separated_unpadded() {
        let ts = Timestamp {
            year: 2016,
            month: 3,
            day: 7,
            hour: 9,
            minute: 5,
            second: 0,
            subsecond: 42,
        };
        assert_eq!(Record::timestamp(&ts).to_string(), "T:2016:3:7:9:5:0:42");
    }
}
