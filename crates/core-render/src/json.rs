//! Hand-rolled JSON document assembly.
//!
//! A `serde_json::Value` tree can't represent this module's numeric
//! fields: captured bytes are passed through verbatim as JSON number
//! text even when they aren't valid JSON number syntax ("the producer
//! is responsible for validity"). `serde_json::Value::Number` rejects
//! exactly that case, so numbers are written as raw bytes and only
//! field names/string values go through `serde_json`'s escaper.

use crate::BoundedBuf;

pub struct JsonObjectWriter {
    fields_written: usize,
}

impl JsonObjectWriter {
    pub fn begin(buf: &mut BoundedBuf) -> Self {
        buf.push(b'{');
        Self { fields_written: 0 }
    }

    fn field_sep(&mut self, buf: &mut BoundedBuf) {
        if self.fields_written > 0 {
            buf.push(b',');
        }
        self.fields_written += 1;
    }

    pub fn string_field(&mut self, buf: &mut BoundedBuf, name: &str, value: &[u8]) {
        self.field_sep(buf);
        write_json_string(buf, name.as_bytes());
        buf.push(b':');
        write_json_string(buf, value);
    }

    /// Writes `value` verbatim as JSON number text, or `null` when
    /// `value` case-insensitively reads `nan`.
    pub fn number_field(&mut self, buf: &mut BoundedBuf, name: &str, value: &[u8]) {
        self.field_sep(buf);
        write_json_string(buf, name.as_bytes());
        buf.push(b':');
        if value.eq_ignore_ascii_case(b"nan") {
            buf.extend(b"null");
        } else {
            buf.extend(value);
        }
    }

    pub fn finish(self, buf: &mut BoundedBuf) {
        buf.push(b'}');
    }
}

fn write_json_string(buf: &mut BoundedBuf, bytes: &[u8]) {
    let text = String::from_utf8_lossy(bytes);
    let escaped = serde_json::to_string(text.as_ref()).unwrap_or_else(|_| "\"\"".to_string());
    buf.extend(escaped.as_bytes());
}
