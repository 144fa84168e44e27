use serde_json::Value;

/// Result of a best-effort parse of accumulated argument text.
#[derive(Clone, Debug, PartialEq)]
pub enum ParseOutcome {
    /// The buffer parsed as a complete JSON value.
    Value(Value),
    /// The buffer is empty or not yet valid JSON. This is "no decision yet",
    /// never a hard failure.
    Incomplete,
}

impl ParseOutcome {
    /// Returns the parsed value, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Incomplete => None,
        }
    }

    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Incomplete)
    }
}

/// Buffers raw fragments of a tool call's argument text.
///
/// The accumulator knows nothing about tools: it concatenates fragments in
/// arrival order and reduces the buffer to a value on demand.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct PartialJson {
    buf: String,
}

impl PartialJson {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fragment to the buffer.
    pub fn feed(&mut self, fragment: &str) {
        self.buf.push_str(fragment);
    }

    /// Returns the raw accumulated text.
    pub fn as_str(&self) -> &str {
        &self.buf
    }

    /// Length of the accumulated text in bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Attempts a full parse of the buffer.
    ///
    /// Empty, whitespace-only, and syntactically unfinished buffers all yield
    /// `ParseOutcome::Incomplete`.
    pub fn try_parse(&self) -> ParseOutcome {
        if self.buf.trim().is_empty() {
            return ParseOutcome::Incomplete;
        }
        match serde_json::from_str::<Value>(&self.buf) {
            Ok(value) => ParseOutcome::Value(value),
            Err(_) => ParseOutcome::Incomplete,
        }
    }

    /// Best-effort preview of an unfinished buffer.
    ///
    /// Closes an open string and any open objects/arrays; when that still
    /// does not parse, the tail is cut back to the previous separator or
    /// container opening and retried. Used only for display, never for state
    /// decisions.
    pub fn repair(&self) -> Option<Value> {
        if let ParseOutcome::Value(value) = self.try_parse() {
            return Some(value);
        }
        let mut candidate = self.buf.trim_end();
        while !candidate.trim().is_empty() {
            let scan = scan(candidate);
            let mut closed = String::with_capacity(candidate.len() + scan.stack.len() + 1);
            closed.push_str(candidate);
            if scan.in_string {
                if scan.escaped {
                    closed.pop();
                }
                closed.push('"');
            }
            for open in scan.stack.iter().rev() {
                closed.push(if *open == '{' { '}' } else { ']' });
            }
            if let Ok(value) = serde_json::from_str::<Value>(&closed) {
                return Some(value);
            }
            match scan.last_cut {
                Some(cut) if cut < candidate.len() => candidate = candidate[..cut].trim_end(),
                _ => return None,
            }
        }
        None
    }
}

struct Scan {
    in_string: bool,
    escaped: bool,
    stack: Vec<char>,
    last_cut: Option<usize>,
}

fn scan(text: &str) -> Scan {
    let mut in_string = false;
    let mut escaped = false;
    let mut stack = Vec::new();
    let mut last_cut = None;
    for (idx, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => {
                stack.push(ch);
                last_cut = Some(idx + 1);
            }
            '}' | ']' => {
                stack.pop();
            }
            ',' => last_cut = Some(idx),
            _ => {}
        }
    }
    Scan {
        in_string,
        escaped,
        stack,
        last_cut,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fed(fragments: &[&str]) -> PartialJson {
        let mut acc = PartialJson::new();
        for fragment in fragments {
            acc.feed(fragment);
        }
        acc
    }

    #[test]
    fn empty_and_whitespace_buffers_are_incomplete() {
        assert!(PartialJson::new().try_parse().is_incomplete());
        assert!(fed(&["  ", "\n\t"]).try_parse().is_incomplete());
    }

    #[test]
    fn fragments_concatenate_in_arrival_order() {
        let acc = fed(&["{\"locat", "ion\":\"Paris\"}"]);
        assert_eq!(acc.as_str(), "{\"location\":\"Paris\"}");
        assert_eq!(acc.try_parse(), ParseOutcome::Value(json!({"location": "Paris"})));
    }

    #[test]
    fn unterminated_object_is_incomplete_not_error() {
        let acc = fed(&["{\"a\": [1, 2"]);
        assert!(acc.try_parse().is_incomplete());
    }

    #[test]
    fn repair_closes_open_string_and_containers() {
        let acc = fed(&["{\"location\":\"Par"]);
        assert_eq!(acc.repair(), Some(json!({"location": "Par"})));

        let acc = fed(&["{\"items\":[1,2"]);
        assert_eq!(acc.repair(), Some(json!({"items": [1, 2]})));
    }

    #[test]
    fn repair_drops_dangling_key() {
        let acc = fed(&["{\"a\":1,\"b\":"]);
        assert_eq!(acc.repair(), Some(json!({"a": 1})));

        let acc = fed(&["{\"locat"]);
        assert_eq!(acc.repair(), Some(json!({})));
    }

    #[test]
    fn repair_handles_trailing_escape_inside_string() {
        let acc = fed(&["{\"path\":\"C:\\"]);
        assert_eq!(acc.repair(), Some(json!({"path": "C:"})));
    }

    #[test]
    fn repair_of_garbage_is_none() {
        assert_eq!(fed(&["not json"]).repair(), None);
        assert_eq!(PartialJson::new().repair(), None);
    }
}
