use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::COMMENT_SEPARATOR;

/// Free-text note attached to a stored result, plus the name of the sweep
/// parameter the run belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub text: String,
    pub custom_parameter: String,
}

impl Comment {
    pub fn new(text: impl Into<String>, custom_parameter: impl Into<String>) -> Self {
        Comment {
            text: text.into(),
            custom_parameter: custom_parameter.into(),
        }
    }

    /// Persisted form: `<text>;:;<custom_parameter>`.
    pub fn to_wire(&self) -> String {
        format!("{}{COMMENT_SEPARATOR}{}", self.text, self.custom_parameter)
    }

    /// Splits on the first separator. A string without one is all text.
    pub fn from_wire(wire: &str) -> Self {
        match wire.split_once(COMMENT_SEPARATOR) {
            Some((text, custom)) => Comment::new(text, custom),
            None => Comment::new(wire, ""),
        }
    }
}

impl fmt::Display for Comment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.custom_parameter.is_empty() {
            f.write_str(&self.text)
        } else {
            write!(f, "{} [{}]", self.text, self.custom_parameter)
        }
    }
}
