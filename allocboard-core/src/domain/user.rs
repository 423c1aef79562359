use serde::{Deserialize, Serialize};

use super::decode::{string_field, RecordError};
use crate::data::{Collection, Document};

/// Participant profile. Only used to decorate output with display names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: String,
    pub username: Option<String>,
    pub email: Option<String>,
}

impl User {
    pub fn from_document(doc: &Document) -> Result<Self, RecordError> {
        let uid = string_field(doc, "uid").unwrap_or_else(|| doc.id.clone());
        if uid.is_empty() {
            return Err(RecordError::missing(Collection::Users, doc, "uid"));
        }
        Ok(Self {
            uid,
            username: string_field(doc, "username"),
            email: string_field(doc, "email"),
        })
    }

    /// Username, or the raw uid when none is set.
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.uid)
    }
}

/// Static reference data for a tradable instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub code: String,
    pub name: Option<String>,
    pub category: Option<String>,
}

impl Instrument {
    pub fn from_document(doc: &Document) -> Result<Self, RecordError> {
        let code = string_field(doc, "code").unwrap_or_else(|| doc.id.clone());
        if code.is_empty() {
            return Err(RecordError::missing(Collection::Instruments, doc, "code"));
        }
        Ok(Self {
            code,
            name: string_field(doc, "name"),
            category: string_field(doc, "category"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn display_name_falls_back_to_uid() {
        let u = User::from_document(&Document::from_value("u1", json!({"email": "a@b.c"}))).unwrap();
        assert_eq!(u.display_name(), "u1");
        let u = User::from_document(&Document::from_value("u2", json!({"username": "alice"}))).unwrap();
        assert_eq!(u.display_name(), "alice");
    }

    #[test]
    fn instrument_code_from_key() {
        let i = Instrument::from_document(&Document::from_value(
            "AAPL",
            json!({"name": "Apple Inc.", "category": "equity"}),
        ))
        .unwrap();
        assert_eq!(i.code, "AAPL");
        assert_eq!(i.category.as_deref(), Some("equity"));
    }
}
