//! ELM JSON reading
//!
//! Translators emit libraries either bare or wrapped in a `{"library": ...}`
//! envelope; both forms are accepted.

use std::io::Read;

use crate::library::Library;

/// Errors that can occur while reading ELM
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// JSON reader for ELM libraries
#[derive(Debug, Default, Clone)]
pub struct JsonSerializer;

impl JsonSerializer {
    pub fn new() -> Self {
        Self
    }

    /// Deserialize a library from a string
    pub fn deserialize(&self, input: &str) -> Result<Library, SerializeError> {
        let value: serde_json::Value = serde_json::from_str(input)?;
        self.deserialize_value(value)
    }

    /// Deserialize a library from an already parsed JSON value
    pub fn deserialize_value(&self, value: serde_json::Value) -> Result<Library, SerializeError> {
        #[derive(serde::Deserialize)]
        struct Wrapper {
            library: Library,
        }

        let enveloped = value
            .as_object()
            .is_some_and(|map| map.contains_key("library"));
        let library = if enveloped {
            serde_json::from_value::<Wrapper>(value)?.library
        } else {
            serde_json::from_value(value)?
        };
        Ok(library)
    }

    /// Deserialize a library from a reader
    pub fn deserialize_from_reader<R: Read>(&self, mut reader: R) -> Result<Library, SerializeError> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;
        self.deserialize(&content)
    }
}

/// Parse an ELM JSON document
pub fn from_json(input: &str) -> Result<Library, SerializeError> {
    JsonSerializer::new().deserialize(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::StatementDef;

    const BARE: &str = r#"{
        "identifier": {"id": "Common", "version": "2.1.0"},
        "statements": {"def": [
            {"name": "Flag", "expression": {"type": "Literal", "valueType": "{urn:hl7-org:elm-types:r1}Boolean", "value": "true"}}
        ]}
    }"#;

    #[test]
    fn test_deserialize_bare_library() {
        let library = from_json(BARE).unwrap();
        assert_eq!(library.identifier.id, "Common");
        assert_eq!(library.identifier.version.as_deref(), Some("2.1.0"));
        assert_eq!(library.statements().len(), 1);
    }

    #[test]
    fn test_deserialize_envelope() {
        let wrapped = format!(r#"{{"library": {}}}"#, BARE);
        let library = from_json(&wrapped).unwrap();
        assert_eq!(library.identifier.id, "Common");
    }

    #[test]
    fn test_function_def_statement() {
        let json = r#"{
            "library": {
                "identifier": {"id": "Fns"},
                "statements": {"def": [
                    {
                        "type": "FunctionDef",
                        "name": "Normalize",
                        "operand": [{"name": "value", "operandTypeSpecifier": {"type": "NamedTypeSpecifier", "name": "{urn:hl7-org:elm-types:r1}String"}}],
                        "expression": {"type": "OperandRef", "name": "value"}
                    },
                    {"name": "Plain", "expression": {"type": "Null"}}
                ]}
            }
        }"#;
        let library = from_json(json).unwrap();
        let statements = library.statements();
        match &statements[0] {
            StatementDef::Function(def) => assert_eq!(def.signature(), "Normalize(String)"),
            other => panic!("expected function, got {:?}", other),
        }
        assert!(matches!(&statements[1], StatementDef::Expression(def) if def.name == "Plain"));
        assert!(library.resolve_expression_def("Normalize").is_none());
        assert_eq!(library.resolve_function_defs("Normalize").count(), 1);
    }

    #[test]
    fn test_definition_list_without_def() {
        let json = r#"{
            "identifier": {"id": "Empty"},
            "usings": {},
            "includes": {},
            "statements": {}
        }"#;
        let library = from_json(json).unwrap();
        assert!(library.statements().is_empty());
        assert!(library.includes().is_empty());
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(matches!(from_json("{"), Err(SerializeError::Json(_))));
    }
}
