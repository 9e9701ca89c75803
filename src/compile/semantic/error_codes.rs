use std::collections::HashMap;

use crate::compile::ast::SourcePos;

/// Numeric identity of a named error: `code = code * 31 + char` over the name with
/// wrapping 32-bit arithmetic. Depends on the name alone. Never 0, which means success.
pub fn derive_code(name: &str) -> u32 {
    let code = name
        .chars()
        .fold(0u32, |code, c| code.wrapping_mul(31).wrapping_add(c as u32));

    if code == 0 { 1 } else { code }
}

#[derive(Debug, Clone)]
pub struct RegisteredError {
    pub name: String,
    pub code: u32,
    pub span: SourcePos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationError {
    Duplicate { previous: SourcePos },
    Collision { other: String, code: u32 },
}

/// Declared error names. Codes still come from [`derive_code`]; the registry only detects
/// two names landing on the same code.
#[derive(Debug, Clone, Default)]
pub struct ErrorRegistry {
    by_name: HashMap<String, RegisteredError>,
    by_code: HashMap<u32, String>,
}

impl ErrorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, span: SourcePos) -> Result<u32, RegistrationError> {
        if let Some(existing) = self.by_name.get(name) {
            return Err(RegistrationError::Duplicate {
                previous: existing.span.clone(),
            });
        }

        let code = derive_code(name);
        if let Some(other) = self.by_code.get(&code) {
            return Err(RegistrationError::Collision {
                other: other.clone(),
                code,
            });
        }

        self.by_code.insert(code, name.to_string());
        self.by_name.insert(
            name.to_string(),
            RegisteredError {
                name: name.to_string(),
                code,
                span,
            },
        );

        Ok(code)
    }

    pub fn lookup(&self, name: &str) -> Option<&RegisteredError> {
        self.by_name.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_the_31_hash() {
        assert_eq!(derive_code("A"), 65);
        assert_eq!(derive_code("AB"), 65 * 31 + 66);
        assert_eq!(derive_code("NotFound"), derive_code("NotFound"));
    }

    #[test]
    fn codes_are_never_zero() {
        assert_eq!(derive_code(""), 1);
        assert_eq!(derive_code("\0"), 1);
        assert_ne!(derive_code("OutOfMemory"), 0);
    }

    #[test]
    fn codes_do_not_depend_on_other_registrations() {
        let mut registry = ErrorRegistry::new();
        let before = derive_code("Timeout");
        registry.register("Other", 0..0).unwrap();
        assert_eq!(registry.register("Timeout", 1..2), Ok(before));
    }

    #[test]
    fn colliding_names_are_rejected() {
        // "Aa" and "BB" hash identically under the 31 multiplier.
        assert_eq!(derive_code("Aa"), derive_code("BB"));

        let mut registry = ErrorRegistry::new();
        registry.register("Aa", 0..2).unwrap();
        assert_eq!(
            registry.register("BB", 3..5),
            Err(RegistrationError::Collision {
                other: "Aa".to_string(),
                code: derive_code("Aa"),
            })
        );
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = ErrorRegistry::new();
        registry.register("E", 0..1).unwrap();
        assert_eq!(
            registry.register("E", 5..6),
            Err(RegistrationError::Duplicate { previous: 0..1 })
        );
    }
}
