use std::num::IntErrorKind;

/// Integer literal as written, kept textual until a consumer needs its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntLiteral {
    value: String,
    base: u32,
}

impl IntLiteral {
    pub fn new(value: impl Into<String>, base: u32) -> IntLiteral {
        IntLiteral {
            value: value.into().replace('_', ""),
            base,
        }
    }

    /// `None` when the literal does not fit into 64 bits.
    pub fn parse(&self) -> Option<i64> {
        match u64::from_str_radix(&self.value, self.base) {
            Ok(value) => i64::try_from(value).ok(),
            Err(err) => match err.kind() {
                IntErrorKind::PosOverflow => None,
                _ => unreachable!("Lexer returned invalid number: {}", self.value),
            },
        }
    }

    /// Decimal text, the form C accepts for every base.
    pub fn to_c(&self) -> String {
        match self.parse() {
            Some(value) => value.to_string(),
            None => match u64::from_str_radix(&self.value, self.base) {
                Ok(value) => format!("{value}ULL"),
                Err(_) => self.value.clone(),
            },
        }
    }
}
