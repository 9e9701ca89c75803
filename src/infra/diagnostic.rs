use ariadne::{Color, Label, Report, ReportKind, Source};
use chumsky::error::Rich;

use crate::compile::{ast::SourcePos, parser::lex::Token, source::SourceFile};

/// A single checker finding. The `message` is the plain text form; labels and help are
/// only used when rendering to a terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub message: String,
    pub span: SourcePos,
    pub labels: Vec<(SourcePos, String)>,
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, span: SourcePos) -> Self {
        Self {
            message: message.into(),
            span,
            labels: Vec::new(),
            help: None,
        }
    }

    pub fn with_label(mut self, span: SourcePos, message: impl Into<String>) -> Self {
        self.labels.push((span, message.into()));
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Ordered list of diagnostics collected over a whole run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn messages(&self) -> Vec<&str> {
        self.items.iter().map(|d| d.message.as_str()).collect()
    }

    pub fn into_result(self) -> Result<(), Diagnostics> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (idx, diagnostic) in self.items.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{diagnostic}")?;
        }

        Ok(())
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl From<Rich<'static, char>> for Diagnostic {
    fn from(err: Rich<'static, char>) -> Self {
        let span: SourcePos = (*err.span()).into();
        let expected = expected_list(err.expected());
        rich_to_diagnostic(err.found(), expected, span, "character")
    }
}

impl From<Rich<'static, Token<'static>, SourcePos>> for Diagnostic {
    fn from(err: Rich<'static, Token<'static>, SourcePos>) -> Self {
        let span = err.span().clone();
        let expected = expected_list(err.expected());
        rich_to_diagnostic(err.found(), expected, span, "token")
    }
}

fn expected_list<P: std::fmt::Debug>(patterns: impl Iterator<Item = P>) -> String {
    let patterns: Vec<String> = patterns.map(|p| format!("{p:?}")).collect();
    if patterns.is_empty() {
        return "something else".to_string();
    }

    patterns.join(", ")
}

fn rich_to_diagnostic<T: std::fmt::Display>(
    found: Option<&T>,
    expected: String,
    span: SourcePos,
    what: &str,
) -> Diagnostic {
    let message = match found {
        Some(found) => format!("unexpected {what} `{found}`"),
        None => "unexpected end of input".to_string(),
    };

    Diagnostic::error(message, span.clone()).with_label(span, format!("expected {expected}"))
}

/// Prints every diagnostic to stderr as an ariadne report.
pub fn emit(source: &SourceFile, diagnostics: &Diagnostics) {
    let name = source.name();

    for diagnostic in diagnostics.iter() {
        let mut report = Report::build(ReportKind::Error, (name, diagnostic.span.clone()))
            .with_message(&diagnostic.message)
            .with_label(
                Label::new((name, diagnostic.span.clone()))
                    .with_color(Color::Red)
                    .with_message(&diagnostic.message),
            );

        for (span, message) in diagnostic.labels.iter() {
            report = report.with_label(
                Label::new((name, span.clone()))
                    .with_color(Color::Blue)
                    .with_message(message),
            );
        }

        if let Some(help) = &diagnostic.help {
            report = report.with_help(help);
        }

        // stderr going away is not worth failing the compilation over
        let _ = report.finish().eprint((name, Source::from(source.text())));
    }
}
