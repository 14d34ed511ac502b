use std::fmt;

use crate::span::Span;

/// A setup diagnostic (error or warning).
///
/// Structural problems with a computation (unbound placeholders, wrong
/// accessor arity, invalid cache declarations, overlapping intervals, ...)
/// are reported as diagnostics before any loop runs.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    pub notes: Vec<String>,
    pub help: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Diagnostic {
    pub fn error(message: String, span: Span) -> Self {
        Self {
            severity: Severity::Error,
            message,
            span,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn warning(message: String, span: Span) -> Self {
        Self {
            severity: Severity::Warning,
            message,
            span,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.notes.push(note);
        self
    }

    pub fn with_help(mut self, help: String) -> Self {
        self.help = Some(help);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Render the diagnostic to stderr.
    ///
    /// With a plan-file source and a real span the report is drawn by
    /// ariadne; otherwise a plain `error: ...` block is printed.
    pub fn render(&self, filename: &str, source: Option<&str>) {
        match source {
            Some(source) if !self.span.is_dummy() => self.render_report(filename, source),
            _ => eprintln!("{}", self),
        }
    }

    fn render_report(&self, filename: &str, source: &str) {
        use ariadne::{Color, Label, Report, ReportKind, Source};

        let kind = match self.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
        };

        let color = match self.severity {
            Severity::Error => Color::Red,
            Severity::Warning => Color::Yellow,
        };

        let end = (self.span.end as usize).min(source.len());
        let start = (self.span.start as usize).min(end);

        let mut report = Report::build(kind, filename, start)
            .with_message(&self.message)
            .with_label(
                Label::new((filename, start..end))
                    .with_message(&self.message)
                    .with_color(color),
            );

        for note in &self.notes {
            report = report.with_note(note);
        }

        if let Some(help) = &self.help {
            report = report.with_help(help);
        }

        if let Err(e) = report.finish().eprint((filename, Source::from(source))) {
            log::warn!("cannot render diagnostic: {}", e);
            eprintln!("{}", self);
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {}", label, self.message)?;
        for note in &self.notes {
            write!(f, "\n  = note: {}", note)?;
        }
        if let Some(help) = &self.help {
            write!(f, "\n  = help: {}", help)?;
        }
        Ok(())
    }
}

/// Render a list of diagnostics.
pub fn render_diagnostics(diagnostics: &[Diagnostic], filename: &str, source: Option<&str>) {
    for diag in diagnostics {
        diag.render(filename, source);
    }
}

/// True if any diagnostic in the list is an error.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}
