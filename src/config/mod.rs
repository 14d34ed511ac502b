//! Plan files: a TOML description of a whole computation.
//!
//! ```toml
//! precision = "f64"
//!
//! [grid]
//! ni = 1
//! nj = 1
//! nk = 6
//!
//! [backend]
//! kind = "host-block"
//! block = [8, 8]
//!
//! [[storage]]
//! name = "rhs"
//! value = 3.0
//! levels = [{ k = 0, value = 4.0 }, { k = 5, value = 2.0 }]
//!
//! [[functor]]
//! name = "forward"
//! params = ["inout out", "in rhs"]
//! [[functor.overload]]
//! interval = [[0, -1], [1, -1]]
//! body = "out = rhs"
//!
//! [[multistage]]
//! execution = "forward"
//! stages = [{ functor = "forward", args = ["out", "rhs"] }]
//!
//! [verify]
//! field = "out"
//! expected = 1.0
//! ```
//!
//! Every name, interval, body and cache carries its span in the file so
//! setup diagnostics point at the offending line.

mod build;

use std::ops::Range;
use std::path::Path;

use serde::Deserialize;
use toml::Spanned;

use crate::diagnostic::Diagnostic;
use crate::span::Span;
use crate::verify::Verifier;

/// Value type of a plan's storages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precision {
    Single,
    Double,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Plan {
    pub precision: Option<Spanned<String>>,
    pub grid: GridSection,
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub storage: Vec<StorageSection>,
    #[serde(default)]
    pub functor: Vec<FunctorSection>,
    #[serde(default)]
    pub multistage: Vec<MultistageSection>,
    pub verify: Option<VerifySection>,
    #[serde(skip)]
    source: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridSection {
    pub ni: usize,
    pub nj: usize,
    pub nk: usize,
    #[serde(default)]
    pub halo: usize,
    /// Vertical splitters; defaults to `[0, nk - 1]`.
    pub splitters: Option<Spanned<Vec<usize>>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendSection {
    pub kind: Option<Spanned<String>>,
    pub block: Option<[usize; 2]>,
    pub threads: Option<usize>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LevelValue {
    pub k: usize,
    pub value: f64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSection {
    pub name: Spanned<String>,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub levels: Vec<LevelValue>,
    #[serde(default)]
    pub temporary: bool,
    pub snapshots: Option<usize>,
    /// Stride order, e.g. `[0, 1, 2]` for k-contiguous.
    pub layout: Option<Spanned<[usize; 3]>>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverloadSection {
    /// `[[splitter, offset], [splitter, offset]]`
    pub interval: Spanned<[[i64; 2]; 2]>,
    pub body: Spanned<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctorSection {
    pub name: Spanned<String>,
    pub params: Vec<Spanned<String>>,
    #[serde(default)]
    pub overload: Vec<OverloadSection>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageSection {
    pub functor: Spanned<String>,
    pub args: Vec<Spanned<String>>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSection {
    pub scope: Spanned<String>,
    pub policy: Spanned<String>,
    pub args: Vec<Spanned<String>>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MultistageSection {
    pub execution: Spanned<String>,
    pub stages: Vec<StageSection>,
    #[serde(default)]
    pub caches: Vec<CacheSection>,
    #[serde(default)]
    pub bypass: Vec<Spanned<String>>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifySection {
    pub field: Spanned<String>,
    pub expected: f64,
    pub tolerance: Option<f64>,
    #[serde(default)]
    pub halos: [[usize; 2]; 3],
}

pub(crate) fn span_of<T>(value: &Spanned<T>) -> Span {
    Span::from_range(value.span())
}

impl Plan {
    /// Parse a plan from TOML text.
    pub fn parse(source: &str) -> Result<Plan, Diagnostic> {
        let mut plan: Plan = toml::from_str(source).map_err(|e| {
            let span = e.span().map(Span::from_range).unwrap_or_else(Span::dummy);
            Diagnostic::error(format!("invalid plan: {}", e.message()), span)
        })?;
        plan.source = source.to_string();
        Ok(plan)
    }

    /// Read and parse a plan file.
    pub fn load(path: &Path) -> Result<Plan, Diagnostic> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            Diagnostic::error(
                format!("cannot read '{}': {}", path.display(), e),
                Span::dummy(),
            )
        })?;
        Self::parse(&source)
    }

    /// The TOML text this plan was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn precision(&self) -> Result<Precision, Diagnostic> {
        let Some(p) = &self.precision else {
            return Ok(Precision::Double);
        };
        match p.get_ref().as_str() {
            "f64" | "double" => Ok(Precision::Double),
            "f32" | "float" => Ok(Precision::Single),
            other => Err(Diagnostic::error(
                format!("unknown precision '{}'", other),
                span_of(p),
            )
            .with_help("use \"f64\" or \"f32\"".to_string())),
        }
    }

    /// The verifier described by `[verify]`, with the field name and the
    /// expected value.
    pub fn verifier(&self, default_tolerance: f64) -> Option<(&str, f64, Verifier)> {
        self.verify.as_ref().map(|v| {
            let verifier = Verifier::new(v.tolerance.unwrap_or(default_tolerance)).with_halos(v.halos);
            (v.field.get_ref().as_str(), v.expected, verifier)
        })
    }

    /// Byte offset of the text of a string value inside the file, skipping
    /// the opening quotes and the newline that follows `"""`.
    pub(crate) fn text_base(&self, range: Range<usize>) -> u32 {
        let raw = self.source.get(range.clone()).unwrap_or("");
        let mut base = range.start;
        for delimiter in ["\"\"\"", "'''"] {
            if let Some(rest) = raw.strip_prefix(delimiter) {
                base += 3;
                if rest.starts_with("\r\n") {
                    base += 2;
                } else if rest.starts_with('\n') {
                    base += 1;
                }
                return base as u32;
            }
        }
        if raw.starts_with('"') || raw.starts_with('\'') {
            base += 1;
        }
        base as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[grid]
ni = 2
nj = 2
nk = 3

[[storage]]
name = "out"
"#;

    #[test]
    fn test_parse_minimal() {
        let plan = Plan::parse(MINIMAL).unwrap();
        assert_eq!(plan.grid.nk, 3);
        assert_eq!(plan.storage.len(), 1);
        assert_eq!(plan.precision().unwrap(), Precision::Double);
        assert!(plan.verify.is_none());
        assert_eq!(plan.source(), MINIMAL);
    }

    #[test]
    fn test_toml_error_has_span() {
        let err = Plan::parse("[grid]\nni = \"two\"\nnj = 1\nnk = 1\n").unwrap_err();
        assert!(err.message.starts_with("invalid plan"));
        assert!(!err.span.is_dummy());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = Plan::parse("[grid]\nni = 1\nnj = 1\nnk = 1\nnl = 2\n").unwrap_err();
        assert!(err.message.contains("nl"));
    }

    #[test]
    fn test_unknown_precision() {
        let plan = Plan::parse("precision = \"f16\"\n[grid]\nni = 1\nnj = 1\nnk = 1\n").unwrap();
        let err = plan.precision().unwrap_err();
        assert!(err.message.contains("f16"));
        assert_eq!(&plan.source()[err.span.range()], "\"f16\"");
    }

    #[test]
    fn test_text_base() {
        let src = "body = \"\"\"\nout = rhs\n\"\"\"\n";
        let mut plan = Plan::parse(MINIMAL).unwrap();
        plan.source = src.to_string();
        assert_eq!(plan.text_base(7..24), 11);
        assert_eq!(&src[11..20], "out = rhs");
    }

    #[test]
    fn test_verifier_section() {
        let src = format!(
            "{}\n[verify]\nfield = \"out\"\nexpected = 1.0\nhalos = [[1, 1], [0, 0], [0, 0]]\n",
            MINIMAL
        );
        let plan = Plan::parse(&src).unwrap();
        let (field, expected, verifier) = plan.verifier(1e-12).unwrap();
        assert_eq!(field, "out");
        assert_eq!(expected, 1.0);
        assert_eq!(verifier.precision(), 1e-12);
        assert_eq!(verifier.halos()[0], [1, 1]);
    }
}
