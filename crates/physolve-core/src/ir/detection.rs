//! Module detection
//!
//! Scores every template against the problem and keeps those that clear
//! their own relevance threshold. The score is a weighted sum of four
//! signals, each in `[0, 1]`:
//!
//! | Signal         | Weight | Measures                                      |
//! |----------------|--------|-----------------------------------------------|
//! | parameters     | 0.30   | template symbols the problem declares         |
//! | system type    | 0.25   | exact or partial match of the declared type   |
//! | semantics      | 0.25   | keyword stems in the problem text             |
//! | formula tokens | 0.20   | equation identifiers the problem mentions     |

use crate::ir::library::{ModuleKind, ModuleTemplate, TEMPLATES};
use crate::ir::model::ProblemModel;
use crate::ir::types::ParameterRole;
use crate::expr::ParsedEquation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const PARAMETER_WEIGHT: f64 = 0.30;
pub const SYSTEM_TYPE_WEIGHT: f64 = 0.25;
pub const SEMANTIC_WEIGHT: f64 = 0.25;
pub const FORMULA_WEIGHT: f64 = 0.20;

/// Partial credit for a system type that contains (or is contained in) a template type
const PARTIAL_TYPE_MATCH: f64 = 0.5;

/// Keyword hits needed for full semantic credit
const SEMANTIC_SATURATION: usize = 3;

/// Words that negate the next few tokens ("without damping")
const NEGATORS: &[&str] = &["no", "without", "neglect", "neglecting", "ignore", "ignoring", "zero"];
const NEGATION_SPAN: usize = 2;

/// Token prefix to canonical stem
const SYNONYMS: &[(&str, &str)] = &[
    ("frictionless", "smooth"),
    ("hooke", "spring"),
    ("speed", "velocity"),
    ("thrown", "launch"),
    ("throw", "launch"),
    ("kicked", "launch"),
    ("fired", "launch"),
    ("cannon", "projectile"),
    ("satellite", "orbit"),
    ("ramp", "incline"),
    ("resistor", "resist"),
    ("amper", "current"),
    ("volt", "voltage"),
    ("sonar", "sound"),
    ("crash", "collision"),
    ("thermometer", "temperature"),
    ("hot", "heat"),
    ("cold", "cool"),
    ("moles", "mole"),
];

/// Everything detection needs to know about a problem
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProblemContext {
    /// Normalized system type
    pub system_type: String,
    /// Declared parameter symbols
    pub symbols: BTreeSet<String>,
    /// Lowercase text tokens after synonym mapping, negated tokens removed
    pub stems: BTreeSet<String>,
    /// Case-preserving identifiers found in the text
    pub identifiers: BTreeSet<String>,
}

impl ProblemContext {
    pub fn from_model(model: &ProblemModel) -> Self {
        let mut text = String::new();
        if let Some(meta) = &model.metadata {
            for part in [&meta.title, &meta.description] {
                text.push_str(part);
                text.push(' ');
            }
            if let Some(domain) = &meta.domain {
                text.push_str(domain);
                text.push(' ');
            }
            text.push_str(&meta.tags.join(" "));
            text.push(' ');
        }

        let mut symbols = BTreeSet::new();
        let mut system_type = String::new();
        if let Some(system) = &model.system {
            system_type = normalize_type(&system.system_type);
            text.push_str(&system.system_type.replace('_', " "));
            text.push(' ');
            for p in &system.parameters {
                symbols.insert(p.symbol.clone());
                text.push_str(&p.description);
                text.push(' ');
            }
            for o in &system.objects {
                text.push_str(&format!("{} {} ", o.name, o.kind));
            }
        }

        Self {
            system_type,
            symbols,
            stems: stems(&text),
            identifiers: identifiers(&text),
        }
    }

    fn has_stem(&self, stem: &str) -> bool {
        self.stems.iter().any(|t| t.starts_with(stem))
    }
}

fn normalize_type(raw: &str) -> String {
    raw.trim().to_lowercase().replace([' ', '-'], "_")
}

fn stems(text: &str) -> BTreeSet<String> {
    let lower = text.to_lowercase();
    let mut out = BTreeSet::new();
    let mut negated = 0usize;

    for token in lower.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
        if NEGATORS.contains(&token) {
            negated = NEGATION_SPAN;
            continue;
        }
        if negated > 0 {
            negated -= 1;
            continue;
        }
        let canonical = SYNONYMS
            .iter()
            .find(|(prefix, _)| token.starts_with(prefix))
            .map(|(_, stem)| stem.to_string())
            .unwrap_or_else(|| token.to_string());
        out.insert(canonical);
    }

    out
}

fn identifiers(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty() && !t.starts_with(|c: char| c.is_ascii_digit()))
        .map(str::to_string)
        .collect()
}

/// Score breakdown for one template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceScore {
    pub kind: ModuleKind,
    pub total: f64,
    pub parameters: f64,
    pub system_type: f64,
    pub semantic: f64,
    pub formula: f64,
}

impl RelevanceScore {
    pub fn is_selected(&self, template: &ModuleTemplate) -> bool {
        self.total >= template.threshold
    }
}

/// Score a single template
pub fn score(template: &ModuleTemplate, ctx: &ProblemContext) -> RelevanceScore {
    let owned: Vec<&str> = template
        .parameters
        .iter()
        .filter(|p| p.role != ParameterRole::Derived)
        .map(|p| p.symbol)
        .collect();
    let parameters = if owned.is_empty() {
        0.0
    } else {
        owned.iter().filter(|s| ctx.symbols.contains(**s)).count() as f64 / owned.len() as f64
    };

    let system_type = if ctx.system_type.is_empty() {
        0.0
    } else if template.system_types.contains(&ctx.system_type.as_str()) {
        1.0
    } else if template
        .system_types
        .iter()
        .any(|t| t.contains(ctx.system_type.as_str()) || ctx.system_type.contains(t))
    {
        PARTIAL_TYPE_MATCH
    } else {
        0.0
    };

    let hits = template.keywords.iter().filter(|k| ctx.has_stem(k)).count();
    let semantic = if template.keywords.is_empty() {
        0.0
    } else {
        (hits as f64 / SEMANTIC_SATURATION.min(template.keywords.len()) as f64).min(1.0)
    };

    let formula_vars: BTreeSet<String> = template
        .equations
        .iter()
        .filter_map(|e| ParsedEquation::parse(e).ok())
        .flat_map(|eq| {
            let mut vars = eq.rhs.variables();
            if let Some(lhs) = &eq.lhs {
                vars.extend(lhs.variables());
            }
            if let crate::expr::EquationTarget::Derivative { variable, .. } = eq.target {
                vars.insert(variable);
            }
            vars
        })
        .collect();
    let formula = if formula_vars.is_empty() {
        0.0
    } else {
        formula_vars
            .iter()
            .filter(|v| ctx.symbols.contains(*v) || ctx.identifiers.contains(*v))
            .count() as f64
            / formula_vars.len() as f64
    };

    let required_ok = template.required_keywords.is_empty()
        || template.required_keywords.iter().any(|k| ctx.has_stem(k));

    let total = if required_ok {
        PARAMETER_WEIGHT * parameters
            + SYSTEM_TYPE_WEIGHT * system_type
            + SEMANTIC_WEIGHT * semantic
            + FORMULA_WEIGHT * formula
    } else {
        0.0
    };

    RelevanceScore {
        kind: template.kind,
        total,
        parameters,
        system_type,
        semantic,
        formula,
    }
}

/// Outcome of scoring every template
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Selected templates, best first
    pub selected: Vec<RelevanceScore>,
    /// Every template's score, in library order
    pub all: Vec<RelevanceScore>,
}

/// Score the whole library and select up to `max_modules` templates
pub fn detect(ctx: &ProblemContext, max_modules: usize) -> Detection {
    let all: Vec<RelevanceScore> = TEMPLATES.iter().map(|t| score(t, ctx)).collect();

    let mut selected: Vec<RelevanceScore> = TEMPLATES
        .iter()
        .zip(all.iter())
        .filter(|(t, s)| s.is_selected(t))
        .map(|(_, s)| s.clone())
        .collect();
    selected.sort_by(|a, b| {
        b.total
            .partial_cmp(&a.total)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.kind.cmp(&b.kind))
    });
    selected.truncate(max_modules);

    Detection { selected, all }
}
