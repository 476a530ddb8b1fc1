//! Tolerant extraction of structured outcomes from free-form agent text.
//!
//! Ordered chain, first success wins: (1) a fenced JSON block if the
//! response carries one, (2) labeled pattern extraction of the key fields,
//! (3) safe mid-range defaults with the parse failure noted in the
//! rationale. The chain is total; callers always get a usable outcome and
//! can read `origin` to see how much to trust it.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use strum_macros::{AsRefStr, Display};
use workspace_utils::text::{contains_any, truncate};

pub const DEFAULT_COMPLEXITY: u8 = 5;
pub const DEFAULT_SUCCESS_PROBABILITY: u8 = 50;
pub const DEFAULT_CONFIDENCE: u8 = 50;
/// Confidence assigned when nothing could be parsed at all.
pub const LOW_CONFIDENCE_CEILING: u8 = 20;

const SUMMARY_MAX: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum Verdict {
    Go,
    NoGo,
    Caution,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum RiskBand {
    Low,
    Medium,
    High,
    Unknown,
}

/// Which tier of the chain produced the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ParseOrigin {
    Structured,
    Patterns,
    Defaults,
}

#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub verdict: Verdict,
    pub complexity: u8,
    pub success_probability: u8,
    pub risk: RiskBand,
    pub confidence: u8,
    pub rationale: Vec<String>,
    pub estimated_hours: Option<f64>,
    pub origin: ParseOrigin,
}

#[derive(Debug, Clone)]
pub struct ImplementationOutcome {
    pub tests_passing: bool,
    pub requirements_met: bool,
    pub quality_validated: bool,
    pub summary: Option<String>,
    pub origin: ParseOrigin,
}

/// Plan item as extracted from prep output. The id is synthesized
/// (`st-<n>`) when the agent did not supply one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSubtask {
    pub id: String,
    pub description: String,
    pub priority: u8,
    pub depends_on: Vec<String>,
    pub estimated_minutes: u32,
}

lazy_static! {
    static ref FENCED_BLOCK: Regex =
        Regex::new(r"(?s)```(?:json)?\s*(\{.*?\}|\[.*?\])\s*```").unwrap();
    static ref DECISION: Regex = Regex::new(
        r"(?im)^[\s*#>-]*(?:decision|verdict|recommendation)\**\s*[:\-]\s*\**\s*(go|no[\s_-]?go|caution|pending|skip)\b"
    )
    .unwrap();
    static ref COMPLEXITY: Regex =
        Regex::new(r"(?i)complexity\**\s*(?:score|rating)?\s*[:\-=]\s*\**\s*(\d+(?:\.\d+)?)").unwrap();
    static ref PROBABILITY: Regex = Regex::new(
        r"(?i)(?:success\s*(?:probability|chance|likelihood)|probability\s*of\s*success)\**\s*[:\-=]\s*\**\s*(\d+(?:\.\d+)?)"
    )
    .unwrap();
    static ref RISK: Regex = Regex::new(
        r"(?i)risk\**\s*(?:level|assessment)?\s*[:\-=]\s*\**\s*(low|medium|moderate|high|critical|unknown)"
    )
    .unwrap();
    static ref CONFIDENCE: Regex =
        Regex::new(r"(?i)confidence\**\s*(?:score|level)?\s*[:\-=]\s*\**\s*(\d+(?:\.\d+)?)").unwrap();
    static ref TIMELINE: Regex = Regex::new(
        r"(?i)(?:estimated?\s*(?:time|effort|duration|hours)|timeline)\**\s*[:\-=]\s*\**\s*(\d+(?:\.\d+)?)\s*(hours?|hrs?|days?|minutes?|mins?)?"
    )
    .unwrap();
    static ref RATIONALE_LINE: Regex =
        Regex::new(r"(?im)^[\s*#>-]*(?:rationale|reasoning|summary)\**\s*[:\-]\s*(.+)$").unwrap();
    static ref LIST_ITEM: Regex = Regex::new(r"(?m)^\s*(\d+)[.)]\s+(.+)$").unwrap();
    static ref DEPENDS: Regex = Regex::new(
        r"(?i)\(\s*(?:depends\s+on|after|requires)\s*[:#]?\s*([0-9][0-9,\s]*(?:and\s+[0-9]+)?)\s*\)"
    )
    .unwrap();
    static ref DURATION: Regex =
        Regex::new(r"(?i)\(\s*~?\s*(\d+(?:\.\d+)?)\s*(minutes?|mins?|m|hours?|hrs?|h)\s*\)").unwrap();
}

pub fn extract_evaluation(text: &str) -> EvaluationOutcome {
    if let Some(outcome) = evaluation_from_fenced(text) {
        return outcome;
    }
    if let Some(outcome) = evaluation_from_patterns(text) {
        return outcome;
    }
    evaluation_defaults(text)
}

pub fn extract_implementation(text: &str) -> ImplementationOutcome {
    if let Some(outcome) = implementation_from_fenced(text) {
        return outcome;
    }
    implementation_from_phrases(text)
}

pub fn extract_plan(text: &str) -> (Vec<PlannedSubtask>, ParseOrigin) {
    if let Some(plan) = plan_from_fenced(text) {
        return (plan, ParseOrigin::Structured);
    }
    let listed = plan_from_list(text);
    if !listed.is_empty() {
        return (listed, ParseOrigin::Patterns);
    }
    (Vec::new(), ParseOrigin::Defaults)
}

// ---------- evaluation tiers ----------

fn evaluation_from_fenced(text: &str) -> Option<EvaluationOutcome> {
    for capture in FENCED_BLOCK.captures_iter(text) {
        let Ok(value) = serde_json::from_str::<Value>(&capture[1]) else {
            continue;
        };
        let verdict = str_field(&value, &["decision", "verdict", "recommendation"])
            .and_then(|s| parse_verdict(&s));
        let complexity = num_field(&value, &["complexity", "complexity_score"]);
        let probability = num_field(
            &value,
            &["success_probability", "successProbability", "probability"],
        );
        // An unrelated JSON block (e.g. a code sample) must not hijack the
        // evaluation; require at least one anchor field
        if verdict.is_none() && complexity.is_none() && probability.is_none() {
            continue;
        }

        let risk = str_field(&value, &["risk_level", "risk"])
            .and_then(|s| parse_risk(&s))
            .unwrap_or(RiskBand::Unknown);
        let confidence = num_field(&value, &["confidence", "confidence_score"])
            .map(clamp_percent)
            .unwrap_or(DEFAULT_CONFIDENCE);

        return Some(EvaluationOutcome {
            verdict: verdict.unwrap_or(Verdict::Pending),
            complexity: complexity.map(clamp_complexity).unwrap_or(DEFAULT_COMPLEXITY),
            success_probability: probability
                .map(clamp_percent)
                .unwrap_or(DEFAULT_SUCCESS_PROBABILITY),
            risk,
            confidence,
            rationale: rationale_field(&value),
            estimated_hours: num_field(&value, &["estimated_hours", "estimatedHours"]),
            origin: ParseOrigin::Structured,
        });
    }
    None
}

fn evaluation_from_patterns(text: &str) -> Option<EvaluationOutcome> {
    let verdict = DECISION
        .captures(text)
        .and_then(|c| parse_verdict(&c[1]));
    let complexity = COMPLEXITY.captures(text).and_then(|c| c[1].parse::<f64>().ok());
    let probability = PROBABILITY.captures(text).and_then(|c| c[1].parse::<f64>().ok());
    let risk = RISK.captures(text).and_then(|c| parse_risk(&c[1]));
    let confidence = CONFIDENCE.captures(text).and_then(|c| c[1].parse::<f64>().ok());

    if verdict.is_none()
        && complexity.is_none()
        && probability.is_none()
        && risk.is_none()
        && confidence.is_none()
    {
        return None;
    }

    let mut rationale: Vec<String> = RATIONALE_LINE
        .captures_iter(text)
        .map(|c| c[1].trim().to_string())
        .collect();
    let estimated_hours = TIMELINE.captures(text).and_then(|c| {
        let amount = c[1].parse::<f64>().ok()?;
        Some(to_hours(amount, c.get(2).map(|m| m.as_str()).unwrap_or("hours")))
    });
    if let Some(hours) = estimated_hours {
        rationale.push(format!("Estimated effort ~{hours:.1}h"));
    }

    Some(EvaluationOutcome {
        verdict: verdict.unwrap_or(Verdict::Pending),
        complexity: complexity.map(clamp_complexity).unwrap_or(DEFAULT_COMPLEXITY),
        success_probability: probability
            .map(clamp_percent)
            .unwrap_or(DEFAULT_SUCCESS_PROBABILITY),
        risk: risk.unwrap_or(RiskBand::Unknown),
        confidence: confidence.map(clamp_percent).unwrap_or(DEFAULT_CONFIDENCE),
        rationale,
        estimated_hours,
        origin: ParseOrigin::Patterns,
    })
}

fn evaluation_defaults(text: &str) -> EvaluationOutcome {
    EvaluationOutcome {
        verdict: Verdict::Pending,
        complexity: DEFAULT_COMPLEXITY,
        success_probability: DEFAULT_SUCCESS_PROBABILITY,
        risk: RiskBand::Unknown,
        confidence: LOW_CONFIDENCE_CEILING,
        rationale: vec![format!(
            "Could not parse evaluation from agent response ({} chars); applied safe defaults",
            text.chars().count()
        )],
        estimated_hours: None,
        origin: ParseOrigin::Defaults,
    }
}

// ---------- implementation tiers ----------

fn implementation_from_fenced(text: &str) -> Option<ImplementationOutcome> {
    for capture in FENCED_BLOCK.captures_iter(text) {
        let Ok(value) = serde_json::from_str::<Value>(&capture[1]) else {
            continue;
        };
        let tests = bool_field(&value, &["tests_passing", "tests_pass", "all_tests_pass"]);
        let requirements = bool_field(&value, &["requirements_met", "meets_requirements"]);
        let quality = bool_field(&value, &["quality_validated", "quality_ok", "lint_clean"]);
        if tests.is_none() && requirements.is_none() && quality.is_none() {
            continue;
        }
        return Some(ImplementationOutcome {
            tests_passing: tests.unwrap_or(false),
            requirements_met: requirements.unwrap_or(false),
            quality_validated: quality.unwrap_or(false),
            summary: str_field(&value, &["summary", "notes"]).map(|s| truncate(&s, SUMMARY_MAX)),
            origin: ParseOrigin::Structured,
        });
    }
    None
}

fn implementation_from_phrases(text: &str) -> ImplementationOutcome {
    let lower = text.to_lowercase();

    let tests = phrase_flag(
        &lower,
        &[
            "all tests pass",
            "tests pass",
            "tests passing",
            "tests are passing",
            "test suite passes",
            "tests green",
        ],
        &[
            "tests fail",
            "tests are failing",
            "failing test",
            "test failures",
            "could not run tests",
            "tests did not run",
        ],
    );
    let requirements = phrase_flag(
        &lower,
        &[
            "requirements met",
            "requirements are met",
            "meets the requirements",
            "requirements satisfied",
            "acceptance criteria met",
        ],
        &[
            "requirements not met",
            "does not meet the requirements",
            "missing requirement",
            "acceptance criteria not met",
        ],
    );
    let quality = phrase_flag(
        &lower,
        &[
            "quality validated",
            "quality checks pass",
            "lint passes",
            "no lint errors",
            "clippy clean",
        ],
        &["lint errors", "clippy warnings", "quality issues remain"],
    );

    let matched = tests.is_some() || requirements.is_some() || quality.is_some();
    let summary = RATIONALE_LINE
        .captures(text)
        .map(|c| truncate(c[1].trim(), SUMMARY_MAX))
        .or_else(|| {
            text.lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(|l| truncate(l, SUMMARY_MAX))
        });

    ImplementationOutcome {
        tests_passing: tests.unwrap_or(false),
        requirements_met: requirements.unwrap_or(false),
        quality_validated: quality.unwrap_or(false),
        summary,
        origin: if matched {
            ParseOrigin::Patterns
        } else {
            ParseOrigin::Defaults
        },
    }
}

/// Negative phrases win over positive ones; no match at all is `None`.
fn phrase_flag(lower: &str, positive: &[&str], negative: &[&str]) -> Option<bool> {
    if contains_any(lower, negative) {
        Some(false)
    } else if contains_any(lower, positive) {
        Some(true)
    } else {
        None
    }
}

// ---------- plan tiers ----------

fn plan_from_fenced(text: &str) -> Option<Vec<PlannedSubtask>> {
    for capture in FENCED_BLOCK.captures_iter(text) {
        let Ok(value) = serde_json::from_str::<Value>(&capture[1]) else {
            continue;
        };
        let items = match &value {
            Value::Array(items) => items.clone(),
            Value::Object(_) => match value
                .get("subtasks")
                .or_else(|| value.get("plan"))
                .and_then(Value::as_array)
            {
                Some(items) => items.clone(),
                None => continue,
            },
            _ => continue,
        };
        if items.is_empty() {
            continue;
        }

        let mut plan = Vec::with_capacity(items.len());
        for (position, item) in items.iter().enumerate() {
            let ordinal = position + 1;
            let description = match item {
                Value::String(s) => s.clone(),
                Value::Object(_) => {
                    match str_field(item, &["description", "task", "title", "name"]) {
                        Some(d) => d,
                        None => continue,
                    }
                }
                _ => continue,
            };
            let id = str_field(item, &["id"]).unwrap_or_else(|| format!("st-{ordinal}"));
            let depends_on = item
                .get("depends_on")
                .or_else(|| item.get("dependencies"))
                .and_then(Value::as_array)
                .map(|deps| deps.iter().filter_map(dep_id).collect())
                .unwrap_or_default();
            plan.push(PlannedSubtask {
                id,
                description,
                priority: num_field(item, &["priority"])
                    .map(|p| (p.round() as i64).clamp(1, 255) as u8)
                    .unwrap_or_else(|| ordinal.min(255) as u8),
                depends_on,
                estimated_minutes: num_field(item, &["estimated_minutes", "estimate_minutes"])
                    .map(|m| m.round().max(0.0) as u32)
                    .unwrap_or(0),
            });
        }
        if !plan.is_empty() {
            return Some(plan);
        }
    }
    None
}

fn plan_from_list(text: &str) -> Vec<PlannedSubtask> {
    let mut plan = Vec::new();
    for capture in LIST_ITEM.captures_iter(text) {
        let Ok(ordinal) = capture[1].parse::<u32>() else {
            continue;
        };
        let line = capture[2].trim();

        let depends_on: Vec<String> = DEPENDS
            .captures(line)
            .map(|c| {
                c[1].split(|ch: char| !ch.is_ascii_digit())
                    .filter(|s| !s.is_empty())
                    .map(|n| format!("st-{n}"))
                    .collect()
            })
            .unwrap_or_default();
        let estimated_minutes = DURATION
            .captures(line)
            .and_then(|c| {
                let amount = c[1].parse::<f64>().ok()?;
                let unit = c[2].to_lowercase();
                Some(if unit.starts_with('h') {
                    (amount * 60.0).round() as u32
                } else {
                    amount.round() as u32
                })
            })
            .unwrap_or(0);

        // Strip the annotations we consumed so the description reads clean
        let mut description = DEPENDS.replace_all(line, "").to_string();
        description = DURATION.replace_all(&description, "").trim().to_string();
        if description.is_empty() {
            continue;
        }

        plan.push(PlannedSubtask {
            id: format!("st-{ordinal}"),
            description,
            priority: ordinal.min(255) as u8,
            depends_on,
            estimated_minutes,
        });
    }
    plan
}

// ---------- shared helpers ----------

fn parse_verdict(raw: &str) -> Option<Verdict> {
    let normalized: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    match normalized.as_str() {
        "go" | "yes" | "proceed" | "accept" => Some(Verdict::Go),
        "nogo" | "no" | "skip" | "reject" | "decline" => Some(Verdict::NoGo),
        "caution" | "maybe" | "conditional" => Some(Verdict::Caution),
        "pending" | "undecided" => Some(Verdict::Pending),
        _ => None,
    }
}

fn parse_risk(raw: &str) -> Option<RiskBand> {
    match raw.trim().to_lowercase().as_str() {
        "low" => Some(RiskBand::Low),
        "medium" | "moderate" => Some(RiskBand::Medium),
        "high" | "critical" => Some(RiskBand::High),
        "unknown" => Some(RiskBand::Unknown),
        _ => None,
    }
}

fn str_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| value.get(k))
        .find_map(|v| v.as_str().map(|s| s.trim().to_string()))
}

fn num_field(value: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().filter_map(|k| value.get(k)).find_map(|v| {
        v.as_f64()
            .or_else(|| v.as_str().and_then(|s| s.trim().trim_end_matches('%').parse().ok()))
    })
}

fn bool_field(value: &Value, keys: &[&str]) -> Option<bool> {
    keys.iter().filter_map(|k| value.get(k)).find_map(|v| {
        v.as_bool().or_else(|| {
            v.as_str()
                .map(|s| matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "passed"))
        })
    })
}

fn rationale_field(value: &Value) -> Vec<String> {
    let field = value.get("rationale").or_else(|| value.get("reasoning"));
    match field {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
            .collect(),
        Some(Value::String(s)) => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

fn dep_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(format!("st-{n}")),
        _ => None,
    }
}

fn clamp_complexity(raw: f64) -> u8 {
    (raw.round() as i64).clamp(1, 10) as u8
}

fn clamp_percent(raw: f64) -> u8 {
    (raw.round() as i64).clamp(0, 100) as u8
}

fn to_hours(amount: f64, unit: &str) -> f64 {
    let unit = unit.to_lowercase();
    if unit.starts_with("day") || unit == "d" {
        amount * 24.0
    } else if unit.starts_with("min") || unit == "m" {
        amount / 60.0
    } else {
        amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_block_wins_over_labeled_text() {
        let text = r#"
Decision: NO-GO (ignore this, final answer below)

```json
{"decision": "go", "complexity": 3, "success_probability": 85,
 "risk_level": "low", "confidence": 90, "rationale": ["small diff", "good tests"]}
```
"#;
        let outcome = extract_evaluation(text);
        assert_eq!(outcome.origin, ParseOrigin::Structured);
        assert_eq!(outcome.verdict, Verdict::Go);
        assert_eq!(outcome.complexity, 3);
        assert_eq!(outcome.success_probability, 85);
        assert_eq!(outcome.risk, RiskBand::Low);
        assert_eq!(outcome.confidence, 90);
        assert_eq!(outcome.rationale.len(), 2);
    }

    #[test]
    fn test_structured_tolerates_string_numbers_and_aliases() {
        let text = r#"```
{"verdict": "no_go", "complexity": "8", "probability": "40%", "risk": "HIGH"}
```"#;
        let outcome = extract_evaluation(text);
        assert_eq!(outcome.origin, ParseOrigin::Structured);
        assert_eq!(outcome.verdict, Verdict::NoGo);
        assert_eq!(outcome.complexity, 8);
        assert_eq!(outcome.success_probability, 40);
        assert_eq!(outcome.risk, RiskBand::High);
        assert_eq!(outcome.confidence, DEFAULT_CONFIDENCE);
    }

    #[test]
    fn test_unrelated_code_block_does_not_hijack() {
        let text = r#"
Here is the config I found:

```json
{"name": "widget", "version": "1.0.0"}
```

Decision: caution
Complexity: 6
"#;
        let outcome = extract_evaluation(text);
        assert_eq!(outcome.origin, ParseOrigin::Patterns);
        assert_eq!(outcome.verdict, Verdict::Caution);
        assert_eq!(outcome.complexity, 6);
    }

    #[test]
    fn test_labeled_patterns_extract_all_fields() {
        let text = "\
## Assessment

- **Decision**: GO
- Complexity: 7/10
- Success probability: 85%
- Risk level: low
- Confidence: 90
- Rationale: well-scoped parser fix
- Estimated time: 2 days
";
        let outcome = extract_evaluation(text);
        assert_eq!(outcome.origin, ParseOrigin::Patterns);
        assert_eq!(outcome.verdict, Verdict::Go);
        assert_eq!(outcome.complexity, 7);
        assert_eq!(outcome.success_probability, 85);
        assert_eq!(outcome.risk, RiskBand::Low);
        assert_eq!(outcome.confidence, 90);
        assert_eq!(outcome.estimated_hours, Some(48.0));
        assert!(outcome.rationale.iter().any(|r| r.contains("well-scoped")));
    }

    #[test]
    fn test_no_go_spellings() {
        for raw in ["no-go", "NO GO", "no_go", "Skip"] {
            let outcome = extract_evaluation(&format!("Decision: {raw}\n"));
            assert_eq!(outcome.verdict, Verdict::NoGo, "failed for {raw:?}");
        }
    }

    #[test]
    fn test_prose_falls_back_to_safe_defaults() {
        let outcome = extract_evaluation("I had a look around the repository and it seems hard.");
        assert_eq!(outcome.origin, ParseOrigin::Defaults);
        assert_eq!(outcome.verdict, Verdict::Pending);
        assert_eq!(outcome.complexity, DEFAULT_COMPLEXITY);
        assert_eq!(outcome.success_probability, DEFAULT_SUCCESS_PROBABILITY);
        assert_eq!(outcome.risk, RiskBand::Unknown);
        assert_eq!(outcome.confidence, LOW_CONFIDENCE_CEILING);
        assert!(outcome.rationale[0].contains("applied safe defaults"));
    }

    #[test]
    fn test_implementation_from_json_block() {
        let text = r#"Done. ```json
{"tests_passing": true, "requirements_met": true, "quality_validated": false,
 "summary": "tests green, lint still noisy"}
```"#;
        let outcome = extract_implementation(text);
        assert_eq!(outcome.origin, ParseOrigin::Structured);
        assert!(outcome.tests_passing);
        assert!(outcome.requirements_met);
        assert!(!outcome.quality_validated);
        assert_eq!(outcome.summary.as_deref(), Some("tests green, lint still noisy"));
    }

    #[test]
    fn test_implementation_phrases_with_negation_winning() {
        let text = "All tests pass and the requirements are met, \
                    but there are lint errors I could not fix.";
        let outcome = extract_implementation(text);
        assert_eq!(outcome.origin, ParseOrigin::Patterns);
        assert!(outcome.tests_passing);
        assert!(outcome.requirements_met);
        assert!(!outcome.quality_validated);
    }

    #[test]
    fn test_implementation_defaults_are_all_false() {
        let outcome = extract_implementation("I rewrote a few things, see the diff.");
        assert_eq!(outcome.origin, ParseOrigin::Defaults);
        assert!(!outcome.tests_passing);
        assert!(!outcome.requirements_met);
        assert!(!outcome.quality_validated);
    }

    #[test]
    fn test_plan_from_json_object() {
        let text = r#"```json
{"subtasks": [
  {"id": "schema", "description": "Extend the schema", "priority": 1,
   "estimated_minutes": 30},
  {"description": "Wire the endpoint", "dependencies": ["schema"]}
]}
```"#;
        let (plan, origin) = extract_plan(text);
        assert_eq!(origin, ParseOrigin::Structured);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].id, "schema");
        assert_eq!(plan[0].estimated_minutes, 30);
        assert_eq!(plan[1].id, "st-2");
        assert_eq!(plan[1].depends_on, vec!["schema".to_string()]);
    }

    #[test]
    fn test_plan_from_numbered_list() {
        let text = "\
Plan:
1. Add a failing regression test (~30 min)
2. Fix the parser (depends on 1) (2 hours)
3. Update the changelog (after 2)
";
        let (plan, origin) = extract_plan(text);
        assert_eq!(origin, ParseOrigin::Patterns);
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].id, "st-1");
        assert_eq!(plan[0].estimated_minutes, 30);
        assert!(plan[0].depends_on.is_empty());
        assert_eq!(plan[1].depends_on, vec!["st-1".to_string()]);
        assert_eq!(plan[1].estimated_minutes, 120);
        assert_eq!(plan[1].description, "Fix the parser");
        assert_eq!(plan[2].depends_on, vec!["st-2".to_string()]);
    }

    #[test]
    fn test_plan_without_structure_is_empty() {
        let (plan, origin) = extract_plan("I would start with the parser and go from there.");
        assert!(plan.is_empty());
        assert_eq!(origin, ParseOrigin::Defaults);
    }
}
