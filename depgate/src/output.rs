use std::io::Write;

use crate::checks::Score;
use crate::gate::GateOutcome;

pub trait OutputFormatter {
    fn write_outcome(&self, outcome: &GateOutcome, writer: &mut dyn Write) -> std::io::Result<()>;
}

/// One violation per line, then a short per-dependency summary.
pub struct TextOutput;

impl OutputFormatter for TextOutput {
    fn write_outcome(&self, outcome: &GateOutcome, writer: &mut dyn Write) -> std::io::Result<()> {
        for violation in &outcome.violations {
            writeln!(writer, "{violation}")?;
        }

        if !outcome.aggregates.is_empty() {
            writeln!(writer)?;
        }
        for aggregate in &outcome.aggregates {
            writeln!(
                writer,
                "{} ({}): score {}",
                aggregate.dependency, aggregate.repository, aggregate.score
            )?;
            for check in &aggregate.checks {
                let score = match check.score {
                    Score::Value(v) => v.to_string(),
                    Score::Inconclusive => "?".to_string(),
                };
                writeln!(
                    writer,
                    "  {}: {score} (confidence {}) {}",
                    check.check, check.confidence, check.reason
                )?;
            }
        }

        if !outcome.diagnostics.is_empty() {
            writeln!(writer)?;
            writeln!(writer, "diagnostics:")?;
            for diagnostic in &outcome.diagnostics {
                writeln!(writer, "  {diagnostic}")?;
            }
        }

        let verdict = if outcome.passed() { "PASS" } else { "FAIL" };
        writeln!(
            writer,
            "\n{verdict}: {} evaluated, {} violation(s)",
            outcome.aggregates.len(),
            outcome.violations.len()
        )?;
        Ok(())
    }
}

pub struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn write_outcome(&self, outcome: &GateOutcome, writer: &mut dyn Write) -> std::io::Result<()> {
        serde_json::to_writer_pretty(&mut *writer, outcome)?;
        writeln!(writer)?;
        Ok(())
    }
}

pub fn formatter(json: bool) -> Box<dyn OutputFormatter> {
    if json {
        Box::new(JsonOutput)
    } else {
        Box::new(TextOutput)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::CheckResult;
    use crate::context::{Diagnostic, DiagnosticKind};
    use crate::dependency::{Dependency, Ecosystem};
    use crate::evaluator::AggregateResult;
    use crate::policy::Violation;
    use crate::repo_ref::RepositoryHandle;

    fn sample() -> GateOutcome {
        GateOutcome {
            aggregates: vec![AggregateResult::new(
                Dependency::new("left-pad", Ecosystem::Npm),
                RepositoryHandle::new("github.com", "stevemao", "left-pad"),
                vec![
                    CheckResult::min_score("Packaging", "publishing workflow present but unused"),
                    CheckResult::inconclusive("Security-Policy", "not determined"),
                ],
            )],
            violations: vec![Violation::BelowMinimumScore {
                dependency: "left-pad".into(),
                score: 0,
                min_score: 5,
            }],
            diagnostics: vec![Diagnostic::new(
                DiagnosticKind::Resolution,
                "ghost",
                "package not found",
            )],
        }
    }

    fn render(formatter: &dyn OutputFormatter, outcome: &GateOutcome) -> String {
        let mut buf = Vec::new();
        formatter.write_outcome(outcome, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn text_output_leads_with_violations() {
        let output = render(&TextOutput, &sample());
        let first = output.lines().next().unwrap();
        assert_eq!(first, "Score of 0 for left-pad is below the minimum score of 5.");
        assert!(output.contains("left-pad (github.com/stevemao/left-pad): score 0"));
        assert!(output.contains("  Security-Policy: ? (confidence 0)"));
        assert!(output.contains("diagnostics:"));
        assert!(output.trim_end().ends_with("FAIL: 1 evaluated, 1 violation(s)"));
    }

    #[test]
    fn text_output_empty_outcome_passes() {
        let output = render(&TextOutput, &GateOutcome::default());
        assert_eq!(output.trim(), "PASS: 0 evaluated, 0 violation(s)");
    }

    #[test]
    fn json_output_is_structured() {
        let output = render(&JsonOutput, &sample());
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["violations"][0]["kind"], "below_minimum_score");
        assert_eq!(value["violations"][0]["dependency"], "left-pad");
        assert_eq!(value["aggregates"][0]["repository"]["owner"], "stevemao");
        assert_eq!(value["diagnostics"][0]["kind"], "resolution");
    }

    #[test]
    fn formatter_picks_by_flag() {
        let json = render(formatter(true).as_ref(), &GateOutcome::default());
        assert!(json.starts_with('{'));
        let text = render(formatter(false).as_ref(), &GateOutcome::default());
        assert!(text.contains("PASS"));
    }
}
