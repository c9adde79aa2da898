#![forbid(unsafe_code)]

use aura_sentinel_domain::{EngineKind, SelfEvaluation, StageOutput, StageTrace, Verdict};
use tracing::warn;

/// Case-insensitive marker whose presence in a Policy summary is a veto.
pub const VETO_MARKER: &str = "reject";

/// Feedback used when the self-evaluation trace carries no summary.
pub const EVALUATION_PLACEHOLDER: &str = "Evaluation complete.";

/// Why a cycle stopped before its last stage.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum HaltReason {
    PolicyVeto,
    StageFault(EngineKind),
}

#[must_use]
pub fn summary_vetoes(summary: &str) -> bool {
    summary.to_lowercase().contains(VETO_MARKER)
}

/// True when `trace` is a Policy report whose summary vetoes the plan.
/// Faulted Policy traces carry no summary and never veto.
#[must_use]
pub fn policy_vetoed(trace: &StageTrace) -> bool {
    trace.stage == EngineKind::Policy
        && trace.output.summary().is_some_and(summary_vetoes)
}

/// Decide whether the cycle must stop after `trace`.
#[must_use]
pub fn halt_after(trace: &StageTrace, halt_on_fault: bool) -> Option<HaltReason> {
    if policy_vetoed(trace) {
        warn!(stage = %trace.stage, "policy veto; halting cycle");
        return Some(HaltReason::PolicyVeto);
    }
    if halt_on_fault && trace.is_fault() {
        warn!(stage = %trace.stage, "stage fault; halting cycle");
        return Some(HaltReason::StageFault(trace.stage));
    }
    None
}

#[must_use]
pub fn verdict_for(halt: Option<HaltReason>) -> Verdict {
    match halt {
        None => Verdict::Approved,
        Some(HaltReason::PolicyVeto) => Verdict::Rejected,
        Some(HaltReason::StageFault(_)) => Verdict::Halted,
    }
}

/// Self-evaluation derived from the SelfEvaluation trace, if one ran.
#[must_use]
pub fn extract_self_evaluation(traces: &[StageTrace]) -> Option<SelfEvaluation> {
    let trace = traces
        .iter()
        .find(|trace| trace.stage == EngineKind::SelfEvaluation)?;
    let feedback = match &trace.output {
        StageOutput::Report(report) if !report.summary.trim().is_empty() => {
            report.summary.clone()
        }
        _ => EVALUATION_PLACEHOLDER.to_string(),
    };
    Some(SelfEvaluation {
        score: trace.confidence,
        feedback,
    })
}

#[cfg(test)]
mod tests {
    use super::{
        extract_self_evaluation, halt_after, policy_vetoed, summary_vetoes, verdict_for,
        HaltReason, EVALUATION_PLACEHOLDER,
    };
    use aura_sentinel_domain::{
        now_utc, EngineKind, StageFault, StageOutput, StageReport, StageTrace, StepId, Verdict,
        ERROR_FINGERPRINT,
    };
    use proptest::prelude::*;

    fn report(stage: EngineKind, summary: &str, confidence: f64) -> StageTrace {
        StageTrace {
            step_id: StepId::new(),
            stage,
            recorded_at: now_utc(),
            input_hash: "abc".to_string(),
            output: StageOutput::Report(StageReport {
                summary: summary.to_string(),
                data: None,
                flags: Vec::new(),
            }),
            confidence,
            latency_ms: 3,
        }
    }

    fn fault(stage: EngineKind) -> StageTrace {
        StageTrace {
            step_id: StepId::new(),
            stage,
            recorded_at: now_utc(),
            input_hash: ERROR_FINGERPRINT.to_string(),
            output: StageOutput::Fault(StageFault {
                error: "Engine Fault".to_string(),
                details: "HTTP 503".to_string(),
            }),
            confidence: 0.0,
            latency_ms: 9,
        }
    }

    #[test]
    fn only_policy_reports_can_veto() {
        assert!(policy_vetoed(&report(
            EngineKind::Policy,
            "Plan REJECTED: issuer is sanctioned",
            0.9
        )));
        assert!(!policy_vetoed(&report(
            EngineKind::Planning,
            "reject the bond",
            0.9
        )));
        assert!(!policy_vetoed(&report(EngineKind::Policy, "All clear", 0.9)));
        assert!(!policy_vetoed(&fault(EngineKind::Policy)));
    }

    #[test]
    fn halt_reasons_map_to_verdicts() {
        let veto = report(EngineKind::Policy, "Rejection issued", 0.8);
        assert_eq!(halt_after(&veto, false), Some(HaltReason::PolicyVeto));
        assert_eq!(verdict_for(halt_after(&veto, false)), Verdict::Rejected);

        let faulted = fault(EngineKind::WorldModel);
        assert_eq!(halt_after(&faulted, false), None);
        assert_eq!(
            halt_after(&faulted, true),
            Some(HaltReason::StageFault(EngineKind::WorldModel))
        );
        assert_eq!(verdict_for(halt_after(&faulted, true)), Verdict::Halted);
        assert_eq!(verdict_for(None), Verdict::Approved);
    }

    #[test]
    fn self_evaluation_uses_confidence_and_placeholder() {
        let traces = vec![
            report(EngineKind::Execution, "instructions", 0.7),
            report(EngineKind::SelfEvaluation, "Aligned with objective", 0.95),
        ];
        let evaluation = extract_self_evaluation(&traces);
        assert!(evaluation.is_some());
        let evaluation = evaluation.unwrap_or_else(|| unreachable!());
        assert!((evaluation.score - 0.95).abs() < f64::EPSILON);
        assert_eq!(evaluation.feedback, "Aligned with objective");

        let blank = extract_self_evaluation(&[report(EngineKind::SelfEvaluation, "  ", 0.4)])
            .unwrap_or_else(|| unreachable!());
        assert_eq!(blank.feedback, EVALUATION_PLACEHOLDER);

        let faulted = extract_self_evaluation(&[fault(EngineKind::SelfEvaluation)])
            .unwrap_or_else(|| unreachable!());
        assert_eq!(faulted.feedback, EVALUATION_PLACEHOLDER);
        assert!(faulted.score.abs() < f64::EPSILON);

        assert!(extract_self_evaluation(&traces[..1]).is_none());
    }

    proptest! {
        #[test]
        fn any_casing_of_marker_vetoes(
            prefix in "[a-z ]{0,12}",
            suffix in "[a-z ]{0,12}",
            mask in proptest::collection::vec(any::<bool>(), 6),
        ) {
            let marker: String = "reject"
                .chars()
                .zip(mask)
                .map(|(ch, upper)| if upper { ch.to_ascii_uppercase() } else { ch })
                .collect();
            let summary = format!("{prefix}{marker}{suffix}");
            prop_assert!(summary_vetoes(&summary));
        }

        #[test]
        fn summaries_without_marker_letters_never_veto(summary in "[a-ik-zA-IK-Z0-9 .,]{0,40}") {
            prop_assert!(!summary_vetoes(&summary));
        }
    }
}
