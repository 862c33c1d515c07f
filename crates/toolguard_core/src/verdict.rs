//! Verdicts: the per-call outcome of validation.
//!
//! A verdict can only be built through [`Verdict::approved`],
//! [`Verdict::rejected`] or [`Verdict::needs_correction`], which keeps the
//! wire invariants true by construction:
//!
//! - `reason` is present iff the call was rejected;
//! - `suggested_correction` is present iff a correction is offered;
//! - an approved verdict carries no flags, detail, reason or correction.

use crate::call::ToolCall;
use crate::id::ToolCallId;
use serde::{Deserialize, Serialize};

/// Terminal status of a validated call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    /// Safe to execute as proposed
    Approved,
    /// Must not be executed
    Rejected,
    /// Must not be executed as proposed; a fixed call is attached
    NeedsCorrection,
}

impl VerdictStatus {
    /// Wire name of the status
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::NeedsCorrection => "needs_correction",
        }
    }
}

impl std::fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a call was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// No schema registered for the tool name
    UnknownTool,
    /// Missing, mistyped or out-of-enum parameters
    InvalidParameters,
    /// A business rule rejected the call
    PolicyViolation,
    /// A parameter value could not be traced to the context
    HallucinatedValue,
}

impl RejectReason {
    /// Wire name of the reason
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownTool => "unknown_tool",
            Self::InvalidParameters => "invalid_parameters",
            Self::PolicyViolation => "policy_violation",
            Self::HallucinatedValue => "hallucinated_value",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extra signal attached to a non-approved verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictFlag {
    /// Several candidates were equally close, so no correction was offered
    AmbiguousMatch,
    /// Some but not all tokens of a value were found in context
    PartialGrounding,
    /// A rejecting rule could not be evaluated for this call
    RuleEvaluationError,
}

/// Validation outcome for one tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Id of the call this verdict is for
    pub tool_call_id: ToolCallId,
    /// Terminal status
    pub status: VerdictStatus,
    /// Rejection reason, present iff rejected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    /// Human-readable explanation for non-approved verdicts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Proposed fix, present iff status is `needs_correction`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_correction: Option<ToolCall>,
    /// Extra signals, never set on approved verdicts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<VerdictFlag>,
    /// Whether the downstream executor may run the call
    pub execution_allowed: bool,
    /// [`ToolCall::fingerprint`] of the approved call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_fingerprint: Option<String>,
}

impl Verdict {
    /// Approve exactly this call
    #[must_use]
    pub fn approved(call: &ToolCall) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            status: VerdictStatus::Approved,
            reason: None,
            detail: None,
            suggested_correction: None,
            flags: Vec::new(),
            execution_allowed: true,
            call_fingerprint: Some(call.fingerprint()),
        }
    }

    /// Check that this is an approval issued for `call` as it stands now
    #[must_use]
    pub fn approves(&self, call: &ToolCall) -> bool {
        self.is_approved()
            && self.execution_allowed
            && self.tool_call_id == call.id
            && self.call_fingerprint.as_deref() == Some(call.fingerprint().as_str())
    }

    /// Reject a call outright
    #[must_use]
    pub fn rejected(id: ToolCallId, reason: RejectReason, detail: impl Into<String>) -> Self {
        Self {
            tool_call_id: id,
            status: VerdictStatus::Rejected,
            reason: Some(reason),
            detail: Some(detail.into()),
            suggested_correction: None,
            flags: Vec::new(),
            execution_allowed: false,
            call_fingerprint: None,
        }
    }

    /// Offer a corrected call instead of the proposed one
    #[must_use]
    pub fn needs_correction(correction: ToolCall, detail: impl Into<String>) -> Self {
        Self {
            tool_call_id: correction.id.clone(),
            status: VerdictStatus::NeedsCorrection,
            reason: None,
            detail: Some(detail.into()),
            suggested_correction: Some(correction),
            flags: Vec::new(),
            execution_allowed: false,
            call_fingerprint: None,
        }
    }

    /// Attach flags; ignored on approved verdicts
    #[must_use]
    pub fn with_flags(mut self, flags: impl IntoIterator<Item = VerdictFlag>) -> Self {
        if self.status != VerdictStatus::Approved {
            self.flags.extend(flags);
            self.flags.sort();
            self.flags.dedup();
        }
        self
    }

    /// Check if the call may be executed
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.status == VerdictStatus::Approved
    }

    /// Check the structural invariants of this verdict
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        let exclusive = !(self.reason.is_some() && self.suggested_correction.is_some());
        let by_status = match self.status {
            VerdictStatus::Approved => {
                self.reason.is_none()
                    && self.suggested_correction.is_none()
                    && self.flags.is_empty()
                    && self.execution_allowed
                    && self.call_fingerprint.is_some()
            }
            VerdictStatus::Rejected => self.reason.is_some() && !self.execution_allowed,
            VerdictStatus::NeedsCorrection => {
                self.suggested_correction
                    .as_ref()
                    .is_some_and(|c| c.id == self.tool_call_id)
                    && !self.execution_allowed
            }
        };
        exclusive && by_status
    }
}

/// Ordered verdicts for a batch, one per input call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationResult(Vec<Verdict>);

impl ValidationResult {
    /// Wrap verdicts already in input order
    #[must_use]
    pub fn new(verdicts: Vec<Verdict>) -> Self {
        Self(verdicts)
    }

    /// Number of verdicts
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate verdicts in input order
    pub fn iter(&self) -> std::slice::Iter<'_, Verdict> {
        self.0.iter()
    }

    /// Borrow as a slice
    #[must_use]
    pub fn as_slice(&self) -> &[Verdict] {
        &self.0
    }

    /// Count verdicts with the given status
    #[must_use]
    pub fn count(&self, status: VerdictStatus) -> usize {
        self.0.iter().filter(|v| v.status == status).count()
    }

    /// Consume into the underlying vector
    #[must_use]
    pub fn into_inner(self) -> Vec<Verdict> {
        self.0
    }
}

impl<'a> IntoIterator for &'a ValidationResult {
    type Item = &'a Verdict;
    type IntoIter = std::slice::Iter<'a, Verdict>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
