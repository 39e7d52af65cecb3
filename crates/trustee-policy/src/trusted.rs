//! Constraint function backed by the trusted participants whitelist

use std::sync::Arc;

use serde_json::Value;
use trustee_whitelist::TrustedParticipantsWhitelist;

use crate::{AtomicConstraintFunction, Operator, PolicyContext, PolicyError, Result};

/// Left operand the whitelist constraint is registered under
pub const TRUSTED_PARTICIPANT_KEY: &str = "trustedParticipant";

/// Decides whether the counterparty is (or is not) a trusted participant
///
/// | operator | right operand | satisfied when |
/// |---|---|---|
/// | `EQ` | `true` | counterparty is whitelisted |
/// | `EQ` | `false` | counterparty is not whitelisted |
/// | `NEQ` | `true` | counterparty is not whitelisted |
/// | `IN` | `["name", ...]` | counterparty is whitelisted and named in the list |
#[derive(Debug, Clone)]
pub struct TrustedParticipantConstraintFunction {
    whitelist: Arc<TrustedParticipantsWhitelist>,
}

impl TrustedParticipantConstraintFunction {
    pub fn new(whitelist: Arc<TrustedParticipantsWhitelist>) -> Self {
        Self { whitelist }
    }

    fn invalid(reason: impl Into<String>) -> PolicyError {
        PolicyError::InvalidRightOperand {
            left_operand: TRUSTED_PARTICIPANT_KEY.to_string(),
            reason: reason.into(),
        }
    }
}

impl AtomicConstraintFunction for TrustedParticipantConstraintFunction {
    fn evaluate(&self, operator: Operator, right: &Value, context: &PolicyContext) -> Result<bool> {
        let trusted = self.whitelist.is_trusted(&context.counterparty);

        match (operator, right) {
            (Operator::Eq, Value::Bool(expected)) => Ok(trusted == *expected),
            (Operator::Neq, Value::Bool(true)) => Ok(!trusted),
            (Operator::Neq, Value::Bool(false)) => Err(PolicyError::UnsupportedOperator {
                left_operand: TRUSTED_PARTICIPANT_KEY.to_string(),
                operator,
            }),
            (Operator::Eq | Operator::Neq, _) => Err(Self::invalid("expected a boolean")),
            (Operator::In, Value::Array(names)) => {
                let mut listed = false;
                for name in names {
                    let name = name
                        .as_str()
                        .ok_or_else(|| Self::invalid("expected an array of names"))?;
                    listed |= name == context.counterparty.name;
                }
                Ok(trusted && listed)
            }
            (Operator::In, _) => Err(Self::invalid("expected an array of names")),
        }
    }
}
