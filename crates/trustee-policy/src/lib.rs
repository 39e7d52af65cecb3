//! Trustee Policy - constraint evaluation for contract negotiation
//!
//! Policies are made of permissions and prohibitions, each holding atomic
//! constraints of the form `left_operand OPERATOR right_operand`. The engine
//! resolves the left operand to a registered [`AtomicConstraintFunction`]
//! and asks it for a verdict.
//!
//! The default engine registers [`TrustedParticipantConstraintFunction`]
//! under `"trustedParticipant"`, which checks the counterparty against the
//! local whitelist.

mod trusted;

pub use trusted::{TrustedParticipantConstraintFunction, TRUSTED_PARTICIPANT_KEY};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use trustee_types::Participant;
use trustee_whitelist::TrustedParticipantsWhitelist;
use utoipa::ToSchema;

/// Result type for constraint evaluation
pub type Result<T> = std::result::Result<T, PolicyError>;

/// Constraint evaluation errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PolicyError {
    /// Operator not supported by the constraint function
    #[error("Operator {operator} not supported for {left_operand}")]
    UnsupportedOperator {
        left_operand: String,
        operator: Operator,
    },

    /// Right operand has the wrong shape for the operator
    #[error("Invalid right operand for {left_operand}: {reason}")]
    InvalidRightOperand { left_operand: String, reason: String },
}

// =============================================================================
// Policy Model
// =============================================================================

/// Constraint operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operator {
    Eq,
    Neq,
    In,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "EQ",
            Self::Neq => "NEQ",
            Self::In => "IN",
        })
    }
}

/// A single `left OPERATOR right` constraint
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AtomicConstraint {
    /// Key of the constraint function to evaluate
    pub left_operand: String,
    pub operator: Operator,
    /// Operand handed to the constraint function
    #[schema(value_type = Object)]
    pub right_operand: serde_json::Value,
}

/// A permission or prohibition
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Rule {
    /// Rule ID
    pub id: String,
    /// Action the rule governs (e.g. `use`)
    #[serde(default = "default_action")]
    pub action: String,
    /// Constraints that must all hold for the rule to apply
    #[serde(default)]
    pub constraints: Vec<AtomicConstraint>,
}

fn default_action() -> String {
    "use".to_string()
}

/// A policy attached to a contract offer
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct Policy {
    #[serde(default)]
    pub permissions: Vec<Rule>,
    #[serde(default)]
    pub prohibitions: Vec<Rule>,
}

/// What a constraint function gets to see about the negotiation
#[derive(Debug, Clone)]
pub struct PolicyContext {
    /// The party the policy is evaluated for
    pub counterparty: Participant,
}

impl PolicyContext {
    pub fn new(counterparty: Participant) -> Self {
        Self { counterparty }
    }
}

/// Result of a policy evaluation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PolicyEvaluation {
    /// Whether the policy is satisfied
    pub passed: bool,
    /// Rules that were checked
    pub rules_checked: Vec<String>,
    /// Rules that failed
    pub rules_failed: Vec<String>,
    /// Why constraints could not be evaluated
    pub problems: Vec<String>,
}

// =============================================================================
// Constraint Functions
// =============================================================================

/// A function deciding a single atomic constraint
pub trait AtomicConstraintFunction: Send + Sync {
    /// Evaluate `operator right` against the context
    fn evaluate(
        &self,
        operator: Operator,
        right: &serde_json::Value,
        context: &PolicyContext,
    ) -> Result<bool>;
}

/// Registry of constraint functions keyed by left operand
#[derive(Default, Clone)]
pub struct PolicyEngine {
    functions: HashMap<String, Arc<dyn AtomicConstraintFunction>>,
}

impl PolicyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine with the trusted participant constraint bound to the whitelist
    pub fn with_defaults(whitelist: Arc<TrustedParticipantsWhitelist>) -> Self {
        let mut engine = Self::new();
        engine.register(
            TRUSTED_PARTICIPANT_KEY,
            TrustedParticipantConstraintFunction::new(whitelist),
        );
        engine
    }

    /// Bind a constraint function to a left operand key
    pub fn register(
        &mut self,
        left_operand: impl Into<String>,
        function: impl AtomicConstraintFunction + 'static,
    ) {
        self.functions.insert(left_operand.into(), Arc::new(function));
    }

    pub fn is_registered(&self, left_operand: &str) -> bool {
        self.functions.contains_key(left_operand)
    }

    /// Evaluate a policy for a counterparty
    ///
    /// Every permission must have all constraints satisfied; no prohibition
    /// may have all constraints satisfied.
    pub fn evaluate(&self, policy: &Policy, context: &PolicyContext) -> PolicyEvaluation {
        let mut evaluation = PolicyEvaluation {
            passed: true,
            ..Default::default()
        };

        for rule in &policy.permissions {
            evaluation.rules_checked.push(rule.id.clone());
            if !self.rule_holds(rule, context, &mut evaluation.problems) {
                evaluation.rules_failed.push(rule.id.clone());
            }
        }

        for rule in &policy.prohibitions {
            evaluation.rules_checked.push(rule.id.clone());
            if self.rule_holds(rule, context, &mut evaluation.problems) {
                evaluation.rules_failed.push(rule.id.clone());
            }
        }

        evaluation.passed = evaluation.rules_failed.is_empty();
        tracing::debug!(
            counterparty = %context.counterparty.name,
            passed = evaluation.passed,
            failed = ?evaluation.rules_failed,
            "Policy evaluated"
        );
        evaluation
    }

    fn rule_holds(&self, rule: &Rule, context: &PolicyContext, problems: &mut Vec<String>) -> bool {
        rule.constraints.iter().all(|constraint| {
            let Some(function) = self.functions.get(&constraint.left_operand) else {
                problems.push(format!(
                    "{}: no constraint function registered for '{}'",
                    rule.id, constraint.left_operand
                ));
                return false;
            };
            match function.evaluate(constraint.operator, &constraint.right_operand, context) {
                Ok(verdict) => verdict,
                Err(e) => {
                    problems.push(format!("{}: {e}", rule.id));
                    false
                }
            }
        })
    }
}

impl fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn trustee() -> Participant {
        Participant::new("did:example:1", "trustee1", "http://trustee1.com")
    }

    fn engine() -> PolicyEngine {
        let whitelist = Arc::new(TrustedParticipantsWhitelist::with_participants([trustee()]));
        PolicyEngine::with_defaults(whitelist)
    }

    fn rule(id: &str, operator: Operator, right: serde_json::Value) -> Rule {
        Rule {
            id: id.into(),
            action: "use".into(),
            constraints: vec![AtomicConstraint {
                left_operand: TRUSTED_PARTICIPANT_KEY.into(),
                operator,
                right_operand: right,
            }],
        }
    }

    #[test]
    fn test_permission_for_trusted_counterparty() {
        let policy = Policy {
            permissions: vec![rule("p1", Operator::Eq, json!(true))],
            prohibitions: vec![],
        };
        let result = engine().evaluate(&policy, &PolicyContext::new(trustee()));
        assert!(result.passed);
        assert_eq!(result.rules_checked, vec!["p1"]);

        let stranger = Participant::anonymous("stranger", "http://stranger.com");
        let result = engine().evaluate(&policy, &PolicyContext::new(stranger));
        assert!(!result.passed);
        assert_eq!(result.rules_failed, vec!["p1"]);
        assert!(result.problems.is_empty());
    }

    #[test]
    fn test_prohibition_blocks_when_satisfied() {
        let policy = Policy {
            permissions: vec![],
            prohibitions: vec![rule("deny-untrusted", Operator::Neq, json!(true))],
        };
        let stranger = Participant::anonymous("stranger", "http://stranger.com");
        assert!(!engine().evaluate(&policy, &PolicyContext::new(stranger)).passed);
        assert!(engine().evaluate(&policy, &PolicyContext::new(trustee())).passed);
    }

    #[test]
    fn test_unknown_left_operand_fails_rule() {
        let policy = Policy {
            permissions: vec![Rule {
                id: "p1".into(),
                action: "use".into(),
                constraints: vec![AtomicConstraint {
                    left_operand: "region".into(),
                    operator: Operator::Eq,
                    right_operand: json!("eu"),
                }],
            }],
            prohibitions: vec![],
        };
        let result = engine().evaluate(&policy, &PolicyContext::new(trustee()));
        assert!(!result.passed);
        assert_eq!(result.problems.len(), 1);
        assert!(result.problems[0].contains("region"));
    }

    #[test]
    fn test_function_error_is_recorded() {
        let policy = Policy {
            permissions: vec![rule("p1", Operator::Eq, json!("yes"))],
            prohibitions: vec![],
        };
        let result = engine().evaluate(&policy, &PolicyContext::new(trustee()));
        assert!(!result.passed);
        assert!(result.problems[0].starts_with("p1:"));
    }

    #[test]
    fn test_empty_policy_passes() {
        let result = engine().evaluate(&Policy::default(), &PolicyContext::new(trustee()));
        assert!(result.passed);
        assert!(result.rules_checked.is_empty());
    }

    #[test]
    fn test_policy_json_shape() {
        let policy: Policy = serde_json::from_value(json!({
            "permissions": [{
                "id": "p1",
                "constraints": [{
                    "leftOperand": "trustedParticipant",
                    "operator": "IN",
                    "rightOperand": ["trustee1"]
                }]
            }]
        }))
        .unwrap();
        assert_eq!(policy.permissions[0].action, "use");
        assert_eq!(policy.permissions[0].constraints[0].operator, Operator::In);
        assert!(engine().evaluate(&policy, &PolicyContext::new(trustee())).passed);
    }
}
