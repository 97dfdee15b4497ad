use crate::types::{AgentContext, Recommendation, RiskAssessment, RiskTolerance, TransactionRequest};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const FACTOR_LARGE_AMOUNT: &str = "Large transaction relative to balance";
pub const FACTOR_VERY_LARGE_AMOUNT: &str = "Very large transaction relative to balance";
pub const FACTOR_NEW_RECIPIENT: &str = "First transaction to this recipient";
pub const NOTE_NO_PURPOSE: &str = "No purpose specified";
pub const NOTE_LOW_BALANCE: &str = "Low balance warning";

/// Deterministic risk rule configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskEngineConfig {
    /// Amount above this share of the balance counts as large.
    pub large_amount_ratio: Decimal,
    pub large_amount_weight: Decimal,
    /// Amount above this share of the balance counts as very large (added on top).
    pub very_large_amount_ratio: Decimal,
    pub very_large_amount_weight: Decimal,
    pub new_recipient_weight: Decimal,
    /// Scores strictly above this are rejected.
    pub reject_above: Decimal,
    /// Scores strictly above this (and not rejected) are warned.
    pub warn_above: Decimal,
    /// Balances below this produce a low-balance note.
    pub low_balance_threshold: Decimal,
    /// Purpose terms that produce a note, matched case-insensitively.
    pub suspicious_terms: Vec<String>,
}

impl Default for RiskEngineConfig {
    fn default() -> Self {
        Self {
            large_amount_ratio: Decimal::new(5, 1),
            large_amount_weight: Decimal::new(3, 1),
            very_large_amount_ratio: Decimal::new(8, 1),
            very_large_amount_weight: Decimal::new(3, 1),
            new_recipient_weight: Decimal::new(2, 1),
            reject_above: Decimal::new(7, 1),
            warn_above: Decimal::new(4, 1),
            low_balance_threshold: Decimal::new(1, 1),
            suspicious_terms: ["urgent", "immediate", "guaranteed", "profit"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Rule-driven advisory engine. Pure: no I/O, no clock, no randomness.
#[derive(Debug, Clone, Default)]
pub struct RiskEvaluator {
    config: RiskEngineConfig,
}

impl RiskEvaluator {
    pub fn new(config: RiskEngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskEngineConfig {
        &self.config
    }

    pub fn evaluate(&self, request: &TransactionRequest, context: &AgentContext) -> RiskAssessment {
        let mut score = Decimal::ZERO;
        let mut factors = Vec::new();
        let mut notes = Vec::new();
        let balance = context.wallet_balance;

        if request.amount > self.config.large_amount_ratio * balance {
            score += self.config.large_amount_weight;
            factors.push(FACTOR_LARGE_AMOUNT.to_string());
        }
        if request.amount > self.config.very_large_amount_ratio * balance {
            score += self.config.very_large_amount_weight;
            factors.push(FACTOR_VERY_LARGE_AMOUNT.to_string());
        }
        if !context.has_sent_to(&request.recipient) {
            score += self.config.new_recipient_weight;
            factors.push(FACTOR_NEW_RECIPIENT.to_string());
        }

        match request.purpose_text() {
            None => notes.push(NOTE_NO_PURPOSE.to_string()),
            Some(purpose) => {
                let purpose = purpose.to_lowercase();
                for term in &self.config.suspicious_terms {
                    if purpose.contains(&term.to_lowercase()) {
                        notes.push(format!("Suspicious term detected: {term}"));
                    }
                }
            }
        }
        if balance < self.config.low_balance_threshold {
            notes.push(NOTE_LOW_BALANCE.to_string());
        }

        let risk_score = score.clamp(Decimal::ZERO, Decimal::ONE);
        let recommendation = self.recommend(risk_score);

        RiskAssessment {
            risk_score,
            factors,
            notes,
            recommendation,
            suggested_action: suggested_action(recommendation, context.risk_tolerance).to_string(),
        }
    }

    fn recommend(&self, score: Decimal) -> Recommendation {
        if score > self.config.reject_above {
            Recommendation::Reject
        } else if score > self.config.warn_above {
            Recommendation::Warn
        } else {
            Recommendation::Approve
        }
    }
}

fn suggested_action(recommendation: Recommendation, tolerance: RiskTolerance) -> &'static str {
    match (recommendation, tolerance) {
        (Recommendation::Approve, _) => "Proceed with the transaction.",
        (Recommendation::Warn, RiskTolerance::Low) => {
            "Consider sending a smaller amount or verifying the recipient before proceeding."
        }
        (Recommendation::Warn, _) => "Double-check the recipient and amount before confirming.",
        (Recommendation::Reject, _) => {
            "Do not send. Reduce the amount or send to a recipient you have paid before."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HistoryEntry;
    use chrono::Utc;
    use proptest::prelude::*;

    const SENDER: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";
    const RECIPIENT: &str = "4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4T";

    fn known_recipient_context(balance: Decimal) -> AgentContext {
        AgentContext::new(balance).with_history([HistoryEntry {
            recipient: RECIPIENT.to_string(),
            amount: Decimal::ONE,
            timestamp: Utc::now(),
        }])
    }

    #[test]
    fn large_amount_to_new_recipient_warns() {
        let engine = RiskEvaluator::default();
        let request = TransactionRequest::new(SENDER, RECIPIENT, Decimal::new(6, 0));
        let assessment = engine.evaluate(&request, &AgentContext::new(Decimal::TEN));

        assert_eq!(assessment.risk_score, Decimal::new(5, 1));
        assert_eq!(assessment.recommendation, Recommendation::Warn);
        assert_eq!(
            assessment.factors,
            vec![FACTOR_LARGE_AMOUNT.to_string(), FACTOR_NEW_RECIPIENT.to_string()]
        );
        assert_eq!(assessment.notes, vec![NOTE_NO_PURPOSE.to_string()]);
    }

    #[test]
    fn very_large_amount_to_known_recipient_warns() {
        let engine = RiskEvaluator::default();
        let request = TransactionRequest::new(SENDER, RECIPIENT, Decimal::new(9, 0))
            .with_purpose("rent");
        let assessment = engine.evaluate(&request, &known_recipient_context(Decimal::TEN));

        assert_eq!(assessment.risk_score, Decimal::new(6, 1));
        assert_eq!(assessment.recommendation, Recommendation::Warn);
        assert_eq!(
            assessment.factors,
            vec![
                FACTOR_LARGE_AMOUNT.to_string(),
                FACTOR_VERY_LARGE_AMOUNT.to_string()
            ]
        );
        assert!(assessment.notes.is_empty());
    }

    #[test]
    fn very_large_amount_to_new_recipient_rejects() {
        let engine = RiskEvaluator::default();
        let request = TransactionRequest::new(SENDER, RECIPIENT, Decimal::new(9, 0));
        let assessment = engine.evaluate(&request, &AgentContext::new(Decimal::TEN));

        assert_eq!(assessment.risk_score, Decimal::new(8, 1));
        assert_eq!(assessment.recommendation, Recommendation::Reject);
        assert_eq!(assessment.factors.len(), 3);
    }

    #[test]
    fn small_payment_to_known_recipient_approves() {
        let engine = RiskEvaluator::default();
        let request =
            TransactionRequest::new(SENDER, RECIPIENT, Decimal::ONE).with_purpose("coffee");
        let assessment = engine.evaluate(&request, &known_recipient_context(Decimal::TEN));

        assert_eq!(assessment.risk_score, Decimal::ZERO);
        assert_eq!(assessment.recommendation, Recommendation::Approve);
        assert!(assessment.factors.is_empty());
    }

    #[test]
    fn boundary_scores_follow_strict_thresholds() {
        let engine = RiskEvaluator::default();
        assert_eq!(engine.recommend(Decimal::new(4, 1)), Recommendation::Approve);
        assert_eq!(engine.recommend(Decimal::new(7, 1)), Recommendation::Warn);
        assert_eq!(engine.recommend(Decimal::new(71, 2)), Recommendation::Reject);
    }

    #[test]
    fn score_is_clamped_to_one() {
        let engine = RiskEvaluator::new(RiskEngineConfig {
            new_recipient_weight: Decimal::new(9, 1),
            ..RiskEngineConfig::default()
        });
        let request = TransactionRequest::new(SENDER, RECIPIENT, Decimal::new(9, 0));
        let assessment = engine.evaluate(&request, &AgentContext::new(Decimal::TEN));

        assert_eq!(assessment.risk_score, Decimal::ONE);
    }

    #[test]
    fn notes_flag_suspicious_terms_and_low_balance() {
        let engine = RiskEvaluator::default();
        let request = TransactionRequest::new(SENDER, RECIPIENT, Decimal::new(1, 2))
            .with_purpose("URGENT: guaranteed returns");
        let assessment = engine.evaluate(&request, &AgentContext::new(Decimal::new(5, 2)));

        assert_eq!(
            assessment.notes,
            vec![
                "Suspicious term detected: urgent".to_string(),
                "Suspicious term detected: guaranteed".to_string(),
                NOTE_LOW_BALANCE.to_string(),
            ]
        );
    }

    #[test]
    fn suggested_action_depends_on_tolerance() {
        let engine = RiskEvaluator::default();
        let request = TransactionRequest::new(SENDER, RECIPIENT, Decimal::new(6, 0));
        let cautious = engine.evaluate(
            &request,
            &AgentContext::new(Decimal::TEN).with_tolerance(RiskTolerance::Low),
        );
        let relaxed = engine.evaluate(
            &request,
            &AgentContext::new(Decimal::TEN).with_tolerance(RiskTolerance::High),
        );

        assert_eq!(cautious.recommendation, relaxed.recommendation);
        assert_ne!(cautious.suggested_action, relaxed.suggested_action);
    }

    proptest! {
        #[test]
        fn evaluation_is_deterministic_and_bounded(
            amount_cents in 1i64..2_000_000,
            balance_cents in 0i64..2_000_000,
            known in any::<bool>(),
        ) {
            let engine = RiskEvaluator::default();
            let balance = Decimal::new(balance_cents, 2);
            let context = if known {
                known_recipient_context(balance)
            } else {
                AgentContext::new(balance)
            };
            let request = TransactionRequest::new(SENDER, RECIPIENT, Decimal::new(amount_cents, 2));

            let first = engine.evaluate(&request, &context);
            let second = engine.evaluate(&request, &context);

            prop_assert_eq!(&first, &second);
            prop_assert!(first.risk_score >= Decimal::ZERO);
            prop_assert!(first.risk_score <= Decimal::ONE);
        }
    }
}
