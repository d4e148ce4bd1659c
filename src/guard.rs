//! Individual (pre-discussion) selections and the variety guard

use crate::catalog::PolicyCatalog;
use crate::config::POLICY_COUNT;
use crate::error::{Error, Result};
use crate::types::{ActorId, OptionId, PolicyId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// True when all 7 policies are answered with the same option.
///
/// Fewer than 7 answers is never degenerate.
pub fn is_degenerate(selections: &BTreeMap<PolicyId, OptionId>) -> bool {
    if selections.len() != POLICY_COUNT {
        return false;
    }
    let mut options = selections.values();
    match options.next() {
        Some(first) => options.all(|o| o == first),
        None => false,
    }
}

/// The user's own answers before discussing with the parliament
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndividualSelections {
    choices: BTreeMap<PolicyId, OptionId>,
}

impl IndividualSelections {
    /// No answers yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer (or re-answer) a policy.
    ///
    /// Rejected without storing anything when the answer, plus one unit for
    /// each policy still unanswered, would not fit in `capacity`.
    pub fn select(
        &mut self,
        policy: PolicyId,
        option: OptionId,
        catalog: &PolicyCatalog,
        capacity: u32,
    ) -> Result<()> {
        let cost = catalog.weight(policy, option)?;

        let mut spent_elsewhere = 0;
        for (other, chosen) in self.choices.iter().filter(|(p, _)| **p != policy) {
            spent_elsewhere += catalog.weight(*other, *chosen)?;
        }
        let unanswered_elsewhere = catalog
            .ids()
            .filter(|p| *p != policy && !self.choices.contains_key(p))
            .count();
        let unanswered_elsewhere = u32::try_from(unanswered_elsewhere).unwrap_or(u32::MAX);

        let remaining = capacity.saturating_sub(spent_elsewhere);
        if cost.saturating_add(unanswered_elsewhere) > remaining {
            tracing::debug!(
                policy = %policy,
                option = %option,
                cost,
                remaining,
                "Individual selection rejected"
            );
            return Err(Error::BudgetInfeasible {
                actor: ActorId::User,
                policy,
                option,
                cost,
                remaining,
                reserved: unanswered_elsewhere,
            });
        }

        self.choices.insert(policy, option);
        Ok(())
    }

    /// Withdraw an answer
    pub fn clear(&mut self, policy: PolicyId) -> Option<OptionId> {
        self.choices.remove(&policy)
    }

    /// Answer given for a policy
    pub fn get(&self, policy: PolicyId) -> Option<OptionId> {
        self.choices.get(&policy).copied()
    }

    /// All answers
    pub fn as_map(&self) -> &BTreeMap<PolicyId, OptionId> {
        &self.choices
    }

    /// Number of answered policies
    pub fn len(&self) -> usize {
        self.choices.len()
    }

    /// No policy answered yet
    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }

    /// Units the current answers would cost
    pub fn spent(&self, catalog: &PolicyCatalog) -> Result<u32> {
        self.choices.iter().map(|(p, o)| catalog.weight(*p, *o)).sum()
    }

    /// Every policy in the catalog answered
    pub fn is_complete(&self, catalog: &PolicyCatalog) -> bool {
        catalog.ids().all(|p| self.choices.contains_key(&p))
    }

    /// Check the answers may be submitted
    pub fn validate_submission(&self, catalog: &PolicyCatalog) -> Result<()> {
        if !self.is_complete(catalog) {
            return Err(Error::IncompleteSelection {
                answered: self.choices.len(),
                required: catalog.len(),
            });
        }
        if is_degenerate(&self.choices) {
            let option = self.choices.values().next().copied().unwrap_or(OptionId::ONE);
            return Err(Error::DegenerateSelection {
                count: self.choices.len(),
                option,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(id: u8) -> PolicyId {
        PolicyId::new(id).unwrap()
    }

    fn uniform(option: OptionId, n: u8) -> BTreeMap<PolicyId, OptionId> {
        (1..=n).map(|p| (pid(p), option)).collect()
    }

    #[test]
    fn test_degenerate_detection() {
        assert!(is_degenerate(&uniform(OptionId::TWO, 7)));
        assert!(!is_degenerate(&uniform(OptionId::TWO, 6)));
        assert!(!is_degenerate(&BTreeMap::new()));

        let mut varied = uniform(OptionId::TWO, 7);
        varied.insert(pid(4), OptionId::ONE);
        assert!(!is_degenerate(&varied));
    }

    #[test]
    fn test_select_within_budget() {
        let catalog = PolicyCatalog::builtin();
        let mut selections = IndividualSelections::new();
        selections.select(pid(1), OptionId::THREE, &catalog, 14).unwrap();
        selections.select(pid(2), OptionId::THREE, &catalog, 14).unwrap();
        assert_eq!(selections.spent(&catalog).unwrap(), 6);
    }

    #[test]
    fn test_select_rejects_stranding_choice() {
        let catalog = PolicyCatalog::builtin();
        let mut selections = IndividualSelections::new();
        for p in 1..=3 {
            selections.select(pid(p), OptionId::THREE, &catalog, 14).unwrap();
        }
        // 9 spent, policies 5..7 need 3 more: option 3 on policy 4 would need 15
        let err = selections.select(pid(4), OptionId::THREE, &catalog, 14).unwrap_err();
        assert!(matches!(err, Error::BudgetInfeasible { reserved: 3, remaining: 5, .. }));
        assert_eq!(selections.get(pid(4)), None);

        selections.select(pid(4), OptionId::TWO, &catalog, 14).unwrap();
    }

    #[test]
    fn test_reselect_frees_previous_cost() {
        let catalog = PolicyCatalog::builtin();
        let mut selections = IndividualSelections::new();
        for p in 1..=4 {
            selections.select(pid(p), OptionId::TWO, &catalog, 14).unwrap();
        }
        // 8 spent, 3 reserved: re-answering policy 1 with 3 costs 6 + 3 + 3 = 12
        selections.select(pid(1), OptionId::THREE, &catalog, 14).unwrap();
        assert_eq!(selections.spent(&catalog).unwrap(), 9);
    }

    #[test]
    fn test_submission_rules() {
        let catalog = PolicyCatalog::builtin();
        let mut selections = IndividualSelections::new();
        for p in 1..=6 {
            selections.select(pid(p), OptionId::TWO, &catalog, 14).unwrap();
        }
        assert!(matches!(
            selections.validate_submission(&catalog),
            Err(Error::IncompleteSelection { answered: 6, required: 7 })
        ));

        selections.select(pid(7), OptionId::TWO, &catalog, 14).unwrap();
        let err = selections.validate_submission(&catalog).unwrap_err();
        assert!(matches!(err, Error::DegenerateSelection { count: 7, .. }));
        assert!(err.is_user_facing());

        selections.select(pid(7), OptionId::ONE, &catalog, 14).unwrap();
        selections.validate_submission(&catalog).unwrap();
    }
}
