//! Policy catalog: the 7 sequential policy questions and their priced options
//!
//! The catalog is static configuration. Each policy offers exactly three
//! options costing 1, 2 and 3 budget units.

use crate::config::POLICY_COUNT;
use crate::error::{Error, Result};
use crate::types::{OptionId, PolicyId};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One priced answer to a policy question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOption {
    /// Option id (1, 2 or 3)
    pub id: OptionId,
    /// Budget units consumed when this option is chosen
    pub weight: u32,
    /// Display text
    pub text: String,
}

/// A policy question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Position in the sequence (1-based)
    pub id: PolicyId,
    /// Short title
    pub title: String,
    /// Longer description shown to players and agents
    pub description: String,
    /// Exactly three options
    pub options: Vec<PolicyOption>,
}

impl Policy {
    /// Look up an option
    pub fn option(&self, id: OptionId) -> Option<&PolicyOption> {
        self.options.iter().find(|o| o.id == id)
    }

    /// Weight of an option
    pub fn weight(&self, id: OptionId) -> Result<u32> {
        self.option(id).map(|o| o.weight).ok_or(Error::UnknownOption {
            policy: self.id,
            option: id,
        })
    }
}

/// Ordered, validated collection of policies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CatalogFile")]
pub struct PolicyCatalog {
    policies: Vec<Policy>,
}

#[derive(Deserialize)]
struct CatalogFile {
    policies: Vec<Policy>,
}

impl TryFrom<CatalogFile> for PolicyCatalog {
    type Error = Error;

    fn try_from(file: CatalogFile) -> Result<Self> {
        Self::new(file.policies)
    }
}

impl PolicyCatalog {
    /// Build a catalog, checking ids run 1..=7 and each policy prices its
    /// options at exactly 1, 2 and 3 units
    pub fn new(policies: Vec<Policy>) -> Result<Self> {
        if policies.len() != POLICY_COUNT {
            return Err(Error::invalid_catalog(format!(
                "expected {} policies, found {}",
                POLICY_COUNT,
                policies.len()
            )));
        }

        for (index, policy) in policies.iter().enumerate() {
            let expected = index + 1;
            if usize::from(policy.id.get()) != expected {
                return Err(Error::invalid_catalog(format!(
                    "policy at position {} has id {}",
                    expected, policy.id
                )));
            }
            if policy.options.len() != 3 {
                return Err(Error::invalid_catalog(format!(
                    "policy {} has {} options",
                    policy.id,
                    policy.options.len()
                )));
            }
            let mut weights: Vec<u32> = policy.options.iter().map(|o| o.weight).collect();
            weights.sort_unstable();
            if weights != [1, 2, 3] {
                return Err(Error::invalid_catalog(format!(
                    "policy {} option weights are {:?}, expected 1, 2 and 3",
                    policy.id, weights
                )));
            }
            for id in OptionId::ALL {
                if policy.option(id).is_none() {
                    return Err(Error::invalid_catalog(format!(
                        "policy {} is missing option {}",
                        policy.id, id
                    )));
                }
            }
        }

        Ok(Self { policies })
    }

    /// Load a catalog from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a catalog from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Look up a policy
    pub fn policy(&self, id: PolicyId) -> Result<&Policy> {
        self.policies
            .iter()
            .find(|p| p.id == id)
            .ok_or(Error::UnknownPolicy(id))
    }

    /// Unit cost of choosing `option` on `policy`
    pub fn weight(&self, policy: PolicyId, option: OptionId) -> Result<u32> {
        self.policy(policy)?.weight(option)
    }

    /// Number of policies
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Always false for a validated catalog
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Policies in order
    pub fn iter(&self) -> impl Iterator<Item = &Policy> {
        self.policies.iter()
    }

    /// Policy ids in order
    pub fn ids(&self) -> impl Iterator<Item = PolicyId> + '_ {
        self.policies.iter().map(|p| p.id)
    }

    /// Last policy in the sequence
    pub fn last_id(&self) -> Result<PolicyId> {
        self.policies
            .last()
            .map(|p| p.id)
            .ok_or_else(|| Error::invalid_catalog("catalog has no policies"))
    }

    /// The Republic of Bean refugee-education catalog
    pub fn builtin() -> Self {
        let raw: [(&str, &str, [&str; 3]); POLICY_COUNT] = [
            (
                "Access to Education",
                "How should refugee children enter the national school system?",
                [
                    "Limit access to designated refugee schools outside the main system",
                    "Provide separate classes inside mainstream schools for a transition period",
                    "Enrol refugee children directly in mainstream classes with full support",
                ],
            ),
            (
                "Language Instruction",
                "Which language support should newly arrived pupils receive?",
                [
                    "Teach only in the official language with no additional support",
                    "Offer after-school official-language courses",
                    "Provide bilingual instruction and mother-tongue support alongside the official language",
                ],
            ),
            (
                "Teacher Training",
                "How should teachers be prepared for multilingual, multicultural classrooms?",
                [
                    "Rely on existing teacher qualifications",
                    "Run short optional workshops on intercultural teaching",
                    "Fund mandatory, ongoing professional development with specialist coaches",
                ],
            ),
            (
                "Curriculum Adaptation",
                "Should the national curriculum change to reflect refugee pupils?",
                [
                    "Keep the national curriculum unchanged",
                    "Add optional intercultural modules",
                    "Redesign the curriculum to integrate diverse histories and perspectives",
                ],
            ),
            (
                "Psychosocial Support",
                "What mental-health support should schools provide?",
                [
                    "Refer pupils to existing external services only",
                    "Train school staff in basic trauma awareness",
                    "Place dedicated counsellors and psychologists in every school",
                ],
            ),
            (
                "Financial Support",
                "How should the cost of schooling be covered for refugee families?",
                [
                    "No targeted financial support",
                    "Cover basic supplies and transport",
                    "Provide full grants including meals, materials and family allowances",
                ],
            ),
            (
                "Certification of Prior Learning",
                "How should previous education and qualifications be recognised?",
                [
                    "Require pupils to restart from the beginning of their level",
                    "Accept documented qualifications after a placement test",
                    "Build a flexible recognition system including undocumented prior learning",
                ],
            ),
        ];

        let ids = std::iter::successors(Some(PolicyId::FIRST), |id| id.next());
        let policies = ids
            .zip(raw.iter())
            .map(|(id, (title, description, options))| Policy {
                id,
                title: title.to_string(),
                description: description.to_string(),
                options: options
                    .iter()
                    .zip(OptionId::ALL)
                    .map(|(text, id)| PolicyOption {
                        id,
                        weight: u32::from(id.get()),
                        text: text.to_string(),
                    })
                    .collect(),
            })
            .collect();

        Self { policies }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(id: u8) -> PolicyId {
        PolicyId::new(id).unwrap()
    }

    #[test]
    fn test_builtin_is_valid() {
        let catalog = PolicyCatalog::builtin();
        let rebuilt = PolicyCatalog::new(catalog.policies.clone()).unwrap();
        assert_eq!(rebuilt.len(), 7);
        assert_eq!(catalog.last_id().unwrap(), pid(7));
        for policy in catalog.iter() {
            for id in OptionId::ALL {
                assert_eq!(policy.weight(id).unwrap(), id.get() as u32);
            }
        }
    }

    #[test]
    fn test_unknown_policy() {
        let catalog = PolicyCatalog::builtin();
        assert!(matches!(catalog.policy(pid(8)), Err(Error::UnknownPolicy(_))));
    }

    #[test]
    fn test_rejects_wrong_weights() {
        let mut policies = PolicyCatalog::builtin().policies;
        policies[2].options[2].weight = 2;
        let err = PolicyCatalog::new(policies).unwrap_err();
        assert!(matches!(err, Error::InvalidCatalog(_)));
    }

    #[test]
    fn test_rejects_short_catalog() {
        let mut policies = PolicyCatalog::builtin().policies;
        policies.pop();
        assert!(PolicyCatalog::new(policies).is_err());
    }

    #[test]
    fn test_yaml_roundtrip_validates() {
        let catalog = PolicyCatalog::builtin();
        let yaml = serde_yaml::to_string(&catalog).unwrap();
        assert_eq!(PolicyCatalog::from_yaml(&yaml).unwrap(), catalog);

        let broken = yaml.replacen("weight: 3", "weight: 5", 1);
        assert!(PolicyCatalog::from_yaml(&broken).is_err());
    }
}
