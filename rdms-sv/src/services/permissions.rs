//! Lab-role permission oracle
//!
//! Pure, deterministic role gate consulted before every mutating call and
//! by every UI hint: the two must agree, so the oracle is the single
//! implementation of the role hierarchy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lab-scoped role, totally ordered RESEARCHER < STEWARD < PI.
///
/// Each level includes all capabilities of the levels below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Researcher,
    Steward,
    Pi,
}

impl Role {
    /// Numeric level in the hierarchy (higher = more privileged)
    pub fn level(self) -> u8 {
        match self {
            Role::Researcher => 1,
            Role::Steward => 2,
            Role::Pi => 3,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Researcher => "RESEARCHER",
            Role::Steward => "STEWARD",
            Role::Pi => "PI",
        };
        f.write_str(s)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RESEARCHER" => Ok(Role::Researcher),
            "STEWARD" => Ok(Role::Steward),
            "PI" => Ok(Role::Pi),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

/// Whether an actor with `actor_role` may perform an operation gated by
/// `required`.
///
/// `None` (unauthenticated or not a member) is always denied. A multi-role
/// requirement is satisfied by meeting its *lowest* level: "STEWARD or PI
/// may do X" admits anyone at STEWARD level or above.
pub fn permits(actor_role: Option<Role>, required: &[Role]) -> bool {
    let Some(actor) = actor_role else {
        return false;
    };

    required
        .iter()
        .map(|r| r.level())
        .min()
        .map(|min_level| actor.level() >= min_level)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Role; 3] = [Role::Researcher, Role::Steward, Role::Pi];

    #[test]
    fn unaffiliated_actor_is_always_denied() {
        for role in ALL {
            assert!(!permits(None, &[role]));
        }
        assert!(!permits(None, &ALL));
    }

    #[test]
    fn single_role_requires_at_least_that_level() {
        assert!(permits(Some(Role::Pi), &[Role::Steward]));
        assert!(permits(Some(Role::Steward), &[Role::Steward]));
        assert!(!permits(Some(Role::Researcher), &[Role::Steward]));
        assert!(!permits(Some(Role::Steward), &[Role::Pi]));
    }

    #[test]
    fn role_set_is_satisfied_by_its_lowest_member() {
        // "STEWARD or PI" admits STEWARD but not RESEARCHER
        let steward_or_pi = [Role::Steward, Role::Pi];
        assert!(permits(Some(Role::Steward), &steward_or_pi));
        assert!(permits(Some(Role::Pi), &steward_or_pi));
        assert!(!permits(Some(Role::Researcher), &steward_or_pi));
    }

    #[test]
    fn permits_is_monotonic_in_the_actor_role() {
        // If a role passes a gate, every higher role passes it too
        for required in ALL {
            for (i, lower) in ALL.iter().enumerate() {
                if permits(Some(*lower), &[required]) {
                    for higher in &ALL[i..] {
                        assert!(permits(Some(*higher), &[required]));
                    }
                }
            }
        }
    }

    #[test]
    fn empty_requirement_denies_everyone() {
        assert!(!permits(Some(Role::Pi), &[]));
    }

    #[test]
    fn role_round_trips_through_strings() {
        for role in ALL {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
        assert!("ADMIN".parse::<Role>().is_err());
    }
}
