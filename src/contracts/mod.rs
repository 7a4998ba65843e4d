use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::states::{identifier_of, is_successor, AccountInfo, AccountStatus};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractError {
    #[error("transition has neither an input nor an output account")]
    EmptyTransition,
    #[error("output token {output} does not succeed input token {input}")]
    NotSuccessor { input: Uuid, output: Uuid },
    #[error("account {token} must be issued ACTIVE, got {status}")]
    IssuedInactive { token: Uuid, status: AccountStatus },
    #[error("account {token} is closed and cannot be changed")]
    AccountClosed { token: Uuid },
}

/// What a validated input/output pair does to an account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Issue,
    Evolve,
    Retire,
}

/// Checks one account-level state transition.
///
/// Signatures and authorization are not checked here; the caller verifies
/// those before or after this call.
pub fn verify_transition(
    input: Option<&AccountInfo>,
    output: Option<&AccountInfo>,
) -> Result<Transition, ContractError> {
    match (input, output) {
        (None, None) => Err(ContractError::EmptyTransition),
        (None, Some(issued)) => {
            if issued.status() != AccountStatus::Active {
                return Err(ContractError::IssuedInactive {
                    token: identifier_of(issued),
                    status: issued.status(),
                });
            }
            Ok(Transition::Issue)
        }
        (Some(_), None) => Ok(Transition::Retire),
        (Some(old), Some(new)) => {
            if !is_successor(old, new) {
                return Err(ContractError::NotSuccessor {
                    input: identifier_of(old),
                    output: identifier_of(new),
                });
            }
            if old.status().is_terminal() && old != new {
                return Err(ContractError::AccountClosed {
                    token: identifier_of(old),
                });
            }
            Ok(Transition::Evolve)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::test_support::random_party;
    use crate::states::UniqueIdentifier;

    fn wallet() -> AccountInfo {
        AccountInfo::new("wallet-1", random_party("PartyA"), UniqueIdentifier::new(None)).unwrap()
    }

    #[test]
    fn issue_evolve_and_retire_are_classified() {
        let r0 = wallet();
        let r1 = r0.close();
        assert_eq!(verify_transition(None, Some(&r0)).unwrap(), Transition::Issue);
        assert_eq!(
            verify_transition(Some(&r0), Some(&r1)).unwrap(),
            Transition::Evolve
        );
        assert_eq!(verify_transition(Some(&r1), None).unwrap(), Transition::Retire);
        assert_eq!(
            verify_transition(None, None).unwrap_err(),
            ContractError::EmptyTransition
        );
    }

    #[test]
    fn different_token_is_not_a_valid_evolution() {
        let r0 = wallet();
        let other = wallet();
        match verify_transition(Some(&r0), Some(&other)).unwrap_err() {
            ContractError::NotSuccessor { input, output } => {
                assert_eq!(input, identifier_of(&r0));
                assert_eq!(output, identifier_of(&other));
            }
            err => panic!("unexpected error {err}"),
        }
    }

    #[test]
    fn closed_accounts_only_accept_no_op_updates() {
        let closed = wallet().close();
        assert_eq!(
            verify_transition(Some(&closed), Some(&closed)).unwrap(),
            Transition::Evolve
        );
        let reopened = closed.with_status(AccountStatus::Active);
        assert_eq!(
            verify_transition(Some(&closed), Some(&reopened)).unwrap_err(),
            ContractError::AccountClosed {
                token: identifier_of(&closed)
            }
        );
    }

    #[test]
    fn accounts_cannot_be_issued_closed() {
        let closed = wallet().close();
        assert!(matches!(
            verify_transition(None, Some(&closed)),
            Err(ContractError::IssuedInactive { .. })
        ));
    }
}
