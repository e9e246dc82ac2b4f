//! Tally verification, winner determination and vote receipts.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use hierarchy::PersonId;

use super::{Candidate, Vote};
use crate::types::{CandidateId, ElectionId};

/// How the ballots decide an election.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// No candidates, or no ballots at all
    NoContest,
    /// One candidate holds the strict maximum
    Winner {
        /// Winning candidate
        candidate: CandidateId,
        /// Person behind it
        person: PersonId,
        /// Their tally
        votes: u64,
    },
    /// Two or more candidates share the maximum
    Tie {
        /// Tied persons
        persons: Vec<PersonId>,
        /// Shared tally
        votes: u64,
    },
}

/// Decide the election from the candidate tallies.
pub fn decide(candidates: &[Candidate]) -> Decision {
    let Some(max) = candidates.iter().map(|c| c.vote_count).max() else {
        return Decision::NoContest;
    };
    if max == 0 {
        return Decision::NoContest;
    }

    let top: Vec<&Candidate> = candidates.iter().filter(|c| c.vote_count == max).collect();
    match top.as_slice() {
        [only] => Decision::Winner {
            candidate: only.id,
            person: only.person,
            votes: max,
        },
        _ => Decision::Tie {
            persons: top.iter().map(|c| c.person).collect(),
            votes: max,
        },
    }
}

/// Check stored tallies against the ballots.
///
/// Returns a description of the first disagreement found.
pub fn verify<'a>(
    candidates: &[Candidate],
    votes: impl IntoIterator<Item = &'a Vote>,
    total_votes: u64,
) -> Result<(), String> {
    let mut derived: HashMap<CandidateId, u64> = HashMap::new();
    let mut ballots = 0u64;
    for vote in votes {
        *derived.entry(vote.candidate).or_insert(0) += 1;
        ballots += 1;
    }

    for candidate in candidates {
        let counted = derived.remove(&candidate.id).unwrap_or(0);
        if counted != candidate.vote_count {
            return Err(format!(
                "candidate {} stores {} votes but {} ballots reference it",
                candidate.id, candidate.vote_count, counted
            ));
        }
    }
    if let Some((orphan, count)) = derived.into_iter().next() {
        return Err(format!("{count} ballots reference unknown candidate {orphan}"));
    }

    let summed: u64 = candidates.iter().map(|c| c.vote_count).sum();
    if summed != total_votes || ballots != total_votes {
        return Err(format!(
            "total_votes is {total_votes} but candidates sum to {summed} over {ballots} ballots"
        ));
    }
    Ok(())
}

/// Hex SHA-256 receipt binding a ballot to its election, voter, choice and time.
pub fn receipt(
    election: ElectionId,
    voter: PersonId,
    candidate: CandidateId,
    cast_at: DateTime<Utc>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(election.as_uuid().as_bytes());
    hasher.update(voter.as_uuid().as_bytes());
    hasher.update(candidate.as_uuid().as_bytes());
    hasher.update(cast_at.to_rfc3339().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VoteId;

    fn candidate(votes: u64) -> Candidate {
        Candidate {
            id: CandidateId::new(),
            person: PersonId::new(),
            statement: String::new(),
            vote_count: votes,
            registered_at: Utc::now(),
        }
    }

    fn ballot(candidate: CandidateId) -> Vote {
        Vote {
            id: VoteId::new(),
            voter: PersonId::new(),
            candidate,
            receipt: String::new(),
            cast_at: Utc::now(),
        }
    }

    #[test]
    fn test_strict_maximum_wins() {
        let a = candidate(3);
        let b = candidate(2);
        let decision = decide(&[a.clone(), b]);
        assert_eq!(
            decision,
            Decision::Winner {
                candidate: a.id,
                person: a.person,
                votes: 3
            }
        );
    }

    #[test]
    fn test_tie_and_no_contest() {
        let a = candidate(2);
        let b = candidate(2);
        let c = candidate(1);
        match decide(&[a.clone(), b.clone(), c]) {
            Decision::Tie { persons, votes } => {
                assert_eq!(votes, 2);
                assert_eq!(persons, vec![a.person, b.person]);
            }
            other => panic!("expected tie, got {other:?}"),
        }
        assert_eq!(decide(&[]), Decision::NoContest);
        assert_eq!(decide(&[candidate(0), candidate(0)]), Decision::NoContest);
    }

    #[test]
    fn test_verify_detects_drift() {
        let a = candidate(2);
        let b = candidate(1);
        let votes = vec![ballot(a.id), ballot(a.id), ballot(b.id)];
        assert!(verify(&[a.clone(), b.clone()], &votes, 3).is_ok());

        let mut stale = a.clone();
        stale.vote_count = 3;
        assert!(verify(&[stale, b.clone()], &votes, 3).is_err());
        assert!(verify(&[a, b], &votes, 4).is_err());
    }

    #[test]
    fn test_receipt_binds_inputs() {
        let election = ElectionId::new();
        let voter = PersonId::new();
        let candidate = CandidateId::new();
        let at = Utc::now();

        let r = receipt(election, voter, candidate, at);
        assert_eq!(r.len(), 64);
        assert_eq!(r, receipt(election, voter, candidate, at));
        assert_ne!(r, receipt(election, voter, CandidateId::new(), at));
    }
}
