//! Identifiers for the records the engines own.

use hierarchy::entity_id;

entity_id!(
    /// Identifier of an endorsement edge.
    EndorsementId
);
entity_id!(
    /// Identifier of an election.
    ElectionId
);
entity_id!(
    /// Identifier of a candidate within an election.
    CandidateId
);
entity_id!(
    /// Identifier of a cast vote.
    VoteId
);
entity_id!(
    /// Identifier of an SOS signal.
    SignalId
);
