// ********* Input data structures ***********

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::Display;

use chrono::{DateTime, Utc};

/// An electable position.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Not set when the store has not stamped the document yet.
    pub created_at: Option<DateTime<Utc>>,
}

/// A person contesting exactly one post.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Candidate {
    pub id: String,
    pub post_id: String,
    pub name: String,
    pub slogan: String,
    /// A reference (usually a URL) to a picture of the candidate.
    pub image: Option<String>,
    pub bio: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// One voter's submission: at most one candidate per post.
///
/// A ballot may leave some posts out. Selections are not checked against the
/// candidates when the ballot is built; the tally ignores the ones that do not
/// resolve.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct Ballot {
    pub id: String,
    pub voter_id: Option<String>,
    /// post id -> candidate id
    pub selections: BTreeMap<String, String>,
}

impl Ballot {
    pub fn selection_for(&self, post_id: &str) -> Option<&str> {
        self.selections.get(post_id).map(|s| s.as_str())
    }
}

/// A registered voter. Only used for turnout figures.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Voter {
    pub id: String,
    pub name: String,
    pub student_code: String,
    pub voted: bool,
    pub created_at: Option<DateTime<Utc>>,
}

// ******** Output data structures *********

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CandidateTally {
    pub candidate: Candidate,
    pub votes: u64,
}

/// The tally of a single post.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct PostResult {
    pub post: Post,
    /// In the same relative order as the candidates given to the engine.
    pub candidates: Vec<CandidateTally>,
    pub total_votes: u64,
    /// The first candidate (in candidate order) with the highest non-zero count.
    pub leading_candidate: Option<Candidate>,
    pub leading_votes: u64,
}

impl PostResult {
    /// All the candidates that share the leading count.
    ///
    /// Empty when nobody received a vote. Contains more than one candidate
    /// exactly when the leader was chosen by candidate order.
    pub fn tied_leaders(&self) -> Vec<&Candidate> {
        if self.leading_votes == 0 {
            return Vec::new();
        }
        self.candidates
            .iter()
            .filter(|ct| ct.votes == self.leading_votes)
            .map(|ct| &ct.candidate)
            .collect()
    }

    pub fn is_tied(&self) -> bool {
        self.tied_leaders().len() > 1
    }

    /// Vote counts sorted from the highest to the lowest. Candidates with the
    /// same count keep their relative order.
    pub fn ranked(&self) -> Vec<&CandidateTally> {
        let mut res: Vec<&CandidateTally> = self.candidates.iter().collect();
        res.sort_by(|a, b| b.votes.cmp(&a.votes));
        res
    }
}

/// Errors raised when assembling a snapshot with the builder.
///
/// The tally itself never fails.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum TallyErrors {
    DuplicatePost(String),
    DuplicateCandidate(String),
    /// A candidate refers to a post that is not part of the snapshot.
    UnknownPost { candidate_id: String, post_id: String },
    DuplicateBallot(String),
    /// The voter already has a ballot in the snapshot.
    DuplicateVoter(String),
}

impl Error for TallyErrors {}

impl Display for TallyErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TallyErrors::DuplicatePost(id) => write!(f, "post {} is defined twice", id),
            TallyErrors::DuplicateCandidate(id) => {
                write!(f, "candidate {} is defined twice", id)
            }
            TallyErrors::UnknownPost {
                candidate_id,
                post_id,
            } => write!(
                f,
                "candidate {} refers to unknown post {}",
                candidate_id, post_id
            ),
            TallyErrors::DuplicateBallot(id) => write!(f, "ballot {} is defined twice", id),
            TallyErrors::DuplicateVoter(id) => {
                write!(f, "voter {} has already cast a ballot", id)
            }
        }
    }
}
