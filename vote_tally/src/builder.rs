pub use crate::config::*;

use std::collections::{BTreeMap, HashSet};

use log::debug;

/// A builder that checks the consistency of a snapshot before tallying it.
///
/// The tally accepts any snapshot and silently drops the selections it cannot
/// resolve. The builder is the place where duplicated ids and candidates
/// without a post are rejected instead.
///
/// ```
/// pub use vote_tally::builder::Builder;
/// # use vote_tally::*;
///
/// let mut builder = Builder::new();
/// builder.add_post(Post {
///     id: "p1".to_string(),
///     title: "President".to_string(),
///     description: "".to_string(),
///     created_at: None,
/// })?;
/// builder.add_candidate(Candidate {
///     id: "anna".to_string(),
///     post_id: "p1".to_string(),
///     name: "Anna".to_string(),
///     slogan: "".to_string(),
///     image: None,
///     bio: None,
///     created_at: None,
/// })?;
///
/// builder.add_vote_simple(&[("p1", "anna")])?;
///
/// let results = builder.results();
/// assert_eq!(results[0].leading_votes, 1);
///
/// # Ok::<(), TallyErrors>(())
/// ```
#[derive(Debug, Default)]
pub struct Builder {
    pub(crate) _posts: Vec<Post>,
    pub(crate) _candidates: Vec<Candidate>,
    pub(crate) _ballots: Vec<Ballot>,
    post_ids: HashSet<String>,
    candidate_ids: HashSet<String>,
    ballot_ids: HashSet<String>,
    voter_ids: HashSet<String>,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    pub fn add_post(&mut self, post: Post) -> Result<(), TallyErrors> {
        if !self.post_ids.insert(post.id.clone()) {
            return Err(TallyErrors::DuplicatePost(post.id));
        }
        self._posts.push(post);
        Ok(())
    }

    /// Adds a candidate. Its post must have been added before.
    pub fn add_candidate(&mut self, candidate: Candidate) -> Result<(), TallyErrors> {
        if !self.post_ids.contains(&candidate.post_id) {
            return Err(TallyErrors::UnknownPost {
                candidate_id: candidate.id,
                post_id: candidate.post_id,
            });
        }
        if !self.candidate_ids.insert(candidate.id.clone()) {
            return Err(TallyErrors::DuplicateCandidate(candidate.id));
        }
        self._candidates.push(candidate);
        Ok(())
    }

    /// Adds a ballot.
    ///
    /// Each voter may only cast one ballot. The selections are kept as given,
    /// even if they point to unknown posts or candidates.
    pub fn add_ballot(&mut self, ballot: Ballot) -> Result<(), TallyErrors> {
        if self.ballot_ids.contains(&ballot.id) {
            return Err(TallyErrors::DuplicateBallot(ballot.id));
        }
        if let Some(voter_id) = ballot.voter_id.as_ref() {
            if !self.voter_ids.insert(voter_id.clone()) {
                return Err(TallyErrors::DuplicateVoter(voter_id.clone()));
            }
        }
        self.ballot_ids.insert(ballot.id.clone());
        debug!("add_ballot: {:?}", ballot);
        self._ballots.push(ballot);
        Ok(())
    }

    /// Adds an anonymous ballot from (post id, candidate id) pairs.
    ///
    /// It is the simplest use case for most cases. If a post appears more
    /// than once, the last selection is kept.
    pub fn add_vote_simple(&mut self, selections: &[(&str, &str)]) -> Result<(), TallyErrors> {
        let id = format!("ballot-{:08}", self._ballots.len() + 1);
        let selections: BTreeMap<String, String> = selections
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect();
        self.add_ballot(Ballot {
            id,
            voter_id: None,
            selections,
        })
    }

    pub fn posts(&self) -> &[Post] {
        &self._posts
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self._candidates
    }

    pub fn ballots(&self) -> &[Ballot] {
        &self._ballots
    }

    /// Runs the tally over the current snapshot.
    pub fn results(&self) -> Vec<PostResult> {
        crate::compute_results(&self._posts, &self._candidates, &self._ballots)
    }
}
