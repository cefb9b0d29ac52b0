pub mod analytics;
pub mod builder;
mod config;
pub mod manual;

use log::{debug, info};

use std::{
    collections::HashMap,
    ops::AddAssign,
};

pub use crate::config::*;

// **** Private structures ****

#[derive(Eq, PartialEq, Debug, Clone, Copy, PartialOrd, Ord, Hash)]
struct VoteCount(u64);

impl VoteCount {
    const EMPTY: VoteCount = VoteCount(0);
    const ONE: VoteCount = VoteCount(1);
}

impl std::iter::Sum for VoteCount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        VoteCount(iter.map(|vc| vc.0).sum())
    }
}

impl AddAssign for VoteCount {
    fn add_assign(&mut self, rhs: VoteCount) {
        self.0 += rhs.0;
    }
}

/// Computes the tally of every post from a snapshot of the election.
///
/// Arguments:
/// * `posts` the posts to report on. The results come back in the same order.
/// * `candidates` all the registered candidates, in any order. The candidates
/// of a post are reported in the order they appear here.
/// * `ballots` the ballots cast so far.
///
/// A ballot selection that does not name a candidate of the post it is filed
/// under (unknown id, deleted candidate, candidate of another post) is not
/// counted. This is not an error: the rest of the ballot and of the
/// computation are unaffected.
///
/// ```
/// use vote_tally::*;
/// # use std::collections::BTreeMap;
///
/// let post = Post {
///     id: "p1".to_string(),
///     title: "President".to_string(),
///     description: "".to_string(),
///     created_at: None,
/// };
/// let alice = Candidate {
///     id: "c1".to_string(),
///     post_id: "p1".to_string(),
///     name: "Alice".to_string(),
///     slogan: "".to_string(),
///     image: None,
///     bio: None,
///     created_at: None,
/// };
/// let ballot = Ballot {
///     id: "b1".to_string(),
///     voter_id: None,
///     selections: BTreeMap::from([("p1".to_string(), "c1".to_string())]),
/// };
///
/// let results = compute_results(&[post], &[alice], &[ballot]);
/// assert_eq!(results[0].total_votes, 1);
/// assert_eq!(results[0].leading_candidate.as_ref().map(|c| c.name.as_str()), Some("Alice"));
/// ```
pub fn compute_results(
    posts: &[Post],
    candidates: &[Candidate],
    ballots: &[Ballot],
) -> Vec<PostResult> {
    info!(
        "compute_results: Processing {:?} posts, {:?} candidates, {:?} ballots",
        posts.len(),
        candidates.len(),
        ballots.len()
    );

    let results: Vec<PostResult> = posts
        .iter()
        .map(|post| tally_post(post, candidates, ballots))
        .collect();

    for r in results.iter() {
        info!("Post {} ({}): {} votes", r.post.id, r.post.title, r.total_votes);
        for ct in r.candidates.iter() {
            let lead = match &r.leading_candidate {
                Some(c) if c.id == ct.candidate.id => " -> leading",
                _ => "",
            };
            info!("      {} {}{}", ct.votes, ct.candidate.name, lead);
        }
    }
    results
}

fn tally_post(post: &Post, candidates: &[Candidate], ballots: &[Ballot]) -> PostResult {
    // The candidates of this post, in input order.
    let post_candidates: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| c.post_id == post.id)
        .collect();

    let tally = compute_tally(post, &post_candidates, ballots);
    debug!("tally_post: post {}: tally: {:?}", post.id, tally);

    let scored: Vec<(&Candidate, VoteCount)> = post_candidates
        .iter()
        .map(|c| {
            let vc = tally.get(c.id.as_str()).cloned().unwrap_or(VoteCount::EMPTY);
            (*c, vc)
        })
        .collect();

    // One counter per candidate id, so the total is taken over the counters.
    let total: VoteCount = tally.values().cloned().sum();

    let leader = find_leader(&scored);
    debug!("tally_post: post {}: leader: {:?}", post.id, leader);

    PostResult {
        post: post.clone(),
        candidates: scored
            .iter()
            .map(|(c, vc)| CandidateTally {
                candidate: (*c).clone(),
                votes: vc.0,
            })
            .collect(),
        total_votes: total.0,
        leading_candidate: leader.map(|(c, _)| c.clone()),
        leading_votes: leader.map(|(_, vc)| vc.0).unwrap_or(0),
    }
}

fn compute_tally<'a>(
    post: &Post,
    post_candidates: &[&'a Candidate],
    ballots: &[Ballot],
) -> HashMap<&'a str, VoteCount> {
    // Initialize the tally with all the candidates to capture the ones that
    // did not receive any vote.
    let mut tally: HashMap<&'a str, VoteCount> = HashMap::new();
    for c in post_candidates.iter() {
        tally.insert(c.id.as_str(), VoteCount::EMPTY);
    }
    for b in ballots.iter() {
        if let Some(cid) = b.selection_for(&post.id) {
            if let Some(vc) = tally.get_mut(cid) {
                *vc += VoteCount::ONE;
            } else {
                debug!(
                    "compute_tally: post {}: ballot {} selects {:?} which is not a candidate for this post, ignoring",
                    post.id, b.id, cid
                );
            }
        }
    }
    tally
}

/// Scans in candidate order. Only a strictly greater count replaces the
/// current leader, so the earliest candidate wins a tie.
fn find_leader<'a>(scored: &[(&'a Candidate, VoteCount)]) -> Option<(&'a Candidate, VoteCount)> {
    let mut leader: Option<&'a Candidate> = None;
    let mut leading_count = VoteCount::EMPTY;
    for (c, vc) in scored.iter() {
        if *vc > leading_count {
            leading_count = *vc;
            leader = Some(*c);
        }
    }
    leader.map(|c| (c, leading_count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn post(id: &str, title: &str) -> Post {
        Post {
            id: id.to_string(),
            title: title.to_string(),
            description: "".to_string(),
            created_at: None,
        }
    }

    fn cand(id: &str, post_id: &str, name: &str) -> Candidate {
        Candidate {
            id: id.to_string(),
            post_id: post_id.to_string(),
            name: name.to_string(),
            slogan: "".to_string(),
            image: None,
            bio: None,
            created_at: None,
        }
    }

    fn ballot(id: &str, selections: &[(&str, &str)]) -> Ballot {
        Ballot {
            id: id.to_string(),
            voter_id: None,
            selections: selections
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect::<BTreeMap<String, String>>(),
        }
    }

    fn votes_of(r: &PostResult) -> Vec<(String, u64)> {
        r.candidates
            .iter()
            .map(|ct| (ct.candidate.id.clone(), ct.votes))
            .collect()
    }

    fn president() -> (Vec<Post>, Vec<Candidate>) {
        (
            vec![post("p1", "President")],
            vec![cand("c1", "p1", "A"), cand("c2", "p1", "B")],
        )
    }

    #[test]
    fn simple_majority() {
        init();
        let (posts, candidates) = president();
        let ballots = vec![
            ballot("b1", &[("p1", "c1")]),
            ballot("b2", &[("p1", "c1")]),
            ballot("b3", &[("p1", "c2")]),
        ];
        let res = compute_results(&posts, &candidates, &ballots);
        assert_eq!(res.len(), 1);
        let r = &res[0];
        assert_eq!(r.total_votes, 3);
        assert_eq!(
            votes_of(r),
            vec![("c1".to_string(), 2), ("c2".to_string(), 1)]
        );
        assert_eq!(r.leading_candidate, Some(candidates[0].clone()));
        assert_eq!(r.leading_votes, 2);
        assert!(!r.is_tied());
    }

    #[test]
    fn no_ballots() {
        init();
        let (posts, candidates) = president();
        let res = compute_results(&posts, &candidates, &[]);
        let r = &res[0];
        assert_eq!(r.total_votes, 0);
        assert!(r.candidates.iter().all(|ct| ct.votes == 0));
        assert_eq!(r.leading_candidate, None);
        assert_eq!(r.leading_votes, 0);
        assert!(r.tied_leaders().is_empty());
    }

    #[test]
    fn unknown_candidate_is_ignored() {
        init();
        let (posts, candidates) = president();
        let ballots = vec![
            ballot("b1", &[("p1", "c1")]),
            ballot("b2", &[("p1", "c9")]),
        ];
        let r = &compute_results(&posts, &candidates, &ballots)[0];
        assert_eq!(r.total_votes, 1);
        assert_eq!(
            votes_of(r),
            vec![("c1".to_string(), 1), ("c2".to_string(), 0)]
        );
    }

    #[test]
    fn tie_goes_to_first_candidate() {
        init();
        let (posts, candidates) = president();
        let ballots = vec![
            ballot("b1", &[("p1", "c2")]),
            ballot("b2", &[("p1", "c2")]),
            ballot("b3", &[("p1", "c1")]),
            ballot("b4", &[("p1", "c1")]),
        ];
        let r = &compute_results(&posts, &candidates, &ballots)[0];
        assert_eq!(r.leading_candidate.as_ref().map(|c| c.id.as_str()), Some("c1"));
        assert_eq!(r.leading_votes, 2);
        assert!(r.is_tied());
        let tied: Vec<&str> = r.tied_leaders().into_iter().map(|c| c.id.as_str()).collect();
        assert_eq!(tied, vec!["c1", "c2"]);
    }

    #[test]
    fn tie_follows_candidate_order_not_ids() {
        init();
        let posts = vec![post("p1", "President")];
        let candidates = vec![cand("zz", "p1", "Z"), cand("aa", "p1", "A")];
        let ballots = vec![ballot("b1", &[("p1", "aa")]), ballot("b2", &[("p1", "zz")])];
        let r = &compute_results(&posts, &candidates, &ballots)[0];
        assert_eq!(r.leading_candidate.as_ref().map(|c| c.id.as_str()), Some("zz"));
    }

    #[test]
    fn results_follow_post_order() {
        init();
        let posts = vec![
            post("p3", "Treasurer"),
            post("p1", "President"),
            post("p2", "Secretary"),
        ];
        let candidates = vec![
            cand("c1", "p1", "A"),
            cand("c3", "p3", "C"),
            cand("c2", "p2", "B"),
            cand("c4", "p1", "D"),
        ];
        let res = compute_results(&posts, &candidates, &[]);
        let ids: Vec<&str> = res.iter().map(|r| r.post.id.as_str()).collect();
        assert_eq!(ids, vec!["p3", "p1", "p2"]);
        let p1: Vec<&str> = res[1]
            .candidates
            .iter()
            .map(|ct| ct.candidate.id.as_str())
            .collect();
        assert_eq!(p1, vec!["c1", "c4"]);
    }

    #[test]
    fn cross_post_selection_is_ignored() {
        init();
        let posts = vec![post("p1", "President"), post("p2", "Secretary")];
        let candidates = vec![cand("c1", "p1", "A"), cand("c2", "p2", "B")];
        // c2 runs for p2, not p1.
        let ballots = vec![
            ballot("b1", &[("p1", "c2"), ("p2", "c2")]),
            ballot("b2", &[("p2", "c2")]),
        ];
        let res = compute_results(&posts, &candidates, &ballots);
        assert_eq!(res[0].total_votes, 0);
        assert_eq!(res[0].leading_candidate, None);
        assert_eq!(res[1].total_votes, 2);
        assert_eq!(res[1].leading_votes, 2);
    }

    #[test]
    fn partial_ballots_and_unknown_posts() {
        init();
        let posts = vec![post("p1", "President"), post("p2", "Secretary")];
        let candidates = vec![
            cand("c1", "p1", "A"),
            cand("c2", "p1", "B"),
            cand("c3", "p2", "C"),
        ];
        let ballots = vec![
            ballot("b1", &[("p1", "c2")]),
            ballot("b2", &[("p2", "c3"), ("p9", "c1")]),
            ballot("b3", &[]),
        ];
        let res = compute_results(&posts, &candidates, &ballots);
        assert_eq!(res[0].total_votes, 1);
        assert_eq!(res[0].leading_candidate.as_ref().map(|c| c.id.as_str()), Some("c2"));
        assert_eq!(res[1].total_votes, 1);
    }

    #[test]
    fn conservation_and_bounds() {
        init();
        let posts = vec![post("p1", "President"), post("p2", "Secretary")];
        let candidates = vec![
            cand("c1", "p1", "A"),
            cand("c2", "p1", "B"),
            cand("c3", "p1", "C"),
            cand("c4", "p2", "D"),
            cand("c5", "p2", "E"),
        ];
        let choices_p1 = ["c1", "c2", "c3", "c4", "nobody"];
        let choices_p2 = ["c4", "c5", "c1"];
        let mut ballots: Vec<Ballot> = Vec::new();
        for i in 0..40 {
            let mut sel: Vec<(&str, &str)> = Vec::new();
            if i % 3 != 0 {
                sel.push(("p1", choices_p1[i % choices_p1.len()]));
            }
            if i % 4 != 0 {
                sel.push(("p2", choices_p2[(i * 7) % choices_p2.len()]));
            }
            ballots.push(ballot(&format!("b{}", i), &sel));
        }

        let res = compute_results(&posts, &candidates, &ballots);
        assert_eq!(res.len(), posts.len());
        for r in res.iter() {
            let valid: Vec<&str> = candidates
                .iter()
                .filter(|c| c.post_id == r.post.id)
                .map(|c| c.id.as_str())
                .collect();
            let expected = ballots
                .iter()
                .filter(|b| {
                    b.selection_for(&r.post.id)
                        .map(|cid| valid.contains(&cid))
                        .unwrap_or(false)
                })
                .count() as u64;
            assert_eq!(r.total_votes, expected);
            assert_eq!(
                r.total_votes,
                r.candidates.iter().map(|ct| ct.votes).sum::<u64>()
            );
            let max = r.candidates.iter().map(|ct| ct.votes).max().unwrap_or(0);
            assert_eq!(r.leading_votes, max);
            assert_eq!(r.leading_candidate.is_none(), r.leading_votes == 0);
            assert!(r.candidates.iter().all(|ct| ct.votes <= ballots.len() as u64));
        }
    }

    #[test]
    fn empty_snapshot() {
        init();
        assert!(compute_results(&[], &[], &[]).is_empty());
        let posts = vec![post("p1", "President")];
        let r = &compute_results(&posts, &[], &[ballot("b1", &[("p1", "c1")])])[0];
        assert!(r.candidates.is_empty());
        assert_eq!(r.total_votes, 0);
        assert_eq!(r.leading_candidate, None);
    }

    #[test]
    fn deterministic() {
        init();
        let (posts, candidates) = president();
        let ballots = vec![
            ballot("b1", &[("p1", "c2")]),
            ballot("b2", &[("p1", "c1")]),
        ];
        let r1 = compute_results(&posts, &candidates, &ballots);
        let r2 = compute_results(&posts, &candidates, &ballots);
        assert_eq!(r1, r2);
    }
}
