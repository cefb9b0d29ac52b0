//! Aggregated figures over the results of an election: turnout, per-post
//! participation and margins, overall candidate rankings and short textual
//! insights.

pub use crate::config::*;

use log::debug;

/// A race is competitive when the two front-runners are at most this many
/// votes apart.
pub const COMPETITIVE_MARGIN: u64 = 2;

/// Number of entries in the rankings of a standard report.
pub const DEFAULT_RANKING_LIMIT: usize = 10;

/// The share of `part` in `whole`, as a whole percentage rounded half away
/// from zero. Zero when `whole` is zero.
pub fn percentage(part: u64, whole: u64) -> u32 {
    if whole == 0 {
        return 0;
    }
    ((part as f64) * 100.0 / (whole as f64)).round() as u32
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Overview {
    pub total_votes: u64,
    /// Percentage of the registered voters who have voted.
    pub voter_turnout: u32,
    pub active_positions: usize,
    pub total_candidates: usize,
    pub voted: usize,
    pub registered_voters: usize,
}

pub fn overview(results: &[PostResult], total_candidates: usize, voters: &[Voter]) -> Overview {
    let voted = voters.iter().filter(|v| v.voted).count();
    Overview {
        total_votes: results.iter().map(|r| r.total_votes).sum(),
        voter_turnout: percentage(voted as u64, voters.len() as u64),
        active_positions: results.len(),
        total_candidates,
        voted,
        registered_voters: voters.len(),
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CandidateShare {
    pub candidate: Candidate,
    pub votes: u64,
    /// Share of the votes of the post.
    pub percentage: u32,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct PositionPerformance {
    pub post: Post,
    pub total_votes: u64,
    /// Votes cast for this post relative to the registered voters.
    pub participation_rate: u32,
    /// The leader of the tally: `None` while no candidate has a vote.
    pub leading_candidate: Option<Candidate>,
    /// Difference between the two highest counts. The count of the only
    /// candidate if there is just one.
    pub margin: u64,
    /// In candidate order.
    pub candidates: Vec<CandidateShare>,
}

/// The gap between the two front-runners of a post.
pub fn margin(result: &PostResult) -> u64 {
    match result.ranked().as_slice() {
        [] => 0,
        [only] => only.votes,
        [first, second, ..] => first.votes - second.votes,
    }
}

pub fn position_performance(
    results: &[PostResult],
    registered_voters: usize,
) -> Vec<PositionPerformance> {
    results
        .iter()
        .map(|r| PositionPerformance {
            post: r.post.clone(),
            total_votes: r.total_votes,
            participation_rate: percentage(r.total_votes, registered_voters as u64),
            leading_candidate: r.leading_candidate.clone(),
            margin: margin(r),
            candidates: r
                .candidates
                .iter()
                .map(|ct| CandidateShare {
                    candidate: ct.candidate.clone(),
                    votes: ct.votes,
                    percentage: percentage(ct.votes, r.total_votes),
                })
                .collect(),
        })
        .collect()
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CandidateRanking {
    /// Starts at 1.
    pub rank: usize,
    pub candidate: Candidate,
    pub post_title: String,
    pub votes: u64,
    pub percentage: u32,
}

/// All the candidates of all the posts, from the most voted to the least
/// voted, keeping at most `limit` entries.
///
/// Equal counts keep the order of the posts, then the order of the candidates.
pub fn candidate_rankings(results: &[PostResult], limit: usize) -> Vec<CandidateRanking> {
    let mut all: Vec<(&PostResult, &CandidateTally)> = results
        .iter()
        .flat_map(|r| r.candidates.iter().map(move |ct| (r, ct)))
        .collect();
    all.sort_by(|(_, a), (_, b)| b.votes.cmp(&a.votes));
    all.iter()
        .take(limit)
        .enumerate()
        .map(|(idx, (r, ct))| CandidateRanking {
            rank: idx + 1,
            candidate: ct.candidate.clone(),
            post_title: r.post.title.clone(),
            votes: ct.votes,
            percentage: percentage(ct.votes, r.total_votes),
        })
        .collect()
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Insight {
    /// Turnout above 80%.
    HighEngagement(u32),
    /// Turnout above 50%.
    ModerateParticipation(u32),
    LowParticipation(u32),
    /// Number of posts where the front-runners are close.
    CompetitiveRaces(usize),
    /// Number of posts where at most one candidate received votes.
    UnopposedPositions(usize),
}

impl Insight {
    pub fn title(&self) -> &'static str {
        match self {
            Insight::HighEngagement(_) => "High Voter Engagement",
            Insight::ModerateParticipation(_) => "Moderate Participation",
            Insight::LowParticipation(_) => "Low Participation",
            Insight::CompetitiveRaces(_) => "Competitive Elections",
            Insight::UnopposedPositions(_) => "Unopposed Positions",
        }
    }

    pub fn description(&self) -> String {
        match self {
            Insight::HighEngagement(p) => format!(
                "Excellent turnout with {}% of registered voters participating.",
                p
            ),
            Insight::ModerateParticipation(p) => format!(
                "{}% voter turnout indicates room for improvement in engagement.",
                p
            ),
            Insight::LowParticipation(p) => format!(
                "Only {}% turnout suggests need for increased voter outreach.",
                p
            ),
            Insight::CompetitiveRaces(n) => format!(
                "{} position(s) have very close margins, indicating strong competition.",
                n
            ),
            Insight::UnopposedPositions(n) => format!(
                "{} position(s) have clear winners or limited competition.",
                n
            ),
        }
    }
}

pub fn is_competitive(result: &PostResult) -> bool {
    result.candidates.len() > 1 && margin(result) <= COMPETITIVE_MARGIN
}

pub fn is_unopposed(result: &PostResult) -> bool {
    result.candidates.iter().filter(|ct| ct.votes > 0).count() <= 1
}

pub fn insights(results: &[PostResult], voters: &[Voter]) -> Vec<Insight> {
    let voted = voters.iter().filter(|v| v.voted).count();
    let turnout = percentage(voted as u64, voters.len() as u64);
    let mut res = vec![if turnout > 80 {
        Insight::HighEngagement(turnout)
    } else if turnout > 50 {
        Insight::ModerateParticipation(turnout)
    } else {
        Insight::LowParticipation(turnout)
    }];

    let competitive = results.iter().filter(|r| is_competitive(r)).count();
    if competitive > 0 {
        res.push(Insight::CompetitiveRaces(competitive));
    }
    let unopposed = results.iter().filter(|r| is_unopposed(r)).count();
    if unopposed > 0 {
        res.push(Insight::UnopposedPositions(unopposed));
    }
    debug!("insights: {:?}", res);
    res
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct AnalyticsReport {
    pub summary: Overview,
    pub position_performance: Vec<PositionPerformance>,
    pub candidate_rankings: Vec<CandidateRanking>,
    pub insights: Vec<Insight>,
}

pub fn analyze(
    results: &[PostResult],
    total_candidates: usize,
    voters: &[Voter],
    ranking_limit: usize,
) -> AnalyticsReport {
    AnalyticsReport {
        summary: overview(results, total_candidates, voters),
        position_performance: position_performance(results, voters.len()),
        candidate_rankings: candidate_rankings(results, ranking_limit),
        insights: insights(results, voters),
    }
}
