use log::{debug, info, warn};

use vote_tally::analytics::{self, AnalyticsReport, Insight};
use vote_tally::*;
use snafu::prelude::*;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::{Args, Command};
use crate::dashboard::records::*;
use crate::dashboard::store::Store;

pub mod records;
pub mod store;

#[derive(Debug, Snafu)]
pub enum DashError {
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing file {path}"))]
    WritingJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing the JSON content of {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error serializing to JSON"))]
    SerializingJson { source: serde_json::Error },
    #[snafu(display("Error locking {path}"))]
    Locking {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("The store {path} already exists"))]
    StoreExists { path: String },

    #[snafu(display("Document {id} in {collection} has no {field}"))]
    MissingField {
        collection: String,
        id: String,
        field: String,
    },
    #[snafu(display("Document {id} in {collection} has an invalid createdAt timestamp"))]
    InvalidTimestamp { collection: String, id: String },
    #[snafu(display("The store does not describe a consistent election"))]
    Inconsistent { source: TallyErrors },

    #[snafu(display("The {name} may not be empty"))]
    EmptyArgument { name: String },
    #[snafu(display("Unknown post {id}"))]
    UnknownPost { id: String },
    #[snafu(display("Unknown candidate {id}"))]
    UnknownCandidate { id: String },
    #[snafu(display("Unknown voter {id}"))]
    UnknownVoter { id: String },
    #[snafu(display("Candidate {candidate} does not run for post {post}"))]
    CandidatePostMismatch { candidate: String, post: String },
    #[snafu(display("Student code {code} already exists"))]
    DuplicateStudentCode { code: String },
    #[snafu(display("Invalid student credentials"))]
    InvalidCredentials {},
    #[snafu(display("Student {code} has already voted"))]
    AlreadyVoted { code: String },
    #[snafu(display("A ballot needs at least one selection"))]
    EmptyBallot {},
    #[snafu(display("Cannot read selection {raw:?}, expected POST=CANDIDATE"))]
    InvalidSelection { raw: String },
    #[snafu(display("Post {post} is selected more than once"))]
    DuplicateSelection { post: String },

    #[snafu(display("Difference detected between the calculated report and the reference {path}"))]
    ReferenceMismatch { path: String },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type DashResult<T> = Result<T, DashError>;

fn timestamp_to_json(ts: &Option<DateTime<Utc>>) -> JSValue {
    match ts {
        Some(dt) => json!(dt.to_rfc3339()),
        None => JSValue::Null,
    }
}

fn post_to_json(p: &Post) -> JSValue {
    json!({
        "id": p.id,
        "title": p.title,
        "description": p.description,
        "createdAt": timestamp_to_json(&p.created_at),
    })
}

fn candidate_to_json(c: &Candidate) -> JSMap<String, JSValue> {
    let mut m: JSMap<String, JSValue> = JSMap::new();
    m.insert("id".to_string(), json!(c.id));
    m.insert("postId".to_string(), json!(c.post_id));
    m.insert("name".to_string(), json!(c.name));
    m.insert("slogan".to_string(), json!(c.slogan));
    m.insert("image".to_string(), json!(c.image));
    m.insert("bio".to_string(), json!(c.bio));
    m.insert("createdAt".to_string(), timestamp_to_json(&c.created_at));
    m
}

fn result_to_json(r: &PostResult) -> JSValue {
    let candidates: Vec<JSValue> = r
        .candidates
        .iter()
        .map(|ct| {
            let mut m = candidate_to_json(&ct.candidate);
            m.insert("votes".to_string(), json!(ct.votes));
            JSValue::Object(m)
        })
        .collect();
    let leading = match &r.leading_candidate {
        Some(c) => JSValue::Object(candidate_to_json(c)),
        None => JSValue::Null,
    };
    let tied: Vec<&str> = r.tied_leaders().into_iter().map(|c| c.id.as_str()).collect();
    json!({
        "post": post_to_json(&r.post),
        "candidates": candidates,
        "totalVotes": r.total_votes,
        "leadingCandidate": leading,
        "leadingVotes": r.leading_votes,
        "tiedLeaders": tied,
    })
}

pub fn results_to_json(results: &[PostResult]) -> JSValue {
    let l: Vec<JSValue> = results.iter().map(result_to_json).collect();
    json!({ "results": l })
}

fn insight_to_json(i: &Insight) -> JSValue {
    json!({"title": i.title(), "description": i.description()})
}

pub fn analytics_to_json(
    report: &AnalyticsReport,
    results: &[PostResult],
    generated_at: DateTime<Utc>,
) -> JSValue {
    let s = &report.summary;
    let performance: Vec<JSValue> = report
        .position_performance
        .iter()
        .map(|pp| {
            let candidates: Vec<JSValue> = pp
                .candidates
                .iter()
                .map(|cs| {
                    json!({
                        "name": cs.candidate.name,
                        "votes": cs.votes,
                        "percentage": cs.percentage,
                    })
                })
                .collect();
            json!({
                "position": pp.post.title,
                "totalVotes": pp.total_votes,
                "participationRate": pp.participation_rate,
                "leadingCandidate": pp.leading_candidate.as_ref().map(|c| c.name.clone()),
                "margin": pp.margin,
                "candidates": candidates,
            })
        })
        .collect();
    let rankings: Vec<JSValue> = report
        .candidate_rankings
        .iter()
        .map(|cr| {
            json!({
                "rank": cr.rank,
                "name": cr.candidate.name,
                "position": cr.post_title,
                "votes": cr.votes,
                "percentage": cr.percentage,
            })
        })
        .collect();
    let insights: Vec<JSValue> = report.insights.iter().map(insight_to_json).collect();
    let per_post: Vec<JSValue> = results.iter().map(result_to_json).collect();
    json!({
        "generatedAt": generated_at.to_rfc3339(),
        "summary": {
            "totalVotes": s.total_votes,
            "voterTurnout": s.voter_turnout,
            "activePositions": s.active_positions,
            "totalCandidates": s.total_candidates,
            "votedStudents": s.voted,
            "registeredVoters": s.registered_voters,
        },
        "results": per_post,
        "detailedAnalysis": {
            "positionPerformance": performance,
            "candidateRankings": rankings,
            "insights": insights,
        }
    })
}

/// Reads `POST=CANDIDATE` pairs.
pub fn parse_selections(raw: &[String]) -> DashResult<BTreeMap<String, String>> {
    let mut res: BTreeMap<String, String> = BTreeMap::new();
    for s in raw.iter() {
        let (post, candidate) = match s.split_once('=') {
            Some((p, c)) if !p.trim().is_empty() && !c.trim().is_empty() => {
                (p.trim().to_string(), c.trim().to_string())
            }
            _ => return InvalidSelectionSnafu { raw: s.clone() }.fail(),
        };
        ensure!(
            !res.contains_key(&post),
            DuplicateSelectionSnafu { post }
        );
        res.insert(post, candidate);
    }
    Ok(res)
}

/// Prints the report, or writes it to a file. Returns the pretty-printed
/// JSON.
fn write_output(js: &JSValue, out: &Option<String>) -> DashResult<String> {
    let pretty = serde_json::to_string_pretty(js).context(SerializingJsonSnafu {})?;
    match out.as_deref() {
        None | Some("stdout") => println!("{}", pretty),
        Some(path) => {
            fs::write(path, &pretty).context(WritingJsonSnafu { path })?;
            info!("Wrote report to {}", path);
        }
    }
    Ok(pretty)
}

/// Compares a report with a reference report. The keys do not need to be in
/// the same order.
fn check_reference(pretty: &str, reference_path: &str) -> DashResult<()> {
    let contents = fs::read_to_string(reference_path).context(OpeningJsonSnafu {
        path: reference_path,
    })?;
    let reference: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {
        path: reference_path,
    })?;
    let pretty_reference =
        serde_json::to_string_pretty(&reference).context(SerializingJsonSnafu {})?;
    if pretty_reference != pretty {
        warn!("Found differences with the reference {}", reference_path);
        print_diff(pretty_reference.as_str(), pretty, "\n");
        return ReferenceMismatchSnafu {
            path: reference_path,
        }
        .fail();
    }
    info!("The report matches the reference {}", reference_path);
    Ok(())
}

fn list(snapshot: &Snapshot) {
    for p in snapshot.posts.iter() {
        println!("{}\t{}", p.id, p.title);
        for c in snapshot.candidates.iter().filter(|c| c.post_id == p.id) {
            println!("  {}\t{}\t{}", c.id, c.name, c.slogan);
        }
    }
    for v in snapshot.voters.iter() {
        let status = if v.voted { "voted" } else { "not voted" };
        println!("{}\t{}\t{}\t{}", v.id, v.student_code, v.name, status);
    }
}

pub fn run_command(args: &Args) -> DashResult<()> {
    let path = Path::new(args.store.as_str());
    debug!("run_command: store: {:?} command: {:?}", path, args.command);
    match &args.command {
        Command::Init => {
            Store::init(path)?;
        }
        Command::AddPost { title, description } => {
            let mut store = Store::open(path)?;
            let id = store.add_post(title, description)?;
            store.save()?;
            println!("{}", id);
        }
        Command::DeletePost { id } => {
            let mut store = Store::open(path)?;
            store.delete_post(id)?;
            store.save()?;
        }
        Command::AddCandidate {
            post,
            name,
            slogan,
            image,
            bio,
        } => {
            let mut store = Store::open(path)?;
            let id =
                store.add_candidate(post, name, slogan, image.as_deref(), bio.as_deref())?;
            store.save()?;
            println!("{}", id);
        }
        Command::DeleteCandidate { id } => {
            let mut store = Store::open(path)?;
            store.delete_candidate(id)?;
            store.save()?;
        }
        Command::AddVoter {
            name,
            student_code,
            password,
        } => {
            let mut store = Store::open(path)?;
            let id = store.add_voter(name, student_code, password)?;
            store.save()?;
            println!("{}", id);
        }
        Command::DeleteVoter { id } => {
            let mut store = Store::open(path)?;
            store.delete_voter(id)?;
            store.save()?;
        }
        Command::Vote {
            student_code,
            password,
            selections,
        } => {
            let selections = parse_selections(selections)?;
            let mut store = Store::open(path)?;
            let id = store.cast_ballot(student_code, password, &selections)?;
            store.save()?;
            println!("{}", id);
        }
        Command::ResetVotes { yes } => {
            if !yes {
                whatever!("Resetting removes all the ballots, pass --yes to confirm")
            }
            let mut store = Store::open(path)?;
            let removed = store.reset_votes();
            store.save()?;
            println!("{}", removed);
        }
        Command::List => {
            let store = Store::open(path)?;
            list(&store.snapshot()?);
        }
        Command::Results { out, reference } => {
            let store = Store::open(path)?;
            let results = store.snapshot()?.results();
            let pretty = write_output(&results_to_json(&results), out)?;
            if let Some(reference_path) = reference {
                check_reference(&pretty, reference_path)?;
            }
        }
        Command::Analytics { out, top } => {
            let store = Store::open(path)?;
            let snapshot = store.snapshot()?;
            let results = snapshot.results();
            let report = analytics::analyze(
                &results,
                snapshot.candidates.len(),
                &snapshot.voters,
                *top,
            );
            write_output(&analytics_to_json(&report, &results, Utc::now()), out)?;
        }
    }
    Ok(())
}
