// Store documents, as written by the dashboard, and their conversion into
// the entities of the tally.

use crate::dashboard::*;

use chrono::{DateTime, TimeZone, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use std::collections::BTreeMap;
use vote_tally::builder::Builder;

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostDoc {
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<JSValue>,
    // Fields this program does not know about are kept as they are.
    #[serde(flatten)]
    pub extra: JSMap<String, JSValue>,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateDoc {
    pub id: Option<String>,
    #[serde(rename = "postId")]
    pub post_id: Option<String>,
    pub name: Option<String>,
    pub slogan: Option<String>,
    pub image: Option<String>,
    pub bio: Option<String>,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<JSValue>,
    #[serde(flatten)]
    pub extra: JSMap<String, JSValue>,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoterDoc {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "studentCode")]
    pub student_code: Option<String>,
    /// Only found in older exports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(rename = "passwordHash", default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    pub voted: Option<bool>,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<JSValue>,
    #[serde(flatten)]
    pub extra: JSMap<String, JSValue>,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoteDoc {
    pub id: Option<String>,
    #[serde(rename = "voterId")]
    pub voter_id: Option<String>,
    /// post id -> candidate id
    pub votes: Option<JSMap<String, JSValue>>,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<JSValue>,
    #[serde(flatten)]
    pub extra: JSMap<String, JSValue>,
}

/// The content of a store file.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Documents {
    #[serde(default)]
    pub posts: Vec<PostDoc>,
    #[serde(default)]
    pub candidates: Vec<CandidateDoc>,
    #[serde(default)]
    pub voters: Vec<VoterDoc>,
    #[serde(default)]
    pub votes: Vec<VoteDoc>,
    #[serde(rename = "nextId", default)]
    pub next_id: u64,
    #[serde(flatten)]
    pub extra: JSMap<String, JSValue>,
}

/// A consistent view of the election, ready to be tallied.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Snapshot {
    /// In creation order.
    pub posts: Vec<Post>,
    /// In creation order.
    pub candidates: Vec<Candidate>,
    /// In creation order.
    pub voters: Vec<Voter>,
    pub ballots: Vec<Ballot>,
}

impl Snapshot {
    pub fn results(&self) -> Vec<PostResult> {
        compute_results(&self.posts, &self.candidates, &self.ballots)
    }
}

pub fn password_digest(student_code: &str, password: &str) -> String {
    sha256::digest(format!("{}:{}", student_code, password))
}

impl VoterDoc {
    pub fn check_password(&self, password: &str) -> bool {
        match (&self.student_code, &self.password_hash, &self.password) {
            (Some(code), Some(hash), _) => *hash == password_digest(code, password),
            (_, None, Some(plain)) => plain == password,
            _ => false,
        }
    }
}

fn required(
    x: &Option<String>,
    collection: &'static str,
    id: &str,
    field: &'static str,
) -> DashResult<String> {
    match x {
        Some(s) if !s.trim().is_empty() => Ok(s.clone()),
        _ => MissingFieldSnafu {
            collection,
            id,
            field,
        }
        .fail(),
    }
}

fn doc_id(x: &Option<String>, collection: &'static str) -> DashResult<String> {
    required(x, collection, "<no id>", "id")
}

fn non_empty(x: &Option<String>) -> Option<String> {
    match x {
        Some(s) if s.trim().is_empty() => None,
        x => x.clone(),
    }
}

/// Reads the timestamps found in the store: RFC 3339 strings, milliseconds
/// since the epoch or `{seconds, nanoseconds}` objects.
pub fn read_timestamp(
    x: &Option<JSValue>,
    collection: &'static str,
    id: &str,
) -> DashResult<Option<DateTime<Utc>>> {
    let ts: Option<DateTime<Utc>> = match x {
        None | Some(JSValue::Null) => return Ok(None),
        Some(JSValue::String(s)) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Some(JSValue::Number(n)) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Some(JSValue::Object(obj)) => {
            let seconds = obj.get("seconds").and_then(|v| v.as_i64());
            let nanos = match obj.get("nanoseconds") {
                None => Some(0),
                Some(v) => v.as_u64().and_then(|n| u32::try_from(n).ok()),
            };
            seconds
                .zip(nanos)
                .and_then(|(s, n)| Utc.timestamp_opt(s, n).single())
        }
        Some(_) => None,
    };
    ts.map(Some)
        .context(InvalidTimestampSnafu { collection, id })
}

/// Sorts by creation time. Documents without a timestamp come last, in
/// their original order.
fn in_creation_order<T>(items: &mut [T], created_at: impl Fn(&T) -> Option<DateTime<Utc>>) {
    items.sort_by_key(|x| {
        let ts = created_at(x);
        (ts.is_none(), ts)
    });
}

impl PostDoc {
    pub fn to_post(&self) -> DashResult<Post> {
        let id = doc_id(&self.id, "posts")?;
        Ok(Post {
            title: required(&self.title, "posts", &id, "title")?,
            description: self.description.clone().unwrap_or_default(),
            created_at: read_timestamp(&self.created_at, "posts", &id)?,
            id,
        })
    }
}

impl CandidateDoc {
    pub fn to_candidate(&self) -> DashResult<Candidate> {
        let id = doc_id(&self.id, "candidates")?;
        Ok(Candidate {
            post_id: required(&self.post_id, "candidates", &id, "postId")?,
            name: required(&self.name, "candidates", &id, "name")?,
            slogan: self.slogan.clone().unwrap_or_default(),
            image: non_empty(&self.image),
            bio: non_empty(&self.bio),
            created_at: read_timestamp(&self.created_at, "candidates", &id)?,
            id,
        })
    }
}

impl VoterDoc {
    pub fn to_voter(&self) -> DashResult<Voter> {
        let id = doc_id(&self.id, "voters")?;
        Ok(Voter {
            name: required(&self.name, "voters", &id, "name")?,
            student_code: required(&self.student_code, "voters", &id, "studentCode")?,
            voted: self.voted.unwrap_or(false),
            created_at: read_timestamp(&self.created_at, "voters", &id)?,
            id,
        })
    }
}

impl VoteDoc {
    pub fn to_ballot(&self) -> DashResult<Ballot> {
        let id = doc_id(&self.id, "votes")?;
        let mut selections: BTreeMap<String, String> = BTreeMap::new();
        // A vote document without selections is an empty ballot.
        for (post_id, v) in self.votes.iter().flatten() {
            match v {
                JSValue::String(cid) => {
                    selections.insert(post_id.clone(), cid.clone());
                }
                JSValue::Null => {}
                x => {
                    warn!(
                        "to_ballot: vote {}: skipping selection for post {}: {:?}",
                        id, post_id, x
                    );
                }
            }
        }
        Ok(Ballot {
            id,
            voter_id: non_empty(&self.voter_id),
            selections,
        })
    }
}

impl Documents {
    /// Converts all the documents and checks that they form a consistent
    /// election.
    ///
    /// Candidates whose post no longer exists are left out. Duplicated ids and
    /// voters with more than one ballot are errors.
    pub fn snapshot(&self) -> DashResult<Snapshot> {
        let mut posts: Vec<Post> = self
            .posts
            .iter()
            .map(|d| d.to_post())
            .collect::<DashResult<Vec<Post>>>()?;
        in_creation_order(&mut posts, |p| p.created_at);

        let mut candidates: Vec<Candidate> = self
            .candidates
            .iter()
            .map(|d| d.to_candidate())
            .collect::<DashResult<Vec<Candidate>>>()?;
        in_creation_order(&mut candidates, |c| c.created_at);

        let mut voters: Vec<Voter> = self
            .voters
            .iter()
            .map(|d| d.to_voter())
            .collect::<DashResult<Vec<Voter>>>()?;
        in_creation_order(&mut voters, |v| v.created_at);

        let ballots: Vec<Ballot> = self
            .votes
            .iter()
            .map(|d| d.to_ballot())
            .collect::<DashResult<Vec<Ballot>>>()?;

        let mut builder = Builder::new();
        for p in posts {
            builder.add_post(p).context(InconsistentSnafu {})?;
        }
        for c in candidates {
            match builder.add_candidate(c) {
                Err(TallyErrors::UnknownPost {
                    candidate_id,
                    post_id,
                }) => {
                    warn!(
                        "snapshot: skipping candidate {}: post {} does not exist",
                        candidate_id, post_id
                    );
                }
                x => x.context(InconsistentSnafu {})?,
            }
        }
        for b in ballots {
            builder.add_ballot(b).context(InconsistentSnafu {})?;
        }
        debug!(
            "snapshot: {} posts, {} candidates, {} voters, {} ballots",
            builder.posts().len(),
            builder.candidates().len(),
            voters.len(),
            builder.ballots().len()
        );

        Ok(Snapshot {
            posts: builder.posts().to_vec(),
            candidates: builder.candidates().to_vec(),
            voters,
            ballots: builder.ballots().to_vec(),
        })
    }
}
