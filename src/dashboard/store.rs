use crate::dashboard::records::*;
use crate::dashboard::*;

use chrono::Utc;
use fs2::FileExt;
use log::{debug, info, warn};
use serde_json::Value as JSValue;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// The election, kept as a single JSON file.
///
/// Changes are made in memory and written back by `save`, which replaces the
/// file in one step: either all the changes of a command are stored, or none.
///
/// An open store holds an exclusive lock on `<store>.lock` until it is
/// dropped, so commands running at the same time see each other's changes.
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    docs: Documents,
    _lock: File,
}

fn lock_path(path: &Path) -> PathBuf {
    let mut p = path.as_os_str().to_owned();
    p.push(".lock");
    PathBuf::from(p)
}

/// Blocks until no other store is open on the same file.
fn acquire_lock(path: &Path) -> DashResult<File> {
    let lp = lock_path(path);
    let p = lp.display().to_string();
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&lp)
        .context(LockingSnafu { path: p.clone() })?;
    if file.try_lock_exclusive().is_err() {
        info!("Waiting for the lock on {}", p);
        file.lock_exclusive().context(LockingSnafu { path: p })?;
    }
    debug!("acquire_lock: {:?}", lp);
    Ok(file)
}

impl Store {
    /// Creates an empty store. Fails if the file already exists.
    pub fn init(path: &Path) -> DashResult<Store> {
        let lock = acquire_lock(path)?;
        if path.exists() {
            return StoreExistsSnafu {
                path: path.display().to_string(),
            }
            .fail();
        }
        let store = Store {
            path: path.to_path_buf(),
            docs: Documents::default(),
            _lock: lock,
        };
        store.save()?;
        info!("Created store {:?}", path);
        Ok(store)
    }

    pub fn open(path: &Path) -> DashResult<Store> {
        let lock = acquire_lock(path)?;
        let p = path.display().to_string();
        let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path: p.clone() })?;
        let docs: Documents =
            serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path: p })?;
        debug!(
            "open: {:?}: {} posts, {} candidates, {} voters, {} votes",
            path,
            docs.posts.len(),
            docs.candidates.len(),
            docs.voters.len(),
            docs.votes.len()
        );
        Ok(Store {
            path: path.to_path_buf(),
            docs,
            _lock: lock,
        })
    }

    pub fn save(&self) -> DashResult<()> {
        let p = self.path.display().to_string();
        let js = serde_json::to_string_pretty(&self.docs).context(SerializingJsonSnafu {})?;
        let dir = match self.path.parent() {
            Some(d) if !d.as_os_str().is_empty() => d,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).context(WritingJsonSnafu { path: p.clone() })?;
        tmp.write_all(js.as_bytes())
            .context(WritingJsonSnafu { path: p.clone() })?;
        tmp.persist(&self.path)
            .map_err(|e| e.error)
            .context(WritingJsonSnafu { path: p })?;
        debug!("save: wrote {:?}", self.path);
        Ok(())
    }

    #[cfg(test)]
    pub fn documents(&self) -> &Documents {
        &self.docs
    }

    pub fn snapshot(&self) -> DashResult<Snapshot> {
        self.docs.snapshot()
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.docs.next_id += 1;
        format!("{}-{:08}", prefix, self.docs.next_id)
    }

    fn now() -> JSValue {
        JSValue::String(Utc::now().to_rfc3339())
    }

    fn has_post(&self, post_id: &str) -> bool {
        self.docs
            .posts
            .iter()
            .any(|p| p.id.as_deref() == Some(post_id))
    }

    pub fn add_post(&mut self, title: &str, description: &str) -> DashResult<String> {
        ensure!(
            !title.trim().is_empty(),
            EmptyArgumentSnafu { name: "title" }
        );
        let id = self.next_id("post");
        self.docs.posts.push(PostDoc {
            id: Some(id.clone()),
            title: Some(title.to_string()),
            description: Some(description.to_string()),
            created_at: Some(Store::now()),
            ..PostDoc::default()
        });
        info!("Added post {} ({})", id, title);
        Ok(id)
    }

    /// Removes a post and all its candidates. Returns the number of
    /// candidates removed.
    ///
    /// Ballots are left untouched: their selections for this post are not
    /// counted any more.
    pub fn delete_post(&mut self, post_id: &str) -> DashResult<usize> {
        ensure!(self.has_post(post_id), UnknownPostSnafu { id: post_id });
        self.docs
            .posts
            .retain(|p| p.id.as_deref() != Some(post_id));
        let before = self.docs.candidates.len();
        self.docs
            .candidates
            .retain(|c| c.post_id.as_deref() != Some(post_id));
        let removed = before - self.docs.candidates.len();
        info!(
            "Deleted post {} and {} candidate(s) running for it",
            post_id, removed
        );
        Ok(removed)
    }

    pub fn add_candidate(
        &mut self,
        post_id: &str,
        name: &str,
        slogan: &str,
        image: Option<&str>,
        bio: Option<&str>,
    ) -> DashResult<String> {
        ensure!(self.has_post(post_id), UnknownPostSnafu { id: post_id });
        ensure!(
            !name.trim().is_empty(),
            EmptyArgumentSnafu { name: "name" }
        );
        let id = self.next_id("candidate");
        self.docs.candidates.push(CandidateDoc {
            id: Some(id.clone()),
            post_id: Some(post_id.to_string()),
            name: Some(name.to_string()),
            slogan: Some(slogan.to_string()),
            image: image.map(|s| s.to_string()),
            bio: bio.map(|s| s.to_string()),
            created_at: Some(Store::now()),
            ..CandidateDoc::default()
        });
        info!("Added candidate {} ({}) for post {}", id, name, post_id);
        Ok(id)
    }

    pub fn delete_candidate(&mut self, candidate_id: &str) -> DashResult<()> {
        let before = self.docs.candidates.len();
        self.docs
            .candidates
            .retain(|c| c.id.as_deref() != Some(candidate_id));
        ensure!(
            self.docs.candidates.len() < before,
            UnknownCandidateSnafu { id: candidate_id }
        );
        info!("Deleted candidate {}", candidate_id);
        Ok(())
    }

    pub fn add_voter(
        &mut self,
        name: &str,
        student_code: &str,
        password: &str,
    ) -> DashResult<String> {
        ensure!(
            !name.trim().is_empty(),
            EmptyArgumentSnafu { name: "name" }
        );
        ensure!(
            !student_code.trim().is_empty(),
            EmptyArgumentSnafu {
                name: "student code"
            }
        );
        let taken = self
            .docs
            .voters
            .iter()
            .any(|v| v.student_code.as_deref() == Some(student_code));
        ensure!(
            !taken,
            DuplicateStudentCodeSnafu { code: student_code }
        );
        let id = self.next_id("voter");
        self.docs.voters.push(VoterDoc {
            id: Some(id.clone()),
            name: Some(name.to_string()),
            student_code: Some(student_code.to_string()),
            password_hash: Some(password_digest(student_code, password)),
            voted: Some(false),
            created_at: Some(Store::now()),
            ..VoterDoc::default()
        });
        info!("Added voter {} ({})", id, student_code);
        Ok(id)
    }

    pub fn delete_voter(&mut self, voter_id: &str) -> DashResult<()> {
        let before = self.docs.voters.len();
        self.docs
            .voters
            .retain(|v| v.id.as_deref() != Some(voter_id));
        ensure!(
            self.docs.voters.len() < before,
            UnknownVoterSnafu { id: voter_id }
        );
        info!("Deleted voter {}", voter_id);
        Ok(())
    }

    /// Records the ballot of a voter and marks the voter as having voted.
    ///
    /// `selections` maps post ids to candidate ids. Every selection must name
    /// an existing candidate of that post.
    pub fn cast_ballot(
        &mut self,
        student_code: &str,
        password: &str,
        selections: &BTreeMap<String, String>,
    ) -> DashResult<String> {
        let voter_idx = self
            .docs
            .voters
            .iter()
            .position(|v| {
                v.student_code.as_deref() == Some(student_code) && v.check_password(password)
            })
            .context(InvalidCredentialsSnafu {})?;
        let voter_id = self.docs.voters[voter_idx].id.clone();
        let has_ballot =
            voter_id.is_some() && self.docs.votes.iter().any(|v| v.voter_id == voter_id);
        let flagged = self.docs.voters[voter_idx].voted.unwrap_or(false);
        if has_ballot && !flagged {
            warn!(
                "cast_ballot: voter {:?} is not marked as voted but has a ballot",
                voter_id
            );
        }
        ensure!(
            !flagged && !has_ballot,
            AlreadyVotedSnafu { code: student_code }
        );
        ensure!(!selections.is_empty(), EmptyBallotSnafu {});

        for (post_id, candidate_id) in selections.iter() {
            ensure!(self.has_post(post_id), UnknownPostSnafu { id: post_id });
            let candidate = self
                .docs
                .candidates
                .iter()
                .find(|c| c.id.as_deref() == Some(candidate_id.as_str()))
                .context(UnknownCandidateSnafu { id: candidate_id })?;
            ensure!(
                candidate.post_id.as_deref() == Some(post_id.as_str()),
                CandidatePostMismatchSnafu {
                    candidate: candidate_id,
                    post: post_id
                }
            );
        }

        let id = self.next_id("vote");
        self.docs.votes.push(VoteDoc {
            id: Some(id.clone()),
            voter_id: voter_id.clone(),
            votes: Some(
                selections
                    .iter()
                    .map(|(p, c)| (p.clone(), JSValue::String(c.clone())))
                    .collect(),
            ),
            created_at: Some(Store::now()),
            ..VoteDoc::default()
        });
        self.docs.voters[voter_idx].voted = Some(true);
        info!(
            "Recorded ballot {} for voter {:?}: {} selection(s)",
            id,
            voter_id,
            selections.len()
        );
        Ok(id)
    }

    /// Removes all the ballots and lets every voter vote again. Returns the
    /// number of ballots removed.
    pub fn reset_votes(&mut self) -> usize {
        let removed = self.docs.votes.len();
        self.docs.votes.clear();
        for v in self.docs.voters.iter_mut() {
            v.voted = Some(false);
        }
        info!("Removed {} ballot(s)", removed);
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    fn select<P: AsRef<str>, C: AsRef<str>>(pairs: &[(P, C)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(p, c)| (p.as_ref().to_string(), c.as_ref().to_string()))
            .collect()
    }

    // One post with two candidates and two voters, saved in a fresh directory.
    fn election() -> (TempDir, Store, String, String, String) {
        let dir = tempdir().unwrap();
        let mut store = Store::init(&dir.path().join("election.json")).unwrap();
        let p = store.add_post("President", "Head of the council").unwrap();
        let a = store.add_candidate(&p, "Alice", "Forward", None, None).unwrap();
        let b = store
            .add_candidate(&p, "Bob", "Onward", Some("https://example.org/bob.png"), None)
            .unwrap();
        store.add_voter("Carol", "S1", "pw1").unwrap();
        store.add_voter("Dave", "S2", "pw2").unwrap();
        store.save().unwrap();
        (dir, store, p, a, b)
    }

    #[test]
    fn init_refuses_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("election.json");
        Store::init(&path).unwrap();
        assert!(matches!(
            Store::init(&path),
            Err(DashError::StoreExists { .. })
        ));
    }

    #[test]
    fn saved_changes_are_reloaded() {
        let (_dir, store, p, a, _) = election();
        let path = store.path.clone();
        let docs = store.documents().clone();
        drop(store);
        let reopened = Store::open(&path).unwrap();
        assert_eq!(reopened.documents(), &docs);
        let s = reopened.snapshot().unwrap();
        assert_eq!(s.posts[0].id, p);
        assert_eq!(s.candidates[0].id, a);
        assert_eq!(s.voters.len(), 2);
        assert!(s.voters.iter().all(|v| !v.voted));
    }

    #[test]
    fn unknown_top_level_keys_survive_a_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("election.json");
        fs::write(
            &path,
            r#"{"posts": [], "nextId": 3, "settings": {"theme": "dark"}}"#,
        )
        .unwrap();
        let mut store = Store::open(&path).unwrap();
        assert_eq!(store.add_post("President", "").unwrap(), "post-00000004");
        store.save().unwrap();
        drop(store);
        let js: JSValue = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(js["settings"]["theme"], JSValue::String("dark".to_string()));
        assert_eq!(js["nextId"], serde_json::json!(4));
    }

    #[test]
    fn ids_are_unique() {
        let (_dir, mut store, p, a, b) = election();
        assert_eq!(p, "post-00000001");
        assert_eq!(a, "candidate-00000002");
        assert_eq!(b, "candidate-00000003");
        store.delete_candidate(&b).unwrap();
        let c = store.add_candidate(&p, "Eve", "", None, None).unwrap();
        assert_eq!(c, "candidate-00000006");
    }

    #[test]
    fn deleting_a_post_removes_its_candidates() {
        let (_dir, mut store, p, a, _) = election();
        let q = store.add_post("Secretary", "").unwrap();
        let c = store.add_candidate(&q, "Eve", "", None, None).unwrap();
        store
            .cast_ballot("S1", "pw1", &select(&[(&p, &a), (&q, &c)]))
            .unwrap();

        assert_eq!(store.delete_post(&p).unwrap(), 2);
        assert!(matches!(
            store.delete_post(&p),
            Err(DashError::UnknownPost { .. })
        ));
        let s = store.snapshot().unwrap();
        assert_eq!(s.posts.len(), 1);
        assert_eq!(s.candidates.len(), 1);
        // The dangling selection stays in the ballot but is not counted.
        assert_eq!(s.ballots[0].selections.len(), 2);
        let res = s.results();
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].total_votes, 1);
    }

    #[test]
    fn candidates_need_a_post() {
        let (_dir, mut store, _, _, _) = election();
        assert!(matches!(
            store.add_candidate("post-99999999", "Eve", "", None, None),
            Err(DashError::UnknownPost { .. })
        ));
        assert!(matches!(
            store.delete_candidate("candidate-99999999"),
            Err(DashError::UnknownCandidate { .. })
        ));
    }

    #[test]
    fn student_codes_are_unique() {
        let (_dir, mut store, _, _, _) = election();
        assert!(matches!(
            store.add_voter("Other Carol", "S1", "x"),
            Err(DashError::DuplicateStudentCode { .. })
        ));
        let v = store.add_voter("Frank", "S3", "pw3").unwrap();
        store.delete_voter(&v).unwrap();
        assert!(matches!(
            store.delete_voter(&v),
            Err(DashError::UnknownVoter { .. })
        ));
        let stored = &store.documents().voters[0];
        assert_eq!(stored.password, None);
        assert_ne!(stored.password_hash.as_deref(), Some("pw1"));
    }

    #[test]
    fn voting_once() {
        let (_dir, mut store, p, a, b) = election();
        assert!(matches!(
            store.cast_ballot("S1", "wrong", &select(&[(&p, &a)])),
            Err(DashError::InvalidCredentials { .. })
        ));
        assert!(matches!(
            store.cast_ballot("S1", "pw1", &select::<&str, &str>(&[])),
            Err(DashError::EmptyBallot { .. })
        ));
        assert!(matches!(
            store.cast_ballot("S1", "pw1", &select(&[(p.as_str(), "candidate-99999999")])),
            Err(DashError::UnknownCandidate { .. })
        ));
        assert!(matches!(
            store.cast_ballot("S1", "pw1", &select(&[("post-99999999", a.as_str())])),
            Err(DashError::UnknownPost { .. })
        ));

        store.cast_ballot("S1", "pw1", &select(&[(&p, &a)])).unwrap();
        assert!(matches!(
            store.cast_ballot("S1", "pw1", &select(&[(&p, &b)])),
            Err(DashError::AlreadyVoted { .. })
        ));
        store.cast_ballot("S2", "pw2", &select(&[(&p, &a)])).unwrap();

        let s = store.snapshot().unwrap();
        assert!(s.voters.iter().all(|v| v.voted));
        assert_eq!(s.ballots.len(), 2);
        assert_eq!(s.ballots[0].voter_id.as_deref(), Some("voter-00000004"));
        let res = s.results();
        assert_eq!(res[0].leading_votes, 2);
        assert_eq!(res[0].leading_candidate.as_ref().map(|c| c.id.clone()), Some(a));
    }

    #[test]
    fn a_stored_ballot_counts_as_voted() {
        let (_dir, mut store, p, a, b) = election();
        store.cast_ballot("S1", "pw1", &select(&[(&p, &a)])).unwrap();
        // The flag was lost, the ballot was not.
        store.docs.voters[0].voted = Some(false);
        assert!(matches!(
            store.cast_ballot("S1", "pw1", &select(&[(&p, &b)])),
            Err(DashError::AlreadyVoted { .. })
        ));
        assert_eq!(store.documents().votes.len(), 1);
        assert!(store.snapshot().is_ok());
    }

    #[test]
    fn concurrent_ballots_are_all_kept() {
        let (dir, store, p, a, b) = election();
        let path = dir.path().join("election.json");
        drop(store);

        let mut first = Store::open(&path).unwrap();
        let other_path = path.clone();
        let (other_p, other_b) = (p.clone(), b);
        let other = thread::spawn(move || {
            let mut second = Store::open(&other_path).unwrap();
            second
                .cast_ballot("S2", "pw2", &select(&[(&other_p, &other_b)]))
                .unwrap();
            second.save().unwrap();
        });
        thread::sleep(Duration::from_millis(50));
        first.cast_ballot("S1", "pw1", &select(&[(&p, &a)])).unwrap();
        first.save().unwrap();
        drop(first);
        other.join().unwrap();

        let s = Store::open(&path).unwrap().snapshot().unwrap();
        assert_eq!(s.ballots.len(), 2);
        assert!(s.voters.iter().all(|v| v.voted));
        assert_eq!(s.results()[0].total_votes, 2);
    }

    #[test]
    fn selections_must_match_the_post() {
        let (_dir, mut store, p, a, _) = election();
        let q = store.add_post("Secretary", "").unwrap();
        assert!(matches!(
            store.cast_ballot("S1", "pw1", &select(&[(&q, &a)])),
            Err(DashError::CandidatePostMismatch { .. })
        ));
        // Nothing was recorded.
        assert!(store.documents().votes.is_empty());
        store.cast_ballot("S1", "pw1", &select(&[(&p, &a)])).unwrap();
    }

    #[test]
    fn reset_lets_everybody_vote_again() {
        let (_dir, mut store, p, a, b) = election();
        store.cast_ballot("S1", "pw1", &select(&[(&p, &a)])).unwrap();
        store.cast_ballot("S2", "pw2", &select(&[(&p, &b)])).unwrap();
        assert_eq!(store.reset_votes(), 2);
        let s = store.snapshot().unwrap();
        assert!(s.ballots.is_empty());
        assert!(s.voters.iter().all(|v| !v.voted));
        store.cast_ballot("S1", "pw1", &select(&[(&p, &b)])).unwrap();
    }
}
