//! In-memory repository for testing and embedding.
//!
//! [`InMemoryRepository`] keeps commits, branches and tags in maps behind a
//! `RwLock`. It mints its own commit ids and has an injectable clock so
//! tests can pin tag timestamps to the same second and exercise tie-breaks.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use tagreg_types::{CommitId, Signature};

use crate::error::{RefError, Result};
use crate::refname::validate_tag_name;
use crate::traits::Repository;
use crate::types::{BranchHead, CommitInfo, NewTag, TagRecord};

const DEFAULT_BRANCH: &str = "main";

/// An in-memory implementation of [`Repository`].
///
/// Data is lost when the repository is dropped.
#[derive(Debug)]
pub struct InMemoryRepository {
    name: String,
    email: String,
    inner: RwLock<RepoState>,
}

#[derive(Debug)]
struct RepoState {
    commits: HashMap<CommitId, CommitInfo>,
    branches: BTreeMap<String, CommitId>,
    tags: BTreeMap<String, TagRecord>,
    current_branch: String,
    clock: Option<DateTime<Utc>>,
    sequence: u64,
}

impl InMemoryRepository {
    /// Create an empty repository whose current branch is `main`.
    pub fn new() -> Self {
        Self::with_identity("tagreg", "tagreg@localhost")
    }

    /// Create an empty repository that commits and tags as the given person.
    pub fn with_identity(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            inner: RwLock::new(RepoState {
                commits: HashMap::new(),
                branches: BTreeMap::new(),
                tags: BTreeMap::new(),
                current_branch: DEFAULT_BRANCH.to_string(),
                clock: None,
                sequence: 0,
            }),
        }
    }

    /// Pin the clock. Every later commit and tag is stamped with this time
    /// until the clock is advanced.
    pub fn freeze_clock(&self, time: DateTime<Utc>) -> Result<()> {
        self.write()?.clock = Some(time);
        Ok(())
    }

    /// Move a frozen clock forward. Freezes it at "now" first if needed.
    pub fn advance_clock(&self, seconds: i64) -> Result<()> {
        let mut state = self.write()?;
        let base = state.clock.unwrap_or_else(Utc::now);
        state.clock = Some(base + Duration::seconds(seconds));
        Ok(())
    }

    /// Create a commit on the current branch and advance the branch to it.
    pub fn create_commit(&self, message: &str) -> Result<CommitId> {
        let mut state = self.write()?;
        let parents = state
            .branches
            .get(&state.current_branch)
            .cloned()
            .into_iter()
            .collect();
        let id = self.mint_commit(&mut state, parents, message);
        let branch = state.current_branch.clone();
        state.branches.insert(branch, id.clone());
        Ok(id)
    }

    /// Create a merge commit on the current branch with `other` as the
    /// second parent.
    pub fn merge(&self, other: &CommitId, message: &str) -> Result<CommitId> {
        let mut state = self.write()?;
        if !state.commits.contains_key(other) {
            return Err(RefError::RefNotFound(other.to_string()));
        }
        let mut parents: Vec<CommitId> = state
            .branches
            .get(&state.current_branch)
            .cloned()
            .into_iter()
            .collect();
        parents.push(other.clone());
        let id = self.mint_commit(&mut state, parents, message);
        let branch = state.current_branch.clone();
        state.branches.insert(branch, id.clone());
        Ok(id)
    }

    /// Create or move a branch to `target`.
    pub fn set_branch(&self, name: &str, target: &CommitId) -> Result<()> {
        validate_tag_name(name)?;
        let mut state = self.write()?;
        if !state.commits.contains_key(target) {
            return Err(RefError::RefNotFound(target.to_string()));
        }
        state.branches.insert(name.to_string(), target.clone());
        Ok(())
    }

    /// Make `name` the current branch. The branch does not need to exist
    /// yet; the next commit creates it.
    pub fn checkout(&self, name: &str) -> Result<()> {
        validate_tag_name(name)?;
        self.write()?.current_branch = name.to_string();
        Ok(())
    }

    fn mint_commit(&self, state: &mut RepoState, parents: Vec<CommitId>, message: &str) -> CommitId {
        state.sequence += 1;
        let time = state.clock.unwrap_or_else(Utc::now);
        let mut material = format!("{}\n{}\n", state.sequence, time.timestamp());
        for parent in &parents {
            material.push_str(parent.as_str());
            material.push('\n');
        }
        material.push_str(message);

        let id = CommitId::digest(material.as_bytes());
        let info = CommitInfo {
            id: id.clone(),
            parents,
            author: Signature::new(self.name.clone(), self.email.clone(), time),
            message: message.to_string(),
        };
        state.commits.insert(id.clone(), info);
        id
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, RepoState>> {
        self.inner
            .read()
            .map_err(|e| RefError::Lock(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, RepoState>> {
        self.inner
            .write()
            .map_err(|e| RefError::Lock(e.to_string()))
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl Repository for InMemoryRepository {
    fn resolve_commit(&self, rev: &str) -> Result<CommitId> {
        let state = self.read()?;
        let not_found = || RefError::RefNotFound(rev.to_string());

        if rev == "HEAD" {
            return state
                .branches
                .get(&state.current_branch)
                .cloned()
                .ok_or_else(not_found);
        }
        if let Some(name) = rev.strip_prefix("refs/heads/") {
            return state.branches.get(name).cloned().ok_or_else(not_found);
        }
        if let Some(name) = rev.strip_prefix("refs/tags/") {
            return state
                .tags
                .get(name)
                .map(|t| t.target.clone())
                .ok_or_else(not_found);
        }
        if let Some(target) = state.branches.get(rev) {
            return Ok(target.clone());
        }
        if let Some(tag) = state.tags.get(rev) {
            return Ok(tag.target.clone());
        }

        // Full hash or unambiguous abbreviation of at least four characters.
        if rev.len() >= 4 {
            let mut matches = state.commits.keys().filter(|id| id.starts_with(rev));
            if let (Some(id), None) = (matches.next(), matches.next()) {
                return Ok(id.clone());
            }
        }

        Err(not_found())
    }

    fn commit(&self, id: &CommitId) -> Result<CommitInfo> {
        self.read()?
            .commits
            .get(id)
            .cloned()
            .ok_or_else(|| RefError::RefNotFound(id.to_string()))
    }

    fn tags(&self) -> Result<Vec<TagRecord>> {
        Ok(self.read()?.tags.values().cloned().collect())
    }

    fn tag(&self, name: &str) -> Result<Option<TagRecord>> {
        Ok(self.read()?.tags.get(name).cloned())
    }

    fn create_tag(&self, tag: &NewTag) -> Result<TagRecord> {
        validate_tag_name(&tag.name)?;

        let mut state = self.write()?;
        if !state.commits.contains_key(&tag.target) {
            return Err(RefError::RefNotFound(tag.target.to_string()));
        }
        // Check and insert under one write lock: create-iff-absent.
        if state.tags.contains_key(&tag.name) {
            return Err(RefError::TagExists(tag.name.clone()));
        }

        let tagger = match &tag.tagger {
            Some(tagger) => tagger.clone(),
            None => Signature::new(
                self.name.clone(),
                self.email.clone(),
                state.clock.unwrap_or_else(Utc::now),
            ),
        };
        let record = TagRecord {
            name: tag.name.clone(),
            target: tag.target.clone(),
            tagger,
            message: tag.message.clone(),
            annotated: true,
        };
        state.tags.insert(tag.name.clone(), record.clone());
        Ok(record)
    }

    fn branches(&self) -> Result<Vec<BranchHead>> {
        Ok(self
            .read()?
            .branches
            .iter()
            .map(|(name, target)| BranchHead {
                name: name.clone(),
                target: target.clone(),
            })
            .collect())
    }

    fn default_signature(&self) -> Result<Signature> {
        let time = self.read()?.clock.unwrap_or_else(Utc::now);
        Ok(Signature::new(self.name.clone(), self.email.clone(), time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tagreg_types::timestamp_from_secs;

    fn repo_with_commits(n: usize) -> (InMemoryRepository, Vec<CommitId>) {
        let repo = InMemoryRepository::new();
        repo.freeze_clock(timestamp_from_secs(1_700_000_000)).unwrap();
        let ids = (0..n)
            .map(|i| {
                repo.advance_clock(1).unwrap();
                repo.create_commit(&format!("commit {i}")).unwrap()
            })
            .collect();
        (repo, ids)
    }

    // ---- Commits and branches ----

    #[test]
    fn commits_chain_on_current_branch() {
        let (repo, ids) = repo_with_commits(3);
        assert_eq!(repo.resolve_commit("HEAD").unwrap(), ids[2]);
        assert_eq!(repo.resolve_commit("main").unwrap(), ids[2]);
        assert_eq!(repo.parents(&ids[2]).unwrap(), vec![ids[1].clone()]);
        assert!(repo.parents(&ids[0]).unwrap().is_empty());
    }

    #[test]
    fn resolve_by_prefix_and_full_hash() {
        let (repo, ids) = repo_with_commits(2);
        assert_eq!(repo.resolve_commit(ids[0].as_str()).unwrap(), ids[0]);
        assert_eq!(repo.resolve_commit(&ids[1].as_str()[..10]).unwrap(), ids[1]);
    }

    #[test]
    fn resolve_unknown_rev_fails() {
        let (repo, _) = repo_with_commits(1);
        let err = repo.resolve_commit("nope").unwrap_err();
        assert!(matches!(err, RefError::RefNotFound(_)));
    }

    #[test]
    fn merge_records_two_parents() {
        let (repo, ids) = repo_with_commits(1);
        repo.checkout("feature").unwrap();
        repo.set_branch("feature", &ids[0]).unwrap();
        let side = repo.create_commit("side work").unwrap();
        repo.checkout("main").unwrap();
        let main_tip = repo.create_commit("main work").unwrap();
        let merge = repo.merge(&side, "merge feature").unwrap();

        assert_eq!(repo.parents(&merge).unwrap(), vec![main_tip, side]);
        let all = repo.commits().unwrap();
        assert_eq!(all.len(), 4);
    }

    // ---- Tags ----

    #[test]
    fn create_and_read_tag() {
        let (repo, ids) = repo_with_commits(1);
        let record = repo
            .create_tag(&NewTag::new("rf@v1.0.0", ids[0].clone(), "Registering"))
            .unwrap();
        assert!(record.annotated);
        assert_eq!(record.tagger.time.timestamp(), 1_700_000_001);
        assert_eq!(repo.read_tag("rf@v1.0.0").unwrap(), record);
        assert_eq!(repo.resolve_commit("rf@v1.0.0").unwrap(), ids[0]);
        assert_eq!(repo.resolve_commit("refs/tags/rf@v1.0.0").unwrap(), ids[0]);
    }

    #[test]
    fn tags_are_immutable() {
        let (repo, ids) = repo_with_commits(2);
        repo.create_tag(&NewTag::new("rf#prod", ids[0].clone(), "a"))
            .unwrap();
        let err = repo
            .create_tag(&NewTag::new("rf#prod", ids[1].clone(), "b"))
            .unwrap_err();
        assert!(matches!(err, RefError::TagExists(_)));
        assert_eq!(repo.read_tag("rf#prod").unwrap().target, ids[0]);
    }

    #[test]
    fn tag_on_missing_commit_fails() {
        let repo = InMemoryRepository::new();
        let err = repo
            .create_tag(&NewTag::new("rf@v1", CommitId::digest(b"ghost"), "x"))
            .unwrap_err();
        assert!(matches!(err, RefError::RefNotFound(_)));
    }

    #[test]
    fn missing_tag_is_reported() {
        let repo = InMemoryRepository::new();
        assert!(repo.tag("rf@v1").unwrap().is_none());
        assert!(matches!(
            repo.read_tag("rf@v1").unwrap_err(),
            RefError::TagNotFound(_)
        ));
    }

    #[test]
    fn explicit_tagger_is_kept() {
        let (repo, ids) = repo_with_commits(1);
        let tagger = Signature::new("Ann", "ann@example.com", timestamp_from_secs(42));
        let record = repo
            .create_tag(&NewTag::new("rf@v1", ids[0].clone(), "x").with_tagger(tagger.clone()))
            .unwrap();
        assert_eq!(record.tagger, tagger);
    }

    #[test]
    fn racing_writers_get_exactly_one_tag() {
        let (repo, ids) = repo_with_commits(1);
        let repo = Arc::new(repo);
        let target = ids[0].clone();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let repo = Arc::clone(&repo);
                let target = target.clone();
                thread::spawn(move || repo.create_tag(&NewTag::new("rf#prod#1", target, "race")))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let won = results.iter().filter(|r| r.is_ok()).count();
        let lost = results
            .iter()
            .filter(|r| matches!(r, Err(RefError::TagExists(_))))
            .count();
        assert_eq!(won, 1);
        assert_eq!(lost, 7);
    }

    #[test]
    fn tag_names_are_validated() {
        let (repo, ids) = repo_with_commits(1);
        let err = repo
            .create_tag(&NewTag::new("bad..name", ids[0].clone(), "x"))
            .unwrap_err();
        assert!(matches!(err, RefError::InvalidRefName { .. }));
    }
}
