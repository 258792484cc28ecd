//! [`Repository`] backed by the `git` command-line tool.
//!
//! Every operation is a single `git` invocation in the working directory.
//! Tag creation relies on `git tag` refusing to overwrite an existing ref,
//! which git performs under its own ref lock.

use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::Utc;
use tagreg_types::{timestamp_from_secs, CommitId, Signature};
use tracing::debug;

use crate::error::{RefError, Result};
use crate::refname::validate_tag_name;
use crate::traits::Repository;
use crate::types::{BranchHead, CommitInfo, NewTag, TagRecord};

const TAG_FORMAT: &str = "%(refname:strip=2)%00%(objecttype)%00%(objectname)%00\
%(*objecttype)%00%(*objectname)%00%(taggername)%00%(taggeremail)%00%(taggerdate:unix)%00\
%(committername)%00%(committeremail)%00%(committerdate:unix)%00%(contents:subject)";

const TAG_FIELDS: usize = 12;

/// A git working tree accessed through the `git` binary.
#[derive(Clone, Debug)]
pub struct GitRepository {
    workdir: PathBuf,
}

impl GitRepository {
    /// Open the repository containing `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let repo = Self {
            workdir: path.as_ref().to_path_buf(),
        };
        repo.git(&["rev-parse", "--git-dir"])?;
        Ok(repo)
    }

    /// Run `git init` in `path` and open the result.
    pub fn init(path: impl AsRef<Path>) -> Result<Self> {
        let repo = Self {
            workdir: path.as_ref().to_path_buf(),
        };
        repo.git(&["init", "--quiet"])?;
        Ok(repo)
    }

    /// The working directory git runs in.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.workdir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C");
        cmd
    }

    fn git(&self, args: &[&str]) -> Result<String> {
        self.run(self.command(), args)
    }

    fn run(&self, mut cmd: Command, args: &[&str]) -> Result<String> {
        debug!(workdir = %self.workdir.display(), ?args, "running git");
        let output = cmd.args(args).output()?;
        if !output.status.success() {
            return Err(RefError::Git {
                command: subcommand(args).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        String::from_utf8(output.stdout).map_err(|e| RefError::Parse(e.to_string()))
    }

    fn list_tags(&self, pattern: &str) -> Result<Vec<TagRecord>> {
        let format = format!("--format={TAG_FORMAT}");
        let out = self.git(&["for-each-ref", &format, pattern])?;
        let mut tags = Vec::new();
        for line in out.lines().filter(|l| !l.is_empty()) {
            if let Some(tag) = parse_tag_line(line)? {
                tags.push(tag);
            }
        }
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }
}

/// The git subcommand in `args`, skipping leading `-c key=value` pairs.
fn subcommand<'a>(args: &[&'a str]) -> &'a str {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if *arg == "-c" {
            iter.next();
        } else if !arg.starts_with('-') {
            return *arg;
        }
    }
    "git"
}

fn parse_tag_line(line: &str) -> Result<Option<TagRecord>> {
    let fields: Vec<&str> = line.split('\0').collect();
    if fields.len() != TAG_FIELDS {
        return Err(RefError::Parse(format!("tag record: {line:?}")));
    }
    let name = fields[0].to_string();

    let (annotated, target, tagger) = match fields[1] {
        "commit" => {
            let author = parse_signature(fields[8], fields[9], fields[10])?;
            (false, fields[2], author)
        }
        "tag" if fields[3] == "commit" => {
            let tagger = parse_signature(fields[5], fields[6], fields[7])?;
            (true, fields[4], tagger)
        }
        // Tags of trees, blobs or other tags carry no registry meaning.
        _ => return Ok(None),
    };

    let target = CommitId::from_hex(target).map_err(|e| RefError::Parse(e.to_string()))?;
    Ok(Some(TagRecord {
        name,
        target,
        tagger,
        message: fields[11].to_string(),
        annotated,
    }))
}

fn parse_signature(name: &str, email: &str, secs: &str) -> Result<Signature> {
    let secs: i64 = secs
        .trim()
        .parse()
        .map_err(|_| RefError::Parse(format!("timestamp: {secs:?}")))?;
    let email = email.trim().trim_start_matches('<').trim_end_matches('>');
    Ok(Signature::new(name, email, timestamp_from_secs(secs)))
}

/// Parse `Name <email> 1700000000 +0000` as printed by `git var`.
fn parse_ident(ident: &str) -> Result<(String, String)> {
    let open = ident.find('<');
    let close = ident.rfind('>');
    match (open, close) {
        (Some(open), Some(close)) if open < close => Ok((
            ident[..open].trim().to_string(),
            ident[open + 1..close].to_string(),
        )),
        _ => Err(RefError::Parse(format!("identity: {ident:?}"))),
    }
}

impl Repository for GitRepository {
    fn resolve_commit(&self, rev: &str) -> Result<CommitId> {
        if rev.is_empty() || rev.starts_with('-') {
            return Err(RefError::RefNotFound(rev.to_string()));
        }
        let peeled = format!("{rev}^{{commit}}");
        let out = self
            .git(&["rev-parse", "--verify", "--quiet", &peeled])
            .map_err(|_| RefError::RefNotFound(rev.to_string()))?;
        CommitId::from_hex(out.trim()).map_err(|e| RefError::Parse(e.to_string()))
    }

    fn commit(&self, id: &CommitId) -> Result<CommitInfo> {
        let out = self
            .git(&[
                "log",
                "-1",
                "--format=%H%x00%P%x00%an%x00%ae%x00%ct%x00%s",
                id.as_str(),
                "--",
            ])
            .map_err(|_| RefError::RefNotFound(id.to_string()))?;
        let line = out.trim_end_matches('\n');
        let fields: Vec<&str> = line.split('\0').collect();
        if fields.len() != 6 {
            return Err(RefError::Parse(format!("commit record: {line:?}")));
        }

        let parents = fields[1]
            .split_whitespace()
            .map(CommitId::from_hex)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| RefError::Parse(e.to_string()))?;

        Ok(CommitInfo {
            id: id.clone(),
            parents,
            author: parse_signature(fields[2], fields[3], fields[4])?,
            message: fields[5].to_string(),
        })
    }

    fn tags(&self) -> Result<Vec<TagRecord>> {
        self.list_tags("refs/tags")
    }

    fn tag(&self, name: &str) -> Result<Option<TagRecord>> {
        // for-each-ref matches by prefix; keep only the exact name.
        let pattern = format!("refs/tags/{name}");
        Ok(self
            .list_tags(&pattern)?
            .into_iter()
            .find(|t| t.name == name))
    }

    fn create_tag(&self, tag: &NewTag) -> Result<TagRecord> {
        validate_tag_name(&tag.name)?;

        let mut cmd = self.command();
        if let Some(tagger) = &tag.tagger {
            cmd.env("GIT_COMMITTER_NAME", &tagger.name)
                .env("GIT_COMMITTER_EMAIL", &tagger.email)
                .env(
                    "GIT_COMMITTER_DATE",
                    format!("{} +0000", tagger.time.timestamp()),
                );
        }

        let result = self.run(
            cmd,
            &[
                "-c",
                "tag.gpgSign=false",
                "tag",
                "-a",
                "-m",
                &tag.message,
                &tag.name,
                tag.target.as_str(),
            ],
        );
        match result {
            Ok(_) => {}
            Err(RefError::Git { stderr, .. }) if stderr.contains("already exists") => {
                return Err(RefError::TagExists(tag.name.clone()));
            }
            Err(RefError::Git { stderr, .. })
                if stderr.contains("Failed to resolve") || stderr.contains("not a valid") =>
            {
                return Err(RefError::RefNotFound(tag.target.to_string()));
            }
            Err(e) => return Err(e),
        }

        self.read_tag(&tag.name)
    }

    fn branches(&self) -> Result<Vec<BranchHead>> {
        let out = self.git(&[
            "for-each-ref",
            "--format=%(refname:strip=2)%00%(objectname)",
            "refs/heads",
        ])?;
        let mut heads = Vec::new();
        for line in out.lines().filter(|l| !l.is_empty()) {
            let (name, target) = line
                .split_once('\0')
                .ok_or_else(|| RefError::Parse(format!("branch record: {line:?}")))?;
            heads.push(BranchHead {
                name: name.to_string(),
                target: CommitId::from_hex(target).map_err(|e| RefError::Parse(e.to_string()))?,
            });
        }
        heads.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(heads)
    }

    fn default_signature(&self) -> Result<Signature> {
        let out = self.git(&["var", "GIT_COMMITTER_IDENT"])?;
        let (name, email) = parse_ident(out.trim())?;
        Ok(Signature::new(name, email, Utc::now()))
    }

    fn commits(&self) -> Result<Vec<CommitId>> {
        let out = self.git(&["rev-list", "--branches"])?;
        out.lines()
            .filter(|l| !l.is_empty())
            .map(|l| CommitId::from_hex(l).map_err(|e| RefError::Parse(e.to_string())))
            .collect()
    }
}
