//! Export driver (§4.11 steps 2-6): walks `project.pj`'s own revision
//! tree trunk-forward from `1.1`, recursing into each variant branch,
//! diffing and merging successive checkpoints into git commits.

use std::{collections::HashMap, fmt::Debug, io::Write, time::SystemTime};

use git_fast_import::{CommitBuilder, FileCommand, Identity, Mark, Mode, Tag, Writer};
use rcs_master::Revision;
use state::{BranchId, CheckpointEntry, Manager, RcsFileId};

use crate::{authormap::AuthorMap, materialize::Materializer, project, tip::Tip};

pub struct Options {
    pub projectpj_name: String,
    pub trunk_branch: Option<Revision>,
    pub jobs: usize,
    pub materialize: crate::materialize::Options,
}

pub fn run<W: Write + Debug>(
    manager: &mut Manager,
    writer: &mut Writer<W>,
    authors: &AuthorMap,
    tips: &HashMap<String, Tip>,
    opts: &Options,
) -> anyhow::Result<()> {
    let project_file = manager
        .rcs_file_id_by_path(&opts.projectpj_name)
        .ok_or_else(|| anyhow::anyhow!("no {} found under the RCS tree", opts.projectpj_name))?;

    if manager.rcs_file(project_file)?.corrupt {
        anyhow::bail!("{} is corrupt; cannot build history", opts.projectpj_name);
    }

    project::parse_all(manager, project_file)?;

    let mut materializer = Materializer::new();
    for checkpoint in manager.checkpoints() {
        for entry in &checkpoint.entries {
            materializer.note_path(entry.file, &entry.path);
        }
    }
    materializer.prewarm(manager, opts.jobs)?;

    let head = manager
        .rcs_file(project_file)?
        .head
        .clone()
        .ok_or_else(|| anyhow::anyhow!("{} has no head revision", opts.projectpj_name))?;

    let mut trunk = follow_next_chain(manager, project_file, &head)?;
    trunk.reverse();
    if let Some(limit) = &opts.trunk_branch {
        trunk = truncate_trunk_at_limit(trunk, limit);
    }

    let branch_names = branch_name_queue(manager);

    let master = manager.add_branch(state::Branch::new(
        "master".to_string(),
        trunk.first().cloned().unwrap_or_else(|| head.clone()),
        None,
        checkpoint_date(manager, project_file, trunk.first().unwrap_or(&head)),
    ))?;

    let mut ctx = Context {
        manager,
        writer,
        authors,
        materializer: &mut materializer,
        opts,
        branch_names,
        last_mark: HashMap::new(),
        branch_tip_state: HashMap::new(),
    };

    ctx.process_chain(project_file, master, &[], SystemTime::UNIX_EPOCH, &trunk)?;
    ctx.emit_tips(tips)?;

    Ok(())
}

struct Context<'a, W: Write + Debug> {
    manager: &'a mut Manager,
    writer: &'a mut Writer<W>,
    authors: &'a AuthorMap,
    materializer: &'a mut Materializer,
    opts: &'a Options,
    branch_names: Vec<String>,
    last_mark: HashMap<BranchId, Mark>,
    /// Each branch's last-known checkpointed file list and date, kept
    /// live across the whole recursive walk (unlike `process_chain`'s
    /// own locals, which die with that call's stack frame) so the
    /// uncheckpointed tip diff in [`Context::emit_tips`] has something
    /// to diff against once the walk is done.
    branch_tip_state: HashMap<BranchId, (Vec<CheckpointEntry>, SystemTime)>,
}

impl<'a, W: Write + Debug> Context<'a, W> {
    fn branch_ref(&self, branch: BranchId) -> anyhow::Result<String> {
        Ok(format!("refs/heads/{}", self.manager.branch(branch)?.name))
    }

    /// Processes one branch's ascending revision chain, diffing each
    /// checkpoint against the previous and recursing into any child
    /// branches rooted along the way.
    fn process_chain(
        &mut self,
        project_file: RcsFileId,
        branch: BranchId,
        initial_entries: &[CheckpointEntry],
        initial_date: SystemTime,
        chain: &[Revision],
    ) -> anyhow::Result<()> {
        let mut old_entries: Vec<CheckpointEntry> = initial_entries.to_vec();
        let mut old_date = initial_date;

        for revision in chain {
            let branches_here = self
                .manager
                .rcs_file(project_file)?
                .versions
                .get(revision)
                .map(|v| v.branches.clone())
                .unwrap_or_default();

            let checkpoint = match self.manager.checkpoint(revision) {
                Some(cp) => cp.clone(),
                None => {
                    log::warn!("no checkpoint parsed for project revision {}", revision);
                    continue;
                }
            };
            let new_date = checkpoint_date(self.manager, project_file, revision);

            let changeset = changeset::build(self.manager, &old_entries, old_date, &checkpoint.entries, new_date);
            let commits = changeset::merge(self.manager, &changeset, new_date);

            for commit in commits {
                self.emit_commit(branch, revision, commit)?;
            }

            if let Some(sym) = self.commit_symbol(project_file, revision)? {
                if self.last_mark.contains_key(&branch) {
                    let tagger = Identity::new(None, "mkssi-import@localhost".to_string(), new_date)?;
                    self.writer.tag(Tag::new(
                        sym,
                        self.branch_ref(branch)?,
                        tagger,
                        format!("Checkpoint at rev. {}\n", revision),
                    ))?;
                }
            }

            for branch_root in &branches_here {
                let name = self.branch_names.pop().unwrap_or_else(|| format!("variant-{}", branch_root));
                let child = self.manager.add_branch(state::Branch::new(
                    name,
                    branch_root.clone(),
                    Some(branch),
                    new_date,
                ))?;
                if let Some(&mark) = self.last_mark.get(&branch) {
                    self.last_mark.insert(child, mark);
                }

                let child_chain = follow_next_chain(self.manager, project_file, branch_root)?;
                self.process_chain(project_file, child, &checkpoint.entries, new_date, &child_chain)?;
            }

            old_entries = checkpoint.entries;
            old_date = new_date;
        }

        self.branch_tip_state.insert(branch, (old_entries, old_date));

        Ok(())
    }

    /// §4.11 step 6: for each branch with an uncheckpointed working-copy
    /// tip, diffs its last-known checkpointed file list against the tip
    /// file list (dated by the tip `project.pj`'s on-disk mtime), emits
    /// the resulting commits, and marks the branch's new head with a
    /// demarcating tag so the uncheckpointed state is distinguishable
    /// from a real MKSSI checkpoint.
    fn emit_tips(&mut self, tips: &HashMap<String, Tip>) -> anyhow::Result<()> {
        for (branch_name, tip) in tips {
            let branch = match self.manager.branch_id_by_name(branch_name) {
                Some(b) => b,
                None => {
                    log::warn!("tip project directory names unknown branch {}", branch_name);
                    continue;
                }
            };
            let (old_entries, old_date) = self
                .branch_tip_state
                .get(&branch)
                .cloned()
                .unwrap_or_else(|| (Vec::new(), SystemTime::UNIX_EPOCH));

            self.manager.branch_mut(branch)?.tip_file_list = Some(tip.file_list.clone());

            let changeset = changeset::build(self.manager, &old_entries, old_date, &tip.file_list.entries, tip.mtime);
            let commits = changeset::merge(self.manager, &changeset, tip.mtime);
            if commits.is_empty() {
                continue;
            }

            for commit in commits {
                self.emit_commit(branch, &Revision::Tip, commit)?;
            }

            if self.last_mark.contains_key(&branch) {
                let tagger = Identity::new(None, "mkssi-import@localhost".to_string(), tip.mtime)?;
                self.writer.tag(Tag::new(
                    format!("{}-tip", branch_name),
                    self.branch_ref(branch)?,
                    tagger,
                    "Uncheckpointed working tip\n".to_string(),
                ))?;
            }
        }
        Ok(())
    }

    fn emit_commit(&mut self, branch: BranchId, project_revision: &Revision, commit: changeset::Commit) -> anyhow::Result<()> {
        let identity = self.resolve_identity(&commit.committer, commit.date)?;

        let mut builder = CommitBuilder::new(self.branch_ref(branch)?);
        builder.committer(identity).message(commit.message);
        if let Some(&from) = self.last_mark.get(&branch) {
            builder.from(from);
        }

        for op in &commit.ops {
            match op {
                changeset::CommitOp::RenameDir { old, new } => {
                    builder.add_file_command(FileCommand::Rename { from: old.clone(), to: new.clone() });
                }
                changeset::CommitOp::RenameFile { old, new } => {
                    builder.add_file_command(FileCommand::Rename { from: old.clone(), to: new.clone() });
                }
                changeset::CommitOp::Delete { path } => {
                    builder.add_file_command(FileCommand::Delete { path: path.clone() });
                }
                changeset::CommitOp::Add { file, path, revision } | changeset::CommitOp::Update { file, path, revision } => {
                    let mark = self.materializer.blob_for(
                        self.manager,
                        self.writer,
                        &self.opts.materialize,
                        *file,
                        revision,
                        project_revision,
                        path,
                    )?;
                    let executable = self
                        .manager
                        .rcs_file(*file)?
                        .derived(revision)
                        .map(|d| d.executable)
                        .unwrap_or(false);
                    let mode = if executable { Mode::Executable } else { Mode::Normal };
                    builder.add_file_command(FileCommand::Modify { mode, mark, path: path.clone() });
                }
            }
        }

        let mark = self.writer.command(builder.build()?)?;
        self.last_mark.insert(branch, mark);
        Ok(())
    }

    fn resolve_identity(&self, committer: &changeset::Committer, date: SystemTime) -> anyhow::Result<Identity> {
        match committer {
            changeset::Committer::Fixed { name, email } => {
                Ok(Identity::new(Some(name.clone()), email.clone(), date)?)
            }
            changeset::Committer::Author(username) => match self.authors.resolve(username) {
                Some(identity) => Ok(Identity::new(Some(identity.name), identity.email, date)?),
                None => Ok(Identity::new(Some(username.clone()), format!("{}@localhost", username), date)?),
            },
        }
    }

    fn commit_symbol(&self, project_file: RcsFileId, revision: &Revision) -> anyhow::Result<Option<String>> {
        let file = self.manager.rcs_file(project_file)?;
        Ok(file
            .symbols
            .iter()
            .find(|(_, rev)| rev == revision)
            .map(|(sym, _)| sym.to_string()))
    }
}

/// Follows `Version.next` from `start` until it runs out, collecting
/// every revision visited in the order encountered (descending on the
/// trunk, ascending on a branch).
fn follow_next_chain(manager: &Manager, file: RcsFileId, start: &Revision) -> anyhow::Result<Vec<Revision>> {
    let mut chain = Vec::new();
    let mut current = Some(start.clone());
    while let Some(revision) = current {
        let next = manager
            .rcs_file(file)?
            .versions
            .get(&revision)
            .and_then(|v| v.next.clone());
        chain.push(revision);
        current = next;
    }
    Ok(chain)
}

/// Applies `--trunk-branch`: truncates the ascending trunk chain so it
/// ends exactly at `limit` (§4.11 step 4). Revisions past that point
/// have no home and are dropped. MKSSI occasionally rolls the nominal
/// trunk straight over into the next major number without ever
/// revisiting `limit` itself; when that happens, fall back to cutting
/// at `(major+1).1` instead. If neither revision was ever walked, the
/// chain is left untouched.
fn truncate_trunk_at_limit(trunk: Vec<Revision>, limit: &Revision) -> Vec<Revision> {
    if let Some(pos) = trunk.iter().position(|r| r == limit) {
        return trunk[..=pos].to_vec();
    }

    if let Some(major) = limit.major() {
        if let Ok(rollover) = Revision::new(vec![major + 1, 1]) {
            if let Some(pos) = trunk.iter().position(|r| *r == rollover) {
                return trunk[..pos].to_vec();
            }
        }
    }

    trunk
}

fn checkpoint_date(manager: &Manager, project_file: RcsFileId, revision: &Revision) -> SystemTime {
    manager
        .rcs_file(project_file)
        .ok()
        .and_then(|file| file.versions.get(revision))
        .map(|version| version.date)
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn revs(strs: &[&str]) -> Vec<Revision> {
        strs.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn truncate_trunk_at_exact_revision() {
        let trunk = revs(&["1.1", "1.2", "1.3", "1.4"]);
        let limit: Revision = "1.3".parse().unwrap();
        assert_eq!(truncate_trunk_at_limit(trunk, &limit), revs(&["1.1", "1.2", "1.3"]));
    }

    #[test]
    fn truncate_trunk_falls_back_to_rollover() {
        // 1.3 never appears on this chain: MKSSI rolled straight from
        // 1.2 into major 2.
        let trunk = revs(&["1.1", "1.2", "2.1", "2.2"]);
        let limit: Revision = "1.3".parse().unwrap();
        assert_eq!(truncate_trunk_at_limit(trunk, &limit), revs(&["1.1", "1.2"]));
    }

    #[test]
    fn truncate_trunk_leaves_chain_untouched_when_unmatched() {
        let trunk = revs(&["1.1", "1.2"]);
        let limit: Revision = "9.9".parse().unwrap();
        assert_eq!(truncate_trunk_at_limit(trunk.clone(), &limit), trunk);
    }
}

/// Branch table entries in ascending-revision order, consumed (via
/// `Vec::pop`, so reversed here first) as branch roots are discovered
/// during the trunk-forward walk.
fn branch_name_queue(manager: &Manager) -> Vec<String> {
    let mut entries: Vec<_> = manager
        .project()
        .map(|p| p.branch_table.clone())
        .unwrap_or_default();
    entries.sort_by(|a, b| a.revision.cmp(&b.revision));
    let mut names: Vec<String> = entries.into_iter().map(|e| e.name).collect();
    names.reverse();
    names
}
