use std::{io, path::PathBuf};

use structopt::StructOpt;

mod authormap;
mod discovery;
mod exec;
mod export;
mod materialize;
mod project;
mod sanitize;
mod tip;

use authormap::AuthorMap;

/// Reconstructs a git-fast-import command stream from an MKS Source
/// Integrity (MKSSI v7.5a) repository (§6).
#[derive(Debug, StructOpt)]
#[structopt(name = "mkssi-fast-export")]
struct Opt {
    /// Directory containing `project.pj` and the RCS masters.
    #[structopt(long, parse(from_os_str))]
    rcs_dir: PathBuf,

    /// Working project directory holding uncheckpointed tip revisions.
    #[structopt(long, parse(from_os_str))]
    proj_dir: Option<PathBuf>,

    /// Path substituted into `$Source$`/`$Header$` expansions.
    #[structopt(long, default_value = "")]
    source_dir: String,

    /// Path substituted into `$ProjectName$` expansions.
    #[structopt(long, default_value = "")]
    pname_dir: String,

    /// Treats the trunk as a branch terminating at this revision (an
    /// MKSSI "trunk branch"); commits past it have no home and are
    /// dropped.
    #[structopt(long)]
    trunk_branch: Option<rcs_master::Revision>,

    /// Worker threads used to pre-materialize file revisions; the
    /// fast-import emission order itself stays single-threaded.
    #[structopt(long, short, default_value = "1")]
    jobs: usize,

    /// Plain-text `username = Proper Name <email>` mapping file.
    #[structopt(long, parse(from_os_str))]
    authormap: Option<PathBuf>,

    /// Suppresses normal output; dumps every distinct author username not
    /// resolved by `--authormap` instead.
    #[structopt(long)]
    authorlist: bool,

    /// Logs and skips recoverable per-file errors instead of aborting.
    #[structopt(long)]
    ignore_errors: bool,
}

fn main() -> anyhow::Result<()> {
    let opt = Opt::from_args();
    pretty_env_logger::init();

    let authors = match &opt.authormap {
        Some(path) => AuthorMap::load(path)?,
        None => AuthorMap::default(),
    };

    let mut manager = state::Manager::new();

    log::info!("discovering RCS masters under {}", opt.rcs_dir.display());
    let (ok, corrupt) = discovery::discover(&mut manager, &opt.rcs_dir, opt.ignore_errors)?;
    log::info!("{} masters parsed, {} marked corrupt", ok, corrupt);

    const PROJECTPJ_NAME: &str = "project.pj";

    if opt.authorlist {
        let project_file = manager
            .rcs_file_id_by_path(PROJECTPJ_NAME)
            .ok_or_else(|| anyhow::anyhow!("no {} found under {}", PROJECTPJ_NAME, opt.rcs_dir.display()))?;
        project::parse_all(&mut manager, project_file)?;

        for file_id in manager.rcs_file_ids() {
            let file = manager.rcs_file(file_id)?;
            for version in file.versions.values() {
                authors.resolve(&version.author.to_string());
            }
        }

        for username in authors.unresolved() {
            println!("{}", username);
        }
        return Ok(());
    }

    let tips = match &opt.proj_dir {
        Some(proj_dir) => {
            log::info!("reading uncheckpointed tip state from {}", proj_dir.display());
            tip::read(&mut manager, proj_dir)?
        }
        None => std::collections::HashMap::new(),
    };

    let mut writer = git_fast_import::Writer::new(io::stdout())?;

    let opts = export::Options {
        projectpj_name: PROJECTPJ_NAME.to_string(),
        trunk_branch: opt.trunk_branch,
        jobs: opt.jobs,
        materialize: materialize::Options {
            source_dir: opt.source_dir,
            pname_dir: opt.pname_dir,
            projectpj_name: PROJECTPJ_NAME.to_string(),
        },
    };

    export::run(&mut manager, &mut writer, &authors, &tips, &opts)?;

    // Only reached on success: a run that bails out above drops `writer`
    // without the `done` trailer, so downstream consumers can tell a
    // truncated stream from a complete one (§7).
    writer.finish()?;

    Ok(())
}
