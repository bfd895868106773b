// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    clap::{value_parser, Arg, ArgAction, ArgMatches, Command},
    log::{info, LevelFilter},
    rpm_repository::{
        config::RepositoryConfig,
        metadata::repomd::RepoMd,
        package::RpmCommandInspector,
        repository::{Repository, INDEX_FILE_NAME, REPODATA_DIR},
        signing::GpgSigner,
        RpmRepositoryError,
    },
    std::path::PathBuf,
    thiserror::Error,
};

const ENHANCE_ABOUT: &str = "\
Write extension metadata of an RPM repository.

The existing repodata/repomd.xml under DIR is read first. Entries for metadata
this run doesn't produce are kept unless --prune-empty is given.

Packages (--primary) are every *.rpm under DIR except delta RPMs. Delta RPMs
(--deltas) named name-oldver_newver-oldrel_newrel.arch.delta.rpm are recorded
for the package they produce.

EULAs (--eulas) are read from *.eula files next to packages: foo.eula is
attached to every foo-*.rpm in the same directory whose package name is foo.
Keywords (--keywords) are read the same way from *.keywords files, one per line.

Updates (--updates) are read from *.update YAML files. Each file is a mapping
of update keys to update fields (id, title, status, from, type, version,
release, issued, description, references, packages). Blank fields are filled
from the description and package list. --split-updates DIR additionally writes
each update to DIR/update-<id>-<version>.xml.

Packages are inspected with `rpm`. Signing (--sign) requires `gpg` and
produces repomd.xml.asc and repomd.xml.key.
";

#[derive(Debug, Error)]
pub enum RrtError {
    #[error("argument parsing error: {0:?}")]
    Clap(#[from] clap::Error),

    #[error("{0:?}")]
    RpmRepository(#[from] RpmRepositoryError),

    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("invalid sub-command: {0}")]
    InvalidSubCommand(String),
}

pub type Result<T> = std::result::Result<T, RrtError>;

fn app() -> Command {
    let app = Command::new("RPM Repository Tool")
        .version("0.1")
        .author("Gregory Szorc <gregory.szorc@gmail.com>")
        .about("Generate and enhance RPM repository metadata")
        .arg_required_else_help(true);

    let app = app.arg(
        Arg::new("verbose")
            .long("verbose")
            .short('v')
            .action(ArgAction::Count)
            .global(true)
            .help("Increase logging verbosity. Can be specified multiple times"),
    );

    let app = app.subcommand(
        Command::new("enhance")
            .about("Write extension metadata and the index of a repository")
            .long_about(ENHANCE_ABOUT)
            .arg(
                Arg::new("dir")
                    .required(true)
                    .value_parser(value_parser!(PathBuf))
                    .help("Repository root directory"),
            )
            .arg(
                Arg::new("config")
                    .long("config")
                    .value_parser(value_parser!(PathBuf))
                    .help("YAML file with repository settings"),
            )
            .arg(
                Arg::new("outputdir")
                    .long("outputdir")
                    .short('o')
                    .value_parser(value_parser!(PathBuf))
                    .help("Directory repodata/ is written to (defaults to DIR)"),
            )
            .arg(
                Arg::new("indent")
                    .long("indent")
                    .value_parser(value_parser!(usize))
                    .help("Spaces per nesting level in written XML"),
            )
            .arg(
                Arg::new("expire")
                    .long("expire")
                    .value_parser(value_parser!(u64))
                    .help("Seconds after which the metadata should be considered expired"),
            )
            .arg(
                Arg::new("repo-products")
                    .long("repo-products")
                    .action(ArgAction::Append)
                    .num_args(1..)
                    .help("Products the repository provides content for"),
            )
            .arg(
                Arg::new("repo-keywords")
                    .long("repo-keywords")
                    .action(ArgAction::Append)
                    .num_args(1..)
                    .help("Keywords to tag the repository with"),
            )
            .arg(
                Arg::new("updates")
                    .long("updates")
                    .value_parser(value_parser!(PathBuf))
                    .help("Directory containing *.update descriptors"),
            )
            .arg(
                Arg::new("split-updates")
                    .long("split-updates")
                    .value_parser(value_parser!(PathBuf))
                    .help("Also write each update to its own file in this directory"),
            )
            .arg(
                Arg::new("primary")
                    .long("primary")
                    .action(ArgAction::SetTrue)
                    .help("Add every package to primary.xml"),
            )
            .arg(
                Arg::new("deltas")
                    .long("deltas")
                    .action(ArgAction::SetTrue)
                    .help("Index *.delta.rpm files"),
            )
            .arg(
                Arg::new("eulas")
                    .long("eulas")
                    .action(ArgAction::SetTrue)
                    .help("Attach *.eula files to packages"),
            )
            .arg(
                Arg::new("keywords")
                    .long("keywords")
                    .action(ArgAction::SetTrue)
                    .help("Tag packages with keywords from *.keywords files"),
            )
            .arg(
                Arg::new("sign")
                    .long("sign")
                    .help("GPG key id to sign repomd.xml with"),
            )
            .arg(
                Arg::new("prune-empty")
                    .long("prune-empty")
                    .action(ArgAction::SetTrue)
                    .help("Remove index entries and files of metadata that is empty in this run"),
            ),
    );

    app.subcommand(
        Command::new("show-index")
            .about("Print the resources in a repository index")
            .arg(
                Arg::new("dir")
                    .required(true)
                    .value_parser(value_parser!(PathBuf))
                    .help("Repository root directory"),
            ),
    )
}

pub fn run_cli() -> Result<()> {
    let mut app = app();
    let matches = app.clone().get_matches();

    let log_level = match matches.get_count("verbose") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    // Disable log context except at higher log levels.
    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    builder.init();

    match matches.subcommand() {
        Some(("enhance", args)) => command_enhance(args),
        Some(("show-index", args)) => command_show_index(args),
        Some((command, _)) => Err(RrtError::InvalidSubCommand(command.to_string())),
        None => {
            app.print_help()?;
            Ok(())
        }
    }
}

/// Resolve settings from an optional config file overridden by arguments.
fn config_from_args(args: &ArgMatches) -> Result<RepositoryConfig> {
    let dir = args
        .get_one::<PathBuf>("dir")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));

    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => {
            let mut config = RepositoryConfig::from_yaml_path(path)?;
            config.dir = dir;
            config
        }
        None => RepositoryConfig::new(dir),
    };

    if let Some(path) = args.get_one::<PathBuf>("outputdir") {
        config.output_dir = Some(path.clone());
    }
    if let Some(indent) = args.get_one::<usize>("indent") {
        config.indent = *indent;
    }
    if let Some(expire) = args.get_one::<u64>("expire") {
        config.expire = Some(*expire);
    }
    if let Some(products) = args.get_many::<String>("repo-products") {
        config.repo_products.extend(products.cloned());
    }
    if let Some(keywords) = args.get_many::<String>("repo-keywords") {
        config.repo_keywords.extend(keywords.cloned());
    }
    if let Some(path) = args.get_one::<PathBuf>("updates") {
        config.updates_dir = Some(path.clone());
    }
    if let Some(path) = args.get_one::<PathBuf>("split-updates") {
        config.split_updates = Some(path.clone());
    }
    if args.get_flag("primary") {
        config.primary = true;
    }
    if args.get_flag("deltas") {
        config.deltas = true;
    }
    if args.get_flag("eulas") {
        config.eulas = true;
    }
    if args.get_flag("keywords") {
        config.keywords = true;
    }
    if let Some(key) = args.get_one::<String>("sign") {
        config.sign_key = Some(key.clone());
    }
    if args.get_flag("prune-empty") {
        config.prune_empty_documents = true;
    }

    Ok(config)
}

fn command_enhance(args: &ArgMatches) -> Result<()> {
    let config = config_from_args(args)?;
    let sign_key = config.sign_key.clone();

    let mut repo = Repository::new(config)?;
    repo.scan(&RpmCommandInspector::default())?;

    let published = repo.write()?;
    info!(
        "wrote {} with {} resources",
        published.index_path().display(),
        published.index().len()
    );

    if let Some(key) = sign_key {
        published.sign(&key, &GpgSigner::default())?;
    }

    Ok(())
}

fn command_show_index(args: &ArgMatches) -> Result<()> {
    let dir = args
        .get_one::<PathBuf>("dir")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));

    let index = RepoMd::from_path(dir.join(REPODATA_DIR).join(INDEX_FILE_NAME))?;

    for resource in index.resources() {
        println!("{}", resource.kind);
        println!("  location: {}", resource.location);
        println!(
            "  checksum: {} {}",
            resource.checksum.digest_type().metadata_name(),
            resource.checksum.digest_hex()
        );
        println!(
            "  open-checksum: {} {}",
            resource.open_checksum.digest_type().metadata_name(),
            resource.open_checksum.digest_hex()
        );
        println!("  timestamp: {}", resource.timestamp);
    }

    Ok(())
}
