use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use git_hunks::diff::format_document;
use git_hunks::{RefreshEvent, Stager, StagerError};
use log::{LevelFilter, warn};
use std::io;

#[derive(Parser)]
#[command(name = "git-hunks")]
#[command(about = "Stage, unstage and discard individual git hunks", version)]
struct Cli {
    /// Path inside the repository to operate on
    #[arg(short = 'C', long = "repo", env = "GIT_HUNKS_REPO", default_value = ".")]
    repo: String,

    /// git executable to run
    #[arg(long, env = "GIT_HUNKS_GIT", default_value = "git")]
    git: String,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show staged and unstaged files
    Status,
    /// List the hunks of a file's diff with their indices
    Diff {
        file: String,
        /// Show the staged diff (index vs HEAD)
        #[arg(long)]
        staged: bool,
    },
    /// Stage hunks of a file by index (e.g., "src/lib.rs 0 2")
    Stage {
        file: String,
        #[arg(required = true)]
        indices: Vec<usize>,
    },
    /// Unstage hunks of a file by index
    Unstage {
        file: String,
        #[arg(required = true)]
        indices: Vec<usize>,
    },
    /// Discard hunks of a file's working copy by index
    Discard {
        file: String,
        #[arg(required = true)]
        indices: Vec<usize>,
    },
    /// Stage whole files
    StageFile {
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Unstage whole files
    UnstageFile {
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Throw away all working copy changes to files, deleting new ones
    DiscardFile {
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Stage every change, including untracked files
    StageAll,
    /// Unstage everything
    UnstageAll,
    /// Generate shell completions
    Completions { shell: Shell },
    /// Render the man page
    Man,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).format_timestamp(None);
    // RUST_LOG overrides the -v flags when set
    builder.parse_default_env();
    builder.init();
}

fn publish(event: RefreshEvent) {
    if let RefreshEvent::Failed { message } = event {
        warn!("status refresh failed: {message}");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "git-hunks", &mut io::stdout());
            return Ok(());
        }
        Commands::Man => {
            clap_mangen::Man::new(Cli::command()).render(&mut io::stdout())?;
            return Ok(());
        }
        _ => {}
    }

    let stager = Stager::open(&cli.repo, &cli.git, Box::new(publish))?;
    run(&stager, cli.command)?;
    Ok(())
}

fn run(stager: &Stager<git_hunks::GitCli>, command: Commands) -> Result<(), StagerError> {
    match command {
        Commands::Status => println!("{}", stager.status()?),
        Commands::Diff { file, staged } => {
            let doc = stager.document(&file, staged)?;
            println!("{}", format_document(&doc));
        }
        Commands::Stage { file, indices } => stager.stage_hunks(&file, &indices)?,
        Commands::Unstage { file, indices } => stager.unstage_hunks(&file, &indices)?,
        Commands::Discard { file, indices } => stager.discard_hunks(&file, &indices)?,
        Commands::StageFile { files } => stager.stage_files(&files)?,
        Commands::UnstageFile { files } => stager.unstage_files(&files)?,
        Commands::DiscardFile { files } => stager.discard_files(&files)?,
        Commands::StageAll => stager.stage_all()?,
        Commands::UnstageAll => stager.unstage_all()?,
        Commands::Completions { .. } | Commands::Man => {}
    }
    Ok(())
}
