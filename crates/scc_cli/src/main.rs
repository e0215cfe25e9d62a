//! scc CLI - read-only diagnostics over the source-control provider layer.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use scc::SourceKind;
use scc::source::FETCH_ALL;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scc")]
#[command(version)]
#[command(about = "Inspect GitHub and GitLab accounts through one provider interface")]
#[command(
    long_about = "scc talks to GitHub or GitLab through the same provider facade an \
onboarding service uses: it validates tokens, lists organizations and repositories, \
and reads repository settings. Every command is read-only."
)]
#[command(after_long_help = r#"EXAMPLES
    Check a GitHub token has the scopes a policy repo needs:
        $ scc validate -s repo -s '(admin|read):org'

    List every group visible to a GitLab token:
        $ scc -p gitlab orgs

    Walk an organization's repositories ten at a time:
        $ scc repos octo-org -n 10
        $ scc repos octo-org -n 10 --page-token <next token>

    Generate shell completions:
        $ scc completions bash > ~/.local/share/bash-completion/completions/scc

CONFIGURATION
    scc reads configuration from:
      1. ~/.config/scc/config.toml (or $XDG_CONFIG_HOME/scc/config.toml)
      2. ./scc.toml
      3. Environment variables (SCC_* prefix, `__` between sections)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    SCC_PROVIDER                       Provider used when -p is not given
    SCC_TOKEN                          Token used instead of the configured one
    SCC_GITHUB__TOKEN                  GitHub personal access token
    SCC_GITLAB__TOKEN                  GitLab personal access token
    SCC_SOURCE__GITLAB_URL             GitLab host (default: https://gitlab.com)
    SCC_SOURCE__GITHUB_API_URL         GitHub API (default: https://api.github.com)
"#)]
struct Cli {
    /// Provider to talk to (github or gitlab)
    #[arg(
        short,
        long,
        global = true,
        env = "SCC_PROVIDER",
        default_value = "github"
    )]
    provider: SourceKind,

    /// Access token (default from config for the chosen provider)
    #[arg(short, long, global = true, env = "SCC_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Page selection shared by the listing commands.
#[derive(Debug, Clone, clap::Args)]
struct PageArgs {
    /// Items per page, up to 100; -1 fetches everything
    #[arg(
        short = 'n',
        long,
        default_value_t = FETCH_ALL,
        allow_negative_numbers = true
    )]
    size: i32,

    /// Token from a previous page's output
    #[arg(long, default_value = "")]
    page_token: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the token and, on GitHub, its scopes
    Validate {
        /// Required scope pattern (regular expression), may be repeated
        #[arg(short = 's', long = "scope")]
        scopes: Vec<String>,
    },
    /// Show the authenticated user and the repositories they own
    Profile,
    /// List organizations (GitHub) or groups (GitLab)
    Orgs {
        #[command(flatten)]
        page: PageArgs,
    },
    /// List repositories of a user, organization or group
    Repos {
        /// Owner login or group path
        owner: String,

        #[command(flatten)]
        page: PageArgs,
    },
    /// Show a single repository
    Repo {
        owner: String,
        name: String,
    },
    /// Print a repository's default branch
    DefaultBranch {
        owner: String,
        name: String,
    },
    /// Check whether a CI secret or variable exists
    HasSecret {
        owner: String,
        name: String,
        /// Secret or variable name
        secret: String,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("scc=info,scc_cli=info"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        commands::meta::handle_completions(*shell)?;
        return Ok(());
    }

    // Load configuration (config file -> env vars -> defaults)
    let config = config::Config::load();

    commands::source::handle_source(cli, &config).await
}
