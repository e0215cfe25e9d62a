use console::style;
use scc::source::{PageRequest, PageResponse, Paged};
use scc::{AccessToken, Org, Repo, Source};
use serde::Serialize;

use crate::config::Config;
use crate::{Cli, Commands, PageArgs};

type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// JSON shape of a listing.
#[derive(Serialize)]
struct PagedOutput<'a, T> {
    items: &'a [T],
    page: &'a PageResponse,
}

fn page_request(args: &PageArgs) -> PageRequest {
    PageRequest::new(args.size, args.page_token.clone())
}

fn emit<T: Serialize>(value: &T) -> CommandResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_repo(repo: &Repo) -> String {
    format!(
        "{}/{}  {}  {}",
        style(&repo.org).dim(),
        style(&repo.name).bold(),
        repo.url,
        style(&repo.ci_url).dim()
    )
}

fn render_org(org: &Org) -> String {
    if org.name == org.id {
        style(&org.name).bold().to_string()
    } else {
        format!("{}  {}", style(&org.name).bold(), style(&org.id).dim())
    }
}

/// Footer describing where a listing stopped.
fn render_page(page: &PageResponse) -> String {
    if page.next_token.is_empty() {
        format!("{} of {}", page.result_size, page.total_size)
    } else {
        format!(
            "{} of {}, next page: --page-token {}",
            page.result_size, page.total_size, page.next_token
        )
    }
}

fn print_listing<T: Serialize>(
    paged: &Paged<T>,
    json: bool,
    render: impl Fn(&T) -> String,
) -> CommandResult {
    if json {
        return emit(&PagedOutput {
            items: &paged.items,
            page: &paged.page,
        });
    }
    for item in &paged.items {
        println!("{}", render(item));
    }
    eprintln!("{}", style(render_page(&paged.page)).dim());
    Ok(())
}

pub(crate) async fn handle_source(cli: Cli, config: &Config) -> CommandResult {
    let Cli {
        provider,
        token,
        json,
        command,
    } = cli;

    let token = config.access_token(provider, token).ok_or_else(|| {
        format!(
            "no {provider} token configured, pass --token or set SCC_{}__TOKEN",
            provider.as_str().to_uppercase()
        )
    })?;

    let source = scc::connect(provider, &config.source)?;
    tracing::debug!("Connected {} source: {:?}", provider, config.source);
    run(source.as_ref(), &token, command, json).await
}

async fn run(
    source: &dyn Source,
    token: &AccessToken,
    command: Commands,
    json: bool,
) -> CommandResult {
    match command {
        Commands::Validate { scopes } => {
            source.validate_connection(token, &scopes).await?;
            if json {
                emit(&serde_json::json!({ "provider": source.kind(), "valid": true }))?;
            } else {
                println!("{} {} token is valid", style("✓").green(), source.kind());
            }
        }
        Commands::Profile => {
            let profile = source.profile(token).await?;
            if json {
                emit(&profile)?;
            } else {
                println!("{}", style(&profile.username).bold());
                for repo in &profile.repos {
                    println!("  {}", render_repo(repo));
                }
            }
        }
        Commands::Orgs { page } => {
            let orgs = source.list_orgs(token, Some(&page_request(&page))).await?;
            print_listing(&orgs, json, render_org)?;
        }
        Commands::Repos { owner, page } => {
            let repos = source
                .list_repos(token, &owner, Some(&page_request(&page)))
                .await?;
            print_listing(&repos, json, render_repo)?;
        }
        Commands::Repo { owner, name } => {
            let repo = source.get_repo(token, &owner, &name).await?;
            if json {
                emit(&repo)?;
            } else {
                println!("{}", render_repo(&repo));
            }
        }
        Commands::DefaultBranch { owner, name } => {
            let branch = source.get_default_branch(token, &owner, &name).await?;
            if json {
                emit(&serde_json::json!({ "default_branch": branch }))?;
            } else {
                println!("{branch}");
            }
        }
        Commands::HasSecret {
            owner,
            name,
            secret,
        } => {
            let present = source.has_secret(token, &owner, &name, &secret).await?;
            if json {
                emit(&serde_json::json!({ "secret": secret, "present": present }))?;
            } else if present {
                println!(
                    "{} {} is set on {}/{}",
                    style("✓").green(),
                    secret,
                    owner,
                    name
                );
            } else {
                println!(
                    "{} {} is not set on {}/{}",
                    style("✗").red(),
                    secret,
                    owner,
                    name
                );
            }
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
