//! Conversions from GitHub types to source types.

use super::types::{GitHubRepo, RepoNode};
use crate::source::Repo;

fn actions_url(url: &str) -> String {
    format!("{}/actions", url.trim_end_matches('/'))
}

impl From<RepoNode> for Repo {
    fn from(node: RepoNode) -> Self {
        Self {
            ci_url: actions_url(&node.url),
            name: node.name,
            org: node.owner.login,
            url: node.url,
        }
    }
}

impl From<GitHubRepo> for Repo {
    fn from(repo: GitHubRepo) -> Self {
        Self {
            ci_url: actions_url(&repo.html_url),
            name: repo.name,
            org: repo.owner.login,
            url: repo.html_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::types::{GitHubUser, RepoOwner};

    #[test]
    fn test_repo_node_conversion() {
        let repo = Repo::from(RepoNode {
            name: "svc".to_string(),
            owner: RepoOwner {
                login: "acme".to_string(),
            },
            url: "https://github.com/acme/svc".to_string(),
        });
        assert_eq!(repo.org, "acme");
        assert_eq!(repo.ci_url, "https://github.com/acme/svc/actions");
    }

    #[test]
    fn test_rest_repo_conversion() {
        let repo = Repo::from(GitHubRepo {
            name: "svc".to_string(),
            full_name: "acme/svc".to_string(),
            html_url: "https://github.com/acme/svc/".to_string(),
            node_id: "R_1".to_string(),
            owner: GitHubUser {
                login: "acme".to_string(),
            },
            default_branch: Some("main".to_string()),
        });
        assert_eq!(repo.name, "svc");
        assert_eq!(repo.ci_url, "https://github.com/acme/svc/actions");
    }
}
