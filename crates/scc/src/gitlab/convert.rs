//! Conversions from GitLab types to source types.

use super::types::{GitLabGroup, GitLabProject};
use crate::source::{Org, Repo};

impl From<GitLabProject> for Repo {
    fn from(project: GitLabProject) -> Self {
        Self {
            ci_url: format!("{}/-/pipelines", project.web_url.trim_end_matches('/')),
            name: project.name,
            org: project.namespace.full_path,
            url: project.web_url,
        }
    }
}

impl From<GitLabGroup> for Org {
    fn from(group: GitLabGroup) -> Self {
        Self {
            name: group.name,
            id: group.full_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gitlab::types::GitLabNamespace;

    #[test]
    fn test_project_conversion() {
        let repo = Repo::from(GitLabProject {
            id: 1,
            name: "svc".to_string(),
            path_with_namespace: "acme/svc".to_string(),
            web_url: "https://gitlab.com/acme/svc".to_string(),
            default_branch: None,
            namespace: GitLabNamespace {
                id: 2,
                full_path: "acme".to_string(),
                kind: "group".to_string(),
            },
        });
        assert_eq!(repo.org, "acme");
        assert_eq!(repo.ci_url, "https://gitlab.com/acme/svc/-/pipelines");
    }

    #[test]
    fn test_group_conversion_uses_full_path_as_id() {
        let org = Org::from(GitLabGroup {
            id: 9,
            name: "Infra".to_string(),
            full_path: "acme/infra".to_string(),
        });
        assert_eq!(org.name, "Infra");
        assert_eq!(org.id, "acme/infra");
    }
}
