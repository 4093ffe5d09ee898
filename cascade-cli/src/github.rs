//! Repository discovery through the GitHub GraphQL API.

use serde::Deserialize;
use serde_json::json;

use cascade_sync::{DiscoveredRepository, RepositoryDiscovery, SyncError};

const GRAPHQL_URL: &str = "https://api.github.com/graphql";

const REPOSITORIES_QUERY: &str = r#"
query($owner: String!, $cursor: String) {
  repositoryOwner(login: $owner) {
    repositories(first: 100, after: $cursor) {
      nodes {
        name
        isArchived
        object(expression: "HEAD:go.mod") {
          ... on Blob {
            text
          }
        }
      }
      pageInfo {
        hasNextPage
        endCursor
      }
    }
  }
}
"#;

pub struct GithubDiscovery {
    agent: ureq::Agent,
    endpoint: String,
    token: String,
}

impl GithubDiscovery {
    pub fn new(token: String) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
            endpoint: GRAPHQL_URL.to_string(),
            token,
        }
    }

    fn query_page(&self, owner: &str, cursor: Option<&str>) -> Result<Page, SyncError> {
        let network = |message: String| SyncError::Network {
            target: format!("{} for owner {owner}", self.endpoint),
            message,
        };
        let response = self
            .agent
            .post(&self.endpoint)
            .set("Authorization", &format!("bearer {}", self.token))
            .send_json(json!({
                "query": REPOSITORIES_QUERY,
                "variables": { "owner": owner, "cursor": cursor },
            }))
            .map_err(|e| network(e.to_string()))?;
        let body: GraphqlResponse = response.into_json().map_err(|e| network(e.to_string()))?;
        body.into_page().map_err(network)
    }
}

impl RepositoryDiscovery for GithubDiscovery {
    fn repositories(&self, owner: &str) -> Result<Vec<DiscoveredRepository>, SyncError> {
        let mut found = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.query_page(owner, cursor.as_deref())?;
            found.extend(page.nodes.into_iter().map(|node| node.into_repository(owner)));
            match page.page_info {
                PageInfo {
                    has_next_page: true,
                    end_cursor: Some(next),
                } => cursor = Some(next),
                _ => break,
            }
        }
        tracing::debug!("found {} repositories for {owner}", found.len());
        Ok(found)
    }
}

// ---------------------------------------------------------------------------
// Response model
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<Data>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Data {
    repository_owner: Option<Owner>,
}

#[derive(Debug, Deserialize)]
struct Owner {
    repositories: Page,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page {
    #[serde(default)]
    nodes: Vec<Node>,
    page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Node {
    name: String,
    #[serde(default)]
    is_archived: bool,
    object: Option<Blob>,
}

#[derive(Debug, Deserialize)]
struct Blob {
    text: Option<String>,
}

impl GraphqlResponse {
    fn into_page(self) -> Result<Page, String> {
        if !self.errors.is_empty() {
            let messages: Vec<_> = self.errors.into_iter().map(|e| e.message).collect();
            return Err(messages.join("; "));
        }
        self.data
            .and_then(|d| d.repository_owner)
            .map(|o| o.repositories)
            .ok_or_else(|| "owner not found".to_string())
    }
}

impl Node {
    fn into_repository(self, owner: &str) -> DiscoveredRepository {
        DiscoveredRepository {
            owner: owner.to_string(),
            name: self.name,
            manifest: self.object.and_then(|b| b.text).unwrap_or_default(),
            archived: self.is_archived,
        }
    }
}
