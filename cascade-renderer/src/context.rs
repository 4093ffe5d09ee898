//! Template context: the data a version template can reference.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::RenderError;

/// Data accumulated over a run and shared with every version template.
///
/// Owned by the run that creates it; nothing is kept between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateData {
    /// Pull requests published so far, keyed by repository name.
    pub pull_requests: BTreeMap<String, PullRequestData>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestData {
    pub sha: String,
}

impl TemplateData {
    /// Record the head commit of a pull request on `repo`.
    ///
    /// An empty SHA is ignored; a later pull request on the same repository
    /// replaces the earlier one.
    pub fn record_pull_request(&mut self, repo: impl Into<String>, sha: impl Into<String>) {
        let sha = sha.into();
        if sha.is_empty() {
            return;
        }
        self.pull_requests.insert(repo.into(), PullRequestData { sha });
    }

    pub fn pull_request_sha(&self, repo: &str) -> Option<&str> {
        self.pull_requests.get(repo).map(|pr| pr.sha.as_str())
    }
}

/// Rendering payload for one target repository.
#[derive(Debug, Clone, Serialize)]
pub struct VersionContext<'a> {
    /// The literal version being propagated.
    pub version: &'a str,
    /// The repository the change is applied to.
    pub git_url: &'a str,
    pub pull_requests: &'a BTreeMap<String, PullRequestData>,
}

impl<'a> VersionContext<'a> {
    pub fn new(version: &'a str, git_url: &'a str, data: &'a TemplateData) -> Self {
        Self {
            version,
            git_url,
            pull_requests: &data.pull_requests,
        }
    }

    /// Convert into a [`tera::Context`] for rendering.
    pub fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        let value = serde_json::to_value(self)?;
        Ok(tera::Context::from_value(value)?)
    }
}
