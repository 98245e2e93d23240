//! Research records. Plain typed documents with embedded child arrays;
//! there is no referential integrity between them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Active,
    Paused,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchProject {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: ProjectStatus,
    #[serde(default)]
    pub papers: Vec<ResearchPaper>,
    #[serde(default)]
    pub experiments: Vec<Experiment>,
    #[serde(default)]
    pub findings: Vec<Finding>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchPaper {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experiment {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub hypothesis: String,
    pub status: ExperimentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
    Planned,
    Running,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub id: Uuid,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

/// Client-supplied shape for project creation; ids and timestamps are
/// assigned server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewResearchProject {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub papers: Vec<ResearchPaper>,
    #[serde(default)]
    pub experiments: Vec<Experiment>,
    #[serde(default)]
    pub findings: Vec<Finding>,
}

impl NewResearchProject {
    pub fn into_project(self, now: DateTime<Utc>) -> anyhow::Result<ResearchProject> {
        anyhow::ensure!(!self.title.trim().is_empty(), "title must be non-empty");
        Ok(ResearchProject {
            id: Uuid::new_v4(),
            title: self.title.trim().to_string(),
            description: self.description,
            status: ProjectStatus::Active,
            papers: self.papers,
            experiments: self.experiments,
            findings: self.findings,
            created_at: now,
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_project_gets_id_and_active_status() {
        let now = Utc::now();
        let project = NewResearchProject {
            title: "  LLM eval harness ".to_string(),
            description: String::new(),
            papers: vec![],
            experiments: vec![],
            findings: vec![],
        }
        .into_project(now)
        .unwrap();

        assert_eq!(project.title, "LLM eval harness");
        assert_eq!(project.status, ProjectStatus::Active);
        assert_eq!(project.created_at, now);
    }

    #[test]
    fn blank_title_is_rejected() {
        let res = NewResearchProject {
            title: "   ".to_string(),
            description: String::new(),
            papers: vec![],
            experiments: vec![],
            findings: vec![],
        }
        .into_project(Utc::now());
        assert!(res.is_err());
    }
}
