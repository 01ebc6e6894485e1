//! `azure-devops-tool`: Azure DevOps REST access
//!
//! One tool whose `action` argument selects the operation. Actions cover
//! projects and team members, work items and their comments, sprints and
//! boards, pipelines, repositories and pull requests, and test plans. Every
//! result is rendered as a short markdown listing.
//!
//! Requests authenticate with HTTP basic auth, an empty user name and the
//! personal access token as password.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use crate::config::AzureDevOpsConfig;
use crate::error::{RelayError, Result};
use crate::mcp::types::{CallToolResponse, McpTool};
use crate::tools::McpToolHandler;

pub const AZURE_DEVOPS_TOOL_NAME: &str = "azure-devops-tool";

const API_VERSION: &str = "7.0";
const COMMENTS_API_VERSION: &str = "7.0-preview.3";
const JSON_PATCH: &str = "application/json-patch+json";
const DEFAULT_COUNT: usize = 100;
const ERROR_BODY_LIMIT: usize = 200;

const WORK_ITEM_TYPES: &[&str] = &["Bug", "Task", "User Story", "Feature", "Epic", "Issue"];

/// Operation selected by the `action` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ListProjects,
    ListTeamMembers,
    ListWorkItems,
    GetWorkItem,
    CreateWorkItem,
    UpdateWorkItem,
    DeleteWorkItem,
    AddComment,
    ListComments,
    ListSprints,
    GetCurrentSprint,
    ListBoards,
    GetBoardColumns,
    ListPipelines,
    GetPipelineRuns,
    RunPipeline,
    ListRepositories,
    ListBranches,
    ListCommits,
    ListPullRequests,
    GetPullRequest,
    ListTestPlans,
    ListTestSuites,
    ListTestCases,
}

impl Action {
    pub const ALL: [Action; 24] = [
        Action::ListProjects,
        Action::ListWorkItems,
        Action::GetWorkItem,
        Action::CreateWorkItem,
        Action::UpdateWorkItem,
        Action::DeleteWorkItem,
        Action::ListTeamMembers,
        Action::ListSprints,
        Action::GetCurrentSprint,
        Action::ListBoards,
        Action::GetBoardColumns,
        Action::ListPipelines,
        Action::GetPipelineRuns,
        Action::RunPipeline,
        Action::ListRepositories,
        Action::ListPullRequests,
        Action::GetPullRequest,
        Action::ListBranches,
        Action::ListCommits,
        Action::ListTestPlans,
        Action::ListTestSuites,
        Action::ListTestCases,
        Action::AddComment,
        Action::ListComments,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::ListProjects => "list_projects",
            Action::ListTeamMembers => "list_team_members",
            Action::ListWorkItems => "list_work_items",
            Action::GetWorkItem => "get_work_item",
            Action::CreateWorkItem => "create_work_item",
            Action::UpdateWorkItem => "update_work_item",
            Action::DeleteWorkItem => "delete_work_item",
            Action::AddComment => "add_comment",
            Action::ListComments => "list_comments",
            Action::ListSprints => "list_sprints",
            Action::GetCurrentSprint => "get_current_sprint",
            Action::ListBoards => "list_boards",
            Action::GetBoardColumns => "get_board_columns",
            Action::ListPipelines => "list_pipelines",
            Action::GetPipelineRuns => "get_pipeline_runs",
            Action::RunPipeline => "run_pipeline",
            Action::ListRepositories => "list_repositories",
            Action::ListBranches => "list_branches",
            Action::ListCommits => "list_commits",
            Action::ListPullRequests => "list_pull_requests",
            Action::GetPullRequest => "get_pull_request",
            Action::ListTestPlans => "list_test_plans",
            Action::ListTestSuites => "list_test_suites",
            Action::ListTestCases => "list_test_cases",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = RelayError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| RelayError::Tool(format!("Unknown action: {}", s)))
    }
}

#[derive(Debug, Deserialize)]
struct ActionArgs {
    action: String,
    project: Option<String>,
    work_item_id: Option<u64>,
    work_item_type: Option<String>,
    title: Option<String>,
    description: Option<String>,
    state: Option<String>,
    assigned_to: Option<String>,
    query: Option<String>,
    sprint: Option<String>,
    pipeline_id: Option<u64>,
    repo_name: Option<String>,
    pull_request_id: Option<u64>,
    branch: Option<String>,
    test_plan_id: Option<u64>,
    test_suite_id: Option<u64>,
    comment: Option<String>,
    count: Option<usize>,
}

impl ActionArgs {
    /// `add` operations for every work item field present in the arguments.
    fn field_operations(&self) -> Vec<Value> {
        [
            ("System.Title", &self.title),
            ("System.Description", &self.description),
            ("System.State", &self.state),
            ("System.AssignedTo", &self.assigned_to),
            ("System.IterationPath", &self.sprint),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.as_deref().map(|value| add_field(field, value)))
        .collect()
    }
}

/// Talks to one Azure DevOps organization.
#[derive(Clone)]
pub struct AzureDevOpsTool {
    client: Client,
    organization: String,
    base_url: Url,
    pat: String,
}

impl AzureDevOpsTool {
    /// # Errors
    ///
    /// Returns error if `api_url` is not a usable base URL or the HTTP
    /// client cannot be built.
    pub fn from_config(config: &AzureDevOpsConfig) -> Result<Self> {
        let mut base_url = Url::parse(&config.api_url).map_err(RelayError::from)?;
        base_url
            .path_segments_mut()
            .map_err(|_| {
                RelayError::Config(format!("Invalid Azure DevOps API URL: {}", config.api_url))
            })?
            .pop_if_empty()
            .push(&config.organization);

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| RelayError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let pat = config.pat.clone().unwrap_or_default();
        if pat.is_empty() {
            tracing::warn!(
                organization = %config.organization,
                "no Azure DevOps PAT configured, requests will likely be rejected"
            );
        }

        Ok(Self {
            client,
            organization: config.organization.clone(),
            base_url,
            pat,
        })
    }

    /// Organization URL plus `segments`, with `api-version` defaulted.
    fn endpoint(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RelayError::Tool(format!("Invalid Azure DevOps URL: {}", self.base_url)))?
            .extend(segments);
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
            if !query.iter().any(|(key, _)| *key == "api-version") {
                pairs.append_pair("api-version", API_VERSION);
            }
        }
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        let response = request
            .basic_auth("", Some(&self.pat))
            .send()
            .await
            .map_err(|e| RelayError::Tool(format!("Azure DevOps request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            RelayError::Tool(format!("Failed to read Azure DevOps response: {}", e))
        })?;

        if !status.is_success() {
            let excerpt: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            tracing::debug!(status = status.as_u16(), "Azure DevOps request rejected");
            return Err(
                RelayError::Tool(format!("API Error ({}): {}", status.as_u16(), excerpt)).into(),
            );
        }
        if body.trim().is_empty() {
            return Ok(json!({}));
        }
        Ok(serde_json::from_str::<Value>(&body).map_err(RelayError::from)?)
    }

    async fn get(&self, url: Url) -> Result<Value> {
        self.send(self.client.get(url)).await
    }

    async fn post_json(&self, url: Url, body: &Value) -> Result<Value> {
        self.send(self.client.post(url).json(body)).await
    }

    async fn send_patch_document(
        &self,
        method: Method,
        url: Url,
        operations: &[Value],
    ) -> Result<Value> {
        let body = serde_json::to_string(operations).map_err(RelayError::from)?;
        self.send(
            self.client
                .request(method, url)
                .header(CONTENT_TYPE, JSON_PATCH)
                .body(body),
        )
        .await
    }

    /// Id of the first team in `project`; sprint and board APIs are per team.
    async fn default_team(&self, project: &str) -> Result<String> {
        let teams = self
            .get(self.endpoint(&["_apis", "projects", project, "teams"], &[])?)
            .await?;
        items(&teams, "value")
            .first()
            .map(|team| scalar(team, "/id"))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RelayError::Tool(format!("No teams found in {}", project)).into())
    }

    async fn run(&self, action: Action, args: &ActionArgs) -> Result<String> {
        let count = args.count.unwrap_or(DEFAULT_COUNT);
        match action {
            Action::ListProjects => self.list_projects().await,
            Action::ListTeamMembers => {
                self.list_team_members(require_text(&args.project, "project")?)
                    .await
            }
            Action::ListWorkItems => {
                self.list_work_items(
                    require_text(&args.project, "project")?,
                    args.query.as_deref(),
                    count,
                )
                .await
            }
            Action::GetWorkItem => {
                self.get_work_item(require_id(args.work_item_id, "work_item_id")?)
                    .await
            }
            Action::CreateWorkItem => {
                self.create_work_item(
                    require_text(&args.project, "project")?,
                    require_text(&args.work_item_type, "work_item_type")?,
                    require_text(&args.title, "title")?,
                    args,
                )
                .await
            }
            Action::UpdateWorkItem => {
                self.update_work_item(require_id(args.work_item_id, "work_item_id")?, args)
                    .await
            }
            Action::DeleteWorkItem => {
                self.delete_work_item(require_id(args.work_item_id, "work_item_id")?)
                    .await
            }
            Action::AddComment => {
                self.add_comment(
                    require_text(&args.project, "project")?,
                    require_id(args.work_item_id, "work_item_id")?,
                    require_text(&args.comment, "comment")?,
                )
                .await
            }
            Action::ListComments => {
                self.list_comments(
                    require_text(&args.project, "project")?,
                    require_id(args.work_item_id, "work_item_id")?,
                )
                .await
            }
            Action::ListSprints => self.list_sprints(require_text(&args.project, "project")?).await,
            Action::GetCurrentSprint => {
                self.get_current_sprint(require_text(&args.project, "project")?)
                    .await
            }
            Action::ListBoards => self.list_boards(require_text(&args.project, "project")?).await,
            Action::GetBoardColumns => {
                self.get_board_columns(require_text(&args.project, "project")?)
                    .await
            }
            Action::ListPipelines => {
                self.list_pipelines(require_text(&args.project, "project")?)
                    .await
            }
            Action::GetPipelineRuns => {
                self.get_pipeline_runs(
                    require_text(&args.project, "project")?,
                    require_id(args.pipeline_id, "pipeline_id")?,
                    count,
                )
                .await
            }
            Action::RunPipeline => {
                self.run_pipeline(
                    require_text(&args.project, "project")?,
                    require_id(args.pipeline_id, "pipeline_id")?,
                    args.branch.as_deref(),
                )
                .await
            }
            Action::ListRepositories => {
                self.list_repositories(require_text(&args.project, "project")?)
                    .await
            }
            Action::ListBranches => {
                self.list_branches(
                    require_text(&args.project, "project")?,
                    require_text(&args.repo_name, "repo_name")?,
                )
                .await
            }
            Action::ListCommits => {
                self.list_commits(
                    require_text(&args.project, "project")?,
                    require_text(&args.repo_name, "repo_name")?,
                    args.branch.as_deref(),
                    count,
                )
                .await
            }
            Action::ListPullRequests => {
                self.list_pull_requests(
                    require_text(&args.project, "project")?,
                    args.repo_name.as_deref(),
                )
                .await
            }
            Action::GetPullRequest => {
                self.get_pull_request(
                    require_text(&args.project, "project")?,
                    require_text(&args.repo_name, "repo_name")?,
                    require_id(args.pull_request_id, "pull_request_id")?,
                )
                .await
            }
            Action::ListTestPlans => {
                self.list_test_plans(require_text(&args.project, "project")?)
                    .await
            }
            Action::ListTestSuites => {
                self.list_test_suites(
                    require_text(&args.project, "project")?,
                    require_id(args.test_plan_id, "test_plan_id")?,
                )
                .await
            }
            Action::ListTestCases => {
                self.list_test_cases(
                    require_text(&args.project, "project")?,
                    require_id(args.test_plan_id, "test_plan_id")?,
                    require_id(args.test_suite_id, "test_suite_id")?,
                )
                .await
            }
        }
    }

    // Projects and teams

    async fn list_projects(&self) -> Result<String> {
        let result = self.get(self.endpoint(&["_apis", "projects"], &[])?).await?;
        let projects = lines(&result, "value", |project| {
            format!(
                "- **{}**: {}",
                scalar(project, "/name"),
                text_or(project, "/description", "No description")
            )
        });
        Ok(format!(
            "Projects in {}:\n\n{}",
            self.organization,
            projects.join("\n")
        ))
    }

    async fn list_team_members(&self, project: &str) -> Result<String> {
        let teams = self
            .get(self.endpoint(&["_apis", "projects", project, "teams"], &[])?)
            .await?;

        let mut members: Vec<String> = Vec::new();
        for team in items(&teams, "value") {
            let team_id = scalar(team, "/id");
            let result = self
                .get(self.endpoint(
                    &["_apis", "projects", project, "teams", team_id.as_str(), "members"],
                    &[],
                )?)
                .await?;
            for member in items(&result, "value") {
                let line = format!(
                    "- **{}** ({}) - Team: {}",
                    scalar(member, "/identity/displayName"),
                    text_or(member, "/identity/uniqueName", "N/A"),
                    scalar(team, "/name")
                );
                if !members.contains(&line) {
                    members.push(line);
                }
            }
        }
        Ok(format!(
            "Team Members in {}:\n\n{}",
            project,
            members.join("\n")
        ))
    }

    // Work items

    async fn list_work_items(
        &self,
        project: &str,
        query: Option<&str>,
        count: usize,
    ) -> Result<String> {
        let wiql = match query {
            Some(query) => query.to_string(),
            None => format!(
                "SELECT [System.Id], [System.Title], [System.State], [System.AssignedTo] \
                 FROM WorkItems WHERE [System.TeamProject] = '{}' ORDER BY [System.Id] DESC",
                wiql_literal(project)
            ),
        };
        let result = self
            .post_json(
                self.endpoint(&[project, "_apis", "wit", "wiql"], &[])?,
                &json!({ "query": wiql }),
            )
            .await?;

        let ids: Vec<String> = items(&result, "workItems")
            .iter()
            .take(count)
            .map(|item| scalar(item, "/id"))
            .collect();
        if ids.is_empty() {
            return Ok("No work items found".to_string());
        }

        let ids = ids.join(",");
        let details = self
            .get(self.endpoint(&["_apis", "wit", "workitems"], &[("ids", ids.as_str())])?)
            .await?;
        let work_items = lines(&details, "value", |item| {
            format!(
                "- **#{}** [{}] {}\n  State: {} | Assigned: {}",
                scalar(item, "/id"),
                scalar(item, "/fields/System.WorkItemType"),
                scalar(item, "/fields/System.Title"),
                scalar(item, "/fields/System.State"),
                text_or(item, "/fields/System.AssignedTo/displayName", "Unassigned")
            )
        });
        Ok(format!(
            "Work Items in {}:\n\n{}",
            project,
            work_items.join("\n\n")
        ))
    }

    async fn get_work_item(&self, id: u64) -> Result<String> {
        let id = id.to_string();
        let item = self
            .get(self.endpoint(
                &["_apis", "wit", "workitems", id.as_str()],
                &[("$expand", "all")],
            )?)
            .await?;

        let description = strip_tags(&text_or(
            &item,
            "/fields/System.Description",
            "No description",
        ));
        Ok([
            format!("**Work Item #{}**", scalar(&item, "/id")),
            String::new(),
            format!("- **Type:** {}", scalar(&item, "/fields/System.WorkItemType")),
            format!("- **Title:** {}", scalar(&item, "/fields/System.Title")),
            format!("- **State:** {}", scalar(&item, "/fields/System.State")),
            format!(
                "- **Assigned To:** {}",
                text_or(&item, "/fields/System.AssignedTo/displayName", "Unassigned")
            ),
            format!("- **Iteration:** {}", scalar(&item, "/fields/System.IterationPath")),
            format!("- **Area:** {}", scalar(&item, "/fields/System.AreaPath")),
            format!("- **Created:** {}", scalar(&item, "/fields/System.CreatedDate")),
            String::new(),
            "**Description:**".to_string(),
            description,
        ]
        .join("\n"))
    }

    async fn create_work_item(
        &self,
        project: &str,
        work_item_type: &str,
        title: &str,
        args: &ActionArgs,
    ) -> Result<String> {
        let type_segment = format!("${}", work_item_type);
        let url = self.endpoint(
            &[project, "_apis", "wit", "workitems", type_segment.as_str()],
            &[],
        )?;
        let operations = args.field_operations();
        let result = self
            .send_patch_document(Method::POST, url, &operations)
            .await?;
        tracing::info!(project, work_item_type, "created work item");
        Ok(format!(
            "Created work item #{}: {}",
            scalar(&result, "/id"),
            title
        ))
    }

    async fn update_work_item(&self, id: u64, args: &ActionArgs) -> Result<String> {
        let operations = args.field_operations();
        if operations.is_empty() {
            return Err(RelayError::Tool("No fields to update".to_string()).into());
        }
        let id = id.to_string();
        let url = self.endpoint(&["_apis", "wit", "workitems", id.as_str()], &[])?;
        let result = self
            .send_patch_document(Method::PATCH, url, &operations)
            .await?;
        Ok(format!("Updated work item #{}", text_or(&result, "/id", &id)))
    }

    async fn delete_work_item(&self, id: u64) -> Result<String> {
        let id = id.to_string();
        let url = self.endpoint(&["_apis", "wit", "workitems", id.as_str()], &[])?;
        self.send(self.client.delete(url)).await?;
        tracing::info!(work_item_id = %id, "deleted work item");
        Ok(format!("Deleted work item #{}", id))
    }

    fn comments_endpoint(&self, project: &str, work_item_id: &str) -> Result<Url> {
        self.endpoint(
            &[project, "_apis", "wit", "workItems", work_item_id, "comments"],
            &[("api-version", COMMENTS_API_VERSION)],
        )
    }

    async fn add_comment(&self, project: &str, work_item_id: u64, comment: &str) -> Result<String> {
        let id = work_item_id.to_string();
        self.post_json(
            self.comments_endpoint(project, &id)?,
            &json!({ "text": comment }),
        )
        .await?;
        Ok(format!("Added comment to work item #{}", id))
    }

    async fn list_comments(&self, project: &str, work_item_id: u64) -> Result<String> {
        let id = work_item_id.to_string();
        let result = self.get(self.comments_endpoint(project, &id)?).await?;
        let comments = lines(&result, "comments", |comment| {
            format!(
                "- **{}** ({}):\n  {}",
                scalar(comment, "/createdBy/displayName"),
                date(comment, "/createdDate"),
                strip_tags(&scalar(comment, "/text"))
            )
        });
        let body = if comments.is_empty() {
            "No comments".to_string()
        } else {
            comments.join("\n\n")
        };
        Ok(format!("Comments on work item #{}:\n\n{}", id, body))
    }

    // Sprints and boards

    async fn iterations(&self, project: &str, query: &[(&str, &str)]) -> Result<Value> {
        let team = self.default_team(project).await?;
        self.get(self.endpoint(
            &[project, team.as_str(), "_apis", "work", "teamsettings", "iterations"],
            query,
        )?)
        .await
    }

    async fn list_sprints(&self, project: &str) -> Result<String> {
        let result = self.iterations(project, &[]).await?;
        let sprints = lines(&result, "value", |sprint| {
            format!(
                "- **{}**: {} to {} ({})",
                scalar(sprint, "/name"),
                text_or(sprint, "/attributes/startDate", "Not set")
                    .chars()
                    .take(10)
                    .collect::<String>(),
                text_or(sprint, "/attributes/finishDate", "Not set")
                    .chars()
                    .take(10)
                    .collect::<String>(),
                scalar(sprint, "/attributes/timeFrame")
            )
        });
        Ok(format!("Sprints in {}:\n\n{}", project, sprints.join("\n")))
    }

    async fn get_current_sprint(&self, project: &str) -> Result<String> {
        let result = self
            .iterations(project, &[("$timeframe", "current")])
            .await?;
        let Some(sprint) = items(&result, "value").first() else {
            return Ok("No current sprint found".to_string());
        };
        Ok([
            format!("**Current Sprint: {}**", scalar(sprint, "/name")),
            String::new(),
            format!("- **Start:** {}", date(sprint, "/attributes/startDate")),
            format!("- **End:** {}", date(sprint, "/attributes/finishDate")),
            format!("- **Path:** {}", scalar(sprint, "/path")),
        ]
        .join("\n"))
    }

    async fn boards(&self, project: &str) -> Result<(String, Value)> {
        let team = self.default_team(project).await?;
        let boards = self
            .get(self.endpoint(&[project, team.as_str(), "_apis", "work", "boards"], &[])?)
            .await?;
        Ok((team, boards))
    }

    async fn list_boards(&self, project: &str) -> Result<String> {
        let (_, boards) = self.boards(project).await?;
        let names = lines(&boards, "value", |board| {
            format!("- **{}**", scalar(board, "/name"))
        });
        Ok(format!("Boards in {}:\n\n{}", project, names.join("\n")))
    }

    async fn get_board_columns(&self, project: &str) -> Result<String> {
        let (team, boards) = self.boards(project).await?;
        let board_id = items(&boards, "value")
            .first()
            .map(|board| scalar(board, "/id"))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RelayError::Tool(format!("No boards found in {}", project)))?;

        let result = self
            .get(self.endpoint(
                &[
                    project,
                    team.as_str(),
                    "_apis",
                    "work",
                    "boards",
                    board_id.as_str(),
                    "columns",
                ],
                &[],
            )?)
            .await?;
        let columns = lines(&result, "value", |column| {
            format!(
                "- **{}** ({})",
                scalar(column, "/name"),
                scalar(column, "/columnType")
            )
        });
        Ok(format!("Board Columns:\n\n{}", columns.join("\n")))
    }

    // Pipelines

    async fn list_pipelines(&self, project: &str) -> Result<String> {
        let result = self
            .get(self.endpoint(&[project, "_apis", "pipelines"], &[])?)
            .await?;
        let pipelines = lines(&result, "value", |pipeline| {
            format!(
                "- **{}** (ID: {})",
                scalar(pipeline, "/name"),
                scalar(pipeline, "/id")
            )
        });
        if pipelines.is_empty() {
            return Ok("No pipelines found".to_string());
        }
        Ok(format!(
            "Pipelines in {}:\n\n{}",
            project,
            pipelines.join("\n")
        ))
    }

    fn runs_endpoint(&self, project: &str, pipeline_id: u64) -> Result<Url> {
        let id = pipeline_id.to_string();
        self.endpoint(&[project, "_apis", "pipelines", id.as_str(), "runs"], &[])
    }

    async fn get_pipeline_runs(
        &self,
        project: &str,
        pipeline_id: u64,
        count: usize,
    ) -> Result<String> {
        let result = self.get(self.runs_endpoint(project, pipeline_id)?).await?;
        let runs: Vec<String> = items(&result, "value")
            .iter()
            .take(count)
            .map(|run| {
                format!(
                    "- **Run #{}**: {} - {} ({})",
                    scalar(run, "/id"),
                    scalar(run, "/state"),
                    text_or(run, "/result", "In progress"),
                    date(run, "/createdDate")
                )
            })
            .collect();
        Ok(format!("Pipeline Runs:\n\n{}", runs.join("\n")))
    }

    async fn run_pipeline(
        &self,
        project: &str,
        pipeline_id: u64,
        branch: Option<&str>,
    ) -> Result<String> {
        let body = match branch {
            Some(branch) => json!({
                "resources": {
                    "repositories": {
                        "self": { "refName": format!("refs/heads/{}", branch) }
                    }
                }
            }),
            None => json!({}),
        };
        let result = self
            .post_json(self.runs_endpoint(project, pipeline_id)?, &body)
            .await?;
        tracing::info!(project, pipeline_id, "started pipeline run");
        Ok(format!("Started pipeline run #{}", scalar(&result, "/id")))
    }

    // Repositories and pull requests

    async fn list_repositories(&self, project: &str) -> Result<String> {
        let result = self
            .get(self.endpoint(&[project, "_apis", "git", "repositories"], &[])?)
            .await?;
        let repositories = lines(&result, "value", |repo| {
            format!(
                "- **{}** ({})",
                scalar(repo, "/name"),
                text_or(repo, "/defaultBranch", "No default branch")
            )
        });
        Ok(format!(
            "Repositories in {}:\n\n{}",
            project,
            repositories.join("\n")
        ))
    }

    async fn list_branches(&self, project: &str, repo: &str) -> Result<String> {
        let result = self
            .get(self.endpoint(
                &[project, "_apis", "git", "repositories", repo, "refs"],
                &[("filter", "heads/")],
            )?)
            .await?;
        let branches = lines(&result, "value", |reference| {
            format!("- **{}**", branch_name(&scalar(reference, "/name")))
        });
        Ok(format!("Branches in {}:\n\n{}", repo, branches.join("\n")))
    }

    async fn list_commits(
        &self,
        project: &str,
        repo: &str,
        branch: Option<&str>,
        count: usize,
    ) -> Result<String> {
        let top = count.to_string();
        let mut query = vec![("$top", top.as_str())];
        if let Some(branch) = branch {
            query.push(("searchCriteria.itemVersion.version", branch));
        }
        let result = self
            .get(self.endpoint(
                &[project, "_apis", "git", "repositories", repo, "commits"],
                &query,
            )?)
            .await?;
        let commits = lines(&result, "value", |commit| {
            let comment = scalar(commit, "/comment");
            format!(
                "- **{}**: {} ({})",
                scalar(commit, "/commitId").chars().take(8).collect::<String>(),
                comment.lines().next().unwrap_or_default().trim(),
                scalar(commit, "/author/name")
            )
        });
        Ok(format!(
            "Recent Commits in {}:\n\n{}",
            repo,
            commits.join("\n")
        ))
    }

    async fn list_pull_requests(&self, project: &str, repo: Option<&str>) -> Result<String> {
        let url = match repo {
            Some(repo) => self.endpoint(
                &[project, "_apis", "git", "repositories", repo, "pullrequests"],
                &[],
            )?,
            None => self.endpoint(&[project, "_apis", "git", "pullrequests"], &[])?,
        };
        let result = self.get(url).await?;
        let pull_requests = lines(&result, "value", |pr| {
            format!(
                "- **PR #{}**: {}\n  {} -> {} | Status: {}",
                scalar(pr, "/pullRequestId"),
                scalar(pr, "/title"),
                branch_name(&scalar(pr, "/sourceRefName")),
                branch_name(&scalar(pr, "/targetRefName")),
                scalar(pr, "/status")
            )
        });
        if pull_requests.is_empty() {
            return Ok("No pull requests found".to_string());
        }
        Ok(format!("Pull Requests:\n\n{}", pull_requests.join("\n\n")))
    }

    async fn get_pull_request(&self, project: &str, repo: &str, id: u64) -> Result<String> {
        let id = id.to_string();
        let pr = self
            .get(self.endpoint(
                &[
                    project,
                    "_apis",
                    "git",
                    "repositories",
                    repo,
                    "pullrequests",
                    id.as_str(),
                ],
                &[],
            )?)
            .await?;
        Ok([
            format!("**Pull Request #{}**", scalar(&pr, "/pullRequestId")),
            String::new(),
            format!("- **Title:** {}", scalar(&pr, "/title")),
            format!("- **Status:** {}", scalar(&pr, "/status")),
            format!("- **Created By:** {}", scalar(&pr, "/createdBy/displayName")),
            format!("- **Source:** {}", branch_name(&scalar(&pr, "/sourceRefName"))),
            format!("- **Target:** {}", branch_name(&scalar(&pr, "/targetRefName"))),
            format!("- **Created:** {}", date(&pr, "/creationDate")),
            String::new(),
            "**Description:**".to_string(),
            text_or(&pr, "/description", "No description"),
        ]
        .join("\n"))
    }

    // Test plans

    async fn list_test_plans(&self, project: &str) -> Result<String> {
        let result = self
            .get(self.endpoint(&[project, "_apis", "testplan", "plans"], &[])?)
            .await?;
        let plans = lines(&result, "value", |plan| {
            format!(
                "- **{}** (ID: {}) - State: {}",
                scalar(plan, "/name"),
                scalar(plan, "/id"),
                scalar(plan, "/state")
            )
        });
        if plans.is_empty() {
            return Ok("No test plans found".to_string());
        }
        Ok(format!("Test Plans in {}:\n\n{}", project, plans.join("\n")))
    }

    async fn list_test_suites(&self, project: &str, plan_id: u64) -> Result<String> {
        let plan = plan_id.to_string();
        let result = self
            .get(self.endpoint(
                &[project, "_apis", "testplan", "Plans", plan.as_str(), "suites"],
                &[],
            )?)
            .await?;
        let suites = lines(&result, "value", |suite| {
            format!(
                "- **{}** (ID: {}) - Type: {}",
                scalar(suite, "/name"),
                scalar(suite, "/id"),
                scalar(suite, "/suiteType")
            )
        });
        Ok(format!(
            "Test Suites in Plan #{}:\n\n{}",
            plan,
            suites.join("\n")
        ))
    }

    async fn list_test_cases(&self, project: &str, plan_id: u64, suite_id: u64) -> Result<String> {
        let plan = plan_id.to_string();
        let suite = suite_id.to_string();
        let result = self
            .get(self.endpoint(
                &[
                    project,
                    "_apis",
                    "testplan",
                    "Plans",
                    plan.as_str(),
                    "Suites",
                    suite.as_str(),
                    "TestCase",
                ],
                &[],
            )?)
            .await?;
        let cases = lines(&result, "value", |case| {
            format!(
                "- **#{}**: {}",
                scalar(case, "/workItem/id"),
                scalar(case, "/workItem/name")
            )
        });
        if cases.is_empty() {
            return Ok("No test cases found".to_string());
        }
        Ok(format!(
            "Test Cases in Suite #{}:\n\n{}",
            suite,
            cases.join("\n")
        ))
    }
}

#[async_trait]
impl McpToolHandler for AzureDevOpsTool {
    fn definition(&self) -> McpTool {
        let actions: Vec<&str> = Action::ALL.iter().map(|action| action.as_str()).collect();
        McpTool {
            name: AZURE_DEVOPS_TOOL_NAME.to_string(),
            description: Some(format!(
                "Azure DevOps integration for the {} organization: projects, work items, \
                 sprints, boards, pipelines, repositories, pull requests, test plans and \
                 team members.",
                self.organization
            )),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": actions,
                        "description": "The action to perform"
                    },
                    "project": { "type": "string", "description": "Project name" },
                    "work_item_id": { "type": "integer", "description": "Work item ID" },
                    "work_item_type": {
                        "type": "string",
                        "enum": WORK_ITEM_TYPES,
                        "description": "Type of work item"
                    },
                    "title": { "type": "string", "description": "Title (for create/update)" },
                    "description": {
                        "type": "string",
                        "description": "Description (for create/update)"
                    },
                    "state": {
                        "type": "string",
                        "description": "State (New, Active, Closed, etc.)"
                    },
                    "assigned_to": { "type": "string", "description": "Email to assign" },
                    "query": { "type": "string", "description": "WIQL query for filtering" },
                    "sprint": { "type": "string", "description": "Sprint/Iteration path" },
                    "pipeline_id": { "type": "integer", "description": "Pipeline ID" },
                    "repo_name": { "type": "string", "description": "Repository name" },
                    "pull_request_id": { "type": "integer", "description": "Pull request ID" },
                    "branch": { "type": "string", "description": "Branch name" },
                    "test_plan_id": { "type": "integer", "description": "Test plan ID" },
                    "test_suite_id": { "type": "integer", "description": "Test suite ID" },
                    "comment": { "type": "string", "description": "Comment text" },
                    "count": {
                        "type": "integer",
                        "description": "Number of items to return (default 100)"
                    }
                },
                "required": ["action"]
            }),
        }
    }

    async fn call(&self, arguments: Value) -> Result<CallToolResponse> {
        let args: ActionArgs = serde_json::from_value(arguments)
            .map_err(|e| RelayError::Tool(format!("Invalid arguments: {}", e)))?;
        let action: Action = args.action.parse()?;
        tracing::debug!(%action, organization = %self.organization, "calling Azure DevOps");
        let text = self.run(action, &args).await?;
        Ok(CallToolResponse::text(text))
    }
}

fn require_text<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| missing_argument(name))
}

fn require_id(value: Option<u64>, name: &str) -> Result<u64> {
    value.ok_or_else(|| missing_argument(name))
}

fn missing_argument(name: &str) -> anyhow::Error {
    RelayError::Tool(format!("{} is required", name)).into()
}

fn add_field(field: &str, value: &str) -> Value {
    json!({ "op": "add", "path": format!("/fields/{}", field), "value": value })
}

/// Quote `value` for use inside a WIQL string literal.
fn wiql_literal(value: &str) -> String {
    value.replace('\'', "''")
}

fn items<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn lines(value: &Value, key: &str, render: impl Fn(&Value) -> String) -> Vec<String> {
    items(value, key).iter().map(render).collect()
}

/// String form of the value at `pointer`; empty when absent or null.
fn scalar(value: &Value, pointer: &str) -> String {
    match value.pointer(pointer) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn text_or(value: &Value, pointer: &str, fallback: &str) -> String {
    let text = scalar(value, pointer);
    if text.is_empty() {
        fallback.to_string()
    } else {
        text
    }
}

/// Date part of an ISO 8601 timestamp.
fn date(value: &Value, pointer: &str) -> String {
    scalar(value, pointer).chars().take(10).collect()
}

fn branch_name(reference: &str) -> &str {
    reference.strip_prefix("refs/heads/").unwrap_or(reference)
}

fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    text
}
