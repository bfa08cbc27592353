use log::{info, warn};

use crate::error::BridgeError;
use crate::gitlab::{ListingContext, Project, ProjectCatalog};
use crate::pipeline::{
    cut_pipeline_prefix, pipeline_display_name, pipeline_job_id, JobList, MultiBranchType,
    PipelineNode,
};

/// Result of resolving a job id against the live branch list.
#[derive(Debug)]
pub enum StructureLookup {
    Resolved(PipelineNode),
    /// The project exists but has no branches
    NoBranches,
    /// Branch data could not be fetched
    Unavailable(BridgeError),
}

/// Maps GitLab projects and branches onto pipeline nodes for the CI consumer.
pub struct TopologyBuilder<'a> {
    catalog: ProjectCatalog<'a>,
}

impl<'a> TopologyBuilder<'a> {
    pub fn new(catalog: ProjectCatalog<'a>) -> Self {
        Self { catalog }
    }

    /// Resolves `identifier` into a node.
    ///
    /// A project with several branches becomes a multi-branch parent keyed by
    /// `identifier`; a single-branch project is pinned to `<identifier>/<branch>`.
    pub async fn lookup(&self, identifier: &str) -> StructureLookup {
        let project_path = cut_pipeline_prefix(identifier);

        let branches = match self.catalog.list_branches(project_path).await {
            Ok(branches) => branches,
            Err(e) => return StructureLookup::Unavailable(e),
        };

        match branches.as_slice() {
            [] => StructureLookup::NoBranches,
            [only] => StructureLookup::Resolved(
                PipelineNode::new(format!("{identifier}/{}", only.name))
                    .with_name(pipeline_display_name(identifier)),
            ),
            _ => StructureLookup::Resolved(
                PipelineNode::new(identifier)
                    .with_multi_branch_type(MultiBranchType::MultiBranchParent),
            ),
        }
    }

    /// Builds the node for `identifier`, or `None` when no structure could be determined.
    ///
    /// `None` is an expected outcome: the project may have no branches, or GitLab
    /// may have failed to answer. Both are logged.
    pub async fn build_node(&self, identifier: &str) -> Option<PipelineNode> {
        match self.lookup(identifier).await {
            StructureLookup::Resolved(node) => Some(node),
            StructureLookup::NoBranches => {
                warn!("No branches found for {}", cut_pipeline_prefix(identifier));
                None
            }
            StructureLookup::Unavailable(e) => {
                warn!(
                    "Failed to get branches from {}: {e}",
                    cut_pipeline_prefix(identifier)
                );
                None
            }
        }
    }

    /// Lists one aggregate job per project the current user can see.
    ///
    /// Never fails: a project whose branches cannot be read is skipped, and a
    /// failed project listing yields an empty list.
    pub async fn job_list(&self) -> JobList {
        let projects = match self
            .catalog
            .list_visible_projects(ListingContext::JobListing)
            .await
        {
            Ok(projects) => projects,
            Err(e) => {
                warn!("Failed to add some jobs to the job list: {e}");
                return JobList::new(Vec::new());
            }
        };

        let mut jobs = Vec::with_capacity(projects.len());
        for project in &projects {
            match self.project_node(project).await {
                Ok(node) => jobs.push(node),
                Err(e) => warn!(
                    "Skipping {} in the job list: {e}",
                    project.path_with_namespace
                ),
            }
        }

        info!("Job list contains {} of {} projects", jobs.len(), projects.len());
        JobList::new(jobs)
    }

    async fn project_node(&self, project: &Project) -> Result<PipelineNode, BridgeError> {
        let path = &project.path_with_namespace;
        let node = PipelineNode::new(pipeline_job_id(path)).with_name(path.as_str());

        if self.catalog.has_multiple_branches(project.id).await? {
            return Ok(node.with_multi_branch_type(MultiBranchType::MultiBranchParent));
        }

        Ok(node)
    }
}
