// Copyright (c) 2025 - Stichting Beep
//! Pipeline synthesis
//!
//! Turns a validated [`Pipeline`] into an artifact bucket, a pipeline role,
//! the build projects its actions run, the pipeline itself and one webhook
//! per source action.

use serde_json::{json, Map, Value};
use tracing::info;

use super::{Action, ActionKind, Artifact, BuildProject, Pipeline};
use crate::config::SourceControlConfig;
use crate::construct::{intrinsics, DeletionPolicy, PolicyStatement, Reference, Resource, Role, Stack};
use crate::domain::ResourceType;
use crate::errors::{InfrastructureError, InfrastructureResult};

const ARTIFACT_ACTIONS: &[&str] = &[
    "s3:GetObject*",
    "s3:GetBucket*",
    "s3:List*",
    "s3:DeleteObject*",
    "s3:PutObject*",
    "s3:Abort*",
];

const BUILD_ACTIONS: &[&str] = &["codebuild:BatchGetBuilds", "codebuild:StartBuild", "codebuild:StopBuild"];

const ECS_DEPLOY_ACTIONS: &[&str] = &[
    "ecs:DescribeServices",
    "ecs:DescribeTaskDefinition",
    "ecs:DescribeTasks",
    "ecs:ListTasks",
    "ecs:RegisterTaskDefinition",
    "ecs:UpdateService",
];

/// Pipeline plus everything it needs to run
#[derive(Debug, Clone)]
pub struct PipelineSynth {
    pipeline: Pipeline,
    source_control: SourceControlConfig,
    projects: Vec<BuildProject>,
    role: Role,
}

impl PipelineSynth {
    pub fn new(pipeline: Pipeline, source_control: &SourceControlConfig) -> Self {
        let role = Role::new(
            format!("{}PipelineRole", pipeline.name),
            "codepipeline.amazonaws.com",
        );
        Self {
            pipeline,
            source_control: source_control.clone(),
            projects: Vec::new(),
            role,
        }
    }

    pub fn project(mut self, project: BuildProject) -> Self {
        self.projects.push(project);
        self
    }

    /// Role the pipeline runs its deploy actions with
    pub fn role_mut(&mut self) -> &mut Role {
        &mut self.role
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    fn logical_id(&self) -> String {
        format!("{}Pipeline", self.pipeline.name)
    }

    /// OAuth token of the source-control account
    fn oauth_token(&self) -> String {
        intrinsics::resolve_secret(&self.source_control.token_secret, &self.source_control.token_field)
    }

    fn action_configuration(&self, action: &Action) -> Value {
        let mut configuration = Map::new();
        match &action.kind {
            ActionKind::Source { repository } => {
                configuration.insert("Owner".to_string(), json!(self.source_control.owner));
                configuration.insert("Repo".to_string(), json!(repository));
                configuration.insert("Branch".to_string(), json!(self.source_control.branch));
                configuration.insert("OAuthToken".to_string(), json!(self.oauth_token()));
                configuration.insert("PollForSourceChanges".to_string(), json!(false));
            }
            ActionKind::Build { project } => {
                configuration.insert("ProjectName".to_string(), intrinsics::reference(project));
                if action.inputs.len() > 1 {
                    configuration.insert("PrimarySource".to_string(), json!(action.inputs[0].name()));
                }
            }
            ActionKind::EcsDeploy { cluster, service } => {
                configuration.insert("ClusterName".to_string(), cluster.clone());
                configuration.insert("ServiceName".to_string(), service.clone());
            }
            ActionKind::S3Deploy { bucket, extract } => {
                configuration.insert("BucketName".to_string(), bucket.clone());
                configuration.insert("Extract".to_string(), json!(extract.to_string()));
            }
        }
        Value::Object(configuration)
    }

    fn action_json(&self, action: &Action) -> Value {
        let (category, owner, provider) = action.kind.action_type();
        let artifacts = |artifacts: &[Artifact]| -> Vec<Value> {
            artifacts.iter().map(|a| json!({ "Name": a.name() })).collect()
        };

        json!({
            "Name": action.name,
            "ActionTypeId": {
                "Category": category,
                "Owner": owner,
                "Provider": provider,
                "Version": "1",
            },
            "Configuration": self.action_configuration(action),
            "InputArtifacts": artifacts(&action.inputs),
            "OutputArtifacts": artifacts(&action.outputs),
            "RunOrder": action.run_order,
        })
    }

    /// Declare the pipeline and its supporting resources in `stack`
    pub fn synthesize(mut self, stack: &mut Stack) -> InfrastructureResult<Reference> {
        self.pipeline.validate()?;

        for action in self.pipeline.actions() {
            if let ActionKind::Build { project } = &action.kind {
                if !self.projects.iter().any(|p| p.logical_id() == project) {
                    return Err(InfrastructureError::Configuration(format!(
                        "action {} of pipeline {} runs unknown build project {project}",
                        action.name, self.pipeline.name
                    )));
                }
            }
        }

        let logical_id = self.logical_id();
        let bucket = stack.add(
            Resource::new(format!("{logical_id}ArtifactsBucket"), ResourceType::Bucket)
                .deletion_policy(DeletionPolicy::Retain),
        )?;
        let artifact_access = PolicyStatement::allow()
            .actions(ARTIFACT_ACTIONS)
            .resource(bucket.attr("Arn"))
            .resource(intrinsics::join("", vec![bucket.attr("Arn"), json!("/*")]));

        self.role.grant(artifact_access.clone());
        for mut project in std::mem::take(&mut self.projects) {
            project.role_mut().grant(artifact_access.clone());
            self.role.grant(
                PolicyStatement::allow()
                    .actions(BUILD_ACTIONS)
                    .resource(project.arn()),
            );
            project.synthesize(stack)?;
        }

        if self
            .pipeline
            .actions()
            .any(|a| matches!(a.kind, ActionKind::EcsDeploy { .. }))
        {
            self.role.grant(PolicyStatement::allow().actions(ECS_DEPLOY_ACTIONS).resource("*"));
            self.role.grant(
                PolicyStatement::allow()
                    .actions(&["iam:PassRole"])
                    .resource("*"),
            );
        }

        let stages: Vec<Value> = self
            .pipeline
            .stages
            .iter()
            .map(|stage| {
                json!({
                    "Name": stage.name,
                    "Actions": stage.actions.iter().map(|a| self.action_json(a)).collect::<Vec<_>>(),
                })
            })
            .collect();

        let role_arn = self.role.arn();
        let role = self.role.clone().attach(stack)?;

        let pipeline = stack.add(
            Resource::new(logical_id.clone(), ResourceType::Pipeline)
                .property("Name", self.pipeline.name.clone())
                .property("RoleArn", role_arn)
                .property(
                    "ArtifactStore",
                    json!({ "Type": "S3", "Location": bucket.to_ref() }),
                )
                .property("Stages", json!(stages))
                .property("RestartExecutionOnUpdate", self.pipeline.restart_execution_on_update)
                .depends_on(&role),
        )?;

        let token = self.oauth_token();
        let mut webhooks = 0;
        for action in self.pipeline.source_actions() {
            stack.add(
                Resource::new(format!("{logical_id}{}Webhook", action.name), ResourceType::Webhook)
                    .property("Authentication", "GITHUB_HMAC")
                    .property("AuthenticationConfiguration", json!({ "SecretToken": token }))
                    .property(
                        "Filters",
                        json!([{
                            "JsonPath": "$.ref",
                            "MatchEquals": "refs/heads/{Branch}",
                        }]),
                    )
                    .property("TargetAction", action.name.clone())
                    .property("TargetPipeline", pipeline.to_ref())
                    .property("TargetPipelineVersion", pipeline.attr("Version"))
                    .property("RegisterWithThirdParty", true),
            )?;
            webhooks += 1;
        }

        info!(
            stack = %stack.name(),
            pipeline = %self.pipeline.name,
            stages = self.pipeline.stages.len(),
            webhooks,
            "Synthesized pipeline"
        );

        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlatformConfig;
    use crate::pipeline::{BuildSpec, Stage};

    fn synth() -> PipelineSynth {
        let source = Artifact::new("NginxSource");
        let details = Artifact::new("NginxDevelopmentImageDetails");
        let project = BuildProject::new(
            "BuildNginxDevelopmentImage",
            "beep-build-nginx-development-image",
            "Build a development image of Nginx",
            BuildSpec::from_source_filename("buildspecs/build-development-image.yml"),
        );
        let pipeline = Pipeline::new("Nginx")
            .stage(Stage::new("Source").action(Action::source("DownloadSource", "beep-nginx", &source)))
            .stage(Stage::new("Build").action(Action::build("Build", &project, &source).output(&details)));

        PipelineSynth::new(pipeline, &PlatformConfig::default().source_control).project(project)
    }

    #[test]
    fn test_pipeline_resources() {
        let mut stack = Stack::new("ApiPipelines", PlatformConfig::default().environment()).unwrap();
        synth().synthesize(&mut stack).unwrap();

        let pipeline = stack.resource("NginxPipeline").unwrap();
        assert_eq!(pipeline.get("RestartExecutionOnUpdate").unwrap(), &json!(true));
        let stages = pipeline.get("Stages").unwrap();
        assert_eq!(stages[0]["Actions"][0]["ActionTypeId"]["Provider"], "GitHub");
        assert_eq!(
            stages[0]["Actions"][0]["Configuration"]["OAuthToken"],
            "{{resolve:secretsmanager:Beep/Production/GithubToken:SecretString:token}}"
        );
        assert_eq!(
            stages[1]["Actions"][0]["Configuration"]["ProjectName"],
            json!({ "Ref": "BuildNginxDevelopmentImage" })
        );

        assert_eq!(stack.resources_of_type(ResourceType::Webhook).len(), 1);
        assert!(stack.resource("NginxPipelineArtifactsBucket").is_some());
        assert!(stack.resource("BuildNginxDevelopmentImage").is_some());
    }

    #[test]
    fn test_unknown_project_rejected() {
        let mut stack = Stack::new("ApiPipelines", PlatformConfig::default().environment()).unwrap();
        let synth = synth();
        let bare = PipelineSynth::new(synth.pipeline().clone(), &PlatformConfig::default().source_control);
        assert!(matches!(
            bare.synthesize(&mut stack),
            Err(InfrastructureError::Configuration(_))
        ));
    }
}
