// Copyright (c) 2025 - Stichting Beep
//! Pipelines of the platform
//!
//! `ApiPipelines` holds the Nginx and PHP image pipelines and the API
//! delivery pipeline; `UiCd` holds the UI delivery pipeline.

use serde_json::json;
use tracing::info;

use super::{Action, ActionKind, Artifact, BuildProject, BuildSpec, Pipeline, PipelineSynth, Stage};
use crate::compute::ComputeExports;
use crate::config::PlatformConfig;
use crate::construct::Stack;
use crate::errors::InfrastructureResult;
use crate::registry::{Registry, RegistryAccess, RegistryStack};
use crate::site::SiteExports;

const DEVELOPMENT_BUILD_SPEC: &str = "buildspecs/build-development-image.yml";
const PRODUCTION_BUILD_SPEC: &str = "buildspecs/build-production-image.yml";
const TEST_BUILD_SPEC: &str = "buildspecs/build-test-image.yml";
const UI_BUILD_SPEC: &str = "buildspecs/build-ui-production-distribution.yml";

/// Synthesized `ApiPipelines` stack
#[derive(Debug, Clone)]
pub struct ApiPipelineStack {
    pub stack: Stack,
    pub pipelines: Vec<Pipeline>,
}

/// Synthesized `UiCd` stack
#[derive(Debug, Clone)]
pub struct UiPipelineStack {
    pub stack: Stack,
    pub pipeline: Pipeline,
}

fn project(
    stack: &mut Stack,
    registries: &RegistryStack,
    logical_id: &str,
    image: Registry,
    description: &str,
    build_spec: &str,
) -> InfrastructureResult<BuildProject> {
    let name = format!("beep-{}", kebab_case(logical_id));
    Ok(BuildProject::new(
        logical_id,
        name,
        description,
        BuildSpec::from_source_filename(build_spec),
    )
    .image_repository(stack, registries.get(image)?))
}

/// `BuildNginxDevelopmentImage` to `build-nginx-development-image`
fn kebab_case(identifier: &str) -> String {
    let mut out = String::new();
    for (i, c) in identifier.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Nginx CI: development image on every push
pub fn nginx_pipeline(
    stack: &mut Stack,
    config: &PlatformConfig,
    registries: &RegistryStack,
) -> InfrastructureResult<PipelineSynth> {
    let build = project(
        stack,
        registries,
        "BuildNginxDevelopmentImage",
        Registry::NginxDevelopment,
        "Build a development image of Nginx",
        DEVELOPMENT_BUILD_SPEC,
    )?;

    let source = Artifact::new("NginxSource");
    let details = Artifact::new("NginxDevelopmentImageDetails");
    let pipeline = Pipeline::new("Nginx")
        .stage(Stage::new("Source").action(Action::source("DownloadSource", "beep-nginx", &source)))
        .stage(Stage::new("Build").action(Action::build("Build", &build, &source).output(&details)));

    Ok(PipelineSynth::new(pipeline, &config.source_control).project(build))
}

/// PHP CI: development and production base images
pub fn php_pipeline(
    stack: &mut Stack,
    config: &PlatformConfig,
    registries: &RegistryStack,
) -> InfrastructureResult<PipelineSynth> {
    let development = project(
        stack,
        registries,
        "BuildPhpDevelopmentImage",
        Registry::PhpDevelopment,
        "Build a development image of PHP",
        DEVELOPMENT_BUILD_SPEC,
    )?;
    let production = project(
        stack,
        registries,
        "BuildPhpProductionImage",
        Registry::PhpProduction,
        "Build a production image of PHP",
        PRODUCTION_BUILD_SPEC,
    )?;

    let source = Artifact::new("PhpSource");
    let pipeline = Pipeline::new("Php")
        .stage(Stage::new("Source").action(Action::source("DownloadSource", "beep-php", &source)))
        .stage(
            Stage::new("Build")
                .action(
                    Action::build("BuildDevelopmentImage", &development, &source)
                        .output(&Artifact::new("PhpDevelopmentImageDetails")),
                )
                .action(
                    Action::build("BuildProductionImage", &production, &source)
                        .output(&Artifact::new("PhpProductionImageDetails")),
                ),
        );

    Ok(PipelineSynth::new(pipeline, &config.source_control)
        .project(development)
        .project(production))
}

/// API CD: test image, production images, rollout to the service
///
/// The Nginx production image embeds the API production image, so it builds
/// second in its stage and reads the API build's image details.
pub fn api_pipeline(
    stack: &mut Stack,
    config: &PlatformConfig,
    registries: &RegistryStack,
    compute: &ComputeExports,
) -> InfrastructureResult<PipelineSynth> {
    let php_development = registries.get(Registry::PhpDevelopment)?;
    let php_production = registries.get(Registry::PhpProduction)?;

    let test = project(
        stack,
        registries,
        "BuildApiTestImage",
        Registry::ApiTest,
        "Build a test image of the Beep API.",
        TEST_BUILD_SPEC,
    )?
    .grant_registry(stack, php_development, RegistryAccess::PullPush)
    .grant_registry(stack, php_production, RegistryAccess::PullPush);

    let api_production = project(
        stack,
        registries,
        "BuildApiProductionImage",
        Registry::ApiProduction,
        "Build a production image of the Beep API",
        PRODUCTION_BUILD_SPEC,
    )?
    .grant_registry(stack, php_development, RegistryAccess::PullPush)
    .grant_registry(stack, php_production, RegistryAccess::PullPush);

    let nginx_production = project(
        stack,
        registries,
        "BuildNginxProductionImage",
        Registry::NginxProduction,
        "Build a production image of Nginx",
        PRODUCTION_BUILD_SPEC,
    )?
    .grant_registry(stack, registries.get(Registry::ApiProduction)?, RegistryAccess::Pull);

    let api_source = Artifact::new("ApiSource");
    let nginx_source = Artifact::new("NginxSource");
    let api_details = Artifact::new("ApiProductionImageDetails");
    let nginx_details = Artifact::new("NginxProductionImageDetails");

    let cluster = stack.import(&compute.cluster_name);
    let service = stack.import(&compute.service_name);

    let pipeline = Pipeline::new("Api")
        .stage(
            Stage::new("Source")
                .action(Action::source("DownloadApiSource", "beep-api", &api_source))
                .action(Action::source("DownloadNginxSource", "beep-nginx", &nginx_source)),
        )
        .stage(
            Stage::new("BuildTestImage").action(
                Action::build("BuildApiTestImage", &test, &api_source)
                    .output(&Artifact::new("ApiTestImageDetails")),
            ),
        )
        .stage(
            Stage::new("BuildProductionImages")
                .action(
                    Action::build("BuildApiProductionImage", &api_production, &api_source)
                        .output(&api_details)
                        .run_order(1),
                )
                .action(
                    Action::build("BuildNginxProductionImage", &nginx_production, &nginx_source)
                        .input(&api_details)
                        .output(&nginx_details)
                        .run_order(2),
                ),
        )
        .stage(
            Stage::new("DeployToProduction").action(
                Action::new("DeployApiService", ActionKind::EcsDeploy { cluster, service })
                    .input(&nginx_details),
            ),
        );

    Ok(PipelineSynth::new(pipeline, &config.source_control)
        .project(test)
        .project(api_production)
        .project(nginx_production))
}

/// Build the `ApiPipelines` stack
pub fn api_pipeline_stack(
    config: &PlatformConfig,
    registries: &RegistryStack,
    compute: &ComputeExports,
) -> InfrastructureResult<ApiPipelineStack> {
    let mut stack = Stack::new("ApiPipelines", config.environment())?
        .with_description("Image and API delivery pipelines");

    let synths = vec![
        nginx_pipeline(&mut stack, config, registries)?,
        php_pipeline(&mut stack, config, registries)?,
        api_pipeline(&mut stack, config, registries, compute)?,
    ];

    let mut pipelines = Vec::new();
    for synth in synths {
        pipelines.push(synth.pipeline().clone());
        synth.synthesize(&mut stack)?;
    }

    info!(stack = %stack.name(), pipelines = pipelines.len(), "Built pipeline stack");

    Ok(ApiPipelineStack { stack, pipelines })
}

/// Build the `UiCd` stack
pub fn ui_pipeline_stack(
    config: &PlatformConfig,
    site: &SiteExports,
) -> InfrastructureResult<UiPipelineStack> {
    let mut stack = Stack::new("UiCd", config.environment())?
        .with_description("UI delivery pipeline");

    let build = BuildProject::new(
        "BuildUiProductionDistribution",
        "beep-build-ui-production-distribution",
        "Build a production distribution of the Beep UI.",
        BuildSpec::from_source_filename(UI_BUILD_SPEC),
    );

    let distribution_id = stack.import(&site.distribution_id);
    let mut invalidate = BuildProject::new(
        "InvalidateUiDistribution",
        "beep-invalidate-ui-distribution",
        "Invalidate the cached Beep UI after a deploy.",
        BuildSpec::Inline(json!({
            "version": "0.2",
            "phases": {
                "build": {
                    "commands": [
                        "aws cloudfront create-invalidation --distribution-id ${DISTRIBUTION_ID} --paths \"/*\"",
                    ],
                },
            },
        })),
    )
    .variable("DISTRIBUTION_ID", distribution_id);
    site.grant_invalidate(&mut stack, invalidate.role_mut());

    let source = Artifact::new("UiSource");
    let distribution = Artifact::new("UiProductionDistribution");
    let bucket = stack.import(&site.bucket_name);

    let pipeline = Pipeline::new("Ui")
        .stage(Stage::new("Source").action(Action::source("DownloadUiSource", "beep-ui", &source)))
        .stage(
            Stage::new("BuildProductionDistribution").action(
                Action::build("BuildUiProduction", &build, &source)
                    .output(&distribution)
                    .run_order(1),
            ),
        )
        .stage(
            Stage::new("Deploy")
                .action(
                    Action::new(
                        "DeployUiProduction",
                        ActionKind::S3Deploy {
                            bucket,
                            extract: true,
                        },
                    )
                    .input(&distribution)
                    .run_order(1),
                )
                .action(
                    Action::build("InvalidateUiDistribution", &invalidate, &distribution).run_order(2),
                ),
        );

    let mut synth = PipelineSynth::new(pipeline.clone(), &config.source_control)
        .project(build)
        .project(invalidate);
    site.grant_deploy(&mut stack, synth.role_mut());
    synth.synthesize(&mut stack)?;

    info!(stack = %stack.name(), "Built UI pipeline stack");

    Ok(UiPipelineStack { stack, pipeline })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kebab_case() {
        assert_eq!(
            kebab_case("BuildNginxDevelopmentImage"),
            "build-nginx-development-image"
        );
        assert_eq!(kebab_case("BuildApiTestImage"), "build-api-test-image");
    }
}
