// Copyright (c) 2025 - Stichting Beep
//! Static site delivery
//!
//! The UI is a single-page application served from a private bucket through
//! a CDN distribution. Only the distribution's origin access identity may
//! read the bucket; unknown paths fall back to `/index.html` so client-side
//! routing works.

use serde_json::{json, Value};
use tracing::info;

use crate::config::PlatformConfig;
use crate::construct::{
    intrinsics, policy_document, DeletionPolicy, Export, PolicyStatement, Resource, Role, Stack,
};
use crate::dns::{AliasTarget, HostedZone};
use crate::domain::ResourceType;
use crate::errors::InfrastructureResult;

pub const UI_SUBDOMAIN: &str = "app";

/// CDN certificates must live in this region
pub const CERTIFICATE_REGION: &str = "us-east-1";

pub const ROOT_OBJECT: &str = "index.html";

const ORIGIN_ID: &str = "UiBucketOrigin";

const BUCKET_READ_ACTIONS: &[&str] = &["s3:GetBucket*", "s3:GetObject*", "s3:List*"];

const BUCKET_WRITE_ACTIONS: &[&str] = &[
    "s3:GetObject*",
    "s3:GetBucket*",
    "s3:List*",
    "s3:DeleteObject*",
    "s3:PutObject*",
    "s3:Abort*",
];

/// Cross-stack handles to the site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteExports {
    pub bucket_name: Export,
    pub bucket_arn: Export,
    pub distribution_id: Export,
}

impl SiteExports {
    /// Let `role` replace the bucket contents
    pub fn grant_deploy(&self, stack: &mut Stack, role: &mut Role) {
        let arn = stack.import(&self.bucket_arn);
        role.grant(
            PolicyStatement::allow()
                .actions(BUCKET_WRITE_ACTIONS)
                .resource(arn.clone())
                .resource(intrinsics::join("", vec![arn, json!("/*")])),
        );
    }

    /// Let `role` invalidate cached paths of the distribution
    pub fn grant_invalidate(&self, stack: &mut Stack, role: &mut Role) {
        let id = stack.import(&self.distribution_id);
        let arn = intrinsics::join(
            "",
            vec![
                json!("arn:aws:cloudfront::"),
                intrinsics::reference("AWS::AccountId"),
                json!(":distribution/"),
                id,
            ],
        );
        role.grant(
            PolicyStatement::allow()
                .actions(&["cloudfront:CreateInvalidation"])
                .resource(arn),
        );
    }
}

/// Synthesized site stack
#[derive(Debug, Clone)]
pub struct SiteStack {
    pub stack: Stack,
    /// `https://app.<domain>`
    pub base_url: String,
    pub exports: SiteExports,
}

/// Bucket policy statement readable only by the origin access identity
pub fn origin_read_statement(bucket_arn: &Value, canonical_user: Value) -> PolicyStatement {
    PolicyStatement::allow()
        .actions(BUCKET_READ_ACTIONS)
        .resource(bucket_arn.clone())
        .resource(intrinsics::join("", vec![bucket_arn.clone(), json!("/*")]))
        .principal(json!({ "CanonicalUser": canonical_user }))
}

/// Build the `Ui` stack
pub fn site_stack(config: &PlatformConfig) -> InfrastructureResult<SiteStack> {
    let mut stack = Stack::new("Ui", config.environment())?
        .with_description("Beep UI bucket and CDN distribution");

    let zone = HostedZone::from_config(config);
    let domain_name = zone.record_name(UI_SUBDOMAIN);
    let base_url = format!("https://{domain_name}");

    let bucket = stack.add(
        Resource::new("UiBucket", ResourceType::Bucket).deletion_policy(DeletionPolicy::Retain),
    )?;

    let identity = stack.add(
        Resource::new("Oid", ResourceType::OriginAccessIdentity).property(
            "CloudFrontOriginAccessIdentityConfig",
            json!({ "Comment": "OAI for ui origin bucket" }),
        ),
    )?;

    let statement = origin_read_statement(&bucket.attr("Arn"), identity.attr("S3CanonicalUserId"));
    stack.add(
        Resource::new("UiBucketPolicy", ResourceType::BucketPolicy)
            .property("Bucket", bucket.to_ref())
            .property("PolicyDocument", policy_document(&[statement])),
    )?;

    let certificate =
        zone.certificate_in_region(&mut stack, "Certificate", &domain_name, CERTIFICATE_REGION)?;

    let distribution = stack.add(
        Resource::new("UiDistribution", ResourceType::Distribution).property(
            "DistributionConfig",
            json!({
                "Aliases": [domain_name],
                "DefaultRootObject": ROOT_OBJECT,
                "Enabled": true,
                "HttpVersion": "http2",
                "IPV6Enabled": true,
                "PriceClass": "PriceClass_100",
                "Origins": [{
                    "Id": ORIGIN_ID,
                    "DomainName": bucket.attr("RegionalDomainName"),
                    "S3OriginConfig": {
                        "OriginAccessIdentity": intrinsics::join(
                            "",
                            vec![json!("origin-access-identity/cloudfront/"), identity.to_ref()],
                        ),
                    },
                }],
                "DefaultCacheBehavior": {
                    "TargetOriginId": ORIGIN_ID,
                    "ViewerProtocolPolicy": "redirect-to-https",
                    "AllowedMethods": ["GET", "HEAD"],
                    "CachedMethods": ["GET", "HEAD"],
                    "Compress": true,
                    "ForwardedValues": { "QueryString": false, "Cookies": { "Forward": "none" } },
                },
                "CustomErrorResponses": [{
                    "ErrorCode": 404,
                    "ResponseCode": 200,
                    "ResponsePagePath": format!("/{ROOT_OBJECT}"),
                }],
                "ViewerCertificate": {
                    "AcmCertificateArn": certificate.attr("Arn"),
                    "SslSupportMethod": "sni-only",
                    "MinimumProtocolVersion": "TLSv1.2_2018",
                },
            }),
        ),
    )?;

    zone.alias(
        &mut stack,
        "Alias",
        &domain_name,
        "Domain for Beep UI.",
        AliasTarget::distribution(&distribution),
    )?;

    let exports = SiteExports {
        bucket_name: stack.export("UiBucketName", bucket.to_ref()),
        bucket_arn: stack.export("UiBucketArn", bucket.attr("Arn")),
        distribution_id: stack.export("UiDistributionId", distribution.to_ref()),
    };

    info!(stack = %stack.name(), domain = %domain_name, "Built site stack");

    Ok(SiteStack {
        stack,
        base_url,
        exports,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spa_fallback() {
        let site = site_stack(&PlatformConfig::default()).unwrap();
        let distribution = site.stack.resource("UiDistribution").unwrap();
        let config = distribution.get("DistributionConfig").unwrap();

        assert_eq!(config["DefaultRootObject"], "index.html");
        assert_eq!(
            config["CustomErrorResponses"],
            json!([{ "ErrorCode": 404, "ResponseCode": 200, "ResponsePagePath": "/index.html" }])
        );
        assert_eq!(config["Aliases"], json!(["app.stichtingbeep.nl"]));
        assert_eq!(site.base_url, "https://app.stichtingbeep.nl");
    }

    #[test]
    fn test_bucket_readable_only_by_identity() {
        let site = site_stack(&PlatformConfig::default()).unwrap();
        let policy = site.stack.resource("UiBucketPolicy").unwrap();
        let statements = &policy.get("PolicyDocument").unwrap()["Statement"];

        assert_eq!(statements.as_array().map(Vec::len), Some(1));
        assert_eq!(
            statements[0]["Principal"],
            json!({ "CanonicalUser": { "Fn::GetAtt": ["Oid", "S3CanonicalUserId"] } })
        );
        assert_eq!(statements[0]["Action"], json!(["s3:GetBucket*", "s3:GetObject*", "s3:List*"]));
    }

    #[test]
    fn test_certificate_in_us_east_1() {
        let site = site_stack(&PlatformConfig::default()).unwrap();
        let certificate = site.stack.resource("Certificate").unwrap();
        assert_eq!(certificate.get("Region").unwrap(), "us-east-1");

        let requestor = site.stack.resource(crate::dns::CERTIFICATE_REQUESTOR).unwrap();
        assert_eq!(requestor.resource_type(), ResourceType::Function);
        assert_eq!(
            certificate.get("ServiceToken").unwrap(),
            &json!({ "Fn::GetAtt": [crate::dns::CERTIFICATE_REQUESTOR, "Arn"] })
        );
    }
}
