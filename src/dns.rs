// Copyright (c) 2025 - Stichting Beep
//! Hosted zone, certificates and alias records
//!
//! The hosted zone of the root domain exists outside the platform. Records
//! refer to it by name; certificates write their validation records into it
//! by id.

use serde_json::{json, Value};

use crate::config::PlatformConfig;
use crate::construct::{PolicyStatement, Reference, Resource, Role, Stack};
use crate::domain::ResourceType;
use crate::errors::InfrastructureResult;

/// Alias target zone shared by every CDN distribution
pub const CLOUDFRONT_HOSTED_ZONE_ID: &str = "Z2FDTNDATAQYW2";

/// Function issuing certificates outside the stack's region
pub const CERTIFICATE_REQUESTOR: &str = "CertificateRequestorFunction";

const REQUESTOR_ROLE: &str = "CertificateRequestorRole";

const REQUESTOR_SOURCE: &str = include_str!("certificate_requestor.py");

/// Longest a function may run; certificate validation can take minutes
const REQUESTOR_TIMEOUT_SECONDS: u32 = 900;

const LAMBDA_BASIC_EXECUTION_POLICY: &str =
    "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";

/// Pre-existing hosted zone looked up by domain name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedZone {
    domain_name: String,
    zone_id: String,
}

impl HostedZone {
    pub fn from_config(config: &PlatformConfig) -> Self {
        Self {
            domain_name: config.domain_name.clone(),
            zone_id: config.hosted_zone_id.clone(),
        }
    }

    pub fn domain_name(&self) -> &str {
        &self.domain_name
    }

    pub fn zone_id(&self) -> &str {
        &self.zone_id
    }

    fn zone_arn(&self) -> String {
        format!("arn:aws:route53:::hostedzone/{}", self.zone_id)
    }

    /// Fully qualified name of `<prefix>.<domain>`
    pub fn record_name(&self, prefix: &str) -> String {
        format!("{prefix}.{}", self.domain_name)
    }

    /// DNS-validated certificate in the stack's own region
    pub fn certificate(
        &self,
        stack: &mut Stack,
        logical_id: &str,
        domain_name: &str,
    ) -> InfrastructureResult<Reference> {
        stack.add(
            Resource::new(logical_id, ResourceType::Certificate)
                .property("DomainName", domain_name)
                .property("ValidationMethod", "DNS")
                .property(
                    "DomainValidationOptions",
                    json!([{ "DomainName": domain_name, "HostedZoneId": self.zone_id }]),
                ),
        )
    }

    /// DNS-validated certificate issued in `region`
    ///
    /// The control plane cannot create certificates outside the stack's
    /// region, so the request goes through a requestor function declared in
    /// the same stack. The certificate ARN is its `Arn` attribute.
    pub fn certificate_in_region(
        &self,
        stack: &mut Stack,
        logical_id: &str,
        domain_name: &str,
        region: &str,
    ) -> InfrastructureResult<Reference> {
        let requestor = self.certificate_requestor(stack)?;

        let mut certificate = Resource::new(logical_id, ResourceType::CrossRegionCertificate)
            .property("ServiceToken", requestor.attr("Arn"))
            .property("DomainName", domain_name)
            .property("Region", region)
            .property("HostedZoneId", self.zone_id.clone())
            .depends_on(&requestor);
        if let Some(policy) = stack.reference(&format!("{REQUESTOR_ROLE}DefaultPolicy")) {
            certificate = certificate.depends_on(&policy);
        }

        stack.add(certificate)
    }

    /// Requestor function and its role, declared once per stack
    fn certificate_requestor(&self, stack: &mut Stack) -> InfrastructureResult<Reference> {
        if let Some(existing) = stack.reference(CERTIFICATE_REQUESTOR) {
            return Ok(existing);
        }

        let mut role = Role::new(REQUESTOR_ROLE, "lambda.amazonaws.com")
            .with_managed_policy(LAMBDA_BASIC_EXECUTION_POLICY);
        role.grant(
            PolicyStatement::allow()
                .actions(&[
                    "acm:RequestCertificate",
                    "acm:DescribeCertificate",
                    "acm:DeleteCertificate",
                ])
                .resource("*"),
        );
        role.grant(
            PolicyStatement::allow()
                .actions(&["route53:ChangeResourceRecordSets"])
                .resource(self.zone_arn()),
        );
        role.grant(
            PolicyStatement::allow()
                .actions(&["route53:GetChange"])
                .resource("*"),
        );
        let role = role.attach(stack)?;

        stack.add(
            Resource::new(CERTIFICATE_REQUESTOR, ResourceType::Function)
                .property("Runtime", "python3.12")
                .property("Handler", "index.handler")
                .property("Timeout", REQUESTOR_TIMEOUT_SECONDS)
                .property("Role", role.attr("Arn"))
                .property("Code", json!({ "ZipFile": REQUESTOR_SOURCE }))
                .depends_on(&role),
        )
    }

    /// A-record alias pointing `record_name` at another resource
    pub fn alias(
        &self,
        stack: &mut Stack,
        logical_id: &str,
        record_name: &str,
        comment: &str,
        target: AliasTarget,
    ) -> InfrastructureResult<Reference> {
        stack.add(
            Resource::new(logical_id, ResourceType::RecordSet)
                .property("HostedZoneName", format!("{}.", self.domain_name))
                .property("Name", format!("{record_name}."))
                .property("Type", "A")
                .property("Comment", comment)
                .property(
                    "AliasTarget",
                    json!({ "DNSName": target.dns_name, "HostedZoneId": target.hosted_zone_id }),
                ),
        )
    }
}

/// Resource an alias record resolves to
#[derive(Debug, Clone, PartialEq)]
pub struct AliasTarget {
    pub dns_name: Value,
    pub hosted_zone_id: Value,
}

impl AliasTarget {
    pub fn load_balancer(load_balancer: &Reference) -> Self {
        Self {
            dns_name: load_balancer.attr("DNSName"),
            hosted_zone_id: load_balancer.attr("CanonicalHostedZoneID"),
        }
    }

    pub fn distribution(distribution: &Reference) -> Self {
        Self {
            dns_name: distribution.attr("DomainName"),
            hosted_zone_id: json!(CLOUDFRONT_HOSTED_ZONE_ID),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack() -> Stack {
        Stack::new("Api", PlatformConfig::default().environment()).unwrap()
    }

    fn zone() -> HostedZone {
        HostedZone::from_config(&PlatformConfig {
            hosted_zone_id: "Z0123456789".to_string(),
            ..PlatformConfig::default()
        })
    }

    #[test]
    fn test_certificate_validates_in_zone() {
        let mut stack = stack();
        zone().certificate(&mut stack, "Certificate", "api.stichtingbeep.nl").unwrap();

        let cert = stack.resource("Certificate").unwrap();
        assert_eq!(
            cert.get("DomainValidationOptions").unwrap(),
            &json!([{ "DomainName": "api.stichtingbeep.nl", "HostedZoneId": "Z0123456789" }])
        );
    }

    #[test]
    fn test_certificate_in_other_region() {
        let mut stack = stack();
        zone()
            .certificate_in_region(&mut stack, "Certificate", "app.stichtingbeep.nl", "us-east-1")
            .unwrap();

        let cert = stack.resource("Certificate").unwrap();
        assert_eq!(cert.resource_type(), ResourceType::CrossRegionCertificate);
        assert_eq!(cert.get("Region").unwrap(), "us-east-1");
        assert_eq!(cert.get("HostedZoneId").unwrap(), "Z0123456789");
        assert_eq!(
            cert.get("ServiceToken").unwrap(),
            &json!({ "Fn::GetAtt": ["CertificateRequestorFunction", "Arn"] })
        );
        assert_eq!(
            cert.dependencies(),
            ["CertificateRequestorFunction", "CertificateRequestorRoleDefaultPolicy"]
        );
    }

    #[test]
    fn test_requestor_declared_once() {
        let zone = zone();
        let mut stack = stack();
        zone.certificate_in_region(&mut stack, "First", "a.stichtingbeep.nl", "us-east-1")
            .unwrap();
        zone.certificate_in_region(&mut stack, "Second", "b.stichtingbeep.nl", "us-east-1")
            .unwrap();

        assert_eq!(stack.resources_of_type(ResourceType::Function).len(), 1);
        assert_eq!(stack.resources_of_type(ResourceType::Role).len(), 1);

        let function = stack.resource(CERTIFICATE_REQUESTOR).unwrap();
        assert_eq!(function.get("Timeout").unwrap(), 900);
        assert!(function.get("Code").unwrap()["ZipFile"]
            .as_str()
            .unwrap()
            .contains("def handler(event, context)"));

        let policy = stack.resource("CertificateRequestorRoleDefaultPolicy").unwrap();
        let statements = &policy.get("PolicyDocument").unwrap()["Statement"];
        assert_eq!(
            statements[1],
            json!({
                "Effect": "Allow",
                "Action": ["route53:ChangeResourceRecordSets"],
                "Resource": "arn:aws:route53:::hostedzone/Z0123456789",
            })
        );
    }

    #[test]
    fn test_alias_record() {
        let zone = HostedZone::from_config(&PlatformConfig::default());
        let mut stack = stack();
        let lb = stack
            .add(Resource::new("LoadBalancer", ResourceType::LoadBalancer))
            .unwrap();
        zone.alias(
            &mut stack,
            "Alias",
            &zone.record_name("api"),
            "Domain for Beep API.",
            AliasTarget::load_balancer(&lb),
        )
        .unwrap();

        let record = stack.resource("Alias").unwrap();
        assert_eq!(record.get("HostedZoneName").unwrap(), "stichtingbeep.nl.");
        assert_eq!(record.get("Name").unwrap(), "api.stichtingbeep.nl.");
        assert_eq!(
            record.get("AliasTarget").unwrap()["HostedZoneId"],
            json!({ "Fn::GetAtt": ["LoadBalancer", "CanonicalHostedZoneID"] })
        );
    }
}
