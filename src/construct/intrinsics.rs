// Copyright (c) 2025 - Stichting Beep
//! Intrinsic functions resolved by the control plane at provisioning time

use serde_json::{json, Value};

pub fn reference(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

pub fn join(delimiter: &str, parts: Vec<Value>) -> Value {
    json!({ "Fn::Join": [delimiter, parts] })
}

pub fn split(delimiter: &str, value: Value) -> Value {
    json!({ "Fn::Split": [delimiter, value] })
}

pub fn select(index: usize, list: Value) -> Value {
    json!({ "Fn::Select": [index, list] })
}

pub fn import_value(export_name: &str) -> Value {
    json!({ "Fn::ImportValue": export_name })
}

/// Dynamic reference to a JSON field of a secret
pub fn resolve_secret(secret_id: &str, json_field: &str) -> String {
    format!("{{{{resolve:secretsmanager:{secret_id}:SecretString:{json_field}}}}}")
}

/// Dynamic reference to a secret held by a resource in the same template
pub fn resolve_secret_ref(secret: &Value, json_field: &str) -> Value {
    join(
        "",
        vec![
            json!("{{resolve:secretsmanager:"),
            secret.clone(),
            json!(format!(":SecretString:{json_field}}}}}")),
        ],
    )
}

/// ARN built from the stack's partition, region and account
pub fn arn(service: &str, resource: Value) -> Value {
    join(
        "",
        vec![
            json!(format!("arn:aws:{service}:")),
            reference("AWS::Region"),
            json!(":"),
            reference("AWS::AccountId"),
            json!(":"),
            resource,
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_secret() {
        assert_eq!(
            resolve_secret("Beep/Production/GithubToken", "token"),
            "{{resolve:secretsmanager:Beep/Production/GithubToken:SecretString:token}}"
        );
    }

    #[test]
    fn test_resolve_secret_ref() {
        let value = resolve_secret_ref(&reference("Credentials"), "username");
        assert_eq!(
            value,
            json!({ "Fn::Join": ["", [
                "{{resolve:secretsmanager:",
                { "Ref": "Credentials" },
                ":SecretString:username}}"
            ]]})
        );
    }

    #[test]
    fn test_get_att() {
        assert_eq!(
            get_att("Database", "Endpoint.Address"),
            json!({ "Fn::GetAtt": ["Database", "Endpoint.Address"] })
        );
    }
}
