use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::retry::{retry, RetryPolicy};

use super::{AwsCall, AwsClient};

/// Invokes the AWS CLI (`aws <service> <operation> --output json [...]`) as a
/// subprocess per call. No AWS SDK dependency is required; every call is
/// read-only by construction since callers only ever reach this type through
/// `SafetyGate::guard`. Throttling errors are retried per `retry_policy`
/// before being surfaced to the caller.
#[derive(Debug, Clone)]
pub struct CliAwsClient {
    profile: Option<String>,
    binary: String,
    retry_policy: RetryPolicy,
}

impl CliAwsClient {
    pub fn new() -> Self {
        CliAwsClient {
            profile: None,
            binary: "aws".to_string(),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Verify the CLI binary is present and runnable before discovery starts.
    pub async fn check_available(&self) -> Result<()> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .map_err(|_| Error::config("AWS CLI not found; install AWS CLI v2"))?;
        if !output.status.success() {
            return Err(Error::config("AWS CLI is not runnable"));
        }
        Ok(())
    }

    fn cli_subcommand(service: &str) -> String {
        service.to_lowercase()
    }

    fn cli_operation(operation: &str) -> String {
        // AWS CLI operations are kebab-case (DescribeInstances -> describe-instances).
        let mut out = String::with_capacity(operation.len() + 4);
        for (i, ch) in operation.char_indices() {
            if ch.is_uppercase() && i > 0 {
                out.push('-');
            }
            out.extend(ch.to_lowercase());
        }
        out
    }

    async fn execute(&self, args: &[String]) -> Result<String> {
        retry(&self.retry_policy, || self.execute_once(args)).await
    }

    async fn execute_once(&self, args: &[String]) -> Result<String> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        if let Some(profile) = &self.profile {
            cmd.args(["--profile", profile]);
        }
        let output = cmd
            .output()
            .await
            .map_err(|e| Error::internal(format!("failed to execute aws cli: {}", e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::aws_api(
                "cli".to_string(),
                args.join(" "),
                stderr.trim().to_string(),
                stderr.contains("Throttling") || stderr.contains("RequestLimitExceeded"),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl Default for CliAwsClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AwsClient for CliAwsClient {
    async fn call(&self, request: AwsCall) -> Result<Value> {
        let mut args = vec![
            Self::cli_subcommand(&request.service),
            Self::cli_operation(&request.operation),
            "--region".to_string(),
            request.region.clone(),
            "--output".to_string(),
            "json".to_string(),
        ];
        for (key, value) in &request.params {
            args.push(format!("--{}", key));
            args.push(value.clone());
        }
        let stdout = self.execute(&args).await?;
        if stdout.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&stdout).map_err(Into::into)
    }

    async fn list_regions(&self) -> Result<Vec<String>> {
        let args = vec![
            "ec2".to_string(),
            "describe-regions".to_string(),
            "--output".to_string(),
            "json".to_string(),
        ];
        let stdout = self.execute(&args).await?;
        let body: Value = serde_json::from_str(&stdout)?;
        let regions = body
            .get("Regions")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|r| r.get("RegionName").and_then(Value::as_str).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(regions)
    }

    async fn caller_identity(&self) -> Result<(String, String, String)> {
        let args = vec![
            "sts".to_string(),
            "get-caller-identity".to_string(),
            "--output".to_string(),
            "json".to_string(),
        ];
        let stdout = self.execute(&args).await?;
        let body: Value = serde_json::from_str(&stdout)?;
        let account_id = body
            .get("Account")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::parsing("caller identity missing Account"))?
            .to_string();
        let arn = body
            .get("Arn")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::parsing("caller identity missing Arn"))?
            .to_string();
        let identity_type = if arn.contains(":assumed-role/") {
            "assumed-role"
        } else if arn.contains(":federated-user/") {
            "federated"
        } else {
            "user"
        };
        Ok((account_id, arn, identity_type.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_name_converts_to_kebab_case() {
        assert_eq!(CliAwsClient::cli_operation("DescribeInstances"), "describe-instances");
        assert_eq!(CliAwsClient::cli_operation("ListBuckets"), "list-buckets");
    }

    #[test]
    fn service_name_lowercases() {
        assert_eq!(CliAwsClient::cli_subcommand("EC2"), "ec2");
    }
}
