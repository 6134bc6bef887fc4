use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;

use super::MergeInstruction;
use crate::config::MergeApiConfig;
use crate::error::MergeError;

/// Submits one merge instruction to the patient system.
pub trait MergeClient {
    fn submit(&self, instruction: &MergeInstruction) -> Result<(), MergeError>;
}

#[derive(Serialize)]
struct MessageHeader {
    version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MergeMessage<'a> {
    contract: &'static str,
    operation: &'static str,
    context: serde_json::Map<String, serde_json::Value>,
    source_patient_id: &'a str,
    target_patient_id: &'a str,
}

#[derive(Serialize)]
struct MergeEnvelope<'a> {
    header: MessageHeader,
    message: MergeMessage<'a>,
}

impl<'a> MergeEnvelope<'a> {
    fn new(instruction: &'a MergeInstruction) -> Self {
        Self {
            header: MessageHeader { version: "1.0" },
            message: MergeMessage {
                contract: "patient",
                operation: "merge.request",
                context: serde_json::Map::new(),
                source_patient_id: &instruction.source_id,
                target_patient_id: &instruction.target_id,
            },
        }
    }
}

/// `PUT /api/message` with a bearer token.
pub struct HttpMergeClient {
    endpoint: String,
    token: String,
    timeout_secs: u64,
    client: reqwest::blocking::Client,
}

impl HttpMergeClient {
    pub fn new(cfg: &MergeApiConfig) -> Result<Self, MergeError> {
        // The practice server ships a self-signed certificate
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .danger_accept_invalid_certs(cfg.accept_invalid_certs)
            .build()
            .map_err(|e| MergeError::Client(e.to_string()))?;
        Ok(Self {
            endpoint: cfg.endpoint(),
            token: cfg.token.clone(),
            timeout_secs: cfg.timeout_secs,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl MergeClient for HttpMergeClient {
    fn submit(&self, instruction: &MergeInstruction) -> Result<(), MergeError> {
        let transport = |reason: String| MergeError::Transport {
            source_id: instruction.source_id.clone(),
            target_id: instruction.target_id.clone(),
            reason,
        };
        let response = self
            .client
            .put(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&MergeEnvelope::new(instruction))
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    transport(format!("request timed out after {}s", self.timeout_secs))
                } else if e.is_connect() {
                    transport(format!("cannot connect to {}", self.endpoint))
                } else {
                    transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().unwrap_or_default();
            return Err(MergeError::Rejected {
                source_id: instruction.source_id.clone(),
                target_id: instruction.target_id.clone(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Logs what would be sent and reports success.
pub struct DryRunClient;

impl MergeClient for DryRunClient {
    fn submit(&self, instruction: &MergeInstruction) -> Result<(), MergeError> {
        log::info!(
            "DRY_RUN - would merge {} into {}",
            instruction.source_id,
            instruction.target_id
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MergeReport {
    pub succeeded: Vec<MergeInstruction>,
    pub failed: Vec<(MergeInstruction, MergeError)>,
}

impl MergeReport {
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Submit every instruction in order; a failure is recorded and the rest still run.
pub fn submit_merge_plan(client: &dyn MergeClient, plan: &[MergeInstruction]) -> MergeReport {
    let mut report = MergeReport::default();
    for instruction in plan {
        match client.submit(instruction) {
            Ok(()) => {
                log::info!("MERGED - {} into {}", instruction.source_id, instruction.target_id);
                report.succeeded.push(instruction.clone());
            }
            Err(e) => {
                log::error!("MERGE_FAILED - {}", e);
                report.failed.push((instruction.clone(), e));
            }
        }
    }
    report
}
