use std::time::Duration;
use colored::Colorize;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde::Serialize;
use tokio::time::Instant;

use crate::block_engine::bundle::BundleGroup;
use crate::common::error::SwapError;
use crate::common::logger::Logger;

/// Tip accounts operated by the relay; one is drawn per bundle.
pub const DEFAULT_TIP_ACCOUNTS: [&str; 4] = [
    "96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5",
    "HFqU5x63VTqvQss8hp11i4wVV8bD44PvwucfZ2bU7gRe",
    "Cw8CFyM9FkoMi7K7Crf6HNQqf4uEMzpKw6QNghXLvLkY",
    "ADuUkR4vqLUMWXxW9gh6D6L8pMSawimctcNZ5pGwDcEt",
];

static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| Client::new())
});

#[derive(Debug, Serialize)]
pub struct BundleRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Vec<Vec<String>>,
}

/// Outcome of one group's submission. The relay response body is opaque
/// beyond the presence of an `error` member.
#[derive(Debug)]
pub struct BundleResult {
    pub group: usize,
    pub transactions: usize,
    pub outcome: Result<serde_json::Value, SwapError>,
}

impl BundleResult {
    pub fn is_err(&self) -> bool {
        self.outcome.is_err()
    }
}

pub fn encode_group(group: &BundleGroup) -> Vec<String> {
    group
        .wire
        .iter()
        .map(|bytes| bs58::encode(bytes).into_string())
        .collect()
}

pub fn bundle_request(encoded: Vec<String>) -> BundleRequest {
    BundleRequest {
        jsonrpc: "2.0".to_string(),
        id: 1,
        method: "sendBundle".to_string(),
        params: vec![encoded],
    }
}

/// Post each group as one `sendBundle` request, in order, one at a time.
///
/// A failed group is recorded and submission moves on to the next; nothing
/// is retried here. Retrying, if wanted, happens at whole-bundle
/// granularity in the caller.
pub async fn send_bundles(block_engine_url: &str, groups: &[BundleGroup]) -> Vec<BundleResult> {
    let logger = Logger::new("[JITO-BUNDLE] => ".green().to_string());
    let endpoint = format!("{}/api/v1/bundles", block_engine_url.trim_end_matches('/'));
    let mut results = Vec::with_capacity(groups.len());

    for (index, group) in groups.iter().enumerate() {
        let started = Instant::now();
        let request = bundle_request(encode_group(group));

        let outcome = match HTTP_CLIENT.post(&endpoint).json(&request).send().await {
            Ok(response) if !response.status().is_success() => Err(SwapError::Network(format!(
                "relay returned {}",
                response.status()
            ))),
            Ok(response) => match response.json::<serde_json::Value>().await {
                Ok(body) => {
                    if body.get("error").is_some() {
                        Err(SwapError::Network(format!(
                            "relay rejected bundle: {}",
                            body["error"]
                        )))
                    } else {
                        Ok(body)
                    }
                }
                Err(e) => Err(SwapError::Network(e.to_string())),
            },
            Err(e) => Err(SwapError::Network(e.to_string())),
        };

        match &outcome {
            Ok(_) => {
                logger.log(format!(
                    "[BUNDLE-ELAPSED]: {:?} group {} ({} txs) accepted",
                    started.elapsed(),
                    index,
                    group.transactions.len()
                ));
            }
            Err(e) => {
                logger.error(format!("group {} failed: {}", index, e));
            }
        }

        results.push(BundleResult {
            group: index,
            transactions: group.transactions.len(),
            outcome,
        });
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_is_a_send_bundle_rpc_call() {
        let request = bundle_request(vec!["abc".to_string(), "def".to_string()]);
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["method"], "sendBundle");
        assert_eq!(body["params"][0].as_array().unwrap().len(), 2);
        assert_eq!(body["params"][0][1], "def");
    }

    #[test]
    fn groups_serialize_to_base58() {
        let group = BundleGroup {
            transactions: vec![],
            wire: vec![vec![0, 1, 2]],
        };
        let encoded = encode_group(&group);
        assert_eq!(encoded, vec!["15T".to_string()]);
    }
}
