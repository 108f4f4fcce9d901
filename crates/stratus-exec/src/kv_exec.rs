//! Synchronous-appearing fan-out of one cache command.
//!
//! The handler blocks until every target cloud has answered; each cloud
//! reports independently with its own duration, so one unreachable
//! cluster never hides the others' results.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use log::debug;
use stratus_pools::PoolRegistry;
use uuid::Uuid;

use crate::request::KvCommandRequest;
use crate::response::{KvCloudResult, KvResponse};

pub struct KvCommandExecutor {
    pools: Arc<PoolRegistry>,
}

impl KvCommandExecutor {
    pub fn new(pools: Arc<PoolRegistry>) -> Self {
        Self { pools }
    }

    fn resolve_clouds(&self, req: &KvCommandRequest) -> Vec<String> {
        match req.cloud.as_deref() {
            Some(cloud) => vec![cloud.to_string()],
            None => self
                .pools
                .config()
                .kv
                .iter()
                .map(|c| c.cloud_name.clone())
                .collect(),
        }
    }

    /// Execute one already-authorized command against every target cloud.
    /// `tokens` is the full command line: the verb plus its arguments
    /// (for raw mode, the tokenised raw line).
    pub async fn execute(&self, req: &KvCommandRequest, tokens: &[String]) -> KvResponse {
        let clouds = self.resolve_clouds(req);
        let tasks = clouds.into_iter().map(|cloud| {
            let tokens = tokens.to_vec();
            async move {
                let result = self.execute_on_cloud(&cloud, &tokens).await;
                (cloud, result)
            }
        });
        let clouds: HashMap<String, KvCloudResult> = join_all(tasks).await.into_iter().collect();

        let success = !clouds.is_empty() && clouds.values().all(|r| r.success);
        KvResponse {
            id: Uuid::new_v4().to_string(),
            success,
            command: tokens.first().cloned().unwrap_or_default().to_uppercase(),
            clouds,
        }
    }

    async fn execute_on_cloud(&self, cloud: &str, tokens: &[String]) -> KvCloudResult {
        let start = Instant::now();
        let mut conn = match self.pools.kv_connection(cloud).await {
            Ok(conn) => conn,
            Err(e) => {
                return KvCloudResult {
                    success: false,
                    data: None,
                    error: Some(e.to_string()),
                    duration_ms: start.elapsed().as_millis() as u64,
                }
            }
        };

        let mut cmd = redis::cmd(&tokens[0].to_uppercase());
        for arg in &tokens[1..] {
            cmd.arg(arg);
        }
        let reply: Result<redis::Value, redis::RedisError> = cmd.query_async(&mut conn).await;
        match reply {
            Ok(value) => {
                debug!("{} on {} ok in {:?}", tokens[0], cloud, start.elapsed());
                KvCloudResult {
                    success: true,
                    data: Some(redis_value_to_json(value)),
                    error: None,
                    duration_ms: start.elapsed().as_millis() as u64,
                }
            }
            Err(e) => KvCloudResult {
                success: false,
                data: None,
                error: Some(e.to_string()),
                duration_ms: start.elapsed().as_millis() as u64,
            },
        }
    }
}

/// Lower a reply into JSON for the wire. Bulk strings come back as UTF-8
/// where possible, byte arrays otherwise.
pub(crate) fn redis_value_to_json(value: redis::Value) -> serde_json::Value {
    use serde_json::{json, Value as Json};

    match value {
        redis::Value::Nil => Json::Null,
        redis::Value::Okay => json!("OK"),
        redis::Value::Int(i) => json!(i),
        redis::Value::Double(d) => json!(d),
        redis::Value::Boolean(b) => json!(b),
        redis::Value::SimpleString(s) => json!(s),
        redis::Value::BulkString(bytes) => match String::from_utf8(bytes) {
            Ok(s) => json!(s),
            Err(e) => json!(e.into_bytes()),
        },
        redis::Value::Array(items) => {
            Json::Array(items.into_iter().map(redis_value_to_json).collect())
        }
        redis::Value::Set(items) => {
            Json::Array(items.into_iter().map(redis_value_to_json).collect())
        }
        redis::Value::Map(entries) => {
            let mut object = serde_json::Map::new();
            for (k, v) in entries {
                let key = match redis_value_to_json(k) {
                    Json::String(s) => s,
                    other => other.to_string(),
                };
                object.insert(key, redis_value_to_json(v));
            }
            Json::Object(object)
        }
        other => json!(format!("{:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nil_and_ok() {
        assert_eq!(redis_value_to_json(redis::Value::Nil), serde_json::Value::Null);
        assert_eq!(redis_value_to_json(redis::Value::Okay), json!("OK"));
    }

    #[test]
    fn test_scalars() {
        assert_eq!(redis_value_to_json(redis::Value::Int(42)), json!(42));
        assert_eq!(
            redis_value_to_json(redis::Value::SimpleString("PONG".into())),
            json!("PONG")
        );
        assert_eq!(
            redis_value_to_json(redis::Value::BulkString(b"hello".to_vec())),
            json!("hello")
        );
    }

    #[test]
    fn test_nested_array() {
        let value = redis::Value::Array(vec![
            redis::Value::BulkString(b"a".to_vec()),
            redis::Value::Int(1),
            redis::Value::Nil,
        ]);
        assert_eq!(redis_value_to_json(value), json!(["a", 1, null]));
    }

    #[test]
    fn test_map_reply() {
        let value = redis::Value::Map(vec![(
            redis::Value::BulkString(b"field".to_vec()),
            redis::Value::BulkString(b"value".to_vec()),
        )]);
        assert_eq!(redis_value_to_json(value), json!({"field": "value"}));
    }
}
