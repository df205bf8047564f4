use ::redis::aio::MultiplexedConnection;
use async_trait::async_trait;
use k4_core::error::K4Error;
use tracing::debug;

use crate::client::{ConnectError, Pipeline, StoreClient, StoreOp};

/// Redis-protocol store client over a multiplexed connection.
///
/// The connection is opened on first use and dropped after any failed round
/// trip, so the next batch reconnects.
pub struct RedisClient {
    url: String,
    client: Option<::redis::Client>,
    conn: Option<MultiplexedConnection>,
}

impl RedisClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), client: None, conn: None }
    }

    async fn connection(&mut self) -> Result<MultiplexedConnection, K4Error> {
        if let Some(conn) = &self.conn {
            return Ok(conn.clone());
        }
        let Some(client) = &self.client else {
            return Err(K4Error::Store("client not connected".into()));
        };
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| K4Error::Store(format!("connecting to {}: {e}", self.url)))?;
        self.conn = Some(conn.clone());
        Ok(conn)
    }
}

fn build(pipeline: &Pipeline) -> ::redis::Pipeline {
    let mut pipe = ::redis::pipe();
    for op in pipeline.ops() {
        match op {
            StoreOp::AddSorted { set, member, score } => {
                pipe.cmd("ZADD").arg(set).arg("NX").arg(*score).arg(member).ignore();
            }
            StoreOp::AppendLog { log, fields } => {
                pipe.cmd("XADD").arg(log).arg("*");
                for (field, value) in fields {
                    pipe.arg(field).arg(value);
                }
                pipe.ignore();
            }
        }
    }
    pipe
}

#[async_trait]
impl StoreClient for RedisClient {
    async fn connect(&mut self) -> Result<(), ConnectError> {
        let client = ::redis::Client::open(self.url.as_str()).map_err(|e| ConnectError::Config(e.to_string()))?;
        self.client = Some(client);
        Ok(())
    }

    async fn execute(&mut self, pipeline: Pipeline) -> Result<(), K4Error> {
        let mut conn = self.connection().await?;
        let pipe = build(&pipeline);
        let res: Result<(), _> = pipe.query_async(&mut conn).await;
        if let Err(e) = res {
            self.conn = None;
            return Err(K4Error::Store(e.to_string()));
        }
        debug!("pipeline of {} op(s) executed on {}", pipeline.len(), self.url);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), K4Error> {
        self.conn = None;
        self.client = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn malformed_url_is_a_config_error() {
        let mut client = RedisClient::new("tcp//nowhere");
        assert!(matches!(client.connect().await, Err(ConnectError::Config(_))));
    }

    #[tokio::test]
    async fn execute_before_connect_fails() {
        let mut client = RedisClient::new("redis://127.0.0.1:6379");
        let mut p = Pipeline::new();
        p.add_sorted("s", b"m".to_vec(), 1.0);
        assert!(matches!(client.execute(p).await, Err(K4Error::Store(_))));
    }

    #[test]
    fn pipeline_commands() {
        let mut p = Pipeline::new();
        p.add_sorted("trades", b"{}".to_vec(), 2.5);
        p.append_log("book", vec![("symbol".into(), "BTC-USD".into())]);
        let packed = String::from_utf8(build(&p).get_packed_pipeline()).unwrap();
        assert!(packed.contains("ZADD"));
        assert!(packed.contains("NX"));
        assert!(packed.contains("XADD"));
        assert!(packed.contains("BTC-USD"));
    }
}
