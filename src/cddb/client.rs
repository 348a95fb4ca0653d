use crate::cd::DiscIdentity;
use crate::cddb::{
    decode_body, parse_query_response, parse_read_response, query_command, read_command,
    CddbRecord, DiscLookup, LookupError, QueryMatch,
};
use crate::config::Config;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Protocol level 5: records come back in a single-byte charset
const PROTOCOL_LEVEL: &str = "5";

/// CDDB-over-HTTP client (`cddb.cgi?cmd=...&hello=...&proto=...`)
#[derive(Clone)]
pub struct CddbClient {
    client: Client,
    base_url: String,
    hello: String,
}

impl CddbClient {
    pub fn new(config: &Config) -> Result<Self, LookupError> {
        Self::with_endpoint(
            &config.cddb_url,
            &config.cddb_user,
            &config.cddb_host,
            config.cddb_timeout,
        )
    }

    pub fn with_endpoint(
        base_url: &str,
        user: &str,
        host: &str,
        timeout: Duration,
    ) -> Result<Self, LookupError> {
        let client = Client::builder()
            .user_agent(concat!("cdda/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            hello: format!("{} {} cdda {}", user, host, env!("CARGO_PKG_VERSION")),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn command(&self, cmd: &str) -> Result<String, LookupError> {
        debug!("CDDB request: {}", cmd);

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("cmd", cmd),
                ("hello", self.hello.as_str()),
                ("proto", PROTOCOL_LEVEL),
            ])
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            warn!("CDDB server answered HTTP {}", status);
            return Err(LookupError::Status {
                code: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("HTTP error")
                    .to_string(),
            });
        }

        let bytes = response.bytes().await.map_err(map_request_error)?;
        let body = decode_body(&bytes);
        debug!("CDDB response: {}", body.lines().next().unwrap_or_default());
        Ok(body)
    }
}

fn map_request_error(e: reqwest::Error) -> LookupError {
    if e.is_timeout() {
        LookupError::Timeout
    } else {
        LookupError::Request(e)
    }
}

#[async_trait::async_trait]
impl DiscLookup for CddbClient {
    async fn query(&self, disc: &DiscIdentity) -> Result<QueryMatch, LookupError> {
        info!("CDDB: querying disc {} ({} tracks)", disc, disc.track_count());
        let body = self.command(&query_command(disc)).await?;
        parse_query_response(&body, &disc.hex())
    }

    async fn read(&self, category: &str, disc_id: &str) -> Result<CddbRecord, LookupError> {
        info!("CDDB: reading {}/{}", category, disc_id);
        let body = self.command(&read_command(category, disc_id)).await?;
        parse_read_response(&body)
    }
}
