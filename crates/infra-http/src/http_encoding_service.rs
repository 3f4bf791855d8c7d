// HTTP EncodingService
//
//   PUT {base}/transforms/{recipe}              create or update a recipe
//   PUT {base}/assets/{asset}                   allocate an output asset
//   PUT {base}/transforms/{recipe}/jobs/{job}   submit a job
//   GET {base}/transforms/{recipe}/jobs/{job}   job status

use async_trait::async_trait;
use chrono::DateTime;
use mediabatch_core::domain::{OutputRef, RecipeHandle, TranscodeRecipe};
use mediabatch_core::port::{EncodingError, EncodingService, JobHandle, JobStatus};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for the encoding service
#[derive(Debug, Clone)]
pub struct HttpEncodingConfig {
    pub base_url: String,
    pub bearer_token: Option<String>,
    pub request_timeout: Duration,
}

impl HttpEncodingConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            bearer_token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

// Wire types

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecipeBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    config: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct NamedResource {
    name: String,
}

#[derive(Deserialize)]
struct AssetResource {
    name: String,
    container: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JobBody<'a> {
    input: JobInput<'a>,
    output_asset: &'a str,
}

#[derive(Serialize)]
struct JobInput<'a> {
    uri: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody {
    state: String,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    end_time: Option<String>,
}

impl StatusBody {
    fn into_status(self) -> Result<JobStatus, EncodingError> {
        Ok(JobStatus {
            state: self.state,
            progress_percent: self.progress.map(|p| p.clamp(0.0, 100.0).round() as u8),
            started_at: parse_time(self.start_time.as_deref())?,
            ended_at: parse_time(self.end_time.as_deref())?,
        })
    }
}

fn parse_time(value: Option<&str>) -> Result<Option<i64>, EncodingError> {
    match value {
        None | Some("") => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|t| Some(t.timestamp_millis()))
            .map_err(|e| EncodingError::InvalidResponse(format!("bad timestamp {:?}: {}", raw, e))),
    }
}

/// Encoding service client over JSON/HTTP
pub struct HttpEncodingService {
    client: Client,
    base: Url,
    bearer_token: Option<String>,
}

impl HttpEncodingService {
    /// # Errors
    /// - EncodingError::Transport if the base URL is invalid or the client
    ///   cannot be built
    pub fn new(config: HttpEncodingConfig) -> Result<Self, EncodingError> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| EncodingError::Transport(format!("invalid base url {}: {}", config.base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(EncodingError::Transport(format!(
                "invalid base url {}",
                config.base_url
            )));
        }
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| EncodingError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base,
            bearer_token: config.bearer_token,
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let url = self.url(segments);
        debug!(method = %method, url = %url, "Encoding service request");
        let builder = self.client.request(method, url);
        match &self.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(request: RequestBuilder) -> Result<Response, EncodingError> {
        request
            .send()
            .await
            .map_err(|e| EncodingError::Transport(e.to_string()))
    }

    /// Map non-success statuses to `Remote` and decode the body
    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, EncodingError> {
        let status = response.status();
        if !status.is_success() {
            return Err(remote_error(response).await);
        }
        response
            .json::<T>()
            .await
            .map_err(|e| EncodingError::InvalidResponse(e.to_string()))
    }
}

async fn remote_error(response: Response) -> EncodingError {
    let status = response.status();
    let message = response.text().await.unwrap_or_default();
    EncodingError::Remote {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl EncodingService for HttpEncodingService {
    async fn register_recipe(
        &self,
        recipe: &TranscodeRecipe,
    ) -> Result<RecipeHandle, EncodingError> {
        let body = RecipeBody {
            description: recipe.description.as_deref(),
            config: &recipe.config,
        };
        let response =
            Self::send(self.request(Method::PUT, &["transforms", &recipe.name]).json(&body)).await?;
        let resource: NamedResource = Self::decode(response).await?;
        Ok(RecipeHandle::new(resource.name))
    }

    async fn create_output(&self, asset_name: &str) -> Result<OutputRef, EncodingError> {
        let response = Self::send(
            self.request(Method::PUT, &["assets", asset_name])
                .json(&serde_json::json!({})),
        )
        .await?;
        let asset: AssetResource = Self::decode(response).await?;
        Ok(OutputRef::new(asset.name, asset.container))
    }

    async fn submit_job(
        &self,
        recipe: &RecipeHandle,
        job_name: &str,
        input_uri: &str,
        output: &OutputRef,
    ) -> Result<JobHandle, EncodingError> {
        let body = JobBody {
            input: JobInput { uri: input_uri },
            output_asset: &output.asset_name,
        };
        let response = Self::send(
            self.request(Method::PUT, &["transforms", &recipe.name, "jobs", job_name])
                .json(&body),
        )
        .await?;

        if response.status().is_client_error() {
            return Err(match remote_error(response).await {
                EncodingError::Remote { status, message } => {
                    EncodingError::Submission(format!("{}: {}", status, message))
                }
                other => other,
            });
        }
        let job: NamedResource = Self::decode(response).await?;
        Ok(JobHandle::new(&recipe.name, job.name))
    }

    async fn get_job_status(&self, job: &JobHandle) -> Result<JobStatus, EncodingError> {
        let response = Self::send(self.request(
            Method::GET,
            &["transforms", &job.recipe, "jobs", &job.job_name],
        ))
        .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(EncodingError::NotFound(job.job_name.clone()));
        }
        let body: StatusBody = Self::decode(response).await?;
        body.into_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(server: &MockServer, token: Option<&str>) -> HttpEncodingService {
        let mut config = HttpEncodingConfig::new(format!("{}/api/", server.uri()));
        config.bearer_token = token.map(str::to_string);
        HttpEncodingService::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_register_recipe_sends_config_with_token() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/transforms/H264"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(serde_json::json!({"config": {"maxLayers": 1}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "H264"})))
            .expect(1)
            .mount(&server)
            .await;

        let recipe = TranscodeRecipe::new("H264", serde_json::json!({"maxLayers": 1}));
        let handle = service(&server, Some("secret"))
            .register_recipe(&recipe)
            .await
            .unwrap();
        assert_eq!(handle.name, "H264");
    }

    #[tokio::test]
    async fn test_create_output_returns_container() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/assets/output-1"))
            .respond_with(ResponseTemplate::new(201).set_body_json(
                serde_json::json!({"name": "output-1", "container": "asset-9f2c"}),
            ))
            .mount(&server)
            .await;

        let output = service(&server, None).create_output("output-1").await.unwrap();
        assert_eq!(output, OutputRef::new("output-1", "asset-9f2c"));
    }

    #[tokio::test]
    async fn test_submit_job_client_error_is_submission_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/transforms/H264/jobs/batch-encode-1"))
            .and(body_partial_json(serde_json::json!({
                "input": {"uri": "file:///media/a.mp4"},
                "outputAsset": "output-1"
            })))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad input"))
            .mount(&server)
            .await;

        let err = service(&server, None)
            .submit_job(
                &RecipeHandle::new("H264"),
                "batch-encode-1",
                "file:///media/a.mp4",
                &OutputRef::new("output-1", "asset-1"),
            )
            .await
            .unwrap_err();
        assert_eq!(err, EncodingError::Submission("400: bad input".to_string()));
    }

    #[tokio::test]
    async fn test_submit_job_server_error_is_remote_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/transforms/H264/jobs/batch-encode-1"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = service(&server, None)
            .submit_job(
                &RecipeHandle::new("H264"),
                "batch-encode-1",
                "file:///media/a.mp4",
                &OutputRef::new("output-1", "asset-1"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EncodingError::Remote { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_job_status_parses_times_and_progress() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/transforms/H264/jobs/batch-encode-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "state": "Processing",
                "progress": 42.6,
                "startTime": "2024-03-07T12:00:00Z"
            })))
            .mount(&server)
            .await;

        let status = service(&server, None)
            .get_job_status(&JobHandle::new("H264", "batch-encode-1"))
            .await
            .unwrap();
        assert_eq!(status.state, "Processing");
        assert_eq!(status.progress_percent, Some(43));
        assert_eq!(status.started_at, Some(1_709_812_800_000));
        assert_eq!(status.ended_at, None);
    }

    #[tokio::test]
    async fn test_job_status_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/transforms/H264/jobs/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = service(&server, None)
            .get_job_status(&JobHandle::new("H264", "gone"))
            .await
            .unwrap_err();
        assert_eq!(err, EncodingError::NotFound("gone".to_string()));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_error() {
        let mut config = HttpEncodingConfig::new("http://127.0.0.1:9/");
        config.request_timeout = Duration::from_millis(200);
        let service = HttpEncodingService::new(config).unwrap();

        let err = service
            .get_job_status(&JobHandle::new("H264", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, EncodingError::Transport(_)));
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(HttpEncodingService::new(HttpEncodingConfig::new("not a url")).is_err());
    }
}
