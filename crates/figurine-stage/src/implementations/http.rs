//! HTTP stage implementation.
//!
//! Posts the payload as `multipart/form-data` (part `file` plus one text part
//! per stage parameter) and reads the artifact from a named field of the JSON
//! reply. The artifact may be a `data:<mime>;base64,...` URL or bare base64.

use crate::{StageCallError, StageError, StageInterface};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use figurine_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, StagePayload, StageRequest,
	ValidationError,
};
use reqwest::{
	multipart::{Form, Part},
	StatusCode,
};

/// Stage reached over HTTP.
pub struct HttpStage {
	client: reqwest::Client,
	url: String,
	result_field: String,
	content_type: String,
}

impl HttpStage {
	pub fn new(
		base_url: &str,
		path: &str,
		result_field: impl Into<String>,
		content_type: impl Into<String>,
	) -> Result<Self, StageError> {
		let client = reqwest::Client::builder()
			.build()
			.map_err(|e| StageError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

		Ok(Self {
			client,
			url: format!("{}{}", base_url.trim_end_matches('/'), path),
			result_field: result_field.into(),
			content_type: content_type.into(),
		})
	}

	fn build_form(request: &StageRequest) -> Form {
		let file = Part::bytes(request.payload.to_vec()).file_name(request.filename.clone());
		request
			.params
			.iter()
			.fold(Form::new().part("file", file), |form, (key, value)| {
				form.text(key.clone(), value.clone())
			})
	}

	fn parse_success(&self, body: &[u8]) -> Result<StagePayload, StageCallError> {
		let json: serde_json::Value = serde_json::from_slice(body)
			.map_err(|e| StageCallError::Malformed(format!("reply is not JSON: {}", e)))?;

		let artifact = json
			.get(&self.result_field)
			.and_then(|v| v.as_str())
			.ok_or_else(|| {
				StageCallError::Malformed(format!("reply has no '{}' field", self.result_field))
			})?;

		let (content_type, data) = decode_artifact(artifact, &self.content_type)?;

		let processing_time = json
			.pointer("/timing/processing_time")
			.and_then(|v| v.as_f64())
			.or_else(|| json.get("processing_time").and_then(|v| v.as_f64()));

		let mut payload = StagePayload::new(content_type, data);
		payload.processing_time = processing_time;
		Ok(payload)
	}
}

/// Decodes a data URL or bare base64 string into `(content_type, bytes)`.
fn decode_artifact(
	artifact: &str,
	default_content_type: &str,
) -> Result<(String, Vec<u8>), StageCallError> {
	let (content_type, encoded) = match artifact.strip_prefix("data:") {
		Some(rest) => {
			let (header, data) = rest.split_once(',').ok_or_else(|| {
				StageCallError::Malformed("data URL has no payload separator".into())
			})?;
			let mut parts = header.split(';');
			let mime = parts.next().filter(|m| !m.is_empty()).unwrap_or(default_content_type);
			if !parts.any(|p| p == "base64") {
				return Err(StageCallError::Malformed(
					"data URL is not base64 encoded".into(),
				));
			}
			(mime.to_string(), data)
		},
		None => (default_content_type.to_string(), artifact),
	};

	let data = STANDARD
		.decode(encoded.trim())
		.map_err(|e| StageCallError::Malformed(format!("invalid base64 artifact: {}", e)))?;
	if data.is_empty() {
		return Err(StageCallError::Malformed("artifact is empty".into()));
	}

	Ok((content_type, data))
}

/// Picks a human-readable rejection reason from an error body.
fn rejection_reason(status: StatusCode, body: &[u8]) -> String {
	if let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) {
		match json.get("detail") {
			Some(serde_json::Value::String(detail)) => return detail.clone(),
			Some(other) => return other.to_string(),
			None => {},
		}
	}

	let text = String::from_utf8_lossy(body).trim().to_string();
	if text.is_empty() {
		status
			.canonical_reason()
			.unwrap_or("rejected")
			.to_string()
	} else {
		text
	}
}

#[async_trait]
impl StageInterface for HttpStage {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpStageSchema)
	}

	async fn call(&self, request: &StageRequest) -> Result<StagePayload, StageCallError> {
		let response = self
			.client
			.post(&self.url)
			.multipart(Self::build_form(request))
			.send()
			.await
			.map_err(|e| {
				if e.is_timeout() || e.is_connect() {
					StageCallError::Transport(format!("{} unreachable: {}", self.url, e))
				} else {
					StageCallError::Transport(e.to_string())
				}
			})?;

		let status = response.status();
		let body = response
			.bytes()
			.await
			.map_err(|e| StageCallError::Transport(format!("failed to read reply: {}", e)))?;

		if status.is_success() {
			return self.parse_success(&body);
		}

		match status {
			StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
				Err(StageCallError::Transport(format!(
					"{} answered {}",
					self.url, status
				)))
			},
			_ => Err(StageCallError::Rejected {
				status_code: status.as_u16(),
				reason: rejection_reason(status, &body),
			}),
		}
	}
}

/// Configuration schema for HttpStage.
pub struct HttpStageSchema;

impl ConfigSchema for HttpStageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("base_url", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
							Ok(())
						},
						_ => Err("base_url must start with http:// or https://".to_string()),
					}
				}),
				Field::new("path", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(path) if path.starts_with('/') => Ok(()),
						_ => Err("path must start with '/'".to_string()),
					}
				}),
				Field::new("result_field", FieldType::String),
			],
			vec![Field::new("content_type", FieldType::String)],
		);

		schema.validate(config)
	}
}

/// Factory function to create an HTTP stage from configuration.
///
/// Configuration parameters:
/// - `base_url`: scheme, host and port of the stage service
/// - `path`: endpoint path, e.g. `/stylize`
/// - `result_field`: JSON field holding the artifact
/// - `content_type` (optional): MIME type for bare base64 artifacts, default `image/png`
pub fn create_stage(config: &toml::Value) -> Result<Box<dyn StageInterface>, StageError> {
	HttpStageSchema
		.validate(config)
		.map_err(|e| StageError::Configuration(format!("Invalid configuration: {}", e)))?;

	let field = |name: &str| config.get(name).and_then(|v| v.as_str());
	let base_url = field("base_url")
		.ok_or_else(|| StageError::Configuration("base_url is required".into()))?;
	let path = field("path").ok_or_else(|| StageError::Configuration("path is required".into()))?;
	let result_field = field("result_field")
		.ok_or_else(|| StageError::Configuration("result_field is required".into()))?;
	let content_type = field("content_type").unwrap_or("image/png");

	Ok(Box::new(HttpStage::new(
		base_url,
		path,
		result_field,
		content_type,
	)?))
}

/// Registry for the HTTP stage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "http";
	type Factory = crate::StageFactory;

	fn factory() -> Self::Factory {
		create_stage
	}
}

impl crate::StageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use bytes::Bytes;
	use wiremock::matchers::{method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn stage(base_url: &str) -> HttpStage {
		HttpStage::new(base_url, "/stylize", "stylized_image", "image/png").unwrap()
	}

	fn request() -> StageRequest {
		StageRequest::new("order-1", "face.jpg", Bytes::from_static(b"jpeg-bytes"))
			.with_param("style", "cartoon")
	}

	#[tokio::test]
	async fn test_success_with_data_url() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/stylize"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
				"stylized_image": "data:image/webp;base64,aGVsbG8=",
				"timing": { "processing_time": 1.25 }
			})))
			.expect(1)
			.mount(&server)
			.await;

		let payload = stage(&server.uri()).call(&request()).await.unwrap();

		assert_eq!(payload.content_type, "image/webp");
		assert_eq!(payload.data.as_ref(), b"hello");
		assert_eq!(payload.processing_time, Some(1.25));
		assert!(!payload.placeholder);
	}

	#[tokio::test]
	async fn test_success_with_bare_base64_and_top_level_timing() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/stylize"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
				"stylized_image": "aGVsbG8=",
				"processing_time": 0.5
			})))
			.mount(&server)
			.await;

		let payload = stage(&server.uri()).call(&request()).await.unwrap();

		assert_eq!(payload.content_type, "image/png");
		assert_eq!(payload.processing_time, Some(0.5));
	}

	#[tokio::test]
	async fn test_client_error_is_rejection_with_detail() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(
				ResponseTemplate::new(400)
					.set_body_json(serde_json::json!({ "detail": "No face detected" })),
			)
			.mount(&server)
			.await;

		let err = stage(&server.uri()).call(&request()).await.unwrap_err();

		match err {
			StageCallError::Rejected {
				status_code,
				reason,
			} => {
				assert_eq!(status_code, 400);
				assert_eq!(reason, "No face detected");
			},
			other => panic!("unexpected error: {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_plain_text_rejection_uses_body() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(422).set_body_string("unsupported template"))
			.mount(&server)
			.await;

		let err = stage(&server.uri()).call(&request()).await.unwrap_err();
		assert!(matches!(
			err,
			StageCallError::Rejected { status_code: 422, ref reason } if reason == "unsupported template"
		));
	}

	#[tokio::test]
	async fn test_service_unavailable_is_transport() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(503))
			.mount(&server)
			.await;

		let err = stage(&server.uri()).call(&request()).await.unwrap_err();
		assert!(matches!(err, StageCallError::Transport(_)));
	}

	#[tokio::test]
	async fn test_reply_without_artifact_is_malformed() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(
				ResponseTemplate::new(200).set_body_json(serde_json::json!({ "status": "ok" })),
			)
			.mount(&server)
			.await;

		let err = stage(&server.uri()).call(&request()).await.unwrap_err();
		assert!(matches!(err, StageCallError::Malformed(_)));
	}

	#[tokio::test]
	async fn test_unreachable_host_is_transport() {
		let err = stage("http://127.0.0.1:1").call(&request()).await.unwrap_err();
		assert!(matches!(err, StageCallError::Transport(_)));
	}

	#[test]
	fn test_decode_artifact_rejects_non_base64_data_url() {
		assert!(decode_artifact("data:image/png,rawbytes", "image/png").is_err());
		assert!(decode_artifact("not base64!", "image/png").is_err());
	}

	#[test]
	fn test_factory_validates_config() {
		let valid: toml::Value = toml::from_str(
			r#"
			base_url = "http://localhost:8001"
			path = "/stylize"
			result_field = "stylized_image"
			"#,
		)
		.unwrap();
		assert!(create_stage(&valid).is_ok());

		let missing_field: toml::Value =
			toml::from_str(r#"base_url = "http://localhost:8001""#).unwrap();
		assert!(matches!(
			create_stage(&missing_field),
			Err(StageError::Configuration(_))
		));

		let bad_url: toml::Value = toml::from_str(
			r#"
			base_url = "localhost:8001"
			path = "/stylize"
			result_field = "stylized_image"
			"#,
		)
		.unwrap();
		assert!(create_stage(&bad_url).is_err());
	}
}
