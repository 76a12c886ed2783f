use chrono::{DateTime, Utc};
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::auth::SignRequest;
use crate::cli::QueryParams;
use crate::error::CliError;

pub const LIST_ACTION: &str = "ListMetrics";

/// One fully assembled request: built once, sent once, discarded.
pub struct RequestEnvelope {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: String,
}

#[derive(Serialize)]
struct MetricsQuery {
    #[serde(rename = "timeRange")]
    time_range: Vec<i64>,
    #[serde(flatten)]
    resources: Map<String, Value>,
}

pub fn build_envelope(
    params: &QueryParams,
    signer: &dyn SignRequest,
    when: DateTime<Utc>,
) -> Result<RequestEnvelope, CliError> {
    let scheme = if params.use_tls { "https" } else { "http" };
    let unsigned_path = format!("/{}", params.metric);
    let url = format!(
        "{scheme}://{}:{}{unsigned_path}?Action={LIST_ACTION}",
        params.host, params.port
    );

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    // The signature covers the path without the action query parameter;
    // the sent URL keeps it.
    let signed = signer.sign(
        Method::POST.as_str(),
        &unsigned_path,
        LIST_ACTION,
        &params.access_key,
        &params.secret_key,
        when,
    )?;
    for (name, value) in signed.iter() {
        headers.insert(name, value.clone());
    }

    let mut resources = Map::new();
    resources.insert(params.metric.to_string(), Value::from(params.resources.clone()));
    let body = MetricsQuery {
        time_range: params.time_range.clone(),
        resources,
    };

    Ok(RequestEnvelope {
        method: Method::POST,
        url,
        headers,
        body: serde_json::to_string(&body)?,
    })
}

pub async fn dispatch(
    envelope: RequestEnvelope,
    insecure: bool,
    verbose: bool,
) -> Result<Value, CliError> {
    let client = Client::builder()
        .danger_accept_invalid_certs(insecure)
        .build()?;

    if verbose {
        info!(headers = ?envelope.headers, "request headers");
    }

    let response = client
        .request(envelope.method, &envelope.url)
        .headers(envelope.headers)
        .body(envelope.body)
        .send()
        .await?;

    if verbose {
        info!(status = %response.status().as_u16(), "response status code");
        info!(headers = ?response.headers(), "response headers");
    }

    let status = response.status();
    let text = response.text().await?;
    let body: Value = serde_json::from_str(&text)?;
    into_result(status, body)
}

fn into_result(status: StatusCode, body: Value) -> Result<Value, CliError> {
    if status.is_success() {
        Ok(body)
    } else {
        Err(CliError::Remote {
            status: status.as_u16(),
            body,
        })
    }
}

pub fn render(body: &Value) -> Result<String, serde_json::Error> {
    Ok(format!("{}\n", serde_json::to_string_pretty(body)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SignError;
    use crate::cli::Metric;
    use chrono::TimeZone;
    use reqwest::header::HeaderName;
    use serde_json::json;
    use std::cell::RefCell;

    struct StubSigner {
        seen: RefCell<Vec<String>>,
    }

    impl StubSigner {
        fn new() -> Self {
            Self {
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl SignRequest for StubSigner {
        fn sign(
            &self,
            method: &str,
            path: &str,
            action: &str,
            _access_key: &str,
            _secret_key: &str,
            _when: DateTime<Utc>,
        ) -> Result<HeaderMap, SignError> {
            self.seen
                .borrow_mut()
                .push(format!("{method} {path} {action}"));
            let mut headers = HeaderMap::new();
            headers.insert(
                HeaderName::from_static("x-stub-signature"),
                HeaderValue::from_static("stubbed"),
            );
            Ok(headers)
        }
    }

    fn params() -> QueryParams {
        QueryParams {
            host: "localhost".to_string(),
            port: 8100,
            use_tls: false,
            insecure: false,
            verbose: false,
            access_key: "accessKey1".to_string(),
            secret_key: "verySecretKey1".to_string(),
            metric: Metric::Buckets,
            resources: vec!["b1".to_string(), "b2".to_string()],
            time_range: vec![1000],
        }
    }

    fn when() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()
    }

    #[test]
    fn test_envelope_url_and_method() {
        let signer = StubSigner::new();
        let envelope = build_envelope(&params(), &signer, when()).unwrap();
        assert_eq!(envelope.method, Method::POST);
        assert_eq!(envelope.url, "http://localhost:8100/buckets?Action=ListMetrics");
    }

    #[test]
    fn test_envelope_uses_https_with_tls() {
        let mut p = params();
        p.use_tls = true;
        let signer = StubSigner::new();
        let envelope = build_envelope(&p, &signer, when()).unwrap();
        assert!(envelope.url.starts_with("https://"));
    }

    #[test]
    fn test_signed_path_excludes_query() {
        let signer = StubSigner::new();
        let envelope = build_envelope(&params(), &signer, when()).unwrap();
        assert_eq!(signer.seen.borrow().as_slice(), ["POST /buckets ListMetrics"]);
        assert!(envelope.url.ends_with("/buckets?Action=ListMetrics"));
    }

    #[test]
    fn test_envelope_headers() {
        let signer = StubSigner::new();
        let envelope = build_envelope(&params(), &signer, when()).unwrap();
        assert_eq!(envelope.headers[CONTENT_TYPE], "application/json");
        assert_eq!(envelope.headers[CACHE_CONTROL], "no-cache");
        assert_eq!(envelope.headers["x-stub-signature"], "stubbed");
    }

    #[test]
    fn test_envelope_body_keys_metric() {
        let signer = StubSigner::new();
        let envelope = build_envelope(&params(), &signer, when()).unwrap();
        let body: Value = serde_json::from_str(&envelope.body).unwrap();
        assert_eq!(body, json!({"timeRange": [1000], "buckets": ["b1", "b2"]}));
    }

    #[test]
    fn test_envelope_body_two_point_range() {
        let mut p = params();
        p.time_range = vec![1000, 2000];
        p.metric = Metric::Accounts;
        p.resources = vec!["ac1".to_string()];
        let signer = StubSigner::new();
        let envelope = build_envelope(&p, &signer, when()).unwrap();
        let body: Value = serde_json::from_str(&envelope.body).unwrap();
        assert_eq!(body, json!({"timeRange": [1000, 2000], "accounts": ["ac1"]}));
    }

    #[test]
    fn test_success_statuses_pass_body_through() {
        let body = json!({"x": 1});
        for code in [200u16, 204, 299] {
            let status = StatusCode::from_u16(code).unwrap();
            assert_eq!(into_result(status, body.clone()).unwrap(), body);
        }
    }

    #[test]
    fn test_non_success_statuses_are_remote_errors() {
        for code in [300u16, 404, 500] {
            let status = StatusCode::from_u16(code).unwrap();
            let err = into_result(status, json!({"code": "NotFound"})).unwrap_err();
            match err {
                CliError::Remote { status, body } => {
                    assert_eq!(status, code);
                    assert_eq!(body, json!({"code": "NotFound"}));
                }
                other => panic!("expected Remote, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_render_pretty_prints_with_two_space_indent() {
        assert_eq!(render(&json!({"x": 1})).unwrap(), "{\n  \"x\": 1\n}\n");
    }
}
