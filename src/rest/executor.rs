//! Retrying REST executor
//!
//! One transport call per attempt, classified, retried with backoff while the
//! failure is recoverable and the retry bound allows it.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde_json::Value;

use crate::infrastructure::config::{RestConfig, ThrottleConfig};
use crate::infrastructure::events::{ConnectorEvent, EventObserver, TracingObserver};
use crate::rest::classifier::{classify, ClassifiedResponse, Verdict};
use crate::rest::error::{normalize_errors, ApiError};
use crate::rest::retry::{is_suppressed, RetryPolicy};
use crate::rest::throttle::{KeyedThrottle, ThrottleGate};
use crate::rest::transport::{HttpRequest, HttpTransport, ReqwestTransport, TransportError};

/// One logical REST call
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub endpoint: String,
    pub params: Option<Value>,
    /// Throttle key; defaults to the endpoint
    pub throttle_key: Option<String>,
    /// Retries already performed
    pub attempt: u32,
}

impl RequestDescriptor {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            params: None,
            throttle_key: None,
            attempt: 0,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_throttle_key(mut self, key: impl Into<String>) -> Self {
        self.throttle_key = Some(key.into());
        self
    }

    #[inline]
    pub fn throttle_key(&self) -> &str {
        self.throttle_key.as_deref().unwrap_or(&self.endpoint)
    }
}

/// Throttled REST executor with classification and bounded retries
pub struct RestExecutor<T: HttpTransport = ReqwestTransport, G: ThrottleGate = KeyedThrottle> {
    base_url: String,
    transport: T,
    gate: G,
    policy: RetryPolicy,
    timeout: Duration,
    observer: Arc<dyn EventObserver>,
}

impl RestExecutor {
    /// Executor over a pooled reqwest client and the default keyed throttle
    pub fn from_config(rest: &RestConfig, throttle: &ThrottleConfig) -> Result<Self, ApiError> {
        let transport = ReqwestTransport::new(&rest.user_agent)
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        Ok(Self::new(
            rest.base_url.clone(),
            transport,
            KeyedThrottle::from_config(throttle),
        )
        .with_policy(RetryPolicy::new(rest.max_retries))
        .with_timeout(rest.timeout()))
    }
}

impl<T: HttpTransport, G: ThrottleGate> RestExecutor<T, G> {
    pub fn new(base_url: impl Into<String>, transport: T, gate: G) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transport,
            gate,
            policy: RetryPolicy::default(),
            timeout: Duration::from_secs(10),
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn EventObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{base_url}/{endpoint}`
    pub fn url_for(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// Call `endpoint`, throttled under its own name
    pub async fn execute(
        &self,
        method: Method,
        endpoint: &str,
        params: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let mut request = RequestDescriptor::new(method, endpoint);
        request.params = params.cloned();
        self.execute_request(request).await
    }

    /// Run a descriptor to completion: success, venue error or exhaustion
    pub async fn execute_request(&self, mut request: RequestDescriptor) -> Result<Value, ApiError> {
        if request.endpoint.is_empty() {
            return Err(ApiError::InvalidRequest("empty endpoint".to_string()));
        }

        let url = self.url_for(&request.endpoint);
        url::Url::parse(&url).map_err(|e| ApiError::InvalidRequest(format!("{}: {}", url, e)))?;

        let http = HttpRequest {
            method: request.method.clone(),
            url,
            params: request.params.clone(),
            timeout: self.timeout,
        };

        loop {
            let classified = self.attempt(&request, &http).await;

            match classified.verdict {
                Verdict::Success => return Ok(classified.payload()),
                Verdict::VenueError => {
                    return Err(ApiError::Venue {
                        body: normalize_errors(classified.payload()),
                        status: classified.status,
                    });
                }
                Verdict::Recoverable => {}
            }

            if !self.policy.should_retry(request.attempt) {
                let attempts = request.attempt + 1;
                self.observer.on_event(&ConnectorEvent::RequestFailed {
                    url: http.url.clone(),
                    status: classified.status,
                    attempts,
                });
                return Err(ApiError::Exhausted {
                    attempts,
                    errors: classified.payload(),
                    status: classified.status,
                });
            }

            request.attempt += 1;
            let delay = self.policy.delay(request.attempt);
            let message = classified.message();
            // Transport failures carry no venue payload, only the error text
            let payload = match classified.status {
                Some(_) => (!message.is_empty()).then_some(message.as_str()),
                None => None,
            };
            let suppressed = is_suppressed(request.attempt, payload);
            self.observer.on_event(&ConnectorEvent::RetryScheduled {
                url: http.url.clone(),
                status: classified.status,
                attempt: request.attempt,
                delay,
                message,
                suppressed,
            });
            tokio::time::sleep(delay).await;
        }
    }

    /// One throttled transport call; the permit is dropped on return
    async fn attempt(&self, request: &RequestDescriptor, http: &HttpRequest) -> ClassifiedResponse {
        let _permit = self.gate.acquire(request.throttle_key()).await;
        let outcome = match tokio::time::timeout(self.timeout, self.transport.send(http)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TransportError::Timeout),
        };
        classify(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::throttle::{ThrottlePermit, Unthrottled};
    use crate::rest::transport::RawResponse;
    use crate::test_utils::RecordingObserver;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays a fixed script of outcomes and records every request
    #[derive(Default)]
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<RawResponse, TransportError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.requests.lock().len()
        }
    }

    impl HttpTransport for &ScriptedTransport {
        async fn send(&self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
            self.requests.lock().push(request.clone());
            self.script
                .lock()
                .pop_front()
                .unwrap_or(Err(TransportError::Request("script exhausted".into())))
        }
    }

    fn retries(observer: &RecordingObserver) -> Vec<ConnectorEvent> {
        observer
            .events()
            .into_iter()
            .filter(|e| matches!(e, ConnectorEvent::RetryScheduled { .. }))
            .collect()
    }

    /// Records the keys it admits
    #[derive(Default)]
    struct KeyLog {
        keys: Mutex<Vec<String>>,
        acquired: AtomicUsize,
    }

    impl ThrottleGate for &KeyLog {
        async fn acquire(&self, key: &str) -> ThrottlePermit {
            self.keys.lock().push(key.to_string());
            self.acquired.fetch_add(1, Ordering::SeqCst);
            ThrottlePermit::unbounded()
        }
    }

    fn ok(status: u16, body: Value) -> Result<RawResponse, TransportError> {
        Ok(RawResponse::new(status, body.to_string().into_bytes()))
    }

    fn executor<'a>(
        transport: &'a ScriptedTransport,
        observer: Arc<RecordingObserver>,
    ) -> RestExecutor<&'a ScriptedTransport, Unthrottled> {
        RestExecutor::new("https://api.test/api/2/", transport, Unthrottled).with_observer(observer)
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_without_retry() {
        let transport = ScriptedTransport::new(vec![ok(200, json!({"last": "1.23"}))]);
        let observer = Arc::new(RecordingObserver::default());
        let exec = executor(&transport, observer.clone());

        let result = exec
            .execute(Method::GET, "ticker", Some(&json!({})))
            .await
            .unwrap();

        assert_eq!(result, json!({"last": "1.23"}));
        assert_eq!(transport.calls(), 1);
        assert!(retries(&observer).is_empty());
        assert_eq!(transport.requests.lock()[0].url, "https://api.test/api/2/ticker");
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_timeouts_then_success() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Timeout),
            Err(TransportError::Timeout),
            Err(TransportError::Timeout),
            ok(200, json!({"last": "1.23"})),
        ]);
        let observer = Arc::new(RecordingObserver::default());
        let exec = executor(&transport, observer.clone());

        let start = tokio::time::Instant::now();
        let result = exec.execute(Method::GET, "ticker", None).await.unwrap();

        assert_eq!(result, json!({"last": "1.23"}));
        assert_eq!(transport.calls(), 4);

        let scheduled = retries(&observer);
        assert_eq!(scheduled.len(), 3);
        let slept: Duration = scheduled
            .iter()
            .map(|e| match e {
                ConnectorEvent::RetryScheduled { delay, .. } => *delay,
                _ => Duration::ZERO,
            })
            .sum();
        assert!(start.elapsed() >= slept);

        let attempts: Vec<u32> = scheduled
            .iter()
            .filter_map(|e| match e {
                ConnectorEvent::RetryScheduled { attempt, .. } => Some(*attempt),
                _ => None,
            })
            .collect();
        assert_eq!(attempts, vec![1, 2, 3]);

        let suppressed: Vec<bool> = scheduled
            .iter()
            .filter_map(|e| match e {
                ConnectorEvent::RetryScheduled { suppressed, .. } => Some(*suppressed),
                _ => None,
            })
            .collect();
        assert_eq!(suppressed, vec![true, false, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_raises_once() {
        let transport = ScriptedTransport::new(vec![
            ok(502, json!("Bad Gateway")),
            ok(502, json!("Bad Gateway")),
            ok(503, json!({"message": "busy"})),
            ok(200, json!({"never": "reached"})),
        ]);
        let observer = Arc::new(RecordingObserver::default());
        let exec = executor(&transport, observer.clone()).with_policy(RetryPolicy::new(2));

        let err = exec.execute(Method::GET, "ticker", None).await.unwrap_err();

        assert_eq!(transport.calls(), 3);
        assert_eq!(
            err,
            ApiError::Exhausted {
                attempts: 3,
                errors: json!({"message": "busy"}),
                status: Some(503),
            }
        );
        assert_eq!(err.payload(), json!({"errors": {"message": "busy"}, "status": 503}));

        let failed = observer.count(|e| matches!(e, ConnectorEvent::RequestFailed { .. }));
        assert_eq!(failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_singular_error_normalized_without_retry() {
        let transport = ScriptedTransport::new(vec![ok(
            400,
            json!({"error": {"code": 20001, "message": "Insufficient funds"}}),
        )]);
        let observer = Arc::new(RecordingObserver::default());
        let exec = executor(&transport, observer.clone());

        let err = exec
            .execute(Method::POST, "order", Some(&json!({"side": "buy"})))
            .await
            .unwrap_err();

        assert!(err.is_venue_error());
        assert_eq!(
            err.payload()["errors"],
            json!({"code": 20001, "message": "Insufficient funds"})
        );
        assert_eq!(transport.calls(), 1);
        assert!(retries(&observer).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_key_per_attempt() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Connect("refused".into())),
            ok(201, json!({"id": 7})),
        ]);
        let gate = KeyLog::default();
        let exec = RestExecutor::new("https://api.test", &transport, &gate)
            .with_observer(Arc::new(RecordingObserver::default()));

        let request = RequestDescriptor::new(Method::POST, "order")
            .with_params(json!({"side": "sell"}))
            .with_throttle_key("trading");
        let result = exec.execute_request(request).await.unwrap();

        assert_eq!(result, json!({"id": 7}));
        assert_eq!(gate.acquired.load(Ordering::SeqCst), 2);
        assert_eq!(*gate.keys.lock(), vec!["trading".to_string(), "trading".to_string()]);

        exec.execute(Method::GET, "ticker", None).await.ok();
        assert_eq!(gate.keys.lock().last().map(String::as_str), Some("ticker"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_forbidden_is_suppressed() {
        let forbidden = || Ok(RawResponse::new(403, Vec::<u8>::new()).with_reason("Forbidden"));
        let transport =
            ScriptedTransport::new(vec![forbidden(), forbidden(), ok(200, json!({"ok": true}))]);
        let observer = Arc::new(RecordingObserver::default());
        let exec = executor(&transport, observer.clone());

        exec.execute(Method::GET, "balance", None).await.unwrap();

        let flags: Vec<bool> = retries(&observer)
            .iter()
            .filter_map(|e| match e {
                ConnectorEvent::RetryScheduled { suppressed, .. } => Some(*suppressed),
                _ => None,
            })
            .collect();
        assert_eq!(flags, vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_transport_times_out() {
        struct Stalled;
        impl HttpTransport for Stalled {
            async fn send(&self, _: &HttpRequest) -> Result<RawResponse, TransportError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(RawResponse::new(200, b"{}".to_vec()))
            }
        }

        let exec = RestExecutor::new("https://api.test", Stalled, Unthrottled)
            .with_policy(RetryPolicy::new(0))
            .with_timeout(Duration::from_secs(1))
            .with_observer(Arc::new(RecordingObserver::default()));

        let err = exec.execute(Method::GET, "ticker", None).await.unwrap_err();
        assert_eq!(err.payload()["errors"], json!("Request timed out"));
    }

    #[tokio::test]
    async fn test_unparsable_base_url_rejected() {
        let transport = ScriptedTransport::new(vec![]);
        let exec = RestExecutor::new("not a url", &transport, Unthrottled)
            .with_observer(Arc::new(RecordingObserver::default()));
        let err = exec.execute(Method::GET, "ticker", None).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_endpoint_rejected() {
        let transport = ScriptedTransport::new(vec![]);
        let exec = executor(&transport, Arc::new(RecordingObserver::default()));
        let err = exec.execute(Method::GET, "", None).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
        assert_eq!(transport.calls(), 0);
    }
}
