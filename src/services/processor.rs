//! Exchange processor
//!
//! Drives one exchange through its phases. Phase events arrive in order from
//! the proxy's transport; every event is answered with exactly one
//! [`PhaseResponse`], unless the exchange fails, in which case an immediate
//! response carrying the canonical error envelope ends it.

use crate::config::AppConfig;
use crate::translator::factory::new_translator;
use crate::translator::mutation::{PATH_HEADER, STATUS_HEADER};
use crate::translator::reassembler::BodyReassembler;
use crate::translator::{
    CanonicalRequest, Endpoint, HeaderMutation, Headers, LLMTokenUsage, PhaseMutations, Translator,
};
use crate::utils::error::{helpers, AppError, AppResult};
use crate::utils::logging::{create_embedding_log_summary, create_request_log_summary};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Request header naming the backend chosen for the exchange
pub const SELECTED_BACKEND_HEADER: &str = "x-ai-eg-selected-backend";

/// Capacity of the channels created by [`Processor::open_exchange`]
const EXCHANGE_CHANNEL_CAPACITY: usize = 16;

/// One phase of an exchange, as delivered by the proxy
#[derive(Debug, Clone)]
pub enum PhaseEvent {
    RequestHeaders(Headers),
    RequestBody { body: Vec<u8>, end_of_stream: bool },
    ResponseHeaders(Headers),
    ResponseBody { body: Vec<u8>, end_of_stream: bool },
}

/// Answer to one phase event
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseResponse {
    RequestHeaders(Option<HeaderMutation>),
    RequestBody(PhaseMutations),
    ResponseHeaders(Option<HeaderMutation>),
    ResponseBody(PhaseMutations),
    /// Terminates the exchange without contacting (or after) the backend
    ImmediateResponse { status: u16, body: Vec<u8> },
}

/// Shared entry point creating one exchange task per client request
#[derive(Debug, Clone)]
pub struct Processor {
    config: Arc<AppConfig>,
}

impl Processor {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Process the events of one exchange until the stream ends or the
    /// exchange fails. Returns the usage reported by the backend.
    pub async fn process<S>(&self, events: S, tx: mpsc::Sender<PhaseResponse>) -> AppResult<LLMTokenUsage>
    where
        S: Stream<Item = PhaseEvent> + Unpin,
    {
        let exchange_id = Uuid::new_v4().simple().to_string();
        let span = info_span!("exchange", exchange_id = %exchange_id);
        self.run(events, tx).instrument(span).await
    }

    async fn run<S>(&self, mut events: S, tx: mpsc::Sender<PhaseResponse>) -> AppResult<LLMTokenUsage>
    where
        S: Stream<Item = PhaseEvent> + Unpin,
    {
        let mut exchange = Exchange::new(Arc::clone(&self.config));

        while let Some(event) = events.next().await {
            let response = match exchange.handle(event) {
                Ok(response) => response,
                Err(e) => {
                    error!("exchange failed: {}", e);
                    let envelope = e.to_openai_error();
                    let body = serde_json::to_vec(&envelope)?;
                    let _ = tx
                        .send(PhaseResponse::ImmediateResponse {
                            status: e.status_code().as_u16(),
                            body,
                        })
                        .await;
                    return Err(e);
                }
            };

            if tx.send(response).await.is_err() {
                debug!("response channel closed, abandoning exchange");
                break;
            }
        }

        if exchange.backend.is_some() {
            info!(
                backend = exchange.backend.as_deref().unwrap_or_default(),
                input_tokens = exchange.usage.input_tokens,
                output_tokens = exchange.usage.output_tokens,
                total_tokens = exchange.usage.total_tokens,
                "exchange completed"
            );
        }
        Ok(exchange.usage)
    }

    /// Run an exchange on its own task
    pub fn spawn_exchange<S>(
        &self,
        events: S,
        tx: mpsc::Sender<PhaseResponse>,
    ) -> JoinHandle<AppResult<LLMTokenUsage>>
    where
        S: Stream<Item = PhaseEvent> + Unpin + Send + 'static,
    {
        let processor = self.clone();
        tokio::spawn(async move { processor.process(events, tx).await })
    }

    /// Open a channel pair for a new exchange and start processing it
    pub fn open_exchange(
        &self,
    ) -> (
        mpsc::Sender<PhaseEvent>,
        mpsc::Receiver<PhaseResponse>,
        JoinHandle<AppResult<LLMTokenUsage>>,
    ) {
        let (event_tx, event_rx) = mpsc::channel(EXCHANGE_CHANNEL_CAPACITY);
        let (response_tx, response_rx) = mpsc::channel(EXCHANGE_CHANNEL_CAPACITY);
        let handle = self.spawn_exchange(ReceiverStream::new(event_rx), response_tx);
        (event_tx, response_rx, handle)
    }
}

/// A body buffered across fragments. Fragments before the last are held back
/// (replaced with nothing) so the whole document can be released at once.
#[derive(Debug, Default)]
struct HeldBody {
    body: BodyReassembler,
    held_back: bool,
}

impl HeldBody {
    fn push(&mut self, fragment: &[u8]) {
        self.body.push(fragment);
    }

    fn hold(&mut self) -> PhaseMutations {
        self.held_back = true;
        PhaseMutations::with_fragment(Vec::new())
    }

    /// Ensure the complete body reaches the peer when earlier fragments were
    /// held back and the translator left the body untouched
    fn release(&mut self, original: Vec<u8>, mutations: PhaseMutations) -> PhaseMutations {
        let held_back = std::mem::take(&mut self.held_back);
        if held_back && mutations.body_mutation.is_none() {
            return PhaseMutations::with_body(mutations.header_mutation, original);
        }
        mutations
    }

    fn reset(&mut self) {
        self.body.clear();
        self.held_back = false;
    }
}

/// State of one exchange
struct Exchange {
    config: Arc<AppConfig>,
    request_headers: Headers,
    response_headers: Headers,
    endpoint: Option<Endpoint>,
    backend: Option<String>,
    translator: Option<Box<dyn Translator>>,
    request_body: HeldBody,
    error_body: HeldBody,
    error_mode: bool,
    usage: LLMTokenUsage,
}

impl Exchange {
    fn new(config: Arc<AppConfig>) -> Self {
        Self {
            config,
            request_headers: Headers::new(),
            response_headers: Headers::new(),
            endpoint: None,
            backend: None,
            translator: None,
            request_body: HeldBody::default(),
            error_body: HeldBody::default(),
            error_mode: false,
            usage: LLMTokenUsage::default(),
        }
    }

    fn handle(&mut self, event: PhaseEvent) -> AppResult<PhaseResponse> {
        match event {
            PhaseEvent::RequestHeaders(headers) => self.on_request_headers(headers),
            PhaseEvent::RequestBody { body, end_of_stream } => self.on_request_body(body, end_of_stream),
            PhaseEvent::ResponseHeaders(headers) => self.on_response_headers(headers),
            PhaseEvent::ResponseBody { body, end_of_stream } => self.on_response_body(body, end_of_stream),
        }
    }

    fn on_request_headers(&mut self, headers: Headers) -> AppResult<PhaseResponse> {
        let path = headers
            .get(PATH_HEADER)
            .ok_or_else(|| helpers::invalid_request("request has no :path header"))?;
        let endpoint = Endpoint::from_path(path, self.config.input_version())?;
        debug!(path = %path, endpoint = %endpoint, "request headers");

        // a second request phase on the same exchange is a retry attempt
        self.request_body.reset();
        self.error_body.reset();
        self.error_mode = false;
        self.response_headers.clear();

        self.endpoint = Some(endpoint);
        self.request_headers = headers;
        Ok(PhaseResponse::RequestHeaders(None))
    }

    fn select_backend(&self) -> AppResult<String> {
        if let Some(name) = self.request_headers.get(SELECTED_BACKEND_HEADER) {
            return Ok(name.clone());
        }
        match self.config.backend_names().as_slice() {
            [only] => Ok(only.to_string()),
            _ => Err(AppError::BackendNotFound(format!(
                "no {} header on request",
                SELECTED_BACKEND_HEADER
            ))),
        }
    }

    fn on_request_body(&mut self, fragment: Vec<u8>, end_of_stream: bool) -> AppResult<PhaseResponse> {
        let endpoint = self
            .endpoint
            .ok_or_else(|| helpers::protocol_violation("request body before request headers"))?;

        self.request_body.push(&fragment);
        if !end_of_stream {
            return Ok(PhaseResponse::RequestBody(self.request_body.hold()));
        }
        let original = self.request_body.body.take();

        let request = CanonicalRequest::parse(endpoint, &original)?;
        match &request {
            CanonicalRequest::ChatCompletion(chat) => {
                debug!(request = %create_request_log_summary(chat), "request body")
            }
            CanonicalRequest::Embedding(embedding) => {
                debug!(request = %create_embedding_log_summary(embedding), "request body")
            }
        }

        let on_retry = self.translator.is_some();
        if !on_retry {
            let name = self.select_backend()?;
            let backend = self
                .config
                .backend(&name)
                .ok_or_else(|| AppError::BackendNotFound(name.clone()))?;
            self.translator = Some(new_translator(endpoint, backend)?);
            self.backend = Some(name);
        } else {
            warn!(backend = self.backend.as_deref().unwrap_or_default(), "retrying request");
        }

        let translator = self
            .translator
            .as_mut()
            .ok_or_else(|| helpers::internal_error("translator missing after creation"))?;
        let mutations = translator.request_body(&original, &request, on_retry)?;
        Ok(PhaseResponse::RequestBody(self.request_body.release(original, mutations)))
    }

    fn translator(&mut self) -> AppResult<&mut Box<dyn Translator>> {
        self.translator
            .as_mut()
            .ok_or_else(|| helpers::protocol_violation("response phase before request body"))
    }

    fn on_response_headers(&mut self, headers: Headers) -> AppResult<PhaseResponse> {
        let status = headers
            .get(STATUS_HEADER)
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(200);
        self.error_mode = !(200..300).contains(&status);
        debug!(status, error = self.error_mode, "response headers");

        let mutation = if self.error_mode {
            None
        } else {
            self.translator()?.response_headers(&headers)?
        };
        self.response_headers = headers;
        Ok(PhaseResponse::ResponseHeaders(mutation))
    }

    fn on_response_body(&mut self, fragment: Vec<u8>, end_of_stream: bool) -> AppResult<PhaseResponse> {
        if self.error_mode {
            self.error_body.push(&fragment);
            if !end_of_stream {
                return Ok(PhaseResponse::ResponseBody(self.error_body.hold()));
            }
            let original = self.error_body.body.take();
            let headers = self.response_headers.clone();
            let mutations = self.translator()?.response_error(&headers, &mut original.as_slice())?;
            return Ok(PhaseResponse::ResponseBody(self.error_body.release(original, mutations)));
        }

        let headers = self.response_headers.clone();
        let output = self
            .translator()?
            .response_body(&headers, &mut fragment.as_slice(), end_of_stream)?;
        self.usage += output.token_usage;

        Ok(PhaseResponse::ResponseBody(PhaseMutations {
            header_mutation: output.header_mutation,
            body_mutation: output.body_mutation,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translator::mutation::{BodyMutation, CONTENT_LENGTH_HEADER};

    fn config() -> Arc<AppConfig> {
        Arc::new(
            AppConfig::parse(r#"{"backends": {"openai": {"schema": {"name": "OpenAI"}}}}"#).unwrap(),
        )
    }

    fn headers(pairs: &[(&str, &str)]) -> Headers {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_held_body_releases_original() {
        let mut held = HeldBody::default();
        held.push(b"{\"a\":");
        let hold = held.hold();
        assert_eq!(hold.body_mutation, Some(BodyMutation::default()));
        assert_eq!(
            hold.header_mutation.unwrap().remove_headers,
            vec![CONTENT_LENGTH_HEADER.to_string()]
        );
        held.push(b"1}");

        let original = held.body.take();
        let released = held.release(original, PhaseMutations::none());
        assert_eq!(released.body_mutation.unwrap().body, b"{\"a\":1}".to_vec());
        assert!(!held.held_back);
    }

    #[test]
    fn test_body_before_headers_is_a_protocol_violation() {
        let mut exchange = Exchange::new(config());
        let err = exchange
            .handle(PhaseEvent::RequestBody { body: b"{}".to_vec(), end_of_stream: true })
            .unwrap_err();
        assert!(matches!(err, AppError::ProtocolViolation(_)));
    }

    #[test]
    fn test_single_backend_is_selected_without_header() {
        let mut exchange = Exchange::new(config());
        exchange
            .handle(PhaseEvent::RequestHeaders(headers(&[(":path", "/v1/embeddings")])))
            .unwrap();
        exchange
            .handle(PhaseEvent::RequestBody {
                body: br#"{"model":"e","input":"x"}"#.to_vec(),
                end_of_stream: true,
            })
            .unwrap();
        assert_eq!(exchange.backend.as_deref(), Some("openai"));
    }

    #[test]
    fn test_unknown_path_is_rejected() {
        let mut exchange = Exchange::new(config());
        let err = exchange
            .handle(PhaseEvent::RequestHeaders(headers(&[(":path", "/v1/completions")])))
            .unwrap_err();
        assert_eq!(err.status_code().as_u16(), 404);
    }
}
