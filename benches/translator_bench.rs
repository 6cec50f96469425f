//! Translator performance benchmarks

use aigateway_extproc::config::{APISchemaName, BackendConfig, VersionedAPISchema};
use aigateway_extproc::models::openai::{ChatCompletionRequest, EncodingFormat};
use aigateway_extproc::translator::anthropic_chat::convert_request;
use aigateway_extproc::translator::embedding::{decode_base64, encode_base64};
use aigateway_extproc::translator::openai_embeddings::parse_embedding_response;
use aigateway_extproc::translator::Headers;
use aigateway_extproc::utils::json_patch::set_top_level_field;
use aigateway_extproc::{new_translator, CanonicalRequest, Endpoint};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn openai_backend() -> BackendConfig {
    BackendConfig {
        schema: VersionedAPISchema {
            name: APISchemaName::OpenAI,
            version: None,
        },
        model_name_override: None,
    }
}

/// Build an SSE body with `chunks` content events followed by a usage event
fn create_stream_body(chunks: usize) -> Vec<u8> {
    let mut body = String::new();
    for i in 0..chunks {
        body.push_str(&format!(
            "data: {{\"id\":\"c\",\"object\":\"chat.completion.chunk\",\"choices\":[{{\"index\":0,\"delta\":{{\"content\":\"token {}\"}}}}]}}\n\n",
            i
        ));
    }
    body.push_str("data: {\"id\":\"c\",\"choices\":[],\"usage\":{\"prompt_tokens\":13,\"completion_tokens\":12,\"total_tokens\":25}}\n\n");
    body.push_str("data: [DONE]\n\n");
    body.into_bytes()
}

/// Benchmark: Usage extraction from streamed responses split into fragments
fn bench_stream_usage_extraction(c: &mut Criterion) {
    let request_body = br#"{"model":"gpt-4o","messages":[],"stream":true}"#;
    let request = CanonicalRequest::parse(Endpoint::ChatCompletions, request_body).unwrap();
    let headers = Headers::new();

    let mut group = c.benchmark_group("stream_usage_extraction");

    for fragment_size in [16, 256, 4096].iter() {
        let body = create_stream_body(200);

        group.bench_with_input(BenchmarkId::new("fragment_size", fragment_size), fragment_size, |b, &size| {
            b.iter(|| {
                let mut translator = new_translator(Endpoint::ChatCompletions, &openai_backend()).unwrap();
                translator.request_body(request_body, &request, false).unwrap();
                for fragment in body.chunks(size) {
                    black_box(
                        translator
                            .response_body(&headers, &mut black_box(fragment), false)
                            .unwrap(),
                    );
                }
            })
        });
    }

    group.finish();
}

/// Benchmark: Embedding decoding in both encodings
fn bench_embedding_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("embedding_codec");

    for dimensions in [256, 1536, 3072].iter() {
        let values: Vec<f64> = (0..*dimensions).map(|i| i as f64 / 7.0).collect();
        let encoded = encode_base64(&values);
        let float_body = serde_json::json!({
            "object": "list",
            "data": [{"object": "embedding", "embedding": values, "index": 0}],
            "model": "text-embedding-3-large",
            "usage": {"prompt_tokens": 8, "total_tokens": 8}
        })
        .to_string();
        let base64_body = serde_json::json!({
            "object": "list",
            "data": [{"object": "embedding", "embedding": encoded, "index": 0}],
            "model": "text-embedding-3-large",
            "usage": {"prompt_tokens": 8, "total_tokens": 8}
        })
        .to_string();

        group.bench_with_input(BenchmarkId::new("float_response", dimensions), dimensions, |b, _| {
            b.iter(|| black_box(parse_embedding_response(black_box(float_body.as_bytes()), EncodingFormat::Float).unwrap()))
        });

        group.bench_with_input(BenchmarkId::new("base64_response", dimensions), dimensions, |b, _| {
            b.iter(|| black_box(parse_embedding_response(black_box(base64_body.as_bytes()), EncodingFormat::Base64).unwrap()))
        });

        group.bench_with_input(BenchmarkId::new("base64_decode", dimensions), dimensions, |b, _| {
            b.iter(|| black_box(decode_base64(black_box(&encoded)).unwrap()))
        });
    }

    group.finish();
}

/// Benchmark: Model override patch
fn bench_model_override(c: &mut Criterion) {
    let body = serde_json::json!({
        "model": "gpt-4o",
        "messages": (0..50).map(|i| serde_json::json!({"role": "user", "content": format!("Message {}", i)})).collect::<Vec<_>>(),
        "temperature": 0.2
    })
    .to_string();

    c.bench_function("model_override_patch", |b| {
        b.iter(|| black_box(set_top_level_field(black_box(body.as_bytes()), "model", "gpt-4o-mini").unwrap()))
    });
}

/// Benchmark: Chat request conversion to the Messages API
fn bench_anthropic_request_conversion(c: &mut Criterion) {
    let mut group = c.benchmark_group("anthropic_request_conversion");

    for count in [1, 10, 50].iter() {
        let messages: Vec<serde_json::Value> = (0..*count)
            .map(|i| {
                serde_json::json!({
                    "role": if i % 2 == 0 { "user" } else { "assistant" },
                    "content": format!("Message {}", i)
                })
            })
            .collect();
        let request: ChatCompletionRequest =
            serde_json::from_value(serde_json::json!({"model": "claude-3-5-sonnet", "messages": messages})).unwrap();

        group.bench_with_input(BenchmarkId::new("messages", count), count, |b, _| {
            b.iter(|| black_box(convert_request(black_box(&request), "claude-3-5-sonnet").unwrap()))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_stream_usage_extraction,
    bench_embedding_codec,
    bench_model_override,
    bench_anthropic_request_conversion
);
criterion_main!(benches);
