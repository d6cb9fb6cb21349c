use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

use yuanbao_bridge::blocks::{parse_blocks, render_invocation, BlockParser, FunctionCallBlockParser};
use yuanbao_bridge::protocol::openai_chat::{OpenAiTool, OpenAiToolFunction};
use yuanbao_bridge::stream::{frame_channel, ChatConfig, EmissionEngine};

fn long_transcript(rounds: usize) -> String {
    let mut transcript = String::new();
    for i in 0..rounds {
        transcript.push_str("<thinking>Consider the next lookup carefully.</thinking>");
        transcript.push_str("Some narration about what happens next in the answer. ");
        transcript.push_str(&render_invocation(
            "search",
            &format!("{{\"q\":\"query number {i}\",\"limit\":10}}"),
        ));
    }
    transcript.push_str("Final summary that never closes");
    transcript
}

fn config(with_tools: bool) -> Arc<ChatConfig> {
    let tools = if with_tools {
        vec![OpenAiTool {
            type_: "function".to_string(),
            function: OpenAiToolFunction {
                name: "search".to_string(),
                description: None,
                parameters: None,
            },
        }]
    } else {
        Vec::new()
    };
    Arc::new(ChatConfig {
        model_name: "bench".to_string(),
        tools,
        stream: true,
        ..ChatConfig::default()
    })
}

fn fragments(transcript: &str, size: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = transcript;
    while !rest.is_empty() {
        let mut cut = size.min(rest.len());
        while !rest.is_char_boundary(cut) {
            cut += 1;
        }
        let (head, tail) = rest.split_at(cut);
        out.push(head.to_string());
        rest = tail;
    }
    out
}

fn bench_block_parser(c: &mut Criterion) {
    let transcript = long_transcript(64);
    c.bench_function("parse_blocks_64_calls", |b| {
        b.iter(|| black_box(parse_blocks(black_box(&transcript))));
    });

    let parser: Arc<dyn BlockParser> = Arc::new(FunctionCallBlockParser);
    c.bench_function("parse_blocks_dyn_64_calls", |b| {
        b.iter(|| black_box(parser.parse(black_box(&transcript))));
    });
}

fn bench_engine(c: &mut Criterion) {
    let pieces = fragments(&long_transcript(16), 24);
    let parser: Arc<dyn BlockParser> = Arc::new(FunctionCallBlockParser);

    c.bench_function("engine_tools_16_calls_24b_fragments", |b| {
        b.iter(|| {
            let (sink, frames) = frame_channel();
            let mut engine =
                EmissionEngine::new(config(true), Arc::clone(&parser), sink, String::new());
            for piece in &pieces {
                engine.push_content(black_box(piece));
            }
            engine.finish();
            black_box(frames);
        });
    });

    c.bench_function("engine_no_tools_24b_fragments", |b| {
        b.iter(|| {
            let (sink, frames) = frame_channel();
            let mut engine =
                EmissionEngine::new(config(false), Arc::clone(&parser), sink, String::new());
            for piece in &pieces {
                engine.push_content(black_box(piece));
            }
            engine.finish();
            black_box(frames);
        });
    });
}

criterion_group!(benches, bench_block_parser, bench_engine);
criterion_main!(benches);
