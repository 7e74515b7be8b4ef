//! RRLA Agent 命令行入口
//!
//! 用法：`rrla-agent [--stream] [--config <path>] [输入...]`，未给出输入时从 stdin 读取。

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use rrla_agent::core::{create_agent_builder, StreamEvent};
use rrla_agent::{observability, process_message, process_message_stream};
use tokio_util::sync::CancellationToken;

struct Args {
    stream: bool,
    config: Option<PathBuf>,
    input: String,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut stream = false;
    let mut config = None;
    let mut words = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--stream" => stream = true,
            "--config" => {
                let path = args.next().context("--config requires a path")?;
                config = Some(PathBuf::from(path));
            }
            _ => words.push(arg),
        }
    }
    let input = if words.is_empty() {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        words.join(" ")
    };
    Ok(Args {
        stream,
        config,
        input,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let args = parse_args()?;
    let orchestrator = create_agent_builder(args.config)
        .build()
        .context("Failed to build agent")?;

    if args.stream {
        let orchestrator = Arc::new(orchestrator);
        let (mut rx, handle) =
            process_message_stream(&orchestrator, args.input, CancellationToken::new());
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Chunk { text } => print!("{text}"),
                StreamEvent::Error { node, class, .. } => {
                    eprintln!("\n[{node} failed: {class}]");
                }
                StreamEvent::Done {
                    duration_ms,
                    status,
                    ..
                } => println!("\n\n({status:?}, {duration_ms} ms)"),
            }
        }
        handle.await.context("Pipeline task panicked")?;
        return Ok(());
    }

    let reply = process_message(&orchestrator, &args.input)
        .await
        .context("Pipeline produced no answer")?;
    println!("{}\n", reply.answer);
    for entry in &reply.trace {
        println!(
            "  {:<15} {:?} {} ms{}",
            entry.node,
            entry.outcome,
            entry.duration_ms,
            entry
                .error_class
                .as_deref()
                .map(|c| format!(" ({c})"))
                .unwrap_or_default()
        );
    }
    Ok(())
}
