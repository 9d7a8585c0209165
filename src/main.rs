// Copyright (c) 2025 Rill Contributors
// SPDX-License-Identifier: MIT

use std::env;

use anyhow::Context;

use rill::config::{build_graph, builtin_registry, Topology};
use rill::feeder::{collect_into, feed_list, FeedOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 5 {
        eprintln!(
            "Usage: {} <topology.yaml> <input-stream> <output-stream> <value> [value ...]",
            args[0]
        );
        eprintln!(
            "Example: {} configs/pipeline.yaml raw totals 1.5 2.5 3.0",
            args[0]
        );
        std::process::exit(1);
    }

    let topology = Topology::load(&args[1])?;
    let mut graph = build_graph(&topology, &builtin_registry())?;

    let input = graph
        .stream(&args[2])
        .with_context(|| format!("topology has no stream named '{}'", args[2]))?;
    let output = graph
        .stream(&args[3])
        .with_context(|| format!("topology has no stream named '{}'", args[3]))?;

    let values = args[4..]
        .iter()
        .map(|raw| {
            raw.parse::<f64>()
                .with_context(|| format!("'{raw}' is not a number"))
        })
        .collect::<anyhow::Result<Vec<f64>>>()?;

    let sink = collect_into(output);
    let _feeder = feed_list(input, values, FeedOptions::default());

    let summary = graph.run().await;
    let results = sink.await?;

    println!("scheduler: {summary}");
    println!("{}: {:?}", args[3], results);
    Ok(())
}
