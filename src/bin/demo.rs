use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use cch_core::{
    constants::Weight,
    contraction::build_structure,
    customization::customize,
    graph::{edge_index, node_index, Graph},
    ordering::compute_order,
    partial::PartialUpdater,
    search::{dijkstra::Dijkstra, query::CchQuery},
};
use clap::Parser;
use indicatif::ProgressBar;
use rand::prelude::*;
use rustc_hash::FxHashMap;

#[derive(Parser)]
#[command(version, about = "CCH demo on a random graph", long_about = None)]
struct Cli {
    /// Number of nodes in the generated graph
    #[arg(short, long, default_value = "1000")]
    nodes: usize,

    /// Number of random extra arcs on top of the spanning cycle
    #[arg(short, long, default_value = "3000")]
    arcs: usize,

    /// Number of random queries to verify against Dijkstra
    #[arg(short, long, default_value = "100")]
    queries: usize,

    /// Seed for the random generator
    #[arg(short, long, default_value = "187")]
    seed: u64,
}

// Summation order differs between the two searches, so allow for
// floating point noise.
fn agree(a: Option<Weight>, b: Option<Weight>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).abs() < 1e-6,
        (None, None) => true,
        _ => false,
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut rng: StdRng = SeedableRng::seed_from_u64(cli.seed);

    // Spanning cycle keeps the graph strongly connected; extra arcs add
    // alternative routes.
    let mut tail = Vec::new();
    let mut head = Vec::new();
    let mut weights: Vec<Weight> = Vec::new();
    for u in 0..cli.nodes {
        tail.push(u as u32);
        head.push(((u + 1) % cli.nodes) as u32);
        weights.push(rng.gen_range(1.0..100.0));
    }
    for _ in 0..cli.arcs {
        tail.push(rng.gen_range(0..cli.nodes) as u32);
        head.push(rng.gen_range(0..cli.nodes) as u32);
        weights.push(rng.gen_range(1.0..100.0));
    }

    let now = Instant::now();
    let order = compute_order(cli.nodes, &tail, &head).context("order computation failed")?;
    println!("Computed order in {:?}", now.elapsed());

    let now = Instant::now();
    let structure =
        Arc::new(build_structure(&order, &tail, &head, true).context("structure build failed")?);
    structure.print_info();
    println!("Built structure in {:?}", now.elapsed());

    let now = Instant::now();
    let metric = customize(structure, weights.clone()).context("customization failed")?;
    println!("Customized in {:?}", now.elapsed());

    let g = Graph::from_arcs(cli.nodes, &tail, &head)?;

    println!("Running {} random queries", cli.queries);
    let pb = ProgressBar::new(cli.queries as u64);
    let mut query = CchQuery::new(&metric);
    for _ in 0..cli.queries {
        let s = node_index(rng.gen_range(0..cli.nodes));
        let t = node_index(rng.gen_range(0..cli.nodes));

        let got = query.run(s, t)?.map(|sp| sp.weight);
        let mut dijkstra = Dijkstra::new(&g, &weights);
        let want = dijkstra.search(s, t).map(|sp| sp.weight);
        anyhow::ensure!(
            agree(got, want),
            "query {:?} -> {:?} disagrees with Dijkstra: {:?} vs {:?}",
            s,
            t,
            got,
            want
        );
        pb.inc(1);
    }
    pb.finish();
    println!("{}", query.stats);

    // Perturb a handful of arcs and verify again.
    let mut updates = FxHashMap::default();
    for _ in 0..16 {
        let arc = rng.gen_range(0..weights.len());
        let w = rng.gen_range(1.0..100.0);
        updates.insert(edge_index(arc), w);
    }
    let now = Instant::now();
    let mut updater = PartialUpdater::new(metric.structure().clone());
    updater.apply(&metric, &updates)?;
    println!("Applied {} weight changes in {:?}", updates.len(), now.elapsed());

    for (arc, w) in updates {
        weights[arc.index()] = w;
    }
    let mut query = CchQuery::new(&metric);
    for _ in 0..cli.queries {
        let s = node_index(rng.gen_range(0..cli.nodes));
        let t = node_index(rng.gen_range(0..cli.nodes));

        let got = query.run(s, t)?.map(|sp| sp.weight);
        let mut dijkstra = Dijkstra::new(&g, &weights);
        let want = dijkstra.search(s, t).map(|sp| sp.weight);
        anyhow::ensure!(agree(got, want), "post-update query disagrees with Dijkstra");
    }
    println!("All post-update queries agree with Dijkstra");

    Ok(())
}
