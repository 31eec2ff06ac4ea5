//! handtree-demo - fills a `ConcurrentTree` from many threads and prints it
//!
//! Usage:
//!   cargo run -p handtree-demo -- [--keys <chars>] [--threads <n>] [--delete <chars>] [--order <order>]
//!
//! Logging is controlled with `RUST_LOG`, e.g. `RUST_LOG=handtree=trace`.

use std::io::{self, Write};
use std::thread;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use handtree::ConcurrentTree;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Letters inserted by default, in the order the workers receive them.
const DEFAULT_KEYS: &str = "GAQZJCLUPVTOEXNSRWBFHIDKY";

/// Columns of indentation per tree level in depth-first output.
const INDENT_PER_LEVEL: usize = 3;

#[derive(Parser, Debug)]
#[command(name = "handtree-demo")]
#[command(about = "Inserts keys into a handtree from many threads, then prints the tree")]
struct Cli {
    /// Key inserted before any worker starts
    #[arg(long, default_value_t = 'M')]
    root: char,

    /// Keys inserted concurrently, one character per key
    #[arg(long, short = 'k', default_value = DEFAULT_KEYS)]
    keys: String,

    /// Number of worker threads (defaults to one per key)
    #[arg(long, short = 't')]
    threads: Option<usize>,

    /// Keys deleted after all workers have finished
    #[arg(long, short = 'd', default_value = "")]
    delete: String,

    /// Traversal used to print the tree
    #[arg(long, value_enum, default_value_t = Order::Depth)]
    order: Order,
}

/// Traversal order of the printed tree.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Order {
    /// Pre-order, one node per line, indented by depth
    Depth,
    /// Level order on a single line
    Breadth,
    /// Ascending key order on a single line
    InOrder,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "handtree=info,handtree_demo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    if cli.threads == Some(0) {
        bail!("--threads must be at least 1");
    }

    let tree = ConcurrentTree::new();
    tree.add(cli.root, 0);

    let keys: Vec<(char, usize)> = cli
        .keys
        .chars()
        .enumerate()
        .map(|(index, key)| (key, index + 1))
        .collect();
    let threads = cli.threads.unwrap_or(keys.len()).max(1);

    insert_concurrently(&tree, &keys, threads);

    delete_keys(&tree, &cli.delete);
    verify_tree(&tree)?;

    print_tree(&tree, cli.order).context("failed to write tree to stdout")
}

/// Splits `keys` over `threads` scoped workers that all insert into `tree`.
fn insert_concurrently(tree: &ConcurrentTree<char, usize>, keys: &[(char, usize)], threads: usize) {
    let chunk_size = keys.len().div_ceil(threads).max(1);
    let started = Instant::now();

    thread::scope(|scope| {
        for chunk in keys.chunks(chunk_size) {
            scope.spawn(move || {
                for &(key, value) in chunk {
                    if !tree.add(key, value) {
                        tracing::warn!(%key, "duplicate key skipped");
                    }
                }
            });
        }
    });

    tracing::info!(
        keys = keys.len(),
        workers = keys.len().div_ceil(chunk_size),
        elapsed_us = started.elapsed().as_micros(),
        "concurrent inserts finished"
    );
}

fn delete_keys(tree: &ConcurrentTree<char, usize>, keys: &str) {
    for key in keys.chars() {
        if tree.delete(&key) {
            tracing::info!(%key, "deleted key");
        } else {
            tracing::warn!(%key, "key to delete not found");
        }
    }
}

/// Checks ordering and the node count once inserts and deletes are done.
fn verify_tree(tree: &ConcurrentTree<char, usize>) -> Result<usize> {
    let reachable = tree
        .verify()
        .context("tree invariants violated after concurrent inserts and deletes")?;
    tracing::debug!(reachable, height = tree.height(), "tree verified");
    Ok(reachable)
}

fn print_tree(tree: &ConcurrentTree<char, usize>, order: Order) -> io::Result<()> {
    let mut lines = Vec::with_capacity(tree.len());
    match order {
        Order::Depth => tree.depth_first(|key, _, depth| {
            lines.push(format!("{:indent$}{key}", "", indent = depth * INDENT_PER_LEVEL));
        }),
        Order::Breadth => {
            let mut line = String::new();
            tree.breadth_first(|key, _| line.extend([*key, ' ']));
            lines.push(line.trim_end().to_string());
        }
        Order::InOrder => {
            let mut line = String::new();
            tree.in_order(|key, _| line.extend([*key, ' ']));
            lines.push(line.trim_end().to_string());
        }
    }

    let mut stdout = io::stdout().lock();
    for line in &lines {
        writeln!(stdout, "{line}")?;
    }
    writeln!(stdout, "number: {}", tree.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["handtree-demo"]);
        assert_eq!(cli.root, 'M');
        assert_eq!(cli.keys, DEFAULT_KEYS);
        assert!(cli.threads.is_none());
        assert!(matches!(cli.order, Order::Depth));
    }

    #[test]
    fn test_cli_parses_in_order() {
        let cli = Cli::parse_from(["handtree-demo", "--order", "in-order", "-t", "4"]);
        assert!(matches!(cli.order, Order::InOrder));
        assert_eq!(cli.threads, Some(4));
    }

    #[test]
    fn test_insert_concurrently_inserts_all_letters() {
        let tree = ConcurrentTree::new();
        tree.add('M', 0);
        let keys: Vec<(char, usize)> = DEFAULT_KEYS
            .chars()
            .enumerate()
            .map(|(index, key)| (key, index + 1))
            .collect();

        insert_concurrently(&tree, &keys, 5);

        assert_eq!(tree.len(), 26);
        assert_eq!(tree.verify(), Ok(26));
        assert_eq!(tree.keys(), ('A'..='Z').collect::<Vec<_>>());
    }

    #[test]
    fn test_verify_after_inserts_and_deletes() {
        let tree = ConcurrentTree::new();
        tree.add('M', 0);
        let keys: Vec<(char, usize)> = DEFAULT_KEYS
            .chars()
            .enumerate()
            .map(|(index, key)| (key, index + 1))
            .collect();
        insert_concurrently(&tree, &keys, 4);

        delete_keys(&tree, "MGA!");

        assert_eq!(verify_tree(&tree).expect("verified"), 23);
        assert!(!tree.contains_key(&'M'));
        assert!(tree.contains_key(&'Z'));
    }

    #[test]
    fn test_insert_concurrently_skips_duplicates() {
        let tree = ConcurrentTree::new();
        let keys = [('a', 1), ('b', 2), ('a', 3)];

        insert_concurrently(&tree, &keys, 3);

        assert_eq!(tree.len(), 2);
    }
}
