use std::io::Write;

use bookfeed_rs::config::Settings;
use bookfeed_rs::engine::view::LadderSnapshot;
use bookfeed_rs::market_data::adapters::bitmex::Environment;
use bookfeed_rs::market_data::normaliser::{abbreviate, approximate_usd_notional};
use bookfeed_rs::market_data::router::FeedRuntime;
use bookfeed_rs::market_data::ticker::ChangeDir;
use bookfeed_rs::telemetry;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Parser)]
#[command(name = "bookfeed", about = "BitMEX L2 order book and ticker console")]
struct Cli {
    /// devhk, testnet or prod
    #[arg(long = "env")]
    environment: Option<String>,
    /// Realtime endpoint, overrides --env
    #[arg(long)]
    url: Option<String>,
    /// Topic to subscribe (repeatable), e.g. orderBookL2:XBTUSD
    #[arg(long = "topic")]
    topics: Vec<String>,
    /// Symbol shown by `book` and `depth` by default
    #[arg(long)]
    symbol: Option<String>,
    /// Price grouping for the book view, 0 disables
    #[arg(long)]
    group: Option<f64>,
    /// Default tracing filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log: String,
    /// Prometheus exporter port (metrics-exporter feature)
    #[arg(long, default_value_t = 9000)]
    metrics_port: u16,
    /// Connect immediately instead of waiting for `connect`
    #[arg(long)]
    connect: bool,
}

impl Cli {
    fn apply(&self, settings: &mut Settings) -> anyhow::Result<()> {
        if let Some(env) = &self.environment {
            settings.environment = Environment::parse(env)
                .ok_or_else(|| anyhow::anyhow!("unknown environment '{}'", env))?;
        }
        if self.url.is_some() {
            settings.url = self.url.clone();
        }
        if !self.topics.is_empty() {
            settings.topics = self.topics.clone();
        }
        if let Some(symbol) = &self.symbol {
            settings.symbol = symbol.clone();
        }
        if let Some(group) = self.group {
            settings.group_size = group;
        }
        Ok(())
    }
}

fn print_help() {
    println!("Available commands:");
    println!("  connect                 - Open the feed with the selected topics");
    println!("  disconnect              - Close the feed");
    println!("  status                  - Connection state and counters");
    println!("  book [symbol] [group]   - Grouped order book (group 0 = raw levels)");
    println!("  depth [symbol]          - Cumulative depth per side");
    println!("  symbols                 - Symbols with a book");
    println!("  tickers                 - Instruments ranked by USD notional");
    println!("  feeds                   - Topic selection");
    println!("  toggle <topic>          - Enable/disable a topic (applies on next connect)");
    println!("  group <size>            - Set default grouping");
    println!("  log                     - Recent connection activity");
    println!("  quit, q                 - Exit");
}

fn print_book(symbol: &str, snap: &LadderSnapshot, rows: usize) {
    println!("\n=== {} ===", symbol);
    println!("{:>14} {:>14} | {:<14} {:<14}", "Bid size", "Bid", "Ask", "Ask size");
    for i in 0..rows.min(snap.bids.len().max(snap.asks.len())) {
        let bid = snap.bids.get(i);
        let ask = snap.asks.get(i);
        println!(
            "{:>14} {:>14} | {:<14} {:<14}",
            bid.map(|l| l.size.to_string()).unwrap_or_default(),
            bid.map(|l| l.price.to_string()).unwrap_or_default(),
            ask.map(|l| l.price.to_string()).unwrap_or_default(),
            ask.map(|l| l.size.to_string()).unwrap_or_default(),
        );
    }
    match (snap.spread(), snap.mid()) {
        (Some(spread), Some(mid)) => println!("Spread: {}  Mid: {}", spread, mid),
        _ => println!("Spread: N/A"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // load .env

    let cli = Cli::parse();
    telemetry::init_tracing(&cli.log);
    telemetry::init_metrics(cli.metrics_port)?;

    let mut settings = Settings::load()?;
    cli.apply(&mut settings)?;

    let runtime = FeedRuntime::start(&settings);
    if cli.connect {
        if let Err(e) = runtime.connection.lock().connect() {
            println!("❌ {}", e);
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nbookfeed> ");
        std::io::stdout().flush()?;

        let Some(input) = lines.next_line().await? else { break };
        let parts: Vec<&str> = input.split_whitespace().collect();
        let Some((command, args)) = parts.split_first() else { continue };

        match command.to_lowercase().as_str() {
            "help" | "h" => print_help(),
            "connect" => {
                if let Err(e) = runtime.connection.lock().connect() {
                    println!("❌ {}", e);
                }
            }
            "disconnect" => runtime.connection.lock().disconnect(),
            "status" => {
                let conn = runtime.connection.lock();
                let state = conn.state();
                println!("Environment: {}", conn.environment().name());
                println!("Status: {:?}", state.status());
                println!("Messages: {}", state.message_count);
                match state.last_update {
                    Some(ts) => println!("Last update: {} ms", ts),
                    None => println!("Last update: never"),
                }
                if let Some(err) = &state.error {
                    println!("Error: {}", err);
                }
            }
            "book" => {
                let symbol = args.first().copied().unwrap_or(settings.symbol.as_str());
                let granularity = match args.get(1) {
                    Some(g) => match g.parse::<f64>() {
                        Ok(g) => Some(g),
                        Err(_) => {
                            println!("Invalid group size");
                            continue;
                        }
                    },
                    None => settings.granularity(),
                };
                let snap = runtime.books.view(symbol, granularity);
                print_book(symbol, &snap, settings.depth);
            }
            "depth" => {
                let symbol = args.first().copied().unwrap_or(settings.symbol.as_str());
                let depth = runtime.books.view(symbol, settings.granularity()).truncate(settings.depth).cumulative();
                println!("Bids:");
                for p in &depth.bids {
                    println!("  {:>14} {:>16}", p.price, p.cumulative);
                }
                println!("Asks:");
                for p in &depth.asks {
                    println!("  {:>14} {:>16}", p.price, p.cumulative);
                }
            }
            "symbols" => println!("{}", runtime.books.symbols().join(", ")),
            "tickers" => {
                for (symbol, t) in runtime.tickers.ranked() {
                    let arrow = match t.change_dir {
                        ChangeDir::Up => "▲",
                        ChangeDir::Down => "▼",
                        ChangeDir::None => " ",
                    };
                    let notional = approximate_usd_notional(&t).map(abbreviate).unwrap_or_else(|| "-".to_string());
                    println!(
                        "{:<12} {} {:>14} {:>10}",
                        symbol,
                        arrow,
                        t.last_price.map(|p| p.to_string()).unwrap_or_default(),
                        notional
                    );
                }
            }
            "feeds" => {
                let conn = runtime.connection.lock();
                for (topic, on) in conn.topics().iter() {
                    println!("  [{}] {}", if on { "x" } else { " " }, topic);
                }
            }
            "toggle" => match args.first() {
                Some(topic) => {
                    let on = runtime.connection.lock().topics_mut().toggle(topic);
                    println!("{} {}", topic, if on { "enabled" } else { "disabled" });
                }
                None => println!("Usage: toggle <topic>"),
            },
            "group" => match args.first().map(|g| g.parse::<f64>()) {
                Some(Ok(g)) => settings.group_size = g,
                _ => println!("Usage: group <size>"),
            },
            "log" => {
                let conn = runtime.connection.lock();
                for line in conn.activity().lines() {
                    println!("[{}] {}", line.at, line.text);
                }
            }
            "quit" | "q" | "exit" => {
                println!("Goodbye!");
                break;
            }
            _ => println!("Unknown command. Type 'help' for available commands."),
        }
    }

    runtime.shutdown();
    Ok(())
}
