// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use log::{debug, info, warn, LevelFilter};
use tokio::io::{AsyncBufReadExt, BufReader};

use keycard_flow::{Config, Notification, OperationKind, Orchestrator, Params};
use keycard_sim::*;

/// Keycard flow runner against a simulated card
///
/// Notifications are written to stdout as JSON, one per line. Lines
/// read from stdin are parsed as JSON objects and used to resume a
/// paused flow, ctrl + c cancels.
#[derive(Clone, Debug, PartialEq, Parser)]
pub struct Args {
    /// Flow to run
    #[clap(long, value_enum)]
    kind: OperationKind,

    /// Flow parameters (JSON object)
    #[clap(long, default_value = "{}")]
    params: String,

    /// Pairing store file
    #[clap(long, env = "KEYCARD_PAIRINGS", default_value = "pairings.json")]
    storage: PathBuf,

    /// Present a factory fresh card
    #[clap(long)]
    uninitialized: bool,

    /// Load keys from a mnemonic before running
    #[clap(long)]
    mnemonic: Option<String>,

    /// Start without a card, `insert` on stdin presents one
    #[clap(long)]
    no_card: bool,

    /// Grace period before requesting a card, in milliseconds
    #[clap(long, default_value = "150")]
    card_grace_ms: u64,

    /// Log level
    #[clap(long, default_value = "info")]
    log_level: LevelFilter,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Setup logging, stdout is reserved for notifications
    let mut c = simplelog::ConfigBuilder::new();
    c.add_filter_allow_str("keycard");

    let _ = simplelog::WriteLogger::init(args.log_level, c.build(), std::io::stderr());

    let params: Params = serde_json::from_str(&args.params)?;

    // Setup card
    let card = match args.uninitialized {
        true => SimCard::uninitialized(),
        false => SimCard::new(),
    };
    let card = match &args.mnemonic {
        Some(m) => card.load_mnemonic(m)?,
        None => card,
    };

    info!(
        "Simulated card {} (pin: {}, puk: {})",
        card.instance_uid(),
        card.pin(),
        card.puk()
    );

    let channel = SimChannel::new();
    if !args.no_card {
        channel.insert(&card);
    }

    // Setup orchestrator
    let config = Config {
        card_grace_ms: args.card_grace_ms,
        ..Default::default()
    };
    let (o, mut rx) = Orchestrator::new(config);

    o.configure(&args.storage, Some(Arc::new(channel.clone())))?;
    o.start_detection()?;
    o.start(args.kind, params)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select!(
            // Print notifications, exiting on flow completion
            n = rx.recv() => {
                let n = match n {
                    Some(n) => n,
                    None => break,
                };

                println!("{}", n.to_json());

                if let Notification::Completed(_) | Notification::Errored(_) = n {
                    debug!("Flow complete");
                    break;
                }
            }
            // Handle host input
            l = lines.next_line() => {
                match l? {
                    Some(l) => handle_line(&o, &channel, &card, l.trim()),
                    None => {
                        debug!("Input closed");
                        break;
                    }
                }
            }
            // Cancel on ctrl + c
            _ = tokio::signal::ctrl_c() => {
                debug!("Exit!");
                break;
            },
        );
    }

    o.shutdown().await;

    Ok(())
}

fn handle_line(o: &Orchestrator, channel: &SimChannel, card: &SimCard, l: &str) {
    match l {
        "" => (),
        "insert" => channel.insert(card),
        "remove" => channel.remove(),
        _ => match serde_json::from_str::<Params>(l) {
            Ok(p) => {
                if let Err(e) = o.resume(p) {
                    warn!("Resume failed: {e}");
                }
            }
            Err(e) => warn!("Invalid input (expected a JSON object): {e}"),
        },
    }
}
