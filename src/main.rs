use std::sync::Arc;

use lootbox_audit::{
    Auditor, CancelToken, DirectoryBoard, KzgBackend, LocalBeacon, ProtocolConfig, Provider,
    RarityTable, Result,
};
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run() {
        error!(error = %e, "audit run failed");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // usage: lootbox_audit [config.json] [board-dir]
    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => ProtocolConfig::from_json_file(path)?,
        None => ProtocolConfig::default(),
    };
    let board_dir = args
        .next()
        .unwrap_or_else(|| format!("board-{}", std::process::id()));
    let sample_count = config.sample_count()?;

    let beacon = Arc::new(LocalBeacon::new());
    let board = Arc::new(DirectoryBoard::open(&board_dir)?);
    let cancel = CancelToken::new();

    // Step 1: Provider commits to its drop function and contributes to the beacon
    let mut provider = Provider::new(
        config.clone(),
        Box::new(KzgBackend::new(config.max_supported_degree)),
        beacon.clone(),
        board.clone(),
    );
    provider.setup()?;

    // Step 2: Provider opens the function at every beacon-derived point
    provider.eval(sample_count, &cancel)?;
    println!("Published {} evaluations to {}", provider.records().len(), board_dir);

    // Step 3: Auditor recomputes the points and checks every proof
    let mut auditor = Auditor::new(config.clone(), Box::new(KzgBackend::auditor()), beacon, board);
    let report = auditor.verify(sample_count, &cancel)?;
    println!("{report}");
    println!(
        "Proofs valid: {}, claim consistent: {}, enough samples: {}",
        report.proofs_valid(),
        report.claim_consistent,
        report.sufficient_samples()
    );

    // Step 4: Map the first few published values onto the card table
    let table = RarityTable::standard();
    for (i, record) in provider.records().iter().take(5).enumerate() {
        let draw = table.classify(&record.value);
        println!("Draw {i}: {} card #{}", draw.tier, draw.card);
    }

    report.ensure_valid()
}
