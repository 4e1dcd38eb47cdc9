#![cfg(not(tarpaulin_include))]

use log::info;
use roster::config::RosterConfig;
use roster::directory::DirectoryRequest;
use roster::pdf::render_pdf;
use std::env;
use std::fs;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 4 {
        eprintln!("Usage: {} <output.pdf> [statuses] [fields]", args[0]);
        eprintln!("  statuses: comma separated, e.g. \"출석 중,장기 결석\" (default: everyone)");
        eprintln!("  fields:   comma separated, e.g. \"전화번호,주소\" (default: phone, address, children)");
        return Ok(());
    }

    let config = RosterConfig::from_env()?;
    let store = config.store()?;
    let table = store.load()?;

    let request = DirectoryRequest::from_lists(
        args.get(2).map(String::as_str).unwrap_or_default(),
        args.get(3).map(String::as_str).unwrap_or_default(),
    );
    let (bytes, stats) = render_pdf(&table, &request, &config.layout);
    fs::write(&args[1], bytes)?;

    info!("wrote {}", args[1]);
    println!(
        "{} households on {} pages ({} photo placeholders) -> {}",
        stats.households, stats.pages, stats.placeholders, args[1]
    );
    Ok(())
}
